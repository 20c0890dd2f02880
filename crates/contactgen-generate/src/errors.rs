use thiserror::Error;

/// Errors emitted while producing records.
#[derive(Debug, Error)]
pub enum GenerationError {
    /// The name corpus is missing data or could not be read.
    #[error("data source error: {0}")]
    DataSource(String),
    /// The asset cache lock was poisoned by a panicking reader.
    #[error("asset cache poisoned")]
    CachePoisoned,
}
