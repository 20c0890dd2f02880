use thiserror::Error;

/// Errors raised while starting background units.
#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[from] std::io::Error),
}
