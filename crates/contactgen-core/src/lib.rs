//! Core contracts shared across contactgen crates.
//!
//! This crate defines the synthetic contact record, gender filters, the
//! generation stats snapshot, and the contact-store collaborator trait.

pub mod error;
pub mod record;
pub mod stats;
pub mod store;

pub use error::{StoreError, StoreResult};
pub use record::{Gender, GenderFilter, ParseGenderError, Record};
pub use stats::GenerationStats;
pub use store::{ContactStore, MemoryContactStore};

/// Email domain stamped on every generated record; bulk deletion matches on it.
pub const DEFAULT_MARKER: &str = "example.com";
