//! Synthetic contact generation for contactgen.
//!
//! This crate turns a name corpus and a seeded rng into a stream of
//! [`contactgen_core::Record`]s, one per call.

pub mod assets;
pub mod corpus;
pub mod errors;
pub mod generator;
pub mod photos;

pub use assets::AssetsLoader;
pub use corpus::NameCorpus;
pub use errors::GenerationError;
pub use generator::{GeneratorFactory, RecordGenerator, RecordSource, SourceFactory};
