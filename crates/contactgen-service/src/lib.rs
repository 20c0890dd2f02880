//! Background generation pipeline for contactgen.
//!
//! A [`GenerationCoordinator`] owns at most one [`GenerationWorker`] (a
//! dedicated thread driving a record source) and at most one
//! [`DeletionTask`] (a blocking task on the tokio runtime). Observers attach
//! [`ProgressSink`] / [`ResultSink`] implementations; [`ChannelSink`] posts
//! events onto a channel drained by the observer's own loop.

mod completion;
pub mod coordinator;
pub mod deletion;
pub mod errors;
pub mod indicator;
pub mod sink;
pub mod worker;

pub use coordinator::{CoordinatorConfig, GenerationCoordinator};
pub use deletion::{DeletionOutcome, DeletionTask};
pub use errors::CoordinatorError;
pub use indicator::{ActivityIndicator, NoopIndicator};
pub use sink::{
    ChannelSink, ProgressEvent, ProgressSink, ResultSink, SessionEvent, SessionId, SessionOutcome,
};
pub use worker::{GenerationWorker, NoHooks, Observers, SessionParams, WorkerHooks, WorkerState};
