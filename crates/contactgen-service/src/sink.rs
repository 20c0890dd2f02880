use std::sync::{Arc, PoisonError, RwLock};

use contactgen_core::{GenerationStats, Record};
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};
use tracing::debug;
use uuid::Uuid;

/// Identifies one run of a generation worker.
pub type SessionId = Uuid;

/// Emitted once per loop step.
#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub session: SessionId,
    /// `step / requested`, in `[0, 1]`.
    pub progress: f64,
    /// 1-based index of the step that just ran.
    pub step: u64,
    /// Records persisted so far.
    pub generated: u64,
    pub record: Arc<Record>,
}

/// Terminal result of a session, delivered exactly once.
#[derive(Debug, Clone)]
pub struct SessionOutcome {
    pub session: SessionId,
    pub requested: u64,
    pub generated: u64,
    /// True when the session ended through a cancellation request.
    pub forced: bool,
    /// Set when the session was aborted by a data source failure or panic.
    pub error: Option<String>,
    pub stats: GenerationStats,
}

impl SessionOutcome {
    pub fn is_complete(&self) -> bool {
        !self.forced && self.error.is_none() && self.generated == self.requested
    }
}

pub trait ProgressSink: Send + Sync {
    fn on_progress(&self, event: &ProgressEvent);
}

pub trait ResultSink: Send + Sync {
    fn on_result(&self, outcome: &SessionOutcome);
}

impl<F> ProgressSink for F
where
    F: Fn(&ProgressEvent) + Send + Sync,
{
    fn on_progress(&self, event: &ProgressEvent) {
        self(event)
    }
}

impl<F> ResultSink for F
where
    F: Fn(&SessionOutcome) + Send + Sync,
{
    fn on_result(&self, outcome: &SessionOutcome) {
        self(outcome)
    }
}

/// Message form of the two sink callbacks.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    Progress(ProgressEvent),
    Finished(SessionOutcome),
}

/// Sink that posts every callback onto an unbounded channel, so delivery
/// happens on whichever context drains the receiver instead of the worker
/// thread.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: UnboundedSender<SessionEvent>,
}

impl ChannelSink {
    pub fn new() -> (Self, UnboundedReceiver<SessionEvent>) {
        let (tx, rx) = unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn from_sender(tx: UnboundedSender<SessionEvent>) -> Self {
        Self { tx }
    }

    fn post(&self, event: SessionEvent) {
        if self.tx.send(event).is_err() {
            debug!("session event dropped, observer receiver closed");
        }
    }
}

impl ProgressSink for ChannelSink {
    fn on_progress(&self, event: &ProgressEvent) {
        self.post(SessionEvent::Progress(event.clone()));
    }
}

impl ResultSink for ChannelSink {
    fn on_result(&self, outcome: &SessionOutcome) {
        self.post(SessionEvent::Finished(outcome.clone()));
    }
}

/// Swappable observer reference shared between the coordinator and a
/// running worker.
pub(crate) struct SinkSlot<S: ?Sized> {
    inner: RwLock<Option<Arc<S>>>,
}

impl<S: ?Sized> SinkSlot<S> {
    pub(crate) fn new(sink: Option<Arc<S>>) -> Self {
        Self {
            inner: RwLock::new(sink),
        }
    }

    /// Clones the current sink out of the slot; callers invoke it without
    /// holding the lock.
    pub(crate) fn get(&self) -> Option<Arc<S>> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub(crate) fn replace(&self, sink: Option<Arc<S>>) {
        *self.inner.write().unwrap_or_else(PoisonError::into_inner) = sink;
    }
}
