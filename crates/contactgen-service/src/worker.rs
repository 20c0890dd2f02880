use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::Duration;

use chrono::{DateTime, Utc};
use contactgen_core::{ContactStore, Gender, GenderFilter, GenerationStats, Record};
use contactgen_generate::{GenerationError, SourceFactory};
use tracing::{debug, info, warn};

use crate::completion::Completion;
use crate::errors::CoordinatorError;
use crate::sink::{ProgressEvent, ProgressSink, ResultSink, SessionId, SessionOutcome, SinkSlot};

/// Lifecycle of a [`GenerationWorker`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Idle,
    Running,
    CancelRequested,
    Finished,
}

impl WorkerState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Idle,
            1 => Self::Running,
            2 => Self::CancelRequested,
            _ => Self::Finished,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            Self::Idle => 0,
            Self::Running => 1,
            Self::CancelRequested => 2,
            Self::Finished => 3,
        }
    }
}

/// Parameters of one generation session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionParams {
    pub requested: u64,
    pub with_photos: bool,
    pub gender: GenderFilter,
}

/// Observer pair handed to a worker at start.
#[derive(Clone, Default)]
pub struct Observers {
    pub progress: Option<Arc<dyn ProgressSink>>,
    pub result: Option<Arc<dyn ResultSink>>,
}

impl Observers {
    pub fn new(progress: Arc<dyn ProgressSink>, result: Arc<dyn ResultSink>) -> Self {
        Self {
            progress: Some(progress),
            result: Some(result),
        }
    }
}

/// Callbacks from the worker thread into its owner. Both run on the worker
/// thread; `on_finished` runs before the result sink is invoked.
pub trait WorkerHooks: Send + Sync {
    fn on_record(&self, _session: SessionId, _record: &Arc<Record>) {}

    fn on_finished(&self, _outcome: &SessionOutcome) {}
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoHooks;

impl WorkerHooks for NoHooks {}

struct StatsCell {
    requested: u64,
    with_photos: bool,
    gender: GenderFilter,
    started_at: DateTime<Utc>,
    generated: AtomicU64,
    failed_persists: AtomicU64,
    males: AtomicU64,
    females: AtomicU64,
    finished_at: Mutex<Option<DateTime<Utc>>>,
}

impl StatsCell {
    fn new(params: SessionParams) -> Self {
        Self {
            requested: params.requested,
            with_photos: params.with_photos,
            gender: params.gender,
            started_at: Utc::now(),
            generated: AtomicU64::new(0),
            failed_persists: AtomicU64::new(0),
            males: AtomicU64::new(0),
            females: AtomicU64::new(0),
            finished_at: Mutex::new(None),
        }
    }

    fn record_persisted(&self, gender: Gender) -> u64 {
        match gender {
            Gender::Male => self.males.fetch_add(1, Ordering::Relaxed),
            Gender::Female => self.females.fetch_add(1, Ordering::Relaxed),
        };
        self.generated.fetch_add(1, Ordering::AcqRel) + 1
    }

    fn record_failed(&self) {
        self.failed_persists.fetch_add(1, Ordering::Relaxed);
    }

    fn generated(&self) -> u64 {
        self.generated.load(Ordering::Acquire)
    }

    fn finish(&self) -> GenerationStats {
        *self
            .finished_at
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(Utc::now());
        self.snapshot()
    }

    fn snapshot(&self) -> GenerationStats {
        GenerationStats {
            requested: self.requested,
            generated: self.generated(),
            failed_persists: self.failed_persists.load(Ordering::Relaxed),
            males: self.males.load(Ordering::Relaxed),
            females: self.females.load(Ordering::Relaxed),
            with_photos: self.with_photos,
            gender: self.gender,
            started_at: self.started_at,
            finished_at: *self
                .finished_at
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        }
    }
}

struct WorkerShared {
    state: AtomicU8,
    cancel: AtomicBool,
    stats: StatsCell,
    progress: SinkSlot<dyn ProgressSink>,
    result: SinkSlot<dyn ResultSink>,
    done: Completion,
}

impl WorkerShared {
    fn state(&self) -> WorkerState {
        WorkerState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: WorkerState) {
        self.state.store(state.as_u8(), Ordering::Release);
    }

    fn cancel_requested(&self) -> bool {
        self.cancel.load(Ordering::Acquire)
    }
}

enum LoopExit {
    Completed,
    Cancelled,
}

/// One generation session running on its own thread.
pub struct GenerationWorker {
    session: SessionId,
    params: SessionParams,
    shared: Arc<WorkerShared>,
    thread: ThreadId,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl GenerationWorker {
    /// Spawns the worker thread and returns immediately.
    pub fn start(
        session: SessionId,
        params: SessionParams,
        factory: Arc<dyn SourceFactory>,
        store: Arc<dyn ContactStore>,
        observers: Observers,
        hooks: Arc<dyn WorkerHooks>,
    ) -> Result<Self, CoordinatorError> {
        let shared = Arc::new(WorkerShared {
            state: AtomicU8::new(WorkerState::Running.as_u8()),
            cancel: AtomicBool::new(false),
            stats: StatsCell::new(params),
            progress: SinkSlot::new(observers.progress),
            result: SinkSlot::new(observers.result),
            done: Completion::default(),
        });

        let thread_shared = Arc::clone(&shared);
        let handle = thread::Builder::new()
            .name(format!("contactgen-worker-{}", session.simple()))
            .spawn(move || run_session(session, params, factory, store, thread_shared, hooks))
            .inspect_err(|_| shared.set_state(WorkerState::Finished))?;

        Ok(Self {
            session,
            params,
            shared,
            thread: handle.thread().id(),
            handle: Mutex::new(Some(handle)),
        })
    }

    pub fn session(&self) -> SessionId {
        self.session
    }

    pub fn params(&self) -> SessionParams {
        self.params
    }

    pub fn state(&self) -> WorkerState {
        self.shared.state()
    }

    pub fn is_finished(&self) -> bool {
        self.state() == WorkerState::Finished
    }

    pub fn stats(&self) -> GenerationStats {
        self.shared.stats.snapshot()
    }

    /// Asks the loop to stop before its next record. Idempotent.
    pub fn request_cancel(&self) {
        self.shared.cancel.store(true, Ordering::Release);
        let _ = self.shared.state.compare_exchange(
            WorkerState::Running.as_u8(),
            WorkerState::CancelRequested.as_u8(),
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    pub fn replace_progress_sink(&self, sink: Option<Arc<dyn ProgressSink>>) {
        self.shared.progress.replace(sink);
    }

    pub fn replace_result_sink(&self, sink: Option<Arc<dyn ResultSink>>) {
        self.shared.result.replace(sink);
    }

    /// Drops both observers; later events from this session go nowhere.
    pub fn detach_observers(&self) {
        self.replace_progress_sink(None);
        self.replace_result_sink(None);
    }

    /// True when called from inside one of this worker's observer callbacks.
    pub fn on_worker_thread(&self) -> bool {
        self.thread == thread::current().id()
    }

    /// Waits up to `timeout` for the session to finish delivering its result.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        self.shared.done.wait_timeout(timeout)
    }

    /// Joins the worker thread. A no-op when called from the worker thread
    /// itself (an observer callback) or when already joined.
    pub fn join(&self) {
        let handle = self
            .handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(handle) = handle else {
            return;
        };
        if self.on_worker_thread() {
            debug!(session = %self.session, "join requested from worker thread, skipping");
            return;
        }
        if handle.join().is_err() {
            warn!(session = %self.session, "worker thread panicked outside the session loop");
        }
    }
}

fn run_session(
    session: SessionId,
    params: SessionParams,
    factory: Arc<dyn SourceFactory>,
    store: Arc<dyn ContactStore>,
    shared: Arc<WorkerShared>,
    hooks: Arc<dyn WorkerHooks>,
) {
    info!(
        session = %session,
        requested = params.requested,
        gender = %params.gender,
        with_photos = params.with_photos,
        "generation started"
    );

    let outcome = catch_unwind(AssertUnwindSafe(|| {
        drive(session, params, factory.as_ref(), store.as_ref(), &shared, hooks.as_ref())
    }));

    let (forced, error) = match outcome {
        Ok(Ok(LoopExit::Completed)) => (false, None),
        Ok(Ok(LoopExit::Cancelled)) => (true, None),
        Ok(Err(err)) => {
            warn!(session = %session, error = %err, "generation aborted");
            (false, Some(err.to_string()))
        }
        Err(panic) => {
            let message = panic_message(panic);
            warn!(session = %session, panic = %message, "generation panicked");
            (false, Some(message))
        }
    };

    let stats = shared.stats.finish();
    let outcome = SessionOutcome {
        session,
        requested: params.requested,
        generated: stats.generated,
        forced,
        error,
        stats,
    };

    info!(
        session = %session,
        requested = outcome.requested,
        generated = outcome.generated,
        failed_persists = outcome.stats.failed_persists,
        forced,
        "generation finished"
    );

    hooks.on_finished(&outcome);

    match shared.result.get() {
        Some(sink) => {
            let delivered = catch_unwind(AssertUnwindSafe(|| sink.on_result(&outcome)));
            if delivered.is_err() {
                warn!(session = %session, "result observer panicked");
            }
        }
        None => warn!(session = %session, "no result observer attached, result dropped"),
    }

    shared.set_state(WorkerState::Finished);
    shared.progress.replace(None);
    shared.result.replace(None);
    shared.done.complete();
}

fn drive(
    session: SessionId,
    params: SessionParams,
    factory: &dyn SourceFactory,
    store: &dyn ContactStore,
    shared: &WorkerShared,
    hooks: &dyn WorkerHooks,
) -> Result<LoopExit, GenerationError> {
    let mut source = factory.create(params.with_photos)?;

    for step in 1..=params.requested {
        if shared.cancel_requested() {
            debug!(session = %session, step, "cancellation observed");
            return Ok(LoopExit::Cancelled);
        }

        let record = Arc::new(source.next_record(params.gender)?);
        let generated = match store.persist(&record) {
            Ok(()) => shared.stats.record_persisted(record.gender()),
            Err(err) => {
                shared.stats.record_failed();
                warn!(session = %session, step, error = %err, "persist failed, record skipped");
                shared.stats.generated()
            }
        };
        hooks.on_record(session, &record);

        let event = ProgressEvent {
            session,
            progress: step as f64 / params.requested as f64,
            step,
            generated,
            record,
        };
        if let Some(sink) = shared.progress.get() {
            sink.on_progress(&event);
        }
    }

    Ok(LoopExit::Completed)
}

pub(crate) fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "worker panicked".to_string()
    }
}
