use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use contactgen_core::{ContactStore, DEFAULT_MARKER, GenderFilter, GenerationStats, Record};
use contactgen_generate::SourceFactory;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::deletion::{DeletionOutcome, DeletionTask};
use crate::indicator::{ActivityIndicator, NoopIndicator};
use crate::sink::{ProgressSink, ResultSink, SessionId, SessionOutcome};
use crate::worker::{GenerationWorker, Observers, SessionParams, WorkerHooks};

/// Tunables for a [`GenerationCoordinator`].
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Email domain matched by bulk deletion.
    pub marker: String,
    pub deletion_batch_size: usize,
    /// Upper bound on waiting for a background unit to stop, both when a new
    /// session replaces a running one and at shutdown.
    pub shutdown_grace: Duration,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            marker: DEFAULT_MARKER.to_string(),
            deletion_batch_size: 50,
            shutdown_grace: Duration::from_secs(5),
        }
    }
}

#[derive(Default)]
struct SessionState {
    worker: Option<Arc<GenerationWorker>>,
    /// Session being cancelled by `generate` or `shutdown`; its result is
    /// still accepted while no worker is active.
    retiring: Option<SessionId>,
    progress: Option<Arc<dyn ProgressSink>>,
    result: Option<Arc<dyn ResultSink>>,
    last_record: Option<Arc<Record>>,
    last_outcome: Option<SessionOutcome>,
    force_stopped: bool,
    deletion: Option<DeletionTask>,
    last_deletion: Option<DeletionOutcome>,
    shut_down: bool,
}

impl SessionState {
    fn is_active(&self, session: SessionId) -> bool {
        self.worker
            .as_ref()
            .is_some_and(|worker| worker.session() == session)
    }
}

struct Inner {
    config: CoordinatorConfig,
    factory: Arc<dyn SourceFactory>,
    store: Arc<dyn ContactStore>,
    indicator: Arc<dyn ActivityIndicator>,
    runtime: Handle,
    generate_lock: Mutex<()>,
    state: Mutex<SessionState>,
    stop_tx: watch::Sender<bool>,
}

impl Inner {
    fn lock_state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Owns the single generation session and the single deletion task of a
/// process, and exposes them to any number of observers.
///
/// Cloning yields another handle to the same coordinator.
#[derive(Clone)]
pub struct GenerationCoordinator {
    inner: Arc<Inner>,
}

impl GenerationCoordinator {
    pub fn new(
        config: CoordinatorConfig,
        factory: Arc<dyn SourceFactory>,
        store: Arc<dyn ContactStore>,
        runtime: Handle,
    ) -> Self {
        let (stop_tx, _) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                config,
                factory,
                store,
                indicator: Arc::new(NoopIndicator),
                runtime,
                generate_lock: Mutex::new(()),
                state: Mutex::new(SessionState::default()),
                stop_tx,
            }),
        }
    }

    /// Replaces the activity indicator. Only valid before the handle is
    /// cloned; later calls are ignored with a warning.
    pub fn with_indicator(mut self, indicator: Arc<dyn ActivityIndicator>) -> Self {
        match Arc::get_mut(&mut self.inner) {
            Some(inner) => inner.indicator = indicator,
            None => warn!("coordinator already shared, indicator not replaced"),
        }
        self
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.inner.config
    }

    /// Starts a new session, cancelling any running one first.
    ///
    /// Returns `false` without side effects when either observer is missing.
    pub fn generate(&self, requested: u64, with_photos: bool, gender: GenderFilter) -> bool {
        let _serial = self
            .inner
            .generate_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let previous = {
            let mut state = self.inner.lock_state();
            if state.shut_down {
                warn!("cannot generate, coordinator shut down");
                return false;
            }
            if state.progress.is_none() || state.result.is_none() {
                error!("cannot generate, no observers attached");
                return false;
            }
            let previous = state.worker.take();
            state.retiring = previous.as_ref().map(|worker| worker.session());
            previous
        };

        if let Some(previous) = previous {
            warn!(
                previous = %previous.session(),
                "already generating, cancelling previous session"
            );
            self.retire(&previous);
        }

        let mut state = self.inner.lock_state();
        state.retiring = None;
        let (Some(progress), Some(result)) = (state.progress.clone(), state.result.clone()) else {
            error!("cannot generate, observers detached while stopping previous session");
            return false;
        };

        let session = Uuid::new_v4();
        let params = SessionParams {
            requested,
            with_photos,
            gender,
        };
        info!(
            session = %session,
            requested,
            gender = %gender,
            with_photos,
            "starting generate sequence"
        );

        let hooks: Arc<dyn WorkerHooks> = Arc::new(CoordinatorHooks {
            inner: Arc::downgrade(&self.inner),
        });
        let worker = GenerationWorker::start(
            session,
            params,
            Arc::clone(&self.inner.factory),
            Arc::clone(&self.inner.store),
            Observers::new(progress, result),
            hooks,
        );

        match worker {
            Ok(worker) => {
                state.force_stopped = false;
                state.worker = Some(Arc::new(worker));
                self.inner.indicator.show(session, requested);
                true
            }
            Err(err) => {
                error!(error = %err, "failed to start generation worker");
                false
            }
        }
    }

    /// Cancels the running session, if any, and marks it force-stopped.
    pub fn stop_generating(&self) {
        let mut state = self.inner.lock_state();
        state.force_stopped = true;
        if let Some(worker) = &state.worker {
            info!(session = %worker.session(), "stop requested");
            worker.request_cancel();
        }
    }

    pub fn set_progress_observer(&self, sink: Option<Arc<dyn ProgressSink>>) {
        let mut state = self.inner.lock_state();
        if let Some(worker) = &state.worker {
            worker.replace_progress_sink(sink.clone());
        }
        state.progress = sink;
    }

    pub fn set_result_observer(&self, sink: Option<Arc<dyn ResultSink>>) {
        let mut state = self.inner.lock_state();
        if let Some(worker) = &state.worker {
            worker.replace_result_sink(sink.clone());
        }
        state.result = sink;
    }

    pub fn last_generated_record(&self) -> Option<Arc<Record>> {
        self.inner.lock_state().last_record.clone()
    }

    /// Live stats of the running session, or the final stats of the last one.
    pub fn stats(&self) -> Option<GenerationStats> {
        let state = self.inner.lock_state();
        match &state.worker {
            Some(worker) => Some(worker.stats()),
            None => state.last_outcome.as_ref().map(|outcome| outcome.stats.clone()),
        }
    }

    pub fn last_outcome(&self) -> Option<SessionOutcome> {
        self.inner.lock_state().last_outcome.clone()
    }

    pub fn is_generating(&self) -> bool {
        self.inner.lock_state().worker.is_some()
    }

    pub fn is_force_stopped(&self) -> bool {
        self.inner.lock_state().force_stopped
    }

    pub fn is_deleting(&self) -> bool {
        self.inner.lock_state().deletion.is_some()
    }

    pub fn last_deletion(&self) -> Option<DeletionOutcome> {
        self.inner.lock_state().last_deletion.clone()
    }

    /// Starts deleting every generated record. Returns `false` when a
    /// deletion is already running.
    pub fn start_deletion(&self) -> bool {
        let mut state = self.inner.lock_state();
        if state.shut_down {
            warn!("cannot delete, coordinator shut down");
            return false;
        }
        if state.deletion.is_some() {
            warn!("deletion already running, ignoring request");
            return false;
        }

        let weak = Arc::downgrade(&self.inner);
        let task = DeletionTask::start(
            &self.inner.runtime,
            Arc::clone(&self.inner.store),
            self.inner.config.marker.clone(),
            self.inner.config.deletion_batch_size,
            move |outcome| {
                if let Some(inner) = weak.upgrade() {
                    {
                        let mut state = inner.lock_state();
                        state.deletion = None;
                        state.last_deletion = Some(outcome);
                    }
                    inner.stop_tx.send_replace(true);
                }
            },
        );
        state.deletion = Some(task);
        true
    }

    pub fn stop_deletion(&self) {
        if let Some(task) = &self.inner.lock_state().deletion {
            info!("deletion stop requested");
            task.cancel();
        }
    }

    /// Receiver raised to `true` once a deletion run has finished and the
    /// hosting process should stop.
    pub fn stop_signal(&self) -> watch::Receiver<bool> {
        self.inner.stop_tx.subscribe()
    }

    /// Cancels all background units, waits at most `shutdown_grace` for each,
    /// and clears every observer reference. Blocking.
    pub fn shutdown(&self) {
        let grace = self.inner.config.shutdown_grace;
        let (worker, deletion) = {
            let mut state = self.inner.lock_state();
            if state.shut_down {
                return;
            }
            state.shut_down = true;
            state.progress = None;
            state.result = None;
            let worker = state.worker.take();
            state.retiring = worker.as_ref().map(|worker| worker.session());
            (worker, state.deletion.take())
        };
        info!(
            generating = worker.is_some(),
            deleting = deletion.is_some(),
            "coordinator shutting down"
        );

        if let Some(worker) = worker {
            self.retire(&worker);
            self.inner.indicator.hide();
        }
        if let Some(deletion) = deletion {
            deletion.cancel();
            if !deletion.wait_timeout(grace) {
                warn!(grace_ms = grace.as_millis() as u64, "abandoning deletion task");
            }
        }

        let mut state = self.inner.lock_state();
        state.retiring = None;
        state.last_record = None;
    }

    /// Cancels `worker` and waits for its terminal result, abandoning it
    /// after the grace period.
    fn retire(&self, worker: &GenerationWorker) {
        let grace = self.inner.config.shutdown_grace;
        worker.request_cancel();
        if worker.on_worker_thread() {
            debug!(session = %worker.session(), "retired from its own callback");
            return;
        }
        if worker.wait_timeout(grace) {
            worker.join();
        } else {
            warn!(
                session = %worker.session(),
                grace_ms = grace.as_millis() as u64,
                "worker did not stop in time, abandoning it"
            );
            worker.detach_observers();
        }
    }
}

struct CoordinatorHooks {
    inner: Weak<Inner>,
}

impl WorkerHooks for CoordinatorHooks {
    fn on_record(&self, session: SessionId, record: &Arc<Record>) {
        let Some(inner) = self.inner.upgrade() else {
            return;
        };
        let mut state = inner.lock_state();
        if state.is_active(session) {
            state.last_record = Some(Arc::clone(record));
        }
    }

    fn on_finished(&self, outcome: &SessionOutcome) {
        let Some(inner) = self.inner.upgrade() else {
            return;
        };
        let mut state = inner.lock_state();
        let active = state.is_active(outcome.session);
        let retiring = state.worker.is_none() && state.retiring == Some(outcome.session);
        if !active && !retiring {
            debug!(session = %outcome.session, "stale session finished, outcome ignored");
            return;
        }
        if active {
            state.worker = None;
        }
        state.last_outcome = Some(outcome.clone());
        drop(state);

        info!(
            session = %outcome.session,
            forced = outcome.forced,
            "generation {}finished",
            if outcome.forced { "force-" } else { "" }
        );
        inner.indicator.hide();
    }
}
