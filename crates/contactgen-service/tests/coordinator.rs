mod common;

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use contactgen_core::{ContactStore, GenderFilter, Record};
use contactgen_generate::{GenerationError, RecordSource, SourceFactory};
use contactgen_service::{
    ActivityIndicator, ChannelSink, CoordinatorConfig, GenerationCoordinator, ProgressEvent,
    ProgressSink, ResultSink, SessionEvent, SessionId, SessionOutcome,
};
use tokio::runtime::Runtime;

use common::{FlakyStore, Recorder, Seen, assert_progress_steps, factory, marked_records, memory_store};

const WAIT: Duration = Duration::from_secs(10);

fn runtime() -> Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .expect("build runtime")
}

fn coordinator(runtime: &Runtime, store: Arc<dyn ContactStore>) -> GenerationCoordinator {
    GenerationCoordinator::new(
        CoordinatorConfig::default(),
        factory(),
        store,
        runtime.handle().clone(),
    )
}

fn attach_recorder(coordinator: &GenerationCoordinator, recorder: &Arc<Recorder>) {
    let progress = Arc::clone(recorder);
    let result = Arc::clone(recorder);
    coordinator.set_progress_observer(Some(Arc::new(move |event: &ProgressEvent| {
        progress.push(Seen::Progress(event.clone()))
    })));
    coordinator.set_result_observer(Some(Arc::new(move |outcome: &SessionOutcome| {
        result.push(Seen::Result(outcome.clone()))
    })));
}

/// Drains a channel observer until the terminal result arrives.
fn drain_until_finished(
    rx: &mut tokio::sync::mpsc::UnboundedReceiver<SessionEvent>,
) -> (Vec<ProgressEvent>, SessionOutcome) {
    let mut progress = Vec::new();
    while let Some(event) = rx.blocking_recv() {
        match event {
            SessionEvent::Progress(event) => progress.push(event),
            SessionEvent::Finished(outcome) => return (progress, outcome),
        }
    }
    panic!("observer channel closed before the session finished");
}

#[test]
fn generate_without_observers_is_rejected() {
    let runtime = runtime();
    let store = memory_store();
    let coordinator = coordinator(&runtime, store.clone());

    for (requested, photos, gender) in [
        (0, false, GenderFilter::Any),
        (3, true, GenderFilter::Male),
        (1000, false, GenderFilter::Female),
    ] {
        assert!(!coordinator.generate(requested, photos, gender));
    }
    assert!(!coordinator.is_generating());
    assert!(coordinator.stats().is_none());

    let (sink, _rx) = ChannelSink::new();
    coordinator.set_progress_observer(Some(Arc::new(sink)));
    assert!(!coordinator.generate(3, false, GenderFilter::Any));
    assert!(!coordinator.is_generating());
    assert_eq!(store.len().expect("store len"), 0);
}

#[test]
fn channel_observer_receives_progress_then_result() {
    let runtime = runtime();
    let store = memory_store();
    let coordinator = coordinator(&runtime, store.clone());
    let (sink, mut rx) = ChannelSink::new();
    let sink = Arc::new(sink);
    coordinator.set_progress_observer(Some(sink.clone()));
    coordinator.set_result_observer(Some(sink));

    assert!(coordinator.generate(3, false, GenderFilter::Any));
    let (progress, outcome) = drain_until_finished(&mut rx);

    assert_eq!(progress.len(), 3);
    assert_progress_steps(&progress, 3);
    assert!((progress[0].progress - 0.333).abs() < 0.01);
    assert!((progress[1].progress - 0.667).abs() < 0.01);
    assert_eq!(progress[2].progress, 1.0);
    assert_eq!((outcome.requested, outcome.generated, outcome.forced), (3, 3, false));

    assert!(!coordinator.is_generating());
    assert!(!coordinator.is_force_stopped());
    let last = coordinator.last_generated_record().expect("last record");
    assert_eq!(last.as_ref(), progress[2].record.as_ref());
    let stats = coordinator.stats().expect("final stats");
    assert_eq!((stats.requested, stats.generated), (3, 3));
    assert_eq!(coordinator.last_outcome().map(|o| o.session), Some(outcome.session));
    assert_eq!(store.len().expect("store len"), 3);
}

#[test]
fn zero_requested_finishes_immediately() {
    let runtime = runtime();
    let coordinator = coordinator(&runtime, memory_store());
    let (sink, mut rx) = ChannelSink::new();
    let sink = Arc::new(sink);
    coordinator.set_progress_observer(Some(sink.clone()));
    coordinator.set_result_observer(Some(sink));

    assert!(coordinator.generate(0, false, GenderFilter::Any));
    let (progress, outcome) = drain_until_finished(&mut rx);
    assert!(progress.is_empty());
    assert_eq!((outcome.requested, outcome.generated, outcome.forced), (0, 0, false));
    assert!(coordinator.last_generated_record().is_none());
}

#[test]
fn stop_after_two_steps_reports_forced_result() {
    let runtime = runtime();
    let coordinator = coordinator(&runtime, memory_store());
    let recorder = Arc::new(Recorder::default());

    let controller = coordinator.clone();
    let progress_recorder = Arc::clone(&recorder);
    let progress: Arc<dyn ProgressSink> = Arc::new(move |event: &ProgressEvent| {
        progress_recorder.push(Seen::Progress(event.clone()));
        if event.step == 2 {
            controller.stop_generating();
            controller.stop_generating();
        }
    });
    let result_recorder = Arc::clone(&recorder);
    let result: Arc<dyn ResultSink> = Arc::new(move |outcome: &SessionOutcome| {
        result_recorder.push(Seen::Result(outcome.clone()));
    });
    coordinator.set_progress_observer(Some(progress));
    coordinator.set_result_observer(Some(result));

    assert!(coordinator.generate(5, false, GenderFilter::Any));
    assert!(recorder.wait_until(WAIT, |seen| {
        seen.iter().any(|s| matches!(s, Seen::Result(_)))
    }));

    assert_eq!(recorder.progress().len(), 2);
    let results = recorder.results();
    assert_eq!(results.len(), 1);
    assert_eq!(
        (results[0].requested, results[0].generated, results[0].forced),
        (5, 2, true)
    );
    assert!(coordinator.is_force_stopped());
    assert!(!coordinator.is_generating());

    coordinator.stop_generating();
    assert!(coordinator.is_force_stopped());
    assert_eq!(recorder.results().len(), 1);

    // Drop the observers that hold a handle back to the coordinator.
    coordinator.set_progress_observer(None);
    coordinator.set_result_observer(None);
}

#[test]
fn new_session_resets_force_stop_flag() {
    let runtime = runtime();
    let coordinator = coordinator(&runtime, memory_store());
    let recorder = Arc::new(Recorder::default());
    attach_recorder(&coordinator, &recorder);

    coordinator.stop_generating();
    assert!(coordinator.is_force_stopped());

    assert!(coordinator.generate(2, false, GenderFilter::Male));
    assert!(!coordinator.is_force_stopped());
    assert!(recorder.wait_until(WAIT, |seen| {
        seen.iter().any(|s| matches!(s, Seen::Result(_)))
    }));
    assert!(recorder.results()[0].is_complete());
}

#[test]
fn generate_while_running_cancels_previous_session_first() {
    let runtime = runtime();
    let coordinator = coordinator(&runtime, memory_store());
    let recorder = Arc::new(Recorder::default());

    let progress_recorder = Arc::clone(&recorder);
    let progress: Arc<dyn ProgressSink> = Arc::new(move |event: &ProgressEvent| {
        progress_recorder.push(Seen::Progress(event.clone()));
        std::thread::sleep(Duration::from_millis(1));
    });
    let result_recorder = Arc::clone(&recorder);
    let result: Arc<dyn ResultSink> = Arc::new(move |outcome: &SessionOutcome| {
        result_recorder.push(Seen::Result(outcome.clone()));
    });
    coordinator.set_progress_observer(Some(progress));
    coordinator.set_result_observer(Some(result));

    assert!(coordinator.generate(100_000, false, GenderFilter::Any));
    assert!(recorder.wait_until(WAIT, |seen| seen.len() >= 3));

    assert!(coordinator.generate(3, false, GenderFilter::Any));
    assert!(recorder.wait_until(WAIT, |seen| {
        seen.iter()
            .filter(|s| matches!(s, Seen::Result(_)))
            .count()
            == 2
    }));

    let seen = recorder.snapshot();
    let sessions: Vec<SessionId> = seen
        .iter()
        .map(|s| match s {
            Seen::Progress(event) => event.session,
            Seen::Result(outcome) => outcome.session,
        })
        .collect();
    let first = sessions[0];
    let switch = sessions
        .iter()
        .position(|session| *session != first)
        .expect("second session events");
    assert!(sessions[..switch].iter().all(|s| *s == first));
    assert!(sessions[switch..].iter().all(|s| *s != first));

    let Seen::Result(previous) = &seen[switch - 1] else {
        panic!("previous session must end with its result before the next starts");
    };
    assert!(previous.forced);
    assert!(previous.generated < previous.requested);

    let results = recorder.results();
    assert_eq!(
        (results[1].requested, results[1].generated, results[1].forced),
        (3, 3, false)
    );
    assert!(!coordinator.is_generating());
}

#[test]
fn rebinding_observers_keeps_in_flight_progress() {
    let runtime = runtime();
    let coordinator = coordinator(&runtime, memory_store());
    let first = Arc::new(Recorder::default());

    let first_progress = Arc::clone(&first);
    coordinator.set_progress_observer(Some(Arc::new(move |event: &ProgressEvent| {
        first_progress.push(Seen::Progress(event.clone()));
        std::thread::sleep(Duration::from_millis(1));
    })));
    let first_result = Arc::clone(&first);
    coordinator.set_result_observer(Some(Arc::new(move |outcome: &SessionOutcome| {
        first_result.push(Seen::Result(outcome.clone()));
    })));

    assert!(coordinator.generate(200, false, GenderFilter::Any));
    assert!(first.wait_until(WAIT, |seen| !seen.is_empty()));

    let (sink, mut rx) = ChannelSink::new();
    let sink = Arc::new(sink);
    coordinator.set_progress_observer(Some(sink.clone()));
    coordinator.set_result_observer(Some(sink));

    let (progress, outcome) = drain_until_finished(&mut rx);
    assert!(first.results().is_empty());
    assert_eq!((outcome.requested, outcome.generated, outcome.forced), (200, 200, false));

    let mut steps: Vec<u64> = first.progress().iter().map(|event| event.step).collect();
    steps.extend(progress.iter().map(|event| event.step));
    assert_eq!(steps, (1..=200).collect::<Vec<_>>());
}

#[derive(Default)]
struct RecordingIndicator {
    shown: AtomicUsize,
    hidden: AtomicUsize,
    visible: AtomicBool,
    sessions: Mutex<Vec<SessionId>>,
}

impl ActivityIndicator for RecordingIndicator {
    fn show(&self, session: SessionId, _requested: u64) {
        self.shown.fetch_add(1, Ordering::SeqCst);
        self.visible.store(true, Ordering::SeqCst);
        self.sessions.lock().expect("indicator lock").push(session);
    }

    fn hide(&self) {
        self.hidden.fetch_add(1, Ordering::SeqCst);
        self.visible.store(false, Ordering::SeqCst);
    }
}

#[test]
fn indicator_tracks_generating_state() {
    let runtime = runtime();
    let indicator = Arc::new(RecordingIndicator::default());
    let coordinator =
        coordinator(&runtime, memory_store()).with_indicator(indicator.clone());
    let (sink, mut rx) = ChannelSink::new();
    let sink = Arc::new(sink);
    coordinator.set_progress_observer(Some(sink.clone()));
    coordinator.set_result_observer(Some(sink));

    assert!(coordinator.generate(5, false, GenderFilter::Any));
    let (_, outcome) = drain_until_finished(&mut rx);

    assert_eq!(indicator.shown.load(Ordering::SeqCst), 1);
    assert!(indicator.hidden.load(Ordering::SeqCst) >= 1);
    assert!(!indicator.visible.load(Ordering::SeqCst));
    assert_eq!(
        indicator.sessions.lock().expect("indicator lock").as_slice(),
        &[outcome.session]
    );
}

type Gate = Arc<(Mutex<bool>, Condvar)>;

/// Hands out sources whose first one blocks until the gate opens.
struct GatedFactory {
    created: AtomicUsize,
    gate: Gate,
}

struct GatedSource {
    inner: Box<dyn RecordSource>,
    gate: Option<Gate>,
}

impl RecordSource for GatedSource {
    fn next_record(&mut self, filter: GenderFilter) -> Result<Record, GenerationError> {
        if let Some(gate) = &self.gate {
            let (lock, cvar) = &**gate;
            let mut open = lock.lock().expect("gate lock");
            while !*open {
                open = cvar.wait(open).expect("gate lock");
            }
        }
        self.inner.next_record(filter)
    }
}

impl SourceFactory for GatedFactory {
    fn create(&self, with_photos: bool) -> Result<Box<dyn RecordSource>, GenerationError> {
        let first = self.created.fetch_add(1, Ordering::SeqCst) == 0;
        Ok(Box::new(GatedSource {
            inner: factory().create(with_photos)?,
            gate: first.then(|| Arc::clone(&self.gate)),
        }))
    }
}

#[test]
fn abandoned_session_finishing_late_does_not_replace_newer_outcome() {
    let runtime = runtime();
    let gate: Gate = Arc::new((Mutex::new(false), Condvar::new()));
    let indicator = Arc::new(RecordingIndicator::default());
    let coordinator = GenerationCoordinator::new(
        CoordinatorConfig {
            shutdown_grace: Duration::from_millis(50),
            ..CoordinatorConfig::default()
        },
        Arc::new(GatedFactory {
            created: AtomicUsize::new(0),
            gate: Arc::clone(&gate),
        }),
        memory_store(),
        runtime.handle().clone(),
    )
    .with_indicator(indicator.clone());
    let recorder = Arc::new(Recorder::default());
    attach_recorder(&coordinator, &recorder);

    assert!(coordinator.generate(3, false, GenderFilter::Any));
    // The first session is stuck inside its source, so it gets abandoned.
    assert!(coordinator.generate(2, false, GenderFilter::Any));
    assert!(recorder.wait_until(WAIT, |seen| {
        seen.iter().any(|seen| matches!(seen, Seen::Result(_)))
    }));
    let fresh = recorder.results()[0].clone();
    assert_eq!((fresh.requested, fresh.generated, fresh.forced), (2, 2, false));
    assert_eq!(indicator.hidden.load(Ordering::SeqCst), 1);

    {
        let (lock, cvar) = &*gate;
        *lock.lock().expect("gate lock") = true;
        cvar.notify_all();
    }
    std::thread::sleep(Duration::from_millis(200));

    let last = coordinator.last_outcome().expect("last outcome");
    assert_eq!(last.session, fresh.session);
    assert_eq!(recorder.results().len(), 1);
    assert_eq!(indicator.hidden.load(Ordering::SeqCst), 1);
    assert!(!coordinator.is_generating());
}

#[test]
fn shutdown_cancels_running_session_and_rejects_new_work() {
    let runtime = runtime();
    let coordinator = coordinator(&runtime, memory_store());
    let recorder = Arc::new(Recorder::default());

    let progress_recorder = Arc::clone(&recorder);
    coordinator.set_progress_observer(Some(Arc::new(move |event: &ProgressEvent| {
        progress_recorder.push(Seen::Progress(event.clone()));
        std::thread::sleep(Duration::from_millis(1));
    })));
    let result_recorder = Arc::clone(&recorder);
    coordinator.set_result_observer(Some(Arc::new(move |outcome: &SessionOutcome| {
        result_recorder.push(Seen::Result(outcome.clone()));
    })));

    assert!(coordinator.generate(100_000, false, GenderFilter::Any));
    assert!(recorder.wait_until(WAIT, |seen| !seen.is_empty()));

    coordinator.shutdown();

    assert!(!coordinator.is_generating());
    assert!(coordinator.last_generated_record().is_none());
    let results = recorder.results();
    assert_eq!(results.len(), 1);
    assert!(results[0].forced);
    assert!(!coordinator.generate(1, false, GenderFilter::Any));
    assert!(!coordinator.start_deletion());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn deletion_removes_marked_records_and_raises_stop_signal() {
    let mut records = marked_records(7, "example.com");
    records.extend(marked_records(2, "family.test"));
    let store = Arc::new(FlakyStore::with_records(records, Duration::from_millis(20)));
    let coordinator = GenerationCoordinator::new(
        CoordinatorConfig {
            deletion_batch_size: 3,
            ..CoordinatorConfig::default()
        },
        factory(),
        store.clone(),
        tokio::runtime::Handle::current(),
    );
    let mut stop = coordinator.stop_signal();

    assert!(coordinator.start_deletion());
    assert!(coordinator.is_deleting());
    assert!(!coordinator.start_deletion());

    tokio::time::timeout(WAIT, stop.wait_for(|stopped| *stopped))
        .await
        .expect("deletion finished in time")
        .expect("stop signal sender alive");

    assert!(!coordinator.is_deleting());
    let outcome = coordinator.last_deletion().expect("deletion outcome");
    assert_eq!(outcome.deleted, 7);
    assert!(!outcome.cancelled);
    assert!(outcome.error.is_none());
    assert_eq!(store.len().expect("store len"), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn deletion_errors_still_raise_stop_signal() {
    let coordinator = GenerationCoordinator::new(
        CoordinatorConfig::default(),
        factory(),
        Arc::new(FlakyStore::failing_deletes()),
        tokio::runtime::Handle::current(),
    );
    let mut stop = coordinator.stop_signal();

    assert!(coordinator.start_deletion());
    tokio::time::timeout(WAIT, stop.wait_for(|stopped| *stopped))
        .await
        .expect("deletion finished in time")
        .expect("stop signal sender alive");

    let outcome = coordinator.last_deletion().expect("deletion outcome");
    assert_eq!(outcome.deleted, 0);
    assert!(outcome.error.is_some());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stop_deletion_cancels_between_batches() {
    let total = 10;
    let store = Arc::new(FlakyStore::with_records(
        marked_records(total, "example.com"),
        Duration::from_millis(50),
    ));
    let coordinator = GenerationCoordinator::new(
        CoordinatorConfig {
            deletion_batch_size: 2,
            ..CoordinatorConfig::default()
        },
        factory(),
        store.clone(),
        tokio::runtime::Handle::current(),
    );
    let mut stop = coordinator.stop_signal();

    assert!(coordinator.start_deletion());
    tokio::time::timeout(WAIT, async {
        while store.len().expect("store len") == total {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("first batch deleted in time");
    coordinator.stop_deletion();
    coordinator.stop_deletion();

    tokio::time::timeout(WAIT, stop.wait_for(|stopped| *stopped))
        .await
        .expect("deletion stopped in time")
        .expect("stop signal sender alive");

    assert!(!coordinator.is_deleting());
    let outcome = coordinator.last_deletion().expect("deletion outcome");
    assert!(outcome.cancelled);
    assert!(outcome.error.is_none());
    assert!(outcome.deleted > 0 && outcome.deleted < total, "deleted {}", outcome.deleted);
    assert_eq!(store.len().expect("store len"), total - outcome.deleted);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn panicking_store_still_finishes_deletion() {
    let coordinator = GenerationCoordinator::new(
        CoordinatorConfig::default(),
        factory(),
        Arc::new(FlakyStore::panicking_deletes(marked_records(3, "example.com"))),
        tokio::runtime::Handle::current(),
    );
    let mut stop = coordinator.stop_signal();

    assert!(coordinator.start_deletion());
    tokio::time::timeout(WAIT, stop.wait_for(|stopped| *stopped))
        .await
        .expect("deletion finished in time")
        .expect("stop signal sender alive");

    assert!(!coordinator.is_deleting());
    let outcome = coordinator.last_deletion().expect("deletion outcome");
    assert_eq!(outcome.deleted, 0);
    assert!(!outcome.cancelled);
    let error = outcome.error.expect("panic reported as error");
    assert!(error.contains("crashed mid-batch"), "{error}");
}
