#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use contactgen_core::{ContactStore, MemoryContactStore, Record, StoreError, StoreResult};
use contactgen_generate::{GeneratorFactory, NameCorpus};
use contactgen_service::{ProgressEvent, SessionOutcome};

pub fn factory() -> Arc<GeneratorFactory> {
    Arc::new(GeneratorFactory::new(NameCorpus::builtin()).with_seed(Some(17)))
}

pub fn memory_store() -> Arc<MemoryContactStore> {
    Arc::new(MemoryContactStore::new())
}

/// Everything an observer saw, in delivery order.
#[derive(Debug, Clone)]
pub enum Seen {
    Progress(ProgressEvent),
    Result(SessionOutcome),
}

#[derive(Debug, Default)]
pub struct Recorder {
    seen: Mutex<Vec<Seen>>,
}

impl Recorder {
    pub fn push(&self, seen: Seen) {
        self.seen.lock().expect("recorder lock").push(seen);
    }

    pub fn snapshot(&self) -> Vec<Seen> {
        self.seen.lock().expect("recorder lock").clone()
    }

    pub fn progress(&self) -> Vec<ProgressEvent> {
        self.snapshot()
            .into_iter()
            .filter_map(|seen| match seen {
                Seen::Progress(event) => Some(event),
                Seen::Result(_) => None,
            })
            .collect()
    }

    pub fn results(&self) -> Vec<SessionOutcome> {
        self.snapshot()
            .into_iter()
            .filter_map(|seen| match seen {
                Seen::Result(outcome) => Some(outcome),
                Seen::Progress(_) => None,
            })
            .collect()
    }

    /// Polls until `predicate` holds or `timeout` elapses.
    pub fn wait_until(&self, timeout: Duration, predicate: impl Fn(&[Seen]) -> bool) -> bool {
        let deadline = std::time::Instant::now() + timeout;
        while std::time::Instant::now() < deadline {
            if predicate(&self.snapshot()) {
                return true;
            }
            std::thread::sleep(Duration::from_millis(2));
        }
        predicate(&self.snapshot())
    }
}

/// Store that rejects every `nth` persist and can slow down deletion.
#[derive(Debug, Default)]
pub struct FlakyStore {
    inner: MemoryContactStore,
    reject_every: usize,
    persists: AtomicUsize,
    delete_delay: Duration,
    fail_deletes: bool,
    panic_on_delete: bool,
}

impl FlakyStore {
    pub fn rejecting_every(nth: usize) -> Self {
        Self {
            reject_every: nth,
            ..Self::default()
        }
    }

    pub fn with_records(records: Vec<Record>, delete_delay: Duration) -> Self {
        Self {
            inner: MemoryContactStore::with_records(records),
            delete_delay,
            ..Self::default()
        }
    }

    pub fn failing_deletes() -> Self {
        Self {
            fail_deletes: true,
            ..Self::default()
        }
    }

    pub fn panicking_deletes(records: Vec<Record>) -> Self {
        Self {
            inner: MemoryContactStore::with_records(records),
            panic_on_delete: true,
            ..Self::default()
        }
    }
}

impl ContactStore for FlakyStore {
    fn persist(&self, record: &Record) -> StoreResult<()> {
        let count = self.persists.fetch_add(1, Ordering::SeqCst) + 1;
        if self.reject_every > 0 && count % self.reject_every == 0 {
            return Err(StoreError::Rejected(format!("persist #{count}")));
        }
        self.inner.persist(record)
    }

    fn delete_marked(&self, marker: &str, limit: usize) -> StoreResult<usize> {
        if self.fail_deletes {
            return Err(StoreError::Unavailable("contacts provider offline".to_string()));
        }
        if self.panic_on_delete {
            panic!("contacts provider crashed mid-batch");
        }
        std::thread::sleep(self.delete_delay);
        self.inner.delete_marked(marker, limit)
    }

    fn len(&self) -> StoreResult<usize> {
        self.inner.len()
    }
}

pub fn marked_records(count: usize, marker: &str) -> Vec<Record> {
    (0..count)
        .map(|idx| {
            Record::new(
                format!("Generated {idx}"),
                "555-0100",
                format!("generated{idx}@{marker}"),
                contactgen_core::Gender::Male,
                None,
            )
        })
        .collect()
}

pub fn assert_progress_steps(events: &[ProgressEvent], requested: u64) {
    for (idx, event) in events.iter().enumerate() {
        let step = idx as u64 + 1;
        assert_eq!(event.step, step);
        let expected = step as f64 / requested as f64;
        assert!(
            (event.progress - expected).abs() < 1e-9,
            "step {step}: progress {} != {expected}",
            event.progress
        );
        assert!(event.progress <= 1.0);
    }
}
