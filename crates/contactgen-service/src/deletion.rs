use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use contactgen_core::ContactStore;
use tokio::runtime::Handle;
use tracing::{debug, error, info, warn};

use crate::completion::Completion;
use crate::worker::panic_message;

/// Result of a bulk deletion run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeletionOutcome {
    pub deleted: usize,
    pub cancelled: bool,
    pub error: Option<String>,
}

/// Deletes every record carrying a marker, batch by batch, on the tokio
/// blocking pool.
pub struct DeletionTask {
    cancel: Arc<AtomicBool>,
    done: Arc<Completion>,
}

impl DeletionTask {
    /// Starts the task; `on_done` runs on the task's thread once deletion
    /// stops, whether it succeeded, failed, or was cancelled.
    pub fn start<F>(
        runtime: &Handle,
        store: Arc<dyn ContactStore>,
        marker: String,
        batch_size: usize,
        on_done: F,
    ) -> Self
    where
        F: FnOnce(DeletionOutcome) + Send + 'static,
    {
        let cancel = Arc::new(AtomicBool::new(false));
        let done = Arc::new(Completion::default());
        let batch_size = batch_size.max(1);

        let task_cancel = Arc::clone(&cancel);
        let task_done = Arc::clone(&done);
        runtime.spawn_blocking(move || {
            info!(marker = %marker, batch_size, "deletion started");
            let mut outcome = DeletionOutcome {
                deleted: 0,
                cancelled: false,
                error: None,
            };
            let run = catch_unwind(AssertUnwindSafe(|| {
                delete_in_batches(store.as_ref(), &marker, batch_size, &task_cancel, &mut outcome)
            }));
            if let Err(panic) = run {
                let message = panic_message(panic);
                warn!(panic = %message, deleted = outcome.deleted, "deletion panicked");
                outcome.error = Some(message);
            }
            info!(
                deleted = outcome.deleted,
                cancelled = outcome.cancelled,
                failed = outcome.error.is_some(),
                "deletion finished"
            );
            on_done(outcome);
            task_done.complete();
        });

        Self { cancel, done }
    }

    /// Stops the task before its next batch. Idempotent.
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::Release);
    }

    pub fn is_finished(&self) -> bool {
        self.done.is_complete()
    }

    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        self.done.wait_timeout(timeout)
    }
}

/// Runs batches until the store reports nothing left, an error, or a
/// cancellation. Progress is written into `outcome` as it happens so a panic
/// mid-run still leaves the count of removed records.
fn delete_in_batches(
    store: &dyn ContactStore,
    marker: &str,
    batch_size: usize,
    cancel: &AtomicBool,
    outcome: &mut DeletionOutcome,
) {
    loop {
        if cancel.load(Ordering::Acquire) {
            outcome.cancelled = true;
            return;
        }
        match store.delete_marked(marker, batch_size) {
            Ok(0) => return,
            Ok(removed) => {
                outcome.deleted += removed;
                debug!(removed, total = outcome.deleted, "deletion batch done");
            }
            Err(err) => {
                error!(error = %err, deleted = outcome.deleted, "deletion failed");
                outcome.error = Some(err.to_string());
                return;
            }
        }
    }
}
