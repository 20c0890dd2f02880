use std::sync::{Condvar, Mutex, PoisonError};
use std::time::Duration;

/// One-shot latch set when a background unit has fully finished.
#[derive(Debug, Default)]
pub(crate) struct Completion {
    done: Mutex<bool>,
    cvar: Condvar,
}

impl Completion {
    pub(crate) fn complete(&self) {
        let mut done = self.done.lock().unwrap_or_else(PoisonError::into_inner);
        *done = true;
        self.cvar.notify_all();
    }

    pub(crate) fn is_complete(&self) -> bool {
        *self.done.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns `true` if the latch was set within `timeout`.
    pub(crate) fn wait_timeout(&self, timeout: Duration) -> bool {
        let done = self.done.lock().unwrap_or_else(PoisonError::into_inner);
        let (done, _) = self
            .cvar
            .wait_timeout_while(done, timeout, |done| !*done)
            .unwrap_or_else(PoisonError::into_inner);
        *done
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[test]
    fn wait_times_out_until_completed() {
        let latch = Arc::new(Completion::default());
        assert!(!latch.wait_timeout(Duration::from_millis(10)));

        let remote = Arc::clone(&latch);
        let handle = std::thread::spawn(move || remote.complete());
        assert!(latch.wait_timeout(Duration::from_secs(5)));
        assert!(latch.is_complete());
        handle.join().expect("join completer");
    }
}
