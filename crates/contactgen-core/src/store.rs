use std::sync::Mutex;

use crate::error::{StoreError, StoreResult};
use crate::record::Record;

/// External contact-store collaborator.
///
/// Implementations must be shareable across the generation worker thread and
/// the deletion task.
pub trait ContactStore: Send + Sync {
    /// Persists one record.
    fn persist(&self, record: &Record) -> StoreResult<()>;

    /// Deletes at most `limit` records carrying `marker`, returning how many
    /// were removed. Zero means nothing is left to delete.
    fn delete_marked(&self, marker: &str, limit: usize) -> StoreResult<usize>;

    /// Number of records currently stored.
    fn len(&self) -> StoreResult<usize>;

    fn is_empty(&self) -> StoreResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Deletes every record carrying `marker` in one call.
    fn delete_all_marked(&self, marker: &str) -> StoreResult<usize> {
        let mut total = 0;
        loop {
            let removed = self.delete_marked(marker, usize::MAX)?;
            if removed == 0 {
                return Ok(total);
            }
            total += removed;
        }
    }
}

/// In-process store, used by tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryContactStore {
    records: Mutex<Vec<Record>>,
}

impl MemoryContactStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: Vec<Record>) -> Self {
        Self {
            records: Mutex::new(records),
        }
    }

    /// Copy of the stored records, in insertion order.
    pub fn records(&self) -> StoreResult<Vec<Record>> {
        Ok(self.lock()?.clone())
    }

    fn lock(&self) -> StoreResult<std::sync::MutexGuard<'_, Vec<Record>>> {
        self.records
            .lock()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".to_string()))
    }
}

impl ContactStore for MemoryContactStore {
    fn persist(&self, record: &Record) -> StoreResult<()> {
        self.lock()?.push(record.clone());
        Ok(())
    }

    fn delete_marked(&self, marker: &str, limit: usize) -> StoreResult<usize> {
        let mut records = self.lock()?;
        let mut removed = 0;
        records.retain(|record| {
            if removed < limit && record.has_marker(marker) {
                removed += 1;
                false
            } else {
                true
            }
        });
        Ok(removed)
    }

    fn len(&self) -> StoreResult<usize> {
        Ok(self.lock()?.len())
    }
}
