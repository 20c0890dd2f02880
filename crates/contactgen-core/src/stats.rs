use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::record::GenderFilter;

/// Read-only snapshot of a generation session's counters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationStats {
    pub requested: u64,
    /// Records generated and persisted so far. Never exceeds `requested`.
    pub generated: u64,
    /// Records generated but rejected by the store (skipped).
    pub failed_persists: u64,
    pub males: u64,
    pub females: u64,
    pub with_photos: bool,
    pub gender: GenderFilter,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl GenerationStats {
    /// Fraction of the requested count that has been generated, in `[0, 1]`.
    pub fn completion(&self) -> f64 {
        if self.requested == 0 {
            return 1.0;
        }
        (self.generated as f64 / self.requested as f64).min(1.0)
    }

    pub fn is_finished(&self) -> bool {
        self.finished_at.is_some()
    }
}
