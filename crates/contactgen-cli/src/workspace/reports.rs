use std::path::PathBuf;

use chrono::{DateTime, Utc};
use contactgen_core::{GenderFilter, GenerationStats};
use contactgen_service::SessionOutcome;
use serde::{Deserialize, Serialize};

use super::atomic::write_json_atomic;
use super::{AppPaths, WorkspaceResult};

/// Summary of one `generate` invocation, written under `reports/`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionReport {
    pub session_id: String,
    pub marker: String,
    pub requested: u64,
    pub generated: u64,
    pub failed_persists: u64,
    pub forced: bool,
    pub error: Option<String>,
    pub gender: GenderFilter,
    pub with_photos: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl SessionReport {
    pub fn from_outcome(outcome: &SessionOutcome, marker: &str) -> Self {
        let GenerationStats {
            failed_persists,
            gender,
            with_photos,
            started_at,
            finished_at,
            ..
        } = outcome.stats.clone();
        Self {
            session_id: outcome.session.to_string(),
            marker: marker.to_string(),
            requested: outcome.requested,
            generated: outcome.generated,
            failed_persists,
            forced: outcome.forced,
            error: outcome.error.clone(),
            gender,
            with_photos,
            started_at,
            finished_at,
        }
    }
}

pub fn write_session_report(paths: &AppPaths, report: &SessionReport) -> WorkspaceResult<PathBuf> {
    let stamp = report.started_at.format("%Y%m%dT%H%M%SZ");
    let path = paths
        .reports_dir
        .join(format!("{stamp}__session_{}.json", report.session_id));
    write_json_atomic(&path, report)?;
    Ok(path)
}
