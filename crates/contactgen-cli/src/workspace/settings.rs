use std::path::PathBuf;
use std::time::Duration;

use contactgen_core::{DEFAULT_MARKER, GenderFilter};
use contactgen_service::CoordinatorConfig;
use serde::{Deserialize, Serialize};

use super::atomic::write_bytes_atomic;
use super::{AppPaths, WorkspaceError, WorkspaceResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Email domain stamped on generated contacts and matched by `delete`.
    pub marker_domain: String,
    /// Directory holding `male_names.txt`, `female_names.txt`, `surnames.txt`.
    pub assets_dir: Option<PathBuf>,
    /// Contact store file; defaults to `data/contacts.ndjson` under the home.
    pub store_path: Option<PathBuf>,
    pub deletion_batch_size: usize,
    pub shutdown_grace_ms: u64,
    pub default_gender: GenderFilter,
    pub default_photos: bool,
    pub seed: Option<u64>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            marker_domain: DEFAULT_MARKER.to_string(),
            assets_dir: None,
            store_path: None,
            deletion_batch_size: 50,
            shutdown_grace_ms: 5_000,
            default_gender: GenderFilter::Any,
            default_photos: false,
            seed: None,
        }
    }
}

impl Settings {
    pub fn store_path(&self, paths: &AppPaths) -> PathBuf {
        self.store_path
            .clone()
            .unwrap_or_else(|| paths.default_store_path())
    }

    pub fn coordinator_config(&self) -> CoordinatorConfig {
        CoordinatorConfig {
            marker: self.marker_domain.clone(),
            deletion_batch_size: self.deletion_batch_size,
            shutdown_grace: Duration::from_millis(self.shutdown_grace_ms),
        }
    }

    pub(crate) fn validate(&self) -> WorkspaceResult<()> {
        if self.marker_domain.trim().is_empty() || self.marker_domain.contains('@') {
            return Err(WorkspaceError::Invalid(format!(
                "marker_domain must be a bare domain, got '{}'",
                self.marker_domain
            )));
        }
        if self.deletion_batch_size == 0 {
            return Err(WorkspaceError::Invalid(
                "deletion_batch_size must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

pub fn load_or_create_settings(paths: &AppPaths) -> WorkspaceResult<Settings> {
    let path = paths.settings_path();
    if path.exists() {
        let content = std::fs::read_to_string(&path)?;
        let settings: Settings = toml::from_str(&content)?;
        settings.validate()?;
        return Ok(settings);
    }

    let settings = Settings::default();
    save_settings(paths, &settings)?;
    Ok(settings)
}

fn save_settings(paths: &AppPaths, settings: &Settings) -> WorkspaceResult<()> {
    let path = paths.settings_path();
    let encoded = toml::to_string_pretty(settings)?;
    write_bytes_atomic(&path, encoded.as_bytes())
}
