use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use contactgen_core::{ContactStore, Record, StoreError, StoreResult};

use super::atomic::write_bytes_atomic;

/// Contact store backed by a newline-delimited JSON file.
///
/// Appends are written straight to the file; deletions rewrite it atomically.
pub struct JsonContactStore {
    path: PathBuf,
    state: Mutex<StoreState>,
}

struct StoreState {
    records: Vec<Record>,
    /// `None` after a rewrite whose reopen failed; the next persist retries.
    appender: Option<File>,
}

impl JsonContactStore {
    pub fn open(path: impl Into<PathBuf>) -> StoreResult<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let records = read_records(&path)?;
        let appender = open_appender(&path)?;
        tracing::debug!(path = %path.display(), records = records.len(), "contact store opened");
        Ok(Self {
            path,
            state: Mutex::new(StoreState {
                records,
                appender: Some(appender),
            }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, StoreState>> {
        self.state
            .lock()
            .map_err(|_| StoreError::Unavailable("contact store lock poisoned".to_string()))
    }
}

impl ContactStore for JsonContactStore {
    fn persist(&self, record: &Record) -> StoreResult<()> {
        let mut line =
            serde_json::to_vec(record).map_err(|err| StoreError::Encoding(err.to_string()))?;
        line.push(b'\n');

        let mut state = self.lock()?;
        let appender = match state.appender.take() {
            Some(appender) => appender,
            None => open_appender(&self.path)?,
        };
        let appender = state.appender.insert(appender);
        appender.write_all(&line)?;
        appender.flush()?;
        state.records.push(record.clone());
        Ok(())
    }

    fn delete_marked(&self, marker: &str, limit: usize) -> StoreResult<usize> {
        let mut state = self.lock()?;
        let mut removed = 0;
        let mut kept = Vec::with_capacity(state.records.len());
        for record in &state.records {
            if removed < limit && record.has_marker(marker) {
                removed += 1;
            } else {
                kept.push(record.clone());
            }
        }

        if removed > 0 {
            let mut data = Vec::new();
            for record in &kept {
                serde_json::to_writer(&mut data, record)
                    .map_err(|err| StoreError::Encoding(err.to_string()))?;
                data.push(b'\n');
            }
            write_bytes_atomic(&self.path, &data)
                .map_err(|err| StoreError::Unavailable(err.to_string()))?;
            // The old handle points at the replaced file from here on.
            state.records = kept;
            state.appender = None;
            state.appender = Some(open_appender(&self.path)?);
        }
        Ok(removed)
    }

    fn len(&self) -> StoreResult<usize> {
        Ok(self.lock()?.records.len())
    }
}

fn open_appender(path: &Path) -> StoreResult<File> {
    Ok(OpenOptions::new().create(true).append(true).open(path)?)
}

fn read_records(path: &Path) -> StoreResult<Vec<Record>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let reader = BufReader::new(File::open(path)?);
    let mut records = Vec::new();
    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let record = serde_json::from_str(&line).map_err(|err| {
            StoreError::Encoding(format!("{}:{}: {err}", path.display(), index + 1))
        })?;
        records.push(record);
    }
    Ok(records)
}
