use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use tracing::debug;

use crate::errors::GenerationError;

#[derive(Debug, Clone)]
enum AssetEntry {
    Lines(Vec<String>),
    Missing,
}

/// Reads line-oriented corpus files from a root directory, caching each file
/// after the first read.
#[derive(Debug)]
pub struct AssetsLoader {
    root: PathBuf,
    cache: RwLock<BTreeMap<String, AssetEntry>>,
}

impl AssetsLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            cache: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the non-empty, non-comment lines of `relative`, or `None` when
    /// the file does not exist.
    pub fn load_lines(&self, relative: &str) -> Result<Option<Vec<String>>, GenerationError> {
        if let Some(entry) = self.cached(relative)? {
            return Ok(entry_values(entry));
        }

        let path = self.root.join(relative);
        let entry = read_lines(&path)?;
        debug!(path = %path.display(), missing = matches!(entry, AssetEntry::Missing), "asset loaded");

        let mut cache = self
            .cache
            .write()
            .map_err(|_| GenerationError::CachePoisoned)?;
        cache.insert(relative.to_string(), entry.clone());

        Ok(entry_values(entry))
    }

    fn cached(&self, relative: &str) -> Result<Option<AssetEntry>, GenerationError> {
        let cache = self.cache.read().map_err(|_| GenerationError::CachePoisoned)?;
        Ok(cache.get(relative).cloned())
    }
}

fn entry_values(entry: AssetEntry) -> Option<Vec<String>> {
    match entry {
        AssetEntry::Lines(values) => Some(values),
        AssetEntry::Missing => None,
    }
}

fn read_lines(path: &Path) -> Result<AssetEntry, GenerationError> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return Ok(AssetEntry::Missing);
        }
        Err(err) => {
            return Err(GenerationError::DataSource(format!(
                "failed to read asset {}: {}",
                path.display(),
                err
            )));
        }
    };

    let values = contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect();

    Ok(AssetEntry::Lines(values))
}
