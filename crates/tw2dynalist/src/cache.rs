//! File-backed set of processed bookmark IDs.
//!
//! The file is a flat JSON object mapping tweet IDs to `true`. Files written
//! by older versions nest the same map under a `processed_tweets` key; both
//! shapes load to the same set.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info};

/// Cache persistence errors.
#[derive(Debug, Error)]
pub enum CacheError {
    /// Reading or writing the cache file failed
    #[error("cache file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The cache file is not valid JSON in either supported shape
    #[error("failed to parse cache file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// On-disk shapes accepted when loading.
#[derive(Deserialize)]
#[serde(untagged)]
enum CacheFile {
    Legacy {
        processed_tweets: HashMap<String, bool>,
    },
    Flat(HashMap<String, bool>),
}

impl CacheFile {
    fn into_processed(self) -> HashSet<String> {
        let entries = match self {
            Self::Legacy { processed_tweets } => processed_tweets,
            Self::Flat(entries) => entries,
        };

        entries
            .into_iter()
            .filter_map(|(id, done)| done.then_some(id))
            .collect()
    }
}

/// Tracks processed tweet IDs to avoid forwarding a bookmark twice.
#[derive(Debug)]
pub struct ProcessedCache {
    path: PathBuf,
    processed: Mutex<HashSet<String>>,
}

impl ProcessedCache {
    /// Open the cache at `path`, creating the parent directory if needed.
    ///
    /// A missing or blank file yields an empty cache.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, CacheError> {
        let path = path.into();
        let io_err = |source| CacheError::Io {
            path: path.clone(),
            source,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }

        let processed = match std::fs::read_to_string(&path) {
            Ok(content) if content.trim().is_empty() => HashSet::new(),
            Ok(content) => serde_json::from_str::<CacheFile>(&content)
                .map_err(|source| CacheError::Parse {
                    path: path.clone(),
                    source,
                })?
                .into_processed(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "Cache file not found, starting empty");
                HashSet::new()
            }
            Err(e) => return Err(io_err(e)),
        };

        info!(
            path = %path.display(),
            entries = processed.len(),
            "Loaded processed bookmark cache"
        );

        Ok(Self {
            path,
            processed: Mutex::new(processed),
        })
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Check if a tweet ID has been processed.
    pub fn is_processed(&self, id: &str) -> bool {
        self.lock().contains(id)
    }

    /// Mark a tweet ID as processed. Not persisted until [`Self::save`].
    pub fn mark_processed(&self, id: &str) {
        self.lock().insert(id.to_string());
    }

    /// Write the current set to disk in the flat shape.
    pub fn save(&self) -> Result<(), CacheError> {
        let snapshot: BTreeMap<String, bool> =
            self.lock().iter().map(|id| (id.clone(), true)).collect();

        let content =
            serde_json::to_string_pretty(&snapshot).map_err(|e| CacheError::Io {
                path: self.path.clone(),
                source: std::io::Error::other(e),
            })?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| CacheError::Io {
                path: self.path.clone(),
                source,
            })?;
        }

        std::fs::write(&self.path, content).map_err(|source| CacheError::Io {
            path: self.path.clone(),
            source,
        })?;

        debug!(path = %self.path.display(), entries = snapshot.len(), "Saved cache");
        Ok(())
    }

    /// Number of processed IDs.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// IDs currently marked as processed.
    pub fn ids(&self) -> Vec<String> {
        self.lock().iter().cloned().collect()
    }

    // The set stays consistent even if a holder panicked.
    fn lock(&self) -> MutexGuard<'_, HashSet<String>> {
        self.processed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
