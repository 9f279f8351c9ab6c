//! The lock file: resolution decisions persisted between runs.
//!
//! A run reads the lock written by the previous run and writes a fresh one.
//! The two are kept apart: `old` is loaded once and only ever read, `new`
//! only ever receives entries and is what gets persisted. Entries the run did
//! not re-derive therefore stay distinguishable (see [`LockStore::stale_keys`]),
//! and packages dropped from the manifest fall out of the lock on their own.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Mutex, PoisonError};

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::registry::{Dist, Manifest, VersionManifest};
use crate::runtime::Runtime;

/// File name of the lock, relative to the project directory.
pub const LOCK_FILE: &str = "tiny-pm.yml";

/// Builds the resolution key `name@range` an edge is locked under.
pub fn resolution_key(name: &str, range: &str) -> String {
    format!("{}@{}", name, range)
}

/// One locked resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct LockEntry {
    pub version: String,
    pub url: String,
    pub shasum: String,
    #[serde(default)]
    pub dependencies: BTreeMap<String, String>,
}

impl LockEntry {
    pub fn new(version: impl Into<String>, manifest: &VersionManifest) -> Self {
        Self {
            version: version.into(),
            url: manifest.dist.tarball.clone(),
            shasum: manifest.dist.shasum.clone(),
            dependencies: manifest.dependencies(),
        }
    }

    /// Reshape the entry as a one-version manifest, the same shape the
    /// registry hands out.
    pub fn to_manifest(&self) -> Manifest {
        let dependencies = if self.dependencies.is_empty() {
            None
        } else {
            Some(self.dependencies.clone())
        };
        Manifest::single(
            self.version.clone(),
            VersionManifest {
                dependencies,
                dist: Dist {
                    shasum: self.shasum.clone(),
                    tarball: self.url.clone(),
                },
            },
        )
    }
}

pub type LockMap = BTreeMap<String, LockEntry>;

#[derive(Debug, Default)]
pub struct LockStore {
    old: LockMap,
    new: Mutex<LockMap>,
}

impl LockStore {
    /// A store with an empty old lock.
    pub fn new() -> Self {
        Self::default()
    }

    /// A store whose old lock is `entries`.
    pub fn from_entries(entries: LockMap) -> Self {
        Self {
            old: entries,
            new: Mutex::new(LockMap::new()),
        }
    }

    /// Load the old lock from `path`. A missing file yields an empty lock.
    #[tracing::instrument(skip(runtime))]
    pub fn try_load<R: Runtime>(runtime: &R, path: &Path) -> Result<Self, Error> {
        if !runtime.exists(path) {
            debug!("No lock file at {:?}, starting with an empty lock", path);
            return Ok(Self::new());
        }

        let content = runtime.read_to_string(path).map_err(|e| Error::LockRead {
            path: path.to_path_buf(),
            reason: format!("{:#}", e),
        })?;

        let entries = parse(&content).map_err(|e| Error::LockRead {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        debug!("Loaded {} lock entries from {:?}", entries.len(), path);
        Ok(Self::from_entries(entries))
    }

    /// Like [`LockStore::try_load`], but an unreadable lock degrades to an
    /// empty one and resolution falls back to the registry.
    pub fn load<R: Runtime>(runtime: &R, path: &Path) -> Self {
        Self::try_load(runtime, path).unwrap_or_else(|e| {
            warn!("{}; ignoring the existing lock", e);
            Self::new()
        })
    }

    /// Look up a key in the old lock.
    pub fn get(&self, key: &str) -> Option<&LockEntry> {
        self.old.get(key)
    }

    /// Record an entry in the new lock, overwriting any earlier one for `key`.
    /// Calling it twice with the same entry is harmless.
    pub fn put(&self, key: impl Into<String>, entry: LockEntry) {
        let mut new = self.new.lock().unwrap_or_else(PoisonError::into_inner);
        new.insert(key.into(), entry);
    }

    /// Copy of the entries recorded so far this run.
    pub fn snapshot(&self) -> LockMap {
        self.new
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Keys present in the old lock that this run has not recorded.
    pub fn stale_keys(&self) -> Vec<String> {
        let new = self.new.lock().unwrap_or_else(PoisonError::into_inner);
        self.old
            .keys()
            .filter(|key| !new.contains_key(*key))
            .cloned()
            .collect()
    }

    /// Serialize the new lock. Keys come out sorted.
    pub fn render(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(&self.snapshot())
    }

    /// Write the new lock to `path`.
    #[tracing::instrument(skip(self, runtime))]
    pub fn persist<R: Runtime>(&self, runtime: &R, path: &Path) -> Result<(), Error> {
        let stale = self.stale_keys();
        if !stale.is_empty() {
            debug!("Dropping {} stale lock entries: {:?}", stale.len(), stale);
        }

        let content = self.render().map_err(|e| Error::LockWrite {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        runtime
            .write(path, content.as_bytes())
            .map_err(|e| Error::LockWrite {
                path: path.to_path_buf(),
                reason: format!("{:#}", e),
            })?;

        debug!("Wrote lock file {:?}", path);
        Ok(())
    }
}

fn parse(content: &str) -> Result<LockMap, serde_yaml::Error> {
    if content.trim().is_empty() {
        return Ok(LockMap::new());
    }
    serde_yaml::from_str(content)
}
