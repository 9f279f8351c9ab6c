//! The project's own `package.json`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::runtime::Runtime;

pub const MANIFEST_FILE: &str = "package.json";

/// The root manifest. Only the fields resolution needs are read; everything
/// else in the file is ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RootManifest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dependencies: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dev_dependencies: Option<BTreeMap<String, String>>,
}

impl RootManifest {
    #[tracing::instrument(skip(runtime))]
    pub fn load<R: Runtime>(runtime: &R, path: &Path) -> Result<Self> {
        let content = runtime
            .read_to_string(path)
            .with_context(|| format!("Failed to read {:?}", path))?;
        serde_json::from_str(&content).with_context(|| format!("Failed to parse {:?}", path))
    }

    /// Root edges as `(name, range)`: production dependencies first, then
    /// development ones when `include_dev` is set.
    pub fn edges(&self, include_dev: bool) -> Vec<(String, String)> {
        let dev = self.dev_dependencies.iter().filter(|_| include_dev);
        self.dependencies
            .iter()
            .chain(dev)
            .flatten()
            .map(|(name, range)| (name.clone(), range.clone()))
            .collect()
    }

    /// Label for log lines: `name@version`, or a placeholder for unnamed projects.
    pub fn label(&self) -> String {
        match (&self.name, &self.version) {
            (Some(name), Some(version)) => format!("{}@{}", name, version),
            (Some(name), None) => name.clone(),
            _ => "<unnamed project>".to_string(),
        }
    }
}

/// Find the nearest `package.json`, starting at `start` and walking up
/// through its ancestors.
pub fn find_root_manifest<R: Runtime>(runtime: &R, start: &Path) -> Result<PathBuf> {
    for dir in start.ancestors() {
        let candidate = dir.join(MANIFEST_FILE);
        if runtime.exists(&candidate) {
            debug!("Found root manifest at {:?}", candidate);
            return Ok(candidate);
        }
    }
    bail!(
        "Could not find {} in {:?} or any parent directory",
        MANIFEST_FILE,
        start
    )
}
