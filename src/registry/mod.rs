//! Manifest sources: where a package's published versions come from.
//!
//! [`ManifestSource`] is the seam the resolver depends on. [`RegistryClient`]
//! answers it over HTTP, and [`CachedSource`] memoizes any source per package
//! name for the lifetime of a run.

mod cache;
mod client;

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::version::{Range, max_satisfying};

pub use cache::CachedSource;
pub use client::{DEFAULT_REGISTRY, RegistryClient};

/// Checks that `name` is a plain package name or a single `@scope/name`, so
/// it always maps to one directory below `node_modules`.
pub fn validate_name(name: &str) -> Result<(), Error> {
    let invalid = |reason| Error::InvalidPackageName {
        name: name.to_string(),
        reason,
    };

    if name.is_empty() {
        return Err(invalid("empty name"));
    }
    if name.starts_with('.') || name.starts_with('/') {
        return Err(invalid("must not start with '.' or '/'"));
    }
    if name.contains("..") || name.contains('\\') {
        return Err(invalid("must not contain '..' or '\\'"));
    }

    match name.split_once('/') {
        None => Ok(()),
        Some((scope, rest)) => {
            if !scope.starts_with('@') || scope.len() < 2 {
                return Err(invalid("only scoped names may contain '/'"));
            }
            if rest.is_empty() || rest.starts_with('.') || rest.contains('/') {
                return Err(invalid("expected @scope/name"));
            }
            Ok(())
        }
    }
}

/// Distribution descriptor of one published version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Dist {
    #[serde(default)]
    pub shasum: String,
    pub tarball: String,
}

/// A single published version: its dependency ranges and where to fetch it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct VersionManifest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dependencies: Option<BTreeMap<String, String>>,
    pub dist: Dist,
}

impl VersionManifest {
    /// Dependency ranges, empty when the version declares none.
    pub fn dependencies(&self) -> BTreeMap<String, String> {
        self.dependencies.clone().unwrap_or_default()
    }
}

/// All published versions of one package, keyed by version string.
///
/// Read-only once obtained; the resolver shares one instance per name
/// across every edge that needs it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct Manifest {
    pub versions: BTreeMap<String, VersionManifest>,
}

impl Manifest {
    /// A manifest carrying exactly one version.
    pub fn single(version: impl Into<String>, manifest: VersionManifest) -> Self {
        Self {
            versions: BTreeMap::from([(version.into(), manifest)]),
        }
    }

    pub fn get(&self, version: &str) -> Option<&VersionManifest> {
        self.versions.get(version)
    }

    /// Published version strings, in map order.
    pub fn version_strs(&self) -> impl Iterator<Item = &str> {
        self.versions.keys().map(String::as_str)
    }

    /// The highest published version satisfying `range`, with its manifest.
    pub fn select(&self, range: &Range) -> Option<(&str, &VersionManifest)> {
        let version = max_satisfying(self.version_strs(), range)?;
        self.versions
            .get_key_value(version)
            .map(|(version, manifest)| (version.as_str(), manifest))
    }
}

/// Trait for anything that can produce a package's manifest by name.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ManifestSource: Send + Sync {
    /// Fetch the manifest of `name`. Fails with `Error::PackageNotFound`
    /// when the registry has no such package.
    async fn fetch(&self, name: &str) -> Result<Arc<Manifest>>;
}
