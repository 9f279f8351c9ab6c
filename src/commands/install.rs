use anyhow::{Context, Result};
use log::{info, warn};
use std::path::PathBuf;

use super::config::Config;
use crate::{
    error::Error,
    install::{InstallSummary, Installer},
    lock::{LOCK_FILE, LockStore},
    manifest::{RootManifest, find_root_manifest},
    registry::{CachedSource, RegistryClient},
    resolver::{InstallPlan, Resolver},
    runtime::Runtime,
};

#[derive(Debug, Clone, Default)]
pub struct InstallOptions {
    /// Leave out `devDependencies`.
    pub production: bool,
}

/// What an install run did.
#[derive(Debug)]
pub struct InstallReport {
    pub project_dir: PathBuf,
    pub plan: InstallPlan,
    pub summary: InstallSummary,
    /// Set when the plan was installed but the lock file could not be written.
    pub lock_error: Option<Error>,
}

impl InstallReport {
    pub fn summary_line(&self) -> String {
        let mut line = format!(
            "Installed {} packages ({} top-level, {} nested) into {}",
            self.summary.installed(),
            self.summary.top_level,
            self.summary.nested,
            self.project_dir.display()
        );
        if self.summary.skipped > 0 {
            line.push_str(&format!(
                "; skipped {} conflicting root dependencies",
                self.summary.skipped
            ));
        }
        line
    }
}

#[tracing::instrument(skip(runtime, registry, project_dir))]
pub async fn install<R: Runtime>(
    runtime: R,
    options: InstallOptions,
    registry: Option<String>,
    project_dir: Option<PathBuf>,
) -> Result<InstallReport> {
    let config = Config::new(runtime, registry, project_dir)?;
    run(config, options).await
}

/// Resolve the project's dependencies, write the lock, install the plan.
#[tracing::instrument(skip(config))]
pub async fn run<R: Runtime>(config: Config<R>, options: InstallOptions) -> Result<InstallReport> {
    let start = match &config.project_dir {
        Some(dir) => dir.clone(),
        None => config.runtime.current_dir()?,
    };
    let manifest_path = find_root_manifest(&config.runtime, &start)?;
    let project_dir = manifest_path
        .parent()
        .map(PathBuf::from)
        .context("Root manifest has no parent directory")?;
    let root = RootManifest::load(&config.runtime, &manifest_path)?;

    let lock_path = project_dir.join(LOCK_FILE);
    let lock = LockStore::load(&config.runtime, &lock_path);

    let source = CachedSource::new(RegistryClient::new(
        config.http.clone(),
        config.registry_url.as_str(),
    ));
    let plan = Resolver::new(&source, &lock)
        .resolve(&root, !options.production)
        .await?;
    info!(
        "Resolved {} packages, {} manifests fetched from {}",
        plan.package_count(),
        source.cached_count(),
        source.inner().base_url()
    );

    let lock_error = lock.persist(&config.runtime, &lock_path).err();
    if let Some(e) = &lock_error {
        warn!("{}", e);
    }

    let summary = Installer::new(&config.runtime, config.http.clone(), &project_dir)
        .install(&plan)
        .await?;

    Ok(InstallReport {
        project_dir,
        plan,
        summary,
        lock_error,
    })
}
