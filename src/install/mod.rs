//! Installing an [`InstallPlan`] into `node_modules`.
//!
//! Top-level packages go to `node_modules/<name>`. An unsatisfied record
//! with parent path `p1/p2` goes to
//! `node_modules/p1/node_modules/p2/node_modules/<name>`.

mod tarball;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use futures_util::future::try_join_all;
use log::{debug, info, warn};

use crate::http::HttpClient;
use crate::registry::validate_name;
use crate::resolver::InstallPlan;
use crate::runtime::Runtime;

pub use tarball::unpack;

pub const MODULES_DIR: &str = "node_modules";

/// Install location of a top-level package.
pub fn top_level_dir(project_dir: &Path, name: &str) -> Result<PathBuf> {
    nested_dir::<&str>(project_dir, &[], name)
}

/// Install location of a package nested under `parents`, outermost first.
/// Fails when a segment is not a valid package name.
pub fn nested_dir<S: AsRef<str>>(
    project_dir: &Path,
    parents: &[S],
    name: &str,
) -> Result<PathBuf> {
    let root = project_dir.join(MODULES_DIR);
    let mut dir = root.clone();
    for parent in parents {
        validate_name(parent.as_ref())?;
        dir.push(parent.as_ref());
        dir.push(MODULES_DIR);
    }
    validate_name(name)?;
    dir.push(name);

    if dir == root || !dir.starts_with(&root) {
        bail!("Install target {:?} is outside {:?}", dir, root);
    }
    Ok(dir)
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstallSummary {
    pub top_level: usize,
    pub nested: usize,
    pub skipped: usize,
}

impl InstallSummary {
    pub fn installed(&self) -> usize {
        self.top_level + self.nested
    }
}

pub struct Installer<'a, R: Runtime> {
    runtime: &'a R,
    http: HttpClient,
    project_dir: PathBuf,
}

impl<'a, R: Runtime> Installer<'a, R> {
    pub fn new(runtime: &'a R, http: HttpClient, project_dir: impl Into<PathBuf>) -> Self {
        Self {
            runtime,
            http,
            project_dir: project_dir.into(),
        }
    }

    /// Download and unpack every package of `plan`: the top level first,
    /// then the nested records. Each group is installed concurrently.
    #[tracing::instrument(skip_all)]
    pub async fn install(&self, plan: &InstallPlan) -> Result<InstallSummary> {
        let mut top_level = Vec::with_capacity(plan.top_level.len());
        for (name, package) in &plan.top_level {
            let target = top_level_dir(&self.project_dir, name)?;
            top_level.push(self.install_package(
                name,
                &package.version,
                &package.url,
                target,
                true,
            ));
        }
        try_join_all(top_level).await?;

        let mut summary = InstallSummary {
            top_level: plan.top_level.len(),
            ..Default::default()
        };

        let mut nested = Vec::new();
        for record in &plan.unsatisfied {
            if record.parent.is_none() {
                warn!(
                    "Not installing {}@{}: a root dependency conflicting with the top-level copy has nowhere to nest",
                    record.name, record.version
                );
                summary.skipped += 1;
                continue;
            }
            let target = nested_dir(&self.project_dir, &record.parent_segments(), &record.name)?;
            nested.push(self.install_package(
                &record.name,
                &record.version,
                &record.url,
                target,
                false,
            ));
        }
        summary.nested = nested.len();
        try_join_all(nested).await?;

        Ok(summary)
    }

    /// Download one package and unpack it into `target`. With `replace`, an
    /// existing directory at `target` is removed first.
    async fn install_package(
        &self,
        name: &str,
        version: &str,
        url: &str,
        target: PathBuf,
        replace: bool,
    ) -> Result<()> {
        info!("Installing {}@{}", name, version);

        let bytes = self
            .http
            .get_bytes(url)
            .await
            .with_context(|| format!("Failed to download {}@{} from {}", name, version, url))?;

        if replace && self.runtime.is_dir(&target) {
            debug!("Removing previous install at {:?}", target);
            self.runtime.remove_dir_all(&target)?;
        }

        let files = unpack(self.runtime, &bytes, &target)
            .with_context(|| format!("Failed to unpack {}@{} into {:?}", name, version, target))?;

        debug!("Unpacked {} files of {}@{} into {:?}", files, name, version, target);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::{PlannedPackage, Unsatisfied};
    use crate::runtime::RealRuntime;
    use mockito::Server;
    use reqwest::Client;
    use std::fs;
    use tarball::tests::create_tarball;
    use tempfile::tempdir;

    fn planned(version: &str, url: String) -> PlannedPackage {
        PlannedPackage {
            version: version.to_string(),
            url,
            shasum: String::new(),
        }
    }

    #[test]
    fn test_install_dirs() {
        let project = Path::new("/work/app");
        assert_eq!(
            top_level_dir(project, "left").unwrap(),
            PathBuf::from("/work/app/node_modules/left")
        );
        assert_eq!(
            nested_dir(project, &["right"], "shared").unwrap(),
            PathBuf::from("/work/app/node_modules/right/node_modules/shared")
        );
        assert_eq!(
            nested_dir(project, &["outer", "inner"], "base").unwrap(),
            PathBuf::from("/work/app/node_modules/outer/node_modules/inner/node_modules/base")
        );
        assert_eq!(
            top_level_dir(project, "@scope/util").unwrap(),
            PathBuf::from("/work/app/node_modules/@scope/util")
        );
    }

    #[test]
    fn test_install_dirs_reject_escaping_names() {
        let project = Path::new("/work/app");
        for name in ["../../victim", "/x", ".."] {
            let err = top_level_dir(project, name).unwrap_err();
            assert!(matches!(
                crate::error::classify(&err),
                Some(crate::Error::InvalidPackageName { .. })
            ));
        }
        assert!(nested_dir(project, &["../outside"], "shared").is_err());
        assert!(nested_dir(project, &["right"], "/etc").is_err());
    }

    #[tokio::test]
    async fn test_install_top_level_then_nested() {
        let mut server = Server::new_async().await;
        let base = server.url();

        let mocks = [
            ("left-1.0.0.tgz", "left"),
            ("right-1.0.0.tgz", "right"),
            ("shared-1.0.0.tgz", "shared one"),
            ("shared-2.0.0.tgz", "shared two"),
        ]
        .map(|(file, content)| {
            server
                .mock("GET", format!("/{}", file).as_str())
                .with_status(200)
                .with_body(create_tarball(&[("package/index.js", content)]))
                .expect(1)
                .create()
        });

        let mut plan = InstallPlan::default();
        for (name, version) in [("left", "1.0.0"), ("right", "1.0.0"), ("shared", "1.0.0")] {
            plan.top_level.insert(
                name.to_string(),
                planned(version, format!("{}/{}-{}.tgz", base, name, version)),
            );
        }
        plan.unsatisfied.push(Unsatisfied {
            name: "shared".to_string(),
            parent: Some("right".to_string()),
            version: "2.0.0".to_string(),
            url: format!("{}/shared-2.0.0.tgz", base),
        });

        let dir = tempdir().unwrap();
        let installer = Installer::new(&RealRuntime, HttpClient::new(Client::new()), dir.path());
        let summary = installer.install(&plan).await.unwrap();

        for mock in &mocks {
            mock.assert();
        }
        assert_eq!(
            summary,
            InstallSummary {
                top_level: 3,
                nested: 1,
                skipped: 0
            }
        );
        let read = |path: PathBuf| fs::read_to_string(path.join("index.js")).unwrap();
        assert_eq!(read(top_level_dir(dir.path(), "shared").unwrap()), "shared one");
        assert_eq!(
            read(nested_dir(dir.path(), &["right"], "shared").unwrap()),
            "shared two"
        );
    }

    #[test_log::test(tokio::test)]
    async fn test_record_without_parent_is_skipped() {
        let mut server = Server::new_async().await;
        let top = server
            .mock("GET", "/shared-2.0.0.tgz")
            .with_status(200)
            .with_body(create_tarball(&[("package/index.js", "two")]))
            .create();
        let skipped = server.mock("GET", "/shared-1.0.0.tgz").expect(0).create();

        let mut plan = InstallPlan::default();
        plan.top_level.insert(
            "shared".to_string(),
            planned("2.0.0", format!("{}/shared-2.0.0.tgz", server.url())),
        );
        plan.unsatisfied.push(Unsatisfied {
            name: "shared".to_string(),
            parent: None,
            version: "1.0.0".to_string(),
            url: format!("{}/shared-1.0.0.tgz", server.url()),
        });

        let dir = tempdir().unwrap();
        let installer = Installer::new(&RealRuntime, HttpClient::new(Client::new()), dir.path());
        let summary = installer.install(&plan).await.unwrap();

        top.assert();
        skipped.assert();
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.installed(), 1);
    }

    #[tokio::test]
    async fn test_top_level_install_replaces_previous_contents() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/left-1.1.0.tgz")
            .with_status(200)
            .with_body(create_tarball(&[("package/index.js", "new")]))
            .create();

        let dir = tempdir().unwrap();
        let stale = top_level_dir(dir.path(), "left").unwrap().join("removed.js");
        fs::create_dir_all(stale.parent().unwrap()).unwrap();
        fs::write(&stale, "old").unwrap();

        let mut plan = InstallPlan::default();
        plan.top_level.insert(
            "left".to_string(),
            planned("1.1.0", format!("{}/left-1.1.0.tgz", server.url())),
        );

        let installer = Installer::new(&RealRuntime, HttpClient::new(Client::new()), dir.path());
        installer.install(&plan).await.unwrap();

        assert!(!stale.exists());
        assert_eq!(
            fs::read_to_string(top_level_dir(dir.path(), "left").unwrap().join("index.js"))
                .unwrap(),
            "new"
        );
    }

    #[tokio::test]
    async fn test_download_failure_names_package() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/left-1.0.0.tgz")
            .with_status(404)
            .create();

        let mut plan = InstallPlan::default();
        plan.top_level.insert(
            "left".to_string(),
            planned("1.0.0", format!("{}/left-1.0.0.tgz", server.url())),
        );

        let dir = tempdir().unwrap();
        let installer = Installer::new(&RealRuntime, HttpClient::new(Client::new()), dir.path());
        let err = installer.install(&plan).await.unwrap_err();

        assert!(err.to_string().contains("Failed to download left@1.0.0"));
    }

    #[tokio::test]
    async fn test_plan_with_escaping_name_leaves_outside_dirs_alone() {
        let mut server = Server::new_async().await;
        let download = server
            .mock("GET", "/victim-1.0.0.tgz")
            .with_status(200)
            .with_body(create_tarball(&[("package/index.js", "replaced")]))
            .expect(0)
            .create();

        let root = tempdir().unwrap();
        let project = root.path().join("work").join("app");
        fs::create_dir_all(project.join(MODULES_DIR)).unwrap();
        let victim = root.path().join("victim");
        fs::create_dir_all(&victim).unwrap();
        fs::write(victim.join("precious.txt"), "keep").unwrap();

        let installer = Installer::new(&RealRuntime, HttpClient::new(Client::new()), &project);
        let url = format!("{}/victim-1.0.0.tgz", server.url());
        let absolute = victim.to_string_lossy().into_owned();

        for name in ["../../../victim", absolute.as_str()] {
            let mut plan = InstallPlan::default();
            plan.top_level
                .insert(name.to_string(), planned("1.0.0", url.clone()));

            let err = installer.install(&plan).await.unwrap_err();
            assert!(matches!(
                crate::error::classify(&err),
                Some(crate::Error::InvalidPackageName { .. })
            ));
        }

        download.assert();
        assert_eq!(
            fs::read_to_string(victim.join("precious.txt")).unwrap(),
            "keep"
        );
        assert!(!victim.join("index.js").exists());
    }
}
