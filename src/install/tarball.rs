//! Package tarball unpacking.

use std::io::Read;
use std::path::{Component, Path, PathBuf};

use anyhow::{Context, Result};
use flate2::read::GzDecoder;
use log::debug;
use tar::Archive;

use crate::runtime::Runtime;

/// Unpack a gzipped package tarball into `target`, dropping the first path
/// component of every entry (`package/index.js` lands at `target/index.js`).
///
/// Only directories and regular files are written; links and entries that
/// would escape `target` are skipped. Returns the number of files written.
#[tracing::instrument(skip(runtime, bytes))]
pub fn unpack<R: Runtime>(runtime: &R, bytes: &[u8], target: &Path) -> Result<usize> {
    runtime.create_dir_all(target)?;

    let mut archive = Archive::new(GzDecoder::new(bytes));
    let mut files = 0;

    for entry in archive.entries().context("Failed to read tarball")? {
        let mut entry = entry.context("Failed to read tarball entry")?;
        let path = entry
            .path()
            .context("Tarball entry has an invalid path")?
            .into_owned();

        let Some(relative) = strip_package_root(&path) else {
            debug!("Skipping entry {:?}", path);
            continue;
        };
        let full_path = target.join(relative);
        let kind = entry.header().entry_type();

        if kind.is_dir() {
            runtime.create_dir_all(&full_path)?;
            continue;
        }
        if !kind.is_file() {
            debug!("Skipping {:?} entry {:?}", kind, path);
            continue;
        }

        if let Some(parent) = full_path.parent() {
            runtime.create_dir_all(parent)?;
        }
        write_entry(runtime, &mut entry, &full_path)?;

        #[cfg(unix)]
        if let Ok(mode) = entry.header().mode()
            && let Err(e) = runtime.set_permissions(&full_path, mode & 0o777)
        {
            debug!("Failed to set permissions on {:?}: {}", full_path, e);
        }

        files += 1;
    }

    Ok(files)
}

fn write_entry<R: Runtime>(runtime: &R, entry: &mut impl Read, path: &Path) -> Result<()> {
    let mut dest = runtime.create_file(path)?;
    std::io::copy(entry, &mut dest).with_context(|| format!("Failed to extract file {:?}", path))?;
    Ok(())
}

fn strip_package_root(path: &Path) -> Option<PathBuf> {
    let mut components = path
        .components()
        .filter(|c| !matches!(c, Component::CurDir));

    if !matches!(components.next()?, Component::Normal(_)) {
        return None;
    }

    let mut relative = PathBuf::new();
    for component in components {
        match component {
            Component::Normal(part) => relative.push(part),
            _ => return None,
        }
    }

    (!relative.as_os_str().is_empty()).then_some(relative)
}
