//! Domain errors raised during resolution and lock handling.
//!
//! Orchestration code works in `anyhow::Result`; these variants travel inside
//! the `anyhow::Error` and are recovered with `downcast_ref::<Error>()` when a
//! caller needs to tell the failure kinds apart.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// No published version satisfies the requested range. Fatal for the run.
    #[error("Cannot resolve a version of {name} satisfying {range}")]
    UnresolvableRange { name: String, range: String },

    /// The registry has no record of the package. Fatal for the run.
    #[error("No such package: {0}")]
    PackageNotFound(String),

    /// A dependency name that cannot be used as a directory under `node_modules`.
    #[error("Invalid package name {name:?}: {reason}")]
    InvalidPackageName { name: String, reason: &'static str },

    /// The range expression could not be parsed.
    #[error("Invalid version range {range:?}: {reason}")]
    InvalidRange { range: String, reason: String },

    /// The registry answered with something other than a manifest.
    #[error("Registry request for {name} failed: {reason}")]
    Registry { name: String, reason: String },

    /// The lock file exists but could not be read or parsed.
    #[error("Failed to read lock file {path:?}: {reason}")]
    LockRead { path: PathBuf, reason: String },

    /// The lock file could not be serialized or written.
    #[error("Failed to write lock file {path:?}: {reason}")]
    LockWrite { path: PathBuf, reason: String },
}

/// Returns the domain error carried by an `anyhow::Error`, if any.
pub fn classify(err: &anyhow::Error) -> Option<&Error> {
    err.chain().find_map(|cause| cause.downcast_ref::<Error>())
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn test_error_display() {
        let err = Error::UnresolvableRange {
            name: "pkg".into(),
            range: "^1.0.0".into(),
        };
        assert_eq!(
            err.to_string(),
            "Cannot resolve a version of pkg satisfying ^1.0.0"
        );
        assert_eq!(
            Error::PackageNotFound("nope".into()).to_string(),
            "No such package: nope"
        );
    }

    #[test]
    fn test_classify_through_context() {
        let result: anyhow::Result<()> = Err(Error::PackageNotFound("left".into()).into());
        let err = result.context("Failed to resolve left@^1.0.0").unwrap_err();

        assert!(matches!(
            classify(&err),
            Some(Error::PackageNotFound(name)) if name == "left"
        ));
    }

    #[test]
    fn test_classify_foreign_error() {
        let err = anyhow::anyhow!("connection reset");
        assert!(classify(&err).is_none());
    }
}
