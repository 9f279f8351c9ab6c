//! HTTP registry lookups.

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use log::debug;
use serde::Deserialize;

use super::{Manifest, ManifestSource};
use crate::error::Error;
use crate::http::{HttpClient, RequestError};

/// Public registry used when neither `--registry` nor `REGISTRY` is set.
pub const DEFAULT_REGISTRY: &str = "https://registry.npmjs.org/";

/// Registry document. Only the fields the resolver needs are decoded.
#[derive(Debug, Deserialize)]
struct PackageDocument {
    #[serde(default)]
    error: Option<serde_json::Value>,
    #[serde(default)]
    versions: Option<Manifest>,
}

pub struct RegistryClient {
    http: HttpClient,
    base_url: String,
}

impl RegistryClient {
    /// Create a client for `base_url`; a trailing `/` is added if missing.
    pub fn new(http: HttpClient, base_url: impl Into<String>) -> Self {
        let mut base_url = base_url.into();
        if !base_url.ends_with('/') {
            base_url.push('/');
        }
        Self { http, base_url }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// URL of a package document. Scoped names keep their `@` but escape the `/`.
    pub fn package_url(&self, name: &str) -> String {
        format!("{}{}", self.base_url, name.replace('/', "%2f"))
    }
}

#[async_trait]
impl ManifestSource for RegistryClient {
    #[tracing::instrument(skip(self))]
    async fn fetch(&self, name: &str) -> Result<Arc<Manifest>> {
        let url = self.package_url(name);
        debug!("Fetching manifest of {} from {}...", name, url);

        let document: PackageDocument = match self.http.get_json(&url).await {
            Ok(document) => document,
            Err(e)
                if matches!(
                    e.downcast_ref::<RequestError>(),
                    Some(RequestError::NotFound(_))
                ) =>
            {
                return Err(Error::PackageNotFound(name.to_string()).into());
            }
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to fetch manifest of {}", name));
            }
        };

        if document.error.is_some() {
            return Err(Error::PackageNotFound(name.to_string()).into());
        }

        let manifest = document.versions.ok_or_else(|| Error::Registry {
            name: name.to_string(),
            reason: "response has no versions field".to_string(),
        })?;

        debug!("{} has {} published version(s)", name, manifest.versions.len());
        Ok(Arc::new(manifest))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::Client;

    fn client_for(url: &str) -> RegistryClient {
        RegistryClient::new(HttpClient::new(Client::new()), url)
    }

    #[test]
    fn test_base_url_gets_trailing_slash() {
        let client = client_for("http://localhost:4873");
        assert_eq!(client.base_url(), "http://localhost:4873/");

        let client = client_for(DEFAULT_REGISTRY);
        assert_eq!(client.base_url(), DEFAULT_REGISTRY);
    }

    #[test]
    fn test_package_url_escapes_scope() {
        let client = client_for("http://r/");
        assert_eq!(client.package_url("left"), "http://r/left");
        assert_eq!(client.package_url("@types/node"), "http://r/@types%2fnode");
    }

    #[tokio::test]
    async fn test_fetch_manifest() {
        let mut server = mockito::Server::new_async().await;
        let url = server.url();

        let mock = server
            .mock("GET", "/left")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{
                    "name": "left",
                    "dist-tags": { "latest": "1.0.0" },
                    "versions": {
                        "1.0.0": {
                            "name": "left",
                            "dependencies": { "shared": "^1.0.0" },
                            "dist": { "shasum": "abc", "tarball": "http://r/left-1.0.0.tgz" }
                        }
                    }
                }"#,
            )
            .create_async()
            .await;

        let manifest = client_for(&url).fetch("left").await.unwrap();

        mock.assert_async().await;
        let version = manifest.get("1.0.0").unwrap();
        assert_eq!(version.dist.tarball, "http://r/left-1.0.0.tgz");
        assert_eq!(version.dependencies().get("shared").unwrap(), "^1.0.0");
    }

    #[tokio::test]
    async fn test_fetch_error_body_is_not_found() {
        let mut server = mockito::Server::new_async().await;
        let url = server.url();

        let _mock = server
            .mock("GET", "/ghost")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"error": "Not found"}"#)
            .create_async()
            .await;

        let err = client_for(&url).fetch("ghost").await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<Error>(),
            Some(Error::PackageNotFound(name)) if name == "ghost"
        ));
    }

    #[tokio::test]
    async fn test_fetch_http_404_is_not_found() {
        let mut server = mockito::Server::new_async().await;
        let url = server.url();

        let _mock = server
            .mock("GET", "/ghost")
            .with_status(404)
            .with_body(r#"{"error": "Not found"}"#)
            .create_async()
            .await;

        let err = client_for(&url).fetch("ghost").await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<Error>(),
            Some(Error::PackageNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_fetch_without_versions_is_registry_error() {
        let mut server = mockito::Server::new_async().await;
        let url = server.url();

        let _mock = server
            .mock("GET", "/odd")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"name": "odd"}"#)
            .create_async()
            .await;

        let err = client_for(&url).fetch("odd").await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<Error>(),
            Some(Error::Registry { .. })
        ));
    }

    #[tokio::test]
    async fn test_fetch_server_error_keeps_context() {
        let mut server = mockito::Server::new_async().await;
        let url = server.url();

        let _mock = server
            .mock("GET", "/left")
            .with_status(502)
            .create_async()
            .await;

        let err = client_for(&url).fetch("left").await.unwrap_err();
        assert!(err.to_string().contains("Failed to fetch manifest of left"));
        assert!(err.downcast_ref::<Error>().is_none());
    }
}
