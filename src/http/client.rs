//! HTTP client used for registry lookups and tarball downloads.

use anyhow::{Context, Result};
use log::debug;
use reqwest::Client;
use serde::de::DeserializeOwned;

use super::status::check_status;

/// Thin wrapper over a shared `reqwest::Client`. Requests are attempted
/// exactly once.
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
}

impl HttpClient {
    /// Creates a new HTTP client wrapping the given reqwest Client.
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Returns a reference to the underlying reqwest Client.
    pub fn inner(&self) -> &Client {
        &self.client
    }

    /// Performs a GET request and deserializes the JSON response.
    #[tracing::instrument(skip(self))]
    pub async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        debug!("GET JSON from {}...", url);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("Failed to send request")?;

        let response = response.error_for_status().map_err(check_status)?;

        response
            .json::<T>()
            .await
            .context("Failed to parse JSON response")
    }

    /// Performs a GET request and returns the whole response body.
    #[tracing::instrument(skip(self))]
    pub async fn get_bytes(&self, url: &str) -> Result<Vec<u8>> {
        debug!("Downloading {}...", url);

        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("Failed to start download request")?;

        let response = response.error_for_status().map_err(check_status)?;

        let bytes = response
            .bytes()
            .await
            .context("Failed to read download body")?;

        debug!("Downloaded {:.2} KB", bytes.len() as f64 / 1024.0);
        Ok(bytes.to_vec())
    }
}
