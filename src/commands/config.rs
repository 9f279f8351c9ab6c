use anyhow::Result;
use log::debug;
use reqwest::Client;

use std::path::PathBuf;

use crate::{http::HttpClient, registry::DEFAULT_REGISTRY, runtime::Runtime};

/// Environment variable consulted when no registry is given on the command line.
pub const REGISTRY_ENV: &str = "REGISTRY";

pub fn user_agent() -> String {
    format!("tiny-pm/{}", env!("TINY_PM_VERSION"))
}

pub struct Config<R: Runtime> {
    pub runtime: R,
    pub http: HttpClient,
    pub registry_url: String,
    pub project_dir: Option<PathBuf>,
}

impl<R: Runtime> Config<R> {
    pub fn new(runtime: R, registry: Option<String>, project_dir: Option<PathBuf>) -> Result<Self> {
        let registry_url = resolve_registry_url(&runtime, registry);
        debug!("Using registry {}", registry_url);

        let client = Client::builder().user_agent(user_agent()).build()?;

        Ok(Self {
            runtime,
            http: HttpClient::new(client),
            registry_url,
            project_dir,
        })
    }
}

/// Registry base URL: the explicit value, then `$REGISTRY`, then the public
/// registry. Blank values count as unset.
fn resolve_registry_url<R: Runtime>(runtime: &R, explicit: Option<String>) -> String {
    if let Some(url) = explicit.filter(|u| !u.trim().is_empty()) {
        return url;
    }
    match runtime.env_var(REGISTRY_ENV) {
        Ok(url) if !url.trim().is_empty() => url,
        _ => DEFAULT_REGISTRY.to_string(),
    }
}
