//! Classification of HTTP failures into user-facing request errors.

use reqwest::StatusCode;

/// HTTP failures the registry and tarball hosts report.
#[derive(Debug)]
pub enum RequestError {
    /// Resource not found (HTTP 404)
    NotFound(String),
    /// Other client errors (HTTP 4xx)
    ClientError(String),
    /// Server-side failures (HTTP 5xx)
    ServerError(String),
}

impl std::fmt::Display for RequestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RequestError::NotFound(msg) => write!(f, "Not found: {}", msg),
            RequestError::ClientError(msg) => write!(f, "Request error: {}", msg),
            RequestError::ServerError(msg) => write!(f, "Server error: {}", msg),
        }
    }
}

impl std::error::Error for RequestError {}

/// Maps a failed status to a [`RequestError`]. Returns None for errors
/// without a status (connection failures, timeouts).
pub fn classify_status(error: &reqwest::Error) -> Option<RequestError> {
    let status = error.status()?;
    let url = error
        .url()
        .map(|u| u.to_string())
        .unwrap_or_else(|| "<unknown url>".to_string());

    Some(match status {
        StatusCode::NOT_FOUND => RequestError::NotFound(url),
        s if s.is_client_error() => {
            RequestError::ClientError(format!("HTTP {} from {}", s.as_u16(), url))
        }
        s => RequestError::ServerError(format!("HTTP {} from {}", s.as_u16(), url)),
    })
}

/// Converts an error from `error_for_status()` into an `anyhow::Error`,
/// replacing it with a [`RequestError`] when the status is known.
pub fn check_status(error: reqwest::Error) -> anyhow::Error {
    match classify_status(&error) {
        Some(classified) => anyhow::Error::from(classified),
        None => anyhow::Error::from(error),
    }
}
