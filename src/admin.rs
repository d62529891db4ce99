//! Admin HTTP client for the engine's administrative port.
//!
//! The engine exposes a small HTTP surface on a local admin port
//! (`/check-health`, `/stop`). Requests never error on connection
//! refusal or timeouts; those map to [`AdminResponse::Failure`] so
//! callers can branch on them explicitly.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use thiserror::Error;

/// Misconfigured admin request. These are the only errors an
/// [`AdminClient`] may return.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AdminError {
    #[error("Admin request timeout must be greater than zero")]
    InvalidTimeout,

    #[error("Admin path must start with '/': {0:?}")]
    InvalidPath(String),
}

/// Why an admin request did not produce a body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdminFailure {
    /// Nothing is listening on the admin port
    Refused,
    /// The request exceeded its timeout
    TimedOut,
    /// The engine answered with a non-success status
    Status(u16),
    /// Any other transport-level problem
    Transport(String),
}

impl fmt::Display for AdminFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Refused => write!(f, "connection refused"),
            Self::TimedOut => write!(f, "request timed out"),
            Self::Status(code) => write!(f, "HTTP {}", code),
            Self::Transport(msg) => write!(f, "transport error: {}", msg),
        }
    }
}

/// Result of one admin request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdminResponse {
    Body(String),
    Failure(AdminFailure),
}

/// Issues GET requests against the engine's admin port.
#[async_trait]
pub trait AdminClient: Send + Sync {
    async fn request(&self, path: &str, timeout: Duration) -> Result<AdminResponse, AdminError>;
}

/// Reject requests that could never be valid regardless of engine state.
pub fn check_request(path: &str, timeout: Duration) -> Result<(), AdminError> {
    if timeout.is_zero() {
        return Err(AdminError::InvalidTimeout);
    }
    if !path.starts_with('/') {
        return Err(AdminError::InvalidPath(path.to_string()));
    }
    Ok(())
}

/// [`AdminClient`] backed by `reqwest`, talking to `http://localhost:<port>`.
pub struct HttpAdminClient {
    client: Client,
    base_url: String,
}

impl HttpAdminClient {
    pub fn new(port: u16) -> Self {
        let client = Client::builder()
            .no_proxy()
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            base_url: format!("http://localhost:{}", port),
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

#[async_trait]
impl AdminClient for HttpAdminClient {
    async fn request(&self, path: &str, timeout: Duration) -> Result<AdminResponse, AdminError> {
        check_request(path, timeout)?;

        let url = self.url(path);
        let response = match self.client.get(&url).timeout(timeout).send().await {
            Ok(response) => response,
            Err(e) => {
                log::debug!("Admin request {} failed: {}", url, e);
                return Ok(AdminResponse::Failure(classify(&e)));
            }
        };

        let status = response.status();
        if !status.is_success() {
            return Ok(AdminResponse::Failure(AdminFailure::Status(status.as_u16())));
        }

        match response.text().await {
            Ok(body) => Ok(AdminResponse::Body(body)),
            Err(e) => Ok(AdminResponse::Failure(classify(&e))),
        }
    }
}

fn classify(err: &reqwest::Error) -> AdminFailure {
    if err.is_timeout() {
        AdminFailure::TimedOut
    } else if err.is_connect() {
        AdminFailure::Refused
    } else {
        AdminFailure::Transport(err.to_string())
    }
}
