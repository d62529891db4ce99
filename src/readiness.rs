//! Readiness polling against the engine's health endpoint.
//!
//! The engine is considered ready once its health payload reports a
//! positive translation-cache size, meaning the JIT has warmed up.

use std::time::Duration;

use serde_json::Value;

use crate::admin::{AdminClient, AdminError, AdminFailure, AdminResponse};
use crate::defaults;

/// Classification of a single health query.
#[derive(Debug, Clone, PartialEq)]
pub enum HealthSnapshot {
    /// Transport or HTTP failure
    Unreachable(AdminFailure),
    /// The engine answered with the explicit failure sentinel
    FailureSentinel,
    /// A body that is not JSON
    Unparseable(String),
    /// A parsed JSON payload
    Payload(Value),
}

impl HealthSnapshot {
    pub fn from_response(response: AdminResponse) -> Self {
        match response {
            AdminResponse::Failure(failure) => Self::Unreachable(failure),
            AdminResponse::Body(body) => {
                let trimmed = body.trim();
                if trimmed == defaults::FAILURE_SENTINEL {
                    return Self::FailureSentinel;
                }
                match serde_json::from_str::<Value>(trimmed) {
                    Ok(value) => Self::Payload(value),
                    Err(_) => Self::Unparseable(body),
                }
            }
        }
    }

    /// Value of the readiness counter, if present and positive. Numeric
    /// strings such as `"42"` count as their number.
    pub fn readiness_counter(&self, field: &str) -> Option<f64> {
        match self {
            Self::Payload(value) => value
                .get(field)
                .and_then(numeric)
                .filter(|counter| *counter > 0.0),
            _ => None,
        }
    }

    /// Whether the payload is a non-empty, non-falsy JSON value.
    ///
    /// Used before a graceful stop: only an engine that answers with a
    /// meaningful health document is trusted to handle `/stop`.
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Payload(value) => json_truthy(value),
            _ => false,
        }
    }
}

fn numeric(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok().filter(|v: &f64| v.is_finite()),
        _ => None,
    }
}

fn json_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|v| v != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty() && s != "0",
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

/// Outcome of a polling run.
#[derive(Debug, Clone, PartialEq)]
pub enum Readiness {
    Ready { attempts: u32, counter: f64 },
    NotReady { attempts: u32 },
}

impl Readiness {
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready { .. })
    }

    pub fn attempts(&self) -> u32 {
        match self {
            Self::Ready { attempts, .. } | Self::NotReady { attempts } => *attempts,
        }
    }
}

/// Polls the health endpoint a bounded number of times.
#[derive(Debug, Clone)]
pub struct ReadinessPoller {
    health_path: String,
    max_attempts: u32,
    delay: Duration,
    request_timeout: Duration,
    readiness_field: String,
}

impl ReadinessPoller {
    pub fn new(health_path: impl Into<String>) -> Self {
        Self {
            health_path: health_path.into(),
            max_attempts: defaults::HEALTH_CHECK_ATTEMPTS,
            delay: defaults::delay_check_health(),
            request_timeout: defaults::admin_request_timeout(),
            readiness_field: defaults::READINESS_FIELD.to_string(),
        }
    }

    pub fn with_attempts(mut self, max_attempts: u32, delay: Duration) -> Self {
        self.max_attempts = max_attempts;
        self.delay = delay;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_readiness_field(mut self, field: impl Into<String>) -> Self {
        self.readiness_field = field.into();
        self
    }

    /// Query the health path until the engine reports ready or the attempts
    /// run out. The delay is slept *before* every attempt.
    pub async fn poll_until_ready(&self, admin: &dyn AdminClient) -> Result<Readiness, AdminError> {
        for attempt in 1..=self.max_attempts {
            tokio::time::sleep(self.delay).await;

            let response = admin
                .request(&self.health_path, self.request_timeout)
                .await?;
            let snapshot = HealthSnapshot::from_response(response);

            if let Some(counter) = snapshot.readiness_counter(&self.readiness_field) {
                log::info!(
                    "Engine ready after {} health check(s) ({} = {})",
                    attempt,
                    self.readiness_field,
                    counter
                );
                return Ok(Readiness::Ready {
                    attempts: attempt,
                    counter,
                });
            }

            match &snapshot {
                HealthSnapshot::Unreachable(failure) => {
                    log::debug!("Health check {} unreachable: {}", attempt, failure);
                }
                HealthSnapshot::FailureSentinel => {
                    log::debug!("Health check {} reported failure", attempt);
                }
                HealthSnapshot::Unparseable(body) => {
                    log::warn!("Health check {} returned non-JSON body: {:?}", attempt, body);
                }
                HealthSnapshot::Payload(_) => {
                    log::debug!(
                        "Health check {} answered but {} is not positive yet",
                        attempt,
                        self.readiness_field
                    );
                }
            }
        }

        log::warn!(
            "Engine not ready after {} health check(s)",
            self.max_attempts
        );
        Ok(Readiness::NotReady {
            attempts: self.max_attempts,
        })
    }
}
