//! Reachability / authentication probe for remote engines.
//!
//! The probe is a single `GET /api/v1/status` against the engine gateway,
//! carrying the connection's bearer token. It never mutates anything and is
//! always bounded by the configured timeout.

use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

use super::RemoteConnection;

/// Path probed on the engine gateway.
pub const STATUS_PATH: &str = "/api/v1/status";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerifyStatus {
    /// Reachable and the credentials were accepted.
    Ok,
    /// Reachable, but the gateway rejected the credentials.
    Unauthenticated,
    /// Could not connect, or no answer within the timeout.
    Unreachable,
    /// Something answered, but not the way an engine gateway does.
    UnexpectedResponse,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyResult {
    pub status: VerifyStatus,
    pub detail: String,
    pub latency_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_status: Option<u16>,
}

impl VerifyResult {
    fn new(status: VerifyStatus, detail: impl Into<String>, started: Instant) -> Self {
        Self {
            status,
            detail: detail.into(),
            latency_ms: started.elapsed().as_millis() as u64,
            http_status: None,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == VerifyStatus::Ok
    }

    pub fn is_reachable(&self) -> bool {
        matches!(
            self.status,
            VerifyStatus::Ok | VerifyStatus::Unauthenticated | VerifyStatus::UnexpectedResponse
        )
    }
}

/// Cheap to clone; the HTTP client is shared.
#[derive(Debug, Clone)]
pub struct RemoteVerifier {
    client: reqwest::Client,
    timeout: Duration,
}

impl RemoteVerifier {
    pub fn new(timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn timed_out(&self, started: Instant) -> VerifyResult {
        VerifyResult::new(
            VerifyStatus::Unreachable,
            format!("Timed out after {} ms", self.timeout().as_millis()),
            started,
        )
    }

    pub async fn verify(&self, conn: &RemoteConnection) -> VerifyResult {
        let started = Instant::now();

        if conn.host.trim().is_empty() || conn.port == 0 {
            return VerifyResult::new(VerifyStatus::Unreachable, "Invalid endpoint", started);
        }

        let url = format!("{}{}", conn.base_url(), STATUS_PATH);
        let mut request = self.client.get(&url);
        if let Some(token) = conn.token.as_deref().filter(|t| !t.is_empty()) {
            request = request.bearer_auth(token);
        }

        let result = match tokio::time::timeout(self.timeout, request.send()).await {
            Err(_) => self.timed_out(started),
            Ok(Err(e)) if e.is_timeout() => self.timed_out(started),
            // connect errors, TLS failures and malformed responses all mean
            // there is no usable gateway at this address
            Ok(Err(e)) => VerifyResult::new(VerifyStatus::Unreachable, e.to_string(), started),
            Ok(Ok(response)) => {
                let code = response.status();
                let status = if code.is_success() {
                    VerifyStatus::Ok
                } else if code == reqwest::StatusCode::UNAUTHORIZED
                    || code == reqwest::StatusCode::FORBIDDEN
                {
                    VerifyStatus::Unauthenticated
                } else {
                    VerifyStatus::UnexpectedResponse
                };
                let mut result =
                    VerifyResult::new(status, format!("Gateway answered {}", code), started);
                result.http_status = Some(code.as_u16());
                result
            }
        };

        tracing::info!(
            "Verified remote '{}' at {}: {:?} ({} ms)",
            conn.id,
            url,
            result.status,
            result.latency_ms
        );
        result
    }
}
