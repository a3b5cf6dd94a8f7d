//! Reachability checks against the daemon's status endpoint.
//!
//! A probe issues a single `GET` bounded by a per-call timeout. Refused
//! connections, malformed responses, non-200 statuses and timeouts all fold
//! into [`StatusSnapshot::unreachable`]; callers cannot and should not tell
//! them apart. Retries are the caller's business.
//!
//! The daemon is always local, so the client ignores proxy settings from the
//! environment.

use plugmy_lib::DaemonStatus;
use reqwest::{Client, StatusCode};
use serde::{Serialize, Serializer};
use std::time::Duration;
use thiserror::Error;

/// Result of one probe.
///
/// Snapshots are immutable once produced; metadata fields are only present
/// when the daemon answered 200 with a well-formed status body.
///
/// Serializes with absent metadata omitted and uptime in whole seconds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatusSnapshot {
    /// The daemon answered 200 within the timeout.
    pub reachable: bool,
    /// Version reported by the daemon.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    /// Time since the daemon started.
    #[serde(
        rename = "uptime_s",
        skip_serializing_if = "Option::is_none",
        serialize_with = "serialize_secs"
    )]
    pub uptime: Option<Duration>,
    /// Port the daemon reports it is bound to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    /// Provider identifiers reported by the daemon.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub providers: Option<Vec<String>>,
}

fn serialize_secs<S: Serializer>(uptime: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
    uptime.map(|d| d.as_secs()).serialize(s)
}

impl StatusSnapshot {
    /// Snapshot for a daemon that cannot currently be relied on.
    #[must_use]
    pub fn unreachable() -> Self {
        Self::default()
    }

    /// Snapshot for a daemon that answered 200 but whose body could not be
    /// decoded.
    #[must_use]
    pub fn reachable_without_metadata() -> Self {
        Self {
            reachable: true,
            ..Self::default()
        }
    }

    /// Number of providers reported, zero when unknown.
    #[must_use]
    pub fn provider_count(&self) -> usize {
        self.providers.as_ref().map_or(0, Vec::len)
    }
}

impl From<DaemonStatus> for StatusSnapshot {
    fn from(status: DaemonStatus) -> Self {
        Self {
            reachable: true,
            version: Some(status.version),
            uptime: Some(Duration::from_secs(status.uptime_secs)),
            port: Some(status.port),
            providers: Some(status.providers),
        }
    }
}

/// The HTTP client behind a probe could not be built.
#[derive(Debug, Error)]
#[error("failed to build status client: {0}")]
pub struct ClientError(#[from] reqwest::Error);

/// Outcome of a request, before folding.
enum ProbeError {
    Timeout,
    Transport(reqwest::Error),
    Status(StatusCode),
}

/// Issues bounded status requests against a fixed endpoint.
#[derive(Debug, Clone)]
pub struct ReachabilityProbe {
    client: Client,
    url: String,
}

impl ReachabilityProbe {
    /// Create a probe for `url`.
    ///
    /// The client carries no global timeout; each call supplies its own.
    ///
    /// # Errors
    /// Returns [`ClientError`] when the HTTP client cannot be initialised.
    pub fn new(url: impl Into<String>) -> Result<Self, ClientError> {
        let client = Client::builder().no_proxy().build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    /// Probe the endpoint of a daemon listening on `port` on the loopback
    /// interface.
    ///
    /// # Errors
    /// Returns [`ClientError`] when the HTTP client cannot be initialised.
    pub fn for_port(port: u16) -> Result<Self, ClientError> {
        Self::new(plugmy_lib::status_url(port))
    }

    /// Endpoint this probe targets.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Probe once, never blocking longer than `timeout`.
    pub async fn probe(&self, timeout: Duration) -> StatusSnapshot {
        match tokio::time::timeout(timeout, self.fetch()).await {
            Ok(Ok(body)) => decode(&body),
            Ok(Err(e)) => {
                log_failure(&self.url, &e);
                StatusSnapshot::unreachable()
            }
            Err(_) => {
                log_failure(&self.url, &ProbeError::Timeout);
                StatusSnapshot::unreachable()
            }
        }
    }

    /// Probe once and report only reachability.
    pub async fn is_reachable(&self, timeout: Duration) -> bool {
        self.probe(timeout).await.reachable
    }

    async fn fetch(&self) -> Result<Vec<u8>, ProbeError> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(ProbeError::Transport)?;
        if response.status() != StatusCode::OK {
            return Err(ProbeError::Status(response.status()));
        }
        let body = response.bytes().await.map_err(ProbeError::Transport)?;
        Ok(body.to_vec())
    }
}

fn decode(body: &[u8]) -> StatusSnapshot {
    match serde_json::from_slice::<DaemonStatus>(body) {
        Ok(status) => status.into(),
        Err(e) => {
            tracing::debug!(error = %e, "Status body did not decode; treating as reachable");
            StatusSnapshot::reachable_without_metadata()
        }
    }
}

fn log_failure(url: &str, error: &ProbeError) {
    match error {
        ProbeError::Timeout => tracing::debug!(url, "Daemon probe timed out"),
        ProbeError::Transport(e) => tracing::debug!(url, error = %e, "Daemon probe failed"),
        ProbeError::Status(code) => {
            tracing::debug!(url, status = code.as_u16(), "Daemon probe rejected");
        }
    }
}
