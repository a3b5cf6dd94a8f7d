//! Shared types for the plugmy supervisor.
//!
//! This library defines the status payload served by the local daemon and
//! the constants the supervisor and its collaborators agree on.

use serde::{Deserialize, Serialize};

/// Port the daemon listens on by default.
pub const DEFAULT_DAEMON_PORT: u16 = 21110;

/// Path of the daemon status endpoint.
pub const STATUS_PATH: &str = "/v1/status";

/// Label used for the login agent that keeps the daemon alive.
pub const SERVICE_LABEL: &str = "ai.plugmy.daemon";

/// File name of the daemon executable shipped beside the supervisor.
pub const DAEMON_BINARY_NAME: &str = "plug-my-ai";

/// Flag that disables the daemon's own tray icon.
pub const NO_TRAY_FLAG: &str = "--no-tray";

/// Body of the daemon's `GET /v1/status` response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DaemonStatus {
    /// Health indicator; `"ok"` while the daemon is serving.
    pub status: String,
    /// Daemon version string.
    pub version: String,
    /// Seconds since the daemon started.
    #[serde(rename = "uptime_s")]
    pub uptime_secs: u64,
    /// Port the daemon is bound to.
    pub port: u16,
    /// Identifiers of the configured providers.
    #[serde(default)]
    pub providers: Vec<String>,
}

impl DaemonStatus {
    /// Return `true` when the daemon reports itself healthy.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.status == "ok"
    }
}

/// Build the status URL for a daemon listening on `port` on the loopback
/// interface.
///
/// # Examples
///
/// ```
/// assert_eq!(
///     plugmy_lib::status_url(21110),
///     "http://localhost:21110/v1/status",
/// );
/// ```
#[must_use]
pub fn status_url(port: u16) -> String {
    format!("http://localhost:{port}{STATUS_PATH}")
}
