//! Helper utilities for supervisor tests.
//!
//! Provides constructors for temporary supervisor configurations whose
//! agent directory, logs and daemon binary live inside a [`TempDir`].

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tempfile::TempDir;

use crate::status::closed_port;

/// Minimal configuration used in supervisor tests.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TestConfig {
    /// Port of the daemon endpoint.
    pub daemon_port: u16,
    /// Daemon executable path.
    pub daemon_binary: PathBuf,
    /// Timeout for probes in milliseconds.
    pub probe_timeout_ms: u64,
    /// Delay before relaunching a crashed daemon in milliseconds.
    pub restart_delay_ms: u64,
    /// Consecutive relaunches allowed.
    pub max_restarts: usize,
    /// Grace between SIGTERM and SIGKILL in milliseconds.
    pub stop_timeout_ms: u64,
    /// Pre-install wait in milliseconds.
    pub install_grace_ms: u64,
    /// Window for confirming a bootstrapped agent in milliseconds.
    pub bootstrap_confirm_ms: u64,
    /// Directory holding the agent property list.
    pub agent_dir: PathBuf,
    /// Directory receiving agent logs.
    pub log_dir: PathBuf,
    /// Service manager tool; a fake written by the test.
    pub launchctl_path: PathBuf,
}

/// Build a [`TestConfig`] using paths inside `tmp`.
///
/// The daemon port refuses connections. Neither the daemon binary nor the
/// `launchctl` stand-in exists until a test writes one. Delays are short
/// enough for tests.
pub fn temp_config(tmp: &TempDir) -> TestConfig {
    TestConfig {
        daemon_port: closed_port(),
        daemon_binary: tmp.path().join("plug-my-ai"),
        probe_timeout_ms: 300,
        restart_delay_ms: 50,
        max_restarts: 3,
        stop_timeout_ms: 1_000,
        install_grace_ms: 10,
        bootstrap_confirm_ms: 200,
        agent_dir: tmp.path().join("LaunchAgents"),
        log_dir: tmp.path().join("logs"),
        launchctl_path: tmp.path().join("launchctl"),
    }
}

impl TestConfig {
    /// Point the configuration at a daemon listening on `port`.
    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.daemon_port = port;
        self
    }

    /// Override the daemon binary path.
    #[must_use]
    pub fn with_binary(mut self, binary: PathBuf) -> Self {
        self.daemon_binary = binary;
        self
    }

    /// Override the restart delay (milliseconds).
    #[must_use]
    pub fn with_restart_delay_ms(mut self, ms: u64) -> Self {
        self.restart_delay_ms = ms;
        self
    }

    /// Override the number of consecutive relaunches allowed.
    #[must_use]
    pub fn with_max_restarts(mut self, max: usize) -> Self {
        self.max_restarts = max;
        self
    }
}
