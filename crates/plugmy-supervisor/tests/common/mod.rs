//! Helpers shared by the supervisor integration tests.

#![allow(dead_code, reason = "each test binary uses a subset")]

use plugmy_supervisor::config::Config;
use std::path::Path;
use test_support::daemon::TestConfig;

/// Build a [`Config`] from a [`TestConfig`].
///
/// The conversion normally relies on the crate's `test-support` feature.
#[cfg(feature = "test-support")]
pub fn cfg_from(cfg: &TestConfig) -> Config {
    Config::from(cfg)
}

/// Fallback when the `test-support` feature is disabled.
#[cfg(not(feature = "test-support"))]
pub fn cfg_from(cfg: &TestConfig) -> Config {
    let defaults = Config::from_file(Path::new("/nonexistent/supervisor.toml"))
        .unwrap_or_else(|e| panic!("default configuration: {e}"));
    Config {
        daemon_port: cfg.daemon_port,
        daemon_binary: Some(cfg.daemon_binary.clone()),
        probe_timeout_ms: cfg.probe_timeout_ms,
        poll_timeout_ms: cfg.probe_timeout_ms,
        restart_delay_ms: cfg.restart_delay_ms,
        max_restarts: cfg.max_restarts,
        stop_timeout_ms: cfg.stop_timeout_ms,
        install_grace_ms: cfg.install_grace_ms,
        bootstrap_confirm_ms: cfg.bootstrap_confirm_ms,
        agent_dir: cfg.agent_dir.clone(),
        log_dir: cfg.log_dir.clone(),
        launchctl_path: cfg.launchctl_path.clone(),
        ..defaults
    }
}

/// Write a descriptor at the configured location so the agent counts as
/// registered.
pub fn register_agent(cfg: &Config) {
    let path = cfg.descriptor_path();
    std::fs::create_dir_all(path.parent().unwrap_or_else(|| Path::new("/")))
        .unwrap_or_else(|e| panic!("create agent dir: {e}"));
    std::fs::write(&path, "<plist/>").unwrap_or_else(|e| panic!("write descriptor: {e}"));
}
