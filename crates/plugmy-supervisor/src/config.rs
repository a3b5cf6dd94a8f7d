//! Configuration loading for the plugmy supervisor.
//!
//! The configuration is read from `plugmy/supervisor.toml` in the user's
//! configuration directory when it exists. Values may be overridden by
//! environment variables using the `PLUGMYD_` prefix and by command-line
//! flags.

use clap::{Parser, Subcommand};
use figment::Figment;
use figment::providers::Env;
use plugmy_lib::{DAEMON_BINARY_NAME, DEFAULT_DAEMON_PORT, NO_TRAY_FLAG, SERVICE_LABEL};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default timeout in milliseconds for the startup reachability probe.
const DEFAULT_PROBE_TIMEOUT_MS: u64 = 2_000;
/// Default period in seconds between status polls.
const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;
/// Default timeout in milliseconds for each status poll.
const DEFAULT_POLL_TIMEOUT_MS: u64 = 3_000;
/// Default delay in milliseconds before relaunching a crashed daemon.
const DEFAULT_RESTART_DELAY_MS: u64 = 2_000;
/// Default number of consecutive relaunches before giving up.
const DEFAULT_MAX_RESTARTS: usize = 5;
/// Default uptime in seconds after which a daemon counts as stable and the
/// restart budget is refilled.
const DEFAULT_STABLE_AFTER_SECS: u64 = 30;
/// Default grace in milliseconds between SIGTERM and SIGKILL on stop.
const DEFAULT_STOP_TIMEOUT_MS: u64 = 5_000;
/// Default wait in milliseconds for launchd to finish unloading before an
/// update installs.
const DEFAULT_INSTALL_GRACE_MS: u64 = 1_000;
/// Default window in milliseconds for confirming a re-bootstrapped agent.
const DEFAULT_BOOTSTRAP_CONFIRM_MS: u64 = 3_000;
/// Default bound in milliseconds on a single `launchctl` invocation.
const DEFAULT_SERVICE_MANAGER_TIMEOUT_MS: u64 = 10_000;
/// Default location of the `launchctl` tool.
const DEFAULT_LAUNCHCTL_PATH: &str = "/bin/launchctl";
/// Default directory for the agent's stdout and stderr logs.
const DEFAULT_LOG_DIR: &str = "/tmp";

/// Runtime configuration for the supervisor.
#[derive(Debug, Deserialize, Serialize, PartialEq, Eq, Clone)]
pub struct Config {
    /// Port of the daemon's local HTTP endpoint.
    #[serde(default = "default_daemon_port")]
    pub daemon_port: u16,
    /// Explicit daemon executable. When unset the binary is looked up beside
    /// the supervisor executable.
    #[serde(default)]
    pub daemon_binary: Option<PathBuf>,
    /// Arguments passed to the daemon, both as a subprocess and as an agent.
    #[serde(default = "default_daemon_args")]
    pub daemon_args: Vec<String>,
    /// Directories prepended to the child's `PATH`.
    #[serde(default = "default_extra_search_paths")]
    pub extra_search_paths: Vec<PathBuf>,
    /// Timeout applied to the startup probe in milliseconds.
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,
    /// Period between status polls in seconds.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// Timeout applied to each status poll in milliseconds.
    #[serde(default = "default_poll_timeout_ms")]
    pub poll_timeout_ms: u64,
    /// Delay before relaunching a daemon that exited unexpectedly.
    #[serde(default = "default_restart_delay_ms")]
    pub restart_delay_ms: u64,
    /// Consecutive relaunches allowed before the supervisor gives up.
    #[serde(default = "default_max_restarts")]
    pub max_restarts: usize,
    /// Uptime after which the restart budget is refilled.
    #[serde(default = "default_stable_after_secs")]
    pub stable_after_secs: u64,
    /// Grace between SIGTERM and SIGKILL when stopping the daemon.
    #[serde(default = "default_stop_timeout_ms")]
    pub stop_timeout_ms: u64,
    /// Wait between unloading the agent and letting an update install.
    #[serde(default = "default_install_grace_ms")]
    pub install_grace_ms: u64,
    /// Window for confirming a re-bootstrapped agent answers its endpoint.
    #[serde(default = "default_bootstrap_confirm_ms")]
    pub bootstrap_confirm_ms: u64,
    /// Directory holding the login agent property list.
    #[serde(default = "default_agent_dir")]
    pub agent_dir: PathBuf,
    /// Label of the login agent.
    #[serde(default = "default_service_label")]
    pub service_label: String,
    /// Directory receiving the agent's stdout and stderr logs.
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
    /// Path of the `launchctl` tool.
    #[serde(default = "default_launchctl_path")]
    pub launchctl_path: PathBuf,
    /// Bound on a single service manager invocation in milliseconds.
    #[serde(default = "default_service_manager_timeout_ms")]
    pub service_manager_timeout_ms: u64,
}

/// Convert a [`test_support::daemon::TestConfig`] into a [`Config`].
///
/// Only available when the `test-support` feature is enabled, or in unit
/// tests.
///
/// ```rust,no_run
/// use plugmy_supervisor::config::Config;
/// use test_support::temp_config;
///
/// let tmp = tempfile::tempdir().expect("create tempdir");
/// let cfg: Config = temp_config(&tmp).into();
/// assert_eq!(cfg.max_restarts, 3);
/// ```
#[cfg(any(test, feature = "test-support"))]
impl From<test_support::daemon::TestConfig> for Config {
    fn from(value: test_support::daemon::TestConfig) -> Self {
        Self::from(&value)
    }
}

#[cfg(any(test, feature = "test-support"))]
impl From<&test_support::daemon::TestConfig> for Config {
    fn from(value: &test_support::daemon::TestConfig) -> Self {
        Self {
            daemon_port: value.daemon_port,
            daemon_binary: Some(value.daemon_binary.clone()),
            daemon_args: default_daemon_args(),
            extra_search_paths: default_extra_search_paths(),
            probe_timeout_ms: value.probe_timeout_ms,
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            poll_timeout_ms: value.probe_timeout_ms,
            restart_delay_ms: value.restart_delay_ms,
            max_restarts: value.max_restarts,
            stable_after_secs: DEFAULT_STABLE_AFTER_SECS,
            stop_timeout_ms: value.stop_timeout_ms,
            install_grace_ms: value.install_grace_ms,
            bootstrap_confirm_ms: value.bootstrap_confirm_ms,
            agent_dir: value.agent_dir.clone(),
            service_label: SERVICE_LABEL.to_owned(),
            log_dir: value.log_dir.clone(),
            launchctl_path: value.launchctl_path.clone(),
            service_manager_timeout_ms: DEFAULT_SERVICE_MANAGER_TIMEOUT_MS,
        }
    }
}

/// Command-line interface of the `plugmy-supervisor` binary.
#[derive(Debug, Default, Parser, Serialize)]
#[command(name = "plugmy-supervisor", about = "Keep the plug-my-ai daemon running")]
pub struct Cli {
    /// Path to the configuration file.
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,
    /// Override the daemon executable.
    #[arg(long, value_name = "PATH")]
    pub daemon_binary: Option<PathBuf>,
    /// Override the daemon port.
    #[arg(long, value_name = "PORT")]
    pub daemon_port: Option<u16>,
    /// Action to perform; defaults to `run`.
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Actions offered by the binary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Subcommand, Serialize)]
pub enum Command {
    /// Supervise the daemon until interrupted.
    #[default]
    Run,
    /// Probe the daemon once and print its status as JSON.
    Status,
    /// Toggle the login agent and print the new state.
    Autostart,
    /// Unload the login agent ahead of an update and wait for launchd.
    PrepareInstall,
}

fn default_daemon_port() -> u16 {
    DEFAULT_DAEMON_PORT
}

fn default_daemon_args() -> Vec<String> {
    vec![NO_TRAY_FLAG.to_owned()]
}

fn default_extra_search_paths() -> Vec<PathBuf> {
    vec![
        PathBuf::from("/usr/local/bin"),
        PathBuf::from("/opt/homebrew/bin"),
    ]
}

fn default_probe_timeout_ms() -> u64 {
    DEFAULT_PROBE_TIMEOUT_MS
}

fn default_poll_interval_secs() -> u64 {
    DEFAULT_POLL_INTERVAL_SECS
}

fn default_poll_timeout_ms() -> u64 {
    DEFAULT_POLL_TIMEOUT_MS
}

fn default_restart_delay_ms() -> u64 {
    DEFAULT_RESTART_DELAY_MS
}

fn default_max_restarts() -> usize {
    DEFAULT_MAX_RESTARTS
}

fn default_stable_after_secs() -> u64 {
    DEFAULT_STABLE_AFTER_SECS
}

fn default_stop_timeout_ms() -> u64 {
    DEFAULT_STOP_TIMEOUT_MS
}

fn default_install_grace_ms() -> u64 {
    DEFAULT_INSTALL_GRACE_MS
}

fn default_bootstrap_confirm_ms() -> u64 {
    DEFAULT_BOOTSTRAP_CONFIRM_MS
}

fn default_agent_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("/"))
        .join("Library/LaunchAgents")
}

fn default_service_label() -> String {
    SERVICE_LABEL.to_owned()
}

fn default_log_dir() -> PathBuf {
    PathBuf::from(DEFAULT_LOG_DIR)
}

fn default_launchctl_path() -> PathBuf {
    PathBuf::from(DEFAULT_LAUNCHCTL_PATH)
}

fn default_service_manager_timeout_ms() -> u64 {
    DEFAULT_SERVICE_MANAGER_TIMEOUT_MS
}

impl Config {
    /// Location of the configuration file when `--config` is not given.
    #[must_use]
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("/etc"))
            .join("plugmy/supervisor.toml")
    }

    /// Parse the command line and load the configuration it points at.
    #[expect(clippy::result_large_err, reason = "propagate figment errors")]
    pub fn load() -> Result<(Self, Command), ortho_config::OrthoError> {
        let cli = Cli::parse();
        let path = cli.config.clone().unwrap_or_else(Self::default_path);
        let cfg = Self::from_file_with_cli(&path, &cli)?;
        Ok((cfg, cli.command.unwrap_or_default()))
    }

    /// Load the configuration from `path`, merging `PLUGMYD_*` environment
    /// variables over file values. A missing file yields the defaults.
    #[expect(clippy::result_large_err, reason = "propagate figment errors")]
    pub fn from_file(path: &Path) -> Result<Self, ortho_config::OrthoError> {
        Self::from_file_with_cli(path, &Cli::default())
    }

    #[expect(clippy::result_large_err, reason = "propagate figment errors")]
    fn from_file_with_cli(path: &Path, cli: &Cli) -> Result<Self, ortho_config::OrthoError> {
        let mut fig = ortho_config::load_config_file(path)?.unwrap_or_else(Figment::new);

        fig = fig.merge(Env::prefixed("PLUGMYD_").split("__"));
        let mut cfg: Self = fig.extract().map_err(ortho_config::OrthoError::from)?;

        if let Some(binary) = &cli.daemon_binary {
            cfg.daemon_binary = Some(binary.clone());
        }
        if let Some(port) = cli.daemon_port {
            cfg.daemon_port = port;
        }
        cfg.check_timers().map_err(ortho_config::OrthoError::from)?;
        Ok(cfg)
    }

    /// Periods and timeouts that drive timers cannot be zero.
    fn check_timers(&self) -> Result<(), figment::Error> {
        let timers = [
            ("probe_timeout_ms", self.probe_timeout_ms),
            ("poll_interval_secs", self.poll_interval_secs),
            ("poll_timeout_ms", self.poll_timeout_ms),
            ("service_manager_timeout_ms", self.service_manager_timeout_ms),
        ];
        if let Some((key, _)) = timers.iter().find(|(_, value)| *value == 0) {
            return Err(figment::Error::from(format!("{key} must be greater than zero")));
        }
        Ok(())
    }

    /// Daemon status endpoint.
    #[must_use]
    pub fn status_url(&self) -> String {
        plugmy_lib::status_url(self.daemon_port)
    }

    /// Resolve the daemon executable.
    ///
    /// An explicit `daemon_binary` wins; otherwise the binary is expected
    /// beside the running supervisor, so a relocated install is picked up on
    /// every call.
    #[must_use]
    pub fn resolve_daemon_binary(&self) -> PathBuf {
        if let Some(path) = &self.daemon_binary {
            return path.clone();
        }
        std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(Path::to_path_buf))
            .unwrap_or_default()
            .join(DAEMON_BINARY_NAME)
    }

    /// Location of the login agent property list.
    #[must_use]
    pub fn descriptor_path(&self) -> PathBuf {
        self.agent_dir.join(format!("{}.plist", self.service_label))
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }

    pub fn install_grace(&self) -> Duration {
        Duration::from_millis(self.install_grace_ms)
    }

    pub fn bootstrap_confirm(&self) -> Duration {
        Duration::from_millis(self.bootstrap_confirm_ms)
    }
}
