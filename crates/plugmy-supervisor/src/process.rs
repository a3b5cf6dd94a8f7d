//! Direct supervision of the daemon as a child process.
//!
//! Used when the daemon is neither reachable nor registered as a login agent.
//! A supervision task owns the child: it relaunches the daemon after an
//! unexpected exit, waiting a constant delay between attempts, and gives up
//! once the restart budget is spent. The budget is refilled whenever a child
//! stays up for the configured stable period.
//!
//! Stopping always wins over restarting. The task checks for a stop request
//! before every launch and while every child is running or a restart is
//! pending, so once [`ProcessSupervisor::stop`] returns no child is left.

use backon::{BackoffBuilder, ConstantBackoff, ConstantBuilder};
use std::ffi::{CString, OsString};
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio::process::{Child, Command};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::config::Config;

/// Failures surfaced by [`ProcessSupervisor::start`].
#[derive(Debug, Error)]
pub enum ProcessError {
    /// No executable file exists at the resolved path.
    #[error("daemon binary not found or not executable: {path:?}")]
    BinaryNotFound { path: PathBuf },
    /// The OS refused to launch the binary.
    #[error("failed to launch {path:?}: {source}")]
    SpawnFailure {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, ProcessError>;

/// What the supervisor is doing with the child right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    /// Never started.
    Idle,
    /// A child is being launched.
    Launching,
    /// A child is running.
    Running { pid: u32 },
    /// The child exited and a relaunch is pending.
    RestartScheduled,
    /// Stopped on request; no relaunch will follow.
    StoppedByRequest,
    /// The restart budget is spent or a relaunch could not be spawned.
    Failed,
}

/// How to launch and relaunch the daemon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSettings {
    pub binary: PathBuf,
    pub arguments: Vec<String>,
    /// Prepended, in order, to the inherited `PATH`.
    pub extra_search_paths: Vec<PathBuf>,
    pub restart_delay: Duration,
    pub max_restarts: usize,
    pub stable_after: Duration,
    /// Grace between SIGTERM and SIGKILL.
    pub stop_timeout: Duration,
}

impl LaunchSettings {
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            binary: config.resolve_daemon_binary(),
            arguments: config.daemon_args.clone(),
            extra_search_paths: config.extra_search_paths.clone(),
            restart_delay: Duration::from_millis(config.restart_delay_ms),
            max_restarts: config.max_restarts,
            stable_after: Duration::from_secs(config.stable_after_secs),
            stop_timeout: Duration::from_millis(config.stop_timeout_ms),
        }
    }

    fn restart_backoff(&self) -> ConstantBackoff {
        ConstantBuilder::default()
            .with_delay(self.restart_delay)
            .with_max_times(self.max_restarts)
            .build()
    }

    /// `PATH` for the child: extra directories first, then the inherited value.
    fn search_path(&self) -> Option<OsString> {
        let inherited = std::env::var_os("PATH");
        let dirs = self.extra_search_paths.iter().cloned().chain(
            inherited
                .iter()
                .flat_map(std::env::split_paths)
                .collect::<Vec<_>>(),
        );
        match std::env::join_paths(dirs) {
            Ok(path) => Some(path),
            Err(e) => {
                tracing::warn!(error = %e, "Cannot extend PATH; child inherits it unchanged");
                inherited
            }
        }
    }
}

struct Supervision {
    generation: u64,
    shutdown_tx: watch::Sender<()>,
    task: JoinHandle<()>,
}

type Slot = Arc<Mutex<Option<Supervision>>>;

fn lock_slot(slot: &Mutex<Option<Supervision>>) -> MutexGuard<'_, Option<Supervision>> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Publishes state for one supervision task while it is the installed one.
///
/// A task still winding down after `stop` cannot overwrite the state of a
/// child launched by a later `start`.
struct StatePublisher {
    generation: u64,
    slot: Slot,
    tx: Arc<watch::Sender<ProcessState>>,
}

impl StatePublisher {
    fn publish(&self, state: ProcessState) {
        let slot = lock_slot(&self.slot);
        if slot.as_ref().is_some_and(|s| s.generation == self.generation) {
            self.tx.send_replace(state);
        }
    }
}

/// Launches the daemon and keeps it alive until told to stop.
///
/// Cloning yields another handle to the same supervisor.
#[derive(Clone)]
pub struct ProcessSupervisor {
    settings: Arc<LaunchSettings>,
    supervision: Slot,
    generations: Arc<AtomicU64>,
    state_tx: Arc<watch::Sender<ProcessState>>,
}

impl std::fmt::Debug for ProcessSupervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessSupervisor")
            .field("settings", &self.settings)
            .field("state", &self.state())
            .finish()
    }
}

impl ProcessSupervisor {
    #[must_use]
    pub fn new(settings: LaunchSettings) -> Self {
        let (state_tx, _) = watch::channel(ProcessState::Idle);
        Self {
            settings: Arc::new(settings),
            supervision: Arc::new(Mutex::new(None)),
            generations: Arc::new(AtomicU64::new(0)),
            state_tx: Arc::new(state_tx),
        }
    }

    #[must_use]
    pub fn settings(&self) -> &LaunchSettings {
        &self.settings
    }

    /// Launch the daemon and begin supervising it.
    ///
    /// Calling `start` while a child is already supervised does nothing.
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    /// [`ProcessError::BinaryNotFound`] when the binary is missing or not
    /// executable, [`ProcessError::SpawnFailure`] when launching fails. No
    /// restart is scheduled in either case.
    pub fn start(&self) -> Result<()> {
        let mut supervision = self.lock();
        if supervision.as_ref().is_some_and(|s| !s.task.is_finished()) {
            tracing::debug!("Daemon already supervised; ignoring start");
            return Ok(());
        }
        ensure_executable(&self.settings.binary)?;
        self.state_tx.send_replace(ProcessState::Launching);
        let child = match spawn_child(&self.settings) {
            Ok(child) => child,
            Err(e) => {
                self.state_tx.send_replace(ProcessState::Failed);
                return Err(e);
            }
        };
        // The slot stays locked until the new supervision is installed, so the
        // task cannot publish before it is current.
        let generation = self.generations.fetch_add(1, Ordering::Relaxed);
        let (shutdown_tx, shutdown_rx) = watch::channel(());
        let publisher = StatePublisher {
            generation,
            slot: Arc::clone(&self.supervision),
            tx: Arc::clone(&self.state_tx),
        };
        let task = tokio::spawn(supervise(
            Arc::clone(&self.settings),
            child,
            shutdown_rx,
            publisher,
        ));
        *supervision = Some(Supervision {
            generation,
            shutdown_tx,
            task,
        });
        Ok(())
    }

    /// Stop the daemon and cancel any pending relaunch.
    ///
    /// The child receives SIGTERM and, if it has not exited within the stop
    /// timeout, SIGKILL. Returns once the child is gone. Idempotent.
    ///
    /// A `start` racing with the termination installs a fresh supervision;
    /// its state is left as is.
    pub async fn stop(&self) {
        let Some(supervision) = self.lock().take() else {
            return;
        };
        let _ = supervision.shutdown_tx.send(());
        if let Err(e) = supervision.task.await {
            tracing::error!(error = %e, "Supervision task ended abnormally");
        }
        let slot = self.lock();
        if slot.is_some() {
            tracing::debug!("Daemon restarted while stopping; keeping its state");
        } else if *self.state_tx.borrow() != ProcessState::Failed {
            self.state_tx.send_replace(ProcessState::StoppedByRequest);
        }
    }

    /// Whether this supervisor currently owns a daemon child or a pending
    /// relaunch of one.
    #[must_use]
    pub fn is_managing_subprocess(&self) -> bool {
        self.lock().as_ref().is_some_and(|s| !s.task.is_finished())
    }

    #[must_use]
    pub fn state(&self) -> ProcessState {
        *self.state_tx.borrow()
    }

    /// Observe state transitions.
    #[must_use]
    pub fn subscribe_state(&self) -> watch::Receiver<ProcessState> {
        self.state_tx.subscribe()
    }

    fn lock(&self) -> MutexGuard<'_, Option<Supervision>> {
        lock_slot(&self.supervision)
    }
}

/// A regular file the current user may execute.
fn ensure_executable(path: &Path) -> Result<()> {
    if path.is_file() && may_execute(path) {
        Ok(())
    } else {
        Err(ProcessError::BinaryNotFound {
            path: path.to_path_buf(),
        })
    }
}

fn may_execute(path: &Path) -> bool {
    let Ok(c_path) = CString::new(path.as_os_str().as_bytes()) else {
        return false;
    };
    // SAFETY: `c_path` is a valid NUL-terminated string for the whole call.
    unsafe { libc::access(c_path.as_ptr(), libc::X_OK) == 0 }
}

fn spawn_child(settings: &LaunchSettings) -> Result<Child> {
    let mut command = Command::new(&settings.binary);
    command
        .args(&settings.arguments)
        .stdin(Stdio::null())
        .kill_on_drop(true);
    if let Some(path) = settings.search_path() {
        command.env("PATH", path);
    }
    let child = command.spawn().map_err(|source| ProcessError::SpawnFailure {
        path: settings.binary.clone(),
        source,
    })?;
    tracing::info!(
        binary = %settings.binary.display(),
        pid = child.id(),
        "Daemon launched as subprocess"
    );
    Ok(child)
}

/// Whether a stop has been requested. A dropped sender counts as one.
fn stop_requested(shutdown: &watch::Receiver<()>) -> bool {
    shutdown.has_changed().unwrap_or(true)
}

/// Sleep for `d` or return early if `shutdown` is triggered.
///
/// Returns `true` if a shutdown occurred.
async fn sleep_or_shutdown(shutdown: &mut watch::Receiver<()>, d: Duration) -> bool {
    tokio::select! {
        biased;
        _ = shutdown.changed() => true,
        () = tokio::time::sleep(d) => false,
    }
}

async fn supervise(
    settings: Arc<LaunchSettings>,
    first: Child,
    mut shutdown: watch::Receiver<()>,
    state: StatePublisher,
) {
    let mut backoff = settings.restart_backoff();
    let mut child = Some(first);
    loop {
        if let Some(mut running) = child.take() {
            let started = Instant::now();
            state.publish(ProcessState::Running {
                pid: running.id().unwrap_or_default(),
            });
            tokio::select! {
                biased;
                _ = shutdown.changed() => {
                    terminate(&mut running, settings.stop_timeout).await;
                    return;
                }
                status = running.wait() => log_exit(status),
            }
            if started.elapsed() >= settings.stable_after {
                backoff = settings.restart_backoff();
            }
        }

        let Some(delay) = backoff.next() else {
            tracing::error!(
                max_restarts = settings.max_restarts,
                "Daemon keeps exiting; giving up on restarts"
            );
            state.publish(ProcessState::Failed);
            return;
        };
        state.publish(ProcessState::RestartScheduled);
        tracing::info!(delay_ms = delay.as_millis(), "Scheduling daemon restart");
        if sleep_or_shutdown(&mut shutdown, delay).await || stop_requested(&shutdown) {
            return;
        }

        state.publish(ProcessState::Launching);
        if !settings.binary.is_file() {
            tracing::error!(binary = %settings.binary.display(), "Daemon binary disappeared");
            continue;
        }
        match spawn_child(&settings) {
            Ok(c) => child = Some(c),
            Err(e) => tracing::error!(error = %e, "Daemon relaunch failed"),
        }
    }
}

fn log_exit(status: std::io::Result<ExitStatus>) {
    match status {
        Ok(s) if s.success() => tracing::warn!("Daemon exited"),
        Ok(s) => tracing::warn!(status = %s, "Daemon exited unexpectedly"),
        Err(e) => tracing::error!(error = %e, "Failed to wait for daemon"),
    }
}

/// SIGTERM, then SIGKILL once `grace` has passed.
async fn terminate(child: &mut Child, grace: Duration) {
    let Some(pid) = child.id() else {
        return;
    };
    match i32::try_from(pid) {
        // SAFETY: signalling a pid we own; a stale pid yields ESRCH, which
        // is harmless.
        Ok(pid) => unsafe {
            libc::kill(pid, libc::SIGTERM);
        },
        Err(_) => {
            let _ = child.start_kill();
        }
    }
    match tokio::time::timeout(grace, child.wait()).await {
        Ok(_) => tracing::info!(pid, "Daemon stopped"),
        Err(_) => {
            tracing::warn!(pid, "Daemon ignored SIGTERM; killing");
            if let Err(e) = child.kill().await {
                tracing::error!(pid, error = %e, "Failed to kill daemon");
            }
        }
    }
}
