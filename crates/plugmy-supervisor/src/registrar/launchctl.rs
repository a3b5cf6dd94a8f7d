//! Service manager interactions.
//!
//! [`ServiceManager`] is the seam between the registrar and launchd; the
//! production implementation shells out to `launchctl` within the user's GUI
//! domain. Every call is bounded by a timeout so a wedged launchd cannot stall
//! the supervisor.

use async_trait::async_trait;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;

/// Errors raised by a service manager call.
///
/// The registrar logs these and carries on; they never reach its callers.
#[derive(Debug, Error)]
pub enum ServiceManagerError {
    #[error("failed to run {program:?}: {source}")]
    Spawn {
        program: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("launchctl {action} exited with {code:?}: {stderr}")]
    Failed {
        action: &'static str,
        code: Option<i32>,
        stderr: String,
    },
    #[error("launchctl {action} did not finish within {timeout:?}")]
    TimedOut {
        action: &'static str,
        timeout: Duration,
    },
}

/// Registers and unregisters agent descriptors with the OS.
#[async_trait]
pub trait ServiceManager: Send + Sync {
    /// Load the descriptor at `descriptor` into the service manager.
    async fn bootstrap(&self, descriptor: &Path) -> Result<(), ServiceManagerError>;

    /// Unload the descriptor at `descriptor` without touching the file.
    async fn bootout(&self, descriptor: &Path) -> Result<(), ServiceManagerError>;
}

/// `launchctl` in the `gui/<uid>` domain.
#[derive(Debug, Clone)]
pub struct Launchctl {
    program: PathBuf,
    domain: String,
    timeout: Duration,
}

impl Launchctl {
    /// Target the current user's GUI domain.
    #[must_use]
    pub fn for_current_user(program: impl Into<PathBuf>, timeout: Duration) -> Self {
        // SAFETY: `getuid(2)` has no preconditions and cannot fail.
        let uid = unsafe { libc::getuid() };
        Self::new(program, format!("gui/{uid}"), timeout)
    }

    #[must_use]
    pub fn new(program: impl Into<PathBuf>, domain: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            domain: domain.into(),
            timeout,
        }
    }

    async fn run(&self, action: &'static str, descriptor: &Path) -> Result<(), ServiceManagerError> {
        let mut command = Command::new(&self.program);
        command
            .arg(action)
            .arg(&self.domain)
            .arg(descriptor)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        let child = command.spawn().map_err(|source| ServiceManagerError::Spawn {
            program: self.program.clone(),
            source,
        })?;
        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| ServiceManagerError::TimedOut {
                action,
                timeout: self.timeout,
            })?
            .map_err(|source| ServiceManagerError::Spawn {
                program: self.program.clone(),
                source,
            })?;
        if output.status.success() {
            Ok(())
        } else {
            Err(ServiceManagerError::Failed {
                action,
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
            })
        }
    }
}

#[async_trait]
impl ServiceManager for Launchctl {
    async fn bootstrap(&self, descriptor: &Path) -> Result<(), ServiceManagerError> {
        self.run("bootstrap", descriptor).await
    }

    async fn bootout(&self, descriptor: &Path) -> Result<(), ServiceManagerError> {
        self.run("bootout", descriptor).await
    }
}
