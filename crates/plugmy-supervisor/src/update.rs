//! Preparing the system for an application update.
//!
//! Before an update replaces the daemon binary, nothing may hold it open:
//! the subprocess is stopped and the login agent unloaded. The agent's
//! descriptor is kept so the user's start-at-login choice survives the
//! update; the next startup re-bootstraps it from the new binary.

use std::sync::Arc;
use std::time::Duration;

use crate::process::ProcessSupervisor;
use crate::registrar::ServiceRegistrar;

/// Quiesces the daemon ahead of an update.
#[derive(Debug, Clone)]
pub struct UpdateCoordinator {
    process: ProcessSupervisor,
    registrar: Arc<ServiceRegistrar>,
    grace: Duration,
}

impl UpdateCoordinator {
    /// `grace` is how long launchd is given to finish unloading the agent.
    #[must_use]
    pub fn new(process: ProcessSupervisor, registrar: Arc<ServiceRegistrar>, grace: Duration) -> Self {
        Self {
            process,
            registrar,
            grace,
        }
    }

    /// Stop the subprocess, unload the agent, wait out the grace period, then
    /// run `proceed`.
    ///
    /// `proceed` always runs, and runs exactly once: every step before it is
    /// best effort and failures are only logged.
    pub async fn prepare_for_install<F, T>(&self, proceed: F) -> T
    where
        F: FnOnce() -> T,
    {
        tracing::info!("Preparing for update install");
        self.process.stop().await;
        self.registrar.bootout_only().await;
        tokio::time::sleep(self.grace).await;
        tracing::info!("Daemon quiesced; handing over to installer");
        proceed()
    }
}
