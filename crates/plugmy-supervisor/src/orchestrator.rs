//! Startup policy and the collaborator-facing surface.
//!
//! [`Supervisor`] decides, once per run, how the daemon will be made
//! available:
//!
//! 1. already answering its endpoint: nothing to do;
//! 2. registered as a login agent: re-bootstrap the agent and never spawn;
//! 3. binary present: launch and supervise it as a subprocess;
//! 4. otherwise: monitor only.
//!
//! None of these outcomes is fatal. A daemon that cannot be started is
//! reported through status snapshots like any other unreachable daemon.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::time::Instant;

use crate::config::Config;
use crate::poller::{StatusPoller, StatusSubscriber};
use crate::probe::{ClientError, ReachabilityProbe, StatusSnapshot};
use crate::process::{LaunchSettings, ProcessError, ProcessSupervisor};
use crate::registrar::{RegistrarError, ServiceRegistrar};
use crate::update::UpdateCoordinator;

/// Pause between confirmation probes after a bootstrap.
const CONFIRM_RETRY: Duration = Duration::from_millis(250);

/// How the daemon was made available at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Availability {
    /// The daemon was already answering; nothing was started.
    AlreadyRunning,
    /// The login agent was re-bootstrapped. `confirmed` records whether the
    /// daemon answered within the confirmation window.
    ServiceManaged { confirmed: bool },
    /// The daemon was launched as a supervised subprocess.
    Subprocess,
    /// Nothing could be started; only reachability is tracked.
    MonitorOnly,
}

impl Availability {
    /// Whether the daemon is expected to be usable.
    ///
    /// An unconfirmed bootstrap still counts: launchd may simply be slow.
    #[must_use]
    pub fn is_available(self) -> bool {
        !matches!(self, Self::MonitorOnly)
    }
}

#[derive(Debug, Clone, Copy)]
struct Timings {
    probe_timeout: Duration,
    poll_interval: Duration,
    poll_timeout: Duration,
    bootstrap_confirm: Duration,
}

/// Owns the daemon's lifecycle for one run of the supervisor.
pub struct Supervisor {
    probe: ReachabilityProbe,
    registrar: Arc<ServiceRegistrar>,
    process: ProcessSupervisor,
    update: UpdateCoordinator,
    poller: tokio::sync::Mutex<Option<StatusPoller>>,
    availability: Mutex<Option<Availability>>,
    timings: Timings,
}

impl std::fmt::Debug for Supervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Supervisor")
            .field("probe", &self.probe)
            .field("registrar", &self.registrar)
            .field("process", &self.process)
            .field("availability", &self.availability())
            .finish_non_exhaustive()
    }
}

impl Supervisor {
    /// Assemble a supervisor driving `launchctl` as configured.
    ///
    /// # Errors
    /// Returns [`ClientError`] when the status client cannot be built.
    pub fn from_config(config: &Config) -> Result<Self, ClientError> {
        Self::new(config, ServiceRegistrar::from_config(config))
    }

    /// Assemble a supervisor around an existing registrar.
    ///
    /// # Errors
    /// Returns [`ClientError`] when the status client cannot be built.
    pub fn new(config: &Config, registrar: ServiceRegistrar) -> Result<Self, ClientError> {
        let registrar = Arc::new(registrar);
        let process = ProcessSupervisor::new(LaunchSettings::from_config(config));
        let update =
            UpdateCoordinator::new(process.clone(), Arc::clone(&registrar), config.install_grace());
        Ok(Self {
            probe: ReachabilityProbe::new(config.status_url())?,
            registrar,
            process,
            update,
            poller: tokio::sync::Mutex::new(None),
            availability: Mutex::new(None),
            timings: Timings {
                probe_timeout: config.probe_timeout(),
                poll_interval: config.poll_interval(),
                poll_timeout: config.poll_timeout(),
                bootstrap_confirm: config.bootstrap_confirm(),
            },
        })
    }

    /// Apply the startup policy and record the outcome.
    pub async fn startup(&self) -> Availability {
        let availability = self.decide().await;
        tracing::info!(?availability, "Startup complete");
        *self
            .availability
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(availability);
        availability
    }

    /// Outcome of the last [`startup`](Self::startup), if any.
    #[must_use]
    pub fn availability(&self) -> Option<Availability> {
        *self
            .availability
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    async fn decide(&self) -> Availability {
        if self.probe.is_reachable(self.timings.probe_timeout).await {
            tracing::info!(url = self.probe.url(), "Daemon already running");
            return Availability::AlreadyRunning;
        }

        if self.registrar.is_registered() {
            match self.registrar.bootstrap_if_registered().await {
                Ok(true) => {
                    let confirmed = self.await_reachable(self.timings.bootstrap_confirm).await;
                    if !confirmed {
                        tracing::warn!(
                            window_ms = self.timings.bootstrap_confirm.as_millis(),
                            "Login agent bootstrapped but daemon not yet answering"
                        );
                    }
                    return Availability::ServiceManaged { confirmed };
                }
                // Descriptor vanished between the check and the bootstrap.
                Ok(false) => {}
                Err(e) => {
                    tracing::error!(error = %e, "Cannot repair login agent; monitoring only");
                    return Availability::MonitorOnly;
                }
            }
        }

        match self.process.start() {
            Ok(()) => Availability::Subprocess,
            Err(e @ ProcessError::BinaryNotFound { .. }) => {
                tracing::warn!(error = %e, "Daemon binary unavailable; monitoring only");
                Availability::MonitorOnly
            }
            Err(e) => {
                tracing::error!(error = %e, "Daemon launch failed; monitoring only");
                Availability::MonitorOnly
            }
        }
    }

    /// Probe until the daemon answers or `window` elapses.
    async fn await_reachable(&self, window: Duration) -> bool {
        let deadline = Instant::now() + window;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if self
                .probe
                .is_reachable(remaining.min(self.timings.probe_timeout))
                .await
            {
                return true;
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return false;
            }
            tokio::time::sleep(remaining.min(CONFIRM_RETRY)).await;
        }
    }

    /// Probe the daemon once.
    pub async fn current_reachability(&self) -> StatusSnapshot {
        self.probe.probe(self.timings.probe_timeout).await
    }

    /// Poll the daemon and deliver every snapshot to `subscriber`.
    ///
    /// There is one subscriber at a time; subscribing again replaces the
    /// previous one.
    pub async fn subscribe_to_status<F>(&self, subscriber: F)
    where
        F: Fn(StatusSnapshot) + Send + Sync + 'static,
    {
        let subscriber: StatusSubscriber = Arc::new(subscriber);
        let mut slot = self.poller.lock().await;
        if let Some(mut previous) = slot.take() {
            previous.stop().await;
        }
        let mut poller =
            StatusPoller::new(self.probe.clone(), self.timings.poll_timeout, subscriber);
        poller.start(self.timings.poll_interval);
        *slot = Some(poller);
    }

    /// Flip the start-at-login preference, returning the new state.
    ///
    /// # Errors
    /// Propagates the registrar's [`RegistrarError`].
    pub async fn toggle_auto_start(&self) -> Result<bool, RegistrarError> {
        let enabled = self.registrar.toggle().await?;
        tracing::info!(enabled, "Start at login toggled");
        Ok(enabled)
    }

    /// Stop polling and, when the daemon is our subprocess, stop it too.
    ///
    /// A daemon owned by launchd is left running.
    pub async fn shutdown(&self) {
        self.stop_polling().await;
        if self.process.is_managing_subprocess() {
            self.process.stop().await;
        } else {
            tracing::debug!("No subprocess to stop");
        }
    }

    /// Quiesce the daemon and hand over to an installer.
    ///
    /// See [`UpdateCoordinator::prepare_for_install`].
    pub async fn prepare_for_install<F, T>(&self, proceed: F) -> T
    where
        F: FnOnce() -> T,
    {
        self.update.prepare_for_install(proceed).await
    }

    #[must_use]
    pub fn process(&self) -> &ProcessSupervisor {
        &self.process
    }

    #[must_use]
    pub fn registrar(&self) -> &ServiceRegistrar {
        &self.registrar
    }

    async fn stop_polling(&self) {
        if let Some(mut poller) = self.poller.lock().await.take() {
            poller.stop().await;
        }
    }
}
