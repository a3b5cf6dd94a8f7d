//! The long-running `run` loop of the supervisor binary.
//!
//! Applies the startup policy, logs reachability transitions reported by the
//! status poller, and waits for a signal: SIGINT or SIGTERM shut down,
//! SIGUSR1 quiesces the daemon for an update install.

use std::sync::{Mutex, PoisonError};
use tokio::signal::unix::{Signal, SignalKind, signal};
use tokio::sync::mpsc;

use crate::orchestrator::{Availability, Supervisor};
use crate::probe::StatusSnapshot;

/// Requests delivered to the run loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    Shutdown,
    PrepareInstall,
}

/// Why the run loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exit {
    /// Shut down on request.
    Interrupted,
    /// The daemon was quiesced; an installer may replace it now.
    ReadyForInstall,
}

/// Run until a signal arrives.
pub async fn run(supervisor: &Supervisor) -> Exit {
    let (tx, rx) = mpsc::channel(4);
    let forwarder = tokio::spawn(forward_signals(tx));
    let exit = run_until(supervisor, rx).await;
    forwarder.abort();
    exit
}

/// Run until `events` yields a request or closes.
///
/// A closed channel is treated as a shutdown request. A request that arrives
/// while startup is still probing or bootstrapping abandons startup.
pub async fn run_until(supervisor: &Supervisor, mut events: mpsc::Receiver<Event>) -> Exit {
    let early = tokio::select! {
        biased;
        event = events.recv() => Some(event.unwrap_or(Event::Shutdown)),
        availability = supervisor.startup() => {
            if availability == Availability::MonitorOnly {
                tracing::warn!("Daemon not started; reporting reachability only");
            }
            None
        }
    };
    let event = if let Some(event) = early {
        tracing::info!(?event, "Request arrived during startup; abandoning it");
        event
    } else {
        supervisor.subscribe_to_status(transition_logger()).await;
        events.recv().await.unwrap_or(Event::Shutdown)
    };

    match event {
        Event::Shutdown => {
            tracing::info!("Shutting down");
            supervisor.shutdown().await;
            Exit::Interrupted
        }
        Event::PrepareInstall => {
            supervisor.prepare_for_install(|| ()).await;
            supervisor.shutdown().await;
            Exit::ReadyForInstall
        }
    }
}

/// Convert SIGINT, SIGTERM and SIGUSR1 into [`Event`]s.
///
/// Failing to install a handler is treated as a shutdown request.
async fn forward_signals(tx: mpsc::Sender<Event>) {
    let (Some(mut sigint), Some(mut sigterm), Some(mut sigusr1)) = (
        install(SignalKind::interrupt(), "SIGINT"),
        install(SignalKind::terminate(), "SIGTERM"),
        install(SignalKind::user_defined1(), "SIGUSR1"),
    ) else {
        let _ = tx.send(Event::Shutdown).await;
        return;
    };
    let event = tokio::select! {
        _ = sigint.recv() => Event::Shutdown,
        _ = sigterm.recv() => Event::Shutdown,
        _ = sigusr1.recv() => Event::PrepareInstall,
    };
    let _ = tx.send(event).await;
}

fn install(kind: SignalKind, name: &'static str) -> Option<Signal> {
    signal(kind)
        .map_err(|e| tracing::error!(signal = name, error = %e, "Failed to install signal handler"))
        .ok()
}

/// Status subscriber that logs only when reachability changes.
pub fn transition_logger() -> impl Fn(StatusSnapshot) + Send + Sync + 'static {
    let last: Mutex<Option<bool>> = Mutex::new(None);
    move |snapshot: StatusSnapshot| {
        let mut last = last.lock().unwrap_or_else(PoisonError::into_inner);
        if *last == Some(snapshot.reachable) {
            return;
        }
        *last = Some(snapshot.reachable);
        if snapshot.reachable {
            tracing::info!(
                version = snapshot.version.as_deref().unwrap_or("unknown"),
                providers = snapshot.provider_count(),
                "Daemon reachable"
            );
        } else {
            tracing::warn!("Daemon unreachable");
        }
    }
}
