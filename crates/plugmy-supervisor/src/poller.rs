//! Periodic status polling.
//!
//! The poller probes the daemon at a fixed period and hands every snapshot to
//! a single subscriber. The first probe runs as soon as polling starts. Ticks
//! missed while a probe is in flight are not replayed, so a slow daemon never
//! causes a burst of probes.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::probe::{ReachabilityProbe, StatusSnapshot};

/// Receives each snapshot produced by the poller.
pub type StatusSubscriber = Arc<dyn Fn(StatusSnapshot) + Send + Sync>;

struct Polling {
    shutdown_tx: watch::Sender<()>,
    task: JoinHandle<()>,
}

/// Probes the daemon on a timer and reports to a subscriber.
pub struct StatusPoller {
    probe: ReachabilityProbe,
    timeout: Duration,
    subscriber: StatusSubscriber,
    polling: Option<Polling>,
}

impl std::fmt::Debug for StatusPoller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatusPoller")
            .field("url", &self.probe.url())
            .field("timeout", &self.timeout)
            .field("running", &self.is_running())
            .finish()
    }
}

impl StatusPoller {
    /// Create an idle poller; each probe is bounded by `timeout`.
    pub fn new(probe: ReachabilityProbe, timeout: Duration, subscriber: StatusSubscriber) -> Self {
        Self {
            probe,
            timeout,
            subscriber,
            polling: None,
        }
    }

    /// Begin polling every `interval`, replacing any previous schedule.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(&mut self, interval: Duration) {
        if let Some(previous) = self.polling.take() {
            let _ = previous.shutdown_tx.send(());
            previous.task.abort();
        }
        let (shutdown_tx, shutdown_rx) = watch::channel(());
        let task = tokio::spawn(poll_loop(
            self.probe.clone(),
            self.timeout,
            interval,
            Arc::clone(&self.subscriber),
            shutdown_rx,
        ));
        tracing::debug!(interval_ms = interval.as_millis(), "Status polling started");
        self.polling = Some(Polling { shutdown_tx, task });
    }

    /// Stop polling. No snapshot is delivered once this returns.
    pub async fn stop(&mut self) {
        let Some(polling) = self.polling.take() else {
            return;
        };
        let _ = polling.shutdown_tx.send(());
        if let Err(e) = polling.task.await {
            if !e.is_cancelled() {
                tracing::error!(error = %e, "Status poller ended abnormally");
            }
        }
        tracing::debug!("Status polling stopped");
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.polling.as_ref().is_some_and(|p| !p.task.is_finished())
    }
}

impl Drop for StatusPoller {
    fn drop(&mut self) {
        if let Some(polling) = self.polling.take() {
            polling.task.abort();
        }
    }
}

async fn poll_loop(
    probe: ReachabilityProbe,
    timeout: Duration,
    interval: Duration,
    subscriber: StatusSubscriber,
    mut shutdown: watch::Receiver<()>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            _ = ticker.tick() => {}
        }
        let snapshot = tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            snapshot = probe.probe(timeout) => snapshot,
        };
        if shutdown.has_changed().unwrap_or(true) {
            break;
        }
        subscriber(snapshot);
    }
}
