//! New-version detection and activation.
//!
//! # Protocol
//!
//! 1. Register the [`UpdateWorker`]
//! 2. `Waiting` event: show a short toast, wait, then tell the worker to
//!    activate the new version (no opt-out)
//! 3. `Controlling` event: ask the [`Navigator`] to reload
//! 4. Poll the worker on a fixed interval in case events are missed
//!
//! A failed registration is logged and the notifier stops; the running
//! version keeps working.

mod http;

pub use http::HttpUpdateWorker;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::lifecycle::Navigator;
use crate::notify::{Notifier, Toast};

/// How long the "update available" toast stays up.
const UPDATE_TOAST_DURATION: Duration = Duration::from_secs(2);
/// Delay between announcing an update and activating it.
const ACTIVATION_DELAY: Duration = Duration::from_secs(2);

/// Errors from an update worker.
#[derive(Debug, Error)]
pub enum UpdateError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The manifest endpoint answered with an error status.
    #[error("manifest request failed with status {0}")]
    Status(u16),

    /// The manifest could not be parsed.
    #[error("invalid manifest: {0}")]
    Parse(#[from] serde_json::Error),

    /// An operation that needs a registered worker was called first.
    #[error("update worker is not registered")]
    NotRegistered,
}

/// Lifecycle events from an update worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerEvent {
    /// A new version is ready and waiting to take over.
    Waiting { version: String },
    /// A new version has taken control.
    Controlling { version: String },
}

/// Background worker that knows about deployed versions.
#[async_trait]
pub trait UpdateWorker: Send + Sync {
    async fn register(&self) -> Result<(), UpdateError>;

    /// Check for a newer version now.
    async fn update(&self) -> Result<(), UpdateError>;

    /// Activate the waiting version immediately.
    async fn skip_waiting(&self) -> Result<(), UpdateError>;

    fn events(&self) -> broadcast::Receiver<WorkerEvent>;
}

/// Drives an [`UpdateWorker`] and surfaces its events to the user.
pub struct UpdateNotifier {
    worker: Arc<dyn UpdateWorker>,
    notifier: Arc<dyn Notifier>,
    navigator: Arc<dyn Navigator>,
    poll_interval: Duration,
}

impl UpdateNotifier {
    #[must_use]
    pub fn new(
        worker: Arc<dyn UpdateWorker>,
        notifier: Arc<dyn Notifier>,
        navigator: Arc<dyn Navigator>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            worker,
            notifier,
            navigator,
            poll_interval,
        }
    }

    /// Run in a background task until the handle is dropped.
    pub fn spawn(self) -> UpdateHandle {
        UpdateHandle {
            handle: tokio::spawn(self.run()),
        }
    }

    /// Register the worker, then react to events and poll until the event
    /// stream closes.
    pub async fn run(self) {
        let mut events = self.worker.events();

        if let Err(e) = self.worker.register().await {
            error!(error = %e, "Update worker registration failed; updates disabled");
            return;
        }
        info!(
            poll_secs = self.poll_interval.as_secs(),
            "Update worker registered"
        );

        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately; registration just checked
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    debug!("Polling for updates");
                    if let Err(e) = self.worker.update().await {
                        warn!(error = %e, "Update check failed");
                    }
                }
                event = events.recv() => match event {
                    Ok(WorkerEvent::Waiting { version }) => self.activate(&version).await,
                    Ok(WorkerEvent::Controlling { version }) => {
                        info!(version, "New version in control; reloading");
                        self.navigator.reload();
                    }
                    Err(RecvError::Lagged(missed)) => {
                        warn!(missed, "Update events dropped");
                    }
                    Err(RecvError::Closed) => {
                        debug!("Update event stream closed");
                        break;
                    }
                },
            }
        }
    }

    async fn activate(&self, version: &str) {
        info!(version, "New version available");
        self.notifier.notify(
            Toast::new("Update available")
                .with_description("A new version is being installed.")
                .with_duration(UPDATE_TOAST_DURATION),
        );

        tokio::time::sleep(ACTIVATION_DELAY).await;

        if let Err(e) = self.worker.skip_waiting().await {
            warn!(error = %e, version, "Failed to activate new version");
        }
    }
}

/// Handle to a spawned [`UpdateNotifier`]. Dropping it stops the notifier.
#[must_use = "dropping the handle stops update checks"]
#[derive(Debug)]
pub struct UpdateHandle {
    handle: JoinHandle<()>,
}

impl UpdateHandle {
    /// Whether the notifier is still running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }

    /// Wait for the notifier to stop on its own.
    ///
    /// Returns `false` if the notifier task panicked.
    #[must_use]
    pub async fn join(mut self) -> bool {
        match (&mut self.handle).await {
            Ok(()) => true,
            Err(e) if e.is_panic() => {
                error!(error = %e, "Update notifier panicked");
                false
            }
            Err(e) => {
                debug!(error = %e, "Update notifier cancelled");
                false
            }
        }
    }
}

impl Drop for UpdateHandle {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
