//! Update worker backed by a JSON version manifest.
//!
//! The deployed site publishes `{"version": "...", "released_at": "..."}`.
//! A manifest version that differs from the running build becomes the
//! waiting version; activating it makes it the running one.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tokio::sync::{Mutex, broadcast};
use tracing::{debug, info, instrument};

use crate::config::UpdateConfig;

use super::{UpdateError, UpdateWorker, WorkerEvent};

const EVENT_CAPACITY: usize = 8;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
struct Manifest {
    version: String,
    #[serde(default)]
    released_at: Option<DateTime<Utc>>,
}

#[derive(Debug)]
struct WorkerState {
    registered: bool,
    active: String,
    waiting: Option<String>,
}

impl WorkerState {
    /// Record a manifest version, returning the event to publish if it is
    /// newly waiting.
    fn observe(&mut self, version: String) -> Option<WorkerEvent> {
        if version == self.active || self.waiting.as_deref() == Some(version.as_str()) {
            return None;
        }
        self.waiting = Some(version.clone());
        Some(WorkerEvent::Waiting { version })
    }

    fn activate(&mut self) -> Option<WorkerEvent> {
        let version = self.waiting.take()?;
        self.active.clone_from(&version);
        Some(WorkerEvent::Controlling { version })
    }
}

/// Polls a version manifest over HTTP.
pub struct HttpUpdateWorker {
    client: reqwest::Client,
    manifest_url: url::Url,
    state: Mutex<WorkerState>,
    events: broadcast::Sender<WorkerEvent>,
}

impl HttpUpdateWorker {
    /// Create a worker for the running build described by `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client fails to build.
    pub fn new(config: &UpdateConfig) -> Result<Self, UpdateError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        Ok(Self {
            client,
            manifest_url: config.manifest_url.clone(),
            state: Mutex::new(WorkerState {
                registered: false,
                active: config.build_version.clone(),
                waiting: None,
            }),
            events,
        })
    }

    /// Version currently running.
    pub async fn active_version(&self) -> String {
        self.state.lock().await.active.clone()
    }

    async fn fetch_manifest(&self) -> Result<Manifest, UpdateError> {
        let response = self
            .client
            .get(self.manifest_url.clone())
            .header(reqwest::header::CACHE_CONTROL, "no-cache")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(UpdateError::Status(status.as_u16()));
        }

        let body = response.text().await?;
        Ok(serde_json::from_str(&body)?)
    }

    fn publish(&self, event: WorkerEvent) {
        // No receivers just means nobody is listening yet
        let _ = self.events.send(event);
    }
}

#[async_trait]
impl UpdateWorker for HttpUpdateWorker {
    #[instrument(skip(self), fields(manifest = %self.manifest_url))]
    async fn register(&self) -> Result<(), UpdateError> {
        // Reachability check before accepting registration
        let manifest = self.fetch_manifest().await?;

        let event = {
            let mut state = self.state.lock().await;
            state.registered = true;
            state.observe(manifest.version)
        };
        if let Some(event) = event {
            self.publish(event);
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn update(&self) -> Result<(), UpdateError> {
        if !self.state.lock().await.registered {
            return Err(UpdateError::NotRegistered);
        }

        let manifest = self.fetch_manifest().await?;
        debug!(
            version = %manifest.version,
            released_at = ?manifest.released_at,
            "Fetched update manifest"
        );

        let event = self.state.lock().await.observe(manifest.version);
        if let Some(event) = event {
            info!(?event, "New build detected");
            self.publish(event);
        }
        Ok(())
    }

    async fn skip_waiting(&self) -> Result<(), UpdateError> {
        let event = {
            let mut state = self.state.lock().await;
            if !state.registered {
                return Err(UpdateError::NotRegistered);
            }
            state.activate()
        };
        if let Some(event) = event {
            self.publish(event);
        }
        Ok(())
    }

    fn events(&self) -> broadcast::Receiver<WorkerEvent> {
        self.events.subscribe()
    }
}
