//! Pluggable event producers
//!
//! Production wiring to an event bus (EventBridge, SQS, ...) is deployment
//! specific, so producers are a capability: anything that can feed payloads
//! into the dispatcher. Two implementations ship with the agent: a polling
//! placeholder and a JSON file replayer for local runs.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::events::EventDispatcher;

/// Produces alarm events and submits them to the dispatcher.
#[async_trait]
pub trait EventSource: Send + Sync {
    async fn run(&self, dispatcher: Arc<EventDispatcher>, cancel: CancellationToken);
}

/// Placeholder source that wakes periodically and does nothing.
///
/// Stands in for the real event bus subscription; the wake interval comes
/// from `EVENT_POLL_INTERVAL`.
pub struct PollingPlaceholderSource {
    interval: Duration,
}

impl PollingPlaceholderSource {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }
}

#[async_trait]
impl EventSource for PollingPlaceholderSource {
    async fn run(&self, _dispatcher: Arc<EventDispatcher>, cancel: CancellationToken) {
        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                () = tokio::time::sleep(self.interval) => {
                    debug!("Checking for new events...");
                }
            }
        }
    }
}

/// Replays alarm events from a JSON file (an array of payloads, or a single
/// payload object). Used by `--event-file` for local end-to-end runs.
pub struct FileReplaySource {
    path: PathBuf,
}

impl FileReplaySource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl EventSource for FileReplaySource {
    async fn run(&self, dispatcher: Arc<EventDispatcher>, _cancel: CancellationToken) {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) => {
                error!(path = %self.path.display(), "Failed to read event file: {e}");
                return;
            }
        };

        let payloads: Vec<serde_json::Value> = match serde_json::from_str(&raw) {
            Ok(serde_json::Value::Array(items)) => items,
            Ok(single) => vec![single],
            Err(e) => {
                error!(path = %self.path.display(), "Event file is not valid JSON: {e}");
                return;
            }
        };

        info!(
            path = %self.path.display(),
            count = payloads.len(),
            "Replaying events from file"
        );
        for payload in payloads {
            if let Err(e) = dispatcher.submit(payload) {
                error!("Skipping malformed event payload: {e}");
            }
        }
    }
}
