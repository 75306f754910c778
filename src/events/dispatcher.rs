//! Bounded-concurrency event dispatcher
//!
//! Long-lived loop that drains the priority queue and runs at most
//! `max_concurrent` incident handlers at a time. Finished handlers are reaped
//! every tick; a failed or panicking handler never takes the loop down.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use serde_json::Value;
use std::panic::AssertUnwindSafe;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::defaults::QUEUE_POP_TIMEOUT_SECS;
use crate::events::PriorityEventQueue;
use crate::integrations::ChatNotifier;
use crate::types::{Event, EventPriority, IncidentReport};
use crate::workflow::{InvestigationEngine, WorkflowKind};

/// Dispatcher statistics snapshot.
#[derive(Debug, Clone, Copy)]
pub struct DispatcherStats {
    pub dispatched: u64,
    pub completed: u64,
}

pub struct EventDispatcher {
    queue: Arc<PriorityEventQueue>,
    engine: Arc<dyn InvestigationEngine>,
    chat: Arc<dyn ChatNotifier>,
    channel: String,
    max_concurrent: usize,
    cancel: CancellationToken,
    dispatched: AtomicU64,
    completed: AtomicU64,
}

impl EventDispatcher {
    pub fn new(
        queue: Arc<PriorityEventQueue>,
        engine: Arc<dyn InvestigationEngine>,
        chat: Arc<dyn ChatNotifier>,
        channel: String,
        max_concurrent: usize,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            queue,
            engine,
            chat,
            channel,
            max_concurrent,
            cancel,
            dispatched: AtomicU64::new(0),
            completed: AtomicU64::new(0),
        }
    }

    /// Accept a raw event payload: derive its priority and enqueue it.
    pub fn submit(&self, payload: Value) -> Result<EventPriority, serde_json::Error> {
        let event = Event::from_payload(payload)?;
        let priority = event.priority();
        info!(event_id = %event.id, priority = %priority, "Received event");
        self.queue.push(event);
        Ok(priority)
    }

    pub fn stats(&self) -> DispatcherStats {
        DispatcherStats {
            dispatched: self.dispatched.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
        }
    }

    /// Run the dispatch loop until cancelled, then drain in-flight handlers.
    pub async fn run(self: Arc<Self>) {
        let mut handlers: JoinSet<()> = JoinSet::new();
        info!(
            max_concurrent = self.max_concurrent,
            "Event dispatcher started"
        );

        loop {
            // Reap handlers that finished since the last tick.
            while let Some(joined) = handlers.try_join_next() {
                Self::log_joined(joined);
            }

            if self.cancel.is_cancelled() {
                break;
            }

            if handlers.len() >= self.max_concurrent {
                // At capacity: a slot frees only when a handler exits.
                tokio::select! {
                    () = self.cancel.cancelled() => break,
                    joined = handlers.join_next() => {
                        if let Some(joined) = joined {
                            Self::log_joined(joined);
                        }
                    }
                }
                continue;
            }

            let event = tokio::select! {
                () = self.cancel.cancelled() => break,
                event = self.queue.pop_timeout(Duration::from_secs(QUEUE_POP_TIMEOUT_SECS)) => event,
            };
            let Some(event) = event else {
                continue;
            };

            self.dispatched.fetch_add(1, Ordering::Relaxed);
            let this = Arc::clone(&self);
            handlers.spawn(async move {
                this.handle_event(event).await;
                this.completed.fetch_add(1, Ordering::Relaxed);
            });
        }

        if !handlers.is_empty() {
            info!(
                in_flight = handlers.len(),
                "Shutdown requested, draining in-flight incident handlers"
            );
        }
        while let Some(joined) = handlers.join_next().await {
            Self::log_joined(joined);
        }
        info!("Event dispatcher stopped");
    }

    async fn handle_event(&self, event: Event) {
        let incident_id = event.incident_id();
        let priority = event.priority();
        info!(
            event_id = %event.id,
            incident = %incident_id,
            priority = %priority,
            "Handling event"
        );

        self.chat
            .send_notification(
                &self.channel,
                &format!(
                    "🚨 New incident detected: `{incident_id}`\nSource: {}\nPriority: {priority}",
                    event.source
                ),
                priority.severity(),
                Some(&incident_id),
                None,
            )
            .await;

        let workflow = WorkflowKind::for_alarm(event.alarm_name());
        let run = AssertUnwindSafe(self.engine.execute_workflow(workflow, &incident_id, event))
            .catch_unwind()
            .await;

        let report = match run {
            Ok(report) => report,
            Err(_) => {
                error!(incident = %incident_id, "Incident handler panicked");
                IncidentReport {
                    success: false,
                    incident_id: incident_id.clone(),
                    workflow: workflow.as_str().to_string(),
                    root_cause: None,
                    recommendations: Vec::new(),
                    duration_secs: 0.0,
                    findings: Vec::new(),
                    error: Some("incident handler panicked".to_string()),
                }
            }
        };

        if report.success {
            self.chat
                .send_notification(
                    &self.channel,
                    &format!(
                        "✅ Incident `{incident_id}` resolved\nRoot cause: {}",
                        report.root_cause.as_deref().unwrap_or("Unknown")
                    ),
                    "info",
                    Some(&incident_id),
                    None,
                )
                .await;
            self.chat
                .send_investigation_summary(&self.channel, &incident_id, &report, None)
                .await;
        } else {
            warn!(
                incident = %incident_id,
                error = report.error.as_deref().unwrap_or("unknown"),
                "Investigation failed"
            );
            self.chat
                .send_notification(
                    &self.channel,
                    &format!(
                        "❌ Incident `{incident_id}` investigation failed\nError: {}",
                        report.error.as_deref().unwrap_or("Unknown error")
                    ),
                    "high",
                    Some(&incident_id),
                    None,
                )
                .await;
        }
    }

    fn log_joined(joined: Result<(), tokio::task::JoinError>) {
        if let Err(e) = joined {
            if e.is_panic() {
                error!("Incident handler task panicked: {e}");
            }
        }
    }
}
