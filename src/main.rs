//! Opswatch Agent - Incident Response Orchestrator
//!
//! Consumes monitoring alarms, runs investigation workflows against metrics,
//! logs, traces, and the cluster API, and reports root causes and
//! recommendations to a chat channel.
//!
//! # Usage
//!
//! ```bash
//! # Run against the configured event source
//! opswatch-agent
//!
//! # Replay alarm events from a JSON file (local end-to-end run)
//! opswatch-agent --event-file events.json
//! ```
//!
//! # Environment Variables
//!
//! - `AWS_REGION`, `EKS_CLUSTER_NAME`: cluster identity
//! - `SLACK_CHANNEL`, `SLACK_BOT_TOKEN` / `SLACK_SECRET_NAME`: notifications
//! - `PROMETHEUS_MCP_URL`: metrics query gateway base URL
//! - `EVENT_POLL_INTERVAL`, `MAX_CONCURRENT_EVENTS`: dispatcher tuning
//! - `RUST_LOG`: logging level (default: info)

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use opswatch::config::{AgentConfig, IdentifierFallbacks, Thresholds};
use opswatch::events::{
    EventDispatcher, EventSource, FileReplaySource, PollingPlaceholderSource, PriorityEventQueue,
};
use opswatch::integrations::{
    load_aws_credentials, ChatNotifier, GatewayMetricsClient, HttpClusterClient, NoopSigner,
    RequestSigner, SigV4Signer, SlackClient, XRayClient,
};
use opswatch::workflow::{StepToolkit, WorkflowEngine};

#[derive(Parser, Debug)]
#[command(name = "opswatch-agent")]
#[command(about = "Opswatch incident response orchestrator for EKS workloads")]
#[command(version)]
struct CliArgs {
    /// Replay alarm events from a JSON file instead of polling the event bus
    #[arg(long, value_name = "PATH")]
    event_file: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = CliArgs::parse();
    let config = AgentConfig::from_env();
    info!(
        cluster = %config.cluster_name,
        "Initializing Opswatch agent for cluster: {}",
        config.cluster_name
    );

    // Credentials are fetched once; every signer clones from them.
    let (xray_signer, secrets_signer): (Arc<dyn RequestSigner>, Arc<dyn RequestSigner>) =
        match load_aws_credentials().await {
            Ok(credentials) => (
                Arc::new(SigV4Signer::new(
                    credentials.clone(),
                    config.region.clone(),
                    "xray",
                )),
                Arc::new(SigV4Signer::new(
                    credentials,
                    config.region.clone(),
                    "secretsmanager",
                )),
            ),
            Err(e) => {
                warn!("AWS credentials unavailable ({e}); signed backends disabled");
                (Arc::new(NoopSigner), Arc::new(NoopSigner))
            }
        };

    info!("Initializing integrations...");
    let chat: Arc<dyn ChatNotifier> =
        Arc::new(SlackClient::connect(&config, secrets_signer.as_ref()).await);
    let cluster = HttpClusterClient::from_env()
        .context("Failed to initialize Kubernetes client")?;
    let metrics = GatewayMetricsClient::new(&config.metrics_gateway_url, &config.cluster_name);
    let traces = XRayClient::new(&config.region, xray_signer);

    let toolkit = Arc::new(StepToolkit {
        cluster: Arc::new(cluster),
        metrics: Arc::new(metrics),
        traces: Arc::new(traces),
        thresholds: Thresholds::from_env(),
        fallbacks: IdentifierFallbacks::from_env(),
    });
    let engine = Arc::new(WorkflowEngine::new(toolkit));

    let cancel = CancellationToken::new();
    let queue = Arc::new(PriorityEventQueue::new());
    let dispatcher = Arc::new(EventDispatcher::new(
        queue,
        engine,
        Arc::clone(&chat),
        config.slack_channel.clone(),
        config.max_concurrent_events,
        cancel.clone(),
    ));

    let dispatcher_task = tokio::spawn(Arc::clone(&dispatcher).run());

    // Event producer: file replay for local runs, placeholder poller
    // otherwise (real event bus wiring is deployment specific).
    let source: Arc<dyn EventSource> = match &args.event_file {
        Some(path) => Arc::new(FileReplaySource::new(path.clone())),
        None => Arc::new(PollingPlaceholderSource::new(config.poll_interval)),
    };
    {
        let dispatcher = Arc::clone(&dispatcher);
        let cancel = cancel.clone();
        tokio::spawn(async move {
            source.run(dispatcher, cancel).await;
        });
    }

    chat.send_notification(
        &config.slack_channel,
        &format!(
            "🚀 DevOps Agent started for cluster `{}`",
            config.cluster_name
        ),
        "info",
        None,
        None,
    )
    .await;

    spawn_signal_handler(cancel.clone());
    info!("Opswatch agent started");

    dispatcher_task
        .await
        .context("Dispatcher task terminated abnormally")?;

    chat.send_notification(
        &config.slack_channel,
        &format!(
            "🛑 DevOps Agent stopped for cluster `{}`",
            config.cluster_name
        ),
        "warning",
        None,
        None,
    )
    .await;

    info!("Opswatch agent stopped");
    Ok(())
}

/// First SIGINT/SIGTERM requests a graceful stop; a second one forces exit.
fn spawn_signal_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        let mut sigterm =
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(sigterm) => sigterm,
                Err(e) => {
                    warn!("Failed to install SIGTERM handler: {e}");
                    return;
                }
            };

        tokio::select! {
            _ = tokio::signal::ctrl_c() => info!("Received SIGINT, shutting down..."),
            _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
        }
        cancel.cancel();

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {},
            _ = sigterm.recv() => {},
        }
        warn!("Second signal received, forcing exit");
        std::process::exit(1);
    });
}
