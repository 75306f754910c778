//! Opswatch Gateway - Natural-Language Metrics Query Service
//!
//! HTTP service that rewrites free-form queries to PromQL, executes them
//! against a managed Prometheus workspace over signed HTTP, and decorates the
//! results with threshold-based insights.
//!
//! # Environment Variables
//!
//! - `HOST`, `PORT`: bind address (default 0.0.0.0:8080)
//! - `AWS_REGION`, `AMP_WORKSPACE_ID`: managed Prometheus workspace
//! - `RUST_LOG`: logging level (default: info)

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use opswatch::api::{gateway_routes, GatewayState};
use opswatch::config::GatewayConfig;
use opswatch::integrations::{load_aws_credentials, NoopSigner, RequestSigner, SigV4Signer};
use opswatch::query::{InsightGenerator, PrometheusClient, QueryTranslator};

#[derive(Parser, Debug)]
#[command(name = "opswatch-gateway")]
#[command(about = "Natural language interface to Prometheus metrics")]
#[command(version)]
struct CliArgs {
    /// Override the server address (default from HOST/PORT env)
    #[arg(short, long)]
    addr: Option<String>,
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
    let config = GatewayConfig::from_env();

    let signer: Arc<dyn RequestSigner> = match load_aws_credentials().await {
        Ok(credentials) => Arc::new(SigV4Signer::new(credentials, config.region.clone(), "aps")),
        Err(e) => {
            warn!("AWS credentials unavailable ({e}); queries will be sent unsigned");
            Arc::new(NoopSigner)
        }
    };

    let state = GatewayState {
        translator: Arc::new(QueryTranslator::new()),
        backend: Arc::new(PrometheusClient::new(
            &config.region,
            &config.workspace_id,
            signer,
        )),
        insights: InsightGenerator::new(),
    };

    let app = gateway_routes(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr = args.addr.unwrap_or_else(|| config.bind_addr());
    info!("Starting metrics query gateway on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Metrics query gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    let sigterm = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("Received SIGINT, shutting down..."),
        () = sigterm => info!("Received SIGTERM, shutting down..."),
    }
}
