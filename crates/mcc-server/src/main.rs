//! Mission Control console.
//!
//! Run:
//!   GATEWAY_TOKEN=... cargo run -p mcc-server -- --port 3001
//!
//! Then:
//!   curl localhost:3001/api/gateway/status
//!   curl localhost:3001/api/overview
//!   curl -N localhost:3001/api/gateway/events

use anyhow::Context;
use clap::Parser;
use mcc_gateway::GatewayClient;
use mcc_server::{AppConfig, AppState, AuditStore, Cli, Outcome};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tracing_subscriber::EnvFilter;

const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("mcc=info".parse()?)
                .add_directive("mcc_server=info".parse()?)
                .add_directive("mcc_gateway=info".parse()?),
        )
        .init();

    let cli = Cli::parse();
    let config = AppConfig::load(&cli)?;
    let addr = config.listen_addr()?;
    let paths = config.paths();

    let audit = AuditStore::open(&paths.db_file)
        .with_context(|| format!("opening audit store at {}", paths.db_file.display()))?;
    let gateway = GatewayClient::new(config.gateway.clone()).context("invalid gateway config")?;
    gateway.start();
    audit.record("system.start", "mcc", Outcome::Success, None);

    let auth = config.session_auth().map(Arc::new);
    if auth.is_some() {
        tracing::info!(host = %config.app.host, "non-loopback host, login required for /api");
    }
    let state = AppState {
        gateway: gateway.clone(),
        audit: Arc::new(audit),
        paths: Arc::new(paths),
        auth,
    };
    let audit = state.audit.clone();
    let app = mcc_server::router(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    tracing::info!(
        "MCC API listening at http://{addr}, gateway {}",
        config.gateway.base_url
    );

    // Event streams never finish on their own, so draining is bounded.
    let drain = Arc::new(Notify::new());
    let server = {
        let drain = drain.clone();
        tokio::spawn(
            axum::serve(listener, app)
                .with_graceful_shutdown(async move { drain.notified().await })
                .into_future(),
        )
    };
    shutdown_signal().await;
    drain.notify_one();
    match tokio::time::timeout(DRAIN_TIMEOUT, server).await {
        Ok(joined) => joined??,
        Err(_) => tracing::warn!("open connections did not drain in time"),
    }

    audit.record("system.shutdown", "mcc", Outcome::Success, None);
    gateway.stop();
    tracing::info!("stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(%err, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}
