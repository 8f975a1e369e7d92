mod accrual;
mod api;
mod auth;
mod bootstrap;
mod config;
mod error;
mod ledger;
mod luhn;
mod middleware;
mod reconcile;
mod server;
mod wallet;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// Initialize logging and tracing
fn init_tracing() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "info,tower_http=debug,loyalty_ledger=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Resolves on Ctrl-C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init_tracing();

    info!("🚀 Starting loyalty ledger");

    let config = crate::config::Config::from_env().context("failed to load configuration")?;

    let app = bootstrap::initialize_app(&config)
        .await
        .context("failed to initialize application")?;

    let cancel = CancellationToken::new();
    let scheduler = app.scheduler.clone().start(cancel.clone());

    let router = server::create_app(app.state);
    let served = server::run_server(router, &config.run_address, shutdown_signal()).await;

    // Stop reconciling and let in-flight lookups drain before exiting.
    cancel.cancel();
    if let Err(e) = scheduler.await {
        error!("Reconciliation scheduler ended abnormally: {}", e);
    }

    served.context("HTTP server failed")?;
    info!("👋 Shutdown complete");
    Ok(())
}
