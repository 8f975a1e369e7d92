use std::sync::Arc;
use std::time::Duration;

use sqlx::{postgres::PgPoolOptions, PgPool};
use tracing::{info, warn};

use crate::{
    accrual::HttpAccrualClient,
    api::handler::AppState,
    auth::SessionKeys,
    config::Config,
    error::{AppError, AppResult},
    ledger::{store::LedgerStore, InMemoryLedger, PgLedgerRepository},
    middleware::RouteRateLimiter,
    reconcile::ReconciliationScheduler,
};

/// Everything the process runs: the HTTP state and the background reconciler
pub struct Application {
    pub state: AppState,
    pub scheduler: Arc<ReconciliationScheduler>,
}

pub async fn initialize_app(config: &Config) -> AppResult<Application> {
    info!("Initializing application components ...");

    // Ledger store, shared by the HTTP path and the scheduler
    let store: Arc<dyn LedgerStore> = match &config.database_uri {
        Some(uri) => {
            let pool = initialize_database(uri, config.database_max_connections).await?;
            Arc::new(PgLedgerRepository::new(pool))
        }
        None => {
            warn!("⚠️  DATABASE_URI not set - using the in-memory ledger, nothing will persist");
            Arc::new(InMemoryLedger::new())
        }
    };

    let accrual = Arc::new(
        HttpAccrualClient::new(&config.accrual_system_address, config.accrual_timeout())
            .map_err(|e| AppError::Config(format!("Accrual client: {}", e)))?,
    );
    info!(
        "✅ Accrual client configured for {}",
        config.accrual_system_address
    );

    let sessions = Arc::new(SessionKeys::from_secret(
        &config.session_secret,
        config.session_ttl(),
    ));
    let order_limiter = Arc::new(RouteRateLimiter::per_minute(
        config.order_submissions_per_minute,
    ));

    let scheduler = Arc::new(ReconciliationScheduler::new(
        store.clone(),
        accrual,
        config.scheduler(),
    ));

    let state = AppState::new(store, sessions, order_limiter);

    info!("✓ Application state initialized");
    Ok(Application { state, scheduler })
}

async fn initialize_database(database_uri: &str, max_connections: u32) -> AppResult<PgPool> {
    info!("📊 Connecting to database...");

    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(Duration::from_secs(5))
        .connect(database_uri)
        .await?;

    info!("✓ Database connected");

    sqlx::migrate!("./migrations").run(&pool).await?;
    info!("✓ Migrations applied");

    Ok(pool)
}
