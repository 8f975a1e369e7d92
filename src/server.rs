use std::future::Future;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::api::handler::{
    get_balance, health_check, list_orders, list_withdrawals, login, register, submit_order,
    withdraw, AppState,
};
use crate::middleware::rate_limit_middleware;

pub fn create_app(state: AppState) -> Router {
    info!("⚙️ Setting up HTTP routes...");

    let user_routes = Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route(
            "/orders",
            post(submit_order)
                .layer(middleware::from_fn_with_state(
                    state.order_limiter.clone(),
                    rate_limit_middleware,
                ))
                .get(list_orders),
        )
        .route("/balance", get(get_balance))
        .route("/balance/withdraw", post(withdraw))
        .route("/withdrawals", get(list_withdrawals));

    let app = Router::new()
        .route("/health", get(health_check))
        .nest("/api/user", user_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    info!("✓ HTTP routes configured");
    app
}

/// Serve until `shutdown` resolves, then drain open connections.
pub async fn run_server(
    app: Router,
    bind_address: &str,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind_address).await?;
    info!("🌐 Server listening on: {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
}
