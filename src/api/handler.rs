use axum::{
    extract::{FromRef, State},
    http::{
        header::{AUTHORIZATION, SET_COOKIE},
        StatusCode,
    },
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;
use tracing::info;

use super::models::*;
use crate::{
    auth::{AuthService, AuthUser, Session, SessionKeys, TOKEN_COOKIE},
    error::{AppError, AppResult, ErrorResponse},
    ledger::{store::LedgerStore, LedgerService, OrderRegistration},
    middleware::{RouteRateLimiter, ValidatedJson},
};

#[derive(Clone)]
pub struct AppState {
    pub ledger: Arc<LedgerService>,
    pub auth: Arc<AuthService>,
    pub sessions: Arc<SessionKeys>,
    pub order_limiter: Arc<RouteRateLimiter>,
}

impl AppState {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        sessions: Arc<SessionKeys>,
        order_limiter: Arc<RouteRateLimiter>,
    ) -> Self {
        Self {
            ledger: Arc::new(LedgerService::new(store.clone())),
            auth: Arc::new(AuthService::new(store, sessions.clone())),
            sessions,
            order_limiter,
        }
    }
}

impl FromRef<AppState> for Arc<SessionKeys> {
    fn from_ref(state: &AppState) -> Self {
        state.sessions.clone()
    }
}

// ========== AUTH ==========

/// Register a new user
/// POST /api/user/register
pub async fn register(
    State(state): State<AppState>,
    ValidatedJson(credentials): ValidatedJson<Credentials>,
) -> AppResult<Response> {
    let session = state
        .auth
        .register(&credentials.login, &credentials.password)
        .await?;

    Ok(session_response(&state.sessions, session))
}

/// Log in an existing user
/// POST /api/user/login
pub async fn login(
    State(state): State<AppState>,
    ValidatedJson(credentials): ValidatedJson<Credentials>,
) -> AppResult<Response> {
    let session = state
        .auth
        .login(&credentials.login, &credentials.password)
        .await?;

    info!("User {} logged in", session.user.login);
    Ok(session_response(&state.sessions, session))
}

/// Hand the token out both as a bearer header and as an HttpOnly cookie
fn session_response(keys: &SessionKeys, session: Session) -> Response {
    let cookie = format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        TOKEN_COOKIE,
        session.token,
        keys.ttl().as_secs()
    );

    (
        StatusCode::OK,
        [
            (AUTHORIZATION, format!("Bearer {}", session.token)),
            (SET_COOKIE, cookie),
        ],
        Json(AuthResponse {
            token: session.token,
        }),
    )
        .into_response()
}

// ========== ORDERS ==========

/// Submit an order number for accrual
/// POST /api/user/orders
pub async fn submit_order(
    State(state): State<AppState>,
    user: AuthUser,
    body: String,
) -> AppResult<Response> {
    let number = body.trim();
    if number.is_empty() {
        return Err(AppError::InvalidInput("Order number is required".to_string()));
    }

    let response = match state.ledger.register_order(user.user_id, number).await? {
        OrderRegistration::Accepted => StatusCode::ACCEPTED.into_response(),
        OrderRegistration::AlreadyRegistered => StatusCode::OK.into_response(),
        OrderRegistration::OwnedByAnotherUser => (
            StatusCode::CONFLICT,
            Json(ErrorResponse {
                error: "Order has already been uploaded by another user".to_string(),
                error_code: "ORDER_OWNED_BY_ANOTHER_USER".to_string(),
            }),
        )
            .into_response(),
    };

    Ok(response)
}

/// List the caller's orders, oldest first
/// GET /api/user/orders
pub async fn list_orders(State(state): State<AppState>, user: AuthUser) -> AppResult<Response> {
    let orders = state.ledger.orders(user.user_id).await?;
    if orders.is_empty() {
        return Ok(StatusCode::NO_CONTENT.into_response());
    }

    let orders: Vec<OrderResponse> = orders.into_iter().map(OrderResponse::from).collect();
    Ok(Json(orders).into_response())
}

// ========== BALANCE ==========

/// GET /api/user/balance
pub async fn get_balance(
    State(state): State<AppState>,
    user: AuthUser,
) -> AppResult<Json<BalanceResponse>> {
    let balance = state.ledger.balance(user.user_id).await?;
    Ok(Json(balance.into()))
}

/// Spend points against a receipt number
/// POST /api/user/balance/withdraw
pub async fn withdraw(
    State(state): State<AppState>,
    user: AuthUser,
    ValidatedJson(request): ValidatedJson<WithdrawRequest>,
) -> AppResult<Json<WithdrawalResponse>> {
    let withdrawal = state
        .ledger
        .withdraw(user.user_id, request.order.trim(), request.sum)
        .await?;

    info!(
        "User {} withdrew {} against {}",
        user.login, withdrawal.amount, withdrawal.receipt_id
    );
    Ok(Json(withdrawal.into()))
}

/// List the caller's withdrawals, oldest first
/// GET /api/user/withdrawals
pub async fn list_withdrawals(
    State(state): State<AppState>,
    user: AuthUser,
) -> AppResult<Response> {
    let withdrawals = state.ledger.withdrawals(user.user_id).await?;
    if withdrawals.is_empty() {
        return Ok(StatusCode::NO_CONTENT.into_response());
    }

    let withdrawals: Vec<WithdrawalResponse> = withdrawals
        .into_iter()
        .map(WithdrawalResponse::from)
        .collect();
    Ok(Json(withdrawals).into_response())
}

// ========== HEALTH ==========

/// GET /health
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
