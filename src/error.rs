use std::time::Duration;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use sqlx::migrate::MigrateError;
use thiserror::Error;

use crate::ledger::models::{MinorUnits, UserId, WalletId};

/// Top-level error type for the entire application
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Accrual error: {0}")]
    Accrual(#[from] AccrualError),

    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),

    #[error("Invalid order number: {0}")]
    InvalidOrderNumber(String),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Rate limit exceeded")]
    RateLimited,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Store and wallet rule violations.
///
/// Each variant carries what the caller needs to classify the outcome, so
/// callers match on the discriminant instead of inspecting error types.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("order {order_id} already registered by user {owner}")]
    DuplicateOrder { order_id: String, owner: UserId },

    #[error("user {0} does not exist")]
    UnknownUser(UserId),

    #[error("order {0} does not exist")]
    UnknownOrder(String),

    #[error("wallet {0} does not exist")]
    UnknownWallet(WalletId),

    #[error("user {0} has no wallet bound")]
    WalletNotBound(UserId),

    #[error("insufficient balance: requested {requested}, available {available}")]
    InsufficientBalance {
        available: MinorUnits,
        requested: MinorUnits,
    },

    #[error("withdrawal receipt {0} already recorded")]
    DuplicateWithdrawal(String),

    #[error("login {0} already taken")]
    DuplicateLogin(String),

    #[error("balance overflow on wallet {0}")]
    BalanceOverflow(WalletId),
}

/// Accrual authority lookup failures. All of them are soft: the order stays
/// pending and is looked up again on a later tick.
#[derive(Error, Debug)]
pub enum AccrualError {
    #[error("accrual request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("order {0} is not registered with the accrual system")]
    NotRegistered(String),

    #[error("accrual system is throttling, retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },

    #[error("accrual system answered with status {0}")]
    UnexpectedStatus(u16),

    #[error("malformed accrual response: {0}")]
    Malformed(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("missing session token")]
    MissingToken,

    #[error("invalid session token")]
    InvalidToken,

    #[error("session token expired")]
    Expired,

    #[error("invalid login or password")]
    InvalidCredentials,
}

/// API error response structure
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub error_code: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match &self {
            AppError::InvalidOrderNumber(number) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "INVALID_ORDER_NUMBER",
                format!("Invalid order number: {}", number),
            ),
            AppError::InvalidAmount(msg) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "INVALID_AMOUNT",
                msg.clone(),
            ),
            AppError::InvalidInput(msg) => {
                (StatusCode::BAD_REQUEST, "INVALID_INPUT", msg.clone())
            }
            AppError::RateLimited => (
                StatusCode::TOO_MANY_REQUESTS,
                "RATE_LIMITED",
                "Rate limit exceeded. Please try again later.".to_string(),
            ),
            AppError::Auth(err) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", err.to_string()),
            AppError::Ledger(LedgerError::InsufficientBalance { .. }) => (
                StatusCode::PAYMENT_REQUIRED,
                "INSUFFICIENT_FUNDS",
                "Insufficient funds".to_string(),
            ),
            AppError::Ledger(LedgerError::DuplicateOrder { .. }) => (
                StatusCode::CONFLICT,
                "ORDER_OWNED_BY_ANOTHER_USER",
                "Order has already been uploaded by another user".to_string(),
            ),
            AppError::Ledger(LedgerError::DuplicateWithdrawal(receipt)) => (
                StatusCode::CONFLICT,
                "DUPLICATE_WITHDRAWAL",
                format!("Withdrawal {} already recorded", receipt),
            ),
            AppError::Ledger(LedgerError::DuplicateLogin(login)) => (
                StatusCode::CONFLICT,
                "LOGIN_TAKEN",
                format!("Login {} already taken", login),
            ),
            AppError::Database(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "DATABASE_ERROR",
                "A database error occurred".to_string(),
            ),
            _ => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "An internal error occurred".to_string(),
            ),
        };

        if status.is_server_error() {
            tracing::error!("request failed: {}", self);
        }

        let body = Json(ErrorResponse {
            error: message,
            error_code: error_code.to_string(),
        });

        (status, body).into_response()
    }
}

impl From<MigrateError> for AppError {
    fn from(error: MigrateError) -> Self {
        AppError::Internal(format!("Migration error: {:?}", error))
    }
}

impl From<::config::ConfigError> for AppError {
    fn from(error: ::config::ConfigError) -> Self {
        AppError::Config(error.to_string())
    }
}

/// Result type alias for the application
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = vec![
            (
                AppError::InvalidOrderNumber("123".to_string()),
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (
                LedgerError::InsufficientBalance {
                    available: MinorUnits(400),
                    requested: MinorUnits(600),
                }
                .into(),
                StatusCode::PAYMENT_REQUIRED,
            ),
            (
                LedgerError::DuplicateWithdrawal("2377225624".to_string()).into(),
                StatusCode::CONFLICT,
            ),
            (LedgerError::UnknownUser(7).into(), StatusCode::INTERNAL_SERVER_ERROR),
            (AuthError::Expired.into(), StatusCode::UNAUTHORIZED),
            (AppError::RateLimited, StatusCode::TOO_MANY_REQUESTS),
        ];

        for (err, expected) in cases {
            assert_eq!(err.into_response().status(), expected);
        }
    }
}
