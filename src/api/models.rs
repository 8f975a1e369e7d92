use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::ledger::models::*;

// ========== REQUEST MODELS ==========

/// Login/password pair for registration and login
#[derive(Debug, Deserialize, Validate)]
pub struct Credentials {
    #[validate(length(min = 1, max = 256, message = "must not be empty"))]
    pub login: String,
    #[validate(length(min = 1, max = 1024, message = "must not be empty"))]
    pub password: String,
}

/// Withdrawal against a receipt (order) number
#[derive(Debug, Deserialize, Validate)]
pub struct WithdrawRequest {
    #[validate(length(min = 1, max = 64, message = "must not be empty"))]
    pub order: String,
    /// Whole currency units
    pub sum: Decimal,
}

// ========== RESPONSE MODELS ==========

#[derive(Debug, Serialize, Deserialize)]
pub struct AuthResponse {
    pub token: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct OrderResponse {
    pub number: String,
    pub status: OrderStatus,
    /// Only present once the order is PROCESSED
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accrual: Option<Decimal>,
    pub uploaded_at: DateTime<Utc>,
}

impl From<Order> for OrderResponse {
    fn from(order: Order) -> Self {
        let accrual = (order.status == OrderStatus::Processed).then(|| order.accrual.to_decimal());
        Self {
            number: order.order_id,
            status: order.status,
            accrual,
            uploaded_at: order.uploaded_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BalanceResponse {
    pub current: Decimal,
    pub withdrawn: Decimal,
}

impl From<Balance> for BalanceResponse {
    fn from(balance: Balance) -> Self {
        Self {
            current: balance.current.to_decimal(),
            withdrawn: balance.withdrawn.to_decimal(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct WithdrawalResponse {
    pub order: String,
    pub sum: Decimal,
    pub processed_at: DateTime<Utc>,
}

impl From<Withdrawal> for WithdrawalResponse {
    fn from(withdrawal: Withdrawal) -> Self {
        Self {
            order: withdrawal.receipt_id,
            sum: withdrawal.amount.to_decimal(),
            processed_at: withdrawal.processed_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}
