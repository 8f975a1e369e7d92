use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::{info, warn};

use super::models::*;
use super::store::LedgerStore;
use crate::error::{AppError, AppResult, LedgerError};
use crate::luhn;

/// Outcome of submitting an order number
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderRegistration {
    /// New order queued for accrual
    Accepted,
    /// The caller already submitted this number; nothing changed
    AlreadyRegistered,
    /// Another user owns this number
    OwnedByAnotherUser,
}

/// User-facing ledger operations.
///
/// Validates input before any store access and turns store-level conflicts
/// into explicit outcomes.
pub struct LedgerService {
    store: Arc<dyn LedgerStore>,
}

impl LedgerService {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    pub async fn register_order(
        &self,
        user_id: UserId,
        order_number: &str,
    ) -> AppResult<OrderRegistration> {
        let order_number = order_number.trim();
        if !luhn::is_valid(order_number) {
            return Err(AppError::InvalidOrderNumber(order_number.to_string()));
        }

        match self.store.register_order(order_number, user_id).await {
            Ok(_) => {
                info!("Order {} registered by user {}", order_number, user_id);
                Ok(OrderRegistration::Accepted)
            }
            Err(AppError::Ledger(LedgerError::DuplicateOrder { owner, .. })) if owner == user_id => {
                Ok(OrderRegistration::AlreadyRegistered)
            }
            Err(AppError::Ledger(LedgerError::DuplicateOrder { owner, .. })) => {
                warn!(
                    "Order {} submitted by user {} but owned by user {}",
                    order_number, user_id, owner
                );
                Ok(OrderRegistration::OwnedByAnotherUser)
            }
            Err(e) => Err(e),
        }
    }

    pub async fn orders(&self, user_id: UserId) -> AppResult<Vec<Order>> {
        self.store.list_orders(user_id).await
    }

    pub async fn balance(&self, user_id: UserId) -> AppResult<Balance> {
        self.store.balance(user_id).await
    }

    /// Withdraw `sum` currency units against receipt `receipt_id`.
    pub async fn withdraw(
        &self,
        user_id: UserId,
        receipt_id: &str,
        sum: Decimal,
    ) -> AppResult<Withdrawal> {
        if !luhn::is_valid(receipt_id) {
            return Err(AppError::InvalidOrderNumber(receipt_id.to_string()));
        }

        let amount = MinorUnits::from_decimal_truncated(sum)
            .filter(|amount| amount.is_positive())
            .ok_or_else(|| AppError::InvalidAmount(format!("Invalid withdrawal sum: {}", sum)))?;

        self.store.withdraw(user_id, receipt_id, amount).await
    }

    pub async fn withdrawals(&self, user_id: UserId) -> AppResult<Vec<Withdrawal>> {
        self.store.list_withdrawals(user_id).await
    }
}
