use async_trait::async_trait;

use super::models::*;
use crate::error::AppResult;

/// Durable ledger of users, orders, wallets and withdrawals.
///
/// INVARIANTS (every implementation):
/// - Each method is one isolated unit of work: it commits in full or not at all
/// - A wallet is never credited or debited without its paired order/withdrawal row
/// - `list_pending_orders` never returns an order in a terminal status
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Create a user together with its wallet and bind them.
    async fn create_user(&self, login: &str, credential_hash: &str) -> AppResult<User>;

    async fn find_user_by_login(&self, login: &str) -> AppResult<Option<User>>;

    /// Insert a new order in status NEW.
    ///
    /// Fails with `DuplicateOrder { owner }` when the number already exists and
    /// with `UnknownUser` when `user_id` does not reference a user.
    async fn register_order(&self, order_id: &str, user_id: UserId) -> AppResult<Order>;

    /// Order numbers in NEW, REGISTERED or PROCESSING, oldest first.
    async fn list_pending_orders(&self) -> AppResult<Vec<String>>;

    /// Write a verdict for a pending order and, for PROCESSED, credit `accrual`
    /// to the owner's wallet in the same transaction.
    ///
    /// Re-applying a verdict to an order that is already terminal is a no-op
    /// reported as `VerdictApplied::AlreadyFinal`.
    async fn update_order_verdict(
        &self,
        order_id: &str,
        status: OrderStatus,
        accrual: MinorUnits,
    ) -> AppResult<VerdictApplied>;

    async fn balance(&self, user_id: UserId) -> AppResult<Balance>;

    /// Orders of a user, ascending by upload time.
    async fn list_orders(&self, user_id: UserId) -> AppResult<Vec<Order>>;

    /// Debit the user's wallet and append a withdrawal receipt atomically.
    async fn withdraw(
        &self,
        user_id: UserId,
        receipt_id: &str,
        amount: MinorUnits,
    ) -> AppResult<Withdrawal>;

    /// Withdrawals of a user, ascending by processing time.
    async fn list_withdrawals(&self, user_id: UserId) -> AppResult<Vec<Withdrawal>>;
}
