use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;

use super::models::*;
use super::store::LedgerStore;
use crate::error::{AppResult, LedgerError};
use crate::wallet::Wallet;

#[derive(Default)]
struct LedgerState {
    next_user_id: UserId,
    next_wallet_id: WalletId,
    users: HashMap<UserId, User>,
    logins: HashMap<String, UserId>,
    wallets: HashMap<WalletId, Wallet>,
    // insertion order doubles as upload order
    orders: Vec<Order>,
    order_index: HashMap<String, usize>,
    withdrawals: Vec<Withdrawal>,
    receipts: HashSet<String>,
}

impl LedgerState {
    fn wallet_of(&self, user_id: UserId) -> Result<WalletId, LedgerError> {
        let user = self
            .users
            .get(&user_id)
            .ok_or(LedgerError::UnknownUser(user_id))?;
        user.wallet_id.ok_or(LedgerError::WalletNotBound(user_id))
    }
}

/// In-process ledger store.
///
/// One mutex guards the whole state, so every call behaves as a serializable
/// transaction. Each operation validates against a copy first and only then
/// writes, so a failed call leaves no trace.
#[derive(Default)]
pub struct InMemoryLedger {
    state: Mutex<LedgerState>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedger {
    async fn create_user(&self, login: &str, credential_hash: &str) -> AppResult<User> {
        let mut state = self.state.lock().await;
        if state.logins.contains_key(login) {
            return Err(LedgerError::DuplicateLogin(login.to_string()).into());
        }

        state.next_user_id += 1;
        state.next_wallet_id += 1;
        let (user_id, wallet_id) = (state.next_user_id, state.next_wallet_id);

        let user = User {
            id: user_id,
            login: login.to_string(),
            credential_hash: credential_hash.to_string(),
            wallet_id: Some(wallet_id),
            created_at: Utc::now(),
        };
        state.wallets.insert(wallet_id, Wallet::new(wallet_id));
        state.logins.insert(login.to_string(), user_id);
        state.users.insert(user_id, user.clone());

        Ok(user)
    }

    async fn find_user_by_login(&self, login: &str) -> AppResult<Option<User>> {
        let state = self.state.lock().await;
        Ok(state
            .logins
            .get(login)
            .and_then(|id| state.users.get(id))
            .cloned())
    }

    async fn register_order(&self, order_id: &str, user_id: UserId) -> AppResult<Order> {
        let mut state = self.state.lock().await;

        if let Some(&idx) = state.order_index.get(order_id) {
            return Err(LedgerError::DuplicateOrder {
                order_id: order_id.to_string(),
                owner: state.orders[idx].user_id,
            }
            .into());
        }
        if !state.users.contains_key(&user_id) {
            return Err(LedgerError::UnknownUser(user_id).into());
        }

        let order = Order {
            order_id: order_id.to_string(),
            user_id,
            status: OrderStatus::New,
            accrual: MinorUnits::ZERO,
            uploaded_at: Utc::now(),
        };
        let idx = state.orders.len();
        state.orders.push(order.clone());
        state.order_index.insert(order_id.to_string(), idx);

        Ok(order)
    }

    async fn list_pending_orders(&self) -> AppResult<Vec<String>> {
        let state = self.state.lock().await;
        Ok(state
            .orders
            .iter()
            .filter(|o| o.status.is_pending())
            .map(|o| o.order_id.clone())
            .collect())
    }

    async fn update_order_verdict(
        &self,
        order_id: &str,
        status: OrderStatus,
        accrual: MinorUnits,
    ) -> AppResult<VerdictApplied> {
        let mut state = self.state.lock().await;

        let idx = *state
            .order_index
            .get(order_id)
            .ok_or_else(|| LedgerError::UnknownOrder(order_id.to_string()))?;
        let order = &state.orders[idx];
        if order.status.is_terminal() {
            return Ok(VerdictApplied::AlreadyFinal);
        }

        let credited = if status == OrderStatus::Processed {
            accrual
        } else {
            MinorUnits::ZERO
        };

        let mut wallet_update = None;
        if credited.is_positive() {
            let wallet_id = state.wallet_of(order.user_id)?;
            let mut wallet = state
                .wallets
                .get(&wallet_id)
                .cloned()
                .ok_or(LedgerError::UnknownWallet(wallet_id))?;
            wallet.deposit(credited)?;
            wallet_update = Some(wallet);
        }

        let order = &mut state.orders[idx];
        order.status = status;
        order.accrual = credited;
        if let Some(wallet) = wallet_update {
            state.wallets.insert(wallet.id, wallet);
        }

        Ok(VerdictApplied::Updated { status, credited })
    }

    async fn balance(&self, user_id: UserId) -> AppResult<Balance> {
        let state = self.state.lock().await;
        let wallet_id = state.wallet_of(user_id)?;
        let wallet = state
            .wallets
            .get(&wallet_id)
            .ok_or(LedgerError::UnknownWallet(wallet_id))?;
        Ok(wallet.balance())
    }

    async fn list_orders(&self, user_id: UserId) -> AppResult<Vec<Order>> {
        let state = self.state.lock().await;
        Ok(state
            .orders
            .iter()
            .filter(|o| o.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn withdraw(
        &self,
        user_id: UserId,
        receipt_id: &str,
        amount: MinorUnits,
    ) -> AppResult<Withdrawal> {
        let mut state = self.state.lock().await;

        let wallet_id = state.wallet_of(user_id)?;
        let mut wallet = state
            .wallets
            .get(&wallet_id)
            .cloned()
            .ok_or(LedgerError::UnknownWallet(wallet_id))?;
        wallet.withdraw(amount)?;
        if state.receipts.contains(receipt_id) {
            return Err(LedgerError::DuplicateWithdrawal(receipt_id.to_string()).into());
        }

        let withdrawal = Withdrawal {
            receipt_id: receipt_id.to_string(),
            wallet_id,
            amount,
            processed_at: Utc::now(),
        };
        state.wallets.insert(wallet_id, wallet);
        state.receipts.insert(receipt_id.to_string());
        state.withdrawals.push(withdrawal.clone());

        Ok(withdrawal)
    }

    async fn list_withdrawals(&self, user_id: UserId) -> AppResult<Vec<Withdrawal>> {
        let state = self.state.lock().await;
        let wallet_id = state.wallet_of(user_id)?;
        Ok(state
            .withdrawals
            .iter()
            .filter(|w| w.wallet_id == wallet_id)
            .cloned()
            .collect())
    }
}
