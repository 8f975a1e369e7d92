use super::models::*;
use super::store::LedgerStore;
use crate::error::{AppError, AppResult, LedgerError};
use crate::wallet::repository as wallets;
use async_trait::async_trait;
use sqlx::PgPool;
use tracing::{debug, info};

/// Postgres ledger repository - THE source of truth for balances
pub struct PgLedgerRepository {
    pub pool: PgPool,
}

impl PgLedgerRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn wallet_of(&self, user_id: UserId) -> AppResult<WalletId> {
        let row = sqlx::query_scalar::<_, Option<WalletId>>(
            "SELECT wallet_id FROM users WHERE id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            None => Err(LedgerError::UnknownUser(user_id).into()),
            Some(None) => Err(LedgerError::WalletNotBound(user_id).into()),
            Some(Some(wallet_id)) => Ok(wallet_id),
        }
    }
}

#[async_trait]
impl LedgerStore for PgLedgerRepository {
    // ========== USER OPERATIONS ==========

    async fn create_user(&self, login: &str, credential_hash: &str) -> AppResult<User> {
        let mut tx = self.pool.begin().await?;

        let user_id = sqlx::query_scalar::<_, UserId>(
            r#"
            INSERT INTO users (login, credential_hash)
            VALUES ($1, $2)
            RETURNING id
            "#,
        )
        .bind(login)
        .bind(credential_hash)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                AppError::from(LedgerError::DuplicateLogin(login.to_string()))
            }
            other => AppError::from(other),
        })?;

        let wallet = wallets::create_wallet(&mut tx).await?;

        let user = sqlx::query_as::<_, User>(
            r#"
            UPDATE users
            SET wallet_id = $2
            WHERE id = $1
            RETURNING id, login, credential_hash, wallet_id, created_at
            "#,
        )
        .bind(user_id)
        .bind(wallet.id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        info!("Registered user {} with wallet {}", user.id, wallet.id);
        Ok(user)
    }

    async fn find_user_by_login(&self, login: &str) -> AppResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, login, credential_hash, wallet_id, created_at
            FROM users
            WHERE login = $1
            "#,
        )
        .bind(login)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    // ========== ORDER OPERATIONS ==========

    async fn register_order(&self, order_id: &str, user_id: UserId) -> AppResult<Order> {
        // ON CONFLICT keeps the statement (and the connection) usable so the
        // existing owner can be looked up right after.
        let inserted = sqlx::query_as::<_, Order>(
            r#"
            INSERT INTO orders (order_id, user_id)
            VALUES ($1, $2)
            ON CONFLICT (order_id) DO NOTHING
            RETURNING order_id, user_id, status, accrual, uploaded_at
            "#,
        )
        .bind(order_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db) if db.is_foreign_key_violation() => {
                AppError::from(LedgerError::UnknownUser(user_id))
            }
            other => AppError::from(other),
        })?;

        if let Some(order) = inserted {
            return Ok(order);
        }

        let owner = sqlx::query_scalar::<_, UserId>("SELECT user_id FROM orders WHERE order_id = $1")
            .bind(order_id)
            .fetch_one(&self.pool)
            .await?;

        Err(LedgerError::DuplicateOrder {
            order_id: order_id.to_string(),
            owner,
        }
        .into())
    }

    async fn list_pending_orders(&self) -> AppResult<Vec<String>> {
        let orders = sqlx::query_scalar::<_, String>(
            r#"
            SELECT order_id
            FROM orders
            WHERE status IN ('NEW', 'REGISTERED', 'PROCESSING')
            ORDER BY uploaded_at ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(orders)
    }

    async fn update_order_verdict(
        &self,
        order_id: &str,
        status: OrderStatus,
        accrual: MinorUnits,
    ) -> AppResult<VerdictApplied> {
        let mut tx = self.pool.begin().await?;

        let owner = sqlx::query_as::<_, (OrderStatus, UserId, Option<WalletId>)>(
            r#"
            SELECT o.status, o.user_id, u.wallet_id
            FROM orders o
            JOIN users u ON u.id = o.user_id
            WHERE o.order_id = $1
            FOR UPDATE OF o
            "#,
        )
        .bind(order_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some((current, user_id, wallet_id)) = owner else {
            return Err(LedgerError::UnknownOrder(order_id.to_string()).into());
        };

        // Terminal orders are never credited twice, even if a stale tick
        // delivers another verdict for them.
        if current.is_terminal() {
            debug!("Order {} already {}, verdict ignored", order_id, current);
            return Ok(VerdictApplied::AlreadyFinal);
        }

        let credited = if status == OrderStatus::Processed {
            accrual
        } else {
            MinorUnits::ZERO
        };

        sqlx::query(
            r#"
            UPDATE orders
            SET status = $2, accrual = $3
            WHERE order_id = $1
            "#,
        )
        .bind(order_id)
        .bind(status)
        .bind(credited)
        .execute(&mut *tx)
        .await?;

        if credited.is_positive() {
            let wallet_id = wallet_id.ok_or(LedgerError::WalletNotBound(user_id))?;
            wallets::deposit(&mut tx, wallet_id, credited).await?;
        }

        tx.commit().await?;

        Ok(VerdictApplied::Updated { status, credited })
    }

    // ========== BALANCE OPERATIONS ==========

    async fn balance(&self, user_id: UserId) -> AppResult<Balance> {
        let wallet_id = self.wallet_of(user_id).await?;

        sqlx::query_as::<_, Balance>(
            r#"
            SELECT balance AS current, withdrawn
            FROM wallets
            WHERE id = $1
            "#,
        )
        .bind(wallet_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| LedgerError::UnknownWallet(wallet_id).into())
    }

    async fn list_orders(&self, user_id: UserId) -> AppResult<Vec<Order>> {
        let orders = sqlx::query_as::<_, Order>(
            r#"
            SELECT order_id, user_id, status, accrual, uploaded_at
            FROM orders
            WHERE user_id = $1
            ORDER BY uploaded_at ASC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(orders)
    }

    // ========== WITHDRAWAL OPERATIONS ==========

    async fn withdraw(
        &self,
        user_id: UserId,
        receipt_id: &str,
        amount: MinorUnits,
    ) -> AppResult<Withdrawal> {
        let wallet_id = self.wallet_of(user_id).await?;

        let mut tx = self.pool.begin().await?;
        // Dropping `tx` on any error path rolls the debit back.
        let withdrawal = wallets::withdraw(&mut tx, wallet_id, receipt_id, amount).await?;
        tx.commit().await?;

        info!(
            "Withdrawal {} of {} from wallet {}",
            receipt_id, amount, wallet_id
        );
        Ok(withdrawal)
    }

    async fn list_withdrawals(&self, user_id: UserId) -> AppResult<Vec<Withdrawal>> {
        let wallet_id = self.wallet_of(user_id).await?;

        let withdrawals = sqlx::query_as::<_, Withdrawal>(
            r#"
            SELECT receipt_id, wallet_id, amount, processed_at
            FROM withdrawals
            WHERE wallet_id = $1
            ORDER BY processed_at ASC
            "#,
        )
        .bind(wallet_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(withdrawals)
    }
}
