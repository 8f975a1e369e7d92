// Wallet ledger operations against Postgres.
//
// Every function here runs inside a caller-owned transaction. The wallet row is
// locked with FOR UPDATE before it is read, so concurrent debits on the same
// wallet serialize at the row and the balance check cannot race.

use crate::error::{AppError, AppResult, LedgerError};
use crate::ledger::models::{MinorUnits, WalletId, Withdrawal};
use crate::wallet::models::Wallet;
use sqlx::{Postgres, Transaction};

pub async fn create_wallet(tx: &mut Transaction<'_, Postgres>) -> AppResult<Wallet> {
    let wallet = sqlx::query_as::<_, Wallet>(
        r#"
        INSERT INTO wallets (balance, withdrawn)
        VALUES (0, 0)
        RETURNING id, balance, withdrawn
        "#,
    )
    .fetch_one(&mut **tx)
    .await?;

    Ok(wallet)
}

/// Read a wallet and hold its row lock until the transaction ends.
pub async fn lock_wallet(
    tx: &mut Transaction<'_, Postgres>,
    wallet_id: WalletId,
) -> AppResult<Wallet> {
    sqlx::query_as::<_, Wallet>(
        r#"
        SELECT id, balance, withdrawn
        FROM wallets
        WHERE id = $1
        FOR UPDATE
        "#,
    )
    .bind(wallet_id)
    .fetch_optional(&mut **tx)
    .await?
    .ok_or_else(|| LedgerError::UnknownWallet(wallet_id).into())
}

async fn store_wallet(tx: &mut Transaction<'_, Postgres>, wallet: &Wallet) -> AppResult<()> {
    sqlx::query(
        r#"
        UPDATE wallets
        SET balance = $2, withdrawn = $3
        WHERE id = $1
        "#,
    )
    .bind(wallet.id)
    .bind(wallet.balance)
    .bind(wallet.withdrawn)
    .execute(&mut **tx)
    .await?;

    Ok(())
}

/// Credit `amount` to the wallet inside the enclosing transaction.
pub async fn deposit(
    tx: &mut Transaction<'_, Postgres>,
    wallet_id: WalletId,
    amount: MinorUnits,
) -> AppResult<Wallet> {
    let mut wallet = lock_wallet(tx, wallet_id).await?;
    wallet.deposit(amount)?;
    store_wallet(tx, &wallet).await?;
    Ok(wallet)
}

/// Debit `amount` and append the receipt row in the enclosing transaction.
///
/// Fails with `InsufficientBalance` before touching any row when the balance
/// does not cover the amount, and with `DuplicateWithdrawal` when the receipt
/// id was already used. The caller must not commit after an error.
pub async fn withdraw(
    tx: &mut Transaction<'_, Postgres>,
    wallet_id: WalletId,
    receipt_id: &str,
    amount: MinorUnits,
) -> AppResult<Withdrawal> {
    let mut wallet = lock_wallet(tx, wallet_id).await?;
    wallet.withdraw(amount)?;
    store_wallet(tx, &wallet).await?;
    record_withdrawal(tx, wallet_id, receipt_id, amount).await
}

async fn record_withdrawal(
    tx: &mut Transaction<'_, Postgres>,
    wallet_id: WalletId,
    receipt_id: &str,
    amount: MinorUnits,
) -> AppResult<Withdrawal> {
    let withdrawal = sqlx::query_as::<_, Withdrawal>(
        r#"
        INSERT INTO withdrawals (receipt_id, wallet_id, amount)
        VALUES ($1, $2, $3)
        RETURNING receipt_id, wallet_id, amount, processed_at
        "#,
    )
    .bind(receipt_id)
    .bind(wallet_id)
    .bind(amount)
    .fetch_one(&mut **tx)
    .await
    .map_err(|e| match e {
        sqlx::Error::Database(ref db) if db.is_unique_violation() => {
            AppError::from(LedgerError::DuplicateWithdrawal(receipt_id.to_string()))
        }
        other => AppError::from(other),
    })?;

    Ok(withdrawal)
}
