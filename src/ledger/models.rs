use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use sqlx::{prelude::FromRow, Type};
use std::fmt;

pub type UserId = i64;
pub type WalletId = i64;

/// Minor units per whole currency unit (cents).
const MINOR_PER_UNIT: Decimal = dec!(100);

/// Integer currency amount in minor units (cents).
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Type,
)]
#[sqlx(transparent)]
pub struct MinorUnits(pub i64);

impl MinorUnits {
    pub const ZERO: MinorUnits = MinorUnits(0);

    /// Converts a decimal currency amount to minor units, truncating toward zero.
    ///
    /// `12.349` becomes `1234`, `-0.019` becomes `-1`. Returns `None` when the
    /// result does not fit in an `i64`.
    pub fn from_decimal_truncated(amount: Decimal) -> Option<Self> {
        (amount * MINOR_PER_UNIT).trunc().to_i64().map(MinorUnits)
    }

    pub fn to_decimal(self) -> Decimal {
        Decimal::new(self.0, 2)
    }

    pub fn is_positive(self) -> bool {
        self.0 > 0
    }

    pub fn checked_add(self, other: MinorUnits) -> Option<MinorUnits> {
        self.0.checked_add(other.0).map(MinorUnits)
    }

    pub fn checked_sub(self, other: MinorUnits) -> Option<MinorUnits> {
        self.0.checked_sub(other.0).map(MinorUnits)
    }
}

impl fmt::Display for MinorUnits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_decimal())
    }
}

/// Order lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Type)]
#[sqlx(type_name = "order_status", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderStatus {
    New,
    Registered,
    Invalid,
    Processing,
    Processed,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::New => "NEW",
            OrderStatus::Registered => "REGISTERED",
            OrderStatus::Invalid => "INVALID",
            OrderStatus::Processing => "PROCESSING",
            OrderStatus::Processed => "PROCESSED",
        }
    }

    /// No reconciliation is attempted once an order reaches a terminal status.
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Invalid | OrderStatus::Processed)
    }

    pub fn is_pending(&self) -> bool {
        !self.is_terminal()
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// User entity
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: UserId,
    pub login: String,
    pub credential_hash: String,
    pub wallet_id: Option<WalletId>,
    pub created_at: DateTime<Utc>,
}

/// Order entity
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct Order {
    pub order_id: String,
    pub user_id: UserId,
    pub status: OrderStatus,
    pub accrual: MinorUnits,
    pub uploaded_at: DateTime<Utc>,
}

/// Withdrawal entity - an immutable debit receipt
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct Withdrawal {
    pub receipt_id: String,
    pub wallet_id: WalletId,
    pub amount: MinorUnits,
    pub processed_at: DateTime<Utc>,
}

/// Balance projection of a wallet
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromRow)]
pub struct Balance {
    pub current: MinorUnits,
    pub withdrawn: MinorUnits,
}

/// Result of folding an accrual verdict into the ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerdictApplied {
    /// Status (and accrual, if any) written; `credited` is what the wallet received.
    Updated {
        status: OrderStatus,
        credited: MinorUnits,
    },
    /// The order had already reached a terminal status; nothing changed.
    AlreadyFinal,
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_truncating_conversion() {
        assert_eq!(MinorUnits::from_decimal_truncated(dec!(50.00)), Some(MinorUnits(5000)));
        assert_eq!(MinorUnits::from_decimal_truncated(dec!(12.349)), Some(MinorUnits(1234)));
        assert_eq!(MinorUnits::from_decimal_truncated(dec!(0.009)), Some(MinorUnits(0)));
        assert_eq!(MinorUnits::from_decimal_truncated(dec!(-0.019)), Some(MinorUnits(-1)));
        assert_eq!(MinorUnits::from_decimal_truncated(dec!(729.98)), Some(MinorUnits(72998)));
    }

    #[test]
    fn test_to_decimal() {
        assert_eq!(MinorUnits(400).to_decimal(), dec!(4.00));
        assert_eq!(MinorUnits(5000).to_string(), "50.00");
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(OrderStatus::Processed.is_terminal());
        assert!(OrderStatus::Invalid.is_terminal());
        assert!(OrderStatus::New.is_pending());
        assert!(OrderStatus::Registered.is_pending());
        assert!(OrderStatus::Processing.is_pending());
    }

    proptest! {
        #[test]
        fn truncation_never_rounds_up(cents in 0i64..10_000_000, extra in 0u32..10) {
            // cents + a sub-cent fraction always truncates back to cents
            let amount = Decimal::new(cents * 10 + extra as i64, 3);
            prop_assert_eq!(MinorUnits::from_decimal_truncated(amount), Some(MinorUnits(cents)));
        }
    }
}
