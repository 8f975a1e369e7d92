use crate::error::LedgerError;
use crate::ledger::models::{Balance, MinorUnits, WalletId};
use sqlx::prelude::FromRow;

/// Wallet entity
///
/// INVARIANTS:
/// - `balance >= 0` after every operation
/// - `withdrawn` never decreases
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct Wallet {
    pub id: WalletId,
    pub balance: MinorUnits,
    pub withdrawn: MinorUnits,
}

impl Wallet {
    pub fn new(id: WalletId) -> Self {
        Self {
            id,
            balance: MinorUnits::ZERO,
            withdrawn: MinorUnits::ZERO,
        }
    }

    /// Credit the wallet. No upper bound other than integer overflow.
    pub fn deposit(&mut self, amount: MinorUnits) -> Result<(), LedgerError> {
        self.balance = self
            .balance
            .checked_add(amount)
            .ok_or(LedgerError::BalanceOverflow(self.id))?;
        Ok(())
    }

    /// Debit the wallet, moving `amount` from balance into the withdrawn total.
    ///
    /// Leaves the wallet untouched when `amount > balance`.
    pub fn withdraw(&mut self, amount: MinorUnits) -> Result<(), LedgerError> {
        if amount > self.balance {
            return Err(LedgerError::InsufficientBalance {
                available: self.balance,
                requested: amount,
            });
        }

        let withdrawn = self
            .withdrawn
            .checked_add(amount)
            .ok_or(LedgerError::BalanceOverflow(self.id))?;
        let balance = self
            .balance
            .checked_sub(amount)
            .ok_or(LedgerError::BalanceOverflow(self.id))?;

        self.balance = balance;
        self.withdrawn = withdrawn;
        Ok(())
    }

    pub fn balance(&self) -> Balance {
        Balance {
            current: self.balance,
            withdrawn: self.withdrawn,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_withdraw_scenario() {
        let mut wallet = Wallet::new(1);
        wallet.deposit(MinorUnits(1000)).unwrap();

        wallet.withdraw(MinorUnits(600)).unwrap();
        assert_eq!(wallet.balance, MinorUnits(400));
        assert_eq!(wallet.withdrawn, MinorUnits(600));

        let err = wallet.withdraw(MinorUnits(600)).unwrap_err();
        assert_eq!(
            err,
            LedgerError::InsufficientBalance {
                available: MinorUnits(400),
                requested: MinorUnits(600),
            }
        );
        assert_eq!(wallet.balance, MinorUnits(400));
        assert_eq!(wallet.withdrawn, MinorUnits(600));
    }

    #[test]
    fn test_withdraw_entire_balance() {
        let mut wallet = Wallet::new(1);
        wallet.deposit(MinorUnits(250)).unwrap();
        wallet.withdraw(MinorUnits(250)).unwrap();
        assert_eq!(wallet.balance, MinorUnits::ZERO);
    }

    #[test]
    fn test_deposit_overflow() {
        let mut wallet = Wallet::new(3);
        wallet.deposit(MinorUnits(i64::MAX)).unwrap();
        assert_eq!(
            wallet.deposit(MinorUnits(1)),
            Err(LedgerError::BalanceOverflow(3))
        );
        assert_eq!(wallet.balance, MinorUnits(i64::MAX));
    }

    #[derive(Debug, Clone)]
    enum Op {
        Deposit(i64),
        Withdraw(i64),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0i64..100_000).prop_map(Op::Deposit),
            (0i64..100_000).prop_map(Op::Withdraw),
        ]
    }

    proptest! {
        #[test]
        fn balance_never_negative(ops in prop::collection::vec(op(), 0..64)) {
            let mut wallet = Wallet::new(1);
            for op in ops {
                let before = wallet.clone();
                let previous_withdrawn = wallet.withdrawn;
                match op {
                    Op::Deposit(amount) => {
                        wallet.deposit(MinorUnits(amount)).unwrap();
                    }
                    Op::Withdraw(amount) => {
                        if wallet.withdraw(MinorUnits(amount)).is_err() {
                            prop_assert!(amount > before.balance.0);
                            prop_assert_eq!(&wallet, &before);
                        }
                    }
                }
                prop_assert!(wallet.balance.0 >= 0);
                prop_assert!(wallet.withdrawn >= previous_withdrawn);
            }
        }
    }
}
