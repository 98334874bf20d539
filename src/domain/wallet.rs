use bigdecimal::{BigDecimal, Zero};
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::LedgerError;

/// Per-user balance aggregate.
///
/// `balance == total_deposited - total_spent` holds after every mutation
/// performed through [`Wallet::credit`] and [`Wallet::debit`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Wallet {
    pub id: Uuid,
    pub user_id: Uuid,
    pub balance: BigDecimal,
    pub total_deposited: BigDecimal,
    pub total_spent: BigDecimal,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Wallet {
    pub fn new(user_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            balance: BigDecimal::zero(),
            total_deposited: BigDecimal::zero(),
            total_spent: BigDecimal::zero(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn credit(&mut self, amount: &BigDecimal) -> Result<(), LedgerError> {
        if amount <= &BigDecimal::zero() {
            return Err(LedgerError::InvalidAmount);
        }

        self.balance = &self.balance + amount;
        self.total_deposited = &self.total_deposited + amount;
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn debit(&mut self, amount: &BigDecimal) -> Result<(), LedgerError> {
        if amount <= &BigDecimal::zero() {
            return Err(LedgerError::InvalidAmount);
        }
        if self.balance < *amount {
            return Err(LedgerError::InsufficientBalance {
                available: self.balance.clone(),
                required: amount.clone(),
            });
        }

        self.balance = &self.balance - amount;
        self.total_spent = &self.total_spent + amount;
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn is_consistent(&self) -> bool {
        self.balance == &self.total_deposited - &self.total_spent
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn amount(value: &str) -> BigDecimal {
        BigDecimal::from_str(value).unwrap()
    }

    #[test]
    fn test_new_wallet_is_empty() {
        let wallet = Wallet::new(Uuid::new_v4());
        assert_eq!(wallet.balance, BigDecimal::zero());
        assert!(wallet.is_consistent());
    }

    #[test]
    fn test_credit_updates_balance_and_deposits() {
        let mut wallet = Wallet::new(Uuid::new_v4());
        wallet.credit(&amount("100000")).unwrap();
        wallet.credit(&amount("0.50")).unwrap();

        assert_eq!(wallet.balance, amount("100000.50"));
        assert_eq!(wallet.total_deposited, amount("100000.50"));
        assert!(wallet.is_consistent());
    }

    #[test]
    fn test_credit_rejects_non_positive_amounts() {
        let mut wallet = Wallet::new(Uuid::new_v4());
        assert_eq!(
            wallet.credit(&BigDecimal::zero()),
            Err(LedgerError::InvalidAmount)
        );
        assert_eq!(
            wallet.credit(&amount("-5")),
            Err(LedgerError::InvalidAmount)
        );
        assert_eq!(wallet.balance, BigDecimal::zero());
    }

    #[test]
    fn test_debit_moves_balance_to_spent() {
        let mut wallet = Wallet::new(Uuid::new_v4());
        wallet.credit(&amount("100000")).unwrap();
        wallet.debit(&amount("40000")).unwrap();

        assert_eq!(wallet.balance, amount("60000"));
        assert_eq!(wallet.total_spent, amount("40000"));
        assert!(wallet.is_consistent());
    }

    #[test]
    fn test_debit_exact_balance_reaches_zero() {
        let mut wallet = Wallet::new(Uuid::new_v4());
        wallet.credit(&amount("250.25")).unwrap();
        wallet.debit(&amount("250.25")).unwrap();
        assert_eq!(wallet.balance, BigDecimal::zero());
    }

    #[test]
    fn test_debit_insufficient_balance_leaves_wallet_untouched() {
        let mut wallet = Wallet::new(Uuid::new_v4());
        wallet.credit(&amount("10")).unwrap();
        let before = wallet.clone();

        let err = wallet.debit(&amount("50000")).unwrap_err();
        assert_eq!(
            err,
            LedgerError::InsufficientBalance {
                available: amount("10"),
                required: amount("50000"),
            }
        );
        assert_eq!(wallet, before);
    }
}
