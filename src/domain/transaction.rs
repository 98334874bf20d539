//! Wallet transaction domain entity.
//! Append-only ledger rows; only `status` and `note` ever change.

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::{stored_enum, LedgerError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionType {
    Deposit,
    Purchase,
    Refund,
}

stored_enum!(TransactionType, "transaction type", {
    Deposit => "DEPOSIT",
    Purchase => "PURCHASE",
    Refund => "REFUND",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    Pending,
    Success,
    Failed,
}

stored_enum!(TransactionStatus, "transaction status", {
    Pending => "PENDING",
    Success => "SUCCESS",
    Failed => "FAILED",
});

impl TransactionStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TransactionStatus::Pending)
    }

    /// PENDING is the only state with outgoing edges.
    pub fn can_transition_to(&self, next: TransactionStatus) -> bool {
        matches!(
            (self, next),
            (TransactionStatus::Pending, TransactionStatus::Success)
                | (TransactionStatus::Pending, TransactionStatus::Failed)
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WalletTransaction {
    pub id: Uuid,
    pub wallet_id: Uuid,
    pub transaction_type: TransactionType,
    pub amount: BigDecimal,
    pub status: TransactionStatus,
    pub reference_id: Option<Uuid>,
    pub bank_name: Option<String>,
    pub bank_account: Option<String>,
    pub transfer_code: Option<String>,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WalletTransaction {
    fn new(
        wallet_id: Uuid,
        transaction_type: TransactionType,
        amount: BigDecimal,
        status: TransactionStatus,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            wallet_id,
            transaction_type,
            amount,
            status,
            reference_id: None,
            bank_name: None,
            bank_account: None,
            transfer_code: None,
            note: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// A deposit awaiting the matching bank transfer.
    pub fn pending_deposit(
        wallet_id: Uuid,
        amount: BigDecimal,
        bank_name: Option<String>,
        bank_account: String,
        transfer_code: String,
    ) -> Self {
        let mut tx = Self::new(
            wallet_id,
            TransactionType::Deposit,
            amount,
            TransactionStatus::Pending,
        );
        tx.note = Some(format!("Deposit init - transfer: {}", transfer_code));
        tx.bank_name = bank_name;
        tx.bank_account = Some(bank_account);
        tx.transfer_code = Some(transfer_code);
        tx
    }

    /// A settled wallet debit paying for `purchase_id`.
    pub fn purchase(wallet_id: Uuid, amount: BigDecimal, purchase_id: Uuid, title: &str) -> Self {
        let mut tx = Self::new(
            wallet_id,
            TransactionType::Purchase,
            amount,
            TransactionStatus::Success,
        );
        tx.reference_id = Some(purchase_id);
        tx.note = Some(format!("Purchase workflow: {}", title));
        tx
    }

    pub fn transition(&mut self, next: TransactionStatus) -> Result<(), LedgerError> {
        if !self.status.can_transition_to(next) {
            return Err(LedgerError::IllegalTransition {
                from: self.status.as_str(),
                to: next.as_str(),
            });
        }

        self.status = next;
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn append_note(&mut self, text: &str) {
        self.note = Some(match self.note.take() {
            Some(existing) if !existing.is_empty() => format!("{} - {}", existing, text),
            _ => text.to_string(),
        });
    }
}
