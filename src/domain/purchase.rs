use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{stored_enum, Account, CatalogItem};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PurchaseStatus {
    Pending,
    Active,
    Reject,
}

stored_enum!(PurchaseStatus, "purchase status", {
    Pending => "PENDING",
    Active => "ACTIVE",
    Reject => "REJECT",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PaymentMethod {
    #[serde(rename = "WALLET")]
    Wallet,
    #[serde(rename = "QR")]
    BankTransfer,
}

stored_enum!(PaymentMethod, "payment method", {
    Wallet => "WALLET",
    BankTransfer => "QR",
});

/// Bank details a buyer declares when paying by transfer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct BankDetails {
    pub bank_account: Option<String>,
    pub bank_name: Option<String>,
    pub transfer_code: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Purchase {
    pub id: Uuid,
    pub user_id: Uuid,
    pub workflow_id: Uuid,
    pub amount: BigDecimal,
    pub status: PurchaseStatus,
    pub payment_method: PaymentMethod,
    pub paid_at: Option<DateTime<Utc>>,
    pub bank_account: Option<String>,
    pub bank_name: Option<String>,
    pub transfer_code: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Purchase {
    fn new(user_id: Uuid, item: &CatalogItem, status: PurchaseStatus, method: PaymentMethod) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            workflow_id: item.id,
            amount: item.price.clone(),
            status,
            payment_method: method,
            paid_at: None,
            bank_account: None,
            bank_name: None,
            transfer_code: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Purchase settled immediately from wallet balance.
    pub fn paid_with_wallet(user_id: Uuid, item: &CatalogItem) -> Self {
        let mut purchase = Self::new(user_id, item, PurchaseStatus::Active, PaymentMethod::Wallet);
        purchase.paid_at = Some(purchase.created_at);
        purchase
    }

    /// Order awaiting an out-of-band bank transfer.
    pub fn bank_transfer(user_id: Uuid, item: &CatalogItem, details: BankDetails) -> Self {
        let mut purchase = Self::new(
            user_id,
            item,
            PurchaseStatus::Pending,
            PaymentMethod::BankTransfer,
        );
        purchase.bank_account = details.bank_account;
        purchase.bank_name = details.bank_name;
        purchase.transfer_code = details.transfer_code;
        purchase
    }

    pub fn set_status(&mut self, status: PurchaseStatus) {
        let now = Utc::now();
        if status == PurchaseStatus::Active && self.paid_at.is_none() {
            self.paid_at = Some(now);
        }
        self.status = status;
        self.updated_at = now;
    }
}

/// Immutable billing snapshot taken when a purchase becomes active.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Invoice {
    pub id: Uuid,
    pub purchase_id: Uuid,
    pub billing_name: String,
    pub billing_email: String,
    pub amount: BigDecimal,
    pub issued_at: DateTime<Utc>,
}

impl Invoice {
    pub fn issue(purchase: &Purchase, buyer: &Account) -> Self {
        Self {
            id: Uuid::new_v4(),
            purchase_id: purchase.id,
            billing_name: buyer.name.clone().unwrap_or_else(|| "User".to_string()),
            billing_email: buyer.email.clone().unwrap_or_default(),
            amount: purchase.amount.clone(),
            issued_at: Utc::now(),
        }
    }
}
