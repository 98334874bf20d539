//! Storage and collaborator ports.
//! Services depend on these traits; adapters provide Postgres (and test) implementations.

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::{
    Account, CatalogItem, Invoice, Notification, Purchase, Wallet, WalletTransaction,
};
use crate::error::AppError;

pub type RepositoryResult<T> = Result<T, RepositoryError>;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("record not found: {0}")]
    NotFound(String),

    #[error("unique constraint violated: {0}")]
    UniqueViolation(String),

    #[error("database error: {0}")]
    Database(sqlx::Error),
}

impl From<sqlx::Error> for RepositoryError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            if db_err.is_unique_violation() {
                let constraint = db_err.constraint().unwrap_or("unique").to_string();
                return RepositoryError::UniqueViolation(constraint);
            }
        }
        RepositoryError::Database(err)
    }
}

impl From<RepositoryError> for AppError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound(what) => AppError::NotFound(what),
            RepositoryError::UniqueViolation(constraint) => {
                AppError::Conflict(format!("duplicate value violates {}", constraint))
            }
            RepositoryError::Database(e) => AppError::Database(e),
        }
    }
}

/// A pending deposit joined with its owner for the admin listing.
#[derive(Debug, Clone, Serialize)]
pub struct DepositRecord {
    #[serde(flatten)]
    pub transaction: WalletTransaction,
    pub user_id: Uuid,
    pub user_email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DepositOverview {
    pub total_count: i64,
    pub total_amount: BigDecimal,
    pub completed_count: i64,
    pub pending_count: i64,
    pub rejected_count: i64,
}

/// Who bought a purchase, as shown to administrators.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PurchaseBuyer {
    pub id: Uuid,
    pub name: Option<String>,
    pub email: Option<String>,
}

/// A purchase joined with its buyer and workflow for the admin views.
#[derive(Debug, Clone, Serialize)]
pub struct PurchaseRecord {
    #[serde(flatten)]
    pub purchase: Purchase,
    pub user: PurchaseBuyer,
    pub workflow: CatalogItem,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PurchaseOverview {
    pub total_count: i64,
    pub completed_count: i64,
    pub pending_count: i64,
    /// Sum of ACTIVE purchase amounts.
    pub total_revenue: BigDecimal,
}

#[async_trait]
pub trait AccountDirectory: Send + Sync {
    /// Live (non-deleted) account by id.
    async fn get_user(&self, id: Uuid) -> RepositoryResult<Option<Account>>;

    async fn list_admins(&self) -> RepositoryResult<Vec<Account>>;
}

#[async_trait]
pub trait ProductCatalog: Send + Sync {
    async fn get_item(&self, id: Uuid) -> RepositoryResult<Option<CatalogItem>>;
}

#[async_trait]
pub trait NotificationStore: Send + Sync {
    async fn create(&self, notification: &Notification) -> RepositoryResult<()>;

    /// Newest first.
    async fn list_for_user(&self, user_id: Uuid) -> RepositoryResult<Vec<Notification>>;

    /// Returns false when the notification does not exist or belongs to someone else.
    async fn mark_read(&self, user_id: Uuid, id: Uuid) -> RepositoryResult<bool>;

    async fn delete(&self, user_id: Uuid, id: Uuid) -> RepositoryResult<bool>;

    async fn delete_all(&self, user_id: Uuid) -> RepositoryResult<u64>;
}

/// Read side of the ledger plus the entry point for atomic units of work.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn begin(&self) -> RepositoryResult<Box<dyn LedgerUnit>>;

    async fn find_wallet(&self, user_id: Uuid) -> RepositoryResult<Option<Wallet>>;

    /// Newest first.
    async fn list_transactions(&self, wallet_id: Uuid) -> RepositoryResult<Vec<WalletTransaction>>;

    async fn find_transaction(&self, id: Uuid) -> RepositoryResult<Option<WalletTransaction>>;

    /// True when any DEPOSIT transaction already uses `code`.
    async fn transfer_code_exists(&self, code: &str) -> RepositoryResult<bool>;

    /// PENDING deposits of exactly `amount`, oldest first.
    async fn pending_deposits_by_amount(
        &self,
        amount: &BigDecimal,
    ) -> RepositoryResult<Vec<WalletTransaction>>;

    /// All deposits, newest first.
    async fn list_deposits(&self) -> RepositoryResult<Vec<DepositRecord>>;

    async fn deposit_overview(&self) -> RepositoryResult<DepositOverview>;

    async fn find_purchase(&self, id: Uuid) -> RepositoryResult<Option<Purchase>>;

    /// Newest first.
    async fn list_purchases_for_user(&self, user_id: Uuid) -> RepositoryResult<Vec<Purchase>>;

    async fn find_invoice(&self, purchase_id: Uuid) -> RepositoryResult<Option<Invoice>>;

    /// All purchases newest first, optionally narrowed to those whose buyer
    /// name or workflow title contains `search` (case-insensitive).
    async fn list_purchases(&self, search: Option<&str>) -> RepositoryResult<Vec<PurchaseRecord>>;

    async fn purchase_record(&self, id: Uuid) -> RepositoryResult<Option<PurchaseRecord>>;

    async fn purchase_overview(&self) -> RepositoryResult<PurchaseOverview>;
}

/// One atomic unit of ledger work.
///
/// Row locks are taken wallet first, then transaction or purchase rows.
/// Dropping a unit without calling [`LedgerUnit::commit`] discards every write.
#[async_trait]
pub trait LedgerUnit: Send {
    /// Locks the user's wallet, creating an empty one first if needed.
    async fn wallet_for_update(&mut self, user_id: Uuid) -> RepositoryResult<Wallet>;

    async fn wallet_by_id_for_update(&mut self, wallet_id: Uuid) -> RepositoryResult<Option<Wallet>>;

    async fn save_wallet(&mut self, wallet: &Wallet) -> RepositoryResult<()>;

    async fn transaction_for_update(
        &mut self,
        id: Uuid,
    ) -> RepositoryResult<Option<WalletTransaction>>;

    async fn insert_transaction(&mut self, tx: &WalletTransaction) -> RepositoryResult<()>;

    /// Persists status, note and `updated_at`; amount and ownership are immutable.
    async fn save_transaction(&mut self, tx: &WalletTransaction) -> RepositoryResult<()>;

    /// An ACTIVE purchase of `workflow_id` by `user_id`, ignoring `excluding`.
    async fn active_purchase(
        &mut self,
        user_id: Uuid,
        workflow_id: Uuid,
        excluding: Option<Uuid>,
    ) -> RepositoryResult<Option<Purchase>>;

    async fn purchase_for_update(&mut self, id: Uuid) -> RepositoryResult<Option<Purchase>>;

    async fn insert_purchase(&mut self, purchase: &Purchase) -> RepositoryResult<()>;

    async fn save_purchase(&mut self, purchase: &Purchase) -> RepositoryResult<()>;

    async fn invoice_for_purchase(&mut self, purchase_id: Uuid) -> RepositoryResult<Option<Invoice>>;

    async fn insert_invoice(&mut self, invoice: &Invoice) -> RepositoryResult<()>;

    async fn commit(self: Box<Self>) -> RepositoryResult<()>;
}
