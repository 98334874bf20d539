//! In-memory implementation of every port, used by service and handler tests.
//!
//! A unit of work holds the ledger mutex for its whole lifetime and edits a
//! private copy of the state; `commit` swaps the copy in, dropping discards it.
//! The uniqueness rules backed by indexes in Postgres are enforced here too.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bigdecimal::{BigDecimal, Zero};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use uuid::Uuid;

use crate::domain::{
    Account, CatalogItem, Invoice, Notification, Purchase, PurchaseStatus, Role, TransactionStatus,
    TransactionType, Wallet, WalletTransaction,
};
use crate::ports::{
    AccountDirectory, DepositOverview, DepositRecord, LedgerStore, LedgerUnit, NotificationStore,
    ProductCatalog, PurchaseBuyer, PurchaseOverview, PurchaseRecord, RepositoryError,
    RepositoryResult,
};

/// Points at which a test can make the next storage call fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultPoint {
    InsertTransaction,
    InsertPurchase,
    InsertInvoice,
    SaveWallet,
    Commit,
}

#[derive(Debug, Default, Clone)]
struct LedgerState {
    wallets: Vec<Wallet>,
    transactions: Vec<WalletTransaction>,
    purchases: Vec<Purchase>,
    invoices: Vec<Invoice>,
}

#[derive(Debug, Default)]
struct DirectoryState {
    accounts: HashMap<Uuid, Account>,
    items: HashMap<Uuid, CatalogItem>,
    notifications: Vec<Notification>,
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    ledger: Arc<AsyncMutex<LedgerState>>,
    directory: Arc<Mutex<DirectoryState>>,
    faults: Arc<Mutex<HashSet<FaultPoint>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_account(&self, role: Role, email: &str) -> Account {
        let account = Account {
            id: Uuid::new_v4(),
            email: Some(email.to_string()),
            name: email.split('@').next().map(str::to_string),
            role,
        };
        self.directory
            .lock()
            .unwrap()
            .accounts
            .insert(account.id, account.clone());
        account
    }

    pub fn add_item(&self, title: &str, price: BigDecimal) -> CatalogItem {
        let item = CatalogItem {
            id: Uuid::new_v4(),
            title: title.to_string(),
            price,
        };
        self.directory
            .lock()
            .unwrap()
            .items
            .insert(item.id, item.clone());
        item
    }

    /// Makes the next storage call at `point` fail once.
    pub fn fail_next(&self, point: FaultPoint) {
        self.faults.lock().unwrap().insert(point);
    }

    /// Seeds a transaction directly, bypassing services.
    pub async fn seed_transaction(&self, tx: WalletTransaction) {
        self.ledger.lock().await.transactions.push(tx);
    }
}

fn trip(faults: &Mutex<HashSet<FaultPoint>>, point: FaultPoint) -> RepositoryResult<()> {
    if faults.lock().unwrap().remove(&point) {
        return Err(RepositoryError::Database(sqlx::Error::PoolTimedOut));
    }
    Ok(())
}

fn join_purchase(directory: &DirectoryState, purchase: &Purchase) -> Option<PurchaseRecord> {
    let buyer = directory.accounts.get(&purchase.user_id)?;
    let item = directory.items.get(&purchase.workflow_id)?;
    Some(PurchaseRecord {
        purchase: purchase.clone(),
        user: PurchaseBuyer {
            id: buyer.id,
            name: buyer.name.clone(),
            email: buyer.email.clone(),
        },
        workflow: item.clone(),
    })
}

fn newest_first<T>(mut rows: Vec<T>, created_at: impl Fn(&T) -> chrono::DateTime<chrono::Utc>) -> Vec<T> {
    rows.sort_by(|a, b| created_at(b).cmp(&created_at(a)));
    rows
}

#[async_trait]
impl AccountDirectory for MemoryStore {
    async fn get_user(&self, id: Uuid) -> RepositoryResult<Option<Account>> {
        Ok(self.directory.lock().unwrap().accounts.get(&id).cloned())
    }

    async fn list_admins(&self) -> RepositoryResult<Vec<Account>> {
        Ok(self
            .directory
            .lock()
            .unwrap()
            .accounts
            .values()
            .filter(|a| a.is_admin())
            .cloned()
            .collect())
    }
}

#[async_trait]
impl ProductCatalog for MemoryStore {
    async fn get_item(&self, id: Uuid) -> RepositoryResult<Option<CatalogItem>> {
        Ok(self.directory.lock().unwrap().items.get(&id).cloned())
    }
}

#[async_trait]
impl NotificationStore for MemoryStore {
    async fn create(&self, notification: &Notification) -> RepositoryResult<()> {
        self.directory
            .lock()
            .unwrap()
            .notifications
            .push(notification.clone());
        Ok(())
    }

    async fn list_for_user(&self, user_id: Uuid) -> RepositoryResult<Vec<Notification>> {
        let rows = self
            .directory
            .lock()
            .unwrap()
            .notifications
            .iter()
            .filter(|n| n.user_id == user_id)
            .cloned()
            .collect();
        Ok(newest_first(rows, |n: &Notification| n.created_at))
    }

    async fn mark_read(&self, user_id: Uuid, id: Uuid) -> RepositoryResult<bool> {
        let mut directory = self.directory.lock().unwrap();
        match directory
            .notifications
            .iter_mut()
            .find(|n| n.id == id && n.user_id == user_id)
        {
            Some(notification) => {
                notification.is_unread = false;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete(&self, user_id: Uuid, id: Uuid) -> RepositoryResult<bool> {
        let mut directory = self.directory.lock().unwrap();
        let before = directory.notifications.len();
        directory
            .notifications
            .retain(|n| !(n.id == id && n.user_id == user_id));
        Ok(directory.notifications.len() < before)
    }

    async fn delete_all(&self, user_id: Uuid) -> RepositoryResult<u64> {
        let mut directory = self.directory.lock().unwrap();
        let before = directory.notifications.len();
        directory.notifications.retain(|n| n.user_id != user_id);
        Ok((before - directory.notifications.len()) as u64)
    }
}

#[async_trait]
impl LedgerStore for MemoryStore {
    async fn begin(&self) -> RepositoryResult<Box<dyn LedgerUnit>> {
        let guard = self.ledger.clone().lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(MemoryUnit {
            guard,
            working,
            faults: self.faults.clone(),
        }))
    }

    async fn find_wallet(&self, user_id: Uuid) -> RepositoryResult<Option<Wallet>> {
        let state = self.ledger.lock().await;
        Ok(state.wallets.iter().find(|w| w.user_id == user_id).cloned())
    }

    async fn list_transactions(&self, wallet_id: Uuid) -> RepositoryResult<Vec<WalletTransaction>> {
        let state = self.ledger.lock().await;
        let rows = state
            .transactions
            .iter()
            .filter(|t| t.wallet_id == wallet_id)
            .cloned()
            .collect();
        Ok(newest_first(rows, |t: &WalletTransaction| t.created_at))
    }

    async fn find_transaction(&self, id: Uuid) -> RepositoryResult<Option<WalletTransaction>> {
        let state = self.ledger.lock().await;
        Ok(state.transactions.iter().find(|t| t.id == id).cloned())
    }

    async fn transfer_code_exists(&self, code: &str) -> RepositoryResult<bool> {
        let state = self.ledger.lock().await;
        Ok(state.transactions.iter().any(|t| {
            t.transaction_type == TransactionType::Deposit && t.transfer_code.as_deref() == Some(code)
        }))
    }

    async fn pending_deposits_by_amount(
        &self,
        amount: &BigDecimal,
    ) -> RepositoryResult<Vec<WalletTransaction>> {
        let state = self.ledger.lock().await;
        let mut rows: Vec<WalletTransaction> = state
            .transactions
            .iter()
            .filter(|t| {
                t.transaction_type == TransactionType::Deposit
                    && t.status == TransactionStatus::Pending
                    && &t.amount == amount
            })
            .cloned()
            .collect();
        rows.sort_by_key(|t| t.created_at);
        Ok(rows)
    }

    async fn list_deposits(&self) -> RepositoryResult<Vec<DepositRecord>> {
        let state = self.ledger.lock().await;
        let directory = self.directory.lock().unwrap();
        let rows = state
            .transactions
            .iter()
            .filter(|t| t.transaction_type == TransactionType::Deposit)
            .filter_map(|t| {
                let wallet = state.wallets.iter().find(|w| w.id == t.wallet_id)?;
                Some(DepositRecord {
                    transaction: t.clone(),
                    user_id: wallet.user_id,
                    user_email: directory
                        .accounts
                        .get(&wallet.user_id)
                        .and_then(|a| a.email.clone()),
                })
            })
            .collect();
        Ok(newest_first(rows, |r: &DepositRecord| r.transaction.created_at))
    }

    async fn deposit_overview(&self) -> RepositoryResult<DepositOverview> {
        let state = self.ledger.lock().await;
        let deposits: Vec<&WalletTransaction> = state
            .transactions
            .iter()
            .filter(|t| t.transaction_type == TransactionType::Deposit)
            .collect();
        let count = |status: TransactionStatus| {
            deposits.iter().filter(|t| t.status == status).count() as i64
        };

        Ok(DepositOverview {
            total_count: deposits.len() as i64,
            total_amount: deposits
                .iter()
                .fold(BigDecimal::zero(), |acc, t| acc + &t.amount),
            completed_count: count(TransactionStatus::Success),
            pending_count: count(TransactionStatus::Pending),
            rejected_count: count(TransactionStatus::Failed),
        })
    }

    async fn find_purchase(&self, id: Uuid) -> RepositoryResult<Option<Purchase>> {
        let state = self.ledger.lock().await;
        Ok(state.purchases.iter().find(|p| p.id == id).cloned())
    }

    async fn list_purchases_for_user(&self, user_id: Uuid) -> RepositoryResult<Vec<Purchase>> {
        let state = self.ledger.lock().await;
        let rows = state
            .purchases
            .iter()
            .filter(|p| p.user_id == user_id)
            .cloned()
            .collect();
        Ok(newest_first(rows, |p: &Purchase| p.created_at))
    }

    async fn find_invoice(&self, purchase_id: Uuid) -> RepositoryResult<Option<Invoice>> {
        let state = self.ledger.lock().await;
        Ok(state
            .invoices
            .iter()
            .find(|i| i.purchase_id == purchase_id)
            .cloned())
    }

    async fn list_purchases(&self, search: Option<&str>) -> RepositoryResult<Vec<PurchaseRecord>> {
        let state = self.ledger.lock().await;
        let directory = self.directory.lock().unwrap();
        let needle = search.map(str::to_lowercase);
        let contains = |text: Option<&str>, needle: &str| {
            text.map_or(false, |text| text.to_lowercase().contains(needle))
        };

        let rows = state
            .purchases
            .iter()
            .filter_map(|p| join_purchase(&directory, p))
            .filter(|record| match needle.as_deref() {
                None => true,
                Some(needle) => {
                    contains(record.user.name.as_deref(), needle)
                        || contains(Some(record.workflow.title.as_str()), needle)
                }
            })
            .collect();
        Ok(newest_first(rows, |r: &PurchaseRecord| r.purchase.created_at))
    }

    async fn purchase_record(&self, id: Uuid) -> RepositoryResult<Option<PurchaseRecord>> {
        let state = self.ledger.lock().await;
        let directory = self.directory.lock().unwrap();
        Ok(state
            .purchases
            .iter()
            .find(|p| p.id == id)
            .and_then(|p| join_purchase(&directory, p)))
    }

    async fn purchase_overview(&self) -> RepositoryResult<PurchaseOverview> {
        let state = self.ledger.lock().await;
        let count = |status: PurchaseStatus| {
            state.purchases.iter().filter(|p| p.status == status).count() as i64
        };

        Ok(PurchaseOverview {
            total_count: state.purchases.len() as i64,
            completed_count: count(PurchaseStatus::Active),
            pending_count: count(PurchaseStatus::Pending),
            total_revenue: state
                .purchases
                .iter()
                .filter(|p| p.status == PurchaseStatus::Active)
                .fold(BigDecimal::zero(), |acc, p| acc + &p.amount),
        })
    }
}

pub struct MemoryUnit {
    guard: OwnedMutexGuard<LedgerState>,
    working: LedgerState,
    faults: Arc<Mutex<HashSet<FaultPoint>>>,
}

impl MemoryUnit {
    fn duplicate_active(&self, purchase: &Purchase) -> bool {
        purchase.status == PurchaseStatus::Active
            && self.working.purchases.iter().any(|p| {
                p.id != purchase.id
                    && p.user_id == purchase.user_id
                    && p.workflow_id == purchase.workflow_id
                    && p.status == PurchaseStatus::Active
            })
    }
}

#[async_trait]
impl LedgerUnit for MemoryUnit {
    async fn wallet_for_update(&mut self, user_id: Uuid) -> RepositoryResult<Wallet> {
        if let Some(wallet) = self.working.wallets.iter().find(|w| w.user_id == user_id) {
            return Ok(wallet.clone());
        }
        let wallet = Wallet::new(user_id);
        self.working.wallets.push(wallet.clone());
        Ok(wallet)
    }

    async fn wallet_by_id_for_update(&mut self, wallet_id: Uuid) -> RepositoryResult<Option<Wallet>> {
        Ok(self.working.wallets.iter().find(|w| w.id == wallet_id).cloned())
    }

    async fn save_wallet(&mut self, wallet: &Wallet) -> RepositoryResult<()> {
        trip(&self.faults, FaultPoint::SaveWallet)?;
        if wallet.balance < BigDecimal::zero() || !wallet.is_consistent() {
            return Err(RepositoryError::Database(sqlx::Error::Protocol(
                "wallets_balance_matches_totals violated".to_string(),
            )));
        }
        let slot = self
            .working
            .wallets
            .iter_mut()
            .find(|w| w.id == wallet.id)
            .ok_or_else(|| RepositoryError::NotFound(format!("wallet {}", wallet.id)))?;
        *slot = wallet.clone();
        Ok(())
    }

    async fn transaction_for_update(
        &mut self,
        id: Uuid,
    ) -> RepositoryResult<Option<WalletTransaction>> {
        Ok(self.working.transactions.iter().find(|t| t.id == id).cloned())
    }

    async fn insert_transaction(&mut self, tx: &WalletTransaction) -> RepositoryResult<()> {
        trip(&self.faults, FaultPoint::InsertTransaction)?;
        let duplicate_code = tx.transaction_type == TransactionType::Deposit
            && tx.transfer_code.is_some()
            && self.working.transactions.iter().any(|t| {
                t.transaction_type == TransactionType::Deposit && t.transfer_code == tx.transfer_code
            });
        if duplicate_code {
            return Err(RepositoryError::UniqueViolation(
                "uq_wallet_transactions_deposit_code".to_string(),
            ));
        }
        self.working.transactions.push(tx.clone());
        Ok(())
    }

    async fn save_transaction(&mut self, tx: &WalletTransaction) -> RepositoryResult<()> {
        let slot = self
            .working
            .transactions
            .iter_mut()
            .find(|t| t.id == tx.id)
            .ok_or_else(|| RepositoryError::NotFound(format!("transaction {}", tx.id)))?;
        slot.status = tx.status;
        slot.note = tx.note.clone();
        slot.updated_at = tx.updated_at;
        Ok(())
    }

    async fn active_purchase(
        &mut self,
        user_id: Uuid,
        workflow_id: Uuid,
        excluding: Option<Uuid>,
    ) -> RepositoryResult<Option<Purchase>> {
        Ok(self
            .working
            .purchases
            .iter()
            .find(|p| {
                p.user_id == user_id
                    && p.workflow_id == workflow_id
                    && p.status == PurchaseStatus::Active
                    && Some(p.id) != excluding
            })
            .cloned())
    }

    async fn purchase_for_update(&mut self, id: Uuid) -> RepositoryResult<Option<Purchase>> {
        Ok(self.working.purchases.iter().find(|p| p.id == id).cloned())
    }

    async fn insert_purchase(&mut self, purchase: &Purchase) -> RepositoryResult<()> {
        trip(&self.faults, FaultPoint::InsertPurchase)?;
        if self.duplicate_active(purchase) {
            return Err(RepositoryError::UniqueViolation(
                "uq_purchases_active_owner".to_string(),
            ));
        }
        self.working.purchases.push(purchase.clone());
        Ok(())
    }

    async fn save_purchase(&mut self, purchase: &Purchase) -> RepositoryResult<()> {
        if self.duplicate_active(purchase) {
            return Err(RepositoryError::UniqueViolation(
                "uq_purchases_active_owner".to_string(),
            ));
        }
        let slot = self
            .working
            .purchases
            .iter_mut()
            .find(|p| p.id == purchase.id)
            .ok_or_else(|| RepositoryError::NotFound(format!("purchase {}", purchase.id)))?;
        slot.status = purchase.status;
        slot.paid_at = purchase.paid_at;
        slot.updated_at = purchase.updated_at;
        Ok(())
    }

    async fn invoice_for_purchase(&mut self, purchase_id: Uuid) -> RepositoryResult<Option<Invoice>> {
        Ok(self
            .working
            .invoices
            .iter()
            .find(|i| i.purchase_id == purchase_id)
            .cloned())
    }

    async fn insert_invoice(&mut self, invoice: &Invoice) -> RepositoryResult<()> {
        trip(&self.faults, FaultPoint::InsertInvoice)?;
        if self
            .working
            .invoices
            .iter()
            .any(|i| i.purchase_id == invoice.purchase_id)
        {
            return Err(RepositoryError::UniqueViolation(
                "invoices_purchase_id_key".to_string(),
            ));
        }
        self.working.invoices.push(invoice.clone());
        Ok(())
    }

    async fn commit(self: Box<Self>) -> RepositoryResult<()> {
        let MemoryUnit {
            mut guard,
            working,
            faults,
        } = *self;
        trip(&faults, FaultPoint::Commit)?;
        *guard = working;
        Ok(())
    }
}
