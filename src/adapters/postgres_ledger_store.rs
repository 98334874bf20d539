//! Postgres implementation of LedgerStore / LedgerUnit.

use async_trait::async_trait;
use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use super::parse_stored;
use crate::domain::{CatalogItem, Invoice, Purchase, Wallet, WalletTransaction};
use crate::ports::{
    DepositOverview, DepositRecord, LedgerStore, LedgerUnit, PurchaseBuyer, PurchaseOverview,
    PurchaseRecord, RepositoryError, RepositoryResult,
};

const WALLET_COLUMNS: &str =
    "id, user_id, balance, total_deposited, total_spent, created_at, updated_at";

const TRANSACTION_COLUMNS: &str = "id, wallet_id, transaction_type, amount, status, reference_id, \
     bank_name, bank_account, transfer_code, note, created_at, updated_at";

const PURCHASE_COLUMNS: &str = "id, user_id, workflow_id, amount, status, payment_method, paid_at, \
     bank_account, bank_name, transfer_code, created_at, updated_at";

const PURCHASE_RECORD_SELECT: &str = r#"
    SELECT p.id, p.user_id, p.workflow_id, p.amount, p.status, p.payment_method, p.paid_at,
        p.bank_account, p.bank_name, p.transfer_code, p.created_at, p.updated_at,
        u.name AS buyer_name, u.email AS buyer_email,
        w.title AS workflow_title, w.price AS workflow_price
    FROM purchases p
    JOIN users u ON u.id = p.user_id
    JOIN workflows w ON w.id = p.workflow_id
"#;

const INVOICE_COLUMNS: &str = "id, purchase_id, billing_name, billing_email, amount, issued_at";

/// Postgres-backed ledger store.
#[derive(Clone)]
pub struct PostgresLedgerStore {
    pool: PgPool,
}

impl PostgresLedgerStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LedgerStore for PostgresLedgerStore {
    async fn begin(&self) -> RepositoryResult<Box<dyn LedgerUnit>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PostgresLedgerUnit { tx }))
    }

    async fn find_wallet(&self, user_id: Uuid) -> RepositoryResult<Option<Wallet>> {
        let row = sqlx::query_as::<_, WalletRow>(&format!(
            "SELECT {} FROM wallets WHERE user_id = $1",
            WALLET_COLUMNS
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(WalletRow::into_domain))
    }

    async fn list_transactions(&self, wallet_id: Uuid) -> RepositoryResult<Vec<WalletTransaction>> {
        let rows = sqlx::query_as::<_, TransactionRow>(&format!(
            "SELECT {} FROM wallet_transactions WHERE wallet_id = $1 ORDER BY created_at DESC",
            TRANSACTION_COLUMNS
        ))
        .bind(wallet_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TransactionRow::into_domain).collect()
    }

    async fn find_transaction(&self, id: Uuid) -> RepositoryResult<Option<WalletTransaction>> {
        let row = sqlx::query_as::<_, TransactionRow>(&format!(
            "SELECT {} FROM wallet_transactions WHERE id = $1",
            TRANSACTION_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(TransactionRow::into_domain).transpose()
    }

    async fn transfer_code_exists(&self, code: &str) -> RepositoryResult<bool> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM wallet_transactions \
             WHERE transaction_type = 'DEPOSIT' AND transfer_code = $1)",
        )
        .bind(code)
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }

    async fn pending_deposits_by_amount(
        &self,
        amount: &BigDecimal,
    ) -> RepositoryResult<Vec<WalletTransaction>> {
        let rows = sqlx::query_as::<_, TransactionRow>(&format!(
            "SELECT {} FROM wallet_transactions \
             WHERE transaction_type = 'DEPOSIT' AND status = 'PENDING' AND amount = $1 \
             ORDER BY created_at ASC",
            TRANSACTION_COLUMNS
        ))
        .bind(amount)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TransactionRow::into_domain).collect()
    }

    async fn list_deposits(&self) -> RepositoryResult<Vec<DepositRecord>> {
        let rows = sqlx::query_as::<_, DepositRow>(
            r#"
            SELECT t.id, t.wallet_id, t.transaction_type, t.amount, t.status, t.reference_id,
                t.bank_name, t.bank_account, t.transfer_code, t.note, t.created_at, t.updated_at,
                w.user_id, u.email AS user_email
            FROM wallet_transactions t
            JOIN wallets w ON w.id = t.wallet_id
            LEFT JOIN users u ON u.id = w.user_id
            WHERE t.transaction_type = 'DEPOSIT'
            ORDER BY t.created_at DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                Ok(DepositRecord {
                    transaction: row.transaction.into_domain()?,
                    user_id: row.user_id,
                    user_email: row.user_email,
                })
            })
            .collect()
    }

    async fn deposit_overview(&self) -> RepositoryResult<DepositOverview> {
        let row = sqlx::query_as::<_, OverviewRow>(
            r#"
            SELECT COUNT(*) AS total_count,
                COALESCE(SUM(amount), 0) AS total_amount,
                COUNT(*) FILTER (WHERE status = 'SUCCESS') AS completed_count,
                COUNT(*) FILTER (WHERE status = 'PENDING') AS pending_count,
                COUNT(*) FILTER (WHERE status = 'FAILED') AS rejected_count
            FROM wallet_transactions
            WHERE transaction_type = 'DEPOSIT'
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(DepositOverview {
            total_count: row.total_count,
            total_amount: row.total_amount,
            completed_count: row.completed_count,
            pending_count: row.pending_count,
            rejected_count: row.rejected_count,
        })
    }

    async fn find_purchase(&self, id: Uuid) -> RepositoryResult<Option<Purchase>> {
        let row = sqlx::query_as::<_, PurchaseRow>(&format!(
            "SELECT {} FROM purchases WHERE id = $1",
            PURCHASE_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(PurchaseRow::into_domain).transpose()
    }

    async fn list_purchases_for_user(&self, user_id: Uuid) -> RepositoryResult<Vec<Purchase>> {
        let rows = sqlx::query_as::<_, PurchaseRow>(&format!(
            "SELECT {} FROM purchases WHERE user_id = $1 ORDER BY created_at DESC",
            PURCHASE_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(PurchaseRow::into_domain).collect()
    }

    async fn find_invoice(&self, purchase_id: Uuid) -> RepositoryResult<Option<Invoice>> {
        let row = sqlx::query_as::<_, InvoiceRow>(&format!(
            "SELECT {} FROM invoices WHERE purchase_id = $1",
            INVOICE_COLUMNS
        ))
        .bind(purchase_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(InvoiceRow::into_domain))
    }

    async fn list_purchases(&self, search: Option<&str>) -> RepositoryResult<Vec<PurchaseRecord>> {
        let rows = sqlx::query_as::<_, PurchaseRecordRow>(&format!(
            "{} WHERE ($1::text IS NULL OR u.name ILIKE $1 OR w.title ILIKE $1) \
             ORDER BY p.created_at DESC",
            PURCHASE_RECORD_SELECT
        ))
        .bind(search.map(like_pattern))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(PurchaseRecordRow::into_domain).collect()
    }

    async fn purchase_record(&self, id: Uuid) -> RepositoryResult<Option<PurchaseRecord>> {
        let row = sqlx::query_as::<_, PurchaseRecordRow>(&format!(
            "{} WHERE p.id = $1",
            PURCHASE_RECORD_SELECT
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(PurchaseRecordRow::into_domain).transpose()
    }

    async fn purchase_overview(&self) -> RepositoryResult<PurchaseOverview> {
        let row = sqlx::query_as::<_, PurchaseOverviewRow>(
            r#"
            SELECT COUNT(*) AS total_count,
                COUNT(*) FILTER (WHERE status = 'ACTIVE') AS completed_count,
                COUNT(*) FILTER (WHERE status = 'PENDING') AS pending_count,
                COALESCE(SUM(amount) FILTER (WHERE status = 'ACTIVE'), 0) AS total_revenue
            FROM purchases
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(PurchaseOverview {
            total_count: row.total_count,
            completed_count: row.completed_count,
            pending_count: row.pending_count,
            total_revenue: row.total_revenue,
        })
    }
}

/// `%term%` with LIKE wildcards in the term escaped.
fn like_pattern(term: &str) -> String {
    let escaped = term
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

/// One sqlx transaction. Rolled back on drop unless committed.
pub struct PostgresLedgerUnit {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl LedgerUnit for PostgresLedgerUnit {
    async fn wallet_for_update(&mut self, user_id: Uuid) -> RepositoryResult<Wallet> {
        sqlx::query(
            "INSERT INTO wallets (id, user_id) VALUES ($1, $2) ON CONFLICT (user_id) DO NOTHING",
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .execute(&mut *self.tx)
        .await?;

        let row = sqlx::query_as::<_, WalletRow>(&format!(
            "SELECT {} FROM wallets WHERE user_id = $1 FOR UPDATE",
            WALLET_COLUMNS
        ))
        .bind(user_id)
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(row.into_domain())
    }

    async fn wallet_by_id_for_update(&mut self, wallet_id: Uuid) -> RepositoryResult<Option<Wallet>> {
        let row = sqlx::query_as::<_, WalletRow>(&format!(
            "SELECT {} FROM wallets WHERE id = $1 FOR UPDATE",
            WALLET_COLUMNS
        ))
        .bind(wallet_id)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(row.map(WalletRow::into_domain))
    }

    async fn save_wallet(&mut self, wallet: &Wallet) -> RepositoryResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE wallets
            SET balance = $2, total_deposited = $3, total_spent = $4, updated_at = $5
            WHERE id = $1
            "#,
        )
        .bind(wallet.id)
        .bind(&wallet.balance)
        .bind(&wallet.total_deposited)
        .bind(&wallet.total_spent)
        .bind(wallet.updated_at)
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(format!("wallet {}", wallet.id)));
        }
        Ok(())
    }

    async fn transaction_for_update(
        &mut self,
        id: Uuid,
    ) -> RepositoryResult<Option<WalletTransaction>> {
        let row = sqlx::query_as::<_, TransactionRow>(&format!(
            "SELECT {} FROM wallet_transactions WHERE id = $1 FOR UPDATE",
            TRANSACTION_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;

        row.map(TransactionRow::into_domain).transpose()
    }

    async fn insert_transaction(&mut self, tx: &WalletTransaction) -> RepositoryResult<()> {
        sqlx::query(
            r#"
            INSERT INTO wallet_transactions (
                id, wallet_id, transaction_type, amount, status, reference_id,
                bank_name, bank_account, transfer_code, note, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(tx.id)
        .bind(tx.wallet_id)
        .bind(tx.transaction_type.as_str())
        .bind(&tx.amount)
        .bind(tx.status.as_str())
        .bind(tx.reference_id)
        .bind(&tx.bank_name)
        .bind(&tx.bank_account)
        .bind(&tx.transfer_code)
        .bind(&tx.note)
        .bind(tx.created_at)
        .bind(tx.updated_at)
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    async fn save_transaction(&mut self, tx: &WalletTransaction) -> RepositoryResult<()> {
        let result = sqlx::query(
            "UPDATE wallet_transactions SET status = $2, note = $3, updated_at = $4 WHERE id = $1",
        )
        .bind(tx.id)
        .bind(tx.status.as_str())
        .bind(&tx.note)
        .bind(tx.updated_at)
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(format!("transaction {}", tx.id)));
        }
        Ok(())
    }

    async fn active_purchase(
        &mut self,
        user_id: Uuid,
        workflow_id: Uuid,
        excluding: Option<Uuid>,
    ) -> RepositoryResult<Option<Purchase>> {
        let row = sqlx::query_as::<_, PurchaseRow>(&format!(
            "SELECT {} FROM purchases \
             WHERE user_id = $1 AND workflow_id = $2 AND status = 'ACTIVE' \
             AND ($3::uuid IS NULL OR id <> $3) \
             LIMIT 1",
            PURCHASE_COLUMNS
        ))
        .bind(user_id)
        .bind(workflow_id)
        .bind(excluding)
        .fetch_optional(&mut *self.tx)
        .await?;

        row.map(PurchaseRow::into_domain).transpose()
    }

    async fn purchase_for_update(&mut self, id: Uuid) -> RepositoryResult<Option<Purchase>> {
        let row = sqlx::query_as::<_, PurchaseRow>(&format!(
            "SELECT {} FROM purchases WHERE id = $1 FOR UPDATE",
            PURCHASE_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await?;

        row.map(PurchaseRow::into_domain).transpose()
    }

    async fn insert_purchase(&mut self, purchase: &Purchase) -> RepositoryResult<()> {
        sqlx::query(
            r#"
            INSERT INTO purchases (
                id, user_id, workflow_id, amount, status, payment_method, paid_at,
                bank_account, bank_name, transfer_code, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(purchase.id)
        .bind(purchase.user_id)
        .bind(purchase.workflow_id)
        .bind(&purchase.amount)
        .bind(purchase.status.as_str())
        .bind(purchase.payment_method.as_str())
        .bind(purchase.paid_at)
        .bind(&purchase.bank_account)
        .bind(&purchase.bank_name)
        .bind(&purchase.transfer_code)
        .bind(purchase.created_at)
        .bind(purchase.updated_at)
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    async fn save_purchase(&mut self, purchase: &Purchase) -> RepositoryResult<()> {
        let result = sqlx::query(
            "UPDATE purchases SET status = $2, paid_at = $3, updated_at = $4 WHERE id = $1",
        )
        .bind(purchase.id)
        .bind(purchase.status.as_str())
        .bind(purchase.paid_at)
        .bind(purchase.updated_at)
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(format!("purchase {}", purchase.id)));
        }
        Ok(())
    }

    async fn invoice_for_purchase(&mut self, purchase_id: Uuid) -> RepositoryResult<Option<Invoice>> {
        let row = sqlx::query_as::<_, InvoiceRow>(&format!(
            "SELECT {} FROM invoices WHERE purchase_id = $1",
            INVOICE_COLUMNS
        ))
        .bind(purchase_id)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(row.map(InvoiceRow::into_domain))
    }

    async fn insert_invoice(&mut self, invoice: &Invoice) -> RepositoryResult<()> {
        sqlx::query(
            r#"
            INSERT INTO invoices (id, purchase_id, billing_name, billing_email, amount, issued_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(invoice.id)
        .bind(invoice.purchase_id)
        .bind(&invoice.billing_name)
        .bind(&invoice.billing_email)
        .bind(&invoice.amount)
        .bind(invoice.issued_at)
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    async fn commit(self: Box<Self>) -> RepositoryResult<()> {
        self.tx.commit().await?;
        Ok(())
    }
}

/// Internal row types for SQLx. Not exposed outside the adapter.
#[derive(Debug, sqlx::FromRow)]
struct WalletRow {
    id: Uuid,
    user_id: Uuid,
    balance: BigDecimal,
    total_deposited: BigDecimal,
    total_spent: BigDecimal,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl WalletRow {
    fn into_domain(self) -> Wallet {
        Wallet {
            id: self.id,
            user_id: self.user_id,
            balance: self.balance,
            total_deposited: self.total_deposited,
            total_spent: self.total_spent,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct TransactionRow {
    id: Uuid,
    wallet_id: Uuid,
    transaction_type: String,
    amount: BigDecimal,
    status: String,
    reference_id: Option<Uuid>,
    bank_name: Option<String>,
    bank_account: Option<String>,
    transfer_code: Option<String>,
    note: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TransactionRow {
    fn into_domain(self) -> RepositoryResult<WalletTransaction> {
        Ok(WalletTransaction {
            id: self.id,
            wallet_id: self.wallet_id,
            transaction_type: parse_stored(&self.transaction_type)?,
            amount: self.amount,
            status: parse_stored(&self.status)?,
            reference_id: self.reference_id,
            bank_name: self.bank_name,
            bank_account: self.bank_account,
            transfer_code: self.transfer_code,
            note: self.note,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct DepositRow {
    #[sqlx(flatten)]
    transaction: TransactionRow,
    user_id: Uuid,
    user_email: Option<String>,
}

#[derive(Debug, sqlx::FromRow)]
struct OverviewRow {
    total_count: i64,
    total_amount: BigDecimal,
    completed_count: i64,
    pending_count: i64,
    rejected_count: i64,
}

#[derive(Debug, sqlx::FromRow)]
struct PurchaseRow {
    id: Uuid,
    user_id: Uuid,
    workflow_id: Uuid,
    amount: BigDecimal,
    status: String,
    payment_method: String,
    paid_at: Option<DateTime<Utc>>,
    bank_account: Option<String>,
    bank_name: Option<String>,
    transfer_code: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl PurchaseRow {
    fn into_domain(self) -> RepositoryResult<Purchase> {
        Ok(Purchase {
            id: self.id,
            user_id: self.user_id,
            workflow_id: self.workflow_id,
            amount: self.amount,
            status: parse_stored(&self.status)?,
            payment_method: parse_stored(&self.payment_method)?,
            paid_at: self.paid_at,
            bank_account: self.bank_account,
            bank_name: self.bank_name,
            transfer_code: self.transfer_code,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct InvoiceRow {
    id: Uuid,
    purchase_id: Uuid,
    billing_name: String,
    billing_email: String,
    amount: BigDecimal,
    issued_at: DateTime<Utc>,
}

impl InvoiceRow {
    fn into_domain(self) -> Invoice {
        Invoice {
            id: self.id,
            purchase_id: self.purchase_id,
            billing_name: self.billing_name,
            billing_email: self.billing_email,
            amount: self.amount,
            issued_at: self.issued_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct PurchaseRecordRow {
    #[sqlx(flatten)]
    purchase: PurchaseRow,
    buyer_name: Option<String>,
    buyer_email: Option<String>,
    workflow_title: String,
    workflow_price: BigDecimal,
}

impl PurchaseRecordRow {
    fn into_domain(self) -> RepositoryResult<PurchaseRecord> {
        let purchase = self.purchase.into_domain()?;
        Ok(PurchaseRecord {
            user: PurchaseBuyer {
                id: purchase.user_id,
                name: self.buyer_name,
                email: self.buyer_email,
            },
            workflow: CatalogItem {
                id: purchase.workflow_id,
                title: self.workflow_title,
                price: self.workflow_price,
            },
            purchase,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct PurchaseOverviewRow {
    total_count: i64,
    completed_count: i64,
    pending_count: i64,
    total_revenue: BigDecimal,
}
