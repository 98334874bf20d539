use std::sync::Arc;

use bigdecimal::{BigDecimal, Zero};
use serde::Serialize;
use uuid::Uuid;

use crate::domain::{
    Account, BankDetails, Invoice, Purchase, PurchaseStatus, Role, WalletTransaction,
};
use crate::error::AppError;
use crate::ports::{
    AccountDirectory, LedgerStore, ProductCatalog, PurchaseOverview, PurchaseRecord,
    RepositoryError,
};
use crate::validation::{
    optional_text, BANK_ACCOUNT_MAX_LEN, BANK_NAME_MAX_LEN, TRANSFER_CODE_MAX_LEN,
};

const ALREADY_OWNED: &str = "You have already purchased this workflow";

#[derive(Debug, Clone, Serialize)]
pub struct WalletPurchase {
    pub wallet_balance: BigDecimal,
    pub purchase: Purchase,
    pub invoice: Invoice,
}

/// Settles catalog purchases against wallet balance or records bank-transfer orders.
pub struct SettlementService {
    ledger: Arc<dyn LedgerStore>,
    catalog: Arc<dyn ProductCatalog>,
    accounts: Arc<dyn AccountDirectory>,
}

fn owned_on_conflict(err: RepositoryError) -> AppError {
    match err {
        RepositoryError::UniqueViolation(_) => AppError::AlreadyOwned(ALREADY_OWNED.to_string()),
        other => other.into(),
    }
}

impl SettlementService {
    pub fn new(
        ledger: Arc<dyn LedgerStore>,
        catalog: Arc<dyn ProductCatalog>,
        accounts: Arc<dyn AccountDirectory>,
    ) -> Self {
        Self {
            ledger,
            catalog,
            accounts,
        }
    }

    /// Debit, purchase, ledger row and invoice in one unit.
    ///
    /// The ownership and balance checks run while the wallet row is locked.
    pub async fn purchase_with_wallet(
        &self,
        buyer: &Account,
        item_id: Uuid,
    ) -> Result<WalletPurchase, AppError> {
        let item = self
            .catalog
            .get_item(item_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Workflow not found".to_string()))?;

        let mut unit = self.ledger.begin().await?;
        let mut wallet = unit.wallet_for_update(buyer.id).await?;

        if unit.active_purchase(buyer.id, item.id, None).await?.is_some() {
            return Err(AppError::AlreadyOwned(ALREADY_OWNED.to_string()));
        }

        let purchase = Purchase::paid_with_wallet(buyer.id, &item);
        let charge = item.price > BigDecimal::zero();
        if charge {
            wallet.debit(&item.price)?;
        }

        unit.insert_purchase(&purchase)
            .await
            .map_err(owned_on_conflict)?;
        if charge {
            unit.save_wallet(&wallet).await?;
            let ledger_row =
                WalletTransaction::purchase(wallet.id, item.price.clone(), purchase.id, &item.title);
            unit.insert_transaction(&ledger_row).await?;
        }
        let invoice = Invoice::issue(&purchase, buyer);
        unit.insert_invoice(&invoice).await?;
        unit.commit().await?;

        tracing::info!(
            user_id = %buyer.id,
            workflow_id = %item.id,
            purchase_id = %purchase.id,
            amount = %purchase.amount,
            balance = %wallet.balance,
            "Workflow purchased with wallet"
        );

        Ok(WalletPurchase {
            wallet_balance: wallet.balance,
            purchase,
            invoice,
        })
    }

    /// Records a PENDING order paid out of band; the wallet is not touched.
    pub async fn purchase_with_bank_transfer(
        &self,
        buyer: &Account,
        item_id: Uuid,
        details: BankDetails,
    ) -> Result<Purchase, AppError> {
        let details = BankDetails {
            bank_account: optional_text(
                "bank_account",
                details.bank_account.as_deref(),
                BANK_ACCOUNT_MAX_LEN,
            )?,
            bank_name: optional_text("bank_name", details.bank_name.as_deref(), BANK_NAME_MAX_LEN)?,
            transfer_code: optional_text(
                "transfer_code",
                details.transfer_code.as_deref(),
                TRANSFER_CODE_MAX_LEN,
            )?,
        };

        let item = self
            .catalog
            .get_item(item_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Workflow not found".to_string()))?;

        let mut unit = self.ledger.begin().await?;
        if unit.active_purchase(buyer.id, item.id, None).await?.is_some() {
            return Err(AppError::AlreadyOwned(ALREADY_OWNED.to_string()));
        }

        let purchase = Purchase::bank_transfer(buyer.id, &item, details);
        unit.insert_purchase(&purchase)
            .await
            .map_err(owned_on_conflict)?;
        unit.commit().await?;

        tracing::info!(
            user_id = %buyer.id,
            workflow_id = %item.id,
            purchase_id = %purchase.id,
            "Bank-transfer order created"
        );

        Ok(purchase)
    }

    /// Administrative status flip. Activation stamps `paid_at` and issues the
    /// invoice when missing.
    pub async fn update_status(
        &self,
        purchase_id: Uuid,
        status: PurchaseStatus,
    ) -> Result<Purchase, AppError> {
        let snapshot = self
            .ledger
            .find_purchase(purchase_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Purchase not found".to_string()))?;
        let buyer = self
            .accounts
            .get_user(snapshot.user_id)
            .await?
            .unwrap_or(Account {
                id: snapshot.user_id,
                email: None,
                name: None,
                role: Role::User,
            });

        let mut unit = self.ledger.begin().await?;
        let mut purchase = unit
            .purchase_for_update(purchase_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Purchase not found".to_string()))?;

        if status == PurchaseStatus::Active
            && unit
                .active_purchase(purchase.user_id, purchase.workflow_id, Some(purchase.id))
                .await?
                .is_some()
        {
            return Err(AppError::AlreadyOwned(
                "User already holds an active purchase of this workflow".to_string(),
            ));
        }

        let previous = purchase.status;
        purchase.set_status(status);
        unit.save_purchase(&purchase)
            .await
            .map_err(owned_on_conflict)?;

        if status == PurchaseStatus::Active
            && unit.invoice_for_purchase(purchase.id).await?.is_none()
        {
            unit.insert_invoice(&Invoice::issue(&purchase, &buyer)).await?;
        }
        unit.commit().await?;

        tracing::info!(
            %purchase_id,
            from = %previous,
            to = %status,
            "Purchase status updated"
        );

        Ok(purchase)
    }

    /// Admin listing; a blank search lists everything.
    pub async fn list_purchases(&self, search: Option<&str>) -> Result<Vec<PurchaseRecord>, AppError> {
        let search = search.map(str::trim).filter(|term| !term.is_empty());
        Ok(self.ledger.list_purchases(search).await?)
    }

    pub async fn purchase_detail(&self, purchase_id: Uuid) -> Result<PurchaseRecord, AppError> {
        self.ledger
            .purchase_record(purchase_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Purchase not found".to_string()))
    }

    pub async fn purchase_overview(&self) -> Result<PurchaseOverview, AppError> {
        Ok(self.ledger.purchase_overview().await?)
    }

    pub async fn purchases_for(&self, user_id: Uuid) -> Result<Vec<Purchase>, AppError> {
        Ok(self.ledger.list_purchases_for_user(user_id).await?)
    }

    /// Invoice of one of the user's ACTIVE purchases.
    pub async fn invoice_for(&self, user_id: Uuid, purchase_id: Uuid) -> Result<Invoice, AppError> {
        let purchase = self
            .ledger
            .find_purchase(purchase_id)
            .await?
            .filter(|p| p.user_id == user_id && p.status == PurchaseStatus::Active)
            .ok_or_else(|| AppError::NotFound("Order not found".to_string()))?;

        self.ledger
            .find_invoice(purchase.id)
            .await?
            .ok_or_else(|| AppError::NotFound("Invoice not found".to_string()))
    }
}
