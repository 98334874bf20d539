use std::sync::Arc;

use serde::Serialize;
use uuid::Uuid;

use crate::domain::{TransactionType, Wallet, WalletTransaction};
use crate::error::AppError;
use crate::ports::LedgerStore;

/// Bank details from the user's most recent deposit, used to pre-fill the
/// next deposit form.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LastBankInfo {
    pub bank_name: Option<String>,
    pub bank_account: Option<String>,
}

pub struct WalletService {
    ledger: Arc<dyn LedgerStore>,
}

impl WalletService {
    pub fn new(ledger: Arc<dyn LedgerStore>) -> Self {
        Self { ledger }
    }

    /// Returns the user's wallet, creating an empty one on first access.
    pub async fn get_or_create(&self, user_id: Uuid) -> Result<Wallet, AppError> {
        if let Some(wallet) = self.ledger.find_wallet(user_id).await? {
            return Ok(wallet);
        }

        let mut unit = self.ledger.begin().await?;
        let wallet = unit.wallet_for_update(user_id).await?;
        unit.commit().await?;

        tracing::info!(%user_id, wallet_id = %wallet.id, "Wallet created");
        Ok(wallet)
    }

    pub async fn transactions(&self, user_id: Uuid) -> Result<Vec<WalletTransaction>, AppError> {
        let wallet = self.get_or_create(user_id).await?;
        Ok(self.ledger.list_transactions(wallet.id).await?)
    }

    pub async fn last_bank_info(&self, user_id: Uuid) -> Result<Option<LastBankInfo>, AppError> {
        let Some(wallet) = self.ledger.find_wallet(user_id).await? else {
            return Ok(None);
        };

        let history = self.ledger.list_transactions(wallet.id).await?;
        Ok(history
            .into_iter()
            .find(|tx| {
                tx.transaction_type == TransactionType::Deposit
                    && (tx.bank_name.is_some() || tx.bank_account.is_some())
            })
            .map(|tx| LastBankInfo {
                bank_name: tx.bank_name,
                bank_account: tx.bank_account,
            }))
    }
}
