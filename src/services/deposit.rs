//! Deposit intents and their reconciliation against bank-transfer notices.

use std::cmp::Reverse;
use std::sync::Arc;

use bigdecimal::BigDecimal;
use rand::Rng;
use serde::Serialize;
use serde_json::json;
use tracing::{debug, info, warn};
use url::Url;
use uuid::Uuid;

use crate::config::DepositSettings;
use crate::domain::{Account, Severity, TransactionStatus, TransactionType, Wallet, WalletTransaction};
use crate::error::AppError;
use crate::ports::{AccountDirectory, DepositOverview, DepositRecord, LedgerStore, RepositoryError};
use crate::services::notifier::{Audience, Dispatch, NoticeText, Notifier};
use crate::validation::{optional_text, validate_money_amount, BANK_NAME_MAX_LEN};

const CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

type CodeGenerator = Arc<dyn Fn(usize) -> String + Send + Sync>;

/// Random reference code drawn from `A-Z0-9`.
pub fn generate_transfer_code(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| CODE_ALPHABET[rng.gen_range(0..CODE_ALPHABET.len())] as char)
        .collect()
}

#[derive(Debug, Clone, Serialize)]
pub struct DepositIntent {
    pub transfer_code: String,
    pub payment_qr_url: String,
    pub transaction_id: Uuid,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReconcileOutcome {
    /// No pending deposit matched the notice.
    Unmatched,
    /// The matched deposit was already terminal (duplicate delivery).
    AlreadySettled { transaction_id: Uuid },
    Credited {
        transaction_id: Uuid,
        user_id: Uuid,
        balance: BigDecimal,
    },
}

/// A deposit together with the wallet state after the operation.
#[derive(Debug, Clone, Serialize)]
pub struct DepositResult {
    pub transaction: WalletTransaction,
    pub wallet: Wallet,
}

enum Settlement {
    Credited(DepositResult),
    AlreadyTerminal(WalletTransaction),
}

pub struct DepositService {
    ledger: Arc<dyn LedgerStore>,
    accounts: Arc<dyn AccountDirectory>,
    notifier: Notifier,
    settings: DepositSettings,
    code_generator: CodeGenerator,
}

impl DepositService {
    pub fn new(
        ledger: Arc<dyn LedgerStore>,
        accounts: Arc<dyn AccountDirectory>,
        notifier: Notifier,
        settings: DepositSettings,
    ) -> Self {
        Self {
            ledger,
            accounts,
            notifier,
            settings,
            code_generator: Arc::new(generate_transfer_code),
        }
    }

    pub fn with_code_generator(
        mut self,
        generator: impl Fn(usize) -> String + Send + Sync + 'static,
    ) -> Self {
        self.code_generator = Arc::new(generator);
        self
    }

    /// Creates a PENDING deposit with a fresh reference code and tells the
    /// administrators about it.
    pub async fn init_deposit(
        &self,
        user: &Account,
        amount: BigDecimal,
        bank_name: Option<String>,
    ) -> Result<DepositIntent, AppError> {
        validate_money_amount(&amount).map_err(|e| AppError::InvalidAmount(e.message))?;
        let bank_name = optional_text("bank_name", bank_name.as_deref(), BANK_NAME_MAX_LEN)?;

        let attempts = self.settings.transfer_code_attempts;
        for attempt in 1..=attempts {
            let code = (self.code_generator)(self.settings.transfer_code_length);
            if self.ledger.transfer_code_exists(&code).await? {
                debug!(attempt, "Transfer code collision, regenerating");
                continue;
            }

            let payment_qr_url = self.payment_qr_url(&amount, &code)?;

            let mut unit = self.ledger.begin().await?;
            let wallet = unit.wallet_for_update(user.id).await?;
            let tx = WalletTransaction::pending_deposit(
                wallet.id,
                amount.clone(),
                bank_name.clone(),
                self.settings.receiving_bank_account.clone(),
                code.clone(),
            );
            match unit.insert_transaction(&tx).await {
                Ok(()) => {}
                Err(RepositoryError::UniqueViolation(_)) => {
                    debug!(attempt, "Transfer code taken concurrently, regenerating");
                    continue;
                }
                Err(e) => return Err(e.into()),
            }
            unit.commit().await?;

            info!(
                user_id = %user.id,
                transaction_id = %tx.id,
                amount = %tx.amount,
                transfer_code = %code,
                "Deposit initiated"
            );
            self.announce_request(user, &tx);

            return Ok(DepositIntent {
                transfer_code: code,
                payment_qr_url,
                transaction_id: tx.id,
            });
        }

        warn!(attempts, "Could not allocate a unique transfer code");
        Err(AppError::DuplicateReference(format!(
            "could not allocate a unique transfer code after {} attempts",
            attempts
        )))
    }

    /// Matches a bank-transfer notice to a pending deposit and credits it.
    ///
    /// When several pending deposits match, the longest code wins and ties go
    /// to the oldest deposit.
    pub async fn reconcile_from_notice(
        &self,
        amount: &BigDecimal,
        notice: &str,
    ) -> Result<ReconcileOutcome, AppError> {
        let candidates = self.ledger.pending_deposits_by_amount(amount).await?;
        let notice_lower = notice.to_lowercase();

        let matches: Vec<&WalletTransaction> = candidates
            .iter()
            .filter(|tx| match tx.transfer_code.as_deref() {
                Some(code) if !code.is_empty() => notice_lower.contains(&code.to_lowercase()),
                _ => false,
            })
            .collect();

        let Some(chosen) = matches
            .iter()
            .min_by_key(|tx| Reverse(tx.transfer_code.as_deref().map_or(0, str::len)))
        else {
            warn!(%amount, notice, "Unmatched bank notice");
            return Ok(ReconcileOutcome::Unmatched);
        };

        if matches.len() > 1 {
            warn!(
                candidates = matches.len(),
                chosen = %chosen.id,
                "Bank notice matched several pending deposits"
            );
        }

        match self.settle(chosen.id, "Verified via bank webhook").await? {
            Settlement::Credited(result) => {
                self.announce_credit(&result).await;
                Ok(ReconcileOutcome::Credited {
                    transaction_id: result.transaction.id,
                    user_id: result.wallet.user_id,
                    balance: result.wallet.balance,
                })
            }
            Settlement::AlreadyTerminal(tx) => {
                info!(transaction_id = %tx.id, "Duplicate bank notice ignored");
                Ok(ReconcileOutcome::AlreadySettled {
                    transaction_id: tx.id,
                })
            }
        }
    }

    /// Manual confirmation of one deposit by an administrator.
    pub async fn admin_activate(&self, transaction_id: Uuid) -> Result<DepositResult, AppError> {
        match self.settle(transaction_id, "Activated by admin").await? {
            Settlement::Credited(result) => {
                self.announce_credit(&result).await;
                Ok(result)
            }
            Settlement::AlreadyTerminal(tx) => Err(AppError::Conflict(format!(
                "Deposit {} already processed ({})",
                tx.id, tx.status
            ))),
        }
    }

    pub async fn reject(&self, transaction_id: Uuid) -> Result<DepositResult, AppError> {
        let snapshot = self.find_deposit(transaction_id).await?;

        let mut unit = self.ledger.begin().await?;
        let wallet = unit
            .wallet_by_id_for_update(snapshot.wallet_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Wallet {} not found", snapshot.wallet_id)))?;
        let mut tx = unit
            .transaction_for_update(transaction_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Deposit transaction not found".to_string()))?;

        if tx.status != TransactionStatus::Pending {
            return Err(AppError::Conflict(
                "Only pending deposits can be rejected".to_string(),
            ));
        }
        tx.transition(TransactionStatus::Failed)?;
        tx.append_note("Rejected by admin");
        unit.save_transaction(&tx).await?;
        unit.commit().await?;

        info!(transaction_id = %tx.id, user_id = %wallet.user_id, "Deposit rejected");

        self.notifier.send(Dispatch {
            audience: Audience::User(wallet.user_id),
            notice: Some(NoticeText::new(
                "Deposit rejected",
                format!(
                    "Your deposit of {} VND (code {}) was rejected",
                    tx.amount.with_scale(0),
                    tx.transfer_code.as_deref().unwrap_or("-")
                ),
                Severity::Error,
            )),
            payload: json!({
                "type": "wallet_status_update",
                "event": "deposit_rejected",
                "transaction": &tx,
                "wallet": {
                    "balance": &wallet.balance,
                    "total_deposited": &wallet.total_deposited,
                },
                "message": "Deposit transaction has been rejected",
                "timestamp": tx.updated_at,
            }),
        });

        Ok(DepositResult {
            transaction: tx,
            wallet,
        })
    }

    pub async fn list_deposits(&self) -> Result<Vec<DepositRecord>, AppError> {
        Ok(self.ledger.list_deposits().await?)
    }

    pub async fn overview(&self) -> Result<DepositOverview, AppError> {
        Ok(self.ledger.deposit_overview().await?)
    }

    async fn find_deposit(&self, transaction_id: Uuid) -> Result<WalletTransaction, AppError> {
        self.ledger
            .find_transaction(transaction_id)
            .await?
            .filter(|tx| tx.transaction_type == TransactionType::Deposit)
            .ok_or_else(|| AppError::NotFound("Deposit transaction not found".to_string()))
    }

    /// PENDING -> SUCCESS plus the matching credit, under the wallet lock.
    async fn settle(&self, transaction_id: Uuid, note: &str) -> Result<Settlement, AppError> {
        let snapshot = self.find_deposit(transaction_id).await?;

        let mut unit = self.ledger.begin().await?;
        let mut wallet = unit
            .wallet_by_id_for_update(snapshot.wallet_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Wallet {} not found", snapshot.wallet_id)))?;
        let mut tx = unit
            .transaction_for_update(transaction_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Deposit transaction not found".to_string()))?;

        if tx.status.is_terminal() {
            return Ok(Settlement::AlreadyTerminal(tx));
        }

        tx.transition(TransactionStatus::Success)?;
        wallet.credit(&tx.amount)?;
        tx.append_note(note);
        unit.save_wallet(&wallet).await?;
        unit.save_transaction(&tx).await?;
        unit.commit().await?;

        info!(
            transaction_id = %tx.id,
            user_id = %wallet.user_id,
            amount = %tx.amount,
            balance = %wallet.balance,
            "Deposit credited"
        );

        Ok(Settlement::Credited(DepositResult {
            transaction: tx,
            wallet,
        }))
    }

    fn payment_qr_url(&self, amount: &BigDecimal, code: &str) -> Result<String, AppError> {
        let whole_amount = amount.with_scale(0).to_string();
        let url = Url::parse_with_params(
            &self.settings.qr_base_url,
            &[
                ("acc", self.settings.qr_account.as_str()),
                ("bank", self.settings.receiving_bank_name.as_str()),
                ("amount", whole_amount.as_str()),
                ("des", code),
            ],
        )
        .map_err(|e| AppError::Internal(format!("Invalid payment QR base URL: {}", e)))?;

        Ok(url.into())
    }

    fn announce_request(&self, user: &Account, tx: &WalletTransaction) {
        let requester = user.email.as_deref().unwrap_or_else(|| user.display_name());
        self.notifier.send(Dispatch {
            audience: Audience::Admins,
            notice: Some(NoticeText::new(
                "New deposit request",
                format!(
                    "User {} requested a deposit of {} VND (code {})",
                    requester,
                    tx.amount.with_scale(0),
                    tx.transfer_code.as_deref().unwrap_or("-")
                ),
                Severity::Warning,
            )),
            payload: json!({
                "type": "new_deposit_request",
                "event": "deposit_created",
                "transaction": tx,
                "user": {
                    "id": user.id,
                    "name": &user.name,
                    "email": &user.email,
                },
                "message": format!("User {} submitted a new deposit request", user.display_name()),
                "timestamp": tx.created_at,
            }),
        });
    }

    async fn announce_credit(&self, result: &DepositResult) {
        let DepositResult { transaction, wallet } = result;

        self.notifier.send(Dispatch {
            audience: Audience::User(wallet.user_id),
            notice: Some(NoticeText::new(
                "Deposit successful",
                format!(
                    "{} VND has been added to your wallet",
                    transaction.amount.with_scale(0)
                ),
                Severity::Success,
            )),
            payload: json!({
                "type": "wallet_update",
                "event": "deposit_success",
                "transaction_id": transaction.id,
                "amount": &transaction.amount,
                "balance": &wallet.balance,
            }),
        });

        let user_email = match self.accounts.get_user(wallet.user_id).await {
            Ok(account) => account.and_then(|a| a.email),
            Err(e) => {
                warn!(user_id = %wallet.user_id, "Could not load depositor for admin notice: {}", e);
                None
            }
        };
        self.notifier.send(Dispatch {
            audience: Audience::Admins,
            notice: None,
            payload: json!({
                "type": "wallet_update",
                "event": "deposit_verified",
                "transaction_id": transaction.id,
                "user_email": user_email,
                "amount": &transaction.amount,
            }),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::{FaultPoint, MemoryStore};
    use crate::domain::Role;
    use crate::ports::LedgerStore;
    use bigdecimal::Zero;
    use std::collections::VecDeque;
    use std::str::FromStr;
    use std::sync::Mutex;
    use tokio::sync::mpsc::UnboundedReceiver;

    fn dec(value: &str) -> BigDecimal {
        BigDecimal::from_str(value).unwrap()
    }

    struct Harness {
        store: Arc<MemoryStore>,
        service: DepositService,
        dispatches: UnboundedReceiver<Dispatch>,
        user: Account,
    }

    fn harness() -> Harness {
        let store = Arc::new(MemoryStore::new());
        let user = store.add_account(Role::User, "buyer@example.com");
        store.add_account(Role::Admin, "admin@example.com");
        let (notifier, dispatches) = Notifier::channel();
        let service = DepositService::new(
            store.clone(),
            store.clone(),
            notifier,
            DepositSettings::default(),
        );
        Harness {
            store,
            service,
            dispatches,
            user,
        }
    }

    fn scripted_codes(codes: &[&str]) -> impl Fn(usize) -> String + Send + Sync + 'static {
        let queue: Mutex<VecDeque<String>> =
            Mutex::new(codes.iter().map(|c| c.to_string()).collect());
        move |_| queue.lock().unwrap().pop_front().unwrap_or_else(|| "EXHAUSTD".to_string())
    }

    async fn balance(store: &MemoryStore, user_id: Uuid) -> BigDecimal {
        store
            .find_wallet(user_id)
            .await
            .unwrap()
            .map(|w| w.balance)
            .unwrap_or_else(BigDecimal::zero)
    }

    fn drain(rx: &mut UnboundedReceiver<Dispatch>) -> Vec<Dispatch> {
        let mut out = Vec::new();
        while let Ok(dispatch) = rx.try_recv() {
            out.push(dispatch);
        }
        out
    }

    #[test]
    fn test_generated_code_shape() {
        let code = generate_transfer_code(8);
        assert_eq!(code.len(), 8);
        assert!(code
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
    }

    #[tokio::test]
    async fn test_init_deposit_creates_pending_transaction() {
        let mut h = harness();

        let intent = h
            .service
            .init_deposit(&h.user, dec("100000"), Some("MBBank".to_string()))
            .await
            .unwrap();

        assert_eq!(intent.transfer_code.len(), 8);
        assert!(intent.payment_qr_url.starts_with("https://qr.sepay.vn/img?"));
        assert!(intent.payment_qr_url.contains("acc=VQRQAFCDS7295"));
        assert!(intent.payment_qr_url.contains("amount=100000"));
        assert!(intent
            .payment_qr_url
            .contains(&format!("des={}", intent.transfer_code)));

        let tx = h
            .store
            .find_transaction(intent.transaction_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(tx.status, TransactionStatus::Pending);
        assert_eq!(tx.bank_name.as_deref(), Some("MBBank"));
        assert_eq!(tx.bank_account.as_deref(), Some("0903536212"));
        assert_eq!(balance(&h.store, h.user.id).await, BigDecimal::zero());

        let dispatches = drain(&mut h.dispatches);
        assert_eq!(dispatches.len(), 1);
        assert_eq!(dispatches[0].audience, Audience::Admins);
        assert_eq!(dispatches[0].payload["type"], "new_deposit_request");
        assert_eq!(
            dispatches[0].notice.as_ref().unwrap().severity,
            Severity::Warning
        );
    }

    #[tokio::test]
    async fn test_qr_amount_is_integer_part() {
        let h = harness();
        let intent = h
            .service
            .init_deposit(&h.user, dec("1500.75"), None)
            .await
            .unwrap();
        assert!(intent.payment_qr_url.contains("amount=1500&"));
    }

    #[tokio::test]
    async fn test_init_deposit_rejects_bad_amounts() {
        let h = harness();
        for bad in ["0", "-10", "10.001", "1000000000000"] {
            let err = h
                .service
                .init_deposit(&h.user, dec(bad), None)
                .await
                .unwrap_err();
            assert!(matches!(err, AppError::InvalidAmount(_)), "{} accepted", bad);
        }
    }

    #[tokio::test]
    async fn test_two_inits_get_distinct_codes() {
        let h = harness();
        let first = h.service.init_deposit(&h.user, dec("50000"), None).await.unwrap();
        let second = h.service.init_deposit(&h.user, dec("50000"), None).await.unwrap();

        assert_ne!(first.transfer_code, second.transfer_code);
        assert_ne!(first.transaction_id, second.transaction_id);
    }

    #[tokio::test]
    async fn test_code_collision_regenerates() {
        let h = harness();
        let service = h
            .service
            .with_code_generator(scripted_codes(&["AAAA1111", "AAAA1111", "BBBB2222"]));

        let first = service.init_deposit(&h.user, dec("10000"), None).await.unwrap();
        let second = service.init_deposit(&h.user, dec("10000"), None).await.unwrap();

        assert_eq!(first.transfer_code, "AAAA1111");
        assert_eq!(second.transfer_code, "BBBB2222");
    }

    #[tokio::test]
    async fn test_code_collision_exhaustion_is_duplicate_reference() {
        let h = harness();
        let service = h.service.with_code_generator(|_| "SAMECODE".to_string());

        service.init_deposit(&h.user, dec("10000"), None).await.unwrap();
        let err = service
            .init_deposit(&h.user, dec("10000"), None)
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::DuplicateReference(_)));
        let deposits = service.list_deposits().await.unwrap();
        assert_eq!(deposits.len(), 1);
    }

    #[tokio::test]
    async fn test_admin_activate_credits_once() {
        let mut h = harness();
        let intent = h
            .service
            .init_deposit(&h.user, dec("100000"), None)
            .await
            .unwrap();
        drain(&mut h.dispatches);

        let result = h.service.admin_activate(intent.transaction_id).await.unwrap();
        assert_eq!(result.wallet.balance, dec("100000"));
        assert_eq!(result.transaction.status, TransactionStatus::Success);

        let err = h
            .service
            .admin_activate(intent.transaction_id)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
        assert_eq!(balance(&h.store, h.user.id).await, dec("100000"));

        let dispatches = drain(&mut h.dispatches);
        assert_eq!(dispatches.len(), 2);
        assert_eq!(dispatches[0].audience, Audience::User(h.user.id));
        assert_eq!(dispatches[0].payload["event"], "deposit_success");
        assert_eq!(dispatches[1].audience, Audience::Admins);
        assert_eq!(dispatches[1].payload["event"], "deposit_verified");
        assert_eq!(dispatches[1].payload["user_email"], "buyer@example.com");
    }

    #[tokio::test]
    async fn test_admin_activate_unknown_transaction() {
        let h = harness();
        let err = h.service.admin_activate(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_webhook_credit_and_duplicate_delivery() {
        let h = harness();
        let service = h.service.with_code_generator(|_| "CODEAB12".to_string());
        let intent = service.init_deposit(&h.user, dec("100000"), None).await.unwrap();

        let outcome = service
            .reconcile_from_notice(&dec("100000"), "MBVCB.123 CODEAB12 chuyen tien")
            .await
            .unwrap();
        assert_eq!(
            outcome,
            ReconcileOutcome::Credited {
                transaction_id: intent.transaction_id,
                user_id: h.user.id,
                balance: dec("100000"),
            }
        );

        let again = service
            .reconcile_from_notice(&dec("100000"), "MBVCB.123 CODEAB12 chuyen tien")
            .await
            .unwrap();
        assert_eq!(again, ReconcileOutcome::Unmatched);
        assert_eq!(balance(&h.store, h.user.id).await, dec("100000"));

        let tx = h
            .store
            .find_transaction(intent.transaction_id)
            .await
            .unwrap()
            .unwrap();
        assert!(tx.note.unwrap().ends_with("Verified via bank webhook"));
    }

    #[tokio::test]
    async fn test_webhook_match_is_case_insensitive() {
        let h = harness();
        let service = h.service.with_code_generator(|_| "CODEAB12".to_string());
        service.init_deposit(&h.user, dec("25000"), None).await.unwrap();

        let outcome = service
            .reconcile_from_notice(&dec("25000"), "payment codeab12")
            .await
            .unwrap();
        assert!(matches!(outcome, ReconcileOutcome::Credited { .. }));
    }

    #[tokio::test]
    async fn test_webhook_amount_mismatch_is_unmatched() {
        let h = harness();
        let service = h.service.with_code_generator(|_| "CODEAB12".to_string());
        service.init_deposit(&h.user, dec("100000"), None).await.unwrap();

        let outcome = service
            .reconcile_from_notice(&dec("99999"), "CODEAB12")
            .await
            .unwrap();
        assert_eq!(outcome, ReconcileOutcome::Unmatched);
        assert_eq!(balance(&h.store, h.user.id).await, BigDecimal::zero());
    }

    #[tokio::test]
    async fn test_webhook_longest_code_wins() {
        let h = harness();
        let other = h.store.add_account(Role::User, "other@example.com");
        let service = h
            .service
            .with_code_generator(scripted_codes(&["AB12", "XAB12Y"]));
        service.init_deposit(&h.user, dec("5000"), None).await.unwrap();
        let longer = service.init_deposit(&other, dec("5000"), None).await.unwrap();

        let outcome = service
            .reconcile_from_notice(&dec("5000"), "transfer XAB12Y")
            .await
            .unwrap();

        match outcome {
            ReconcileOutcome::Credited {
                transaction_id,
                user_id,
                ..
            } => {
                assert_eq!(transaction_id, longer.transaction_id);
                assert_eq!(user_id, other.id);
            }
            other => panic!("unexpected outcome {:?}", other),
        }
        assert_eq!(balance(&h.store, h.user.id).await, BigDecimal::zero());
    }

    #[tokio::test]
    async fn test_settlement_reports_already_settled_for_terminal_match() {
        let h = harness();
        let intent = h.service.init_deposit(&h.user, dec("7000"), None).await.unwrap();
        h.service.admin_activate(intent.transaction_id).await.unwrap();

        match h.service.settle(intent.transaction_id, "again").await.unwrap() {
            Settlement::AlreadyTerminal(tx) => assert_eq!(tx.status, TransactionStatus::Success),
            Settlement::Credited(_) => panic!("credited twice"),
        }
    }

    #[tokio::test]
    async fn test_fault_during_credit_rolls_back() {
        let h = harness();
        let intent = h.service.init_deposit(&h.user, dec("30000"), None).await.unwrap();

        h.store.fail_next(FaultPoint::Commit);
        assert!(h.service.admin_activate(intent.transaction_id).await.is_err());

        let tx = h
            .store
            .find_transaction(intent.transaction_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(tx.status, TransactionStatus::Pending);
        assert_eq!(balance(&h.store, h.user.id).await, BigDecimal::zero());

        h.service.admin_activate(intent.transaction_id).await.unwrap();
        assert_eq!(balance(&h.store, h.user.id).await, dec("30000"));
    }

    #[tokio::test]
    async fn test_reject_pending_deposit() {
        let mut h = harness();
        let intent = h.service.init_deposit(&h.user, dec("20000"), None).await.unwrap();
        drain(&mut h.dispatches);

        let result = h.service.reject(intent.transaction_id).await.unwrap();
        assert_eq!(result.transaction.status, TransactionStatus::Failed);
        assert_eq!(result.wallet.balance, BigDecimal::zero());

        let dispatches = drain(&mut h.dispatches);
        assert_eq!(dispatches.len(), 1);
        assert_eq!(dispatches[0].payload["event"], "deposit_rejected");
        assert_eq!(dispatches[0].notice.as_ref().unwrap().severity, Severity::Error);

        let err = h.service.reject(intent.transaction_id).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));

        let err = h.service.admin_activate(intent.transaction_id).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
        assert_eq!(balance(&h.store, h.user.id).await, BigDecimal::zero());
    }

    #[tokio::test]
    async fn test_reject_unknown_deposit_is_not_found() {
        let h = harness();
        let err = h.service.reject(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_overview_counts() {
        let h = harness();
        let a = h.service.init_deposit(&h.user, dec("1000"), None).await.unwrap();
        let b = h.service.init_deposit(&h.user, dec("2000"), None).await.unwrap();
        h.service.init_deposit(&h.user, dec("3000"), None).await.unwrap();
        h.service.admin_activate(a.transaction_id).await.unwrap();
        h.service.reject(b.transaction_id).await.unwrap();

        let overview = h.service.overview().await.unwrap();
        assert_eq!(overview.total_count, 3);
        assert_eq!(overview.total_amount, dec("6000"));
        assert_eq!(overview.completed_count, 1);
        assert_eq!(overview.pending_count, 1);
        assert_eq!(overview.rejected_count, 1);

        let listing = h.service.list_deposits().await.unwrap();
        assert_eq!(listing.len(), 3);
        assert!(listing
            .iter()
            .all(|r| r.user_email.as_deref() == Some("buyer@example.com")));
    }

    #[tokio::test]
    async fn test_notice_racing_admin_activation_credits_once() {
        let h = harness();
        let intent = h
            .service
            .init_deposit(&h.user, dec("100000"), None)
            .await
            .unwrap();
        let notice = format!("NAP {}", intent.transfer_code);
        let amount = dec("100000");

        let (from_notice, from_admin) = tokio::join!(
            h.service.reconcile_from_notice(&amount, &notice),
            h.service.admin_activate(intent.transaction_id),
        );

        let credited_by_notice = matches!(from_notice, Ok(ReconcileOutcome::Credited { .. }));
        assert!(credited_by_notice != from_admin.is_ok());
        let wallet = h.store.find_wallet(h.user.id).await.unwrap().unwrap();
        assert_eq!(wallet.balance, dec("100000"));
        assert_eq!(wallet.total_deposited, dec("100000"));
    }

    #[tokio::test]
    async fn test_reject_racing_activation_ends_in_one_terminal_state() {
        let h = harness();
        let intent = h
            .service
            .init_deposit(&h.user, dec("40000"), None)
            .await
            .unwrap();

        let (rejected, activated) = tokio::join!(
            h.service.reject(intent.transaction_id),
            h.service.admin_activate(intent.transaction_id),
        );

        assert!(rejected.is_ok() != activated.is_ok());
        let tx = h
            .store
            .find_transaction(intent.transaction_id)
            .await
            .unwrap()
            .unwrap();
        let wallet = h.store.find_wallet(h.user.id).await.unwrap().unwrap();
        if activated.is_ok() {
            assert_eq!(tx.status, TransactionStatus::Success);
            assert_eq!(wallet.total_deposited, dec("40000"));
        } else {
            assert_eq!(tx.status, TransactionStatus::Failed);
            assert_eq!(wallet.total_deposited, BigDecimal::zero());
        }
    }
}
