pub mod deposit;
pub mod notifier;
pub mod push;
pub mod settlement;
pub mod wallet;

pub use deposit::{DepositIntent, DepositResult, DepositService, ReconcileOutcome};
pub use notifier::{run_dispatcher, Audience, Dispatch, NoticeText, Notifier};
pub use push::{PushHub, PushMessage};
pub use settlement::{SettlementService, WalletPurchase};
pub use wallet::{LastBankInfo, WalletService};
