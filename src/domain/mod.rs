//! Domain entities.
//! Framework-agnostic ledger types and the rules that guard their mutation.

/// Implements `as_str`, `Display` and `FromStr` for enums persisted as
/// upper-case strings.
macro_rules! stored_enum {
    ($name:ident, $kind:literal, { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text,)+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = $crate::domain::ParseEnumError;

            fn from_str(value: &str) -> Result<Self, Self::Err> {
                match value.trim().to_ascii_uppercase().as_str() {
                    $($text => Ok($name::$variant),)+
                    _ => Err($crate::domain::ParseEnumError {
                        kind: $kind,
                        value: value.to_string(),
                    }),
                }
            }
        }
    };
}

pub(crate) use stored_enum;

pub mod account;
pub mod catalog;
pub mod notification;
pub mod purchase;
pub mod transaction;
pub mod wallet;

pub use account::{Account, Role};
pub use catalog::CatalogItem;
pub use notification::{Notification, Severity};
pub use purchase::{BankDetails, Invoice, PaymentMethod, Purchase, PurchaseStatus};
pub use transaction::{TransactionStatus, TransactionType, WalletTransaction};
pub use wallet::Wallet;

use bigdecimal::BigDecimal;
use thiserror::Error;

/// Rule violations raised by the ledger entities themselves.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum LedgerError {
    #[error("amount must be greater than zero")]
    InvalidAmount,

    #[error("insufficient balance: {available} available, {required} required")]
    InsufficientBalance {
        available: BigDecimal,
        required: BigDecimal,
    },

    #[error("illegal status transition from {from} to {to}")]
    IllegalTransition {
        from: &'static str,
        to: &'static str,
    },
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown {kind} value: {value}")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}
