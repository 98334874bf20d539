use bigdecimal::{BigDecimal, Zero};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

pub const BANK_NAME_MAX_LEN: usize = 100;
pub const BANK_ACCOUNT_MAX_LEN: usize = 50;
pub const TRANSFER_CODE_MAX_LEN: usize = 60;
pub const AMOUNT_INPUT_MAX_LEN: usize = 64;
/// Amounts are stored as NUMERIC(14, 2).
pub const AMOUNT_MAX_SCALE: i64 = 2;
const AMOUNT_INTEGER_DIGITS: u32 = 12;
/// Widest fractional scale accepted from input before any arithmetic.
const AMOUNT_INPUT_MAX_SCALE: i64 = 16;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

pub type ValidationResult = Result<(), ValidationError>;

pub fn sanitize_string(value: &str) -> String {
    value
        .chars()
        .filter(|ch| !ch.is_control())
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn validate_max_len(field: &'static str, value: &str, max_len: usize) -> ValidationResult {
    if value.len() > max_len {
        return Err(ValidationError::new(
            field,
            format!("must be at most {} characters", max_len),
        ));
    }

    Ok(())
}

/// Positive, at most two fractional digits, and representable as NUMERIC(14, 2).
pub fn validate_money_amount(amount: &BigDecimal) -> ValidationResult {
    if amount <= &BigDecimal::zero() {
        return Err(ValidationError::new("amount", "must be greater than zero"));
    }

    if amount.with_scale(AMOUNT_MAX_SCALE) != *amount {
        return Err(ValidationError::new(
            "amount",
            "must have at most 2 decimal places",
        ));
    }

    let limit = BigDecimal::from(10u64.pow(AMOUNT_INTEGER_DIGITS));
    if amount >= &limit {
        return Err(ValidationError::new(
            "amount",
            format!("must be less than {}", limit),
        ));
    }

    Ok(())
}

/// Cleans and bounds an optional free-text field; blank input becomes `None`.
pub fn optional_text(
    field: &'static str,
    value: Option<&str>,
    max_len: usize,
) -> Result<Option<String>, ValidationError> {
    let Some(value) = value.map(sanitize_string).filter(|v| !v.is_empty()) else {
        return Ok(None);
    };
    validate_max_len(field, &value, max_len)?;
    Ok(Some(value))
}

/// Reads a money amount sent either as a JSON number or as a numeric string.
///
/// Exponent notation is accepted only while the decimal exponent stays
/// within NUMERIC range, so no later comparison has to expand a huge scale.
pub fn amount_from_json(value: &Value) -> Option<BigDecimal> {
    let raw = match value {
        Value::Number(number) => number.to_string(),
        Value::String(text) => {
            let text = text.trim();
            if text.is_empty() || text.len() > AMOUNT_INPUT_MAX_LEN {
                return None;
            }
            text.to_string()
        }
        _ => return None,
    };

    let amount = BigDecimal::from_str(&raw).ok()?;
    let (_, scale) = amount.as_bigint_and_exponent();
    if !(-(AMOUNT_INTEGER_DIGITS as i64)..=AMOUNT_INPUT_MAX_SCALE).contains(&scale) {
        return None;
    }

    Some(if scale < 0 { amount.with_scale(0) } else { amount })
}
