use anyhow::{Context, Result};
use dotenvy::dotenv;
use std::env;

const DEFAULT_QR_BASE_URL: &str = "https://qr.sepay.vn/img";

#[derive(Debug, Clone)]
pub struct Config {
    pub server_port: u16,
    pub database_url: String,
    pub database_max_connections: u32,
    pub jwt_secret: String,
    pub bank_webhook_api_key: Option<String>,
    pub cors_allowed_origins: Option<Vec<String>>,
    pub log_format: LogFormat,
    pub deposit: DepositSettings,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

/// Receiving account, QR template and reference-code policy for deposits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepositSettings {
    pub receiving_bank_account: String,
    pub receiving_bank_name: String,
    pub qr_base_url: String,
    pub qr_account: String,
    pub transfer_code_length: usize,
    pub transfer_code_attempts: u32,
}

impl Default for DepositSettings {
    fn default() -> Self {
        Self {
            receiving_bank_account: "0903536212".to_string(),
            receiving_bank_name: "MBBank".to_string(),
            qr_base_url: DEFAULT_QR_BASE_URL.to_string(),
            qr_account: "VQRQAFCDS7295".to_string(),
            transfer_code_length: 8,
            transfer_code_attempts: 5,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok(); // Load .env file if present

        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        let defaults = DepositSettings::default();

        let deposit = DepositSettings {
            receiving_bank_account: get("RECEIVING_BANK_ACCOUNT")
                .unwrap_or(defaults.receiving_bank_account),
            receiving_bank_name: get("RECEIVING_BANK_NAME").unwrap_or(defaults.receiving_bank_name),
            qr_base_url: get("PAYMENT_QR_BASE_URL").unwrap_or(defaults.qr_base_url),
            qr_account: get("PAYMENT_QR_ACCOUNT").unwrap_or(defaults.qr_account),
            transfer_code_length: get("TRANSFER_CODE_LENGTH")
                .map(|v| v.parse())
                .transpose()
                .context("TRANSFER_CODE_LENGTH must be a positive integer")?
                .unwrap_or(defaults.transfer_code_length),
            transfer_code_attempts: get("TRANSFER_CODE_ATTEMPTS")
                .map(|v| v.parse())
                .transpose()
                .context("TRANSFER_CODE_ATTEMPTS must be a positive integer")?
                .unwrap_or(defaults.transfer_code_attempts),
        };

        let config = Config {
            server_port: get("SERVER_PORT")
                .unwrap_or_else(|| "3000".to_string())
                .parse()
                .context("SERVER_PORT must be a valid port number")?,
            database_url: get("DATABASE_URL").context("DATABASE_URL must be set")?,
            database_max_connections: get("DATABASE_MAX_CONNECTIONS")
                .unwrap_or_else(|| "5".to_string())
                .parse()
                .context("DATABASE_MAX_CONNECTIONS must be a positive integer")?,
            jwt_secret: get("JWT_SECRET").context("JWT_SECRET must be set")?,
            bank_webhook_api_key: get("BANK_WEBHOOK_API_KEY"),
            cors_allowed_origins: get("CORS_ALLOWED_ORIGINS").map(|raw| parse_origins(&raw)),
            log_format: match get("LOG_FORMAT").as_deref().map(str::to_ascii_lowercase) {
                None => LogFormat::Text,
                Some(format) if format == "text" => LogFormat::Text,
                Some(format) if format == "json" => LogFormat::Json,
                Some(other) => anyhow::bail!("LOG_FORMAT must be 'text' or 'json', got '{}'", other),
            },
            deposit,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.server_port == 0 {
            anyhow::bail!("SERVER_PORT must be greater than 0");
        }
        if self.database_max_connections == 0 {
            anyhow::bail!("DATABASE_MAX_CONNECTIONS must be greater than 0");
        }
        if !(4..=32).contains(&self.deposit.transfer_code_length) {
            anyhow::bail!("TRANSFER_CODE_LENGTH must be between 4 and 32");
        }
        if self.deposit.transfer_code_attempts == 0 {
            anyhow::bail!("TRANSFER_CODE_ATTEMPTS must be at least 1");
        }
        url::Url::parse(&self.deposit.qr_base_url)
            .context("PAYMENT_QR_BASE_URL is not a valid URL")?;

        Ok(())
    }
}

fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|origin| !origin.is_empty())
        .map(str::to_string)
        .collect()
}
