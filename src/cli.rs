use clap::{Parser, Subcommand};
use sqlx::PgPool;
use uuid::Uuid;

use flowmart_core::config::Config;
use flowmart_core::middleware::AuthKeys;
use flowmart_core::ports::AccountDirectory;
use flowmart_core::services::{run_dispatcher, DepositService, Notifier, PushHub};
use flowmart_core::{db, startup, Ports};

#[derive(Parser)]
#[command(name = "flowmart")]
#[command(about = "Flowmart - workflow marketplace wallet and deposit backend", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP server (default)
    Serve,

    /// Database management commands
    #[command(subcommand)]
    Db(DbCommands),

    /// Print the effective configuration and check the environment
    Config,

    /// Manual deposit operations
    #[command(subcommand)]
    Deposit(DepositCommands),

    /// Access token utilities
    #[command(subcommand)]
    Token(TokenCommands),
}

#[derive(Subcommand)]
pub enum DbCommands {
    /// Run database migrations
    Migrate,
}

#[derive(Subcommand)]
pub enum DepositCommands {
    /// Credit a pending deposit as if the bank had confirmed it
    Activate {
        #[arg(value_name = "TX_ID")]
        tx_id: Uuid,
    },
    /// Mark a pending deposit as failed
    Reject {
        #[arg(value_name = "TX_ID")]
        tx_id: Uuid,
    },
}

#[derive(Subcommand)]
pub enum TokenCommands {
    /// Mint a bearer token for an existing account
    Issue {
        #[arg(value_name = "USER_ID")]
        user_id: Uuid,
    },
}

pub async fn handle_db_migrate(config: &Config) -> anyhow::Result<()> {
    let pool = db::create_pool(config).await?;

    tracing::info!("Running database migrations...");
    db::run_migrations(&pool).await?;
    println!("✓ Database migrations completed");

    Ok(())
}

pub async fn handle_config_validate(config: &Config) -> anyhow::Result<()> {
    tracing::info!("Validating configuration...");

    println!("Configuration:");
    println!("  Server Port: {}", config.server_port);
    println!("  Database URL: {}", mask_password(&config.database_url));
    println!("  Max DB Connections: {}", config.database_max_connections);
    println!(
        "  Webhook API Key: {}",
        if config.bank_webhook_api_key.is_some() { "set" } else { "not set" }
    );
    println!(
        "  Receiving Account: {} ({})",
        config.deposit.receiving_bank_account, config.deposit.receiving_bank_name
    );
    println!("  Payment QR Base URL: {}", config.deposit.qr_base_url);
    println!(
        "  Transfer Code: {} chars, {} attempts",
        config.deposit.transfer_code_length, config.deposit.transfer_code_attempts
    );

    let pool = db::create_pool(config).await?;
    let report = startup::validate_environment(config, &pool).await;
    report.print();

    if !report.is_valid() {
        anyhow::bail!("Configuration validation failed");
    }

    tracing::info!("Configuration is valid");
    Ok(())
}

/// Runs one deposit operation and waits for its notifications to be delivered.
async fn with_deposit_service<F, Fut>(pool: PgPool, config: &Config, op: F) -> anyhow::Result<()>
where
    F: FnOnce(DepositService) -> Fut,
    Fut: std::future::Future<Output = anyhow::Result<()>>,
{
    let ports = Ports::postgres(pool);
    let (notifier, receiver) = Notifier::channel();
    let dispatcher = tokio::spawn(run_dispatcher(
        receiver,
        ports.accounts.clone(),
        ports.notifications.clone(),
        PushHub::new(),
    ));

    let service = DepositService::new(
        ports.ledger.clone(),
        ports.accounts.clone(),
        notifier,
        config.deposit.clone(),
    );
    let result = op(service).await;

    dispatcher.await?;
    result
}

pub async fn handle_deposit_activate(config: &Config, tx_id: Uuid) -> anyhow::Result<()> {
    let pool = db::create_pool(config).await?;
    with_deposit_service(pool, config, |service| async move {
        let result = service.admin_activate(tx_id).await?;
        tracing::info!(%tx_id, "Deposit activated from CLI");
        println!(
            "✓ Deposit {} credited, wallet balance now {}",
            tx_id, result.wallet.balance
        );
        Ok(())
    })
    .await
}

pub async fn handle_deposit_reject(config: &Config, tx_id: Uuid) -> anyhow::Result<()> {
    let pool = db::create_pool(config).await?;
    with_deposit_service(pool, config, |service| async move {
        service.reject(tx_id).await?;
        tracing::info!(%tx_id, "Deposit rejected from CLI");
        println!("✓ Deposit {} rejected", tx_id);
        Ok(())
    })
    .await
}

pub async fn handle_token_issue(config: &Config, user_id: Uuid) -> anyhow::Result<()> {
    let pool = db::create_pool(config).await?;
    let ports = Ports::postgres(pool);

    let account = ports
        .accounts
        .get_user(user_id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("Account {} not found", user_id))?;
    let token = AuthKeys::new(&config.jwt_secret).issue(&account)?;

    tracing::info!(%user_id, role = %account.role, "Token issued from CLI");
    println!("{}", token);
    Ok(())
}

fn mask_password(url: &str) -> String {
    if let Some(at_pos) = url.rfind('@') {
        if let Some(colon_pos) = url[..at_pos].rfind(':') {
            if let Some(slash_pos) = url[..colon_pos].rfind("//") {
                let prefix = &url[..slash_pos + 2];
                let user = &url[slash_pos + 2..colon_pos];
                let suffix = &url[at_pos..];
                return format!("{}{}:****{}", prefix, user, suffix);
            }
        }
    }
    url.to_string()
}
