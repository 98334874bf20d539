mod cli;

use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cli::{Cli, Commands, DbCommands, DepositCommands, TokenCommands};
use flowmart_core::config::{Config, LogFormat};
use flowmart_core::health::{HealthMonitor, PostgresChecker};
use flowmart_core::middleware::AuthKeys;
use flowmart_core::services::{run_dispatcher, Notifier};
use flowmart_core::{create_app_with_cors, db, AppState, Ports};

fn init_tracing(format: LogFormat) {
    let filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::from_env()?;
    init_tracing(config.log_format);

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve(config).await,
        Commands::Db(DbCommands::Migrate) => cli::handle_db_migrate(&config).await,
        Commands::Config => cli::handle_config_validate(&config).await,
        Commands::Deposit(DepositCommands::Activate { tx_id }) => {
            cli::handle_deposit_activate(&config, tx_id).await
        }
        Commands::Deposit(DepositCommands::Reject { tx_id }) => {
            cli::handle_deposit_reject(&config, tx_id).await
        }
        Commands::Token(TokenCommands::Issue { user_id }) => {
            cli::handle_token_issue(&config, user_id).await
        }
    }
}

async fn serve(config: Config) -> anyhow::Result<()> {
    let pool = db::create_pool(&config).await?;
    db::run_migrations(&pool).await?;

    let ports = Ports::postgres(pool.clone());
    let (notifier, receiver) = Notifier::channel();
    let health = HealthMonitor::new().with_check("postgres", true, Arc::new(PostgresChecker::new(pool)));

    let state = AppState::new(
        ports.clone(),
        notifier,
        config.deposit.clone(),
        AuthKeys::new(&config.jwt_secret),
    )
    .with_webhook_api_key(config.bank_webhook_api_key.clone())
    .with_health(health);

    tokio::spawn(run_dispatcher(
        receiver,
        ports.accounts,
        ports.notifications,
        state.push.clone(),
    ));

    if config.bank_webhook_api_key.is_none() {
        tracing::warn!("BANK_WEBHOOK_API_KEY not set, bank notices are accepted unauthenticated");
    }

    let app = create_app_with_cors(state, config.cors_allowed_origins.as_deref());

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    tracing::info!("listening on {}", addr);

    axum::Server::bind(&addr)
        .serve(app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
