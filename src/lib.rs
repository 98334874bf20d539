pub mod adapters;
pub mod config;
pub mod db;
pub mod domain;
pub mod error;
pub mod handlers;
pub mod health;
pub mod middleware;
pub mod ports;
pub mod services;
pub mod startup;
pub mod utils;
pub mod validation;

use std::sync::Arc;

use axum::{
    http::{header, HeaderValue, Method},
    routing::{get, patch, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};

use crate::config::DepositSettings;
use crate::health::HealthMonitor;
use crate::middleware::AuthKeys;
use crate::ports::{AccountDirectory, LedgerStore, NotificationStore, ProductCatalog};
use crate::services::{DepositService, Notifier, PushHub, SettlementService, WalletService};

/// Storage collaborators the services are built on.
#[derive(Clone)]
pub struct Ports {
    pub ledger: Arc<dyn LedgerStore>,
    pub accounts: Arc<dyn AccountDirectory>,
    pub catalog: Arc<dyn ProductCatalog>,
    pub notifications: Arc<dyn NotificationStore>,
}

impl Ports {
    pub fn postgres(pool: sqlx::PgPool) -> Self {
        Self {
            ledger: Arc::new(adapters::PostgresLedgerStore::new(pool.clone())),
            accounts: Arc::new(adapters::PostgresAccountDirectory::new(pool.clone())),
            catalog: Arc::new(adapters::PostgresProductCatalog::new(pool.clone())),
            notifications: Arc::new(adapters::PostgresNotificationStore::new(pool)),
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub accounts: Arc<dyn AccountDirectory>,
    pub notifications: Arc<dyn NotificationStore>,
    pub wallets: Arc<WalletService>,
    pub deposits: Arc<DepositService>,
    pub settlement: Arc<SettlementService>,
    pub push: PushHub,
    pub auth: AuthKeys,
    pub webhook_api_key: Option<String>,
    pub health: Arc<HealthMonitor>,
}

impl AppState {
    pub fn new(ports: Ports, notifier: Notifier, deposit: DepositSettings, auth: AuthKeys) -> Self {
        Self::with_deposit_service(
            ports.clone(),
            DepositService::new(ports.ledger.clone(), ports.accounts.clone(), notifier, deposit),
            auth,
        )
    }

    /// Builds the state around an already configured deposit service.
    pub fn with_deposit_service(ports: Ports, deposits: DepositService, auth: AuthKeys) -> Self {
        Self {
            wallets: Arc::new(WalletService::new(ports.ledger.clone())),
            settlement: Arc::new(SettlementService::new(
                ports.ledger.clone(),
                ports.catalog.clone(),
                ports.accounts.clone(),
            )),
            deposits: Arc::new(deposits),
            accounts: ports.accounts,
            notifications: ports.notifications,
            push: PushHub::new(),
            auth,
            webhook_api_key: None,
            health: Arc::new(HealthMonitor::new()),
        }
    }

    pub fn with_webhook_api_key(mut self, key: Option<String>) -> Self {
        self.webhook_api_key = key;
        self
    }

    pub fn with_health(mut self, monitor: HealthMonitor) -> Self {
        self.health = Arc::new(monitor);
        self
    }
}

pub fn create_app(state: AppState) -> Router {
    create_app_with_cors(state, None)
}

pub fn create_app_with_cors(state: AppState, allowed_origins: Option<&[String]>) -> Router {
    let wallet_routes = Router::new()
        .route("/wallet", get(handlers::wallet::get_wallet))
        .route("/wallet/transactions", get(handlers::wallet::list_transactions))
        .route("/wallet/last-bank-info", get(handlers::wallet::last_bank_info))
        .route("/wallet/deposit/init", post(handlers::wallet::init_deposit))
        .route("/wallet/orders/:id", post(handlers::orders::purchase_with_wallet));

    let order_routes = Router::new()
        .route("/orders", get(handlers::orders::list_orders))
        .route("/orders/:id", post(handlers::orders::purchase_with_bank_transfer))
        .route("/orders/:id/invoice", get(handlers::orders::get_invoice));

    let admin_routes = Router::new()
        .route("/admin/wallet/deposits", get(handlers::admin::list_deposits))
        .route(
            "/admin/wallet/deposits/overview",
            get(handlers::admin::deposit_overview),
        )
        .route(
            "/admin/wallet/deposits/:id/reject",
            patch(handlers::admin::reject_deposit),
        )
        .route(
            "/admin/wallet/activate-deposit",
            post(handlers::admin::activate_deposit),
        )
        .route("/admin/purchases", get(handlers::admin::list_purchases))
        .route(
            "/admin/purchases/overview",
            get(handlers::admin::purchase_overview),
        )
        .route("/admin/purchases/:id", get(handlers::admin::purchase_detail))
        .route(
            "/admin/purchases/:id/status",
            patch(handlers::admin::update_purchase_status),
        );

    let notification_routes = Router::new()
        .route(
            "/notifications",
            get(handlers::notifications::list).delete(handlers::notifications::delete_all),
        )
        .route(
            "/notifications/:id",
            axum::routing::delete(handlers::notifications::delete_one),
        )
        .route(
            "/notifications/:id/read",
            patch(handlers::notifications::mark_read),
        )
        .route("/ws/notifications", get(handlers::ws::ws_handler));

    Router::new()
        .route("/health", get(handlers::health))
        .route("/webhook/bank-notice", post(handlers::webhook::bank_notice))
        .merge(wallet_routes)
        .merge(order_routes)
        .merge(admin_routes)
        .merge(notification_routes)
        .layer(cors_layer(allowed_origins))
        .layer(axum::middleware::from_fn(
            middleware::request_logger_middleware,
        ))
        .with_state(state)
}

fn cors_layer(allowed_origins: Option<&[String]>) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    match allowed_origins {
        Some(origins) => {
            let origins: Vec<HeaderValue> = origins
                .iter()
                .filter_map(|origin| match HeaderValue::from_str(origin) {
                    Ok(value) => Some(value),
                    Err(_) => {
                        tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                        None
                    }
                })
                .collect();
            layer.allow_origin(origins)
        }
        None => layer.allow_origin(Any),
    }
}
