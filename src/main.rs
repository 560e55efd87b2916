mod config;
mod db;
mod dtos;
mod error;
mod handler;
mod middleware;
mod models;
mod routes;
mod service;
mod utils;

use std::sync::Arc;

use axum::http::{header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE}, HeaderValue, Method};
use config::Config;
use db::{DBClient, Ledger};
use dotenv::dotenv;
use routes::create_router;
use sqlx::postgres::PgPoolOptions;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing_subscriber::filter::LevelFilter;

use service::{
    account_service::AccountService,
    bid_service::BidService,
    escrow_service::EscrowService,
    notification_service::{NotificationDispatcher, NotificationService},
    payment_gateway::{PaymentGateway, StripeGateway},
    task_service::TaskService,
};

#[derive(Clone)]
pub struct AppState {
    pub env: Config,
    // Services
    pub task_service: Arc<TaskService>,
    pub bid_service: Arc<BidService>,
    pub escrow_service: Arc<EscrowService>,
    pub account_service: Arc<AccountService>,
    pub notification_service: Arc<NotificationService>,
}

impl AppState {
    pub fn new(
        ledger: Arc<dyn Ledger>,
        gateway: Arc<dyn PaymentGateway>,
        notifier: Arc<dyn NotificationDispatcher>,
        config: Config,
    ) -> Self {
        let notification_service = Arc::new(NotificationService::new(ledger.clone()));
        let escrow_service = Arc::new(EscrowService::new(
            ledger.clone(),
            gateway.clone(),
            notifier.clone(),
            &config,
        ));
        let bid_service = Arc::new(BidService::new(
            ledger.clone(),
            escrow_service.clone(),
            notifier.clone(),
        ));
        let task_service = Arc::new(TaskService::new(ledger.clone(), notifier));
        let account_service = Arc::new(AccountService::new(ledger, gateway, &config));

        Self {
            env: config,
            task_service,
            bid_service,
            escrow_service,
            account_service,
            notification_service,
        }
    }
}

fn level_filter(level: &str) -> LevelFilter {
    level.parse().unwrap_or(LevelFilter::DEBUG)
}

// size and idle are read separately, so idle can briefly exceed size.
fn active_connections(size: u32, idle: usize) -> u32 {
    size.saturating_sub(u32::try_from(idle).unwrap_or(u32::MAX))
}

#[tokio::main]
async fn main() {
    dotenv().ok();

    let config = Config::init();

    tracing_subscriber::fmt()
        .with_max_level(level_filter(&config.log_level))
        .init();

    let pool = match PgPoolOptions::new()
        .max_connections(20)
        .min_connections(5)
        .connect(&config.database_url)
        .await
    {
        Ok(pool) => {
            tracing::info!("Connection to the database is successful");
            pool
        }
        Err(err) => {
            tracing::error!("Failed to connect to the database: {:?}", err);
            std::process::exit(1);
        }
    };

    let db_client = DBClient::new(pool);
    if let Err(err) = db_client.migrate().await {
        tracing::error!("Failed to run database migrations: {}", err);
        std::process::exit(1);
    }

    let monitored = db_client.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(30));
        loop {
            interval.tick().await;
            let (size, idle) = monitored.pool_status();
            let active = active_connections(size, idle);
            tracing::debug!("Pool status - active: {}, idle: {}, total: {}", active, idle, size);
        }
    });

    let gateway = match StripeGateway::new(&config) {
        Ok(gateway) => Arc::new(gateway),
        Err(err) => {
            tracing::error!("Failed to build payment gateway client: {}", err);
            std::process::exit(1);
        }
    };

    let ledger: Arc<dyn Ledger> = Arc::new(db_client);
    let notifier: Arc<dyn NotificationDispatcher> = Arc::new(NotificationService::new(ledger.clone()));

    let allowed_origins: Vec<HeaderValue> = config
        .allowed_origins
        .iter()
        .filter_map(|origin| origin.parse::<HeaderValue>().ok())
        .collect();

    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed_origins))
        .allow_headers([AUTHORIZATION, ACCEPT, CONTENT_TYPE])
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE]);

    let app_state = Arc::new(AppState::new(ledger, gateway, notifier, config.clone()));

    let app = create_router(app_state).layer(cors);

    tracing::info!("Server is running on http://localhost:{}", config.port);

    let listener = match tokio::net::TcpListener::bind(format!("0.0.0.0:{}", &config.port)).await {
        Ok(listener) => listener,
        Err(err) => {
            tracing::error!("Failed to bind port {}: {}", config.port, err);
            std::process::exit(1);
        }
    };

    if let Err(err) = axum::serve(listener, app).await {
        tracing::error!("Server error: {}", err);
    }
}
