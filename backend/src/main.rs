//! # Commission Engine Backend Service
//!
//! Entry point of the referral network and commission engine. It provides:
//!
//! - Placement of new users in the binary referral tree
//! - Pairing (`refer`) commissions with a daily cap
//! - First-order and resale commissions on paid orders
//! - Daily maturity and monthly pool settlement
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        BACKEND SERVICE                           │
//! │                                                                  │
//! │  ┌─────────────────────────┐      ┌─────────────────────────┐   │
//! │  │  Operator API (Actix)   │      │   Background Services   │   │
//! │  │  /network/place         │      │  • Settlement loop      │   │
//! │  │  /orders/paid           │      │    (daily + monthly)    │   │
//! │  │  /settlement/*          │      │                         │   │
//! │  └────────────┬────────────┘      └────────────┬────────────┘   │
//! │               └──────────────┬─────────────────┘                 │
//! │  ┌───────────────────────────┴───────────────────────────────┐  │
//! │  │                    SERVICE LAYER                           │  │
//! │  │  ┌──────────────┐ ┌────────────────────┐ ┌─────────────┐  │  │
//! │  │  │ReferralNetwork│ │CommissionDistributor│ │ Settlement  │  │  │
//! │  │  └──────────────┘ └────────────────────┘ └─────────────┘  │  │
//! │  └───────────────────────────┬───────────────────────────────┘  │
//! │                              │ store traits                      │
//! │                       ┌──────┴──────┐                            │
//! │                       │  PostgreSQL │                            │
//! │                       └─────────────┘                            │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! 1. Set up PostgreSQL and create the database
//! 2. Set `DATABASE_URL` (a `.env` file works)
//! 3. Start the server: `cargo run`; the schema is applied at startup

use std::io;
use std::sync::Arc;

use actix_web::{middleware, web, App, HttpServer};
use tracing::info;
use tracing_subscriber::FmtSubscriber;

mod api;
mod config;
mod db;
mod models;
mod network;
mod services;
mod store;
mod utils;

use config::AppConfig;
use db::Database;
use services::{network_lock, CommissionDistributor, ReferralNetwork, SettlementScheduler};
use store::PgStore;

/// Application state shared across all handlers.
pub struct AppState {
    /// Database connection pool, used by the health check.
    pub db: Database,

    /// Placement and pairing.
    pub network: ReferralNetwork,

    /// Order commissions.
    pub distributor: CommissionDistributor,

    /// Settlement jobs, also driven by the background loop.
    pub settlement: SettlementScheduler,

    /// Application configuration.
    pub config: AppConfig,
}

/// Main entry point for the backend service.
///
/// This function:
/// 1. Loads configuration from environment
/// 2. Initializes logging
/// 3. Connects to the database and applies the schema
/// 4. Wires the services over one shared store
/// 5. Starts the settlement loop and the HTTP server
#[actix_web::main]
async fn main() -> io::Result<()> {
    // =========================================
    // STEP 1: Load Configuration
    // =========================================
    dotenvy::dotenv().ok(); // It's okay if .env doesn't exist

    let config = AppConfig::from_env().map_err(|e| io::Error::other(e.to_string()))?;

    // =========================================
    // STEP 2: Initialize Logging
    // =========================================
    let subscriber = FmtSubscriber::builder()
        .with_max_level(config.log_level)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| io::Error::other(e.to_string()))?;

    info!("Starting Commission Engine Backend Service");
    info!(
        "Refer unit: {} paise, daily cap: {}, pool fee: {} paise, pair policy: {:?}",
        config.commission.refer_unit_amount,
        config.commission.daily_refer_cap,
        config.commission.monthly_pool_fee,
        config.commission.pair_count_policy
    );

    // =========================================
    // STEP 3: Initialize Database
    // =========================================
    let db = Database::connect(&config.database_url)
        .await
        .map_err(|e| io::Error::other(e.to_string()))?;

    info!("Database connected");

    db.run_migrations()
        .await
        .map_err(|e| io::Error::other(e.to_string()))?;

    info!("Database migrations complete");

    // =========================================
    // STEP 4: Initialize Services
    // =========================================
    let store = Arc::new(PgStore::new(db.clone()));
    let lock = network_lock();

    let network = ReferralNetwork::new(
        store.clone(),
        store.clone(),
        config.commission.clone(),
        lock.clone(),
    );

    let distributor = CommissionDistributor::new(
        store.clone(),
        store.clone(),
        config.commission.clone(),
        lock,
    );

    let settlement = SettlementScheduler::new(
        store.clone(),
        store.clone(),
        store,
        config.commission.clone(),
    );

    info!("Services initialized");

    let app_state = Arc::new(AppState {
        db,
        network,
        distributor,
        settlement: settlement.clone(),
        config: config.clone(),
    });

    // =========================================
    // STEP 5: Start Background Services
    // =========================================
    if config.scheduler_enabled {
        let interval_secs = config.settlement_interval;
        tokio::spawn(async move {
            settlement.start(interval_secs).await;
        });

        info!("Settlement scheduler started");
    } else {
        info!("Settlement scheduler disabled; expecting external cron");
    }

    // =========================================
    // STEP 6: Start HTTP Server
    // =========================================
    let server_host = config.server_host.clone();
    let server_port = config.server_port;

    info!("Starting HTTP server on {}:{}", server_host, server_port);

    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(app_state.clone()))
            .wrap(middleware::Logger::default())
            .configure(api::configure_routes)
    })
    .bind(format!("{}:{}", server_host, server_port))?
    .run()
    .await
}
