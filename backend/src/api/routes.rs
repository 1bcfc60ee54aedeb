//! # API Route Configuration
//!
//! This module sets up all the HTTP routes for the API.

use actix_web::web;

use super::handlers;

/// Configure all API routes.
///
/// ## Route Structure
///
/// ```text
/// /
/// ├── /health                    GET  - Health check
/// ├── /network
/// │   ├── /place                 POST - Place a user
/// │   ├── /recompute             POST - Recompute pairing
/// │   └── /users/{id}
/// │       ├── /stage             GET  - Network view
/// │       └── /wallet            GET  - Wallet
/// ├── /orders
/// │   └── /paid                  POST - Order commissions
/// └── /settlement
///     ├── /daily                 POST - Daily jobs
///     └── /monthly               POST - Monthly pool
/// ```
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg
        // Root endpoint - API information
        .route("/", web::get().to(handlers::api_info))

        // Health check endpoint
        .route("/health", web::get().to(handlers::health_check))

        // Referral network
        .service(
            web::scope("/network")
                .route("/place", web::post().to(handlers::place_user))
                .route("/recompute", web::post().to(handlers::recompute_pairing))
                .route("/users/{id}/stage", web::get().to(handlers::get_user_stage))
                .route("/users/{id}/wallet", web::get().to(handlers::get_wallet)),
        )

        // Order events
        .service(
            web::scope("/orders")
                .route("/paid", web::post().to(handlers::order_paid)),
        )

        // Settlement jobs (for external cron)
        .service(
            web::scope("/settlement")
                .route("/daily", web::post().to(handlers::run_daily_settlement))
                .route("/monthly", web::post().to(handlers::run_monthly_settlement)),
        );
}
