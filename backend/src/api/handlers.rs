//! # API Request Handlers
//!
//! This module contains the handler functions for each API endpoint.
//! Each handler:
//! 1. Extracts request data
//! 2. Validates input
//! 3. Calls the appropriate service
//! 4. Returns a formatted response
//!
//! ## Error Handling
//!
//! All errors are caught and returned as JSON:
//!
//! ```json
//! {
//!     "success": false,
//!     "error": {
//!         "code": "REFERRER_NOT_FOUND",
//!         "message": "Referrer not found for code: REF123"
//!     }
//! }
//! ```

use std::sync::Arc;

use actix_web::http::StatusCode;
use actix_web::{web, HttpResponse};
use chrono::Utc;
use serde_json::json;
use tracing::{error, info, warn};

use crate::models::{ApiResponse, HealthResponse, OrderPaidRequest, PlaceUserRequest};
use crate::services::commission_distributor::CommissionError;
use crate::services::referral_network::NetworkError;
use crate::services::OrderPaidEvent;
use crate::AppState;

/// API information endpoint (root).
///
/// ## Endpoint
///
/// `GET /`
pub async fn api_info() -> HttpResponse {
    let info = json!({
        "name": "Commission Engine API",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "Referral tree placement, pairing and commission settlement",
        "endpoints": {
            "health": { "method": "GET", "path": "/health" },
            "network": {
                "place": { "method": "POST", "path": "/network/place" },
                "recompute": { "method": "POST", "path": "/network/recompute" },
                "stage": { "method": "GET", "path": "/network/users/{id}/stage" },
                "wallet": { "method": "GET", "path": "/network/users/{id}/wallet" }
            },
            "orders": {
                "paid": { "method": "POST", "path": "/orders/paid" }
            },
            "settlement": {
                "daily": { "method": "POST", "path": "/settlement/daily" },
                "monthly": { "method": "POST", "path": "/settlement/monthly" }
            }
        }
    });

    HttpResponse::Ok().json(ApiResponse::success(info))
}

/// Health check endpoint.
///
/// ## Endpoint
///
/// `GET /health`
///
/// ## Example
///
/// ```bash
/// curl http://127.0.0.1:8080/health
/// ```
pub async fn health_check(state: web::Data<Arc<AppState>>) -> HttpResponse {
    let db_healthy = state.db.pool().get().await.is_ok();

    let response = HealthResponse {
        status: if db_healthy { "healthy" } else { "unhealthy" }.to_string(),
        database: db_healthy,
        scheduler: state.config.scheduler_enabled,
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now(),
    };

    let status_code = if db_healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    HttpResponse::build(status_code).json(ApiResponse::success(response))
}

// ==========================================
// NETWORK
// ==========================================

/// Place a registered user and recompute pairing.
///
/// ## Endpoint
///
/// `POST /network/place`
///
/// ## Example
///
/// ```bash
/// curl -X POST http://127.0.0.1:8080/network/place \
///   -H "Content-Type: application/json" \
///   -d '{"userId": 42, "referredBy": "REF123"}'
/// ```
///
/// ## Response
///
/// ```json
/// {
///     "success": true,
///     "data": {
///         "userId": 42,
///         "placement": { "kind": "child", "parentId": 17, "side": "left", "depthBelowReferrer": 2 },
///         "pairing": { "usersProcessed": 40, "usersFailed": 0, "rowsCreated": 1, "rowsExceeded": 0 }
///     }
/// }
/// ```
pub async fn place_user(
    state: web::Data<Arc<AppState>>,
    req: web::Json<PlaceUserRequest>,
) -> HttpResponse {
    info!("Placement request: user {} referred by {}", req.user_id, req.referred_by);

    match state.network.place_new_user(&req.referred_by, req.user_id).await {
        Ok(outcome) => HttpResponse::Ok().json(ApiResponse::success(outcome)),
        Err(e) => network_error_response("Placement", e),
    }
}

/// Recompute pair counts and `refer` commissions for every active user.
///
/// ## Endpoint
///
/// `POST /network/recompute`
pub async fn recompute_pairing(state: web::Data<Arc<AppState>>) -> HttpResponse {
    match state.network.recompute_pairing_for_all_users().await {
        Ok(summary) => HttpResponse::Ok().json(ApiResponse::success(summary)),
        Err(e) => network_error_response("Pairing recompute", e),
    }
}

/// Stage, pair counts and placement of one user.
///
/// ## Endpoint
///
/// `GET /network/users/{id}/stage`
pub async fn get_user_stage(
    state: web::Data<Arc<AppState>>,
    path: web::Path<i64>,
) -> HttpResponse {
    let user_id = path.into_inner();

    match state.network.network_view(user_id).await {
        Ok(view) => HttpResponse::Ok().json(ApiResponse::success(view)),
        Err(e) => network_error_response("Stage lookup", e),
    }
}

/// Wallet of one user.
///
/// ## Endpoint
///
/// `GET /network/users/{id}/wallet`
///
/// ## Response
///
/// ```json
/// {
///     "success": true,
///     "data": {
///         "userId": 42,
///         "totalIncome": 125000,
///         "totalWithdrawn": 25000,
///         "wallet": 100000,
///         "formattedWallet": "1,000.00 INR"
///     }
/// }
/// ```
pub async fn get_wallet(state: web::Data<Arc<AppState>>, path: web::Path<i64>) -> HttpResponse {
    let user_id = path.into_inner();

    match state.network.wallet(user_id).await {
        Ok(wallet) => HttpResponse::Ok().json(ApiResponse::success(wallet)),
        Err(e) => network_error_response("Wallet lookup", e),
    }
}

fn network_error_response(action: &str, e: NetworkError) -> HttpResponse {
    let (code, status) = match &e {
        NetworkError::UserNotFound(_) => ("USER_NOT_FOUND", StatusCode::NOT_FOUND),
        NetworkError::ReferrerNotFound(_) => ("REFERRER_NOT_FOUND", StatusCode::NOT_FOUND),
        NetworkError::ReferrerInactive(_) => ("REFERRER_INACTIVE", StatusCode::CONFLICT),
        NetworkError::ReferrerMismatch { .. } => ("REFERRER_MISMATCH", StatusCode::BAD_REQUEST),
        NetworkError::Unplaced(_) => ("USER_NOT_PLACED", StatusCode::NOT_FOUND),
        NetworkError::DatabaseError(_) => ("DATABASE_ERROR", StatusCode::INTERNAL_SERVER_ERROR),
    };

    if status.is_server_error() {
        error!("{} failed: {}", action, e);
    } else {
        warn!("{} rejected: {}", action, e);
    }

    HttpResponse::build(status).json(ApiResponse::<()>::error(code, &e.to_string()))
}

// ==========================================
// ORDERS
// ==========================================

/// Distribute commissions for a paid order.
///
/// ## Endpoint
///
/// `POST /orders/paid`
///
/// ## Example
///
/// ```bash
/// curl -X POST http://127.0.0.1:8080/orders/paid \
///   -H "Content-Type: application/json" \
///   -d '{"buyerId": 42, "orderTotal": 100000, "isFirstPaidOrder": true}'
/// ```
///
/// A failure here never affects the order itself; the caller just records
/// that the commission attempt failed.
pub async fn order_paid(
    state: web::Data<Arc<AppState>>,
    req: web::Json<OrderPaidRequest>,
) -> HttpResponse {
    let event = OrderPaidEvent::from(req.into_inner());

    match state.distributor.distribute_order_commission(&event).await {
        Ok(outcome) => HttpResponse::Ok().json(ApiResponse::success(outcome)),
        Err(e) => {
            let (code, status) = match &e {
                CommissionError::BuyerNotFound(_) => ("USER_NOT_FOUND", StatusCode::NOT_FOUND),
                CommissionError::ReferrerNotFound(_) => {
                    ("REFERRER_NOT_FOUND", StatusCode::NOT_FOUND)
                }
                CommissionError::InvalidAmount(_) => ("INVALID_AMOUNT", StatusCode::BAD_REQUEST),
                CommissionError::DatabaseError(_) => {
                    ("COMMISSION_FAILED", StatusCode::INTERNAL_SERVER_ERROR)
                }
            };

            HttpResponse::build(status).json(ApiResponse::<()>::error(code, &e.to_string()))
        }
    }
}

// ==========================================
// SETTLEMENT
// ==========================================

/// Run the maturity sweep and the inactivity job now.
///
/// ## Endpoint
///
/// `POST /settlement/daily`
///
/// Safe to call repeatedly; already-settled rows are skipped.
pub async fn run_daily_settlement(state: web::Data<Arc<AppState>>) -> HttpResponse {
    match state.settlement.run_daily_settlement().await {
        Ok(report) => HttpResponse::Ok().json(ApiResponse::success(report)),
        Err(e) => {
            error!("Daily settlement failed: {}", e);
            HttpResponse::InternalServerError()
                .json(ApiResponse::<()>::error("SETTLEMENT_FAILED", &e.to_string()))
        }
    }
}

/// Run this month's pool distribution if it has not run yet.
///
/// ## Endpoint
///
/// `POST /settlement/monthly`
///
/// ## Response
///
/// ```json
/// {
///     "success": true,
///     "data": {
///         "monthKey": "2026-10",
///         "executed": false,
///         ...
///     }
/// }
/// ```
pub async fn run_monthly_settlement(state: web::Data<Arc<AppState>>) -> HttpResponse {
    match state.settlement.run_monthly_settlement().await {
        Ok(report) => HttpResponse::Ok().json(ApiResponse::success(report)),
        Err(e) => {
            error!("Monthly settlement failed: {}", e);
            HttpResponse::InternalServerError()
                .json(ApiResponse::<()>::error("SETTLEMENT_FAILED", &e.to_string()))
        }
    }
}
