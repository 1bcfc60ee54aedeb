//! # REST API Module
//!
//! Operator endpoints of the commission engine. The engine has no end-user
//! surface: these routes are called by the registration and order systems
//! and by external cron jobs.
//!
//! ## Endpoint Overview
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | GET | `/` | API information |
//! | GET | `/health` | Health check |
//! | POST | `/network/place` | Place a registered user |
//! | POST | `/network/recompute` | Recompute pairing for everyone |
//! | GET | `/network/users/{id}/stage` | Stage, pair counts, placement |
//! | GET | `/network/users/{id}/wallet` | Wallet balance |
//! | POST | `/orders/paid` | Distribute order commissions |
//! | POST | `/settlement/daily` | Maturity sweep + inactivity job |
//! | POST | `/settlement/monthly` | Monthly pool distribution |
//!
//! ## Request/Response Format
//!
//! All requests and responses use JSON:
//!
//! ```json
//! // Success response
//! {
//!     "success": true,
//!     "data": { ... }
//! }
//!
//! // Error response
//! {
//!     "success": false,
//!     "error": {
//!         "code": "ERROR_CODE",
//!         "message": "Human readable message"
//!     }
//! }
//! ```

pub mod handlers;
pub mod routes;

pub use routes::configure_routes;
