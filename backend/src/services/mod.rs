//! # Services Module
//!
//! This module contains the business logic services of the commission
//! engine. Each service handles a specific concern.
//!
//! ## Services Overview
//!
//! | Service | Responsibility |
//! |---------|---------------|
//! | `ReferralNetwork` | Placement, pair counts, `refer` commissions |
//! | `CommissionDistributor` | First-order and resale commissions on paid orders |
//! | `SettlementScheduler` | Daily maturity sweep, inactivity, monthly pool |
//!
//! ## Service Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        SERVICES LAYER                            │
//! │                                                                  │
//! │  ┌────────────────┐  ┌──────────────────┐  ┌────────────────┐   │
//! │  │ReferralNetwork │  │CommissionDistrib.│  │  Settlement    │   │
//! │  │                │  │                  │  │  Scheduler     │   │
//! │  │ place user     │  │ first order      │  │ daily sweep    │   │
//! │  │ pair counts    │  │ resale (9 lvls)  │  │ monthly pool   │   │
//! │  └───────┬────────┘  └────────┬─────────┘  └───────┬────────┘   │
//! │          └─── NetworkLock ────┘              job lock            │
//! │                         │                          │             │
//! │                 ┌───────┴──────────────────────────┴──┐          │
//! │                 │  UserStore / CommissionStore / Log  │          │
//! │                 └─────────────────────────────────────┘          │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Tree rebuilds, pairing and order distribution all mutate state derived
//! from the whole network, so they share one [`NetworkLock`] and run one
//! at a time.

pub mod commission_distributor;
pub mod referral_network;
pub mod settlement;

use std::sync::Arc;

use tokio::sync::Mutex;

pub use commission_distributor::{CommissionDistributor, OrderPaidEvent};
pub use referral_network::ReferralNetwork;
pub use settlement::SettlementScheduler;

/// Serializes every operation that reads-then-writes the network.
pub type NetworkLock = Arc<Mutex<()>>;

/// Create a fresh, unlocked [`NetworkLock`].
pub fn network_lock() -> NetworkLock {
    Arc::new(Mutex::new(()))
}
