//! # Referral Network
//!
//! Pure, storage-free algorithms over the referral network:
//!
//! - [`ReferralTree`] - the ephemeral binary placement tree, rebuilt from
//!   the user table on demand
//! - [`compute_stage`] - progression stage from direct active downline size
//!
//! ## Placement Rule
//!
//! ```text
//!             R                 R                  R
//!            / \     +C        / \      +D        / \
//!           A   B    ──►      A   B     ──►      A   B
//!                            /                  / \
//!                           C                  C   D
//! ```
//!
//! New members go to the shallowest free slot below their referrer,
//! left before right, breadth-first.

pub mod stage;
pub mod tree;

pub use stage::{compute_stage, Stage, STAGE_BUCKETS};
pub use tree::{CountPolicy, NodeId, Placement, ReferralTree, Side};

use thiserror::Error;

/// Errors raised while placing users in the tree.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PlacementError {
    /// No node carries the `referred_by` code.
    #[error("Referrer not found for code: {0}")]
    ReferrerNotFound(String),
}
