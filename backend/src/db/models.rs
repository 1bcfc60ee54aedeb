//! # Database Models
//!
//! This module defines the data structures that map to database tables.
//! Each struct represents a row in a table.
//!
//! ## Table Overview
//!
//! | Table | Description |
//! |-------|-------------|
//! | `users` | Network members, their cached pair counts and income |
//! | `refer_payments` | Scheduled commission rows awaiting maturity |
//! | `settlement_runs` | One row per executed monthly pool distribution |
//!
//! ## Relationship Diagram
//!
//! ```text
//! ┌──────────────────┐       ┌──────────────────┐
//! │      users       │──────<│  refer_payments  │
//! │                  │       │                  │
//! │ id (PK)          │       │ user_id (FK)     │
//! │ referral_code    │◄─┐    │ status, reason   │
//! │ referred_by ─────┼──┘    │ amount           │
//! │ total_income     │       │ receive_at       │
//! └──────────────────┘       └──────────────────┘
//! ```
//!
//! `referred_by` points at another user's `referral_code`, which is what
//! the in-memory referral tree is rebuilt from.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Membership status of a user.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum UserStatus {
    /// Paying member; counts toward pairs and pools.
    Active,
    /// Registered but not (or no longer) paying.
    Inactive,
}

impl UserStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserStatus::Active => "active",
            UserStatus::Inactive => "inactive",
        }
    }
}

impl fmt::Display for UserStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UserStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(UserStatus::Active),
            "inactive" => Ok(UserStatus::Inactive),
            other => Err(format!("unknown user status: {}", other)),
        }
    }
}

/// Represents a user record in the database.
///
/// ## Note on Types
///
/// Money fields are `i64` paise because PostgreSQL has no unsigned
/// integers. `wallet` is never stored; see [`UserRecord::wallet`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    /// Primary key. Ascending id is the network's insertion order.
    pub id: i64,

    /// Display name, copied onto commission rows.
    pub name: String,

    /// Unique code this user shares with recruits.
    pub referral_code: String,

    /// Referral code of the inviter. The root user carries its own code
    /// or an empty string.
    pub referred_by: String,

    pub status: UserStatus,

    /// Cleared by the inactivity job after a month of inactivity.
    pub is_enabled: bool,

    /// Cached count of the left subtree, refreshed on every pairing run.
    pub left_count: i64,

    /// Cached count of the right subtree.
    pub right_count: i64,

    /// Lifetime matured income in paise.
    pub total_income: i64,

    /// Lifetime withdrawals in paise.
    pub total_withdrawn: i64,

    /// When `status` last changed.
    pub status_changed_at: DateTime<Utc>,

    pub created_at: DateTime<Utc>,
}

impl UserRecord {
    pub fn is_active(&self) -> bool {
        self.status == UserStatus::Active
    }

    /// Spendable balance: matured income minus withdrawals.
    pub fn wallet(&self) -> i64 {
        self.total_income - self.total_withdrawn
    }

    /// Whether `referred_by` points back at this user (root marker).
    pub fn is_self_referred(&self) -> bool {
        self.referred_by.is_empty() || self.referred_by == self.referral_code
    }
}

/// Lifecycle of a commission row.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    /// Waiting for `receive_at`.
    Pending,
    /// Matured and credited to `total_income`.
    Done,
    /// Beneficiary was inactive when the row was created; never matures.
    Failed,
    /// Over the daily refer cap; never matures.
    Exceeded,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Done => "done",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Exceeded => "exceeded",
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(PaymentStatus::Pending),
            "done" => Ok(PaymentStatus::Done),
            "failed" => Ok(PaymentStatus::Failed),
            "exceeded" => Ok(PaymentStatus::Exceeded),
            other => Err(format!("unknown payment status: {}", other)),
        }
    }
}

/// Why a commission row was created.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum PaymentReason {
    /// Completed left/right pair.
    Refer,
    /// Direct referrer's share of a buyer's first paid order.
    Commission,
    /// Upline share of a repeat order.
    ResaleCommission,
}

impl PaymentReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentReason::Refer => "refer",
            PaymentReason::Commission => "commission",
            PaymentReason::ResaleCommission => "resaleCommission",
        }
    }
}

impl fmt::Display for PaymentReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentReason {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "refer" => Ok(PaymentReason::Refer),
            "commission" => Ok(PaymentReason::Commission),
            "resaleCommission" => Ok(PaymentReason::ResaleCommission),
            other => Err(format!("unknown payment reason: {}", other)),
        }
    }
}

/// A scheduled commission payment (`refer_payments` row).
///
/// ## Example
///
/// A pairing commission created at 10:00 on 16 Oct:
/// ```text
/// CommissionPayment {
///     user_id: 42,
///     status: Pending,
///     reason: Refer,
///     amount: 5_000,          // 50 INR
///     receive_at: 16 Oct 23:59:59 (business time),
///     ...
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CommissionPayment {
    pub id: Uuid,

    /// Beneficiary.
    pub user_id: i64,

    /// Beneficiary name at creation time.
    pub user_name: String,

    pub status: PaymentStatus,

    pub reason: PaymentReason,

    /// Amount in paise.
    pub amount: i64,

    pub created_at: DateTime<Utc>,

    /// Maturity instant; the daily sweep credits the row once this passes.
    pub receive_at: DateTime<Utc>,
}

impl CommissionPayment {
    /// Build a new row for `beneficiary` with a fresh id.
    pub fn new(
        beneficiary: &UserRecord,
        reason: PaymentReason,
        status: PaymentStatus,
        amount: i64,
        created_at: DateTime<Utc>,
        receive_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: beneficiary.id,
            user_name: beneficiary.name.clone(),
            status,
            reason,
            amount,
            created_at,
            receive_at,
        }
    }

    /// Whether the daily sweep should credit this row at `now`.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status == PaymentStatus::Pending && self.receive_at <= now
    }
}

/// Execution log entry of the monthly pool distribution.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SettlementRun {
    /// Business-calendar month, `YYYY-MM`. Unique.
    pub month_key: String,

    /// Distributable pool after the company cut, in paise.
    pub pool_amount: i64,

    /// Active users the pool was computed from.
    pub active_users: i64,

    pub executed_at: DateTime<Utc>,
}
