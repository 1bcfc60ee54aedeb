//! # Store Ports
//!
//! The engine reads and writes through three narrow traits so that the
//! services never touch SQL directly:
//!
//! | Trait | Backing table |
//! |-------|---------------|
//! | [`UserStore`] | `users` |
//! | [`CommissionStore`] | `refer_payments` |
//! | [`SettlementLogStore`] | `settlement_runs` |
//!
//! [`PgStore`] implements all three over the connection pool. Tests use
//! the in-memory implementation in `memory`.

#[cfg(test)]
pub mod memory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::db::{queries, CommissionPayment, Database, DatabaseError, SettlementRun, UserRecord};

/// User lookups and the few user fields the engine mutates.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// All users in insertion (id) order.
    async fn get_all_users(&self) -> Result<Vec<UserRecord>, DatabaseError>;

    async fn get_user_by_id(&self, id: i64) -> Result<Option<UserRecord>, DatabaseError>;

    async fn get_user_by_referral_code(&self, code: &str)
        -> Result<Option<UserRecord>, DatabaseError>;

    async fn update_pair_counts(&self, id: i64, left: i64, right: i64)
        -> Result<(), DatabaseError>;

    /// Active users directly referred by `code` (a self-referring root excluded).
    async fn count_direct_active_referrals(&self, code: &str) -> Result<i64, DatabaseError>;

    async fn count_active_users(&self) -> Result<i64, DatabaseError>;

    /// Add `amount` to `total_income`.
    async fn credit_income(&self, id: i64, amount: i64) -> Result<(), DatabaseError>;

    /// Disable users inactive since before `cutoff`; returns how many changed.
    async fn disable_inactive_users(&self, cutoff: DateTime<Utc>) -> Result<u64, DatabaseError>;
}

/// Commission rows and their maturity.
#[async_trait]
pub trait CommissionStore: Send + Sync {
    async fn insert_commission_payment(&self, payment: &CommissionPayment)
        -> Result<Uuid, DatabaseError>;

    /// Pending `refer` rows for `user_id` created at or after `since`.
    async fn count_pending_refer_since(&self, user_id: i64, since: DateTime<Utc>)
        -> Result<i64, DatabaseError>;

    /// `refer` rows for `user_id` that are `pending` or `done`.
    async fn count_pending_or_done_refer_payments(&self, user_id: i64)
        -> Result<i64, DatabaseError>;

    async fn list_pending_due(&self, now: DateTime<Utc>)
        -> Result<Vec<CommissionPayment>, DatabaseError>;

    /// Atomically mark a due row `done` and credit its beneficiary.
    /// `Ok(false)` if the row was no longer pending.
    async fn mature_commission(&self, id: Uuid, now: DateTime<Utc>) -> Result<bool, DatabaseError>;
}

/// Execution log of the monthly job.
#[async_trait]
pub trait SettlementLogStore: Send + Sync {
    /// Record `run` unless its month is already logged. `Ok(true)` if claimed.
    async fn claim_monthly_run(&self, run: &SettlementRun) -> Result<bool, DatabaseError>;
}

/// PostgreSQL-backed store.
#[derive(Clone)]
pub struct PgStore {
    db: Database,
}

impl PgStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl UserStore for PgStore {
    async fn get_all_users(&self) -> Result<Vec<UserRecord>, DatabaseError> {
        queries::get_all_users(self.db.pool()).await
    }

    async fn get_user_by_id(&self, id: i64) -> Result<Option<UserRecord>, DatabaseError> {
        queries::get_user_by_id(self.db.pool(), id).await
    }

    async fn get_user_by_referral_code(
        &self,
        code: &str,
    ) -> Result<Option<UserRecord>, DatabaseError> {
        queries::get_user_by_referral_code(self.db.pool(), code).await
    }

    async fn update_pair_counts(&self, id: i64, left: i64, right: i64) -> Result<(), DatabaseError> {
        queries::update_pair_counts(self.db.pool(), id, left, right).await
    }

    async fn count_direct_active_referrals(&self, code: &str) -> Result<i64, DatabaseError> {
        queries::count_direct_active_referrals(self.db.pool(), code).await
    }

    async fn count_active_users(&self) -> Result<i64, DatabaseError> {
        queries::count_active_users(self.db.pool()).await
    }

    async fn credit_income(&self, id: i64, amount: i64) -> Result<(), DatabaseError> {
        queries::credit_income(self.db.pool(), id, amount).await
    }

    async fn disable_inactive_users(&self, cutoff: DateTime<Utc>) -> Result<u64, DatabaseError> {
        queries::disable_inactive_users(self.db.pool(), cutoff).await
    }
}

#[async_trait]
impl CommissionStore for PgStore {
    async fn insert_commission_payment(
        &self,
        payment: &CommissionPayment,
    ) -> Result<Uuid, DatabaseError> {
        queries::insert_commission_payment(self.db.pool(), payment).await
    }

    async fn count_pending_refer_since(
        &self,
        user_id: i64,
        since: DateTime<Utc>,
    ) -> Result<i64, DatabaseError> {
        queries::count_pending_refer_since(self.db.pool(), user_id, since).await
    }

    async fn count_pending_or_done_refer_payments(
        &self,
        user_id: i64,
    ) -> Result<i64, DatabaseError> {
        queries::count_pending_or_done_refer_payments(self.db.pool(), user_id).await
    }

    async fn list_pending_due(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<CommissionPayment>, DatabaseError> {
        queries::list_pending_due(self.db.pool(), now).await
    }

    async fn mature_commission(&self, id: Uuid, now: DateTime<Utc>) -> Result<bool, DatabaseError> {
        queries::mature_commission(self.db.pool(), id, now).await
    }
}

#[async_trait]
impl SettlementLogStore for PgStore {
    async fn claim_monthly_run(&self, run: &SettlementRun) -> Result<bool, DatabaseError> {
        queries::claim_monthly_run(self.db.pool(), run).await
    }
}
