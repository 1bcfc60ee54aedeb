//! In-memory store for service tests.

use std::collections::{BTreeMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use uuid::Uuid;

use crate::db::{
    CommissionPayment, DatabaseError, PaymentReason, PaymentStatus, SettlementRun, UserRecord,
    UserStatus,
};

use super::{CommissionStore, SettlementLogStore, UserStore};

#[derive(Default)]
struct Inner {
    users: BTreeMap<i64, UserRecord>,
    payments: Vec<CommissionPayment>,
    runs: Vec<SettlementRun>,
    failing_users: HashSet<i64>,
}

/// Implements every store trait over plain collections.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a user with zeroed counters. Returns the stored record.
    pub fn add_user(&self, id: i64, code: &str, referred_by: &str, status: UserStatus) -> UserRecord {
        let epoch = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let user = UserRecord {
            id,
            name: format!("user-{}", code),
            referral_code: code.to_string(),
            referred_by: referred_by.to_string(),
            status,
            is_enabled: true,
            left_count: 0,
            right_count: 0,
            total_income: 0,
            total_withdrawn: 0,
            status_changed_at: epoch,
            created_at: epoch,
        };
        self.inner.lock().unwrap().users.insert(id, user.clone());
        user
    }

    pub fn set_status(&self, id: i64, status: UserStatus, changed_at: DateTime<Utc>) {
        let mut inner = self.inner.lock().unwrap();
        let user = inner.users.get_mut(&id).unwrap();
        user.status = status;
        user.status_changed_at = changed_at;
    }

    pub fn set_withdrawn(&self, id: i64, amount: i64) {
        self.inner.lock().unwrap().users.get_mut(&id).unwrap().total_withdrawn = amount;
    }

    /// Make every write touching `id` fail with a query-style error.
    pub fn fail_writes_for(&self, id: i64) {
        self.inner.lock().unwrap().failing_users.insert(id);
    }

    pub fn user(&self, id: i64) -> UserRecord {
        self.inner.lock().unwrap().users[&id].clone()
    }

    pub fn payments(&self) -> Vec<CommissionPayment> {
        self.inner.lock().unwrap().payments.clone()
    }

    pub fn payments_for(&self, user_id: i64) -> Vec<CommissionPayment> {
        self.payments().into_iter().filter(|p| p.user_id == user_id).collect()
    }

    pub fn runs(&self) -> Vec<SettlementRun> {
        self.inner.lock().unwrap().runs.clone()
    }

    fn injected_failure(id: i64) -> DatabaseError {
        DatabaseError::ConnectionError(format!("injected failure for user {}", id))
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn get_all_users(&self) -> Result<Vec<UserRecord>, DatabaseError> {
        Ok(self.inner.lock().unwrap().users.values().cloned().collect())
    }

    async fn get_user_by_id(&self, id: i64) -> Result<Option<UserRecord>, DatabaseError> {
        Ok(self.inner.lock().unwrap().users.get(&id).cloned())
    }

    async fn get_user_by_referral_code(
        &self,
        code: &str,
    ) -> Result<Option<UserRecord>, DatabaseError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.users.values().find(|u| u.referral_code == code).cloned())
    }

    async fn update_pair_counts(&self, id: i64, left: i64, right: i64) -> Result<(), DatabaseError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.failing_users.contains(&id) {
            return Err(Self::injected_failure(id));
        }
        let user = inner
            .users
            .get_mut(&id)
            .ok_or_else(|| DatabaseError::NotFound(format!("User not found: {}", id)))?;
        user.left_count = left;
        user.right_count = right;
        Ok(())
    }

    async fn count_direct_active_referrals(&self, code: &str) -> Result<i64, DatabaseError> {
        let inner = self.inner.lock().unwrap();
        let count = inner
            .users
            .values()
            .filter(|u| u.referred_by == code && u.referral_code != code && u.is_active())
            .count();
        Ok(count as i64)
    }

    async fn count_active_users(&self) -> Result<i64, DatabaseError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.users.values().filter(|u| u.is_active()).count() as i64)
    }

    async fn credit_income(&self, id: i64, amount: i64) -> Result<(), DatabaseError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.failing_users.contains(&id) {
            return Err(Self::injected_failure(id));
        }
        let user = inner
            .users
            .get_mut(&id)
            .ok_or_else(|| DatabaseError::NotFound(format!("User not found: {}", id)))?;
        user.total_income += amount;
        Ok(())
    }

    async fn disable_inactive_users(&self, cutoff: DateTime<Utc>) -> Result<u64, DatabaseError> {
        let mut inner = self.inner.lock().unwrap();
        let mut changed = 0;
        for user in inner.users.values_mut() {
            if !user.is_active() && user.is_enabled && user.status_changed_at < cutoff {
                user.is_enabled = false;
                changed += 1;
            }
        }
        Ok(changed)
    }
}

#[async_trait]
impl CommissionStore for MemoryStore {
    async fn insert_commission_payment(
        &self,
        payment: &CommissionPayment,
    ) -> Result<Uuid, DatabaseError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.failing_users.contains(&payment.user_id) {
            return Err(Self::injected_failure(payment.user_id));
        }
        inner.payments.push(payment.clone());
        Ok(payment.id)
    }

    async fn count_pending_refer_since(
        &self,
        user_id: i64,
        since: DateTime<Utc>,
    ) -> Result<i64, DatabaseError> {
        let inner = self.inner.lock().unwrap();
        let count = inner
            .payments
            .iter()
            .filter(|p| {
                p.user_id == user_id
                    && p.reason == PaymentReason::Refer
                    && p.status == PaymentStatus::Pending
                    && p.created_at >= since
            })
            .count();
        Ok(count as i64)
    }

    async fn count_pending_or_done_refer_payments(
        &self,
        user_id: i64,
    ) -> Result<i64, DatabaseError> {
        let inner = self.inner.lock().unwrap();
        let count = inner
            .payments
            .iter()
            .filter(|p| {
                p.user_id == user_id
                    && p.reason == PaymentReason::Refer
                    && matches!(p.status, PaymentStatus::Pending | PaymentStatus::Done)
            })
            .count();
        Ok(count as i64)
    }

    async fn list_pending_due(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<CommissionPayment>, DatabaseError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.payments.iter().filter(|p| p.is_due(now)).cloned().collect())
    }

    async fn mature_commission(&self, id: Uuid, now: DateTime<Utc>) -> Result<bool, DatabaseError> {
        let mut inner = self.inner.lock().unwrap();
        let Some(index) = inner.payments.iter().position(|p| p.id == id && p.is_due(now)) else {
            return Ok(false);
        };

        let (user_id, amount) = (inner.payments[index].user_id, inner.payments[index].amount);
        if inner.failing_users.contains(&user_id) {
            return Err(Self::injected_failure(user_id));
        }
        let user = inner
            .users
            .get_mut(&user_id)
            .ok_or_else(|| DatabaseError::NotFound(format!("User not found: {}", user_id)))?;
        user.total_income += amount;
        inner.payments[index].status = PaymentStatus::Done;
        Ok(true)
    }
}

#[async_trait]
impl SettlementLogStore for MemoryStore {
    async fn claim_monthly_run(&self, run: &SettlementRun) -> Result<bool, DatabaseError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.runs.iter().any(|r| r.month_key == run.month_key) {
            return Ok(false);
        }
        inner.runs.push(run.clone());
        Ok(true)
    }
}
