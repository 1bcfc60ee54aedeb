//! # Settlement Scheduler
//!
//! Periodic jobs that move money into wallets.
//!
//! ## Jobs
//!
//! | Job | Cadence | Guard |
//! |-----|---------|-------|
//! | Maturity sweep | every tick | `status = 'pending'` per row |
//! | Inactivity | every tick | idempotent update |
//! | Monthly pool | first tick of each month | `settlement_runs` claim |
//!
//! ## Monthly Pool
//!
//! ```text
//!   pool = active_users × fee − 15%
//!
//!   buckets:  [L0][L1][L2]...[L9][Top]
//!   cohort k = buckets k..=10
//!
//!   cohort:    0    1    2    3    4   5   6   7   8   9
//!   share %:  25   10   10   10    5   5   5   5   5   5
//! ```
//!
//! Each cohort's share is split evenly among its members and credited
//! straight to `total_income`; no commission rows are written.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::time::interval;
use tracing::{debug, error, info, warn};

use crate::config::CommissionSettings;
use crate::db::{DatabaseError, SettlementRun, UserRecord};
use crate::network::{compute_stage, Stage, STAGE_BUCKETS};
use crate::store::{CommissionStore, SettlementLogStore, UserStore};
use crate::utils::{apply_bps, month_key, one_month_before};

/// Share of the monthly pool kept by the company (15%).
pub const COMPANY_CUT_BPS: i64 = 1_500;

/// Percentage of the remaining pool given to cohorts 0..=9.
pub const POOL_SPLIT_PERCENT: [i64; 10] = [25, 10, 10, 10, 5, 5, 5, 5, 5, 5];

/// Errors that can occur in settlement jobs.
#[derive(Debug, thiserror::Error)]
pub enum SettlementError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] DatabaseError),
}

/// Result of one daily run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DailySettlementReport {
    /// Rows moved to `done`.
    pub matured: usize,
    /// Paise added to wallets.
    pub credited: i64,
    /// Rows another run settled first.
    pub already_settled: usize,
    pub failed: usize,
    pub disabled_users: u64,
}

/// Result of one monthly run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthlySettlementReport {
    pub month_key: String,
    /// `false` when the month had already been claimed.
    pub executed: bool,
    pub active_users: i64,
    pub pool_amount: i64,
    pub distributed: i64,
    pub beneficiaries: usize,
    pub failed: usize,
}

impl MonthlySettlementReport {
    fn skipped(month_key: String) -> Self {
        Self {
            month_key,
            executed: false,
            active_users: 0,
            pool_amount: 0,
            distributed: 0,
            beneficiaries: 0,
            failed: 0,
        }
    }
}

/// Compute each user's share of `pool`.
///
/// ## Arguments
///
/// * `pool` - Distributable amount after the company cut
/// * `members` - `(user_id, stage)` for every user in the network
///
/// ## Returns
///
/// Amount per user id. Users in no paid cohort are absent. Integer
/// division leaves a remainder of at most a few paise per cohort
/// undistributed; empty cohorts leave their whole share undistributed.
pub fn plan_pool_distribution(pool: i64, members: &[(i64, Stage)]) -> BTreeMap<i64, i64> {
    let mut buckets: Vec<Vec<i64>> = vec![Vec::new(); STAGE_BUCKETS];
    for (user_id, stage) in members {
        buckets[stage.bucket_index()].push(*user_id);
    }

    let mut shares = BTreeMap::new();
    for (cohort, percent) in POOL_SPLIT_PERCENT.iter().enumerate() {
        let cohort_members: Vec<i64> = buckets[cohort..].iter().flatten().copied().collect();
        if cohort_members.is_empty() {
            continue;
        }

        let per_member = apply_bps(pool, percent * 100) / cohort_members.len() as i64;
        if per_member == 0 {
            continue;
        }
        for user_id in cohort_members {
            *shares.entry(user_id).or_insert(0) += per_member;
        }
    }

    shares
}

/// Runs the settlement jobs, on demand or on a timer.
///
/// ## Usage
///
/// ```rust,ignore
/// let scheduler = SettlementScheduler::new(store.clone(), store.clone(), store, settings);
///
/// // From an external cron
/// scheduler.run_daily_settlement().await?;
///
/// // Or as a background task
/// tokio::spawn(async move { scheduler.start(3600).await });
/// ```
#[derive(Clone)]
pub struct SettlementScheduler {
    users: Arc<dyn UserStore>,
    commissions: Arc<dyn CommissionStore>,
    runs: Arc<dyn SettlementLogStore>,
    settings: CommissionSettings,
    job_lock: Arc<Mutex<()>>,
}

impl SettlementScheduler {
    pub fn new(
        users: Arc<dyn UserStore>,
        commissions: Arc<dyn CommissionStore>,
        runs: Arc<dyn SettlementLogStore>,
        settings: CommissionSettings,
    ) -> Self {
        Self {
            users,
            commissions,
            runs,
            settings,
            job_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Start the settlement loop.
    ///
    /// Runs forever, settling every `interval_secs` seconds. The first tick
    /// fires immediately.
    pub async fn start(&self, interval_secs: u64) {
        info!("Starting settlement scheduler (interval: {}s)", interval_secs);

        let mut ticker = interval(Duration::from_secs(interval_secs.max(1)));

        loop {
            ticker.tick().await;

            if let Err(e) = self.run_daily_settlement().await {
                error!("Daily settlement failed: {}", e);
            }

            if let Err(e) = self.run_monthly_settlement().await {
                error!("Monthly settlement failed: {}", e);
            }
        }
    }

    // ==========================================
    // DAILY
    // ==========================================

    /// Mature every due `pending` row and disable long-inactive users.
    pub async fn run_daily_settlement(&self) -> Result<DailySettlementReport, SettlementError> {
        self.run_daily_settlement_at(Utc::now()).await
    }

    pub async fn run_daily_settlement_at(
        &self,
        now: DateTime<Utc>,
    ) -> Result<DailySettlementReport, SettlementError> {
        let _guard = self.job_lock.lock().await;

        let due = self.commissions.list_pending_due(now).await?;
        let mut report = DailySettlementReport::default();

        for payment in due {
            match self.commissions.mature_commission(payment.id, now).await {
                Ok(true) => {
                    report.matured += 1;
                    report.credited += payment.amount;
                }
                Ok(false) => report.already_settled += 1,
                Err(e) => {
                    warn!(
                        "Failed to mature payment {} for user {}: {}",
                        payment.id, payment.user_id, e
                    );
                    report.failed += 1;
                }
            }
        }

        report.disabled_users = match self.disable_inactive(now).await {
            Ok(count) => count,
            Err(e) => {
                error!("Inactivity job failed: {}", e);
                0
            }
        };

        info!(
            "Daily settlement: {} matured, {} paise credited, {} already settled, {} failed, {} users disabled",
            report.matured, report.credited, report.already_settled, report.failed, report.disabled_users
        );

        Ok(report)
    }

    /// Disable users whose inactivity started over a month ago.
    async fn disable_inactive(&self, now: DateTime<Utc>) -> Result<u64, SettlementError> {
        let cutoff = one_month_before(now);
        let disabled = self.users.disable_inactive_users(cutoff).await?;
        if disabled > 0 {
            info!("Disabled {} users inactive since before {}", disabled, cutoff);
        }
        Ok(disabled)
    }

    // ==========================================
    // MONTHLY
    // ==========================================

    /// Distribute this month's pool, once per business month.
    pub async fn run_monthly_settlement(&self) -> Result<MonthlySettlementReport, SettlementError> {
        self.run_monthly_settlement_at(Utc::now()).await
    }

    pub async fn run_monthly_settlement_at(
        &self,
        now: DateTime<Utc>,
    ) -> Result<MonthlySettlementReport, SettlementError> {
        let _guard = self.job_lock.lock().await;

        let key = month_key(now, self.settings.business_offset);
        let active_users = self.users.count_active_users().await?;
        let gross = active_users.saturating_mul(self.settings.monthly_pool_fee);
        let pool = gross - apply_bps(gross, COMPANY_CUT_BPS);

        let run = SettlementRun {
            month_key: key.clone(),
            pool_amount: pool,
            active_users,
            executed_at: now,
        };

        // Claimed before crediting: a crash mid-distribution under-pays
        // rather than paying the month twice.
        if !self.runs.claim_monthly_run(&run).await? {
            debug!("Monthly settlement for {} already ran", key);
            return Ok(MonthlySettlementReport::skipped(key));
        }

        let users = self.users.get_all_users().await?;
        let members = classify_stages(&users);
        let shares = plan_pool_distribution(pool, &members);

        let mut report = MonthlySettlementReport {
            month_key: key,
            executed: true,
            active_users,
            pool_amount: pool,
            distributed: 0,
            beneficiaries: 0,
            failed: 0,
        };

        for (user_id, amount) in shares {
            match self.users.credit_income(user_id, amount).await {
                Ok(()) => {
                    report.beneficiaries += 1;
                    report.distributed += amount;
                }
                Err(e) => {
                    warn!("Failed to credit pool share of {} to user {}: {}", amount, user_id, e);
                    report.failed += 1;
                }
            }
        }

        info!(
            "Monthly settlement {}: pool {} from {} active users, {} distributed to {} users ({} failed)",
            report.month_key,
            report.pool_amount,
            report.active_users,
            report.distributed,
            report.beneficiaries,
            report.failed
        );

        Ok(report)
    }
}

/// Stage of every user, from direct active referral counts.
fn classify_stages(users: &[UserRecord]) -> Vec<(i64, Stage)> {
    let mut direct_active: HashMap<&str, i64> = HashMap::new();
    for user in users.iter().filter(|u| u.is_active() && !u.is_self_referred()) {
        *direct_active.entry(user.referred_by.as_str()).or_insert(0) += 1;
    }

    users
        .iter()
        .map(|user| {
            let count = direct_active
                .get(user.referral_code.as_str())
                .copied()
                .unwrap_or(0);
            (user.id, compute_stage(count))
        })
        .collect()
}
