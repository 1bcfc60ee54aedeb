//! # Referral Network Service
//!
//! Places users in the binary referral tree and turns completed
//! left/right pairs into `refer` commission rows.
//!
//! ## Flow: Registration
//!
//! ```text
//! 1. User registered/activated with a referral code
//!                ↓
//! 2. place_new_user() validates the referrer
//!                ↓
//! 3. Tree rebuilt from every user in id order (BFS placement)
//!                ↓
//! 4. Pairing recomputed for every active user
//!                ↓
//! 5. Missing `refer` rows scheduled (daily cap applies)
//! ```

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::CommissionSettings;
use crate::db::{CommissionPayment, DatabaseError, PaymentReason, PaymentStatus, UserRecord};
use crate::network::{compute_stage, Placement, ReferralTree, Stage};
use crate::store::{CommissionStore, UserStore};
use crate::utils::{end_of_day, format_inr, start_of_day};

use super::NetworkLock;

/// Errors that can occur in network operations.
#[derive(Debug, thiserror::Error)]
pub enum NetworkError {
    /// No user with this id.
    #[error("User not found: {0}")]
    UserNotFound(i64),

    /// No user carries the referral code.
    #[error("Referrer not found for code: {0}")]
    ReferrerNotFound(String),

    /// Referrer exists but is not active; registration is refused.
    #[error("Referrer is inactive: {0}")]
    ReferrerInactive(String),

    /// The request's referral code differs from the stored one.
    #[error("Referral code mismatch: user is referred by {stored}, request says {requested}")]
    ReferrerMismatch { stored: String, requested: String },

    /// The user could not be attached to the tree.
    #[error("User {0} is not placed in the referral tree")]
    Unplaced(i64),

    /// Store operation failed.
    #[error("Database error: {0}")]
    DatabaseError(#[from] DatabaseError),
}

/// Result of one pairing batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PairingSummary {
    pub users_processed: usize,
    pub users_failed: usize,
    /// Rows inserted, `exceeded` ones included.
    pub rows_created: usize,
    pub rows_exceeded: usize,
}

/// Result of placing a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlacementOutcome {
    pub user_id: i64,
    pub placement: Placement,
    pub pairing: PairingSummary,
}

/// A user's position and standing in the network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkView {
    pub user_id: i64,
    pub referral_code: String,
    pub stage: Stage,
    pub direct_active_referrals: i64,
    pub left_count: i64,
    pub right_count: i64,
    /// Every node below the user, whatever its status.
    pub downline_size: i64,
    pub placement: Placement,
}

/// Derived wallet of a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletView {
    pub user_id: i64,
    pub total_income: i64,
    pub total_withdrawn: i64,
    pub wallet: i64,
    pub formatted_wallet: String,
}

#[derive(Debug, Default)]
struct UserPairing {
    created: usize,
    exceeded: usize,
}

/// Placement and pairing over the referral tree.
///
/// ## Usage
///
/// ```rust,ignore
/// let network = ReferralNetwork::new(users, commissions, settings, lock);
///
/// // After registration
/// let outcome = network.place_new_user("REF123", 42).await?;
///
/// // After an activation that needs no placement
/// let summary = network.recompute_pairing_for_all_users().await?;
/// ```
#[derive(Clone)]
pub struct ReferralNetwork {
    users: Arc<dyn UserStore>,
    commissions: Arc<dyn CommissionStore>,
    settings: CommissionSettings,
    lock: NetworkLock,
}

impl ReferralNetwork {
    pub fn new(
        users: Arc<dyn UserStore>,
        commissions: Arc<dyn CommissionStore>,
        settings: CommissionSettings,
        lock: NetworkLock,
    ) -> Self {
        Self {
            users,
            commissions,
            settings,
            lock,
        }
    }

    // ==========================================
    // PLACEMENT
    // ==========================================

    /// Place a newly registered (or activated) user and recompute pairing.
    ///
    /// ## Errors
    ///
    /// * `UserNotFound` - `new_user_id` does not exist
    /// * `ReferrerMismatch` - the stored `referred_by` differs
    /// * `ReferrerNotFound` / `ReferrerInactive` - invalid referrer
    /// * `Unplaced` - the user could not be attached to the tree
    pub async fn place_new_user(
        &self,
        referred_by: &str,
        new_user_id: i64,
    ) -> Result<PlacementOutcome, NetworkError> {
        self.place_new_user_at(referred_by, new_user_id, Utc::now()).await
    }

    pub async fn place_new_user_at(
        &self,
        referred_by: &str,
        new_user_id: i64,
        now: DateTime<Utc>,
    ) -> Result<PlacementOutcome, NetworkError> {
        let _guard = self.lock.lock().await;

        let new_user = self
            .users
            .get_user_by_id(new_user_id)
            .await?
            .ok_or(NetworkError::UserNotFound(new_user_id))?;

        if new_user.referred_by != referred_by {
            return Err(NetworkError::ReferrerMismatch {
                stored: new_user.referred_by,
                requested: referred_by.to_string(),
            });
        }

        let users = self.users.get_all_users().await?;
        let is_root = users.iter().map(|u| u.id).min() == Some(new_user_id);

        // The lowest id is the root and needs no referrer.
        if !is_root {
            let referrer = self
                .users
                .get_user_by_referral_code(referred_by)
                .await?
                .ok_or_else(|| NetworkError::ReferrerNotFound(referred_by.to_string()))?;

            if !referrer.is_active() {
                warn!(
                    "Refusing placement of user {}: referrer {} is inactive",
                    new_user_id, referrer.id
                );
                return Err(NetworkError::ReferrerInactive(referred_by.to_string()));
            }
        }

        // Shape depends on id order alone, so an activated user with an
        // older id lands where a full rebuild puts it, downline included.
        let tree = ReferralTree::build(users.clone());
        let node = tree.find_by_id(new_user_id).ok_or_else(|| {
            warn!(
                "User {} left unplaced: referrer {} is not in the tree",
                new_user_id, referred_by
            );
            NetworkError::ReferrerNotFound(referred_by.to_string())
        })?;
        let placement = tree.placement_of(node);

        info!("Placed user {} under {}: {:?}", new_user_id, referred_by, placement);

        let pairing = self.recompute_with_tree(&tree, &users, now).await;

        Ok(PlacementOutcome {
            user_id: new_user_id,
            placement,
            pairing,
        })
    }

    // ==========================================
    // PAIRING
    // ==========================================

    /// Recompute pair counts and `refer` rows for every active user.
    ///
    /// Only loading the user table can fail the batch; per-user failures
    /// are logged and counted in the summary.
    pub async fn recompute_pairing_for_all_users(&self) -> Result<PairingSummary, NetworkError> {
        self.recompute_pairing_at(Utc::now()).await
    }

    pub async fn recompute_pairing_at(
        &self,
        now: DateTime<Utc>,
    ) -> Result<PairingSummary, NetworkError> {
        let _guard = self.lock.lock().await;

        let users = self.users.get_all_users().await?;
        let tree = ReferralTree::build(users.clone());

        Ok(self.recompute_with_tree(&tree, &users, now).await)
    }

    async fn recompute_with_tree(
        &self,
        tree: &ReferralTree,
        users: &[UserRecord],
        now: DateTime<Utc>,
    ) -> PairingSummary {
        let mut summary = PairingSummary::default();

        for user in users.iter().filter(|u| u.is_active()) {
            match self.recompute_user(tree, user, now).await {
                Ok(result) => {
                    summary.users_processed += 1;
                    summary.rows_created += result.created;
                    summary.rows_exceeded += result.exceeded;
                }
                Err(e) => {
                    warn!("Pairing skipped for user {}: {}", user.id, e);
                    summary.users_failed += 1;
                }
            }
        }

        info!(
            "Pairing run complete: {} users processed, {} failed, {} rows created ({} exceeded)",
            summary.users_processed, summary.users_failed, summary.rows_created, summary.rows_exceeded
        );

        summary
    }

    async fn recompute_user(
        &self,
        tree: &ReferralTree,
        user: &UserRecord,
        now: DateTime<Utc>,
    ) -> Result<UserPairing, NetworkError> {
        let node = tree.find_by_id(user.id).ok_or(NetworkError::Unplaced(user.id))?;

        let policy = self.settings.pair_count_policy;
        let left = tree.count_matching(tree.left(node), policy);
        let right = tree.count_matching(tree.right(node), policy);

        self.users.update_pair_counts(user.id, left, right).await?;

        let mut result = UserPairing::default();
        let pairs = left.min(right);
        if pairs == 0 {
            return Ok(result);
        }

        let direct = self
            .users
            .count_direct_active_referrals(&user.referral_code)
            .await?;
        if direct <= 1 {
            debug!(
                "User {} has {} pairs but only {} direct active referrals",
                user.id, pairs, direct
            );
            return Ok(result);
        }

        let existing = self
            .commissions
            .count_pending_or_done_refer_payments(user.id)
            .await?;
        let missing = (pairs - existing).max(0);

        for _ in 0..missing {
            let status = self.schedule_refer_payment(user, now).await?;
            result.created += 1;
            if status == PaymentStatus::Exceeded {
                result.exceeded += 1;
            }
        }

        if missing > 0 {
            debug!(
                "User {}: left={}, right={}, pairs={}, new refer rows={}",
                user.id, left, right, pairs, missing
            );
        }

        Ok(result)
    }

    /// Insert one `refer` row, downgraded to `exceeded` past the daily cap.
    async fn schedule_refer_payment(
        &self,
        user: &UserRecord,
        now: DateTime<Utc>,
    ) -> Result<PaymentStatus, NetworkError> {
        let offset = self.settings.business_offset;
        let today = self
            .commissions
            .count_pending_refer_since(user.id, start_of_day(now, offset))
            .await?;

        let status = if today >= self.settings.daily_refer_cap {
            warn!(
                "User {} reached the daily cap of {} refer payments; marking exceeded",
                user.id, self.settings.daily_refer_cap
            );
            PaymentStatus::Exceeded
        } else {
            PaymentStatus::Pending
        };

        let payment = CommissionPayment::new(
            user,
            PaymentReason::Refer,
            status,
            self.settings.refer_unit_amount,
            now,
            end_of_day(now, offset),
        );
        self.commissions.insert_commission_payment(&payment).await?;

        Ok(status)
    }

    // ==========================================
    // QUERIES
    // ==========================================

    /// Stage, pair counts and placement of one user.
    pub async fn network_view(&self, user_id: i64) -> Result<NetworkView, NetworkError> {
        let users = self.users.get_all_users().await?;
        let tree = ReferralTree::build(users);
        let node = tree.find_by_id(user_id).ok_or_else(|| {
            if tree.is_empty() {
                NetworkError::UserNotFound(user_id)
            } else {
                NetworkError::Unplaced(user_id)
            }
        })?;

        let user = &tree.node(node).user;
        let direct = self
            .users
            .count_direct_active_referrals(&user.referral_code)
            .await?;
        let policy = self.settings.pair_count_policy;

        Ok(NetworkView {
            user_id,
            referral_code: user.referral_code.clone(),
            stage: compute_stage(direct),
            direct_active_referrals: direct,
            left_count: tree.count_matching(tree.left(node), policy),
            right_count: tree.count_matching(tree.right(node), policy),
            downline_size: tree.count_nodes(Some(node)) - 1,
            placement: tree.placement_of(node),
        })
    }

    /// `total_income − total_withdrawn` for one user.
    pub async fn wallet(&self, user_id: i64) -> Result<WalletView, NetworkError> {
        let user = self
            .users
            .get_user_by_id(user_id)
            .await?
            .ok_or(NetworkError::UserNotFound(user_id))?;

        Ok(WalletView {
            user_id,
            total_income: user.total_income,
            total_withdrawn: user.total_withdrawn,
            wallet: user.wallet(),
            formatted_wallet: format_inr(user.wallet()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::UserStatus;
    use crate::network::{CountPolicy, Side};
    use crate::services::network_lock;
    use crate::store::memory::MemoryStore;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 16, 6, 0, 0).unwrap()
    }

    fn network(store: &Arc<MemoryStore>, settings: CommissionSettings) -> ReferralNetwork {
        ReferralNetwork::new(store.clone(), store.clone(), settings, network_lock())
    }

    fn add_active(store: &MemoryStore, id: i64, code: &str, referred_by: &str) {
        store.add_user(id, code, referred_by, UserStatus::Active);
    }

    /// R with six direct referrals filling two full levels.
    fn two_level_store() -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        add_active(&store, 1, "R", "R");
        for (id, code) in [(2, "A"), (3, "B"), (4, "C"), (5, "D"), (6, "E"), (7, "F")] {
            add_active(&store, id, code, "R");
        }
        store
    }

    #[tokio::test]
    async fn test_place_new_user_fills_shallowest_slot() {
        let store = Arc::new(MemoryStore::new());
        add_active(&store, 1, "R", "R");
        add_active(&store, 2, "A", "R");
        add_active(&store, 3, "B", "R");
        add_active(&store, 4, "C", "R");

        let outcome = network(&store, CommissionSettings::default())
            .place_new_user_at("R", 4, now())
            .await
            .unwrap();

        assert_eq!(
            outcome.placement,
            Placement::Child { parent_id: 2, side: Side::Left, depth_below_referrer: 2 }
        );
        assert_eq!(outcome.pairing.users_processed, 4);
        assert_eq!(store.user(1).left_count, 2);
        assert_eq!(store.user(1).right_count, 1);
    }

    #[tokio::test]
    async fn test_placing_an_older_user_matches_full_rebuild() {
        // X was registered under A before A itself was placed.
        let store = Arc::new(MemoryStore::new());
        add_active(&store, 1, "R", "R");
        add_active(&store, 2, "A", "R");
        add_active(&store, 3, "B", "R");
        add_active(&store, 4, "X", "A");
        let network = network(&store, CommissionSettings::default());

        let outcome = network.place_new_user_at("R", 2, now()).await.unwrap();

        assert_eq!(
            outcome.placement,
            Placement::Child { parent_id: 1, side: Side::Left, depth_below_referrer: 1 }
        );
        assert_eq!(outcome.pairing.users_failed, 0);
        let root = store.user(1);
        assert_eq!((root.left_count, root.right_count), (2, 1));
        assert_eq!(store.user(2).left_count, 1);

        // A later batch sees the same tree and changes nothing.
        let rows_before = store.payments().len();
        network.recompute_pairing_at(now()).await.unwrap();
        let root = store.user(1);
        assert_eq!((root.left_count, root.right_count), (2, 1));
        assert_eq!(store.payments().len(), rows_before);
    }

    #[tokio::test]
    async fn test_first_user_becomes_root() {
        let store = Arc::new(MemoryStore::new());
        add_active(&store, 1, "R", "");

        let outcome = network(&store, CommissionSettings::default())
            .place_new_user_at("", 1, now())
            .await
            .unwrap();

        assert_eq!(outcome.placement, Placement::Root);
    }

    #[tokio::test]
    async fn test_place_rejects_bad_referrers() {
        let store = Arc::new(MemoryStore::new());
        add_active(&store, 1, "R", "R");
        store.add_user(2, "SLEEPY", "R", UserStatus::Inactive);
        add_active(&store, 3, "X", "SLEEPY");
        add_active(&store, 4, "Y", "GHOST");
        let network = network(&store, CommissionSettings::default());

        let inactive = network.place_new_user_at("SLEEPY", 3, now()).await.unwrap_err();
        assert!(matches!(inactive, NetworkError::ReferrerInactive(code) if code == "SLEEPY"));

        let missing = network.place_new_user_at("GHOST", 4, now()).await.unwrap_err();
        assert!(matches!(missing, NetworkError::ReferrerNotFound(code) if code == "GHOST"));

        let mismatch = network.place_new_user_at("R", 3, now()).await.unwrap_err();
        assert!(matches!(mismatch, NetworkError::ReferrerMismatch { .. }));

        let unknown = network.place_new_user_at("R", 99, now()).await.unwrap_err();
        assert!(matches!(unknown, NetworkError::UserNotFound(99)));
    }

    #[tokio::test]
    async fn test_pairing_creates_one_row_per_pair_and_is_idempotent() {
        let store = two_level_store();
        let network = network(&store, CommissionSettings::default());

        let first = network.recompute_pairing_at(now()).await.unwrap();
        assert_eq!(first.rows_created, 3);

        let rows = store.payments_for(1);
        assert_eq!(rows.len(), 3);
        assert!(rows.iter().all(|p| p.status == PaymentStatus::Pending
            && p.reason == PaymentReason::Refer
            && p.amount == 5_000
            && p.receive_at == end_of_day(now(), CommissionSettings::default().business_offset)));

        let second = network.recompute_pairing_at(now()).await.unwrap();
        assert_eq!(second.rows_created, 0);
        assert_eq!(store.payments().len(), 3);
    }

    #[tokio::test]
    async fn test_pairs_without_two_direct_referrals_earn_nothing() {
        // A has C and D below it through R's spillover but no referrals of its own.
        let store = two_level_store();
        network(&store, CommissionSettings::default())
            .recompute_pairing_at(now())
            .await
            .unwrap();

        let a = store.user(2);
        assert_eq!((a.left_count, a.right_count), (1, 1));
        assert!(store.payments_for(2).is_empty());
    }

    #[tokio::test]
    async fn test_daily_cap_marks_rows_exceeded() {
        let store = Arc::new(MemoryStore::new());
        add_active(&store, 1, "R", "R");
        add_active(&store, 2, "A", "R");
        add_active(&store, 3, "B", "R");
        for i in 0..24 {
            add_active(&store, 4 + i, &format!("A{}", i), "A");
            add_active(&store, 100 + i, &format!("B{}", i), "B");
        }
        let network = network(&store, CommissionSettings::default());

        network.recompute_pairing_at(now()).await.unwrap();

        let root = store.user(1);
        assert_eq!((root.left_count, root.right_count), (25, 25));

        let rows = store.payments_for(1);
        assert_eq!(rows.len(), 25);
        let pending = rows.iter().filter(|p| p.status == PaymentStatus::Pending).count();
        let exceeded = rows.iter().filter(|p| p.status == PaymentStatus::Exceeded).count();
        assert_eq!((pending, exceeded), (20, 5));

        // Still capped for the rest of the day.
        network.recompute_pairing_at(now()).await.unwrap();
        let pending_today = store
            .payments_for(1)
            .iter()
            .filter(|p| p.status == PaymentStatus::Pending)
            .count();
        assert_eq!(pending_today, 20);
    }

    #[tokio::test]
    async fn test_throttled_pairs_are_paid_the_next_day() {
        let store = Arc::new(MemoryStore::new());
        add_active(&store, 1, "R", "R");
        add_active(&store, 2, "A", "R");
        add_active(&store, 3, "B", "R");
        for i in 0..24 {
            add_active(&store, 4 + i, &format!("A{}", i), "A");
            add_active(&store, 100 + i, &format!("B{}", i), "B");
        }
        let network = network(&store, CommissionSettings::default());
        let tomorrow = now() + chrono::Duration::days(1);

        network.recompute_pairing_at(now()).await.unwrap();
        network.recompute_pairing_at(tomorrow).await.unwrap();

        let rows = store.payments_for(1);
        let pending: Vec<&CommissionPayment> = rows
            .iter()
            .filter(|p| p.status == PaymentStatus::Pending)
            .collect();
        assert_eq!(pending.len(), 25);
        assert_eq!(pending.iter().filter(|p| p.created_at == tomorrow).count(), 5);

        // Every pair is now paid; nothing more to schedule.
        network.recompute_pairing_at(tomorrow).await.unwrap();
        assert_eq!(store.payments_for(1).len(), rows.len());
        let pending_after = store
            .payments_for(1)
            .iter()
            .filter(|p| p.status == PaymentStatus::Pending)
            .count();
        assert_eq!(pending_after, 25);
    }

    #[tokio::test]
    async fn test_pair_count_never_decreases_as_network_grows() {
        let store = Arc::new(MemoryStore::new());
        add_active(&store, 1, "R", "R");
        let network = network(&store, CommissionSettings::default());

        let mut last_pairs = 0;
        for id in 2..30 {
            let referrer = if id < 4 || id % 3 == 0 {
                "R".to_string()
            } else {
                format!("U{}", id / 2)
            };
            add_active(&store, id, &format!("U{}", id), &referrer);
            network.recompute_pairing_at(now()).await.unwrap();

            let root = store.user(1);
            let pairs = root.left_count.min(root.right_count);
            assert!(pairs >= last_pairs, "pairs dropped from {} to {}", last_pairs, pairs);
            last_pairs = pairs;
        }
        assert!(last_pairs > 0);
    }

    #[tokio::test]
    async fn test_active_only_policy_ignores_inactive_nodes() {
        let store = two_level_store();
        store.set_status(4, UserStatus::Inactive, now());
        store.set_status(5, UserStatus::Inactive, now());
        let settings = CommissionSettings {
            pair_count_policy: CountPolicy::ActiveOnly,
            ..CommissionSettings::default()
        };

        network(&store, settings).recompute_pairing_at(now()).await.unwrap();

        let root = store.user(1);
        assert_eq!((root.left_count, root.right_count), (1, 3));
        assert_eq!(store.payments_for(1).len(), 1);
    }

    #[tokio::test]
    async fn test_failing_user_does_not_abort_batch() {
        let store = two_level_store();
        store.fail_writes_for(2);

        let summary = network(&store, CommissionSettings::default())
            .recompute_pairing_at(now())
            .await
            .unwrap();

        assert_eq!(summary.users_failed, 1);
        assert_eq!(summary.users_processed, 6);
        assert_eq!(store.payments_for(1).len(), 3);
    }

    #[tokio::test]
    async fn test_network_view_and_wallet() {
        let store = two_level_store();
        store.set_withdrawn(1, 1_000);
        let network = network(&store, CommissionSettings::default());

        let view = network.network_view(1).await.unwrap();
        assert_eq!(view.direct_active_referrals, 6);
        assert_eq!(view.stage, Stage::Level(0));
        assert_eq!((view.left_count, view.right_count), (3, 3));
        assert_eq!(view.downline_size, 6);
        assert_eq!(view.placement, Placement::Root);

        let wallet = network.wallet(1).await.unwrap();
        assert_eq!(wallet.wallet, -1_000);
        assert!(matches!(network.wallet(77).await, Err(NetworkError::UserNotFound(77))));
    }
}
