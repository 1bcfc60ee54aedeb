//! # Commission Distributor
//!
//! Turns a paid order into upline commission rows.
//!
//! ## Rules
//!
//! All amounts are computed on the order total net of 18% GST.
//!
//! | Order | Beneficiaries | Amount | Status |
//! |-------|---------------|--------|--------|
//! | First paid order | Direct referrer | 10% of net | `pending`, or `failed` if referrer inactive |
//! | Later orders | Up to 9 upline levels | 1% of net each | `pending` (needs an active direct referrer) |
//!
//! ```text
//!   L9 ◄─ ... ◄─ L2 ◄─ L1 (direct referrer) ◄─ buyer
//!   1%           1%    1%
//! ```
//!
//! Every row matures at the end of the current business day. Partial
//! resale walks are kept: a storage failure at level N leaves levels
//! 1..N-1 in place.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::config::CommissionSettings;
use crate::db::{CommissionPayment, DatabaseError, PaymentReason, PaymentStatus, UserRecord};
use crate::store::{CommissionStore, UserStore};
use crate::utils::{apply_bps, end_of_day, net_of_gst};

use super::NetworkLock;

/// First-order commission rate (10%).
pub const FIRST_ORDER_BPS: i64 = 1_000;

/// Per-level resale commission rate (1%).
pub const RESALE_LEVEL_BPS: i64 = 100;

/// Upline levels paid on a resale.
pub const RESALE_LEVELS: usize = 9;

/// Errors that can occur while distributing an order.
#[derive(Debug, thiserror::Error)]
pub enum CommissionError {
    #[error("Buyer not found: {0}")]
    BuyerNotFound(i64),

    #[error("Referrer not found for code: {0}")]
    ReferrerNotFound(String),

    #[error("Invalid order total: {0}")]
    InvalidAmount(i64),

    #[error("Database error: {0}")]
    DatabaseError(#[from] DatabaseError),
}

/// A buyer's order reached the paid state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct OrderPaidEvent {
    pub buyer_id: i64,
    /// Gross order total in paise, GST included.
    pub order_total: i64,
    /// Whether this is the buyer's first order to reach `paid`.
    pub is_first_paid_order: bool,
}

/// Which rule produced the rows.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum DistributionKind {
    FirstOrder,
    Resale,
    /// Repeat order whose direct referrer is inactive.
    Skipped,
    /// Buyer is the root.
    NoUpline,
}

/// Summary of one order distribution.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DistributionOutcome {
    pub kind: DistributionKind,
    pub rows_created: usize,
    pub total_amount: i64,
}

impl DistributionOutcome {
    fn empty(kind: DistributionKind) -> Self {
        Self {
            kind,
            rows_created: 0,
            total_amount: 0,
        }
    }
}

/// Upline commission on paid orders.
#[derive(Clone)]
pub struct CommissionDistributor {
    users: Arc<dyn UserStore>,
    commissions: Arc<dyn CommissionStore>,
    settings: CommissionSettings,
    lock: NetworkLock,
}

impl CommissionDistributor {
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

    /// Distribute commissions for a paid order.
    ///
    /// ## Arguments
    ///
    /// * `event` - The paid order
    ///
    /// ## Returns
    ///
    /// What was created. Errors are logged here before being returned, so
    /// the caller can treat them as a failed commission attempt without
    /// failing the order itself.
    pub async fn distribute_order_commission(
        &self,
        event: &OrderPaidEvent,
    ) -> Result<DistributionOutcome, CommissionError> {
        self.distribute_order_commission_at(event, Utc::now()).await
    }

    pub async fn distribute_order_commission_at(
        &self,
        event: &OrderPaidEvent,
        now: DateTime<Utc>,
    ) -> Result<DistributionOutcome, CommissionError> {
        let _guard = self.lock.lock().await;

        let result = self.distribute(event, now).await;
        match &result {
            Ok(outcome) => info!(
                "Order by user {} distributed: {:?}, {} rows, {} paise",
                event.buyer_id, outcome.kind, outcome.rows_created, outcome.total_amount
            ),
            Err(e) => error!("Commission attempt failed for buyer {}: {}", event.buyer_id, e),
        }
        result
    }

    async fn distribute(
        &self,
        event: &OrderPaidEvent,
        now: DateTime<Utc>,
    ) -> Result<DistributionOutcome, CommissionError> {
        if event.order_total <= 0 {
            return Err(CommissionError::InvalidAmount(event.order_total));
        }

        let buyer = self
            .users
            .get_user_by_id(event.buyer_id)
            .await?
            .ok_or(CommissionError::BuyerNotFound(event.buyer_id))?;

        if buyer.is_self_referred() {
            debug!("Buyer {} is the root; no upline to pay", buyer.id);
            return Ok(DistributionOutcome::empty(DistributionKind::NoUpline));
        }

        let referrer = self
            .users
            .get_user_by_referral_code(&buyer.referred_by)
            .await?
            .ok_or_else(|| CommissionError::ReferrerNotFound(buyer.referred_by.clone()))?;

        let net = net_of_gst(event.order_total);

        if event.is_first_paid_order {
            self.first_order(&referrer, net, now).await
        } else if referrer.is_active() {
            self.resale(referrer, net, now).await
        } else {
            debug!(
                "Resale by user {} skipped: direct referrer {} is inactive",
                buyer.id, referrer.id
            );
            Ok(DistributionOutcome::empty(DistributionKind::Skipped))
        }
    }

    async fn first_order(
        &self,
        referrer: &UserRecord,
        net: i64,
        now: DateTime<Utc>,
    ) -> Result<DistributionOutcome, CommissionError> {
        let status = if referrer.is_active() {
            PaymentStatus::Pending
        } else {
            PaymentStatus::Failed
        };
        let amount = apply_bps(net, FIRST_ORDER_BPS);

        let payment = CommissionPayment::new(
            referrer,
            PaymentReason::Commission,
            status,
            amount,
            now,
            end_of_day(now, self.settings.business_offset),
        );
        self.commissions.insert_commission_payment(&payment).await?;

        Ok(DistributionOutcome {
            kind: DistributionKind::FirstOrder,
            rows_created: 1,
            total_amount: amount,
        })
    }

    /// Walk up to [`RESALE_LEVELS`] ancestors starting at the direct
    /// referrer. The walk ends early at the root or at a dangling code.
    async fn resale(
        &self,
        direct_referrer: UserRecord,
        net: i64,
        now: DateTime<Utc>,
    ) -> Result<DistributionOutcome, CommissionError> {
        let amount = apply_bps(net, RESALE_LEVEL_BPS);
        let receive_at = end_of_day(now, self.settings.business_offset);
        let mut outcome = DistributionOutcome::empty(DistributionKind::Resale);

        let mut current = direct_referrer;
        loop {
            let payment = CommissionPayment::new(
                &current,
                PaymentReason::ResaleCommission,
                PaymentStatus::Pending,
                amount,
                now,
                receive_at,
            );
            self.commissions.insert_commission_payment(&payment).await?;
            outcome.rows_created += 1;
            outcome.total_amount += amount;

            if outcome.rows_created == RESALE_LEVELS || current.is_self_referred() {
                break;
            }

            match self.users.get_user_by_referral_code(&current.referred_by).await? {
                Some(next) if next.id != current.id => current = next,
                _ => {
                    debug!("Upline of user {} ends at level {}", current.id, outcome.rows_created);
                    break;
                }
            }
        }

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::UserStatus;
    use crate::services::network_lock;
    use crate::store::memory::MemoryStore;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 16, 6, 0, 0).unwrap()
    }

    fn distributor(store: &Arc<MemoryStore>) -> CommissionDistributor {
        CommissionDistributor::new(
            store.clone(),
            store.clone(),
            CommissionSettings::default(),
            network_lock(),
        )
    }

    /// Linear chain U0 (root) ← U1 ← ... ← U{len-1}, ids 1..=len.
    fn chain(len: i64) -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        store.add_user(1, "U0", "U0", UserStatus::Active);
        for i in 1..len {
            store.add_user(i + 1, &format!("U{}", i), &format!("U{}", i - 1), UserStatus::Active);
        }
        store
    }

    fn order(buyer_id: i64, first: bool) -> OrderPaidEvent {
        OrderPaidEvent {
            buyer_id,
            order_total: 100_000,
            is_first_paid_order: first,
        }
    }

    #[tokio::test]
    async fn test_first_order_pays_direct_referrer_only() {
        let store = chain(5);

        let outcome = distributor(&store)
            .distribute_order_commission_at(&order(5, true), now())
            .await
            .unwrap();

        assert_eq!(outcome.kind, DistributionKind::FirstOrder);
        let rows = store.payments();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].user_id, 4);
        assert_eq!(rows[0].amount, 8_200);
        assert_eq!(rows[0].reason, PaymentReason::Commission);
        assert_eq!(rows[0].status, PaymentStatus::Pending);
        assert!(rows.iter().all(|p| p.reason != PaymentReason::ResaleCommission));
    }

    #[tokio::test]
    async fn test_first_order_with_inactive_referrer_is_failed() {
        let store = chain(3);
        store.set_status(2, UserStatus::Inactive, now());

        distributor(&store)
            .distribute_order_commission_at(&order(3, true), now())
            .await
            .unwrap();

        let rows = store.payments_for(2);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].status, PaymentStatus::Failed);
        assert!(!rows[0].is_due(now() + chrono::Duration::days(2)));
    }

    #[tokio::test]
    async fn test_resale_pays_exactly_nine_levels() {
        let store = chain(12);

        let outcome = distributor(&store)
            .distribute_order_commission_at(&order(12, false), now())
            .await
            .unwrap();

        assert_eq!(outcome.kind, DistributionKind::Resale);
        assert_eq!(outcome.rows_created, 9);
        assert_eq!(outcome.total_amount, 9 * 820);

        let rows = store.payments();
        assert_eq!(rows.len(), 9);
        assert!(rows.iter().all(|p| p.amount == 820
            && p.reason == PaymentReason::ResaleCommission
            && p.status == PaymentStatus::Pending));
        let mut paid: Vec<i64> = rows.iter().map(|p| p.user_id).collect();
        paid.sort();
        assert_eq!(paid, (3..=11).collect::<Vec<_>>());
        assert!(rows.iter().all(|p| p.reason != PaymentReason::Commission));
    }

    #[tokio::test]
    async fn test_resale_stops_at_root() {
        let store = chain(4);

        let outcome = distributor(&store)
            .distribute_order_commission_at(&order(4, false), now())
            .await
            .unwrap();

        assert_eq!(outcome.rows_created, 3);
        assert_eq!(store.payments_for(1).len(), 1);
    }

    #[tokio::test]
    async fn test_resale_skipped_when_direct_referrer_inactive() {
        let store = chain(4);
        store.set_status(3, UserStatus::Inactive, now());

        let outcome = distributor(&store)
            .distribute_order_commission_at(&order(4, false), now())
            .await
            .unwrap();

        assert_eq!(outcome.kind, DistributionKind::Skipped);
        assert!(store.payments().is_empty());
    }

    #[tokio::test]
    async fn test_root_buyer_has_no_upline() {
        let store = chain(2);

        let outcome = distributor(&store)
            .distribute_order_commission_at(&order(1, true), now())
            .await
            .unwrap();

        assert_eq!(outcome.kind, DistributionKind::NoUpline);
        assert!(store.payments().is_empty());
    }

    #[tokio::test]
    async fn test_failure_mid_walk_keeps_lower_levels() {
        let store = chain(6);
        store.fail_writes_for(3);

        let err = distributor(&store)
            .distribute_order_commission_at(&order(6, false), now())
            .await
            .unwrap_err();

        assert!(matches!(err, CommissionError::DatabaseError(_)));
        let mut paid: Vec<i64> = store.payments().iter().map(|p| p.user_id).collect();
        paid.sort();
        assert_eq!(paid, vec![4, 5]);
    }

    #[tokio::test]
    async fn test_unknown_buyer_and_dangling_referrer() {
        let store = chain(2);
        store.add_user(10, "LOST", "NOBODY", UserStatus::Active);
        let distributor = distributor(&store);

        let missing = distributor.distribute_order_commission_at(&order(99, true), now()).await.unwrap_err();
        assert!(matches!(missing, CommissionError::BuyerNotFound(99)));

        let dangling = distributor.distribute_order_commission_at(&order(10, true), now()).await.unwrap_err();
        assert!(matches!(dangling, CommissionError::ReferrerNotFound(code) if code == "NOBODY"));
    }

    #[tokio::test]
    async fn test_non_positive_order_total_is_rejected() {
        let store = chain(3);
        let distributor = distributor(&store);

        for total in [0, -500] {
            let event = OrderPaidEvent { order_total: total, ..order(3, true) };
            let err = distributor.distribute_order_commission_at(&event, now()).await.unwrap_err();
            assert!(matches!(err, CommissionError::InvalidAmount(t) if t == total));
        }
        assert!(store.payments().is_empty());
    }
}
