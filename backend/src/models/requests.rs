//! # API Request Models
//!
//! Structures for incoming API request bodies.

use serde::{Deserialize, Serialize};

use crate::services::OrderPaidEvent;

/// Request to place a registered user in the referral tree.
///
/// ## Example JSON
///
/// ```json
/// {
///     "userId": 42,
///     "referredBy": "REF123"
/// }
/// ```
///
/// `referredBy` must match the code stored on the user.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaceUserRequest {
    pub user_id: i64,
    pub referred_by: String,
}

/// Notification that an order reached the paid state.
///
/// ## Example JSON
///
/// ```json
/// {
///     "buyerId": 42,
///     "orderTotal": 100000,
///     "isFirstPaidOrder": false
/// }
/// ```
///
/// ## Notes
///
/// - `orderTotal` is in paise, GST included
/// - 1 INR = 100 paise
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderPaidRequest {
    pub buyer_id: i64,
    pub order_total: i64,
    #[serde(default)]
    pub is_first_paid_order: bool,
}

impl From<OrderPaidRequest> for OrderPaidEvent {
    fn from(req: OrderPaidRequest) -> Self {
        OrderPaidEvent {
            buyer_id: req.buyer_id,
            order_total: req.order_total,
            is_first_paid_order: req.is_first_paid_order,
        }
    }
}
