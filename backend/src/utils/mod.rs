//! # Utilities Module
//!
//! Money and business-calendar helpers shared by the services.
//!
//! All amounts are integer paise (1 INR = 100). Percentages are expressed
//! in basis points so every calculation stays in integer arithmetic.

use chrono::{DateTime, Duration, FixedOffset, Months, NaiveTime, Utc};

/// Basis points in 100%.
pub const FULL_BPS: i64 = 10_000;

/// Share of an order total left after removing 18% GST.
pub const NET_OF_GST_BPS: i64 = 8_200;

/// Apply a basis-point rate to an amount, rounding toward zero.
///
/// ```rust,ignore
/// assert_eq!(apply_bps(100_000, 8_200), 82_000);
/// ```
pub fn apply_bps(amount: i64, bps: i64) -> i64 {
    let scaled = i128::from(amount) * i128::from(bps) / i128::from(FULL_BPS);
    i64::try_from(scaled).unwrap_or(if scaled.is_negative() { i64::MIN } else { i64::MAX })
}

/// Order total with GST removed.
pub fn net_of_gst(order_total: i64) -> i64 {
    apply_bps(order_total, NET_OF_GST_BPS)
}

/// Format a paise amount as human-readable rupees.
///
/// ## Examples
///
/// ```rust,ignore
/// assert_eq!(format_inr(100), "1.00 INR");
/// assert_eq!(format_inr(123_456_789), "1,234,567.89 INR");
/// ```
pub fn format_inr(amount: i64) -> String {
    let sign = if amount < 0 { "-" } else { "" };
    let abs = amount.unsigned_abs();
    let whole = (abs / 100).to_string();
    let frac = abs % 100;

    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, c) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }

    format!("{}{}.{:02} INR", sign, grouped, frac)
}

/// Start of the business day containing `now`, as a UTC instant.
pub fn start_of_day(now: DateTime<Utc>, offset: FixedOffset) -> DateTime<Utc> {
    let local_midnight = now
        .with_timezone(&offset)
        .date_naive()
        .and_time(NaiveTime::MIN);
    let utc_naive = local_midnight - Duration::seconds(i64::from(offset.local_minus_utc()));
    DateTime::from_naive_utc_and_offset(utc_naive, Utc)
}

/// 23:59:59 of the business day containing `now`.
///
/// Commission rows created during a day all mature at this instant.
pub fn end_of_day(now: DateTime<Utc>, offset: FixedOffset) -> DateTime<Utc> {
    start_of_day(now, offset) + Duration::seconds(86_399)
}

/// Calendar month key (`YYYY-MM`) of `now` in business time.
pub fn month_key(now: DateTime<Utc>, offset: FixedOffset) -> String {
    now.with_timezone(&offset).format("%Y-%m").to_string()
}

/// The instant one calendar month before `now`.
pub fn one_month_before(now: DateTime<Utc>) -> DateTime<Utc> {
    now.checked_sub_months(Months::new(1))
        .unwrap_or_else(|| now - Duration::days(30))
}
