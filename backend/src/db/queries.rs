//! # Database Queries
//!
//! This module contains all the SQL queries for interacting with the database.
//! Each function performs a specific database operation.
//!
//! ## Query Organization
//!
//! Queries are grouped by the table they operate on:
//! - `user_*` style functions - `users` table
//! - commission functions - `refer_payments` table
//! - `claim_monthly_run` - `settlement_runs` table
//!
//! ## Error Handling
//!
//! All queries return `Result<T, DatabaseError>`. Common errors:
//! - `NotFound` - Record doesn't exist
//! - `QueryError` - SQL execution failed
//! - `DecodeError` - A status/reason column held an unknown value

use chrono::{DateTime, Utc};
use deadpool_postgres::{Object, Pool};
use tokio_postgres::Row;
use tracing::{debug, info};
use uuid::Uuid;

use super::models::*;
use super::DatabaseError;

const USER_COLUMNS: &str = r#"
    id, name, referral_code, referred_by, status, is_enabled,
    left_count, right_count, total_income, total_withdrawn,
    status_changed_at, created_at
"#;

const PAYMENT_COLUMNS: &str = r#"
    id, user_id, user_name, status, reason, amount, created_at, receive_at
"#;

// ============================================
// HELPER FUNCTIONS
// ============================================

async fn connection(pool: &Pool) -> Result<Object, DatabaseError> {
    pool.get()
        .await
        .map_err(|e| DatabaseError::ConnectionError(e.to_string()))
}

fn decode<T: std::str::FromStr<Err = String>>(row: &Row, column: &str) -> Result<T, DatabaseError> {
    let raw: String = row.get(column);
    raw.parse().map_err(DatabaseError::DecodeError)
}

/// Helper to convert a database row to UserRecord
fn row_to_user(row: &Row) -> Result<UserRecord, DatabaseError> {
    Ok(UserRecord {
        id: row.get("id"),
        name: row.get("name"),
        referral_code: row.get("referral_code"),
        referred_by: row.get("referred_by"),
        status: decode(row, "status")?,
        is_enabled: row.get("is_enabled"),
        left_count: row.get("left_count"),
        right_count: row.get("right_count"),
        total_income: row.get("total_income"),
        total_withdrawn: row.get("total_withdrawn"),
        status_changed_at: row.get("status_changed_at"),
        created_at: row.get("created_at"),
    })
}

/// Helper to convert a database row to CommissionPayment
fn row_to_payment(row: &Row) -> Result<CommissionPayment, DatabaseError> {
    Ok(CommissionPayment {
        id: row.get("id"),
        user_id: row.get("user_id"),
        user_name: row.get("user_name"),
        status: decode(row, "status")?,
        reason: decode(row, "reason")?,
        amount: row.get("amount"),
        created_at: row.get("created_at"),
        receive_at: row.get("receive_at"),
    })
}

// ============================================
// USER QUERIES
// ============================================

/// Every user in insertion (primary key) order.
pub async fn get_all_users(pool: &Pool) -> Result<Vec<UserRecord>, DatabaseError> {
    let client = connection(pool).await?;

    let rows = client
        .query(
            &format!("SELECT {} FROM users ORDER BY id ASC", USER_COLUMNS),
            &[],
        )
        .await?;

    debug!("Loaded {} users", rows.len());
    rows.iter().map(row_to_user).collect()
}

/// Get a user by primary key.
pub async fn get_user_by_id(pool: &Pool, id: i64) -> Result<Option<UserRecord>, DatabaseError> {
    let client = connection(pool).await?;

    let row = client
        .query_opt(
            &format!("SELECT {} FROM users WHERE id = $1", USER_COLUMNS),
            &[&id],
        )
        .await?;

    row.as_ref().map(row_to_user).transpose()
}

/// Get a user by referral code.
pub async fn get_user_by_referral_code(
    pool: &Pool,
    code: &str,
) -> Result<Option<UserRecord>, DatabaseError> {
    let client = connection(pool).await?;

    let row = client
        .query_opt(
            &format!("SELECT {} FROM users WHERE referral_code = $1", USER_COLUMNS),
            &[&code],
        )
        .await?;

    row.as_ref().map(row_to_user).transpose()
}

/// Persist the left/right subtree counts computed by a pairing run.
pub async fn update_pair_counts(
    pool: &Pool,
    id: i64,
    left_count: i64,
    right_count: i64,
) -> Result<(), DatabaseError> {
    let client = connection(pool).await?;

    let rows_affected = client
        .execute(
            "UPDATE users SET left_count = $2, right_count = $3 WHERE id = $1",
            &[&id, &left_count, &right_count],
        )
        .await?;

    if rows_affected == 0 {
        return Err(DatabaseError::NotFound(format!("User not found: {}", id)));
    }

    Ok(())
}

/// Count active users whose `referred_by` is `code`, excluding a root
/// that refers to itself.
pub async fn count_direct_active_referrals(pool: &Pool, code: &str) -> Result<i64, DatabaseError> {
    let client = connection(pool).await?;

    let row = client
        .query_one(
            r#"
            SELECT COUNT(*) AS count
            FROM users
            WHERE referred_by = $1
              AND referral_code <> $1
              AND status = 'active'
            "#,
            &[&code],
        )
        .await?;

    Ok(row.get("count"))
}

/// Number of active users.
pub async fn count_active_users(pool: &Pool) -> Result<i64, DatabaseError> {
    let client = connection(pool).await?;

    let row = client
        .query_one(
            "SELECT COUNT(*) AS count FROM users WHERE status = 'active'",
            &[],
        )
        .await?;

    Ok(row.get("count"))
}

/// Add `amount` paise to a user's `total_income`.
pub async fn credit_income(pool: &Pool, id: i64, amount: i64) -> Result<(), DatabaseError> {
    let client = connection(pool).await?;

    let rows_affected = client
        .execute(
            "UPDATE users SET total_income = total_income + $2 WHERE id = $1",
            &[&id, &amount],
        )
        .await?;

    if rows_affected == 0 {
        return Err(DatabaseError::NotFound(format!("User not found: {}", id)));
    }

    Ok(())
}

/// Disable users that have been inactive since before `cutoff`.
///
/// Returns how many users were switched off.
pub async fn disable_inactive_users(
    pool: &Pool,
    cutoff: DateTime<Utc>,
) -> Result<u64, DatabaseError> {
    let client = connection(pool).await?;

    let rows_affected = client
        .execute(
            r#"
            UPDATE users
            SET is_enabled = FALSE
            WHERE status = 'inactive'
              AND is_enabled
              AND status_changed_at < $1
            "#,
            &[&cutoff],
        )
        .await?;

    Ok(rows_affected)
}

// ============================================
// COMMISSION QUERIES
// ============================================

/// Record a new commission row.
pub async fn insert_commission_payment(
    pool: &Pool,
    payment: &CommissionPayment,
) -> Result<Uuid, DatabaseError> {
    debug!(
        "Creating {} payment of {} for user {}",
        payment.reason, payment.amount, payment.user_id
    );

    let client = connection(pool).await?;

    client
        .execute(
            r#"
            INSERT INTO refer_payments (
                id, user_id, user_name, status, reason,
                amount, created_at, receive_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
            &[
                &payment.id,
                &payment.user_id,
                &payment.user_name,
                &payment.status.as_str(),
                &payment.reason.as_str(),
                &payment.amount,
                &payment.created_at,
                &payment.receive_at,
            ],
        )
        .await?;

    Ok(payment.id)
}

/// Pending `refer` rows created for a user since `since`.
pub async fn count_pending_refer_since(
    pool: &Pool,
    user_id: i64,
    since: DateTime<Utc>,
) -> Result<i64, DatabaseError> {
    let client = connection(pool).await?;

    let row = client
        .query_one(
            r#"
            SELECT COUNT(*) AS count
            FROM refer_payments
            WHERE user_id = $1
              AND reason = 'refer'
              AND status = 'pending'
              AND created_at >= $2
            "#,
            &[&user_id, &since],
        )
        .await?;

    Ok(row.get("count"))
}

/// `refer` rows of a user that are `pending` or `done`.
///
/// `exceeded` and `failed` rows are not counted, so a pair throttled
/// today is scheduled again on a later run.
pub async fn count_pending_or_done_refer_payments(
    pool: &Pool,
    user_id: i64,
) -> Result<i64, DatabaseError> {
    let client = connection(pool).await?;

    let row = client
        .query_one(
            r#"
            SELECT COUNT(*) AS count
            FROM refer_payments
            WHERE user_id = $1
              AND reason = 'refer'
              AND status IN ('pending', 'done')
            "#,
            &[&user_id],
        )
        .await?;

    Ok(row.get("count"))
}

/// Pending rows whose `receive_at` has passed.
pub async fn list_pending_due(
    pool: &Pool,
    now: DateTime<Utc>,
) -> Result<Vec<CommissionPayment>, DatabaseError> {
    let client = connection(pool).await?;

    let rows = client
        .query(
            &format!(
                r#"
                SELECT {}
                FROM refer_payments
                WHERE status = 'pending' AND receive_at <= $1
                ORDER BY receive_at ASC, created_at ASC
                "#,
                PAYMENT_COLUMNS
            ),
            &[&now],
        )
        .await?;

    rows.iter().map(row_to_payment).collect()
}

/// Mark one due row `done` and credit its beneficiary, in one transaction.
///
/// Returns `Ok(false)` when the row is no longer pending (another sweep
/// got there first) so it is never credited twice.
pub async fn mature_commission(
    pool: &Pool,
    id: Uuid,
    now: DateTime<Utc>,
) -> Result<bool, DatabaseError> {
    let mut client = connection(pool).await?;
    let tx = client.transaction().await?;

    let row = tx
        .query_opt(
            r#"
            UPDATE refer_payments
            SET status = 'done'
            WHERE id = $1 AND status = 'pending' AND receive_at <= $2
            RETURNING user_id, amount
            "#,
            &[&id, &now],
        )
        .await?;

    let Some(row) = row else {
        tx.rollback().await?;
        return Ok(false);
    };

    let user_id: i64 = row.get("user_id");
    let amount: i64 = row.get("amount");

    let credited = tx
        .execute(
            "UPDATE users SET total_income = total_income + $2 WHERE id = $1",
            &[&user_id, &amount],
        )
        .await?;

    if credited == 0 {
        tx.rollback().await?;
        return Err(DatabaseError::NotFound(format!("User not found: {}", user_id)));
    }

    tx.commit().await?;
    Ok(true)
}

// ============================================
// SETTLEMENT QUERIES
// ============================================

/// Claim the monthly distribution for `run.month_key`.
///
/// Returns `Ok(true)` only for the first claim of a month.
pub async fn claim_monthly_run(pool: &Pool, run: &SettlementRun) -> Result<bool, DatabaseError> {
    let client = connection(pool).await?;

    let inserted = client
        .execute(
            r#"
            INSERT INTO settlement_runs (month_key, pool_amount, active_users, executed_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (month_key) DO NOTHING
            "#,
            &[&run.month_key, &run.pool_amount, &run.active_users, &run.executed_at],
        )
        .await?;

    if inserted == 1 {
        info!("Claimed monthly settlement for {}", run.month_key);
    }

    Ok(inserted == 1)
}
