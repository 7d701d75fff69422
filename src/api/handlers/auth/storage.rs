//! Database helpers for users and verification codes.
//!
//! Validity is decided at query time: every code lookup filters
//! `expires_at > NOW()`, so expired rows are unusable even before the
//! background sweeper physically deletes them.

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use std::time::Duration;
use tokio::time::sleep;
use tracing::{error, info, Instrument};
use uuid::Uuid;

use super::code::CodeKind;
use super::utils::{generate_referral_code, unique_violation_constraint};

const REFERRAL_CODE_INSERT_ATTEMPTS: u32 = 3;

#[derive(Clone, Debug)]
pub struct UserRecord {
    pub id: Uuid,
    pub email: String,
    pub is_verified: bool,
    pub referral_code: Option<String>,
    pub my_referral_code: String,
    pub last_login_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Outcome when attempting to create a new user.
#[derive(Debug)]
pub(super) enum InsertUserOutcome {
    Created(UserRecord),
    EmailTaken,
}

fn user_from_row(row: &sqlx::postgres::PgRow) -> UserRecord {
    UserRecord {
        id: row.get("id"),
        email: row.get("email"),
        is_verified: row.get("is_verified"),
        referral_code: row.get("referral_code"),
        my_referral_code: row.get("my_referral_code"),
        last_login_at: row.get("last_login_at"),
        created_at: row.get("created_at"),
    }
}

const USER_COLUMNS: &str =
    "id, email, is_verified, referral_code, my_referral_code, last_login_at, created_at";

pub(super) async fn insert_verification_code(
    pool: &PgPool,
    email: &str,
    code: &str,
    kind: CodeKind,
    expires_at: DateTime<Utc>,
) -> Result<()> {
    let query = r"
        INSERT INTO verification_codes (email, code, kind, expires_at)
        VALUES ($1, $2, $3, $4)
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT",
        db.statement = query
    );
    sqlx::query(query)
        .bind(email)
        .bind(code)
        .bind(kind.as_str())
        .bind(expires_at)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to insert verification code")?;
    Ok(())
}

/// Find an unexpired code matching `(email, code, kind)` exactly.
pub(super) async fn find_valid_code(
    pool: &PgPool,
    email: &str,
    code: &str,
    kind: CodeKind,
) -> Result<Option<Uuid>> {
    let query = r"
        SELECT id
        FROM verification_codes
        WHERE email = $1
          AND code = $2
          AND kind = $3
          AND expires_at > NOW()
        LIMIT 1
    ";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query
    );
    let row = sqlx::query(query)
        .bind(email)
        .bind(code)
        .bind(kind.as_str())
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to lookup verification code")?;
    Ok(row.map(|row| row.get("id")))
}

/// Delete every code for the email, any kind. Called after a successful
/// redeem so no outstanding code survives consumption.
pub(super) async fn delete_codes_for_email(pool: &PgPool, email: &str) -> Result<u64> {
    let query = "DELETE FROM verification_codes WHERE email = $1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "DELETE",
        db.statement = query
    );
    let result = sqlx::query(query)
        .bind(email)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to delete verification codes")?;
    Ok(result.rows_affected())
}

pub(super) async fn find_user_by_email(pool: &PgPool, email: &str) -> Result<Option<UserRecord>> {
    let query = format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1 LIMIT 1");
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query.as_str()
    );
    let row = sqlx::query(&query)
        .bind(email)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to lookup user by email")?;
    Ok(row.as_ref().map(user_from_row))
}

pub(super) async fn find_user_by_id(pool: &PgPool, id: Uuid) -> Result<Option<UserRecord>> {
    let query = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1 LIMIT 1");
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT",
        db.statement = query.as_str()
    );
    let row = sqlx::query(&query)
        .bind(id)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to lookup user by id")?;
    Ok(row.as_ref().map(user_from_row))
}

/// Create a user with a fresh unique referral code.
///
/// The referral code column has a unique constraint; collisions retry with a
/// new code. An email conflict is reported to the caller, it is a normal
/// signup race, not an error.
pub(super) async fn insert_user(
    pool: &PgPool,
    email: &str,
    referral_code: Option<&str>,
) -> Result<InsertUserOutcome> {
    let query = format!(
        r"
        INSERT INTO users (email, is_verified, referral_code, my_referral_code)
        VALUES ($1, TRUE, $2, $3)
        RETURNING {USER_COLUMNS}
    "
    );

    for _ in 0..REFERRAL_CODE_INSERT_ATTEMPTS {
        let my_referral_code = generate_referral_code();
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query.as_str()
        );
        let result = sqlx::query(&query)
            .bind(email)
            .bind(referral_code)
            .bind(&my_referral_code)
            .fetch_one(pool)
            .instrument(span)
            .await;

        match result {
            Ok(row) => return Ok(InsertUserOutcome::Created(user_from_row(&row))),
            Err(err) => match unique_violation_constraint(&err).as_deref() {
                Some("users_email_key") => return Ok(InsertUserOutcome::EmailTaken),
                Some("users_my_referral_code_key") => {}
                _ => return Err(err).context("failed to insert user"),
            },
        }
    }

    Err(anyhow!("failed to generate unique referral code"))
}

/// Stamp `last_login_at` and return the fresh record.
pub(super) async fn touch_last_login(pool: &PgPool, id: Uuid) -> Result<Option<UserRecord>> {
    let query = format!(
        r"
        UPDATE users
        SET last_login_at = NOW()
        WHERE id = $1
        RETURNING {USER_COLUMNS}
    "
    );
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE",
        db.statement = query.as_str()
    );
    let row = sqlx::query(&query)
        .bind(id)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to update last login")?;
    Ok(row.as_ref().map(user_from_row))
}

pub(super) async fn delete_expired_codes(pool: &PgPool) -> Result<u64> {
    let query = "DELETE FROM verification_codes WHERE expires_at <= NOW()";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "DELETE",
        db.statement = query
    );
    let result = sqlx::query(query)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to delete expired verification codes")?;
    Ok(result.rows_affected())
}

/// Spawn a background task that physically deletes expired codes.
pub fn spawn_expiry_sweeper(pool: PgPool, poll_interval: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match delete_expired_codes(&pool).await {
                Ok(0) => {}
                Ok(deleted) => info!(deleted, "swept expired verification codes"),
                Err(err) => error!("verification code sweep failed: {err}"),
            }

            sleep(poll_interval).await;
        }
    })
}
