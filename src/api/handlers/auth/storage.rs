//! Database helpers for households, users, sessions, and backup codes.
//!
//! Multi-row writes (account creation, code redemption + secret rotation)
//! run inside transactions so partial failure never leaves an orphaned
//! household or a redeemed-but-unrotated account.

use anyhow::{Context, Result, anyhow};
use chrono::NaiveDate;
use sqlx::{PgPool, Postgres, Row, Transaction, postgres::PgRow};
use tracing::Instrument;
use uuid::Uuid;

use super::utils::{generate_session_token, hash_session_token, is_unique_violation};

/// Outcome of an account-creation transaction. Conflicts (duplicate user or
/// household name) are reported generically by the handlers.
#[derive(Debug)]
pub(super) enum CreationOutcome {
    Created(UserRecord),
    Conflict,
}

/// Full user row as stored. Handlers project this into `UserResponse`;
/// the hash and secret never leave the process.
#[derive(Debug, Clone)]
pub(crate) struct UserRecord {
    pub id: Uuid,
    pub user_name: String,
    pub password_hash: String,
    pub is_admin: bool,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub date_of_birth: NaiveDate,
    pub totp_secret: String,
    pub household_id: Uuid,
}

pub(super) struct HouseholdRecord {
    pub id: Uuid,
    pub admission_key_hash: String,
}

/// Fields for a user insert; hashes and secrets are prepared by the caller.
pub(super) struct NewUser<'a> {
    pub user_name: &'a str,
    pub password_hash: &'a str,
    pub is_admin: bool,
    pub first_name: &'a str,
    pub last_name: &'a str,
    pub email: &'a str,
    pub date_of_birth: NaiveDate,
    pub totp_secret: &'a str,
}

pub(super) struct SessionRecord {
    pub user_id: Uuid,
}

const USER_COLUMNS: &str = "\
    id, user_name, password_hash, is_admin, first_name, last_name, email, \
    date_of_birth, totp_secret, household_id";

fn user_from_row(row: &PgRow) -> UserRecord {
    UserRecord {
        id: row.get("id"),
        user_name: row.get("user_name"),
        password_hash: row.get("password_hash"),
        is_admin: row.get("is_admin"),
        first_name: row.get("first_name"),
        last_name: row.get("last_name"),
        email: row.get("email"),
        date_of_birth: row.get("date_of_birth"),
        totp_secret: row.get("totp_secret"),
        household_id: row.get("household_id"),
    }
}

pub(super) async fn lookup_user_by_name(
    pool: &PgPool,
    user_name: &str,
) -> Result<Option<UserRecord>> {
    let query = format!("SELECT {USER_COLUMNS} FROM users WHERE user_name = $1");
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT"
    );
    let row = sqlx::query(&query)
        .bind(user_name)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to lookup user by name")?;
    Ok(row.as_ref().map(user_from_row))
}

pub(super) async fn fetch_user_by_id(pool: &PgPool, user_id: Uuid) -> Result<Option<UserRecord>> {
    let query = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT"
    );
    let row = sqlx::query(&query)
        .bind(user_id)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to fetch user by id")?;
    Ok(row.as_ref().map(user_from_row))
}

/// Resolve a household by name for member creation. The caller verifies the
/// admission key against the stored hash; a miss here and a key mismatch are
/// reported identically.
pub(super) async fn lookup_household(
    pool: &PgPool,
    name: &str,
) -> Result<Option<HouseholdRecord>> {
    let query = "SELECT id, admission_key_hash FROM households WHERE name = $1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT"
    );
    let row = sqlx::query(query)
        .bind(name)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to lookup household")?;
    Ok(row.map(|row| HouseholdRecord {
        id: row.get("id"),
        admission_key_hash: row.get("admission_key_hash"),
    }))
}

/// Create a household, its admin user, and the backup-code batch as one
/// atomic unit.
pub(super) async fn create_household_with_admin(
    pool: &PgPool,
    household_name: &str,
    admission_key_hash: &str,
    user: &NewUser<'_>,
    code_digests: &[Vec<u8>],
) -> Result<CreationOutcome> {
    let mut tx = pool.begin().await.context("begin account transaction")?;

    let query = "INSERT INTO households (name, admission_key_hash) VALUES ($1, $2) RETURNING id";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT"
    );
    let row = sqlx::query(query)
        .bind(household_name)
        .bind(admission_key_hash)
        .fetch_one(&mut *tx)
        .instrument(span)
        .await;

    let household_id: Uuid = match row {
        Ok(row) => row.get("id"),
        Err(err) if is_unique_violation(&err) => {
            let _ = tx.rollback().await;
            return Ok(CreationOutcome::Conflict);
        }
        Err(err) => return Err(err).context("failed to insert household"),
    };

    let Some(user) = insert_user(&mut tx, household_id, user).await? else {
        let _ = tx.rollback().await;
        return Ok(CreationOutcome::Conflict);
    };
    insert_backup_codes(&mut tx, user.id, code_digests).await?;

    tx.commit().await.context("commit account transaction")?;
    Ok(CreationOutcome::Created(user))
}

/// Create a member of an existing household plus their backup-code batch.
pub(super) async fn create_member(
    pool: &PgPool,
    household_id: Uuid,
    user: &NewUser<'_>,
    code_digests: &[Vec<u8>],
) -> Result<CreationOutcome> {
    let mut tx = pool.begin().await.context("begin member transaction")?;

    let Some(user) = insert_user(&mut tx, household_id, user).await? else {
        let _ = tx.rollback().await;
        return Ok(CreationOutcome::Conflict);
    };
    insert_backup_codes(&mut tx, user.id, code_digests).await?;

    tx.commit().await.context("commit member transaction")?;
    Ok(CreationOutcome::Created(user))
}

/// Insert a user row; `None` signals a user-name conflict.
async fn insert_user(
    tx: &mut Transaction<'_, Postgres>,
    household_id: Uuid,
    user: &NewUser<'_>,
) -> Result<Option<UserRecord>> {
    let query = format!(
        "\
        INSERT INTO users \
            (user_name, password_hash, is_admin, first_name, last_name, \
             email, date_of_birth, totp_secret, household_id) \
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
        RETURNING {USER_COLUMNS}"
    );
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT"
    );
    let row = sqlx::query(&query)
        .bind(user.user_name)
        .bind(user.password_hash)
        .bind(user.is_admin)
        .bind(user.first_name)
        .bind(user.last_name)
        .bind(user.email)
        .bind(user.date_of_birth)
        .bind(user.totp_secret)
        .bind(household_id)
        .fetch_one(&mut **tx)
        .instrument(span)
        .await;

    match row {
        Ok(row) => Ok(Some(user_from_row(&row))),
        Err(err) if is_unique_violation(&err) => Ok(None),
        Err(err) => Err(err).context("failed to insert user"),
    }
}

async fn insert_backup_codes(
    tx: &mut Transaction<'_, Postgres>,
    user_id: Uuid,
    code_digests: &[Vec<u8>],
) -> Result<()> {
    let query = "INSERT INTO backup_codes (user_id, code_hash) VALUES ($1, $2)";
    for digest in code_digests {
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT"
        );
        sqlx::query(query)
            .bind(user_id)
            .bind(digest.as_slice())
            .execute(&mut **tx)
            .instrument(span)
            .await
            .context("failed to insert backup code")?;
    }
    Ok(())
}

/// Atomically redeem an unused backup code for this user. Returns the code
/// row id, or `None` when the digest is unknown or the code is already
/// spent; callers must not distinguish those two outcomes.
pub(super) async fn redeem_backup_code(
    tx: &mut Transaction<'_, Postgres>,
    user_id: Uuid,
    code_digest: &[u8],
) -> Result<Option<Uuid>> {
    let query = "\
        UPDATE backup_codes \
        SET used_at = NOW() \
        WHERE code_hash = $1 \
          AND user_id = $2 \
          AND used_at IS NULL \
        RETURNING id";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE"
    );
    let row = sqlx::query(query)
        .bind(code_digest)
        .bind(user_id)
        .fetch_optional(&mut **tx)
        .instrument(span)
        .await
        .context("failed to redeem backup code")?;
    Ok(row.map(|row| row.get("id")))
}

pub(super) async fn count_unused_backup_codes(
    tx: &mut Transaction<'_, Postgres>,
    user_id: Uuid,
) -> Result<i64> {
    let query = "SELECT COUNT(*) FROM backup_codes WHERE user_id = $1 AND used_at IS NULL";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT"
    );
    let row = sqlx::query(query)
        .bind(user_id)
        .fetch_one(&mut **tx)
        .instrument(span)
        .await
        .context("failed to count unused backup codes")?;
    Ok(row.get(0))
}

/// Replace the TOTP secret, forcing authenticator re-enrollment.
pub(super) async fn rotate_totp_secret(
    tx: &mut Transaction<'_, Postgres>,
    user_id: Uuid,
    new_secret: &str,
) -> Result<()> {
    let query = "UPDATE users SET totp_secret = $2, updated_at = NOW() WHERE id = $1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE"
    );
    sqlx::query(query)
        .bind(user_id)
        .bind(new_secret)
        .execute(&mut **tx)
        .instrument(span)
        .await
        .context("failed to rotate TOTP secret")?;
    Ok(())
}

/// Create a session row and return the raw token for the cookie. Only the
/// token's digest is stored; retries cover the (vanishing) chance of a
/// digest collision.
pub(super) async fn insert_session(
    pool: &PgPool,
    user_id: Uuid,
    ttl_seconds: i64,
) -> Result<String> {
    let query = "\
        INSERT INTO user_sessions (session_hash, user_id, expires_at) \
        VALUES ($1, $2, NOW() + ($3 * INTERVAL '1 second'))";

    for _ in 0..3 {
        let token = generate_session_token()?;
        let token_hash = hash_session_token(&token);
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT"
        );
        let result = sqlx::query(query)
            .bind(token_hash)
            .bind(user_id)
            .bind(ttl_seconds)
            .execute(pool)
            .instrument(span)
            .await;

        match result {
            Ok(_) => return Ok(token),
            Err(err) if is_unique_violation(&err) => {}
            Err(err) => return Err(err).context("failed to insert session"),
        }
    }

    Err(anyhow!("failed to generate unique session token"))
}

/// Resolve a session digest to its user, touching `last_seen_at` without
/// extending the TTL. Expired sessions resolve to `None`.
pub(super) async fn lookup_session(
    pool: &PgPool,
    token_hash: &[u8],
) -> Result<Option<SessionRecord>> {
    let query = "\
        SELECT user_id FROM user_sessions \
        WHERE session_hash = $1 AND expires_at > NOW()";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT"
    );
    let row = sqlx::query(query)
        .bind(token_hash)
        .fetch_optional(pool)
        .instrument(span)
        .await
        .context("failed to lookup session")?;

    let Some(row) = row else {
        return Ok(None);
    };

    let query = "UPDATE user_sessions SET last_seen_at = NOW() WHERE session_hash = $1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "UPDATE"
    );
    sqlx::query(query)
        .bind(token_hash)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to update session last_seen_at")?;

    Ok(Some(SessionRecord {
        user_id: row.get("user_id"),
    }))
}

/// Delete a session row; logout is idempotent, so zero rows is fine.
pub(super) async fn delete_session(pool: &PgPool, token_hash: &[u8]) -> Result<()> {
    let query = "DELETE FROM user_sessions WHERE session_hash = $1";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "DELETE"
    );
    sqlx::query(query)
        .bind(token_hash)
        .execute(pool)
        .instrument(span)
        .await
        .context("failed to delete session")?;
    Ok(())
}
