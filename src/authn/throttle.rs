//! Database-backed login throttling keyed by source address.
//!
//! Flow:
//! 1) Every login or recovery attempt inserts one `login_attempts` row,
//!    pessimistically marked failed; `record_success` flips it only after
//!    the full credential + second-factor check passes.
//! 2) The window count and the insert run in a single transaction under a
//!    per-address advisory lock, so concurrent attempts from one address
//!    serialize and the threshold cannot be overshot.
//! 3) An address is locked out while it has `LOCKOUT_THRESHOLD` or more
//!    failed attempts inside the trailing `LOCKOUT_WINDOW`.
//!
//! Attempts with no derivable client address are still recorded (the log is
//! append-only) but are not subject to lockout.
//!
//! Scaling: the state lives in PostgreSQL, so the limit holds across
//! multiple service instances.

use anyhow::{Context, Result};
use sqlx::{PgPool, Postgres, Row, Transaction};
use std::time::Duration;
use tracing::Instrument;
use uuid::Uuid;

pub const LOCKOUT_WINDOW: Duration = Duration::from_secs(3 * 60 * 60);
pub const LOCKOUT_THRESHOLD: i64 = 4;

/// Outcome of the combined lockout check + attempt insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThrottleDecision {
    /// Proceed to credential evaluation; `attempt_id` names the pessimistic
    /// failure row to flip on success.
    Allowed { attempt_id: Uuid },
    /// The address is locked out; the attempt was still recorded.
    Limited,
}

#[derive(Debug, Clone)]
pub struct LoginThrottle {
    pool: PgPool,
}

impl LoginThrottle {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Check the lockout window and record this attempt atomically.
    ///
    /// # Errors
    /// Storage failures propagate; they are never converted into a lockout
    /// verdict.
    pub async fn register_attempt(&self, ip: Option<&str>) -> Result<ThrottleDecision> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("begin login attempt transaction")?;

        if let Some(ip) = ip {
            // Serializes all attempts from this address for the rest of the
            // transaction; released automatically at commit/rollback.
            let query = "SELECT pg_advisory_xact_lock(hashtext($1)::bigint)";
            let span = tracing::info_span!(
                "db.query",
                db.system = "postgresql",
                db.operation = "SELECT"
            );
            sqlx::query(query)
                .bind(ip)
                .execute(&mut *tx)
                .instrument(span)
                .await
                .context("failed to take per-address attempt lock")?;

            let failures = count_recent_failures(&mut tx, ip).await?;
            if failures >= LOCKOUT_THRESHOLD {
                // The rejected attempt still lands in the append-only log.
                insert_attempt(&mut tx, Some(ip)).await?;
                tx.commit()
                    .await
                    .context("commit throttled attempt")?;
                return Ok(ThrottleDecision::Limited);
            }
        }

        let attempt_id = insert_attempt(&mut tx, ip).await?;
        tx.commit().await.context("commit login attempt")?;

        Ok(ThrottleDecision::Allowed { attempt_id })
    }

    /// Flip the pessimistic failure row after full authentication succeeds.
    ///
    /// # Errors
    /// Returns an error on storage failure.
    pub async fn record_success(&self, attempt_id: Uuid) -> Result<()> {
        let query = "UPDATE login_attempts SET succeeded = TRUE WHERE id = $1";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE"
        );
        sqlx::query(query)
            .bind(attempt_id)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to record login success")?;
        Ok(())
    }
}

async fn count_recent_failures(tx: &mut Transaction<'_, Postgres>, ip: &str) -> Result<i64> {
    let query = "\
        SELECT COUNT(*) FROM login_attempts \
        WHERE ip_address = $1::inet \
          AND NOT succeeded \
          AND attempted_at > NOW() - $2::interval";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "SELECT"
    );
    let row = sqlx::query(query)
        .bind(ip)
        .bind(format!("{} seconds", LOCKOUT_WINDOW.as_secs()))
        .fetch_one(&mut **tx)
        .instrument(span)
        .await
        .context("failed to count recent login failures")?;
    Ok(row.get(0))
}

async fn insert_attempt(tx: &mut Transaction<'_, Postgres>, ip: Option<&str>) -> Result<Uuid> {
    let query = "\
        INSERT INTO login_attempts (ip_address, succeeded) \
        VALUES ($1::inet, FALSE) RETURNING id";
    let span = tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = "INSERT"
    );
    let row = sqlx::query(query)
        .bind(ip)
        .fetch_one(&mut **tx)
        .instrument(span)
        .await
        .context("failed to record login attempt")?;
    Ok(row.get(0))
}

#[cfg(test)]
mod tests {
    use super::{LOCKOUT_THRESHOLD, LOCKOUT_WINDOW, ThrottleDecision};
    use uuid::Uuid;

    #[test]
    fn lockout_parameters() {
        assert_eq!(LOCKOUT_THRESHOLD, 4);
        assert_eq!(LOCKOUT_WINDOW.as_secs(), 3 * 60 * 60);
    }

    #[test]
    fn decision_variants_compare() {
        let id = Uuid::nil();
        assert_eq!(
            ThrottleDecision::Allowed { attempt_id: id },
            ThrottleDecision::Allowed { attempt_id: id }
        );
        assert_ne!(
            ThrottleDecision::Allowed { attempt_id: id },
            ThrottleDecision::Limited
        );
    }
}
