//! Failed-login bookkeeping for the login flow.
//!
//! The session manager never consults this; the handlers that verify
//! credentials do, before they call `create_session`.

use anyhow::{Context, Result};
use chrono::{Duration as ChronoDuration, Utc};
use sqlx::PgPool;
use std::time::Duration;
use tracing::{info_span, Instrument};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RateLimitDecision {
    Allowed,
    Limited,
}

impl RateLimitDecision {
    #[must_use]
    pub fn is_allowed(self) -> bool {
        self == Self::Allowed
    }
}

fn decide(recent_failures: i64, max_attempts: u32) -> RateLimitDecision {
    if recent_failures < i64::from(max_attempts) {
        RateLimitDecision::Allowed
    } else {
        RateLimitDecision::Limited
    }
}

#[derive(Clone, Debug)]
pub struct RateLimitService {
    pool: PgPool,
}

impl RateLimitService {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Allowed while fewer than `max_attempts` failures were recorded for
    /// `identifier` within `window`.
    ///
    /// # Errors
    /// Returns an error if the attempts could not be counted.
    pub async fn check_rate_limit(
        &self,
        identifier: &str,
        max_attempts: u32,
        window: Duration,
    ) -> Result<RateLimitDecision> {
        let window = ChronoDuration::from_std(window).context("rate limit window out of range")?;
        let since = Utc::now() - window;

        let query = r"
            SELECT COUNT(*)
            FROM failed_login_attempts
            WHERE identifier = $1
              AND attempted_at > $2
        ";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let count: i64 = sqlx::query_scalar(query)
            .bind(identifier)
            .bind(since)
            .fetch_one(&self.pool)
            .instrument(span)
            .await
            .context("failed to check rate limit")?;

        Ok(decide(count, max_attempts))
    }

    /// # Errors
    /// Returns an error if the attempt could not be stored.
    pub async fn record_failed_attempt(&self, identifier: &str, ip_address: &str) -> Result<()> {
        let query = r"
            INSERT INTO failed_login_attempts (identifier, ip_address, attempted_at)
            VALUES ($1, $2, $3)
        ";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        sqlx::query(query)
            .bind(identifier)
            .bind(ip_address)
            .bind(Utc::now())
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to record failed login attempt")?;
        Ok(())
    }

    /// Forget past failures, typically after a successful login.
    ///
    /// # Errors
    /// Returns an error if the attempts could not be deleted.
    pub async fn clear_failed_attempts(&self, identifier: &str) -> Result<()> {
        let query = "DELETE FROM failed_login_attempts WHERE identifier = $1";
        let span = info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "DELETE",
            db.statement = query
        );
        sqlx::query(query)
            .bind(identifier)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to clear failed login attempts")?;
        Ok(())
    }
}
