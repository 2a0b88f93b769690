//! PostgreSQL implementation of [`SessionStore`].

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgRow, PgPool, Row};
use tracing::{Instrument, Span};
use uuid::Uuid;

use super::store::{RefreshToken, Rotation, Session, SessionStore};

const SESSION_COLUMNS: &str =
    "id, user_id, tenant, created_at, last_seen_at, revoked_at, user_agent_hash, ip_hash";

fn query_span(operation: &'static str, statement: &str) -> Span {
    tracing::info_span!(
        "db.query",
        db.system = "postgresql",
        db.operation = operation,
        db.statement = statement
    )
}

fn session_from_row(row: &PgRow) -> Result<Session, sqlx::Error> {
    Ok(Session {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        tenant: row.try_get("tenant")?,
        created_at: row.try_get("created_at")?,
        last_seen_at: row.try_get("last_seen_at")?,
        revoked_at: row.try_get("revoked_at")?,
        user_agent_hash: row.try_get("user_agent_hash")?,
        ip_hash: row.try_get("ip_hash")?,
    })
}

fn refresh_token_from_row(row: &PgRow) -> Result<RefreshToken, sqlx::Error> {
    Ok(RefreshToken {
        id: row.try_get("id")?,
        session_id: row.try_get("session_id")?,
        token_hash: row.try_get("token_hash")?,
        rotated_from: row.try_get("rotated_from")?,
        expires_at: row.try_get("expires_at")?,
        revoked_at: row.try_get("revoked_at")?,
        created_at: row.try_get("created_at")?,
    })
}

async fn insert_refresh_token(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    token: &RefreshToken,
) -> Result<()> {
    let query = r"
        INSERT INTO refresh_tokens
            (id, session_id, token_hash, rotated_from, expires_at, created_at)
        VALUES ($1, $2, $3, $4, $5, $6)
    ";
    sqlx::query(query)
        .bind(token.id)
        .bind(&token.session_id)
        .bind(&token.token_hash)
        .bind(token.rotated_from)
        .bind(token.expires_at)
        .bind(token.created_at)
        .execute(&mut **tx)
        .instrument(query_span("INSERT", query))
        .await
        .context("failed to insert refresh token")?;
    Ok(())
}

async fn revoke_tokens_of_sessions(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    session_ids: &[String],
    now: DateTime<Utc>,
) -> Result<u64> {
    let query = r"
        UPDATE refresh_tokens
        SET revoked_at = $2
        WHERE session_id = ANY($1)
          AND revoked_at IS NULL
    ";
    let result = sqlx::query(query)
        .bind(session_ids)
        .bind(now)
        .execute(&mut **tx)
        .instrument(query_span("UPDATE", query))
        .await
        .context("failed to revoke refresh tokens")?;
    Ok(result.rows_affected())
}

/// Session store backed by the shared connection pool.
#[derive(Clone, Debug)]
pub struct PgSessionStore {
    pool: PgPool,
}

impl PgSessionStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionStore for PgSessionStore {
    async fn insert_session(&self, session: &Session, token: &RefreshToken) -> Result<()> {
        // Both rows or neither: a session without a refresh token is unusable.
        let mut tx = self
            .pool
            .begin()
            .await
            .context("begin create session transaction")?;

        let query = r"
            INSERT INTO sessions
                (id, user_id, tenant, created_at, last_seen_at, user_agent_hash, ip_hash)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
        ";
        sqlx::query(query)
            .bind(&session.id)
            .bind(&session.user_id)
            .bind(&session.tenant)
            .bind(session.created_at)
            .bind(session.last_seen_at)
            .bind(&session.user_agent_hash)
            .bind(&session.ip_hash)
            .execute(&mut *tx)
            .instrument(query_span("INSERT", query))
            .await
            .context("failed to insert session")?;

        insert_refresh_token(&mut tx, token).await?;

        tx.commit()
            .await
            .context("commit create session transaction")?;
        Ok(())
    }

    async fn find_active_session(&self, session_id: &str) -> Result<Option<Session>> {
        let query = format!(
            "SELECT {SESSION_COLUMNS} FROM sessions WHERE id = $1 AND revoked_at IS NULL"
        );
        let row = sqlx::query(&query)
            .bind(session_id)
            .fetch_optional(&self.pool)
            .instrument(query_span("SELECT", &query))
            .await
            .context("failed to lookup session")?;

        row.as_ref()
            .map(session_from_row)
            .transpose()
            .context("failed to decode session row")
    }

    async fn touch_session(&self, session_id: &str, seen_at: DateTime<Utc>) -> Result<()> {
        let query = r"
            UPDATE sessions
            SET last_seen_at = GREATEST(last_seen_at, $2)
            WHERE id = $1
              AND revoked_at IS NULL
        ";
        sqlx::query(query)
            .bind(session_id)
            .bind(seen_at)
            .execute(&self.pool)
            .instrument(query_span("UPDATE", query))
            .await
            .context("failed to update session last_seen_at")?;
        Ok(())
    }

    async fn find_unexpired_refresh_token(
        &self,
        token_hash: &[u8],
        now: DateTime<Utc>,
    ) -> Result<Option<RefreshToken>> {
        // Revoked rows are returned on purpose: that is how reuse is detected.
        let query = r"
            SELECT id, session_id, token_hash, rotated_from, expires_at, revoked_at, created_at
            FROM refresh_tokens
            WHERE token_hash = $1
              AND expires_at > $2
            LIMIT 1
        ";
        let row = sqlx::query(query)
            .bind(token_hash)
            .bind(now)
            .fetch_optional(&self.pool)
            .instrument(query_span("SELECT", query))
            .await
            .context("failed to lookup refresh token")?;

        row.as_ref()
            .map(refresh_token_from_row)
            .transpose()
            .context("failed to decode refresh token row")
    }

    async fn rotate_refresh_token(
        &self,
        presented_id: Uuid,
        successor: &RefreshToken,
        now: DateTime<Utc>,
    ) -> Result<Rotation> {
        // A concurrent rotation of the same row blocks on the row lock and then
        // re-checks the predicate, so exactly one caller sees a row affected.
        let mut tx = self
            .pool
            .begin()
            .await
            .context("begin rotation transaction")?;

        let query = r"
            UPDATE refresh_tokens
            SET revoked_at = $2
            WHERE id = $1
              AND revoked_at IS NULL
              AND expires_at > $2
        ";
        let result = sqlx::query(query)
            .bind(presented_id)
            .bind(now)
            .execute(&mut *tx)
            .instrument(query_span("UPDATE", query))
            .await
            .context("failed to revoke presented refresh token")?;

        if result.rows_affected() == 0 {
            tx.rollback()
                .await
                .context("rollback rotation transaction")?;
            return Ok(Rotation::AlreadyConsumed);
        }

        insert_refresh_token(&mut tx, successor).await?;

        tx.commit().await.context("commit rotation transaction")?;
        Ok(Rotation::Rotated)
    }

    async fn revoke_session(&self, session_id: &str, now: DateTime<Utc>) -> Result<bool> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("begin revoke session transaction")?;

        let query = r"
            UPDATE sessions
            SET revoked_at = $2
            WHERE id = $1
              AND revoked_at IS NULL
        ";
        let result = sqlx::query(query)
            .bind(session_id)
            .bind(now)
            .execute(&mut *tx)
            .instrument(query_span("UPDATE", query))
            .await
            .context("failed to revoke session")?;

        // Tokens are swept even when the session was already revoked, so a
        // half-applied earlier revoke converges.
        revoke_tokens_of_sessions(&mut tx, &[session_id.to_string()], now).await?;

        tx.commit()
            .await
            .context("commit revoke session transaction")?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_active_sessions(&self, user_id: &str) -> Result<Vec<Session>> {
        let query = format!(
            "SELECT {SESSION_COLUMNS} FROM sessions \
             WHERE user_id = $1 AND revoked_at IS NULL \
             ORDER BY created_at DESC"
        );
        let rows = sqlx::query(&query)
            .bind(user_id)
            .fetch_all(&self.pool)
            .instrument(query_span("SELECT", &query))
            .await
            .context("failed to list sessions")?;

        rows.iter()
            .map(session_from_row)
            .collect::<Result<Vec<_>, _>>()
            .context("failed to decode session row")
    }

    async fn revoke_idle_sessions(
        &self,
        cutoff: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<u64> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("begin idle session sweep")?;

        let query = r"
            UPDATE sessions
            SET revoked_at = $2
            WHERE revoked_at IS NULL
              AND last_seen_at < $1
            RETURNING id
        ";
        let rows = sqlx::query(query)
            .bind(cutoff)
            .bind(now)
            .fetch_all(&mut *tx)
            .instrument(query_span("UPDATE", query))
            .await
            .context("failed to revoke idle sessions")?;

        let ids = rows
            .iter()
            .map(|row| row.try_get::<String, _>("id"))
            .collect::<Result<Vec<_>, _>>()
            .context("failed to decode revoked session id")?;

        if !ids.is_empty() {
            revoke_tokens_of_sessions(&mut tx, &ids, now).await?;
        }

        tx.commit().await.context("commit idle session sweep")?;
        Ok(ids.len() as u64)
    }

    async fn delete_expired_refresh_tokens(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let query = "DELETE FROM refresh_tokens WHERE expires_at < $1";
        let result = sqlx::query(query)
            .bind(cutoff)
            .execute(&self.pool)
            .instrument(query_span("DELETE", query))
            .await
            .context("failed to delete expired refresh tokens")?;
        Ok(result.rows_affected())
    }
}
