//! Storage seam for sessions and refresh tokens.
//!
//! The manager owns every lifecycle rule; implementations only run the
//! statements. Timestamps are always supplied by the caller.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use super::codec::session_handle;

/// A user session. The ID doubles as the access token.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Session {
    pub id: String,
    pub user_id: String,
    pub tenant: String,
    pub created_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub user_agent_hash: Vec<u8>,
    pub ip_hash: Vec<u8>,
}

impl Session {
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.revoked_at.is_none()
    }
}

/// A stored refresh token. Only the hash of the secret is kept.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RefreshToken {
    pub id: Uuid,
    pub session_id: String,
    pub token_hash: Vec<u8>,
    /// Token this one was rotated from; audit lineage only.
    pub rotated_from: Option<Uuid>,
    pub expires_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl RefreshToken {
    /// Valid means not revoked and `expires_at` strictly after `now`.
    #[must_use]
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.revoked_at.is_none() && self.expires_at > now
    }
}

/// What the owner of a session sees when listing their devices.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, ToSchema)]
pub struct SessionSummary {
    /// See [`session_handle`]; never the session ID itself.
    pub handle: String,
    pub tenant: String,
    pub created_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
}

impl From<&Session> for SessionSummary {
    fn from(session: &Session) -> Self {
        Self {
            handle: session_handle(&session.id),
            tenant: session.tenant.clone(),
            created_at: session.created_at,
            last_seen_at: session.last_seen_at,
        }
    }
}

/// Result of consuming a refresh token.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Rotation {
    /// The presented token was revoked and the successor persisted.
    Rotated,
    /// The presented token was no longer valid when the conditional revoke ran.
    AlreadyConsumed,
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Insert a session and its first refresh token atomically.
    async fn insert_session(&self, session: &Session, token: &RefreshToken) -> Result<()>;

    /// Load a session only if it has not been revoked.
    async fn find_active_session(&self, session_id: &str) -> Result<Option<Session>>;

    /// Move `last_seen_at` forward; never backwards.
    async fn touch_session(&self, session_id: &str, seen_at: DateTime<Utc>) -> Result<()>;

    /// Look up a refresh token by hash with `expires_at > now`, revoked or not.
    async fn find_unexpired_refresh_token(
        &self,
        token_hash: &[u8],
        now: DateTime<Utc>,
    ) -> Result<Option<RefreshToken>>;

    /// Revoke `presented_id` only if it is still valid at `now` and, in the
    /// same transaction, insert `successor`. Nothing is written on
    /// [`Rotation::AlreadyConsumed`].
    async fn rotate_refresh_token(
        &self,
        presented_id: Uuid,
        successor: &RefreshToken,
        now: DateTime<Utc>,
    ) -> Result<Rotation>;

    /// Revoke a session and all of its live refresh tokens. Returns whether
    /// the session row changed state.
    async fn revoke_session(&self, session_id: &str, now: DateTime<Utc>) -> Result<bool>;

    /// Active sessions of a user, newest first.
    async fn list_active_sessions(&self, user_id: &str) -> Result<Vec<Session>>;

    /// Revoke sessions last seen before `cutoff` (and their tokens).
    async fn revoke_idle_sessions(&self, cutoff: DateTime<Utc>, now: DateTime<Utc>)
        -> Result<u64>;

    /// Hard-delete refresh tokens that expired before `cutoff`.
    async fn delete_expired_refresh_tokens(&self, cutoff: DateTime<Utc>) -> Result<u64>;
}
