//! Session lifecycle: create, validate, rotate, revoke.
//!
//! The manager holds no mutable state of its own. Every decision about a
//! refresh token is made against the store, and the consume step is a
//! conditional revoke so two concurrent refreshes of one token cannot both
//! succeed.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::{sync::Arc, time::Duration};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use super::{
    clock::{Clock, SystemClock},
    codec::{generate_secret, hash_client_attribute, hash_token, session_handle},
    config::{SessionConfig, EXPIRED_TOKEN_RETENTION, IDLE_SESSION_MAX_AGE},
    error::SessionError,
    store::{RefreshToken, Rotation, Session, SessionStore, SessionSummary},
    validation::{
        sanitize_ip, sanitize_user_agent, validate_refresh_token, validate_session_id,
        validate_tenant, validate_user_id, ValidationError,
    },
};

/// A freshly created session and the only copy of its refresh secret.
#[derive(Debug, Clone)]
pub struct IssuedSession {
    pub session: Session,
    pub refresh_token: String,
}

/// Result of a successful rotation.
#[derive(Debug, Clone)]
pub struct RefreshedSession {
    pub session: Session,
    /// The access token is the session ID.
    pub access_token: String,
    pub refresh_token: String,
}

/// Short prefix of a session ID, safe to log. The full ID is a bearer credential.
pub(crate) fn fingerprint(session_id: &str) -> &str {
    session_id.get(..8).unwrap_or(session_id)
}

fn after(now: DateTime<Utc>, ttl: Duration) -> DateTime<Utc> {
    ChronoDuration::from_std(ttl)
        .ok()
        .and_then(|ttl| now.checked_add_signed(ttl))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

fn before(now: DateTime<Utc>, age: Duration) -> DateTime<Utc> {
    ChronoDuration::from_std(age)
        .ok()
        .and_then(|age| now.checked_sub_signed(age))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

pub struct SessionManager {
    store: Arc<dyn SessionStore>,
    config: SessionConfig,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl SessionManager {
    #[must_use]
    pub fn new(store: Arc<dyn SessionStore>, config: SessionConfig) -> Self {
        Self::with_clock(store, config, Arc::new(SystemClock))
    }

    #[must_use]
    pub fn with_clock(
        store: Arc<dyn SessionStore>,
        config: SessionConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            config,
            clock,
        }
    }

    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Create a session and its first refresh token.
    ///
    /// # Errors
    /// Returns a validation error for a malformed user ID or unknown tenant,
    /// or a store error if the session could not be persisted.
    #[instrument(skip(self, user_id, user_agent, client_ip))]
    pub async fn create_session(
        &self,
        user_id: &str,
        tenant: &str,
        user_agent: &str,
        client_ip: &str,
    ) -> Result<IssuedSession, SessionError> {
        validate_user_id(user_id)?;
        validate_tenant(tenant)?;

        let user_agent = sanitize_user_agent(user_agent);
        let client_ip = sanitize_ip(client_ip);

        let session_id = generate_secret().map_err(SessionError::store("generate session ID"))?;
        let refresh_secret =
            generate_secret().map_err(SessionError::store("generate refresh token"))?;

        let now = self.clock.now();
        let session = Session {
            id: session_id,
            user_id: user_id.to_string(),
            tenant: tenant.to_string(),
            created_at: now,
            last_seen_at: now,
            revoked_at: None,
            user_agent_hash: hash_client_attribute(&user_agent),
            ip_hash: hash_client_attribute(&client_ip),
        };
        let token = RefreshToken {
            id: Uuid::new_v4(),
            session_id: session.id.clone(),
            token_hash: hash_token(&refresh_secret),
            rotated_from: None,
            expires_at: after(now, self.config.refresh_ttl()),
            revoked_at: None,
            created_at: now,
        };

        self.store
            .insert_session(&session, &token)
            .await
            .map_err(SessionError::store("create session"))?;

        info!(session = fingerprint(&session.id), "session created");

        Ok(IssuedSession {
            session,
            refresh_token: refresh_secret,
        })
    }

    /// Resolve an access token to its active session and record activity.
    ///
    /// # Errors
    /// [`SessionError::NotFoundOrRevoked`] for unknown and revoked sessions alike.
    #[instrument(skip_all)]
    pub async fn validate_session(&self, session_id: &str) -> Result<Session, SessionError> {
        validate_session_id(session_id)?;

        let mut session = self
            .store
            .find_active_session(session_id)
            .await
            .map_err(SessionError::store("lookup session"))?
            .ok_or(SessionError::NotFoundOrRevoked)?;

        let now = self.clock.now();
        if let Err(err) = self.store.touch_session(session_id, now).await {
            warn!(
                session = fingerprint(session_id),
                "failed to update last_seen_at: {err:#}"
            );
        } else {
            session.last_seen_at = session.last_seen_at.max(now);
        }

        Ok(session)
    }

    /// Consume a refresh token and issue its successor.
    ///
    /// Presenting a token that was already rotated or revoked (but has not yet
    /// expired) revokes the whole session.
    ///
    /// # Errors
    /// [`SessionError::InvalidRefreshToken`] when the token is unknown or
    /// expired, [`SessionError::ReuseDetected`] when it was already consumed,
    /// [`SessionError::NotFoundOrRevoked`] when its session is gone.
    #[instrument(skip_all)]
    pub async fn refresh_session(
        &self,
        refresh_token: &str,
    ) -> Result<RefreshedSession, SessionError> {
        validate_refresh_token(refresh_token)?;

        let now = self.clock.now();
        let presented = self
            .store
            .find_unexpired_refresh_token(&hash_token(refresh_token), now)
            .await
            .map_err(SessionError::store("lookup refresh token"))?
            .ok_or(SessionError::InvalidRefreshToken)?;

        if presented.revoked_at.is_some() {
            return Err(self.reuse_detected(&presented.session_id).await);
        }

        let session = self
            .validate_session(&presented.session_id)
            .await
            .map_err(|err| match err {
                SessionError::Store { .. } => err,
                _ => SessionError::NotFoundOrRevoked,
            })?;

        let new_secret =
            generate_secret().map_err(SessionError::store("generate refresh token"))?;
        let successor = RefreshToken {
            id: Uuid::new_v4(),
            session_id: session.id.clone(),
            token_hash: hash_token(&new_secret),
            rotated_from: Some(presented.id),
            expires_at: after(now, self.config.refresh_ttl()),
            revoked_at: None,
            created_at: now,
        };

        let rotation = self
            .store
            .rotate_refresh_token(presented.id, &successor, now)
            .await
            .map_err(SessionError::store("rotate refresh token"))?;

        if rotation == Rotation::AlreadyConsumed {
            return Err(self.reuse_detected(&session.id).await);
        }

        debug!(session = fingerprint(&session.id), "refresh token rotated");

        Ok(RefreshedSession {
            access_token: session.id.clone(),
            session,
            refresh_token: new_secret,
        })
    }

    async fn reuse_detected(&self, session_id: &str) -> SessionError {
        warn!(
            session = fingerprint(session_id),
            "refresh token reuse detected, revoking session"
        );
        match self.store.revoke_session(session_id, self.clock.now()).await {
            Ok(_) => SessionError::ReuseDetected,
            Err(err) => {
                error!(
                    session = fingerprint(session_id),
                    "failed to revoke session after refresh token reuse: {err:#}"
                );
                SessionError::store("revoke session after refresh token reuse")(err)
            }
        }
    }

    /// Revoke a session and every refresh token it owns. Idempotent.
    ///
    /// # Errors
    /// Returns a validation or store error.
    #[instrument(skip_all)]
    pub async fn revoke_session(&self, session_id: &str) -> Result<(), SessionError> {
        validate_session_id(session_id)?;

        let changed = self
            .store
            .revoke_session(session_id, self.clock.now())
            .await
            .map_err(SessionError::store("revoke session"))?;

        if changed {
            info!(session = fingerprint(session_id), "session revoked");
        }
        Ok(())
    }

    /// Revoke the session that owns `refresh_token` without rotating it.
    ///
    /// Used by logout once the access cookie is gone. A consumed but
    /// unexpired token still names its session.
    ///
    /// # Errors
    /// [`SessionError::InvalidRefreshToken`] when the token is unknown or
    /// expired, otherwise a validation or store error.
    #[instrument(skip_all)]
    pub async fn revoke_by_refresh_token(&self, refresh_token: &str) -> Result<(), SessionError> {
        validate_refresh_token(refresh_token)?;

        let token = self
            .store
            .find_unexpired_refresh_token(&hash_token(refresh_token), self.clock.now())
            .await
            .map_err(SessionError::store("lookup refresh token"))?
            .ok_or(SessionError::InvalidRefreshToken)?;

        self.revoke_session(&token.session_id).await
    }

    /// Revoke the active session of `user_id` named by `handle` (see
    /// [`session_handle`]).
    ///
    /// # Errors
    /// [`SessionError::NotFoundOrRevoked`] when no active session of the user
    /// has that handle, including sessions that belong to someone else.
    #[instrument(skip_all)]
    pub async fn revoke_user_session(&self, user_id: &str, handle: &str) -> Result<(), SessionError> {
        validate_user_id(user_id)?;
        if handle.is_empty() {
            return Err(ValidationError::Empty("session handle").into());
        }

        let session_id = self
            .store
            .list_active_sessions(user_id)
            .await
            .map_err(SessionError::store("list sessions"))?
            .into_iter()
            .find(|session| session_handle(&session.id) == handle)
            .map(|session| session.id)
            .ok_or(SessionError::NotFoundOrRevoked)?;

        self.revoke_session(&session_id).await
    }

    /// Active sessions of a user, newest first.
    ///
    /// # Errors
    /// Returns a validation or store error.
    #[instrument(skip_all)]
    pub async fn list_sessions(&self, user_id: &str) -> Result<Vec<SessionSummary>, SessionError> {
        validate_user_id(user_id)?;

        let sessions = self
            .store
            .list_active_sessions(user_id)
            .await
            .map_err(SessionError::store("list sessions"))?;

        Ok(sessions.iter().map(SessionSummary::from).collect())
    }

    /// Revoke sessions idle for longer than [`IDLE_SESSION_MAX_AGE`].
    ///
    /// # Errors
    /// Returns a store error.
    pub async fn cleanup_expired_sessions(&self) -> Result<u64, SessionError> {
        let now = self.clock.now();
        let revoked = self
            .store
            .revoke_idle_sessions(before(now, IDLE_SESSION_MAX_AGE), now)
            .await
            .map_err(SessionError::store("revoke idle sessions"))?;
        if revoked > 0 {
            info!(revoked, "revoked idle sessions");
        }
        Ok(revoked)
    }

    /// Delete refresh tokens expired for longer than [`EXPIRED_TOKEN_RETENTION`].
    ///
    /// # Errors
    /// Returns a store error.
    pub async fn cleanup_expired_tokens(&self) -> Result<u64, SessionError> {
        let now = self.clock.now();
        let deleted = self
            .store
            .delete_expired_refresh_tokens(before(now, EXPIRED_TOKEN_RETENTION))
            .await
            .map_err(SessionError::store("delete expired refresh tokens"))?;
        if deleted > 0 {
            info!(deleted, "deleted expired refresh tokens");
        }
        Ok(deleted)
    }
}
