//! In-memory session store and a hand-driven clock for integration tests.

#![allow(dead_code)]

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use sessiond::session::{
    Clock, RefreshToken, Rotation, Session, SessionConfig, SessionManager, SessionStore,
};
use std::sync::{
    atomic::{AtomicBool, AtomicUsize, Ordering},
    Arc, Mutex, MutexGuard,
};
use uuid::Uuid;

pub const USER_ID: &str = "user-0000000000000000000000000000000001";
pub const OTHER_USER_ID: &str = "user-0000000000000000000000000000000002";
pub const TENANT: &str = "neuronip";

#[derive(Default)]
struct State {
    sessions: Vec<Session>,
    tokens: Vec<RefreshToken>,
}

/// Implements the same conditional revoke as the PostgreSQL store, with the
/// mutex standing in for the row lock. Every trait call is counted.
#[derive(Default)]
pub struct FakeStore {
    state: Mutex<State>,
    calls: AtomicUsize,
    fail_touch: AtomicBool,
    fail_all: AtomicBool,
}

impl FakeStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn enter(&self) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_all.load(Ordering::SeqCst) {
            return Err(anyhow!("connection refused"));
        }
        Ok(())
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn fail_touch(&self, fail: bool) {
        self.fail_touch.store(fail, Ordering::SeqCst);
    }

    pub fn fail_all(&self, fail: bool) {
        self.fail_all.store(fail, Ordering::SeqCst);
    }

    pub fn session(&self, session_id: &str) -> Option<Session> {
        self.state()
            .sessions
            .iter()
            .find(|session| session.id == session_id)
            .cloned()
    }

    pub fn tokens_of(&self, session_id: &str) -> Vec<RefreshToken> {
        self.state()
            .tokens
            .iter()
            .filter(|token| token.session_id == session_id)
            .cloned()
            .collect()
    }

    /// Overwrite stored fields, e.g. to age a session or a token.
    pub fn update_session(&self, session_id: &str, update: impl FnOnce(&mut Session)) {
        if let Some(session) = self
            .state()
            .sessions
            .iter_mut()
            .find(|session| session.id == session_id)
        {
            update(session);
        }
    }

    pub fn update_tokens(&self, session_id: &str, update: impl Fn(&mut RefreshToken)) {
        for token in self
            .state()
            .tokens
            .iter_mut()
            .filter(|token| token.session_id == session_id)
        {
            update(token);
        }
    }
}

#[async_trait]
impl SessionStore for FakeStore {
    async fn insert_session(&self, session: &Session, token: &RefreshToken) -> Result<()> {
        self.enter()?;
        let mut state = self.state();
        state.sessions.push(session.clone());
        state.tokens.push(token.clone());
        Ok(())
    }

    async fn find_active_session(&self, session_id: &str) -> Result<Option<Session>> {
        self.enter()?;
        Ok(self
            .state()
            .sessions
            .iter()
            .find(|session| session.id == session_id && session.revoked_at.is_none())
            .cloned())
    }

    async fn touch_session(&self, session_id: &str, seen_at: DateTime<Utc>) -> Result<()> {
        self.enter()?;
        if self.fail_touch.load(Ordering::SeqCst) {
            return Err(anyhow!("statement timeout"));
        }
        let mut state = self.state();
        if let Some(session) = state
            .sessions
            .iter_mut()
            .find(|session| session.id == session_id && session.revoked_at.is_none())
        {
            session.last_seen_at = session.last_seen_at.max(seen_at);
        }
        Ok(())
    }

    async fn find_unexpired_refresh_token(
        &self,
        token_hash: &[u8],
        now: DateTime<Utc>,
    ) -> Result<Option<RefreshToken>> {
        self.enter()?;
        let found = self
            .state()
            .tokens
            .iter()
            .find(|token| token.token_hash == token_hash && token.expires_at > now)
            .cloned();
        // Give a concurrent caller the chance to read the same row.
        tokio::task::yield_now().await;
        Ok(found)
    }

    async fn rotate_refresh_token(
        &self,
        presented_id: Uuid,
        successor: &RefreshToken,
        now: DateTime<Utc>,
    ) -> Result<Rotation> {
        self.enter()?;
        let mut state = self.state();
        let Some(presented) = state.tokens.iter_mut().find(|token| {
            token.id == presented_id && token.revoked_at.is_none() && token.expires_at > now
        }) else {
            return Ok(Rotation::AlreadyConsumed);
        };
        presented.revoked_at = Some(now);
        state.tokens.push(successor.clone());
        Ok(Rotation::Rotated)
    }

    async fn revoke_session(&self, session_id: &str, now: DateTime<Utc>) -> Result<bool> {
        self.enter()?;
        let mut state = self.state();
        let mut changed = false;
        if let Some(session) = state
            .sessions
            .iter_mut()
            .find(|session| session.id == session_id && session.revoked_at.is_none())
        {
            session.revoked_at = Some(now);
            changed = true;
        }
        for token in state
            .tokens
            .iter_mut()
            .filter(|token| token.session_id == session_id && token.revoked_at.is_none())
        {
            token.revoked_at = Some(now);
        }
        Ok(changed)
    }

    async fn list_active_sessions(&self, user_id: &str) -> Result<Vec<Session>> {
        self.enter()?;
        let mut sessions: Vec<Session> = self
            .state()
            .sessions
            .iter()
            .filter(|session| session.user_id == user_id && session.revoked_at.is_none())
            .cloned()
            .collect();
        sessions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(sessions)
    }

    async fn revoke_idle_sessions(
        &self,
        cutoff: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<u64> {
        self.enter()?;
        let mut state = self.state();
        let mut revoked = Vec::new();
        for session in state
            .sessions
            .iter_mut()
            .filter(|session| session.revoked_at.is_none() && session.last_seen_at < cutoff)
        {
            session.revoked_at = Some(now);
            revoked.push(session.id.clone());
        }
        for token in state
            .tokens
            .iter_mut()
            .filter(|token| token.revoked_at.is_none() && revoked.contains(&token.session_id))
        {
            token.revoked_at = Some(now);
        }
        Ok(revoked.len() as u64)
    }

    async fn delete_expired_refresh_tokens(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        self.enter()?;
        let mut state = self.state();
        let before = state.tokens.len();
        state.tokens.retain(|token| token.expires_at >= cutoff);
        Ok((before - state.tokens.len()) as u64)
    }
}

/// Clock that only moves when told to.
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new() -> Arc<Self> {
        let start = Utc
            .with_ymd_and_hms(2024, 5, 1, 12, 0, 0)
            .single()
            .unwrap_or_else(Utc::now);
        Arc::new(Self {
            now: Mutex::new(start),
        })
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

pub fn manager(store: &Arc<FakeStore>, clock: &Arc<ManualClock>) -> SessionManager {
    SessionManager::with_clock(store.clone(), SessionConfig::new(), clock.clone())
}
