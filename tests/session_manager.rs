mod common;

use anyhow::Result;
use chrono::Duration;
use common::{manager, FakeStore, ManualClock, OTHER_USER_ID, TENANT, USER_ID};
use sessiond::session::{
    codec::session_handle, CleanupService, Clock, SessionError, SessionManager, ValidationError,
};
use std::sync::Arc;

async fn create(manager: &SessionManager) -> Result<(String, String)> {
    let issued = manager
        .create_session(USER_ID, TENANT, "Mozilla/5.0", "203.0.113.7:51234")
        .await?;
    Ok((issued.session.id, issued.refresh_token))
}

#[tokio::test]
async fn concrete_scenario() -> Result<()> {
    let store = FakeStore::new();
    let clock = ManualClock::new();
    let manager = manager(&store, &clock);

    let user_id = "u".repeat(40);
    let issued = manager
        .create_session(&user_id, "neuronip", "curl/8.0", "198.51.100.1")
        .await?;
    let session_id = issued.session.id.clone();
    let original = issued.refresh_token;
    assert!(session_id.len() >= 32);
    assert_ne!(original, session_id);

    let refreshed = manager.refresh_session(&original).await?;
    assert_ne!(refreshed.refresh_token, original);
    assert_eq!(refreshed.access_token, session_id);

    let reused = manager.refresh_session(&original).await;
    assert!(matches!(reused, Err(SessionError::ReuseDetected)));

    let validated = manager.validate_session(&session_id).await;
    assert!(matches!(validated, Err(SessionError::NotFoundOrRevoked)));
    Ok(())
}

#[tokio::test]
async fn create_session_persists_hashed_attributes() -> Result<()> {
    let store = FakeStore::new();
    let clock = ManualClock::new();
    let manager = manager(&store, &clock);

    let issued = manager
        .create_session(USER_ID, "neuronai-demo", "Mozilla/5.0", "203.0.113.7:51234")
        .await?;
    let stored = store.session(&issued.session.id);
    assert_eq!(stored.as_ref(), Some(&issued.session));
    assert_eq!(issued.session.tenant, "neuronai-demo");
    assert_eq!(issued.session.created_at, clock.now());
    assert_eq!(issued.session.user_agent_hash.len(), 32);
    assert_ne!(issued.session.user_agent_hash, b"Mozilla/5.0".to_vec());

    let tokens = store.tokens_of(&issued.session.id);
    assert_eq!(tokens.len(), 1);
    assert_eq!(tokens[0].rotated_from, None);
    assert_eq!(
        tokens[0].expires_at,
        clock.now() + Duration::days(7)
    );
    assert_ne!(tokens[0].token_hash, issued.refresh_token.as_bytes().to_vec());
    Ok(())
}

#[tokio::test]
async fn validate_session_bumps_last_seen() -> Result<()> {
    let store = FakeStore::new();
    let clock = ManualClock::new();
    let manager = manager(&store, &clock);
    let (session_id, _) = create(&manager).await?;

    clock.advance(Duration::minutes(5));
    let session = manager.validate_session(&session_id).await?;
    assert_eq!(session.last_seen_at, clock.now());
    assert_eq!(
        store.session(&session_id).map(|s| s.last_seen_at),
        Some(clock.now())
    );
    Ok(())
}

#[tokio::test]
async fn last_seen_failure_does_not_fail_validation() -> Result<()> {
    let store = FakeStore::new();
    let clock = ManualClock::new();
    let manager = manager(&store, &clock);
    let (session_id, _) = create(&manager).await?;
    let created_at = clock.now();

    store.fail_touch(true);
    clock.advance(Duration::minutes(5));
    let session = manager.validate_session(&session_id).await?;
    assert_eq!(session.last_seen_at, created_at);
    Ok(())
}

#[tokio::test]
async fn unknown_session_is_not_found_or_revoked() {
    let store = FakeStore::new();
    let clock = ManualClock::new();
    let manager = manager(&store, &clock);

    let result = manager.validate_session(&"x".repeat(43)).await;
    assert!(matches!(result, Err(SessionError::NotFoundOrRevoked)));
}

#[tokio::test]
async fn malformed_input_never_reaches_the_store() {
    let store = FakeStore::new();
    let clock = ManualClock::new();
    let manager = manager(&store, &clock);

    let result = manager.validate_session(&"a".repeat(31)).await;
    assert!(matches!(
        result,
        Err(SessionError::Validation(ValidationError::TooShort(_)))
    ));
    let result = manager.validate_session(&"a".repeat(129)).await;
    assert!(matches!(
        result,
        Err(SessionError::Validation(ValidationError::TooLong(_)))
    ));
    let result = manager.validate_session("").await;
    assert!(matches!(
        result,
        Err(SessionError::Validation(ValidationError::Empty(_)))
    ));
    let result = manager.refresh_session(&"r".repeat(31)).await;
    assert!(matches!(result, Err(SessionError::Validation(_))));
    let result = manager.revoke_session("short").await;
    assert!(matches!(result, Err(SessionError::Validation(_))));
    let result = manager.create_session("short", TENANT, "ua", "ip").await;
    assert!(matches!(result, Err(SessionError::Validation(_))));
    let result = manager.create_session(USER_ID, "acme", "ua", "ip").await;
    assert!(matches!(
        result,
        Err(SessionError::Validation(ValidationError::UnknownTenant(_)))
    ));

    assert_eq!(store.calls(), 0);
}

#[tokio::test]
async fn unknown_refresh_token_is_invalid() {
    let store = FakeStore::new();
    let clock = ManualClock::new();
    let manager = manager(&store, &clock);

    let result = manager.refresh_session(&"r".repeat(43)).await;
    assert!(matches!(result, Err(SessionError::InvalidRefreshToken)));
}

#[tokio::test]
async fn rotation_chain_keeps_one_valid_token() -> Result<()> {
    let store = FakeStore::new();
    let clock = ManualClock::new();
    let manager = manager(&store, &clock);
    let (session_id, mut secret) = create(&manager).await?;

    let rotations = 5;
    for _ in 0..rotations {
        clock.advance(Duration::seconds(30));
        secret = manager.refresh_session(&secret).await?.refresh_token;

        let now = clock.now();
        let valid = store
            .tokens_of(&session_id)
            .into_iter()
            .filter(|token| token.is_valid_at(now))
            .count();
        assert_eq!(valid, 1);
    }

    // Walk the lineage back from the single valid token.
    let tokens = store.tokens_of(&session_id);
    let now = clock.now();
    let mut current = tokens.iter().find(|token| token.is_valid_at(now));
    let mut links = 0;
    while let Some(token) = current {
        current = token
            .rotated_from
            .and_then(|parent| tokens.iter().find(|candidate| candidate.id == parent));
        if current.is_some() {
            links += 1;
        }
    }
    assert_eq!(links, rotations);
    assert_eq!(tokens.len(), rotations + 1);
    Ok(())
}

#[tokio::test]
async fn reuse_of_any_consumed_token_revokes_session() -> Result<()> {
    let store = FakeStore::new();
    let clock = ManualClock::new();
    let manager = manager(&store, &clock);
    let (session_id, first) = create(&manager).await?;

    let second = manager.refresh_session(&first).await?.refresh_token;
    let third = manager.refresh_session(&second).await?.refresh_token;

    let result = manager.refresh_session(&first).await;
    assert!(matches!(result, Err(SessionError::ReuseDetected)));

    // The latest token was revoked with the session.
    let result = manager.refresh_session(&third).await;
    assert!(matches!(result, Err(SessionError::ReuseDetected)));
    assert!(store
        .tokens_of(&session_id)
        .iter()
        .all(|token| token.revoked_at.is_some()));
    assert!(store
        .session(&session_id)
        .is_some_and(|session| session.revoked_at.is_some()));
    Ok(())
}

#[tokio::test]
async fn refresh_on_revoked_session_fails() -> Result<()> {
    let store = FakeStore::new();
    let clock = ManualClock::new();
    let manager = manager(&store, &clock);
    let (session_id, secret) = create(&manager).await?;

    // Session revoked behind the manager's back, token still live.
    store.update_session(&session_id, |session| {
        session.revoked_at = Some(session.created_at);
    });

    let result = manager.refresh_session(&secret).await;
    assert!(matches!(result, Err(SessionError::NotFoundOrRevoked)));
    Ok(())
}

#[tokio::test]
async fn refresh_token_expiry_is_exclusive() -> Result<()> {
    let store = FakeStore::new();
    let clock = ManualClock::new();
    let manager = manager(&store, &clock);
    let (_, secret) = create(&manager).await?;

    clock.advance(Duration::days(7) - Duration::seconds(1));
    let refreshed = manager.refresh_session(&secret).await?;

    // Successor expires exactly seven days from now; land on that instant.
    clock.advance(Duration::days(7));
    let result = manager.refresh_session(&refreshed.refresh_token).await;
    assert!(matches!(result, Err(SessionError::InvalidRefreshToken)));
    Ok(())
}

#[tokio::test]
async fn revoke_is_idempotent() -> Result<()> {
    let store = FakeStore::new();
    let clock = ManualClock::new();
    let manager = manager(&store, &clock);
    let (session_id, secret) = create(&manager).await?;

    manager.revoke_session(&session_id).await?;
    let after_first = (store.session(&session_id), store.tokens_of(&session_id));

    clock.advance(Duration::minutes(1));
    manager.revoke_session(&session_id).await?;
    let after_second = (store.session(&session_id), store.tokens_of(&session_id));

    assert_eq!(after_first, after_second);
    assert!(matches!(
        manager.validate_session(&session_id).await,
        Err(SessionError::NotFoundOrRevoked)
    ));
    assert!(matches!(
        manager.refresh_session(&secret).await,
        Err(SessionError::ReuseDetected)
    ));
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_refresh_has_exactly_one_winner() -> Result<()> {
    for _ in 0..20 {
        let store = FakeStore::new();
        let clock = ManualClock::new();
        let manager = Arc::new(manager(&store, &clock));
        let (_, secret) = create(&manager).await?;

        let first = tokio::spawn({
            let manager = manager.clone();
            let secret = secret.clone();
            async move { manager.refresh_session(&secret).await }
        });
        let second = tokio::spawn({
            let manager = manager.clone();
            async move { manager.refresh_session(&secret).await }
        });

        let results = [first.await?, second.await?];
        let winners = results.iter().filter(|result| result.is_ok()).count();
        let reuse = results
            .iter()
            .filter(|result| matches!(result, Err(SessionError::ReuseDetected)))
            .count();
        assert_eq!((winners, reuse), (1, 1));
    }
    Ok(())
}

#[tokio::test]
async fn store_failure_is_not_a_client_error() -> Result<()> {
    let store = FakeStore::new();
    let clock = ManualClock::new();
    let manager = manager(&store, &clock);
    let (session_id, _) = create(&manager).await?;

    store.fail_all(true);
    let result = manager.validate_session(&session_id).await;
    assert!(matches!(result, Err(SessionError::Store { .. })));
    assert!(result.is_err_and(|err| !err.is_client_error()));
    Ok(())
}

#[tokio::test]
async fn list_and_revoke_own_sessions() -> Result<()> {
    let store = FakeStore::new();
    let clock = ManualClock::new();
    let manager = manager(&store, &clock);

    let (older, _) = create(&manager).await?;
    clock.advance(Duration::minutes(1));
    let (newer, _) = create(&manager).await?;
    let other = manager
        .create_session(OTHER_USER_ID, TENANT, "ua", "198.51.100.2")
        .await?
        .session
        .id;

    let listed = manager.list_sessions(USER_ID).await?;
    let handles: Vec<&str> = listed.iter().map(|s| s.handle.as_str()).collect();
    assert_eq!(
        handles,
        vec![session_handle(&newer).as_str(), session_handle(&older).as_str()]
    );

    // Someone else's session is indistinguishable from a missing one.
    let result = manager
        .revoke_user_session(USER_ID, &session_handle(&other))
        .await;
    assert!(matches!(result, Err(SessionError::NotFoundOrRevoked)));
    assert!(manager.validate_session(&other).await.is_ok());

    manager
        .revoke_user_session(USER_ID, &session_handle(&older))
        .await?;
    let listed = manager.list_sessions(USER_ID).await?;
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].handle, session_handle(&newer));
    Ok(())
}

#[tokio::test]
async fn cleanup_revokes_idle_sessions_and_deletes_old_tokens() -> Result<()> {
    let store = FakeStore::new();
    let clock = ManualClock::new();
    let manager = manager(&store, &clock);

    let (idle, _) = create(&manager).await?;
    clock.advance(Duration::days(29));
    let (active, _) = create(&manager).await?;
    clock.advance(Duration::days(2));

    assert_eq!(manager.cleanup_expired_sessions().await?, 1);
    assert!(store.session(&idle).is_some_and(|s| s.revoked_at.is_some()));
    assert!(store.session(&active).is_some_and(|s| s.revoked_at.is_none()));
    assert!(store
        .tokens_of(&idle)
        .iter()
        .all(|token| token.revoked_at.is_some()));

    // The idle session's token expired 24 days ago; the active one is still live.
    assert_eq!(manager.cleanup_expired_tokens().await?, 1);
    assert!(store.tokens_of(&idle).is_empty());
    assert_eq!(store.tokens_of(&active).len(), 1);
    Ok(())
}

#[tokio::test]
async fn cleanup_run_once_survives_store_errors() -> Result<()> {
    let store = FakeStore::new();
    let clock = ManualClock::new();
    let manager = manager(&store, &clock);
    create(&manager).await?;

    store.fail_all(true);
    let before = store.calls();
    CleanupService::run_once(&manager).await;
    assert_eq!(store.calls(), before + 2);
    Ok(())
}

#[tokio::test]
async fn cleanup_service_stops_on_cancel() -> Result<()> {
    let store = FakeStore::new();
    let clock = ManualClock::new();
    let manager = Arc::new(manager(&store, &clock));

    let shutdown = tokio_util::sync::CancellationToken::new();
    let handle = CleanupService::spawn(
        manager,
        std::time::Duration::from_secs(3600),
        shutdown.clone(),
    );
    shutdown.cancel();
    tokio::time::timeout(std::time::Duration::from_secs(5), handle).await??;
    Ok(())
}

#[tokio::test]
async fn revoke_by_refresh_token_does_not_rotate() -> Result<()> {
    let store = FakeStore::new();
    let clock = ManualClock::new();
    let manager = manager(&store, &clock);
    let (session_id, secret) = create(&manager).await?;

    manager.revoke_by_refresh_token(&secret).await?;
    assert!(store
        .session(&session_id)
        .is_some_and(|session| session.revoked_at.is_some()));
    let tokens = store.tokens_of(&session_id);
    assert_eq!(tokens.len(), 1);
    assert!(tokens[0].revoked_at.is_some());

    // Still names its session once consumed, so a second logout is a no-op.
    manager.revoke_by_refresh_token(&secret).await?;

    let result = manager.revoke_by_refresh_token(&"r".repeat(43)).await;
    assert!(matches!(result, Err(SessionError::InvalidRefreshToken)));

    clock.advance(Duration::days(7));
    let result = manager.revoke_by_refresh_token(&secret).await;
    assert!(matches!(result, Err(SessionError::InvalidRefreshToken)));
    Ok(())
}
