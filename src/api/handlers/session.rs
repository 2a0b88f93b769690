//! Session endpoints: refresh, logout, current session and device listing.

use axum::{
    extract::{Extension, Path},
    http::{header::SET_COOKIE, HeaderMap, StatusCode},
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error};
use utoipa::ToSchema;

use crate::{
    api::context::SessionContext,
    session::{codec::session_handle, cookies, SessionError, SessionManager, SessionSummary},
};

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct RefreshResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub tenant: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug, PartialEq, Eq)]
pub struct SessionInfo {
    pub user_id: String,
    pub tenant: String,
    /// Handle of the current session, as shown in the session list.
    pub session: String,
}

fn log_failure(action: &str, err: &SessionError) {
    if err.is_client_error() {
        debug!("{action} rejected: {err}");
    } else {
        error!("Failed to {action}: {err}");
    }
}

#[utoipa::path(
    post,
    path = "/api/v1/auth/refresh",
    responses(
        (status = 200, description = "Token pair rotated, cookies set", body = RefreshResponse),
        (status = 401, description = "Missing, invalid, expired or reused refresh token")
    ),
    tag = "auth"
)]
pub async fn refresh(headers: HeaderMap, manager: Extension<Arc<SessionManager>>) -> impl IntoResponse {
    let Some(refresh_token) = cookies::refresh_token(&headers) else {
        return (StatusCode::UNAUTHORIZED, "Refresh token required").into_response();
    };

    let refreshed = match manager.refresh_session(&refresh_token).await {
        Ok(refreshed) => refreshed,
        Err(err) => {
            log_failure("refresh session", &err);
            return (StatusCode::UNAUTHORIZED, "Invalid refresh token").into_response();
        }
    };

    let mut response_headers = HeaderMap::new();
    match cookies::session_cookies(
        manager.config(),
        &refreshed.access_token,
        &refreshed.refresh_token,
    ) {
        Ok(set_cookies) => {
            for cookie in set_cookies {
                response_headers.append(SET_COOKIE, cookie);
            }
        }
        Err(err) => {
            error!("Failed to build session cookies: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    }

    let body = RefreshResponse {
        access_token: refreshed.access_token,
        refresh_token: refreshed.refresh_token,
        tenant: refreshed.session.tenant,
    };
    (StatusCode::OK, response_headers, Json(body)).into_response()
}

#[utoipa::path(
    post,
    path = "/api/v1/auth/logout",
    responses(
        (status = 204, description = "Session revoked and cookies cleared")
    ),
    tag = "auth"
)]
pub async fn logout(headers: HeaderMap, manager: Extension<Arc<SessionManager>>) -> impl IntoResponse {
    // The access cookie expires long before the refresh cookie, so both are
    // resolved; each revoke is idempotent.
    if let Some(access_token) = cookies::access_token(&headers) {
        if let Err(err) = manager.revoke_session(&access_token).await {
            log_failure("revoke session", &err);
        }
    }
    if let Some(refresh_token) = cookies::refresh_token(&headers) {
        if let Err(err) = manager.revoke_by_refresh_token(&refresh_token).await {
            log_failure("revoke session by refresh token", &err);
        }
    }

    // Cookies are cleared even when there was nothing to revoke.
    let mut response_headers = HeaderMap::new();
    match cookies::clear_cookies(manager.config()) {
        Ok(set_cookies) => {
            for cookie in set_cookies {
                response_headers.append(SET_COOKIE, cookie);
            }
        }
        Err(err) => error!("Failed to build cookie removal headers: {err}"),
    }
    (StatusCode::NO_CONTENT, response_headers).into_response()
}

#[utoipa::path(
    get,
    path = "/api/v1/auth/session",
    responses(
        (status = 200, description = "Current session", body = SessionInfo),
        (status = 401, description = "No session")
    ),
    tag = "auth"
)]
pub async fn current_session(context: SessionContext) -> Json<SessionInfo> {
    Json(SessionInfo {
        session: session_handle(&context.session_id),
        user_id: context.user_id,
        tenant: context.tenant,
    })
}

#[utoipa::path(
    get,
    path = "/api/v1/sessions",
    responses(
        (status = 200, description = "Active sessions of the caller, newest first", body = [SessionSummary]),
        (status = 401, description = "No session")
    ),
    tag = "sessions"
)]
pub async fn list_sessions(
    context: SessionContext,
    manager: Extension<Arc<SessionManager>>,
) -> impl IntoResponse {
    match manager.list_sessions(&context.user_id).await {
        Ok(sessions) => (StatusCode::OK, Json(sessions)).into_response(),
        Err(err) => {
            log_failure("list sessions", &err);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[utoipa::path(
    delete,
    path = "/api/v1/sessions/{handle}",
    params(
        ("handle" = String, Path, description = "Session handle from the session list")
    ),
    responses(
        (status = 204, description = "Session revoked"),
        (status = 401, description = "No session"),
        (status = 404, description = "No active session of the caller has this handle")
    ),
    tag = "sessions"
)]
pub async fn revoke_session(
    context: SessionContext,
    Path(handle): Path<String>,
    manager: Extension<Arc<SessionManager>>,
) -> impl IntoResponse {
    match manager.revoke_user_session(&context.user_id, &handle).await {
        Ok(()) => StatusCode::NO_CONTENT,
        Err(err) if err.is_client_error() => {
            log_failure("revoke session", &err);
            StatusCode::NOT_FOUND
        }
        Err(err) => {
            log_failure("revoke session", &err);
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}
