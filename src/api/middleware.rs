//! Cookie session authentication.
//!
//! Credential sources are tried in [`CREDENTIAL_CHAIN`] order. The first one
//! that authenticates wins; a source that is absent or rejected hands over to
//! the next. When none succeeds the request is answered with a bare 401,
//! whatever the reason, so clients cannot tell an expired session from a
//! missing one.

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{header::SET_COOKIE, HeaderMap, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::{net::SocketAddr, sync::Arc};
use tracing::{debug, error, warn};

use super::context::{ApiKeyCredential, AuthContext, SessionContext};
use crate::session::{
    cookies, manager::fingerprint, validation::client_ip, SessionError, SessionManager,
};

/// Paths served without a session. Matched by prefix.
pub const PUBLIC_PATHS: [&str; 8] = [
    "/health",
    "/api/v1/health",
    "/api/v1/auth/register",
    "/api/v1/auth/login",
    "/api/v1/auth/oidc/",
    "/api/v1/database/test",
    "/api/v1/auth/refresh",
    "/api/v1/auth/logout",
];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CredentialSource {
    AccessCookie,
    RefreshCookie,
    BearerHeader,
}

pub const CREDENTIAL_CHAIN: [CredentialSource; 3] = [
    CredentialSource::AccessCookie,
    CredentialSource::RefreshCookie,
    CredentialSource::BearerHeader,
];

/// Outcome of trying one credential source.
#[derive(Debug)]
pub enum Attempt {
    Authenticated {
        context: AuthContext,
        /// Rotated cookie pair to hand back to the client.
        set_cookies: Option<[HeaderValue; 2]>,
    },
    Absent,
    Invalid,
}

#[must_use]
pub fn is_public_path(path: &str) -> bool {
    PUBLIC_PATHS.iter().any(|prefix| path.starts_with(prefix))
}

async fn attempt(
    source: CredentialSource,
    manager: &SessionManager,
    headers: &HeaderMap,
    peer: Option<SocketAddr>,
) -> Attempt {
    match source {
        CredentialSource::AccessCookie => {
            let Some(access_token) = cookies::access_token(headers) else {
                return Attempt::Absent;
            };
            match manager.validate_session(&access_token).await {
                Ok(session) => Attempt::Authenticated {
                    context: AuthContext::Session(SessionContext::from(&session)),
                    set_cookies: None,
                },
                Err(err) => {
                    log_rejection(source, &err);
                    Attempt::Invalid
                }
            }
        }
        CredentialSource::RefreshCookie => {
            let Some(refresh_token) = cookies::refresh_token(headers) else {
                return Attempt::Absent;
            };
            match manager.refresh_session(&refresh_token).await {
                Ok(refreshed) => {
                    match cookies::session_cookies(
                        manager.config(),
                        &refreshed.access_token,
                        &refreshed.refresh_token,
                    ) {
                        Ok(set_cookies) => Attempt::Authenticated {
                            context: AuthContext::Session(SessionContext::from(
                                &refreshed.session,
                            )),
                            set_cookies: Some(set_cookies),
                        },
                        Err(err) => {
                            error!("Failed to build session cookies: {err}");
                            Attempt::Invalid
                        }
                    }
                }
                Err(SessionError::ReuseDetected) => {
                    warn!(
                        client_ip = %client_ip(headers, peer),
                        "refresh token reuse rejected"
                    );
                    Attempt::Invalid
                }
                Err(err) => {
                    log_rejection(source, &err);
                    Attempt::Invalid
                }
            }
        }
        CredentialSource::BearerHeader => match cookies::bearer_token(headers) {
            Some(key) => Attempt::Authenticated {
                context: AuthContext::ApiKey(ApiKeyCredential::new(key)),
                set_cookies: None,
            },
            None => Attempt::Absent,
        },
    }
}

fn log_rejection(source: CredentialSource, err: &SessionError) {
    if err.is_client_error() {
        debug!(?source, "credential rejected: {err}");
    } else {
        error!(?source, "credential check failed: {err}");
    }
}

/// Authenticate the request or answer 401.
pub async fn session_middleware(
    State(manager): State<Arc<SessionManager>>,
    mut request: Request,
    next: Next,
) -> Response {
    if is_public_path(request.uri().path()) {
        return next.run(request).await;
    }

    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);

    for source in CREDENTIAL_CHAIN {
        match attempt(source, &manager, request.headers(), peer).await {
            Attempt::Authenticated {
                context,
                set_cookies,
            } => {
                if let AuthContext::Session(session) = &context {
                    debug!(session = fingerprint(&session.session_id), ?source, "authenticated");
                }
                request.extensions_mut().insert(context);

                let mut response = next.run(request).await;
                for cookie in set_cookies.into_iter().flatten() {
                    response.headers_mut().append(SET_COOKIE, cookie);
                }
                return response;
            }
            Attempt::Absent | Attempt::Invalid => {}
        }
    }

    (StatusCode::UNAUTHORIZED, "Unauthorized").into_response()
}
