//! Typed request identity set by the session middleware.

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
};
use std::fmt;

use crate::session::Session;

/// Identity of a request authenticated through a session cookie.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionContext {
    pub session_id: String,
    pub user_id: String,
    pub tenant: String,
}

impl From<&Session> for SessionContext {
    fn from(session: &Session) -> Self {
        Self {
            session_id: session.id.clone(),
            user_id: session.user_id.clone(),
            tenant: session.tenant.clone(),
        }
    }
}

/// Bearer credential handed through to the API-key collaborator unverified.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKeyCredential(String);

impl ApiKeyCredential {
    #[must_use]
    pub fn new(key: String) -> Self {
        Self(key)
    }

    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiKeyCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKeyCredential([REDACTED])")
    }
}

/// Inserted as a request extension once a credential was accepted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AuthContext {
    Session(SessionContext),
    ApiKey(ApiKeyCredential),
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthContext
where
    S: Send + Sync,
{
    type Rejection = StatusCode;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Self>()
            .cloned()
            .ok_or(StatusCode::UNAUTHORIZED)
    }
}

/// Handlers that need a cookie session take this; API-key requests get 401.
#[async_trait]
impl<S> FromRequestParts<S> for SessionContext
where
    S: Send + Sync,
{
    type Rejection = StatusCode;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        match parts.extensions.get::<AuthContext>() {
            Some(AuthContext::Session(context)) => Ok(context.clone()),
            _ => Err(StatusCode::UNAUTHORIZED),
        }
    }
}
