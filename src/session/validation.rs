//! Input shape guards and sanitizers.
//!
//! Everything here runs before the store is touched, so a malformed credential
//! never costs a database round trip.

use axum::http::HeaderMap;
use chrono::{DateTime, Duration, Utc};
use std::net::SocketAddr;
use thiserror::Error;

pub const SESSION_ID_MIN_LEN: usize = 32;
pub const SESSION_ID_MAX_LEN: usize = 128;
pub const REFRESH_TOKEN_MIN_LEN: usize = 32;
pub const USER_ID_MIN_LEN: usize = 32;
pub const USER_AGENT_MAX_LEN: usize = 500;
/// Longest textual IPv6 address (IPv4-mapped form).
pub const IP_MAX_LEN: usize = 45;

/// Tenants a session may be scoped to.
pub const TENANTS: [&str; 2] = ["neuronip", "neuronai-demo"];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{0} cannot be empty")]
    Empty(&'static str),
    #[error("{0} too short")]
    TooShort(&'static str),
    #[error("{0} too long")]
    TooLong(&'static str),
    #[error("invalid tenant: {0} (must be one of: neuronip, neuronai-demo)")]
    UnknownTenant(String),
}

pub fn validate_session_id(session_id: &str) -> Result<(), ValidationError> {
    if session_id.is_empty() {
        return Err(ValidationError::Empty("session ID"));
    }
    if session_id.len() < SESSION_ID_MIN_LEN {
        return Err(ValidationError::TooShort("session ID"));
    }
    if session_id.len() > SESSION_ID_MAX_LEN {
        return Err(ValidationError::TooLong("session ID"));
    }
    Ok(())
}

pub fn validate_refresh_token(token: &str) -> Result<(), ValidationError> {
    if token.is_empty() {
        return Err(ValidationError::Empty("refresh token"));
    }
    if token.len() < REFRESH_TOKEN_MIN_LEN {
        return Err(ValidationError::TooShort("refresh token"));
    }
    Ok(())
}

/// Shape guard only; user IDs are issued by the identity collaborator.
pub fn validate_user_id(user_id: &str) -> Result<(), ValidationError> {
    if user_id.is_empty() {
        return Err(ValidationError::Empty("user ID"));
    }
    if user_id.len() < USER_ID_MIN_LEN {
        return Err(ValidationError::TooShort("user ID"));
    }
    Ok(())
}

pub fn validate_tenant(tenant: &str) -> Result<(), ValidationError> {
    if TENANTS.contains(&tenant) {
        Ok(())
    } else {
        Err(ValidationError::UnknownTenant(tenant.to_string()))
    }
}

/// Truncate to `max` bytes without splitting a UTF-8 sequence.
fn truncate(value: &str, max: usize) -> &str {
    if value.len() <= max {
        return value;
    }
    let mut end = max;
    while !value.is_char_boundary(end) {
        end -= 1;
    }
    &value[..end]
}

#[must_use]
pub fn sanitize_user_agent(user_agent: &str) -> String {
    truncate(user_agent, USER_AGENT_MAX_LEN).to_string()
}

/// Strip a port suffix and clamp to the longest valid IP literal.
///
/// Accepts `1.2.3.4:5678`, `[::1]:5678` and bare addresses. A bare IPv6
/// address (more than one colon, no brackets) is kept whole.
#[must_use]
pub fn sanitize_ip(ip: &str) -> String {
    let ip = ip.trim();
    let host = if let Some(rest) = ip.strip_prefix('[') {
        rest.split(']').next().unwrap_or(rest)
    } else if ip.matches(':').count() == 1 {
        ip.split(':').next().unwrap_or(ip)
    } else {
        ip
    };
    truncate(host, IP_MAX_LEN).to_string()
}

/// Resolve the client IP from proxy headers, falling back to the socket peer.
#[must_use]
pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty());
    if let Some(ip) = forwarded {
        return sanitize_ip(ip);
    }
    let real_ip = headers
        .get("x-real-ip")
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty());
    if let Some(ip) = real_ip {
        return sanitize_ip(ip);
    }
    peer.map(|addr| addr.ip().to_string()).unwrap_or_default()
}

#[must_use]
pub fn is_session_expired(last_seen: DateTime<Utc>, max_age: Duration, now: DateTime<Utc>) -> bool {
    now - last_seen > max_age
}
