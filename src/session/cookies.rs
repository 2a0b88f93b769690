//! `Set-Cookie` construction and `Cookie` header parsing for the session pair.

use axum::http::{
    header::{AUTHORIZATION, COOKIE},
    HeaderMap, HeaderValue,
};
use std::time::Duration;

use super::config::SessionConfig;

pub const ACCESS_TOKEN_COOKIE: &str = "access_token";
pub const REFRESH_TOKEN_COOKIE: &str = "refresh_token";

/// Build one `HttpOnly` cookie with the configured domain, `Secure` and
/// `SameSite` flags. `max_age` of `None` expires the cookie immediately.
fn build_cookie(
    config: &SessionConfig,
    name: &str,
    value: &str,
    max_age: Option<Duration>,
) -> Result<HeaderValue, axum::http::header::InvalidHeaderValue> {
    let max_age = max_age.map_or(0, |ttl| ttl.as_secs());
    let mut cookie = format!("{name}={value}; Path=/; Max-Age={max_age}; HttpOnly");
    if let Some(domain) = config.cookie_domain() {
        cookie.push_str("; Domain=");
        cookie.push_str(domain);
    }
    if config.cookie_secure() {
        cookie.push_str("; Secure");
    }
    cookie.push_str("; SameSite=");
    cookie.push_str(config.cookie_same_site().as_str());
    HeaderValue::from_str(&cookie)
}

/// Cookies carrying a freshly issued access/refresh pair.
pub fn session_cookies(
    config: &SessionConfig,
    access_token: &str,
    refresh_token: &str,
) -> Result<[HeaderValue; 2], axum::http::header::InvalidHeaderValue> {
    Ok([
        build_cookie(
            config,
            ACCESS_TOKEN_COOKIE,
            access_token,
            Some(config.access_ttl()),
        )?,
        build_cookie(
            config,
            REFRESH_TOKEN_COOKIE,
            refresh_token,
            Some(config.refresh_ttl()),
        )?,
    ])
}

/// Cookies that make the browser drop both session cookies.
pub fn clear_cookies(
    config: &SessionConfig,
) -> Result<[HeaderValue; 2], axum::http::header::InvalidHeaderValue> {
    Ok([
        build_cookie(config, ACCESS_TOKEN_COOKIE, "", None)?,
        build_cookie(config, REFRESH_TOKEN_COOKIE, "", None)?,
    ])
}

/// Find a cookie value by name across every `Cookie` header.
#[must_use]
pub fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|header| header.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| {
            let mut parts = pair.trim().splitn(2, '=');
            let key = parts.next()?.trim();
            let val = parts.next()?.trim();
            (key == name).then(|| val.to_string())
        })
        .find(|val| !val.is_empty())
}

#[must_use]
pub fn access_token(headers: &HeaderMap) -> Option<String> {
    cookie_value(headers, ACCESS_TOKEN_COOKIE)
}

#[must_use]
pub fn refresh_token(headers: &HeaderMap) -> Option<String> {
    cookie_value(headers, REFRESH_TOKEN_COOKIE)
}

/// Bearer credential from the `Authorization` header, if any.
#[must_use]
pub fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let token = value.trim().strip_prefix("Bearer ")?.trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}
