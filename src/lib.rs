//! # sessiond
//!
//! Session issuance, validation, refresh-token rotation and revocation behind
//! an HTTP API.
//!
//! ## Tokens
//!
//! A session ID is 32 random bytes, base64url encoded, and doubles as the
//! access token (`access_token` cookie). The refresh secret (`refresh_token`
//! cookie) has the same shape. Only SHA-256 digests of refresh secrets, user
//! agents and client IPs are stored.
//!
//! ## Rotation
//!
//! Every refresh consumes the presented token and issues exactly one
//! successor. Presenting a token that was already consumed, while it has not
//! expired yet, revokes the whole session.

pub mod api;
pub mod cli;
pub mod session;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};
