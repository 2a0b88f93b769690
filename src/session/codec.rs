//! Secret generation and one-way hashing for tokens and client attributes.
//!
//! Raw secrets are only ever handed to the client (cookie or response body);
//! the database stores their SHA-256 digest and lookups go through the digest.

use anyhow::{Context, Result};
use base64ct::{Base64UrlUnpadded, Encoding};
use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha256};

/// Random bytes behind every session ID and refresh secret.
pub const SECRET_BYTES: usize = 32;

/// Create a new opaque secret (session ID or refresh token).
///
/// 32 bytes from the OS RNG, base64url without padding, so 43 characters.
pub fn generate_secret() -> Result<String> {
    let mut bytes = [0u8; SECRET_BYTES];
    OsRng
        .try_fill_bytes(&mut bytes)
        .context("failed to generate random secret")?;
    Ok(Base64UrlUnpadded::encode_string(&bytes))
}

/// Hash a token so the raw value never touches the database.
#[must_use]
pub fn hash_token(token: &str) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hasher.finalize().to_vec()
}

/// Hash a user agent or client IP for storage.
#[must_use]
pub fn hash_client_attribute(value: &str) -> Vec<u8> {
    hash_token(value)
}

/// Public, non-secret name of a session, safe to show in listings.
///
/// The session ID is the access token, so it never leaves the cookie. The
/// handle is the first 16 bytes of its SHA-256, base64url encoded.
#[must_use]
pub fn session_handle(session_id: &str) -> String {
    let digest = hash_token(session_id);
    Base64UrlUnpadded::encode_string(&digest[..16])
}
