use thiserror::Error;

use super::validation::ValidationError;

/// Failures surfaced by [`super::SessionManager`].
///
/// Not-found and revoked sessions share one variant so callers cannot probe
/// which session IDs exist.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("session not found or revoked")]
    NotFoundOrRevoked,
    #[error("invalid or expired refresh token")]
    InvalidRefreshToken,
    #[error("refresh token reuse detected - session revoked")]
    ReuseDetected,
    #[error("failed to {operation}: {source:#}")]
    Store {
        operation: &'static str,
        #[source]
        source: anyhow::Error,
    },
}

impl SessionError {
    pub(crate) fn store(operation: &'static str) -> impl FnOnce(anyhow::Error) -> Self {
        move |source| Self::Store { operation, source }
    }

    /// True for errors caused by the presented credential rather than the
    /// infrastructure; these are terminal and never worth retrying as-is.
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        !matches!(self, Self::Store { .. })
    }
}
