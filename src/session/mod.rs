//! Session and refresh-token lifecycle.

pub mod cleanup;
pub mod clock;
pub mod codec;
pub mod config;
pub mod cookies;
pub mod error;
pub mod manager;
pub mod pg;
pub mod rate_limit;
pub mod store;
pub mod validation;

pub use cleanup::CleanupService;
pub use clock::{Clock, SystemClock};
pub use config::{SameSite, SessionConfig};
pub use error::SessionError;
pub use manager::{IssuedSession, RefreshedSession, SessionManager};
pub use pg::PgSessionStore;
pub use rate_limit::{RateLimitDecision, RateLimitService};
pub use store::{RefreshToken, Rotation, Session, SessionStore, SessionSummary};
pub use validation::ValidationError;
