//! Time source for session bookkeeping.

use chrono::{DateTime, Utc};

/// Every timestamp the manager writes or compares comes from here, so expiry
/// boundaries can be pinned in tests.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
