//! Session manager configuration.

use std::{fmt, str::FromStr, time::Duration};

const DEFAULT_ACCESS_TTL_SECONDS: u64 = 15 * 60;
const DEFAULT_REFRESH_TTL_SECONDS: u64 = 7 * 24 * 60 * 60;
const DEFAULT_CLEANUP_INTERVAL_SECONDS: u64 = 60 * 60;

/// Sessions idle longer than this are revoked by the cleanup sweep.
pub const IDLE_SESSION_MAX_AGE: Duration = Duration::from_secs(30 * 24 * 60 * 60);
/// Refresh tokens are kept this long past expiry before being deleted.
pub const EXPIRED_TOKEN_RETENTION: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// `SameSite` attribute applied to both session cookies.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SameSite {
    #[default]
    Lax,
    Strict,
    None,
}

impl SameSite {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Lax => "Lax",
            Self::Strict => "Strict",
            Self::None => "None",
        }
    }
}

impl fmt::Display for SameSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SameSite {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "lax" => Ok(Self::Lax),
            "strict" => Ok(Self::Strict),
            "none" => Ok(Self::None),
            _ => Err(format!("invalid SameSite mode: {value} (expected Lax, Strict or None)")),
        }
    }
}

#[derive(Clone, Debug)]
pub struct SessionConfig {
    access_ttl: Duration,
    refresh_ttl: Duration,
    cookie_domain: Option<String>,
    cookie_secure: bool,
    cookie_same_site: SameSite,
    cleanup_interval: Duration,
}

impl SessionConfig {
    /// Defaults: 15 minute access TTL, 7 day refresh TTL, `SameSite=Lax`,
    /// insecure cookies without a domain, hourly cleanup.
    #[must_use]
    pub fn new() -> Self {
        Self {
            access_ttl: Duration::from_secs(DEFAULT_ACCESS_TTL_SECONDS),
            refresh_ttl: Duration::from_secs(DEFAULT_REFRESH_TTL_SECONDS),
            cookie_domain: None,
            cookie_secure: false,
            cookie_same_site: SameSite::Lax,
            cleanup_interval: Duration::from_secs(DEFAULT_CLEANUP_INTERVAL_SECONDS),
        }
    }

    #[must_use]
    pub fn with_access_ttl(mut self, ttl: Duration) -> Self {
        self.access_ttl = ttl;
        self
    }

    #[must_use]
    pub fn with_refresh_ttl(mut self, ttl: Duration) -> Self {
        self.refresh_ttl = ttl;
        self
    }

    /// An empty domain means host-only cookies.
    #[must_use]
    pub fn with_cookie_domain(mut self, domain: Option<String>) -> Self {
        self.cookie_domain = domain.filter(|domain| !domain.trim().is_empty());
        self
    }

    #[must_use]
    pub fn with_cookie_secure(mut self, secure: bool) -> Self {
        self.cookie_secure = secure;
        self
    }

    #[must_use]
    pub fn with_cookie_same_site(mut self, same_site: SameSite) -> Self {
        self.cookie_same_site = same_site;
        self
    }

    #[must_use]
    pub fn with_cleanup_interval(mut self, interval: Duration) -> Self {
        self.cleanup_interval = interval;
        self
    }

    #[must_use]
    pub fn access_ttl(&self) -> Duration {
        self.access_ttl
    }

    #[must_use]
    pub fn refresh_ttl(&self) -> Duration {
        self.refresh_ttl
    }

    #[must_use]
    pub fn cookie_domain(&self) -> Option<&str> {
        self.cookie_domain.as_deref()
    }

    #[must_use]
    pub fn cookie_secure(&self) -> bool {
        self.cookie_secure
    }

    #[must_use]
    pub fn cookie_same_site(&self) -> SameSite {
        self.cookie_same_site
    }

    /// Never zero: `tokio::time::interval` panics on a zero period.
    #[must_use]
    pub fn cleanup_interval(&self) -> Duration {
        if self.cleanup_interval.is_zero() {
            Duration::from_secs(1)
        } else {
            self.cleanup_interval
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::new()
    }
}
