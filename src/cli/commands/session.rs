use crate::session::{SameSite, SessionConfig};
use anyhow::{Context, Result};
use clap::{Arg, ArgAction, ArgMatches, Command};
use std::time::Duration;

pub const ARG_ACCESS_TTL: &str = "access-ttl";
pub const ARG_REFRESH_TTL: &str = "refresh-ttl";
pub const ARG_COOKIE_DOMAIN: &str = "cookie-domain";
pub const ARG_COOKIE_SECURE: &str = "cookie-secure";
pub const ARG_COOKIE_SAME_SITE: &str = "cookie-same-site";
pub const ARG_CLEANUP_INTERVAL: &str = "cleanup-interval";

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_ACCESS_TTL)
                .long(ARG_ACCESS_TTL)
                .help("Access token (session cookie) TTL in seconds")
                .env("SESSIOND_ACCESS_TTL")
                .default_value("900")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new(ARG_REFRESH_TTL)
                .long(ARG_REFRESH_TTL)
                .help("Refresh token TTL in seconds")
                .env("SESSIOND_REFRESH_TTL")
                .default_value("604800")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new(ARG_COOKIE_DOMAIN)
                .long(ARG_COOKIE_DOMAIN)
                .help("Cookie Domain attribute, host-only cookies when unset")
                .env("SESSIOND_COOKIE_DOMAIN"),
        )
        .arg(
            Arg::new(ARG_COOKIE_SECURE)
                .long(ARG_COOKIE_SECURE)
                .help("Mark session cookies Secure (HTTPS only)")
                .env("SESSIOND_COOKIE_SECURE")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new(ARG_COOKIE_SAME_SITE)
                .long(ARG_COOKIE_SAME_SITE)
                .help("Cookie SameSite mode: Lax, Strict or None")
                .env("SESSIOND_COOKIE_SAME_SITE")
                .default_value("Lax")
                .value_parser(|value: &str| value.parse::<SameSite>()),
        )
        .arg(
            Arg::new(ARG_CLEANUP_INTERVAL)
                .long(ARG_CLEANUP_INTERVAL)
                .help("Seconds between idle session and expired token sweeps")
                .env("SESSIOND_CLEANUP_INTERVAL")
                .default_value("3600")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
}

/// Build the manager configuration from parsed arguments.
///
/// # Errors
/// Returns an error if an argument with a default value is missing.
pub fn parse(matches: &ArgMatches) -> Result<SessionConfig> {
    let access_ttl = matches
        .get_one::<u64>(ARG_ACCESS_TTL)
        .copied()
        .context("missing required argument: --access-ttl")?;
    let refresh_ttl = matches
        .get_one::<u64>(ARG_REFRESH_TTL)
        .copied()
        .context("missing required argument: --refresh-ttl")?;
    let same_site = matches
        .get_one::<SameSite>(ARG_COOKIE_SAME_SITE)
        .copied()
        .unwrap_or_default();
    let cleanup_interval = matches
        .get_one::<u64>(ARG_CLEANUP_INTERVAL)
        .copied()
        .context("missing required argument: --cleanup-interval")?;

    Ok(SessionConfig::new()
        .with_access_ttl(Duration::from_secs(access_ttl))
        .with_refresh_ttl(Duration::from_secs(refresh_ttl))
        .with_cookie_domain(matches.get_one::<String>(ARG_COOKIE_DOMAIN).cloned())
        .with_cookie_secure(matches.get_flag(ARG_COOKIE_SECURE))
        .with_cookie_same_site(same_site)
        .with_cleanup_interval(Duration::from_secs(cleanup_interval)))
}
