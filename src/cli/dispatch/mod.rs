//! Map parsed CLI arguments to the action the binary runs.

use crate::cli::{
    actions::{server::Args, Action},
    commands::{self, session},
};
use anyhow::{bail, Context, Result};
use secrecy::SecretString;
use std::time::Duration;
use url::Url;

/// Map validated CLI matches to a server action.
///
/// # Errors
/// Returns an error if required arguments are missing or the DSN is not a
/// PostgreSQL URL.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches
        .get_one::<u16>(commands::ARG_PORT)
        .copied()
        .unwrap_or(8080);
    let dsn = matches
        .get_one::<String>(commands::ARG_DSN)
        .cloned()
        .context("missing required argument: --dsn")?;

    let parsed = Url::parse(&dsn).context("invalid --dsn, expected postgres://...")?;
    if !matches!(parsed.scheme(), "postgres" | "postgresql") {
        bail!("invalid --dsn scheme: {}", parsed.scheme());
    }

    let request_timeout = matches
        .get_one::<u64>(commands::ARG_REQUEST_TIMEOUT)
        .copied()
        .context("missing required argument: --request-timeout")?;

    Ok(Action::Server(Args {
        port,
        dsn: SecretString::from(dsn),
        session: session::parse(matches)?,
        request_timeout: Duration::from_secs(request_timeout),
    }))
}
