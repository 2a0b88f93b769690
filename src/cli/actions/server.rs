use crate::{api, cli::telemetry, session::SessionConfig};
use anyhow::Result;
use secrecy::SecretString;
use std::time::Duration;
use tracing::debug;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: SecretString,
    pub session: SessionConfig,
    pub request_timeout: Duration,
}

/// Execute the server action.
/// # Errors
/// Returns an error if the database is unreachable or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    debug!(
        "access TTL {}s, refresh TTL {}s, SameSite={}",
        args.session.access_ttl().as_secs(),
        args.session.refresh_ttl().as_secs(),
        args.session.cookie_same_site()
    );

    let result = api::new(args.port, args.dsn, args.session, args.request_timeout).await;

    telemetry::shutdown_tracer();

    result
}
