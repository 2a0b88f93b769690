use super::handlers::{health, session};
use crate::session::SessionSummary;
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health,
        session::refresh,
        session::logout,
        session::current_session,
        session::list_sessions,
        session::revoke_session,
    ),
    components(schemas(
        health::Health,
        session::RefreshResponse,
        session::SessionInfo,
        SessionSummary,
    )),
    tags(
        (name = "health", description = "Liveness and database reachability"),
        (name = "auth", description = "Token refresh, logout and current session"),
        (name = "sessions", description = "A user's active sessions")
    )
)]
pub struct ApiDoc;
