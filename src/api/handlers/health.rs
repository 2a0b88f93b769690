use crate::GIT_COMMIT_HASH;
use axum::{
    body::Body,
    extract::Extension,
    http::{HeaderMap, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use sqlx::{Connection, PgPool};
use tracing::{debug, error, info_span, Instrument};
use utoipa::ToSchema;

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct Health {
    commit: String,
    name: String,
    version: String,
    /// `ok` when a pooled connection answered a ping, `error` otherwise.
    database: String,
}

impl Health {
    fn new(database_ok: bool) -> Self {
        Self {
            commit: GIT_COMMIT_HASH.to_string(),
            name: env!("CARGO_PKG_NAME").to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            database: if database_ok { "ok" } else { "error" }.to_string(),
        }
    }

    fn status(&self) -> StatusCode {
        if self.database == "ok" {
            StatusCode::OK
        } else {
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}

async fn ping_database(pool: &PgPool) -> bool {
    let acquire_span = info_span!(
        "db.acquire",
        db.system = "postgresql",
        db.operation = "ACQUIRE"
    );
    let mut conn = match pool.acquire().instrument(acquire_span).await {
        Ok(conn) => conn,
        Err(err) => {
            error!("Failed to acquire database connection: {err}");
            return false;
        }
    };

    let ping_span = info_span!("db.ping", db.system = "postgresql", db.operation = "PING");
    match conn.ping().instrument(ping_span).await {
        Ok(()) => true,
        Err(err) => {
            error!("Failed to ping database: {err}");
            false
        }
    }
}

#[utoipa::path(
    get,
    path= "/health",
    responses (
        (status = 200, description = "Session store is reachable", body = Health),
        (status = 503, description = "Session store is unreachable", body = Health)
    ),
    tag= "health"
)]
// GET returns the JSON body, OPTIONS only the status and X-App header
pub async fn health(method: Method, pool: Extension<PgPool>) -> Response {
    let health = Health::new(ping_database(&pool).await);
    let status = health.status();
    debug!(database = %health.database, "health check");

    let headers = x_app_headers(&health.name, &health.version, &health.commit);
    if method == Method::GET {
        (status, headers, Json(health)).into_response()
    } else {
        (status, headers, Body::empty()).into_response()
    }
}

/// `X-App: name:version:short-hash`, empty headers if the value is not valid.
fn x_app_headers(name: &str, version: &str, commit: &str) -> HeaderMap {
    let short_hash = commit.get(0..7).filter(|_| commit.len() > 7).unwrap_or("");

    let mut headers = HeaderMap::new();
    match HeaderValue::from_str(&format!("{name}:{version}:{short_hash}")) {
        Ok(value) => {
            headers.insert("X-App", value);
        }
        Err(err) => error!("Failed to build X-App header: {err}"),
    }
    headers
}
