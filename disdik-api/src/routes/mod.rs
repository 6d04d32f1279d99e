//! API route definitions

mod health;
mod news;
mod scrape;

use axum::{http::StatusCode, response::IntoResponse, Json, Router};
use serde_json::json;

use crate::AppState;

/// Create all API routes
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .merge(scrape::routes())
        .merge(news::routes())
        .merge(health::routes())
}

/// `{ ok: false, error }` body shared by every failing handler
fn error_response(status: StatusCode, error: impl std::fmt::Display) -> axum::response::Response {
    (
        status,
        Json(json!({
            "ok": false,
            "error": error.to_string(),
        })),
    )
        .into_response()
}
