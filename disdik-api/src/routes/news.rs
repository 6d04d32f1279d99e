//! Stored news endpoints

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, error};

use disdik_core::NewsQuery;

use super::error_response;
use crate::AppState;

/// Query parameters for listing stored news
#[derive(Debug, Deserialize)]
pub struct NewsParams {
    /// Search text; every word must appear in the title or summary
    pub q: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// Create news routes
pub fn routes() -> Router<AppState> {
    Router::new().route("/news", get(list_news))
}

/// GET /api/news - Page through stored articles, newest first
async fn list_news(
    State(state): State<AppState>,
    Query(params): Query<NewsParams>,
) -> impl IntoResponse {
    let query = match NewsQuery::from_params(params.q, params.limit, params.offset) {
        Ok(query) => query,
        Err(e) => {
            debug!("Rejected news query: {}", e);
            return error_response(StatusCode::BAD_REQUEST, e);
        }
    };

    let store = match state.store.get().await {
        Ok(store) => store,
        Err(e) => {
            error!("Failed to open news store: {}", e);
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, e);
        }
    };

    let queried = tokio::task::spawn_blocking(move || store.query(&query)).await;

    match queried {
        Ok(Ok(articles)) => (
            StatusCode::OK,
            Json(json!({
                "ok": true,
                "count": articles.len(),
                "data": articles,
            })),
        )
            .into_response(),
        Ok(Err(e)) => {
            error!("Failed to query news: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e)
        }
        Err(e) => {
            error!("Store task failed: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e)
        }
    }
}
