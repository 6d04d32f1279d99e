//! Scrape endpoints

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde_json::json;
use tracing::{error, info};

use disdik_core::ScrapeRequest;

use super::error_response;
use crate::AppState;

/// Articles included in a dry-run response
const DRY_RUN_SAMPLE: usize = 3;

/// Create scrape routes
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/scrape", get(scrape).post(scrape))
        .route("/scrape/dryrun", get(dry_run))
}

/// GET|POST /api/scrape - Run the pipeline and store the results
async fn scrape(
    State(state): State<AppState>,
    Query(request): Query<ScrapeRequest>,
) -> impl IntoResponse {
    let articles = state.aggregator.run(&request).await;
    info!("Scrape returned {} articles", articles.len());

    let store = match state.store.get().await {
        Ok(store) => store,
        Err(e) => {
            error!("Failed to open news store: {}", e);
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, e);
        }
    };

    let scraped = articles.len();
    let stored = tokio::task::spawn_blocking(move || store.upsert(&articles)).await;

    match stored {
        Ok(Ok(outcome)) => (
            StatusCode::OK,
            Json(json!({
                "ok": true,
                "scraped": scraped,
                "result": outcome,
            })),
        )
            .into_response(),
        Ok(Err(e)) => {
            error!("Failed to store scraped articles: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e)
        }
        Err(e) => {
            error!("Store task failed: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, e)
        }
    }
}

/// GET /api/scrape/dryrun - Run the pipeline without storing anything
async fn dry_run(
    State(state): State<AppState>,
    Query(request): Query<ScrapeRequest>,
) -> impl IntoResponse {
    let articles = state.aggregator.run(&request).await;
    let sample: Vec<_> = articles.iter().take(DRY_RUN_SAMPLE).collect();

    Json(json!({
        "ok": true,
        "scraped": articles.len(),
        "sample": sample,
    }))
}
