//! Disdik Gowa news API
//!
//! Router and shared state for the HTTP server. The binary in `main.rs`
//! wires real collaborators into [`AppState`] and serves [`app`].

pub mod routes;

use std::sync::Arc;

use axum::{
    http::{header, Method},
    Router,
};
use disdik_services::{Aggregator, StoreHandle};
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub aggregator: Arc<Aggregator>,
    /// Opened on first use so dry runs never touch the database
    pub store: Arc<StoreHandle>,
}

impl AppState {
    pub fn new(aggregator: Aggregator, store: StoreHandle) -> Self {
        Self {
            aggregator: Arc::new(aggregator),
            store: Arc::new(store),
        }
    }
}

/// Build the full router with request tracing and CORS applied
pub fn app(state: AppState) -> Router {
    // Configure CORS for frontend
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    Router::new()
        .nest("/api", routes::api_routes())
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}
