//! Disdik Gowa News API Server
//!
//! HTTP API server that scrapes, stores and serves Disdik Gowa news.

use std::net::SocketAddr;
use std::sync::Arc;

use disdik_api::{app, AppState};
use disdik_news::{FetcherConfig, HttpFetcher};
use disdik_services::{Aggregator, AggregatorConfig, StoreHandle};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env.local file
    if let Err(e) = dotenvy::from_filename(".env.local") {
        // Not an error if the file doesn't exist
        if !matches!(e, dotenvy::Error::Io(_)) {
            eprintln!("Warning: Failed to load .env.local: {}", e);
        }
    }

    // Initialize logging
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,disdik_api=debug,disdik_services=debug")),
        )
        .init();

    info!("Starting Disdik Gowa News API");

    let fetcher = HttpFetcher::new(FetcherConfig::from_env()?)?;
    let aggregator = Aggregator::new(Arc::new(fetcher), AggregatorConfig::from_env()?);

    // Database is opened lazily on the first scrape or query
    let store = StoreHandle::from_env();
    info!("News store path: {}", store.path().display());

    let state = AppState::new(aggregator, store);

    // Start server
    let port = std::env::var("SERVER_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(3001);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("Server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app(state)).await?;

    Ok(())
}
