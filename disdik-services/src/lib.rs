//! Services for the Disdik Gowa news pipeline
//!
//! This crate chains the building blocks from `disdik-news` into a single
//! acquisition run and persists its results.

pub mod aggregator;
pub mod news_store;

pub use aggregator::{Aggregator, AggregatorConfig, RunStats};
pub use news_store::{NewsStore, StoreError, StoreHandle};
