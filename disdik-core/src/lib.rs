//! Core types for the Disdik Gowa news pipeline
//!
//! This crate defines the shared data structures used across the pipeline:
//! raw feed entries, in-flight candidates, finalized articles, and the
//! request/query shapes consumed by the service and API layers.

pub mod error;
pub mod news;

pub use error::{CoreError, CoreResult};
pub use news::{
    Article, Candidate, NewsQuery, RawEntry, ScrapeRequest, SourceMode, StoredArticle,
    UpsertOutcome,
};
