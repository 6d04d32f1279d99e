//! News acquisition for the Disdik Gowa pipeline
//!
//! This crate provides the building blocks the aggregator chains together:
//! - Fetcher: bounded-timeout HTTP with a configurable redirect policy
//! - Feed parser: RSS 2.0 / Atom into raw entries
//! - Relevance: organization gate with a negative-term veto
//! - Extract: image, publish date and title from publisher pages
//! - Resolver: aggregator redirect links into publisher links

pub mod error;
pub mod extract;
pub mod feed;
pub mod fetcher;
pub mod relevance;
pub mod resolver;
pub mod sources;

pub use error::NewsError;
pub use extract::{absolutize, extract_page_metadata, hostname, parse_timestamp, strip_html, PageMetadata};
pub use feed::{parse_feed, try_parse_feed};
pub use fetcher::{
    AgentProfile, Fetch, FetchRequest, FetchResponse, FetcherConfig, HttpFetcher, RedirectPolicy,
};
pub use relevance::{Relevance, RelevanceClassifier};
pub use resolver::{
    best_match, is_aggregator_internal, is_aggregator_redirect, normalize_title, similarity,
    LinkResolver, Resolution, SearchCard,
};
pub use sources::{curated_feeds, search_feeds, FeedSource, DEFAULT_QUERIES};
