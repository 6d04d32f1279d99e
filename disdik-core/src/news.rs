//! News data structures for the acquisition pipeline

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

/// Default page size for stored-news queries
pub const DEFAULT_QUERY_LIMIT: usize = 20;

/// Hard upper bound on a single stored-news page
pub const MAX_QUERY_LIMIT: usize = 100;

/// A single entry as it comes out of a syndication feed
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawEntry {
    /// Entry link, possibly an aggregator redirect
    pub link: Option<String>,
    pub title: String,
    /// Description or summary, still carrying any embedded HTML
    pub description: String,
    pub published_at: Option<DateTime<Utc>>,
    /// Publisher name declared by the feed (e.g. `<source>` or `dc:creator`)
    pub source_hint: Option<String>,
    /// First image found in the entry's media, enclosure or description
    pub media_url: Option<String>,
}

/// Working unit carried through dedup, resolution and enrichment
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Candidate {
    pub url: String,
    pub title: String,
    pub summary: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub source: Option<String>,
    pub image_url: Option<String>,
}

impl Candidate {
    /// Build a candidate from a feed entry. Entries without a link are dropped.
    pub fn from_entry(entry: RawEntry, summary: Option<String>) -> Option<Self> {
        let url = entry.link.filter(|l| !l.trim().is_empty())?;

        Some(Self {
            url: url.trim().to_string(),
            title: entry.title,
            summary: summary.filter(|s| !s.is_empty()),
            published_at: entry.published_at,
            source: entry.source_hint.filter(|s| !s.is_empty()),
            image_url: entry.media_url,
        })
    }

    /// Text used for relevance classification
    pub fn match_text(&self) -> String {
        format!("{} {}", self.title, self.summary.as_deref().unwrap_or_default())
    }
}

/// Finalized, immutable output record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    pub url: String,
    pub title: String,
    pub summary: Option<String>,
    pub source: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub image_url: Option<String>,
}

impl Article {
    pub fn url(&self) -> &str {
        &self.url
    }
}

impl TryFrom<Candidate> for Article {
    type Error = CoreError;

    fn try_from(candidate: Candidate) -> CoreResult<Self> {
        let url = candidate.url.trim().to_string();
        if url.is_empty() {
            return Err(CoreError::invalid_article("missing url"));
        }

        let title = candidate.title.trim().to_string();
        if title.is_empty() {
            return Err(CoreError::invalid_article(format!("missing title for {}", url)));
        }

        Ok(Self {
            url,
            title,
            summary: candidate.summary,
            source: candidate.source,
            published_at: candidate.published_at,
            image_url: candidate.image_url,
        })
    }
}

/// Where candidate articles are sourced from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceMode {
    /// Aggregator search feeds only
    #[default]
    Broad,
    /// Fixed publisher feeds first, aggregator search feeds as top-up
    Curated,
}

/// Parameters for one aggregation run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrapeRequest {
    /// Targeted search text; the default broad queries are used when absent
    #[serde(default, rename = "q", skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    #[serde(default)]
    pub mode: SourceMode,
}

impl ScrapeRequest {
    /// The trimmed search text, if any was given
    pub fn search_text(&self) -> Option<&str> {
        self.query.as_deref().map(str::trim).filter(|q| !q.is_empty())
    }
}

/// Result of merging a batch of articles into storage
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpsertOutcome {
    pub inserted: usize,
    pub updated: usize,
}

/// Paged query over stored articles
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewsQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search_text: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default)]
    pub offset: usize,
}

impl Default for NewsQuery {
    fn default() -> Self {
        Self {
            search_text: None,
            limit: DEFAULT_QUERY_LIMIT,
            offset: 0,
        }
    }
}

impl NewsQuery {
    /// Build a query from loosely-typed request parameters.
    ///
    /// The limit defaults to 20 and is capped at 100. Negative values are rejected.
    pub fn from_params(
        search_text: Option<String>,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> CoreResult<Self> {
        let limit = match limit {
            Some(l) if l < 0 => return Err(CoreError::invalid_query("limit must not be negative")),
            Some(l) => (l as usize).min(MAX_QUERY_LIMIT),
            None => DEFAULT_QUERY_LIMIT,
        };
        let offset = match offset {
            Some(o) if o < 0 => return Err(CoreError::invalid_query("offset must not be negative")),
            Some(o) => o as usize,
            None => 0,
        };

        Ok(Self {
            search_text: search_text
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty()),
            limit,
            offset,
        })
    }
}

fn default_limit() -> usize {
    DEFAULT_QUERY_LIMIT
}

/// An article as read back from storage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredArticle {
    pub id: i64,
    pub url: String,
    pub title: String,
    pub summary: Option<String>,
    pub source: Option<String>,
    pub image_url: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}
