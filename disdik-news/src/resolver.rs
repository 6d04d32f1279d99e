//! Aggregator link resolution
//!
//! Aggregator feeds link to redirect pages rather than publishers. The
//! [`LinkResolver`] walks a short ladder of cheap requests per link, and the
//! search-page helpers recover publisher URLs for many links at once by
//! matching titles against a news search results page.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;
use url::Url;

use crate::error::NewsError;
use crate::extract::{absolutize, tag_attributes};
use crate::fetcher::{Fetch, FetchRequest};

/// News search results page; the query is appended percent-encoded
pub const SEARCH_PAGE_URL: &str = "https://www.google.com/search?tbm=nws&q=";

/// Minimum title similarity for a search-page match
pub const MIN_TITLE_SIMILARITY: f64 = 0.2;

/// Upper bound on result anchors read from one search page
pub const MAX_SEARCH_CARDS: usize = 100;

static CURRENT_CARD_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?is)<a[^>]+href="/url\?q=([^"&]+)[^"]*"[^>]*>(.*?)</a>"#)
        .expect("valid card regex")
});

static LEGACY_CARD_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?is)<a[^>]+href="/url\?url=([^"&]+)[^"]*"[^>]*>(.*?)</a>"#)
        .expect("valid legacy card regex")
});

static REFRESH_URL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)url\s*=\s*['"]?([^'";\s]+)"#).expect("valid refresh regex")
});

static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]+>").expect("valid tag regex"));
static ENTITY_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"&[^;\s]+;").expect("valid entity regex"));
static NON_ALNUM_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^\p{L}\p{N}\s]").expect("valid symbol regex"));
static SPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid space regex"));

/// Whether a link points at an aggregator article redirect
pub fn is_aggregator_redirect(url: &str) -> bool {
    let Ok(parsed) = Url::parse(url) else {
        return false;
    };
    if parsed.host_str() != Some("news.google.com") {
        return false;
    }
    parsed
        .path_segments()
        .is_some_and(|mut segments| segments.any(|s| s == "articles" || s == "read"))
}

/// Whether a link stays inside the aggregator (any google.com host)
pub fn is_aggregator_internal(url: &str) -> bool {
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_ascii_lowercase))
        .is_some_and(|host| host == "google.com" || host.ends_with(".google.com"))
}

/// How a link was resolved
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// `Location` header of the unfollowed redirect
    Location(String),
    /// Final URL after following redirects
    FinalUrl(String),
    MetaRefresh(String),
    Canonical(String),
    /// Every step failed; the original link is kept
    Unresolved,
}

impl Resolution {
    pub fn url(&self) -> Option<&str> {
        match self {
            Resolution::Location(u)
            | Resolution::FinalUrl(u)
            | Resolution::MetaRefresh(u)
            | Resolution::Canonical(u) => Some(u),
            Resolution::Unresolved => None,
        }
    }

    pub fn into_url(self) -> Option<String> {
        self.url().map(str::to_string)
    }

    pub fn is_resolved(&self) -> bool {
        !matches!(self, Resolution::Unresolved)
    }
}

/// Resolves aggregator links to publisher links
pub struct LinkResolver {
    fetcher: Arc<dyn Fetch>,
    step_timeout: Duration,
}

impl LinkResolver {
    pub fn new(fetcher: Arc<dyn Fetch>, step_timeout: Duration) -> Self {
        Self {
            fetcher,
            step_timeout,
        }
    }

    /// Run the resolution ladder; the first step that yields a publisher URL wins
    pub async fn resolve(&self, url: &str) -> Resolution {
        // 1. Unfollowed redirect
        let manual = FetchRequest::get(url, self.step_timeout)
            .manual_redirect()
            .browser();
        match self.fetcher.fetch(manual).await {
            Ok(response) => {
                if let Some(location) = response.location().and_then(publisher_url) {
                    return Resolution::Location(location);
                }
            }
            Err(e) => debug!(url, error = %e, "manual redirect attempt failed"),
        }

        // 2. Followed redirect
        let response = match self
            .fetcher
            .fetch(FetchRequest::get(url, self.step_timeout).browser())
            .await
        {
            Ok(response) => response,
            Err(e) => {
                debug!(url, error = %e, "follow redirect attempt failed");
                return Resolution::Unresolved;
            }
        };

        if let Some(final_url) = publisher_url(&response.final_url) {
            return Resolution::FinalUrl(final_url);
        }

        let base = if response.final_url.is_empty() {
            url
        } else {
            response.final_url.as_str()
        };

        // 3. Meta refresh, 4. canonical link
        if let Some(target) = meta_refresh_target(&response.body, base) {
            return Resolution::MetaRefresh(target);
        }
        if let Some(target) = canonical_link(&response.body, base) {
            return Resolution::Canonical(target);
        }

        Resolution::Unresolved
    }

    /// Fetch the news search results page for `query` and extract its result cards
    pub async fn search_cards(&self, query: &str, timeout: Duration) -> Result<Vec<SearchCard>, NewsError> {
        let url = format!("{}{}", SEARCH_PAGE_URL, urlencoding::encode(query));
        let response = self
            .fetcher
            .fetch(FetchRequest::get(url, timeout).browser())
            .await?
            .error_for_status()?;

        Ok(extract_search_cards(&response.body))
    }
}

/// Absolute http(s) URL outside the aggregator
fn publisher_url(candidate: &str) -> Option<String> {
    let parsed = Url::parse(candidate.trim()).ok()?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return None;
    }
    let url = parsed.to_string();
    (!is_aggregator_internal(&url)).then_some(url)
}

/// Target of `<meta http-equiv="refresh" content="0;url=...">`
pub fn meta_refresh_target(html: &str, base: &str) -> Option<String> {
    tag_attributes(html, "meta").find_map(|attrs| {
        let is_refresh = attrs
            .get("http-equiv")
            .is_some_and(|v| v.eq_ignore_ascii_case("refresh"));
        if !is_refresh {
            return None;
        }
        let content = attrs.get("content")?;
        let target = REFRESH_URL_RE.captures(content)?.get(1)?.as_str();
        absolutize(base, target).and_then(|u| publisher_url(&u))
    })
}

/// Target of `<link rel="canonical" href="...">`
pub fn canonical_link(html: &str, base: &str) -> Option<String> {
    tag_attributes(html, "link").find_map(|attrs| {
        let is_canonical = attrs
            .get("rel")
            .is_some_and(|rel| rel.split_whitespace().any(|r| r.eq_ignore_ascii_case("canonical")));
        if !is_canonical {
            return None;
        }
        absolutize(base, attrs.get("href")?).and_then(|u| publisher_url(&u))
    })
}

/// One result anchor from a search page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchCard {
    /// Normalized anchor text
    pub title: String,
    pub url: String,
}

/// Extract result cards; the current grammar is tried before the legacy one
pub fn extract_search_cards(html: &str) -> Vec<SearchCard> {
    let cards = cards_with(&CURRENT_CARD_RE, html);
    if !cards.is_empty() {
        return cards;
    }
    cards_with(&LEGACY_CARD_RE, html)
}

fn cards_with(re: &Regex, html: &str) -> Vec<SearchCard> {
    re.captures_iter(html)
        .filter_map(|caps| {
            let url = urlencoding::decode(caps.get(1)?.as_str()).ok()?.into_owned();
            if !(url.starts_with("http://") || url.starts_with("https://")) || url.contains("news.google.com/") {
                return None;
            }
            let title = normalize_title(caps.get(2)?.as_str());
            (!title.is_empty()).then_some(SearchCard { title, url })
        })
        .take(MAX_SEARCH_CARDS)
        .collect()
}

/// Pick the card whose title is most similar to `title`, if similar enough
pub fn best_match<'a>(title: &str, cards: &'a [SearchCard]) -> Option<&'a SearchCard> {
    cards
        .iter()
        .map(|card| (similarity(title, &card.title), card))
        .filter(|(score, _)| *score >= MIN_TITLE_SIMILARITY)
        .fold(None, |best: Option<(f64, &SearchCard)>, (score, card)| match best {
            Some((top, _)) if top >= score => best,
            _ => Some((score, card)),
        })
        .map(|(_, card)| card)
}

/// Lowercase, drop tags, entities and symbols, collapse whitespace
pub fn normalize_title(text: &str) -> String {
    let lower = text.to_lowercase();
    let no_tags = TAG_RE.replace_all(&lower, " ");
    let no_entities = ENTITY_RE.replace_all(&no_tags, " ");
    let alnum = NON_ALNUM_RE.replace_all(&no_entities, " ");
    SPACE_RE.replace_all(&alnum, " ").trim().to_string()
}

/// Jaccard index over normalized tokens longer than two characters
pub fn similarity(a: &str, b: &str) -> f64 {
    let left = tokens(a);
    let right = tokens(b);
    if left.is_empty() || right.is_empty() {
        return 0.0;
    }
    let shared = left.intersection(&right).count();
    let union = left.union(&right).count();
    shared as f64 / union as f64
}

fn tokens(text: &str) -> HashSet<String> {
    normalize_title(text)
        .split_whitespace()
        .filter(|t| t.chars().count() > 2)
        .map(str::to_string)
        .collect()
}
