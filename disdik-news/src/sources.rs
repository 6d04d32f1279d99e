//! Feed source catalogue
//!
//! Aggregator search feeds are built from queries; curated feeds point
//! straight at regional publishers and carry direct article links.

/// Default broad queries used when the caller gives no search text
pub const DEFAULT_QUERIES: [&str; 2] = [
    "\"Dinas Pendidikan Kabupaten Gowa\" OR \"Disdik Gowa\"",
    "Pendidikan Gowa",
];

const GOOGLE_NEWS_RSS: &str = "https://news.google.com/rss/search";

/// A feed to poll
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedSource {
    /// Name of the source
    pub name: String,
    /// RSS/Atom feed URL
    pub url: String,
}

impl FeedSource {
    pub fn new(name: &str, url: &str) -> Self {
        Self {
            name: name.to_string(),
            url: url.to_string(),
        }
    }

    /// Aggregator search feed for a query (Indonesian edition)
    pub fn search(query: &str) -> Self {
        Self {
            name: format!("Google News: {}", query),
            url: google_news_feed_url(query),
        }
    }

    /// Publisher feed named after its host
    pub fn publisher(url: &str) -> Self {
        let name = crate::extract::hostname(url).unwrap_or_else(|| url.to_string());
        Self::new(&name, url)
    }
}

/// Google News RSS search URL for a query
pub fn google_news_feed_url(query: &str) -> String {
    format!(
        "{}?q={}&hl=id&gl=ID&ceid=ID:id",
        GOOGLE_NEWS_RSS,
        urlencoding::encode(query)
    )
}

/// One search feed for the given text, or the default pair
pub fn search_feeds(query: Option<&str>) -> Vec<FeedSource> {
    match query.map(str::trim).filter(|q| !q.is_empty()) {
        Some(q) => vec![FeedSource::search(q)],
        None => DEFAULT_QUERIES.iter().map(|q| FeedSource::search(q)).collect(),
    }
}

/// Curated regional publisher feeds
pub fn curated_feeds() -> Vec<FeedSource> {
    vec![
        // Wire service, South Sulawesi desk
        FeedSource::new("Antara Makassar", "https://makassar.antaranews.com/rss/terkini.xml"),
        // Regional dailies
        FeedSource::new("Tribun Timur", "https://makassar.tribunnews.com/rss"),
        FeedSource::new("Fajar", "https://fajar.co.id/feed/"),
        FeedSource::new("Rakyat Sulsel", "https://rakyatsulsel.fajar.co.id/feed/"),
        // Regency government portal
        FeedSource::new("Pemkab Gowa", "https://gowakab.go.id/feed/"),
    ]
}
