//! News Aggregator
//!
//! Orchestrates one acquisition run: poll feeds, keep relevant entries,
//! dedup, resolve aggregator links, enrich missing metadata from publisher
//! pages, then rank and truncate.
//!
//! Every per-source and per-item failure is logged and degrades only that
//! source or item. A run that ends with nothing to return reports
//! [`NewsError::NoCandidates`].

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use futures::stream::{self, StreamExt};
use indexmap::IndexMap;
use tracing::{debug, info, instrument, warn};

use disdik_core::{Article, Candidate, RawEntry, ScrapeRequest, SourceMode};
use disdik_news::{
    absolutize, best_match, curated_feeds, extract_page_metadata, hostname, is_aggregator_redirect,
    search_feeds, strip_html, try_parse_feed, FeedSource, Fetch, FetchRequest, LinkResolver,
    NewsError, PageMetadata, RelevanceClassifier, DEFAULT_QUERIES,
};

/// Configuration for [`Aggregator`]
#[derive(Debug, Clone)]
pub struct AggregatorConfig {
    /// Maximum articles returned per run
    pub target_count: usize,
    /// Relevant candidates collected before dedup/resolution
    pub collect_cap: usize,
    /// Publisher page fetches allowed per run for enrichment
    pub enrichment_cap: usize,
    pub feed_timeout: Duration,
    /// Bound on each step of the resolution ladder
    pub resolve_step_timeout: Duration,
    /// Bound on publisher and search page fetches
    pub page_timeout: Duration,
    /// Share of aggregator links that triggers the search-page fallback
    pub batch_fallback_ratio: f64,
    /// Concurrent resolutions/enrichments within a run
    pub item_concurrency: usize,
    pub curated_feeds: Vec<FeedSource>,
    pub classifier: RelevanceClassifier,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            target_count: 10,
            collect_cap: 30, // headroom for dedup and resolution losses
            enrichment_cap: 10,
            feed_timeout: Duration::from_millis(5000),
            resolve_step_timeout: Duration::from_millis(1300),
            page_timeout: Duration::from_millis(8000),
            batch_fallback_ratio: 0.5,
            item_concurrency: 4,
            curated_feeds: curated_feeds(),
            classifier: RelevanceClassifier::default(),
        }
    }
}

impl AggregatorConfig {
    /// Defaults overridden by `SCRAPE_TARGET`, `SCRAPE_COLLECT_CAP`,
    /// `SCRAPE_ENRICH_CAP` and `CURATED_FEEDS` (comma-separated feed URLs)
    pub fn from_env() -> Result<Self, NewsError> {
        let mut config = Self::default();

        config.target_count = env_usize("SCRAPE_TARGET", config.target_count)?;
        config.collect_cap = env_usize("SCRAPE_COLLECT_CAP", config.collect_cap)?;
        config.enrichment_cap = env_usize("SCRAPE_ENRICH_CAP", config.enrichment_cap)?;

        if let Ok(raw) = std::env::var("CURATED_FEEDS") {
            let feeds: Vec<FeedSource> = raw
                .split(',')
                .map(str::trim)
                .filter(|u| !u.is_empty())
                .map(FeedSource::publisher)
                .collect();
            if !feeds.is_empty() {
                config.curated_feeds = feeds;
            }
        }

        if config.target_count == 0 {
            return Err(NewsError::InvalidConfig("SCRAPE_TARGET must be at least 1".to_string()));
        }
        if config.collect_cap < config.target_count {
            config.collect_cap = config.target_count;
        }

        Ok(config)
    }
}

fn env_usize(name: &str, default: usize) -> Result<usize, NewsError> {
    match std::env::var(name) {
        Ok(raw) => raw.trim().parse::<usize>().map_err(|_| {
            NewsError::InvalidConfig(format!("{} must be a non-negative integer, got {:?}", name, raw))
        }),
        Err(_) => Ok(default),
    }
}

/// Per-stage counters for one run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunStats {
    /// Entries read from all feeds
    pub entries: usize,
    /// Entries that passed the relevance check
    pub relevant: usize,
    pub deduplicated: usize,
    /// Links fixed by the search-page fallback
    pub batch_matched: usize,
    /// Links fixed by the resolution ladder
    pub resolved: usize,
    pub enrichment_attempts: usize,
    pub enriched: usize,
    pub returned: usize,
    pub elapsed_ms: u64,
}

/// Mutable bookkeeping shared by the stages of one run
#[derive(Debug, Default)]
struct RunState {
    stats: RunStats,
    enrich_budget: usize,
    attempted: HashSet<String>,
}

/// Runs the acquisition pipeline against a [`Fetch`] implementation
pub struct Aggregator {
    fetcher: Arc<dyn Fetch>,
    resolver: LinkResolver,
    config: AggregatorConfig,
}

impl Aggregator {
    pub fn new(fetcher: Arc<dyn Fetch>, config: AggregatorConfig) -> Self {
        info!(
            "Initializing Aggregator (target: {}, collect cap: {}, enrichment cap: {}, curated feeds: {})",
            config.target_count,
            config.collect_cap,
            config.enrichment_cap,
            config.curated_feeds.len()
        );
        Self {
            resolver: LinkResolver::new(fetcher.clone(), config.resolve_step_timeout),
            fetcher,
            config,
        }
    }

    pub fn config(&self) -> &AggregatorConfig {
        &self.config
    }

    /// Run once, treating "nothing found" and any run-level failure as an empty list
    pub async fn run(&self, request: &ScrapeRequest) -> Vec<Article> {
        match self.try_run(request).await {
            Ok(articles) => articles,
            Err(NewsError::NoCandidates) => {
                info!("Aggregation run found no qualifying articles");
                Vec::new()
            }
            Err(e) => {
                warn!("Aggregation run failed: {}", e);
                Vec::new()
            }
        }
    }

    /// Run once; an empty result is reported as [`NewsError::NoCandidates`]
    pub async fn try_run(&self, request: &ScrapeRequest) -> Result<Vec<Article>, NewsError> {
        let (articles, _) = self.run_with_stats(request).await;
        if articles.is_empty() {
            return Err(NewsError::NoCandidates);
        }
        Ok(articles)
    }

    /// Run once and return the per-stage counters alongside the articles
    #[instrument(skip(self), fields(mode = ?request.mode, query = ?request.search_text()))]
    pub async fn run_with_stats(&self, request: &ScrapeRequest) -> (Vec<Article>, RunStats) {
        let started = Instant::now();
        let mut state = RunState {
            enrich_budget: self.config.enrichment_cap,
            ..Default::default()
        };

        let mut candidates = Vec::new();

        if request.mode == SourceMode::Curated {
            let curated = self
                .collect(&self.config.curated_feeds, self.config.collect_cap, &mut state)
                .await;
            let mut curated = dedup_by_url(curated);
            state.stats.deduplicated = curated.len();
            self.enrich(&mut curated, &mut state).await;

            if curated.len() >= self.config.target_count {
                debug!("Curated feeds alone reached the target ({} candidates)", curated.len());
                return self.finish(curated, state, started);
            }
            candidates = curated;
        }

        let remaining = self.config.collect_cap.saturating_sub(candidates.len());
        let search = search_feeds(request.search_text());
        candidates.extend(self.collect(&search, remaining, &mut state).await);

        let mut candidates = dedup_by_url(candidates);
        state.stats.deduplicated = candidates.len();

        if candidates.is_empty() {
            return self.finish(candidates, state, started);
        }

        let search_query = request.search_text().unwrap_or(DEFAULT_QUERIES[0]);
        let mut batch_done = false;

        if redirect_share(&candidates) >= self.config.batch_fallback_ratio {
            self.batch_fallback(&mut candidates, search_query, &mut state).await;
            batch_done = true;
        }

        self.resolve_links(&mut candidates, &mut state).await;

        if !batch_done && redirect_share(&candidates) >= self.config.batch_fallback_ratio {
            self.batch_fallback(&mut candidates, search_query, &mut state).await;
        }

        let mut candidates = dedup_by_url(candidates);
        self.enrich(&mut candidates, &mut state).await;

        self.finish(candidates, state, started)
    }

    /// Fetch feeds concurrently, then classify entries in source order up to `limit`
    async fn collect(&self, sources: &[FeedSource], limit: usize, state: &mut RunState) -> Vec<Candidate> {
        if limit == 0 || sources.is_empty() {
            return Vec::new();
        }

        let fetched = join_all(sources.iter().map(|source| self.fetch_source(source))).await;

        let mut collected = Vec::new();
        let entries = sources
            .iter()
            .zip(fetched)
            .flat_map(|(source, entries)| entries.into_iter().map(move |e| (source, e)));

        for (source, entry) in entries {
            state.stats.entries += 1;

            let Some(candidate) = to_candidate(entry, &source.url) else {
                debug!(source = %source.name, "Dropping entry without an http(s) link");
                continue;
            };

            let relevance = self.config.classifier.classify(&candidate.match_text());
            if !relevance.is_relevant() {
                debug!(
                    title = %candidate.title,
                    negative = ?relevance.negative,
                    "Dropping irrelevant entry"
                );
                continue;
            }

            state.stats.relevant += 1;
            collected.push(candidate);
            if collected.len() >= limit {
                break;
            }
        }

        collected
    }

    async fn fetch_source(&self, source: &FeedSource) -> Vec<RawEntry> {
        let request = FetchRequest::get(&source.url, self.config.feed_timeout);

        let response = match self.fetcher.fetch(request).await.and_then(|r| r.error_for_status()) {
            Ok(response) => response,
            Err(e) => {
                warn!("Failed to fetch feed {}: {}", source.name, e);
                return Vec::new();
            }
        };

        match try_parse_feed(&response.body) {
            Ok(entries) => {
                debug!("Fetched {} entries from {}", entries.len(), source.name);
                entries
            }
            Err(e) => {
                warn!("Failed to parse feed {}: {}", source.name, e);
                Vec::new()
            }
        }
    }

    /// Match still-unresolved candidates against one search results page
    async fn batch_fallback(&self, candidates: &mut [Candidate], query: &str, state: &mut RunState) {
        let cards = match self.resolver.search_cards(query, self.config.page_timeout).await {
            Ok(cards) => cards,
            Err(e) => {
                warn!("Search page fallback failed: {}", e);
                return;
            }
        };

        if cards.is_empty() {
            debug!("Search page fallback returned no result cards");
            return;
        }

        for candidate in candidates.iter_mut().filter(|c| is_aggregator_redirect(&c.url)) {
            if let Some(card) = best_match(&candidate.title, &cards) {
                debug!(title = %candidate.title, url = %card.url, "Matched via search page");
                candidate.url = card.url.clone();
                state.stats.batch_matched += 1;
            }
        }
    }

    /// Walk the resolution ladder for every remaining aggregator link
    async fn resolve_links(&self, candidates: &mut [Candidate], state: &mut RunState) {
        let pending: Vec<(usize, String)> = candidates
            .iter()
            .enumerate()
            .filter(|(_, c)| is_aggregator_redirect(&c.url))
            .map(|(i, c)| (i, c.url.clone()))
            .collect();

        if pending.is_empty() {
            return;
        }

        let resolutions: Vec<_> = stream::iter(pending)
            .map(|(i, url)| async move { (i, self.resolver.resolve(&url).await) })
            .buffered(self.config.item_concurrency.max(1))
            .collect()
            .await;

        for (i, resolution) in resolutions {
            match resolution.into_url() {
                Some(url) => {
                    candidates[i].url = url;
                    state.stats.resolved += 1;
                }
                None => debug!(url = %candidates[i].url, "Keeping unresolved aggregator link"),
            }
        }
    }

    /// Fetch publisher pages for the most recent image-less candidates, within budget
    async fn enrich(&self, candidates: &mut [Candidate], state: &mut RunState) {
        let mut targets: Vec<usize> = (0..candidates.len())
            .filter(|&i| {
                let c = &candidates[i];
                c.image_url.is_none()
                    && !is_aggregator_redirect(&c.url)
                    && !state.attempted.contains(&c.url)
            })
            .collect();

        targets.sort_by(|&a, &b| by_recency(&candidates[a], &candidates[b]));
        targets.truncate(state.enrich_budget);

        if targets.is_empty() {
            return;
        }

        state.enrich_budget -= targets.len();
        state.stats.enrichment_attempts += targets.len();

        let jobs: Vec<(usize, String)> = targets
            .into_iter()
            .map(|i| (i, candidates[i].url.clone()))
            .collect();
        state.attempted.extend(jobs.iter().map(|(_, url)| url.clone()));

        let pages: Vec<_> = stream::iter(jobs)
            .map(|(i, url)| async move { (i, self.fetch_page(&url).await) })
            .buffered(self.config.item_concurrency.max(1))
            .collect()
            .await;

        for (i, page) in pages {
            if let Some(page) = page {
                if apply_page(&mut candidates[i], page) {
                    state.stats.enriched += 1;
                }
            }
        }
    }

    async fn fetch_page(&self, url: &str) -> Option<PageMetadata> {
        let request = FetchRequest::get(url, self.config.page_timeout).browser();
        match self.fetcher.fetch(request).await.and_then(|r| r.error_for_status()) {
            Ok(response) => Some(extract_page_metadata(&response.body, Some(&response.final_url))),
            Err(e) => {
                debug!(url, error = %e, "Enrichment fetch failed");
                None
            }
        }
    }

    /// Rank, fill sources, convert and truncate
    fn finish(&self, mut candidates: Vec<Candidate>, mut state: RunState, started: Instant) -> (Vec<Article>, RunStats) {
        candidates.sort_by(by_recency);

        let articles: Vec<Article> = candidates
            .into_iter()
            .filter_map(|mut candidate| {
                if candidate.source.is_none() {
                    candidate.source = hostname(&candidate.url);
                }
                match Article::try_from(candidate) {
                    Ok(article) => Some(article),
                    Err(e) => {
                        debug!("Dropping candidate: {}", e);
                        None
                    }
                }
            })
            .take(self.config.target_count)
            .collect();

        state.stats.returned = articles.len();
        state.stats.elapsed_ms = started.elapsed().as_millis() as u64;

        let stats = state.stats;
        info!(
            entries = stats.entries,
            relevant = stats.relevant,
            deduplicated = stats.deduplicated,
            batch_matched = stats.batch_matched,
            resolved = stats.resolved,
            enrichment_attempts = stats.enrichment_attempts,
            enriched = stats.enriched,
            returned = stats.returned,
            elapsed_ms = stats.elapsed_ms,
            "Aggregation run complete"
        );

        (articles, stats)
    }
}

/// Links are resolved against the feed URL; entries left without an http(s) link are dropped
fn to_candidate(mut entry: RawEntry, feed_url: &str) -> Option<Candidate> {
    entry.link = entry.link.as_deref().and_then(|link| absolutize(feed_url, link));
    let summary = strip_html(&entry.description);
    Candidate::from_entry(entry, Some(summary))
}

/// Dedup by URL: the last value wins, the first position is kept
fn dedup_by_url(candidates: Vec<Candidate>) -> Vec<Candidate> {
    let mut by_url: IndexMap<String, Candidate> = IndexMap::with_capacity(candidates.len());
    for candidate in candidates {
        by_url.insert(candidate.url.clone(), candidate);
    }
    by_url.into_values().collect()
}

fn redirect_share(candidates: &[Candidate]) -> f64 {
    if candidates.is_empty() {
        return 0.0;
    }
    let redirects = candidates.iter().filter(|c| is_aggregator_redirect(&c.url)).count();
    redirects as f64 / candidates.len() as f64
}

/// Newest first; `None` sorts below every timestamp
fn by_recency(a: &Candidate, b: &Candidate) -> std::cmp::Ordering {
    b.published_at.cmp(&a.published_at)
}

/// Fill only the fields that are still missing. Returns whether anything changed.
fn apply_page(candidate: &mut Candidate, page: PageMetadata) -> bool {
    let mut changed = false;

    if candidate.image_url.is_none() && page.image_url.is_some() {
        candidate.image_url = page.image_url;
        changed = true;
    }
    if candidate.published_at.is_none() && page.published_at.is_some() {
        candidate.published_at = page.published_at;
        changed = true;
    }
    if candidate.title.trim().is_empty() {
        if let Some(title) = page.title {
            candidate.title = title;
            changed = true;
        }
    }

    changed
}
