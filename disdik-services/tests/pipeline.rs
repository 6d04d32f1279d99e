//! End-to-end aggregation runs against canned HTTP responses

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use disdik_core::{ScrapeRequest, SourceMode};
use disdik_news::resolver::SEARCH_PAGE_URL;
use disdik_news::sources::google_news_feed_url;
use disdik_news::DEFAULT_QUERIES;
use disdik_news::{
    AgentProfile, FeedSource, Fetch, FetchRequest, FetchResponse, NewsError, RedirectPolicy,
};
use disdik_services::{Aggregator, AggregatorConfig};

/// Serves bodies by URL; unknown URLs fail like an unreachable host
#[derive(Default)]
struct StubFetcher {
    pages: HashMap<String, (u16, String)>,
    redirects: HashMap<String, String>,
    log: Mutex<Vec<FetchRequest>>,
}

impl StubFetcher {
    fn page(mut self, url: &str, body: impl Into<String>) -> Self {
        self.pages.insert(url.to_string(), (200, body.into()));
        self
    }

    fn status(mut self, url: &str, status: u16) -> Self {
        self.pages.insert(url.to_string(), (status, String::new()));
        self
    }

    fn redirect(mut self, from: &str, to: &str) -> Self {
        self.redirects.insert(from.to_string(), to.to_string());
        self
    }

    fn requests(&self) -> Vec<FetchRequest> {
        self.log.lock().unwrap().clone()
    }

    fn count(&self, predicate: impl Fn(&FetchRequest) -> bool) -> usize {
        self.requests().iter().filter(|r| predicate(r)).count()
    }
}

#[async_trait]
impl Fetch for StubFetcher {
    async fn fetch(&self, request: FetchRequest) -> Result<FetchResponse, NewsError> {
        self.log.lock().unwrap().push(request.clone());

        if request.redirect == RedirectPolicy::Manual {
            return match self.redirects.get(&request.url) {
                Some(location) => Ok(FetchResponse {
                    status: 302,
                    headers: vec![("location".to_string(), location.clone())],
                    final_url: request.url.clone(),
                    body: String::new(),
                }),
                None => Err(NewsError::Timeout(request.url)),
            };
        }

        match self.pages.get(&request.url) {
            Some((status, body)) => Ok(FetchResponse {
                status: *status,
                headers: Vec::new(),
                final_url: request.url.clone(),
                body: body.clone(),
            }),
            None => Err(NewsError::RequestFailed(format!("no route to {}", request.url))),
        }
    }
}

struct Item<'a> {
    link: &'a str,
    title: &'a str,
    day: Option<u32>,
    image: Option<&'a str>,
}

fn item<'a>(link: &'a str, title: &'a str, day: Option<u32>, image: Option<&'a str>) -> Item<'a> {
    Item {
        link,
        title,
        day,
        image,
    }
}

fn rss(items: &[Item<'_>]) -> String {
    let body: String = items
        .iter()
        .map(|i| {
            let date = i
                .day
                .map(|d| format!("<pubDate>{:02} May 2024 08:00:00 +0000</pubDate>", d))
                .unwrap_or_default();
            let image = i
                .image
                .map(|url| format!(r#"<enclosure url="{}" length="0" type="image/jpeg"></enclosure>"#, url))
                .unwrap_or_default();
            format!(
                "<item><title>{}</title><link>{}</link><description>Berita {}</description>{}{}</item>",
                i.title, i.link, i.title, date, image
            )
        })
        .collect();

    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?><rss version="2.0"><channel><title>Feed</title><link>https://feed.example/</link><description>Feed</description>{}</channel></rss>"#,
        body
    )
}

fn og_page(image: &str) -> String {
    format!(
        r#"<html><head><meta property="og:image" content="{}"><meta property="article:published_time" content="2024-05-03T10:00:00+08:00"></head><body></body></html>"#,
        image
    )
}

fn aggregator(stub: &Arc<StubFetcher>, config: AggregatorConfig) -> Aggregator {
    Aggregator::new(stub.clone(), config)
}

fn broad(query: &str) -> ScrapeRequest {
    ScrapeRequest {
        query: Some(query.to_string()),
        mode: SourceMode::Broad,
    }
}

#[tokio::test]
async fn test_relevant_entries_ranked_with_host_sources() {
    let feed = rss(&[
        item("https://pub-a.example/beasiswa", "Disdik Gowa buka pendaftaran beasiswa", Some(2), Some("https://pub-a.example/a.jpg")),
        item("https://pub-b.example/banjir", "Banjir rendam jalan di Makassar", Some(3), None),
        item("https://pub-c.example/kasus", "Disdik Gowa diperiksa terkait korupsi", Some(4), None),
        item("https://www.pub-b.example/sekolah", "Pemkab Gowa resmikan sekolah baru", Some(5), Some("https://pub-b.example/b.jpg")),
    ]);
    let stub = Arc::new(StubFetcher::default().page(&google_news_feed_url("beasiswa"), feed));

    let (articles, stats) = aggregator(&stub, AggregatorConfig::default())
        .run_with_stats(&broad("beasiswa"))
        .await;

    assert_eq!(stats.entries, 4);
    assert_eq!(stats.relevant, 2);
    assert_eq!(articles.len(), 2);

    assert_eq!(articles[0].url, "https://www.pub-b.example/sekolah");
    assert_eq!(articles[0].source.as_deref(), Some("pub-b.example"));
    assert_eq!(articles[1].url, "https://pub-a.example/beasiswa");
    assert_eq!(articles[1].source.as_deref(), Some("pub-a.example"));
    assert_eq!(articles[1].image_url.as_deref(), Some("https://pub-a.example/a.jpg"));

    // Images came from the feed, so only the feed itself was fetched
    assert_eq!(stub.requests().len(), 1);
}

#[tokio::test]
async fn test_default_queries_poll_both_feeds() {
    let first = rss(&[
        item("https://pub-a.example/1", "Disdik Gowa salurkan beasiswa", Some(3), Some("https://pub-a.example/1.jpg")),
        item("https://pub-a.example/2", "Harga cabai naik di Makassar", Some(8), None),
    ]);
    let second = rss(&[
        item("https://pub-b.example/1", "Pendidikan Gowa raih penghargaan", Some(5), Some("https://pub-b.example/1.jpg")),
        item("https://pub-b.example/2", "Harga beras stabil di pasar Sungguminasa", Some(6), None),
    ]);
    let stub = Arc::new(
        StubFetcher::default()
            .page(&google_news_feed_url(DEFAULT_QUERIES[0]), first)
            .page(&google_news_feed_url(DEFAULT_QUERIES[1]), second),
    );
    let request = ScrapeRequest::default();

    let (articles, stats) = aggregator(&stub, AggregatorConfig::default())
        .run_with_stats(&request)
        .await;

    assert_eq!(stats.entries, 4);
    assert_eq!(stats.relevant, 2);
    let urls: Vec<_> = articles.iter().map(|a| a.url.as_str()).collect();
    assert_eq!(urls, vec!["https://pub-b.example/1", "https://pub-a.example/1"]);
    assert_eq!(articles[0].source.as_deref(), Some("pub-b.example"));
}

#[tokio::test]
async fn test_redirect_link_resolved_and_enriched() {
    let redirect = "https://news.google.com/rss/articles/CBMiLOMBA?oc=5";
    let feed = rss(&[item(redirect, "Disdik Gowa gelar lomba sains", None, None)]);
    let stub = Arc::new(
        StubFetcher::default()
            .page(&google_news_feed_url("lomba"), feed)
            .redirect(redirect, "https://news.example/lomba-sains")
            .page("https://news.example/lomba-sains", og_page("https://news.example/img/lomba.jpg")),
    );

    let (articles, stats) = aggregator(&stub, AggregatorConfig::default())
        .run_with_stats(&broad("lomba"))
        .await;

    assert_eq!(stats.resolved, 1);
    assert_eq!(stats.batch_matched, 0);
    assert_eq!(stats.enriched, 1);

    assert_eq!(articles.len(), 1);
    let article = &articles[0];
    assert_eq!(article.url, "https://news.example/lomba-sains");
    assert_eq!(article.source.as_deref(), Some("news.example"));
    assert_eq!(article.image_url.as_deref(), Some("https://news.example/img/lomba.jpg"));
    assert_eq!(
        article.published_at.map(|d| d.to_rfc3339()),
        Some("2024-05-03T02:00:00+00:00".to_string())
    );

    // The search page was tried once and failed before the ladder ran
    let search_url = format!("{}lomba", SEARCH_PAGE_URL);
    assert_eq!(stub.count(|r| r.url == search_url), 1);
    assert_eq!(stub.count(|r| r.redirect == RedirectPolicy::Manual), 1);
}

#[tokio::test]
async fn test_batch_fallback_matches_titles() {
    let first = "https://news.google.com/rss/articles/CBMiGURU?oc=5";
    let second = "https://news.google.com/rss/articles/CBMiRENO?oc=5";
    let feed = rss(&[
        item(first, "Disdik Gowa umumkan guru teladan", Some(6), Some("https://img.example/1.jpg")),
        item(second, "Disdik Gowa tinjau renovasi gedung sekolah dasar negeri", Some(7), Some("https://img.example/2.jpg")),
    ]);
    let search_page = r#"<html><body>
        <a href="/url?q=https://pub-c.example/guru-teladan&amp;sa=U&amp;ved=x">Disdik Gowa umumkan <b>guru teladan</b> tahun ini</a>
        <a href="/url?q=https://news.google.com/topics/abc&amp;sa=U">Google News</a>
    </body></html>"#;

    let stub = Arc::new(
        StubFetcher::default()
            .page(&google_news_feed_url("guru"), feed)
            .page(&format!("{}guru", SEARCH_PAGE_URL), search_page)
            .redirect(second, "https://pub-d.example/renovasi"),
    );

    let (articles, stats) = aggregator(&stub, AggregatorConfig::default())
        .run_with_stats(&broad("guru"))
        .await;

    assert_eq!(stats.batch_matched, 1);
    assert_eq!(stats.resolved, 1);

    let urls: Vec<_> = articles.iter().map(|a| a.url.as_str()).collect();
    assert_eq!(urls, vec!["https://pub-d.example/renovasi", "https://pub-c.example/guru-teladan"]);

    assert_eq!(stub.count(|r| r.url.starts_with(SEARCH_PAGE_URL)), 1);
    // The matched link never went through the ladder
    assert_eq!(stub.count(|r| r.url == first), 0);
}

#[tokio::test]
async fn test_enrichment_respects_budget() {
    let links: Vec<String> = (0..15).map(|i| format!("https://pub.example/berita-{}", i)).collect();
    let titles: Vec<String> = (0..15).map(|i| format!("Disdik Gowa berita nomor {}", i)).collect();
    let items: Vec<Item<'_>> = (0..15)
        .map(|i| item(&links[i], &titles[i], Some(i as u32 + 1), None))
        .collect();

    let mut stub = StubFetcher::default().page(&google_news_feed_url("berita"), rss(&items));
    for (i, link) in links.iter().enumerate() {
        stub = stub.page(link, og_page(&format!("https://pub.example/img/{}.jpg", i)));
    }
    let stub = Arc::new(stub);

    let config = AggregatorConfig {
        target_count: 20,
        ..Default::default()
    };
    let (articles, stats) = aggregator(&stub, config).run_with_stats(&broad("berita")).await;

    assert_eq!(articles.len(), 15);
    assert_eq!(stats.enrichment_attempts, 10);
    assert_eq!(stub.count(|r| r.profile == AgentProfile::Browser), 10);

    // The ten most recent were enriched
    for article in &articles[..10] {
        assert!(article.image_url.is_some(), "{} should be enriched", article.url);
    }
    for article in &articles[10..] {
        assert!(article.image_url.is_none(), "{} should not be enriched", article.url);
    }
    assert_eq!(articles.iter().filter(|a| a.image_url.is_none()).count(), 5);
}

#[tokio::test]
async fn test_duplicates_collapsed_and_truncated() {
    let feed = rss(&[
        item("https://pub.example/a", "Disdik Gowa kabar pertama", Some(1), Some("https://pub.example/a.jpg")),
        item("https://pub.example/b", "Disdik Gowa kabar kedua", Some(2), Some("https://pub.example/b.jpg")),
        item("https://pub.example/a", "Disdik Gowa kabar pertama diperbarui", Some(9), Some("https://pub.example/a.jpg")),
        item("https://pub.example/c", "Disdik Gowa kabar ketiga", Some(3), Some("https://pub.example/c.jpg")),
        item("https://pub.example/d", "Disdik Gowa kabar keempat", Some(4), Some("https://pub.example/d.jpg")),
    ]);
    let stub = Arc::new(StubFetcher::default().page(&google_news_feed_url("kabar"), feed));

    let config = AggregatorConfig {
        target_count: 3,
        ..Default::default()
    };
    let (articles, stats) = aggregator(&stub, config).run_with_stats(&broad("kabar")).await;

    assert_eq!(stats.relevant, 5);
    assert_eq!(stats.deduplicated, 4);
    assert_eq!(articles.len(), 3);

    assert_eq!(articles[0].url, "https://pub.example/a");
    assert_eq!(articles[0].title, "Disdik Gowa kabar pertama diperbarui");
    assert_eq!(articles[1].url, "https://pub.example/d");
    assert_eq!(articles[2].url, "https://pub.example/c");
}

#[tokio::test]
async fn test_curated_mode_returns_early_when_target_met() {
    let curated = rss(&[
        item("https://curated.example/1", "Disdik Gowa salurkan bantuan seragam", Some(1), Some("https://curated.example/1.jpg")),
        item("https://curated.example/2", "Disdik Gowa luncurkan program literasi", Some(2), Some("https://curated.example/2.jpg")),
    ]);
    let stub = Arc::new(StubFetcher::default().page("https://curated.example/feed", curated));

    let config = AggregatorConfig {
        target_count: 2,
        curated_feeds: vec![FeedSource::publisher("https://curated.example/feed")],
        ..Default::default()
    };
    let request = ScrapeRequest {
        query: None,
        mode: SourceMode::Curated,
    };
    let articles = aggregator(&stub, config).run(&request).await;

    assert_eq!(articles.len(), 2);
    assert_eq!(stub.count(|r| r.url.contains("news.google.com")), 0);
}

#[tokio::test]
async fn test_curated_mode_falls_through_to_search() {
    let curated = rss(&[item(
        "https://curated.example/1",
        "Disdik Gowa salurkan bantuan seragam",
        Some(1),
        Some("https://curated.example/1.jpg"),
    )]);
    let search = rss(&[item(
        "https://pub.example/literasi",
        "Disdik Gowa luncurkan program literasi",
        Some(2),
        Some("https://pub.example/literasi.jpg"),
    )]);
    let stub = Arc::new(
        StubFetcher::default()
            .page("https://curated.example/feed", curated)
            .page(&google_news_feed_url("literasi"), search),
    );

    let config = AggregatorConfig {
        target_count: 2,
        curated_feeds: vec![FeedSource::publisher("https://curated.example/feed")],
        ..Default::default()
    };
    let request = ScrapeRequest {
        query: Some("literasi".to_string()),
        mode: SourceMode::Curated,
    };
    let articles = aggregator(&stub, config).run(&request).await;

    let urls: Vec<_> = articles.iter().map(|a| a.url.as_str()).collect();
    assert_eq!(urls, vec!["https://pub.example/literasi", "https://curated.example/1"]);
}

#[tokio::test]
async fn test_relative_feed_links_resolved_against_feed_url() {
    let curated = rss(&[
        item("/berita/1", "Disdik Gowa gelar pelatihan guru", Some(1), Some("https://curated.example/1.jpg")),
        item("mailto:redaksi@curated.example", "Disdik Gowa buka layanan pengaduan", Some(2), None),
    ]);
    let stub = Arc::new(StubFetcher::default().page("https://curated.example/feed", curated));

    let config = AggregatorConfig {
        target_count: 5,
        curated_feeds: vec![FeedSource::publisher("https://curated.example/feed")],
        ..Default::default()
    };
    let request = ScrapeRequest {
        query: Some("pelatihan".to_string()),
        mode: SourceMode::Curated,
    };
    let (articles, stats) = aggregator(&stub, config).run_with_stats(&request).await;

    assert_eq!(stats.entries, 2);
    assert_eq!(stats.relevant, 1);
    assert_eq!(articles.len(), 1);
    assert_eq!(articles[0].url, "https://curated.example/berita/1");
    assert_eq!(articles[0].source.as_deref(), Some("curated.example"));
}

#[tokio::test]
async fn test_failed_sources_yield_no_candidates() {
    let stub = Arc::new(
        StubFetcher::default()
            .status(&google_news_feed_url("sepi"), 503)
            .page(&google_news_feed_url("rusak"), "<html>not a feed</html>"),
    );
    let aggregator = aggregator(&stub, AggregatorConfig::default());

    assert!(matches!(
        aggregator.try_run(&broad("sepi")).await,
        Err(NewsError::NoCandidates)
    ));
    assert!(aggregator.run(&broad("rusak")).await.is_empty());
}
