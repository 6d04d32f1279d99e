//! HTTP fetcher shared by every pipeline stage
//!
//! All network access goes through the [`Fetch`] trait so the pipeline can be
//! driven by canned responses in tests. [`HttpFetcher`] is the reqwest-backed
//! implementation used in production.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{ACCEPT_LANGUAGE, LOCATION, USER_AGENT};
use reqwest::{redirect, Client, Method};
use tokio::sync::Semaphore;
use tracing::debug;

use crate::error::NewsError;

/// User-Agent sent when reading syndication feeds
pub const BOT_USER_AGENT: &str = "Mozilla/5.0 RovoDevBot";

/// User-Agent sent when reading search pages and publisher pages
pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120 Safari/537.36";

/// Response bodies are cut off after this many bytes
pub const MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

/// Accept-Language sent with the browser profile
pub const BROWSER_ACCEPT_LANGUAGE: &str = "id-ID,id;q=0.9,en-US;q=0.8,en;q=0.7";

/// Whether redirects are followed or handed back to the caller
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RedirectPolicy {
    #[default]
    Follow,
    /// Return the 3xx response as-is so the caller can read `Location`
    Manual,
}

/// Header profile attached to a request
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AgentProfile {
    #[default]
    Bot,
    Browser,
}

/// A single bounded request
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub url: String,
    pub method: Method,
    /// Extra headers, applied after the profile headers
    pub headers: Vec<(String, String)>,
    pub redirect: RedirectPolicy,
    pub timeout: Duration,
    pub profile: AgentProfile,
}

impl FetchRequest {
    /// GET with redirects followed and the bot profile
    pub fn get(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            url: url.into(),
            method: Method::GET,
            headers: Vec::new(),
            redirect: RedirectPolicy::Follow,
            timeout,
            profile: AgentProfile::Bot,
        }
    }

    pub fn manual_redirect(mut self) -> Self {
        self.redirect = RedirectPolicy::Manual;
        self
    }

    pub fn browser(mut self) -> Self {
        self.profile = AgentProfile::Browser;
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

/// Response as seen by the pipeline
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchResponse {
    pub status: u16,
    /// Header names are lowercase
    pub headers: Vec<(String, String)>,
    /// URL after any followed redirects
    pub final_url: String,
    pub body: String,
}

impl FetchResponse {
    /// Case-insensitive header lookup (first value wins)
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// The `Location` header, if present and non-empty
    pub fn location(&self) -> Option<&str> {
        self.header(LOCATION.as_str())
            .map(str::trim)
            .filter(|l| !l.is_empty())
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Turn a non-2xx response into [`NewsError::Status`]
    pub fn error_for_status(self) -> Result<Self, NewsError> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(NewsError::Status {
                status: self.status,
                url: self.final_url,
            })
        }
    }
}

/// Bounded-timeout HTTP access
#[async_trait]
pub trait Fetch: Send + Sync {
    async fn fetch(&self, request: FetchRequest) -> Result<FetchResponse, NewsError>;
}

/// Configuration for [`HttpFetcher`]
#[derive(Debug, Clone)]
pub struct FetcherConfig {
    /// Maximum concurrent requests across the whole process
    pub max_in_flight: usize,
    pub bot_user_agent: String,
    pub browser_user_agent: String,
    pub accept_language: String,
    /// Maximum redirect hops for the follow policy
    pub max_redirects: usize,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            max_in_flight: 8,
            bot_user_agent: BOT_USER_AGENT.to_string(),
            browser_user_agent: BROWSER_USER_AGENT.to_string(),
            accept_language: BROWSER_ACCEPT_LANGUAGE.to_string(),
            max_redirects: 10,
        }
    }
}

impl FetcherConfig {
    /// Load overrides from `FETCH_MAX_IN_FLIGHT` and `FETCH_USER_AGENT`
    pub fn from_env() -> Result<Self, NewsError> {
        let mut config = Self::default();

        if let Ok(raw) = std::env::var("FETCH_MAX_IN_FLIGHT") {
            config.max_in_flight = raw
                .trim()
                .parse::<usize>()
                .ok()
                .filter(|n| *n > 0)
                .ok_or_else(|| {
                    NewsError::InvalidConfig(format!("FETCH_MAX_IN_FLIGHT must be a positive integer, got {:?}", raw))
                })?;
        }

        if let Ok(agent) = std::env::var("FETCH_USER_AGENT") {
            if !agent.trim().is_empty() {
                config.bot_user_agent = agent.trim().to_string();
            }
        }

        Ok(config)
    }
}

/// reqwest-backed [`Fetch`] with a shared connection pool
pub struct HttpFetcher {
    follow: Client,
    manual: Client,
    permits: Arc<Semaphore>,
    config: FetcherConfig,
}

impl HttpFetcher {
    pub fn new(config: FetcherConfig) -> Result<Self, NewsError> {
        let follow = Client::builder()
            .redirect(redirect::Policy::limited(config.max_redirects))
            .build()
            .map_err(|e| NewsError::InvalidConfig(e.to_string()))?;

        let manual = Client::builder()
            .redirect(redirect::Policy::none())
            .build()
            .map_err(|e| NewsError::InvalidConfig(e.to_string()))?;

        Ok(Self {
            follow,
            manual,
            permits: Arc::new(Semaphore::new(config.max_in_flight.max(1))),
            config,
        })
    }

    pub fn config(&self) -> &FetcherConfig {
        &self.config
    }
}

#[async_trait]
impl Fetch for HttpFetcher {
    /// The permit wait counts against `request.timeout` as well as the transfer
    async fn fetch(&self, request: FetchRequest) -> Result<FetchResponse, NewsError> {
        let url = request.url.clone();
        tokio::time::timeout(request.timeout, self.send(request))
            .await
            .map_err(|_| NewsError::Timeout(url))?
    }
}

impl HttpFetcher {
    async fn send(&self, request: FetchRequest) -> Result<FetchResponse, NewsError> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|e| NewsError::RequestFailed(e.to_string()))?;

        let client = match request.redirect {
            RedirectPolicy::Follow => &self.follow,
            RedirectPolicy::Manual => &self.manual,
        };

        let mut builder = client
            .request(request.method.clone(), &request.url)
            .timeout(request.timeout);

        builder = match request.profile {
            AgentProfile::Bot => builder.header(USER_AGENT, &self.config.bot_user_agent),
            AgentProfile::Browser => builder
                .header(USER_AGENT, &self.config.browser_user_agent)
                .header(ACCEPT_LANGUAGE, &self.config.accept_language),
        };

        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let mut response = builder
            .send()
            .await
            .map_err(|e| classify_error(&request.url, e))?;

        let status = response.status().as_u16();
        let final_url = response.url().to_string();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();

        let mut buf = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| classify_error(&request.url, e))?
        {
            if !push_capped(&mut buf, &chunk, MAX_BODY_BYTES) {
                debug!(url = %request.url, limit = MAX_BODY_BYTES, "body truncated");
                break;
            }
        }
        let body = String::from_utf8_lossy(&buf).into_owned();

        debug!(url = %request.url, status, final_url = %final_url, "fetched");

        Ok(FetchResponse {
            status,
            headers,
            final_url,
            body,
        })
    }
}

/// Append up to `cap` bytes in total; false once the cap is hit
fn push_capped(buf: &mut Vec<u8>, chunk: &[u8], cap: usize) -> bool {
    let room = cap.saturating_sub(buf.len());
    if chunk.len() > room {
        buf.extend_from_slice(&chunk[..room]);
        return false;
    }
    buf.extend_from_slice(chunk);
    buf.len() < cap
}

fn classify_error(url: &str, err: reqwest::Error) -> NewsError {
    if err.is_timeout() {
        NewsError::Timeout(url.to_string())
    } else {
        NewsError::RequestFailed(format!("{}: {}", url, err))
    }
}
