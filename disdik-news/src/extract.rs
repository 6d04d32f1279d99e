//! Metadata extraction from publisher HTML
//!
//! Pages are treated as untrusted text and scanned with regexes only; every
//! lookup yields `None` instead of failing when markup is missing or broken.

use std::borrow::Cow;
use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;

/// Meta keys consulted for a publish date, in priority order
pub const PUBLISH_DATE_KEYS: [&str; 6] = [
    "article:published_time",
    "og:updated_time",
    "og:published_time",
    "date",
    "pubdate",
    "publish-date",
];

static ATTR_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?s)([A-Za-z_:][-A-Za-z0-9_:.]*)\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'>]+))"#)
        .expect("valid attribute regex")
});

static META_TAG_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<meta\b([^>]*)>").expect("valid meta regex"));

static LINK_TAG_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<link\b([^>]*)>").expect("valid link regex"));

static IMG_SRC_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?is)<img\b[^>]*?\bsrc\s*=\s*["']([^"'>]+)["']"#).expect("valid img regex")
});

static TIME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?is)<time\b[^>]*?\bdatetime\s*=\s*["']([^"'>]+)["']"#).expect("valid time regex")
});

static TITLE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<title\b[^>]*>(.*?)</title>").expect("valid title regex"));

/// Metadata recovered from one publisher page
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageMetadata {
    pub image_url: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub title: Option<String>,
}

/// Extract image, publish date and title from a page body.
///
/// `page_url` is used to absolutize relative image references.
pub fn extract_page_metadata(html: &str, page_url: Option<&str>) -> PageMetadata {
    PageMetadata {
        image_url: extract_image(html, page_url),
        published_at: extract_published_at(html),
        title: extract_title(html),
    }
}

/// `og:image`, then `twitter:image`, then the first `<img src>`
pub fn extract_image(html: &str, page_url: Option<&str>) -> Option<String> {
    let raw = meta_content(html, "og:image")
        .or_else(|| meta_content(html, "twitter:image"))
        .or_else(|| {
            IMG_SRC_RE
                .captures(html)
                .and_then(|caps| caps.get(1))
                .map(|m| decode(m.as_str()))
                .filter(|src| !src.is_empty())
        })?;

    match page_url {
        Some(base) => absolutize(base, &raw).or(Some(raw)),
        None => Some(raw),
    }
}

/// First parseable date among [`PUBLISH_DATE_KEYS`], then `<time datetime>`
pub fn extract_published_at(html: &str) -> Option<DateTime<Utc>> {
    PUBLISH_DATE_KEYS
        .iter()
        .filter_map(|key| meta_content(html, key))
        .find_map(|value| parse_timestamp(&value))
        .or_else(|| {
            TIME_RE
                .captures(html)
                .and_then(|caps| caps.get(1))
                .and_then(|m| parse_timestamp(m.as_str()))
        })
}

/// `og:title`, else the document `<title>`
pub fn extract_title(html: &str) -> Option<String> {
    meta_content(html, "og:title").or_else(|| {
        TITLE_RE
            .captures(html)
            .and_then(|caps| caps.get(1))
            .map(|m| strip_html(m.as_str()))
            .filter(|t| !t.is_empty())
    })
}

/// Content of the first `<meta>` whose `name`, `property` or `itemprop` equals `key`
pub fn meta_content(html: &str, key: &str) -> Option<String> {
    tag_attributes(html, "meta").find_map(|attrs| {
        let matches_key = ["name", "property", "itemprop"]
            .iter()
            .any(|a| attrs.get(*a).is_some_and(|v| v.eq_ignore_ascii_case(key)));
        if !matches_key {
            return None;
        }
        attrs
            .get("content")
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
    })
}

/// Attribute maps (lowercased names, decoded values) for every `<tag ...>` in document order
pub fn tag_attributes<'a>(
    html: &'a str,
    tag: &str,
) -> impl Iterator<Item = HashMap<String, String>> + 'a {
    let tag_re: Option<Cow<'static, Regex>> = match tag {
        "meta" => Some(Cow::Borrowed(&*META_TAG_RE)),
        "link" => Some(Cow::Borrowed(&*LINK_TAG_RE)),
        other => Regex::new(&format!(r"(?is)<{}\b([^>]*)>", regex::escape(other)))
            .ok()
            .map(Cow::Owned),
    };

    tag_re
        .into_iter()
        .flat_map(move |re| {
            re.captures_iter(html)
                .filter_map(|caps| caps.get(1).map(|m| m.as_str()))
                .collect::<Vec<_>>()
        })
        .map(|inner| {
            ATTR_RE
                .captures_iter(inner)
                .filter_map(|caps| {
                    let name = caps.get(1)?.as_str().to_ascii_lowercase();
                    let value = caps.get(2).or(caps.get(3)).or(caps.get(4))?.as_str();
                    Some((name, decode(value)))
                })
                .collect()
        })
}

/// Parse the date formats found in feeds and meta tags
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(s) {
        return Some(dt.with_timezone(&Utc));
    }

    for fmt in [
        "%Y-%m-%dT%H:%M:%S%.f%z",
        "%Y-%m-%dT%H:%M:%S%z",
        "%Y-%m-%d %H:%M:%S%z",
        "%Y-%m-%d %H:%M:%S %z",
    ] {
        if let Ok(dt) = DateTime::parse_from_str(s, fmt) {
            return Some(dt.with_timezone(&Utc));
        }
    }

    // No offset given: assume UTC
    for fmt in [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M",
    ] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt.and_utc());
        }
    }

    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

/// Strip HTML tags, decode entities and collapse whitespace
pub fn strip_html(html: &str) -> String {
    let mut result = String::with_capacity(html.len());
    let mut in_tag = false;

    for c in html.chars() {
        match c {
            '<' => {
                in_tag = true;
                result.push(' ');
            }
            '>' => in_tag = false,
            _ if !in_tag => result.push(c),
            _ => {}
        }
    }

    html_escape::decode_html_entities(&result)
        .replace('\u{a0}', " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Hostname of a URL with any leading `www.` removed
pub fn hostname(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let host = parsed.host_str()?;
    let host = host.strip_prefix("www.").unwrap_or(host);
    (!host.is_empty()).then(|| host.to_ascii_lowercase())
}

/// Resolve `candidate` against `base`, keeping only http(s) results
pub fn absolutize(base: &str, candidate: &str) -> Option<String> {
    let candidate = candidate.trim();
    let resolved = match Url::parse(candidate) {
        Ok(url) => url,
        Err(url::ParseError::RelativeUrlWithoutBase) => Url::parse(base).ok()?.join(candidate).ok()?,
        Err(_) => return None,
    };
    matches!(resolved.scheme(), "http" | "https").then(|| resolved.to_string())
}

fn decode(value: &str) -> String {
    html_escape::decode_html_entities(value.trim()).into_owned()
}
