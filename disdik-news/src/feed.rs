//! Syndication feed parsing
//!
//! Turns RSS 2.0 or Atom XML into [`RawEntry`] values in feed order. Parsing
//! never fails the caller: anything that is not a readable feed yields an
//! empty list.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use tracing::debug;

use disdik_core::RawEntry;

use crate::error::NewsError;
use crate::extract::parse_timestamp;

static DESCRIPTION_IMAGE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)https?://[^\s"'<>]+?\.(?:png|jpe?g|webp)(?:\?[^\s"'<>]*)?"#)
        .expect("valid description image regex")
});

static ATOM_DATE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)<(updated|published)\b([^>]*)>(.*?)</(updated|published)>")
        .expect("valid atom date regex")
});

/// Parse feed XML, returning an empty list for anything unreadable
pub fn parse_feed(xml: &str) -> Vec<RawEntry> {
    try_parse_feed(xml).unwrap_or_default()
}

/// Parse feed XML, reporting why nothing could be read
pub fn try_parse_feed(xml: &str) -> Result<Vec<RawEntry>, NewsError> {
    let bytes = xml.trim_start_matches('\u{feff}').as_bytes();

    // Try parsing as RSS first, then Atom
    if let Ok(channel) = rss::Channel::read_from(bytes) {
        return Ok(channel.items().iter().map(rss_entry).collect());
    }

    let strict = match atom_syndication::Feed::read_from(bytes) {
        Ok(feed) => return Ok(feed.entries().iter().map(atom_entry).collect()),
        Err(e) => e,
    };

    // One malformed date must not cost the whole feed
    let repaired = repair_atom_dates(xml.trim_start_matches('\u{feff}'));
    if repaired != xml.trim_start_matches('\u{feff}') {
        if let Ok(feed) = atom_syndication::Feed::read_from(repaired.as_bytes()) {
            debug!("Atom feed parsed after repairing dates ({})", strict);
            return Ok(feed.entries().iter().map(atom_entry).collect());
        }
    }

    Err(NewsError::ParseError(format!(
        "not an RSS or Atom document: {}",
        strict
    )))
}

/// Rewrite Atom date elements to RFC 3339, dropping the ones no known format parses.
///
/// A dropped `<updated>` reads back as the epoch, which [`is_unset`] treats as missing.
fn repair_atom_dates(xml: &str) -> String {
    ATOM_DATE_RE
        .replace_all(xml, |caps: &Captures| {
            let (open, attrs, value, close) = (&caps[1], &caps[2], caps[3].trim(), &caps[4]);
            if open != close || DateTime::parse_from_rfc3339(value).is_ok() {
                return caps[0].to_string();
            }
            match parse_timestamp(value) {
                Some(ts) => format!("<{open}{attrs}>{}</{close}>", ts.to_rfc3339()),
                None => String::new(),
            }
        })
        .into_owned()
}

/// Dialect-neutral view of a namespaced extension element
#[derive(Debug, Clone, Default)]
struct MediaNode {
    value: Option<String>,
    attrs: BTreeMap<String, String>,
    children: BTreeMap<String, Vec<MediaNode>>,
}

impl From<&rss::extension::Extension> for MediaNode {
    fn from(ext: &rss::extension::Extension) -> Self {
        Self {
            value: ext.value().map(str::to_string),
            attrs: ext.attrs().clone(),
            children: ext
                .children()
                .iter()
                .map(|(k, v)| (k.clone(), v.iter().map(MediaNode::from).collect()))
                .collect(),
        }
    }
}

impl From<&atom_syndication::extension::Extension> for MediaNode {
    fn from(ext: &atom_syndication::extension::Extension) -> Self {
        Self {
            value: ext.value().map(str::to_string),
            attrs: ext.attrs().clone(),
            children: ext
                .children()
                .iter()
                .map(|(k, v)| (k.clone(), v.iter().map(MediaNode::from).collect()))
                .collect(),
        }
    }
}

type MediaMap = BTreeMap<String, Vec<MediaNode>>;

fn rss_entry(item: &rss::Item) -> RawEntry {
    let description = first_of([item.description(), item.content()].map(to_text)).unwrap_or_default();

    let link = first_of([
        to_text(item.link()),
        item.guid()
            .filter(|g| g.is_permalink())
            .and_then(|g| to_text(Some(g.value()))),
        item.source().and_then(|s| to_text(Some(s.url()))),
    ]);

    let source_hint = first_of([
        item.source().and_then(|s| to_text(s.title())),
        item.dublin_core_ext()
            .and_then(|dc| dc.creators().first())
            .and_then(|c| to_text(Some(c.as_str()))),
    ]);

    let published_at = item.pub_date().and_then(parse_timestamp).or_else(|| {
        item.dublin_core_ext()
            .and_then(|dc| dc.dates().iter().find_map(|d| parse_timestamp(d)))
    });

    let media = item
        .extensions()
        .get("media")
        .map(|m| to_media_map(m.iter().map(|(k, v)| (k, v.iter().map(MediaNode::from).collect()))))
        .unwrap_or_default();

    let enclosure = item
        .enclosure()
        .map(|e| (e.url().to_string(), e.mime_type().to_string()));

    let media_url = find_image(&media, enclosure, &description);
    let title = clean_title(item.title().unwrap_or_default(), source_hint.as_deref());

    RawEntry {
        link,
        title,
        description,
        published_at,
        source_hint,
        media_url,
    }
}

fn atom_entry(entry: &atom_syndication::Entry) -> RawEntry {
    let description = first_of([
        to_text(entry.summary().map(|s| s.as_str())),
        to_text(entry.content().and_then(|c| c.value())),
    ])
    .unwrap_or_default();

    let link = entry
        .links()
        .iter()
        .find(|l| l.rel() == "alternate")
        .or_else(|| entry.links().first())
        .and_then(|l| to_text(Some(l.href())));

    let source_hint = first_of([
        entry.source().and_then(|s| to_text(Some(s.title().as_str()))),
        entry.authors().first().and_then(|a| to_text(Some(a.name()))),
    ]);

    let published_at = entry
        .published()
        .map(|d| d.with_timezone(&Utc))
        .or_else(|| Some(entry.updated().with_timezone(&Utc)))
        .filter(|d| !is_unset(d));

    let media = entry
        .extensions()
        .get("media")
        .map(|m| to_media_map(m.iter().map(|(k, v)| (k, v.iter().map(MediaNode::from).collect()))))
        .unwrap_or_default();

    let enclosure = entry
        .links()
        .iter()
        .find(|l| l.rel() == "enclosure")
        .map(|l| (l.href().to_string(), l.mime_type().unwrap_or_default().to_string()));

    let media_url = find_image(&media, enclosure, &description);
    let title = clean_title(entry.title().as_str(), source_hint.as_deref());

    RawEntry {
        link,
        title,
        description,
        published_at,
        source_hint,
        media_url,
    }
}

fn to_media_map<'a>(iter: impl Iterator<Item = (&'a String, Vec<MediaNode>)>) -> MediaMap {
    iter.map(|(k, v)| (k.clone(), v)).collect()
}

/// Trimmed, non-empty text
fn to_text(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn first_of<I>(values: I) -> Option<String>
where
    I: IntoIterator<Item = Option<String>>,
{
    values.into_iter().flatten().next()
}

/// Atom requires `<updated>`; the crate fills a missing one with the epoch
fn is_unset(date: &DateTime<Utc>) -> bool {
    date.timestamp() == 0
}

/// media:content, media:thumbnail, image enclosure, media:group, then the description
fn find_image(media: &MediaMap, enclosure: Option<(String, String)>, description: &str) -> Option<String> {
    media_content_image(media.get("content"))
        .or_else(|| attr_url(media.get("thumbnail")))
        .or_else(|| {
            enclosure
                .filter(|(url, mime)| mime.starts_with("image/") || has_image_extension(url))
                .map(|(url, _)| url)
        })
        .or_else(|| {
            media
                .get("group")
                .into_iter()
                .flatten()
                .find_map(|group| {
                    media_content_image(group.children.get("content"))
                        .or_else(|| media_content_image(group.children.get("media:content")))
                })
        })
        .or_else(|| DESCRIPTION_IMAGE_RE.find(description).map(|m| m.as_str().to_string()))
}

fn media_content_image(nodes: Option<&Vec<MediaNode>>) -> Option<String> {
    nodes.into_iter().flatten().find_map(|node| {
        let url = to_text(node.attrs.get("url").map(String::as_str))?;
        let medium = node.attrs.get("medium").map(String::as_str);
        let mime = node.attrs.get("type").map(String::as_str);

        let is_image = match (medium, mime) {
            (Some(m), _) => m.eq_ignore_ascii_case("image"),
            (None, Some(t)) => t.starts_with("image/"),
            (None, None) => true,
        };
        is_image.then_some(url)
    })
}

fn attr_url(nodes: Option<&Vec<MediaNode>>) -> Option<String> {
    nodes
        .into_iter()
        .flatten()
        .find_map(|node| to_text(node.attrs.get("url").map(String::as_str)).or_else(|| to_text(node.value.as_deref())))
}

fn has_image_extension(url: &str) -> bool {
    let path = url.split(['?', '#']).next().unwrap_or_default().to_ascii_lowercase();
    [".png", ".jpg", ".jpeg", ".webp"].iter().any(|ext| path.ends_with(ext))
}

/// Drop a trailing " - Publisher" suffix when it names the declared source
fn clean_title(title: &str, source_hint: Option<&str>) -> String {
    let title = title.trim();
    if let (Some(pos), Some(source)) = (title.rfind(" - "), source_hint) {
        let suffix = title[pos + 3..].trim();
        if !suffix.is_empty() && suffix.eq_ignore_ascii_case(source.trim()) {
            return title[..pos].trim().to_string();
        }
    }
    title.to_string()
}
