// src/fetch/feed.rs
//! RSS 2.0 / Atom status feeds.
//!
//! Both formats land in the same `FeedEntry` shape, newest first. Markup in
//! bodies is stripped; entity soup that is valid HTML but not valid XML is
//! scrubbed before parsing.

use std::cmp::Ordering;
use std::time::Instant;

use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Utc};
use metrics::{counter, histogram};
use quick_xml::de::from_str;
use quick_xml::events::Event;
use quick_xml::Reader;
use serde::{Deserialize, Serialize};
use time::format_description::well_known::{Rfc2822, Rfc3339};
use time::OffsetDateTime;

use super::{FetchError, HttpTransport};
use crate::text::{plain_text, scrub_html_entities_for_xml};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedEntry {
    pub title: String,
    pub link: Option<String>,
    /// Plain text, markup stripped.
    pub body: String,
    pub published: Option<DateTime<Utc>>,
}

// --- RSS 2.0 ---

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}
#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(rename = "item", default)]
    item: Vec<Item>,
}
#[derive(Debug, Deserialize)]
struct Item {
    title: Option<String>,
    link: Option<String>,
    #[serde(rename = "pubDate")]
    pub_date: Option<String>,
    description: Option<String>,
}

// --- Atom ---

#[derive(Debug, Deserialize)]
struct AtomFeed {
    #[serde(rename = "entry", default)]
    entry: Vec<AtomEntry>,
}
#[derive(Debug, Deserialize)]
struct AtomEntry {
    title: Option<AtomText>,
    #[serde(rename = "link", default)]
    link: Vec<AtomLink>,
    content: Option<AtomText>,
    summary: Option<AtomText>,
    published: Option<String>,
    updated: Option<String>,
}
#[derive(Debug, Deserialize)]
struct AtomText {
    #[serde(rename = "$text", default)]
    value: String,
}
#[derive(Debug, Deserialize)]
struct AtomLink {
    #[serde(rename = "@href")]
    href: Option<String>,
    #[serde(rename = "@rel")]
    rel: Option<String>,
}

impl AtomEntry {
    /// `rel="alternate"` (or no rel) wins over any other link.
    fn best_link(&self) -> Option<String> {
        self.link
            .iter()
            .find(|l| matches!(l.rel.as_deref(), None | Some("alternate")))
            .or_else(|| self.link.first())
            .and_then(|l| l.href.clone())
            .filter(|h| !h.trim().is_empty())
    }
}

/// Feed fetcher over the shared HTTP transport.
#[derive(Clone)]
pub struct FeedFetcher {
    http: HttpTransport,
    reference: FixedOffset,
}

impl FeedFetcher {
    /// `reference` is the zone assumed for timestamps that carry none.
    pub fn new(http: HttpTransport, reference: FixedOffset) -> Self {
        Self { http, reference }
    }

    /// Entries newest first; empty on any failure.
    pub async fn fetch(&self, endpoint: &str) -> Vec<FeedEntry> {
        match self.try_fetch(endpoint).await {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(target: "fetch", url = %endpoint, error = %e, "feed fetch failed");
                Vec::new()
            }
        }
    }

    /// Same as `fetch`, but tells "empty feed" apart from "no feed".
    pub async fn try_fetch(&self, endpoint: &str) -> Result<Vec<FeedEntry>, FetchError> {
        let body = self.http.get_text(endpoint).await.inspect_err(|_| {
            counter!("status_fetch_errors_total", "kind" => "feed").increment(1);
        })?;
        parse_feed(&body, self.reference).inspect_err(|_| {
            counter!("status_fetch_errors_total", "kind" => "feed_parse").increment(1);
        })
    }
}

/// Parse an RSS 2.0 or Atom document.
pub fn parse_feed(xml: &str, reference: FixedOffset) -> Result<Vec<FeedEntry>, FetchError> {
    let t0 = Instant::now();
    let xml_clean = scrub_html_entities_for_xml(xml);

    let mut entries = match root_element(&xml_clean).as_deref() {
        Some("rss") => parse_rss(&xml_clean, reference)?,
        Some("feed") => parse_atom(&xml_clean, reference)?,
        Some(other) => {
            return Err(FetchError::Parse {
                what: "feed",
                reason: format!("unsupported root element <{other}>"),
            })
        }
        None => {
            return Err(FetchError::Parse {
                what: "feed",
                reason: "no root element".to_string(),
            })
        }
    };

    entries.sort_by(newest_first);

    histogram!("status_feed_parse_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);
    Ok(entries)
}

fn parse_rss(xml: &str, reference: FixedOffset) -> Result<Vec<FeedEntry>, FetchError> {
    let rss: Rss = from_str(xml).map_err(|e| FetchError::Parse {
        what: "rss",
        reason: e.to_string(),
    })?;
    Ok(rss
        .channel
        .item
        .into_iter()
        .filter_map(|it| {
            entry(
                it.title.as_deref(),
                it.link.filter(|l| !l.trim().is_empty()),
                it.description.as_deref(),
                it.pub_date.as_deref(),
                reference,
            )
        })
        .collect())
}

fn parse_atom(xml: &str, reference: FixedOffset) -> Result<Vec<FeedEntry>, FetchError> {
    let feed: AtomFeed = from_str(xml).map_err(|e| FetchError::Parse {
        what: "atom",
        reason: e.to_string(),
    })?;
    Ok(feed
        .entry
        .into_iter()
        .filter_map(|e| {
            let link = e.best_link();
            let body = e.content.as_ref().or(e.summary.as_ref()).map(|t| t.value.as_str());
            let stamp = e.updated.as_deref().or(e.published.as_deref());
            entry(
                e.title.as_ref().map(|t| t.value.as_str()),
                link,
                body,
                stamp,
                reference,
            )
        })
        .collect())
}

fn entry(
    title: Option<&str>,
    link: Option<String>,
    body: Option<&str>,
    stamp: Option<&str>,
    reference: FixedOffset,
) -> Option<FeedEntry> {
    let title = plain_text(title.unwrap_or_default());
    let body = plain_text(body.unwrap_or_default());
    if title.is_empty() && body.is_empty() {
        return None;
    }
    Some(FeedEntry {
        title,
        link: link.map(|l| l.trim().to_string()),
        body,
        published: stamp.and_then(|s| parse_timestamp(s, reference)),
    })
}

/// Dated entries newest first; undated ones keep document order after them.
fn newest_first(a: &FeedEntry, b: &FeedEntry) -> Ordering {
    match (a.published, b.published) {
        (Some(x), Some(y)) => y.cmp(&x),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

fn root_element(xml: &str) -> Option<String> {
    let mut reader = Reader::from_str(xml);
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => {
                return Some(String::from_utf8_lossy(e.local_name().as_ref()).into_owned())
            }
            Ok(Event::Eof) | Err(_) => return None,
            Ok(_) => {}
        }
    }
}

/// RFC 2822 / RFC 3339 with their own offset; zone-less stamps are read in `reference`.
pub fn parse_timestamp(raw: &str, reference: FixedOffset) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    if let Ok(dt) = OffsetDateTime::parse(raw, &Rfc2822)
        .or_else(|_| OffsetDateTime::parse(raw, &Rfc3339))
    {
        return DateTime::<Utc>::from_timestamp(dt.unix_timestamp(), dt.nanosecond());
    }

    // chrono knows the obsolete zone names (GMT, UT, EST, ...) and is laxer about spacing.
    if let Ok(dt) = DateTime::parse_from_rfc2822(raw).or_else(|_| DateTime::parse_from_rfc3339(raw)) {
        return Some(dt.with_timezone(&Utc));
    }

    if let Some(stripped) = raw.strip_suffix(" UTC") {
        if let Ok(naive) = NaiveDateTime::parse_from_str(stripped, "%a, %d %b %Y %H:%M:%S") {
            return Some(naive.and_utc());
        }
    }

    const NAIVE: [&str; 3] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S", "%a, %d %b %Y %H:%M:%S"];
    NAIVE.iter().find_map(|fmt| {
        let naive = NaiveDateTime::parse_from_str(raw, fmt).ok()?;
        reference
            .from_local_datetime(&naive)
            .single()
            .map(|dt| dt.with_timezone(&Utc))
    })
}
