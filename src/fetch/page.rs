// src/fetch/page.rs
//! Static HTML pages and the selector queries the page rules need.

use scraper::{ElementRef, Html, Selector};

use super::HttpTransport;
use crate::text::plain_text;

/// Fetched markup. Parsed on each query; `scraper::Html` is not `Send`, so it
/// never lives across an await.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageDocument {
    pub url: String,
    pub html: String,
}

impl PageDocument {
    pub fn new(url: impl Into<String>, html: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            html: html.into(),
        }
    }

    /// `None` when no `container` exists, else whether the first one holds a `marker`.
    pub fn has_descendant(&self, container: &str, marker: &str) -> Option<bool> {
        let container_sel = selector(container)?;
        let marker_sel = selector(marker)?;
        let doc = Html::parse_document(&self.html);
        let first = doc.select(&container_sel).next()?;
        let found = first.select(&marker_sel).next().is_some();
        Some(found)
    }

    /// Normalized text of the first element matching `sel`.
    pub fn region_text(&self, sel: &str) -> Option<String> {
        let sel = selector(sel)?;
        let doc = Html::parse_document(&self.html);
        let el = doc.select(&sel).next()?;
        Some(plain_text(&joined_text(el)))
    }

    /// Non-empty text nodes of the first match, one per line, in document order.
    pub fn region_lines(&self, sel: &str) -> Option<Vec<String>> {
        let sel = selector(sel)?;
        let doc = Html::parse_document(&self.html);
        let el = doc.select(&sel).next()?;
        Some(
            el.text()
                .map(|t| t.split_whitespace().collect::<Vec<_>>().join(" "))
                .filter(|t| !t.is_empty())
                .collect(),
        )
    }

    pub fn contains_element(&self, sel: &str) -> bool {
        let Some(sel) = selector(sel) else {
            return false;
        };
        Html::parse_document(&self.html).select(&sel).next().is_some()
    }
}

fn joined_text(el: ElementRef<'_>) -> String {
    el.text().collect::<Vec<_>>().join(" ")
}

fn selector(raw: &str) -> Option<Selector> {
    match Selector::parse(raw) {
        Ok(s) => Some(s),
        Err(e) => {
            tracing::warn!(target: "fetch", selector = %raw, error = %e, "invalid css selector");
            None
        }
    }
}

/// Single-shot HTML fetcher on the shared client.
#[derive(Clone)]
pub struct PageFetcher {
    http: HttpTransport,
}

impl PageFetcher {
    pub fn new(http: HttpTransport) -> Self {
        Self { http }
    }

    /// `None` on network error or non-2xx; never panics.
    pub async fn fetch(&self, endpoint: &str) -> Option<PageDocument> {
        match self.http.get_text_once(endpoint).await {
            Ok(html) => Some(PageDocument::new(endpoint, html)),
            Err(e) => {
                tracing::warn!(target: "fetch", url = %endpoint, error = %e, "page fetch failed");
                metrics::counter!("status_fetch_errors_total", "kind" => "page").increment(1);
                None
            }
        }
    }
}
