//! # Source Descriptor Registry
//!
//! Static list of monitored services. Each descriptor names the fetch strategy,
//! the endpoint, the public status page and the classification rule.
//!
//! - Built-in seed via `default_sources()` (the services the dashboard shows).
//! - Can be replaced from TOML/JSON, see `config::sources`.
//! - `Registry::new` validates everything up front; a bad registry is a fatal
//!   configuration error, never a per-cycle failure.

use std::collections::HashSet;
use std::fmt;

use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::classify::{ClassifyRule, EmptyFeed, EntryField};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Llm,
    Cloud,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    Feed,
    Page,
    RenderedPage,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Strategy::Feed => "feed",
            Strategy::Page => "page",
            Strategy::RenderedPage => "rendered_page",
        })
    }
}

fn default_max_reveal_clicks() -> usize {
    3
}
fn default_settle_ms() -> u64 {
    500
}

/// How to drive a client-rendered status page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderSpec {
    /// Root mount point; its presence means the app booted.
    pub anchor_selector: String,
    /// Candidates for expanding collapsed regions, highest priority first.
    #[serde(default)]
    pub reveal_selectors: Vec<String>,
    #[serde(default = "default_max_reveal_clicks")]
    pub max_reveal_clicks: usize,
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,
    /// Element whose outer HTML is handed to the classifier.
    pub indicator_selector: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceDescriptor {
    pub id: String,
    pub display_name: String,
    pub category: Category,
    pub strategy: Strategy,
    pub endpoint: String,
    pub status_page_url: String,
    pub rule: ClassifyRule,
    #[serde(default)]
    pub render: Option<RenderSpec>,
    /// RenderedPage only: fetch the endpoint as static HTML when no browser
    /// session can be created.
    #[serde(default)]
    pub static_fallback: bool,
    /// Per-source task timeout; falls back to the engine config.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

/// Validated, immutable set of sources.
#[derive(Debug, Clone)]
pub struct Registry {
    sources: Vec<SourceDescriptor>,
}

impl Registry {
    pub fn new(sources: Vec<SourceDescriptor>) -> Result<Self> {
        let mut seen = HashSet::new();
        for s in &sources {
            if s.id.trim().is_empty() {
                bail!("source with empty id ({})", s.display_name);
            }
            if !seen.insert(s.id.as_str()) {
                bail!("duplicate source id '{}'", s.id);
            }
            validate(s).with_context(|| format!("invalid source '{}'", s.id))?;
        }
        Ok(Self { sources })
    }

    /// The built-in registry.
    pub fn builtin() -> Self {
        Self {
            sources: default_sources(),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &SourceDescriptor> {
        self.sources.iter()
    }

    pub fn get(&self, id: &str) -> Option<&SourceDescriptor> {
        self.sources.iter().find(|s| s.id == id)
    }

    pub fn ids(&self) -> Vec<String> {
        self.sources.iter().map(|s| s.id.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

fn validate(s: &SourceDescriptor) -> Result<()> {
    check_url(&s.endpoint).context("endpoint")?;
    check_url(&s.status_page_url).context("status_page_url")?;

    match (s.strategy, s.rule.expects_feed()) {
        (Strategy::Feed, false) => bail!("rule '{}' cannot classify a feed", s.rule.kind()),
        (Strategy::Page | Strategy::RenderedPage, true) => {
            bail!("rule '{}' needs a feed strategy", s.rule.kind())
        }
        _ => {}
    }

    match (&s.render, s.strategy) {
        (None, Strategy::RenderedPage) => bail!("rendered_page strategy needs a [render] spec"),
        (Some(r), Strategy::RenderedPage) => {
            check_selector(&r.anchor_selector)?;
            check_selector(&r.indicator_selector)?;
            for sel in &r.reveal_selectors {
                check_selector(sel)?;
            }
        }
        _ => {}
    }

    for sel in s.rule.selectors() {
        check_selector(sel)?;
    }
    if s.rule.phrases().iter().any(|p| p.trim().is_empty()) {
        bail!("rule '{}' contains an empty phrase", s.rule.kind());
    }
    if s.timeout_secs == Some(0) {
        bail!("timeout_secs must be > 0");
    }
    Ok(())
}

fn check_url(raw: &str) -> Result<()> {
    let parsed = url::Url::parse(raw).with_context(|| format!("parsing url '{raw}'"))?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        other => Err(anyhow!("unsupported url scheme '{other}' in '{raw}'")),
    }
}

fn check_selector(sel: &str) -> Result<()> {
    scraper::Selector::parse(sel)
        .map(|_| ())
        .map_err(|e| anyhow!("invalid selector '{sel}': {e}"))
}

fn phrases(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// Services shown on the dashboard, with the heuristics each status channel needs.
pub fn default_sources() -> Vec<SourceDescriptor> {
    let feed = |id: &str,
                name: &str,
                category: Category,
                endpoint: &str,
                status_page: &str,
                rule: ClassifyRule| SourceDescriptor {
        id: id.to_string(),
        display_name: name.to_string(),
        category,
        strategy: Strategy::Feed,
        endpoint: endpoint.to_string(),
        status_page_url: status_page.to_string(),
        rule,
        render: None,
        static_fallback: false,
        timeout_secs: None,
    };

    vec![
        feed(
            "openai",
            "OpenAI API Status",
            Category::Llm,
            "https://status.openai.com/feed.rss",
            "https://status.openai.com",
            ClassifyRule::ResolutionPhrase {
                field: EntryField::Body,
                phrases: phrases(&["all impacted services have now fully recovered"]),
                veto: Vec::new(),
                on_empty: EmptyFeed::Unknown,
            },
        ),
        feed(
            "deepseek",
            "DeepSeek API Status",
            Category::Llm,
            "https://status.deepseek.com/history.atom",
            "https://status.deepseek.com",
            ClassifyRule::ResolutionPhrase {
                field: EntryField::Body,
                phrases: phrases(&["[resolved]"]),
                veto: Vec::new(),
                on_empty: EmptyFeed::Unknown,
            },
        ),
        SourceDescriptor {
            id: "gemini".to_string(),
            display_name: "Google AI Studio and Gemini API Status".to_string(),
            category: Category::Llm,
            strategy: Strategy::RenderedPage,
            endpoint: "https://aistudio.google.com/status".to_string(),
            status_page_url: "https://aistudio.google.com/status".to_string(),
            rule: ClassifyRule::MarkerPhrase {
                region: "ms-status-daily-log".to_string(),
                phrases: phrases(&["no incidents reported today", "all systems operational"]),
            },
            render: Some(RenderSpec {
                anchor_selector: "ms-app, app-root".to_string(),
                reveal_selectors: phrases(&[
                    "button[aria-expanded='false']",
                    "mat-expansion-panel-header[aria-expanded='false']",
                    "[role='button'][aria-expanded='false']",
                ]),
                max_reveal_clicks: default_max_reveal_clicks(),
                settle_ms: default_settle_ms(),
                indicator_selector: "ms-status-daily-log".to_string(),
            }),
            static_fallback: true,
            timeout_secs: None,
        },
        feed(
            "perplexity",
            "Perplexity API Status",
            Category::Llm,
            "https://status.perplexity.com/history.rss",
            "https://status.perplexity.com",
            ClassifyRule::ResolutionPhrase {
                field: EntryField::Body,
                phrases: phrases(&["resolved"]),
                veto: phrases(&["api outage"]),
                on_empty: EmptyFeed::Unknown,
            },
        ),
        feed(
            "anthropic",
            "Anthropic API Status",
            Category::Llm,
            "https://status.anthropic.com/history.rss",
            "https://status.anthropic.com",
            ClassifyRule::ResolutionPhrase {
                field: EntryField::Body,
                phrases: phrases(&["resolved"]),
                veto: Vec::new(),
                on_empty: EmptyFeed::Unknown,
            },
        ),
        feed(
            "langsmith",
            "LangSmith US",
            Category::Llm,
            "https://status.smith.langchain.com/feed.rss",
            "https://status.smith.langchain.com",
            ClassifyRule::NegativeKeywords {
                field: EntryField::Body,
                keywords: phrases(&["elevated", "degrad", "latency", "outage", "failing"]),
                on_empty: EmptyFeed::Unknown,
            },
        ),
        SourceDescriptor {
            id: "aws".to_string(),
            display_name: "Amazon Web Services (AWS) Cloud Status".to_string(),
            category: Category::Cloud,
            strategy: Strategy::Page,
            endpoint: "https://health.aws.amazon.com/health/status".to_string(),
            status_page_url: "https://health.aws.amazon.com/health/status".to_string(),
            rule: ClassifyRule::MarkerElement {
                container: "div.event-state".to_string(),
                marker: "div.no-events".to_string(),
            },
            render: None,
            static_fallback: false,
            timeout_secs: None,
        },
        feed(
            "gcp",
            "Google Cloud Platform Status",
            Category::Cloud,
            "https://status.cloud.google.com/en/feed.atom",
            "https://status.cloud.google.com",
            ClassifyRule::ResolutionPhrase {
                field: EntryField::Title,
                phrases: phrases(&["resolved:"]),
                veto: Vec::new(),
                on_empty: EmptyFeed::Unknown,
            },
        ),
        feed(
            "azure",
            "Microsoft Azure Status US",
            Category::Cloud,
            "https://rssfeed.azure.status.microsoft/en-us/status/feed/",
            "https://status.azure.com",
            // Deliberately Operational on an empty feed, unlike the other feeds' Unknown.
            ClassifyRule::ResolutionPhrase {
                field: EntryField::Body,
                phrases: phrases(&["azure status"]),
                veto: Vec::new(),
                on_empty: EmptyFeed::Operational,
            },
        ),
    ]
}
