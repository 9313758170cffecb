// src/classify/mod.rs
//! Classification rules.
//!
//! One tagged rule per matching pattern; every service in the registry picks a
//! variant and parameters. `classify` is a pure function of the rule and the
//! raw fetch result (it only logs).

mod rules;

use chrono::FixedOffset;
use serde::{Deserialize, Serialize};

use crate::fetch::RawFetchResult;
use crate::model::{Classification, UNKNOWN_DETAIL};

/// Which part of the latest feed entry a phrase rule looks at.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryField {
    #[default]
    Body,
    Title,
}

/// Verdict for a feed that was fetched fine but has no entries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmptyFeed {
    #[default]
    Unknown,
    Operational,
}

fn operational_when_empty() -> EmptyFeed {
    EmptyFeed::Operational
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ClassifyRule {
    /// Operational iff the latest entry mentions a resolution phrase and no veto phrase.
    ResolutionPhrase {
        #[serde(default)]
        field: EntryField,
        phrases: Vec<String>,
        #[serde(default)]
        veto: Vec<String>,
        #[serde(default)]
        on_empty: EmptyFeed,
    },
    /// Disrupted iff the latest entry mentions any keyword.
    NegativeKeywords {
        #[serde(default)]
        field: EntryField,
        keywords: Vec<String>,
        #[serde(default)]
        on_empty: EmptyFeed,
    },
    /// The feed only lists active incidents: any entry means Disrupted.
    IncidentPresence {
        #[serde(default = "operational_when_empty")]
        on_empty: EmptyFeed,
    },
    /// Operational iff the first `container` has a `marker` descendant.
    MarkerElement { container: String, marker: String },
    /// Operational iff the text of `region` contains any phrase.
    MarkerPhrase { region: String, phrases: Vec<String> },
}

impl ClassifyRule {
    pub fn expects_feed(&self) -> bool {
        matches!(
            self,
            ClassifyRule::ResolutionPhrase { .. }
                | ClassifyRule::NegativeKeywords { .. }
                | ClassifyRule::IncidentPresence { .. }
        )
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ClassifyRule::ResolutionPhrase { .. } => "resolution_phrase",
            ClassifyRule::NegativeKeywords { .. } => "negative_keywords",
            ClassifyRule::IncidentPresence { .. } => "incident_presence",
            ClassifyRule::MarkerElement { .. } => "marker_element",
            ClassifyRule::MarkerPhrase { .. } => "marker_phrase",
        }
    }

    /// CSS selectors the rule queries (page rules only).
    pub fn selectors(&self) -> Vec<&str> {
        match self {
            ClassifyRule::MarkerElement { container, marker } => {
                vec![container.as_str(), marker.as_str()]
            }
            ClassifyRule::MarkerPhrase { region, .. } => vec![region.as_str()],
            _ => Vec::new(),
        }
    }

    /// Every phrase, veto and keyword the rule matches on.
    pub fn phrases(&self) -> Vec<&str> {
        match self {
            ClassifyRule::ResolutionPhrase { phrases, veto, .. } => {
                phrases.iter().chain(veto.iter()).map(String::as_str).collect()
            }
            ClassifyRule::NegativeKeywords { keywords, .. } => {
                keywords.iter().map(String::as_str).collect()
            }
            ClassifyRule::MarkerPhrase { phrases, .. } => {
                phrases.iter().map(String::as_str).collect()
            }
            ClassifyRule::IncidentPresence { .. } | ClassifyRule::MarkerElement { .. } => {
                Vec::new()
            }
        }
    }
}

/// Decide the status of one source from its raw fetch result.
///
/// `Missing` is always Unknown, never Disrupted. A result of the wrong shape
/// for the rule is Unknown with a warning. Timestamps are converted into
/// `display` for presentation.
pub fn classify(
    source_id: &str,
    rule: &ClassifyRule,
    raw: &RawFetchResult,
    display: FixedOffset,
) -> Classification {
    match (rule, raw) {
        (_, RawFetchResult::Missing(_)) => Classification::unknown(UNKNOWN_DETAIL),

        (
            ClassifyRule::ResolutionPhrase {
                field,
                phrases,
                veto,
                on_empty,
            },
            RawFetchResult::Feed(entries),
        ) => rules::resolution_phrase(entries, *field, phrases, veto, *on_empty, display),

        (
            ClassifyRule::NegativeKeywords {
                field,
                keywords,
                on_empty,
            },
            RawFetchResult::Feed(entries),
        ) => rules::negative_keywords(entries, *field, keywords, *on_empty, display),

        (ClassifyRule::IncidentPresence { on_empty }, RawFetchResult::Feed(entries)) => {
            rules::incident_presence(entries, *on_empty, display)
        }

        (ClassifyRule::MarkerElement { container, marker }, RawFetchResult::Document(doc)) => {
            rules::marker_element(source_id, doc, container, marker)
        }

        (ClassifyRule::MarkerPhrase { region, phrases }, RawFetchResult::Document(doc)) => {
            rules::marker_phrase(source_id, doc, region, phrases, display)
        }

        (rule, raw) => {
            tracing::warn!(
                target: "classify",
                source = %source_id,
                rule = rule.kind(),
                got = raw_kind(raw),
                "fetch result does not match rule"
            );
            Classification::unknown(UNKNOWN_DETAIL)
        }
    }
}

fn raw_kind(raw: &RawFetchResult) -> &'static str {
    match raw {
        RawFetchResult::Feed(_) => "feed",
        RawFetchResult::Document(_) => "document",
        RawFetchResult::Missing(_) => "missing",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::{FeedEntry, PageDocument};
    use crate::model::Status;

    fn sgt() -> FixedOffset {
        FixedOffset::east_opt(8 * 3600).unwrap()
    }

    #[test]
    fn missing_is_unknown_for_every_rule() {
        let rules = [
            ClassifyRule::IncidentPresence {
                on_empty: EmptyFeed::Operational,
            },
            ClassifyRule::MarkerElement {
                container: "div.event-state".into(),
                marker: "div.no-events".into(),
            },
        ];
        for rule in &rules {
            let c = classify("x", rule, &RawFetchResult::Missing("boom".into()), sgt());
            assert_eq!(c.status, Status::Unknown);
            assert_eq!(c.issue_link, None);
            assert_eq!(c.detail, UNKNOWN_DETAIL);
        }
    }

    #[test]
    fn wrong_shape_is_unknown() {
        let rule = ClassifyRule::NegativeKeywords {
            field: EntryField::Body,
            keywords: vec!["outage".into()],
            on_empty: EmptyFeed::Unknown,
        };
        let doc = RawFetchResult::Document(PageDocument::new("https://x", "<p>outage</p>"));
        assert_eq!(classify("x", &rule, &doc, sgt()).status, Status::Unknown);

        let marker = ClassifyRule::MarkerPhrase {
            region: "main".into(),
            phrases: vec!["ok".into()],
        };
        let feed = RawFetchResult::Feed(vec![FeedEntry::default()]);
        assert_eq!(classify("x", &marker, &feed, sgt()).status, Status::Unknown);
    }

    #[test]
    fn rule_round_trips_through_toml_tag() {
        let src = r#"
            kind = "resolution_phrase"
            field = "title"
            phrases = ["resolved:"]
        "#;
        let rule: ClassifyRule = toml::from_str(src).unwrap();
        assert_eq!(
            rule,
            ClassifyRule::ResolutionPhrase {
                field: EntryField::Title,
                phrases: vec!["resolved:".into()],
                veto: vec![],
                on_empty: EmptyFeed::Unknown,
            }
        );

        let ip: ClassifyRule = toml::from_str(r#"kind = "incident_presence""#).unwrap();
        assert_eq!(
            ip,
            ClassifyRule::IncidentPresence {
                on_empty: EmptyFeed::Operational
            }
        );
    }
}
