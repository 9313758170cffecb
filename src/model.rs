//! # Status model
//! Output types of the aggregation engine: one `StatusRecord` per source and the
//! `Snapshot` that groups a full cycle. Everything here is immutable once built.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};

use crate::registry::{Category, SourceDescriptor};

/// Detail shown when a source could not be determined.
pub const UNKNOWN_DETAIL: &str = "Unable to fetch status";

/// Max characters of entry text carried into `StatusRecord::detail`.
pub const DETAIL_MAX_CHARS: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Status {
    Operational,
    Disrupted,
    Unknown,
}

impl Status {
    pub fn is_operational(self) -> bool {
        matches!(self, Status::Operational)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Status::Operational => "Operational",
            Status::Disrupted => "Disrupted",
            Status::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a classification rule decided, before it is stamped into a record.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub status: Status,
    pub issue_link: Option<String>,
    pub title: Option<String>,
    pub detail: String,
    pub last_update: Option<DateTime<FixedOffset>>,
}

impl Classification {
    pub fn unknown(detail: impl Into<String>) -> Self {
        Self {
            status: Status::Unknown,
            issue_link: None,
            title: None,
            detail: detail.into(),
            last_update: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusRecord {
    pub service_id: String,
    pub display_name: String,
    pub category: Category,
    pub status: Status,
    pub status_url: String,
    /// `None` means no specific incident link is available.
    pub issue_link: Option<String>,
    pub title: Option<String>,
    pub detail: String,
    pub last_update: Option<DateTime<FixedOffset>>,
    pub fetched_at: DateTime<Utc>,
}

impl StatusRecord {
    pub fn from_classification(
        desc: &SourceDescriptor,
        c: Classification,
        fetched_at: DateTime<Utc>,
    ) -> Self {
        Self {
            service_id: desc.id.clone(),
            display_name: desc.display_name.clone(),
            category: desc.category,
            status: c.status,
            status_url: desc.status_page_url.clone(),
            issue_link: c.issue_link,
            title: c.title,
            detail: c.detail,
            last_update: c.last_update,
            fetched_at,
        }
    }

    /// Fallback record used when a source failed, panicked or timed out.
    pub fn unknown(desc: &SourceDescriptor, fetched_at: DateTime<Utc>) -> Self {
        Self::from_classification(desc, Classification::unknown(UNKNOWN_DETAIL), fetched_at)
    }
}

/// One complete aggregation cycle. Keyed by service id; ordered so that
/// serialization is stable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub services: BTreeMap<String, StatusRecord>,
    pub captured_at: DateTime<Utc>,
}

impl Snapshot {
    pub fn get(&self, service_id: &str) -> Option<&StatusRecord> {
        self.services.get(service_id)
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    pub fn records(&self) -> impl Iterator<Item = &StatusRecord> {
        self.services.values()
    }

    pub fn count_with(&self, status: Status) -> usize {
        self.records().filter(|r| r.status == status).count()
    }
}

/// Cut `text` to `DETAIL_MAX_CHARS` characters, appending "..." when cut.
pub fn truncate_detail(text: &str) -> String {
    if text.chars().count() > DETAIL_MAX_CHARS {
        let mut out: String = text.chars().take(DETAIL_MAX_CHARS).collect();
        out.push_str("...");
        out
    } else {
        text.to_string()
    }
}
