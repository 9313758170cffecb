// src/classify/rules.rs
use chrono::{DateTime, Datelike, FixedOffset, NaiveDateTime, TimeDelta, Utc};

use super::{EmptyFeed, EntryField};
use crate::fetch::{FeedEntry, PageDocument};
use crate::model::{truncate_detail, Classification, Status, UNKNOWN_DETAIL};
use crate::text::{contains_folded, fold};

const NO_ENTRIES_DETAIL: &str = "No incidents reported";

pub(super) fn resolution_phrase(
    entries: &[FeedEntry],
    field: EntryField,
    phrases: &[String],
    veto: &[String],
    on_empty: EmptyFeed,
    display: FixedOffset,
) -> Classification {
    let Some(latest) = entries.first() else {
        return empty_feed(on_empty);
    };
    let hay = fold(field_text(latest, field));
    let resolved = phrases.iter().any(|p| contains_folded(&hay, p))
        && !veto.iter().any(|v| contains_folded(&hay, v));
    from_entry(latest, verdict(resolved), display)
}

pub(super) fn negative_keywords(
    entries: &[FeedEntry],
    field: EntryField,
    keywords: &[String],
    on_empty: EmptyFeed,
    display: FixedOffset,
) -> Classification {
    let Some(latest) = entries.first() else {
        return empty_feed(on_empty);
    };
    let hay = fold(field_text(latest, field));
    let hit = keywords.iter().find(|k| contains_folded(&hay, k));
    if let Some(k) = hit {
        tracing::debug!(target: "classify", keyword = %k, "negative keyword in latest entry");
    }
    from_entry(latest, verdict(hit.is_none()), display)
}

pub(super) fn incident_presence(
    entries: &[FeedEntry],
    on_empty: EmptyFeed,
    display: FixedOffset,
) -> Classification {
    match entries.first() {
        Some(latest) => from_entry(latest, Status::Disrupted, display),
        None => empty_feed(on_empty),
    }
}

pub(super) fn marker_element(
    source_id: &str,
    doc: &PageDocument,
    container: &str,
    marker: &str,
) -> Classification {
    match doc.has_descendant(container, marker) {
        Some(found) => Classification {
            status: verdict(found),
            issue_link: None,
            title: None,
            detail: if found {
                "All systems operational".to_string()
            } else {
                "Active disruption".to_string()
            },
            last_update: None,
        },
        None => {
            tracing::warn!(target: "classify", source = %source_id, selector = %container, "container element not found");
            Classification::unknown(UNKNOWN_DETAIL)
        }
    }
}

pub(super) fn marker_phrase(
    source_id: &str,
    doc: &PageDocument,
    region: &str,
    phrases: &[String],
    display: FixedOffset,
) -> Classification {
    let Some(text) = doc.region_text(region) else {
        tracing::warn!(target: "classify", source = %source_id, selector = %region, "status region not found");
        return Classification::unknown(UNKNOWN_DETAIL);
    };
    let hay = fold(&text);
    let ok = phrases.iter().any(|p| contains_folded(&hay, p));
    let lines = doc.region_lines(region).unwrap_or_default();
    Classification {
        status: verdict(ok),
        issue_link: None,
        title: lines.first().cloned(),
        detail: truncate_detail(&text),
        last_update: daily_log_time(&lines, Utc::now()).map(|t| t.with_timezone(&display)),
    }
}

/// First line shaped like "Mar 01, 10:15" (UTC, year omitted). A date more
/// than a day ahead of `now` belongs to the previous year.
fn daily_log_time(lines: &[String], now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    lines.iter().find_map(|line| {
        let stamped = format!("{} {}", now.year(), line.trim());
        let t = NaiveDateTime::parse_from_str(&stamped, "%Y %b %d, %H:%M")
            .ok()?
            .and_utc();
        if t > now + TimeDelta::days(1) {
            t.with_year(now.year() - 1)
        } else {
            Some(t)
        }
    })
}

fn verdict(operational: bool) -> Status {
    if operational {
        Status::Operational
    } else {
        Status::Disrupted
    }
}

fn field_text(entry: &FeedEntry, field: EntryField) -> &str {
    match field {
        EntryField::Body => &entry.body,
        EntryField::Title => &entry.title,
    }
}

fn from_entry(entry: &FeedEntry, status: Status, display: FixedOffset) -> Classification {
    Classification {
        status,
        issue_link: entry.link.clone(),
        title: (!entry.title.is_empty()).then(|| entry.title.clone()),
        detail: truncate_detail(&entry.body),
        last_update: entry.published.map(|t| t.with_timezone(&display)),
    }
}

fn empty_feed(on_empty: EmptyFeed) -> Classification {
    match on_empty {
        EmptyFeed::Operational => Classification {
            status: Status::Operational,
            issue_link: None,
            title: None,
            detail: NO_ENTRIES_DETAIL.to_string(),
            last_update: None,
        },
        EmptyFeed::Unknown => Classification::unknown(UNKNOWN_DETAIL),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn sgt() -> FixedOffset {
        FixedOffset::east_opt(8 * 3600).unwrap()
    }

    fn entry(title: &str, body: &str) -> FeedEntry {
        FeedEntry {
            title: title.into(),
            link: Some("https://status.example.com/incidents/1".into()),
            body: body.into(),
            published: Some(Utc.with_ymd_and_hms(2025, 3, 1, 10, 0, 0).unwrap()),
        }
    }

    fn s(v: &[&str]) -> Vec<String> {
        v.iter().map(|x| x.to_string()).collect()
    }

    #[test]
    fn resolution_phrase_uses_latest_entry_only() {
        let entries = vec![
            entry("Elevated errors", "We are investigating."),
            entry("Old", "All impacted services have now fully recovered."),
        ];
        let c = resolution_phrase(
            &entries,
            EntryField::Body,
            &s(&["all impacted services have now fully recovered"]),
            &[],
            EmptyFeed::Unknown,
            sgt(),
        );
        assert_eq!(c.status, Status::Disrupted);
        assert_eq!(c.title.as_deref(), Some("Elevated errors"));
    }

    #[test]
    fn veto_overrides_resolution() {
        let entries = vec![entry("x", "Resolved - API outage on sonar models")];
        let c = resolution_phrase(
            &entries,
            EntryField::Body,
            &s(&["resolved"]),
            &s(&["api outage"]),
            EmptyFeed::Unknown,
            sgt(),
        );
        assert_eq!(c.status, Status::Disrupted);
    }

    #[test]
    fn feed_verdict_carries_link_and_display_time() {
        let entries = vec![entry("Resolved: BigQuery latency", "")];
        let c = resolution_phrase(
            &entries,
            EntryField::Title,
            &s(&["resolved:"]),
            &[],
            EmptyFeed::Unknown,
            sgt(),
        );
        assert_eq!(c.status, Status::Operational);
        assert_eq!(
            c.issue_link.as_deref(),
            Some("https://status.example.com/incidents/1")
        );
        let shown = c.last_update.unwrap();
        assert_eq!(shown.offset().local_minus_utc(), 8 * 3600);
        assert_eq!(shown.format("%H:%M").to_string(), "18:00");
    }

    #[test]
    fn empty_feed_follows_on_empty() {
        let c = negative_keywords(&[], EntryField::Body, &s(&["outage"]), EmptyFeed::Unknown, sgt());
        assert_eq!(c.status, Status::Unknown);
        let c = incident_presence(&[], EmptyFeed::Operational, sgt());
        assert_eq!(c.status, Status::Operational);
        assert_eq!(c.issue_link, None);
    }

    #[test]
    fn incident_presence_flags_any_entry() {
        let c = incident_presence(&[entry("Storage incident", "Investigating")], EmptyFeed::Operational, sgt());
        assert_eq!(c.status, Status::Disrupted);
    }

    #[test]
    fn marker_element_three_way() {
        let ok = PageDocument::new(
            "https://aws",
            r#"<div class="event-state"><div class="no-events">No recent events</div></div>"#,
        );
        let bad = PageDocument::new(
            "https://aws",
            r#"<div class="event-state"><div class="event">EC2 increased errors</div></div>"#,
        );
        let broken = PageDocument::new("https://aws", "<main>redesigned</main>");
        assert_eq!(marker_element("aws", &ok, "div.event-state", "div.no-events").status, Status::Operational);
        assert_eq!(marker_element("aws", &bad, "div.event-state", "div.no-events").status, Status::Disrupted);
        assert_eq!(marker_element("aws", &broken, "div.event-state", "div.no-events").status, Status::Unknown);
    }

    #[test]
    fn marker_phrase_reads_region_text() {
        let doc = PageDocument::new(
            "https://aistudio",
            "<ms-status-daily-log><h3>Today</h3><p>No incidents   reported today</p></ms-status-daily-log>",
        );
        let c = marker_phrase("gemini", &doc, "ms-status-daily-log", &s(&["no incidents reported today"]), sgt());
        assert_eq!(c.status, Status::Operational);
        assert_eq!(c.title.as_deref(), Some("Today"));
        assert_eq!(c.last_update, None);

        let c = marker_phrase("gemini", &doc, "ms-status-incident", &s(&["anything"]), sgt());
        assert_eq!(c.status, Status::Unknown);
    }

    #[test]
    fn marker_phrase_reads_the_logged_time() {
        let doc = PageDocument::new(
            "https://aistudio",
            "<ms-status-daily-log><div>Gemini 2.5 Pro</div><span>Elevated error rates</span>\
             <span>Mar 01, 10:15</span></ms-status-daily-log>",
        );
        let c = marker_phrase("gemini", &doc, "ms-status-daily-log", &s(&["no incidents reported today"]), sgt());
        assert_eq!(c.status, Status::Disrupted);
        let shown = c.last_update.expect("logged time");
        assert_eq!(shown.offset().local_minus_utc(), 8 * 3600);
        assert_eq!(shown.format("%m-%d %H:%M").to_string(), "03-01 18:15");
    }

    #[test]
    fn daily_log_time_rolls_back_across_new_year() {
        let lines = vec!["Gemini API".to_string(), "Dec 31, 23:50".to_string()];
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 0, 5, 0).unwrap();
        assert_eq!(
            daily_log_time(&lines, now),
            Some(Utc.with_ymd_and_hms(2025, 12, 31, 23, 50, 0).unwrap())
        );

        let now = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let lines = vec!["Mar 01, 10:15".to_string()];
        assert_eq!(
            daily_log_time(&lines, now),
            Some(Utc.with_ymd_and_hms(2026, 3, 1, 10, 15, 0).unwrap())
        );
        assert_eq!(daily_log_time(&["No incidents".to_string()], now), None);
    }
}
