// tests/classify_sources.rs
// Built-in rules against captured status feeds and pages.

use chrono::FixedOffset;
use llm_cloud_status::classify::classify;
use llm_cloud_status::fetch::feed::parse_feed;
use llm_cloud_status::fetch::{FeedEntry, PageDocument, RawFetchResult};
use llm_cloud_status::model::{Status, UNKNOWN_DETAIL};
use llm_cloud_status::registry::Registry;

fn sgt() -> FixedOffset {
    FixedOffset::east_opt(8 * 3600).unwrap()
}

fn feed(xml: &str) -> RawFetchResult {
    RawFetchResult::Feed(parse_feed(xml, FixedOffset::east_opt(0).unwrap()).expect("fixture parses"))
}

fn run(id: &str, raw: &RawFetchResult) -> llm_cloud_status::model::Classification {
    let registry = Registry::builtin();
    let desc = registry.get(id).expect("builtin source");
    classify(id, &desc.rule, raw, sgt())
}

fn single(body: &str) -> RawFetchResult {
    RawFetchResult::Feed(vec![FeedEntry {
        title: "Incident".into(),
        link: Some("https://status.example.com/i/1".into()),
        body: body.into(),
        published: None,
    }])
}

#[test]
fn openai_full_recovery_is_operational() {
    let c = run("openai", &feed(include_str!("fixtures/openai_resolved.rss")));
    assert_eq!(c.status, Status::Operational);
    assert_eq!(
        c.issue_link.as_deref(),
        Some("https://status.openai.com/incidents/01JNQ8ZB")
    );
    assert_eq!(
        c.last_update.unwrap().format("%Y-%m-%d %H:%M").to_string(),
        "2025-03-01 18:00"
    );

    let c = run("openai", &single("All impacted services have now fully recovered."));
    assert_eq!(c.status, Status::Operational);
}

#[test]
fn langsmith_elevated_errors_is_disrupted() {
    let c = run("langsmith", &feed(include_str!("fixtures/langsmith_elevated.rss")));
    assert_eq!(c.status, Status::Disrupted);
    assert_eq!(c.title.as_deref(), Some("Trace ingestion delays"));

    let c = run("langsmith", &single("We are investigating elevated error rates."));
    assert_eq!(c.status, Status::Disrupted);
    let c = run("langsmith", &single("The scheduled maintenance has been completed."));
    assert_eq!(c.status, Status::Operational);
}

#[test]
fn deepseek_and_gcp_resolution_markers() {
    let c = run("deepseek", &feed(include_str!("fixtures/deepseek_history.atom")));
    assert_eq!(c.status, Status::Operational);

    let c = run("gcp", &feed(include_str!("fixtures/gcp_feed.atom")));
    assert_eq!(c.status, Status::Operational);
    assert!(c.title.unwrap().starts_with("RESOLVED:"));
}

#[test]
fn perplexity_veto_phrase() {
    assert_eq!(run("perplexity", &single("Resolved - login issue")).status, Status::Operational);
    assert_eq!(
        run("perplexity", &single("Resolved - API outage follow-up")).status,
        Status::Disrupted
    );
}

#[test]
fn empty_feed_direction_is_per_source() {
    let empty = RawFetchResult::Feed(Vec::new());
    assert_eq!(run("anthropic", &empty).status, Status::Unknown);
    assert_eq!(run("azure", &empty).status, Status::Operational);
}

#[test]
fn aws_marker_element() {
    let ok = RawFetchResult::Document(PageDocument::new(
        "https://health.aws.amazon.com/health/status",
        include_str!("fixtures/aws_no_events.html"),
    ));
    let bad = RawFetchResult::Document(PageDocument::new(
        "https://health.aws.amazon.com/health/status",
        include_str!("fixtures/aws_incident.html"),
    ));
    assert_eq!(run("aws", &ok).status, Status::Operational);
    let c = run("aws", &bad);
    assert_eq!(c.status, Status::Disrupted);
    assert_eq!(c.issue_link, None);
}

#[test]
fn gemini_marker_phrase() {
    let ok = RawFetchResult::Document(PageDocument::new(
        "https://aistudio.google.com/status",
        include_str!("fixtures/gemini_daily_log.html"),
    ));
    let bad = RawFetchResult::Document(PageDocument::new(
        "https://aistudio.google.com/status",
        include_str!("fixtures/gemini_incident.html"),
    ));
    assert_eq!(run("gemini", &ok).status, Status::Operational);
    let c = run("gemini", &bad);
    assert_eq!(c.status, Status::Disrupted);
    assert_eq!(c.title.as_deref(), Some("Gemini 2.5 Pro"));
    assert!(c.detail.contains("Elevated error rates"));
    let logged = c.last_update.expect("status-time line is parsed");
    assert_eq!(logged.format("%b %d").to_string(), "Mar 01");
    assert_eq!(run("gemini", &ok).last_update, None);
}

#[test]
fn missing_and_mismatched_results_are_unknown_not_disrupted() {
    for id in ["openai", "aws", "gemini", "azure"] {
        let c = run(id, &RawFetchResult::Missing("connection refused".into()));
        assert_eq!(c.status, Status::Unknown, "{id}");
        assert_eq!(c.detail, UNKNOWN_DETAIL);
    }
    let page = RawFetchResult::Document(PageDocument::new("https://x", "<p>resolved</p>"));
    assert_eq!(run("openai", &page).status, Status::Unknown);
}
