// tests/metrics.rs
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::{self, Body};
use axum::http::{Request, StatusCode};
use llm_cloud_status::classify::{ClassifyRule, EmptyFeed};
use llm_cloud_status::config::EngineConfig;
use llm_cloud_status::engine::StatusEngine;
use llm_cloud_status::fetch::{FetchError, RenderSession, SessionLauncher};
use llm_cloud_status::metrics::Metrics;
use llm_cloud_status::registry::{Category, Registry, SourceDescriptor, Strategy};
use tower::ServiceExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

struct NoBrowser;

#[async_trait]
impl SessionLauncher for NoBrowser {
    async fn launch(&self, _source_id: &str) -> Result<Box<dyn RenderSession>, FetchError> {
        Err(FetchError::BrowserUnavailable("disabled in tests".into()))
    }
}

// One recorder per process, so everything lives in a single test.
#[tokio::test]
async fn metrics_endpoint_contains_cycle_and_cache_series() {
    let metrics = Metrics::install(60).expect("recorder installs once");

    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/feed.rss"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(include_str!("fixtures/langsmith_elevated.rss")),
        )
        .mount(&server)
        .await;

    let registry = Registry::new(vec![SourceDescriptor {
        id: "langsmith".into(),
        display_name: "LangSmith US".into(),
        category: Category::Llm,
        strategy: Strategy::Feed,
        endpoint: format!("{}/feed.rss", server.uri()),
        status_page_url: server.uri(),
        rule: ClassifyRule::IncidentPresence {
            on_empty: EmptyFeed::Operational,
        },
        render: None,
        static_fallback: false,
        timeout_secs: None,
    }])
    .unwrap();
    let engine =
        StatusEngine::with_launcher(EngineConfig::default(), registry, Arc::new(NoBrowser)).unwrap();

    engine.snapshot().await;
    engine.snapshot().await;

    let resp = metrics
        .router()
        .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let bytes = body::to_bytes(resp.into_body(), 1024 * 1024).await.unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    for series in [
        "status_cycles_total",
        "status_source_results_total",
        "status_cache_hits_total",
        "status_cache_misses_total",
        "status_cache_ttl_secs",
        "status_cycle_ms",
    ] {
        assert!(text.contains(series), "missing {series} in:\n{text}");
    }
    assert!(text.contains(r#"status="Disrupted""#), "{text}");
}
