// src/coordinator.rs
//! # Aggregation coordinator
//! One tokio task per configured source, each bounded by its own timeout.
//! Whatever happens inside a task (error, timeout, panic), the cycle still
//! yields exactly one record per source.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{FixedOffset, Utc};
use futures::future::join_all;
use metrics::{counter, histogram};
use tokio::task::AbortHandle;

use crate::cache::CycleRunner;
use crate::classify::classify;
use crate::config::EngineConfig;
use crate::fetch::{FeedFetcher, FetchError, PageDocument, PageFetcher, RawFetchResult, RenderedPageFetcher};
use crate::model::{Snapshot, StatusRecord};
use crate::registry::{Registry, SourceDescriptor, Strategy};

/// Timeouts and presentation settings the coordinator applies per task.
#[derive(Debug, Clone, Copy)]
pub struct TaskPolicy {
    pub task_timeout: Duration,
    pub rendered_task_timeout: Duration,
    pub display_offset: FixedOffset,
}

impl TaskPolicy {
    pub fn from_config(cfg: &EngineConfig) -> Self {
        Self {
            task_timeout: cfg.task_timeout(),
            rendered_task_timeout: cfg.rendered_task_timeout(),
            display_offset: cfg.display_offset(),
        }
    }

    pub fn timeout_for(&self, desc: &SourceDescriptor) -> Duration {
        match (desc.timeout_secs, desc.strategy) {
            (Some(secs), _) => Duration::from_secs(secs),
            (None, Strategy::RenderedPage) => self.rendered_task_timeout,
            (None, _) => self.task_timeout,
        }
    }
}

#[derive(Clone)]
pub struct Aggregator {
    registry: Arc<Registry>,
    feeds: FeedFetcher,
    pages: PageFetcher,
    rendered: Arc<RenderedPageFetcher>,
    policy: TaskPolicy,
}

/// Aborts still-running source tasks if the cycle itself is dropped.
struct AbortOnDrop(Vec<AbortHandle>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        for h in &self.0 {
            h.abort();
        }
    }
}

impl Aggregator {
    pub fn new(
        registry: Arc<Registry>,
        feeds: FeedFetcher,
        pages: PageFetcher,
        rendered: Arc<RenderedPageFetcher>,
        policy: TaskPolicy,
    ) -> Self {
        Self {
            registry,
            feeds,
            pages,
            rendered,
            policy,
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Fetch and classify every source concurrently; waits for all of them.
    pub async fn run_cycle(&self) -> Snapshot {
        crate::metrics::describe_once();
        let t0 = Instant::now();

        let descriptors: Vec<SourceDescriptor> = self.registry.iter().cloned().collect();
        let mut handles = Vec::with_capacity(descriptors.len());
        for desc in &descriptors {
            let this = self.clone();
            let desc = desc.clone();
            let limit = self.policy.timeout_for(&desc);
            handles.push(tokio::spawn(async move {
                match tokio::time::timeout(limit, this.fetch_and_classify(&desc)).await {
                    Ok(record) => record,
                    Err(_) => {
                        tracing::warn!(
                            target: "coordinator",
                            source = %desc.id,
                            timeout_ms = limit.as_millis() as u64,
                            "source timed out"
                        );
                        counter!("status_source_timeouts_total", "source" => desc.id.clone())
                            .increment(1);
                        StatusRecord::unknown(&desc, Utc::now())
                    }
                }
            }));
        }
        let _abort = AbortOnDrop(handles.iter().map(|h| h.abort_handle()).collect());

        let results = join_all(handles).await;

        let mut services = BTreeMap::new();
        for (desc, joined) in descriptors.iter().zip(results) {
            let record = match joined {
                Ok(record) => record,
                Err(e) => {
                    tracing::error!(target: "coordinator", source = %desc.id, error = %e, "source task panicked");
                    counter!("status_source_panics_total").increment(1);
                    StatusRecord::unknown(desc, Utc::now())
                }
            };
            counter!(
                "status_source_results_total",
                "source" => desc.id.clone(),
                "status" => record.status.as_str()
            )
            .increment(1);
            services.insert(desc.id.clone(), record);
        }

        let elapsed = t0.elapsed();
        histogram!("status_cycle_ms").record(elapsed.as_secs_f64() * 1_000.0);
        counter!("status_cycles_total").increment(1);

        let snapshot = Snapshot {
            services,
            captured_at: Utc::now(),
        };
        tracing::info!(
            target: "coordinator",
            services = snapshot.len(),
            disrupted = snapshot.count_with(crate::model::Status::Disrupted),
            unknown = snapshot.count_with(crate::model::Status::Unknown),
            elapsed_ms = elapsed.as_millis() as u64,
            "aggregation cycle finished"
        );
        snapshot
    }

    async fn fetch_and_classify(&self, desc: &SourceDescriptor) -> StatusRecord {
        let raw = self.fetch_raw(desc).await;
        if let RawFetchResult::Missing(reason) = &raw {
            tracing::warn!(
                target: "coordinator",
                source = %desc.id,
                strategy = %desc.strategy,
                error = %reason,
                "source fetch failed"
            );
        }
        let c = classify(&desc.id, &desc.rule, &raw, self.policy.display_offset);
        StatusRecord::from_classification(desc, c, Utc::now())
    }

    async fn fetch_raw(&self, desc: &SourceDescriptor) -> RawFetchResult {
        match desc.strategy {
            Strategy::Feed => match self.feeds.try_fetch(&desc.endpoint).await {
                Ok(entries) => RawFetchResult::Feed(entries),
                Err(e) => RawFetchResult::Missing(e.to_string()),
            },
            Strategy::Page => self.static_page(&desc.endpoint).await,
            Strategy::RenderedPage => {
                let Some(spec) = desc.render.as_ref() else {
                    return RawFetchResult::Missing("no render spec".to_string());
                };
                match self
                    .rendered
                    .fetch_rendered(&desc.id, &desc.endpoint, spec)
                    .await
                {
                    Ok(html) => RawFetchResult::Document(PageDocument::new(&desc.endpoint, html)),
                    Err(FetchError::BrowserUnavailable(reason)) if desc.static_fallback => {
                        tracing::warn!(
                            target: "coordinator",
                            source = %desc.id,
                            error = %reason,
                            "no browser session, falling back to static page"
                        );
                        self.static_page(&desc.endpoint).await
                    }
                    Err(e) => RawFetchResult::Missing(e.to_string()),
                }
            }
        }
    }

    async fn static_page(&self, endpoint: &str) -> RawFetchResult {
        match self.pages.fetch(endpoint).await {
            Some(doc) => RawFetchResult::Document(doc),
            None => RawFetchResult::Missing(format!("page {endpoint} unavailable")),
        }
    }
}

#[async_trait]
impl CycleRunner for Aggregator {
    async fn run_cycle(&self) -> Snapshot {
        Aggregator::run_cycle(self).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::default_sources;

    #[test]
    fn timeout_follows_strategy_and_override() {
        let policy = TaskPolicy::from_config(&EngineConfig::default());
        let mut sources = default_sources();
        let gemini = sources.iter().find(|s| s.id == "gemini").unwrap();
        let openai = sources.iter().find(|s| s.id == "openai").unwrap();
        assert_eq!(policy.timeout_for(gemini), Duration::from_secs(60));
        assert_eq!(policy.timeout_for(openai), Duration::from_secs(15));

        sources[0].timeout_secs = Some(3);
        assert_eq!(policy.timeout_for(&sources[0]), Duration::from_secs(3));
    }
}
