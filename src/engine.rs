//! # Status engine
//! Wires registry, fetchers, coordinator and cache into the one object the
//! presentation layer talks to: `snapshot()` and `shutdown()`.

use std::sync::Arc;

use anyhow::{Context, Result};

use crate::cache::SnapshotCache;
use crate::config::EngineConfig;
use crate::coordinator::{Aggregator, TaskPolicy};
use crate::fetch::rendered::{ChromeLauncher, RenderTimeouts};
use crate::fetch::{FeedFetcher, HttpTransport, PageFetcher, RenderedPageFetcher, SessionLauncher};
use crate::model::Snapshot;
use crate::registry::Registry;

pub struct StatusEngine {
    config: EngineConfig,
    registry: Arc<Registry>,
    cache: Arc<SnapshotCache>,
    rendered: Arc<RenderedPageFetcher>,
}

impl StatusEngine {
    /// Production wiring: Chromium for rendered pages.
    pub fn from_config(config: EngineConfig, registry: Registry) -> Result<Self> {
        let launcher = Arc::new(ChromeLauncher::from_config(&config));
        Self::with_launcher(config, registry, launcher)
    }

    pub fn with_launcher(
        config: EngineConfig,
        registry: Registry,
        launcher: Arc<dyn SessionLauncher>,
    ) -> Result<Self> {
        let config = config.sanitized();
        let http = HttpTransport::new(&config).context("building http client")?;
        let registry = Arc::new(registry);
        let rendered = Arc::new(RenderedPageFetcher::new(
            launcher,
            RenderTimeouts::from_config(&config),
        ));
        let aggregator = Aggregator::new(
            registry.clone(),
            FeedFetcher::new(http.clone(), config.reference_offset()),
            PageFetcher::new(http),
            rendered.clone(),
            TaskPolicy::from_config(&config),
        );
        let cache = Arc::new(SnapshotCache::new(Arc::new(aggregator), config.cache_ttl()));

        tracing::info!(
            target: "engine",
            sources = registry.len(),
            ttl_secs = config.cache_ttl_secs,
            "status engine ready"
        );
        Ok(Self {
            config,
            registry,
            cache,
            rendered,
        })
    }

    /// Cached snapshot; runs a cycle when the cached one is missing or stale.
    pub async fn snapshot(&self) -> Arc<Snapshot> {
        self.cache.get_or_refresh().await
    }

    pub fn cache(&self) -> Arc<SnapshotCache> {
        self.cache.clone()
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Tear down every browser session.
    pub async fn shutdown(&self) {
        tracing::info!(target: "engine", "shutting down status engine");
        self.rendered.shutdown().await;
    }
}
