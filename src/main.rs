//! Status dashboard backend, binary entrypoint.
//! Loads config and the source registry, builds the engine, keeps the cache
//! warm in the background and serves the snapshot over HTTP.

use std::sync::Arc;

use anyhow::Context;
use shuttle_axum::ShuttleAxum;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use llm_cloud_status::api::{self, AppState};
use llm_cloud_status::config::{load_registry_default, EngineConfig};
use llm_cloud_status::engine::StatusEngine;
use llm_cloud_status::metrics::Metrics;
use llm_cloud_status::scheduler::spawn_refresh_loop;

/// Compact logs; `RUST_LOG` wins over the configured level.
fn init_tracing(default_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{default_level},hyper=warn,chromiumoxide=warn")));

    // Shuttle may already have installed a subscriber.
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .try_init();
}

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();

    let config = EngineConfig::load_default().context("loading engine config")?;
    init_tracing(&config.log_level);

    let registry = load_registry_default().context("loading source registry")?;
    let metrics = Metrics::install(config.cache_ttl_secs)?;
    let engine = Arc::new(StatusEngine::from_config(config, registry)?);

    let cache = engine.cache();
    spawn_refresh_loop(cache.clone(), cache.ttl());

    let shutdown_engine = engine.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            shutdown_engine.shutdown().await;
        }
    });

    let router = api::create_router(AppState { cache }).merge(metrics.router());

    Ok(router.into())
}
