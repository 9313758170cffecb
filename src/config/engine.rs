// src/config/engine.rs
use std::path::{Path, PathBuf};
use std::time::Duration;
use std::{env, fs};

use anyhow::{anyhow, Context, Result};
use chrono::{FixedOffset, Offset, Utc};
use serde::{Deserialize, Serialize};

const ENV_PATH: &str = "STATUS_CONFIG_PATH";
const MAX_OFFSET_HOURS: i32 = 14;
const MAX_RETRIES: u8 = 5;

fn default_request_timeout_secs() -> u64 {
    10
}
fn default_browser_timeout_secs() -> u64 {
    20
}
fn default_task_timeout_secs() -> u64 {
    15
}
fn default_rendered_task_timeout_secs() -> u64 {
    60
}
fn default_cache_ttl_secs() -> u64 {
    60
}
fn default_max_retries() -> u8 {
    2
}
fn default_retry_backoff_ms() -> u64 {
    500
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_display_offset() -> i32 {
    8
}
fn default_user_agent() -> String {
    concat!("llm-cloud-status/", env!("CARGO_PKG_VERSION")).to_string()
}

/// Static engine settings. Read-only after load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Per HTTP request (feeds and static pages).
    pub request_timeout_secs: u64,
    /// Each browser wait (anchor, indicator) and CDP request.
    pub browser_timeout_secs: u64,
    /// Whole fetch+classify task for feed/page sources.
    pub task_timeout_secs: u64,
    /// Whole task for rendered sources (launch + navigation + waits).
    pub rendered_task_timeout_secs: u64,
    pub cache_ttl_secs: u64,
    pub max_retries: u8,
    pub retry_backoff_ms: u64,
    pub log_level: String,
    /// Zone `last_update` is shown in. Default +8 (Singapore).
    pub display_utc_offset_hours: i32,
    /// Zone assumed for feed timestamps without one. Default 0 (GMT).
    pub reference_utc_offset_hours: i32,
    pub user_agent: String,
    pub browser_executable: Option<PathBuf>,
    /// Use a running browser (DevTools websocket) instead of launching one.
    pub browser_ws_url: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: default_request_timeout_secs(),
            browser_timeout_secs: default_browser_timeout_secs(),
            task_timeout_secs: default_task_timeout_secs(),
            rendered_task_timeout_secs: default_rendered_task_timeout_secs(),
            cache_ttl_secs: default_cache_ttl_secs(),
            max_retries: default_max_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
            log_level: default_log_level(),
            display_utc_offset_hours: default_display_offset(),
            reference_utc_offset_hours: 0,
            user_agent: default_user_agent(),
            browser_executable: None,
            browser_ws_url: None,
        }
    }
}

impl EngineConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let data = fs::read_to_string(path)
            .with_context(|| format!("reading engine config from {}", path.display()))?;
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        let cfg: EngineConfig = if ext == "json" {
            serde_json::from_str(&data).context("parsing engine config json")?
        } else {
            toml::from_str(&data).context("parsing engine config toml")?
        };
        Ok(cfg.sanitized())
    }

    /// Resolution order:
    /// 1) $STATUS_CONFIG_PATH (must exist)
    /// 2) config/status.toml
    /// 3) defaults
    ///
    /// then `STATUS_*` env overrides.
    pub fn load_default() -> Result<Self> {
        let base = if let Ok(p) = env::var(ENV_PATH) {
            let pb = PathBuf::from(p);
            if !pb.exists() {
                return Err(anyhow!("{ENV_PATH} points to non-existent path"));
            }
            Self::load_from_file(&pb)?
        } else {
            let toml_p = PathBuf::from("config/status.toml");
            if toml_p.exists() {
                Self::load_from_file(&toml_p)?
            } else {
                Self::default()
            }
        };
        Ok(base.with_env_overrides()?.sanitized())
    }

    pub fn with_env_overrides(mut self) -> Result<Self> {
        if let Some(v) = env_u64("STATUS_CACHE_TTL_SECS")? {
            self.cache_ttl_secs = v;
        }
        if let Some(v) = env_u64("STATUS_REQUEST_TIMEOUT_SECS")? {
            self.request_timeout_secs = v;
        }
        if let Some(v) = env_u64("STATUS_BROWSER_TIMEOUT_SECS")? {
            self.browser_timeout_secs = v;
        }
        if let Ok(v) = env::var("STATUS_LOG_LEVEL") {
            if !v.trim().is_empty() {
                self.log_level = v.trim().to_string();
            }
        }
        if let Ok(v) = env::var("STATUS_BROWSER_WS_URL") {
            self.browser_ws_url = Some(v).filter(|s| !s.trim().is_empty());
        }
        Ok(self)
    }

    /// Zero timeouts fall back to defaults; retries are capped at 5 and
    /// offsets clamped to ±14h.
    pub fn sanitized(mut self) -> Self {
        self.max_retries = self.max_retries.min(MAX_RETRIES);
        if self.request_timeout_secs == 0 {
            self.request_timeout_secs = default_request_timeout_secs();
        }
        if self.browser_timeout_secs == 0 {
            self.browser_timeout_secs = default_browser_timeout_secs();
        }
        if self.task_timeout_secs == 0 {
            self.task_timeout_secs = default_task_timeout_secs();
        }
        if self.rendered_task_timeout_secs == 0 {
            self.rendered_task_timeout_secs = default_rendered_task_timeout_secs();
        }
        if self.log_level.trim().is_empty() {
            self.log_level = default_log_level();
        }
        if self.user_agent.trim().is_empty() {
            self.user_agent = default_user_agent();
        }
        self.display_utc_offset_hours = self
            .display_utc_offset_hours
            .clamp(-MAX_OFFSET_HOURS, MAX_OFFSET_HOURS);
        self.reference_utc_offset_hours = self
            .reference_utc_offset_hours
            .clamp(-MAX_OFFSET_HOURS, MAX_OFFSET_HOURS);
        self
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn browser_timeout(&self) -> Duration {
        Duration::from_secs(self.browser_timeout_secs)
    }

    pub fn task_timeout(&self) -> Duration {
        Duration::from_secs(self.task_timeout_secs)
    }

    pub fn rendered_task_timeout(&self) -> Duration {
        Duration::from_secs(self.rendered_task_timeout_secs)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn display_offset(&self) -> FixedOffset {
        hours_offset(self.display_utc_offset_hours)
    }

    pub fn reference_offset(&self) -> FixedOffset {
        hours_offset(self.reference_utc_offset_hours)
    }
}

fn hours_offset(hours: i32) -> FixedOffset {
    FixedOffset::east_opt(hours * 3600).unwrap_or_else(|| Utc.fix())
}

fn env_u64(key: &str) -> Result<Option<u64>> {
    match env::var(key) {
        Ok(v) if !v.trim().is_empty() => v
            .trim()
            .parse::<u64>()
            .map(Some)
            .with_context(|| format!("{key} must be a non-negative integer, got '{v}'")),
        _ => Ok(None),
    }
}
