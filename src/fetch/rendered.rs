// src/fetch/rendered.rs
//! Client-rendered status pages driven through a headless browser.
//!
//! Lifecycle per source:
//! - session created lazily on first use, one browser process and profile
//!   directory per source;
//! - liveness probe (current page URL) before every reuse, rebuilt when it fails;
//! - same-source requests serialize on the session's async mutex, different
//!   sources never contend;
//! - `shutdown()` closes every session and removes its profile directory.
//!
//! The browser sits behind `SessionLauncher`/`RenderSession` so the flow can be
//! exercised without Chromium.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfigBuilder};
use chromiumoxide::Page;
use futures::StreamExt;
use metrics::counter;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::FetchError;
use crate::config::EngineConfig;
use crate::registry::RenderSpec;

/// One live browser session bound to a single source.
#[async_trait]
pub trait RenderSession: Send + Sync {
    /// Liveness probe; reads the current navigation state.
    async fn probe(&self) -> Result<(), FetchError>;
    async fn navigate(&self, url: &str) -> Result<(), FetchError>;
    async fn exists(&self, selector: &str) -> Result<bool, FetchError>;
    /// Click the first visible, enabled match. `Ok(false)` when there is none.
    async fn click_first(&self, selector: &str) -> Result<bool, FetchError>;
    async fn outer_html(&self, selector: &str) -> Result<Option<String>, FetchError>;
    async fn close(&mut self);
}

#[async_trait]
pub trait SessionLauncher: Send + Sync {
    async fn launch(&self, source_id: &str) -> Result<Box<dyn RenderSession>, FetchError>;
}

#[derive(Debug, Clone, Copy)]
pub struct RenderTimeouts {
    /// Upper bound for each of the anchor and indicator waits.
    pub element_wait: Duration,
    pub poll_interval: Duration,
}

impl RenderTimeouts {
    pub fn from_config(cfg: &EngineConfig) -> Self {
        Self {
            element_wait: cfg.browser_timeout(),
            poll_interval: Duration::from_millis(250),
        }
    }
}

type SessionSlot = Arc<tokio::sync::Mutex<Option<Box<dyn RenderSession>>>>;

pub struct RenderedPageFetcher {
    launcher: Arc<dyn SessionLauncher>,
    sessions: Mutex<HashMap<String, SessionSlot>>,
    timeouts: RenderTimeouts,
}

impl RenderedPageFetcher {
    pub fn new(launcher: Arc<dyn SessionLauncher>, timeouts: RenderTimeouts) -> Self {
        Self {
            launcher,
            sessions: Mutex::new(HashMap::new()),
            timeouts,
        }
    }

    fn slot(&self, source_id: &str) -> SessionSlot {
        let mut map = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        map.entry(source_id.to_string()).or_default().clone()
    }

    /// Render `endpoint` and return the outer HTML of the indicator element.
    pub async fn fetch_rendered(
        &self,
        source_id: &str,
        endpoint: &str,
        spec: &RenderSpec,
    ) -> Result<String, FetchError> {
        let slot = self.slot(source_id);
        let mut guard = slot.lock().await;

        self.ensure_session(source_id, &mut guard).await?;
        let Some(session) = guard.as_deref() else {
            return Err(FetchError::BrowserUnavailable(source_id.to_string()));
        };

        let result = render(session, endpoint, spec, self.timeouts).await;
        if let Err(e) = &result {
            if e.is_session_fault() {
                warn!(target: "browser", source = %source_id, error = %e, "discarding browser session");
                if let Some(mut dead) = guard.take() {
                    dead.close().await;
                }
            }
        }
        result
    }

    async fn ensure_session(
        &self,
        source_id: &str,
        slot: &mut Option<Box<dyn RenderSession>>,
    ) -> Result<(), FetchError> {
        let probe = match slot.as_deref() {
            Some(session) => Some(session.probe().await),
            None => None,
        };
        match probe {
            Some(Ok(())) => {
                debug!(target: "browser", source = %source_id, "reusing browser session");
                return Ok(());
            }
            Some(Err(e)) => {
                warn!(target: "browser", source = %source_id, error = %e, "browser session failed health check, relaunching");
                if let Some(mut dead) = slot.take() {
                    dead.close().await;
                }
            }
            None => {}
        }

        info!(target: "browser", source = %source_id, "launching browser session");
        let session = self.launcher.launch(source_id).await.inspect_err(|_| {
            counter!("status_browser_launch_failures_total").increment(1);
        })?;
        counter!("status_browser_launches_total").increment(1);
        *slot = Some(session);
        Ok(())
    }

    /// Number of sources that currently hold a live session.
    pub async fn live_sessions(&self) -> usize {
        let slots: Vec<SessionSlot> = {
            let map = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
            map.values().cloned().collect()
        };
        let mut live = 0;
        for slot in slots {
            if slot.lock().await.is_some() {
                live += 1;
            }
        }
        live
    }

    /// Close every session. Safe to call more than once.
    pub async fn shutdown(&self) {
        let slots: Vec<(String, SessionSlot)> = {
            let mut map = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
            map.drain().collect()
        };
        for (source_id, slot) in slots {
            if let Some(mut session) = slot.lock().await.take() {
                info!(target: "browser", source = %source_id, "closing browser session");
                session.close().await;
            }
        }
    }
}

async fn render(
    session: &dyn RenderSession,
    endpoint: &str,
    spec: &RenderSpec,
    t: RenderTimeouts,
) -> Result<String, FetchError> {
    session.navigate(endpoint).await?;
    wait_for(session, &spec.anchor_selector, t).await?;

    let clicks = reveal(session, spec).await;
    debug!(target: "browser", clicks, "reveal step finished");

    wait_for(session, &spec.indicator_selector, t).await?;
    session
        .outer_html(&spec.indicator_selector)
        .await?
        .ok_or_else(|| FetchError::Timeout(spec.indicator_selector.clone()))
}

async fn wait_for(
    session: &dyn RenderSession,
    selector: &str,
    t: RenderTimeouts,
) -> Result<(), FetchError> {
    let poll = async {
        loop {
            if session.exists(selector).await? {
                return Ok(());
            }
            tokio::time::sleep(t.poll_interval).await;
        }
    };
    tokio::time::timeout(t.element_wait, poll)
        .await
        .map_err(|_| FetchError::Timeout(selector.to_string()))?
}

/// Best-effort expansion of collapsed regions. Never fails the fetch.
async fn reveal(session: &dyn RenderSession, spec: &RenderSpec) -> usize {
    let settle = Duration::from_millis(spec.settle_ms);
    let mut clicks = 0;
    'selectors: for selector in &spec.reveal_selectors {
        while clicks < spec.max_reveal_clicks {
            match session.click_first(selector).await {
                Ok(true) => {
                    clicks += 1;
                    tokio::time::sleep(settle).await;
                }
                Ok(false) => continue 'selectors,
                Err(e) => {
                    warn!(target: "browser", %selector, error = %e, "reveal click failed");
                    continue 'selectors;
                }
            }
        }
        break;
    }
    if clicks == 0 && !spec.reveal_selectors.is_empty() {
        info!(target: "browser", "no collapsed regions to reveal");
    }
    clicks
}

// --- Chromium ---

/// Launches one Chromium per source, or opens a page on a remote browser.
pub struct ChromeLauncher {
    request_timeout: Duration,
    executable: Option<PathBuf>,
    ws_url: Option<String>,
}

impl ChromeLauncher {
    pub fn from_config(cfg: &EngineConfig) -> Self {
        Self {
            request_timeout: cfg.browser_timeout(),
            executable: cfg.browser_executable.clone(),
            ws_url: cfg.browser_ws_url.clone(),
        }
    }

    async fn start(&self, source_id: &str) -> Result<(Browser, JoinHandle<()>, Option<PathBuf>), FetchError> {
        let unavailable = |e: String| FetchError::BrowserUnavailable(e);

        let (browser, mut handler, profile) = match &self.ws_url {
            Some(url) => {
                let (b, h) = Browser::connect(url.as_str())
                    .await
                    .map_err(|e| unavailable(format!("connect {url}: {e}")))?;
                (b, h, None)
            }
            None => {
                let profile = std::env::temp_dir()
                    .join(format!("llm-cloud-status-{}-{}", source_id, std::process::id()));
                std::fs::create_dir_all(&profile)
                    .map_err(|e| unavailable(format!("profile dir: {e}")))?;

                let mut builder = BrowserConfigBuilder::default()
                    .request_timeout(self.request_timeout)
                    .window_size(1366, 900)
                    .user_data_dir(profile.clone())
                    .no_sandbox()
                    .arg("--disable-dev-shm-usage")
                    .arg("--disable-gpu")
                    .arg("--disable-blink-features=AutomationControlled")
                    .arg("--no-first-run")
                    .arg("--mute-audio");
                if let Some(exe) = &self.executable {
                    builder = builder.chrome_executable(exe.clone());
                }
                let config = builder.build().map_err(unavailable)?;

                let (b, h) = Browser::launch(config)
                    .await
                    .map_err(|e| unavailable(format!("launch: {e}")))?;
                (b, h, Some(profile))
            }
        };

        let source = source_id.to_string();
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!(target: "browser", source = %source, error = ?e, "browser handler error");
                }
            }
        });

        Ok((browser, handler_task, profile))
    }
}

#[async_trait]
impl SessionLauncher for ChromeLauncher {
    async fn launch(&self, source_id: &str) -> Result<Box<dyn RenderSession>, FetchError> {
        let (browser, handler, profile) = self.start(source_id).await?;
        let mut session = ChromeSession {
            browser,
            page: None,
            handler: Some(handler),
            profile,
        };
        match session.browser.new_page("about:blank").await {
            Ok(page) => {
                session.page = Some(page);
                Ok(Box::new(session))
            }
            Err(e) => {
                session.close().await;
                Err(FetchError::BrowserUnavailable(format!("new page: {e}")))
            }
        }
    }
}

struct ChromeSession {
    browser: Browser,
    page: Option<Page>,
    handler: Option<JoinHandle<()>>,
    profile: Option<PathBuf>,
}

impl ChromeSession {
    fn page(&self) -> Result<&Page, FetchError> {
        self.page
            .as_ref()
            .ok_or_else(|| FetchError::Browser("session has no page".to_string()))
    }

    async fn eval<T: serde::de::DeserializeOwned>(&self, js: String) -> Result<T, FetchError> {
        self.page()?
            .evaluate(js)
            .await
            .map_err(|e| FetchError::Browser(e.to_string()))?
            .into_value::<T>()
            .map_err(|e| FetchError::Browser(e.to_string()))
    }
}

fn js_str(s: &str) -> String {
    serde_json::Value::String(s.to_string()).to_string()
}

#[async_trait]
impl RenderSession for ChromeSession {
    async fn probe(&self) -> Result<(), FetchError> {
        self.page()?
            .url()
            .await
            .map(|_| ())
            .map_err(|e| FetchError::Browser(e.to_string()))
    }

    async fn navigate(&self, url: &str) -> Result<(), FetchError> {
        self.page()?
            .goto(url)
            .await
            .map(|_| ())
            .map_err(|e| FetchError::Browser(format!("navigate {url}: {e}")))
    }

    async fn exists(&self, selector: &str) -> Result<bool, FetchError> {
        self.eval(format!("document.querySelector({}) !== null", js_str(selector)))
            .await
    }

    async fn click_first(&self, selector: &str) -> Result<bool, FetchError> {
        let js = format!(
            r#"(() => {{
                for (const el of document.querySelectorAll({sel})) {{
                    const r = el.getBoundingClientRect();
                    if (r.width === 0 || r.height === 0 || el.disabled) continue;
                    if (el.getAttribute('aria-disabled') === 'true') continue;
                    el.click();
                    return true;
                }}
                return false;
            }})()"#,
            sel = js_str(selector)
        );
        self.eval(js).await
    }

    async fn outer_html(&self, selector: &str) -> Result<Option<String>, FetchError> {
        let js = format!(
            "(() => {{ const el = document.querySelector({}); return el ? el.outerHTML : ''; }})()",
            js_str(selector)
        );
        let html: String = self.eval(js).await?;
        Ok((!html.is_empty()).then_some(html))
    }

    async fn close(&mut self) {
        if let Some(page) = self.page.take() {
            let _ = page.close().await;
        }
        if self.profile.is_some() {
            if let Err(e) = self.browser.close().await {
                debug!(target: "browser", error = %e, "browser close failed");
            }
            let _ = self.browser.wait().await;
        }
        if let Some(handler) = self.handler.take() {
            handler.abort();
        }
        if let Some(dir) = self.profile.take() {
            if let Err(e) = std::fs::remove_dir_all(&dir) {
                debug!(target: "browser", dir = %dir.display(), error = %e, "profile cleanup failed");
            }
        }
    }
}

impl Drop for ChromeSession {
    fn drop(&mut self) {
        if let Some(handler) = self.handler.take() {
            handler.abort();
        }
    }
}
