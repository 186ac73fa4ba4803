//! Chromium-backed rendering session.

#[cfg(feature = "browser")]
use std::collections::HashMap;
#[cfg(feature = "browser")]
use std::sync::Arc;
#[cfg(feature = "browser")]
use std::time::Duration;

use async_trait::async_trait;
#[cfg(feature = "browser")]
use base64::Engine;
#[cfg(feature = "browser")]
use chromiumoxide::cdp::browser_protocol::emulation::SetDeviceMetricsOverrideParams;
#[cfg(feature = "browser")]
use chromiumoxide::cdp::browser_protocol::network::{
    EventLoadingFinished, EventResponseReceived, GetResponseBodyParams, RequestId,
    SetUserAgentOverrideParams,
};
#[cfg(feature = "browser")]
use chromiumoxide::cdp::browser_protocol::page::AddScriptToEvaluateOnNewDocumentParams;
#[cfg(feature = "browser")]
use chromiumoxide::{Browser, BrowserConfig, Page};
#[cfg(feature = "browser")]
use futures::StreamExt;
#[cfg(feature = "browser")]
use tokio::task::JoinHandle;
#[cfg(feature = "browser")]
use tracing::{debug, info, warn};

use super::capture::{CaptureBuffer, CapturedResponse};
#[cfg(feature = "browser")]
use super::capture::{parse_body, CaptureRules, CaptureSender};
#[cfg(feature = "browser")]
use super::{chrome::find_chrome, scripts, stealth::STEALTH_SCRIPTS};
use super::{LazyLoadPage, RenderSession};
use crate::config::HarvestConfig;
#[cfg(feature = "browser")]
use crate::config::{BrowserEngineConfig, BrowserEngineType};
use crate::error::{HarvestError, Result};

/// Rendering session owning one Chromium page.
#[cfg(feature = "browser")]
pub struct ChromiumSession {
    config: BrowserEngineConfig,
    probe_selector: String,
    rules: Arc<CaptureRules>,
    captures: CaptureBuffer,
    browser: Option<Browser>,
    page: Option<Page>,
    /// Whether we launched the browser process (vs. connected to a remote one).
    owns_process: bool,
    handler_task: Option<JoinHandle<()>>,
    listener_task: Option<JoinHandle<()>>,
}

#[cfg(feature = "browser")]
impl ChromiumSession {
    pub fn new(config: &HarvestConfig) -> Self {
        Self {
            config: config.browser.clone(),
            probe_selector: config.extraction.growth_probe_selector.clone(),
            rules: Arc::new(CaptureRules::new(&config.capture)),
            captures: CaptureBuffer::new(config.crawl.capture_capacity),
            browser: None,
            page: None,
            owns_process: false,
            handler_task: None,
            listener_task: None,
        }
    }

    fn page(&self) -> Result<&Page> {
        self.page.as_ref().ok_or(HarvestError::SessionClosed)
    }

    async fn launch_local(&mut self) -> Result<()> {
        let chrome_path = find_chrome(self.config.chrome_path.as_deref())?;
        info!("Launching browser (headless={})", self.config.headless);

        let mut builder = BrowserConfig::builder()
            .chrome_executable(chrome_path)
            .window_size(self.config.viewport.width, self.config.viewport.height);

        // with_head means NOT headless
        if !self.config.headless {
            builder = builder.with_head();
        }

        if let Some(ref proxy) = self.config.proxy {
            builder = builder.arg(format!("--proxy-server={}", proxy));
        }

        builder = builder
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--disable-infobars")
            .arg("--disable-dev-shm-usage")
            .arg("--no-first-run")
            .arg("--no-default-browser-check")
            .arg("--no-sandbox")
            .arg("--disable-setuid-sandbox")
            .arg("--disable-gpu");

        for arg in &self.config.chrome_args {
            builder = builder.arg(arg);
        }

        let browser_config = builder
            .build()
            .map_err(|e| HarvestError::SessionInit(format!("invalid browser config: {}", e)))?;

        let (browser, mut handler) = Browser::launch(browser_config)
            .await
            .map_err(|e| HarvestError::SessionInit(format!("failed to launch browser: {}", e)))?;

        self.handler_task = Some(tokio::spawn(async move {
            while let Some(h) = handler.next().await {
                if h.is_err() {
                    break;
                }
            }
        }));
        self.browser = Some(browser);
        self.owns_process = true;
        Ok(())
    }

    /// Connect to a remote Chrome instance via its `/json/version` endpoint.
    async fn connect_remote(&mut self, url: &str) -> Result<()> {
        info!(
            "Connecting to remote browser at {} (timeout: {}s)",
            url, self.config.timeout
        );

        let http_url = url
            .replace("ws://", "http://")
            .replace("wss://", "https://");
        let version_url = format!("{}/json/version", http_url.trim_end_matches('/'));

        let resp: serde_json::Value = reqwest::Client::new()
            .get(&version_url)
            .send()
            .await
            .map_err(|e| HarvestError::SessionInit(format!("remote browser unreachable: {}", e)))?
            .json()
            .await
            .map_err(|e| HarvestError::SessionInit(format!("bad browser version info: {}", e)))?;

        let ws_url = resp
            .get("webSocketDebuggerUrl")
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                HarvestError::SessionInit("no webSocketDebuggerUrl in response".to_string())
            })?;

        debug!("Connecting to WebSocket: {}", ws_url);

        let handler_config = chromiumoxide::handler::HandlerConfig {
            request_timeout: Duration::from_secs(self.config.timeout),
            ..Default::default()
        };

        let (browser, mut handler) = Browser::connect_with_config(ws_url, handler_config)
            .await
            .map_err(|e| HarvestError::SessionInit(format!("failed to connect: {}", e)))?;

        self.handler_task = Some(tokio::spawn(async move {
            while let Some(h) = handler.next().await {
                if h.is_err() {
                    break;
                }
            }
        }));
        self.browser = Some(browser);
        self.owns_process = false;
        Ok(())
    }

    async fn prepare_page(&mut self) -> Result<()> {
        let browser = self.browser.as_ref().ok_or(HarvestError::SessionClosed)?;
        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| HarvestError::SessionInit(format!("failed to open page: {}", e)))?;
        // Stored before further setup so close() reclaims it if setup fails.
        self.page = Some(page.clone());

        page.execute(SetUserAgentOverrideParams::new(self.config.user_agent.clone()))
            .await
            .map_err(init_err)?;
        page.execute(SetDeviceMetricsOverrideParams::new(
            self.config.viewport.width as i64,
            self.config.viewport.height as i64,
            1.0,
            false,
        ))
        .await
        .map_err(init_err)?;

        if self.config.engine == BrowserEngineType::Stealth {
            for script in STEALTH_SCRIPTS {
                page.execute(AddScriptToEvaluateOnNewDocumentParams::new(script.to_string()))
                    .await
                    .map_err(init_err)?;
            }
        }

        self.listener_task = Some(spawn_response_listener(
            page,
            self.rules.clone(),
            self.captures.sender(),
        )
        .await?);
        Ok(())
    }

    async fn evaluate<T: serde::de::DeserializeOwned>(&self, script: String) -> Result<T> {
        self.page()?
            .evaluate(script)
            .await
            .map_err(browser_err)?
            .into_value::<T>()
            .map_err(|e| HarvestError::Browser(format!("unexpected script result: {}", e)))
    }
}

/// Subscribe to response events and capture matching bodies.
///
/// Bodies are fetched once loading finishes, not when headers arrive, so
/// large responses are complete when read.
#[cfg(feature = "browser")]
async fn spawn_response_listener(
    page: Page,
    rules: Arc<CaptureRules>,
    sender: CaptureSender,
) -> Result<JoinHandle<()>> {
    let mut responses = page
        .event_listener::<EventResponseReceived>()
        .await
        .map_err(init_err)?;
    let mut finished = page
        .event_listener::<EventLoadingFinished>()
        .await
        .map_err(init_err)?;

    Ok(tokio::spawn(async move {
        let mut pending: HashMap<RequestId, (String, i64)> = HashMap::new();
        loop {
            tokio::select! {
                Some(event) = responses.next() => {
                    let url = event.response.url.clone();
                    let status = event.response.status;
                    if rules.matches(&url, status) {
                        pending.insert(event.request_id.clone(), (url, status));
                    }
                }
                Some(event) = finished.next() => {
                    let Some((url, status)) = pending.remove(&event.request_id) else {
                        continue;
                    };
                    let body = match page
                        .execute(GetResponseBodyParams::new(event.request_id.clone()))
                        .await
                    {
                        Ok(resp) => decode_body(&resp.result.body, resp.result.base64_encoded),
                        Err(e) => {
                            debug!("Could not read body for {}: {}", url, e);
                            continue;
                        }
                    };
                    if let Some(body) = body.as_deref().and_then(parse_body) {
                        debug!("Captured API response: {}", url);
                        sender.push(CapturedResponse { url, status, body });
                    }
                }
                else => break,
            }
        }
    }))
}

#[cfg(feature = "browser")]
fn decode_body(body: &str, base64_encoded: bool) -> Option<String> {
    if !base64_encoded {
        return Some(body.to_string());
    }
    base64::engine::general_purpose::STANDARD
        .decode(body)
        .ok()
        .and_then(|bytes| String::from_utf8(bytes).ok())
}

#[cfg(feature = "browser")]
fn init_err(e: chromiumoxide::error::CdpError) -> HarvestError {
    HarvestError::SessionInit(e.to_string())
}

#[cfg(feature = "browser")]
fn browser_err(e: chromiumoxide::error::CdpError) -> HarvestError {
    HarvestError::Browser(e.to_string())
}

#[cfg(feature = "browser")]
#[async_trait]
impl LazyLoadPage for ChromiumSession {
    async fn measure(&mut self) -> Result<u64> {
        let script = if self.probe_selector.trim().is_empty() {
            scripts::PAGE_HEIGHT.to_string()
        } else {
            scripts::count_matching(&self.probe_selector)
        };
        self.evaluate::<u64>(script).await
    }

    async fn grow(&mut self) -> Result<()> {
        self.evaluate::<bool>(scripts::SCROLL_ONE_VIEWPORT.to_string())
            .await
            .map(|_| ())
    }
}

#[cfg(feature = "browser")]
#[async_trait]
impl RenderSession for ChromiumSession {
    async fn open(&mut self) -> Result<()> {
        if self.page.is_some() {
            return Ok(());
        }

        if self.browser.is_none() {
            match self.config.remote_url.clone() {
                Some(remote_url) => self.connect_remote(&remote_url).await?,
                None => self.launch_local().await?,
            }
        }

        self.prepare_page().await
    }

    async fn navigate(&mut self, url: &str) -> Result<()> {
        let page = self.page()?;
        let nav_timeout = self.config.navigation_timeout();
        info!("Navigating to {}", url);

        match tokio::time::timeout(nav_timeout, page.goto(url)).await {
            Err(_) => Err(HarvestError::NavigationTimeout {
                url: url.to_string(),
                seconds: self.config.timeout,
            }),
            Ok(Err(e)) => Err(HarvestError::Navigation {
                url: url.to_string(),
                reason: e.to_string(),
            }),
            Ok(Ok(_)) => Ok(()),
        }
    }

    async fn content(&mut self) -> Result<String> {
        self.page()?.content().await.map_err(browser_err)
    }

    fn drain_captures(&mut self) -> Vec<CapturedResponse> {
        self.captures.drain()
    }

    fn clear_captures(&mut self) {
        let discarded = self.captures.clear();
        if discarded > 0 {
            debug!("Discarded {} captured responses", discarded);
        }
    }

    async fn close(&mut self) {
        if let Some(task) = self.listener_task.take() {
            task.abort();
        }
        if let Some(page) = self.page.take() {
            if let Err(e) = page.close().await {
                debug!("Page close failed: {}", e);
            }
        }
        if let Some(mut browser) = self.browser.take() {
            if self.owns_process {
                if let Err(e) = browser.close().await {
                    warn!("Browser close failed: {}", e);
                }
                if let Err(e) = browser.wait().await {
                    warn!("Browser process wait failed: {}", e);
                }
            }
            info!("Browser session closed");
        }
        if let Some(task) = self.handler_task.take() {
            task.abort();
        }
        self.captures.clear();
    }
}

/// Stub for when browser feature is disabled.
#[cfg(not(feature = "browser"))]
pub struct ChromiumSession {
    captures: CaptureBuffer,
}

#[cfg(not(feature = "browser"))]
impl ChromiumSession {
    pub fn new(config: &HarvestConfig) -> Self {
        Self {
            captures: CaptureBuffer::new(config.crawl.capture_capacity),
        }
    }
}

#[cfg(not(feature = "browser"))]
#[async_trait]
impl LazyLoadPage for ChromiumSession {
    async fn measure(&mut self) -> Result<u64> {
        Err(HarvestError::SessionClosed)
    }

    async fn grow(&mut self) -> Result<()> {
        Err(HarvestError::SessionClosed)
    }
}

#[cfg(not(feature = "browser"))]
#[async_trait]
impl RenderSession for ChromiumSession {
    async fn open(&mut self) -> Result<()> {
        Err(HarvestError::SessionInit(
            "Browser support not compiled. Rebuild with: cargo build --features browser"
                .to_string(),
        ))
    }

    async fn navigate(&mut self, _url: &str) -> Result<()> {
        Err(HarvestError::SessionClosed)
    }

    async fn content(&mut self) -> Result<String> {
        Err(HarvestError::SessionClosed)
    }

    fn drain_captures(&mut self) -> Vec<CapturedResponse> {
        self.captures.drain()
    }

    fn clear_captures(&mut self) {
        self.captures.clear();
    }

    async fn close(&mut self) {}
}
