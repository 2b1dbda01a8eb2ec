//! Chromium over the Chrome `DevTools` Protocol.
//!
//! Element lookups honor the implicit wait by retrying until it expires.
//! Scripts are wrapped in a function so a body with `return` works the same
//! as under WebDriver.

#![allow(clippy::significant_drop_tightening, clippy::missing_errors_doc)]

use super::{BrowserSession, ElementSnapshot};
use crate::result::{PdiffError, PdiffResult};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser as CdpBrowser, BrowserConfig as CdpConfig};
use chromiumoxide::cdp::browser_protocol::emulation::SetDeviceMetricsOverrideParams;
use chromiumoxide::cdp::browser_protocol::input::{
    DispatchMouseEventParams, DispatchMouseEventType,
};
use chromiumoxide::cdp::browser_protocol::page::{
    CaptureScreenshotFormat, CaptureScreenshotParams,
};
use chromiumoxide::error::CdpError;
use chromiumoxide::page::Page as CdpPage;
use futures::StreamExt;
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// Retry interval for element lookups under an implicit wait
const LOOKUP_RETRY: Duration = Duration::from_millis(100);

/// Chrome error messages (lowercased) for a node that is absent or went away
const MISSING_NODE_MESSAGES: &[&str] = &[
    "could not find node",
    "no node with given id",
    "could not find object with given id",
    "cannot find context with specified id",
    "node is detached",
];

fn is_missing_node_message(message: &str) -> bool {
    let message = message.to_ascii_lowercase();
    MISSING_NODE_MESSAGES.iter().any(|m| message.contains(m))
}

/// Whether `err` means "no such element right now" rather than a broken session
fn is_missing_node(err: &CdpError) -> bool {
    match err {
        CdpError::NotFound => true,
        CdpError::Chrome(_) | CdpError::ChromeMessage(_) | CdpError::JavascriptException(_) => {
            is_missing_node_message(&err.to_string())
        }
        _ => false,
    }
}

/// Missing nodes become `None`; anything else is a session failure
fn node_or_none<T>(result: Result<T, CdpError>) -> PdiffResult<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) if is_missing_node(&e) => Ok(None),
        Err(e) => Err(PdiffError::session(e.to_string())),
    }
}

/// Launch configuration
#[derive(Debug, Clone)]
pub struct ChromiumConfig {
    /// Run without a visible window
    pub headless: bool,
    /// Sandbox mode (disable for containers)
    pub sandbox: bool,
    /// Path to chromium binary (None = auto-detect)
    pub chromium_path: Option<String>,
    /// Initial window size
    pub window_size: (u32, u32),
}

impl Default for ChromiumConfig {
    fn default() -> Self {
        Self {
            headless: true,
            sandbox: true,
            chromium_path: None,
            window_size: crate::registry::DEFAULT_WINDOW_SIZE,
        }
    }
}

impl ChromiumConfig {
    /// Set headless mode
    #[must_use]
    pub const fn with_headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    /// Disable sandbox (for containers/CI)
    #[must_use]
    pub const fn with_no_sandbox(mut self) -> Self {
        self.sandbox = false;
        self
    }

    /// Set chromium path
    #[must_use]
    pub fn with_chromium_path(mut self, path: impl Into<String>) -> Self {
        self.chromium_path = Some(path.into());
        self
    }
}

/// A single Chromium tab driven over CDP
#[derive(Debug)]
pub struct ChromiumSession {
    browser: Arc<Mutex<CdpBrowser>>,
    page: CdpPage,
    handle: tokio::task::JoinHandle<()>,
    implicit_wait: Duration,
}

impl ChromiumSession {
    /// Launch Chromium and open a blank tab
    pub async fn launch(config: ChromiumConfig) -> PdiffResult<Self> {
        let (width, height) = config.window_size;
        let mut builder = CdpConfig::builder().window_size(width, height);
        if !config.headless {
            builder = builder.with_head();
        }
        if !config.sandbox {
            builder = builder.no_sandbox();
        }
        if let Some(ref path) = config.chromium_path {
            builder = builder.chrome_executable(path);
        }
        let cdp_config = builder.build().map_err(PdiffError::session)?;

        let (browser, mut handler) = CdpBrowser::launch(cdp_config)
            .await
            .map_err(|e| PdiffError::session(e.to_string()))?;
        let handle = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| PdiffError::session(e.to_string()))?;
        tracing::debug!(headless = config.headless, "chromium launched");

        Ok(Self {
            browser: Arc::new(Mutex::new(browser)),
            page,
            handle,
            implicit_wait: Duration::ZERO,
        })
    }

    /// Close the browser
    pub async fn close(self) -> PdiffResult<()> {
        let mut browser = self.browser.lock().await;
        browser
            .close()
            .await
            .map_err(|e| PdiffError::session(e.to_string()))?;
        self.handle.abort();
        Ok(())
    }

    /// Snapshot `selector`; a node detached between lookup and read counts
    /// as not present yet.
    async fn lookup(&self, selector: &str) -> PdiffResult<Option<ElementSnapshot>> {
        let Some(element) = node_or_none(self.page.find_element(selector).await)? else {
            return Ok(None);
        };
        let Some(text) = node_or_none(element.inner_text().await)? else {
            return Ok(None);
        };
        let Some(class_attr) = node_or_none(element.attribute("class").await)? else {
            return Ok(None);
        };
        Ok(Some(
            ElementSnapshot::new(text.unwrap_or_default())
                .with_class_attr(&class_attr.unwrap_or_default()),
        ))
    }
}

#[async_trait]
impl BrowserSession for ChromiumSession {
    async fn navigate(&mut self, url: &str) -> PdiffResult<()> {
        self.page
            .goto(url)
            .await
            .map_err(|e| PdiffError::Navigation {
                url: url.to_string(),
                message: e.to_string(),
            })?;
        Ok(())
    }

    async fn execute_script(&mut self, script: &str) -> PdiffResult<Value> {
        let wrapped = format!("(function () {{\n{script}\n}})()");
        let result = self
            .page
            .evaluate(wrapped)
            .await
            .map_err(|e| PdiffError::script(e.to_string()))?;
        Ok(result.value().cloned().unwrap_or(Value::Null))
    }

    async fn find_element(&mut self, selector: &str) -> PdiffResult<Option<ElementSnapshot>> {
        let deadline = Instant::now() + self.implicit_wait;
        loop {
            if let Some(found) = self.lookup(selector).await? {
                return Ok(Some(found));
            }
            if Instant::now() >= deadline {
                return Ok(None);
            }
            tokio::time::sleep(LOOKUP_RETRY).await;
        }
    }

    async fn save_screenshot(&mut self, path: &Path) -> PdiffResult<()> {
        let params = CaptureScreenshotParams::builder()
            .format(CaptureScreenshotFormat::Png)
            .build();
        let screenshot = self
            .page
            .execute(params)
            .await
            .map_err(|e| PdiffError::Screenshot {
                message: e.to_string(),
            })?;

        use base64::Engine;
        let png = base64::engine::general_purpose::STANDARD
            .decode(&screenshot.data)
            .map_err(|e| PdiffError::Screenshot {
                message: e.to_string(),
            })?;
        std::fs::write(path, png)?;
        Ok(())
    }

    async fn set_window_size(&mut self, width: u32, height: u32) -> PdiffResult<()> {
        let params =
            SetDeviceMetricsOverrideParams::new(i64::from(width), i64::from(height), 1.0, false);
        self.page
            .execute(params)
            .await
            .map_err(|e| PdiffError::session(e.to_string()))?;
        Ok(())
    }

    async fn set_implicit_wait(&mut self, wait: Duration) -> PdiffResult<()> {
        self.implicit_wait = wait;
        Ok(())
    }

    async fn move_pointer(&mut self, x: f64, y: f64) -> PdiffResult<()> {
        let params = DispatchMouseEventParams::new(DispatchMouseEventType::MouseMoved, x, y);
        self.page
            .execute(params)
            .await
            .map_err(|e| PdiffError::session(e.to_string()))?;
        Ok(())
    }
}
