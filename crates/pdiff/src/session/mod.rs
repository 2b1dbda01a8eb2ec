//! Browser session abstraction.
//!
//! Everything pdiff needs from a browser goes through [`BrowserSession`], so
//! the synchronizer and comparator never know which engine is underneath.
//!
//! - [`ChromiumSession`](chromium::ChromiumSession) drives Chromium over CDP
//!   (feature `browser`).
//! - [`MockSession`] is a scriptable in-memory page for unit tests.

#[cfg(feature = "browser")]
pub mod chromium;

use crate::instrument::PENDING_REQUESTS_SCRIPT;
use crate::result::{PdiffError, PdiffResult};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use std::time::{Duration, Instant};

/// Snapshot of a DOM element at lookup time
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ElementSnapshot {
    /// Rendered text of the element
    pub text: String,
    /// Entries of the element's `class` attribute
    pub classes: Vec<String>,
}

impl ElementSnapshot {
    /// Create a snapshot with text and no classes
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            classes: Vec::new(),
        }
    }

    /// Build from the raw `class` attribute value
    #[must_use]
    pub fn with_class_attr(mut self, class_attr: &str) -> Self {
        self.classes = class_attr.split_whitespace().map(String::from).collect();
        self
    }

    /// Whether every class in `required` is present on the element
    #[must_use]
    pub fn has_classes(&self, required: &[String]) -> bool {
        required.iter().all(|c| self.classes.contains(c))
    }
}

/// Capabilities pdiff consumes from a live browser session.
///
/// `execute_script` takes a function *body*: use `return` to produce a value,
/// the same as WebDriver's `execute_script`.
#[async_trait]
pub trait BrowserSession: Send + Sync {
    /// Navigate to URL and wait for the document to load
    async fn navigate(&mut self, url: &str) -> PdiffResult<()>;

    /// Run a script in the page and return its JSON result
    async fn execute_script(&mut self, script: &str) -> PdiffResult<Value>;

    /// Find the first element matching a CSS selector.
    ///
    /// Honors the implicit wait; returns `Ok(None)` when nothing matched in time.
    async fn find_element(&mut self, selector: &str) -> PdiffResult<Option<ElementSnapshot>>;

    /// Capture the viewport as PNG to `path`
    async fn save_screenshot(&mut self, path: &Path) -> PdiffResult<()>;

    /// Resize the browser window
    async fn set_window_size(&mut self, width: u32, height: u32) -> PdiffResult<()>;

    /// How long `find_element` keeps retrying before giving up
    async fn set_implicit_wait(&mut self, wait: Duration) -> PdiffResult<()>;

    /// Move the pointer to page coordinates (negative values are off-canvas)
    async fn move_pointer(&mut self, x: f64, y: f64) -> PdiffResult<()>;
}

#[derive(Debug, Clone)]
struct MockElement {
    snapshot: ElementSnapshot,
    visible_from: Option<Instant>,
}

/// Mock session for unit testing
///
/// Elements are keyed by the exact selector string. Scripts are matched
/// verbatim against registered results; the pending-request probe is served
/// from a programmable sequence.
#[derive(Debug)]
pub struct MockSession {
    /// Current URL
    pub current_url: String,
    /// Window size last requested
    pub window_size: Option<(u32, u32)>,
    /// Implicit wait last requested
    pub implicit_wait: Duration,
    /// Call history for verification
    pub call_history: Vec<String>,
    elements: HashMap<String, MockElement>,
    script_results: HashMap<String, Value>,
    pending_requests: Vec<Value>,
    pending_cursor: usize,
    screenshot: Vec<u8>,
    fail_navigation: Option<String>,
}

impl Default for MockSession {
    fn default() -> Self {
        Self {
            current_url: String::new(),
            window_size: None,
            implicit_wait: Duration::ZERO,
            call_history: Vec::new(),
            elements: HashMap::new(),
            script_results: HashMap::new(),
            pending_requests: vec![Value::from(0)],
            pending_cursor: 0,
            screenshot: Vec::new(),
            fail_navigation: None,
        }
    }
}

impl MockSession {
    /// Create new mock session with an instrumented, idle page
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an element that is present immediately
    pub fn add_element(&mut self, selector: impl Into<String>, element: ElementSnapshot) {
        self.elements.insert(
            selector.into(),
            MockElement {
                snapshot: element,
                visible_from: None,
            },
        );
    }

    /// Add an element that only appears after `delay`
    pub fn add_element_after(
        &mut self,
        selector: impl Into<String>,
        element: ElementSnapshot,
        delay: Duration,
    ) {
        self.elements.insert(
            selector.into(),
            MockElement {
                snapshot: element,
                visible_from: Some(Instant::now() + delay),
            },
        );
    }

    /// Register the result for an exact script body
    pub fn set_script_result(&mut self, script: impl Into<String>, result: Value) {
        self.script_results.insert(script.into(), result);
    }

    /// Program the values returned by successive pending-request probes.
    ///
    /// The last value repeats once the sequence is exhausted.
    pub fn set_pending_requests(&mut self, values: Vec<Value>) {
        self.pending_requests = values;
        self.pending_cursor = 0;
    }

    /// Set the PNG bytes written by `save_screenshot`
    pub fn set_screenshot(&mut self, png: Vec<u8>) {
        self.screenshot = png;
    }

    /// Make navigation to `url` fail with a session error
    pub fn fail_navigation_to(&mut self, url: impl Into<String>) {
        self.fail_navigation = Some(url.into());
    }

    /// Get call history
    #[must_use]
    pub fn history(&self) -> &[String] {
        &self.call_history
    }

    /// Check if method was called
    #[must_use]
    pub fn was_called(&self, method: &str) -> bool {
        self.call_history.iter().any(|c| c.starts_with(method))
    }

    /// Scripts executed so far, in order
    pub fn scripts(&self) -> impl Iterator<Item = &str> {
        self.call_history
            .iter()
            .filter_map(|c| c.strip_prefix("execute_script:"))
    }

    fn next_pending_count(&mut self) -> Value {
        let value = self
            .pending_requests
            .get(self.pending_cursor)
            .or_else(|| self.pending_requests.last())
            .cloned()
            .unwrap_or(Value::Null);
        self.pending_cursor += 1;
        value
    }
}

#[async_trait]
impl BrowserSession for MockSession {
    async fn navigate(&mut self, url: &str) -> PdiffResult<()> {
        self.call_history.push(format!("navigate:{url}"));
        if self.fail_navigation.as_deref() == Some(url) {
            return Err(PdiffError::Navigation {
                url: url.to_string(),
                message: "browser went away".to_string(),
            });
        }
        self.current_url = url.to_string();
        Ok(())
    }

    async fn execute_script(&mut self, script: &str) -> PdiffResult<Value> {
        self.call_history.push(format!("execute_script:{script}"));
        if script == PENDING_REQUESTS_SCRIPT {
            return Ok(self.next_pending_count());
        }
        Ok(self
            .script_results
            .get(script)
            .cloned()
            .unwrap_or(Value::Null))
    }

    async fn find_element(&mut self, selector: &str) -> PdiffResult<Option<ElementSnapshot>> {
        self.call_history.push(format!("find_element:{selector}"));
        let found = self.elements.get(selector).and_then(|e| match e.visible_from {
            Some(at) if Instant::now() < at => None,
            _ => Some(e.snapshot.clone()),
        });
        Ok(found)
    }

    async fn save_screenshot(&mut self, path: &Path) -> PdiffResult<()> {
        self.call_history
            .push(format!("save_screenshot:{}", path.display()));
        if self.screenshot.is_empty() {
            return Err(PdiffError::Screenshot {
                message: "No mock screenshot set".to_string(),
            });
        }
        std::fs::write(path, &self.screenshot)?;
        Ok(())
    }

    async fn set_window_size(&mut self, width: u32, height: u32) -> PdiffResult<()> {
        self.call_history
            .push(format!("set_window_size:{width}x{height}"));
        self.window_size = Some((width, height));
        Ok(())
    }

    async fn set_implicit_wait(&mut self, wait: Duration) -> PdiffResult<()> {
        self.call_history
            .push(format!("set_implicit_wait:{}", wait.as_millis()));
        self.implicit_wait = wait;
        Ok(())
    }

    async fn move_pointer(&mut self, x: f64, y: f64) -> PdiffResult<()> {
        self.call_history.push(format!("move_pointer:{x},{y}"));
        Ok(())
    }
}
