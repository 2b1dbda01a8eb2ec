//! Declarative test metadata.
//!
//! A [`TestMethod`] wraps an [`Interaction`] together with everything the
//! registrar needs to turn it into a test unit: the URL fragment to visit,
//! readiness conditions, inherited conditions to skip, and selectors to hide
//! before the screenshot.
//!
//! ```ignore
//! let about = TestMethod::new("about", NoInteraction)
//!     .url("/about")
//!     .wait_for(WaitFor::new(".loaded").text("Ready"))
//!     .hide(".clock");
//! ```

use crate::result::{PdiffError, PdiffResult};
use crate::session::BrowserSession;
use async_trait::async_trait;
use futures::future::BoxFuture;
use std::fmt;
use std::sync::Arc;

/// A readiness condition: an element matching `selector` must exist, and
/// optionally carry exact text and a set of classes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WaitFor {
    /// CSS selector (required)
    pub selector: String,
    /// Exact text the element must have
    pub text: Option<String>,
    /// Classes the element must carry (subset match)
    pub classes: Option<Vec<String>>,
}

impl WaitFor {
    /// Wait for an element matching `selector`
    #[must_use]
    pub fn new(selector: impl Into<String>) -> Self {
        Self {
            selector: selector.into(),
            text: None,
            classes: None,
        }
    }

    /// Also require the element's text to equal `text`
    #[must_use]
    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    /// Also require the element to carry all of `classes`
    #[must_use]
    pub fn classes<I, S>(mut self, classes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.classes = Some(classes.into_iter().map(Into::into).collect());
        self
    }
}

impl fmt::Display for WaitFor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.selector)?;
        if let Some(text) = self.text.as_deref().filter(|t| !t.is_empty()) {
            write!(f, " (text={text})")?;
        }
        if let Some(classes) = self.classes.as_ref().filter(|c| !c.is_empty()) {
            write!(f, " (classes={})", classes.join(" "))?;
        }
        Ok(())
    }
}

/// User code run against the page after navigation and before waiting.
///
/// Return [`PdiffError::AssertionFailed`] (see [`assert_that`]) for a failed
/// business check; any other error is treated as a broken session.
#[async_trait]
pub trait Interaction: Send + Sync {
    /// Drive the page
    async fn run(&self, session: &mut dyn BrowserSession) -> PdiffResult<()>;
}

/// Interaction that leaves the page alone
#[derive(Debug, Clone, Copy, Default)]
pub struct NoInteraction;

#[async_trait]
impl Interaction for NoInteraction {
    async fn run(&self, _session: &mut dyn BrowserSession) -> PdiffResult<()> {
        Ok(())
    }
}

/// Closure-backed interaction, built with [`interaction`]
pub struct FnInteraction<F> {
    func: F,
}

impl<F> fmt::Debug for FnInteraction<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnInteraction").finish_non_exhaustive()
    }
}

#[async_trait]
impl<F> Interaction for FnInteraction<F>
where
    F: for<'a> Fn(&'a mut dyn BrowserSession) -> BoxFuture<'a, PdiffResult<()>> + Send + Sync,
{
    async fn run(&self, session: &mut dyn BrowserSession) -> PdiffResult<()> {
        (self.func)(session).await
    }
}

/// Adapt an async closure into an [`Interaction`].
///
/// ```ignore
/// interaction(|session| Box::pin(async move {
///     let title = session.execute_script("return document.title;").await?;
///     assert_that(title == "Google", "title should be \"Google\"")
/// }))
/// ```
pub fn interaction<F>(func: F) -> FnInteraction<F>
where
    F: for<'a> Fn(&'a mut dyn BrowserSession) -> BoxFuture<'a, PdiffResult<()>> + Send + Sync,
{
    FnInteraction { func }
}

/// Fail the interaction with an assertion error unless `condition` holds
pub fn assert_that(condition: bool, message: impl Into<String>) -> PdiffResult<()> {
    if condition {
        Ok(())
    } else {
        Err(PdiffError::assertion(message))
    }
}

/// A test method: an interaction plus its declarative metadata
#[derive(Clone)]
pub struct TestMethod {
    pub(crate) name: String,
    pub(crate) interaction: Arc<dyn Interaction>,
    pub(crate) url: String,
    pub(crate) wait_fors: Vec<WaitFor>,
    pub(crate) dont_wait_for: Vec<String>,
    pub(crate) hide: Vec<String>,
    pub(crate) dont_hide: Vec<String>,
    pub(crate) doc: Option<String>,
}

impl fmt::Debug for TestMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestMethod")
            .field("name", &self.name)
            .field("url", &self.url)
            .field("wait_fors", &self.wait_fors)
            .field("dont_wait_for", &self.dont_wait_for)
            .field("hide", &self.hide)
            .field("dont_hide", &self.dont_hide)
            .finish_non_exhaustive()
    }
}

impl TestMethod {
    /// Declare a method named `name` running `interaction`
    #[must_use]
    pub fn new(name: impl Into<String>, interaction: impl Interaction + 'static) -> Self {
        Self::from_shared(name, Arc::new(interaction))
    }

    /// Declare a method around an already shared interaction
    #[must_use]
    pub fn from_shared(name: impl Into<String>, interaction: Arc<dyn Interaction>) -> Self {
        Self {
            name: name.into(),
            interaction,
            url: String::new(),
            wait_fors: Vec::new(),
            dont_wait_for: Vec::new(),
            hide: Vec::new(),
            dont_hide: Vec::new(),
            doc: None,
        }
    }

    /// URL fragment appended to the base URL. A second call replaces the first.
    #[must_use]
    pub fn url(mut self, fragment: impl Into<String>) -> Self {
        self.url = fragment.into();
        self
    }

    /// Add a readiness condition. Conditions accumulate in declaration order.
    #[must_use]
    pub fn wait_for(mut self, condition: WaitFor) -> Self {
        self.wait_fors.push(condition);
        self
    }

    /// Skip an inherited class-level condition on `selector`
    #[must_use]
    pub fn dont_wait_for(mut self, selector: impl Into<String>) -> Self {
        self.dont_wait_for.push(selector.into());
        self
    }

    /// Hide elements matching `selector` before the screenshot
    #[must_use]
    pub fn hide(mut self, selector: impl Into<String>) -> Self {
        self.hide.push(selector.into());
        self
    }

    /// Skip an inherited class-level hide of `selector`
    #[must_use]
    pub fn dont_hide(mut self, selector: impl Into<String>) -> Self {
        self.dont_hide.push(selector.into());
        self
    }

    /// Attach documentation
    #[must_use]
    pub fn doc(mut self, doc: impl Into<String>) -> Self {
        self.doc = Some(doc.into());
        self
    }

    /// Method name as declared
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared URL fragment
    #[must_use]
    pub fn url_fragment(&self) -> &str {
        &self.url
    }

    /// Conditions declared on this method
    #[must_use]
    pub fn declared_waits(&self) -> &[WaitFor] {
        &self.wait_fors
    }
}
