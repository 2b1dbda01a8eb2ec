//! Page readiness synchronization.
//!
//! [`Synchronizer::stabilize`] takes a unit from "navigate" to "ready for a
//! screenshot": park the pointer, load the page, run the interaction, wait for
//! the readiness conditions, wait for in-flight requests to drain, then hide
//! volatile elements.

use crate::annotate::WaitFor;
use crate::instrument::{hide_script, PENDING_REQUESTS_SCRIPT};
use crate::registry::TestUnit;
use crate::result::PdiffResult;
use crate::session::BrowserSession;
use crate::wait::{poll_until, Probe, Readiness, WaitOptions};
use async_trait::async_trait;
use std::time::Duration;

/// Off-canvas pointer position used before every navigation
pub const POINTER_PARK: (f64, f64) = (-10_000.0, -10_000.0);

/// Description used when the request counter never drains
pub const REQUESTS_PENDING: &str = "asynchronous requests to finish";

/// Default element lookup retry window outside of polls (10 seconds)
pub const DEFAULT_IMPLICIT_WAIT_MS: u64 = 10_000;

/// Default pause between the readiness poll and the request poll
pub const DEFAULT_GRACE_DELAY_MS: u64 = 100;

// =============================================================================
// OPTIONS
// =============================================================================

/// Timing knobs for [`Synchronizer`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncOptions {
    /// Readiness-condition poll timeout in milliseconds
    pub wait_timeout_ms: u64,
    /// Pending-request poll timeout in milliseconds
    pub ajax_timeout_ms: u64,
    /// Interval between polls in milliseconds
    pub poll_interval_ms: u64,
    /// Pause after the readiness poll in milliseconds
    pub grace_delay_ms: u64,
    /// Implicit wait restored after polling, in milliseconds
    pub implicit_wait_ms: u64,
    /// Wait for the injected request counter to drain
    pub track_requests: bool,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            wait_timeout_ms: crate::wait::DEFAULT_WAIT_TIMEOUT_MS,
            ajax_timeout_ms: crate::wait::DEFAULT_WAIT_TIMEOUT_MS,
            poll_interval_ms: crate::wait::DEFAULT_POLL_INTERVAL_MS,
            grace_delay_ms: DEFAULT_GRACE_DELAY_MS,
            implicit_wait_ms: DEFAULT_IMPLICIT_WAIT_MS,
            track_requests: true,
        }
    }
}

impl SyncOptions {
    /// Defaults
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the readiness-condition timeout
    #[must_use]
    pub const fn with_wait_timeout(mut self, ms: u64) -> Self {
        self.wait_timeout_ms = ms;
        self
    }

    /// Set the pending-request timeout
    #[must_use]
    pub const fn with_ajax_timeout(mut self, ms: u64) -> Self {
        self.ajax_timeout_ms = ms;
        self
    }

    /// Set the poll interval
    #[must_use]
    pub const fn with_poll_interval(mut self, ms: u64) -> Self {
        self.poll_interval_ms = ms;
        self
    }

    /// Set the grace delay
    #[must_use]
    pub const fn with_grace_delay(mut self, ms: u64) -> Self {
        self.grace_delay_ms = ms;
        self
    }

    /// Set the implicit wait
    #[must_use]
    pub const fn with_implicit_wait(mut self, ms: u64) -> Self {
        self.implicit_wait_ms = ms;
        self
    }

    /// Enable or skip the pending-request poll.
    ///
    /// Pages loaded without the instrumentation proxy never expose the
    /// counter, so the poll would always time out.
    #[must_use]
    pub const fn with_request_tracking(mut self, track: bool) -> Self {
        self.track_requests = track;
        self
    }

    /// Implicit wait as Duration
    #[must_use]
    pub const fn implicit_wait(&self) -> Duration {
        Duration::from_millis(self.implicit_wait_ms)
    }

    const fn condition_wait(&self) -> WaitOptions {
        WaitOptions {
            timeout_ms: self.wait_timeout_ms,
            poll_interval_ms: self.poll_interval_ms,
        }
    }

    const fn request_wait(&self) -> WaitOptions {
        WaitOptions {
            timeout_ms: self.ajax_timeout_ms,
            poll_interval_ms: self.poll_interval_ms,
        }
    }
}

// =============================================================================
// URL REWRITING
// =============================================================================

/// Maps a unit's target URL to the URL the browser actually loads
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum UrlRewriter {
    /// Load the target directly
    #[default]
    Identity,
    /// Route through the instrumentation proxy on this local port
    Proxy {
        /// Proxy listen port
        port: u16,
    },
}

impl UrlRewriter {
    /// Rewrite `url`.
    ///
    /// The proxy form puts the host in the first path segment:
    /// `http://example.com/about` → `http://localhost:8080/example.com/about`.
    /// HTTPS targets keep their scheme as a leading segment:
    /// `https://example.com/about` → `http://localhost:8080/https/example.com/about`.
    #[must_use]
    pub fn rewrite(&self, url: &str) -> String {
        match self {
            Self::Identity => url.to_string(),
            Self::Proxy { port } => match url.split_once("://") {
                Some((scheme, rest)) if scheme.eq_ignore_ascii_case("https") => {
                    format!("http://localhost:{port}/https/{rest}")
                }
                Some((_, rest)) => format!("http://localhost:{port}/{rest}"),
                None => format!("http://localhost:{port}/{url}"),
            },
        }
    }
}

// =============================================================================
// PROBES
// =============================================================================

/// All readiness conditions, evaluated together against the current DOM
struct ConditionProbe<'c> {
    conditions: &'c [WaitFor],
}

#[async_trait]
impl<'s> Probe<dyn BrowserSession + 's> for ConditionProbe<'_> {
    async fn check(&mut self, session: &mut (dyn BrowserSession + 's)) -> PdiffResult<Readiness> {
        let mut unmet = Vec::new();
        for condition in self.conditions {
            let satisfied = match session.find_element(&condition.selector).await? {
                None => false,
                Some(element) => {
                    condition.text.as_ref().map_or(true, |t| element.text == *t)
                        && condition
                            .classes
                            .as_ref()
                            .map_or(true, |c| element.has_classes(c))
                }
            };
            if !satisfied {
                unmet.push(condition.to_string());
            }
        }
        if unmet.is_empty() {
            Ok(Readiness::Ready)
        } else {
            Ok(Readiness::Pending(unmet.join(", ")))
        }
    }
}

/// The injected pending-request counter reads zero
struct RequestProbe;

#[async_trait]
impl<'s> Probe<dyn BrowserSession + 's> for RequestProbe {
    async fn check(&mut self, session: &mut (dyn BrowserSession + 's)) -> PdiffResult<Readiness> {
        let count = session.execute_script(PENDING_REQUESTS_SCRIPT).await?;
        // null means the tracking script is not on the page (yet)
        if count.as_i64() == Some(0) || count.as_f64() == Some(0.0) {
            Ok(Readiness::Ready)
        } else {
            Ok(Readiness::Pending(REQUESTS_PENDING.to_string()))
        }
    }
}

// =============================================================================
// SYNCHRONIZER
// =============================================================================

/// Brings a page to a stable, capturable state
#[derive(Debug, Clone, Default)]
pub struct Synchronizer {
    options: SyncOptions,
    rewriter: UrlRewriter,
}

impl Synchronizer {
    /// Create with options and the identity rewriter
    #[must_use]
    pub fn new(options: SyncOptions) -> Self {
        Self {
            options,
            rewriter: UrlRewriter::Identity,
        }
    }

    /// Use `rewriter` for navigation URLs
    #[must_use]
    pub const fn with_rewriter(mut self, rewriter: UrlRewriter) -> Self {
        self.rewriter = rewriter;
        self
    }

    /// Options in use
    #[must_use]
    pub const fn options(&self) -> &SyncOptions {
        &self.options
    }

    /// Stabilize `unit` in `session`.
    ///
    /// # Errors
    ///
    /// [`PdiffError::AssertionFailed`](crate::PdiffError::AssertionFailed)
    /// from the interaction and
    /// [`PdiffError::WaitTimeout`](crate::PdiffError::WaitTimeout) from either
    /// poll fail only this unit; any other error means the session is broken.
    pub async fn stabilize(
        &self,
        session: &mut dyn BrowserSession,
        unit: &TestUnit,
    ) -> PdiffResult<()> {
        let (x, y) = POINTER_PARK;
        session.move_pointer(x, y).await?;

        let url = self.rewriter.rewrite(unit.target_url());
        tracing::debug!(unit = unit.qualified_name(), %url, "navigating");
        session.navigate(&url).await?;

        unit.interaction().run(session).await?;

        self.wait_for_conditions(session, unit.readiness_conditions())
            .await?;
        tokio::time::sleep(Duration::from_millis(self.options.grace_delay_ms)).await;
        if self.options.track_requests {
            self.wait_for_requests(session).await?;
        }

        for selector in unit.hidden_selectors() {
            session.execute_script(&hide_script(selector)).await?;
        }
        Ok(())
    }

    /// Poll until every condition holds.
    ///
    /// Element lookups do not retry while polling; the configured implicit
    /// wait is restored afterwards, whatever the outcome.
    ///
    /// # Errors
    ///
    /// [`PdiffError::WaitTimeout`](crate::PdiffError::WaitTimeout) naming the
    /// unmet conditions, or a session error.
    pub async fn wait_for_conditions(
        &self,
        session: &mut dyn BrowserSession,
        conditions: &[WaitFor],
    ) -> PdiffResult<()> {
        if conditions.is_empty() {
            return Ok(());
        }
        session.set_implicit_wait(Duration::ZERO).await?;
        let mut probe = ConditionProbe { conditions };
        let waited = poll_until(&mut *session, &mut probe, &self.options.condition_wait()).await;
        session.set_implicit_wait(self.options.implicit_wait()).await?;
        let result = waited?;
        tracing::debug!(polls = result.polls, elapsed = ?result.elapsed, "conditions met");
        Ok(())
    }

    /// Poll until the page reports no outstanding asynchronous requests.
    ///
    /// # Errors
    ///
    /// [`PdiffError::WaitTimeout`](crate::PdiffError::WaitTimeout) or a
    /// session error.
    pub async fn wait_for_requests(&self, session: &mut dyn BrowserSession) -> PdiffResult<()> {
        poll_until(&mut *session, &mut RequestProbe, &self.options.request_wait()).await?;
        Ok(())
    }
}
