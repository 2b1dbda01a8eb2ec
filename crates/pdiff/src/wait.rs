//! Bounded polling.
//!
//! [`poll_until`] re-runs a [`Probe`] against some target until it reports
//! [`Readiness::Ready`] or the timeout elapses. The timeout error carries the
//! description of whatever was still pending on the last poll.

use crate::result::{PdiffError, PdiffResult};
use async_trait::async_trait;
use std::time::{Duration, Instant};

// =============================================================================
// CONSTANTS
// =============================================================================

/// Default timeout for wait operations (10 seconds)
pub const DEFAULT_WAIT_TIMEOUT_MS: u64 = 10_000;

/// Default polling interval (100ms)
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 100;

// =============================================================================
// WAIT OPTIONS
// =============================================================================

/// Options for wait operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitOptions {
    /// Timeout in milliseconds
    pub timeout_ms: u64,
    /// Polling interval in milliseconds
    pub poll_interval_ms: u64,
}

impl Default for WaitOptions {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_WAIT_TIMEOUT_MS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
        }
    }
}

impl WaitOptions {
    /// Create new wait options with defaults
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set timeout in milliseconds
    #[must_use]
    pub const fn with_timeout(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// Set polling interval in milliseconds
    #[must_use]
    pub const fn with_poll_interval(mut self, poll_interval_ms: u64) -> Self {
        self.poll_interval_ms = poll_interval_ms;
        self
    }

    /// Get timeout as Duration
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Get poll interval as Duration
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

// =============================================================================
// PROBES
// =============================================================================

/// Outcome of a single poll
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Readiness {
    /// The condition holds
    Ready,
    /// Not yet; carries a description of what is still missing
    Pending(String),
}

/// Something that can be checked repeatedly against a target
#[async_trait]
pub trait Probe<T: ?Sized + Send>: Send {
    /// Check once
    async fn check(&mut self, target: &mut T) -> PdiffResult<Readiness>;
}

/// Result of a successful wait
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitResult {
    /// Time spent waiting
    pub elapsed: Duration,
    /// Number of polls performed
    pub polls: u32,
}

// =============================================================================
// POLL LOOP
// =============================================================================

/// Poll `probe` against `target` until ready or timed out.
///
/// The probe always runs at least once, so a zero timeout still succeeds on
/// an already-satisfied condition.
///
/// # Errors
///
/// Returns [`PdiffError::WaitTimeout`] naming the last pending description,
/// or whatever error the probe itself returned.
pub async fn poll_until<T, P>(
    target: &mut T,
    probe: &mut P,
    options: &WaitOptions,
) -> PdiffResult<WaitResult>
where
    T: ?Sized + Send,
    P: Probe<T> + ?Sized,
{
    let start = Instant::now();
    let timeout = options.timeout();
    let mut polls = 0;

    loop {
        polls += 1;
        let pending = match probe.check(target).await? {
            Readiness::Ready => {
                return Ok(WaitResult {
                    elapsed: start.elapsed(),
                    polls,
                });
            }
            Readiness::Pending(what) => what,
        };
        tracing::debug!(poll = polls, pending = %pending, "not ready");

        if start.elapsed() >= timeout {
            return Err(PdiffError::WaitTimeout {
                waited_for: pending,
                ms: options.timeout_ms,
            });
        }
        tokio::time::sleep(options.poll_interval()).await;
    }
}

// =============================================================================
// TESTS
// =============================================================================
