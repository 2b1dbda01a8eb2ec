//! Test run orchestration.
//!
//! [`Runner::run`] walks registered classes in order. Each class gets its
//! window size and implicit wait, then each unit is stabilized and either
//! compared against its baseline ([`RunMode::Verify`]) or rebaselined
//! ([`RunMode::Update`]). Per-unit failures are collected; session failures
//! abort the run.

use crate::compare::{Comparison, ImageStore, Rebaseline};
use crate::registry::{ensure_unique, TestClassDescriptor, TestUnit};
use crate::result::{PdiffError, PdiffResult};
use crate::session::BrowserSession;
use crate::sync::{SyncOptions, Synchronizer, UrlRewriter};
use std::path::PathBuf;
use std::time::{Duration, Instant};

// =============================================================================
// OPTIONS
// =============================================================================

/// What a run does with each capture
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RunMode {
    /// Compare against baselines
    #[default]
    Verify,
    /// Replace baselines
    Update,
}

/// Run configuration
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Verify or update
    pub mode: RunMode,
    /// Baseline directory
    pub image_dir: PathBuf,
    /// Synchronizer timing
    pub sync: SyncOptions,
    /// Navigation URL rewriting
    pub rewriter: UrlRewriter,
    /// Extra pause after stabilization, before capture
    pub delay: Duration,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            mode: RunMode::Verify,
            image_dir: PathBuf::from("."),
            sync: SyncOptions::default(),
            rewriter: UrlRewriter::Identity,
            delay: Duration::ZERO,
        }
    }
}

impl RunOptions {
    /// Defaults: verify into the current directory
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the mode
    #[must_use]
    pub const fn with_mode(mut self, mode: RunMode) -> Self {
        self.mode = mode;
        self
    }

    /// Set the baseline directory
    #[must_use]
    pub fn with_image_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.image_dir = dir.into();
        self
    }

    /// Set synchronizer timing
    #[must_use]
    pub const fn with_sync(mut self, sync: SyncOptions) -> Self {
        self.sync = sync;
        self
    }

    /// Set the URL rewriter
    #[must_use]
    pub const fn with_rewriter(mut self, rewriter: UrlRewriter) -> Self {
        self.rewriter = rewriter;
        self
    }

    /// Set the inter-test delay
    #[must_use]
    pub const fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

// =============================================================================
// RESULTS
// =============================================================================

/// What happened to one unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Capture matched the baseline (or rewrote it with the same pixels)
    Unchanged,
    /// No baseline existed; one was created
    Baselined,
    /// Baseline replaced with a different capture
    Updated,
    /// Capture differs from the baseline
    Mismatch {
        /// Where the differing capture was kept
        new_path: PathBuf,
    },
    /// A readiness or request poll timed out
    Timeout {
        /// Timeout description
        message: String,
    },
    /// The interaction's assertion failed
    AssertionFailed {
        /// Assertion message
        message: String,
    },
}

impl Outcome {
    /// Whether the unit passed
    #[must_use]
    pub const fn passed(&self) -> bool {
        matches!(self, Self::Unchanged | Self::Baselined | Self::Updated)
    }

    /// Short human-readable description
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::Unchanged => "unchanged".to_string(),
            Self::Baselined => "baseline created".to_string(),
            Self::Updated => "baseline updated".to_string(),
            Self::Mismatch { new_path } => {
                format!("screenshot changed, see {}", new_path.display())
            }
            Self::Timeout { message } | Self::AssertionFailed { message } => message.clone(),
        }
    }

    fn from_unit_failure(err: PdiffError) -> PdiffResult<Self> {
        match err {
            PdiffError::WaitTimeout { .. } => Ok(Self::Timeout {
                message: err.to_string(),
            }),
            PdiffError::AssertionFailed { message } => Ok(Self::AssertionFailed { message }),
            other => Err(other),
        }
    }
}

impl From<Comparison> for Outcome {
    fn from(comparison: Comparison) -> Self {
        match comparison {
            Comparison::FirstRun => Self::Baselined,
            Comparison::Unchanged => Self::Unchanged,
            Comparison::Changed { new_path } => Self::Mismatch { new_path },
        }
    }
}

impl From<Rebaseline> for Outcome {
    fn from(rebaseline: Rebaseline) -> Self {
        match rebaseline {
            Rebaseline::Created => Self::Baselined,
            Rebaseline::Unchanged => Self::Unchanged,
            Rebaseline::Updated => Self::Updated,
        }
    }
}

/// Result of one unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitResult {
    /// Qualified name
    pub name: String,
    /// Outcome
    pub outcome: Outcome,
    /// Time spent on the unit
    pub duration: Duration,
}

impl UnitResult {
    /// Whether the unit passed
    #[must_use]
    pub const fn passed(&self) -> bool {
        self.outcome.passed()
    }
}

/// Results for one class
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassReport {
    /// Class name
    pub name: String,
    /// Unit results in execution order
    pub results: Vec<UnitResult>,
}

impl ClassReport {
    /// Whether every unit passed
    #[must_use]
    pub fn all_passed(&self) -> bool {
        self.results.iter().all(UnitResult::passed)
    }
}

/// Results for a whole run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    /// Per-class results in execution order
    pub classes: Vec<ClassReport>,
}

impl RunReport {
    /// Check if all units passed
    #[must_use]
    pub fn all_passed(&self) -> bool {
        self.classes.iter().all(ClassReport::all_passed)
    }

    /// Count passed units
    #[must_use]
    pub fn passed(&self) -> usize {
        self.results().filter(|r| r.passed()).count()
    }

    /// Count failed units
    #[must_use]
    pub fn failed(&self) -> usize {
        self.results().filter(|r| !r.passed()).count()
    }

    /// Total units run
    #[must_use]
    pub fn total(&self) -> usize {
        self.results().count()
    }

    /// Failed units
    #[must_use]
    pub fn failures(&self) -> Vec<&UnitResult> {
        self.results().filter(|r| !r.passed()).collect()
    }

    fn results(&self) -> impl Iterator<Item = &UnitResult> {
        self.classes.iter().flat_map(|c| c.results.iter())
    }
}

// =============================================================================
// LISTENERS
// =============================================================================

/// Observer for run progress
pub trait RunListener: Send {
    /// A class is about to run
    fn class_started(&mut self, _class: &TestClassDescriptor) {}

    /// A unit finished
    fn unit_finished(&mut self, _result: &UnitResult) {}

    /// The run finished
    fn run_finished(&mut self, _report: &RunReport) {}
}

/// Listener that logs through `tracing`
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingListener;

impl RunListener for TracingListener {
    fn class_started(&mut self, class: &TestClassDescriptor) {
        tracing::info!(class = class.name(), units = class.units().len(), "running class");
    }

    fn unit_finished(&mut self, result: &UnitResult) {
        if result.passed() {
            tracing::info!(test = %result.name, outcome = %result.outcome.describe(), "passed");
        } else {
            tracing::warn!(test = %result.name, outcome = %result.outcome.describe(), "failed");
        }
    }

    fn run_finished(&mut self, report: &RunReport) {
        tracing::info!(
            passed = report.passed(),
            failed = report.failed(),
            total = report.total(),
            "run finished"
        );
    }
}

// =============================================================================
// RUNNER
// =============================================================================

/// Drives registered classes through a browser session
pub struct Runner {
    options: RunOptions,
    synchronizer: Synchronizer,
    store: ImageStore,
    listener: Box<dyn RunListener>,
}

impl std::fmt::Debug for Runner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runner")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl Runner {
    /// Create a runner that reports through [`TracingListener`]
    #[must_use]
    pub fn new(options: RunOptions) -> Self {
        let synchronizer = Synchronizer::new(options.sync).with_rewriter(options.rewriter);
        let store = ImageStore::new(options.image_dir.clone());
        Self {
            options,
            synchronizer,
            store,
            listener: Box::new(TracingListener),
        }
    }

    /// Report progress to `listener` instead
    #[must_use]
    pub fn with_listener(mut self, listener: impl RunListener + 'static) -> Self {
        self.listener = Box::new(listener);
        self
    }

    /// Options in use
    #[must_use]
    pub const fn options(&self) -> &RunOptions {
        &self.options
    }

    /// Run every unit of every class, in order.
    ///
    /// Classes with no units left (after filtering) are skipped.
    ///
    /// # Errors
    ///
    /// [`PdiffError::DuplicateTest`] before anything runs when two units share
    /// a qualified name. Otherwise the first error that is not a per-unit
    /// failure; the run stops there.
    pub async fn run(
        &mut self,
        session: &mut dyn BrowserSession,
        classes: &[TestClassDescriptor],
    ) -> PdiffResult<RunReport> {
        ensure_unique(classes)?;
        let mut report = RunReport::default();
        for class in classes.iter().filter(|c| !c.is_empty()) {
            self.listener.class_started(class);
            let (width, height) = class.window_size();
            session.set_window_size(width, height).await?;
            session
                .set_implicit_wait(self.options.sync.implicit_wait())
                .await?;

            let mut class_report = ClassReport {
                name: class.name().to_string(),
                results: Vec::with_capacity(class.units().len()),
            };
            for unit in class.units() {
                let result = self.run_unit(session, unit).await?;
                self.listener.unit_finished(&result);
                class_report.results.push(result);
            }
            report.classes.push(class_report);
        }
        self.listener.run_finished(&report);
        Ok(report)
    }

    async fn run_unit(
        &self,
        session: &mut dyn BrowserSession,
        unit: &TestUnit,
    ) -> PdiffResult<UnitResult> {
        let start = Instant::now();
        let name = unit.qualified_name();
        let stabilized = self.synchronizer.stabilize(session, unit).await;
        if !self.options.delay.is_zero() {
            tokio::time::sleep(self.options.delay).await;
        }

        let outcome = match stabilized {
            Err(err) => Outcome::from_unit_failure(err)?,
            Ok(()) => match self.options.mode {
                RunMode::Verify => self.store.compare(session, name).await?.into(),
                RunMode::Update => self.store.rebaseline(session, name).await?.into(),
            },
        };
        Ok(UnitResult {
            name: name.to_string(),
            outcome,
            duration: start.elapsed(),
        })
    }
}
