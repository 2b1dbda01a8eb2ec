//! Console output and progress reporting

use console::{style, Style, Term};
use pdiff::{Outcome, RunListener, RunReport, TestClassDescriptor, UnitResult};
use std::time::Instant;

/// Progress reporter for test runs.
///
/// Writes to stderr so stdout stays free for `list` output.
#[derive(Debug)]
pub struct ProgressReporter {
    term: Term,
    started: Instant,
    /// Whether to use colors
    pub use_color: bool,
    /// Quiet mode
    pub quiet: bool,
    /// Print per-unit timing and docs
    pub verbose: bool,
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new(true, false)
    }
}

impl ProgressReporter {
    /// Create a new progress reporter
    #[must_use]
    pub fn new(use_color: bool, quiet: bool) -> Self {
        Self {
            term: Term::stderr(),
            started: Instant::now(),
            use_color,
            quiet,
            verbose: false,
        }
    }

    /// Show per-unit timing
    #[must_use]
    pub const fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    fn marker(&self, outcome: &Outcome) -> String {
        let (glyph, plain, style) = match outcome {
            Outcome::Unchanged => ("✓", "PASS", Style::new().green().bold()),
            Outcome::Baselined | Outcome::Updated => ("•", "NEW ", Style::new().cyan().bold()),
            Outcome::Mismatch { .. } | Outcome::Timeout { .. } | Outcome::AssertionFailed { .. } => {
                ("✗", "FAIL", Style::new().red().bold())
            }
        };
        if self.use_color {
            style.apply_to(glyph).to_string()
        } else {
            plain.to_string()
        }
    }

    /// Print a section header
    pub fn header(&self, title: &str) {
        if self.quiet {
            return;
        }
        let styled = if self.use_color {
            style(title).bold().to_string()
        } else {
            title.to_string()
        };
        let _ = self.term.write_line(&styled);
    }

    /// Print an info message
    pub fn info(&self, message: &str) {
        if self.quiet {
            return;
        }
        let _ = self.term.write_line(message);
    }

    /// Print a failure message
    pub fn failure(&self, message: &str) {
        // Failures print even in quiet mode
        let prefix = if self.use_color {
            style("✗").red().bold().to_string()
        } else {
            "FAIL".to_string()
        };
        let _ = self.term.write_line(&format!("{prefix} {message}"));
    }

    /// Print the closing summary
    pub fn summary(&self, report: &RunReport) {
        if self.quiet && report.all_passed() {
            return;
        }
        let elapsed = self.started.elapsed().as_secs_f64();
        let (passed, failed, total) = (report.passed(), report.failed(), report.total());

        let _ = self.term.write_line("");
        for failure in report.failures() {
            self.failure(&format!("{}: {}", failure.name, failure.outcome.describe()));
        }

        let line = if self.use_color {
            let status = if failed > 0 {
                Style::new().red().bold().apply_to("FAILED")
            } else {
                Style::new().green().bold().apply_to("PASSED")
            };
            format!("{status} {total} tests in {elapsed:.2}s ({passed} passed, {failed} failed)")
        } else {
            let status = if failed > 0 { "FAILED" } else { "PASSED" };
            format!("{status} {total} tests in {elapsed:.2}s ({passed} passed, {failed} failed)")
        };
        let _ = self.term.write_line(&line);
    }
}

impl RunListener for ProgressReporter {
    fn class_started(&mut self, class: &TestClassDescriptor) {
        self.header(&format!(" for {}", class.name()));
    }

    fn unit_finished(&mut self, result: &UnitResult) {
        if self.quiet && result.passed() {
            return;
        }
        let mut line = format!("   {} {}", self.marker(&result.outcome), result.name);
        if !result.passed() {
            line.push_str(&format!(": {}", result.outcome.describe()));
        } else if self.verbose {
            line.push_str(&format!(" ({:.2}s)", result.duration.as_secs_f64()));
        }
        let _ = self.term.write_line(&line);
    }

    fn run_finished(&mut self, report: &RunReport) {
        self.summary(report);
    }
}

/// Render the `list` listing: each class with its unit count, then its units.
#[must_use]
pub fn format_listing(classes: &[TestClassDescriptor], verbose: bool) -> String {
    let mut out = String::from("All matched tests:\n");
    for class in classes {
        out.push_str(&format!(" {}: {} tests\n", class.name(), class.units().len()));
        for unit in class.units() {
            match unit.doc() {
                Some(doc) if verbose => {
                    out.push_str(&format!("   {}  {}\n", unit.qualified_name(), doc));
                }
                _ => out.push_str(&format!("   {}\n", unit.qualified_name())),
            }
        }
    }
    out
}
