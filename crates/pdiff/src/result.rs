//! Result and error types for pdiff.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for pdiff operations
pub type PdiffResult<T> = Result<T, PdiffError>;

/// Errors that can occur in pdiff
///
/// Only [`PdiffError::WaitTimeout`] and [`PdiffError::AssertionFailed`] are
/// per-unit failures (see [`PdiffError::is_unit_failure`]). Everything else
/// means the session or the run setup is broken and aborts the run.
#[derive(Debug, Error)]
pub enum PdiffError {
    /// A readiness or network-quiescence poll ran out of time
    #[error("Timed out after {ms}ms waiting for: {waited_for}")]
    WaitTimeout {
        /// Description of the unmet condition(s)
        waited_for: String,
        /// Timeout in milliseconds
        ms: u64,
    },

    /// Interaction code reported a failed business-logic check
    #[error("Assertion failed: {message}")]
    AssertionFailed {
        /// Error message
        message: String,
    },

    /// Two test methods resolved to the same qualified name
    #[error("Duplicate test name: {name}")]
    DuplicateTest {
        /// Qualified test name
        name: String,
    },

    /// Browser session failure (crash, lost connection, launch failure)
    #[error("Browser session error: {message}")]
    Session {
        /// Error message
        message: String,
    },

    /// Navigation error
    #[error("Navigation to {url} failed: {message}")]
    Navigation {
        /// URL that failed
        url: String,
        /// Error message
        message: String,
    },

    /// In-page script evaluation error
    #[error("Script evaluation failed: {message}")]
    Script {
        /// Error message
        message: String,
    },

    /// Screenshot error
    #[error("Screenshot failed: {message}")]
    Screenshot {
        /// Error message
        message: String,
    },

    /// Image decoding error
    #[error("Image processing failed for {path}: {message}")]
    Image {
        /// Image file
        path: PathBuf,
        /// Error message
        message: String,
    },

    /// Malformed suite file
    #[error("Invalid suite {path}: {message}")]
    Suite {
        /// Suite file
        path: PathBuf,
        /// Error message
        message: String,
    },

    /// Name filter that is not a valid regular expression
    #[error("Invalid filter pattern {pattern:?}: {message}")]
    InvalidFilter {
        /// Offending pattern
        pattern: String,
        /// Error message
        message: String,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),
}

impl PdiffError {
    /// Create a session error
    #[must_use]
    pub fn session(message: impl Into<String>) -> Self {
        Self::Session {
            message: message.into(),
        }
    }

    /// Create a script error
    #[must_use]
    pub fn script(message: impl Into<String>) -> Self {
        Self::Script {
            message: message.into(),
        }
    }

    /// Create an assertion failure
    #[must_use]
    pub fn assertion(message: impl Into<String>) -> Self {
        Self::AssertionFailed {
            message: message.into(),
        }
    }

    /// Whether this error fails only the current test unit.
    #[must_use]
    pub const fn is_unit_failure(&self) -> bool {
        matches!(self, Self::WaitTimeout { .. } | Self::AssertionFailed { .. })
    }
}
