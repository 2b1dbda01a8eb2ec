//! Name filters for selecting test classes and units.
//!
//! A filter is a comma-separated list of regular expressions, matched
//! case-insensitively anywhere in the name. An absent filter matches all.

use crate::result::{PdiffError, PdiffResult};
use regex::{Regex, RegexBuilder};

/// Comma-separated, case-insensitive regex filter
#[derive(Debug, Clone, Default)]
pub struct TestFilter {
    patterns: Vec<Regex>,
}

impl TestFilter {
    /// Filter that accepts every name
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Parse `patterns` (e.g. `"home,search.*box"`). Empty entries are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`PdiffError::InvalidFilter`] for an entry that is not a valid
    /// regular expression.
    pub fn parse(patterns: &str) -> PdiffResult<Self> {
        let patterns = patterns
            .split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(|p| {
                RegexBuilder::new(p)
                    .case_insensitive(true)
                    .build()
                    .map_err(|e| PdiffError::InvalidFilter {
                        pattern: p.to_string(),
                        message: e.to_string(),
                    })
            })
            .collect::<PdiffResult<Vec<_>>>()?;
        Ok(Self { patterns })
    }

    /// Parse an optional pattern list; `None` accepts everything
    ///
    /// # Errors
    ///
    /// See [`TestFilter::parse`].
    pub fn from_option(patterns: Option<&str>) -> PdiffResult<Self> {
        patterns.map_or_else(|| Ok(Self::all()), Self::parse)
    }

    /// Whether `name` matches any pattern
    #[must_use]
    pub fn matches(&self, name: &str) -> bool {
        self.patterns.is_empty() || self.patterns.iter().any(|p| p.is_match(name))
    }

    /// Whether this filter accepts everything
    #[must_use]
    pub fn is_all(&self) -> bool {
        self.patterns.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_absent_matches_all() {
        let filter = TestFilter::from_option(None).unwrap();
        assert!(filter.is_all());
        assert!(filter.matches("anything"));
    }

    #[test]
    fn test_case_insensitive_search() {
        let filter = TestFilter::parse("MENU").unwrap();
        assert!(filter.matches("home_check-menu"));
        assert!(!filter.matches("home_about"));
    }

    #[test]
    fn test_comma_separated_any() {
        let filter = TestFilter::parse("about, ^search_").unwrap();
        assert!(filter.matches("home_about"));
        assert!(filter.matches("search_box"));
        assert!(!filter.matches("home_search"));
    }

    #[test]
    fn test_empty_entries_ignored() {
        let filter = TestFilter::parse(",,").unwrap();
        assert!(filter.is_all());
    }

    #[test]
    fn test_invalid_pattern() {
        let err = TestFilter::parse("ok,(unclosed").unwrap_err();
        assert!(matches!(err, PdiffError::InvalidFilter { pattern, .. } if pattern == "(unclosed"));
    }
}
