//! Message pattern matching.
//!
//! The configured pattern is compiled once at startup and applied
//! read-only to every group text message after that.

use regex::Regex;

use crate::config::ConfigError;

/// Result of matching one message against the configured pattern.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MatchResult {
    pub matched: bool,
    /// Full span of the first match (group 0) when matched.
    pub matched_text: Option<String>,
}

/// Compiled match pattern.
#[derive(Debug, Clone)]
pub struct PatternMatcher {
    pattern: Regex,
}

impl PatternMatcher {
    /// Compile the configured pattern.
    ///
    /// Inline flags such as `(?m)` and `(?s)` are honored, so patterns
    /// can anchor per line and span line breaks.
    pub fn compile(pattern: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            pattern: Regex::new(pattern)?,
        })
    }

    /// Apply the pattern to a message. Only the first match position is
    /// reported.
    pub fn find(&self, text: &str) -> MatchResult {
        match self.pattern.find(text) {
            Some(found) => MatchResult {
                matched: true,
                matched_text: Some(found.as_str().to_string()),
            },
            None => MatchResult::default(),
        }
    }

    /// The pattern source, for logging.
    pub fn as_str(&self) -> &str {
        self.pattern.as_str()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DATE_BLOCK_PATTERN: &str =
        r"(?ms)^Features update summary:\s*\d{4}-\d{2}-\d{2}\s+.*?^missed\s+0\s*$";

    #[test]
    fn date_block_matches_across_lines() {
        let matcher = PatternMatcher::compile(DATE_BLOCK_PATTERN).unwrap();
        let text = "Features update summary: 2024-01-01\nsome lines\nmissed   0\n";

        let result = matcher.find(text);
        assert!(result.matched);
        assert!(result.matched_text.unwrap().starts_with("Features update summary:"));
    }

    #[test]
    fn date_block_rejects_nonzero_missed() {
        let matcher = PatternMatcher::compile(DATE_BLOCK_PATTERN).unwrap();
        let text = "Features update summary: 2024-01-01\nsome lines\nmissed 1\n";

        assert!(!matcher.find(text).matched);
    }

    #[test]
    fn reports_first_match_only() {
        let matcher = PatternMatcher::compile(r"ab+").unwrap();

        let result = matcher.find("xx abb yy abbbb");
        assert_eq!(result.matched_text.as_deref(), Some("abb"));
    }

    #[test]
    fn no_match_yields_empty_result() {
        let matcher = PatternMatcher::compile(r"^/run\s+.+").unwrap();

        let result = matcher.find("hello world");
        assert!(!result.matched);
        assert!(result.matched_text.is_none());
    }

    #[test]
    fn invalid_pattern_is_a_config_error() {
        let err = PatternMatcher::compile(r"(unclosed").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidPattern(_)));
    }
}
