//! Term matchers evaluated against a corpus's suggestion index
//!
//! The engine treats a query as opaque: it asks for the target field, an
//! optional literal prefix used to narrow the sorted term range, and a
//! per-term match decision.

use crate::error::{SuggesterError, SuggesterResult};
use regex::Regex;
use std::fmt;

/// Matcher over the terms of one field
pub trait SuggesterQuery: Send + Sync + fmt::Debug {
    /// Field whose terms are matched
    fn field(&self) -> &str;

    /// Literal prefix every matching term starts with; empty scans the whole field
    fn literal_prefix(&self) -> &str;

    /// Whether `term` is a completion for this query
    fn matches(&self, term: &str) -> bool;

    /// Reject malformed input before any corpus is touched
    fn validate(&self) -> SuggesterResult<()>;
}

/// Terms starting with a non-empty prefix
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrefixQuery {
    field: String,
    prefix: String,
}

impl PrefixQuery {
    pub fn new(field: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }
}

impl SuggesterQuery for PrefixQuery {
    fn field(&self) -> &str {
        &self.field
    }

    fn literal_prefix(&self) -> &str {
        &self.prefix
    }

    fn matches(&self, term: &str) -> bool {
        term.starts_with(&self.prefix)
    }

    fn validate(&self) -> SuggesterResult<()> {
        if self.field.is_empty() {
            return Err(SuggesterError::InvalidQuery("field must not be empty".to_string()));
        }
        if self.prefix.is_empty() {
            return Err(SuggesterError::InvalidQuery(
                "prefix must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Terms fully matching a regular expression
#[derive(Debug, Clone)]
pub struct RegexQuery {
    field: String,
    pattern: Regex,
}

impl RegexQuery {
    pub fn new(field: impl Into<String>, pattern: &str) -> SuggesterResult<Self> {
        let pattern = Regex::new(&format!("^(?:{})$", pattern))
            .map_err(|e| SuggesterError::InvalidQuery(format!("Invalid pattern: {}", e)))?;

        Ok(Self {
            field: field.into(),
            pattern,
        })
    }
}

impl SuggesterQuery for RegexQuery {
    fn field(&self) -> &str {
        &self.field
    }

    fn literal_prefix(&self) -> &str {
        ""
    }

    fn matches(&self, term: &str) -> bool {
        self.pattern.is_match(term)
    }

    fn validate(&self) -> SuggesterResult<()> {
        if self.field.is_empty() {
            return Err(SuggesterError::InvalidQuery("field must not be empty".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_query_matches() {
        let query = PrefixQuery::new("body", "te");
        assert!(query.matches("term"));
        assert!(query.matches("te"));
        assert!(!query.matches("attempt"));
        assert_eq!(query.literal_prefix(), "te");
    }

    #[test]
    fn test_empty_prefix_is_invalid() {
        let query = PrefixQuery::new("body", "");
        assert!(matches!(
            query.validate(),
            Err(SuggesterError::InvalidQuery(_))
        ));
    }

    #[test]
    fn test_regex_query_is_anchored() {
        let query = RegexQuery::new("body", "t.rm[0-9]").unwrap();
        assert!(query.matches("term1"));
        assert!(!query.matches("term12"));
        assert!(!query.matches("xterm1"));
        assert!(query.validate().is_ok());
    }

    #[test]
    fn test_bad_regex_is_invalid_query() {
        assert!(matches!(
            RegexQuery::new("body", "(unclosed"),
            Err(SuggesterError::InvalidQuery(_))
        ));
    }
}
