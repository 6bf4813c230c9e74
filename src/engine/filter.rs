//! Property filters for bulk deletes.

use crate::models::Properties;
use crate::{Error, Result};
use regex::Regex;

/// A filter over record properties.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyFilter {
    /// Wildcard match on a string property: `*` matches any run of
    /// characters, `?` matches exactly one. Everything else is literal.
    Like {
        /// Property name.
        property: String,
        /// Wildcard pattern.
        pattern: String,
    },
}

impl PropertyFilter {
    /// Builds a `Like` filter.
    #[must_use]
    pub fn like(property: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self::Like {
            property: property.into(),
            pattern: pattern.into(),
        }
    }

    /// Compiles the filter into a reusable matcher.
    ///
    /// # Errors
    ///
    /// Returns an error if the pattern cannot be compiled.
    pub fn compile(&self) -> Result<CompiledFilter<'_>> {
        match self {
            Self::Like { property, pattern } => Ok(CompiledFilter {
                property,
                regex: wildcard_regex(pattern)?,
            }),
        }
    }
}

/// A compiled [`PropertyFilter`].
#[derive(Debug)]
pub struct CompiledFilter<'a> {
    property: &'a str,
    regex: Regex,
}

impl CompiledFilter<'_> {
    /// Returns true if the properties match. Non-string or missing
    /// properties never match.
    #[must_use]
    pub fn matches(&self, properties: &Properties) -> bool {
        properties
            .get(self.property)
            .and_then(|v| v.as_str())
            .is_some_and(|s| self.regex.is_match(s))
    }
}

fn wildcard_regex(pattern: &str) -> Result<Regex> {
    let mut expr = String::with_capacity(pattern.len() + 8);
    expr.push_str("(?s)^");
    for c in pattern.chars() {
        match c {
            '*' => expr.push_str(".*"),
            '?' => expr.push('.'),
            other => expr.push_str(&regex::escape(other.encode_utf8(&mut [0; 4]))),
        }
    }
    expr.push('$');

    Regex::new(&expr).map_err(|e| Error::InvalidInput(format!("invalid pattern '{pattern}': {e}")))
}
