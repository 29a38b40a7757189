//! Paths that bypass authentication.

use regex::Regex;
use serde::Deserialize;

use crate::error::{Error, Result};

/// An excluded path: exact, or a pattern where `*` matches any run of characters
/// (including `/`). `/public/*` therefore excludes everything below `/public/`.
#[derive(Debug, Clone, Deserialize)]
#[serde(try_from = "String")]
pub enum PathPattern {
    /// Matches this path only.
    Exact(String),
    /// Wildcard pattern, compiled once into an anchored regex.
    Glob {
        /// Pattern as configured.
        pattern: String,
        /// `^literal.*literal$`.
        regex: Regex,
    },
}

impl PathPattern {
    /// Parse a configured pattern.
    ///
    /// # Errors
    ///
    /// [`Error::Configuration`] for a blank pattern, or one that does not compile.
    pub fn new(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(Error::config("excluded path must not be blank"));
        }
        if !raw.contains('*') {
            return Ok(PathPattern::Exact(raw.to_string()));
        }
        let body = raw
            .split('*')
            .map(regex::escape)
            .collect::<Vec<_>>()
            .join(".*");
        let regex = Regex::new(&format!("^{body}$"))
            .map_err(|e| Error::config(format!("invalid excluded path {raw:?}: {e}")))?;
        Ok(PathPattern::Glob {
            pattern: raw.to_string(),
            regex,
        })
    }

    /// The pattern as configured.
    pub fn as_str(&self) -> &str {
        match self {
            PathPattern::Exact(p) | PathPattern::Glob { pattern: p, .. } => p,
        }
    }

    /// True when `path` is covered by this pattern.
    pub fn matches(&self, path: &str) -> bool {
        match self {
            PathPattern::Exact(p) => p == path,
            PathPattern::Glob { regex, .. } => regex.is_match(path),
        }
    }
}

impl TryFrom<String> for PathPattern {
    type Error = Error;

    fn try_from(raw: String) -> Result<Self> {
        PathPattern::new(&raw)
    }
}

impl PartialEq for PathPattern {
    fn eq(&self, other: &Self) -> bool {
        matches!(
            (self, other),
            (PathPattern::Exact(_), PathPattern::Exact(_))
                | (PathPattern::Glob { .. }, PathPattern::Glob { .. })
        ) && self.as_str() == other.as_str()
    }
}

impl Eq for PathPattern {}
