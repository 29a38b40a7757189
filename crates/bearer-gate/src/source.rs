//! Token sources: where a bearer token may live in a request.

use serde::Deserialize;

use crate::{Error, Result};

/// A header to read a token from, plus an optional required prefix (e.g. `Bearer`).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "RawTokenSource")]
pub struct TokenSource {
    header_name: String,
    prefix: Option<String>,
}

#[derive(Deserialize)]
struct RawTokenSource {
    header: String,
    #[serde(default)]
    prefix: Option<String>,
}

impl TryFrom<RawTokenSource> for TokenSource {
    type Error = Error;

    fn try_from(raw: RawTokenSource) -> Result<Self> {
        TokenSource::new(raw.header, raw.prefix)
    }
}

impl TokenSource {
    /// Create a source. A blank header name is a configuration error; a blank prefix is
    /// treated as no prefix.
    pub fn new(header_name: impl Into<String>, prefix: Option<String>) -> Result<Self> {
        let header_name = header_name.into().trim().to_string();
        if header_name.is_empty() {
            return Err(Error::config("token source header name must not be blank"));
        }
        let prefix = prefix.filter(|p| !p.trim().is_empty());
        Ok(Self {
            header_name,
            prefix,
        })
    }

    /// The conventional `Authorization: Bearer <token>` source.
    pub fn bearer() -> Self {
        Self {
            header_name: "Authorization".to_string(),
            prefix: Some("Bearer".to_string()),
        }
    }

    /// Header name this source reads.
    pub fn header_name(&self) -> &str {
        &self.header_name
    }

    /// Required prefix, if any.
    pub fn prefix(&self) -> Option<&str> {
        self.prefix.as_deref()
    }

    /// Extract the raw token from a header value.
    ///
    /// With a prefix, the value must start with it (ASCII case-insensitive) and the
    /// trimmed remainder is returned. Without one, the trimmed value is returned. Blank
    /// results are `None`.
    pub fn raw_token(&self, header_value: &str) -> Option<String> {
        let rest = match self.prefix.as_deref() {
            Some(prefix) => strip_prefix_ignore_case(header_value, prefix)?,
            None => header_value,
        };
        let token = rest.trim();
        if token.is_empty() {
            None
        } else {
            Some(token.to_string())
        }
    }
}

fn strip_prefix_ignore_case<'a>(value: &'a str, prefix: &str) -> Option<&'a str> {
    let head = value.get(..prefix.len())?;
    if head.eq_ignore_ascii_case(prefix) {
        value.get(prefix.len()..)
    } else {
        None
    }
}

/// A header value paired with the source it was read from, before prefix stripping.
#[derive(Debug, Clone, Copy)]
pub struct TokenCandidate<'a> {
    /// Source the value came from.
    pub source: &'a TokenSource,
    /// Raw header value, if the header was present.
    pub value: Option<&'a str>,
}

impl TokenCandidate<'_> {
    /// The usable token for this candidate, if any.
    pub fn raw_token(&self) -> Option<String> {
        self.value.and_then(|v| self.source.raw_token(v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bearer() -> TokenSource {
        TokenSource::new("Authorization", Some("Bearer".to_string())).unwrap()
    }

    #[test]
    fn blank_header_name_is_rejected() {
        assert!(TokenSource::new("  ", None).is_err());
    }

    #[test]
    fn prefixed_value_is_stripped_and_trimmed() {
        let s = bearer();
        assert_eq!(s.raw_token("Bearer abc.def").as_deref(), Some("abc.def"));
        assert_eq!(s.raw_token("bearer   abc  ").as_deref(), Some("abc"));
        assert_eq!(s.raw_token("BEARER abc").as_deref(), Some("abc"));
    }

    #[test]
    fn prefix_mismatch_or_blank_remainder_is_none() {
        let s = bearer();
        assert_eq!(s.raw_token("Basic dXNlcjpwYXNz"), None);
        assert_eq!(s.raw_token("Bearer    "), None);
        assert_eq!(s.raw_token("Bear"), None);
        assert_eq!(s.raw_token(""), None);
    }

    #[test]
    fn prefix_property_holds_for_assorted_values() {
        let s = bearer();
        for v in ["x", "  spaced  ", "a.b.c", "Bearer nested"] {
            let header = format!("Bearer {v}");
            assert_eq!(s.raw_token(&header).as_deref(), Some(v.trim()));
        }
        for v in ["", "   ", "\t"] {
            assert_eq!(s.raw_token(&format!("Bearer {v}")), None);
        }
    }

    #[test]
    fn unprefixed_source_returns_trimmed_value() {
        let s = TokenSource::new("X-Api-Token", None).unwrap();
        assert_eq!(s.raw_token("  tok  ").as_deref(), Some("tok"));
        assert_eq!(s.raw_token("   "), None);
    }

    #[test]
    fn blank_prefix_means_no_prefix() {
        let s = TokenSource::new("X-Token", Some(" ".to_string())).unwrap();
        assert_eq!(s.prefix(), None);
        assert_eq!(s.raw_token("tok").as_deref(), Some("tok"));
    }

    #[test]
    fn multibyte_value_shorter_than_prefix_does_not_panic() {
        let s = bearer();
        assert_eq!(s.raw_token("é"), None);
        assert_eq!(s.raw_token("Beaéer x"), None);
    }

    #[test]
    fn candidate_without_value_has_no_token() {
        let s = bearer();
        let c = TokenCandidate {
            source: &s,
            value: None,
        };
        assert_eq!(c.raw_token(), None);
    }
}
