//! Claim lookup and role normalization.

use std::collections::BTreeSet;
use std::fmt;

use serde::Deserialize;
use serde_json::{Map, Value};

/// Decoded claim set of a verified token.
pub type Claims = Map<String, Value>;

/// Ordered claim-name segments, e.g. `["realm_access", "roles"]`.
///
/// Deserializes from a dotted string (`"realm_access.roles"`) or an array of segments
/// (for claim names that themselves contain dots).
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(from = "RawClaimPath")]
pub struct ClaimPath(Vec<String>);

#[derive(Deserialize)]
#[serde(untagged)]
enum RawClaimPath {
    Dotted(String),
    Segments(Vec<String>),
}

impl From<RawClaimPath> for ClaimPath {
    fn from(raw: RawClaimPath) -> Self {
        match raw {
            RawClaimPath::Dotted(s) => ClaimPath::parse(&s),
            RawClaimPath::Segments(v) => ClaimPath::new(v),
        }
    }
}

impl ClaimPath {
    /// Build a path from segments; blank segments are dropped.
    pub fn new<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(
            segments
                .into_iter()
                .map(Into::into)
                .filter(|s: &String| !s.trim().is_empty())
                .collect(),
        )
    }

    /// Split a dotted path.
    pub fn parse(dotted: &str) -> Self {
        Self::new(dotted.split('.').map(str::trim))
    }

    /// True when no claim is configured.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Path segments.
    pub fn segments(&self) -> &[String] {
        &self.0
    }
}

impl fmt::Display for ClaimPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join("."))
    }
}

/// Shape of a claim value, decided once where claims are read.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ClaimValue<'a> {
    /// Claim not present (or JSON `null`).
    Absent,
    /// A string.
    Text(&'a str),
    /// An array.
    Sequence(&'a [Value]),
    /// An object.
    Mapping(&'a Map<String, Value>),
    /// Numbers and booleans.
    Other(&'a Value),
}

impl<'a> From<Option<&'a Value>> for ClaimValue<'a> {
    fn from(value: Option<&'a Value>) -> Self {
        match value {
            None | Some(Value::Null) => ClaimValue::Absent,
            Some(Value::String(s)) => ClaimValue::Text(s),
            Some(Value::Array(items)) => ClaimValue::Sequence(items),
            Some(Value::Object(map)) => ClaimValue::Mapping(map),
            Some(other) => ClaimValue::Other(other),
        }
    }
}

/// Walk `path` through nested objects.
///
/// An empty path, a missing key at any depth, or a non-object intermediate all yield
/// `None`; absence is routine and never an error.
pub fn find_claim<'a>(claims: &'a Claims, path: &ClaimPath) -> Option<&'a Value> {
    let (first, rest) = path.segments().split_first()?;
    let mut current = claims.get(first)?;
    for segment in rest {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

/// Normalize a raw role claim into a set of role names.
///
/// - absent: empty
/// - string with a comma: split, trim, drop blanks
/// - other string: the trimmed value when non-blank
/// - array: each non-null element's string form, trimmed (no comma splitting)
/// - anything else: empty
pub fn load_roles(value: ClaimValue<'_>) -> BTreeSet<String> {
    match value {
        ClaimValue::Absent | ClaimValue::Mapping(_) | ClaimValue::Other(_) => BTreeSet::new(),
        ClaimValue::Text(s) if s.contains(',') => s
            .split(',')
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .map(str::to_string)
            .collect(),
        ClaimValue::Text(s) => {
            let role = s.trim();
            if role.is_empty() {
                BTreeSet::new()
            } else {
                BTreeSet::from([role.to_string()])
            }
        }
        ClaimValue::Sequence(items) => items
            .iter()
            .filter_map(element_string)
            .map(|r| r.trim().to_string())
            .collect(),
    }
}

/// String form of an array element; `None` for JSON `null`.
fn element_string(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Text form of a scalar claim, used for usernames.
pub(crate) fn scalar_text(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    Some(text).filter(|s| !s.is_empty())
}
