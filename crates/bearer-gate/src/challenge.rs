//! RFC 6750 bearer challenges.

use std::fmt;

use crate::AuthError;

/// `invalid_request` error code.
pub const INVALID_REQUEST: &str = "invalid_request";
/// `invalid_token` error code.
pub const INVALID_TOKEN: &str = "invalid_token";

/// Status, error code and description sent back on a failed authentication.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Challenge {
    status_code: u16,
    error_code: String,
    error_description: String,
}

impl Challenge {
    /// Build a challenge with an explicit status code.
    pub fn new(
        status_code: u16,
        error_code: impl Into<String>,
        error_description: impl Into<String>,
    ) -> Self {
        Self {
            status_code,
            error_code: error_code.into(),
            error_description: error_description.into(),
        }
    }

    /// Build a 401 challenge.
    pub fn unauthorized(error_code: impl Into<String>, error_description: impl Into<String>) -> Self {
        Self::new(401, error_code, error_description)
    }

    /// HTTP status code.
    pub fn status_code(&self) -> u16 {
        self.status_code
    }

    /// RFC 6750 error code.
    pub fn error_code(&self) -> &str {
        &self.error_code
    }

    /// Human readable description.
    pub fn error_description(&self) -> &str {
        &self.error_description
    }

    /// Render the `WWW-Authenticate` value for this challenge under `realm`.
    pub fn www_authenticate(&self, realm: &str) -> String {
        render_header(
            realm,
            &[
                ("error", self.error_code.as_str()),
                ("error_description", self.error_description.as_str()),
            ],
        )
    }
}

/// Render `Bearer realm="..", key="..", ...`.
///
/// Parameters whose sanitized value is blank are omitted. A challenge with no
/// parameters at all renders as the bare scheme.
pub fn render_header(realm: &str, params: &[(&str, &str)]) -> String {
    let rendered: Vec<String> = std::iter::once(("realm", realm))
        .chain(params.iter().copied())
        .filter_map(|(name, value)| {
            let value = sanitize(value);
            if value.trim().is_empty() {
                None
            } else {
                Some(format!("{name}=\"{value}\""))
            }
        })
        .collect();

    if rendered.is_empty() {
        "Bearer".to_string()
    } else {
        format!("Bearer {}", rendered.join(", "))
    }
}

/// Make `value` safe inside a quoted-string: control characters are dropped, quotes and
/// backslashes are escaped.
pub fn sanitize(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '"' | '\\' => {
                out.push('\\');
                out.push(c);
            }
            c if c.is_control() => {}
            c => out.push(c),
        }
    }
    out
}

/// Pick the realm for a response: the configured one, or the request path.
pub fn select_realm<'a>(configured: Option<&'a str>, request_path: &'a str) -> &'a str {
    configured
        .filter(|r| !r.trim().is_empty())
        .unwrap_or(request_path)
}

/// Maps authentication failures to challenges.
pub trait ChallengePolicy: Send + Sync + fmt::Debug {
    /// Challenge to send for `error`. Never called for [`AuthError::Unexpected`].
    fn challenge(&self, error: &AuthError) -> Challenge;
}

/// Default mapping following RFC 6750 conventions: every failure is a 401; missing or
/// unusable credentials are `invalid_request`, token failures are `invalid_token`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Rfc6750Policy;

impl ChallengePolicy for Rfc6750Policy {
    fn challenge(&self, error: &AuthError) -> Challenge {
        match error {
            AuthError::MissingCredentials => {
                Challenge::unauthorized(INVALID_REQUEST, "Missing bearer token")
            }
            AuthError::MalformedCredentials => Challenge::unauthorized(
                INVALID_REQUEST,
                "Authorization header does not carry a bearer token",
            ),
            AuthError::TokenMalformed(_) => {
                Challenge::unauthorized(INVALID_TOKEN, "Token is malformed")
            }
            AuthError::SignatureInvalid => {
                Challenge::unauthorized(INVALID_TOKEN, "Token signature is invalid")
            }
            AuthError::TokenExpired => Challenge::unauthorized(INVALID_TOKEN, "Token has expired"),
            AuthError::ClaimsRejected(_) => {
                Challenge::unauthorized(INVALID_TOKEN, "Token claims are not acceptable")
            }
            AuthError::UnknownKeyId(_) => {
                Challenge::unauthorized(INVALID_TOKEN, "Token signing key is not recognized")
            }
            AuthError::KeyResolutionFailed { .. } | AuthError::KeyResolutionBackoff { .. } => {
                Challenge::unauthorized(INVALID_TOKEN, "Unable to verify token")
            }
            AuthError::Unexpected(_) => Challenge::new(500, "", "Internal error"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_header_has_all_fields_in_order() {
        let c = Challenge::unauthorized(INVALID_REQUEST, "Missing bearer token");
        assert_eq!(
            c.www_authenticate("api"),
            r#"Bearer realm="api", error="invalid_request", error_description="Missing bearer token""#
        );
    }

    #[test]
    fn blank_fields_are_omitted() {
        let c = Challenge::unauthorized("", " ");
        assert_eq!(c.www_authenticate("api"), r#"Bearer realm="api""#);
        let c = Challenge::unauthorized(INVALID_TOKEN, "");
        assert_eq!(c.www_authenticate(""), r#"Bearer error="invalid_token""#);
        assert_eq!(render_header("", &[]), "Bearer");
    }

    #[test]
    fn quotes_and_control_characters_are_neutralized() {
        assert_eq!(sanitize("a\"b\\c"), r#"a\"b\\c"#);
        assert_eq!(sanitize("line\r\nbreak\t\u{7f}"), "linebreak");
        let header = render_header("/x\"y\r\nSet-Cookie: a=b", &[]);
        assert_eq!(header, r#"Bearer realm="/x\"ySet-Cookie: a=b""#);
        assert!(!header.contains('\n'));
    }

    #[test]
    fn realm_falls_back_to_path() {
        assert_eq!(select_realm(Some("api"), "/orders"), "api");
        assert_eq!(select_realm(Some("  "), "/orders"), "/orders");
        assert_eq!(select_realm(None, "/orders"), "/orders");
    }

    #[test]
    fn default_policy_codes() {
        let p = Rfc6750Policy;
        assert_eq!(p.challenge(&AuthError::MissingCredentials).error_code(), INVALID_REQUEST);
        assert_eq!(p.challenge(&AuthError::MalformedCredentials).error_code(), INVALID_REQUEST);
        for err in [
            AuthError::TokenExpired,
            AuthError::SignatureInvalid,
            AuthError::TokenMalformed("x".into()),
            AuthError::UnknownKeyId("k".into()),
            AuthError::KeyResolutionFailed { cause: "down".into() },
            AuthError::KeyResolutionBackoff {
                cause: "down".into(),
                seconds_remaining: 3,
            },
        ] {
            let c = p.challenge(&err);
            assert_eq!(c.status_code(), 401);
            assert_eq!(c.error_code(), INVALID_TOKEN);
        }
    }

    #[test]
    fn descriptions_do_not_leak_resolution_causes() {
        let c = Rfc6750Policy.challenge(&AuthError::KeyResolutionFailed {
            cause: "dns error for idp.internal".into(),
        });
        assert!(!c.error_description().contains("idp.internal"));
    }
}
