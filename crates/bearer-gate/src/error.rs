//! Error types.

use thiserror::Error;

/// Crate result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while configuring the gate.
///
/// These are fatal at startup and never produced while handling a request.
#[derive(Debug, Error)]
pub enum Error {
    /// Missing or invalid configuration value.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Configuration file is not valid TOML for [`crate::GateConfig`].
    #[error(transparent)]
    Toml(#[from] toml::de::Error),

    /// JSON parsing error (e.g. a static JWK document).
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// jsonwebtoken rejected static key material.
    #[error(transparent)]
    Jwt(#[from] jsonwebtoken::errors::Error),
}

impl Error {
    pub(crate) fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }
}

/// Per-request authentication failures.
///
/// Every variant except [`AuthError::Unexpected`] is turned into a 401 challenge by the
/// engine's [`crate::ChallengePolicy`]; `Unexpected` becomes a 500.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// No configured source carried a non-blank header value.
    #[error("no credentials supplied")]
    MissingCredentials,

    /// Headers were present but none of them yielded a token for its source.
    #[error("credentials present but no usable bearer token found")]
    MalformedCredentials,

    /// Token could not be parsed as a JWT.
    #[error("token is malformed: {0}")]
    TokenMalformed(String),

    /// Signature did not verify, or the algorithm is not accepted for the key.
    #[error("token signature is invalid")]
    SignatureInvalid,

    /// `exp` is in the past (beyond leeway).
    #[error("token has expired")]
    TokenExpired,

    /// Issuer, audience, `nbf` or a required claim was rejected.
    #[error("token claims rejected: {0}")]
    ClaimsRejected(String),

    /// Token names a key id that the resolved key set does not contain.
    #[error("no key with id {0:?} in the resolved key set")]
    UnknownKeyId(String),

    /// Discovery or JWKS retrieval failed on this attempt.
    #[error("unable to resolve JWKS URL: {cause}")]
    KeyResolutionFailed {
        /// Underlying failure.
        cause: String,
    },

    /// A previous resolution failed and the retry interval has not elapsed yet.
    #[error(
        "unable to resolve JWKS URL: still within retry interval ({seconds_remaining}s remaining) after: {cause}"
    )]
    KeyResolutionBackoff {
        /// Failure recorded by the last real attempt.
        cause: String,
        /// Whole seconds (rounded up) until the next real attempt is allowed.
        seconds_remaining: u64,
    },

    /// Anything that is not an authentication outcome.
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl AuthError {
    /// True for failures that must surface as a server error rather than a challenge.
    pub fn is_unexpected(&self) -> bool {
        matches!(self, AuthError::Unexpected(_))
    }
}

impl From<jsonwebtoken::errors::Error> for AuthError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;

        match err.kind() {
            ErrorKind::ExpiredSignature => AuthError::TokenExpired,
            ErrorKind::InvalidSignature
            | ErrorKind::InvalidAlgorithm
            | ErrorKind::InvalidAlgorithmName
            | ErrorKind::MissingAlgorithm => AuthError::SignatureInvalid,
            ErrorKind::InvalidIssuer => AuthError::ClaimsRejected("issuer mismatch".to_string()),
            ErrorKind::InvalidAudience => {
                AuthError::ClaimsRejected("audience mismatch".to_string())
            }
            ErrorKind::InvalidSubject => AuthError::ClaimsRejected("subject mismatch".to_string()),
            ErrorKind::ImmatureSignature => {
                AuthError::ClaimsRejected("token not yet valid".to_string())
            }
            ErrorKind::MissingRequiredClaim(claim) => {
                AuthError::ClaimsRejected(format!("missing required claim {claim}"))
            }
            ErrorKind::InvalidToken
            | ErrorKind::InvalidClaimFormat(_)
            | ErrorKind::Base64(_)
            | ErrorKind::Json(_)
            | ErrorKind::Utf8(_) => AuthError::TokenMalformed(err.to_string()),
            _ => AuthError::Unexpected(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::errors::ErrorKind;

    #[test]
    fn jwt_errors_map_to_taxonomy() {
        assert_eq!(
            AuthError::from(jsonwebtoken::errors::Error::from(ErrorKind::ExpiredSignature)),
            AuthError::TokenExpired
        );
        assert_eq!(
            AuthError::from(jsonwebtoken::errors::Error::from(ErrorKind::InvalidSignature)),
            AuthError::SignatureInvalid
        );
        assert!(matches!(
            AuthError::from(jsonwebtoken::errors::Error::from(ErrorKind::InvalidToken)),
            AuthError::TokenMalformed(_)
        ));
        assert!(matches!(
            AuthError::from(jsonwebtoken::errors::Error::from(ErrorKind::ImmatureSignature)),
            AuthError::ClaimsRejected(_)
        ));
        assert!(matches!(
            AuthError::from(jsonwebtoken::errors::Error::from(ErrorKind::InvalidClaimFormat(
                "exp".to_string()
            ))),
            AuthError::TokenMalformed(_)
        ));
    }

    #[test]
    fn backoff_message_names_cause_and_interval() {
        let err = AuthError::KeyResolutionBackoff {
            cause: "connection refused".to_string(),
            seconds_remaining: 12,
        };
        let msg = err.to_string();
        assert!(msg.contains("retry interval"));
        assert!(msg.contains("12s"));
        assert!(msg.contains("connection refused"));
    }
}
