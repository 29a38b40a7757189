//! The authentication pipeline.
//!
//! ```text
//! path excluded? ──yes──► Excluded(request)
//!      │ no
//! any source header present? ──no──► Challenge(invalid_request)
//!      │ yes
//! first candidate with a usable token ──none──► Challenge(invalid_request)
//!      │
//! KeyVerifier::verify ──err──► Challenge(policy) / Error(500)
//!      │ ok
//! username + RolesHelper + attribute ──► Authenticated(request)
//! ```

use std::sync::Arc;

use tracing::{debug, error};

use crate::challenge::{Challenge, ChallengePolicy, Rfc6750Policy, select_realm};
use crate::claims::{ClaimPath, find_claim, scalar_text};
use crate::exclusion::PathPattern;
use crate::host::{HostRequest, HostResponse};
use crate::roles::RolesHelper;
use crate::source::{TokenCandidate, TokenSource};
use crate::verifier::{KeyVerifier, VerifiedToken};
use crate::{AuthError, Error, Result};

/// Default request attribute carrying the verified token.
pub const DEFAULT_TOKEN_ATTRIBUTE: &str = "bearer_gate.verified_token";

/// Result of running a request through the engine.
#[derive(Debug)]
pub enum Outcome<R> {
    /// The path is excluded; the request is untouched.
    Excluded(R),
    /// The request carries a verified token.
    Authenticated(AuthenticatedRequest<R>),
    /// Authentication failed; send the challenge instead of proceeding.
    Challenge(Rejection),
    /// Something other than authentication went wrong.
    Error(InternalFailure),
}

impl<R> Outcome<R> {
    /// True for outcomes that let the request continue.
    pub fn is_proceed(&self) -> bool {
        matches!(self, Outcome::Excluded(_) | Outcome::Authenticated(_))
    }
}

/// A challenge ready to be written to a response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    /// The challenge.
    pub challenge: Challenge,
    /// Rendered `WWW-Authenticate` value.
    pub www_authenticate: String,
    /// The failure behind it.
    pub error: AuthError,
}

impl Rejection {
    /// Set status and `WWW-Authenticate` on `response`.
    pub fn write_to<W: HostResponse + ?Sized>(&self, response: &mut W) {
        response.set_status(self.challenge.status_code());
        response.add_header("WWW-Authenticate", &self.www_authenticate);
    }
}

/// A non-authentication failure, reported as a 500.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InternalFailure {
    /// The error.
    pub error: AuthError,
}

impl InternalFailure {
    /// HTTP status used for internal failures.
    pub const STATUS: u16 = 500;

    /// Set the 500 status on `response`.
    pub fn write_to<W: HostResponse + ?Sized>(&self, response: &mut W) {
        response.set_status(Self::STATUS);
    }
}

/// A request that passed authentication.
#[derive(Debug)]
pub struct AuthenticatedRequest<R> {
    inner: R,
    remote_user: Option<String>,
    roles: RolesHelper,
    token: Arc<VerifiedToken>,
}

impl<R> AuthenticatedRequest<R> {
    /// Username derived from the configured claims, if any resolved.
    pub fn remote_user(&self) -> Option<&str> {
        self.remote_user.as_deref()
    }

    /// Role membership, per the configured roles claim.
    pub fn is_user_in_role(&self, role: &str) -> bool {
        self.roles.is_user_in_role(role)
    }

    /// Role helper for this request.
    pub fn roles(&self) -> &RolesHelper {
        &self.roles
    }

    /// The verified token.
    pub fn verified_token(&self) -> &Arc<VerifiedToken> {
        &self.token
    }

    /// The wrapped request.
    pub fn request(&self) -> &R {
        &self.inner
    }

    /// The wrapped request, mutably.
    pub fn request_mut(&mut self) -> &mut R {
        &mut self.inner
    }

    /// Unwrap the request.
    pub fn into_inner(self) -> R {
        self.inner
    }
}

/// Shared, process-wide authentication engine.
#[derive(Debug)]
pub struct AuthenticationEngine {
    sources: Vec<TokenSource>,
    realm: Option<String>,
    username_claims: Vec<ClaimPath>,
    roles_claim: Option<ClaimPath>,
    exclusions: Vec<PathPattern>,
    verifier: Arc<dyn KeyVerifier>,
    policy: Arc<dyn ChallengePolicy>,
    token_attribute: String,
}

impl AuthenticationEngine {
    /// Start configuring an engine around `verifier`.
    pub fn builder(verifier: Arc<dyn KeyVerifier>) -> EngineBuilder {
        EngineBuilder {
            sources: Vec::new(),
            realm: None,
            username_claims: Vec::new(),
            roles_claim: None,
            exclusions: Vec::new(),
            verifier,
            policy: Arc::new(Rfc6750Policy),
            token_attribute: DEFAULT_TOKEN_ATTRIBUTE.to_string(),
        }
    }

    /// Configured token sources, in order.
    pub fn sources(&self) -> &[TokenSource] {
        &self.sources
    }

    /// Authenticate `request`.
    pub async fn authenticate<R: HostRequest>(&self, mut request: R) -> Outcome<R> {
        let path = request.path();

        if self.exclusions.iter().any(|p| p.matches(&path)) {
            debug!(%path, "path excluded from authentication");
            return Outcome::Excluded(request);
        }

        let headers: Vec<(&TokenSource, Vec<String>)> = self
            .sources
            .iter()
            .map(|s| (s, request.header_values(s.header_name())))
            .collect();

        let token = match select_token(&headers) {
            Ok(token) => token,
            Err(err) => return self.reject(&path, err),
        };

        let verified = match self.verifier.verify(&token).await {
            Ok(verified) => Arc::new(verified),
            Err(err) => return self.reject(&path, err),
        };

        let remote_user = self.username(&verified);
        debug!(%path, user = ?remote_user, "request authenticated");

        request.set_attribute(&self.token_attribute, verified.clone());
        Outcome::Authenticated(AuthenticatedRequest {
            inner: request,
            remote_user,
            roles: RolesHelper::new(verified.clone(), self.roles_claim.clone()),
            token: verified,
        })
    }

    /// Authenticate and, on failure, write the response through `response`.
    ///
    /// Returns the request to continue with, or `None` when the response has been set.
    pub async fn filter<R, W>(&self, request: R, response: &mut W) -> Option<Outcome<R>>
    where
        R: HostRequest,
        W: HostResponse + ?Sized,
    {
        match self.authenticate(request).await {
            Outcome::Challenge(rejection) => {
                rejection.write_to(response);
                None
            }
            Outcome::Error(failure) => {
                failure.write_to(response);
                None
            }
            proceed => Some(proceed),
        }
    }

    fn username(&self, token: &VerifiedToken) -> Option<String> {
        self.username_claims
            .iter()
            .find_map(|path| find_claim(token.claims(), path).and_then(scalar_text))
    }

    fn reject<R>(&self, path: &str, err: AuthError) -> Outcome<R> {
        if err.is_unexpected() {
            error!(%path, error = %err, "authentication pipeline failed");
            return Outcome::Error(InternalFailure { error: err });
        }
        debug!(%path, error = %err, "authentication failed");
        let challenge = self.policy.challenge(&err);
        let realm = select_realm(self.realm.as_deref(), path);
        Outcome::Challenge(Rejection {
            www_authenticate: challenge.www_authenticate(realm),
            challenge,
            error: err,
        })
    }
}

/// Pick the token to verify: the first candidate, in source order, that yields one.
fn select_token(headers: &[(&TokenSource, Vec<String>)]) -> std::result::Result<String, AuthError> {
    let any_present = headers
        .iter()
        .any(|(_, values)| values.iter().any(|v| !v.trim().is_empty()));
    if !any_present {
        return Err(AuthError::MissingCredentials);
    }

    headers
        .iter()
        .flat_map(|(source, values)| {
            let source: &TokenSource = source;
            values.iter().map(move |v| TokenCandidate {
                source,
                value: Some(v.as_str()),
            })
        })
        .find_map(|candidate| {
            let token = candidate.raw_token();
            if token.is_none() {
                debug!(header = candidate.source.header_name(), "skipping unusable candidate");
            }
            token
        })
        .ok_or(AuthError::MalformedCredentials)
}

/// Builder for [`AuthenticationEngine`].
#[derive(Debug)]
pub struct EngineBuilder {
    sources: Vec<TokenSource>,
    realm: Option<String>,
    username_claims: Vec<ClaimPath>,
    roles_claim: Option<ClaimPath>,
    exclusions: Vec<String>,
    verifier: Arc<dyn KeyVerifier>,
    policy: Arc<dyn ChallengePolicy>,
    token_attribute: String,
}

impl EngineBuilder {
    /// Add a token source. Sources are consulted in the order added; without any, the
    /// engine reads `Authorization: Bearer`.
    #[must_use]
    pub fn source(mut self, source: TokenSource) -> Self {
        self.sources.push(source);
        self
    }

    /// Static realm. Without one, the request path is used.
    #[must_use]
    pub fn realm(mut self, realm: impl Into<String>) -> Self {
        self.realm = Some(realm.into());
        self
    }

    /// Add a username claim path; the first path resolving to a non-blank value wins.
    /// Without any, `sub` is used.
    #[must_use]
    pub fn username_claim(mut self, path: ClaimPath) -> Self {
        self.username_claims.push(path);
        self
    }

    /// Claim path holding roles.
    #[must_use]
    pub fn roles_claim(mut self, path: ClaimPath) -> Self {
        self.roles_claim = Some(path);
        self
    }

    /// Exclude a path from authentication: an exact path, or a pattern where `*`
    /// matches any run of characters. Patterns are compiled by [`EngineBuilder::build`].
    #[must_use]
    pub fn exclude(mut self, pattern: impl Into<String>) -> Self {
        self.exclusions.push(pattern.into());
        self
    }

    /// Replace the failure-to-challenge mapping.
    #[must_use]
    pub fn challenge_policy(mut self, policy: Arc<dyn ChallengePolicy>) -> Self {
        self.policy = policy;
        self
    }

    /// Attribute name under which the verified token is attached to the request.
    #[must_use]
    pub fn token_attribute(mut self, name: impl Into<String>) -> Self {
        self.token_attribute = name.into();
        self
    }

    /// Finish configuration.
    ///
    /// # Errors
    ///
    /// [`Error::Configuration`] for a blank token attribute name or an unusable
    /// excluded path.
    pub fn build(self) -> Result<AuthenticationEngine> {
        if self.token_attribute.trim().is_empty() {
            return Err(Error::config("token attribute name must not be blank"));
        }
        let exclusions = self
            .exclusions
            .iter()
            .map(|raw| PathPattern::new(raw))
            .collect::<Result<Vec<_>>>()?;
        let sources = if self.sources.is_empty() {
            vec![TokenSource::bearer()]
        } else {
            self.sources
        };
        let username_claims: Vec<ClaimPath> = self
            .username_claims
            .into_iter()
            .filter(|p| !p.is_empty())
            .collect();
        let username_claims = if username_claims.is_empty() {
            vec![ClaimPath::parse("sub")]
        } else {
            username_claims
        };

        Ok(AuthenticationEngine {
            sources,
            realm: self.realm.filter(|r| !r.trim().is_empty()),
            username_claims,
            roles_claim: self.roles_claim.filter(|p| !p.is_empty()),
            exclusions,
            verifier: self.verifier,
            policy: self.policy,
            token_attribute: self.token_attribute,
        })
    }
}
