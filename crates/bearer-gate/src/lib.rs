//! bearer-gate
//!
//! Bearer-token authentication for HTTP services. A request is authenticated by
//! reading a token from one of several configured headers, verifying it against a
//! key source, and deriving a username and role set from its claims. Failures are
//! answered with an RFC 6750 `WWW-Authenticate` challenge.
//!
//! Key sources:
//!
//! - **Static key**: an HMAC secret, a PEM public key, or a single JWK
//! - **JWKS endpoint**: a published key set
//! - **OpenID Connect discovery**: the provider's discovery document names the key set
//!
//! Remote key sets are fetched once. A failed fetch is retried only after a retry
//! interval; a successful one is kept for the life of the process.
//!
//! ## Quick start
//! ```no_run
//! use std::sync::Arc;
//! use bearer_gate::{
//!     AuthenticationEngine, ClaimPath, Outcome, RemoteKeyVerifier, ResolverSettings,
//!     VerifyOptions,
//! };
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let verifier = RemoteKeyVerifier::oidc(
//!     "https://idp.example/realms/orders",
//!     ResolverSettings::default(),
//!     VerifyOptions {
//!         issuer: Some("https://idp.example/realms/orders".to_string()),
//!         ..Default::default()
//!     },
//! )?;
//!
//! let engine = AuthenticationEngine::builder(Arc::new(verifier))
//!     .realm("orders")
//!     .roles_claim(ClaimPath::parse("realm_access.roles"))
//!     .exclude("/health")
//!     .build()?;
//!
//! let request = http::Request::builder()
//!     .uri("/orders/7")
//!     .header("Authorization", "Bearer eyJ...")
//!     .body(())?;
//!
//! match engine.authenticate(request).await {
//!     Outcome::Authenticated(auth) => println!("user={:?}", auth.remote_user()),
//!     Outcome::Excluded(_) => {}
//!     Outcome::Challenge(rejection) => println!("401 {}", rejection.www_authenticate),
//!     Outcome::Error(failure) => println!("500 {}", failure.error),
//! }
//! # Ok(()) }
//! ```

#![forbid(unsafe_code)]

mod challenge;
mod claims;
mod config;
mod discovery;
mod engine;
mod error;
mod exclusion;
mod host;
mod jwt;
mod roles;
mod source;
mod verifier;

pub use challenge::{
    Challenge, ChallengePolicy, INVALID_REQUEST, INVALID_TOKEN, Rfc6750Policy, render_header,
    sanitize, select_realm,
};
pub use claims::{ClaimPath, ClaimValue, Claims, find_claim, load_roles};
pub use config::{GateConfig, ValidationConfig, VerifierConfig, load_config_from_file};
pub use discovery::{
    DEFAULT_HTTP_TIMEOUT, DEFAULT_RETRY_INTERVAL, KeyLocation, KeyResolver,
    OPENID_CONFIGURATION_SUFFIX, ResolvedKeys, ResolverSettings, normalize_discovery_uri,
};
pub use engine::{
    AuthenticatedRequest, AuthenticationEngine, DEFAULT_TOKEN_ATTRIBUTE, EngineBuilder,
    InternalFailure, Outcome, Rejection,
};
pub use error::{AuthError, Error, Result};
pub use exclusion::PathPattern;
pub use host::{HostRequest, HostResponse, TokenAttribute};
pub use jwt::{Jwk, JwksSet, KeyMaterial, KeySet, VerifyOptions};
pub use roles::RolesHelper;
pub use source::{TokenCandidate, TokenSource};
pub use verifier::{KeyVerifier, RemoteKeyVerifier, StaticKeyVerifier, VerifiedToken};
