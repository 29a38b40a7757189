//! Key verifiers: turn a raw token into a [`VerifiedToken`].

use std::fmt;

use async_trait::async_trait;
use jsonwebtoken::{Algorithm, DecodingKey};
use serde_json::Value;

use crate::claims::Claims;
use crate::discovery::{KeyLocation, KeyResolver, ResolverSettings};
use crate::jwt::{Jwk, JwksSet, KeySet, VerifyOptions};
use crate::{AuthError, Error, Result};

/// A token whose signature and time claims have been validated.
#[derive(Debug, Clone, PartialEq)]
pub struct VerifiedToken {
    raw_token: String,
    claims: Claims,
}

impl VerifiedToken {
    /// Wrap decoded claims. The claim set must be a JSON object.
    ///
    /// # Errors
    ///
    /// [`AuthError::TokenMalformed`] when `claims` is not an object.
    pub fn from_claims_value(
        raw_token: impl Into<String>,
        claims: Value,
    ) -> std::result::Result<Self, AuthError> {
        match claims {
            Value::Object(claims) => Ok(Self {
                raw_token: raw_token.into(),
                claims,
            }),
            _ => Err(AuthError::TokenMalformed(
                "claims are not a JSON object".to_string(),
            )),
        }
    }

    /// The token exactly as received.
    pub fn raw_token(&self) -> &str {
        &self.raw_token
    }

    /// Decoded claims.
    pub fn claims(&self) -> &Claims {
        &self.claims
    }

    /// Get a top-level claim by key.
    pub fn claim(&self, key: &str) -> Option<&Value> {
        self.claims.get(key)
    }

    /// Convenience accessor for `sub`.
    pub fn sub(&self) -> Option<&str> {
        self.claim("sub").and_then(Value::as_str)
    }

    /// Convenience accessor for `iss`.
    pub fn iss(&self) -> Option<&str> {
        self.claim("iss").and_then(Value::as_str)
    }

    /// Convenience accessor for `exp`.
    pub fn exp(&self) -> Option<i64> {
        self.claim("exp").and_then(Value::as_i64)
    }
}

/// Cryptographic verification of raw tokens.
#[async_trait]
pub trait KeyVerifier: Send + Sync + fmt::Debug {
    /// Verify `raw_token`.
    ///
    /// # Errors
    ///
    /// Returns the [`AuthError`] describing why the token is not acceptable.
    async fn verify(&self, raw_token: &str) -> std::result::Result<VerifiedToken, AuthError>;
}

/// Verifies tokens against one locally configured key.
#[derive(Debug)]
pub struct StaticKeyVerifier {
    keys: KeySet,
    opts: VerifyOptions,
}

impl StaticKeyVerifier {
    /// HMAC verifier. `alg` must be one of `HS256`, `HS384`, `HS512`.
    ///
    /// # Errors
    ///
    /// [`Error::Configuration`] for a non-HMAC algorithm or an empty secret.
    pub fn from_secret(alg: Algorithm, secret: &[u8], opts: VerifyOptions) -> Result<Self> {
        if !matches!(alg, Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512) {
            return Err(Error::config(format!(
                "{alg:?} cannot be used with a shared secret"
            )));
        }
        if secret.is_empty() {
            return Err(Error::config("static key secret must not be empty"));
        }
        Ok(Self::pinned(DecodingKey::from_secret(secret), alg, opts))
    }

    /// Public-key verifier from a PEM document (RSA, EC or Ed25519 depending on `alg`).
    ///
    /// # Errors
    ///
    /// [`Error::Jwt`] when the PEM does not hold a key of the right family, and
    /// [`Error::Configuration`] for HMAC algorithms.
    pub fn from_pem(alg: Algorithm, pem: &[u8], opts: VerifyOptions) -> Result<Self> {
        let key = match alg {
            Algorithm::RS256
            | Algorithm::RS384
            | Algorithm::RS512
            | Algorithm::PS256
            | Algorithm::PS384
            | Algorithm::PS512 => DecodingKey::from_rsa_pem(pem)?,
            Algorithm::ES256 | Algorithm::ES384 => DecodingKey::from_ec_pem(pem)?,
            Algorithm::EdDSA => DecodingKey::from_ed_pem(pem)?,
            _ => {
                return Err(Error::config(format!(
                    "{alg:?} cannot be used with a PEM public key"
                )));
            }
        };
        Ok(Self::pinned(key, alg, opts))
    }

    /// Verifier from a single JWK JSON document.
    ///
    /// # Errors
    ///
    /// [`Error::Json`] for invalid JSON and [`Error::Configuration`] for an unusable key.
    pub fn from_jwk_json(jwk: &str, opts: VerifyOptions) -> Result<Self> {
        let jwk: Jwk = serde_json::from_str(jwk)?;
        let keys = KeySet::from_jwks(&JwksSet { keys: vec![jwk] }).map_err(Error::config)?;
        Ok(Self { keys, opts })
    }

    fn pinned(key: DecodingKey, alg: Algorithm, mut opts: VerifyOptions) -> Self {
        opts.allowed_algs = vec![alg];
        Self {
            keys: KeySet::single(key, alg),
            opts,
        }
    }
}

#[async_trait]
impl KeyVerifier for StaticKeyVerifier {
    async fn verify(&self, raw_token: &str) -> std::result::Result<VerifiedToken, AuthError> {
        self.keys.verify(raw_token, &self.opts)
    }
}

/// Verifies tokens against keys published by a JWKS endpoint or an OpenID Provider.
#[derive(Debug)]
pub struct RemoteKeyVerifier {
    resolver: KeyResolver,
    opts: VerifyOptions,
}

impl RemoteKeyVerifier {
    /// Keys from a JWKS URL.
    ///
    /// # Errors
    ///
    /// [`Error::Configuration`] for an invalid URL.
    pub fn jwks(url: &str, settings: ResolverSettings, opts: VerifyOptions) -> Result<Self> {
        Self::new(KeyLocation::jwks(url)?, settings, opts)
    }

    /// Keys found through OIDC discovery on `provider_url`.
    ///
    /// # Errors
    ///
    /// [`Error::Configuration`] for an invalid URL.
    pub fn oidc(
        provider_url: &str,
        settings: ResolverSettings,
        opts: VerifyOptions,
    ) -> Result<Self> {
        Self::new(KeyLocation::oidc(provider_url)?, settings, opts)
    }

    /// Verifier over an explicit location.
    ///
    /// # Errors
    ///
    /// [`Error::Configuration`] if the HTTP client cannot be built.
    pub fn new(location: KeyLocation, settings: ResolverSettings, opts: VerifyOptions) -> Result<Self> {
        Ok(Self {
            resolver: KeyResolver::new(location, settings)?,
            opts,
        })
    }

    /// The underlying resolver.
    pub fn resolver(&self) -> &KeyResolver {
        &self.resolver
    }
}

#[async_trait]
impl KeyVerifier for RemoteKeyVerifier {
    async fn verify(&self, raw_token: &str) -> std::result::Result<VerifiedToken, AuthError> {
        let resolved = self.resolver.keys().await?;
        resolved.keys.verify(raw_token, &self.opts)
    }
}
