//! TOML configuration for an [`AuthenticationEngine`].
//!
//! ```toml
//! realm = "orders"
//! username_claims = ["preferred_username", "sub"]
//! roles_claim = "realm_access.roles"
//! exclude = ["/health", "/public/*"]
//!
//! [[sources]]
//! header = "Authorization"
//! prefix = "Bearer"
//!
//! [verifier]
//! kind = "oidc"
//! provider_url = "https://idp.example/realms/orders"
//! retry_interval_seconds = 30
//!
//! [validation]
//! issuer = "https://idp.example/realms/orders"
//! audience = "orders-api"
//! ```

use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use base64::Engine as _;
use jsonwebtoken::Algorithm;
use serde::Deserialize;

use crate::claims::ClaimPath;
use crate::discovery::{DEFAULT_HTTP_TIMEOUT, DEFAULT_RETRY_INTERVAL, ResolverSettings};
use crate::engine::{AuthenticationEngine, DEFAULT_TOKEN_ATTRIBUTE};
use crate::jwt::VerifyOptions;
use crate::source::TokenSource;
use crate::verifier::{KeyVerifier, RemoteKeyVerifier, StaticKeyVerifier};
use crate::{Error, Result};

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GateConfig {
    /// Headers to read the token from, in order. Empty means `Authorization: Bearer`.
    #[serde(default)]
    pub sources: Vec<TokenSource>,
    /// Static challenge realm; the request path is used when unset.
    #[serde(default)]
    pub realm: Option<String>,
    /// Claims tried in order for the username. Empty means `sub`.
    #[serde(default)]
    pub username_claims: Vec<ClaimPath>,
    /// Claim holding roles.
    #[serde(default)]
    pub roles_claim: Option<ClaimPath>,
    /// Excluded paths, exact or with `*` wildcards. Compiled by [`GateConfig::build_engine`].
    #[serde(default)]
    pub exclude: Vec<String>,
    /// Key source.
    pub verifier: VerifierConfig,
    /// Token checks.
    #[serde(default)]
    pub validation: ValidationConfig,
    /// Request attribute name for the verified token.
    #[serde(default = "default_token_attribute")]
    pub token_attribute: String,
}

fn default_token_attribute() -> String {
    DEFAULT_TOKEN_ATTRIBUTE.to_string()
}

/// How keys are obtained.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case", deny_unknown_fields)]
pub enum VerifierConfig {
    /// One locally configured key. Exactly one of the key fields must be set.
    Static {
        /// Algorithm the key is pinned to, e.g. `HS256` or `ES256`.
        algorithm: String,
        /// Shared secret, as UTF-8 text.
        #[serde(default)]
        secret: Option<String>,
        /// Shared secret, base64 encoded.
        #[serde(default)]
        secret_base64: Option<String>,
        /// RSA, EC or Ed25519 public key in PEM.
        #[serde(default)]
        public_key_pem: Option<String>,
        /// A single JWK as a JSON string.
        #[serde(default)]
        jwk: Option<String>,
    },
    /// A JWKS document.
    Jwks {
        /// JWKS URL.
        url: String,
        /// Seconds to wait after a failed fetch before trying again.
        #[serde(default = "default_retry_interval_seconds")]
        retry_interval_seconds: u64,
    },
    /// An OpenID Provider, via discovery.
    Oidc {
        /// Issuer URL; `/.well-known/openid-configuration` is appended when missing.
        provider_url: String,
        /// Seconds to wait after a failed resolution before trying again.
        #[serde(default = "default_retry_interval_seconds")]
        retry_interval_seconds: u64,
    },
}

fn default_retry_interval_seconds() -> u64 {
    DEFAULT_RETRY_INTERVAL.as_secs()
}

/// Claim and transport checks shared by every verifier kind.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ValidationConfig {
    /// Required `iss`.
    #[serde(default)]
    pub issuer: Option<String>,
    /// Required `aud` member.
    #[serde(default)]
    pub audience: Option<String>,
    /// Clock skew allowed on `exp` and `nbf`.
    #[serde(default = "default_leeway")]
    pub leeway_seconds: u64,
    /// Allowed algorithm names, e.g. `["RS256", "ES256"]`. Empty means the default list.
    #[serde(default)]
    pub algorithms: Vec<String>,
    /// Timeout for each discovery or JWKS request.
    #[serde(default = "default_http_timeout_seconds")]
    pub http_timeout_seconds: u64,
}

fn default_leeway() -> u64 {
    VerifyOptions::default().leeway_seconds
}

fn default_http_timeout_seconds() -> u64 {
    DEFAULT_HTTP_TIMEOUT.as_secs()
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            issuer: None,
            audience: None,
            leeway_seconds: default_leeway(),
            algorithms: Vec::new(),
            http_timeout_seconds: default_http_timeout_seconds(),
        }
    }
}

impl ValidationConfig {
    /// Verification options described by this section.
    ///
    /// # Errors
    ///
    /// [`Error::Configuration`] for an unknown algorithm name.
    pub fn verify_options(&self) -> Result<VerifyOptions> {
        let mut opts = VerifyOptions {
            issuer: non_blank(self.issuer.as_deref()),
            audience: non_blank(self.audience.as_deref()),
            leeway_seconds: self.leeway_seconds,
            ..VerifyOptions::default()
        };
        if !self.algorithms.is_empty() {
            opts.allowed_algs = self
                .algorithms
                .iter()
                .map(|name| parse_algorithm(name.as_str()))
                .collect::<Result<_>>()?;
        }
        Ok(opts)
    }
}

fn non_blank(s: Option<&str>) -> Option<String> {
    s.map(str::trim).filter(|s| !s.is_empty()).map(str::to_string)
}

fn parse_algorithm(name: &str) -> Result<Algorithm> {
    Algorithm::from_str(name.trim())
        .map_err(|_| Error::config(format!("unknown algorithm {name:?}")))
}

/// Read and parse a configuration file.
///
/// # Errors
///
/// [`Error::Configuration`] when the file cannot be read or is not valid configuration.
pub fn load_config_from_file(path: &Path) -> Result<GateConfig> {
    let content = fs::read_to_string(path)
        .map_err(|e| Error::config(format!("failed to read {}: {e}", path.display())))?;
    GateConfig::from_toml_str(&content)
        .map_err(|e| Error::config(format!("invalid config in {}: {e}", path.display())))
}

impl GateConfig {
    /// Parse configuration from TOML text.
    ///
    /// # Errors
    ///
    /// [`Error::Toml`] for syntax or shape errors, including blank header names.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        Ok(toml::from_str(s)?)
    }

    /// Build the verifier this configuration describes. Nothing is fetched yet.
    ///
    /// # Errors
    ///
    /// [`Error::Configuration`] for unusable key material or URLs.
    pub fn build_verifier(&self) -> Result<Arc<dyn KeyVerifier>> {
        let opts = self.validation.verify_options()?;
        let http_timeout = Duration::from_secs(self.validation.http_timeout_seconds);
        let settings = |retry_interval_seconds: u64| ResolverSettings {
            retry_interval: Duration::from_secs(retry_interval_seconds),
            http_timeout,
        };

        let verifier: Arc<dyn KeyVerifier> = match &self.verifier {
            VerifierConfig::Static {
                algorithm,
                secret,
                secret_base64,
                public_key_pem,
                jwk,
            } => {
                let alg = parse_algorithm(algorithm)?;
                let verifier = match (secret, secret_base64, public_key_pem, jwk) {
                    (Some(secret), None, None, None) => {
                        StaticKeyVerifier::from_secret(alg, secret.as_bytes(), opts)?
                    }
                    (None, Some(encoded), None, None) => {
                        let secret = base64::engine::general_purpose::STANDARD
                            .decode(encoded.trim())
                            .map_err(|e| Error::config(format!("secret_base64: {e}")))?;
                        StaticKeyVerifier::from_secret(alg, &secret, opts)?
                    }
                    (None, None, Some(pem), None) => {
                        StaticKeyVerifier::from_pem(alg, pem.as_bytes(), opts)?
                    }
                    (None, None, None, Some(jwk)) => {
                        let opts = VerifyOptions {
                            allowed_algs: vec![alg],
                            ..opts
                        };
                        StaticKeyVerifier::from_jwk_json(jwk, opts)?
                    }
                    _ => {
                        return Err(Error::config(
                            "static verifier needs exactly one of secret, secret_base64, public_key_pem, jwk",
                        ));
                    }
                };
                Arc::new(verifier)
            }
            VerifierConfig::Jwks {
                url,
                retry_interval_seconds,
            } => Arc::new(RemoteKeyVerifier::jwks(
                url,
                settings(*retry_interval_seconds),
                opts,
            )?),
            VerifierConfig::Oidc {
                provider_url,
                retry_interval_seconds,
            } => Arc::new(RemoteKeyVerifier::oidc(
                provider_url,
                settings(*retry_interval_seconds),
                opts,
            )?),
        };
        Ok(verifier)
    }

    /// Build the engine this configuration describes.
    ///
    /// # Errors
    ///
    /// [`Error::Configuration`] for any invalid setting.
    pub fn build_engine(&self) -> Result<AuthenticationEngine> {
        let mut builder = AuthenticationEngine::builder(self.build_verifier()?)
            .token_attribute(self.token_attribute.clone());
        for source in &self.sources {
            builder = builder.source(source.clone());
        }
        if let Some(realm) = &self.realm {
            builder = builder.realm(realm.clone());
        }
        for path in &self.username_claims {
            builder = builder.username_claim(path.clone());
        }
        if let Some(path) = &self.roles_claim {
            builder = builder.roles_claim(path.clone());
        }
        for pattern in &self.exclude {
            builder = builder.exclude(pattern.as_str());
        }
        builder.build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const OIDC: &str = r#"
        realm = "orders"
        username_claims = ["preferred_username", ["urn:ids", "login"]]
        roles_claim = "realm_access.roles"
        exclude = ["/health", "/public/*"]

        [[sources]]
        header = "X-Access-Token"

        [[sources]]
        header = "Authorization"
        prefix = "Bearer"

        [verifier]
        kind = "oidc"
        provider_url = "https://idp.example/realms/orders"

        [validation]
        issuer = "https://idp.example/realms/orders"
        algorithms = ["RS256", "ES256"]
    "#;

    #[test]
    fn full_oidc_config_parses_and_builds() {
        let cfg = GateConfig::from_toml_str(OIDC).unwrap();
        assert_eq!(cfg.sources.len(), 2);
        assert_eq!(cfg.sources[0].prefix(), None);
        assert_eq!(cfg.username_claims[1].segments(), ["urn:ids", "login"]);
        assert_eq!(cfg.roles_claim.as_ref().unwrap().segments(), ["realm_access", "roles"]);
        assert_eq!(cfg.token_attribute, DEFAULT_TOKEN_ATTRIBUTE);
        assert_eq!(cfg.validation.leeway_seconds, 60);
        assert!(matches!(
            cfg.verifier,
            VerifierConfig::Oidc { retry_interval_seconds: 30, .. }
        ));

        let opts = cfg.validation.verify_options().unwrap();
        assert_eq!(opts.allowed_algs, vec![Algorithm::RS256, Algorithm::ES256]);
        assert_eq!(opts.issuer.as_deref(), Some("https://idp.example/realms/orders"));

        let engine = cfg.build_engine().unwrap();
        assert_eq!(engine.sources()[1].header_name(), "Authorization");
    }

    #[test]
    fn minimal_static_config_defaults_to_bearer() {
        let cfg = GateConfig::from_toml_str(
            r#"
            [verifier]
            kind = "static"
            algorithm = "HS256"
            secret = "s3cret"
            "#,
        )
        .unwrap();
        let engine = cfg.build_engine().unwrap();
        assert_eq!(engine.sources(), [TokenSource::bearer()]);
    }

    #[test]
    fn static_config_needs_exactly_one_key() {
        let cfg = GateConfig::from_toml_str(
            r#"
            [verifier]
            kind = "static"
            algorithm = "HS256"
            secret = "a"
            secret_base64 = "Yg=="
            "#,
        )
        .unwrap();
        assert!(cfg.build_engine().is_err());
    }

    #[test]
    fn invalid_settings_fail_at_build_time() {
        let unknown_alg = GateConfig::from_toml_str(
            r#"
            [verifier]
            kind = "static"
            algorithm = "XX999"
            secret = "a"
            "#,
        )
        .unwrap();
        assert!(matches!(unknown_alg.build_engine(), Err(Error::Configuration(_))));

        let bad_url = GateConfig::from_toml_str(
            r#"
            [verifier]
            kind = "jwks"
            url = "not a url"
            "#,
        )
        .unwrap();
        assert!(matches!(bad_url.build_engine(), Err(Error::Configuration(_))));
    }

    #[test]
    fn blank_exclusion_fails_at_build_time() {
        let cfg = GateConfig::from_toml_str(
            r#"
            exclude = ["/health", " "]

            [verifier]
            kind = "static"
            algorithm = "HS256"
            secret = "s3cret"
            "#,
        )
        .unwrap();
        assert!(matches!(cfg.build_engine(), Err(Error::Configuration(_))));
    }

    #[test]
    fn static_public_key_pem_builds() {
        let pem = include_str!("../tests/fixtures/ed25519_public.pem");
        let cfg = GateConfig::from_toml_str(&format!(
            r#"
            [verifier]
            kind = "static"
            algorithm = "EdDSA"
            public_key_pem = """
{pem}"""
            "#
        ))
        .unwrap();
        assert!(cfg.build_engine().is_ok());
    }

    #[test]
    fn blank_header_is_a_parse_error() {
        let err = GateConfig::from_toml_str(
            r#"
            [[sources]]
            header = "  "

            [verifier]
            kind = "jwks"
            url = "https://idp.example/keys"
            "#,
        );
        assert!(err.is_err());
    }

    #[test]
    fn missing_file_names_the_path() {
        let err = load_config_from_file(Path::new("/definitely/not/here.toml")).unwrap_err();
        assert!(err.to_string().contains("/definitely/not/here.toml"));
    }
}
