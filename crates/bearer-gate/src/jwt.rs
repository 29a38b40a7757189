//! JWK conversion and signature verification against a resolved key set.

use std::collections::HashMap;
use std::str::FromStr;

use base64::Engine;
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::AuthError;
use crate::verifier::VerifiedToken;

/// A published key set: `{"keys": [...]}`.
#[derive(Debug, Clone, Deserialize)]
pub struct JwksSet {
    /// Keys, in publication order.
    pub keys: Vec<Jwk>,
}

/// One entry of a key set. Only the members needed to build a verification key are read.
#[derive(Debug, Clone, Deserialize)]
pub struct Jwk {
    /// Key id (`kid`).
    #[serde(default)]
    pub kid: Option<String>,
    /// Intended use (`use`); anything but `sig` is ignored.
    #[serde(default, rename = "use")]
    pub key_use: Option<String>,
    /// Algorithm the key is restricted to (`alg`).
    #[serde(default)]
    pub alg: Option<String>,
    /// Type-specific key material, selected by `kty`.
    #[serde(flatten)]
    pub material: KeyMaterial,
}

/// Key material by `kty`. Members are optional so that one incomplete key does not
/// invalidate the whole set.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kty")]
pub enum KeyMaterial {
    #[serde(rename = "RSA")]
    Rsa {
        n: Option<String>,
        e: Option<String>,
    },
    #[serde(rename = "EC")]
    Ec {
        crv: Option<String>,
        x: Option<String>,
        y: Option<String>,
    },
    #[serde(rename = "OKP")]
    Okp {
        crv: Option<String>,
        x: Option<String>,
    },
    #[serde(rename = "oct")]
    Oct { k: Option<String> },
    /// Any other `kty`.
    #[serde(other)]
    Unsupported,
}

impl KeyMaterial {
    /// The `kty` this material was published under.
    pub fn kty(&self) -> &'static str {
        match self {
            KeyMaterial::Rsa { .. } => "RSA",
            KeyMaterial::Ec { .. } => "EC",
            KeyMaterial::Okp { .. } => "OKP",
            KeyMaterial::Oct { .. } => "oct",
            KeyMaterial::Unsupported => "unsupported",
        }
    }
}

/// Token checks applied after the signature verifies.
#[derive(Debug, Clone)]
pub struct VerifyOptions {
    /// Expected issuer (`iss`).
    pub issuer: Option<String>,

    /// Expected audience (`aud`).
    pub audience: Option<String>,

    /// Allowed algorithms.
    pub allowed_algs: Vec<Algorithm>,

    /// Clock skew/leeway in seconds.
    pub leeway_seconds: u64,
}

impl Default for VerifyOptions {
    fn default() -> Self {
        Self {
            issuer: None,
            audience: None,
            allowed_algs: vec![
                Algorithm::RS256,
                Algorithm::RS384,
                Algorithm::RS512,
                Algorithm::PS256,
                Algorithm::ES256,
                Algorithm::ES384,
                Algorithm::EdDSA,
            ],
            leeway_seconds: 60,
        }
    }
}

#[derive(Clone)]
struct ResolvedKey {
    alg: Option<Algorithm>,
    key: DecodingKey,
}

/// Decoding keys indexed by key id. Keys published without a `kid` are kept apart and
/// may verify any token.
#[derive(Clone, Default)]
pub struct KeySet {
    by_kid: HashMap<String, ResolvedKey>,
    unnamed: Vec<ResolvedKey>,
}

impl std::fmt::Debug for KeySet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeySet")
            .field("kids", &self.key_ids())
            .field("unnamed", &self.unnamed.len())
            .finish()
    }
}

impl KeySet {
    /// Convert every usable key of `jwks`. Unsupported keys are skipped with a warning.
    ///
    /// # Errors
    ///
    /// Returns a description when no key in the set is usable.
    pub fn from_jwks(jwks: &JwksSet) -> Result<Self, String> {
        let mut set = KeySet::default();
        for jwk in &jwks.keys {
            if jwk.key_use.as_deref().is_some_and(|u| u != "sig") {
                debug!(kid = ?jwk.kid, "skipping non-signature JWK");
                continue;
            }
            match decoding_key_from_jwk(jwk) {
                Ok(resolved) => set.insert(jwk.kid.clone(), resolved),
                Err(reason) => {
                    warn!(kid = ?jwk.kid, kty = jwk.material.kty(), %reason, "skipping unusable JWK");
                }
            }
        }
        if set.is_empty() {
            return Err("JWKS contains no usable signing keys".to_string());
        }
        Ok(set)
    }

    /// A set holding one key, pinned to `alg`.
    pub fn single(key: DecodingKey, alg: Algorithm) -> Self {
        let mut set = KeySet::default();
        set.insert(
            None,
            ResolvedKey {
                alg: Some(alg),
                key,
            },
        );
        set
    }

    fn insert(&mut self, kid: Option<String>, key: ResolvedKey) {
        match kid.filter(|k| !k.is_empty()) {
            Some(kid) => {
                self.by_kid.insert(kid, key);
            }
            None => self.unnamed.push(key),
        }
    }

    /// Number of usable keys.
    pub fn len(&self) -> usize {
        self.by_kid.len() + self.unnamed.len()
    }

    /// True when the set holds no key.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Key ids, sorted.
    pub fn key_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.by_kid.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    /// Verify `token` and return its claims.
    ///
    /// A token naming a `kid` is checked against that key (or against keys published
    /// without an id); otherwise every key is tried.
    ///
    /// # Errors
    ///
    /// Returns the [`AuthError`] describing why the token was rejected.
    pub fn verify(&self, token: &str, opts: &VerifyOptions) -> Result<VerifiedToken, AuthError> {
        let header = jsonwebtoken::decode_header(token)
            .map_err(|e| AuthError::TokenMalformed(format!("failed to decode header: {e}")))?;

        if !opts.allowed_algs.contains(&header.alg) {
            debug!(alg = ?header.alg, "token algorithm not in allow-list");
            return Err(AuthError::SignatureInvalid);
        }

        let candidates: Vec<&ResolvedKey> = match header.kid.as_deref().filter(|k| !k.is_empty()) {
            Some(kid) => match self.by_kid.get(kid) {
                Some(key) => vec![key],
                None if !self.unnamed.is_empty() => self.unnamed.iter().collect(),
                None => return Err(AuthError::UnknownKeyId(kid.to_string())),
            },
            None => self.by_kid.values().chain(self.unnamed.iter()).collect(),
        };

        let mut validation = Validation::new(header.alg);
        validation.leeway = opts.leeway_seconds;
        validation.validate_exp = true;
        validation.validate_nbf = true;
        let mut required = vec!["exp"];
        if let Some(issuer) = &opts.issuer {
            validation.set_issuer(&[issuer]);
            required.push("iss");
        }
        match &opts.audience {
            Some(audience) => {
                validation.set_audience(&[audience]);
                required.push("aud");
            }
            None => validation.validate_aud = false,
        }
        validation.set_required_spec_claims(&required);

        for candidate in candidates {
            if candidate.alg.is_some_and(|alg| alg != header.alg) {
                continue;
            }
            match jsonwebtoken::decode::<Value>(token, &candidate.key, &validation) {
                Ok(data) => return VerifiedToken::from_claims_value(token, data.claims),
                Err(e) => match AuthError::from(e) {
                    AuthError::SignatureInvalid => {}
                    other => return Err(other),
                },
            }
        }
        Err(AuthError::SignatureInvalid)
    }
}

fn decoding_key_from_jwk(jwk: &Jwk) -> Result<ResolvedKey, String> {
    fn member<'a>(value: Option<&'a str>, kty: &str, name: &str) -> Result<&'a str, String> {
        value.ok_or_else(|| format!("{kty} key without {name}"))
    }
    let alg = jwk
        .alg
        .as_deref()
        .map(|name| Algorithm::from_str(name).map_err(|e| format!("unsupported alg {name}: {e}")))
        .transpose()?;
    let kty = jwk.material.kty();
    let key = match &jwk.material {
        KeyMaterial::Rsa { n, e } => {
            DecodingKey::from_rsa_components(
                member(n.as_deref(), kty, "n")?,
                member(e.as_deref(), kty, "e")?,
            )
        }
        KeyMaterial::Ec { x, y, .. } => {
            DecodingKey::from_ec_components(
                member(x.as_deref(), kty, "x")?,
                member(y.as_deref(), kty, "y")?,
            )
        }
        KeyMaterial::Okp { crv, x } => match crv.as_deref() {
            Some("Ed25519") => DecodingKey::from_ed_components(member(x.as_deref(), kty, "x")?),
            other => return Err(format!("unsupported OKP curve {other:?}")),
        },
        KeyMaterial::Oct { k } => {
            let secret = base64::engine::general_purpose::URL_SAFE_NO_PAD
                .decode(member(k.as_deref(), kty, "k")?.trim_end_matches('='))
                .map_err(|e| format!("oct key is not base64url: {e}"))?;
            Ok(DecodingKey::from_secret(&secret))
        }
        KeyMaterial::Unsupported => return Err("unsupported key type".to_string()),
    }
    .map_err(|e| e.to_string())?;
    Ok(ResolvedKey { alg, key })
}
