//! Shared fixtures for integration tests: a mock OpenID Provider and token minting.

#![allow(dead_code)]

use std::time::Duration;

use base64::Engine as _;
use bearer_gate::{ResolverSettings, VerifyOptions};
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use serde_json::{Value, json};
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{method, path},
};

pub const KID: &str = "key-1";
pub const SECRET: &[u8] = b"integration-test-hmac-secret-0123456789";

pub const DISCOVERY_PATH: &str = "/realms/test/.well-known/openid-configuration";
pub const JWKS_PATH: &str = "/realms/test/protocol/openid-connect/certs";

/// Mock provider serving a discovery document and a JWKS.
pub struct MockProvider {
    pub server: MockServer,
    pub issuer: String,
    pub jwks_uri: String,
}

impl MockProvider {
    /// Start an empty mock provider. Nothing is mounted yet.
    pub async fn start() -> Self {
        let server = MockServer::start().await;
        let base = server.uri();
        Self {
            issuer: format!("{base}/realms/test"),
            jwks_uri: format!("{base}{JWKS_PATH}"),
            server,
        }
    }

    /// Discovery document pointing at [`JWKS_PATH`], served `times` times (unbounded when `None`).
    /// The mock verifies on drop that it was called exactly `expected` times.
    pub async fn mount_discovery(&self, times: Option<u64>, expected: u64) {
        let mut mock = Mock::given(method("GET"))
            .and(path(DISCOVERY_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "issuer": self.issuer,
                "jwks_uri": self.jwks_uri,
            })))
            .expect(expected);
        if let Some(n) = times {
            mock = mock.up_to_n_times(n);
        }
        mock.mount(&self.server).await;
    }

    /// JWKS with one HS256 key under [`KID`].
    pub async fn mount_jwks(&self, times: Option<u64>, expected: u64) {
        let mut mock = Mock::given(method("GET"))
            .and(path(JWKS_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(oct_jwks(KID, SECRET)))
            .expect(expected);
        if let Some(n) = times {
            mock = mock.up_to_n_times(n);
        }
        mock.mount(&self.server).await;
    }

    /// Fail the discovery document with `status`.
    pub async fn mount_discovery_failure(&self, status: u16, times: Option<u64>, expected: u64) {
        let mut mock = Mock::given(method("GET"))
            .and(path(DISCOVERY_PATH))
            .respond_with(ResponseTemplate::new(status))
            .expect(expected);
        if let Some(n) = times {
            mock = mock.up_to_n_times(n);
        }
        mock.mount(&self.server).await;
    }

    /// Provider URL to configure a verifier with.
    pub fn provider_url(&self) -> String {
        self.issuer.clone()
    }
}

pub fn oct_jwks(kid: &str, secret: &[u8]) -> Value {
    json!({
        "keys": [{
            "kty": "oct",
            "kid": kid,
            "use": "sig",
            "alg": "HS256",
            "k": base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(secret),
        }]
    })
}

/// Options accepting the HS256 test tokens.
pub fn hs_options() -> VerifyOptions {
    VerifyOptions {
        allowed_algs: vec![Algorithm::HS256],
        ..VerifyOptions::default()
    }
}

pub fn settings(retry_interval: Duration) -> ResolverSettings {
    ResolverSettings {
        retry_interval,
        http_timeout: Duration::from_secs(2),
    }
}

/// Sign `claims` with HS256 under `kid`. `exp` is added when missing.
pub fn mint(kid: Option<&str>, secret: &[u8], mut claims: Value) -> String {
    if claims.get("exp").is_none() {
        claims["exp"] = json!(jsonwebtoken::get_current_timestamp() + 600);
    }
    let mut header = Header::new(Algorithm::HS256);
    header.kid = kid.map(str::to_string);
    encode(&header, &claims, &EncodingKey::from_secret(secret)).expect("sign test token")
}

/// A valid token for the default test key.
pub fn token(claims: Value) -> String {
    mint(Some(KID), SECRET, claims)
}
