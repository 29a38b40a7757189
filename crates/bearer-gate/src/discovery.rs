//! Remote key resolution: OIDC discovery and JWKS retrieval.
//!
//! A [`KeyResolver`] turns a provider location into a [`KeySet`] exactly once:
//!
//! - the first successful resolution is kept for the lifetime of the resolver and the
//!   provider is never contacted again;
//! - a failed attempt records its time and cause, and further attempts inside the retry
//!   interval fail fast with [`AuthError::KeyResolutionBackoff`];
//! - concurrent callers queue behind a single in-flight attempt.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;
use thiserror::Error;
use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, info, warn};

use crate::jwt::{JwksSet, KeySet};
use crate::{AuthError, Error, Result};

/// Well-known suffix of an OpenID Provider configuration document.
pub const OPENID_CONFIGURATION_SUFFIX: &str = "/.well-known/openid-configuration";

/// Default wait after a failed resolution before the provider is contacted again.
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_secs(30);

/// Default timeout for each discovery or JWKS request.
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Canonical discovery document URI for a provider URL.
///
/// A URL already ending in the well-known suffix is returned unchanged; anything else
/// gets the suffix appended after its existing path (trailing slashes removed first).
pub fn normalize_discovery_uri(provider_url: &str) -> String {
    let trimmed = provider_url.trim();
    if trimmed.ends_with(OPENID_CONFIGURATION_SUFFIX) {
        trimmed.to_string()
    } else {
        format!(
            "{}{OPENID_CONFIGURATION_SUFFIX}",
            trimmed.trim_end_matches('/')
        )
    }
}

/// Where the keys come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyLocation {
    /// A JWKS document at this URL.
    JwksUrl(String),
    /// An OpenID Provider whose discovery document names the JWKS URL.
    Discovery(String),
}

impl KeyLocation {
    /// OIDC location for a provider URL, normalized.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] when the URL does not parse.
    pub fn oidc(provider_url: &str) -> Result<Self> {
        let uri = normalize_discovery_uri(provider_url);
        check_url(&uri)?;
        Ok(Self::Discovery(uri))
    }

    /// JWKS location.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] when the URL does not parse.
    pub fn jwks(url: &str) -> Result<Self> {
        let url = url.trim();
        check_url(url)?;
        Ok(Self::JwksUrl(url.to_string()))
    }
}

fn check_url(raw: &str) -> Result<()> {
    let parsed =
        url::Url::parse(raw).map_err(|e| Error::config(format!("invalid URL {raw:?}: {e}")))?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        other => Err(Error::config(format!(
            "unsupported URL scheme {other:?} in {raw:?}"
        ))),
    }
}

/// Timing knobs for a [`KeyResolver`].
#[derive(Debug, Clone, Copy)]
pub struct ResolverSettings {
    /// Minimum wait after a failed resolution.
    pub retry_interval: Duration,
    /// Per-request HTTP timeout.
    pub http_timeout: Duration,
}

impl Default for ResolverSettings {
    fn default() -> Self {
        Self {
            retry_interval: DEFAULT_RETRY_INTERVAL,
            http_timeout: DEFAULT_HTTP_TIMEOUT,
        }
    }
}

/// Why one resolution attempt failed.
#[derive(Debug, Error)]
enum ResolveError {
    #[error("request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} answered {status}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
    },

    #[error("invalid JSON from {url}: {source}")]
    Json {
        url: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("discovery document {0} has no jwks_uri")]
    MissingJwksUri(String),

    #[error("{0}")]
    Keys(String),
}

/// Result of a successful resolution.
#[derive(Debug)]
pub struct ResolvedKeys {
    /// JWKS URL the keys were read from.
    pub jwks_uri: String,
    /// Usable keys.
    pub keys: KeySet,
}

#[derive(Debug, Clone)]
struct FailureMarker {
    at: Instant,
    cause: String,
}

/// Resolves and caches the key set behind a [`KeyLocation`].
#[derive(Debug)]
pub struct KeyResolver {
    location: KeyLocation,
    settings: ResolverSettings,
    client: reqwest::Client,
    resolved: OnceCell<Arc<ResolvedKeys>>,
    last_failure: Mutex<Option<FailureMarker>>,
}

impl KeyResolver {
    /// Create an unresolved resolver. Nothing is fetched until [`KeyResolver::keys`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if the HTTP client cannot be built.
    pub fn new(location: KeyLocation, settings: ResolverSettings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(settings.http_timeout)
            .build()
            .map_err(|e| Error::config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            location,
            settings,
            client,
            resolved: OnceCell::new(),
            last_failure: Mutex::new(None),
        })
    }

    /// Location this resolver reads from.
    pub fn location(&self) -> &KeyLocation {
        &self.location
    }

    /// Keys resolved so far, if any.
    pub fn resolved(&self) -> Option<Arc<ResolvedKeys>> {
        self.resolved.get().cloned()
    }

    /// The resolved keys, resolving them first if needed.
    ///
    /// # Errors
    ///
    /// [`AuthError::KeyResolutionFailed`] when this call's attempt failed, and
    /// [`AuthError::KeyResolutionBackoff`] when an earlier failure is still inside the
    /// retry interval (no request is made in that case).
    pub async fn keys(&self) -> std::result::Result<Arc<ResolvedKeys>, AuthError> {
        if let Some(resolved) = self.resolved.get() {
            return Ok(resolved.clone());
        }

        let mut last_failure = self.last_failure.lock().await;

        // Another caller may have finished while we waited for the lock.
        if let Some(resolved) = self.resolved.get() {
            return Ok(resolved.clone());
        }

        if let Some(failure) = last_failure.as_ref() {
            let elapsed = failure.at.elapsed();
            if elapsed < self.settings.retry_interval {
                let seconds_remaining = ceil_secs(self.settings.retry_interval - elapsed);
                warn!(
                    location = ?self.location,
                    seconds_remaining,
                    cause = %failure.cause,
                    "key resolution in retry backoff"
                );
                return Err(AuthError::KeyResolutionBackoff {
                    cause: failure.cause.clone(),
                    seconds_remaining,
                });
            }
        }

        match self.resolve().await {
            Ok(resolved) => {
                info!(
                    jwks_uri = %resolved.jwks_uri,
                    keys = resolved.keys.len(),
                    "resolved signing keys"
                );
                let resolved = Arc::new(resolved);
                // The lock is held, so nobody else can have set the cell.
                let _ = self.resolved.set(resolved.clone());
                *last_failure = None;
                Ok(resolved)
            }
            Err(err) => {
                let cause = err.to_string();
                warn!(location = ?self.location, %cause, "key resolution failed");
                *last_failure = Some(FailureMarker {
                    at: Instant::now(),
                    cause: cause.clone(),
                });
                Err(AuthError::KeyResolutionFailed { cause })
            }
        }
    }

    async fn resolve(&self) -> std::result::Result<ResolvedKeys, ResolveError> {
        let jwks_uri = match &self.location {
            KeyLocation::JwksUrl(url) => url.clone(),
            KeyLocation::Discovery(discovery_uri) => {
                let doc = self.fetch_json(discovery_uri).await?;
                doc.get("jwks_uri")
                    .and_then(Value::as_str)
                    .filter(|s| !s.trim().is_empty())
                    .ok_or_else(|| ResolveError::MissingJwksUri(discovery_uri.clone()))?
                    .to_string()
            }
        };

        let doc = self.fetch_json(&jwks_uri).await?;
        let set: JwksSet = serde_json::from_value(doc).map_err(|source| ResolveError::Json {
            url: jwks_uri.clone(),
            source,
        })?;
        let keys = KeySet::from_jwks(&set).map_err(ResolveError::Keys)?;
        Ok(ResolvedKeys { jwks_uri, keys })
    }

    async fn fetch_json(&self, url: &str) -> std::result::Result<Value, ResolveError> {
        debug!(%url, "fetching");
        let http = |source| ResolveError::Http {
            url: url.to_string(),
            source,
        };
        let resp = self.client.get(url).send().await.map_err(http)?;
        if !resp.status().is_success() {
            return Err(ResolveError::Status {
                url: url.to_string(),
                status: resp.status(),
            });
        }
        let text = resp.text().await.map_err(http)?;
        serde_json::from_str(&text).map_err(|source| ResolveError::Json {
            url: url.to_string(),
            source,
        })
    }
}

fn ceil_secs(d: Duration) -> u64 {
    d.as_secs() + u64::from(d.subsec_nanos() > 0)
}
