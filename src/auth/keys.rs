// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Realm signing key resolution and caching.
//!
//! ## Sources
//!
//! - A static realm public key from configuration is used as-is and never
//!   expires. Keycloak shows it as a bare base64 SPKI body; full PEM is
//!   accepted too.
//! - Otherwise the realm address is fetched. Keycloak's realm document
//!   (`{"realm": .., "public_key": ..}`) and JWK sets (`{"keys": [..]}`) are
//!   both understood.
//!
//! ## Caching
//!
//! Fetched keys are cached for the configured TTL (24 hours by default).
//! While one caller refreshes an expired entry, concurrent callers keep
//! using the stale entry; the last completed fetch wins. A token whose `kid`
//! is missing from a valid cached set forces a re-fetch (rotation), at most
//! once per re-fetch cooldown (30 seconds by default). Within the cooldown an
//! unknown `kid` fails straight from the cache.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use base64ct::{Base64, Encoding};
use jsonwebtoken::jwk::{AlgorithmParameters, Jwk, KeyAlgorithm, PublicKeyUse};
use jsonwebtoken::{Algorithm, DecodingKey};
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::error::KeyFetchError;
use crate::config::{KeycloakConfig, DEFAULT_KEY_CACHE_HOURS};

/// Default fetched-key cache TTL (24 hours).
const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(DEFAULT_KEY_CACHE_HOURS * 3600);

/// Minimum age of a cached key set before an unknown `kid` may re-fetch it.
const DEFAULT_REFETCH_COOLDOWN: Duration = Duration::from_secs(30);

/// Transport timeout for realm key requests.
const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Where a signing key came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeySource {
    Static,
    Fetched,
}

/// A realm public key ready for signature verification.
#[derive(Clone)]
pub struct SigningKey {
    key: DecodingKey,
    algorithm: Algorithm,
    kid: Option<String>,
    source: KeySource,
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKey")
            .field("algorithm", &self.algorithm)
            .field("kid", &self.kid)
            .field("source", &self.source)
            .finish_non_exhaustive()
    }
}

impl SigningKey {
    /// Parse a realm RSA public key, PEM or bare base64 DER.
    pub fn from_realm_public_key(raw: &str, source: KeySource) -> Result<Self, KeyFetchError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(KeyFetchError::MissingKeyMaterial);
        }

        let pem_text = if raw.starts_with("-----BEGIN") {
            raw.to_string()
        } else {
            let compact: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
            let der = Base64::decode_vec(&compact).map_err(|e| {
                KeyFetchError::InvalidKey(format!("public key is not valid base64: {e}"))
            })?;
            pem::encode(&pem::Pem::new("PUBLIC KEY", der))
        };

        let key = DecodingKey::from_rsa_pem(pem_text.as_bytes())
            .map_err(|e| KeyFetchError::InvalidKey(format!("failed to parse RSA key: {e}")))?;

        Ok(Self {
            key,
            algorithm: Algorithm::RS256,
            kid: None,
            source,
        })
    }

    /// Convert a published JWK into a signing key.
    pub fn from_jwk(jwk: &Jwk) -> Result<Self, KeyFetchError> {
        let (key, algorithm) = match &jwk.algorithm {
            AlgorithmParameters::RSA(rsa) => {
                let key = DecodingKey::from_rsa_components(&rsa.n, &rsa.e).map_err(|e| {
                    KeyFetchError::InvalidKey(format!("failed to create RSA key: {e}"))
                })?;

                let alg = match jwk.common.key_algorithm {
                    Some(KeyAlgorithm::RS384) => Algorithm::RS384,
                    Some(KeyAlgorithm::RS512) => Algorithm::RS512,
                    Some(KeyAlgorithm::PS256) => Algorithm::PS256,
                    Some(KeyAlgorithm::PS384) => Algorithm::PS384,
                    Some(KeyAlgorithm::PS512) => Algorithm::PS512,
                    _ => Algorithm::RS256,
                };
                (key, alg)
            }
            AlgorithmParameters::EllipticCurve(ec) => {
                let key = DecodingKey::from_ec_components(&ec.x, &ec.y).map_err(|e| {
                    KeyFetchError::InvalidKey(format!("failed to create EC key: {e}"))
                })?;

                let alg = match jwk.common.key_algorithm {
                    Some(KeyAlgorithm::ES384) => Algorithm::ES384,
                    _ => Algorithm::ES256,
                };
                (key, alg)
            }
            _ => {
                return Err(KeyFetchError::InvalidKey(
                    "unsupported key type in JWKS".to_string(),
                ))
            }
        };

        Ok(Self {
            key,
            algorithm,
            kid: jwk.common.key_id.clone(),
            source: KeySource::Fetched,
        })
    }

    pub fn decoding_key(&self) -> &DecodingKey {
        &self.key
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    pub fn kid(&self) -> Option<&str> {
        self.kid.as_deref()
    }

    pub fn source(&self) -> KeySource {
        self.source
    }
}

/// Fetched key set plus fetch time.
struct CacheEntry {
    keys: Vec<SigningKey>,
    fetched_at: Instant,
}

/// Resets the in-flight flag even if the refreshing future is dropped.
struct RefreshFlag<'a>(&'a AtomicBool);

impl Drop for RefreshFlag<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Resolves the realm's signing key(s).
///
/// Cheap to clone; clones share the same cache.
#[derive(Clone)]
pub struct KeyResolver {
    realm_address: Option<String>,
    static_key: Option<SigningKey>,
    cache_ttl: Duration,
    refetch_cooldown: Duration,
    cache: Arc<RwLock<Option<CacheEntry>>>,
    refreshing: Arc<AtomicBool>,
    client: reqwest::Client,
}

impl KeyResolver {
    /// Create a resolver.
    ///
    /// A static key takes precedence over the realm address. An unparsable
    /// static key is rejected here rather than on first use.
    pub fn new(
        realm_address: Option<String>,
        realm_public_key: Option<&str>,
    ) -> Result<Self, KeyFetchError> {
        let static_key = realm_public_key
            .filter(|k| !k.trim().is_empty())
            .map(|k| SigningKey::from_realm_public_key(k, KeySource::Static))
            .transpose()?;

        let client = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| KeyFetchError::Request(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            realm_address: realm_address.filter(|a| !a.trim().is_empty()),
            static_key,
            cache_ttl: DEFAULT_CACHE_TTL,
            refetch_cooldown: DEFAULT_REFETCH_COOLDOWN,
            cache: Arc::new(RwLock::new(None)),
            refreshing: Arc::new(AtomicBool::new(false)),
            client,
        })
    }

    /// Build from `realm_address`, `realm_public_key` and `key_cache_time`.
    pub fn from_config(config: &KeycloakConfig) -> Result<Self, KeyFetchError> {
        Ok(Self::new(
            config.realm_address.clone(),
            config.realm_public_key.as_deref(),
        )?
        .with_cache_ttl(config.key_cache_ttl()))
    }

    /// Create with custom cache TTL.
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    /// Minimum age of the cached key set before an unknown `kid` re-fetches.
    pub fn with_refetch_cooldown(mut self, cooldown: Duration) -> Self {
        self.refetch_cooldown = cooldown;
        self
    }

    pub fn realm_address(&self) -> Option<&str> {
        self.realm_address.as_deref()
    }

    pub fn has_static_key(&self) -> bool {
        self.static_key.is_some()
    }

    /// Resolve the key for a token with the given `kid`.
    pub async fn resolve(&self, kid: Option<&str>) -> Result<SigningKey, KeyFetchError> {
        if let Some(key) = &self.static_key {
            return Ok(key.clone());
        }

        let address = self
            .realm_address
            .as_deref()
            .ok_or(KeyFetchError::NotConfigured)?;

        {
            let cache = self.cache.read().await;
            if let Some(entry) = &*cache {
                let age = entry.fetched_at.elapsed();
                let fresh = age < self.cache_ttl;
                if fresh || self.refreshing.load(Ordering::Acquire) {
                    if let Some(key) = select_key(&entry.keys, kid) {
                        if !fresh {
                            debug!("Serving stale realm key while refresh is in flight");
                        }
                        return Ok(key);
                    }
                    if fresh && age < self.refetch_cooldown {
                        debug!(kid = ?kid, "Realm key not in recently fetched set");
                        return Err(missing_key(kid));
                    }
                    debug!(kid = ?kid, "Realm key not in cached set, re-fetching");
                }
            }
        }

        let keys = self.refresh_from(address).await?;
        select_key(&keys, kid).ok_or_else(|| missing_key(kid))
    }

    /// Force refresh the key cache.
    ///
    /// A no-op for static keys.
    pub async fn refresh(&self) -> Result<(), KeyFetchError> {
        if self.static_key.is_some() {
            return Ok(());
        }
        let address = self
            .realm_address
            .as_deref()
            .ok_or(KeyFetchError::NotConfigured)?;
        self.refresh_from(address).await.map(|_| ())
    }

    /// Check if keys are usable without a fetch.
    pub async fn is_cached(&self) -> bool {
        if self.static_key.is_some() {
            return true;
        }
        let cache = self.cache.read().await;
        cache
            .as_ref()
            .is_some_and(|entry| entry.fetched_at.elapsed() < self.cache_ttl)
    }

    async fn refresh_from(&self, address: &str) -> Result<Vec<SigningKey>, KeyFetchError> {
        self.refreshing.store(true, Ordering::Release);
        let _flag = RefreshFlag(&self.refreshing);

        let fetched_at = Instant::now();
        let keys = self.fetch_keys(address).await?;

        info!(count = keys.len(), realm = %address, "Fetched realm signing keys");

        let mut cache = self.cache.write().await;
        *cache = Some(CacheEntry {
            keys: keys.clone(),
            fetched_at,
        });
        Ok(keys)
    }

    /// Fetch key material from the realm address.
    async fn fetch_keys(&self, address: &str) -> Result<Vec<SigningKey>, KeyFetchError> {
        let response = self
            .client
            .get(address)
            .send()
            .await
            .map_err(|e| KeyFetchError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = %status, realm = %address, "Realm key endpoint returned an error");
            return Err(KeyFetchError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let document: Value = response
            .json()
            .await
            .map_err(|_| KeyFetchError::MissingKeyMaterial)?;

        parse_key_document(&document)
    }
}

/// Extract signing keys from a realm document or JWK set.
fn parse_key_document(document: &Value) -> Result<Vec<SigningKey>, KeyFetchError> {
    if let Some(public_key) = document.get("public_key").and_then(Value::as_str) {
        return Ok(vec![SigningKey::from_realm_public_key(
            public_key,
            KeySource::Fetched,
        )?]);
    }

    let Some(entries) = document.get("keys").and_then(Value::as_array) else {
        return Err(KeyFetchError::MissingKeyMaterial);
    };

    let keys: Vec<SigningKey> = entries
        .iter()
        .filter_map(|entry| match serde_json::from_value::<Jwk>(entry.clone()) {
            Ok(jwk) => Some(jwk),
            Err(e) => {
                debug!(error = %e, "Skipping unparsable JWK");
                None
            }
        })
        .filter(|jwk| !matches!(jwk.common.public_key_use, Some(PublicKeyUse::Encryption)))
        .filter_map(|jwk| match SigningKey::from_jwk(&jwk) {
            Ok(key) => Some(key),
            Err(e) => {
                debug!(kid = ?jwk.common.key_id, error = %e, "Skipping unusable JWK");
                None
            }
        })
        .collect();

    if keys.is_empty() {
        return Err(KeyFetchError::MissingKeyMaterial);
    }
    Ok(keys)
}

fn missing_key(kid: Option<&str>) -> KeyFetchError {
    match kid {
        Some(kid) => KeyFetchError::NoMatchingKey(kid.to_string()),
        None => KeyFetchError::MissingKeyMaterial,
    }
}

/// Pick the key for `kid`: exact match first, then a key without a kid.
fn select_key(keys: &[SigningKey], kid: Option<&str>) -> Option<SigningKey> {
    match kid {
        Some(kid) => keys
            .iter()
            .find(|k| k.kid.as_deref() == Some(kid))
            .or_else(|| keys.iter().find(|k| k.kid.is_none())),
        None => keys.first(),
    }
    .cloned()
}
