// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Keycloak service credentials for outbound service-to-service calls.
//!
//! A single shared slot holds the last access token obtained with the
//! configured client grant. The slot expires lazily; there is no background
//! refresh.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::Client;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::auth::AuthError;
use crate::config::{ConfigError, KeycloakConfig, DEFAULT_GRANT_TYPE};

const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TokenFetchError {
    #[error("Keycloak token request failed: {0}")]
    Request(String),

    #[error("Keycloak token request returned HTTP {status} {body}")]
    Status { status: u16, body: String },

    #[error("Keycloak token response did not include access_token: {body}")]
    MissingAccessToken { body: String },

    #[error("Keycloak token response was invalid: {0}")]
    InvalidResponse(String),
}

#[derive(Clone)]
struct CachedToken {
    access_token: String,
    expires_at: Instant,
}

impl CachedToken {
    fn is_fresh(&self) -> bool {
        Instant::now() < self.expires_at
    }
}

/// Obtains and caches a client-credentials access token.
#[derive(Clone)]
pub struct ServiceTokenCache {
    http: Client,
    auth_url: String,
    client_id: String,
    client_secret: Option<String>,
    scope: Option<String>,
    grant_type: String,
    slot: Arc<RwLock<Option<CachedToken>>>,
}

impl fmt::Debug for ServiceTokenCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceTokenCache")
            .field("auth_url", &self.auth_url)
            .field("client_id", &self.client_id)
            .field("client_secret", &self.client_secret.as_ref().map(|_| "<redacted>"))
            .field("scope", &self.scope)
            .field("grant_type", &self.grant_type)
            .finish()
    }
}

impl ServiceTokenCache {
    pub fn new(
        auth_url: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: Option<String>,
    ) -> Result<Self, TokenFetchError> {
        let http = Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| TokenFetchError::Request(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            auth_url: auth_url.into(),
            client_id: client_id.into(),
            client_secret,
            scope: None,
            grant_type: DEFAULT_GRANT_TYPE.to_string(),
            slot: Arc::new(RwLock::new(None)),
        })
    }

    /// Build from `auth_url`, `client_id`, `client_secret`, `scope` and
    /// `grant_type`. `auth_url` and `client_id` are required.
    pub fn from_config(config: &KeycloakConfig) -> Result<Self, AuthError> {
        let auth_url = config
            .auth_url
            .clone()
            .ok_or_else(|| ConfigError::Missing("KEYCLOAK_AUTH_URL".to_string()))?;
        let client_id = config
            .client_id
            .clone()
            .ok_or_else(|| ConfigError::Missing("KEYCLOAK_CLIENT_ID".to_string()))?;

        let cache = Self::new(auth_url, client_id, config.client_secret.clone())?
            .with_grant_type(config.grant_type.clone());
        Ok(match &config.scope {
            Some(scope) => cache.with_scope(scope.clone()),
            None => cache,
        })
    }

    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }

    pub fn with_grant_type(mut self, grant_type: impl Into<String>) -> Self {
        self.grant_type = grant_type.into();
        self
    }

    pub fn auth_url(&self) -> &str {
        &self.auth_url
    }

    /// Return the cached token, fetching a new one when absent or expired.
    pub async fn get_token(&self) -> Result<String, TokenFetchError> {
        if let Some(cached) = self.slot.read().await.as_ref() {
            if cached.is_fresh() {
                return Ok(cached.access_token.clone());
            }
        }

        let mut slot = self.slot.write().await;
        // Another caller may have refilled the slot while we waited
        if let Some(cached) = slot.as_ref() {
            if cached.is_fresh() {
                return Ok(cached.access_token.clone());
            }
        }

        let (access_token, expires_in) = self.fetch().await?;
        *slot = expires_in.map(|ttl| CachedToken {
            access_token: access_token.clone(),
            expires_at: Instant::now() + ttl,
        });

        info!(
            client_id = %self.client_id,
            expires_in = ?expires_in.map(|ttl| ttl.as_secs()),
            "Obtained Keycloak service token"
        );
        Ok(access_token)
    }

    /// Drop the cached token.
    pub async fn invalidate(&self) {
        self.slot.write().await.take();
    }

    /// Whether a fresh token is cached.
    pub async fn is_cached(&self) -> bool {
        self.slot
            .read()
            .await
            .as_ref()
            .is_some_and(CachedToken::is_fresh)
    }

    async fn fetch(&self) -> Result<(String, Option<Duration>), TokenFetchError> {
        let mut form = HashMap::new();
        form.insert("grant_type".to_string(), self.grant_type.clone());
        form.insert("client_id".to_string(), self.client_id.clone());
        if let Some(secret) = &self.client_secret {
            form.insert("client_secret".to_string(), secret.clone());
        }
        if let Some(scope) = &self.scope {
            form.insert("scope".to_string(), scope.clone());
        }

        debug!(auth_url = %self.auth_url, "Requesting Keycloak service token");
        let response = self
            .http
            .post(&self.auth_url)
            .form(&form)
            .send()
            .await
            .map_err(|e| TokenFetchError::Request(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| TokenFetchError::Request(e.to_string()))?;

        if !status.is_success() {
            return Err(TokenFetchError::Status {
                status: status.as_u16(),
                body,
            });
        }

        parse_token_response(&body)
    }
}

/// Extract `access_token` and `expires_in` from a token endpoint response.
fn parse_token_response(body: &str) -> Result<(String, Option<Duration>), TokenFetchError> {
    let value: Value =
        serde_json::from_str(body).map_err(|e| TokenFetchError::InvalidResponse(e.to_string()))?;

    let access_token = value
        .get("access_token")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or_else(|| TokenFetchError::MissingAccessToken {
            body: body.to_string(),
        })?;

    // Some servers send expires_in as a string
    let expires_in = value.get("expires_in").and_then(|v| match v {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    });

    Ok((access_token.to_string(), expires_in.map(Duration::from_secs)))
}
