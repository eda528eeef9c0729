// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! This module defines environment variable names and default values used
//! throughout the guard. Configuration is loaded from the environment at
//! startup; every Keycloak option is read from `KEYCLOAK_<OPTION>`.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `KEYCLOAK_REALM_PUBLIC_KEY` | Static realm public key (PEM or bare base64) | Unset |
//! | `KEYCLOAK_REALM_ADDRESS` | Realm URL publishing the signing key | Unset |
//! | `KEYCLOAK_REALM_ISSUER` | Expected `iss` claim | Unchecked |
//! | `KEYCLOAK_KEY_CACHE_TIME` | Fetched key cache lifetime (hours) | `24` |
//! | `KEYCLOAK_LEEWAY` | Clock skew tolerance (seconds) | `0` |
//! | `KEYCLOAK_LOAD_USER_FROM_DATABASE` | Resolve a local user record | `true` |
//! | `KEYCLOAK_USER_PROVIDER_CUSTOM_RETRIEVE_METHOD` | Named custom lookup | Unset |
//! | `KEYCLOAK_USER_PROVIDER_CREDENTIAL` | Credential field for lookups | `username` |
//! | `KEYCLOAK_TOKEN_PRINCIPAL_ATTRIBUTE` | Claim holding the principal | `preferred_username` |
//! | `KEYCLOAK_APPEND_DECODED_TOKEN` | Attach claims to the principal | `false` |
//! | `KEYCLOAK_ALLOWED_RESOURCES` | Comma-separated allowed resource roles | Unset |
//! | `KEYCLOAK_IGNORE_RESOURCES_VALIDATION` | Skip the resource gate | `false` |
//! | `KEYCLOAK_CLIENT_NAME` | `resource_access` key for roles | `KEYCLOAK_CLIENT_ID` |
//! | `KEYCLOAK_CLIENT_ID` | OAuth client id | Unset |
//! | `KEYCLOAK_CLIENT_SECRET` | OAuth client secret | Unset |
//! | `KEYCLOAK_SCOPE` | Scope for the client-credentials grant | Unset |
//! | `KEYCLOAK_GRANT_TYPE` | Grant type for service tokens | `client_credentials` |
//! | `KEYCLOAK_AUTH_URL` | Token endpoint for service tokens | Unset |
//! | `KEYCLOAK_INPUT_KEY` | Query parameter carrying the token | Unset |
//! | `HOST` | Server bind address | `0.0.0.0` |
//! | `PORT` | Server bind port | `8080` |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info,tower_http=debug` |

use std::fmt;
use std::time::Duration;

use serde::Deserialize;

/// Prefix shared by every Keycloak option.
pub const KEYCLOAK_ENV_PREFIX: &str = "KEYCLOAK_";

/// Environment variable name for the server bind address.
pub const HOST_ENV: &str = "HOST";

/// Environment variable name for the server bind port.
pub const PORT_ENV: &str = "PORT";

/// Environment variable selecting `json` or `pretty` log output.
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";

/// Log filter used when `RUST_LOG` is unset.
pub const DEFAULT_LOG_FILTER: &str = "info,tower_http=debug";

/// Fetched realm keys are cached this many hours unless overridden.
pub const DEFAULT_KEY_CACHE_HOURS: u64 = 24;

pub const DEFAULT_USER_PROVIDER_CREDENTIAL: &str = "username";
pub const DEFAULT_TOKEN_PRINCIPAL_ATTRIBUTE: &str = "preferred_username";
pub const DEFAULT_GRANT_TYPE: &str = "client_credentials";

/// Configuration could not be loaded.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value `{value}` for {name}: {reason}")]
    Invalid {
        name: String,
        value: String,
        reason: String,
    },
    #[error("Missing required configuration: {0}")]
    Missing(String),
    #[error("Unknown user provider retrieve method `{0}`")]
    UnknownRetrieveMethod(String),
}

/// Recognized Keycloak guard options.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct KeycloakConfig {
    pub realm_public_key: Option<String>,
    pub realm_address: Option<String>,
    pub realm_issuer: Option<String>,
    /// Hours.
    pub key_cache_time: u64,
    /// Seconds.
    pub leeway: u64,
    pub load_user_from_database: bool,
    pub user_provider_custom_retrieve_method: Option<String>,
    pub user_provider_credential: String,
    pub token_principal_attribute: String,
    pub append_decoded_token: bool,
    /// Raw comma-separated list, see [`KeycloakConfig::allowed_resources`].
    pub allowed_resources: Option<String>,
    pub ignore_resources_validation: bool,
    pub client_name: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub scope: Option<String>,
    pub grant_type: String,
    pub auth_url: Option<String>,
    pub input_key: Option<String>,
}

impl Default for KeycloakConfig {
    fn default() -> Self {
        Self {
            realm_public_key: None,
            realm_address: None,
            realm_issuer: None,
            key_cache_time: DEFAULT_KEY_CACHE_HOURS,
            leeway: 0,
            load_user_from_database: true,
            user_provider_custom_retrieve_method: None,
            user_provider_credential: DEFAULT_USER_PROVIDER_CREDENTIAL.to_string(),
            token_principal_attribute: DEFAULT_TOKEN_PRINCIPAL_ATTRIBUTE.to_string(),
            append_decoded_token: false,
            allowed_resources: None,
            ignore_resources_validation: false,
            client_name: None,
            client_id: None,
            client_secret: None,
            scope: None,
            grant_type: DEFAULT_GRANT_TYPE.to_string(),
            auth_url: None,
            input_key: None,
        }
    }
}

impl fmt::Debug for KeycloakConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeycloakConfig")
            .field("realm_address", &self.realm_address)
            .field("realm_issuer", &self.realm_issuer)
            .field("has_realm_public_key", &self.realm_public_key.is_some())
            .field("key_cache_time", &self.key_cache_time)
            .field("leeway", &self.leeway)
            .field("load_user_from_database", &self.load_user_from_database)
            .field(
                "user_provider_custom_retrieve_method",
                &self.user_provider_custom_retrieve_method,
            )
            .field("user_provider_credential", &self.user_provider_credential)
            .field("token_principal_attribute", &self.token_principal_attribute)
            .field("append_decoded_token", &self.append_decoded_token)
            .field("allowed_resources", &self.allowed_resources)
            .field(
                "ignore_resources_validation",
                &self.ignore_resources_validation,
            )
            .field("client_name", &self.client_name)
            .field("client_id", &self.client_id)
            .field("client_secret", &self.client_secret.as_ref().map(|_| "<redacted>"))
            .field("scope", &self.scope)
            .field("grant_type", &self.grant_type)
            .field("auth_url", &self.auth_url)
            .field("input_key", &self.input_key)
            .finish()
    }
}

impl KeycloakConfig {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    ///
    /// `lookup` receives full variable names (`KEYCLOAK_LEEWAY`, ...). Blank
    /// values are treated as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |option: &str| -> Option<(String, String)> {
            let name = format!("{KEYCLOAK_ENV_PREFIX}{}", option.to_ascii_uppercase());
            lookup(&name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .map(|v| (name, v))
        };
        let string = |option: &str| get(option).map(|(_, v)| v);

        let defaults = Self::default();
        Ok(Self {
            realm_public_key: string("realm_public_key"),
            realm_address: string("realm_address"),
            realm_issuer: string("realm_issuer"),
            key_cache_time: get("key_cache_time")
                .map(|(name, v)| parse_u64(&name, &v))
                .transpose()?
                .unwrap_or(defaults.key_cache_time),
            leeway: get("leeway")
                .map(|(name, v)| parse_u64(&name, &v))
                .transpose()?
                .unwrap_or(defaults.leeway),
            load_user_from_database: get("load_user_from_database")
                .map(|(name, v)| parse_bool(&name, &v))
                .transpose()?
                .unwrap_or(defaults.load_user_from_database),
            user_provider_custom_retrieve_method: string("user_provider_custom_retrieve_method"),
            user_provider_credential: string("user_provider_credential")
                .unwrap_or(defaults.user_provider_credential),
            token_principal_attribute: string("token_principal_attribute")
                .unwrap_or(defaults.token_principal_attribute),
            append_decoded_token: get("append_decoded_token")
                .map(|(name, v)| parse_bool(&name, &v))
                .transpose()?
                .unwrap_or(defaults.append_decoded_token),
            allowed_resources: string("allowed_resources"),
            ignore_resources_validation: get("ignore_resources_validation")
                .map(|(name, v)| parse_bool(&name, &v))
                .transpose()?
                .unwrap_or(defaults.ignore_resources_validation),
            client_name: string("client_name"),
            client_id: string("client_id"),
            client_secret: string("client_secret"),
            scope: string("scope"),
            grant_type: string("grant_type").unwrap_or(defaults.grant_type),
            auth_url: string("auth_url"),
            input_key: string("input_key"),
        })
    }

    /// Allowed resource roles, split on commas with blanks dropped.
    pub fn allowed_resources(&self) -> Vec<&str> {
        self.allowed_resources
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect()
    }

    /// Key under `resource_access` holding this service's client roles.
    ///
    /// Independent of [`token_principal_attribute`](Self::token_principal_attribute);
    /// falls back to `client_id` when no explicit client name is set.
    pub fn client_name(&self) -> Option<&str> {
        self.client_name.as_deref().or(self.client_id.as_deref())
    }

    /// Lifetime of fetched realm keys.
    pub fn key_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.key_cache_time.saturating_mul(3600))
    }
}

fn parse_u64(name: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse().map_err(|e| ConfigError::Invalid {
        name: name.to_string(),
        value: value.to_string(),
        reason: format!("{e}"),
    })
}

fn parse_bool(name: &str, value: &str) -> Result<bool, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid {
            name: name.to_string(),
            value: value.to_string(),
            reason: "expected a boolean".to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<KeycloakConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        KeycloakConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn defaults_match_documented_values() {
        let config = load(&[]).unwrap();
        assert_eq!(config.key_cache_time, 24);
        assert_eq!(config.leeway, 0);
        assert!(config.load_user_from_database);
        assert_eq!(config.user_provider_credential, "username");
        assert_eq!(config.token_principal_attribute, "preferred_username");
        assert!(!config.append_decoded_token);
        assert!(!config.ignore_resources_validation);
        assert_eq!(config.grant_type, "client_credentials");
        assert!(config.allowed_resources().is_empty());
        assert_eq!(config.key_cache_ttl(), Duration::from_secs(24 * 3600));
    }

    #[test]
    fn deserializes_partial_documents_with_defaults() {
        let config: KeycloakConfig = serde_json::from_value(serde_json::json!({
            "realm_address": "https://sso.example.com/realms/demo",
            "leeway": 30,
        }))
        .unwrap();

        assert_eq!(
            config.realm_address.as_deref(),
            Some("https://sso.example.com/realms/demo")
        );
        assert_eq!(config.leeway, 30);
        assert_eq!(config.key_cache_time, 24);
        assert!(config.load_user_from_database);
        assert_eq!(config.user_provider_credential, "username");
        assert_eq!(config.token_principal_attribute, "preferred_username");
        assert_eq!(config.grant_type, "client_credentials");
        assert!(config.realm_public_key.is_none());
    }

    #[test]
    fn reads_prefixed_variables() {
        let config = load(&[
            ("KEYCLOAK_REALM_ADDRESS", "https://sso.example.com/realms/demo"),
            ("KEYCLOAK_LEEWAY", "30"),
            ("KEYCLOAK_LOAD_USER_FROM_DATABASE", "false"),
            ("KEYCLOAK_APPEND_DECODED_TOKEN", "yes"),
            ("KEYCLOAK_ALLOWED_RESOURCES", "api, admin ,,"),
            ("KEYCLOAK_TOKEN_PRINCIPAL_ATTRIBUTE", "sub"),
        ])
        .unwrap();

        assert_eq!(
            config.realm_address.as_deref(),
            Some("https://sso.example.com/realms/demo")
        );
        assert_eq!(config.leeway, 30);
        assert!(!config.load_user_from_database);
        assert!(config.append_decoded_token);
        assert_eq!(config.allowed_resources(), vec!["api", "admin"]);
        assert_eq!(config.token_principal_attribute, "sub");
    }

    #[test]
    fn blank_values_are_unset() {
        let config = load(&[("KEYCLOAK_REALM_PUBLIC_KEY", "   "), ("KEYCLOAK_GRANT_TYPE", "")])
            .unwrap();
        assert!(config.realm_public_key.is_none());
        assert_eq!(config.grant_type, "client_credentials");
    }

    #[test]
    fn client_name_falls_back_to_client_id() {
        let config = load(&[("KEYCLOAK_CLIENT_ID", "backend")]).unwrap();
        assert_eq!(config.client_name(), Some("backend"));

        let config = load(&[
            ("KEYCLOAK_CLIENT_ID", "backend"),
            ("KEYCLOAK_CLIENT_NAME", "myclient"),
        ])
        .unwrap();
        assert_eq!(config.client_name(), Some("myclient"));
    }

    #[test]
    fn invalid_values_are_rejected() {
        let err = load(&[("KEYCLOAK_KEY_CACHE_TIME", "soon")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { ref name, .. } if name == "KEYCLOAK_KEY_CACHE_TIME"));

        let err = load(&[("KEYCLOAK_IGNORE_RESOURCES_VALIDATION", "maybe")]).unwrap_err();
        assert!(err.to_string().contains("expected a boolean"));
    }

    #[test]
    fn debug_redacts_client_secret() {
        let config = load(&[("KEYCLOAK_CLIENT_SECRET", "s3cr3t")]).unwrap();
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("s3cr3t"));
        assert!(rendered.contains("<redacted>"));
    }
}
