// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Claims carried by a Keycloak access token.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{de, Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use super::roles::{split_scopes, RoleSet, ScopeSet};

/// Roles granted at one level (realm or client).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Access {
    #[serde(default)]
    pub roles: Vec<String>,
}

/// Decoded token payload.
///
/// Standard and Keycloak-specific claims are typed; anything else is kept
/// verbatim in `extra`. Timestamp claims are normalized to whole seconds
/// whether the issuer encoded them as integers, floats or numeric strings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,

    /// Audience, either a single string or an array.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aud: Option<Value>,

    /// Authorized party (the client the token was issued to)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub azp: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_username: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    #[serde(
        default,
        deserialize_with = "timestamp",
        skip_serializing_if = "Option::is_none"
    )]
    pub exp: Option<i64>,

    #[serde(
        default,
        deserialize_with = "timestamp",
        skip_serializing_if = "Option::is_none"
    )]
    pub iat: Option<i64>,

    #[serde(
        default,
        deserialize_with = "timestamp",
        skip_serializing_if = "Option::is_none"
    )]
    pub nbf: Option<i64>,

    #[serde(
        default,
        deserialize_with = "timestamp",
        skip_serializing_if = "Option::is_none"
    )]
    pub auth_time: Option<i64>,

    /// Client roles keyed by client name
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub resource_access: BTreeMap<String, Access>,

    /// Realm-global roles
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub realm_access: Option<Access>,

    /// Space-separated OAuth scopes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Claims {
    /// Read a claim by name as a string.
    ///
    /// Numbers and booleans are stringified; objects, arrays and nulls
    /// yield `None`.
    pub fn attribute(&self, name: &str) -> Option<String> {
        let typed = match name {
            "sub" => &self.sub,
            "iss" => &self.iss,
            "azp" => &self.azp,
            "preferred_username" => &self.preferred_username,
            "email" => &self.email,
            "scope" => &self.scope,
            "exp" => return self.exp.map(|v| v.to_string()),
            "iat" => return self.iat.map(|v| v.to_string()),
            "nbf" => return self.nbf.map(|v| v.to_string()),
            "auth_time" => return self.auth_time.map(|v| v.to_string()),
            "aud" => return self.aud.as_ref().and_then(scalar_to_string),
            _ => return self.extra.get(name).and_then(scalar_to_string),
        };
        typed.clone()
    }

    /// Roles under `resource_access[client].roles`; empty if absent.
    pub fn client_roles(&self, client: &str) -> RoleSet {
        self.resource_access
            .get(client)
            .map(|access| access.roles.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Roles under `realm_access.roles`; empty if absent.
    pub fn realm_roles(&self) -> RoleSet {
        self.realm_access
            .as_ref()
            .map(|access| access.roles.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Client roles, plus realm roles when `include_global` is set.
    pub fn roles(&self, client: Option<&str>, include_global: bool) -> RoleSet {
        let mut roles = client.map(|c| self.client_roles(c)).unwrap_or_default();
        if include_global {
            roles.extend(self.realm_roles());
        }
        roles
    }

    pub fn scopes(&self) -> ScopeSet {
        self.scope.as_deref().map(split_scopes).unwrap_or_default()
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.exp.and_then(|exp| DateTime::from_timestamp(exp, 0))
    }
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn timestamp<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f.trunc() as i64))
            .map(Some)
            .ok_or_else(|| de::Error::custom(format!("timestamp out of range: {n}"))),
        Some(Value::String(s)) => s
            .trim()
            .parse::<f64>()
            .map(|f| Some(f.trunc() as i64))
            .map_err(|_| de::Error::custom(format!("invalid timestamp: {s}"))),
        Some(other) => Err(de::Error::custom(format!(
            "invalid timestamp type: {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_claims() -> Claims {
        serde_json::from_value(json!({
            "sub": "f1b2c3",
            "iss": "https://sso.example.com/realms/demo",
            "preferred_username": "jdoe",
            "exp": 1700003600,
            "iat": 1700000000.75,
            "auth_time": "1699999990",
            "resource_access": {
                "myclient": { "roles": ["admin", "viewer"] },
                "account": { "roles": ["manage-account"] }
            },
            "realm_access": { "roles": ["user", "viewer"] },
            "scope": "openid profile",
            "tenant": "acme",
            "level": 3
        }))
        .unwrap()
    }

    fn set(names: &[&str]) -> RoleSet {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn timestamps_are_coerced_to_seconds() {
        let claims = sample_claims();
        assert_eq!(claims.exp, Some(1700003600));
        assert_eq!(claims.iat, Some(1700000000));
        assert_eq!(claims.auth_time, Some(1699999990));
        assert_eq!(claims.nbf, None);
        assert_eq!(claims.expires_at().unwrap().timestamp(), 1700003600);
    }

    #[test]
    fn invalid_timestamp_is_rejected() {
        let result: Result<Claims, _> = serde_json::from_value(json!({ "exp": "tomorrow" }));
        assert!(result.is_err());
    }

    #[test]
    fn unknown_claims_pass_through() {
        let claims = sample_claims();
        assert_eq!(claims.extra.get("tenant"), Some(&json!("acme")));
        assert_eq!(claims.attribute("tenant").as_deref(), Some("acme"));
        assert_eq!(claims.attribute("level").as_deref(), Some("3"));
        assert_eq!(claims.attribute("resource_access"), None);
        assert_eq!(claims.attribute("missing"), None);
    }

    #[test]
    fn attribute_reads_typed_claims() {
        let claims = sample_claims();
        assert_eq!(claims.attribute("preferred_username").as_deref(), Some("jdoe"));
        assert_eq!(claims.attribute("sub").as_deref(), Some("f1b2c3"));
        assert_eq!(claims.attribute("exp").as_deref(), Some("1700003600"));
    }

    #[test]
    fn roles_merge_client_and_realm_levels() {
        let claims = sample_claims();
        assert_eq!(claims.client_roles("myclient"), set(&["admin", "viewer"]));
        assert_eq!(
            claims.roles(Some("myclient"), true),
            set(&["admin", "viewer", "user"])
        );
        assert_eq!(claims.roles(Some("myclient"), false), set(&["admin", "viewer"]));
        assert_eq!(claims.roles(Some("other"), true), set(&["user", "viewer"]));
        assert!(claims.roles(None, false).is_empty());
    }

    #[test]
    fn client_only_roles_never_leak_realm_roles() {
        let claims = sample_claims();
        let client = claims.client_roles("myclient");
        for role in claims.roles(Some("myclient"), false) {
            assert!(client.contains(&role));
        }
        assert!(!claims.roles(Some("myclient"), false).contains("user"));
    }

    #[test]
    fn missing_access_claims_yield_empty_sets() {
        let claims = Claims::default();
        assert!(claims.realm_roles().is_empty());
        assert!(claims.client_roles("myclient").is_empty());
        assert!(claims.scopes().is_empty());
    }

    #[test]
    fn reserialized_claims_keep_role_and_scope_sets() {
        let claims = sample_claims();
        let value = serde_json::to_value(&claims).unwrap();
        assert_eq!(value["preferred_username"], "jdoe");
        assert_eq!(value["tenant"], "acme");

        let again: Claims = serde_json::from_value(value).unwrap();
        assert_eq!(again.roles(Some("myclient"), true), claims.roles(Some("myclient"), true));
        assert_eq!(again.scopes(), claims.scopes());
        assert_eq!(again.attribute("preferred_username"), claims.attribute("preferred_username"));
    }
}
