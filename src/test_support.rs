// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Shared fixtures for unit tests: realm keys, token minting, configs.

use std::sync::Arc;

use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde_json::{json, Value};

use crate::auth::{Authorizer, KeyResolver, KeycloakGuard, RetrieveMethod, TokenVerifier};
use crate::config::KeycloakConfig;
use crate::store::InMemoryUserStore;

pub const REALM_PRIVATE_PEM: &str = include_str!("testdata/realm_private.pem");
pub const REALM_PUBLIC_PEM: &str = include_str!("testdata/realm_public.pem");
pub const ROGUE_PRIVATE_PEM: &str = include_str!("testdata/rogue_private.pem");

pub const REALM_KID: &str = "realm-key-1";
pub const REALM_ISSUER: &str = "https://sso.example.com/realms/demo";

/// Modulus of the realm key, base64url.
const REALM_MODULUS: &str = "ssMXJOC1SHkHBeQCBqTcl5Ey8sWI01HfZR7VPVSaanuR6ZpAwA-oLOaGTDApKkrQNWi3y1biKacBqP6XUgqiIhNazGKaINZ6Q9xu7-TiSYtpasi8grnXztQPdRRDlGr6aafVxTqsDQiHXS-40Sr4dqCsVWxK12Bph6fZj4snJlX-49Rk8RYQnxhoOng96hU1XBP04-tAmEEpRum1IDeiq0ch0Ehr0RuuirZN0400NMIpKBpb1Dq0xDMU1XhbyV2f3ialATGVMf9cXtGtjKulT9qGWPf2frqX5flne5HOcNdRwl8omEzYlx67pBwkPM8N0ENgx_TDbsSn8XMdYi-3Nw";

pub fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

/// The realm public key as Keycloak displays it: base64 body, no armor.
pub fn realm_public_key_base64() -> String {
    REALM_PUBLIC_PEM
        .lines()
        .filter(|line| !line.starts_with("-----"))
        .collect()
}

/// Keycloak realm document publishing the realm key.
pub fn realm_document() -> Value {
    json!({
        "realm": "demo",
        "public_key": realm_public_key_base64(),
        "token-service": format!("{REALM_ISSUER}/protocol/openid-connect"),
        "tokens-not-before": 0
    })
}

/// JWK set publishing the realm key under [`REALM_KID`].
pub fn realm_jwks() -> Value {
    json!({
        "keys": [{
            "kid": REALM_KID,
            "kty": "RSA",
            "alg": "RS256",
            "use": "sig",
            "n": REALM_MODULUS,
            "e": "AQAB"
        }]
    })
}

/// Claims for the end-to-end scenario, valid for an hour.
pub fn scenario_claims() -> Value {
    json!({
        "sub": "2c1c4a8e-5a7d-4f5b-9d55-0d6f0b1f9e21",
        "iss": REALM_ISSUER,
        "preferred_username": "jdoe",
        "email": "jdoe@example.com",
        "iat": now(),
        "exp": now() + 3600,
        "resource_access": {
            "myclient": { "roles": ["admin", "viewer"] }
        },
        "realm_access": { "roles": ["user"] },
        "scope": "openid profile"
    })
}

/// Sign `claims` with the realm key.
pub fn mint(claims: &Value) -> String {
    mint_with(REALM_PRIVATE_PEM, claims, Some(REALM_KID))
}

pub fn mint_with(private_pem: &str, claims: &Value, kid: Option<&str>) -> String {
    let mut header = Header::new(Algorithm::RS256);
    header.kid = kid.map(str::to_string);
    let key = EncodingKey::from_rsa_pem(private_pem.as_bytes()).unwrap();
    encode(&header, claims, &key).unwrap()
}

/// Config for the `myclient` scenario without database lookups.
pub fn scenario_config() -> KeycloakConfig {
    KeycloakConfig {
        realm_public_key: Some(REALM_PUBLIC_PEM.to_string()),
        client_name: Some("myclient".to_string()),
        allowed_resources: Some("myclient,admin".to_string()),
        load_user_from_database: false,
        ..KeycloakConfig::default()
    }
}

pub fn static_verifier() -> TokenVerifier {
    TokenVerifier::new(KeyResolver::new(None, Some(REALM_PUBLIC_PEM)).unwrap())
}

/// Guard over an in-memory store, verifying with the static realm key.
pub fn guard_with(
    config: KeycloakConfig,
    store: Arc<InMemoryUserStore>,
    retrieve: RetrieveMethod<crate::store::StoredUser>,
) -> KeycloakGuard<InMemoryUserStore> {
    let config = Arc::new(config);
    let authorizer = Authorizer::new(Arc::clone(&config), store, retrieve);
    KeycloakGuard::new(static_verifier(), authorizer).with_input_key(config.input_key.clone())
}
