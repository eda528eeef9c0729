// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Token decoding and verification.
//!
//! Order of checks:
//!
//! 1. blank token → `Empty` (before any parsing or key resolution)
//! 2. header parse → `Malformed` (before any key resolution)
//! 3. key resolution by `kid` → `KeyFetchError`
//! 4. signature, `exp` (with leeway) and optional `iss`

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, decode_header, Validation};

use super::claims::Claims;
use super::error::{AuthError, TokenError};
use super::keys::{KeyResolver, SigningKey};
use crate::config::KeycloakConfig;

/// Verifies bearer tokens against the realm's signing keys.
#[derive(Clone)]
pub struct TokenVerifier {
    keys: KeyResolver,
    /// Clock skew tolerance in seconds
    leeway: u64,
    issuer: Option<String>,
}

impl TokenVerifier {
    pub fn new(keys: KeyResolver) -> Self {
        Self {
            keys,
            leeway: 0,
            issuer: None,
        }
    }

    pub fn from_config(keys: KeyResolver, config: &KeycloakConfig) -> Self {
        let verifier = Self::new(keys).with_leeway(config.leeway);
        match &config.realm_issuer {
            Some(issuer) => verifier.with_issuer(issuer.clone()),
            None => verifier,
        }
    }

    pub fn with_leeway(mut self, seconds: u64) -> Self {
        self.leeway = seconds;
        self
    }

    /// Require `iss` to equal `issuer`.
    pub fn with_issuer(mut self, issuer: impl Into<String>) -> Self {
        self.issuer = Some(issuer.into());
        self
    }

    pub fn keys(&self) -> &KeyResolver {
        &self.keys
    }

    /// Decode and verify `token`.
    ///
    /// Key resolution failures surface as [`AuthError::KeyFetch`], never as
    /// a token error.
    pub async fn decode(&self, token: &str) -> Result<Claims, AuthError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(TokenError::Empty.into());
        }

        let header = decode_header(token).map_err(|e| TokenError::Malformed(e.to_string()))?;
        let key = self.keys.resolve(header.kid.as_deref()).await?;

        Ok(decode_with_key(
            token,
            &key,
            self.leeway,
            self.issuer.as_deref(),
        )?)
    }
}

/// Verify `token` against an already resolved key.
pub fn decode_with_key(
    token: &str,
    key: &SigningKey,
    leeway: u64,
    issuer: Option<&str>,
) -> Result<Claims, TokenError> {
    let token = token.trim();
    if token.is_empty() {
        return Err(TokenError::Empty);
    }

    let mut validation = Validation::new(key.algorithm());
    validation.leeway = leeway;
    validation.validate_aud = false;
    if let Some(issuer) = issuer {
        validation.set_issuer(&[issuer]);
    }

    let token_data = decode::<Claims>(token, key.decoding_key(), &validation).map_err(|e| {
        match e.kind() {
            ErrorKind::ExpiredSignature => TokenError::Expired,
            ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm => {
                TokenError::SignatureInvalid
            }
            ErrorKind::InvalidIssuer => TokenError::InvalidIssuer,
            _ => TokenError::Malformed(e.to_string()),
        }
    })?;

    Ok(token_data.claims)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::error::KeyFetchError;
    use crate::auth::keys::KeySource;
    use crate::test_support::{
        mint, mint_with, now, realm_document, scenario_claims, static_verifier, REALM_ISSUER,
        REALM_PUBLIC_PEM, ROGUE_PRIVATE_PEM,
    };
    use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
    use serde_json::json;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn realm_key() -> SigningKey {
        SigningKey::from_realm_public_key(REALM_PUBLIC_PEM, KeySource::Static).unwrap()
    }

    fn token_error(result: Result<Claims, AuthError>) -> TokenError {
        match result {
            Err(AuthError::Token(e)) => e,
            other => panic!("expected token error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn valid_token_decodes_all_claims() {
        let token = mint(&scenario_claims());
        let claims = static_verifier().decode(&token).await.unwrap();

        assert_eq!(claims.preferred_username.as_deref(), Some("jdoe"));
        assert_eq!(claims.iss.as_deref(), Some(REALM_ISSUER));
        assert_eq!(claims.scope.as_deref(), Some("openid profile"));
        assert!(claims.client_roles("myclient").contains("admin"));
    }

    #[tokio::test]
    async fn blank_token_is_empty_without_key_resolution() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(realm_document()))
            .expect(0)
            .mount(&server)
            .await;

        let verifier = TokenVerifier::new(
            KeyResolver::new(Some(format!("{}/realms/demo", server.uri())), None).unwrap(),
        );
        for blank in ["", "   ", "\n\t"] {
            assert_eq!(token_error(verifier.decode(blank).await), TokenError::Empty);
        }
    }

    #[tokio::test]
    async fn malformed_token_is_rejected_before_key_resolution() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(realm_document()))
            .expect(0)
            .mount(&server)
            .await;

        let verifier = TokenVerifier::new(
            KeyResolver::new(Some(format!("{}/realms/demo", server.uri())), None).unwrap(),
        );
        for junk in ["abc", "a.b", "!!!.###.$$$", "e30.e30.sig.extra"] {
            assert!(matches!(
                token_error(verifier.decode(junk).await),
                TokenError::Malformed(_)
            ));
        }
    }

    #[test]
    fn expired_token_is_rejected() {
        let mut claims = scenario_claims();
        claims["exp"] = json!(now() - 600);
        claims["iat"] = json!(now() - 4200);
        let token = mint(&claims);

        let err = decode_with_key(&token, &realm_key(), 0, None).unwrap_err();
        assert_eq!(err, TokenError::Expired);
    }

    #[test]
    fn leeway_absorbs_clock_skew() {
        let mut claims = scenario_claims();
        claims["exp"] = json!(now() - 30);
        let token = mint(&claims);

        assert!(decode_with_key(&token, &realm_key(), 120, None).is_ok());
        assert_eq!(
            decode_with_key(&token, &realm_key(), 0, None).unwrap_err(),
            TokenError::Expired
        );
    }

    #[test]
    fn token_signed_by_another_key_is_rejected() {
        let token = mint_with(ROGUE_PRIVATE_PEM, &scenario_claims(), None);
        let err = decode_with_key(&token, &realm_key(), 0, None).unwrap_err();
        assert_eq!(err, TokenError::SignatureInvalid);
    }

    #[test]
    fn tampered_payload_is_rejected() {
        let token = mint(&scenario_claims());
        let parts: Vec<&str> = token.split('.').collect();

        let mut claims = scenario_claims();
        claims["resource_access"]["myclient"]["roles"] = json!(["admin", "superuser"]);
        let forged_payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&claims).unwrap());
        let forged = format!("{}.{}.{}", parts[0], forged_payload, parts[2]);

        let err = decode_with_key(&forged, &realm_key(), 0, None).unwrap_err();
        assert_eq!(err, TokenError::SignatureInvalid);
    }

    #[test]
    fn tampered_signature_is_rejected() {
        let token = mint(&scenario_claims());
        let (signed, signature) = token.rsplit_once('.').unwrap();

        let mut bytes = URL_SAFE_NO_PAD.decode(signature).unwrap();
        bytes[0] ^= 0x01;
        let forged = format!("{signed}.{}", URL_SAFE_NO_PAD.encode(bytes));

        let err = decode_with_key(&forged, &realm_key(), 0, None).unwrap_err();
        assert_eq!(err, TokenError::SignatureInvalid);
    }

    #[test]
    fn algorithm_mismatch_counts_as_invalid_signature() {
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
        let payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&scenario_claims()).unwrap());
        let token = format!("{header}.{payload}.c2lnbmF0dXJl");

        let err = decode_with_key(&token, &realm_key(), 0, None).unwrap_err();
        assert_eq!(err, TokenError::SignatureInvalid);
    }

    #[test]
    fn missing_exp_is_malformed() {
        let mut claims = scenario_claims();
        claims.as_object_mut().unwrap().remove("exp");
        let token = mint(&claims);

        assert!(matches!(
            decode_with_key(&token, &realm_key(), 0, None).unwrap_err(),
            TokenError::Malformed(_)
        ));
    }

    #[tokio::test]
    async fn issuer_is_checked_when_configured() {
        let token = mint(&scenario_claims());

        let matching = static_verifier().with_issuer(REALM_ISSUER);
        assert!(matching.decode(&token).await.is_ok());

        let other = static_verifier().with_issuer("https://sso.example.com/realms/other");
        assert_eq!(token_error(other.decode(&token).await), TokenError::InvalidIssuer);
    }

    #[tokio::test]
    async fn key_fetch_failure_is_not_a_token_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let verifier = TokenVerifier::new(
            KeyResolver::new(Some(format!("{}/realms/demo", server.uri())), None).unwrap(),
        );
        let result = verifier.decode(&mint(&scenario_claims())).await;
        assert!(matches!(
            result,
            Err(AuthError::KeyFetch(KeyFetchError::Status { status: 503, .. }))
        ));
    }

    #[tokio::test]
    async fn fetched_realm_key_verifies_tokens() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(realm_document()))
            .expect(1)
            .mount(&server)
            .await;

        let verifier = TokenVerifier::new(
            KeyResolver::new(Some(format!("{}/realms/demo", server.uri())), None).unwrap(),
        );
        for _ in 0..3 {
            let claims = verifier.decode(&mint(&scenario_claims())).await.unwrap();
            assert_eq!(claims.preferred_username.as_deref(), Some("jdoe"));
        }
    }
}
