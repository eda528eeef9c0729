// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Authentication and authorization errors.
//!
//! Failures are split by class so callers can tell "bad credentials" apart
//! from "identity provider unavailable":
//!
//! - [`TokenError`]: the bearer token itself is unusable (401)
//! - [`AuthorizationError`]: the token is valid but grants no access (403/401)
//! - [`KeyFetchError`]: realm signing keys could not be obtained (503)
//! - [`TokenFetchError`]: the service credential grant failed (502)

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::config::ConfigError;
use crate::providers::keycloak::TokenFetchError;

/// The bearer token could not be turned into verified claims.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    /// No token was supplied.
    #[error("Token is empty")]
    Empty,
    /// Not a structurally valid signed token.
    #[error("Token is malformed: {0}")]
    Malformed(String),
    /// Signature does not verify against the realm key.
    #[error("Token signature is invalid")]
    SignatureInvalid,
    /// `exp` is in the past, beyond the configured leeway.
    #[error("Token has expired")]
    Expired,
    /// `iss` differs from the configured realm issuer.
    #[error("Token issuer is invalid")]
    InvalidIssuer,
}

/// Realm signing keys could not be resolved.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KeyFetchError {
    /// Neither a static realm key nor a realm address is configured.
    #[error("No realm public key or realm address configured")]
    NotConfigured,
    /// The realm address could not be reached.
    #[error("Realm key request failed: {0}")]
    Request(String),
    /// The realm address answered with a non-success status.
    #[error("Realm key endpoint returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    /// The response carried neither `public_key` nor usable `keys`.
    #[error("Realm response did not include usable key material")]
    MissingKeyMaterial,
    /// Key material was present but could not be parsed.
    #[error("Realm key is invalid: {0}")]
    InvalidKey(String),
    /// No published key matches the token's `kid`.
    #[error("No realm key matches kid `{0}`")]
    NoMatchingKey(String),
}

/// A verified token was refused by the authorization engine.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthorizationError {
    /// The token grants none of the allowed resource roles.
    #[error(
        "The decoded JWT token has not a valid `resource_access` allowed by API. \
         Allowed resources by API: {allowed}"
    )]
    ResourceAccessDenied { allowed: String },
    /// No local user matches the token's principal.
    #[error("User not found. Credentials: {credentials}")]
    PrincipalNotFound { credentials: String },
}

/// Any failure produced while authenticating a request.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error(transparent)]
    Token(#[from] TokenError),
    #[error(transparent)]
    KeyFetch(#[from] KeyFetchError),
    #[error(transparent)]
    Authorization(#[from] AuthorizationError),
    #[error(transparent)]
    TokenFetch(#[from] TokenFetchError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

#[derive(Serialize)]
struct AuthErrorBody {
    error: String,
    error_code: String,
}

impl AuthError {
    /// Get the error code for this error.
    pub fn error_code(&self) -> &'static str {
        match self {
            AuthError::Token(TokenError::Empty) => "missing_token",
            AuthError::Token(TokenError::Malformed(_)) => "malformed_token",
            AuthError::Token(TokenError::SignatureInvalid) => "invalid_signature",
            AuthError::Token(TokenError::Expired) => "token_expired",
            AuthError::Token(TokenError::InvalidIssuer) => "invalid_issuer",
            AuthError::Authorization(AuthorizationError::ResourceAccessDenied { .. }) => {
                "resource_access_denied"
            }
            AuthError::Authorization(AuthorizationError::PrincipalNotFound { .. }) => {
                "principal_not_found"
            }
            AuthError::KeyFetch(_) => "key_fetch_error",
            AuthError::TokenFetch(_) => "token_fetch_error",
            AuthError::Config(_) => "configuration_error",
        }
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::Token(_)
            | AuthError::Authorization(AuthorizationError::PrincipalNotFound { .. }) => {
                StatusCode::UNAUTHORIZED
            }
            AuthError::Authorization(AuthorizationError::ResourceAccessDenied { .. }) => {
                StatusCode::FORBIDDEN
            }
            AuthError::KeyFetch(_) => StatusCode::SERVICE_UNAVAILABLE,
            AuthError::TokenFetch(_) => StatusCode::BAD_GATEWAY,
            AuthError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// True when the identity provider (not the caller) is at fault.
    pub fn is_infrastructure(&self) -> bool {
        matches!(self, AuthError::KeyFetch(_) | AuthError::TokenFetch(_))
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(AuthErrorBody {
            error: self.to_string(),
            error_code: self.error_code().to_string(),
        });
        (status, body).into_response()
    }
}
