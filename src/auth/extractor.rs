// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Axum extractors for Keycloak-authenticated requests.
//!
//! Use the `Auth` extractor in handlers to require authentication:
//!
//! ```rust,ignore
//! async fn my_handler(Auth(guard): Auth<InMemoryUserStore>) -> impl IntoResponse {
//!     // guard.user(), guard.roles(true), guard.has_scope("profile") ...
//! }
//! ```
//!
//! The router state must provide a [`KeycloakGuard`] through `FromRef`.

use axum::{
    extract::{FromRef, FromRequestParts},
    http::{header::AUTHORIZATION, request::Parts},
};

use super::error::AuthError;
use super::guard::{Guard, KeycloakGuard};
use super::user::UserProvider;

/// Find the bearer token for a request.
///
/// Resolution order:
/// 1. `Authorization: Bearer <token>` (scheme is case-insensitive)
/// 2. the query parameter named `input_key`
/// 3. the raw `Authorization` header value
///
/// Returns an empty string when none is present.
pub fn token_from_parts(parts: &Parts, input_key: Option<&str>) -> String {
    let header = parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .map(str::trim);

    if let Some(token) = header.and_then(bearer_token) {
        return token.to_string();
    }

    if let Some(key) = input_key {
        let from_query = parts.uri.query().and_then(|query| {
            url::form_urlencoded::parse(query.as_bytes())
                .find(|(name, _)| name == key)
                .map(|(_, value)| value.into_owned())
                .filter(|value| !value.trim().is_empty())
        });
        if let Some(token) = from_query {
            return token;
        }
    }

    header.unwrap_or_default().to_string()
}

fn bearer_token(header: &str) -> Option<&str> {
    let (scheme, token) = header.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

/// Extractor for authenticated requests.
///
/// Rejects with [`AuthError`] when the token is missing, invalid, lacks the
/// allowed resource roles, or maps to no local user.
pub struct Auth<P: UserProvider>(pub Guard<P>);

impl<S, P> FromRequestParts<S> for Auth<P>
where
    S: Send + Sync,
    P: UserProvider,
    KeycloakGuard<P>: FromRef<S>,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        // A guard installed earlier in the stack wins
        if let Some(guard) = parts.extensions.get::<Guard<P>>().cloned() {
            if guard.check() {
                return Ok(Auth(guard));
            }
        }

        let keycloak = KeycloakGuard::<P>::from_ref(state);
        let token = token_from_parts(parts, keycloak.input_key());
        let guard = keycloak.authenticate(&token).await?;

        parts.extensions.insert(guard.clone());
        Ok(Auth(guard))
    }
}

/// Optional authentication extractor.
///
/// Yields a guest guard when the request carries no token. A token that is
/// present but fails verification or authorization is still rejected.
pub struct OptionalAuth<P: UserProvider>(pub Guard<P>);

impl<S, P> FromRequestParts<S> for OptionalAuth<P>
where
    S: Send + Sync,
    P: UserProvider,
    KeycloakGuard<P>: FromRef<S>,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        if let Some(guard) = parts.extensions.get::<Guard<P>>().cloned() {
            return Ok(OptionalAuth(guard));
        }

        let keycloak = KeycloakGuard::<P>::from_ref(state);
        let token = token_from_parts(parts, keycloak.input_key());
        let guard = keycloak.authenticate_optional(&token).await?;

        parts.extensions.insert(guard.clone());
        Ok(OptionalAuth(guard))
    }
}
