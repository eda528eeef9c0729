// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Identity endpoints.

use axum::Json;
use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use crate::auth::{Auth, Guard, OptionalAuth};
use crate::store::{InMemoryUserStore, StoredUser};

/// Response for GET /me
#[derive(Debug, Serialize, ToSchema)]
pub struct MeResponse {
    /// Local user id, absent for transient users
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub user: StoredUser,
    /// Token subject
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    /// Client and realm roles
    pub roles: Vec<String>,
    pub scopes: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl From<&Guard<InMemoryUserStore>> for MeResponse {
    fn from(guard: &Guard<InMemoryUserStore>) -> Self {
        Self {
            id: guard.id(),
            user: guard
                .user()
                .map(|principal| principal.user().clone())
                .unwrap_or_default(),
            subject: guard.token().and_then(|claims| claims.sub.clone()),
            roles: guard.roles(true).into_iter().collect(),
            scopes: guard.scopes().into_iter().collect(),
            expires_at: guard.token().and_then(|claims| claims.expires_at()),
        }
    }
}

/// Response for GET /session
#[derive(Debug, Serialize, ToSchema)]
pub struct SessionResponse {
    pub authenticated: bool,
    /// Client roles of the token, empty for guests
    pub roles: Vec<String>,
}

/// Get the current authenticated identity.
///
/// Returns the resolved user together with the token's roles and scopes.
#[utoipa::path(
    get,
    path = "/me",
    tag = "Identity",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Authenticated identity", body = MeResponse),
        (status = 401, description = "Missing or invalid token, or unknown user"),
        (status = 403, description = "Token grants none of the allowed resources"),
        (status = 503, description = "Realm signing keys unavailable"),
    )
)]
pub async fn me(Auth(guard): Auth<InMemoryUserStore>) -> Json<MeResponse> {
    Json(MeResponse::from(&guard))
}

/// Describe the session, accepting anonymous callers.
#[utoipa::path(
    get,
    path = "/session",
    tag = "Identity",
    responses(
        (status = 200, description = "Session state", body = SessionResponse),
        (status = 401, description = "Token present but invalid"),
    )
)]
pub async fn session(OptionalAuth(guard): OptionalAuth<InMemoryUserStore>) -> Json<SessionResponse> {
    Json(SessionResponse {
        authenticated: guard.check(),
        roles: guard.get_roles().into_iter().collect(),
    })
}
