// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::Arc;

use axum::extract::FromRef;

use crate::auth::KeycloakGuard;
use crate::providers::ServiceTokenCache;
use crate::store::InMemoryUserStore;

#[derive(Clone)]
pub struct AppState {
    pub keycloak: KeycloakGuard<InMemoryUserStore>,
    pub users: Arc<InMemoryUserStore>,
    /// Present when `KEYCLOAK_AUTH_URL` is configured.
    pub service_tokens: Option<Arc<ServiceTokenCache>>,
}

impl AppState {
    pub fn new(keycloak: KeycloakGuard<InMemoryUserStore>, users: Arc<InMemoryUserStore>) -> Self {
        Self {
            keycloak,
            users,
            service_tokens: None,
        }
    }

    pub fn with_service_tokens(mut self, cache: ServiceTokenCache) -> Self {
        self.service_tokens = Some(Arc::new(cache));
        self
    }
}

impl FromRef<AppState> for KeycloakGuard<InMemoryUserStore> {
    fn from_ref(state: &AppState) -> Self {
        state.keycloak.clone()
    }
}
