// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Authorization of verified tokens.
//!
//! Steps, strictly in order, stopping at the first failure:
//!
//! 1. resource gate: client roles ∩ allowed resources must be non-empty
//! 2. principal derivation from the configured claim
//! 3. principal resolution through the user store (or a transient user)
//! 4. optional attachment of the decoded token

use std::sync::Arc;

use tracing::debug;

use super::claims::Claims;
use super::error::AuthorizationError;
use super::user::{Credentials, RetrieveMethod, UserProvider};
use crate::config::KeycloakConfig;

/// The identity a request was authenticated as.
#[derive(Debug, Clone)]
pub struct AuthenticatedPrincipal<U> {
    user: U,
    token: Option<Arc<Claims>>,
}

impl<U> AuthenticatedPrincipal<U> {
    pub fn new(user: U, token: Option<Arc<Claims>>) -> Self {
        Self { user, token }
    }

    pub fn user(&self) -> &U {
        &self.user
    }

    /// Decoded token, present only with `append_decoded_token`.
    pub fn token(&self) -> Option<&Claims> {
        self.token.as_deref()
    }

    pub fn into_user(self) -> U {
        self.user
    }
}

/// Turns verified claims into an [`AuthenticatedPrincipal`].
pub struct Authorizer<P: UserProvider> {
    config: Arc<KeycloakConfig>,
    provider: Arc<P>,
    retrieve: RetrieveMethod<P::User>,
}

impl<P: UserProvider> Authorizer<P> {
    pub fn new(
        config: Arc<KeycloakConfig>,
        provider: Arc<P>,
        retrieve: RetrieveMethod<P::User>,
    ) -> Self {
        Self {
            config,
            provider,
            retrieve,
        }
    }

    pub fn config(&self) -> &KeycloakConfig {
        &self.config
    }

    /// `resource_access` key used for client roles.
    pub fn client_name(&self) -> Option<&str> {
        self.config.client_name()
    }

    /// Credentials derived from the principal attribute claim.
    ///
    /// Empty when the claim is absent.
    pub fn credentials_for(&self, claims: &Claims) -> Credentials {
        claims
            .attribute(&self.config.token_principal_attribute)
            .map(|value| {
                Credentials::from([(self.config.user_provider_credential.clone(), value)])
            })
            .unwrap_or_default()
    }

    /// Authorize claims using credentials derived from the token.
    pub async fn authorize(
        &self,
        claims: Arc<Claims>,
    ) -> Result<AuthenticatedPrincipal<P::User>, AuthorizationError> {
        let credentials = self.credentials_for(&claims);
        self.validate(claims, &credentials).await
    }

    /// Authorize claims against explicit credentials.
    pub async fn validate(
        &self,
        claims: Arc<Claims>,
        credentials: &Credentials,
    ) -> Result<AuthenticatedPrincipal<P::User>, AuthorizationError> {
        self.validate_resources(&claims)?;
        let user = self.resolve_user(&claims, credentials).await?;
        Ok(self.principal(user, claims))
    }

    /// Wrap `user`, attaching claims when configured.
    pub fn principal(&self, user: P::User, claims: Arc<Claims>) -> AuthenticatedPrincipal<P::User> {
        let token = self.config.append_decoded_token.then_some(claims);
        AuthenticatedPrincipal::new(user, token)
    }

    /// Resource gate; must run before any user lookup.
    pub fn validate_resources(&self, claims: &Claims) -> Result<(), AuthorizationError> {
        if self.config.ignore_resources_validation {
            return Ok(());
        }

        let granted = self
            .client_name()
            .map(|client| claims.client_roles(client))
            .unwrap_or_default();
        let allowed = self.config.allowed_resources();

        if allowed.iter().any(|resource| granted.contains(*resource)) {
            return Ok(());
        }

        debug!(
            client = ?self.client_name(),
            granted = ?granted,
            "Token grants none of the allowed resources"
        );
        Err(AuthorizationError::ResourceAccessDenied {
            allowed: self.config.allowed_resources.clone().unwrap_or_default(),
        })
    }

    async fn resolve_user(
        &self,
        claims: &Claims,
        credentials: &Credentials,
    ) -> Result<P::User, AuthorizationError> {
        if !self.config.load_user_from_database {
            return Ok(self.provider.transient_user());
        }

        let user = if credentials.is_empty() {
            None
        } else {
            match &self.retrieve {
                RetrieveMethod::Default => self.provider.retrieve_by_credentials(credentials).await,
                RetrieveMethod::Custom(handler) => handler.retrieve(claims, credentials).await,
            }
        };

        user.ok_or_else(|| {
            let credentials = serde_json::to_string(credentials).unwrap_or_default();
            debug!(credentials = %credentials, "No local user for token principal");
            AuthorizationError::PrincipalNotFound { credentials }
        })
    }
}
