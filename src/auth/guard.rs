// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Request-scoped authentication state and the guard that produces it.
//!
//! [`KeycloakGuard`] is built once at startup and shared; every request gets
//! its own [`Guard`] holding the decoded token and resolved principal.

use std::sync::Arc;

use tracing::{debug, warn};

use super::authorizer::{AuthenticatedPrincipal, Authorizer};
use super::claims::Claims;
use super::error::{AuthError, AuthorizationError};
use super::keys::KeyResolver;
use super::roles::{intersects, Names, RoleSet, ScopeSet};
use super::user::{AuthUser, Credentials, RetrieveMethod, RetrieverRegistry, UserProvider};
use super::verifier::TokenVerifier;
use crate::config::KeycloakConfig;

/// Authentication state of a single request.
pub struct Guard<P: UserProvider> {
    authorizer: Arc<Authorizer<P>>,
    claims: Option<Arc<Claims>>,
    principal: Option<AuthenticatedPrincipal<P::User>>,
}

impl<P: UserProvider> Clone for Guard<P> {
    fn clone(&self) -> Self {
        Self {
            authorizer: Arc::clone(&self.authorizer),
            claims: self.claims.clone(),
            principal: self.principal.clone(),
        }
    }
}

impl<P: UserProvider> Guard<P> {
    fn new(authorizer: Arc<Authorizer<P>>) -> Self {
        Self {
            authorizer,
            claims: None,
            principal: None,
        }
    }

    /// Determine if the current user is authenticated.
    pub fn check(&self) -> bool {
        self.principal.is_some()
    }

    pub fn has_user(&self) -> bool {
        self.principal.is_some()
    }

    pub fn guest(&self) -> bool {
        !self.check()
    }

    pub fn user(&self) -> Option<&AuthenticatedPrincipal<P::User>> {
        self.principal.as_ref()
    }

    /// Identifier of the authenticated user record, if any.
    pub fn id(&self) -> Option<String> {
        self.principal
            .as_ref()
            .and_then(|p| p.user().auth_identifier())
    }

    /// Full decoded token.
    pub fn token(&self) -> Option<&Claims> {
        self.claims.as_deref()
    }

    pub fn set_user(&mut self, user: P::User) -> &mut Self {
        self.principal = Some(match &self.claims {
            Some(claims) => self.authorizer.principal(user, Arc::clone(claims)),
            None => AuthenticatedPrincipal::new(user, None),
        });
        self
    }

    /// Client roles, plus realm roles when `include_global` is set.
    pub fn roles(&self, include_global: bool) -> RoleSet {
        self.claims
            .as_ref()
            .map(|c| c.roles(self.authorizer.client_name(), include_global))
            .unwrap_or_default()
    }

    /// Client roles only.
    pub fn get_roles(&self) -> RoleSet {
        self.roles(false)
    }

    /// Check if the token grants any of `roles` (client or realm level).
    pub fn has_role<N: Names + ?Sized>(&self, roles: &N) -> bool {
        intersects(&self.roles(true), roles)
    }

    pub fn scopes(&self) -> ScopeSet {
        self.claims
            .as_ref()
            .map(|c| c.scopes())
            .unwrap_or_default()
    }

    pub fn has_scope<N: Names + ?Sized>(&self, scopes: &N) -> bool {
        intersects(&self.scopes(), scopes)
    }

    /// Re-run authorization for the current token with `credentials`.
    ///
    /// Returns `Ok(false)` when the request carried no token.
    pub async fn validate(&mut self, credentials: &Credentials) -> Result<bool, AuthorizationError> {
        let Some(claims) = self.claims.clone() else {
            return Ok(false);
        };
        let principal = self.authorizer.validate(claims, credentials).await?;
        self.principal = Some(principal);
        Ok(true)
    }
}

/// Shared entry point: verifies tokens and authorizes them.
pub struct KeycloakGuard<P: UserProvider> {
    verifier: Arc<TokenVerifier>,
    authorizer: Arc<Authorizer<P>>,
    input_key: Option<String>,
}

impl<P: UserProvider> Clone for KeycloakGuard<P> {
    fn clone(&self) -> Self {
        Self {
            verifier: Arc::clone(&self.verifier),
            authorizer: Arc::clone(&self.authorizer),
            input_key: self.input_key.clone(),
        }
    }
}

impl<P: UserProvider> KeycloakGuard<P> {
    pub fn new(verifier: TokenVerifier, authorizer: Authorizer<P>) -> Self {
        Self {
            verifier: Arc::new(verifier),
            authorizer: Arc::new(authorizer),
            input_key: None,
        }
    }

    /// Wire a guard from configuration.
    ///
    /// The custom retrieve method, if configured, is resolved here once.
    pub fn from_config(
        config: Arc<KeycloakConfig>,
        provider: Arc<P>,
        registry: &RetrieverRegistry<P::User>,
    ) -> Result<Self, AuthError> {
        let keys = KeyResolver::from_config(&config)?;
        let verifier = TokenVerifier::from_config(keys, &config);
        let retrieve = RetrieveMethod::resolve(
            config.user_provider_custom_retrieve_method.as_deref(),
            registry,
        )?;
        let input_key = config.input_key.clone();
        let authorizer = Authorizer::new(config, provider, retrieve);

        Ok(Self::new(verifier, authorizer).with_input_key(input_key))
    }

    /// Query parameter consulted when no bearer header is present.
    pub fn with_input_key(mut self, input_key: Option<String>) -> Self {
        self.input_key = input_key;
        self
    }

    pub fn input_key(&self) -> Option<&str> {
        self.input_key.as_deref()
    }

    pub fn verifier(&self) -> &TokenVerifier {
        &self.verifier
    }

    pub fn authorizer(&self) -> &Authorizer<P> {
        &self.authorizer
    }

    /// A guard with no token and no user.
    pub fn guest(&self) -> Guard<P> {
        Guard::new(Arc::clone(&self.authorizer))
    }

    /// Decode, verify and authorize `token`.
    pub async fn authenticate(&self, token: &str) -> Result<Guard<P>, AuthError> {
        let result = self.try_authenticate(token).await;
        if let Err(e) = &result {
            if e.is_infrastructure() {
                warn!(error = %e, error_code = e.error_code(), "Identity provider unavailable");
            } else {
                debug!(error = %e, error_code = e.error_code(), "Authentication rejected");
            }
        }
        result
    }

    /// Like [`authenticate`](Self::authenticate), but a blank token yields a
    /// guest guard instead of an error.
    pub async fn authenticate_optional(&self, token: &str) -> Result<Guard<P>, AuthError> {
        if token.trim().is_empty() {
            return Ok(self.guest());
        }
        self.authenticate(token).await
    }

    async fn try_authenticate(&self, token: &str) -> Result<Guard<P>, AuthError> {
        let claims = Arc::new(self.verifier.decode(token).await?);
        let principal = self.authorizer.authorize(Arc::clone(&claims)).await?;

        let mut guard = self.guest();
        guard.claims = Some(claims);
        guard.principal = Some(principal);
        Ok(guard)
    }
}
