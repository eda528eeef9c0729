// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! User store contracts.
//!
//! The guard never owns user records. It asks a [`UserProvider`] to find
//! one by credentials, or a named [`CustomRetrieve`] handler chosen at
//! startup through [`RetrieveMethod::resolve`].

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use super::claims::Claims;
use crate::config::ConfigError;

/// Credential field → value, e.g. `{"username": "jdoe"}`.
pub type Credentials = BTreeMap<String, String>;

/// A local user record exposed through the guard.
pub trait AuthUser {
    /// Stable identifier of the record, `None` for transient users.
    fn auth_identifier(&self) -> Option<String>;
}

/// Application user storage.
#[async_trait]
pub trait UserProvider: Send + Sync + 'static {
    type User: AuthUser + Clone + Send + Sync + 'static;

    /// Find a user whose fields match every credential.
    async fn retrieve_by_credentials(&self, credentials: &Credentials) -> Option<Self::User>;

    /// A fresh, non-persisted user for token-only identities.
    fn transient_user(&self) -> Self::User;
}

/// Custom lookup receiving the full decoded token.
#[async_trait]
pub trait CustomRetrieve<U: Send + 'static>: Send + Sync {
    async fn retrieve(&self, claims: &Claims, credentials: &Credentials) -> Option<U>;
}

/// How the authorizer loads users, fixed at startup.
pub enum RetrieveMethod<U: Send + 'static> {
    /// [`UserProvider::retrieve_by_credentials`]
    Default,
    Custom(Arc<dyn CustomRetrieve<U>>),
}

impl<U: Send + 'static> Clone for RetrieveMethod<U> {
    fn clone(&self) -> Self {
        match self {
            Self::Default => Self::Default,
            Self::Custom(handler) => Self::Custom(Arc::clone(handler)),
        }
    }
}

impl<U: Send + 'static> fmt::Debug for RetrieveMethod<U> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Default => f.write_str("Default"),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

impl<U: Send + 'static> RetrieveMethod<U> {
    /// Resolve the configured method name against `registry`.
    ///
    /// `None` selects [`RetrieveMethod::Default`]; an unregistered name is a
    /// configuration error.
    pub fn resolve(
        name: Option<&str>,
        registry: &RetrieverRegistry<U>,
    ) -> Result<Self, ConfigError> {
        match name {
            None => Ok(Self::Default),
            Some(name) => registry
                .get(name)
                .map(Self::Custom)
                .ok_or_else(|| ConfigError::UnknownRetrieveMethod(name.to_string())),
        }
    }
}

/// Named custom retrieval handlers available to configuration.
pub struct RetrieverRegistry<U: Send + 'static> {
    handlers: HashMap<String, Arc<dyn CustomRetrieve<U>>>,
}

impl<U: Send + 'static> Default for RetrieverRegistry<U> {
    fn default() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }
}

impl<U: Send + 'static> RetrieverRegistry<U> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, name: impl Into<String>, handler: Arc<dyn CustomRetrieve<U>>) -> Self {
        self.handlers.insert(name.into(), handler);
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn CustomRetrieve<U>>> {
        self.handlers.get(name).cloned()
    }
}
