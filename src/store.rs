// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! In-memory user store backing the demo API and tests.
//!
//! Records are matched field by field against the credentials produced by the
//! authorizer, so any configured credential name (`username`, `email`, or a
//! custom attribute) can be used.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::RwLock;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::{AuthUser, Claims, Credentials, CustomRetrieve, UserProvider};

/// A local user record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct StoredUser {
    /// `None` for transient users that were never persisted.
    pub id: Option<Uuid>,
    pub username: Option<String>,
    pub email: Option<String>,
    /// Additional matchable fields
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, String>,
}

impl StoredUser {
    /// Value of the field named `name`.
    pub fn field(&self, name: &str) -> Option<String> {
        match name {
            "id" => self.id.map(|id| id.to_string()),
            "username" => self.username.clone(),
            "email" => self.email.clone(),
            other => self.attributes.get(other).cloned(),
        }
    }

    fn matches(&self, credentials: &Credentials) -> bool {
        credentials
            .iter()
            .all(|(name, value)| self.field(name).as_deref() == Some(value.as_str()))
    }
}

impl AuthUser for StoredUser {
    fn auth_identifier(&self) -> Option<String> {
        self.id.map(|id| id.to_string())
    }
}

#[derive(Default)]
pub struct InMemoryUserStore {
    users: RwLock<HashMap<Uuid, StoredUser>>,
}

impl InMemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_user(&self, username: &str, email: Option<&str>) -> StoredUser {
        self.insert(StoredUser {
            id: None,
            username: Some(username.to_string()),
            email: email.map(str::to_string),
            attributes: BTreeMap::new(),
        })
        .await
    }

    /// Persist `user`, assigning an id when it has none.
    pub async fn insert(&self, mut user: StoredUser) -> StoredUser {
        let id = *user.id.get_or_insert_with(Uuid::new_v4);
        self.users.write().await.insert(id, user.clone());
        user
    }

    pub async fn get(&self, id: &Uuid) -> Option<StoredUser> {
        self.users.read().await.get(id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.users.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.users.read().await.is_empty()
    }
}

#[async_trait]
impl UserProvider for InMemoryUserStore {
    type User = StoredUser;

    async fn retrieve_by_credentials(&self, credentials: &Credentials) -> Option<StoredUser> {
        if credentials.is_empty() {
            return None;
        }
        self.users
            .read()
            .await
            .values()
            .find(|user| user.matches(credentials))
            .cloned()
    }

    fn transient_user(&self) -> StoredUser {
        StoredUser::default()
    }
}

/// Custom retrieval that looks users up by the token's `email` claim.
///
/// Registered under [`ClaimsEmailLookup::NAME`].
pub struct ClaimsEmailLookup {
    store: Arc<InMemoryUserStore>,
}

impl ClaimsEmailLookup {
    pub const NAME: &'static str = "by_email";

    pub fn new(store: Arc<InMemoryUserStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl CustomRetrieve<StoredUser> for ClaimsEmailLookup {
    async fn retrieve(&self, claims: &Claims, _credentials: &Credentials) -> Option<StoredUser> {
        let email = claims.email.as_ref()?;
        let credentials = Credentials::from([("email".to_string(), email.clone())]);
        self.store.retrieve_by_credentials(&credentials).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::scenario_claims;

    fn credentials(pairs: &[(&str, &str)]) -> Credentials {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[tokio::test]
    async fn insert_assigns_an_id() {
        let store = InMemoryUserStore::new();
        let user = store.insert_user("jdoe", Some("jdoe@example.com")).await;

        let id = user.id.unwrap();
        assert_eq!(store.get(&id).await, Some(user));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn retrieve_matches_every_credential() {
        let store = InMemoryUserStore::new();
        let jdoe = store.insert_user("jdoe", Some("jdoe@example.com")).await;
        store.insert_user("asmith", Some("asmith@example.com")).await;

        let found = store
            .retrieve_by_credentials(&credentials(&[("username", "jdoe")]))
            .await;
        assert_eq!(found, Some(jdoe.clone()));

        let found = store
            .retrieve_by_credentials(&credentials(&[
                ("username", "jdoe"),
                ("email", "jdoe@example.com"),
            ]))
            .await;
        assert_eq!(found, Some(jdoe));

        let mismatch = store
            .retrieve_by_credentials(&credentials(&[
                ("username", "jdoe"),
                ("email", "asmith@example.com"),
            ]))
            .await;
        assert!(mismatch.is_none());
    }

    #[tokio::test]
    async fn custom_attributes_are_matchable() {
        let store = InMemoryUserStore::new();
        let user = store
            .insert(StoredUser {
                attributes: BTreeMap::from([("employee_number".to_string(), "42".to_string())]),
                ..StoredUser::default()
            })
            .await;

        let found = store
            .retrieve_by_credentials(&credentials(&[("employee_number", "42")]))
            .await;
        assert_eq!(found.and_then(|u| u.id), user.id);
    }

    #[tokio::test]
    async fn empty_credentials_match_nobody() {
        let store = InMemoryUserStore::new();
        store.insert_user("jdoe", None).await;
        assert!(store.retrieve_by_credentials(&Credentials::new()).await.is_none());
    }

    #[test]
    fn transient_user_has_no_identifier() {
        let user = InMemoryUserStore::new().transient_user();
        assert_eq!(user.auth_identifier(), None);
        assert_eq!(user, StoredUser::default());
    }

    #[tokio::test]
    async fn email_lookup_uses_the_token_claim() {
        let store = Arc::new(InMemoryUserStore::new());
        let jdoe = store.insert_user("jdoe", Some("jdoe@example.com")).await;
        let lookup = ClaimsEmailLookup::new(Arc::clone(&store));

        let claims: Claims = serde_json::from_value(scenario_claims()).unwrap();
        let found = lookup
            .retrieve(&claims, &credentials(&[("username", "ignored")]))
            .await;
        assert_eq!(found, Some(jdoe));

        let mut anonymous = claims;
        anonymous.email = None;
        assert!(lookup.retrieve(&anonymous, &Credentials::new()).await.is_none());
    }
}
