// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Keycloak Guard - JWT authentication and authorization for Keycloak realms
//!
//! Verifies realm-signed access tokens, gates them on the client roles an
//! API accepts, maps them to local users and exposes roles and scopes to
//! request handlers. Also caches client-credentials tokens for
//! service-to-service calls.
//!
//! ## Modules
//!
//! - `auth` - Token verification, authorization and the request guard
//! - `config` - `KEYCLOAK_*` environment configuration
//! - `providers` - Outbound Keycloak clients (service credentials)
//! - `store` - In-memory user store
//! - `api` - Demo HTTP API (Axum)

pub mod api;
pub mod auth;
pub mod config;
pub mod providers;
pub mod state;
pub mod store;

#[cfg(test)]
mod test_support;
