// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Outbound identity provider clients.

pub mod keycloak;

pub use keycloak::{ServiceTokenCache, TokenFetchError};
