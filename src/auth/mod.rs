// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Authentication Module
//!
//! Keycloak JWT authentication and authorization for API requests.
//!
//! ## Auth Flow
//!
//! 1. Client obtains an access token from the Keycloak realm
//! 2. Client sends `Authorization: Bearer <token>` (or the configured query key)
//! 3. Server:
//!    - Resolves the realm signing key (static, or fetched and cached)
//!    - Verifies signature, expiry (with leeway) and optionally issuer
//!    - Requires a client role from the allowed resources
//!    - Maps the principal claim to a local user, or a transient one
//!
//! ## Security
//!
//! - Resource access is checked before any user lookup
//! - Key fetch failures are reported as unavailability, never as bad tokens
//! - Fetched keys are cached with a TTL and refreshed on unknown `kid`

pub mod authorizer;
pub mod claims;
pub mod error;
pub mod extractor;
pub mod guard;
pub mod keys;
pub mod roles;
pub mod user;
pub mod verifier;

pub use authorizer::{AuthenticatedPrincipal, Authorizer};
pub use claims::{Access, Claims};
pub use error::{AuthError, AuthorizationError, KeyFetchError, TokenError};
pub use extractor::{token_from_parts, Auth, OptionalAuth};
pub use guard::{Guard, KeycloakGuard};
pub use keys::{KeyResolver, KeySource, SigningKey};
pub use roles::{Names, RoleSet, ScopeSet};
pub use user::{AuthUser, Credentials, CustomRetrieve, RetrieveMethod, RetrieverRegistry, UserProvider};
pub use verifier::{decode_with_key, TokenVerifier};
