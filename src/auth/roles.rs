// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Role and scope sets derived from token claims.
//!
//! Keycloak grants roles at two levels:
//!
//! - realm roles (`realm_access.roles`), global to the realm
//! - client roles (`resource_access.<client>.roles`), scoped to one client
//!
//! Scopes come from the space-separated `scope` claim. All sets are
//! order-irrelevant and recomputed from the claims on every access.

use std::collections::{BTreeSet, HashSet};

/// Deduplicated role names.
pub type RoleSet = BTreeSet<String>;

/// Deduplicated OAuth scope names.
pub type ScopeSet = BTreeSet<String>;

/// One or many role/scope names.
///
/// Lets `has_role` and `has_scope` accept a single name as well as any
/// collection of names; a single name behaves as a one-element set.
pub trait Names {
    fn names(&self) -> Vec<&str>;
}

impl Names for str {
    fn names(&self) -> Vec<&str> {
        vec![self]
    }
}

impl Names for String {
    fn names(&self) -> Vec<&str> {
        vec![self.as_str()]
    }
}

impl<S: AsRef<str>> Names for [S] {
    fn names(&self) -> Vec<&str> {
        self.iter().map(AsRef::as_ref).collect()
    }
}

impl<S: AsRef<str>, const N: usize> Names for [S; N] {
    fn names(&self) -> Vec<&str> {
        self.iter().map(AsRef::as_ref).collect()
    }
}

impl<S: AsRef<str>> Names for Vec<S> {
    fn names(&self) -> Vec<&str> {
        self.iter().map(AsRef::as_ref).collect()
    }
}

impl<S: AsRef<str>> Names for BTreeSet<S> {
    fn names(&self) -> Vec<&str> {
        self.iter().map(AsRef::as_ref).collect()
    }
}

impl<S: AsRef<str>> Names for HashSet<S> {
    fn names(&self) -> Vec<&str> {
        self.iter().map(AsRef::as_ref).collect()
    }
}

/// True iff at least one of `wanted` is in `set`.
pub fn intersects<N: Names + ?Sized>(set: &BTreeSet<String>, wanted: &N) -> bool {
    wanted.names().into_iter().any(|name| set.contains(name))
}

/// Split a `scope` claim on single spaces, dropping empty segments.
pub fn split_scopes(scope: &str) -> ScopeSet {
    scope
        .split(' ')
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
