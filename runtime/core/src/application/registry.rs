// Copyright (c) 2026 scopekeeper contributors
// SPDX-License-Identifier: AGPL-3.0
//! Scope Registry
//!
//! Directory of running scope containers keyed by [`ScopeKind`]. Containers
//! add themselves on `start()` and remove themselves on `stop()`; the
//! deployment pipeline resolves the container for a component's scope here.
//!
//! Entries are weak: the registry never keeps a container alive.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Routes lifecycle calls to the container owning a scope

use crate::domain::component::ScopeKind;
use crate::domain::scope::{ScopeContainer, ScopeError};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use tracing::debug;

#[derive(Default)]
pub struct ScopeRegistry {
    containers: RwLock<HashMap<ScopeKind, Weak<dyn ScopeContainer>>>,
}

impl ScopeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a container under its scope, replacing any previous one.
    pub fn register(&self, container: &Arc<dyn ScopeContainer>) {
        self.register_weak(container.scope(), Arc::downgrade(container));
    }

    pub(crate) fn register_weak(&self, scope: ScopeKind, container: Weak<dyn ScopeContainer>) {
        self.containers.write().insert(scope, container);
        debug!("Registered scope container: scope={}", scope);
    }

    /// Remove the container for `scope`. Returns whether one was registered.
    pub fn unregister(&self, scope: ScopeKind) -> bool {
        let removed = self.containers.write().remove(&scope).is_some();
        debug!("Unregistered scope container: scope={}", scope);
        removed
    }

    /// Remove the entry for `scope` only if it still points at `container`.
    /// A container that was replaced leaves its successor registered.
    pub(crate) fn unregister_container(&self, scope: ScopeKind, container: &Weak<dyn ScopeContainer>) -> bool {
        let mut containers = self.containers.write();
        match containers.get(&scope) {
            Some(registered) if Weak::ptr_eq(registered, container) => {
                containers.remove(&scope);
                debug!("Unregistered scope container: scope={}", scope);
                true
            }
            Some(_) => {
                debug!("Scope container was replaced, keeping successor: scope={}", scope);
                false
            }
            None => false,
        }
    }

    pub fn get(&self, scope: ScopeKind) -> Option<Arc<dyn ScopeContainer>> {
        self.containers.read().get(&scope).and_then(Weak::upgrade)
    }

    /// Resolve the container for `scope`, failing if none is running.
    pub fn resolve(&self, scope: ScopeKind) -> Result<Arc<dyn ScopeContainer>, ScopeError> {
        self.get(scope).ok_or(ScopeError::ScopeNotRegistered(scope))
    }

    /// Scopes whose container is registered and still alive.
    pub fn scopes(&self) -> Vec<ScopeKind> {
        self.containers
            .read()
            .iter()
            .filter(|(_, container)| container.strong_count() > 0)
            .map(|(scope, _)| *scope)
            .collect()
    }

    pub fn count(&self) -> usize {
        self.scopes().len()
    }
}
