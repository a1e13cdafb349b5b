// Copyright (c) 2026 scopekeeper contributors
// SPDX-License-Identifier: AGPL-3.0
//! # Instance Wrapper
//!
//! Owns one live instance together with its reference bookkeeping. When the
//! wiring of a component changes, the affected references are marked on the
//! wrapper and applied in bulk by [`InstanceWrapper::reinject`], which hands
//! them to the component's [`Reinjectable`] capability.
//!
//! [`ManagedUnit`] abstracts over what a container caches per component: a
//! full wrapper (composite and conversational scope) or a bare instance
//! (singleton and domain scope).

use crate::domain::component::{Component, ComponentError, ComponentUri, Instance, Reinjectable, ReferenceName};
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub struct InstanceWrapper {
    component: ComponentUri,
    instance: Instance,
    started: AtomicBool,
    reinjector: Option<Arc<dyn Reinjectable>>,
    changed_references: Mutex<BTreeSet<ReferenceName>>,
}

impl InstanceWrapper {
    /// Wrap an instance whose `start_instance` hook has already completed.
    pub fn started(
        component: ComponentUri,
        instance: Instance,
        reinjector: Option<Arc<dyn Reinjectable>>,
    ) -> Self {
        Self {
            component,
            instance,
            started: AtomicBool::new(true),
            reinjector,
            changed_references: Mutex::new(BTreeSet::new()),
        }
    }

    pub fn component(&self) -> &ComponentUri {
        &self.component
    }

    pub fn instance(&self) -> &Instance {
        &self.instance
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    /// Record that the instance has been stopped. Returns `false` if it
    /// already was.
    pub fn mark_stopped(&self) -> bool {
        self.started.swap(false, Ordering::AcqRel)
    }

    pub fn supports_reinjection(&self) -> bool {
        self.reinjector.is_some()
    }

    /// Mark a reference whose wiring changed since the instance was injected.
    pub fn mark_reference_changed(&self, reference: ReferenceName) {
        self.changed_references.lock().insert(reference);
    }

    pub fn pending_references(&self) -> Vec<ReferenceName> {
        self.changed_references.lock().iter().cloned().collect()
    }

    /// Apply all pending reference changes to the live instance.
    ///
    /// Returns the number of references reinjected. Wrappers without a
    /// reinjection capability, or that have been stopped, discard pending
    /// changes and report zero.
    pub fn reinject(&self) -> Result<usize, ComponentError> {
        let pending: Vec<ReferenceName> = std::mem::take(&mut *self.changed_references.lock())
            .into_iter()
            .collect();
        if pending.is_empty() || !self.is_started() {
            return Ok(0);
        }
        match &self.reinjector {
            Some(reinjector) => {
                if let Err(e) = reinjector.reinject(&self.instance, &pending) {
                    // Keep the references pending so a later pass can retry them.
                    self.changed_references.lock().extend(pending);
                    return Err(e);
                }
                Ok(pending.len())
            }
            None => Ok(0),
        }
    }
}

impl fmt::Debug for InstanceWrapper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstanceWrapper")
            .field("component", &self.component)
            .field("started", &self.is_started())
            .field("reinjectable", &self.supports_reinjection())
            .finish()
    }
}

/// What a scope container caches and destroys for each live component.
pub trait ManagedUnit: Clone + Send + Sync + 'static {
    /// Wrap a freshly created and started instance.
    fn wrap(component: &dyn Component, instance: Instance) -> Self;

    fn instance(&self) -> &Instance;

    /// The full wrapper, when this unit carries one.
    fn wrapper(&self) -> Option<&Arc<InstanceWrapper>>;

    /// Called after the component's `stop_instance` hook ran for this unit.
    fn mark_stopped(&self) {}

    /// Apply pending reference changes. Bare instances have nothing to apply.
    fn reinject(&self) -> Result<usize, ComponentError> {
        Ok(0)
    }
}

impl ManagedUnit for Instance {
    fn wrap(_component: &dyn Component, instance: Instance) -> Self {
        instance
    }

    fn instance(&self) -> &Instance {
        self
    }

    fn wrapper(&self) -> Option<&Arc<InstanceWrapper>> {
        None
    }
}

impl ManagedUnit for Arc<InstanceWrapper> {
    fn wrap(component: &dyn Component, instance: Instance) -> Self {
        Arc::new(InstanceWrapper::started(
            component.uri().clone(),
            instance,
            component.reinjector(),
        ))
    }

    fn instance(&self) -> &Instance {
        InstanceWrapper::instance(self)
    }

    fn wrapper(&self) -> Option<&Arc<InstanceWrapper>> {
        Some(self)
    }

    fn mark_stopped(&self) {
        InstanceWrapper::mark_stopped(self);
    }

    fn reinject(&self) -> Result<usize, ComponentError> {
        InstanceWrapper::reinject(self)
    }
}
