// Copyright (c) 2026 scopekeeper contributors
// SPDX-License-Identifier: AGPL-3.0
//! Composite scope: one instance per component for the lifetime of its
//! deployment group. Instances are held in [`InstanceWrapper`]s so reference
//! changes can be reinjected while the group is running.
//!
//! [`InstanceWrapper`]: crate::domain::instance_wrapper::InstanceWrapper

use crate::application::caching::{CachingScopeContainer, ScopePolicy};
use crate::domain::component::ScopeKind;
use crate::domain::instance_wrapper::InstanceWrapper;
use std::sync::Arc;

#[derive(Debug, Default, Clone, Copy)]
pub struct CompositePolicy;

impl ScopePolicy for CompositePolicy {
    type Unit = Arc<InstanceWrapper>;

    fn scope(&self) -> ScopeKind {
        ScopeKind::Composite
    }
}

pub type CompositeScopeContainer = CachingScopeContainer<CompositePolicy>;
