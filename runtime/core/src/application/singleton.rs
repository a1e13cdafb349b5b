// Copyright (c) 2026 scopekeeper contributors
// SPDX-License-Identifier: AGPL-3.0
//! Singleton scope: one bare instance per component, shared by every caller
//! in the runtime until its deployment group stops.

use crate::application::caching::{CachingScopeContainer, ScopePolicy};
use crate::domain::component::{Instance, ScopeKind};

#[derive(Debug, Default, Clone, Copy)]
pub struct SingletonPolicy;

impl ScopePolicy for SingletonPolicy {
    type Unit = Instance;

    fn scope(&self) -> ScopeKind {
        ScopeKind::Singleton
    }
}

pub type SingletonScopeContainer = CachingScopeContainer<SingletonPolicy>;
