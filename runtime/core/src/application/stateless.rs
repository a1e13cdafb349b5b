// Copyright (c) 2026 scopekeeper contributors
// SPDX-License-Identifier: AGPL-3.0
//! Stateless scope: no caching. Every `get_instance` creates and starts a
//! fresh instance and `release_instance` stops it. There are no destroy
//! queues and no context state; the lifecycle state only gates the calls.

use crate::application::lifecycle::ContainerLifecycle;
use crate::application::registry::ScopeRegistry;
use crate::domain::component::{Component, Instance, ScopeKind};
use crate::domain::events::ScopeMonitor;
use crate::domain::scope::{ContextKey, LifecycleState, ScopeContainer, ScopeError};
use crate::domain::work_context::WorkContext;
use async_trait::async_trait;
use std::sync::{Arc, Weak};

pub struct StatelessScopeContainer {
    lifecycle: ContainerLifecycle,
    self_ref: Weak<Self>,
}

impl StatelessScopeContainer {
    pub fn new(registry: Arc<ScopeRegistry>, monitor: Arc<dyn ScopeMonitor>) -> Arc<Self> {
        Arc::new_cyclic(|self_ref| Self {
            lifecycle: ContainerLifecycle::new(ScopeKind::Stateless, registry, monitor),
            self_ref: self_ref.clone(),
        })
    }
}

#[async_trait]
impl ScopeContainer for StatelessScopeContainer {
    fn scope(&self) -> ScopeKind {
        ScopeKind::Stateless
    }

    fn state(&self) -> LifecycleState {
        self.lifecycle.state()
    }

    fn start(&self) -> Result<(), ScopeError> {
        let me: Weak<dyn ScopeContainer> = self.self_ref.clone();
        self.lifecycle.start(me)
    }

    fn stop(&self) -> Result<(), ScopeError> {
        self.lifecycle.stop()
    }

    fn register(&self, component: Arc<dyn Component>) -> Result<(), ScopeError> {
        self.lifecycle.register(component)
    }

    fn unregister(&self, component: &Arc<dyn Component>) -> Result<(), ScopeError> {
        self.lifecycle.unregister(component)
    }

    async fn start_context(&self, _key: &ContextKey, _ctx: &WorkContext) -> Result<(), ScopeError> {
        self.lifecycle.check_running()
    }

    async fn join_context(&self, _key: &ContextKey, _ctx: &WorkContext) -> Result<(), ScopeError> {
        self.lifecycle.check_running()
    }

    async fn stop_context(&self, _key: &ContextKey, _ctx: &WorkContext) -> Result<(), ScopeError> {
        self.lifecycle.check_running()
    }

    async fn stop_all_contexts(&self, _ctx: &WorkContext) -> Result<(), ScopeError> {
        self.lifecycle.check_running()
    }

    async fn get_instance(&self, component: &Arc<dyn Component>, ctx: &WorkContext) -> Result<Instance, ScopeError> {
        self.lifecycle.check_running()?;
        self.lifecycle.create_instance(component, ctx).await
    }

    /// Stop a handed-out instance. Destruction failures are reported to the
    /// monitor, not to the caller.
    async fn release_instance(
        &self,
        component: &Arc<dyn Component>,
        instance: Instance,
        ctx: &WorkContext,
    ) -> Result<(), ScopeError> {
        self.lifecycle.check_running()?;
        self.lifecycle.destroy_unit(component, &instance, ctx).await;
        Ok(())
    }
}
