// Copyright (c) 2026 scopekeeper contributors
// SPDX-License-Identifier: AGPL-3.0
//! Container Lifecycle
//!
//! The part every scope container shares: the
//! `Uninitialized → Running → Stopped` state machine, registration with the
//! scope registry, registered-component and eager-init bookkeeping, and the
//! routines that create and destroy instances while reporting to the
//! [`ScopeMonitor`].
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Shared state and teardown for all scope containers

use crate::application::destroy_queue::DestroyQueue;
use crate::application::registry::ScopeRegistry;
use crate::domain::component::{Component, ComponentUri, DeployableId, Instance, ScopeKind};
use crate::domain::events::{ScopeEvent, ScopeMonitor};
use crate::domain::instance_wrapper::ManagedUnit;
use crate::domain::scope::{LifecycleState, ScopeContainer, ScopeError};
use crate::domain::work_context::WorkContext;
use chrono::Utc;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use tracing::{debug, info, warn};

pub struct ContainerLifecycle {
    scope: ScopeKind,
    state: RwLock<LifecycleState>,
    registry: Arc<ScopeRegistry>,
    monitor: Arc<dyn ScopeMonitor>,
    components: DashMap<ComponentUri, Arc<dyn Component>>,
    init_queues: Mutex<HashMap<DeployableId, Vec<Arc<dyn Component>>>>,
    registered: Mutex<Option<Weak<dyn ScopeContainer>>>,
}

impl ContainerLifecycle {
    pub fn new(scope: ScopeKind, registry: Arc<ScopeRegistry>, monitor: Arc<dyn ScopeMonitor>) -> Self {
        Self {
            scope,
            state: RwLock::new(LifecycleState::Uninitialized),
            registry,
            monitor,
            components: DashMap::new(),
            init_queues: Mutex::new(HashMap::new()),
            registered: Mutex::new(None),
        }
    }

    pub fn scope(&self) -> ScopeKind {
        self.scope
    }

    pub fn state(&self) -> LifecycleState {
        *self.state.read()
    }

    pub fn monitor(&self) -> &Arc<dyn ScopeMonitor> {
        &self.monitor
    }

    pub fn check_running(&self) -> Result<(), ScopeError> {
        match self.state() {
            LifecycleState::Running => Ok(()),
            state => Err(ScopeError::NotRunning { scope: self.scope, state }),
        }
    }

    /// Move to `Running` and register `container` under this scope.
    pub fn start(&self, container: Weak<dyn ScopeContainer>) -> Result<(), ScopeError> {
        {
            let mut state = self.state.write();
            if *state == LifecycleState::Running {
                return Err(ScopeError::AlreadyRunning(self.scope));
            }
            *state = LifecycleState::Running;
        }
        self.registry.register_weak(self.scope, container.clone());
        *self.registered.lock() = Some(container);
        info!("Started {} scope container", self.scope);
        self.record(ScopeEvent::ContainerStarted {
            scope: self.scope,
            started_at: Utc::now(),
        });
        Ok(())
    }

    /// Move to `Stopped` and withdraw this container from the registry.
    pub fn stop(&self) -> Result<(), ScopeError> {
        {
            let mut state = self.state.write();
            if *state != LifecycleState::Running {
                return Err(ScopeError::NotRunning { scope: self.scope, state: *state });
            }
            *state = LifecycleState::Stopped;
        }
        if let Some(container) = self.registered.lock().take() {
            self.registry.unregister_container(self.scope, &container);
        }
        info!("Stopped {} scope container", self.scope);
        self.record(ScopeEvent::ContainerStopped {
            scope: self.scope,
            stopped_at: Utc::now(),
        });
        Ok(())
    }

    pub fn register(&self, component: Arc<dyn Component>) -> Result<(), ScopeError> {
        self.check_running()?;
        debug!("Registering component {} with {} scope", component.uri(), self.scope);
        if component.is_eager_init() {
            self.init_queues
                .lock()
                .entry(component.deployable().clone())
                .or_default()
                .push(component.clone());
        }
        self.components.insert(component.uri().clone(), component);
        Ok(())
    }

    pub fn unregister(&self, component: &Arc<dyn Component>) -> Result<(), ScopeError> {
        self.check_running()?;
        debug!("Unregistering component {} from {} scope", component.uri(), self.scope);
        if component.is_eager_init() {
            let mut queues = self.init_queues.lock();
            if let Some(queue) = queues.get_mut(component.deployable()) {
                queue.retain(|queued| queued.uri() != component.uri());
                if queue.is_empty() {
                    queues.remove(component.deployable());
                }
            }
        }
        self.components.remove(component.uri());
        Ok(())
    }

    pub fn is_registered(&self, component: &ComponentUri) -> bool {
        self.components.contains_key(component)
    }

    /// Eager components of a deployment group, in registration order.
    pub fn init_queue(&self, deployable: &DeployableId) -> Vec<Arc<dyn Component>> {
        self.init_queues
            .lock()
            .get(deployable)
            .cloned()
            .unwrap_or_default()
    }

    /// Create and start a new instance of `component`.
    pub async fn create_instance(
        &self,
        component: &Arc<dyn Component>,
        ctx: &WorkContext,
    ) -> Result<Instance, ScopeError> {
        let uri = component.uri();
        let instance = component
            .create_instance(ctx)
            .await
            .map_err(|source| ScopeError::InstanceCreation { component: uri.clone(), source })?;
        component
            .start_instance(&instance, ctx)
            .await
            .map_err(|source| ScopeError::InstanceCreation { component: uri.clone(), source })?;

        debug!("Created instance of {} in {} scope", uri, self.scope);
        self.record(ScopeEvent::InstanceCreated {
            scope: self.scope,
            component: uri.clone(),
            created_at: Utc::now(),
        });
        Ok(instance)
    }

    /// Stop one unit. Failures are reported to the monitor and swallowed.
    pub async fn destroy_unit<U: ManagedUnit>(&self, component: &Arc<dyn Component>, unit: &U, ctx: &WorkContext) -> bool {
        let result = component.stop_instance(unit.instance(), ctx).await;
        unit.mark_stopped();
        match result {
            Ok(()) => {
                debug!("Destroyed instance of {} in {} scope", component.uri(), self.scope);
                self.record(ScopeEvent::InstanceDestroyed {
                    scope: self.scope,
                    component: component.uri().clone(),
                    destroyed_at: Utc::now(),
                });
                true
            }
            Err(e) => {
                warn!("Error destroying instance of {}: {}", component.uri(), e);
                self.record(ScopeEvent::DestructionFailed {
                    scope: self.scope,
                    component: component.uri().clone(),
                    error: e.to_string(),
                    failed_at: Utc::now(),
                });
                false
            }
        }
    }

    /// Destroy a queue newest-first until it is empty.
    ///
    /// The queue is live: entries appended while teardown runs are destroyed
    /// too. `evict` is invoked for each entry before its instance is stopped.
    /// Returns the number of destruction failures.
    pub(crate) async fn destroy_queue<U, F>(&self, queue: &DestroyQueue<U>, ctx: &WorkContext, mut evict: F) -> usize
    where
        U: ManagedUnit,
        F: FnMut(&Arc<dyn Component>, &U),
    {
        let mut failures = 0;
        while let Some((component, unit)) = queue.pop() {
            evict(&component, &unit);
            if !self.destroy_unit(&component, &unit, ctx).await {
                failures += 1;
            }
        }
        failures
    }

    pub fn record(&self, event: ScopeEvent) {
        self.monitor.record(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::component::ComponentError;
    use crate::domain::events::NoopMonitor;
    use async_trait::async_trait;

    struct EagerComponent {
        uri: ComponentUri,
        deployable: DeployableId,
    }

    #[async_trait]
    impl Component for EagerComponent {
        fn uri(&self) -> &ComponentUri {
            &self.uri
        }
        fn deployable(&self) -> &DeployableId {
            &self.deployable
        }
        fn scope(&self) -> ScopeKind {
            ScopeKind::Composite
        }
        fn is_eager_init(&self) -> bool {
            true
        }
        async fn create_instance(&self, _ctx: &WorkContext) -> Result<Instance, ComponentError> {
            Ok(Arc::new(()))
        }
        async fn start_instance(&self, _instance: &Instance, _ctx: &WorkContext) -> Result<(), ComponentError> {
            Ok(())
        }
        async fn stop_instance(&self, _instance: &Instance, _ctx: &WorkContext) -> Result<(), ComponentError> {
            Ok(())
        }
    }

    fn eager(name: &str) -> Arc<dyn Component> {
        Arc::new(EagerComponent {
            uri: ComponentUri::new(name),
            deployable: DeployableId::new("orders"),
        })
    }

    #[test]
    fn test_register_requires_running() {
        let lifecycle = ContainerLifecycle::new(ScopeKind::Composite, Arc::new(ScopeRegistry::new()), Arc::new(NoopMonitor));
        let error = lifecycle.register(eager("orders/a")).unwrap_err();
        assert!(matches!(error, ScopeError::NotRunning { state: LifecycleState::Uninitialized, .. }));
    }

    #[test]
    fn test_stop_twice_fails() {
        let lifecycle = ContainerLifecycle::new(ScopeKind::Composite, Arc::new(ScopeRegistry::new()), Arc::new(NoopMonitor));
        *lifecycle.state.write() = LifecycleState::Running;
        assert!(lifecycle.stop().is_ok());
        assert!(matches!(lifecycle.stop(), Err(ScopeError::NotRunning { state: LifecycleState::Stopped, .. })));
    }

    #[test]
    fn test_init_queue_tracks_registration_order() {
        let lifecycle = ContainerLifecycle::new(ScopeKind::Composite, Arc::new(ScopeRegistry::new()), Arc::new(NoopMonitor));
        *lifecycle.state.write() = LifecycleState::Running;

        let a = eager("orders/a");
        let b = eager("orders/b");
        lifecycle.register(a.clone()).unwrap();
        lifecycle.register(b.clone()).unwrap();

        let queued: Vec<_> = lifecycle
            .init_queue(&DeployableId::new("orders"))
            .iter()
            .map(|c| c.uri().clone())
            .collect();
        assert_eq!(queued, vec![ComponentUri::new("orders/a"), ComponentUri::new("orders/b")]);

        lifecycle.unregister(&a).unwrap();
        assert_eq!(lifecycle.init_queue(&DeployableId::new("orders")).len(), 1);
        assert!(!lifecycle.is_registered(a.uri()));
        assert!(lifecycle.is_registered(b.uri()));
    }
}
