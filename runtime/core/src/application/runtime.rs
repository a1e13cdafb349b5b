// Copyright (c) 2026 scopekeeper contributors
// SPDX-License-Identifier: AGPL-3.0
//! Scope Runtime
//!
//! Builds the full set of scope containers from a [`ScopeConfigManifest`]
//! and wires them to one registry, one monitor and one wrapper store.
//!
//! ```no_run
//! # use scopekeeper_core::application::ScopeRuntime;
//! # use scopekeeper_core::domain::config::ScopeConfigManifest;
//! # use scopekeeper_core::{ScopeKind, WorkContext};
//! # async fn run() -> Result<(), scopekeeper_core::ScopeError> {
//! let runtime = ScopeRuntime::builder(ScopeConfigManifest::default()).build();
//! runtime.start()?;
//! let composite = runtime.container(ScopeKind::Composite)?;
//! // ... register components, start contexts, serve requests ...
//! runtime.shutdown(&WorkContext::new()).await?;
//! # Ok(())
//! # }
//! ```

use crate::application::caching::CachingScopeContainer;
use crate::application::composite::{CompositePolicy, CompositeScopeContainer};
use crate::application::conversational::ConversationalScopeContainer;
use crate::application::domain_scope::{DomainPolicy, DomainScopeContainer};
use crate::application::registry::ScopeRegistry;
use crate::application::singleton::{SingletonPolicy, SingletonScopeContainer};
use crate::application::stateless::StatelessScopeContainer;
use crate::domain::component::ScopeKind;
use crate::domain::config::ScopeConfigManifest;
use crate::domain::events::ScopeMonitor;
use crate::domain::expiration::{ExpirationPolicy, IdleTimeoutPolicy};
use crate::domain::scope::{ScopeContainer, ScopeError};
use crate::domain::store::InstanceWrapperStore;
use crate::domain::topology::ZoneTopology;
use crate::domain::work_context::WorkContext;
use crate::infrastructure::event_bus::EventBus;
use crate::infrastructure::store::InMemoryInstanceWrapperStore;
use std::sync::Arc;
use tracing::{info, warn};

pub struct ScopeRuntimeBuilder {
    config: ScopeConfigManifest,
    monitor: Option<Arc<dyn ScopeMonitor>>,
    store: Option<Arc<dyn InstanceWrapperStore>>,
    topology: Option<Arc<dyn ZoneTopology>>,
}

impl ScopeRuntimeBuilder {
    /// Replace the default event bus as the containers' monitor.
    pub fn monitor(mut self, monitor: Arc<dyn ScopeMonitor>) -> Self {
        self.monitor = Some(monitor);
        self
    }

    pub fn store(mut self, store: Arc<dyn InstanceWrapperStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Zone membership the domain scope gates activation on.
    pub fn topology(mut self, topology: Arc<dyn ZoneTopology>) -> Self {
        self.topology = Some(topology);
        self
    }

    pub fn build(self) -> ScopeRuntime {
        let registry = Arc::new(ScopeRegistry::new());
        let events = EventBus::with_default_capacity();
        let monitor = self
            .monitor
            .unwrap_or_else(|| Arc::new(events.clone()) as Arc<dyn ScopeMonitor>);
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(InMemoryInstanceWrapperStore::new()) as Arc<dyn InstanceWrapperStore>);

        let spec = &self.config.spec;
        let wait_timeout = spec.instantiation.wait_timeout();
        let timeout_policy = spec.instantiation.timeout_policy();

        let stateless = StatelessScopeContainer::new(registry.clone(), monitor.clone());
        let composite = CachingScopeContainer::new(
            CompositePolicy,
            registry.clone(),
            monitor.clone(),
            wait_timeout,
            timeout_policy,
        );
        let singleton = CachingScopeContainer::new(
            SingletonPolicy,
            registry.clone(),
            monitor.clone(),
            wait_timeout,
            timeout_policy,
        );
        let domain = CachingScopeContainer::new(
            DomainPolicy::new(self.topology),
            registry.clone(),
            monitor.clone(),
            wait_timeout,
            timeout_policy,
        );
        let conversational = ConversationalScopeContainer::new(
            registry.clone(),
            monitor.clone(),
            store,
            spec.conversation.reaper_period(),
            wait_timeout,
            timeout_policy,
        );

        ScopeRuntime {
            config: self.config,
            registry,
            events,
            stateless,
            composite,
            singleton,
            domain,
            conversational,
        }
    }
}

pub struct ScopeRuntime {
    config: ScopeConfigManifest,
    registry: Arc<ScopeRegistry>,
    events: EventBus,
    stateless: Arc<StatelessScopeContainer>,
    composite: Arc<CompositeScopeContainer>,
    singleton: Arc<SingletonScopeContainer>,
    domain: Arc<DomainScopeContainer>,
    conversational: Arc<ConversationalScopeContainer>,
}

impl ScopeRuntime {
    pub fn builder(config: ScopeConfigManifest) -> ScopeRuntimeBuilder {
        ScopeRuntimeBuilder {
            config,
            monitor: None,
            store: None,
            topology: None,
        }
    }

    pub fn config(&self) -> &ScopeConfigManifest {
        &self.config
    }

    pub fn registry(&self) -> &Arc<ScopeRegistry> {
        &self.registry
    }

    /// The default event bus. Silent when a custom monitor was supplied.
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn stateless(&self) -> &Arc<StatelessScopeContainer> {
        &self.stateless
    }

    pub fn composite(&self) -> &Arc<CompositeScopeContainer> {
        &self.composite
    }

    pub fn singleton(&self) -> &Arc<SingletonScopeContainer> {
        &self.singleton
    }

    pub fn domain(&self) -> &Arc<DomainScopeContainer> {
        &self.domain
    }

    pub fn conversational(&self) -> &Arc<ConversationalScopeContainer> {
        &self.conversational
    }

    /// Idle-timeout policy for a new conversation, if the configuration
    /// sets a default.
    pub fn default_expiration(&self) -> Option<Arc<dyn ExpirationPolicy>> {
        self.config
            .spec
            .conversation
            .default_idle_timeout()
            .map(|timeout| Arc::new(IdleTimeoutPolicy::new(timeout)) as Arc<dyn ExpirationPolicy>)
    }

    /// Containers in start order.
    fn containers(&self) -> [Arc<dyn ScopeContainer>; 5] {
        [
            self.stateless.clone(),
            self.composite.clone(),
            self.singleton.clone(),
            self.domain.clone(),
            self.conversational.clone(),
        ]
    }

    /// Start every container. Must be called within a tokio runtime.
    pub fn start(&self) -> Result<(), ScopeError> {
        for container in self.containers() {
            container.start()?;
        }
        info!(
            "Scope runtime {} started with {} scope(s)",
            self.config.spec.runtime_name,
            self.registry.count()
        );
        Ok(())
    }

    /// Tear down every context and stop every container, in reverse start
    /// order. Continues past failures and returns the first one.
    pub async fn shutdown(&self, ctx: &WorkContext) -> Result<(), ScopeError> {
        let mut first_error = None;
        for container in self.containers().into_iter().rev() {
            let scope = container.scope();
            let result = match container.stop_all_contexts(ctx).await {
                Ok(()) => container.stop(),
                Err(e) => Err(e),
            };
            if let Err(e) = result {
                warn!("Failed to shut down {} scope: {}", scope, e);
                if first_error.is_none() {
                    first_error = Some(e);
                }
            }
        }
        info!("Scope runtime {} shut down", self.config.spec.runtime_name);
        first_error.map_or(Ok(()), Err)
    }

    /// The running container for `scope`, resolved through the registry.
    pub fn container(&self, scope: ScopeKind) -> Result<Arc<dyn ScopeContainer>, ScopeError> {
        self.registry.resolve(scope)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::scope::LifecycleState;

    #[tokio::test]
    async fn test_start_registers_every_scope() {
        let runtime = ScopeRuntime::builder(ScopeConfigManifest::default()).build();
        assert!(matches!(
            runtime.container(ScopeKind::Composite),
            Err(ScopeError::ScopeNotRegistered(ScopeKind::Composite))
        ));

        runtime.start().unwrap();
        assert_eq!(runtime.registry().count(), ScopeKind::ALL.len());
        for scope in ScopeKind::ALL {
            assert_eq!(runtime.container(scope).unwrap().scope(), scope);
        }

        runtime.shutdown(&WorkContext::new()).await.unwrap();
        assert_eq!(runtime.registry().count(), 0);
        assert_eq!(runtime.composite().state(), LifecycleState::Stopped);
    }

    #[tokio::test]
    async fn test_second_shutdown_reports_not_running() {
        let runtime = ScopeRuntime::builder(ScopeConfigManifest::default()).build();
        runtime.start().unwrap();
        runtime.shutdown(&WorkContext::new()).await.unwrap();

        let error = runtime.shutdown(&WorkContext::new()).await.unwrap_err();
        assert!(matches!(error, ScopeError::NotRunning { state: LifecycleState::Stopped, .. }));
    }

    #[test]
    fn test_default_expiration_follows_config() {
        let runtime = ScopeRuntime::builder(ScopeConfigManifest::default()).build();
        assert!(runtime.default_expiration().is_none());

        let mut config = ScopeConfigManifest::default();
        config.spec.conversation.default_idle_timeout_seconds = Some(30);
        let runtime = ScopeRuntime::builder(config).build();
        assert!(runtime.default_expiration().is_some());
    }
}
