// Copyright (c) 2026 scopekeeper contributors
// SPDX-License-Identifier: AGPL-3.0
//! Caching Scope Container
//!
//! Shared engine behind the composite, singleton and domain scopes. Each of
//! them keeps at most one instance per component, created on first access
//! or eagerly when a deployment group's context starts, and destroys those
//! instances in reverse creation order when the group's context stops.
//!
//! The variants differ only in what a [`ScopePolicy`] decides:
//!
//! | Scope | Unit | Admission | Access |
//! |-------|------|-----------|--------|
//! | Composite | `Arc<InstanceWrapper>` | always | always |
//! | Singleton | bare [`Instance`] | always | always |
//! | Domain | bare [`Instance`] | deferred on non-leaders | after activation |
//!
//! # Concurrency
//!
//! Published instances live in a [`DashMap`]; a lookup never blocks behind
//! an instantiation of another component. Concurrent first accesses to one
//! component are funnelled through a per-component barrier: one caller
//! creates, the others wait with a bounded timeout and then read the
//! published instance. If the creator fails, a waiter claims the barrier
//! itself and retries the creation.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Exactly-once instantiation and ordered teardown per deployment group

use crate::application::barrier::{Claim, InstantiationWait, PendingInstantiations};
use crate::application::destroy_queue::{ContextQueues, DestroyQueue};
use crate::application::lifecycle::ContainerLifecycle;
use crate::application::registry::ScopeRegistry;
use crate::domain::component::{Component, ComponentUri, DeployableId, Instance, ScopeKind};
use crate::domain::config::WaitTimeoutPolicy;
use crate::domain::events::{ScopeEvent, ScopeMonitor};
use crate::domain::instance_wrapper::{InstanceWrapper, ManagedUnit};
use crate::domain::scope::{ContextKey, LifecycleState, ScopeContainer, ScopeError};
use crate::domain::work_context::WorkContext;
use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Default bound on waiting for another caller's instantiation.
pub const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_secs(300);

/// Outcome of asking a policy whether a context may activate now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Proceed,
    /// The policy kept the context and will hand it back on activation.
    Deferred,
}

/// What distinguishes one caching scope from another.
pub trait ScopePolicy: Send + Sync + 'static {
    /// How a live instance is held.
    type Unit: ManagedUnit;

    fn scope(&self) -> ScopeKind;

    /// Called before a deployment group's context activates.
    fn admit(&self, _deployable: &DeployableId, _ctx: &WorkContext) -> Admission {
        Admission::Proceed
    }

    /// Called before every instance lookup.
    fn check_access(&self, _component: &dyn Component) -> Result<(), ScopeError> {
        Ok(())
    }

    /// Forget a deferred context. Returns whether one was held.
    fn withdraw(&self, _deployable: &DeployableId) -> bool {
        false
    }

    /// Forget every deferred context.
    fn withdraw_all(&self) {}

    /// Called after the container starts.
    fn on_start(&self) {}

    /// Called after the container stops.
    fn reset(&self) {}
}

#[derive(Clone)]
struct Published<U> {
    component: Arc<dyn Component>,
    unit: U,
}

pub struct CachingScopeContainer<P: ScopePolicy> {
    lifecycle: ContainerLifecycle,
    policy: P,
    instances: DashMap<ComponentUri, Published<P::Unit>>,
    pending: PendingInstantiations<ComponentUri>,
    contexts: ContextQueues<DeployableId, P::Unit>,
    wait: InstantiationWait,
    self_ref: Weak<Self>,
}

impl<P: ScopePolicy> CachingScopeContainer<P> {
    pub fn new(
        policy: P,
        registry: Arc<ScopeRegistry>,
        monitor: Arc<dyn ScopeMonitor>,
        wait_timeout: Duration,
        timeout_policy: WaitTimeoutPolicy,
    ) -> Arc<Self> {
        let scope = policy.scope();
        Arc::new_cyclic(|self_ref| Self {
            lifecycle: ContainerLifecycle::new(scope, registry, monitor),
            policy,
            instances: DashMap::new(),
            pending: PendingInstantiations::new(),
            contexts: ContextQueues::new(),
            wait: InstantiationWait::new(wait_timeout, timeout_policy),
            self_ref: self_ref.clone(),
        })
    }

    /// Container with the default five minute wait that fails on timeout.
    pub fn with_defaults(policy: P, registry: Arc<ScopeRegistry>, monitor: Arc<dyn ScopeMonitor>) -> Arc<Self> {
        Self::new(policy, registry, monitor, DEFAULT_WAIT_TIMEOUT, WaitTimeoutPolicy::Fail)
    }

    pub fn policy(&self) -> &P {
        &self.policy
    }

    pub fn lifecycle(&self) -> &ContainerLifecycle {
        &self.lifecycle
    }

    /// Deployment groups with an active context, in activation order.
    pub fn active_contexts(&self) -> Vec<DeployableId> {
        self.contexts.keys()
    }

    /// Number of published instances.
    pub fn live_instances(&self) -> usize {
        self.instances.len()
    }

    fn deployable_key<'k>(&self, key: &'k ContextKey) -> Result<&'k DeployableId, ScopeError> {
        key.as_deployable().ok_or_else(|| ScopeError::InvalidContextKey {
            scope: self.policy.scope(),
            context: key.clone(),
        })
    }

    fn published(&self, uri: &ComponentUri) -> Option<P::Unit> {
        self.instances.get(uri).map(|entry| entry.unit.clone())
    }

    /// Resolve the unit for `component`, creating it at most once.
    pub async fn get_unit(&self, component: &Arc<dyn Component>, ctx: &WorkContext) -> Result<P::Unit, ScopeError> {
        self.lifecycle.check_running()?;
        self.policy.check_access(component.as_ref())?;

        let uri = component.uri();
        let mut timeouts = 0;
        loop {
            if let Some(unit) = self.published(uri) {
                return Ok(unit);
            }

            match self.pending.claim(uri.clone()) {
                Claim::Waiter(barrier) => {
                    debug!("Waiting for in-flight instantiation of {}", uri);
                    self.wait.wait(barrier, uri, &mut timeouts).await?;
                }
                Claim::Creator(guard) => {
                    // The previous creator may have published between our
                    // lookup and the claim.
                    if let Some(unit) = self.published(uri) {
                        return Ok(unit);
                    }
                    let instance = self.lifecycle.create_instance(component, ctx).await?;
                    let unit = P::Unit::wrap(component.as_ref(), instance);
                    // Publish and enqueue under the context lock: a
                    // concurrent stop either tears the unit down with its
                    // context or finds it absent.
                    self.contexts.ensure_with(component.deployable(), |queue| {
                        self.instances.insert(
                            uri.clone(),
                            Published {
                                component: component.clone(),
                                unit: unit.clone(),
                            },
                        );
                        queue.push(component.clone(), unit.clone());
                    });
                    drop(guard);
                    return Ok(unit);
                }
            }
        }
    }

    /// Run eager initialization for a deployment group and open its context.
    ///
    /// Every eager component is attempted; failures are collected into one
    /// `GroupInitialization` error after the rest have been initialized.
    pub(crate) async fn activate_context(&self, deployable: &DeployableId, ctx: &WorkContext) -> Result<(), ScopeError> {
        let eager = self.lifecycle.init_queue(deployable);
        let mut failures = Vec::new();
        for component in &eager {
            if let Err(e) = self.get_unit(component, ctx).await {
                warn!("Eager initialization of {} failed: {}", component.uri(), e);
                failures.push(e);
            }
        }

        self.contexts.ensure(deployable);
        info!(
            "Started {} context {} ({} eager component(s))",
            self.policy.scope(),
            deployable,
            eager.len()
        );
        self.lifecycle.record(ScopeEvent::ContextStarted {
            scope: self.policy.scope(),
            context: deployable.to_string(),
            started_at: Utc::now(),
        });

        if failures.is_empty() {
            Ok(())
        } else {
            Err(ScopeError::GroupInitialization {
                deployable: deployable.clone(),
                failures,
            })
        }
    }

    /// Tear down one context's queue and report the context stopped.
    async fn destroy_context(
        &self,
        deployable: &DeployableId,
        queue: &DestroyQueue<P::Unit>,
        ctx: &WorkContext,
    ) -> usize {
        let failures = self
            .lifecycle
            .destroy_queue(queue, ctx, |component, unit| {
                // Only evict the unit being destroyed: a newer instance may
                // have been published for the same component meanwhile.
                self.instances.remove_if(component.uri(), |_, published| {
                    Arc::ptr_eq(published.unit.instance(), unit.instance())
                });
            })
            .await;

        info!("Stopped {} context {}", self.policy.scope(), deployable);
        self.lifecycle.record(ScopeEvent::ContextStopped {
            scope: self.policy.scope(),
            context: deployable.to_string(),
            stopped_at: Utc::now(),
        });
        failures
    }
}

#[async_trait]
impl<P: ScopePolicy> ScopeContainer for CachingScopeContainer<P> {
    fn scope(&self) -> ScopeKind {
        self.policy.scope()
    }

    fn state(&self) -> LifecycleState {
        self.lifecycle.state()
    }

    fn start(&self) -> Result<(), ScopeError> {
        let me: Weak<dyn ScopeContainer> = self.self_ref.clone();
        self.lifecycle.start(me)?;
        self.policy.on_start();
        Ok(())
    }

    fn stop(&self) -> Result<(), ScopeError> {
        self.lifecycle.stop()?;
        self.policy.reset();
        Ok(())
    }

    fn register(&self, component: Arc<dyn Component>) -> Result<(), ScopeError> {
        self.lifecycle.register(component)
    }

    fn unregister(&self, component: &Arc<dyn Component>) -> Result<(), ScopeError> {
        self.lifecycle.unregister(component)
    }

    async fn start_context(&self, key: &ContextKey, ctx: &WorkContext) -> Result<(), ScopeError> {
        self.lifecycle.check_running()?;
        let deployable = self.deployable_key(key)?;

        match self.policy.admit(deployable, ctx) {
            Admission::Proceed => self.activate_context(deployable, ctx).await,
            Admission::Deferred => {
                warn!("Deferred {} context {} until activation", self.policy.scope(), deployable);
                self.lifecycle.record(ScopeEvent::ContextDeferred {
                    scope: self.policy.scope(),
                    context: deployable.to_string(),
                    deferred_at: Utc::now(),
                });
                Ok(())
            }
        }
    }

    async fn join_context(&self, key: &ContextKey, _ctx: &WorkContext) -> Result<(), ScopeError> {
        self.lifecycle.check_running()?;
        let deployable = self.deployable_key(key)?;
        self.contexts.ensure(deployable);
        Ok(())
    }

    async fn stop_context(&self, key: &ContextKey, ctx: &WorkContext) -> Result<(), ScopeError> {
        self.lifecycle.check_running()?;
        let deployable = self.deployable_key(key)?;

        let withdrawn = self.policy.withdraw(deployable);
        match self.contexts.remove(deployable) {
            Some(queue) => {
                self.destroy_context(deployable, &queue, ctx).await;
                Ok(())
            }
            None if withdrawn => {
                debug!("Withdrew deferred {} context {}", self.policy.scope(), deployable);
                Ok(())
            }
            None => Err(ScopeError::ContextNotFound {
                scope: self.policy.scope(),
                context: key.clone(),
            }),
        }
    }

    async fn stop_all_contexts(&self, ctx: &WorkContext) -> Result<(), ScopeError> {
        self.lifecycle.check_running()?;
        self.policy.withdraw_all();

        let mut failures = 0;
        for (deployable, queue) in self.contexts.drain_newest_first() {
            failures += self.destroy_context(&deployable, &queue, ctx).await;
        }

        if failures > 0 {
            warn!("{} instance(s) failed to stop in {} scope", failures, self.policy.scope());
        }
        info!("Stopped all {} contexts", self.policy.scope());
        Ok(())
    }

    async fn get_instance(&self, component: &Arc<dyn Component>, ctx: &WorkContext) -> Result<Instance, ScopeError> {
        Ok(self.get_unit(component, ctx).await?.instance().clone())
    }

    async fn get_wrapper(
        &self,
        component: &Arc<dyn Component>,
        ctx: &WorkContext,
    ) -> Result<Arc<InstanceWrapper>, ScopeError> {
        let unit = self.get_unit(component, ctx).await?;
        unit.wrapper()
            .cloned()
            .ok_or(ScopeError::WrapperUnsupported(self.policy.scope()))
    }

    async fn reinject(&self) -> Result<usize, ScopeError> {
        self.lifecycle.check_running()?;

        let live: Vec<Published<P::Unit>> = self.instances.iter().map(|entry| entry.value().clone()).collect();
        let mut reinjected = 0;
        let mut first_error = None;
        for published in live {
            match published.unit.reinject() {
                Ok(count) => reinjected += count,
                Err(source) => {
                    warn!("Reinjection failed for {}: {}", published.component.uri(), source);
                    if first_error.is_none() {
                        first_error = Some(ScopeError::Reinjection {
                            component: published.component.uri().clone(),
                            source,
                        });
                    }
                }
            }
        }

        match first_error {
            Some(error) => Err(error),
            None => Ok(reinjected),
        }
    }
}
