// Copyright (c) 2026 scopekeeper contributors
// SPDX-License-Identifier: AGPL-3.0
//! Conversational Scope Container
//!
//! One instance per (component, conversation). Instances are resolved through
//! the [`InstanceWrapperStore`] and torn down either when the conversation's
//! context is stopped or when its [`ExpirationPolicy`] reports it expired.
//!
//! # Expiration
//!
//! A background reaper runs on a fixed period (600s by default). Each cycle
//! takes the expired conversations out of the policy map under its lock,
//! releases the lock, and only then destroys their instances and fires their
//! expiration callbacks. Every successful lookup renews the conversation's
//! policy, so active conversations keep sliding their deadline forward.
//!
//! Callbacks are removed from the map before they run, so each fires at most
//! once whether the conversation ends by expiry or by `stop_context`.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Conversation-bound instances with time-based expiry

use crate::application::barrier::{Claim, InstantiationWait, PendingInstantiations};
use crate::application::caching::DEFAULT_WAIT_TIMEOUT;
use crate::application::destroy_queue::{ContextQueues, DestroyQueue};
use crate::application::lifecycle::ContainerLifecycle;
use crate::application::registry::ScopeRegistry;
use crate::domain::component::{Component, ComponentUri, Instance, ScopeKind};
use crate::domain::config::WaitTimeoutPolicy;
use crate::domain::events::{ScopeEvent, ScopeMonitor};
use crate::domain::expiration::{ExpirationCallback, ExpirationPolicy};
use crate::domain::instance_wrapper::{InstanceWrapper, ManagedUnit};
use crate::domain::scope::{ContextKey, LifecycleState, ScopeContainer, ScopeError};
use crate::domain::store::InstanceWrapperStore;
use crate::domain::work_context::{ConversationId, WorkContext};
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Default period between reaper cycles.
pub const DEFAULT_REAPER_PERIOD: Duration = Duration::from_secs(600);

type Wrapper = Arc<InstanceWrapper>;

pub struct ConversationalScopeContainer {
    lifecycle: ContainerLifecycle,
    store: Arc<dyn InstanceWrapperStore>,
    contexts: ContextQueues<ConversationId, Wrapper>,
    pending: PendingInstantiations<(ConversationId, ComponentUri)>,
    expirations: Mutex<HashMap<ConversationId, Arc<dyn ExpirationPolicy>>>,
    callbacks: Mutex<HashMap<ConversationId, Vec<Arc<dyn ExpirationCallback>>>>,
    reaper_period: Duration,
    reaper: Mutex<Option<JoinHandle<()>>>,
    wait: InstantiationWait,
    self_ref: Weak<Self>,
}

impl ConversationalScopeContainer {
    pub fn new(
        registry: Arc<ScopeRegistry>,
        monitor: Arc<dyn ScopeMonitor>,
        store: Arc<dyn InstanceWrapperStore>,
        reaper_period: Duration,
        wait_timeout: Duration,
        timeout_policy: WaitTimeoutPolicy,
    ) -> Arc<Self> {
        Arc::new_cyclic(|self_ref| Self {
            lifecycle: ContainerLifecycle::new(ScopeKind::Conversation, registry, monitor),
            store,
            contexts: ContextQueues::new(),
            pending: PendingInstantiations::new(),
            expirations: Mutex::new(HashMap::new()),
            callbacks: Mutex::new(HashMap::new()),
            reaper_period,
            reaper: Mutex::new(None),
            wait: InstantiationWait::new(wait_timeout, timeout_policy),
            self_ref: self_ref.clone(),
        })
    }

    pub fn with_defaults(
        registry: Arc<ScopeRegistry>,
        monitor: Arc<dyn ScopeMonitor>,
        store: Arc<dyn InstanceWrapperStore>,
    ) -> Arc<Self> {
        Self::new(
            registry,
            monitor,
            store,
            DEFAULT_REAPER_PERIOD,
            DEFAULT_WAIT_TIMEOUT,
            WaitTimeoutPolicy::Fail,
        )
    }

    pub fn reaper_period(&self) -> Duration {
        self.reaper_period
    }

    /// Conversations with an active context, in activation order.
    pub fn active_conversations(&self) -> Vec<ConversationId> {
        self.contexts.keys()
    }

    /// Number of conversations with a registered expiration policy.
    pub fn expiring_conversations(&self) -> usize {
        self.expirations.lock().len()
    }

    /// Run `callback` once when `conversation` ends.
    pub fn register_callback(&self, conversation: &ConversationId, callback: Arc<dyn ExpirationCallback>) {
        self.callbacks
            .lock()
            .entry(conversation.clone())
            .or_default()
            .push(callback);
    }

    fn conversation_key<'k>(&self, key: &'k ContextKey) -> Result<&'k ConversationId, ScopeError> {
        key.as_conversation().ok_or_else(|| ScopeError::InvalidContextKey {
            scope: ScopeKind::Conversation,
            context: key.clone(),
        })
    }

    fn renew(&self, conversation: &ConversationId) {
        let policy = self.expirations.lock().get(conversation).cloned();
        if let Some(policy) = policy {
            policy.renew();
        }
    }

    fn register_policy(&self, conversation: &ConversationId, policy: Option<Arc<dyn ExpirationPolicy>>) {
        if let Some(policy) = policy {
            self.expirations
                .lock()
                .entry(conversation.clone())
                .or_insert(policy);
        }
    }

    async fn open_conversation(
        &self,
        key: &ContextKey,
        policy: Option<Arc<dyn ExpirationPolicy>>,
    ) -> Result<(), ScopeError> {
        self.lifecycle.check_running()?;
        let conversation = self.conversation_key(key)?;

        if !self.contexts.insert_new(conversation) {
            return Err(ScopeError::ContextAlreadyActive {
                scope: ScopeKind::Conversation,
                context: key.clone(),
            });
        }
        if let Err(e) = self.store.start_context(conversation).await {
            self.contexts.remove(conversation);
            return Err(e.into());
        }
        self.register_policy(conversation, policy);

        debug!("Started conversation {}", conversation);
        self.lifecycle.record(ScopeEvent::ContextStarted {
            scope: ScopeKind::Conversation,
            context: conversation.to_string(),
            started_at: Utc::now(),
        });
        Ok(())
    }

    async fn attach_conversation(
        &self,
        key: &ContextKey,
        policy: Option<Arc<dyn ExpirationPolicy>>,
    ) -> Result<(), ScopeError> {
        self.lifecycle.check_running()?;
        let conversation = self.conversation_key(key)?;
        self.contexts.ensure(conversation);
        self.store.start_context(conversation).await?;
        self.register_policy(conversation, policy);
        Ok(())
    }

    /// Destroy a conversation's instances, drop its store entry and fire its
    /// callbacks. Returns whether there was anything to end.
    async fn end_conversation(
        &self,
        conversation: &ConversationId,
        queue: Option<Arc<DestroyQueue<Wrapper>>>,
        ctx: &WorkContext,
    ) -> bool {
        let policy = self.expirations.lock().remove(conversation);
        let callbacks = self.callbacks.lock().remove(conversation).unwrap_or_default();
        let existed = queue.is_some() || policy.is_some();

        if let Some(queue) = queue {
            let failures = self.lifecycle.destroy_queue(&queue, ctx, |_, _| {}).await;
            if failures > 0 {
                warn!("{} instance(s) of conversation {} failed to stop", failures, conversation);
            }
        }
        if let Err(e) = self.store.stop_context(conversation).await {
            warn!("Failed to clear store entries of conversation {}: {}", conversation, e);
        }
        for callback in &callbacks {
            callback.expired(conversation);
        }

        if existed {
            debug!("Ended conversation {}", conversation);
            self.lifecycle.record(ScopeEvent::ContextStopped {
                scope: ScopeKind::Conversation,
                context: conversation.to_string(),
                stopped_at: Utc::now(),
            });
        }
        existed
    }

    /// One reaper cycle: end every conversation whose policy has expired.
    /// Returns the number of conversations ended.
    pub async fn reap_expired(&self) -> usize {
        let expired: Vec<ConversationId> = {
            let mut expirations = self.expirations.lock();
            let expired: Vec<_> = expirations
                .iter()
                .filter(|(_, policy)| policy.is_expired())
                .map(|(conversation, _)| conversation.clone())
                .collect();
            for conversation in &expired {
                expirations.remove(conversation);
            }
            expired
        };

        for conversation in &expired {
            info!("Conversation {} expired", conversation);
            let ctx = WorkContext::for_conversation(conversation.clone());
            let queue = self.contexts.remove(conversation);
            self.end_conversation(conversation, queue, &ctx).await;
            self.lifecycle.record(ScopeEvent::ConversationExpired {
                conversation: conversation.clone(),
                expired_at: Utc::now(),
            });
        }
        expired.len()
    }

    fn spawn_reaper(&self, handle: &Handle) -> JoinHandle<()> {
        let container = self.self_ref.clone();
        let period = self.reaper_period;
        handle.spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(container) = container.upgrade() else {
                    break;
                };
                let reaped = container.reap_expired().await;
                if reaped > 0 {
                    debug!("Reaper ended {} expired conversation(s)", reaped);
                }
            }
        })
    }

    /// Resolve the wrapper for `component` in the caller's conversation.
    async fn resolve_wrapper(&self, component: &Arc<dyn Component>, ctx: &WorkContext) -> Result<Wrapper, ScopeError> {
        self.lifecycle.check_running()?;
        let uri = component.uri();
        let conversation = ctx
            .conversation()
            .ok_or_else(|| ScopeError::MissingConversation(uri.clone()))?;

        let mut timeouts = 0;
        loop {
            if let Some(wrapper) = self.store.get_wrapper(uri, conversation).await? {
                self.renew(conversation);
                return Ok(wrapper);
            }
            if !ctx.propagation().creates_instances() {
                return Err(ScopeError::ConversationEnded {
                    conversation: conversation.clone(),
                    component: uri.clone(),
                });
            }

            match self.pending.claim((conversation.clone(), uri.clone())) {
                Claim::Waiter(barrier) => {
                    self.wait.wait(barrier, uri, &mut timeouts).await?;
                }
                Claim::Creator(guard) => {
                    if let Some(wrapper) = self.store.get_wrapper(uri, conversation).await? {
                        self.renew(conversation);
                        return Ok(wrapper);
                    }
                    let wrapper = self.create_wrapper(component, conversation, ctx).await?;
                    drop(guard);
                    self.renew(conversation);
                    return Ok(wrapper);
                }
            }
        }
    }

    async fn create_wrapper(
        &self,
        component: &Arc<dyn Component>,
        conversation: &ConversationId,
        ctx: &WorkContext,
    ) -> Result<Wrapper, ScopeError> {
        let instance = self.lifecycle.create_instance(component, ctx).await?;
        let wrapper = <Wrapper as ManagedUnit>::wrap(component.as_ref(), instance);

        let stored = match self.store.start_context(conversation).await {
            Ok(()) => {
                self.store
                    .put_wrapper(component.uri(), conversation, wrapper.clone())
                    .await
            }
            Err(e) => Err(e),
        };
        if let Err(e) = stored {
            // Untracked instances would leak; stop it before reporting.
            self.lifecycle.destroy_unit(component, &wrapper, ctx).await;
            return Err(e.into());
        }
        self.contexts
            .ensure_with(conversation, |queue| queue.push(component.clone(), wrapper.clone()));
        Ok(wrapper)
    }
}

impl Drop for ConversationalScopeContainer {
    fn drop(&mut self) {
        if let Some(reaper) = self.reaper.get_mut().take() {
            reaper.abort();
        }
    }
}

#[async_trait]
impl ScopeContainer for ConversationalScopeContainer {
    fn scope(&self) -> ScopeKind {
        ScopeKind::Conversation
    }

    fn state(&self) -> LifecycleState {
        self.lifecycle.state()
    }

    /// Start the container and its reaper. Requires a tokio runtime.
    fn start(&self) -> Result<(), ScopeError> {
        let handle = Handle::try_current().map_err(|_| ScopeError::NoRuntime(ScopeKind::Conversation))?;
        let me: Weak<dyn ScopeContainer> = self.self_ref.clone();
        self.lifecycle.start(me)?;

        let reaper = self.spawn_reaper(&handle);
        if let Some(previous) = self.reaper.lock().replace(reaper) {
            previous.abort();
        }
        info!("Conversation reaper running every {:?}", self.reaper_period);
        Ok(())
    }

    fn stop(&self) -> Result<(), ScopeError> {
        self.lifecycle.stop()?;
        if let Some(reaper) = self.reaper.lock().take() {
            reaper.abort();
        }
        Ok(())
    }

    fn register(&self, component: Arc<dyn Component>) -> Result<(), ScopeError> {
        self.lifecycle.register(component)
    }

    fn unregister(&self, component: &Arc<dyn Component>) -> Result<(), ScopeError> {
        self.lifecycle.unregister(component)
    }

    async fn start_context(&self, key: &ContextKey, _ctx: &WorkContext) -> Result<(), ScopeError> {
        self.open_conversation(key, None).await
    }

    async fn start_expiring_context(
        &self,
        key: &ContextKey,
        _ctx: &WorkContext,
        policy: Arc<dyn ExpirationPolicy>,
    ) -> Result<(), ScopeError> {
        self.open_conversation(key, Some(policy)).await
    }

    async fn join_context(&self, key: &ContextKey, _ctx: &WorkContext) -> Result<(), ScopeError> {
        self.attach_conversation(key, None).await
    }

    async fn join_expiring_context(
        &self,
        key: &ContextKey,
        _ctx: &WorkContext,
        policy: Arc<dyn ExpirationPolicy>,
    ) -> Result<(), ScopeError> {
        self.attach_conversation(key, Some(policy)).await
    }

    async fn stop_context(&self, key: &ContextKey, ctx: &WorkContext) -> Result<(), ScopeError> {
        self.lifecycle.check_running()?;
        let conversation = self.conversation_key(key)?;
        let queue = self.contexts.remove(conversation);
        if self.end_conversation(conversation, queue, ctx).await {
            Ok(())
        } else {
            Err(ScopeError::ContextNotFound {
                scope: ScopeKind::Conversation,
                context: key.clone(),
            })
        }
    }

    async fn stop_all_contexts(&self, ctx: &WorkContext) -> Result<(), ScopeError> {
        self.lifecycle.check_running()?;
        for (conversation, queue) in self.contexts.drain_newest_first() {
            self.end_conversation(&conversation, Some(queue), ctx).await;
        }
        info!("Stopped all conversation contexts");
        Ok(())
    }

    async fn get_instance(&self, component: &Arc<dyn Component>, ctx: &WorkContext) -> Result<Instance, ScopeError> {
        Ok(self.resolve_wrapper(component, ctx).await?.instance().clone())
    }

    async fn get_wrapper(&self, component: &Arc<dyn Component>, ctx: &WorkContext) -> Result<Wrapper, ScopeError> {
        self.resolve_wrapper(component, ctx).await
    }

    async fn reinject(&self) -> Result<usize, ScopeError> {
        self.lifecycle.check_running()?;
        let mut reinjected = 0;
        let mut first_error = None;
        for (component, wrapper) in self.contexts.entries() {
            match wrapper.reinject() {
                Ok(count) => reinjected += count,
                Err(source) => {
                    warn!("Reinjection failed for {}: {}", component.uri(), source);
                    if first_error.is_none() {
                        first_error = Some(ScopeError::Reinjection {
                            component: component.uri().clone(),
                            source,
                        });
                    }
                }
            }
        }
        first_error.map_or(Ok(reinjected), Err)
    }
}
