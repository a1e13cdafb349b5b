// Copyright (c) 2026 scopekeeper contributors
// SPDX-License-Identifier: AGPL-3.0
//! # Scope Container Contract
//!
//! The interface the deployment and invocation pipelines use to route
//! lifecycle calls to the container responsible for a [`ScopeKind`].
//!
//! ## Container State Machine
//! | From | Operation | To |
//! |------|-----------|----|
//! | `Uninitialized` / `Stopped` | `start()` | `Running` |
//! | `Running` | `stop()` | `Stopped` |
//!
//! Every other operation requires `Running`.
//!
//! ## Error Taxonomy
//! | Variant group | Meaning | Retry? |
//! |---------------|---------|--------|
//! | `NotRunning`, `AlreadyRunning`, `ContextNotFound`, ... | ordering/programming error | no |
//! | `InstanceCreation`, `InstantiationTimeout` | instance could not be produced | yes |
//! | `GroupInitialization` | one or more eager components failed | no |
//! | `ConversationEnded` | non-propagating access to a missing conversation | no |
//! | `TopologyNotActivated` | domain instance requested on a non-leader | after election |

use crate::domain::component::{Component, ComponentError, ComponentUri, DeployableId, Instance, ScopeKind};
use crate::domain::expiration::ExpirationPolicy;
use crate::domain::instance_wrapper::InstanceWrapper;
use crate::domain::store::StoreError;
use crate::domain::work_context::{ConversationId, WorkContext};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Lifecycle state of a scope container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleState {
    #[default]
    Uninitialized,
    Running,
    Stopped,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LifecycleState::Uninitialized => "uninitialized",
            LifecycleState::Running => "running",
            LifecycleState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// The addressable unit destroy queues and init queues are partitioned by.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum ContextKey {
    /// Composite, singleton and domain scope: the deployment group.
    Deployable(DeployableId),
    /// Conversational scope: the conversation identity.
    Conversation(ConversationId),
}

impl ContextKey {
    pub fn as_deployable(&self) -> Option<&DeployableId> {
        match self {
            ContextKey::Deployable(id) => Some(id),
            ContextKey::Conversation(_) => None,
        }
    }

    pub fn as_conversation(&self) -> Option<&ConversationId> {
        match self {
            ContextKey::Conversation(id) => Some(id),
            ContextKey::Deployable(_) => None,
        }
    }
}

impl From<DeployableId> for ContextKey {
    fn from(id: DeployableId) -> Self {
        ContextKey::Deployable(id)
    }
}

impl From<ConversationId> for ContextKey {
    fn from(id: ConversationId) -> Self {
        ContextKey::Conversation(id)
    }
}

impl fmt::Display for ContextKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContextKey::Deployable(id) => write!(f, "deployable:{}", id),
            ContextKey::Conversation(id) => write!(f, "conversation:{}", id),
        }
    }
}

/// Scope container errors
#[derive(Debug, Error)]
pub enum ScopeError {
    #[error("{scope} scope container is not running (state: {state})")]
    NotRunning { scope: ScopeKind, state: LifecycleState },

    #[error("{0} scope container is already running")]
    AlreadyRunning(ScopeKind),

    #[error("Context not found in {scope} scope: {context}")]
    ContextNotFound { scope: ScopeKind, context: ContextKey },

    #[error("Context already active in {scope} scope: {context}")]
    ContextAlreadyActive { scope: ScopeKind, context: ContextKey },

    #[error("{scope} scope cannot be addressed by context key {context}")]
    InvalidContextKey { scope: ScopeKind, context: ContextKey },

    #[error("No conversation in work context for component {0}")]
    MissingConversation(ComponentUri),

    #[error("{0} scope does not manage instance wrappers")]
    WrapperUnsupported(ScopeKind),

    #[error("No scope container registered for {0} scope")]
    ScopeNotRegistered(ScopeKind),

    #[error("Error creating instance for component {component}: {source}")]
    InstanceCreation {
        component: ComponentUri,
        #[source]
        source: ComponentError,
    },

    #[error("Timed out after {waited:?} waiting for component {component} to be instantiated")]
    InstantiationTimeout { component: ComponentUri, waited: Duration },

    #[error("Error initializing {} eager component(s) in deployable {deployable}: {}", .failures.len(), summarize(.failures))]
    GroupInitialization {
        deployable: DeployableId,
        failures: Vec<ScopeError>,
    },

    #[error("Conversation {conversation} has ended for component {component}")]
    ConversationEnded {
        conversation: ConversationId,
        component: ComponentUri,
    },

    #[error("Component {component} is not active: zone {zone} has not activated this runtime")]
    TopologyNotActivated { component: ComponentUri, zone: String },

    #[error("Error reinjecting references of component {component}: {source}")]
    Reinjection {
        component: ComponentUri,
        #[source]
        source: ComponentError,
    },

    #[error("Instance store error: {0}")]
    Store(#[from] StoreError),

    #[error("{0} scope container requires a running tokio runtime")]
    NoRuntime(ScopeKind),
}

impl ScopeError {
    /// Whether retrying the failed operation may succeed.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ScopeError::InstanceCreation { .. }
                | ScopeError::InstantiationTimeout { .. }
                | ScopeError::TopologyNotActivated { .. }
                | ScopeError::Store(_)
        )
    }

    /// The component a failure refers to, when it refers to one.
    pub fn component(&self) -> Option<&ComponentUri> {
        match self {
            ScopeError::MissingConversation(component)
            | ScopeError::InstanceCreation { component, .. }
            | ScopeError::InstantiationTimeout { component, .. }
            | ScopeError::ConversationEnded { component, .. }
            | ScopeError::TopologyNotActivated { component, .. }
            | ScopeError::Reinjection { component, .. } => Some(component),
            _ => None,
        }
    }
}

fn summarize(failures: &[ScopeError]) -> String {
    failures
        .iter()
        .map(|failure| failure.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Manages the live instances of every component declaring one scope kind.
///
/// All operations may be called concurrently. Long-running work (instance
/// creation, start and stop hooks) never runs while a container lock is held,
/// so unrelated components never serialize behind each other.
#[async_trait]
pub trait ScopeContainer: Send + Sync {
    fn scope(&self) -> ScopeKind;

    fn state(&self) -> LifecycleState;

    /// Transition to `Running` and register with the scope registry.
    fn start(&self) -> Result<(), ScopeError>;

    /// Transition to `Stopped` and unregister from the scope registry.
    fn stop(&self) -> Result<(), ScopeError>;

    fn register(&self, component: Arc<dyn Component>) -> Result<(), ScopeError>;

    fn unregister(&self, component: &Arc<dyn Component>) -> Result<(), ScopeError>;

    /// Activate a context, running eager initialization where the scope has any.
    async fn start_context(&self, key: &ContextKey, ctx: &WorkContext) -> Result<(), ScopeError>;

    /// Activate a context whose lifetime is bounded by `policy`. Scopes without
    /// expiration ignore the policy.
    async fn start_expiring_context(
        &self,
        key: &ContextKey,
        ctx: &WorkContext,
        policy: Arc<dyn ExpirationPolicy>,
    ) -> Result<(), ScopeError> {
        let _ = policy;
        self.start_context(key, ctx).await
    }

    /// Associate the caller with a context that may already be active elsewhere.
    async fn join_context(&self, key: &ContextKey, ctx: &WorkContext) -> Result<(), ScopeError>;

    async fn join_expiring_context(
        &self,
        key: &ContextKey,
        ctx: &WorkContext,
        policy: Arc<dyn ExpirationPolicy>,
    ) -> Result<(), ScopeError> {
        let _ = policy;
        self.join_context(key, ctx).await
    }

    /// Destroy the instances of one context in reverse creation order.
    async fn stop_context(&self, key: &ContextKey, ctx: &WorkContext) -> Result<(), ScopeError>;

    /// Destroy every context in reverse activation order.
    async fn stop_all_contexts(&self, ctx: &WorkContext) -> Result<(), ScopeError>;

    /// Resolve the instance backing `component`, creating it on first access.
    async fn get_instance(&self, component: &Arc<dyn Component>, ctx: &WorkContext) -> Result<Instance, ScopeError>;

    /// Resolve the wrapper backing `component` for scopes that keep wrappers.
    async fn get_wrapper(
        &self,
        component: &Arc<dyn Component>,
        ctx: &WorkContext,
    ) -> Result<Arc<InstanceWrapper>, ScopeError> {
        let _ = (component, ctx);
        Err(ScopeError::WrapperUnsupported(self.scope()))
    }

    /// Hand an instance back after a call. Only scopes that do not cache
    /// instances act on it.
    async fn release_instance(
        &self,
        component: &Arc<dyn Component>,
        instance: Instance,
        ctx: &WorkContext,
    ) -> Result<(), ScopeError> {
        let _ = (component, instance, ctx);
        Ok(())
    }

    /// Apply pending reference changes to every live instance. Returns the
    /// number of references reinjected.
    async fn reinject(&self) -> Result<usize, ScopeError> {
        Ok(0)
    }
}
