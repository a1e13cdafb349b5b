// Copyright (c) 2026 scopekeeper contributors
// SPDX-License-Identifier: AGPL-3.0
//! # Component Contract
//!
//! Identity value objects and the contract every deployed component exposes
//! to the scope containers:
//!
//! - [`ComponentUri`]: stable identity of a deployed component.
//! - [`DeployableId`]: the deployment group (composite) a component belongs to.
//! - [`ScopeKind`]: the sharing/lifetime policy declared by the component.
//! - [`Component`]: create/start/stop hooks invoked by the containers.
//! - [`Reinjectable`]: optional capability for rewiring live instances.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Defines the narrow interface deployed artifacts implement

use crate::domain::work_context::WorkContext;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// A live object backing a component.
///
/// Containers never look inside an instance; callers downcast with
/// [`downcast_instance`].
pub type Instance = Arc<dyn Any + Send + Sync>;

/// Downcast a live instance to its concrete implementation type.
pub fn downcast_instance<T: Any + Send + Sync>(instance: &Instance) -> Option<Arc<T>> {
    Arc::clone(instance).downcast::<T>().ok()
}

/// Identity of a deployed component.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ComponentUri(pub String);

impl ComponentUri {
    pub fn new(uri: impl Into<String>) -> Self {
        Self(uri.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ComponentUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identity of a deployment group: the unit that is activated and
/// deactivated atomically (typically a deployed composite).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DeployableId(pub String);

impl DeployableId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeployableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Name of a reference (wire) declared by a component.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ReferenceName(pub String);

impl ReferenceName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }
}

impl fmt::Display for ReferenceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Sharing and lifetime policy of a component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScopeKind {
    /// A fresh instance per call; nothing is retained.
    Stateless,
    /// One instance per deployment group, reinjectable when wiring changes.
    Composite,
    /// One instance per conversation, subject to expiration.
    Conversation,
    /// One bare instance per deployment group.
    Singleton,
    /// One active instance per cluster zone, hosted by the zone leader.
    Domain,
}

impl ScopeKind {
    pub const ALL: [ScopeKind; 5] = [
        ScopeKind::Stateless,
        ScopeKind::Composite,
        ScopeKind::Conversation,
        ScopeKind::Singleton,
        ScopeKind::Domain,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ScopeKind::Stateless => "stateless",
            ScopeKind::Composite => "composite",
            ScopeKind::Conversation => "conversation",
            ScopeKind::Singleton => "singleton",
            ScopeKind::Domain => "domain",
        }
    }
}

impl fmt::Display for ScopeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failures raised by component implementations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ComponentError {
    #[error("Failed to create instance: {0}")]
    ObjectCreation(String),

    #[error("Failed to initialize instance: {0}")]
    InstanceInit(String),

    #[error("Failed to destroy instance: {0}")]
    InstanceDestruction(String),

    #[error("Failed to reinject references: {0}")]
    Reinjection(String),
}

/// Capability implemented by components whose references can be rewired on a
/// live instance without recreating it.
pub trait Reinjectable: Send + Sync {
    /// Re-apply the given references to `instance`.
    fn reinject(&self, instance: &Instance, references: &[ReferenceName]) -> Result<(), ComponentError>;
}

/// A deployed component as seen by the scope containers.
///
/// Identity and flags are immutable after deployment. The lifecycle hooks may
/// be invoked concurrently for *different* instances; the containers guarantee
/// that a given instance is started at most once and stopped at most once.
#[async_trait]
pub trait Component: Send + Sync {
    fn uri(&self) -> &ComponentUri;

    /// Deployment group this component was deployed with.
    fn deployable(&self) -> &DeployableId;

    fn scope(&self) -> ScopeKind;

    /// Whether the component is instantiated as soon as its context activates.
    fn is_eager_init(&self) -> bool {
        false
    }

    async fn create_instance(&self, ctx: &WorkContext) -> Result<Instance, ComponentError>;

    async fn start_instance(&self, instance: &Instance, ctx: &WorkContext) -> Result<(), ComponentError>;

    async fn stop_instance(&self, instance: &Instance, ctx: &WorkContext) -> Result<(), ComponentError>;

    /// Rewiring capability for live instances, if the implementation supports it.
    fn reinjector(&self) -> Option<Arc<dyn Reinjectable>> {
        None
    }
}

impl fmt::Debug for dyn Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Component")
            .field("uri", self.uri())
            .field("deployable", self.deployable())
            .field("scope", &self.scope())
            .finish()
    }
}
