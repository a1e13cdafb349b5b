// Copyright (c) 2026 scopekeeper contributors
// SPDX-License-Identifier: AGPL-3.0
//! # Work Context
//!
//! The call context threaded explicitly through every container operation.
//! It carries the current deployment group and, for conversational scope,
//! the conversation identity and how it propagates.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Value objects describing the caller of a lifecycle operation

use crate::domain::component::DeployableId;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Stable identity of a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConversationId(pub String);

impl ConversationId {
    /// Generate a new random `ConversationId`.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from_string(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ConversationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// How the conversation of a call relates to the callee.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Propagation {
    /// The call begins a new conversation.
    New,
    /// The caller's conversation is propagated to the callee.
    Propagate,
    /// The call continues an existing conversation; it must not start one.
    #[default]
    Continue,
}

impl Propagation {
    /// Whether a missing conversational instance may be created for this call.
    pub fn creates_instances(&self) -> bool {
        matches!(self, Propagation::New | Propagation::Propagate)
    }
}

/// Explicit call context for scope container operations.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkContext {
    deployable: Option<DeployableId>,
    conversation: Option<ConversationId>,
    propagation: Propagation,
}

impl WorkContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Context for work performed on behalf of a deployment group.
    pub fn for_deployable(deployable: DeployableId) -> Self {
        Self::new().with_deployable(deployable)
    }

    /// Context continuing an existing conversation.
    pub fn for_conversation(conversation: ConversationId) -> Self {
        Self::new().with_conversation(conversation, Propagation::Continue)
    }

    pub fn with_deployable(mut self, deployable: DeployableId) -> Self {
        self.deployable = Some(deployable);
        self
    }

    pub fn with_conversation(mut self, conversation: ConversationId, propagation: Propagation) -> Self {
        self.conversation = Some(conversation);
        self.propagation = propagation;
        self
    }

    pub fn deployable(&self) -> Option<&DeployableId> {
        self.deployable.as_ref()
    }

    pub fn conversation(&self) -> Option<&ConversationId> {
        self.conversation.as_ref()
    }

    pub fn propagation(&self) -> Propagation {
        self.propagation
    }
}
