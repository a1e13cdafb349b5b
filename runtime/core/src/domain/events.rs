// Copyright (c) 2026 scopekeeper contributors
// SPDX-License-Identifier: AGPL-3.0

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use crate::domain::component::{ComponentUri, ScopeKind};
use crate::domain::work_context::ConversationId;

/// Lifecycle events emitted by the scope containers.
///
/// Destruction failures travel on this channel rather than as errors so that
/// teardown of the remaining instances can continue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScopeEvent {
    ContainerStarted {
        scope: ScopeKind,
        started_at: DateTime<Utc>,
    },
    ContainerStopped {
        scope: ScopeKind,
        stopped_at: DateTime<Utc>,
    },
    InstanceCreated {
        scope: ScopeKind,
        component: ComponentUri,
        created_at: DateTime<Utc>,
    },
    InstanceDestroyed {
        scope: ScopeKind,
        component: ComponentUri,
        destroyed_at: DateTime<Utc>,
    },
    DestructionFailed {
        scope: ScopeKind,
        component: ComponentUri,
        error: String,
        failed_at: DateTime<Utc>,
    },
    ContextStarted {
        scope: ScopeKind,
        context: String,
        started_at: DateTime<Utc>,
    },
    ContextDeferred {
        scope: ScopeKind,
        context: String,
        deferred_at: DateTime<Utc>,
    },
    ContextStopped {
        scope: ScopeKind,
        context: String,
        stopped_at: DateTime<Utc>,
    },
    ConversationExpired {
        conversation: ConversationId,
        expired_at: DateTime<Utc>,
    },
    LeaderElected {
        zone: String,
        elected_at: DateTime<Utc>,
    },
}

impl ScopeEvent {
    /// Short, stable name of the event kind (used as a metrics label).
    pub fn kind(&self) -> &'static str {
        match self {
            ScopeEvent::ContainerStarted { .. } => "container_started",
            ScopeEvent::ContainerStopped { .. } => "container_stopped",
            ScopeEvent::InstanceCreated { .. } => "instance_created",
            ScopeEvent::InstanceDestroyed { .. } => "instance_destroyed",
            ScopeEvent::DestructionFailed { .. } => "destruction_failed",
            ScopeEvent::ContextStarted { .. } => "context_started",
            ScopeEvent::ContextDeferred { .. } => "context_deferred",
            ScopeEvent::ContextStopped { .. } => "context_stopped",
            ScopeEvent::ConversationExpired { .. } => "conversation_expired",
            ScopeEvent::LeaderElected { .. } => "leader_elected",
        }
    }

    pub fn scope(&self) -> Option<ScopeKind> {
        match self {
            ScopeEvent::ContainerStarted { scope, .. }
            | ScopeEvent::ContainerStopped { scope, .. }
            | ScopeEvent::InstanceCreated { scope, .. }
            | ScopeEvent::InstanceDestroyed { scope, .. }
            | ScopeEvent::DestructionFailed { scope, .. }
            | ScopeEvent::ContextStarted { scope, .. }
            | ScopeEvent::ContextDeferred { scope, .. }
            | ScopeEvent::ContextStopped { scope, .. } => Some(*scope),
            ScopeEvent::ConversationExpired { .. } => Some(ScopeKind::Conversation),
            ScopeEvent::LeaderElected { .. } => Some(ScopeKind::Domain),
        }
    }
}

/// Fault-reporting collaborator of the scope containers.
pub trait ScopeMonitor: Send + Sync {
    fn record(&self, event: ScopeEvent);
}

/// Monitor that discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMonitor;

impl ScopeMonitor for NoopMonitor {
    fn record(&self, _event: ScopeEvent) {}
}
