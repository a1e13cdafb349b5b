// Copyright (c) 2026 scopekeeper contributors
// SPDX-License-Identifier: AGPL-3.0
// Event Bus Implementation - Pub/Sub for Scope Events
//
// Provides in-memory event streaming using tokio broadcast channels.
// Every recorded event is also counted through the `metrics` facade, so a
// recorder installed by the host process sees container activity without
// subscribing.

use crate::domain::component::ScopeKind;
use crate::domain::events::{ScopeEvent, ScopeMonitor};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Event bus for publishing and subscribing to scope events
#[derive(Clone)]
pub struct EventBus {
    sender: Arc<broadcast::Sender<ScopeEvent>>,
}

impl EventBus {
    /// Create a new event bus with specified channel capacity
    /// Capacity determines how many events can be buffered before dropping old ones
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Create event bus with default capacity (1000)
    pub fn with_default_capacity() -> Self {
        Self::new(1000)
    }

    /// Publish an event to all subscribers
    pub fn publish(&self, event: ScopeEvent) {
        debug!("Publishing event: {:?}", event);

        let receiver_count = self.sender.send(event).unwrap_or(0);
        if receiver_count == 0 {
            debug!("No subscribers listening to event");
        }
    }

    /// Subscribe to all scope events
    pub fn subscribe(&self) -> EventReceiver {
        EventReceiver {
            receiver: self.sender.subscribe(),
            scope: None,
        }
    }

    /// Subscribe to the events of one scope only
    pub fn subscribe_scope(&self, scope: ScopeKind) -> EventReceiver {
        EventReceiver {
            receiver: self.sender.subscribe(),
            scope: Some(scope),
        }
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl ScopeMonitor for EventBus {
    fn record(&self, event: ScopeEvent) {
        let scope = event.scope().map(|scope| scope.as_str()).unwrap_or("none");
        match &event {
            ScopeEvent::DestructionFailed { component, error, .. } => {
                warn!("Destruction of {} failed in {} scope: {}", component, scope, error);
                metrics::counter!("scopekeeper_destruction_failures_total", "scope" => scope).increment(1);
            }
            ScopeEvent::InstanceCreated { .. } => {
                metrics::counter!("scopekeeper_instances_created_total", "scope" => scope).increment(1);
            }
            ScopeEvent::InstanceDestroyed { .. } => {
                metrics::counter!("scopekeeper_instances_destroyed_total", "scope" => scope).increment(1);
            }
            ScopeEvent::ContextStarted { .. } => {
                metrics::counter!("scopekeeper_contexts_started_total", "scope" => scope).increment(1);
            }
            ScopeEvent::ContextDeferred { .. } => {
                metrics::counter!("scopekeeper_contexts_deferred_total", "scope" => scope).increment(1);
            }
            ScopeEvent::ConversationExpired { .. } => {
                metrics::counter!("scopekeeper_conversations_expired_total").increment(1);
            }
            _ => {}
        }
        self.publish(event);
    }
}

/// Receiver for scope events, optionally filtered to one scope
pub struct EventReceiver {
    receiver: broadcast::Receiver<ScopeEvent>,
    scope: Option<ScopeKind>,
}

impl EventReceiver {
    /// Receive the next matching event (waits until one is available)
    pub async fn recv(&mut self) -> Result<ScopeEvent, EventBusError> {
        loop {
            let event = self.receiver.recv().await.map_err(|e| match e {
                broadcast::error::RecvError::Closed => EventBusError::Closed,
                broadcast::error::RecvError::Lagged(n) => {
                    warn!("Event receiver lagged by {} events", n);
                    EventBusError::Lagged(n)
                }
            })?;
            if self.matches(&event) {
                return Ok(event);
            }
        }
    }

    /// Try to receive a matching event without waiting
    pub fn try_recv(&mut self) -> Result<ScopeEvent, EventBusError> {
        loop {
            let event = self.receiver.try_recv().map_err(|e| match e {
                broadcast::error::TryRecvError::Empty => EventBusError::Empty,
                broadcast::error::TryRecvError::Closed => EventBusError::Closed,
                broadcast::error::TryRecvError::Lagged(n) => {
                    warn!("Event receiver lagged by {} events", n);
                    EventBusError::Lagged(n)
                }
            })?;
            if self.matches(&event) {
                return Ok(event);
            }
        }
    }

    /// Everything currently buffered, without waiting.
    pub fn drain(&mut self) -> Vec<ScopeEvent> {
        let mut events = Vec::new();
        loop {
            match self.try_recv() {
                Ok(event) => events.push(event),
                Err(EventBusError::Lagged(_)) => continue,
                Err(_) => break,
            }
        }
        events
    }

    fn matches(&self, event: &ScopeEvent) -> bool {
        self.scope.is_none() || event.scope() == self.scope
    }
}

/// Errors that can occur when receiving events
#[derive(Debug, thiserror::Error)]
pub enum EventBusError {
    #[error("Event bus is closed")]
    Closed,

    #[error("No events available")]
    Empty,

    #[error("Receiver lagged by {0} events (events were dropped)")]
    Lagged(u64),
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}
