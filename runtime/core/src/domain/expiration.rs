// Copyright (c) 2026 scopekeeper contributors
// SPDX-License-Identifier: AGPL-3.0
//! # Conversation Expiration
//!
//! Time-based expiration for conversational state, independent of explicit
//! context stop. A policy is registered per conversation, renewed on every
//! successful access, and consulted by the conversational reaper.
//!
//! | Policy | Renewal |
//! |--------|---------|
//! | [`IdleTimeoutPolicy`] | sliding: each access pushes the deadline out |
//! | [`AbsoluteTimeoutPolicy`] | none: expires at a fixed deadline |
//!
//! Both measure time with `tokio::time::Instant`, so a paused test clock
//! drives them deterministically.

use crate::domain::work_context::ConversationId;
use parking_lot::Mutex;
use std::time::Duration;
use tokio::time::Instant;

/// Expiry predicate plus renew operation for one conversation.
pub trait ExpirationPolicy: Send + Sync {
    fn is_expired(&self) -> bool;

    /// Record an access. Must be cheap: it runs on every conversational lookup.
    fn renew(&self);
}

/// Notified once when a conversation ends, by expiry or explicit stop.
pub trait ExpirationCallback: Send + Sync {
    fn expired(&self, conversation: &ConversationId);
}

impl<F> ExpirationCallback for F
where
    F: Fn(&ConversationId) + Send + Sync,
{
    fn expired(&self, conversation: &ConversationId) {
        self(conversation)
    }
}

/// Expires after a period without access.
#[derive(Debug)]
pub struct IdleTimeoutPolicy {
    idle_timeout: Duration,
    deadline: Mutex<Instant>,
}

impl IdleTimeoutPolicy {
    pub fn new(idle_timeout: Duration) -> Self {
        Self {
            idle_timeout,
            deadline: Mutex::new(Instant::now() + idle_timeout),
        }
    }

    pub fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }
}

impl ExpirationPolicy for IdleTimeoutPolicy {
    fn is_expired(&self) -> bool {
        Instant::now() >= *self.deadline.lock()
    }

    fn renew(&self) {
        *self.deadline.lock() = Instant::now() + self.idle_timeout;
    }
}

/// Expires at a fixed point in time regardless of activity.
#[derive(Debug, Clone, Copy)]
pub struct AbsoluteTimeoutPolicy {
    deadline: Instant,
}

impl AbsoluteTimeoutPolicy {
    pub fn new(lifetime: Duration) -> Self {
        Self {
            deadline: Instant::now() + lifetime,
        }
    }
}

impl ExpirationPolicy for AbsoluteTimeoutPolicy {
    fn is_expired(&self) -> bool {
        Instant::now() >= self.deadline
    }

    fn renew(&self) {}
}
