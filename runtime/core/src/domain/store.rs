// Copyright (c) 2026 scopekeeper contributors
// SPDX-License-Identifier: AGPL-3.0
//! # Instance-Wrapper Store
//!
//! Persistence contract used by the conversational scope container to
//! associate live instances with a conversation key, following the
//! repository pattern: the interface lives in the domain layer and is
//! implemented in `crate::infrastructure::store`.
//!
//! | Implementation | Backing |
//! |----------------|---------|
//! | `InMemoryInstanceWrapperStore` | process-local map, one entry per conversation |
//!
//! A distributed store can be plugged in without touching the container.

use crate::domain::component::ComponentUri;
use crate::domain::instance_wrapper::InstanceWrapper;
use crate::domain::work_context::ConversationId;
use async_trait::async_trait;
use std::sync::Arc;

#[async_trait]
pub trait InstanceWrapperStore: Send + Sync {
    /// Open storage for a conversation. Idempotent.
    async fn start_context(&self, conversation: &ConversationId) -> Result<(), StoreError>;

    /// Drop every wrapper stored for a conversation.
    async fn stop_context(&self, conversation: &ConversationId) -> Result<(), StoreError>;

    async fn get_wrapper(
        &self,
        component: &ComponentUri,
        conversation: &ConversationId,
    ) -> Result<Option<Arc<InstanceWrapper>>, StoreError>;

    async fn put_wrapper(
        &self,
        component: &ComponentUri,
        conversation: &ConversationId,
        wrapper: Arc<InstanceWrapper>,
    ) -> Result<(), StoreError>;
}

/// Store errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    #[error("Conversation not found in store: {0}")]
    ConversationNotFound(String),

    #[error("Store backend error: {0}")]
    Backend(String),
}
