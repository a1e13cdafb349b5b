// Copyright (c) 2026 scopekeeper contributors
// SPDX-License-Identifier: AGPL-3.0

use crate::domain::component::ComponentUri;
use crate::domain::instance_wrapper::InstanceWrapper;
use crate::domain::store::{InstanceWrapperStore, StoreError};
use crate::domain::work_context::ConversationId;
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

type ConversationEntries = HashMap<ComponentUri, Arc<InstanceWrapper>>;

/// Process-local wrapper store. Conversations must be started before
/// wrappers can be put into them.
#[derive(Clone, Default)]
pub struct InMemoryInstanceWrapperStore {
    conversations: Arc<RwLock<HashMap<ConversationId, ConversationEntries>>>,
}

impl InMemoryInstanceWrapperStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn conversation_count(&self) -> usize {
        self.conversations.read().len()
    }

    pub fn wrapper_count(&self, conversation: &ConversationId) -> usize {
        self.conversations
            .read()
            .get(conversation)
            .map(HashMap::len)
            .unwrap_or(0)
    }
}

#[async_trait]
impl InstanceWrapperStore for InMemoryInstanceWrapperStore {
    async fn start_context(&self, conversation: &ConversationId) -> Result<(), StoreError> {
        self.conversations
            .write()
            .entry(conversation.clone())
            .or_default();
        Ok(())
    }

    async fn stop_context(&self, conversation: &ConversationId) -> Result<(), StoreError> {
        self.conversations.write().remove(conversation);
        Ok(())
    }

    async fn get_wrapper(
        &self,
        component: &ComponentUri,
        conversation: &ConversationId,
    ) -> Result<Option<Arc<InstanceWrapper>>, StoreError> {
        Ok(self
            .conversations
            .read()
            .get(conversation)
            .and_then(|entries| entries.get(component))
            .cloned())
    }

    async fn put_wrapper(
        &self,
        component: &ComponentUri,
        conversation: &ConversationId,
        wrapper: Arc<InstanceWrapper>,
    ) -> Result<(), StoreError> {
        let mut conversations = self.conversations.write();
        let entries = conversations
            .get_mut(conversation)
            .ok_or_else(|| StoreError::ConversationNotFound(conversation.to_string()))?;
        entries.insert(component.clone(), wrapper);
        Ok(())
    }
}
