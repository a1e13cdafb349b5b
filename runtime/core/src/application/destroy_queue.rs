// Copyright (c) 2026 scopekeeper contributors
// SPDX-License-Identifier: AGPL-3.0
//! Destroy queues.
//!
//! A [`DestroyQueue`] records live instances of one context in creation
//! order; teardown pops from the tail. [`ContextQueues`] keeps the queues of
//! all contexts in activation order so a full shutdown can visit them newest
//! first.

use crate::domain::component::Component;
use parking_lot::Mutex;
use std::sync::Arc;

pub(crate) type QueueEntry<U> = (Arc<dyn Component>, U);

pub(crate) struct DestroyQueue<U> {
    entries: Mutex<Vec<QueueEntry<U>>>,
}

impl<U: Clone> DestroyQueue<U> {
    pub(crate) fn new() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn push(&self, component: Arc<dyn Component>, unit: U) {
        self.entries.lock().push((component, unit));
    }

    /// Remove the most recently created entry. The lock is held only for the
    /// pop itself, so creations may keep appending during teardown.
    pub(crate) fn pop(&self) -> Option<QueueEntry<U>> {
        self.entries.lock().pop()
    }

    pub(crate) fn snapshot(&self) -> Vec<QueueEntry<U>> {
        self.entries.lock().clone()
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.entries.lock().len()
    }
}

/// Destroy queues of every active context, in activation order.
pub(crate) struct ContextQueues<K, U> {
    queues: Mutex<Vec<(K, Arc<DestroyQueue<U>>)>>,
}

impl<K: PartialEq + Clone, U: Clone> ContextQueues<K, U> {
    pub(crate) fn new() -> Self {
        Self {
            queues: Mutex::new(Vec::new()),
        }
    }

    /// The queue for `key`, created at the end of the activation order if the
    /// context has not been activated yet.
    pub(crate) fn ensure(&self, key: &K) -> Arc<DestroyQueue<U>> {
        self.ensure_with(key, Arc::clone)
    }

    /// Run `f` on the queue for `key`, creating it like [`Self::ensure`].
    /// The context list stays locked while `f` runs, so a concurrent
    /// `remove` or `drain_newest_first` sees either none or all of its
    /// effects.
    pub(crate) fn ensure_with<R>(&self, key: &K, f: impl FnOnce(&Arc<DestroyQueue<U>>) -> R) -> R {
        let mut queues = self.queues.lock();
        let index = match queues.iter().position(|(k, _)| k == key) {
            Some(index) => index,
            None => {
                queues.push((key.clone(), Arc::new(DestroyQueue::new())));
                queues.len() - 1
            }
        };
        f(&queues[index].1)
    }

    /// Create the queue for `key`. Returns `false` if one already existed.
    pub(crate) fn insert_new(&self, key: &K) -> bool {
        let mut queues = self.queues.lock();
        if queues.iter().any(|(k, _)| k == key) {
            return false;
        }
        queues.push((key.clone(), Arc::new(DestroyQueue::new())));
        true
    }

    #[cfg(test)]
    pub(crate) fn get(&self, key: &K) -> Option<Arc<DestroyQueue<U>>> {
        self.queues
            .lock()
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, queue)| queue.clone())
    }

    #[cfg(test)]
    pub(crate) fn contains(&self, key: &K) -> bool {
        self.queues.lock().iter().any(|(k, _)| k == key)
    }

    pub(crate) fn remove(&self, key: &K) -> Option<Arc<DestroyQueue<U>>> {
        let mut queues = self.queues.lock();
        let index = queues.iter().position(|(k, _)| k == key)?;
        Some(queues.remove(index).1)
    }

    /// Take every queue, most recently activated first.
    pub(crate) fn drain_newest_first(&self) -> Vec<(K, Arc<DestroyQueue<U>>)> {
        let mut drained = std::mem::take(&mut *self.queues.lock());
        drained.reverse();
        drained
    }

    /// Every live entry across all contexts.
    pub(crate) fn entries(&self) -> Vec<QueueEntry<U>> {
        let queues: Vec<_> = self.queues.lock().iter().map(|(_, q)| q.clone()).collect();
        queues.iter().flat_map(|queue| queue.snapshot()).collect()
    }

    pub(crate) fn keys(&self) -> Vec<K> {
        self.queues.lock().iter().map(|(k, _)| k.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::component::{ComponentError, ComponentUri, DeployableId, Instance, ScopeKind};
    use crate::domain::work_context::WorkContext;
    use async_trait::async_trait;

    struct Plain(ComponentUri, DeployableId);

    #[async_trait]
    impl Component for Plain {
        fn uri(&self) -> &ComponentUri {
            &self.0
        }
        fn deployable(&self) -> &DeployableId {
            &self.1
        }
        fn scope(&self) -> ScopeKind {
            ScopeKind::Composite
        }
        async fn create_instance(&self, _ctx: &WorkContext) -> Result<Instance, ComponentError> {
            Ok(Arc::new(()))
        }
        async fn start_instance(&self, _instance: &Instance, _ctx: &WorkContext) -> Result<(), ComponentError> {
            Ok(())
        }
        async fn stop_instance(&self, _instance: &Instance, _ctx: &WorkContext) -> Result<(), ComponentError> {
            Ok(())
        }
    }

    fn component(uri: &str) -> Arc<dyn Component> {
        Arc::new(Plain(ComponentUri::new(uri), DeployableId::new("g1")))
    }

    #[test]
    fn test_ensure_keeps_activation_position() {
        let contexts: ContextQueues<&str, u32> = ContextQueues::new();
        contexts.ensure(&"g1");
        contexts.ensure(&"g2");
        contexts.ensure(&"g1");
        assert!(!contexts.insert_new(&"g2"));
        assert!(contexts.insert_new(&"g3"));

        let order: Vec<_> = contexts.drain_newest_first().into_iter().map(|(k, _)| k).collect();
        assert_eq!(order, vec!["g3", "g2", "g1"]);
        assert!(contexts.keys().is_empty());
    }

    #[test]
    fn test_ensure_with_pushes_into_existing_or_new_queue() {
        let contexts: ContextQueues<&str, u32> = ContextQueues::new();
        contexts.ensure(&"g1");
        let pushed = contexts.ensure_with(&"g1", |queue| {
            queue.push(component("g1/a"), 1);
            queue.len()
        });
        assert_eq!(pushed, 1);

        assert!(contexts.remove(&"g1").is_some());
        contexts.ensure_with(&"g1", |queue| queue.push(component("g1/b"), 2));
        let units: Vec<_> = contexts.entries().into_iter().map(|(_, unit)| unit).collect();
        assert_eq!(units, vec![2]);
    }

    #[test]
    fn test_remove_returns_queue_with_entries() {
        let contexts: ContextQueues<&str, u32> = ContextQueues::new();
        assert!(contexts.remove(&"missing").is_none());
        assert!(!contexts.contains(&"g1"));
        contexts.ensure(&"g1");
        assert!(contexts.contains(&"g1"));
        assert_eq!(contexts.get(&"g1").map(|q| q.len()), Some(0));
        assert!(contexts.remove(&"g1").is_some());
        assert!(contexts.get(&"g1").is_none());
    }
}
