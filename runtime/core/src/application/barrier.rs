// Copyright (c) 2026 scopekeeper contributors
// SPDX-License-Identifier: AGPL-3.0
//! Instantiation barriers.
//!
//! The pending map holds one single-use barrier per key while an instance
//! is being created. Exactly one caller claims the key and becomes the
//! creator; everyone else receives the barrier and waits on it. The
//! creator's [`CreatorGuard`] signals the barrier and removes the entry when
//! dropped, so waiters are released on success, on error and on panic alike.

use crate::domain::component::ComponentUri;
use crate::domain::config::WaitTimeoutPolicy;
use crate::domain::scope::ScopeError;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::hash::Hash;
use std::time::Duration;
use tokio::sync::watch;
use tracing::warn;

pub(crate) struct PendingInstantiations<K: Eq + Hash> {
    barriers: DashMap<K, watch::Receiver<bool>>,
}

pub(crate) enum Claim<'a, K: Eq + Hash + Clone> {
    Creator(CreatorGuard<'a, K>),
    Waiter(Barrier),
}

impl<K: Eq + Hash + Clone> PendingInstantiations<K> {
    pub(crate) fn new() -> Self {
        Self {
            barriers: DashMap::new(),
        }
    }

    /// Claim the right to instantiate `key`, or obtain the barrier of the
    /// caller that already holds it. The check and insert are atomic per key.
    pub(crate) fn claim(&self, key: K) -> Claim<'_, K> {
        match self.barriers.entry(key.clone()) {
            Entry::Occupied(entry) => Claim::Waiter(Barrier {
                receiver: entry.get().clone(),
            }),
            Entry::Vacant(entry) => {
                let (sender, receiver) = watch::channel(false);
                entry.insert(receiver);
                Claim::Creator(CreatorGuard {
                    pending: self,
                    key,
                    sender,
                })
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.barriers.len()
    }
}

/// Held by the single creator of an instance.
pub(crate) struct CreatorGuard<'a, K: Eq + Hash + Clone> {
    pending: &'a PendingInstantiations<K>,
    key: K,
    sender: watch::Sender<bool>,
}

impl<K: Eq + Hash + Clone> Drop for CreatorGuard<'_, K> {
    fn drop(&mut self) {
        // Signal first: a waiter that wakes must find either the published
        // instance or no barrier at all.
        let _ = self.sender.send(true);
        self.pending.barriers.remove(&self.key);
    }
}

/// Handle a waiter suspends on until the creator finishes.
pub(crate) struct Barrier {
    receiver: watch::Receiver<bool>,
}

impl Barrier {
    /// Wait until the creator signals. Returns `false` on timeout.
    pub(crate) async fn wait(mut self, timeout: Duration) -> bool {
        // A dropped sender also releases the barrier.
        tokio::time::timeout(timeout, self.receiver.wait_for(|released| *released))
            .await
            .is_ok()
    }
}

/// Bounded wait applied by every caller that finds an instantiation in flight.
#[derive(Debug, Clone, Copy)]
pub(crate) struct InstantiationWait {
    timeout: Duration,
    policy: WaitTimeoutPolicy,
}

impl InstantiationWait {
    pub(crate) fn new(timeout: Duration, policy: WaitTimeoutPolicy) -> Self {
        Self { timeout, policy }
    }

    /// Wait on `barrier`. `timeouts` counts the timeouts this caller has
    /// already hit; the policy decides whether another one is tolerated.
    pub(crate) async fn wait(
        &self,
        barrier: Barrier,
        component: &ComponentUri,
        timeouts: &mut u32,
    ) -> Result<(), ScopeError> {
        if barrier.wait(self.timeout).await {
            return Ok(());
        }
        *timeouts += 1;
        match self.policy {
            WaitTimeoutPolicy::Retry { attempts } if *timeouts <= attempts => {
                warn!(
                    "Instantiation of {} still in flight after {:?}, waiting again ({}/{})",
                    component, self.timeout, timeouts, attempts
                );
                Ok(())
            }
            _ => Err(ScopeError::InstantiationTimeout {
                component: component.clone(),
                waited: self.timeout * *timeouts,
            }),
        }
    }
}
