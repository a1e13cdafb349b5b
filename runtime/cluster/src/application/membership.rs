// Copyright (c) 2026 scopekeeper contributors
// SPDX-License-Identifier: AGPL-3.0
//! Zone Membership Service
//!
//! Owns the [`Zone`] aggregate for the zone the local runtime belongs to and
//! exposes it to the scope containers as a [`ZoneTopology`]. Joins and
//! leaves are reported to every registered [`TopologyListener`];
//! `on_leader_elected` is delivered only when the leader actually changes.
//!
//! Listeners run after the membership lock is released, so a listener may
//! query the service (for example `is_zone_leader`) without deadlocking.

use crate::domain::{RuntimeId, Zone, ZoneError};
use parking_lot::RwLock;
use scopekeeper_core::domain::config::ScopeConfigManifest;
use scopekeeper_core::domain::topology::{TopologyListener, ZoneTopology};
use std::sync::Arc;
use tracing::{debug, info};

/// Zone used when the configuration names none.
pub const DEFAULT_ZONE: &str = "default";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Change {
    Joined,
    Left,
}

pub struct ZoneMembershipService {
    zone_name: String,
    local: RuntimeId,
    zone: RwLock<Zone>,
    listeners: RwLock<Vec<Arc<dyn TopologyListener>>>,
}

impl ZoneMembershipService {
    pub fn new(zone_name: impl Into<String>, local: RuntimeId) -> Self {
        let zone_name = zone_name.into();
        Self {
            zone: RwLock::new(Zone::new(zone_name.clone())),
            zone_name,
            local,
            listeners: RwLock::new(Vec::new()),
        }
    }

    /// Service for the zone and runtime name in `config`.
    pub fn from_config(config: &ScopeConfigManifest) -> Self {
        let zone = config
            .spec
            .cluster
            .as_ref()
            .map(|cluster| cluster.zone.clone())
            .unwrap_or_else(|| DEFAULT_ZONE.to_string());
        Self::new(zone, RuntimeId::new(config.spec.runtime_name.clone()))
    }

    pub fn local_runtime(&self) -> &RuntimeId {
        &self.local
    }

    pub fn add_listener(&self, listener: Arc<dyn TopologyListener>) {
        self.listeners.write().push(listener);
    }

    pub fn leader(&self) -> Option<RuntimeId> {
        self.zone.read().leader().cloned()
    }

    /// Members in join order.
    pub fn members(&self) -> Vec<RuntimeId> {
        self.zone
            .read()
            .members()
            .iter()
            .map(|member| member.runtime.clone())
            .collect()
    }

    /// Snapshot of the zone aggregate.
    pub fn zone(&self) -> Zone {
        self.zone.read().clone()
    }

    pub async fn join(&self, runtime: RuntimeId) -> Result<(), ZoneError> {
        let (previous, current) = {
            let mut zone = self.zone.write();
            let previous = zone.leader().cloned();
            zone.join(runtime.clone())?;
            (previous, zone.leader().cloned())
        };
        info!("Runtime {} joined zone {}", runtime, self.zone_name);
        self.notify(Change::Joined, &runtime, previous, current).await;
        Ok(())
    }

    pub async fn leave(&self, runtime: &RuntimeId) -> Result<(), ZoneError> {
        let (previous, current) = {
            let mut zone = self.zone.write();
            let previous = zone.leader().cloned();
            zone.leave(runtime)?;
            (previous, zone.leader().cloned())
        };
        info!("Runtime {} left zone {}", runtime, self.zone_name);
        self.notify(Change::Left, runtime, previous, current).await;
        Ok(())
    }

    async fn notify(
        &self,
        change: Change,
        runtime: &RuntimeId,
        previous: Option<RuntimeId>,
        current: Option<RuntimeId>,
    ) {
        let listeners: Vec<_> = self.listeners.read().clone();
        for listener in &listeners {
            match change {
                Change::Joined => listener.on_join(runtime.as_str()).await,
                Change::Left => listener.on_leave(runtime.as_str()).await,
            }
        }

        if previous == current {
            return;
        }
        match &current {
            Some(leader) => {
                info!("Runtime {} elected leader of zone {}", leader, self.zone_name);
                metrics::counter!("scopekeeper_leader_elections_total", "zone" => self.zone_name.clone())
                    .increment(1);
                for listener in &listeners {
                    listener.on_leader_elected(&self.zone_name).await;
                }
            }
            None => debug!("Zone {} has no members left", self.zone_name),
        }
    }
}

impl ZoneTopology for ZoneMembershipService {
    fn zone_name(&self) -> &str {
        &self.zone_name
    }

    fn is_zone_leader(&self) -> bool {
        self.zone.read().leader() == Some(&self.local)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct RecordingListener {
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl TopologyListener for RecordingListener {
        async fn on_join(&self, runtime: &str) {
            self.calls.lock().push(format!("join:{runtime}"));
        }

        async fn on_leave(&self, runtime: &str) {
            self.calls.lock().push(format!("leave:{runtime}"));
        }

        async fn on_leader_elected(&self, zone: &str) {
            self.calls.lock().push(format!("elected:{zone}"));
        }
    }

    #[tokio::test]
    async fn test_leader_elected_only_on_change() {
        let service = ZoneMembershipService::new("zone-a", RuntimeId::new("r2"));
        let listener = Arc::new(RecordingListener::default());
        service.add_listener(listener.clone());

        service.join(RuntimeId::new("r1")).await.unwrap();
        service.join(RuntimeId::new("r2")).await.unwrap();
        assert!(!service.is_zone_leader());

        service.leave(&RuntimeId::new("r1")).await.unwrap();
        assert!(service.is_zone_leader());
        assert_eq!(service.leader(), Some(RuntimeId::new("r2")));

        assert_eq!(
            *listener.calls.lock(),
            vec!["join:r1", "elected:zone-a", "join:r2", "leave:r1", "elected:zone-a"]
        );
    }

    #[tokio::test]
    async fn test_duplicate_join_and_unknown_leave_fail() {
        let service = ZoneMembershipService::new("zone-a", RuntimeId::new("r1"));
        service.join(RuntimeId::new("r1")).await.unwrap();

        assert!(matches!(
            service.join(RuntimeId::new("r1")).await,
            Err(ZoneError::AlreadyMember { .. })
        ));
        assert!(matches!(
            service.leave(&RuntimeId::new("r7")).await,
            Err(ZoneError::UnknownMember { .. })
        ));
        assert_eq!(service.members(), vec![RuntimeId::new("r1")]);
    }

    #[test]
    fn test_from_config_uses_cluster_zone() {
        let mut config = ScopeConfigManifest::default();
        assert_eq!(ZoneMembershipService::from_config(&config).zone_name(), DEFAULT_ZONE);

        config.spec.runtime_name = "edge-7".to_string();
        config.spec.cluster = Some(scopekeeper_core::domain::config::ClusterConfig {
            zone: "eu-west".to_string(),
        });
        let service = ZoneMembershipService::from_config(&config);
        assert_eq!(service.zone_name(), "eu-west");
        assert_eq!(service.local_runtime(), &RuntimeId::new("edge-7"));
    }
}
