// Copyright (c) 2026 scopekeeper contributors
// SPDX-License-Identifier: AGPL-3.0
//! # Cluster Topology Contracts
//!
//! The domain scope container hosts its instances only on the elected
//! leader of the local zone. It learns about leadership through these two
//! interfaces; `scopekeeper-cluster` provides the membership implementation.

use async_trait::async_trait;

/// Read-only view of the local runtime's zone.
pub trait ZoneTopology: Send + Sync {
    fn zone_name(&self) -> &str;

    /// Whether the local runtime currently leads its zone.
    fn is_zone_leader(&self) -> bool;
}

/// Membership notifications delivered to interested parties.
#[async_trait]
pub trait TopologyListener: Send + Sync {
    async fn on_join(&self, _runtime: &str) {}

    async fn on_leave(&self, _runtime: &str) {}

    /// A new leader was elected in `zone`.
    async fn on_leader_elected(&self, zone: &str);
}
