// Copyright (c) 2026 scopekeeper contributors
// SPDX-License-Identifier: AGPL-3.0
//! Domain Scope
//!
//! A singleton with one extra gate: across a cluster, a domain-scoped
//! component has exactly one active instance, hosted by the elected leader
//! of its zone.
//!
//! On a non-leader runtime `start_context` is deferred instead of executed,
//! and `get_instance` fails with [`ScopeError::TopologyNotActivated`]. When
//! a [`TopologyListener::on_leader_elected`] notification names the local
//! zone and the local runtime now leads it, the deferred contexts run in the
//! order they were requested and the container becomes activated.
//!
//! Without a topology the container behaves exactly like the singleton
//! scope.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Leader-gated singleton instances

use crate::application::caching::{Admission, CachingScopeContainer, ScopePolicy};
use crate::domain::component::{Component, DeployableId, Instance, ScopeKind};
use crate::domain::events::ScopeEvent;
use crate::domain::scope::ScopeError;
use crate::domain::topology::{TopologyListener, ZoneTopology};
use crate::domain::work_context::WorkContext;
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct DomainPolicy {
    topology: Option<Arc<dyn ZoneTopology>>,
    /// Activation flag and deferred contexts share one lock so a deferral
    /// can never slip past an activation in progress.
    gate: Mutex<Gate>,
}

#[derive(Default)]
struct Gate {
    activated: bool,
    deferred: Vec<(DeployableId, WorkContext)>,
}

impl DomainPolicy {
    pub fn new(topology: Option<Arc<dyn ZoneTopology>>) -> Self {
        Self {
            topology,
            gate: Mutex::new(Gate::default()),
        }
    }

    /// Policy for a runtime outside any cluster.
    pub fn standalone() -> Self {
        Self::new(None)
    }

    pub fn topology(&self) -> Option<&Arc<dyn ZoneTopology>> {
        self.topology.as_ref()
    }

    pub fn is_activated(&self) -> bool {
        self.topology.is_none() || self.gate.lock().activated
    }

    /// Deployment groups waiting for leadership, in request order.
    pub fn deferred_contexts(&self) -> Vec<DeployableId> {
        self.gate.lock().deferred.iter().map(|(key, _)| key.clone()).collect()
    }

    /// Mark the container activated and hand back the deferred contexts.
    fn activate(&self) -> Vec<(DeployableId, WorkContext)> {
        let mut gate = self.gate.lock();
        gate.activated = true;
        std::mem::take(&mut gate.deferred)
    }

    fn is_local_leader(&self) -> bool {
        self.topology.as_ref().is_none_or(|topology| topology.is_zone_leader())
    }
}

impl ScopePolicy for DomainPolicy {
    type Unit = Instance;

    fn scope(&self) -> ScopeKind {
        ScopeKind::Domain
    }

    fn admit(&self, deployable: &DeployableId, ctx: &WorkContext) -> Admission {
        let mut gate = self.gate.lock();
        if gate.activated || self.is_local_leader() {
            gate.activated = true;
            return Admission::Proceed;
        }
        gate.deferred.push((deployable.clone(), ctx.clone()));
        Admission::Deferred
    }

    fn check_access(&self, component: &dyn Component) -> Result<(), ScopeError> {
        match &self.topology {
            Some(topology) if !self.gate.lock().activated => Err(ScopeError::TopologyNotActivated {
                component: component.uri().clone(),
                zone: topology.zone_name().to_string(),
            }),
            _ => Ok(()),
        }
    }

    fn withdraw(&self, deployable: &DeployableId) -> bool {
        let mut gate = self.gate.lock();
        let before = gate.deferred.len();
        gate.deferred.retain(|(key, _)| key != deployable);
        gate.deferred.len() != before
    }

    fn withdraw_all(&self) {
        self.gate.lock().deferred.clear();
    }

    fn on_start(&self) {
        if self.is_local_leader() {
            self.gate.lock().activated = true;
        }
    }

    fn reset(&self) {
        let mut gate = self.gate.lock();
        gate.activated = false;
        gate.deferred.clear();
    }
}

pub type DomainScopeContainer = CachingScopeContainer<DomainPolicy>;

#[async_trait]
impl TopologyListener for CachingScopeContainer<DomainPolicy> {
    async fn on_leader_elected(&self, zone: &str) {
        let Some(topology) = self.policy().topology() else {
            return;
        };
        if zone != topology.zone_name() {
            debug!("Ignoring leader election in foreign zone {}", zone);
            return;
        }
        if !topology.is_zone_leader() {
            debug!("Leader elected in zone {} is another runtime", zone);
            return;
        }
        if self.lifecycle().check_running().is_err() {
            return;
        }

        let deferred = self.policy().activate();
        info!(
            "Runtime elected leader of zone {}, activating {} deferred context(s)",
            zone,
            deferred.len()
        );
        self.lifecycle().record(ScopeEvent::LeaderElected {
            zone: zone.to_string(),
            elected_at: Utc::now(),
        });

        for (deployable, ctx) in deferred {
            if let Err(e) = self.activate_context(&deployable, &ctx).await {
                warn!("Failed to activate deferred context {}: {}", deployable, e);
            }
        }
    }
}
