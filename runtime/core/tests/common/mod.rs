// Copyright (c) 2026 scopekeeper contributors
// SPDX-License-Identifier: AGPL-3.0

//! Shared fixtures for the scope container integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use scopekeeper_core::application::ScopeRegistry;
use scopekeeper_core::domain::component::{Reinjectable, ReferenceName};
use scopekeeper_core::domain::events::{ScopeEvent, ScopeMonitor};
use scopekeeper_core::domain::expiration::ExpirationPolicy;
use scopekeeper_core::domain::topology::ZoneTopology;
use scopekeeper_core::{Component, ComponentError, ComponentUri, DeployableId, Instance, ScopeKind, WorkContext};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Ordered log of lifecycle hook calls shared by a set of mock components.
#[derive(Clone, Default)]
pub struct Journal {
    entries: Arc<Mutex<Vec<String>>>,
}

impl Journal {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, entry: String) {
        self.entries.lock().push(entry);
    }

    pub fn entries(&self) -> Vec<String> {
        self.entries.lock().clone()
    }

    /// Entries starting with `prefix`, with the prefix stripped.
    pub fn with_prefix(&self, prefix: &str) -> Vec<String> {
        self.entries
            .lock()
            .iter()
            .filter_map(|entry| entry.strip_prefix(prefix).map(str::to_string))
            .collect()
    }
}

pub struct MockComponent {
    uri: ComponentUri,
    deployable: DeployableId,
    scope: ScopeKind,
    eager: bool,
    create_delay: Option<Duration>,
    fail_create: AtomicBool,
    fail_stop: bool,
    reinjector: Option<Arc<dyn Reinjectable>>,
    journal: Journal,
    pub created: AtomicUsize,
    pub started: AtomicUsize,
    pub stopped: AtomicUsize,
}

impl MockComponent {
    pub fn new(uri: &str, deployable: &str, scope: ScopeKind, journal: &Journal) -> Self {
        Self {
            uri: ComponentUri::new(uri),
            deployable: DeployableId::new(deployable),
            scope,
            eager: false,
            create_delay: None,
            fail_create: AtomicBool::new(false),
            fail_stop: false,
            reinjector: None,
            journal: journal.clone(),
            created: AtomicUsize::new(0),
            started: AtomicUsize::new(0),
            stopped: AtomicUsize::new(0),
        }
    }

    pub fn eager(mut self) -> Self {
        self.eager = true;
        self
    }

    pub fn slow(mut self, delay: Duration) -> Self {
        self.create_delay = Some(delay);
        self
    }

    pub fn failing_create(self) -> Self {
        self.fail_create.store(true, Ordering::SeqCst);
        self
    }

    pub fn failing_stop(mut self) -> Self {
        self.fail_stop = true;
        self
    }

    pub fn with_reinjector(mut self, reinjector: Arc<dyn Reinjectable>) -> Self {
        self.reinjector = Some(reinjector);
        self
    }

    pub fn build(self) -> Arc<MockComponent> {
        Arc::new(self)
    }

    pub fn set_fail_create(&self, fail: bool) {
        self.fail_create.store(fail, Ordering::SeqCst);
    }

    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn stopped(&self) -> usize {
        self.stopped.load(Ordering::SeqCst)
    }
}

/// View a mock as the trait object the containers take.
pub fn component(mock: &Arc<MockComponent>) -> Arc<dyn Component> {
    mock.clone()
}

#[async_trait]
impl Component for MockComponent {
    fn uri(&self) -> &ComponentUri {
        &self.uri
    }

    fn deployable(&self) -> &DeployableId {
        &self.deployable
    }

    fn scope(&self) -> ScopeKind {
        self.scope
    }

    fn is_eager_init(&self) -> bool {
        self.eager
    }

    async fn create_instance(&self, _ctx: &WorkContext) -> Result<Instance, ComponentError> {
        self.journal.push(format!("create:{}", self.uri));
        self.created.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.create_delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(ComponentError::ObjectCreation(format!("{} refused to build", self.uri)));
        }
        Ok(Arc::new(self.uri.to_string()))
    }

    async fn start_instance(&self, _instance: &Instance, _ctx: &WorkContext) -> Result<(), ComponentError> {
        self.journal.push(format!("start:{}", self.uri));
        self.started.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn stop_instance(&self, _instance: &Instance, _ctx: &WorkContext) -> Result<(), ComponentError> {
        self.journal.push(format!("stop:{}", self.uri));
        self.stopped.fetch_add(1, Ordering::SeqCst);
        if self.fail_stop {
            return Err(ComponentError::InstanceDestruction(format!("{} is stuck", self.uri)));
        }
        Ok(())
    }

    fn reinjector(&self) -> Option<Arc<dyn Reinjectable>> {
        self.reinjector.clone()
    }
}

/// Counts every reference handed to it.
#[derive(Default)]
pub struct CountingReinjector {
    pub applied: AtomicUsize,
}

impl Reinjectable for CountingReinjector {
    fn reinject(&self, _instance: &Instance, references: &[ReferenceName]) -> Result<(), ComponentError> {
        self.applied.fetch_add(references.len(), Ordering::SeqCst);
        Ok(())
    }
}

/// Monitor that keeps every event for later assertions.
#[derive(Default)]
pub struct RecordingMonitor {
    events: Mutex<Vec<ScopeEvent>>,
}

impl RecordingMonitor {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn kinds(&self) -> Vec<&'static str> {
        self.events.lock().iter().map(ScopeEvent::kind).collect()
    }

    pub fn count(&self, kind: &str) -> usize {
        self.events.lock().iter().filter(|event| event.kind() == kind).count()
    }
}

impl ScopeMonitor for RecordingMonitor {
    fn record(&self, event: ScopeEvent) {
        self.events.lock().push(event);
    }
}

/// Expires after `limit` consecutive checks without a renewal.
pub struct TickPolicy {
    limit: u32,
    ticks: AtomicU32,
}

impl TickPolicy {
    pub fn new(limit: u32) -> Arc<Self> {
        Arc::new(Self {
            limit,
            ticks: AtomicU32::new(0),
        })
    }
}

impl ExpirationPolicy for TickPolicy {
    fn is_expired(&self) -> bool {
        self.ticks.fetch_add(1, Ordering::SeqCst) + 1 > self.limit
    }

    fn renew(&self) {
        self.ticks.store(0, Ordering::SeqCst);
    }
}

/// Zone view whose leadership the test flips by hand.
pub struct FakeTopology {
    zone: String,
    leader: AtomicBool,
}

impl FakeTopology {
    pub fn follower(zone: &str) -> Arc<Self> {
        Arc::new(Self {
            zone: zone.to_string(),
            leader: AtomicBool::new(false),
        })
    }

    pub fn promote(&self) {
        self.leader.store(true, Ordering::SeqCst);
    }
}

impl ZoneTopology for FakeTopology {
    fn zone_name(&self) -> &str {
        &self.zone
    }

    fn is_zone_leader(&self) -> bool {
        self.leader.load(Ordering::SeqCst)
    }
}

pub fn registry() -> Arc<ScopeRegistry> {
    Arc::new(ScopeRegistry::new())
}
