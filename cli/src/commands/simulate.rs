// Copyright (c) 2026 scopekeeper contributors
// SPDX-License-Identifier: AGPL-3.0

//! Scripted simulation of the scope containers
//!
//! Builds a [`ScopeRuntime`] from configuration and walks it through the
//! behaviours operators care about:
//!
//! 1. Deploys demo components into `--groups` deployment groups. Domain
//!    contexts are deferred because the local runtime has not joined its zone.
//! 2. Fires `--concurrency` simultaneous first accesses at every lazy
//!    composite component and checks that exactly one instance was built.
//! 3. Runs a conversation with a short idle timeout until the reaper ends it.
//! 4. Joins the zone, which elects the local runtime and activates the
//!    deferred domain contexts.
//! 5. Shuts the runtime down and prints the observed event stream.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use clap::Args;
use colored::Colorize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use scopekeeper_cluster::ZoneMembershipService;
use scopekeeper_core::application::ScopeRuntime;
use scopekeeper_core::domain::config::ScopeConfigManifest;
use scopekeeper_core::domain::events::ScopeEvent;
use scopekeeper_core::domain::expiration::IdleTimeoutPolicy;
use scopekeeper_core::{
    Component, ComponentError, ComponentUri, ContextKey, ConversationId, DeployableId, Instance, Propagation,
    ScopeContainer, ScopeKind, WorkContext,
};

/// Idle timeout of the simulated conversation.
const CONVERSATION_IDLE: Duration = Duration::from_millis(200);

/// Time each lazy component spends in construction, so that concurrent first
/// accesses overlap.
const CONSTRUCTION_DELAY: Duration = Duration::from_millis(50);

#[derive(Args, Debug, Clone)]
pub struct SimulateArgs {
    /// Simultaneous first accesses per composite component
    #[arg(long, default_value_t = 8)]
    pub concurrency: usize,

    /// Number of deployment groups to deploy
    #[arg(long, default_value_t = 2)]
    pub groups: usize,
}

/// What a simulation observed.
#[derive(Debug, Default)]
pub struct SimulationReport {
    /// Instances built per component.
    pub instances_created: BTreeMap<String, usize>,
    /// Instances destroyed per component.
    pub instances_stopped: BTreeMap<String, usize>,
    pub conversations_expired: usize,
    pub deferred_contexts: usize,
    pub leader: Option<String>,
    pub events: Vec<ScopeEvent>,
}

impl SimulationReport {
    pub fn event_counts(&self) -> BTreeMap<&'static str, usize> {
        let mut counts = BTreeMap::new();
        for event in &self.events {
            *counts.entry(event.kind()).or_default() += 1;
        }
        counts
    }
}

/// Demo component that counts its instances and can take a while to build.
struct DemoComponent {
    uri: ComponentUri,
    deployable: DeployableId,
    scope: ScopeKind,
    eager: bool,
    delay: Duration,
    created: AtomicUsize,
    stopped: AtomicUsize,
}

impl DemoComponent {
    fn new(deployable: &DeployableId, name: &str, scope: ScopeKind) -> Self {
        Self {
            uri: ComponentUri::new(format!("{}/{}", deployable, name)),
            deployable: deployable.clone(),
            scope,
            eager: false,
            delay: Duration::ZERO,
            created: AtomicUsize::new(0),
            stopped: AtomicUsize::new(0),
        }
    }

    fn eager(mut self) -> Self {
        self.eager = true;
        self
    }

    fn slow(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[async_trait]
impl Component for DemoComponent {
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
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let serial = self.created.fetch_add(1, Ordering::SeqCst) + 1;
        debug!("Built {} #{}", self.uri, serial);
        Ok(Arc::new(format!("{}#{}", self.uri, serial)))
    }

    async fn start_instance(&self, _instance: &Instance, _ctx: &WorkContext) -> Result<(), ComponentError> {
        Ok(())
    }

    async fn stop_instance(&self, _instance: &Instance, _ctx: &WorkContext) -> Result<(), ComponentError> {
        self.stopped.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub async fn execute(args: SimulateArgs, config_path: Option<PathBuf>) -> Result<()> {
    let config = ScopeConfigManifest::load_or_default(config_path).context("Failed to load configuration")?;
    config.validate().context("Configuration validation failed")?;

    println!(
        "Simulating runtime {} with {} group(s) and {} concurrent access(es)...",
        config.spec.runtime_name.bold(),
        args.groups,
        args.concurrency
    );
    let report = run(config, &args).await?;
    print_report(&report);
    Ok(())
}

/// Run the simulation against `config` and report what happened.
pub async fn run(config: ScopeConfigManifest, args: &SimulateArgs) -> Result<SimulationReport> {
    if args.groups == 0 || args.concurrency == 0 {
        bail!("--groups and --concurrency must be greater than zero");
    }

    let membership = Arc::new(ZoneMembershipService::from_config(&config));
    let runtime = ScopeRuntime::builder(config).topology(membership.clone()).build();
    membership.add_listener(runtime.domain().clone());
    let mut events = runtime.events().subscribe();
    runtime.start()?;

    let mut components: Vec<Arc<DemoComponent>> = Vec::new();
    let mut deployables = Vec::new();
    for group in 0..args.groups {
        let deployable = DeployableId::new(format!("group-{}", group));
        let group_components = [
            DemoComponent::new(&deployable, "catalog", ScopeKind::Composite).slow(CONSTRUCTION_DELAY),
            DemoComponent::new(&deployable, "audit", ScopeKind::Composite).eager(),
            DemoComponent::new(&deployable, "settings", ScopeKind::Singleton).eager(),
            DemoComponent::new(&deployable, "scheduler", ScopeKind::Domain).eager(),
        ];
        for component in group_components {
            let component = Arc::new(component);
            let handle: Arc<dyn Component> = component.clone();
            runtime.container(component.scope)?.register(handle)?;
            components.push(component);
        }
        deployables.push(deployable);
    }

    // Step 1: activate every group in every caching scope.
    for deployable in &deployables {
        let ctx = WorkContext::for_deployable(deployable.clone());
        let key = ContextKey::Deployable(deployable.clone());
        for scope in [ScopeKind::Composite, ScopeKind::Singleton, ScopeKind::Domain] {
            runtime
                .container(scope)?
                .start_context(&key, &ctx)
                .await
                .with_context(|| format!("Failed to start {} context {}", scope, deployable))?;
        }
    }
    let deferred_contexts = runtime.domain().policy().deferred_contexts().len();
    info!("{} domain context(s) waiting for leadership", deferred_contexts);

    // Step 2: concurrent first access.
    let composite = runtime.container(ScopeKind::Composite)?;
    for component in components.iter().filter(|c| c.scope == ScopeKind::Composite && !c.eager) {
        let handle: Arc<dyn Component> = component.clone();
        let ctx = WorkContext::for_deployable(component.deployable.clone());
        let accesses = (0..args.concurrency).map(|_| composite.get_instance(&handle, &ctx));
        let instances = futures::future::try_join_all(accesses).await?;
        if instances.windows(2).any(|pair| !Arc::ptr_eq(&pair[0], &pair[1])) {
            bail!("Concurrent accesses to {} observed different instances", component.uri);
        }
    }

    // Step 3: a conversation that is allowed to expire.
    let cart = Arc::new(DemoComponent::new(&DeployableId::new("storefront"), "cart", ScopeKind::Conversation));
    let cart_handle: Arc<dyn Component> = cart.clone();
    let conversational = runtime.conversational();
    conversational.register(cart_handle.clone())?;
    let conversation = ConversationId::new();
    let key = ContextKey::Conversation(conversation.clone());
    let ctx = WorkContext::new().with_conversation(conversation.clone(), Propagation::New);
    let policy = Arc::new(IdleTimeoutPolicy::new(CONVERSATION_IDLE));
    conversational.start_expiring_context(&key, &ctx, policy).await?;
    conversational.get_instance(&cart_handle, &ctx).await?;
    tokio::time::sleep(CONVERSATION_IDLE * 2).await;
    let conversations_expired = conversational.reap_expired().await;

    // Step 4: join the zone and take leadership.
    membership
        .join(membership.local_runtime().clone())
        .await
        .context("Failed to join zone")?;
    let leader = membership.leader().map(|leader| leader.to_string());

    // Step 5: tear everything down.
    runtime.shutdown(&WorkContext::new()).await?;
    components.push(cart);

    let mut report = SimulationReport {
        conversations_expired,
        deferred_contexts,
        leader,
        events: events.drain(),
        ..SimulationReport::default()
    };
    for component in &components {
        report
            .instances_created
            .insert(component.uri.to_string(), component.created.load(Ordering::SeqCst));
        report
            .instances_stopped
            .insert(component.uri.to_string(), component.stopped.load(Ordering::SeqCst));
    }
    Ok(report)
}

fn print_report(report: &SimulationReport) {
    println!();
    println!("{}", "Events:".bold());
    for event in &report.events {
        let scope = event.scope().map(|scope| scope.as_str()).unwrap_or("-");
        println!("  {:<22} {}", event.kind(), scope.dimmed());
    }
    println!();

    println!("{}", "Event totals:".bold());
    for (kind, count) in report.event_counts() {
        println!("  {:<22} {}", kind, count);
    }
    println!();

    println!("{}", "Instances (created / stopped):".bold());
    for (component, created) in &report.instances_created {
        let stopped = report.instances_stopped.get(component).copied().unwrap_or(0);
        let line = format!("  {:<28} {} / {}", component, created, stopped);
        if *created == stopped {
            println!("{}", line);
        } else {
            println!("{}", line.yellow());
        }
    }
    println!();

    println!("Deferred domain contexts: {}", report.deferred_contexts);
    println!("Conversations expired: {}", report.conversations_expired);
    match &report.leader {
        Some(leader) => println!("Zone leader: {}", leader),
        None => println!("Zone leader: {}", "(none)".dimmed()),
    }
    println!();
    println!("{}", "✓ Simulation complete".green());
}
