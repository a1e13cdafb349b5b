// Copyright (c) 2026 scopekeeper contributors
// SPDX-License-Identifier: AGPL-3.0

//! Integration tests for the caching scopes (composite, singleton, domain).
//!
//! Covers exactly-once instantiation under concurrent first access, LIFO
//! teardown within a deployment group, reverse-activation teardown across
//! groups, eager-init failure aggregation, and leader-gated activation of
//! the domain scope.

mod common;

use common::{component, registry, CountingReinjector, FakeTopology, Journal, MockComponent, RecordingMonitor};
use scopekeeper_core::application::{
    CachingScopeContainer, CompositePolicy, CompositeScopeContainer, DomainPolicy, SingletonPolicy,
};
use scopekeeper_core::domain::component::{downcast_instance, ReferenceName};
use scopekeeper_core::domain::config::WaitTimeoutPolicy;
use scopekeeper_core::domain::topology::TopologyListener;
use scopekeeper_core::{ContextKey, DeployableId, LifecycleState, ScopeContainer, ScopeError, ScopeKind, WorkContext};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

fn composite(monitor: &Arc<RecordingMonitor>) -> Arc<CompositeScopeContainer> {
    let container = CachingScopeContainer::with_defaults(CompositePolicy, registry(), monitor.clone());
    container.start().unwrap();
    container
}

fn group(name: &str) -> ContextKey {
    ContextKey::Deployable(DeployableId::new(name))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_first_access_creates_exactly_once() {
    let monitor = RecordingMonitor::new();
    let container = composite(&monitor);
    let journal = Journal::new();
    let calculator = MockComponent::new("orders/calculator", "orders", ScopeKind::Composite, &journal)
        .slow(Duration::from_millis(50))
        .build();
    container.register(component(&calculator)).unwrap();

    let mut handles = Vec::new();
    for _ in 0..32 {
        let container = container.clone();
        let calculator = component(&calculator);
        handles.push(tokio::spawn(async move {
            container.get_instance(&calculator, &WorkContext::new()).await
        }));
    }

    let mut instances = Vec::new();
    for handle in handles {
        instances.push(handle.await.unwrap().unwrap());
    }

    assert_eq!(calculator.created(), 1);
    assert_eq!(calculator.started.load(Ordering::SeqCst), 1);
    assert!(instances.iter().all(|instance| Arc::ptr_eq(instance, &instances[0])));
    assert_eq!(monitor.count("instance_created"), 1);
    assert_eq!(
        downcast_instance::<String>(&instances[0]).as_deref().map(String::as_str),
        Some("orders/calculator")
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_stop_context_racing_creation_leaves_no_instance_behind() {
    for round in 0..64u64 {
        let monitor = RecordingMonitor::new();
        let container = composite(&monitor);
        let journal = Journal::new();
        let mock = MockComponent::new("orders/cache", "orders", ScopeKind::Composite, &journal)
            .slow(Duration::from_millis(2))
            .build();
        container.register(component(&mock)).unwrap();
        let ctx = WorkContext::for_deployable(DeployableId::new("orders"));
        container.start_context(&group("orders"), &ctx).await.unwrap();

        let getter = {
            let container = container.clone();
            let handle = component(&mock);
            let ctx = ctx.clone();
            tokio::spawn(async move { container.get_instance(&handle, &ctx).await })
        };
        let stopper = {
            let container = container.clone();
            let ctx = ctx.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_micros(500 * (round % 6))).await;
                container.stop_context(&group("orders"), &ctx).await
            })
        };
        getter.await.unwrap().unwrap();
        stopper.await.unwrap().unwrap();
        container.stop_all_contexts(&ctx).await.unwrap();

        assert_eq!(mock.created(), mock.stopped(), "round {}", round);
        assert_eq!(container.live_instances(), 0, "round {}", round);
    }
}

#[tokio::test]
async fn test_stop_context_destroys_in_reverse_creation_order() {
    let monitor = RecordingMonitor::new();
    let container = composite(&monitor);
    let journal = Journal::new();
    let a = MockComponent::new("orders/a", "orders", ScopeKind::Composite, &journal).build();
    let b = MockComponent::new("orders/b", "orders", ScopeKind::Composite, &journal).build();
    container.register(component(&a)).unwrap();
    container.register(component(&b)).unwrap();
    let ctx = WorkContext::for_deployable(DeployableId::new("orders"));

    container.start_context(&group("orders"), &ctx).await.unwrap();
    container.get_instance(&component(&a), &ctx).await.unwrap();
    container.get_instance(&component(&b), &ctx).await.unwrap();
    container.stop_context(&group("orders"), &ctx).await.unwrap();

    assert_eq!(journal.with_prefix("stop:"), vec!["orders/b", "orders/a"]);
    assert_eq!(container.live_instances(), 0);

    // A later access starts over with a fresh instance.
    container.get_instance(&component(&a), &ctx).await.unwrap();
    assert_eq!(a.created(), 2);
}

#[tokio::test]
async fn test_stop_all_contexts_destroys_in_reverse_activation_order() {
    let monitor = RecordingMonitor::new();
    let container = composite(&monitor);
    let journal = Journal::new();
    let ctx = WorkContext::new();

    let mut components = Vec::new();
    for name in ["g1", "g2", "g3"] {
        let mock = MockComponent::new(&format!("{name}/service"), name, ScopeKind::Composite, &journal).build();
        container.register(component(&mock)).unwrap();
        container.start_context(&group(name), &ctx).await.unwrap();
        components.push(mock);
    }
    // Access in a different order than activation.
    for index in [2, 0, 1] {
        container.get_instance(&component(&components[index]), &ctx).await.unwrap();
    }

    assert_eq!(
        container.active_contexts(),
        vec![DeployableId::new("g1"), DeployableId::new("g2"), DeployableId::new("g3")]
    );
    container.stop_all_contexts(&ctx).await.unwrap();

    assert_eq!(journal.with_prefix("stop:"), vec!["g3/service", "g2/service", "g1/service"]);
    assert!(container.active_contexts().is_empty());
    assert_eq!(monitor.count("context_stopped"), 3);
}

#[tokio::test]
async fn test_eager_init_failures_are_aggregated() {
    let monitor = RecordingMonitor::new();
    let container = composite(&monitor);
    let journal = Journal::new();
    let broken_a = MockComponent::new("billing/a", "billing", ScopeKind::Composite, &journal)
        .eager()
        .failing_create()
        .build();
    let healthy = MockComponent::new("billing/b", "billing", ScopeKind::Composite, &journal)
        .eager()
        .build();
    let broken_c = MockComponent::new("billing/c", "billing", ScopeKind::Composite, &journal)
        .eager()
        .failing_create()
        .build();
    for mock in [&broken_a, &healthy, &broken_c] {
        container.register(component(mock)).unwrap();
    }

    let error = container
        .start_context(&group("billing"), &WorkContext::new())
        .await
        .unwrap_err();

    match &error {
        ScopeError::GroupInitialization { deployable, failures } => {
            assert_eq!(deployable, &DeployableId::new("billing"));
            let failed: Vec<_> = failures.iter().filter_map(|f| f.component().cloned()).collect();
            assert_eq!(failed.len(), 2);
            assert!(failed.iter().any(|uri| uri.as_str() == "billing/a"));
            assert!(failed.iter().any(|uri| uri.as_str() == "billing/c"));
        }
        other => panic!("expected group initialization error, got {other:?}"),
    }
    assert!(error.to_string().contains("2 eager component(s)"));
    assert_eq!(broken_a.created(), 1);
    assert_eq!(broken_c.created(), 1);
    assert_eq!(healthy.created(), 1);
    assert_eq!(container.active_contexts(), vec![DeployableId::new("billing")]);
}

#[tokio::test]
async fn test_failed_creation_is_not_queued_and_can_be_retried() {
    let monitor = RecordingMonitor::new();
    let container = composite(&monitor);
    let journal = Journal::new();
    let flaky = MockComponent::new("orders/flaky", "orders", ScopeKind::Composite, &journal)
        .failing_create()
        .build();
    container.register(component(&flaky)).unwrap();
    let ctx = WorkContext::new();

    let error = container.get_instance(&component(&flaky), &ctx).await.unwrap_err();
    assert!(matches!(error, ScopeError::InstanceCreation { .. }));
    assert!(error.is_recoverable());

    flaky.set_fail_create(false);
    container.get_instance(&component(&flaky), &ctx).await.unwrap();
    container.stop_context(&group("orders"), &ctx).await.unwrap();

    assert_eq!(flaky.created(), 2);
    assert_eq!(flaky.stopped(), 1);
}

#[tokio::test]
async fn test_destruction_failures_do_not_stop_teardown() {
    let monitor = RecordingMonitor::new();
    let container = composite(&monitor);
    let journal = Journal::new();
    let first = MockComponent::new("orders/first", "orders", ScopeKind::Composite, &journal).build();
    let stuck = MockComponent::new("orders/stuck", "orders", ScopeKind::Composite, &journal)
        .failing_stop()
        .build();
    let ctx = WorkContext::new();
    for mock in [&first, &stuck] {
        container.register(component(mock)).unwrap();
        container.get_instance(&component(mock), &ctx).await.unwrap();
    }

    container.stop_context(&group("orders"), &ctx).await.unwrap();

    assert_eq!(journal.with_prefix("stop:"), vec!["orders/stuck", "orders/first"]);
    assert_eq!(monitor.count("destruction_failed"), 1);
    assert_eq!(monitor.count("instance_destroyed"), 1);
}

#[tokio::test]
async fn test_stop_context_requires_active_context() {
    let monitor = RecordingMonitor::new();
    let container = composite(&monitor);

    let error = container
        .stop_context(&group("unknown"), &WorkContext::new())
        .await
        .unwrap_err();
    assert!(matches!(error, ScopeError::ContextNotFound { scope: ScopeKind::Composite, .. }));

    container.join_context(&group("joined"), &WorkContext::new()).await.unwrap();
    container.stop_context(&group("joined"), &WorkContext::new()).await.unwrap();
}

#[tokio::test]
async fn test_conversation_key_is_rejected() {
    let monitor = RecordingMonitor::new();
    let container = composite(&monitor);
    let key = ContextKey::Conversation(scopekeeper_core::ConversationId::from_string("c-1"));

    let error = container.start_context(&key, &WorkContext::new()).await.unwrap_err();
    assert!(matches!(error, ScopeError::InvalidContextKey { .. }));
}

#[tokio::test]
async fn test_second_stop_fails_and_container_restarts() {
    let monitor = RecordingMonitor::new();
    let registry = registry();
    let first = CachingScopeContainer::with_defaults(SingletonPolicy, registry.clone(), monitor.clone());
    first.start().unwrap();
    first.stop().unwrap();
    assert_eq!(first.state(), LifecycleState::Stopped);

    let successor = CachingScopeContainer::with_defaults(SingletonPolicy, registry.clone(), monitor.clone());
    successor.start().unwrap();

    let error = first.stop().unwrap_err();
    assert!(matches!(error, ScopeError::NotRunning { state: LifecycleState::Stopped, .. }));
    assert!(registry.get(ScopeKind::Singleton).is_some());

    // A stopped container can be started again.
    assert!(matches!(successor.start(), Err(ScopeError::AlreadyRunning(ScopeKind::Singleton))));
    first.start().unwrap();
    assert_eq!(first.state(), LifecycleState::Running);
}

#[tokio::test]
async fn test_replaced_container_stop_keeps_successor_registered() {
    let monitor = RecordingMonitor::new();
    let registry = registry();
    let first = CachingScopeContainer::with_defaults(SingletonPolicy, registry.clone(), monitor.clone());
    let successor = CachingScopeContainer::with_defaults(SingletonPolicy, registry.clone(), monitor.clone());
    first.start().unwrap();
    successor.start().unwrap();

    first.stop().unwrap();
    assert_eq!(first.state(), LifecycleState::Stopped);

    let registered = registry.get(ScopeKind::Singleton).expect("successor still registered");
    assert_eq!(registered.state(), LifecycleState::Running);
    assert!(std::ptr::addr_eq(Arc::as_ptr(&registered), Arc::as_ptr(&successor)));

    successor.stop().unwrap();
    assert!(registry.get(ScopeKind::Singleton).is_none());
}

#[tokio::test]
async fn test_operations_require_running_container() {
    let monitor = RecordingMonitor::new();
    let container = CachingScopeContainer::with_defaults(CompositePolicy, registry(), monitor.clone());
    let journal = Journal::new();
    let mock = MockComponent::new("orders/a", "orders", ScopeKind::Composite, &journal).build();

    assert!(matches!(
        container.register(component(&mock)),
        Err(ScopeError::NotRunning { state: LifecycleState::Uninitialized, .. })
    ));
    assert!(matches!(
        container.get_instance(&component(&mock), &WorkContext::new()).await,
        Err(ScopeError::NotRunning { .. })
    ));
}

#[tokio::test(start_paused = true)]
async fn test_waiter_times_out_behind_slow_creator() {
    let monitor = RecordingMonitor::new();
    let container = CachingScopeContainer::new(
        CompositePolicy,
        registry(),
        monitor.clone(),
        Duration::from_secs(1),
        WaitTimeoutPolicy::Fail,
    );
    container.start().unwrap();
    let journal = Journal::new();
    let slow = MockComponent::new("orders/slow", "orders", ScopeKind::Composite, &journal)
        .slow(Duration::from_secs(5))
        .build();
    container.register(component(&slow)).unwrap();

    let creator = {
        let container = container.clone();
        let slow = component(&slow);
        tokio::spawn(async move { container.get_instance(&slow, &WorkContext::new()).await })
    };
    tokio::task::yield_now().await;

    let error = container
        .get_instance(&component(&slow), &WorkContext::new())
        .await
        .unwrap_err();
    assert!(matches!(error, ScopeError::InstantiationTimeout { waited, .. } if waited == Duration::from_secs(1)));
    assert!(error.is_recoverable());

    assert!(creator.await.unwrap().is_ok());
    assert_eq!(slow.created(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_retry_policy_keeps_waiting_for_slow_creator() {
    let monitor = RecordingMonitor::new();
    let container = CachingScopeContainer::new(
        SingletonPolicy,
        registry(),
        monitor.clone(),
        Duration::from_secs(1),
        WaitTimeoutPolicy::Retry { attempts: 10 },
    );
    container.start().unwrap();
    let journal = Journal::new();
    let slow = MockComponent::new("orders/slow", "orders", ScopeKind::Singleton, &journal)
        .slow(Duration::from_secs(3))
        .build();
    container.register(component(&slow)).unwrap();

    let creator = {
        let container = container.clone();
        let slow = component(&slow);
        tokio::spawn(async move { container.get_instance(&slow, &WorkContext::new()).await })
    };
    tokio::task::yield_now().await;

    let waited = container.get_instance(&component(&slow), &WorkContext::new()).await.unwrap();
    let created = creator.await.unwrap().unwrap();
    assert!(Arc::ptr_eq(&waited, &created));
    assert_eq!(slow.created(), 1);
}

#[tokio::test]
async fn test_composite_reinjects_changed_references() {
    let monitor = RecordingMonitor::new();
    let container = composite(&monitor);
    let journal = Journal::new();
    let reinjector = Arc::new(CountingReinjector::default());
    let service = MockComponent::new("orders/service", "orders", ScopeKind::Composite, &journal)
        .with_reinjector(reinjector.clone())
        .build();
    container.register(component(&service)).unwrap();

    let wrapper = container.get_wrapper(&component(&service), &WorkContext::new()).await.unwrap();
    assert!(wrapper.supports_reinjection());
    wrapper.mark_reference_changed(ReferenceName::new("inventory"));
    wrapper.mark_reference_changed(ReferenceName::new("pricing"));

    assert_eq!(container.reinject().await.unwrap(), 2);
    assert_eq!(reinjector.applied.load(Ordering::SeqCst), 2);
    assert_eq!(container.reinject().await.unwrap(), 0);
}

#[tokio::test]
async fn test_singleton_holds_bare_instances() {
    let monitor = RecordingMonitor::new();
    let container = CachingScopeContainer::with_defaults(SingletonPolicy, registry(), monitor.clone());
    container.start().unwrap();
    let journal = Journal::new();
    let cache = MockComponent::new("shared/cache", "shared", ScopeKind::Singleton, &journal).build();
    container.register(component(&cache)).unwrap();

    let first = container.get_instance(&component(&cache), &WorkContext::new()).await.unwrap();
    let second = container.get_instance(&component(&cache), &WorkContext::new()).await.unwrap();
    assert!(Arc::ptr_eq(&first, &second));

    let error = container
        .get_wrapper(&component(&cache), &WorkContext::new())
        .await
        .unwrap_err();
    assert!(matches!(error, ScopeError::WrapperUnsupported(ScopeKind::Singleton)));
    assert_eq!(container.reinject().await.unwrap(), 0);
}

#[tokio::test]
async fn test_domain_context_is_deferred_until_leader_elected() {
    let monitor = RecordingMonitor::new();
    let topology = FakeTopology::follower("zone-a");
    let container = CachingScopeContainer::with_defaults(
        DomainPolicy::new(Some(topology.clone())),
        registry(),
        monitor.clone(),
    );
    container.start().unwrap();
    let journal = Journal::new();
    let ledger = MockComponent::new("finance/ledger", "finance", ScopeKind::Domain, &journal)
        .eager()
        .build();
    container.register(component(&ledger)).unwrap();
    let ctx = WorkContext::new();

    container.start_context(&group("finance"), &ctx).await.unwrap();
    assert_eq!(ledger.created(), 0);
    assert_eq!(container.policy().deferred_contexts(), vec![DeployableId::new("finance")]);

    let error = container.get_instance(&component(&ledger), &ctx).await.unwrap_err();
    assert!(matches!(error, ScopeError::TopologyNotActivated { ref zone, .. } if zone == "zone-a"));
    assert!(error.is_recoverable());

    // Elections elsewhere, or of another runtime, change nothing.
    topology.promote();
    container.on_leader_elected("zone-b").await;
    assert_eq!(ledger.created(), 0);

    container.on_leader_elected("zone-a").await;
    assert_eq!(ledger.created(), 1);
    assert!(container.policy().is_activated());
    assert!(container.policy().deferred_contexts().is_empty());

    container.get_instance(&component(&ledger), &ctx).await.unwrap();
    container.on_leader_elected("zone-a").await;
    assert_eq!(ledger.created(), 1);
    assert_eq!(monitor.count("context_deferred"), 1);
    assert_eq!(monitor.count("leader_elected"), 2);
}

#[tokio::test]
async fn test_domain_follower_ignores_election_of_other_runtime() {
    let monitor = RecordingMonitor::new();
    let topology = FakeTopology::follower("zone-a");
    let container = CachingScopeContainer::with_defaults(
        DomainPolicy::new(Some(topology.clone())),
        registry(),
        monitor.clone(),
    );
    container.start().unwrap();

    container.start_context(&group("finance"), &WorkContext::new()).await.unwrap();
    container.on_leader_elected("zone-a").await;

    assert!(!container.policy().is_activated());
    assert_eq!(container.policy().deferred_contexts().len(), 1);

    // Stopping a deferred context only withdraws it.
    container.stop_context(&group("finance"), &WorkContext::new()).await.unwrap();
    assert!(container.policy().deferred_contexts().is_empty());
}

#[tokio::test]
async fn test_domain_stop_clears_deferred_state() {
    let monitor = RecordingMonitor::new();
    let topology = FakeTopology::follower("zone-a");
    let container = CachingScopeContainer::with_defaults(
        DomainPolicy::new(Some(topology.clone())),
        registry(),
        monitor.clone(),
    );
    container.start().unwrap();
    container.start_context(&group("finance"), &WorkContext::new()).await.unwrap();

    container.stop().unwrap();
    assert!(container.policy().deferred_contexts().is_empty());

    topology.promote();
    container.start().unwrap();
    assert!(container.policy().is_activated());
}

#[tokio::test]
async fn test_domain_without_topology_behaves_as_singleton() {
    let monitor = RecordingMonitor::new();
    let container = CachingScopeContainer::with_defaults(DomainPolicy::standalone(), registry(), monitor.clone());
    container.start().unwrap();
    let journal = Journal::new();
    let ledger = MockComponent::new("finance/ledger", "finance", ScopeKind::Domain, &journal)
        .eager()
        .build();
    container.register(component(&ledger)).unwrap();

    container.start_context(&group("finance"), &WorkContext::new()).await.unwrap();
    assert_eq!(ledger.created(), 1);
}
