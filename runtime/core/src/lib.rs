// Copyright (c) 2026 scopekeeper contributors
// SPDX-License-Identifier: AGPL-3.0
//! # `scopekeeper-core`: Component Scope Containers
//!
//! Creates, caches and destroys the in-memory instances backing deployed
//! components according to their declared scope.
//!
//! ## Crate Layout
//!
//! | Module | Layer | Contents |
//! |--------|-------|----------|
//! | [`domain`] | Domain | component contract, work context, scope container contract, events, config |
//! | [`application`] | Application | the five containers, scope registry, runtime factory |
//! | [`infrastructure`] | Infrastructure | event bus, in-memory instance-wrapper store |
//!
//! ## Scopes
//!
//! | Scope | Instances | Destroyed when |
//! |-------|-----------|----------------|
//! | stateless | one per call | released by the caller |
//! | composite | one per deployment group (wrapped, reinjectable) | group context stops |
//! | singleton | one per deployment group (bare) | group context stops |
//! | domain | one per zone, on the zone leader | group context stops |
//! | conversation | one per conversation | conversation stops or expires |

pub mod domain;
pub mod application;
pub mod infrastructure;

pub use domain::component::{Component, ComponentError, ComponentUri, DeployableId, Instance, ScopeKind};
pub use domain::scope::{ContextKey, LifecycleState, ScopeContainer, ScopeError};
pub use domain::work_context::{ConversationId, Propagation, WorkContext};
