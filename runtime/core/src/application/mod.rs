// Copyright (c) 2026 scopekeeper contributors
// SPDX-License-Identifier: AGPL-3.0

mod barrier;
mod destroy_queue;
pub mod lifecycle;

pub mod caching;
pub mod composite;
pub mod conversational;
pub mod domain_scope;
pub mod registry;
pub mod runtime;
pub mod singleton;
pub mod stateless;

// Re-export containers for convenience
pub use caching::{CachingScopeContainer, ScopePolicy};
pub use composite::{CompositePolicy, CompositeScopeContainer};
pub use conversational::ConversationalScopeContainer;
pub use domain_scope::{DomainPolicy, DomainScopeContainer};
pub use registry::ScopeRegistry;
pub use runtime::ScopeRuntime;
pub use singleton::{SingletonPolicy, SingletonScopeContainer};
pub use stateless::StatelessScopeContainer;
