// Copyright (c) 2026 scopekeeper contributors
// SPDX-License-Identifier: AGPL-3.0

pub mod event_bus;
pub mod store;

pub use event_bus::{EventBus, EventBusError, EventReceiver};
pub use store::InMemoryInstanceWrapperStore;
