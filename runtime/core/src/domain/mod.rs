// Copyright (c) 2026 scopekeeper contributors
// SPDX-License-Identifier: AGPL-3.0
//! Domain
//!
//! Contracts and value objects shared by every scope container.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Pure types; no scheduling, no storage

pub mod component;
pub mod config;
pub mod events;
pub mod expiration;
pub mod instance_wrapper;
pub mod scope;
pub mod store;
pub mod topology;
pub mod work_context;
