// Copyright (c) 2026 scopekeeper contributors
// SPDX-License-Identifier: AGPL-3.0
//! Membership use cases.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Drives zone membership and publishes leadership changes

pub mod membership;

pub use membership::ZoneMembershipService;
