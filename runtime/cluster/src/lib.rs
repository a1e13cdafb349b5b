// Copyright (c) 2026 scopekeeper contributors
// SPDX-License-Identifier: AGPL-3.0
//! # `scopekeeper-cluster`: Zone Membership
//!
//! Tracks which runtimes belong to a zone and which of them leads it, and
//! tells interested parties (above all the domain scope container) when
//! leadership changes.
//!
//! ## Crate Layout
//!
//! | Module | Layer | Contents |
//! |--------|-------|----------|
//! | [`domain`] | Domain | `Zone` aggregate, `RuntimeId`, `ZoneError` |
//! | [`application`] | Application | `ZoneMembershipService` |
//!
//! ## Election Rule
//!
//! The longest-standing member of a zone is its leader. A leader that leaves
//! hands leadership to the next member in join order.
//!
//! ⚠️ Membership is tracked in memory for the local process. Discovery of
//! remote runtimes is up to the caller, which reports joins and leaves.

pub mod domain;
pub mod application;

pub use application::ZoneMembershipService;
pub use domain::*;
