// Copyright (c) 2026 scopekeeper contributors
// SPDX-License-Identifier: AGPL-3.0
//! # Cluster Domain Layer
//!
//! Pure membership types. No I/O dependencies.
//!
//! | Module | Key Types |
//! |--------|-----------|
//! | [`zone`] | `Zone`, `ZoneId`, `ZoneMember`, `RuntimeId`, `ZoneError` |

pub mod zone;

pub use zone::*;
