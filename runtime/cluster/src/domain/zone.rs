// Copyright (c) 2026 scopekeeper contributors
// SPDX-License-Identifier: AGPL-3.0
//! # Zone Aggregate
//!
//! - [`Zone`]: aggregate root tracking runtime membership in join order.
//! - [`ZoneId`]: unique identifier (UUID newtype).
//! - [`RuntimeId`]: name of one runtime participating in a zone.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier for a [`Zone`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ZoneId(pub Uuid);

impl ZoneId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ZoneId {
    fn default() -> Self {
        Self::new()
    }
}

/// Name of a runtime, unique within its zone.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RuntimeId(pub String);

impl RuntimeId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RuntimeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoneMember {
    pub runtime: RuntimeId,
    pub joined_at: DateTime<Utc>,
}

/// Aggregate root for the runtimes of one zone.
///
/// # Invariants
///
/// - A runtime appears at most once.
/// - `members` is ordered by join time; the first member is the leader.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Zone {
    pub id: ZoneId,
    pub name: String,
    members: Vec<ZoneMember>,
    pub created_at: DateTime<Utc>,
}

impl Zone {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: ZoneId::new(),
            name: name.into(),
            members: Vec::new(),
            created_at: Utc::now(),
        }
    }

    pub fn members(&self) -> &[ZoneMember] {
        &self.members
    }

    pub fn contains(&self, runtime: &RuntimeId) -> bool {
        self.members.iter().any(|member| &member.runtime == runtime)
    }

    pub fn leader(&self) -> Option<&RuntimeId> {
        self.members.first().map(|member| &member.runtime)
    }

    pub fn join(&mut self, runtime: RuntimeId) -> Result<(), ZoneError> {
        if self.contains(&runtime) {
            return Err(ZoneError::AlreadyMember {
                zone: self.name.clone(),
                runtime,
            });
        }
        self.members.push(ZoneMember {
            runtime,
            joined_at: Utc::now(),
        });
        Ok(())
    }

    pub fn leave(&mut self, runtime: &RuntimeId) -> Result<ZoneMember, ZoneError> {
        let index = self
            .members
            .iter()
            .position(|member| &member.runtime == runtime)
            .ok_or_else(|| ZoneError::UnknownMember {
                zone: self.name.clone(),
                runtime: runtime.clone(),
            })?;
        Ok(self.members.remove(index))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ZoneError {
    #[error("Runtime {runtime} is already a member of zone {zone}")]
    AlreadyMember { zone: String, runtime: RuntimeId },

    #[error("Runtime {runtime} is not a member of zone {zone}")]
    UnknownMember { zone: String, runtime: RuntimeId },
}
