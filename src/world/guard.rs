//! World enforcement
//!
//! Single deterministic gate run first by every protocol entry point:
//! empty → `missing_world`, not allowed → `invalid_world`, closed →
//! `world_closed`. The closed list wins over the allow list.

use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;

use crate::types::CovenantError;

/// Worlds allowed when no allow-list override is configured
pub const CANONICAL_WORLDS: [&str; 4] = ["marketplace", "messaging", "social", "commerce"];

/// A world identifier that passed the guard
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct World(String);

impl World {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for World {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl PartialEq<str> for World {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

#[derive(Debug, Clone)]
pub struct WorldGuard {
    allowed: BTreeSet<String>,
    closed: BTreeSet<String>,
}

impl WorldGuard {
    /// Build a guard from explicit lists. An empty allow list falls back to
    /// [`CANONICAL_WORLDS`].
    pub fn new<A, C>(allowed: A, closed: C) -> Self
    where
        A: IntoIterator,
        A::Item: Into<String>,
        C: IntoIterator,
        C::Item: Into<String>,
    {
        let mut allowed: BTreeSet<String> = allowed
            .into_iter()
            .map(|w| normalize(w.into()))
            .filter(|w| !w.is_empty())
            .collect();
        if allowed.is_empty() {
            allowed = CANONICAL_WORLDS.iter().map(|w| w.to_string()).collect();
        }

        let closed = closed
            .into_iter()
            .map(|w| normalize(w.into()))
            .filter(|w| !w.is_empty())
            .collect();

        Self { allowed, closed }
    }

    /// Build a guard from comma-separated configuration values
    pub fn from_csv(allowed: Option<&str>, closed: Option<&str>) -> Self {
        Self::new(split_csv(allowed), split_csv(closed))
    }

    /// Validate a caller-declared world.
    pub fn enforce(&self, world_raw: &str) -> Result<World, CovenantError> {
        let world = world_raw.trim();
        if world.is_empty() {
            return Err(CovenantError::MissingWorld);
        }
        if !self.allowed.contains(world) {
            return Err(CovenantError::InvalidWorld(world.to_string()));
        }
        if self.closed.contains(world) {
            return Err(CovenantError::WorldClosed(world.to_string()));
        }
        Ok(World(world.to_string()))
    }

    pub fn allowed(&self) -> impl Iterator<Item = &str> {
        self.allowed.iter().map(String::as_str)
    }

    pub fn closed(&self) -> impl Iterator<Item = &str> {
        self.closed.iter().map(String::as_str)
    }
}

impl Default for WorldGuard {
    fn default() -> Self {
        Self::new(CANONICAL_WORLDS, Vec::<String>::new())
    }
}

fn normalize(world: String) -> String {
    world.trim().to_string()
}

fn split_csv(raw: Option<&str>) -> Vec<String> {
    raw.unwrap_or("")
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
