//! Core identifier types for capacity accounting and provisioning.
//!
//! These types provide type-safe identifiers for agents, reservations and
//! placement zones.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use uuid::Uuid;

/// Unique identifier of a grid service agent (one per provisioned machine).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AgentUid(String);

/// Correlation token shared by every machine started in one batch request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReservationId(Uuid);

/// Placement zones requested for (or reported by) a machine.
///
/// An empty set means "any zone". Zones are kept sorted so that two configs
/// naming the same zones compare equal regardless of insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ZonesConfig(BTreeSet<String>);

impl AgentUid {
    /// Create a new AgentUid from a string.
    pub fn new(uid: impl Into<String>) -> Self {
        Self(uid.into())
    }

    /// Get the underlying string value.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for AgentUid {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for AgentUid {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl ReservationId {
    /// Generate a new random ReservationId.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a ReservationId from an existing UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ReservationId {
    fn default() -> Self {
        Self::new()
    }
}

impl ZonesConfig {
    /// Zones config that matches any zone.
    pub fn any() -> Self {
        Self::default()
    }

    /// Create a zones config from zone names. Blank names are ignored.
    pub fn new<I, S>(zones: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(
            zones
                .into_iter()
                .map(Into::into)
                .map(|zone| zone.trim().to_string())
                .filter(|zone| !zone.is_empty())
                .collect(),
        )
    }

    /// Check if no zone is named.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Check if the given zone is named.
    pub fn contains(&self, zone: &str) -> bool {
        self.0.contains(zone)
    }

    /// Iterate the zone names in sorted order.
    pub fn zones(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl<S: Into<String>> FromIterator<S> for ZonesConfig {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self::new(iter)
    }
}

impl fmt::Display for AgentUid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for ReservationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for ZonesConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, zone) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{}", zone)?;
        }
        write!(f, "]")
    }
}
