//! Grid service agents started by machine provisioning.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::core::types::{AgentUid, ReservationId, ZonesConfig};

/// A grid service agent running on a provisioned machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridServiceAgent {
    uid: AgentUid,
    host_address: String,
    #[serde(default)]
    zones: ZonesConfig,
    reservation_id: Option<ReservationId>,
}

impl GridServiceAgent {
    /// Create an agent with no zones and no reservation.
    pub fn new(uid: impl Into<AgentUid>, host_address: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            host_address: host_address.into(),
            zones: ZonesConfig::any(),
            reservation_id: None,
        }
    }

    /// Builder: set the zones the agent runs in.
    pub fn with_zones(mut self, zones: ZonesConfig) -> Self {
        self.zones = zones;
        self
    }

    /// Builder: tag the agent with the reservation it was started under.
    pub fn with_reservation_id(mut self, reservation_id: ReservationId) -> Self {
        self.reservation_id = Some(reservation_id);
        self
    }

    pub fn uid(&self) -> &AgentUid {
        &self.uid
    }

    pub fn host_address(&self) -> &str {
        &self.host_address
    }

    pub fn zones(&self) -> &ZonesConfig {
        &self.zones
    }

    /// The reservation the agent was started under, if it was started by
    /// this process.
    pub fn reservation_id(&self) -> Option<&ReservationId> {
        self.reservation_id.as_ref()
    }
}

impl fmt::Display for GridServiceAgent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.uid, self.host_address)
    }
}
