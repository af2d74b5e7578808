//! Capacity allocated per key.
//!
//! [`CapacityRequirementsPerKey`] maps an opaque key (an agent, a set of
//! zones) to the capacity allocated to it and keeps a running total of all
//! allocations. Every update returns a new instance: the receiver is cloned
//! and the change is replayed on the clone, so a value handed to a caller is
//! never modified behind its back.
//!
//! Two invariants hold after every operation:
//! - no key maps to a zero capacity (the key is removed instead);
//! - the total equals the sum of all per-key capacities.

use std::collections::BTreeMap;
use std::fmt;

use super::error::CapacityError;
use super::requirements::CapacityRequirements;
use super::types::{AgentUid, ZonesConfig};

/// A key under which capacity can be allocated.
pub trait CapacityKey: Ord + Clone + fmt::Display {
    /// Check if the key is unusable (e.g. an empty identifier).
    fn is_blank(&self) -> bool {
        false
    }
}

impl CapacityKey for String {
    fn is_blank(&self) -> bool {
        self.trim().is_empty()
    }
}

impl CapacityKey for AgentUid {
    fn is_blank(&self) -> bool {
        self.as_str().trim().is_empty()
    }
}

impl CapacityKey for ZonesConfig {}

/// Capacity allocated per agent.
pub type CapacityRequirementsPerAgent = CapacityRequirementsPerKey<AgentUid>;

/// Capacity allocated per set of placement zones.
pub type CapacityRequirementsPerZones = CapacityRequirementsPerKey<ZonesConfig>;

/// Copy-on-write mapping from key to allocated capacity, with a maintained
/// total.
#[derive(Debug, Clone)]
pub struct CapacityRequirementsPerKey<K> {
    capacity: BTreeMap<K, CapacityRequirements>,
    total: CapacityRequirements,
}

impl<K: CapacityKey> Default for CapacityRequirementsPerKey<K> {
    fn default() -> Self {
        Self {
            capacity: BTreeMap::new(),
            total: CapacityRequirements::zero(),
        }
    }
}

impl<K: CapacityKey> CapacityRequirementsPerKey<K> {
    /// Create an empty allocation.
    pub fn new() -> Self {
        Self::default()
    }

    /// Keys with a non-zero allocation, in key order.
    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.capacity.keys()
    }

    /// Iterate `(key, capacity)` pairs in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&K, &CapacityRequirements)> {
        self.capacity.iter()
    }

    /// Sum of all allocations.
    pub fn total(&self) -> &CapacityRequirements {
        &self.total
    }

    /// Number of keys with a non-zero allocation.
    pub fn len(&self) -> usize {
        self.capacity.len()
    }

    /// Check if nothing is allocated.
    pub fn is_empty(&self) -> bool {
        self.capacity.is_empty()
    }

    /// Check if the key has a non-zero allocation.
    pub fn contains_key(&self, key: &K) -> bool {
        self.capacity.contains_key(key)
    }

    /// The key's allocation; fails if the key has none.
    pub fn key_capacity(&self, key: &K) -> Result<&CapacityRequirements, CapacityError> {
        self.capacity
            .get(key)
            .ok_or_else(|| CapacityError::KeyNotFound(key.to_string()))
    }

    /// The key's allocation, or zero if the key has none.
    pub fn key_capacity_or_zero(&self, key: &K) -> CapacityRequirements {
        self.capacity.get(key).cloned().unwrap_or_default()
    }

    /// Add capacity to the key's allocation.
    ///
    /// Fails on a blank key or a zero capacity.
    pub fn add(&self, key: K, capacity: &CapacityRequirements) -> Result<Self, CapacityError> {
        let mut next = self.clone();
        next.add_in_place(key, capacity)?;
        Ok(next)
    }

    /// Subtract capacity from the key's allocation.
    ///
    /// Fails if the key has no allocation or the allocation would go
    /// negative. The key is removed when its allocation reaches zero.
    pub fn subtract(&self, key: &K, capacity: &CapacityRequirements) -> Result<Self, CapacityError> {
        let mut next = self.clone();
        next.subtract_in_place(key, capacity)?;
        Ok(next)
    }

    /// Subtract capacity from the key's allocation, clamping at zero.
    ///
    /// The key must have an allocation.
    pub fn subtract_or_zero(
        &self,
        key: &K,
        capacity: &CapacityRequirements,
    ) -> Result<Self, CapacityError> {
        let mut next = self.clone();
        next.subtract_or_zero_in_place(key, capacity)?;
        Ok(next)
    }

    /// Replace the key's allocation. A zero capacity removes the key.
    pub fn set(&self, key: K, capacity: &CapacityRequirements) -> Result<Self, CapacityError> {
        let mut next = self.clone();
        next.set_in_place(key, capacity)?;
        Ok(next)
    }

    /// Remove the key and its whole allocation.
    pub fn subtract_key(&self, key: &K) -> Result<Self, CapacityError> {
        let mut next = self.clone();
        let removed = next.key_capacity(key)?.clone();
        next.total = next.total.subtract(&removed)?;
        next.capacity.remove(key);
        Ok(next)
    }

    /// Add every allocation of `other`, key by key.
    pub fn add_all(&self, other: &Self) -> Result<Self, CapacityError> {
        let mut next = self.clone();
        for (key, capacity) in &other.capacity {
            next.add_in_place(key.clone(), capacity)?;
        }
        Ok(next)
    }

    /// Subtract every allocation of `other`, key by key.
    pub fn subtract_all(&self, other: &Self) -> Result<Self, CapacityError> {
        let mut next = self.clone();
        for (key, capacity) in &other.capacity {
            next.subtract_in_place(key, capacity)?;
        }
        Ok(next)
    }

    fn add_in_place(&mut self, key: K, capacity: &CapacityRequirements) -> Result<(), CapacityError> {
        if key.is_blank() {
            return Err(CapacityError::InvalidKey(key.to_string()));
        }
        if capacity.is_zero() {
            return Err(CapacityError::ZeroCapacity(key.to_string()));
        }
        let updated = self.key_capacity_or_zero(&key).add(capacity)?;
        self.total = self.total.add(capacity)?;
        self.capacity.insert(key, updated);
        Ok(())
    }

    fn subtract_in_place(
        &mut self,
        key: &K,
        capacity: &CapacityRequirements,
    ) -> Result<(), CapacityError> {
        let updated = self.key_capacity(key)?.subtract(capacity)?;
        self.total = self.total.subtract(capacity)?;
        self.put_or_remove(key.clone(), updated);
        Ok(())
    }

    fn subtract_or_zero_in_place(
        &mut self,
        key: &K,
        capacity: &CapacityRequirements,
    ) -> Result<(), CapacityError> {
        let existing = self.key_capacity(key)?;
        let updated = existing.subtract_or_zero(capacity);
        let removed = existing.subtract(&updated)?;
        self.total = self.total.subtract(&removed)?;
        self.put_or_remove(key.clone(), updated);
        Ok(())
    }

    fn set_in_place(&mut self, key: K, capacity: &CapacityRequirements) -> Result<(), CapacityError> {
        if key.is_blank() {
            return Err(CapacityError::InvalidKey(key.to_string()));
        }
        let existing = self.key_capacity_or_zero(&key);
        self.total = self.total.subtract(&existing)?.add(capacity)?;
        self.put_or_remove(key, capacity.clone());
        Ok(())
    }

    fn put_or_remove(&mut self, key: K, capacity: CapacityRequirements) {
        if capacity.is_zero() {
            self.capacity.remove(&key);
        } else {
            self.capacity.insert(key, capacity);
        }
    }
}

impl CapacityRequirementsPerKey<AgentUid> {
    /// Agents with a non-zero allocation.
    pub fn agent_uids(&self) -> impl Iterator<Item = &AgentUid> {
        self.keys()
    }

    /// The agent's allocation; fails if the agent has none.
    pub fn agent_capacity(&self, uid: &AgentUid) -> Result<&CapacityRequirements, CapacityError> {
        self.key_capacity(uid)
    }

    /// The agent's allocation, or zero.
    pub fn agent_capacity_or_zero(&self, uid: &AgentUid) -> CapacityRequirements {
        self.key_capacity_or_zero(uid)
    }

    /// Sum of all agent allocations.
    pub fn total_allocated_capacity(&self) -> &CapacityRequirements {
        self.total()
    }
}

impl CapacityRequirementsPerKey<ZonesConfig> {
    /// Zone sets with a non-zero allocation.
    pub fn zones(&self) -> impl Iterator<Item = &ZonesConfig> {
        self.keys()
    }

    /// The allocation for the zone set, or zero.
    pub fn zones_capacity_or_zero(&self, zones: &ZonesConfig) -> CapacityRequirements {
        self.key_capacity_or_zero(zones)
    }
}

impl<K: CapacityKey> PartialEq for CapacityRequirementsPerKey<K> {
    fn eq(&self, other: &Self) -> bool {
        self.capacity == other.capacity
    }
}

impl<K: CapacityKey> Eq for CapacityRequirementsPerKey<K> {}

impl<K: CapacityKey + std::hash::Hash> std::hash::Hash for CapacityRequirementsPerKey<K> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.capacity.hash(state);
    }
}

impl<K: CapacityKey> fmt::Display for CapacityRequirementsPerKey<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (key, capacity)) in self.capacity.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}: {}", key, capacity)?;
        }
        write!(f, "}}")
    }
}
