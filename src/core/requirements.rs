//! Immutable multi-dimensional capacity.
//!
//! [`CapacityRequirements`] holds at most one [`CapacityRequirement`] per
//! [`CapacityRequirementType`]. Zero-valued requirements are never stored: a
//! missing type is equivalent to its zero value, so equality, comparison and
//! arithmetic are all "per type, zero-extended".

use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::fmt;

use super::error::CapacityError;
use super::requirement::{CapacityRequirement, CapacityRequirementType};

/// An immutable set of distinct-typed, non-zero capacity requirements.
///
/// Every arithmetic operation returns a new instance.
///
/// # Example
///
/// ```
/// use machina::{CapacityRequirement, CapacityRequirements};
///
/// let a = CapacityRequirements::from_requirement(CapacityRequirement::memory_mb(1024));
/// let b = CapacityRequirements::from_requirement(CapacityRequirement::memory_mb(512));
///
/// let sum = a.add(&b).unwrap();
/// assert_eq!(sum, CapacityRequirements::from_requirement(CapacityRequirement::memory_mb(1536)));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct CapacityRequirements {
    requirements: BTreeMap<CapacityRequirementType, u64>,
}

impl CapacityRequirements {
    /// Create from a list of requirements.
    ///
    /// Zero requirements are dropped. Two non-zero requirements of the same
    /// type are rejected rather than merged.
    pub fn new<I>(requirements: I) -> Result<Self, CapacityError>
    where
        I: IntoIterator<Item = CapacityRequirement>,
    {
        let mut map = BTreeMap::new();
        for requirement in requirements {
            if requirement.is_zero() {
                continue;
            }
            match map.entry(requirement.requirement_type().clone()) {
                Entry::Vacant(entry) => {
                    entry.insert(requirement.amount());
                }
                Entry::Occupied(entry) => {
                    return Err(CapacityError::DuplicateRequirementType(entry.key().name()));
                }
            }
        }
        Ok(Self { requirements: map })
    }

    /// Capacity made of a single requirement.
    pub fn from_requirement(requirement: CapacityRequirement) -> Self {
        let mut requirements = BTreeMap::new();
        if !requirement.is_zero() {
            requirements.insert(requirement.requirement_type().clone(), requirement.amount());
        }
        Self { requirements }
    }

    /// The empty capacity.
    pub fn zero() -> Self {
        Self::default()
    }

    fn from_map(mut requirements: BTreeMap<CapacityRequirementType, u64>) -> Self {
        requirements.retain(|_, amount| *amount > 0);
        Self { requirements }
    }

    fn amount(&self, requirement_type: &CapacityRequirementType) -> u64 {
        self.requirements.get(requirement_type).copied().unwrap_or(0)
    }

    /// The requirement of the given type, or its zero value if absent.
    pub fn requirement(&self, requirement_type: &CapacityRequirementType) -> CapacityRequirement {
        CapacityRequirement::new(requirement_type.clone(), self.amount(requirement_type))
    }

    /// All (non-zero) requirements.
    pub fn requirements(&self) -> impl Iterator<Item = CapacityRequirement> + '_ {
        self.requirements
            .iter()
            .map(|(t, amount)| CapacityRequirement::new(t.clone(), *amount))
    }

    /// All types with a non-zero requirement.
    pub fn types(&self) -> impl Iterator<Item = &CapacityRequirementType> {
        self.requirements.keys()
    }

    /// Number of non-zero requirements.
    pub fn len(&self) -> usize {
        self.requirements.len()
    }

    /// Check if every requirement is zero.
    pub fn is_zero(&self) -> bool {
        self.requirements.is_empty()
    }

    /// Per-type sum.
    pub fn add(&self, other: &Self) -> Result<Self, CapacityError> {
        let mut sum = self.requirements.clone();
        for (requirement_type, amount) in &other.requirements {
            let entry = sum.entry(requirement_type.clone()).or_insert(0);
            *entry = entry.checked_add(*amount).ok_or_else(|| {
                CapacityError::Overflow(format!("{} + {}", self, other))
            })?;
        }
        Ok(Self::from_map(sum))
    }

    /// Per-type difference.
    ///
    /// Fails unless `self` is greater than or equal to `other` in every type.
    pub fn subtract(&self, other: &Self) -> Result<Self, CapacityError> {
        if !self.greater_or_equals(other) {
            return Err(CapacityError::NegativeCapacity {
                minuend: self.to_string(),
                subtrahend: other.to_string(),
            });
        }
        Ok(self.subtract_or_zero(other))
    }

    /// Per-type difference, each type clamped at zero.
    pub fn subtract_or_zero(&self, other: &Self) -> Self {
        let mut difference = self.requirements.clone();
        for (requirement_type, amount) in &other.requirements {
            if let Some(entry) = difference.get_mut(requirement_type) {
                *entry = entry.saturating_sub(*amount);
            }
        }
        Self::from_map(difference)
    }

    /// Per-type maximum. Types present on only one side are kept.
    pub fn max(&self, other: &Self) -> Self {
        let mut max = self.requirements.clone();
        for (requirement_type, amount) in &other.requirements {
            let entry = max.entry(requirement_type.clone()).or_insert(0);
            *entry = (*entry).max(*amount);
        }
        Self::from_map(max)
    }

    /// Per-type minimum. Types present on only one side have minimum zero.
    pub fn min(&self, other: &Self) -> Self {
        let min = self
            .requirements
            .iter()
            .filter_map(|(requirement_type, amount)| {
                other
                    .requirements
                    .get(requirement_type)
                    .map(|other_amount| (requirement_type.clone(), (*amount).min(*other_amount)))
            })
            .collect();
        Self::from_map(min)
    }

    /// Scale every requirement by `factor`.
    pub fn multiply(&self, factor: u32) -> Result<Self, CapacityError> {
        let mut product = BTreeMap::new();
        for (requirement_type, amount) in &self.requirements {
            let scaled = amount
                .checked_mul(u64::from(factor))
                .ok_or_else(|| CapacityError::Overflow(format!("{} * {}", self, factor)))?;
            product.insert(requirement_type.clone(), scaled);
        }
        Ok(Self::from_map(product))
    }

    /// Divide every requirement by `divisor`, truncating per type.
    pub fn divide(&self, divisor: u32) -> Result<Self, CapacityError> {
        if divisor == 0 {
            return Err(CapacityError::DivideByZero(self.to_string()));
        }
        let quotient = self
            .requirements
            .iter()
            .map(|(requirement_type, amount)| (requirement_type.clone(), amount / u64::from(divisor)))
            .collect();
        Ok(Self::from_map(quotient))
    }

    /// The integer `k` such that `self == other * k` in every type.
    ///
    /// Returns `None` when no such exact integer exists, including when
    /// either side is zero. Used to detect whether a capacity is a clean
    /// multiple of a single machine's capacity.
    pub fn divide_exactly(&self, other: &Self) -> Option<u64> {
        if self.is_zero() || other.is_zero() {
            return None;
        }
        let (probe_type, probe_amount) = self.requirements.iter().next()?;
        let divisor = other.amount(probe_type);
        if divisor == 0 || probe_amount % divisor != 0 {
            return None;
        }
        let k = probe_amount / divisor;

        if self.len() != other.len() {
            return None;
        }
        let exact = other.requirements.iter().all(|(requirement_type, amount)| {
            amount.checked_mul(k) == Some(self.amount(requirement_type))
        });
        exact.then_some(k)
    }

    /// Check if `self` is at least `other` in every type.
    pub fn greater_or_equals(&self, other: &Self) -> bool {
        other
            .requirements
            .iter()
            .all(|(requirement_type, amount)| self.amount(requirement_type) >= *amount)
    }

    /// Check if `self` is at least `other` in every type and differs in one.
    pub fn greater_than(&self, other: &Self) -> bool {
        self.greater_or_equals(other) && self != other
    }
}

impl From<CapacityRequirement> for CapacityRequirements {
    fn from(requirement: CapacityRequirement) -> Self {
        Self::from_requirement(requirement)
    }
}

impl fmt::Display for CapacityRequirements {
    /// Requirements sorted by type name; the empty capacity shows as `0MB RAM`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_zero() {
            return write!(f, "{}", CapacityRequirementType::Memory.zero());
        }
        let mut sorted: Vec<CapacityRequirement> = self.requirements().collect();
        sorted.sort_by_key(|requirement| requirement.requirement_type().name());
        for (i, requirement) in sorted.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", requirement)?;
        }
        Ok(())
    }
}
