//! A single typed capacity requirement.
//!
//! A requirement pairs a [`CapacityRequirementType`] with a non-negative
//! magnitude expressed in the type's unit:
//!
//! | type               | unit        |
//! |--------------------|-------------|
//! | `Memory`           | megabytes   |
//! | `Cpu`              | millicores  |
//! | `NumberOfMachines` | machines    |
//! | `Drive(path)`      | megabytes   |
//!
//! CPU is kept in millicores so that fractional cores stay exact under
//! arithmetic.

use std::cmp::Ordering;
use std::fmt;

use super::error::CapacityError;

/// Millicores per CPU core.
pub const MILLICORES_PER_CORE: u64 = 1000;

/// The kind of a capacity requirement, plus its qualifier if any.
///
/// Two drive requirements on different mount paths are distinct types.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CapacityRequirementType {
    /// Memory in megabytes.
    Memory,
    /// CPU in millicores.
    Cpu,
    /// Number of machines.
    NumberOfMachines,
    /// Disk space in megabytes on the given drive or mount path.
    Drive(String),
}

impl CapacityRequirementType {
    /// Stable name used for deterministic ordering and display.
    pub fn name(&self) -> String {
        match self {
            CapacityRequirementType::Memory => "memory".to_string(),
            CapacityRequirementType::Cpu => "cpu".to_string(),
            CapacityRequirementType::NumberOfMachines => "machines".to_string(),
            CapacityRequirementType::Drive(path) => format!("drive:{}", path),
        }
    }

    /// The zero-valued requirement of this type.
    pub fn zero(&self) -> CapacityRequirement {
        CapacityRequirement::new(self.clone(), 0)
    }
}

impl fmt::Display for CapacityRequirementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

/// A non-negative quantity of one resource dimension.
///
/// All operations are pure and return new values. Binary operations require
/// both sides to share the same type and fail with
/// [`CapacityError::TypeMismatch`] otherwise.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CapacityRequirement {
    requirement_type: CapacityRequirementType,
    amount: u64,
}

impl CapacityRequirement {
    /// Create a requirement of the given type and magnitude.
    pub fn new(requirement_type: CapacityRequirementType, amount: u64) -> Self {
        Self {
            requirement_type,
            amount,
        }
    }

    /// Memory requirement in megabytes.
    pub fn memory_mb(megabytes: u64) -> Self {
        Self::new(CapacityRequirementType::Memory, megabytes)
    }

    /// CPU requirement in whole cores.
    pub fn cpu_cores(cores: u64) -> Self {
        Self::new(
            CapacityRequirementType::Cpu,
            cores.saturating_mul(MILLICORES_PER_CORE),
        )
    }

    /// CPU requirement in millicores (1000 = one core).
    pub fn cpu_millicores(millicores: u64) -> Self {
        Self::new(CapacityRequirementType::Cpu, millicores)
    }

    /// Number-of-machines requirement.
    pub fn machines(count: u64) -> Self {
        Self::new(CapacityRequirementType::NumberOfMachines, count)
    }

    /// Disk space requirement in megabytes on the given drive.
    pub fn drive_mb(path: impl Into<String>, megabytes: u64) -> Self {
        Self::new(CapacityRequirementType::Drive(path.into()), megabytes)
    }

    /// The requirement's type.
    pub fn requirement_type(&self) -> &CapacityRequirementType {
        &self.requirement_type
    }

    /// The magnitude in the type's unit.
    pub fn amount(&self) -> u64 {
        self.amount
    }

    /// Check if the magnitude is zero.
    pub fn is_zero(&self) -> bool {
        self.amount == 0
    }

    fn with_amount(&self, amount: u64) -> Self {
        Self::new(self.requirement_type.clone(), amount)
    }

    fn ensure_same_type(&self, other: &Self) -> Result<(), CapacityError> {
        if self.requirement_type != other.requirement_type {
            return Err(CapacityError::TypeMismatch {
                left: self.requirement_type.name(),
                right: other.requirement_type.name(),
            });
        }
        Ok(())
    }

    /// Sum of both requirements.
    pub fn add(&self, other: &Self) -> Result<Self, CapacityError> {
        self.ensure_same_type(other)?;
        let amount = self
            .amount
            .checked_add(other.amount)
            .ok_or_else(|| CapacityError::Overflow(format!("{} + {}", self, other)))?;
        Ok(self.with_amount(amount))
    }

    /// Difference of both requirements; fails if `other` is larger.
    pub fn subtract(&self, other: &Self) -> Result<Self, CapacityError> {
        self.ensure_same_type(other)?;
        let amount = self.amount.checked_sub(other.amount).ok_or_else(|| {
            CapacityError::NegativeCapacity {
                minuend: self.to_string(),
                subtrahend: other.to_string(),
            }
        })?;
        Ok(self.with_amount(amount))
    }

    /// Difference of both requirements, clamped at zero.
    pub fn subtract_or_zero(&self, other: &Self) -> Result<Self, CapacityError> {
        self.ensure_same_type(other)?;
        Ok(self.with_amount(self.amount.saturating_sub(other.amount)))
    }

    /// Scale by an integer factor.
    pub fn multiply(&self, factor: u32) -> Result<Self, CapacityError> {
        let amount = self
            .amount
            .checked_mul(u64::from(factor))
            .ok_or_else(|| CapacityError::Overflow(format!("{} * {}", self, factor)))?;
        Ok(self.with_amount(amount))
    }

    /// Divide by an integer divisor, truncating.
    pub fn divide(&self, divisor: u32) -> Result<Self, CapacityError> {
        if divisor == 0 {
            return Err(CapacityError::DivideByZero(self.to_string()));
        }
        Ok(self.with_amount(self.amount / u64::from(divisor)))
    }

    /// Ratio between two requirements of the same type.
    pub fn ratio(&self, other: &Self) -> Result<f64, CapacityError> {
        self.ensure_same_type(other)?;
        if other.is_zero() {
            return Err(CapacityError::DivideByZero(self.to_string()));
        }
        Ok(self.amount as f64 / other.amount as f64)
    }

    /// Smallest integer `n` such that `n * other >= self`.
    pub fn div_ceil(&self, other: &Self) -> Result<u64, CapacityError> {
        self.ensure_same_type(other)?;
        if other.is_zero() {
            return Err(CapacityError::DivideByZero(self.to_string()));
        }
        Ok(self.amount.div_ceil(other.amount))
    }

    /// The larger of both requirements.
    pub fn max(&self, other: &Self) -> Result<Self, CapacityError> {
        self.ensure_same_type(other)?;
        Ok(self.with_amount(self.amount.max(other.amount)))
    }

    /// The smaller of both requirements.
    pub fn min(&self, other: &Self) -> Result<Self, CapacityError> {
        self.ensure_same_type(other)?;
        Ok(self.with_amount(self.amount.min(other.amount)))
    }
}

impl PartialOrd for CapacityRequirement {
    /// Orders by magnitude; requirements of different types are incomparable.
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        if self.requirement_type != other.requirement_type {
            return None;
        }
        Some(self.amount.cmp(&other.amount))
    }
}

impl fmt::Display for CapacityRequirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.requirement_type {
            CapacityRequirementType::Memory => write!(f, "{}MB RAM", self.amount),
            CapacityRequirementType::Cpu => {
                let cores = self.amount / MILLICORES_PER_CORE;
                let millis = self.amount % MILLICORES_PER_CORE;
                if millis == 0 {
                    write!(f, "{} CPU cores", cores)
                } else {
                    let fraction = format!("{:03}", millis);
                    write!(f, "{}.{} CPU cores", cores, fraction.trim_end_matches('0'))
                }
            }
            CapacityRequirementType::NumberOfMachines => write!(f, "{} machines", self.amount),
            CapacityRequirementType::Drive(path) => write!(f, "{}MB Drive {}", self.amount, path),
        }
    }
}
