//! Capacity accounting error types.

use thiserror::Error;

/// Errors raised by capacity arithmetic and per-key capacity bookkeeping.
///
/// These are always returned synchronously from the call that violated the
/// contract.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CapacityError {
    /// Binary operation on requirements of different types.
    #[error("capacity requirement type mismatch: {left} vs {right}")]
    TypeMismatch { left: String, right: String },

    /// Subtraction would result in a negative capacity.
    #[error("subtracting {subtrahend} from {minuend} would result in a negative capacity")]
    NegativeCapacity { minuend: String, subtrahend: String },

    /// Arithmetic result does not fit the magnitude type.
    #[error("capacity overflow: {0}")]
    Overflow(String),

    /// Division by a zero divisor or a zero requirement.
    #[error("cannot divide {0} by zero")]
    DivideByZero(String),

    /// The same requirement type was given twice to a constructor.
    #[error("duplicate capacity requirement type: {0}")]
    DuplicateRequirementType(String),

    /// A blank key was used.
    #[error("invalid capacity key: {0:?}")]
    InvalidKey(String),

    /// Adding zero capacity to a key is a no-op and indicates a caller bug.
    #[error("cannot add zero capacity to {0}")]
    ZeroCapacity(String),

    /// The key has no allocated capacity.
    #[error("no capacity allocated for {0}")]
    KeyNotFound(String),

    /// A capacity needs more machines than a single request may start.
    #[error("capacity needs {required} machines, more than the limit of {limit}")]
    TooManyMachines { required: u64, limit: u64 },
}
