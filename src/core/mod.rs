//! Capacity accounting: typed requirements and their algebra.

pub mod error;
pub mod per_key;
pub mod requirement;
pub mod requirements;
pub mod types;
