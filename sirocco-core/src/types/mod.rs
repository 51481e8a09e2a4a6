//! Primitive value types shared across the facade.

mod code;
mod timestamp;

pub use code::Code;
pub use timestamp::Timestamp;

use thiserror::Error;

/// Validation error for primitive value types.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Instrument code is empty.
    #[error("instrument code cannot be empty")]
    EmptyCode,

    /// Instrument code contains characters outside the allowed set.
    #[error("invalid instrument code: {0}")]
    InvalidCode(String),

    /// Timestamp is negative.
    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(i64),
}
