//! Error types shared across the facade.

use thiserror::Error;

/// Error returned by data-store operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// Record could not be encoded or decoded.
    #[error("serialization failure: {0}")]
    Serialization(String),

    /// Underlying storage engine failure.
    #[error("storage backend failure: {0}")]
    Backend(String),
}

/// Error returned by gateway facade operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    /// A caller-supplied argument was rejected.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A precondition for the operation does not hold.
    #[error("rejected: {0}")]
    Rejected(String),

    /// The instance has been disabled and takes no new orders.
    #[error("gateway disabled")]
    Disabled,

    /// The referenced entity does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The gateway is not connected.
    #[error("gateway not connected")]
    NotConnected,

    /// Failure propagated from the backing adapter.
    #[error("backend failure: {0}")]
    Backend(String),

    /// Persistence failure.
    #[error(transparent)]
    Store(#[from] StoreError),
}
