//! Error types for the identity link protocol

use crate::core_membership::storage::StorageError;
use thiserror::Error;

/// Errors that can occur while linking an external identity
#[derive(Debug, Error)]
pub enum LinkError {
    /// The correlation token was never issued or has been consumed
    #[error("Invalid or unknown state token")]
    InvalidState,

    /// The correlation token outlived its 10-minute window
    #[error("State token expired")]
    ExpiredState,

    /// The identity provider answered with a non-success status
    #[error("Identity provider returned HTTP {status}")]
    Upstream { status: u16 },

    /// The provider was unreachable or sent an unusable response
    #[error("Identity provider error: {0}")]
    Provider(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}
