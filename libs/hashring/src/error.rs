//! Ring construction errors

use thiserror::Error;

/// Errors raised while building a ring
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RingError {
    /// A ring needs at least one virtual node per member
    #[error("Invalid replica count {replicas}: every member needs at least one virtual node")]
    InvalidReplicas { replicas: usize },

    /// Hash algorithm name not recognised
    #[error("Unknown hash algorithm '{name}' (expected one of: crc32, sha3)")]
    UnknownAlgorithm { name: String },
}

/// Result type alias for ring operations
pub type Result<T> = std::result::Result<T, RingError>;
