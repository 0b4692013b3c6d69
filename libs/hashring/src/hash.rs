//! Hash functions for virtual-node placement
//!
//! CRC32 is the default: cheap and well distributed for short keys. The
//! SHA3-derived function spreads pathological key sets more evenly at a higher
//! cost per call.

use crate::error::RingError;
use serde::{Deserialize, Serialize};
use sha3::{Digest, Sha3_256};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Pluggable 32-bit hash function
pub type HashFn = Arc<dyn Fn(&[u8]) -> u32 + Send + Sync>;

/// CRC32 (IEEE) checksum
pub fn crc32_hash(data: &[u8]) -> u32 {
    crc32fast::hash(data)
}

/// First four bytes of the SHA3-256 digest, big-endian
pub fn sha3_hash(data: &[u8]) -> u32 {
    let digest = Sha3_256::digest(data);
    u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]])
}

/// Built-in hash functions selectable from configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    #[default]
    Crc32,
    Sha3,
}

impl HashAlgorithm {
    /// Shareable function pointer for this algorithm
    pub fn hasher(self) -> HashFn {
        match self {
            HashAlgorithm::Crc32 => Arc::new(crc32_hash),
            HashAlgorithm::Sha3 => Arc::new(sha3_hash),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            HashAlgorithm::Crc32 => "crc32",
            HashAlgorithm::Sha3 => "sha3",
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HashAlgorithm {
    type Err = RingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "crc32" => Ok(HashAlgorithm::Crc32),
            "sha3" => Ok(HashAlgorithm::Sha3),
            _ => Err(RingError::UnknownAlgorithm { name: s.to_string() }),
        }
    }
}
