//! Codec errors

use crate::tag::CodecTag;
use thiserror::Error;

/// Encoding and decoding failures, tagged with the codec that produced them
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("Encode failed ({codec}): {message}")]
    Encode { codec: CodecTag, message: String },

    #[error("Decode failed ({codec}): {message}")]
    Decode { codec: CodecTag, message: String },

    /// Wire byte does not name a known codec
    #[error("Unknown codec tag {tag:#04x}")]
    UnknownTag { tag: u8 },
}

impl CodecError {
    pub fn encode(codec: CodecTag, err: impl std::fmt::Display) -> Self {
        Self::Encode {
            codec,
            message: err.to_string(),
        }
    }

    pub fn decode(codec: CodecTag, err: impl std::fmt::Display) -> Self {
        Self::Decode {
            codec,
            message: err.to_string(),
        }
    }
}

/// Result type alias for codec operations
pub type Result<T> = std::result::Result<T, CodecError>;
