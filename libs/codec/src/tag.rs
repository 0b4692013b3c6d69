//! Codec identifiers carried by every mail

use crate::error::CodecError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which codec a mail is encoded with when it crosses a process boundary
///
/// The discriminant is the single tag byte written ahead of every wire frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum CodecTag {
    #[default]
    Json = 0,
    Bincode = 1,
}

impl CodecTag {
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn name(self) -> &'static str {
        match self {
            CodecTag::Json => "json",
            CodecTag::Bincode => "bincode",
        }
    }
}

impl TryFrom<u8> for CodecTag {
    type Error = CodecError;

    fn try_from(tag: u8) -> Result<Self, Self::Error> {
        match tag {
            0 => Ok(CodecTag::Json),
            1 => Ok(CodecTag::Bincode),
            _ => Err(CodecError::UnknownTag { tag }),
        }
    }
}

impl fmt::Display for CodecTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_byte_mapping() {
        assert_eq!(CodecTag::Json.as_u8(), 0);
        assert_eq!(CodecTag::Bincode.as_u8(), 1);
        assert_eq!(CodecTag::try_from(1).unwrap(), CodecTag::Bincode);
        assert_eq!(CodecTag::try_from(9), Err(CodecError::UnknownTag { tag: 9 }));
    }

    #[test]
    fn test_default_is_json() {
        assert_eq!(CodecTag::default(), CodecTag::Json);
    }
}
