//! # Mail Codecs
//!
//! Encoding rules for payloads that leave the process. A [`CodecTag`] travels
//! with every mail so the receiving side picks the same codec the sender used;
//! in-process delivery never touches this crate.
//!
//! ## Usage
//!
//! ```rust
//! use codec::{decode, encode, CodecTag};
//!
//! let bytes = encode(CodecTag::Json, &vec![1u32, 2, 3]).unwrap();
//! let back: Vec<u32> = decode(CodecTag::Json, &bytes).unwrap();
//! assert_eq!(back, vec![1, 2, 3]);
//! ```

pub mod error;
pub mod tag;

pub use error::{CodecError, Result};
pub use tag::CodecTag;

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::marker::PhantomData;

/// Encoding contract consumed by remote transfer
pub trait Codec<T> {
    fn encode(&self, value: &T) -> Result<Vec<u8>>;
    fn decode(&self, bytes: &[u8]) -> Result<T>;
}

/// `serde_json` codec
#[derive(Debug, Clone, Copy)]
pub struct JsonCodec<T>(PhantomData<fn() -> T>);

impl<T> Default for JsonCodec<T> {
    fn default() -> Self {
        Self(PhantomData)
    }
}

impl<T: Serialize + DeserializeOwned> Codec<T> for JsonCodec<T> {
    fn encode(&self, value: &T) -> Result<Vec<u8>> {
        encode(CodecTag::Json, value)
    }

    fn decode(&self, bytes: &[u8]) -> Result<T> {
        serde_json::from_slice(bytes).map_err(|e| CodecError::decode(CodecTag::Json, e))
    }
}

/// `bincode` codec, compact and not self-describing
#[derive(Debug, Clone, Copy)]
pub struct BincodeCodec<T>(PhantomData<fn() -> T>);

impl<T> Default for BincodeCodec<T> {
    fn default() -> Self {
        Self(PhantomData)
    }
}

impl<T: Serialize + DeserializeOwned> Codec<T> for BincodeCodec<T> {
    fn encode(&self, value: &T) -> Result<Vec<u8>> {
        encode(CodecTag::Bincode, value)
    }

    fn decode(&self, bytes: &[u8]) -> Result<T> {
        bincode::deserialize(bytes).map_err(|e| CodecError::decode(CodecTag::Bincode, e))
    }
}

/// Encode `value` with the codec named by `tag`
///
/// Only serialisation is required, so borrowed and unsized values encode too.
pub fn encode<T: Serialize + ?Sized>(tag: CodecTag, value: &T) -> Result<Vec<u8>> {
    match tag {
        CodecTag::Json => serde_json::to_vec(value).map_err(|e| CodecError::encode(tag, e)),
        CodecTag::Bincode => bincode::serialize(value).map_err(|e| CodecError::encode(tag, e)),
    }
}

/// Decode `bytes` with the codec named by `tag`
pub fn decode<T: DeserializeOwned>(tag: CodecTag, bytes: &[u8]) -> Result<T> {
    match tag {
        CodecTag::Json => serde_json::from_slice(bytes).map_err(|e| CodecError::decode(tag, e)),
        CodecTag::Bincode => bincode::deserialize(bytes).map_err(|e| CodecError::decode(tag, e)),
    }
}
