//! Wire frames exchanged between nodes
//!
//! ```text
//! ┌──────────┬──────────────────────────────┐
//! │ tag (u8) │ codec body: Frame<M>         │
//! └──────────┴──────────────────────────────┘
//! ```
//!
//! The leading byte names the codec so the receiving side can decode without
//! out-of-band agreement.

use crate::error::{CoreError, Result};
use crate::id::ActorId;
use crate::mail::{Mail, Message};
use crate::rpc::endpoint::Endpoint;
use bytes::{BufMut, Bytes, BytesMut};
use codec::{CodecError, CodecTag};
use serde::{Deserialize, Serialize};

/// A postman advertising where it can be reached
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Announcement {
    pub postman: ActorId,
    pub endpoint: Endpoint,
}

/// Unit of transfer over an RPC channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Frame<M> {
    Mail(Mail<M>),
    Announce(Announcement),
}

impl<M: Message> Frame<M> {
    pub fn encode(&self, tag: CodecTag) -> Result<Bytes> {
        let body = codec::encode(tag, self).map_err(CoreError::codec_encode)?;
        let mut buf = BytesMut::with_capacity(1 + body.len());
        buf.put_u8(tag.as_u8());
        buf.extend_from_slice(&body);
        Ok(buf.freeze())
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let (&tag, body) = bytes.split_first().ok_or_else(|| {
            CoreError::codec_decode(CodecError::decode(CodecTag::default(), "empty frame"))
        })?;
        let tag = CodecTag::try_from(tag).map_err(CoreError::codec_decode)?;
        codec::decode(tag, body).map_err(CoreError::codec_decode)
    }
}
