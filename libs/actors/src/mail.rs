//! Mail envelope
//!
//! A mail is created once by its sender and never mutated. It moves by value
//! into a mailbox and is consumed by exactly one handler invocation.

use crate::id::ActorId;
use codec::CodecTag;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Payload bound: anything that can be moved between tasks and encoded for
/// remote delivery
pub trait Message: Serialize + DeserializeOwned + Send + Sync + 'static {}

impl<T> Message for T where T: Serialize + DeserializeOwned + Send + Sync + 'static {}

/// Immutable message envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mail<M> {
    sender: ActorId,
    receiver: ActorId,
    payload: M,
    codec: CodecTag,
}

impl<M> Mail<M> {
    pub fn new(sender: ActorId, receiver: ActorId, payload: M, codec: CodecTag) -> Self {
        Self {
            sender,
            receiver,
            payload,
            codec,
        }
    }

    pub fn sender(&self) -> &ActorId {
        &self.sender
    }

    pub fn receiver(&self) -> &ActorId {
        &self.receiver
    }

    pub fn payload(&self) -> &M {
        &self.payload
    }

    /// Codec used if this mail crosses a process boundary
    pub fn codec(&self) -> CodecTag {
        self.codec
    }

    pub fn into_payload(self) -> M {
        self.payload
    }

    /// Reply envelope addressed back to this mail's sender
    pub fn reply<R>(&self, payload: R) -> Mail<R> {
        Mail::new(self.receiver.clone(), self.sender.clone(), payload, self.codec)
    }
}
