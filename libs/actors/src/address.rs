//! Transfer Targets
//!
//! An [`Address`] is what the postoffice ring stores: either a handle to an
//! in-process postman or postoffice, reached by a direct call, or a remote
//! endpoint, reached by encoding the mail and shipping the bytes. Callers of
//! [`Address::transfer`] cannot tell which happened.

use crate::context::Context;
use crate::error::Result;
use crate::mail::{Mail, Message};
use crate::postman::Postman;
use crate::postoffice::Postoffice;
use crate::rpc::{Announcement, ChannelFactory, Endpoint, Frame};
use codec::CodecTag;
use futures::future::BoxFuture;
use futures::FutureExt;
use hashring::RingNode;
use std::fmt;
use tracing::trace;

/// Polymorphic transfer target
pub enum Address<M> {
    /// Direct call into a postman's `receive`
    LocalPostman(Postman<M>),
    /// Direct call into a postoffice's `dispatch`
    LocalPostoffice(Postoffice<M>),
    /// Encode and send over an RPC channel
    Remote(RemoteAddress),
}

impl<M: Message> Address<M> {
    pub fn local_postman(postman: &Postman<M>) -> Self {
        Address::LocalPostman(postman.clone())
    }

    pub fn local_postoffice(postoffice: &Postoffice<M>) -> Self {
        Address::LocalPostoffice(postoffice.clone())
    }

    pub fn remote(endpoint: Endpoint, channels: ChannelFactory) -> Self {
        Address::Remote(RemoteAddress::new(endpoint, channels))
    }

    /// Ring key: `local:{id}` or `remote:{endpoint}`
    pub fn key(&self) -> String {
        match self {
            Address::LocalPostman(postman) => format!("local:{}", postman.id()),
            Address::LocalPostoffice(postoffice) => format!("local:{}", postoffice.id()),
            Address::Remote(remote) => remote_key(remote.endpoint()),
        }
    }

    pub fn is_local(&self) -> bool {
        !self.is_remote()
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, Address::Remote(_))
    }

    /// Hand `mail` to whatever this address points at
    ///
    /// Boxed because a local postoffice transfer re-enters `dispatch`, which
    /// in turn transfers to another address.
    pub fn transfer<'a>(&'a self, ctx: &'a Context, mail: Mail<M>) -> BoxFuture<'a, Result<()>> {
        async move {
            trace!(address = %self.key(), receiver = %mail.receiver(), "Transferring mail");
            match self {
                Address::LocalPostman(postman) => postman.receive(ctx, mail).await,
                Address::LocalPostoffice(postoffice) => postoffice.dispatch(ctx, mail).await,
                Address::Remote(remote) => remote.transfer(ctx, mail).await,
            }
        }
        .boxed()
    }
}

pub(crate) fn remote_key(endpoint: &Endpoint) -> String {
    format!("remote:{}", endpoint)
}

impl<M> Clone for Address<M> {
    fn clone(&self) -> Self {
        match self {
            Address::LocalPostman(postman) => Address::LocalPostman(postman.clone()),
            Address::LocalPostoffice(postoffice) => Address::LocalPostoffice(postoffice.clone()),
            Address::Remote(remote) => Address::Remote(remote.clone()),
        }
    }
}

impl<M: Message> RingNode for Address<M> {
    fn ring_key(&self) -> String {
        self.key()
    }
}

impl<M: Message> fmt::Debug for Address<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Address").field(&self.key()).finish()
    }
}

impl<M: Message> fmt::Display for Address<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

/// Remote endpoint plus the channel cache used to reach it
#[derive(Debug, Clone)]
pub struct RemoteAddress {
    endpoint: Endpoint,
    channels: ChannelFactory,
}

impl RemoteAddress {
    pub fn new(endpoint: Endpoint, channels: ChannelFactory) -> Self {
        Self { endpoint, channels }
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Encode with the mail's own codec and send
    pub async fn transfer<M: Message>(&self, ctx: &Context, mail: Mail<M>) -> Result<()> {
        let tag = mail.codec();
        self.send_frame(ctx, &Frame::Mail(mail), tag).await
    }

    /// Advertise a postman's endpoint to the peer
    pub async fn announce(&self, ctx: &Context, announcement: Announcement) -> Result<()> {
        self.send_frame::<()>(ctx, &Frame::Announce(announcement), CodecTag::default())
            .await
    }

    async fn send_frame<M: Message>(&self, ctx: &Context, frame: &Frame<M>, tag: CodecTag) -> Result<()> {
        ctx.check("remote transfer")?;
        let bytes = frame.encode(tag)?;
        self.channels.send(ctx, &self.endpoint, bytes).await
    }
}
