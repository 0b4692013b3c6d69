//! Inbound frame pump
//!
//! Reads frames from one channel and feeds them into the local node: mail
//! goes to [`Postman::receive`], announcements become remote addresses on the
//! postoffice ring. A bad frame is logged and skipped; a broken channel ends
//! the pump.

use super::{ChannelFactory, Frame, RpcChannel};
use crate::address::Address;
use crate::context::Context;
use crate::error::Result;
use crate::mail::Message;
use crate::postman::Postman;
use crate::postoffice::Postoffice;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Pump from one channel into a postman
pub struct Inbound<M> {
    channel: Arc<dyn RpcChannel>,
    postman: Postman<M>,
    ring: Option<(Postoffice<M>, ChannelFactory)>,
}

impl<M: Message> Inbound<M> {
    pub fn new(channel: Arc<dyn RpcChannel>, postman: Postman<M>) -> Self {
        Self {
            channel,
            postman,
            ring: None,
        }
    }

    /// Accept announcements into `postoffice`, reaching the announced
    /// endpoints through `channels`
    pub fn with_postoffice(mut self, postoffice: Postoffice<M>, channels: ChannelFactory) -> Self {
        self.ring = Some((postoffice, channels));
        self
    }

    /// Pump until `ctx` ends (returns `Ok`) or the channel fails
    pub async fn run(self, ctx: Context) -> Result<()> {
        let endpoint = self.channel.endpoint().clone();
        debug!(endpoint = %endpoint, "Inbound pump started");

        loop {
            let bytes = match self.channel.receive(&ctx).await {
                Ok(bytes) => bytes,
                Err(e) if e.is_cancellation() => {
                    debug!(endpoint = %endpoint, "Inbound pump stopped");
                    return Ok(());
                }
                Err(e) => {
                    warn!(endpoint = %endpoint, error = %e, "Inbound channel failed");
                    return Err(e);
                }
            };

            if let Err(e) = self.handle(&ctx, &bytes).await {
                if e.is_cancellation() {
                    return Ok(());
                }
                warn!(
                    endpoint = %endpoint,
                    error = %e,
                    error_code = %e.code(),
                    "Dropped inbound frame"
                );
            }
        }
    }

    pub fn spawn(self, ctx: Context) -> JoinHandle<Result<()>> {
        tokio::spawn(self.run(ctx))
    }

    async fn handle(&self, ctx: &Context, bytes: &[u8]) -> Result<()> {
        match Frame::<M>::decode(bytes)? {
            Frame::Mail(mail) => self.postman.receive(ctx, mail).await,
            Frame::Announce(announcement) => {
                let Some((postoffice, channels)) = &self.ring else {
                    debug!(
                        postman = %announcement.postman,
                        "Ignoring announcement, no postoffice attached"
                    );
                    return Ok(());
                };
                if self.postman.endpoint() == Some(&announcement.endpoint) {
                    return Ok(());
                }
                info!(
                    postman = %announcement.postman,
                    endpoint = %announcement.endpoint,
                    "Peer announced"
                );
                postoffice.add(ctx, Address::remote(announcement.endpoint, channels.clone()))
            }
        }
    }
}
