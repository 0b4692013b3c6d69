//! RPC Channels
//!
//! A remote address ships encoded frames over an [`RpcChannel`] chosen by the
//! endpoint's scheme. The runtime never opens sockets itself: connections come
//! from a collaborator-supplied [`Dialer`], and each channel only frames bytes
//! on top of whatever stream it is handed.
//!
//! ```text
//!   Address::Remote ──▶ ChannelFactory ──(cache miss)──▶ Dialer::dial
//!                             │                               │
//!                             ▼                               ▼
//!                     tcp://  → TcpChannel  ◀────────────  BoxConn
//!                     http:// → HttpChannel
//! ```

pub mod endpoint;
pub mod http;
pub mod inbound;
mod stream;
pub mod tcp;
pub mod wire;

pub use endpoint::{Endpoint, EndpointError, Scheme};
pub use http::HttpChannel;
pub use inbound::Inbound;
pub use tcp::TcpChannel;
pub use wire::{Announcement, Frame};

use crate::context::Context;
use crate::error::Result;
use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use std::fmt;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, warn};

/// Largest frame a channel accepts by default (16 MiB)
pub const DEFAULT_MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Raw byte stream produced by the connection layer
pub trait Conn: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T> Conn for T where T: AsyncRead + AsyncWrite + Send + Unpin {}

pub type BoxConn = Box<dyn Conn>;

/// Opens connections to remote endpoints
#[async_trait]
pub trait Dialer: Send + Sync {
    async fn dial(&self, ctx: &Context, endpoint: &Endpoint) -> Result<BoxConn>;
}

/// Framed, bidirectional byte transport to one endpoint
#[async_trait]
pub trait RpcChannel: Send + Sync {
    fn endpoint(&self) -> &Endpoint;

    /// Send one payload as a single frame
    async fn send(&self, ctx: &Context, payload: Bytes) -> Result<()>;

    /// Next complete frame from the peer
    async fn receive(&self, ctx: &Context) -> Result<Bytes>;
}

/// Wrap a connection in the channel matching the endpoint's scheme
pub fn channel_for(endpoint: Endpoint, conn: BoxConn) -> Arc<dyn RpcChannel> {
    match endpoint.scheme() {
        Scheme::Tcp => Arc::new(TcpChannel::new(endpoint, conn)),
        Scheme::Http => Arc::new(HttpChannel::new(endpoint, conn)),
    }
}

/// Dials and caches one channel per endpoint
#[derive(Clone)]
pub struct ChannelFactory {
    inner: Arc<FactoryInner>,
}

struct FactoryInner {
    dialer: Arc<dyn Dialer>,
    channels: DashMap<Endpoint, Arc<dyn RpcChannel>>,
}

impl ChannelFactory {
    pub fn new(dialer: Arc<dyn Dialer>) -> Self {
        Self {
            inner: Arc::new(FactoryInner {
                dialer,
                channels: DashMap::new(),
            }),
        }
    }

    /// Cached channel for `endpoint`, dialing on first use
    pub async fn get_channel_by_address(
        &self,
        ctx: &Context,
        endpoint: &Endpoint,
    ) -> Result<Arc<dyn RpcChannel>> {
        if let Some(channel) = self.cached(endpoint) {
            return Ok(channel);
        }

        debug!(endpoint = %endpoint, "Dialing remote endpoint");
        let conn = self.inner.dialer.dial(ctx, endpoint).await?;
        let channel = channel_for(endpoint.clone(), conn);

        // A concurrent dial may have won; keep whichever landed first
        let entry = self
            .inner
            .channels
            .entry(endpoint.clone())
            .or_insert(channel);
        Ok(Arc::clone(entry.value()))
    }

    /// Send through the cached channel, evicting it if the send fails
    pub async fn send(&self, ctx: &Context, endpoint: &Endpoint, payload: Bytes) -> Result<()> {
        let channel = self.get_channel_by_address(ctx, endpoint).await?;
        if let Err(e) = channel.send(ctx, payload).await {
            if !e.is_cancellation() {
                warn!(endpoint = %endpoint, error = %e, "Channel send failed, evicting");
            }
            self.evict(endpoint);
            return Err(e);
        }
        Ok(())
    }

    /// Pre-built channel, e.g. an accepted connection the peer dialed
    pub fn insert(&self, channel: Arc<dyn RpcChannel>) {
        self.inner
            .channels
            .insert(channel.endpoint().clone(), channel);
    }

    pub fn evict(&self, endpoint: &Endpoint) -> bool {
        self.inner.channels.remove(endpoint).is_some()
    }

    pub fn cached(&self, endpoint: &Endpoint) -> Option<Arc<dyn RpcChannel>> {
        self.inner
            .channels
            .get(endpoint)
            .map(|channel| Arc::clone(channel.value()))
    }

    pub fn len(&self) -> usize {
        self.inner.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.channels.is_empty()
    }
}

impl fmt::Debug for ChannelFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelFactory")
            .field("channels", &self.inner.channels.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{CoreError, ErrorCode};
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::io::DuplexStream;

    /// Hands out one side of an in-memory pipe per dial and keeps the other
    #[derive(Default)]
    struct PipeDialer {
        dials: AtomicUsize,
        peers: Mutex<Vec<DuplexStream>>,
        refuse: bool,
    }

    #[async_trait]
    impl Dialer for PipeDialer {
        async fn dial(&self, ctx: &Context, endpoint: &Endpoint) -> Result<BoxConn> {
            ctx.check("dial")?;
            if self.refuse {
                return Err(CoreError::channel(endpoint.to_string(), "connection refused"));
            }
            self.dials.fetch_add(1, Ordering::SeqCst);
            let (local, remote) = tokio::io::duplex(64 * 1024);
            self.peers.lock().push(remote);
            Ok(Box::new(local))
        }
    }

    #[tokio::test]
    async fn test_channel_selected_by_scheme() {
        let dialer = Arc::new(PipeDialer::default());
        let factory = ChannelFactory::new(dialer.clone());
        let ctx = Context::background();

        let tcp = Endpoint::parse("tcp://10.0.0.1:7000").unwrap();
        let http = Endpoint::parse("http://10.0.0.1:8080").unwrap();

        let a = factory.get_channel_by_address(&ctx, &tcp).await.unwrap();
        let b = factory.get_channel_by_address(&ctx, &http).await.unwrap();
        assert_eq!(a.endpoint(), &tcp);
        assert_eq!(b.endpoint(), &http);
        assert_eq!(factory.len(), 2);
    }

    #[tokio::test]
    async fn test_channels_are_cached() {
        let dialer = Arc::new(PipeDialer::default());
        let factory = ChannelFactory::new(dialer.clone());
        let ctx = Context::background();
        let endpoint = Endpoint::parse("tcp://10.0.0.1:7000").unwrap();

        let first = factory.get_channel_by_address(&ctx, &endpoint).await.unwrap();
        let second = factory.get_channel_by_address(&ctx, &endpoint).await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(dialer.dials.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_send_evicts() {
        let dialer = Arc::new(PipeDialer::default());
        let factory = ChannelFactory::new(dialer.clone());
        let ctx = Context::background();
        let endpoint = Endpoint::parse("tcp://10.0.0.1:7000").unwrap();

        factory.send(&ctx, &endpoint, Bytes::from_static(b"one")).await.unwrap();

        // Peer hangs up; the next write fails and the channel is dropped
        dialer.peers.lock().clear();
        let err = factory.send(&ctx, &endpoint, Bytes::from_static(b"two")).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::Channel);
        assert!(factory.cached(&endpoint).is_none());

        factory.send(&ctx, &endpoint, Bytes::from_static(b"three")).await.unwrap();
        assert_eq!(dialer.dials.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_dial_failure_propagates() {
        let dialer = Arc::new(PipeDialer {
            refuse: true,
            ..Default::default()
        });
        let factory = ChannelFactory::new(dialer);
        let endpoint = Endpoint::parse("http://10.0.0.9:80").unwrap();
        let err = factory
            .get_channel_by_address(&Context::background(), &endpoint)
            .await
            .err()
            .unwrap();
        assert_eq!(err.code(), ErrorCode::Channel);
        assert!(factory.is_empty());
    }
}
