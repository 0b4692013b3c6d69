//! Length-prefixed stream channel
//!
//! Each payload is written as a 4-byte big-endian length followed by the
//! payload bytes. Both sides enforce the configured maximum: sends refuse an
//! oversized payload before writing, reads reject the length prefix before
//! allocating.

use super::stream::{check_outgoing, StreamReader, StreamWriter};
use super::{BoxConn, RpcChannel, DEFAULT_MAX_FRAME_SIZE};
use crate::context::Context;
use crate::error::{CoreError, Result};
use crate::rpc::endpoint::Endpoint;
use async_trait::async_trait;
use bytes::{BufMut, Bytes, BytesMut};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Mutex;
use tracing::debug;

const LENGTH_PREFIX: usize = 4;

/// Stream channel for `tcp://` endpoints
pub struct TcpChannel {
    endpoint: Endpoint,
    reader: Mutex<StreamReader>,
    writer: Mutex<StreamWriter>,
    max_frame_size: usize,
    bytes_sent: AtomicU64,
    bytes_received: AtomicU64,
}

impl TcpChannel {
    pub fn new(endpoint: Endpoint, conn: BoxConn) -> Self {
        Self::with_max_frame_size(endpoint, conn, DEFAULT_MAX_FRAME_SIZE)
    }

    pub fn with_max_frame_size(endpoint: Endpoint, conn: BoxConn, max_frame_size: usize) -> Self {
        let (reader, writer) = tokio::io::split(conn);
        Self {
            endpoint,
            reader: Mutex::new(StreamReader::new(reader)),
            writer: Mutex::new(StreamWriter::new(writer)),
            max_frame_size,
            bytes_sent: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
        }
    }

    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent.load(Ordering::Relaxed)
    }

    pub fn bytes_received(&self) -> u64 {
        self.bytes_received.load(Ordering::Relaxed)
    }

    async fn write_frame(&self, payload: &[u8]) -> Result<()> {
        let len = check_outgoing(&self.endpoint, payload.len(), self.max_frame_size)?;

        let mut frame = BytesMut::with_capacity(LENGTH_PREFIX + payload.len());
        frame.put_u32(len);
        frame.extend_from_slice(payload);

        self.writer
            .lock()
            .await
            .write_frame(&self.endpoint, &frame)
            .await?;

        self.bytes_sent.fetch_add(frame.len() as u64, Ordering::Relaxed);
        debug!(endpoint = %self.endpoint, bytes = payload.len(), "Sent frame");
        Ok(())
    }

    async fn read_frame(&self) -> Result<Bytes> {
        let mut reader = self.reader.lock().await;

        loop {
            let buffered = reader.buffered();
            if buffered.len() >= LENGTH_PREFIX {
                let mut len_bytes = [0u8; LENGTH_PREFIX];
                len_bytes.copy_from_slice(&buffered[..LENGTH_PREFIX]);
                let frame_len = u32::from_be_bytes(len_bytes) as usize;
                if frame_len > self.max_frame_size {
                    return Err(CoreError::channel(
                        self.endpoint.to_string(),
                        format!(
                            "Frame size {} exceeds maximum {}",
                            frame_len, self.max_frame_size
                        ),
                    ));
                }

                let total = LENGTH_PREFIX + frame_len;
                if buffered.len() >= total {
                    reader.consume(LENGTH_PREFIX);
                    let body = reader.consume(frame_len);
                    self.bytes_received
                        .fetch_add(total as u64, Ordering::Relaxed);
                    debug!(endpoint = %self.endpoint, bytes = frame_len, "Received frame");
                    return Ok(body);
                }
                let missing = total - buffered.len();
                reader.reserve(missing);
            }

            reader.fill(&self.endpoint).await?;
        }
    }
}

#[async_trait]
impl RpcChannel for TcpChannel {
    fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    async fn send(&self, ctx: &Context, payload: Bytes) -> Result<()> {
        ctx.check("channel send")?;
        tokio::select! {
            result = self.write_frame(&payload) => result,
            err = ctx.done("channel send") => Err(err),
        }
    }

    async fn receive(&self, ctx: &Context) -> Result<Bytes> {
        ctx.check("channel receive")?;
        tokio::select! {
            result = self.read_frame() => result,
            err = ctx.done("channel receive") => Err(err),
        }
    }
}
