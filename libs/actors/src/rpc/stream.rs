//! Connection halves shared by the channel framings
//!
//! Reads go through a buffer that outlives a single `receive`: a receive that
//! is cancelled part way through a frame keeps the bytes it already pulled off
//! the stream, and the next receive resumes from them.
//!
//! A send cannot be resumed that way, since the peer has already seen part of
//! the frame. A writer interrupted mid-frame is marked torn and rejects every
//! later send, so the channel cache evicts it and the next transfer redials.

use super::BoxConn;
use crate::error::{CoreError, Result};
use crate::rpc::endpoint::Endpoint;
use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt, ReadHalf, WriteHalf};

const INITIAL_BUFFER: usize = 8 * 1024;

pub(crate) struct StreamReader {
    io: ReadHalf<BoxConn>,
    buf: BytesMut,
}

impl StreamReader {
    pub(crate) fn new(io: ReadHalf<BoxConn>) -> Self {
        Self {
            io,
            buf: BytesMut::with_capacity(INITIAL_BUFFER),
        }
    }

    /// Bytes read but not yet consumed
    pub(crate) fn buffered(&self) -> &[u8] {
        &self.buf
    }

    pub(crate) fn reserve(&mut self, additional: usize) {
        self.buf.reserve(additional);
    }

    /// Take the first `len` buffered bytes
    pub(crate) fn consume(&mut self, len: usize) -> Bytes {
        self.buf.split_to(len).freeze()
    }

    /// Pull more bytes into the buffer
    ///
    /// Cancel safe: bytes are only ever appended to the buffer, never held in
    /// the future. Fails with a channel error once the peer has closed.
    pub(crate) async fn fill(&mut self, endpoint: &Endpoint) -> Result<()> {
        let read = self.io.read_buf(&mut self.buf).await.map_err(|e| {
            CoreError::channel_with_source(endpoint.to_string(), "Failed to read from stream", e)
        })?;
        if read == 0 {
            return Err(CoreError::channel(endpoint.to_string(), "Connection closed"));
        }
        Ok(())
    }
}

pub(crate) struct StreamWriter {
    io: WriteHalf<BoxConn>,
    torn: bool,
}

impl StreamWriter {
    pub(crate) fn new(io: WriteHalf<BoxConn>) -> Self {
        Self { io, torn: false }
    }

    /// Write one complete frame and flush it
    pub(crate) async fn write_frame(&mut self, endpoint: &Endpoint, frame: &[u8]) -> Result<()> {
        if self.torn {
            return Err(CoreError::channel(
                endpoint.to_string(),
                "Stream holds a partial frame from an interrupted send",
            ));
        }

        // Cleared only once the whole frame is out
        self.torn = true;
        self.io.write_all(frame).await.map_err(|e| {
            CoreError::channel_with_source(endpoint.to_string(), "Failed to write frame", e)
        })?;
        self.io.flush().await.map_err(|e| {
            CoreError::channel_with_source(endpoint.to_string(), "Failed to flush stream", e)
        })?;
        self.torn = false;
        Ok(())
    }
}

/// Reject payloads the peer would refuse, before any byte is written
pub(crate) fn check_outgoing(endpoint: &Endpoint, len: usize, max: usize) -> Result<u32> {
    let limit = max.min(u32::MAX as usize);
    if len > limit {
        return Err(CoreError::channel(
            endpoint.to_string(),
            format!("Payload size {} exceeds maximum {}", len, limit),
        ));
    }
    u32::try_from(len).map_err(|_| {
        CoreError::channel(endpoint.to_string(), format!("Payload size {} overflows u32", len))
    })
}
