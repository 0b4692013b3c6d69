//! HTTP/1.1 request framing
//!
//! Each payload travels as the body of a `POST /mail` request with an exact
//! `Content-Length`. Requests are one-way: the peer's inbound pump consumes
//! them and no response is read, which keeps the channel symmetric with the
//! length-prefixed stream channel.
//!
//! The request head is parsed out of the connection's read buffer, so a
//! receive interrupted half way through a request picks up where it stopped.

use super::stream::{check_outgoing, StreamReader, StreamWriter};
use super::{BoxConn, RpcChannel, DEFAULT_MAX_FRAME_SIZE};
use crate::context::Context;
use crate::error::{CoreError, Result};
use crate::rpc::endpoint::Endpoint;
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use tokio::sync::Mutex;
use tracing::{debug, trace};

/// Request path mail is posted to
pub const MAIL_PATH: &str = "/mail";

const MAX_HEADER_LINES: usize = 64;
const MAX_HEADER_LINE: usize = 8 * 1024;

/// Request channel for `http://` endpoints
pub struct HttpChannel {
    endpoint: Endpoint,
    reader: Mutex<StreamReader>,
    writer: Mutex<StreamWriter>,
    max_body_size: usize,
}

/// Parsed request head: its length on the wire and the announced body length
struct RequestHead {
    len: usize,
    content_length: usize,
}

impl HttpChannel {
    pub fn new(endpoint: Endpoint, conn: BoxConn) -> Self {
        Self::with_max_body_size(endpoint, conn, DEFAULT_MAX_FRAME_SIZE)
    }

    pub fn with_max_body_size(endpoint: Endpoint, conn: BoxConn, max_body_size: usize) -> Self {
        let (reader, writer) = tokio::io::split(conn);
        Self {
            endpoint,
            reader: Mutex::new(StreamReader::new(reader)),
            writer: Mutex::new(StreamWriter::new(writer)),
            max_body_size,
        }
    }

    fn error(&self, message: impl Into<String>) -> CoreError {
        CoreError::channel(self.endpoint.to_string(), message)
    }

    async fn write_request(&self, body: &[u8]) -> Result<()> {
        check_outgoing(&self.endpoint, body.len(), self.max_body_size)?;

        let head = format!(
            "POST {} HTTP/1.1\r\nHost: {}\r\nContent-Type: application/octet-stream\r\nContent-Length: {}\r\n\r\n",
            MAIL_PATH,
            self.endpoint.authority(),
            body.len()
        );

        let mut request = BytesMut::with_capacity(head.len() + body.len());
        request.extend_from_slice(head.as_bytes());
        request.extend_from_slice(body);

        self.writer
            .lock()
            .await
            .write_frame(&self.endpoint, &request)
            .await?;

        debug!(endpoint = %self.endpoint, bytes = body.len(), "Posted mail request");
        Ok(())
    }

    async fn read_request(&self) -> Result<Bytes> {
        let mut reader = self.reader.lock().await;

        loop {
            if let Some(head) = self.parse_head(reader.buffered())? {
                let total = head.len + head.content_length;
                let buffered = reader.buffered().len();
                if buffered >= total {
                    reader.consume(head.len);
                    let body = reader.consume(head.content_length);
                    debug!(endpoint = %self.endpoint, bytes = head.content_length, "Received mail request");
                    return Ok(body);
                }
                reader.reserve(total - buffered);
            }

            reader.fill(&self.endpoint).await?;
        }
    }

    /// Parse a complete request head from `buf`, or `None` if more bytes are needed
    fn parse_head(&self, buf: &[u8]) -> Result<Option<RequestHead>> {
        let mut pos = 0;
        let mut headers = 0;
        let mut content_length = None;

        loop {
            let Some(offset) = buf[pos..].iter().position(|b| *b == b'\n') else {
                if buf.len() - pos > MAX_HEADER_LINE {
                    return Err(self.error("Request header line too long"));
                }
                return Ok(None);
            };
            if offset + 1 > MAX_HEADER_LINE {
                return Err(self.error("Request header line too long"));
            }

            let first = pos == 0;
            let raw = &buf[pos..pos + offset];
            pos += offset + 1;
            let line = std::str::from_utf8(raw)
                .map_err(|_| self.error("Request head is not valid UTF-8"))?
                .trim_end_matches('\r');

            if first {
                let mut parts = line.split_whitespace();
                match (parts.next(), parts.next(), parts.next()) {
                    (Some("POST"), Some(MAIL_PATH), Some(version)) if version.starts_with("HTTP/1.") => {
                        continue;
                    }
                    _ => {
                        return Err(self.error(format!("Unexpected request line '{}'", line)));
                    }
                }
            }

            if line.is_empty() {
                let content_length =
                    content_length.ok_or_else(|| self.error("Request has no Content-Length"))?;
                if content_length > self.max_body_size {
                    return Err(self.error(format!(
                        "Body size {} exceeds maximum {}",
                        content_length, self.max_body_size
                    )));
                }
                return Ok(Some(RequestHead {
                    len: pos,
                    content_length,
                }));
            }

            headers += 1;
            if headers > MAX_HEADER_LINES {
                return Err(self.error("Too many request headers"));
            }
            let Some((name, value)) = line.split_once(':') else {
                return Err(self.error(format!("Malformed header '{}'", line)));
            };
            trace!(endpoint = %self.endpoint, header = name, "Request header");
            if name.trim().eq_ignore_ascii_case("content-length") {
                let length = value
                    .trim()
                    .parse::<usize>()
                    .map_err(|_| self.error(format!("Invalid Content-Length '{}'", value.trim())))?;
                content_length = Some(length);
            }
        }
    }
}

#[async_trait]
impl RpcChannel for HttpChannel {
    fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    async fn send(&self, ctx: &Context, payload: Bytes) -> Result<()> {
        ctx.check("channel send")?;
        tokio::select! {
            result = self.write_request(&payload) => result,
            err = ctx.done("channel send") => Err(err),
        }
    }

    async fn receive(&self, ctx: &Context) -> Result<Bytes> {
        ctx.check("channel receive")?;
        tokio::select! {
            result = self.read_request() => result,
            err = ctx.done("channel receive") => Err(err),
        }
    }
}
