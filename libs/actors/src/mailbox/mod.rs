//! Actor Mailboxes
//!
//! Each actor owns one mailbox made of two bounded FIFO queues:
//!
//! ```text
//!   postman / peers                     actor loop
//!        │ send()      ┌───────────┐       │ receive()
//!        └───────────▶ │  inbound  │ ─────▶┘
//!                      └───────────┘
//!        ┌──────────── ┌───────────┐ ◀─────┐
//!        │ gather()    │  outbound │       │ emit()
//!   postman.deliver    └───────────┘    actor handler
//! ```
//!
//! Queues are bounded: `send` and `emit` wait while full, `receive` waits while
//! empty. Every wait is raced against the caller's [`Context`] and against
//! `close`, so nothing blocks past cancellation or shutdown.
//!
//! The backend is pluggable by [`MailboxKind`]; only the in-memory backend is
//! implemented, the remaining kinds reserve the shape for socket, file and
//! pipe backed queues.

mod memory;

pub use memory::MemoryBackend;

use crate::context::Context;
use crate::error::{CoreError, Result};
use crate::id::ActorId;
use crate::mail::{Mail, Message};
use async_trait::async_trait;
use runtime_config::MailboxConfig;
use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Default bounded capacity of each queue direction
pub const DEFAULT_CAPACITY: usize = runtime_config::DEFAULT_MAILBOX_CAPACITY;

/// Mailbox backend type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum MailboxKind {
    #[default]
    Memory,
    Tcp,
    Udp,
    Ipc,
    Unix,
    File,
    Pipe,
}

impl MailboxKind {
    pub fn as_str(self) -> &'static str {
        match self {
            MailboxKind::Memory => "memory",
            MailboxKind::Tcp => "tcp",
            MailboxKind::Udp => "udp",
            MailboxKind::Ipc => "ipc",
            MailboxKind::Unix => "unix",
            MailboxKind::File => "file",
            MailboxKind::Pipe => "pipe",
        }
    }
}

impl fmt::Display for MailboxKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MailboxKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "memory" => Ok(MailboxKind::Memory),
            "tcp" => Ok(MailboxKind::Tcp),
            "udp" => Ok(MailboxKind::Udp),
            "ipc" => Ok(MailboxKind::Ipc),
            "unix" => Ok(MailboxKind::Unix),
            "file" => Ok(MailboxKind::File),
            "pipe" => Ok(MailboxKind::Pipe),
            other => Err(CoreError::configuration(
                format!("Unknown mailbox kind '{}'", other),
                Some("mailbox.kind"),
            )),
        }
    }
}

/// Backend selection and sizing for new mailboxes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MailboxSettings {
    pub kind: MailboxKind,
    pub capacity: usize,
}

impl Default for MailboxSettings {
    fn default() -> Self {
        Self {
            kind: MailboxKind::Memory,
            capacity: DEFAULT_CAPACITY,
        }
    }
}

impl MailboxSettings {
    pub fn memory(capacity: usize) -> Self {
        Self {
            kind: MailboxKind::Memory,
            capacity,
        }
    }

    pub fn from_config(config: &MailboxConfig) -> Result<Self> {
        Ok(Self {
            kind: config.kind.parse()?,
            capacity: config.capacity,
        })
    }
}

/// Queue pair behind a [`Mailbox`]
///
/// Implementations must make every pending and future call fail promptly once
/// `close` has been called: `send`/`emit` with `MailboxSend`, `receive`/`collect`
/// with `MailboxClosed` after the remaining mail has been drained.
#[async_trait]
pub trait MailboxBackend<M: Message>: Send + Sync {
    fn kind(&self) -> MailboxKind;

    /// Enqueue onto the inbound queue
    async fn send(&self, ctx: &Context, mail: Mail<M>) -> Result<()>;

    /// Dequeue the next inbound mail
    async fn receive(&self, ctx: &Context) -> Result<Mail<M>>;

    /// Enqueue onto the outbound queue
    async fn emit(&self, ctx: &Context, mail: Mail<M>) -> Result<()>;

    /// Dequeue the next outbound mail
    async fn collect(&self, ctx: &Context) -> Result<Mail<M>>;

    /// Close both queues; calling it again has no effect
    fn close(&self);

    fn is_closed(&self) -> bool;

    /// Mail waiting on the inbound queue
    fn pending(&self) -> usize;
}

/// Shareable handle to an actor's mailbox
pub struct Mailbox<M> {
    inner: Arc<MailboxInner<M>>,
}

struct MailboxInner<M> {
    id: ActorId,
    backend: Arc<dyn MailboxBackend<M>>,
    gathering: AtomicBool,
}

impl<M> Clone for Mailbox<M> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<M> Mailbox<M> {
    /// Allow a new gatherer after the previous one was aborted
    pub(crate) fn release_gather(&self) {
        self.inner.gathering.store(false, Ordering::Release);
    }

    /// Both handles point at the same mailbox
    pub fn same_mailbox(&self, other: &Mailbox<M>) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<M: Message> fmt::Debug for Mailbox<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mailbox")
            .field("id", &self.inner.id)
            .field("kind", &self.inner.backend.kind())
            .field("closed", &self.inner.backend.is_closed())
            .field("pending", &self.inner.backend.pending())
            .finish()
    }
}

impl<M: Message> Mailbox<M> {
    /// Build a mailbox for `id` with the configured backend
    pub fn new(id: ActorId, settings: MailboxSettings) -> Result<Self> {
        match settings.kind {
            MailboxKind::Memory => {
                let backend = MemoryBackend::new(id.clone(), settings.capacity)?;
                Ok(Self::with_backend(id, Arc::new(backend)))
            }
            other => Err(CoreError::configuration(
                format!("Mailbox backend '{}' is not implemented", other),
                Some("mailbox.kind"),
            )),
        }
    }

    /// In-memory mailbox with the given per-direction capacity
    pub fn memory(id: ActorId, capacity: usize) -> Result<Self> {
        Self::new(id, MailboxSettings::memory(capacity))
    }

    /// Wrap a custom backend
    pub fn with_backend(id: ActorId, backend: Arc<dyn MailboxBackend<M>>) -> Self {
        Self {
            inner: Arc::new(MailboxInner {
                id,
                backend,
                gathering: AtomicBool::new(false),
            }),
        }
    }

    pub fn id(&self) -> &ActorId {
        &self.inner.id
    }

    pub fn kind(&self) -> MailboxKind {
        self.inner.backend.kind()
    }

    /// Deliver mail into this mailbox, waiting while the inbound queue is full
    pub async fn send(&self, ctx: &Context, mail: Mail<M>) -> Result<()> {
        self.inner.backend.send(ctx, mail).await
    }

    /// Next inbound mail in FIFO order
    pub async fn receive(&self, ctx: &Context) -> Result<Mail<M>> {
        self.inner.backend.receive(ctx).await
    }

    /// Publish mail from the owning actor for the gatherer to route
    pub async fn emit(&self, ctx: &Context, mail: Mail<M>) -> Result<()> {
        self.inner.backend.emit(ctx, mail).await
    }

    /// Spawn the loop that drains the outbound queue into `handler`
    ///
    /// At most one gatherer per mailbox. The loop ends once the mailbox is
    /// closed and the outbound queue is empty.
    pub fn gather<F, Fut>(&self, mut handler: F) -> Result<JoinHandle<()>>
    where
        F: FnMut(Mail<M>) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        if self.inner.gathering.swap(true, Ordering::AcqRel) {
            return Err(CoreError::mailbox_receive(format!(
                "outbound queue of mailbox {} already has a gatherer",
                self.inner.id
            )));
        }

        let backend = Arc::clone(&self.inner.backend);
        let mailbox_id = self.inner.id.clone();

        Ok(tokio::spawn(async move {
            let ctx = Context::background();
            debug!(mailbox = %mailbox_id, "Gather loop started");
            loop {
                match backend.collect(&ctx).await {
                    Ok(mail) => handler(mail).await,
                    Err(e) if e.is_closed() => break,
                    Err(e) => {
                        warn!(
                            mailbox = %mailbox_id,
                            error = %e,
                            error_code = %e.code(),
                            "Outbound collect failed, continuing"
                        );
                        tokio::task::yield_now().await;
                    }
                }
            }
            debug!(mailbox = %mailbox_id, "Gather loop finished");
        }))
    }

    /// Close both queues
    ///
    /// Pending and future `send`/`emit` calls fail, `receive` drains what is
    /// left and then fails with `MailboxClosed`. Closing twice is harmless.
    pub async fn close(&self, ctx: &Context) -> Result<()> {
        ctx.check("mailbox close")?;
        if !self.inner.backend.is_closed() {
            debug!(mailbox = %self.inner.id, "Closing mailbox");
        }
        self.inner.backend.close();
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.inner.backend.is_closed()
    }

    /// Mail waiting on the inbound queue
    pub fn pending(&self) -> usize {
        self.inner.backend.pending()
    }
}
