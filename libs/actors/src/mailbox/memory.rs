//! In-memory mailbox backend
//!
//! Two bounded tokio channels. Receivers sit behind async mutexes so the
//! backend can be shared; `close` fires a cancellation token that every
//! pending operation races against.
//!
//! Enqueue reserves a slot first and commits it under the read side of
//! `gate`; `close` flips the gate under the write side. Once `close` returns
//! no further mail can land, so a drain after close sees everything that was
//! acknowledged to a sender.

use super::{MailboxBackend, MailboxKind};
use crate::context::Context;
use crate::error::{CoreError, Result};
use crate::id::ActorId;
use crate::mail::{Mail, Message};
use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::trace;

struct Queue<M> {
    tx: mpsc::Sender<Mail<M>>,
    rx: Mutex<mpsc::Receiver<Mail<M>>>,
}

impl<M> Queue<M> {
    fn bounded(capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity);
        Self {
            tx,
            rx: Mutex::new(rx),
        }
    }

    fn len(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }
}

/// Bounded in-process queue pair
pub struct MemoryBackend<M> {
    id: ActorId,
    inbound: Queue<M>,
    outbound: Queue<M>,
    closed: CancellationToken,
    /// Set under the write lock by `close`
    gate: RwLock<bool>,
}

impl<M: Message> MemoryBackend<M> {
    /// Capacity applies to each direction and must be at least 1
    pub fn new(id: ActorId, capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(CoreError::configuration(
                "Mailbox capacity must be at least 1",
                Some("mailbox.capacity"),
            ));
        }
        Ok(Self {
            id,
            inbound: Queue::bounded(capacity),
            outbound: Queue::bounded(capacity),
            closed: CancellationToken::new(),
            gate: RwLock::new(false),
        })
    }

    fn closed_for_send(&self) -> CoreError {
        CoreError::mailbox_send(format!("mailbox {} is closed", self.id))
    }

    async fn enqueue(
        &self,
        queue: &Queue<M>,
        ctx: &Context,
        mail: Mail<M>,
        operation: &str,
    ) -> Result<()> {
        if self.closed.is_cancelled() {
            return Err(self.closed_for_send());
        }
        ctx.check(operation)?;

        let permit = match queue.tx.try_reserve() {
            Ok(permit) => permit,
            Err(TrySendError::Closed(())) => return Err(self.closed_for_send()),
            Err(TrySendError::Full(())) => {
                trace!(mailbox = %self.id, operation, "Queue full, waiting for capacity");
                tokio::select! {
                    biased;
                    _ = self.closed.cancelled() => return Err(self.closed_for_send()),
                    err = ctx.done(operation) => return Err(err),
                    reserved = queue.tx.reserve() => reserved.map_err(|_| self.closed_for_send())?,
                }
            }
        };

        let gate = self.gate.read();
        if *gate {
            return Err(self.closed_for_send());
        }
        permit.send(mail);
        Ok(())
    }

    async fn dequeue(&self, queue: &Queue<M>, ctx: &Context, operation: &str) -> Result<Mail<M>> {
        ctx.check(operation)?;

        let mut rx = tokio::select! {
            guard = queue.rx.lock() => guard,
            err = ctx.done(operation) => return Err(err),
        };

        tokio::select! {
            biased;
            mail = rx.recv() => mail.ok_or_else(|| CoreError::mailbox_closed(self.id.clone())),
            _ = self.closed.cancelled() => rx
                .try_recv()
                .map_err(|_| CoreError::mailbox_closed(self.id.clone())),
            err = ctx.done(operation) => Err(err),
        }
    }
}

#[async_trait]
impl<M: Message> MailboxBackend<M> for MemoryBackend<M> {
    fn kind(&self) -> MailboxKind {
        MailboxKind::Memory
    }

    async fn send(&self, ctx: &Context, mail: Mail<M>) -> Result<()> {
        self.enqueue(&self.inbound, ctx, mail, "mailbox send").await
    }

    async fn receive(&self, ctx: &Context) -> Result<Mail<M>> {
        self.dequeue(&self.inbound, ctx, "mailbox receive").await
    }

    async fn emit(&self, ctx: &Context, mail: Mail<M>) -> Result<()> {
        self.enqueue(&self.outbound, ctx, mail, "mailbox emit").await
    }

    async fn collect(&self, ctx: &Context) -> Result<Mail<M>> {
        self.dequeue(&self.outbound, ctx, "mailbox collect").await
    }

    fn close(&self) {
        *self.gate.write() = true;
        self.closed.cancel();
    }

    fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    fn pending(&self) -> usize {
        self.inbound.len()
    }
}
