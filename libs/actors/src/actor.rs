//! Actors
//!
//! An actor owns one mailbox and one opaque data value. `start` launches the
//! single processing loop that drains the inbound queue into a user handler;
//! `stop` closes the mailbox, which is the only thing that ends the loop.

use crate::context::Context;
use crate::error::{CoreError, Result};
use crate::id::{ActorId, IdGenerator};
use crate::mail::{Mail, Message};
use crate::mailbox::{Mailbox, MailboxSettings};
use parking_lot::Mutex;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// A unit of computation with its own mailbox and state
pub struct Actor<M, D> {
    id: ActorId,
    mailbox: Mailbox<M>,
    data: D,
    started: AtomicBool,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl<M: Message, D> Actor<M, D> {
    /// Wrap an existing mailbox; the actor takes the mailbox's id
    pub fn new(mailbox: Mailbox<M>, data: D) -> Self {
        Self {
            id: mailbox.id().clone(),
            mailbox,
            data,
            started: AtomicBool::new(false),
            task: Mutex::new(None),
        }
    }

    pub fn id(&self) -> &ActorId {
        &self.id
    }

    pub fn mailbox(&self) -> &Mailbox<M> {
        &self.mailbox
    }

    pub fn data(&self) -> &D {
        &self.data
    }

    /// Launch the processing loop
    ///
    /// `process` is invoked once per received mail, in FIFO order, and must
    /// not block the loop indefinitely. Receive failures are logged and the
    /// loop keeps going; it ends once the mailbox is closed and drained.
    /// Only one loop may ever run per actor.
    pub fn start<F, Fut>(&self, mut process: F) -> Result<()>
    where
        F: FnMut(Mail<M>) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        if self.started.swap(true, Ordering::AcqRel) {
            return Err(CoreError::actor_already_started(self.id.clone()));
        }

        let mailbox = self.mailbox.clone();
        let actor_id = self.id.clone();

        let handle = tokio::spawn(async move {
            let ctx = Context::background();
            info!(actor_id = %actor_id, "Actor loop started");
            loop {
                match mailbox.receive(&ctx).await {
                    Ok(mail) => process(mail).await,
                    Err(e) if e.is_closed() => break,
                    Err(e) => {
                        warn!(
                            actor_id = %actor_id,
                            error = %e,
                            error_code = %e.code(),
                            "Mailbox receive failed, continuing"
                        );
                        tokio::task::yield_now().await;
                    }
                }
            }
            info!(actor_id = %actor_id, "Actor loop stopped");
        });

        *self.task.lock() = Some(handle);
        Ok(())
    }

    /// Whether the processing loop is currently alive
    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Close the mailbox and wait for the loop to finish draining
    ///
    /// If `ctx` ends first the loop keeps draining in the background and the
    /// cancellation error is returned.
    pub async fn stop(&self, ctx: &Context) -> Result<()> {
        self.mailbox.close(ctx).await?;

        let handle = self.task.lock().take();
        let Some(mut handle) = handle else {
            debug!(actor_id = %self.id, "Stopped actor that was never started");
            return Ok(());
        };

        let joined = tokio::select! {
            joined = &mut handle => joined,
            err = ctx.done("actor stop") => {
                *self.task.lock() = Some(handle);
                return Err(err);
            }
        };

        if let Err(e) = joined {
            if e.is_panic() {
                error!(actor_id = %self.id, "Actor handler panicked");
            }
        }
        Ok(())
    }
}

impl<M: Message, D: fmt::Debug> fmt::Debug for Actor<M, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Actor")
            .field("id", &self.id)
            .field("mailbox", &self.mailbox)
            .field("data", &self.data)
            .field("started", &self.started.load(Ordering::Acquire))
            .finish()
    }
}

/// Creates actors together with their mailboxes
#[derive(Debug)]
pub struct ActorFactory {
    ids: IdGenerator,
    settings: MailboxSettings,
}

impl ActorFactory {
    pub fn new(kind: impl Into<String>, settings: MailboxSettings) -> Self {
        Self {
            ids: IdGenerator::new(kind),
            settings,
        }
    }

    /// New actor with a fresh id and an empty mailbox
    pub fn create<M: Message, D>(&self, data: D) -> Result<Actor<M, D>> {
        let id = self.ids.next_id();
        let mailbox = Mailbox::new(id.clone(), self.settings)?;
        debug!(actor_id = %id, kind = %self.settings.kind, "Actor created");
        Ok(Actor::new(mailbox, data))
    }

    pub fn settings(&self) -> MailboxSettings {
        self.settings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::mailbox::{MailboxBackend, MailboxKind, MemoryBackend};
    use async_trait::async_trait;
    use codec::CodecTag;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn factory() -> ActorFactory {
        ActorFactory::new("actor", MailboxSettings::memory(8))
    }

    fn mail_to(receiver: &ActorId, text: &str) -> Mail<String> {
        Mail::new(ActorId::new("test", 0), receiver.clone(), text.to_string(), CodecTag::Json)
    }

    #[tokio::test]
    async fn test_factory_assigns_increasing_ids() {
        let factory = factory();
        let a: Actor<String, ()> = factory.create(()).unwrap();
        let b: Actor<String, ()> = factory.create(()).unwrap();
        assert_eq!(a.id().to_string(), "actor:1");
        assert_eq!(b.id().to_string(), "actor:2");
        assert_eq!(a.mailbox().id(), a.id());
    }

    #[tokio::test]
    async fn test_loop_processes_in_order() {
        let actor: Actor<String, &str> = factory().create("room-7").unwrap();
        assert_eq!(*actor.data(), "room-7");

        let (tx, mut rx) = mpsc::unbounded_channel();
        actor
            .start(move |mail: Mail<String>| {
                let tx = tx.clone();
                async move {
                    let _ = tx.send(mail.into_payload());
                }
            })
            .unwrap();
        assert!(actor.is_running());

        let ctx = Context::background();
        for text in ["m1", "m2", "m3"] {
            actor.mailbox().send(&ctx, mail_to(actor.id(), text)).await.unwrap();
        }
        for text in ["m1", "m2", "m3"] {
            assert_eq!(rx.recv().await.unwrap(), text);
        }

        actor.stop(&ctx).await.unwrap();
        assert!(!actor.is_running());
    }

    #[tokio::test]
    async fn test_second_start_rejected() {
        let actor: Actor<String, ()> = factory().create(()).unwrap();
        actor.start(|_mail: Mail<String>| async {}).unwrap();
        let err = actor.start(|_mail: Mail<String>| async {}).unwrap_err();
        assert_eq!(err.code(), ErrorCode::ActorAlreadyStarted);
        actor.stop(&Context::background()).await.unwrap();
    }

    #[tokio::test]
    async fn test_stop_without_start() {
        let actor: Actor<String, ()> = factory().create(()).unwrap();
        actor.stop(&Context::background()).await.unwrap();
        assert!(actor.mailbox().is_closed());
    }

    #[tokio::test]
    async fn test_stop_drains_queued_mail() {
        let actor: Actor<String, ()> = factory().create(()).unwrap();
        let ctx = Context::background();
        actor.mailbox().send(&ctx, mail_to(actor.id(), "late")).await.unwrap();

        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);
        actor
            .start(move |_mail: Mail<String>| {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                }
            })
            .unwrap();

        actor.stop(&ctx).await.unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    /// Fails the first receive with a transient error, then behaves normally
    struct FlakyBackend {
        inner: MemoryBackend<String>,
        failures: AtomicUsize,
    }

    #[async_trait]
    impl MailboxBackend<String> for FlakyBackend {
        fn kind(&self) -> MailboxKind {
            MailboxKind::Memory
        }

        async fn send(&self, ctx: &Context, mail: Mail<String>) -> Result<()> {
            self.inner.send(ctx, mail).await
        }

        async fn receive(&self, ctx: &Context) -> Result<Mail<String>> {
            if self.failures.load(Ordering::SeqCst) > 0 {
                self.failures.fetch_sub(1, Ordering::SeqCst);
                return Err(CoreError::mailbox_receive("transient"));
            }
            self.inner.receive(ctx).await
        }

        async fn emit(&self, ctx: &Context, mail: Mail<String>) -> Result<()> {
            self.inner.emit(ctx, mail).await
        }

        async fn collect(&self, ctx: &Context) -> Result<Mail<String>> {
            self.inner.collect(ctx).await
        }

        fn close(&self) {
            self.inner.close()
        }

        fn is_closed(&self) -> bool {
            self.inner.is_closed()
        }

        fn pending(&self) -> usize {
            self.inner.pending()
        }
    }

    #[tokio::test]
    async fn test_receive_error_does_not_end_loop() {
        let id = ActorId::new("actor", 1);
        let backend = FlakyBackend {
            inner: MemoryBackend::new(id.clone(), 4).unwrap(),
            failures: AtomicUsize::new(1),
        };
        let actor = Actor::new(Mailbox::with_backend(id.clone(), Arc::new(backend)), ());

        let (tx, mut rx) = mpsc::unbounded_channel();
        actor
            .start(move |mail: Mail<String>| {
                let tx = tx.clone();
                async move {
                    let _ = tx.send(mail.into_payload());
                }
            })
            .unwrap();

        let ctx = Context::background();
        actor.mailbox().send(&ctx, mail_to(&id, "after-error")).await.unwrap();

        let got = tokio::time::timeout(Duration::from_secs(1), rx.recv()).await.unwrap();
        assert_eq!(got.as_deref(), Some("after-error"));
        actor.stop(&ctx).await.unwrap();
    }
}
