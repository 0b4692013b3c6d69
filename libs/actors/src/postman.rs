//! Postman
//!
//! Local actor registry and delivery router for one node.
//!
//! Two delivery entry points differ only in how a registry miss is handled:
//!
//! - [`Postman::receive`] is for mail that already arrived from elsewhere
//!   (a peer, a postoffice). A miss is [`CoreError::ActorNotFound`].
//! - [`Postman::deliver`] is for mail emitted by a local actor. A miss falls
//!   through to [`Postman::dispatch`] and the attached postoffice.
//!
//! Keeping them apart stops mail that was routed here by the ring from being
//! bounced back onto the ring forever.
//!
//! The registry is read-mostly: lookups take a shared lock and release it
//! before any mailbox await; add/remove take the exclusive lock.

use crate::actor::Actor;
use crate::address::Address;
use crate::context::Context;
use crate::error::{CoreError, Result};
use crate::id::ActorId;
use crate::mail::{Mail, Message};
use crate::mailbox::Mailbox;
use crate::postoffice::{Postoffice, WeakPostoffice};
use crate::rpc::{Announcement, Endpoint};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Delivery counters
#[derive(Debug, Default)]
pub struct PostmanMetrics {
    /// Mail enqueued into a locally registered mailbox
    pub local_deliveries: AtomicU64,
    /// Mail forwarded to the postoffice
    pub dispatched: AtomicU64,
    /// `receive` calls for an unregistered receiver
    pub not_found: AtomicU64,
}

impl PostmanMetrics {
    pub fn local_deliveries(&self) -> u64 {
        self.local_deliveries.load(Ordering::Relaxed)
    }

    pub fn dispatched(&self) -> u64 {
        self.dispatched.load(Ordering::Relaxed)
    }

    pub fn not_found(&self) -> u64 {
        self.not_found.load(Ordering::Relaxed)
    }
}

struct Registration<M> {
    mailbox: Mailbox<M>,
    gatherer: JoinHandle<()>,
}

impl<M> Registration<M> {
    fn release(self) {
        self.gatherer.abort();
        self.mailbox.release_gather();
    }
}

/// Actor registry plus routing, cheap to clone
pub struct Postman<M> {
    inner: Arc<PostmanInner<M>>,
}

struct PostmanInner<M> {
    id: ActorId,
    endpoint: Option<Endpoint>,
    actors: RwLock<HashMap<ActorId, Registration<M>>>,
    postoffice: RwLock<Option<WeakPostoffice<M>>>,
    metrics: PostmanMetrics,
}

impl<M> Drop for PostmanInner<M> {
    fn drop(&mut self) {
        for (_, registration) in self.actors.get_mut().drain() {
            registration.release();
        }
    }
}

impl<M> Clone for Postman<M> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<M: Message> Postman<M> {
    pub fn new(id: ActorId) -> Self {
        Self::build(id, None)
    }

    /// Postman that can announce itself to remote peers at `endpoint`
    pub fn with_endpoint(id: ActorId, endpoint: Endpoint) -> Self {
        Self::build(id, Some(endpoint))
    }

    fn build(id: ActorId, endpoint: Option<Endpoint>) -> Self {
        Self {
            inner: Arc::new(PostmanInner {
                id,
                endpoint,
                actors: RwLock::new(HashMap::new()),
                postoffice: RwLock::new(None),
                metrics: PostmanMetrics::default(),
            }),
        }
    }

    pub fn id(&self) -> &ActorId {
        &self.inner.id
    }

    /// Endpoint this postman advertises when registering remotely
    pub fn endpoint(&self) -> Option<&Endpoint> {
        self.inner.endpoint.as_ref()
    }

    pub fn metrics(&self) -> &PostmanMetrics {
        &self.inner.metrics
    }

    /// Use `postoffice` for mail whose receiver is not local
    ///
    /// Only a weak reference is kept; dropping the postoffice elsewhere
    /// detaches it.
    pub fn attach_postoffice(&self, postoffice: &Postoffice<M>) {
        *self.inner.postoffice.write() = Some(postoffice.downgrade());
        debug!(postman = %self.inner.id, postoffice = %postoffice.id(), "Postoffice attached");
    }

    pub fn detach_postoffice(&self) {
        *self.inner.postoffice.write() = None;
    }

    pub fn postoffice(&self) -> Option<Postoffice<M>> {
        self.inner
            .postoffice
            .read()
            .as_ref()
            .and_then(WeakPostoffice::upgrade)
    }

    /// Register an actor and route everything it emits through `deliver`
    ///
    /// An actor's outbound queue can be gathered by one postman at a time.
    /// Adding an actor that is already registered with the same mailbox is a
    /// no-op; a different mailbox under the same id replaces the old one.
    pub fn add<D>(&self, ctx: &Context, actor: &Actor<M, D>) -> Result<()> {
        ctx.check("postman add")?;

        let mailbox = actor.mailbox().clone();
        let mut actors = self.inner.actors.write();
        if let Some(existing) = actors.get(actor.id()) {
            if existing.mailbox.same_mailbox(&mailbox) {
                debug!(postman = %self.inner.id, actor_id = %actor.id(), "Actor already registered");
                return Ok(());
            }
        }

        let weak = Arc::downgrade(&self.inner);
        let gatherer = mailbox.gather(move |mail| forward(weak.clone(), mail))?;
        let previous = actors.insert(
            actor.id().clone(),
            Registration {
                mailbox,
                gatherer,
            },
        );
        drop(actors);

        if let Some(previous) = previous {
            previous.release();
            debug!(postman = %self.inner.id, actor_id = %actor.id(), "Replaced previous mailbox");
        }

        info!(postman = %self.inner.id, actor_id = %actor.id(), "Actor registered");
        Ok(())
    }

    pub fn remove(&self, ctx: &Context, id: &ActorId) -> Result<()> {
        ctx.check("postman remove")?;
        let registration = self
            .inner
            .actors
            .write()
            .remove(id)
            .ok_or_else(|| CoreError::actor_not_found(id.clone()))?;
        registration.release();

        info!(postman = %self.inner.id, actor_id = %id, "Actor unregistered");
        Ok(())
    }

    /// Deliver mail that arrived from outside this node's actors
    ///
    /// Fails with `ActorNotFound` if the receiver is not registered here.
    pub async fn receive(&self, ctx: &Context, mail: Mail<M>) -> Result<()> {
        match self.lookup(mail.receiver()) {
            Some(mailbox) => self.enqueue(ctx, &mailbox, mail).await,
            None => {
                self.inner.metrics.not_found.fetch_add(1, Ordering::Relaxed);
                debug!(postman = %self.inner.id, receiver = %mail.receiver(), "Receiver not registered");
                Err(CoreError::actor_not_found(mail.receiver().clone()))
            }
        }
    }

    /// Deliver mail emitted by a local actor, dispatching on a local miss
    pub async fn deliver(&self, ctx: &Context, mail: Mail<M>) -> Result<()> {
        match self.lookup(mail.receiver()) {
            Some(mailbox) => self.enqueue(ctx, &mailbox, mail).await,
            None => self.dispatch(ctx, mail).await,
        }
    }

    /// Forward to the attached postoffice
    pub async fn dispatch(&self, ctx: &Context, mail: Mail<M>) -> Result<()> {
        let postoffice = self
            .postoffice()
            .ok_or_else(|| CoreError::postoffice_not_registered(self.inner.id.clone()))?;
        self.inner.metrics.dispatched.fetch_add(1, Ordering::Relaxed);
        postoffice.dispatch(ctx, mail).await
    }

    /// Make this postman reachable through `address`
    ///
    /// A local postoffice gets this postman added to its ring. A remote peer
    /// is sent an announcement carrying this postman's endpoint, which the
    /// peer's inbound pump turns into a ring entry.
    pub async fn register(&self, ctx: &Context, address: &Address<M>) -> Result<()> {
        ctx.check("postman register")?;
        match address {
            Address::LocalPostoffice(postoffice) => {
                postoffice.add(ctx, Address::local_postman(self))
            }
            Address::Remote(remote) => {
                let endpoint = self.inner.endpoint.clone().ok_or_else(|| {
                    CoreError::address_not_supported(format!(
                        "postman {} has no endpoint to announce to {}",
                        self.inner.id,
                        remote.endpoint()
                    ))
                })?;
                let announcement = Announcement {
                    postman: self.inner.id.clone(),
                    endpoint,
                };
                remote.announce(ctx, announcement).await?;
                info!(postman = %self.inner.id, peer = %remote.endpoint(), "Announced to peer");
                Ok(())
            }
            Address::LocalPostman(other) => Err(CoreError::address_not_supported(format!(
                "postman {} cannot register with another postman ({})",
                self.inner.id,
                other.id()
            ))),
        }
    }

    pub fn contains(&self, id: &ActorId) -> bool {
        self.inner.actors.read().contains_key(id)
    }

    /// Registered actor ids, sorted
    pub fn actor_ids(&self) -> Vec<ActorId> {
        let mut ids: Vec<ActorId> = self.inner.actors.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.inner.actors.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.actors.read().is_empty()
    }

    fn lookup(&self, id: &ActorId) -> Option<Mailbox<M>> {
        self.inner
            .actors
            .read()
            .get(id)
            .map(|registration| registration.mailbox.clone())
    }

    async fn enqueue(&self, ctx: &Context, mailbox: &Mailbox<M>, mail: Mail<M>) -> Result<()> {
        mailbox.send(ctx, mail).await?;
        self.inner
            .metrics
            .local_deliveries
            .fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

/// Gather handler: route one emitted mail through the postman, if it still exists
async fn forward<M: Message>(postman: Weak<PostmanInner<M>>, mail: Mail<M>) {
    let Some(inner) = postman.upgrade() else {
        debug!(receiver = %mail.receiver(), "Postman dropped, discarding emitted mail");
        return;
    };
    let postman = Postman { inner };
    let receiver = mail.receiver().clone();
    if let Err(e) = postman.deliver(&Context::background(), mail).await {
        warn!(
            postman = %postman.id(),
            receiver = %receiver,
            error = %e,
            error_code = %e.code(),
            "Failed to route emitted mail"
        );
    }
}

impl<M: Message> fmt::Debug for Postman<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Postman")
            .field("id", &self.inner.id)
            .field("endpoint", &self.inner.endpoint)
            .field("actors", &self.len())
            .field("has_postoffice", &self.postoffice().is_some())
            .finish()
    }
}
