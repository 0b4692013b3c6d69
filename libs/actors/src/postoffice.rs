//! Postoffice
//!
//! Cluster-wide address resolution. The consistent-hash ring is the only
//! record of membership: `dispatch` hashes the receiver's id onto the ring
//! and transfers the mail to whichever address owns that position.
//!
//! The selected address is cloned out of the ring before the transfer, so a
//! dispatch that has already resolved completes against that address even if
//! it is removed concurrently.

use crate::address::{remote_key, Address};
use crate::context::Context;
use crate::error::{CoreError, Result};
use crate::id::ActorId;
use crate::mail::{Mail, Message};
use crate::rpc::Endpoint;
use hashring::{HashAlgorithm, HashFn, HashRing};
use runtime_config::RingConfig;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, info};

/// Ring-backed dispatcher, cheap to clone
pub struct Postoffice<M> {
    inner: Arc<PostofficeInner<M>>,
}

struct PostofficeInner<M> {
    id: ActorId,
    ring: HashRing<Address<M>>,
    dispatched: AtomicU64,
}

/// Non-owning postoffice handle
pub struct WeakPostoffice<M> {
    inner: Weak<PostofficeInner<M>>,
}

impl<M> Clone for Postoffice<M> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<M> Clone for WeakPostoffice<M> {
    fn clone(&self) -> Self {
        Self {
            inner: Weak::clone(&self.inner),
        }
    }
}

impl<M> WeakPostoffice<M> {
    pub fn upgrade(&self) -> Option<Postoffice<M>> {
        self.inner.upgrade().map(|inner| Postoffice { inner })
    }
}

impl<M: Message> Postoffice<M> {
    /// Postoffice with the default CRC32 ring
    pub fn new(id: ActorId, replicas: usize) -> Result<Self> {
        Self::with_hasher(id, replicas, HashAlgorithm::default().hasher())
    }

    pub fn with_hasher(id: ActorId, replicas: usize, hasher: HashFn) -> Result<Self> {
        let ring = HashRing::with_hasher(replicas, hasher)
            .map_err(|e| CoreError::configuration(e.to_string(), Some("ring.replicas")))?;
        Ok(Self {
            inner: Arc::new(PostofficeInner {
                id,
                ring,
                dispatched: AtomicU64::new(0),
            }),
        })
    }

    pub fn from_config(id: ActorId, config: &RingConfig) -> Result<Self> {
        Self::with_hasher(id, config.replicas, config.hash.hasher())
    }

    pub fn id(&self) -> &ActorId {
        &self.inner.id
    }

    pub fn downgrade(&self) -> WeakPostoffice<M> {
        WeakPostoffice {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Insert an address; re-adding an equal key replaces it
    pub fn add(&self, ctx: &Context, address: Address<M>) -> Result<()> {
        ctx.check("postoffice add")?;
        let key = address.key();
        self.inner.ring.add(address);
        info!(
            postoffice = %self.inner.id,
            address = %key,
            addresses = self.inner.ring.node_count(),
            "Address added to ring"
        );
        Ok(())
    }

    /// Remove every virtual node of `address`
    pub fn remove(&self, ctx: &Context, address: &Address<M>) -> Result<()> {
        self.remove_key(ctx, &address.key())
    }

    /// Remove by ring key; removing an absent key is not an error
    pub fn remove_key(&self, ctx: &Context, key: &str) -> Result<()> {
        ctx.check("postoffice remove")?;
        match self.inner.ring.remove_key(key) {
            Some(_) => info!(postoffice = %self.inner.id, address = %key, "Address removed from ring"),
            None => debug!(postoffice = %self.inner.id, address = %key, "Address not on ring"),
        }
        Ok(())
    }

    /// Address that currently owns `receiver`
    pub fn route(&self, receiver: &ActorId) -> Option<Address<M>> {
        self.inner.ring.get(&receiver.to_string())
    }

    /// Resolve the receiver on the ring and transfer the mail there
    ///
    /// Transfer errors are returned unchanged; nothing is retried.
    pub async fn dispatch(&self, ctx: &Context, mail: Mail<M>) -> Result<()> {
        ctx.check("postoffice dispatch")?;
        let address = self
            .route(mail.receiver())
            .ok_or_else(|| CoreError::postman_not_found(mail.receiver().clone()))?;

        debug!(
            postoffice = %self.inner.id,
            receiver = %mail.receiver(),
            address = %address,
            "Dispatching mail"
        );
        self.inner.dispatched.fetch_add(1, Ordering::Relaxed);
        address.transfer(ctx, mail).await
    }

    /// Snapshot of the distinct addresses, ordered by key
    pub fn addresses(&self) -> Vec<Address<M>> {
        self.inner.ring.nodes()
    }

    pub fn address_count(&self) -> usize {
        self.inner.ring.node_count()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.inner.ring.contains(key)
    }

    pub fn contains_endpoint(&self, endpoint: &Endpoint) -> bool {
        self.contains(&remote_key(endpoint))
    }

    pub fn replicas(&self) -> usize {
        self.inner.ring.replicas()
    }

    /// Mail handed to an address so far
    pub fn dispatched(&self) -> u64 {
        self.inner.dispatched.load(Ordering::Relaxed)
    }
}

impl<M: Message> fmt::Debug for Postoffice<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Postoffice")
            .field("id", &self.inner.id)
            .field("ring", &self.inner.ring)
            .finish()
    }
}
