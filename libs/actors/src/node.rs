//! Node
//!
//! Explicitly constructed bundle of one postman, one postoffice, the actor
//! factory and the channel cache, wired together from [`RuntimeConfig`].
//!
//! ```text
//!        spawn()                        add_peer()
//!          │                                │
//!   ActorFactory ──▶ Actor ──add──▶ Postman ◀─┐   Postoffice ring
//!                                     │      └── local:{postman}
//!                                     └─miss──▶  remote:{peer}... ──▶ ChannelFactory
//! ```
//!
//! Actor ids use the node name as their kind, so receivers stay unique across
//! a cluster as long as node names do.

use crate::actor::{Actor, ActorFactory};
use crate::address::{remote_key, Address};
use crate::context::Context;
use crate::error::{CoreError, Result};
use crate::id::ActorId;
use crate::mail::Message;
use crate::mailbox::MailboxSettings;
use crate::postman::Postman;
use crate::postoffice::Postoffice;
use crate::rpc::{channel_for, BoxConn, ChannelFactory, Dialer, Endpoint, Inbound};
use runtime_config::RuntimeConfig;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

pub struct Node<M> {
    name: String,
    config: RuntimeConfig,
    postman: Postman<M>,
    postoffice: Postoffice<M>,
    actors: ActorFactory,
    channels: ChannelFactory,
    lifetime: Context,
}

impl<M: Message> Node<M> {
    /// Build a node from validated configuration
    ///
    /// Remote transfers use connections from `dialer`.
    pub fn new(config: RuntimeConfig, dialer: Arc<dyn Dialer>) -> Result<Self> {
        config
            .validate()
            .map_err(|e| CoreError::configuration(format!("{:#}", e), None))?;

        let name = config.node.name.clone();
        let endpoint = config
            .node
            .endpoint
            .as_deref()
            .map(parse_endpoint)
            .transpose()?;

        let settings = MailboxSettings::from_config(&config.mailbox)?;
        let postoffice =
            Postoffice::from_config(ActorId::new(format!("{}.postoffice", name), 1), &config.ring)?;
        let postman_id = ActorId::new(format!("{}.postman", name), 1);
        let postman = match endpoint {
            Some(endpoint) => Postman::with_endpoint(postman_id, endpoint),
            None => Postman::new(postman_id),
        };

        let lifetime = Context::background();
        postman.attach_postoffice(&postoffice);
        postoffice.add(&lifetime, Address::local_postman(&postman))?;

        let node = Self {
            actors: ActorFactory::new(name.clone(), settings),
            channels: ChannelFactory::new(dialer),
            name,
            postman,
            postoffice,
            lifetime,
            config,
        };

        for peer in node.config.node.peers.clone() {
            node.add_peer(&peer)?;
        }

        info!(
            node = %node.name,
            endpoint = ?node.postman.endpoint().map(ToString::to_string),
            peers = node.config.node.peers.len(),
            "Node ready"
        );
        Ok(node)
    }

    /// Load configuration (file plus `ACTORS__*` environment) and build
    pub fn from_config_file(path: Option<&Path>, dialer: Arc<dyn Dialer>) -> Result<Self> {
        let config = runtime_config::load_config(path)
            .map_err(|e| CoreError::configuration(format!("{:#}", e), None))?;
        Self::new(config, dialer)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn postman(&self) -> &Postman<M> {
        &self.postman
    }

    pub fn postoffice(&self) -> &Postoffice<M> {
        &self.postoffice
    }

    pub fn channels(&self) -> &ChannelFactory {
        &self.channels
    }

    /// Create an actor and register it with this node's postman
    pub fn spawn<D>(&self, data: D) -> Result<Actor<M, D>> {
        let actor = self.actors.create(data)?;
        self.postman.add(&self.lifetime, &actor)?;
        Ok(actor)
    }

    /// Put a remote node on the ring
    pub fn add_peer(&self, endpoint: &str) -> Result<()> {
        let endpoint = parse_endpoint(endpoint)?;
        self.postoffice
            .add(&self.lifetime, Address::remote(endpoint, self.channels.clone()))
    }

    /// Take a remote node off the ring and drop its cached channel
    pub fn remove_peer(&self, endpoint: &str) -> Result<()> {
        let endpoint = parse_endpoint(endpoint)?;
        self.postoffice
            .remove_key(&self.lifetime, &remote_key(&endpoint))?;
        self.channels.evict(&endpoint);
        Ok(())
    }

    /// Announce this node's postman to every remote address on the ring
    pub async fn announce(&self, ctx: &Context) -> Result<()> {
        for address in self.postoffice.addresses() {
            if address.is_remote() {
                self.postman.register(ctx, &address).await?;
            }
        }
        Ok(())
    }

    /// Serve a connection a peer opened to this node
    ///
    /// Frames are read with the framing of this node's own endpoint scheme.
    /// The pump stops on [`Node::shutdown`].
    pub fn accept(&self, conn: BoxConn) -> Result<JoinHandle<Result<()>>> {
        let endpoint = self.postman.endpoint().cloned().ok_or_else(|| {
            CoreError::configuration(
                format!("node {} has no endpoint to accept connections on", self.name),
                Some("node.endpoint"),
            )
        })?;

        let inbound = Inbound::new(channel_for(endpoint, conn), self.postman.clone())
            .with_postoffice(self.postoffice.clone(), self.channels.clone());
        Ok(inbound.spawn(self.lifetime.child()))
    }

    /// Stop inbound pumps, unregister every actor and leave the ring
    ///
    /// Actors themselves are owned by the caller and keep their mailboxes.
    pub fn shutdown(&self) {
        self.lifetime.cancel();

        // The lifetime context is cancelled; teardown uses a fresh one
        let ctx = Context::background();
        for id in self.postman.actor_ids() {
            if let Err(e) = self.postman.remove(&ctx, &id) {
                warn!(
                    node = %self.name,
                    actor_id = %id,
                    error = %e,
                    error_code = %e.code(),
                    "Failed to unregister actor during shutdown"
                );
            }
        }
        if let Err(e) = self
            .postoffice
            .remove(&ctx, &Address::local_postman(&self.postman))
        {
            warn!(
                node = %self.name,
                error = %e,
                error_code = %e.code(),
                "Failed to remove postman from ring during shutdown"
            );
        }
        self.postman.detach_postoffice();

        info!(node = %self.name, "Node shut down");
    }

    pub fn is_shut_down(&self) -> bool {
        self.lifetime.is_cancelled()
    }
}

fn parse_endpoint(endpoint: &str) -> Result<Endpoint> {
    Endpoint::parse(endpoint)
        .map_err(|e| CoreError::configuration(e.to_string(), Some("node.endpoint")))
}

impl<M: Message> fmt::Debug for Node<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("name", &self.name)
            .field("postman", &self.postman)
            .field("postoffice", &self.postoffice)
            .field("channels", &self.channels)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::mail::Mail;
    use async_trait::async_trait;
    use codec::CodecTag;

    struct NoDialer;

    #[async_trait]
    impl Dialer for NoDialer {
        async fn dial(&self, _ctx: &Context, endpoint: &Endpoint) -> Result<BoxConn> {
            Err(CoreError::channel(endpoint.to_string(), "no network in unit tests"))
        }
    }

    fn config(name: &str) -> RuntimeConfig {
        let mut config = RuntimeConfig::default();
        config.node.name = name.to_string();
        config.ring.replicas = 20;
        config
    }

    #[tokio::test]
    async fn test_new_node_owns_its_ring_slot() {
        let node = Node::<String>::new(config("gate"), Arc::new(NoDialer)).unwrap();
        assert_eq!(node.postoffice().address_count(), 1);
        assert!(node.postoffice().contains("local:gate.postman:1"));
        assert!(node.postman().postoffice().is_some());
    }

    #[tokio::test]
    async fn test_spawned_actors_are_reachable() {
        let node = Node::<String>::new(config("gate"), Arc::new(NoDialer)).unwrap();
        let actor = node.spawn(()).unwrap();
        assert_eq!(actor.id().kind(), "gate");

        // Routed through the ring back to the only postman
        let ctx = Context::background();
        let mail = Mail::new(actor.id().clone(), actor.id().clone(), "loop".to_string(), CodecTag::Json);
        node.postman().dispatch(&ctx, mail).await.unwrap();
        assert_eq!(actor.mailbox().receive(&ctx).await.unwrap().payload(), "loop");
    }

    #[tokio::test]
    async fn test_peers_from_config() {
        let mut config = config("gate");
        config.node.peers = vec!["tcp://10.0.0.2:7000".to_string(), "http://10.0.0.3:8080".to_string()];
        let node = Node::<String>::new(config, Arc::new(NoDialer)).unwrap();
        assert_eq!(node.postoffice().address_count(), 3);

        node.remove_peer("tcp://10.0.0.2:7000").unwrap();
        assert_eq!(node.postoffice().address_count(), 2);
        assert!(node.postoffice().contains("remote:http://10.0.0.3:8080"));
    }

    #[tokio::test]
    async fn test_invalid_config_rejected() {
        let mut bad_scheme = config("gate");
        bad_scheme.node.peers = vec!["udp://10.0.0.2:7000".to_string()];
        let err = Node::<String>::new(bad_scheme, Arc::new(NoDialer)).unwrap_err();
        assert_eq!(err.code(), ErrorCode::Configuration);

        let mut zero = config("gate");
        zero.mailbox.capacity = 0;
        let err = Node::<String>::new(zero, Arc::new(NoDialer)).unwrap_err();
        assert_eq!(err.code(), ErrorCode::Configuration);
    }

    #[tokio::test]
    async fn test_accept_requires_endpoint() {
        let node = Node::<String>::new(config("gate"), Arc::new(NoDialer)).unwrap();
        let (conn, _peer) = tokio::io::duplex(1024);
        let err = node.accept(Box::new(conn)).unwrap_err();
        assert_eq!(err.code(), ErrorCode::Configuration);
    }

    #[tokio::test]
    async fn test_shutdown_leaves_ring() {
        let node = Node::<String>::new(config("gate"), Arc::new(NoDialer)).unwrap();
        let _actor = node.spawn(()).unwrap();
        node.shutdown();

        assert!(node.is_shut_down());
        assert!(node.postman().is_empty());
        assert_eq!(node.postoffice().address_count(), 0);
        assert!(node.postman().postoffice().is_none());
    }

    #[tokio::test]
    async fn test_shutdown_twice_is_harmless() {
        let node = Node::<String>::new(config("gate"), Arc::new(NoDialer)).unwrap();
        let actor = node.spawn(()).unwrap();
        node.shutdown();
        node.shutdown();

        assert!(node.postman().is_empty());
        assert_eq!(node.postoffice().address_count(), 0);
        // The actor outlives the node and can be registered elsewhere
        let other = Postman::<String>::new(ActorId::new("postman", 9));
        other.add(&Context::background(), &actor).unwrap();
    }
}
