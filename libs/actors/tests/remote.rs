//! Remote transfer over in-memory connections
//!
//! `MemoryNetwork` plays the connection layer: dialing an endpoint hands one
//! end of a duplex pipe to whichever node listens there.

use actors::{
    Address, ActorId, BoxConn, ChannelFactory, CodecTag, Context, CoreError, Dialer, Endpoint,
    ErrorCode, Mail, Node, Postman, Postoffice, Result,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use runtime_config::RuntimeConfig;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::DuplexStream;
use tokio::sync::mpsc;

#[derive(Default)]
struct MemoryNetwork {
    listeners: Mutex<HashMap<Endpoint, mpsc::UnboundedSender<DuplexStream>>>,
    dials: AtomicUsize,
}

impl MemoryNetwork {
    /// Route connections for `node`'s endpoint into `node.accept`
    fn serve<M: actors::Message>(&self, node: Arc<Node<M>>) {
        let endpoint = node.postman().endpoint().cloned().unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel::<DuplexStream>();
        self.listeners.lock().insert(endpoint, tx);
        tokio::spawn(async move {
            while let Some(conn) = rx.recv().await {
                let _pump = node.accept(Box::new(conn)).unwrap();
            }
        });
    }
}

#[async_trait]
impl Dialer for MemoryNetwork {
    async fn dial(&self, ctx: &Context, endpoint: &Endpoint) -> Result<BoxConn> {
        ctx.check("dial")?;
        let listener = self
            .listeners
            .lock()
            .get(endpoint)
            .cloned()
            .ok_or_else(|| CoreError::channel(endpoint.to_string(), "connection refused"))?;
        let (local, remote) = tokio::io::duplex(64 * 1024);
        listener
            .send(remote)
            .map_err(|_| CoreError::channel(endpoint.to_string(), "listener gone"))?;
        self.dials.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(local))
    }
}

fn node_config(name: &str, endpoint: &str) -> RuntimeConfig {
    let mut config = RuntimeConfig::default();
    config.node.name = name.to_string();
    config.node.endpoint = Some(endpoint.to_string());
    config.ring.replicas = 50;
    config
}

async fn eventually(mut check: impl FnMut() -> bool) {
    for _ in 0..200 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}

static ENCODES: AtomicUsize = AtomicUsize::new(0);
static DECODES: AtomicUsize = AtomicUsize::new(0);

/// Payload that counts how often it is serialized and deserialized
#[derive(Debug, Clone, PartialEq)]
struct Counted(u32);

impl Serialize for Counted {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        ENCODES.fetch_add(1, Ordering::SeqCst);
        serializer.serialize_u32(self.0)
    }
}

impl<'de> Deserialize<'de> for Counted {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        DECODES.fetch_add(1, Ordering::SeqCst);
        u32::deserialize(deserializer).map(Counted)
    }
}

#[tokio::test]
async fn test_local_and_remote_transfer_are_transparent() {
    let ctx = Context::background();
    let network = Arc::new(MemoryNetwork::default());

    // Local: the ring points at an in-process postman
    let postman = Postman::new(ActorId::new("postman", 1));
    let local_office = Postoffice::<Counted>::new(ActorId::new("postoffice", 1), 50).unwrap();
    local_office.add(&ctx, Address::local_postman(&postman)).unwrap();
    let local = actors::ActorFactory::new("local", actors::MailboxSettings::memory(4))
        .create::<Counted, ()>(())
        .unwrap();
    postman.add(&ctx, &local).unwrap();

    let sent = Counted(7);
    local_office
        .dispatch(&ctx, Mail::new(ActorId::new("src", 1), local.id().clone(), sent.clone(), CodecTag::Json))
        .await
        .unwrap();
    let got = local.mailbox().receive(&ctx).await.unwrap();
    assert_eq!(got.payload(), &sent);
    assert_eq!(ENCODES.load(Ordering::SeqCst), 0);
    assert_eq!(DECODES.load(Ordering::SeqCst), 0);

    // Remote: the ring points at another node's endpoint
    let beta = Arc::new(
        Node::<Counted>::new(node_config("beta", "tcp://beta:7000"), network.clone()).unwrap(),
    );
    network.serve(Arc::clone(&beta));
    let remote_actor = beta.spawn(()).unwrap();

    let remote_office = Postoffice::<Counted>::new(ActorId::new("postoffice", 2), 50).unwrap();
    let channels = ChannelFactory::new(network.clone());
    remote_office
        .add(&ctx, Address::remote(Endpoint::parse("tcp://beta:7000").unwrap(), channels))
        .unwrap();

    remote_office
        .dispatch(
            &ctx,
            Mail::new(ActorId::new("src", 1), remote_actor.id().clone(), Counted(8), CodecTag::Json),
        )
        .await
        .unwrap();

    let got = tokio::time::timeout(Duration::from_secs(2), remote_actor.mailbox().receive(&ctx))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(got.payload(), &Counted(8));
    assert_eq!(got.codec(), CodecTag::Json);
    assert_eq!(ENCODES.load(Ordering::SeqCst), 1);
    assert_eq!(DECODES.load(Ordering::SeqCst), 1);

    beta.shutdown();
}

#[tokio::test]
async fn test_http_scheme_delivers() {
    let ctx = Context::background();
    let network = Arc::new(MemoryNetwork::default());
    let gamma = Arc::new(
        Node::<String>::new(node_config("gamma", "http://gamma:8080"), network.clone()).unwrap(),
    );
    network.serve(Arc::clone(&gamma));
    let actor = gamma.spawn(()).unwrap();

    let remote = Address::<String>::remote(
        Endpoint::parse("http://gamma:8080").unwrap(),
        ChannelFactory::new(network.clone()),
    );
    for text in ["first", "second"] {
        let mail = Mail::new(ActorId::new("src", 1), actor.id().clone(), text.to_string(), CodecTag::Json);
        remote.transfer(&ctx, mail).await.unwrap();
    }

    for text in ["first", "second"] {
        let got = tokio::time::timeout(Duration::from_secs(2), actor.mailbox().receive(&ctx))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(got.payload(), text);
    }
    assert_eq!(network.dials.load(Ordering::SeqCst), 1);
    gamma.shutdown();
}

#[tokio::test]
async fn test_announce_adds_peer_to_remote_ring() {
    let ctx = Context::background();
    let network = Arc::new(MemoryNetwork::default());

    let alpha = Arc::new(
        Node::<String>::new(node_config("alpha", "tcp://alpha:7000"), network.clone()).unwrap(),
    );
    let beta = Arc::new(
        Node::<String>::new(node_config("beta", "tcp://beta:7000"), network.clone()).unwrap(),
    );
    network.serve(Arc::clone(&alpha));
    network.serve(Arc::clone(&beta));

    alpha.add_peer("tcp://beta:7000").unwrap();
    alpha.announce(&ctx).await.unwrap();

    let alpha_endpoint = Endpoint::parse("tcp://alpha:7000").unwrap();
    let office = beta.postoffice().clone();
    eventually(|| office.contains_endpoint(&alpha_endpoint)).await;
    assert_eq!(beta.postoffice().address_count(), 2);

    alpha.shutdown();
    beta.shutdown();
}

#[tokio::test]
async fn test_mail_for_missing_actor_is_dropped_by_peer() {
    let ctx = Context::background();
    let network = Arc::new(MemoryNetwork::default());
    let beta = Arc::new(
        Node::<String>::new(node_config("beta", "tcp://beta:7000"), network.clone()).unwrap(),
    );
    network.serve(Arc::clone(&beta));
    let present = beta.spawn(()).unwrap();

    let remote = Address::<String>::remote(
        Endpoint::parse("tcp://beta:7000").unwrap(),
        ChannelFactory::new(network.clone()),
    );
    let ghost = ActorId::new("beta", 999);
    remote
        .transfer(&ctx, Mail::new(ghost.clone(), ghost, "lost".to_string(), CodecTag::Json))
        .await
        .unwrap();
    remote
        .transfer(
            &ctx,
            Mail::new(present.id().clone(), present.id().clone(), "kept".to_string(), CodecTag::Json),
        )
        .await
        .unwrap();

    // The pump logs the miss and keeps serving the connection
    let got = tokio::time::timeout(Duration::from_secs(2), present.mailbox().receive(&ctx))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(got.payload(), "kept");
    eventually(|| beta.postman().metrics().not_found() == 1).await;
    beta.shutdown();
}

#[tokio::test]
async fn test_register_remote_requires_endpoint() {
    let network = Arc::new(MemoryNetwork::default());
    let postman = Postman::<String>::new(ActorId::new("postman", 1));
    let remote = Address::remote(
        Endpoint::parse("tcp://beta:7000").unwrap(),
        ChannelFactory::new(network.clone()),
    );
    let err = postman
        .register(&Context::background(), &remote)
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::AddressNotSupported);
    assert_eq!(network.dials.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_unreachable_peer_surfaces_channel_error() {
    let network = Arc::new(MemoryNetwork::default());
    let remote = Address::<String>::remote(
        Endpoint::parse("tcp://nowhere:1").unwrap(),
        ChannelFactory::new(network),
    );
    let id = ActorId::new("x", 1);
    let err = remote
        .transfer(
            &Context::background(),
            Mail::new(id.clone(), id, "x".to_string(), CodecTag::Json),
        )
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::Channel);
}
