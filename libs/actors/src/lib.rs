//! Location-Transparent Actor Runtime
//!
//! Actors exchange immutable [`Mail`] through bounded [`Mailbox`]es. A
//! [`Postman`] delivers to the actors registered on its node and falls back
//! to a [`Postoffice`], whose consistent-hash ring decides which postman (in
//! this process or on another node) owns a receiver.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────── node ────────────────────────┐
//! │                                                       │
//! │  Actor ──emit──▶ Mailbox ──gather──▶ Postman.deliver  │
//! │    ▲                                   │       │      │
//! │    └──receive── Mailbox ◀──local hit───┘       │ miss │
//! │                                                ▼      │
//! │                      Postoffice.dispatch(hash ring)   │
//! │                        │                    │         │
//! │            Address::LocalPostman     Address::Remote  │
//! │             (direct call)            (encode + send)  │
//! └───────────────────────────────────────────┼───────────┘
//!                                              ▼
//!                     RpcChannel (tcp:// or http://) ──▶ peer Inbound
//!                                                         └▶ Postman.receive
//! ```
//!
//! Local transfers move the mail by value with no encoding; remote transfers
//! encode exactly once with the codec named on the mail and decode exactly
//! once on the peer.
//!
//! # Examples
//!
//! ```rust,no_run
//! use actors::{ActorFactory, Context, Mail, MailboxSettings, Postman};
//! use codec::CodecTag;
//!
//! # async fn run() -> actors::Result<()> {
//! let ctx = Context::background();
//! let factory = ActorFactory::new("room", MailboxSettings::default());
//! let postman = Postman::new(actors::ActorId::new("postman", 1));
//!
//! let actor = factory.create::<String, ()>(())?;
//! postman.add(&ctx, &actor)?;
//! actor.start(|mail: Mail<String>| async move {
//!     println!("{} says {}", mail.sender(), mail.payload());
//! })?;
//!
//! let mail = Mail::new(actor.id().clone(), actor.id().clone(), "hi".to_string(), CodecTag::Json);
//! postman.deliver(&ctx, mail).await?;
//! actor.stop(&ctx).await?;
//! # Ok(())
//! # }
//! ```

pub mod actor;
pub mod address;
pub mod context;
pub mod error;
pub mod id;
pub mod mail;
pub mod mailbox;
pub mod node;
pub mod postman;
pub mod postoffice;
pub mod rpc;

pub use actor::{Actor, ActorFactory};
pub use address::{Address, RemoteAddress};
pub use context::Context;
pub use error::{CoreError, ErrorCode, Result};
pub use id::{ActorId, IdGenerator};
pub use mail::{Mail, Message};
pub use mailbox::{Mailbox, MailboxBackend, MailboxKind, MailboxSettings, MemoryBackend};
pub use node::Node;
pub use postman::{Postman, PostmanMetrics};
pub use postoffice::{Postoffice, WeakPostoffice};
pub use rpc::{
    Announcement, BoxConn, ChannelFactory, Conn, Dialer, Endpoint, EndpointError, Frame,
    HttpChannel, Inbound, RpcChannel, Scheme, TcpChannel,
};

pub use codec::CodecTag;
