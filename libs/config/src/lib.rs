//! # Runtime Configuration
//!
//! Construction-time settings for an actor node: identity and advertised
//! endpoint, mailbox sizing, hash ring shape and logging.
//!
//! ## Features
//!
//! - **TOML files**: optional base file, every field has a default
//! - **Environment overrides**: `ACTORS__<SECTION>__<FIELD>` variables win over the file
//! - **Variable expansion**: `${VAR}` inside endpoint strings
//! - **Logging**: `tracing-subscriber` setup driven by [`LoggingConfig`]
//!
//! ## Usage
//!
//! ```rust,no_run
//! use runtime_config::{init_tracing, load_config};
//!
//! let config = load_config(Some("config/node.toml".as_ref())).unwrap();
//! init_tracing(&config.logging).unwrap();
//! assert!(config.mailbox.capacity > 0);
//! ```

pub mod logging;
pub mod runtime;

pub use hashring::HashAlgorithm;
pub use logging::{init_tracing, LogFormat, LoggingConfig};
pub use runtime::{load_config, MailboxConfig, NodeConfig, RingConfig, RuntimeConfig};

/// Default bounded capacity of each mailbox queue
pub const DEFAULT_MAILBOX_CAPACITY: usize = 100;

/// Default virtual nodes per ring member
pub const DEFAULT_RING_REPLICAS: usize = hashring::DEFAULT_REPLICAS;

/// Prefix for environment variable overrides
pub const ENV_PREFIX: &str = "ACTORS";
