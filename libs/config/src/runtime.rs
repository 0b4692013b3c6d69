//! Node Runtime Configuration
//!
//! Loads [`RuntimeConfig`] from an optional TOML file with environment
//! variable overrides layered on top.

use crate::logging::LoggingConfig;
use crate::{DEFAULT_MAILBOX_CAPACITY, DEFAULT_RING_REPLICAS, ENV_PREFIX};
use anyhow::{bail, Context, Result};
use config_crate::{Config, Environment, File};
use hashring::HashAlgorithm;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

/// Main runtime configuration structure
#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Node identity and reachability
    pub node: NodeConfig,

    /// Mailbox backend and sizing
    pub mailbox: MailboxConfig,

    /// Consistent hash ring shape
    pub ring: RingConfig,

    /// Log level and output format
    pub logging: LoggingConfig,
}

/// Node identity
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct NodeConfig {
    /// Kind tag used when generating postman / postoffice ids
    pub name: String,

    /// Endpoint other nodes reach this node on (`scheme://host:port`)
    pub endpoint: Option<String>,

    /// Remote endpoints added to the postoffice ring at startup
    pub peers: Vec<String>,
}

/// Mailbox settings applied to every actor created by a node
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct MailboxConfig {
    /// Backend type tag; only `memory` is implemented
    pub kind: String,

    /// Bounded capacity of each queue direction
    pub capacity: usize,
}

/// Hash ring settings
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct RingConfig {
    /// Virtual nodes per member
    pub replicas: usize,

    /// Hash function for virtual-node placement
    pub hash: HashAlgorithm,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            name: "node".to_string(),
            endpoint: None,
            peers: Vec::new(),
        }
    }
}

impl Default for MailboxConfig {
    fn default() -> Self {
        Self {
            kind: "memory".to_string(),
            capacity: DEFAULT_MAILBOX_CAPACITY,
        }
    }
}

impl Default for RingConfig {
    fn default() -> Self {
        Self {
            replicas: DEFAULT_RING_REPLICAS,
            hash: HashAlgorithm::default(),
        }
    }
}

impl RuntimeConfig {
    /// Load configuration from an optional file with environment overrides
    ///
    /// Environment variables use the `ACTORS` prefix and `__` as the section
    /// separator, e.g. `ACTORS__RING__REPLICAS=300`.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();

        if let Some(path) = path {
            info!("Loading runtime config: {:?}", path);
            builder = builder.add_source(File::from(path).required(true));
        }

        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        );

        let config: RuntimeConfig = builder
            .build()
            .context("Failed to build configuration")?
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        debug!(
            node = %config.node.name,
            capacity = config.mailbox.capacity,
            replicas = config.ring.replicas,
            hash = %config.ring.hash,
            "Runtime configuration loaded"
        );
        Ok(config)
    }

    /// Reject values no node can run with
    pub fn validate(&self) -> Result<()> {
        if self.node.name.trim().is_empty() {
            bail!("node.name must not be empty");
        }
        if self.mailbox.capacity == 0 {
            bail!("mailbox.capacity must be at least 1");
        }
        if self.ring.replicas == 0 {
            bail!("ring.replicas must be at least 1");
        }
        for endpoint in self.node.endpoint.iter().chain(self.node.peers.iter()) {
            if !endpoint.contains("://") {
                bail!("endpoint '{}' is not of the form scheme://host:port", endpoint);
            }
        }
        Ok(())
    }

    /// Expand environment variables in endpoint strings
    pub fn expand_env_vars(&mut self) -> Result<()> {
        if let Some(endpoint) = &self.node.endpoint {
            let expanded = shellexpand::env(endpoint)
                .context("Failed to expand node endpoint")?
                .into_owned();
            self.node.endpoint = Some(expanded);
        }

        for peer in &mut self.node.peers {
            let expanded = shellexpand::env(peer.as_str())
                .context("Failed to expand peer endpoint")?
                .into_owned();
            *peer = expanded;
        }

        Ok(())
    }
}

/// Convenience function: load, expand and validate
pub fn load_config(path: Option<&Path>) -> Result<RuntimeConfig> {
    let mut config = RuntimeConfig::load(path)?;
    config.expand_env_vars()?;
    config.validate()?;
    Ok(config)
}
