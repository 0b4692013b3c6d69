//! Endpoint descriptors
//!
//! `scheme://host:port` strings name remote nodes both as channel targets and
//! as ring keys. Parsing happens once, when configuration is resolved, so an
//! unsupported scheme is rejected before any mail is routed.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Endpoint parse failures
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EndpointError {
    #[error("Endpoint '{input}' has no scheme, expected scheme://host:port")]
    MissingScheme { input: String },

    #[error("Unsupported endpoint scheme '{scheme}'")]
    UnsupportedScheme { scheme: String },

    #[error("Endpoint '{input}' has no host")]
    MissingHost { input: String },

    #[error("Endpoint '{input}' has an invalid port")]
    InvalidPort { input: String },
}

/// Transport selected by an endpoint's scheme
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Scheme {
    Tcp,
    Http,
}

impl Scheme {
    pub fn as_str(self) -> &'static str {
        match self {
            Scheme::Tcp => "tcp",
            Scheme::Http => "http",
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Scheme {
    type Err = EndpointError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "tcp" => Ok(Scheme::Tcp),
            "http" => Ok(Scheme::Http),
            _ => Err(EndpointError::UnsupportedScheme {
                scheme: s.to_string(),
            }),
        }
    }
}

/// Parsed `scheme://host:port`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Endpoint {
    scheme: Scheme,
    host: String,
    port: u16,
}

impl Endpoint {
    pub fn new(scheme: Scheme, host: impl Into<String>, port: u16) -> Self {
        Self {
            scheme,
            host: host.into(),
            port,
        }
    }

    pub fn parse(input: &str) -> Result<Self, EndpointError> {
        input.parse()
    }

    pub fn scheme(&self) -> Scheme {
        self.scheme
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// `host:port`, as used in a Host header or a socket connect call
    pub fn authority(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl FromStr for Endpoint {
    type Err = EndpointError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let (scheme, rest) = input
            .split_once("://")
            .ok_or_else(|| EndpointError::MissingScheme {
                input: input.to_string(),
            })?;
        let scheme: Scheme = scheme.parse()?;

        let rest = rest.trim_end_matches('/');
        let (host, port) = rest
            .rsplit_once(':')
            .ok_or_else(|| EndpointError::InvalidPort {
                input: input.to_string(),
            })?;
        if host.is_empty() {
            return Err(EndpointError::MissingHost {
                input: input.to_string(),
            });
        }
        let port = port.parse::<u16>().map_err(|_| EndpointError::InvalidPort {
            input: input.to_string(),
        })?;

        Ok(Self::new(scheme, host, port))
    }
}

impl TryFrom<String> for Endpoint {
    type Error = EndpointError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Endpoint> for String {
    fn from(endpoint: Endpoint) -> Self {
        endpoint.to_string()
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}:{}", self.scheme, self.host, self.port)
    }
}
