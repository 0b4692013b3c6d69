//! Consistent Hash Ring
//!
//! Maps arbitrary string keys onto a dynamic set of member nodes so that every
//! router holding the same membership agrees on the owner of a key, and adding
//! or removing one member only moves the keys that member gains or loses.
//!
//! # Architecture
//!
//! ```text
//!            hash("node-a:0")      hash("node-b:0")
//!                  │                     │
//!   0 ─────────────●──────────■──────────●────────■───────────── u32::MAX
//!                             │                   │
//!                    hash("node-a:1")     hash("node-b:1")
//!
//!   get(key) = first virtual node at or after hash(key), wrapping to the start
//! ```
//!
//! Each member owns `replicas` virtual nodes at `hash("{key}:{i}")`. Lookups
//! binary-search the ordered positions, so routing is `O(log(members * replicas))`.
//!
//! # Examples
//!
//! ```rust
//! use hashring::HashRing;
//!
//! let ring = HashRing::new(150).unwrap();
//! ring.add("node-a".to_string());
//! ring.add("node-b".to_string());
//!
//! let owner = ring.get("user:42").unwrap();
//! assert_eq!(ring.get("user:42"), Some(owner));
//! ```

pub mod error;
pub mod hash;
pub mod ring;

pub use error::{RingError, Result};
pub use hash::{crc32_hash, sha3_hash, HashAlgorithm, HashFn};
pub use ring::{HashRing, RingNode};

/// Virtual nodes per member when nothing else is configured
pub const DEFAULT_REPLICAS: usize = 150;
