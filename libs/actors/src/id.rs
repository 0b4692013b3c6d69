//! Identity for actors and routing components
//!
//! An id is a kind tag plus a sequence number handed out by an
//! [`IdGenerator`]. Its string form `"{kind}:{sequence}"` is the key the
//! postoffice hashes to pick an address.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};

/// Unique identifier within one generator
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ActorId {
    kind: String,
    sequence: i64,
}

impl ActorId {
    pub fn new(kind: impl Into<String>, sequence: i64) -> Self {
        Self {
            kind: kind.into(),
            sequence,
        }
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn sequence(&self) -> i64 {
        self.sequence
    }
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.sequence)
    }
}

/// Monotonic id source for one kind
///
/// Sequences start at 1 and strictly increase; the generator is shareable
/// across tasks.
#[derive(Debug)]
pub struct IdGenerator {
    kind: String,
    last: AtomicI64,
}

impl IdGenerator {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            last: AtomicI64::new(0),
        }
    }

    pub fn next_id(&self) -> ActorId {
        let sequence = self.last.fetch_add(1, Ordering::SeqCst) + 1;
        ActorId::new(self.kind.clone(), sequence)
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }
}
