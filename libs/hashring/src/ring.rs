//! Ring membership and lookup
//!
//! # Invariants
//!
//! - Every member claims `replicas` positions, `hash("{key}:{i}")` for `i in 0..replicas`.
//! - Every position in the ordered table has at least one live claimant.
//! - Re-adding a key replaces the previous member and all of its positions.
//! - When two members claim the same position, the lexicographically smallest
//!   key owns it. Ring state is a function of the member set alone, so two rings
//!   fed the same add/remove sequence route every key identically.

use crate::error::{Result, RingError};
use crate::hash::{crc32_hash, HashFn};
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Something that can sit on the ring
///
/// The returned key is both the member identity (duplicates replace each
/// other) and the seed for the member's virtual-node positions.
pub trait RingNode {
    fn ring_key(&self) -> String;
}

impl RingNode for String {
    fn ring_key(&self) -> String {
        self.clone()
    }
}

impl RingNode for &'static str {
    fn ring_key(&self) -> String {
        (*self).to_string()
    }
}

/// Consistent hash ring over members of type `T`
///
/// Safe to share across tasks: lookups take a shared lock, membership changes
/// take an exclusive lock.
pub struct HashRing<T> {
    replicas: usize,
    hasher: HashFn,
    state: RwLock<RingState<T>>,
}

struct RingState<T> {
    /// Position -> keys claiming it; the first key owns the position
    positions: BTreeMap<u32, BTreeSet<String>>,
    /// Member key -> member
    members: HashMap<String, T>,
}

impl<T> Default for RingState<T> {
    fn default() -> Self {
        Self {
            positions: BTreeMap::new(),
            members: HashMap::new(),
        }
    }
}

impl<T: RingNode + Clone> HashRing<T> {
    /// Create a ring hashing with CRC32
    pub fn new(replicas: usize) -> Result<Self> {
        Self::with_hasher(replicas, Arc::new(crc32_hash))
    }

    /// Create a ring with a custom hash function
    pub fn with_hasher(replicas: usize, hasher: HashFn) -> Result<Self> {
        if replicas == 0 {
            return Err(RingError::InvalidReplicas { replicas });
        }
        Ok(Self {
            replicas,
            hasher,
            state: RwLock::new(RingState::default()),
        })
    }

    /// Add a member, replacing any member with the same key
    pub fn add(&self, node: T) {
        let key = node.ring_key();
        let positions: Vec<u32> = self.virtual_positions(&key).collect();

        let mut state = self.state.write();
        let replaced = state.members.contains_key(&key);
        if replaced {
            Self::release(&mut state, &key, &positions);
        }

        for position in positions {
            state.positions.entry(position).or_default().insert(key.clone());
        }
        state.members.insert(key.clone(), node);

        debug!(
            member = %key,
            replaced = replaced,
            members = state.members.len(),
            positions = state.positions.len(),
            "Added member to hash ring"
        );
    }

    /// Remove a member and all of its virtual nodes
    ///
    /// Returns the removed member, if it was present.
    pub fn remove(&self, node: &T) -> Option<T> {
        self.remove_key(&node.ring_key())
    }

    /// Remove a member by key
    pub fn remove_key(&self, key: &str) -> Option<T> {
        let positions: Vec<u32> = self.virtual_positions(key).collect();

        let mut state = self.state.write();
        if !state.members.contains_key(key) {
            return None;
        }
        Self::release(&mut state, key, &positions);
        let removed = state.members.remove(key);

        debug!(
            member = %key,
            members = state.members.len(),
            positions = state.positions.len(),
            "Removed member from hash ring"
        );
        removed
    }

    /// Member owning `key`: the first position at or after `hash(key)`,
    /// wrapping to the lowest position past the end of the ring
    ///
    /// `None` only when the ring is empty.
    pub fn get(&self, key: &str) -> Option<T> {
        let hash = (self.hasher)(key.as_bytes());

        let state = self.state.read();
        let (_, claimants) = state
            .positions
            .range(hash..)
            .next()
            .or_else(|| state.positions.iter().next())?;
        let owner = claimants.iter().next()?;
        state.members.get(owner).cloned()
    }

    /// Snapshot of the distinct members, ordered by key
    pub fn nodes(&self) -> Vec<T> {
        let state = self.state.read();
        let mut keyed: Vec<(&String, &T)> = state.members.iter().collect();
        keyed.sort_by(|a, b| a.0.cmp(b.0));
        keyed.into_iter().map(|(_, node)| node.clone()).collect()
    }

    /// Number of distinct members (not virtual nodes)
    pub fn node_count(&self) -> usize {
        self.state.read().members.len()
    }

    /// Number of occupied positions on the ring
    pub fn virtual_node_count(&self) -> usize {
        self.state.read().positions.len()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.state.read().members.contains_key(key)
    }

    pub fn is_empty(&self) -> bool {
        self.state.read().members.is_empty()
    }

    pub fn replicas(&self) -> usize {
        self.replicas
    }

    fn virtual_positions<'a>(&'a self, key: &'a str) -> impl Iterator<Item = u32> + 'a {
        (0..self.replicas).map(move |i| (self.hasher)(format!("{}:{}", key, i).as_bytes()))
    }

    fn release(state: &mut RingState<T>, key: &str, positions: &[u32]) {
        for position in positions {
            if let Some(claimants) = state.positions.get_mut(position) {
                claimants.remove(key);
                if claimants.is_empty() {
                    state.positions.remove(position);
                }
            }
        }
    }
}

impl<T> fmt::Debug for HashRing<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.read();
        f.debug_struct("HashRing")
            .field("replicas", &self.replicas)
            .field("members", &state.members.len())
            .field("positions", &state.positions.len())
            .finish()
    }
}
