// crates/ferryrun/src/registry.rs
//! # Remote Handle Registry
//!
//! The host-side arena mapping opaque handles to materialized objects.
//!
//! Uses DashMap for concurrent access without global locking; each entry
//! carries its own mutex so calls against one object serialize while
//! calls against different objects proceed independently.
//!
//! ## Invariants
//!
//! - Handle ids are monotonic and never reused, even after release.
//! - The registry is the sole owner of registered objects. Everything
//!   else holds the id, never the object.
//! - `release` is idempotent: duplicate cleanup signals from multiple
//!   proxies are no-ops, not errors.

use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use dashmap::DashMap;
use parking_lot::Mutex;

use crate::partition::PartitionFn;

/// Opaque cross-boundary reference to a host-resident object.
///
/// The client never dereferences one of these; it only passes it back.
#[derive(Copy, Clone, Debug, Hash, PartialEq, Eq)]
pub struct HandleId(pub u64);

impl std::fmt::Display for HandleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "handle-{}", self.0)
    }
}

#[derive(Debug)]
pub enum Error {
    UnknownHandle(HandleId),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownHandle(id) => write!(f, "{} was never registered or has been released", id),
        }
    }
}

impl std::error::Error for Error {}

pub type Result<T> = std::result::Result<T, Error>;

/// A registered object, lockable independently of every other entry.
pub type Registered = Arc<Mutex<Box<dyn PartitionFn>>>;

/// The host-side registry of live objects.
pub struct Registry {
    entries: DashMap<HandleId, Registered>,
    next_id: AtomicU64,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Takes ownership of an object and returns its fresh handle.
    ///
    /// The entry is fully inserted before the id is returned, so a
    /// concurrent `resolve` can never observe a half-registered object.
    pub fn register(&self, object: Box<dyn PartitionFn>) -> HandleId {
        let id = HandleId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.entries.insert(id, Arc::new(Mutex::new(object)));
        tracing::debug!(handle = %id, "registered object");
        id
    }

    /// Looks up a live object by handle.
    pub fn resolve(&self, id: HandleId) -> Result<Registered> {
        self.entries
            .get(&id)
            .map(|entry| entry.value().clone())
            .ok_or(Error::UnknownHandle(id))
    }

    /// Drops a handle and the object it owns. Unknown or already-released
    /// handles are ignored.
    pub fn release(&self, id: HandleId) {
        if self.entries.remove(&id).is_some() {
            tracing::debug!(handle = %id, "released object");
        }
    }

    /// Number of live handles.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
