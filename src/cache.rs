//! Identity cache recording which resources have been synchronized.
//!
//! Entries are keyed by the resource `uid`, which never changes for the
//! lifetime of an object. The `resourceVersion` seen at the last
//! synchronization is kept alongside so a redelivered, unchanged object can
//! be told apart from a real mutation.

use std::collections::HashMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};

/// Concurrent membership store of synchronized resource identities.
pub trait IdentityCache: Send + Sync {
    /// Returns whether `uid` is tracked.
    fn contains(&self, uid: &str) -> bool;

    /// Returns the resource version recorded for `uid`.
    fn version(&self, uid: &str) -> Option<String>;

    /// Tracks `uid` at `version`, replacing any previous version.
    fn insert(&self, uid: &str, version: &str);

    /// Stops tracking `uid`. Returns whether it was tracked.
    fn remove(&self, uid: &str) -> bool;

    /// Number of tracked identities.
    fn len(&self) -> usize;

    /// Returns whether no identity is tracked.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns whether the bootstrap listing has completed.
    fn is_synced(&self) -> bool;

    /// Marks the bootstrap listing as complete.
    fn mark_synced(&self);
}

/// In-memory [`IdentityCache`].
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<String, String>>,
    synced: AtomicBool,
}

impl MemoryCache {
    /// Creates an empty, not yet synced cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl IdentityCache for MemoryCache {
    fn contains(&self, uid: &str) -> bool {
        self.entries
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .contains_key(uid)
    }

    fn version(&self, uid: &str) -> Option<String> {
        self.entries
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(uid)
            .cloned()
    }

    fn insert(&self, uid: &str, version: &str) {
        tracing::debug!("add to cache: {uid} at version {version}");
        self.entries
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(uid.to_string(), version.to_string());
    }

    fn remove(&self, uid: &str) -> bool {
        tracing::debug!("remove from cache: {uid}");
        self.entries
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .remove(uid)
            .is_some()
    }

    fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }

    fn is_synced(&self) -> bool {
        self.synced.load(Ordering::Acquire)
    }

    fn mark_synced(&self) {
        self.synced.store(true, Ordering::Release);
    }
}
