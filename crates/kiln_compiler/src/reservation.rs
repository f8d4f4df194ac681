//! Scoped cache reservations.

use std::sync::Arc;

use kiln_cache::{CacheEntryHandle, Lookup, ShaderCacheStore};
use kiln_common::ContentHash;

/// A cache slot this caller must populate.
///
/// Completed by [`Reservation::commit`]; dropping it uncommitted resets the
/// slot so waiters can retry, which covers every failure path.
pub struct Reservation<'s> {
    store: &'s dyn ShaderCacheStore,
    handle: Option<CacheEntryHandle>,
}

/// Outcome of [`reserve`].
pub enum Reserved<'s> {
    /// A stored blob.
    Ready(Arc<[u8]>),
    /// The caller now owns the slot.
    Compiling(Reservation<'s>),
}

/// Looks up `hash` in `store`, reserving the slot on a miss.
pub fn reserve(store: &dyn ShaderCacheStore, hash: ContentHash) -> Reserved<'_> {
    match store.find_or_reserve(hash) {
        Lookup::Ready(blob) => Reserved::Ready(blob),
        Lookup::Compiling(handle) => Reserved::Compiling(Reservation {
            store,
            handle: Some(handle),
        }),
    }
}

impl Reservation<'_> {
    /// The key this reservation was issued for.
    pub fn hash(&self) -> Option<ContentHash> {
        self.handle.as_ref().map(CacheEntryHandle::hash)
    }

    /// Publishes `blob`.
    pub fn commit(mut self, blob: &[u8]) {
        if let Some(handle) = self.handle.take() {
            self.store.insert(handle, blob);
        }
    }

    /// Abandons the slot.
    pub fn abandon(mut self) {
        if let Some(handle) = self.handle.take() {
            self.store.reset(handle);
        }
    }
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            log::debug!("abandoning cache reservation {}", handle.hash());
            self.store.reset(handle);
        }
    }
}
