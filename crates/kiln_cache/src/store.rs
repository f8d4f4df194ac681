//! The cache store contract used by the compiler.

use std::fmt;
use std::sync::Arc;

use kiln_common::ContentHash;

/// State of a cache entry as seen by one caller.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum EntryState {
    /// Not looked up yet.
    New,
    /// The caller holds the reservation and must insert or reset it.
    Compiling,
    /// A result is available.
    Ready,
}

impl fmt::Display for EntryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EntryState::New => "new",
            EntryState::Compiling => "compiling",
            EntryState::Ready => "ready",
        };
        f.write_str(name)
    }
}

/// Exclusive right to populate one cache slot.
///
/// Handles are not `Clone`: a reservation is completed exactly once, by
/// passing the handle to [`ShaderCacheStore::insert`] or
/// [`ShaderCacheStore::reset`]. A detached handle belongs to no slot and
/// completing it does nothing.
#[derive(Debug, PartialEq, Eq)]
pub struct CacheEntryHandle {
    hash: ContentHash,
    attached: bool,
}

impl CacheEntryHandle {
    /// A handle bound to the slot for `hash`.
    pub fn attached(hash: ContentHash) -> Self {
        Self {
            hash,
            attached: true,
        }
    }

    /// A handle bound to nothing.
    pub fn detached(hash: ContentHash) -> Self {
        Self {
            hash,
            attached: false,
        }
    }

    /// The key this handle was issued for.
    pub fn hash(&self) -> ContentHash {
        self.hash
    }

    /// Returns `true` if completing the handle has no effect.
    pub fn is_detached(&self) -> bool {
        !self.attached
    }
}

/// Result of [`ShaderCacheStore::find_or_reserve`].
#[derive(Debug)]
pub enum Lookup {
    /// A stored blob.
    Ready(Arc<[u8]>),
    /// The caller now holds the reservation.
    Compiling(CacheEntryHandle),
}

impl Lookup {
    /// The entry state this lookup represents.
    pub fn state(&self) -> EntryState {
        match self {
            Lookup::Ready(_) => EntryState::Ready,
            Lookup::Compiling(_) => EntryState::Compiling,
        }
    }
}

/// A content-addressed blob store with reservation semantics.
///
/// `find_or_reserve` either returns a ready blob or atomically transitions
/// the slot to compiling and hands the caller its handle. Implementations are
/// shared between threads.
pub trait ShaderCacheStore: Send + Sync {
    /// Looks up `hash`, reserving the slot if it holds nothing.
    fn find_or_reserve(&self, hash: ContentHash) -> Lookup;

    /// Publishes `blob` for a reservation.
    fn insert(&self, handle: CacheEntryHandle, blob: &[u8]);

    /// Abandons a reservation so the slot can be reserved again.
    fn reset(&self, handle: CacheEntryHandle);
}
