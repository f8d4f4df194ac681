//! In-memory reservation store with optional disk persistence.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use kiln_common::ContentHash;
use parking_lot::{Condvar, Mutex, MutexGuard};

use crate::artifact::{ArtifactStore, BuildIdentity};
use crate::mode::CacheMode;
use crate::store::{CacheEntryHandle, Lookup, ShaderCacheStore};

/// Subdirectory for cached blobs.
const SHADER_SUBDIR: &str = "shaders";

/// File extension for cached blobs.
const SHADER_EXT: &str = "bin";

/// Settings for a [`ShaderCache`].
#[derive(Debug, Clone)]
pub struct ShaderCacheConfig {
    /// Operating mode.
    pub mode: CacheMode,
    /// Directory for on-disk modes.
    pub dir: Option<PathBuf>,
    /// Identity recorded in, and required of, on-disk artifacts.
    pub identity: BuildIdentity,
    /// Client name, used for the internal cache directory.
    pub executable_name: String,
}

impl ShaderCacheConfig {
    /// Directory used for persistence, if the mode persists at all.
    ///
    /// `ForceInternalOnDisk` falls back to a per-executable directory under the
    /// system temporary directory when none is configured.
    pub fn resolve_dir(&self) -> Option<PathBuf> {
        match self.mode {
            CacheMode::Disable | CacheMode::Runtime => None,
            CacheMode::ForceInternalOnDisk => Some(self.dir.clone().unwrap_or_else(|| {
                std::env::temp_dir()
                    .join("kiln-cache")
                    .join(&self.executable_name)
            })),
            CacheMode::OnDisk | CacheMode::OnDiskReadOnly => self.dir.clone(),
        }
    }
}

/// Hit/miss counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Lookups answered `Ready`.
    pub hits: u64,
    /// Lookups that handed out a reservation.
    pub misses: u64,
    /// Blobs inserted.
    pub inserts: u64,
    /// Reservations abandoned.
    pub resets: u64,
}

enum Slot {
    Compiling,
    Ready(Arc<[u8]>),
    /// Known to exist on disk, not loaded yet.
    Persisted,
}

struct Inner {
    slots: HashMap<ContentHash, Slot>,
    stats: CacheStats,
}

/// The process's shader cache.
///
/// Concurrent lookups of a slot that is being compiled block until the holder
/// inserts or resets it, so identical requests never compile twice.
pub struct ShaderCache {
    mode: CacheMode,
    identity: BuildIdentity,
    disk: Option<ArtifactStore>,
    inner: Mutex<Inner>,
    changed: Condvar,
}

impl ShaderCache {
    /// Creates a cache. On-disk modes index the existing artifacts up front.
    pub fn new(config: ShaderCacheConfig) -> Self {
        let mut slots = HashMap::new();
        let disk = config.resolve_dir().map(|dir| ArtifactStore::new(&dir));
        if config.mode.reads_disk() && disk.is_none() {
            log::warn!(
                "shader cache mode {} has no cache directory; using runtime cache only",
                config.mode
            );
        }
        if let Some(store) = &disk {
            match store.keys(SHADER_SUBDIR, SHADER_EXT) {
                Ok(keys) => {
                    log::debug!(
                        "indexed {} cached blobs in {}",
                        keys.len(),
                        store.cache_dir().display()
                    );
                    slots.extend(keys.into_iter().map(|k| (k, Slot::Persisted)));
                }
                Err(e) => log::warn!("cannot index shader cache: {e}"),
            }
        }
        Self {
            mode: config.mode,
            identity: config.identity,
            disk,
            inner: Mutex::new(Inner {
                slots,
                stats: CacheStats::default(),
            }),
            changed: Condvar::new(),
        }
    }

    /// A runtime-only cache.
    pub fn runtime(identity: BuildIdentity) -> Self {
        Self::new(ShaderCacheConfig {
            mode: CacheMode::Runtime,
            dir: None,
            identity,
            executable_name: String::new(),
        })
    }

    /// The operating mode.
    pub fn mode(&self) -> CacheMode {
        self.mode
    }

    /// Current counters.
    pub fn stats(&self) -> CacheStats {
        self.inner.lock().stats
    }

    /// Number of ready or persisted entries.
    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .slots
            .values()
            .filter(|s| !matches!(s, Slot::Compiling))
            .count()
    }

    /// Returns `true` if the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn load(&self, hash: ContentHash) -> Result<Vec<u8>, String> {
        match &self.disk {
            Some(store) => store
                .read_artifact(SHADER_SUBDIR, &hash, SHADER_EXT, self.identity)
                .map_err(|e| e.to_string()),
            None => Err("no cache directory".to_string()),
        }
    }
}

impl ShaderCacheStore for ShaderCache {
    fn find_or_reserve(&self, hash: ContentHash) -> Lookup {
        if self.mode == CacheMode::Disable {
            return Lookup::Compiling(CacheEntryHandle::detached(hash));
        }

        let mut inner = self.inner.lock();
        loop {
            match inner.slots.get(&hash) {
                Some(Slot::Ready(blob)) => {
                    let blob = Arc::clone(blob);
                    inner.stats.hits += 1;
                    log::debug!("cache hit {:#018x}", hash.compact64());
                    return Lookup::Ready(blob);
                }
                Some(Slot::Compiling) => {
                    log::debug!("waiting on in-flight compile {:#018x}", hash.compact64());
                    self.changed.wait(&mut inner);
                }
                Some(Slot::Persisted) => {
                    // Concurrent lookups of this key wait as for a compile;
                    // other keys stay usable while the file is read.
                    inner.slots.insert(hash, Slot::Compiling);
                    let loaded = MutexGuard::unlocked(&mut inner, || self.load(hash));
                    let lookup = match loaded {
                        Ok(blob) => {
                            let blob: Arc<[u8]> = Arc::from(blob);
                            inner.slots.insert(hash, Slot::Ready(Arc::clone(&blob)));
                            inner.stats.hits += 1;
                            log::debug!("cache hit {:#018x} (loaded from disk)", hash.compact64());
                            Lookup::Ready(blob)
                        }
                        Err(e) => {
                            // The caller recompiles; the result is not stored.
                            log::warn!("cannot retrieve cached blob: {e}");
                            inner.slots.remove(&hash);
                            inner.stats.misses += 1;
                            Lookup::Compiling(CacheEntryHandle::detached(hash))
                        }
                    };
                    drop(inner);
                    self.changed.notify_all();
                    return lookup;
                }
                None => {
                    inner.slots.insert(hash, Slot::Compiling);
                    inner.stats.misses += 1;
                    log::debug!("cache miss {:#018x}", hash.compact64());
                    return Lookup::Compiling(CacheEntryHandle::attached(hash));
                }
            }
        }
    }

    fn insert(&self, handle: CacheEntryHandle, blob: &[u8]) {
        if handle.is_detached() {
            return;
        }
        let hash = handle.hash();
        {
            let mut inner = self.inner.lock();
            debug_assert!(matches!(inner.slots.get(&hash), Some(Slot::Compiling)));
            inner.slots.insert(hash, Slot::Ready(Arc::from(blob)));
            inner.stats.inserts += 1;
        }
        self.changed.notify_all();

        if self.mode.writes_disk() {
            if let Some(store) = &self.disk {
                if let Err(e) =
                    store.write_artifact(SHADER_SUBDIR, SHADER_EXT, &hash, blob, self.identity)
                {
                    log::warn!("cannot persist cache entry {:#018x}: {e}", hash.compact64());
                }
            }
        }
    }

    fn reset(&self, handle: CacheEntryHandle) {
        if handle.is_detached() {
            return;
        }
        {
            let mut inner = self.inner.lock();
            if matches!(inner.slots.get(&handle.hash()), Some(Slot::Compiling)) {
                inner.slots.remove(&handle.hash());
            }
            inner.stats.resets += 1;
        }
        self.changed.notify_all();
    }
}
