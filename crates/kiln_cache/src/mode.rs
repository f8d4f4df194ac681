//! Shader cache operating modes.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::CacheError;

/// How the shader cache stores entries.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CacheMode {
    /// No caching; every lookup reserves a detached entry.
    Disable,
    /// In-memory cache for the lifetime of the process.
    #[default]
    Runtime,
    /// In-memory cache backed by the configured cache directory.
    OnDisk,
    /// On-disk cache in the compiler's own directory, ignoring client caches.
    ForceInternalOnDisk,
    /// Load entries from disk but never write new ones.
    OnDiskReadOnly,
}

impl CacheMode {
    /// Returns `true` if entries are loaded from disk.
    pub fn reads_disk(self) -> bool {
        matches!(
            self,
            CacheMode::OnDisk | CacheMode::ForceInternalOnDisk | CacheMode::OnDiskReadOnly
        )
    }

    /// Returns `true` if new entries are written to disk.
    pub fn writes_disk(self) -> bool {
        matches!(self, CacheMode::OnDisk | CacheMode::ForceInternalOnDisk)
    }
}

impl TryFrom<u32> for CacheMode {
    type Error = CacheError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(CacheMode::Disable),
            1 => Ok(CacheMode::Runtime),
            2 => Ok(CacheMode::OnDisk),
            3 => Ok(CacheMode::ForceInternalOnDisk),
            4 => Ok(CacheMode::OnDiskReadOnly),
            _ => Err(CacheError::UnknownMode { value }),
        }
    }
}

impl fmt::Display for CacheMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CacheMode::Disable => "disable",
            CacheMode::Runtime => "runtime",
            CacheMode::OnDisk => "on-disk",
            CacheMode::ForceInternalOnDisk => "force-internal-on-disk",
            CacheMode::OnDiskReadOnly => "on-disk-read-only",
        };
        f.write_str(name)
    }
}
