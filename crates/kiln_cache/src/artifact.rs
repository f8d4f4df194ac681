//! Content-addressed binary artifact storage.
//!
//! Cached shader and pipeline blobs are stored as files in a subdirectory of
//! the cache. Each artifact has a header with magic bytes, a format version,
//! the identity of the build that produced it, and a checksum. Payloads are
//! zlib-compressed.

use std::fmt;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use kiln_common::{ContentHash, GfxIpVersion};
use serde::{Deserialize, Serialize};

use crate::error::CacheError;

/// Magic bytes identifying a Kiln cache artifact.
const ARTIFACT_MAGIC: [u8; 4] = *b"KILN";

/// Current artifact format version. Increment on breaking changes to
/// the header or payload format.
const ARTIFACT_FORMAT_VERSION: u32 = 1;

/// What a cached blob depends on besides its key: the GPU target and the
/// effective compiler option set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildIdentity {
    /// GPU target of the compiler that wrote the artifact.
    pub gfxip: GfxIpVersion,
    /// Hash of the cache-relevant compiler options.
    pub option_hash: u64,
}

impl fmt::Display for BuildIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "gfx {} / options {:#018x}", self.gfxip, self.option_hash)
    }
}

/// Header prepended to every cached artifact for validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactHeader {
    /// Magic bytes: must be `b"KILN"`.
    pub magic: [u8; 4],

    /// Artifact format version.
    pub format_version: u32,

    /// Build that produced this artifact.
    pub identity: BuildIdentity,

    /// Content hash of the uncompressed payload.
    pub checksum: ContentHash,
}

/// Content-addressed store for binary artifacts.
///
/// Each artifact is stored at `<cache_dir>/<subdir>/<key>.<ext>`.
pub struct ArtifactStore {
    /// Root cache directory.
    cache_dir: PathBuf,
}

impl ArtifactStore {
    /// Creates a new artifact store rooted at the given cache directory.
    pub fn new(cache_dir: &Path) -> Self {
        Self {
            cache_dir: cache_dir.to_path_buf(),
        }
    }

    /// Root directory of the store.
    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Ensures that the subdirectory for the given artifact type exists.
    pub fn ensure_dirs(&self, subdir: &str) -> Result<(), CacheError> {
        let dir = self.cache_dir.join(subdir);
        std::fs::create_dir_all(&dir).map_err(|e| CacheError::Io {
            path: dir,
            source: e,
        })
    }

    /// Returns the file path for an artifact with the given key.
    pub fn artifact_path(&self, subdir: &str, key: &ContentHash, ext: &str) -> PathBuf {
        self.cache_dir.join(subdir).join(format!("{key}.{ext}"))
    }

    /// Writes an artifact under `key`.
    pub fn write_artifact(
        &self,
        subdir: &str,
        ext: &str,
        key: &ContentHash,
        data: &[u8],
        identity: BuildIdentity,
    ) -> Result<PathBuf, CacheError> {
        self.ensure_dirs(subdir)?;
        let path = self.artifact_path(subdir, key, ext);

        let header = ArtifactHeader {
            magic: ARTIFACT_MAGIC,
            format_version: ARTIFACT_FORMAT_VERSION,
            identity,
            checksum: ContentHash::from_bytes(data),
        };

        let header_bytes = bincode::serde::encode_to_vec(&header, bincode::config::standard())
            .map_err(|e| CacheError::Serialization {
                reason: e.to_string(),
            })?;

        let io_err = |source| CacheError::Io {
            path: path.clone(),
            source,
        };
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).map_err(io_err)?;
        let compressed = encoder.finish().map_err(io_err)?;

        // Write: 4-byte header length (little-endian) + header + compressed payload
        let header_len = header_bytes.len() as u32;
        let mut output = Vec::with_capacity(4 + header_bytes.len() + compressed.len());
        output.extend_from_slice(&header_len.to_le_bytes());
        output.extend_from_slice(&header_bytes);
        output.extend_from_slice(&compressed);

        std::fs::write(&path, &output).map_err(io_err)?;
        Ok(path)
    }

    /// Reads an artifact, validating header, identity, and checksum.
    pub fn read_artifact(
        &self,
        subdir: &str,
        key: &ContentHash,
        ext: &str,
        identity: BuildIdentity,
    ) -> Result<Vec<u8>, CacheError> {
        let path = self.artifact_path(subdir, key, ext);
        let raw = std::fs::read(&path).map_err(|e| CacheError::Io {
            path: path.clone(),
            source: e,
        })?;

        let invalid = |reason: &str| CacheError::InvalidHeader {
            path: path.clone(),
            reason: reason.to_string(),
        };

        if raw.len() < 4 {
            return Err(invalid("file shorter than header length"));
        }
        let header_len = u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]) as usize;
        let payload_start = 4usize
            .checked_add(header_len)
            .filter(|end| *end <= raw.len())
            .ok_or_else(|| invalid("header length exceeds file size"))?;

        let header: ArtifactHeader =
            bincode::serde::decode_from_slice(&raw[4..payload_start], bincode::config::standard())
                .map_err(|e| invalid(&e.to_string()))?
                .0;

        if header.magic != ARTIFACT_MAGIC {
            return Err(invalid("bad magic bytes"));
        }
        if header.format_version != ARTIFACT_FORMAT_VERSION {
            return Err(CacheError::VersionMismatch {
                path,
                expected: ARTIFACT_FORMAT_VERSION,
                actual: header.format_version,
            });
        }
        if header.identity != identity {
            return Err(CacheError::IdentityMismatch {
                path,
                expected: identity.to_string(),
                found: header.identity.to_string(),
            });
        }

        let mut payload = Vec::new();
        ZlibDecoder::new(&raw[payload_start..])
            .read_to_end(&mut payload)
            .map_err(|e| CacheError::Io {
                path: path.clone(),
                source: e,
            })?;

        let actual = ContentHash::from_bytes(&payload);
        if actual != header.checksum {
            return Err(CacheError::ChecksumMismatch {
                path,
                expected: header.checksum.to_string(),
                actual: actual.to_string(),
            });
        }

        Ok(payload)
    }

    /// Lists the keys of all artifacts with extension `ext` in `subdir`.
    ///
    /// Files whose stem is not a hash are ignored.
    pub fn keys(&self, subdir: &str, ext: &str) -> Result<Vec<ContentHash>, CacheError> {
        let dir = self.cache_dir.join(subdir);
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let entries = std::fs::read_dir(&dir).map_err(|e| CacheError::Io {
            path: dir.clone(),
            source: e,
        })?;

        let mut keys = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| CacheError::Io {
                path: dir.clone(),
                source: e,
            })?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(ext) {
                continue;
            }
            if let Some(key) = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| s.parse::<ContentHash>().ok())
            {
                keys.push(key);
            }
        }
        keys.sort();
        Ok(keys)
    }
}
