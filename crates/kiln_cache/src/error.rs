//! Error types for cache operations.

use std::path::PathBuf;

/// Failures of the artifact store and of cache configuration.
///
/// Lookups are fail-safe: these errors turn into cache misses and are only
/// surfaced to logs and to callers that manage the artifact store directly.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// Reading, writing or listing a blob failed.
    #[error("cache I/O error at {path}: {source}")]
    Io {
        /// The path that caused the error.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// An artifact file has an invalid or missing header.
    #[error("invalid artifact header in {path}: {reason}")]
    InvalidHeader {
        /// The artifact file path.
        path: PathBuf,
        /// Description of the header problem.
        reason: String,
    },

    /// The stored checksum does not match the computed checksum of the payload.
    #[error("checksum mismatch in {path}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        /// The artifact file path.
        path: PathBuf,
        /// The expected checksum from the header.
        expected: String,
        /// The actual checksum computed from the payload.
        actual: String,
    },

    /// The artifact format version does not match the current version.
    #[error("version mismatch in {path}: expected {expected}, got {actual}")]
    VersionMismatch {
        /// The artifact file path.
        path: PathBuf,
        /// The expected format version.
        expected: u32,
        /// The actual format version found in the file.
        actual: u32,
    },

    /// The artifact was produced for another GPU target or option set.
    #[error("artifact {path} was built for {found}, current build is {expected}")]
    IdentityMismatch {
        /// The artifact file path.
        path: PathBuf,
        /// Identity of the running compiler.
        expected: String,
        /// Identity recorded in the artifact.
        found: String,
    },

    /// A serialization or deserialization error occurred.
    #[error("serialization error: {reason}")]
    Serialization {
        /// Description of the serialization failure.
        reason: String,
    },

    /// A numeric cache mode outside the known range.
    #[error("unknown shader cache mode {value} (expected 0..=4)")]
    UnknownMode {
        /// The rejected value.
        value: u32,
    },
}
