//! Shader and pipeline cache storage.
//!
//! This crate provides the reservation protocol the compiler builds on:
//! a lookup either returns a ready blob or atomically hands the caller the
//! exclusive right to produce it. [`ShaderCache`] implements it in memory with
//! optional persistence to a content-addressed artifact directory.

#![warn(missing_docs)]

pub mod artifact;
pub mod error;
pub mod mode;
pub mod shader_cache;
pub mod store;

pub use artifact::{ArtifactStore, BuildIdentity};
pub use error::CacheError;
pub use mode::CacheMode;
pub use shader_cache::{CacheStats, ShaderCache, ShaderCacheConfig};
pub use store::{CacheEntryHandle, EntryState, Lookup, ShaderCacheStore};
