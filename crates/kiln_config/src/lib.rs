//! Compiler configuration.
//!
//! Two sources feed a compiler instance: LLVM-style option strings
//! (`-name=value`, with the client name as the first string) parsed into
//! [`CompilerOptions`], and an optional `kiln.toml` tool profile parsed into
//! [`Profile`].

#![warn(missing_docs)]

pub mod env;
pub mod error;
pub mod loader;
pub mod options;
pub mod types;

pub use env::{parse_resident_count, resident_context_floor, RESIDENT_CONTEXTS_VAR};
pub use error::ConfigError;
pub use loader::{load_profile, load_profile_from_str};
pub use options::CompilerOptions;
pub use types::{CacheSection, CompilerSection, Profile};
