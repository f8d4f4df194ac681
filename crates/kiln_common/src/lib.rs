//! Shared foundational types used across the Kiln pipeline compiler.
//!
//! This crate provides content hashing, shader stages and stage masks, GPU
//! target versions, result codes, and a bounds-checked byte cursor used by the
//! binary scanners.

#![warn(missing_docs)]

pub mod cursor;
pub mod gfxip;
pub mod hash;
pub mod result;
pub mod stage;

pub use cursor::{ByteCursor, CursorError};
pub use gfxip::{GfxIpVersion, ParseGfxIpError};
pub use hash::{ContentHash, ParseHashError, StreamHasher};
pub use result::{InternalError, KilnResult, ResultCode};
pub use stage::{ShaderStage, StageMask};
