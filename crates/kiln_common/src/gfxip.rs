//! GPU target version (graphics IP level).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The graphics IP version a compilation targets.
///
/// Compilation contexts are bound to exactly one version; a pooled context is
/// only reused for a request whose major, minor, and stepping all match.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GfxIpVersion {
    /// Major version.
    pub major: u32,
    /// Minor version.
    pub minor: u32,
    /// Stepping.
    pub stepping: u32,
}

impl GfxIpVersion {
    /// Creates a version from its three components.
    pub const fn new(major: u32, minor: u32, stepping: u32) -> Self {
        Self {
            major,
            minor,
            stepping,
        }
    }
}

impl fmt::Debug for GfxIpVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GfxIpVersion({self})")
    }
}

impl fmt::Display for GfxIpVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.stepping)
    }
}

/// Error type for parsing version strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseGfxIpError {
    /// The input string that failed to parse.
    pub input: String,
}

impl fmt::Display for ParseGfxIpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid graphics IP version: '{}'", self.input)
    }
}

impl std::error::Error for ParseGfxIpError {}

impl FromStr for GfxIpVersion {
    type Err = ParseGfxIpError;

    /// Parses `"major.minor"` or `"major.minor.stepping"`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseGfxIpError {
            input: s.to_string(),
        };
        let parts: Vec<&str> = s.trim().split('.').collect();
        if parts.len() < 2 || parts.len() > 3 {
            return Err(err());
        }
        let mut nums = [0u32; 3];
        for (slot, part) in nums.iter_mut().zip(&parts) {
            *slot = part.parse().map_err(|_| err())?;
        }
        Ok(Self::new(nums[0], nums[1], nums[2]))
    }
}
