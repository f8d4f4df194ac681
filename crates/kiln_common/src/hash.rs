//! Content hashing for cache keys and module identity.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use xxhash_rust::xxh3::Xxh3;

/// A 128-bit content hash computed using XXH3.
///
/// Two inputs with the same `ContentHash` are assumed to be identical. Used for
/// shader module identity, pipeline cache keys, and artifact checksums.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct ContentHash([u8; 16]);

impl ContentHash {
    /// Computes a content hash from a byte slice using XXH3-128.
    pub fn from_bytes(data: &[u8]) -> Self {
        let hash = xxhash_rust::xxh3::xxh3_128(data);
        Self(hash.to_le_bytes())
    }

    /// Wraps a raw 128-bit value.
    pub fn from_u128(value: u128) -> Self {
        Self(value.to_le_bytes())
    }

    /// Returns the raw hash bytes.
    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }

    /// Folds the hash into 64 bits, used for log output and compact keys.
    pub fn compact64(&self) -> u64 {
        let value = u128::from_le_bytes(self.0);
        (value as u64) ^ ((value >> 64) as u64)
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({:02x}{:02x}..)", self.0[0], self.0[1])
    }
}

/// Error type for parsing a hex-encoded hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseHashError {
    /// The input string that failed to parse.
    pub input: String,
}

impl fmt::Display for ParseHashError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid content hash: '{}'", self.input)
    }
}

impl std::error::Error for ParseHashError {}

impl FromStr for ContentHash {
    type Err = ParseHashError;

    /// Parses the 32-digit form produced by `Display`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseHashError {
            input: s.to_string(),
        };
        if s.len() != 32 || !s.is_ascii() {
            return Err(err());
        }
        let mut bytes = [0u8; 16];
        for (i, byte) in bytes.iter_mut().enumerate() {
            *byte = u8::from_str_radix(&s[i * 2..i * 2 + 2], 16).map_err(|_| err())?;
        }
        Ok(Self(bytes))
    }
}

/// Incremental hasher producing a [`ContentHash`].
///
/// Scalars are fed in little-endian order and strings are length-prefixed, so
/// adjacent fields cannot alias each other.
pub struct StreamHasher {
    inner: Xxh3,
}

impl StreamHasher {
    /// Creates a hasher with the default seed.
    pub fn new() -> Self {
        Self { inner: Xxh3::new() }
    }

    /// Feeds raw bytes.
    pub fn update(&mut self, data: &[u8]) -> &mut Self {
        self.inner.update(data);
        self
    }

    /// Feeds a `u32`.
    pub fn update_u32(&mut self, value: u32) -> &mut Self {
        self.update(&value.to_le_bytes())
    }

    /// Feeds a `u64`.
    pub fn update_u64(&mut self, value: u64) -> &mut Self {
        self.update(&value.to_le_bytes())
    }

    /// Feeds a boolean as a single byte.
    pub fn update_bool(&mut self, value: bool) -> &mut Self {
        self.update(&[value as u8])
    }

    /// Feeds a length-prefixed string.
    pub fn update_str(&mut self, value: &str) -> &mut Self {
        self.update_u64(value.len() as u64);
        self.update(value.as_bytes())
    }

    /// Feeds another hash.
    pub fn update_hash(&mut self, hash: &ContentHash) -> &mut Self {
        self.update(hash.as_bytes())
    }

    /// Returns the 64-bit digest of everything fed so far.
    pub fn finish64(&self) -> u64 {
        self.inner.digest()
    }

    /// Returns the 128-bit digest of everything fed so far.
    pub fn finish(&self) -> ContentHash {
        ContentHash::from_u128(self.inner.digest128())
    }
}

impl Default for StreamHasher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic() {
        let a = ContentHash::from_bytes(b"hello world");
        let b = ContentHash::from_bytes(b"hello world");
        assert_eq!(a, b);
    }

    #[test]
    fn different_inputs_differ() {
        let a = ContentHash::from_bytes(b"hello");
        let b = ContentHash::from_bytes(b"world");
        assert_ne!(a, b);
    }

    #[test]
    fn parse_display_form() {
        let h = ContentHash::from_bytes(b"parse me");
        assert_eq!(h.to_string().parse::<ContentHash>().unwrap(), h);
        assert!("xyz".parse::<ContentHash>().is_err());
        assert!("zz".repeat(16).parse::<ContentHash>().is_err());
    }

    #[test]
    fn display_format() {
        let h = ContentHash::from_bytes(b"test");
        let s = format!("{h}");
        assert_eq!(s.len(), 32, "Display should be 32 hex chars");
        assert!(s.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn debug_abbreviated() {
        let h = ContentHash::from_bytes(b"test");
        let s = format!("{h:?}");
        assert!(s.starts_with("ContentHash("));
        assert!(s.ends_with(")"));
    }

    #[test]
    fn stream_matches_one_shot() {
        let mut hasher = StreamHasher::new();
        hasher.update(b"hello ").update(b"world");
        assert_eq!(hasher.finish(), ContentHash::from_bytes(b"hello world"));
    }

    #[test]
    fn length_prefix_separates_fields() {
        let mut a = StreamHasher::new();
        a.update_str("ab").update_str("c");
        let mut b = StreamHasher::new();
        b.update_str("a").update_str("bc");
        assert_ne!(a.finish(), b.finish());
    }

    #[test]
    fn compact64_folds_both_halves() {
        let h = ContentHash::from_u128(0x0000_0000_0000_0001_0000_0000_0000_0002);
        assert_eq!(h.compact64(), 3);
    }

    #[test]
    fn serde_roundtrip() {
        let h = ContentHash::from_bytes(b"serde test");
        let json = serde_json::to_string(&h).unwrap();
        let back: ContentHash = serde_json::from_str(&json).unwrap();
        assert_eq!(h, back);
    }
}
