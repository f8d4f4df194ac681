//! Configuration types deserialized from `kiln.toml`.

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer};
use std::path::PathBuf;

/// The tool profile parsed from `kiln.toml`.
#[derive(Debug, Default, Deserialize)]
pub struct Profile {
    /// Compiler target and option strings.
    #[serde(default)]
    pub compiler: CompilerSection,
    /// Shader cache placement.
    #[serde(default)]
    pub cache: CacheSection,
}

/// `[compiler]` table.
#[derive(Debug, Default, Deserialize)]
pub struct CompilerSection {
    /// GPU target as `major.minor[.stepping]`.
    #[serde(default)]
    pub gfxip: Option<String>,
    /// Option strings without the client name.
    ///
    /// Accepts either a single string or a list of strings.
    #[serde(default, deserialize_with = "deserialize_string_or_vec")]
    pub options: Vec<String>,
}

/// `[cache]` table.
#[derive(Debug, Default, Deserialize)]
pub struct CacheSection {
    /// Directory for on-disk cache modes.
    #[serde(default)]
    pub dir: Option<PathBuf>,
    /// Numeric cache mode (0..=4).
    #[serde(default)]
    pub mode: Option<u32>,
}

/// Deserializes a field that can be either a single string or a list of strings.
fn deserialize_string_or_vec<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    struct StringOrVec;

    impl<'de> Visitor<'de> for StringOrVec {
        type Value = Vec<String>;

        fn expecting(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            formatter.write_str("a string or a list of strings")
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
            Ok(vec![v.to_string()])
        }

        fn visit_seq<A: de::SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
            let mut vec = Vec::new();
            while let Some(val) = seq.next_element::<String>()? {
                vec.push(val);
            }
            Ok(vec)
        }
    }

    deserializer.deserialize_any(StringOrVec)
}
