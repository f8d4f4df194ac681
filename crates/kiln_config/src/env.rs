//! Environment-provided settings.

/// Variable holding the number of idle contexts kept alive across instances.
pub const RESIDENT_CONTEXTS_VAR: &str = "KILN_RESIDENT_CONTEXTS";

/// Parses a resident-context count: decimal, or hexadecimal with `0x`.
///
/// Anything unparsable counts as zero.
pub fn parse_resident_count(value: &str) -> usize {
    let value = value.trim();
    let parsed = match value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
    {
        Some(hex) => usize::from_str_radix(hex, 16),
        None => value.parse::<usize>(),
    };
    parsed.unwrap_or(0)
}

/// Reads [`RESIDENT_CONTEXTS_VAR`]; unset means zero.
pub fn resident_context_floor() -> usize {
    std::env::var(RESIDENT_CONTEXTS_VAR)
        .map(|v| parse_resident_count(&v))
        .unwrap_or(0)
}
