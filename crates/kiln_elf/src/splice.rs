//! Byte-level splicing of two section payloads.

/// Builds `prefix1 + first[..first_size] + prefix2 + second[second_offset..]`.
///
/// Each prefix is written as `"<name>:\n"`. A prefix is dropped when the part
/// it precedes already starts with it, so labels are never duplicated. If
/// `first_size` exceeds `first.len()` the gap is zero-filled, which is how code
/// blocks get padded out to an alignment boundary.
pub fn merge_section(
    first: &[u8],
    first_size: usize,
    first_prefix: Option<&str>,
    second: &[u8],
    second_offset: usize,
    second_prefix: Option<&str>,
) -> Vec<u8> {
    let prefix1 = first_prefix
        .map(|p| format!("{p}:\n"))
        .filter(|p| !first.starts_with(p.as_bytes()))
        .unwrap_or_default();

    let second_offset = second_offset.min(second.len());
    let prefix2 = second_prefix
        .map(|p| format!("{p}:\n"))
        .filter(|p| !second[second_offset..].starts_with(p.as_bytes()))
        .unwrap_or_default();

    let tail = &second[second_offset..];
    let mut merged =
        Vec::with_capacity(prefix1.len() + first_size + prefix2.len() + tail.len());
    merged.extend_from_slice(prefix1.as_bytes());
    merged.extend_from_slice(&first[..first_size.min(first.len())]);
    merged.resize(prefix1.len() + first_size, 0);
    merged.extend_from_slice(prefix2.as_bytes());
    merged.extend_from_slice(tail);
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_is_padded_to_offset() {
        let merged = merge_section(&[1, 2, 3], 8, None, &[9, 9, 4, 5], 2, None);
        assert_eq!(merged, vec![1, 2, 3, 0, 0, 0, 0, 0, 4, 5]);
    }

    #[test]
    fn first_size_truncates() {
        let merged = merge_section(&[1, 2, 3, 4], 2, None, &[7], 0, None);
        assert_eq!(merged, vec![1, 2, 7]);
    }

    #[test]
    fn text_prefixes_are_added_once() {
        let first = b"  v_mov_b32 v0, 0\n";
        let second = b"  s_endpgm\n";
        let merged = merge_section(
            first,
            first.len(),
            Some("_amdgpu_vs_main"),
            second,
            0,
            Some("_amdgpu_ps_main"),
        );
        assert_eq!(
            String::from_utf8(merged).unwrap(),
            "_amdgpu_vs_main:\n  v_mov_b32 v0, 0\n_amdgpu_ps_main:\n  s_endpgm\n"
        );
    }

    #[test]
    fn existing_labels_are_not_duplicated() {
        let first = b"_amdgpu_vs_main:\n  s_endpgm\n";
        let second = b"_amdgpu_ps_main:\n  s_endpgm\n";
        let merged = merge_section(
            first,
            first.len(),
            Some("_amdgpu_vs_main"),
            second,
            0,
            Some("_amdgpu_ps_main"),
        );
        assert_eq!(
            String::from_utf8(merged).unwrap(),
            "_amdgpu_vs_main:\n  s_endpgm\n_amdgpu_ps_main:\n  s_endpgm\n"
        );
    }
}
