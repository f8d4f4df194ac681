//! Debug-instruction stripping.

use crate::error::SpirvError;
use crate::opcode::is_debug_opcode;
use crate::scan::Instructions;
use crate::SPIRV_HEADER_SIZE;

/// Copies `code` without its debug instructions.
///
/// `trimmed_size` is the expected output size (input size minus the debug
/// size reported by [`crate::collect_info`]). The copy must fill it exactly;
/// a mismatch means the two passes disagree and is treated as a bug.
pub fn trim_debug_info(code: &[u8], trimmed_size: usize) -> Result<Vec<u8>, SpirvError> {
    assert!(
        trimmed_size >= SPIRV_HEADER_SIZE,
        "trimmed size {trimmed_size} is smaller than the SPIR-V header"
    );
    let instructions = Instructions::new(code)?;
    let mut out = Vec::with_capacity(trimmed_size);
    out.extend_from_slice(&code[..SPIRV_HEADER_SIZE]);
    for inst in instructions {
        let inst = inst?;
        if is_debug_opcode(inst.opcode) {
            continue;
        }
        assert!(
            out.len() + inst.bytes.len() <= trimmed_size,
            "trimmed module overflows its {trimmed_size}-byte buffer"
        );
        out.extend_from_slice(inst.bytes);
    }
    assert_eq!(out.len(), trimmed_size, "trimmed module size mismatch");
    log::trace!("stripped {} debug bytes", code.len() - trimmed_size);
    Ok(out)
}
