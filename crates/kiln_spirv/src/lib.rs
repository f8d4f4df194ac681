//! SPIR-V binary handling for shader module builds.
//!
//! This crate never interprets SPIR-V semantics. It sniffs binary types,
//! walks the instruction stream once to collect entry points, debug-info size,
//! and capability-derived feature flags, and strips debug instructions.

#![warn(missing_docs)]

pub mod error;
pub mod info;
pub mod opcode;
pub mod scan;
pub mod trim;

pub use error::SpirvError;
pub use info::{collect_info, entry_stage_mask, verify, EntryPoint, SpirvModuleInfo};
pub use scan::{Instruction, Instructions};
pub use trim::trim_debug_info;

/// SPIR-V magic number (first word of every module).
pub const SPIRV_MAGIC: u32 = spirv::MAGIC_NUMBER;

/// Size of the SPIR-V module header in bytes (five words).
pub const SPIRV_HEADER_SIZE: usize = 20;

/// Highest SPIR-V version accepted, encoded as in the header (`0x00MMmm00`).
pub const MAX_SUPPORTED_VERSION: u32 = 0x0001_0500;

/// Magic bytes of a raw LLVM bitcode file (`'B' 'C' 0xC0 0xDE`).
const BITCODE_MAGIC: [u8; 4] = [0x42, 0x43, 0xC0, 0xDE];

/// Magic number of a bitcode wrapper header.
const BITCODE_WRAPPER_MAGIC: u32 = 0x0B17_C0DE;

/// Returns `true` if `code` starts with a SPIR-V header.
pub fn is_spirv_binary(code: &[u8]) -> bool {
    code.len() >= SPIRV_HEADER_SIZE
        && code.len() % 4 == 0
        && u32::from_le_bytes([code[0], code[1], code[2], code[3]]) == SPIRV_MAGIC
}

/// Returns `true` if `code` is LLVM bitcode, raw or wrapped.
pub fn is_llvm_bitcode(code: &[u8]) -> bool {
    if code.len() < 4 {
        return false;
    }
    code[..4] == BITCODE_MAGIC
        || u32::from_le_bytes([code[0], code[1], code[2], code[3]]) == BITCODE_WRAPPER_MAGIC
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sniff_spirv() {
        let module = testutil::sample_module();
        assert!(is_spirv_binary(&module));
        assert!(!is_llvm_bitcode(&module));
    }

    #[test]
    fn sniff_bitcode() {
        assert!(is_llvm_bitcode(&[0x42, 0x43, 0xC0, 0xDE, 0x35, 0x14]));
        assert!(is_llvm_bitcode(&0x0B17_C0DEu32.to_le_bytes()));
        assert!(!is_spirv_binary(&[0x42, 0x43, 0xC0, 0xDE]));
    }

    #[test]
    fn sniff_rejects_short_or_unaligned() {
        assert!(!is_spirv_binary(&SPIRV_MAGIC.to_le_bytes()));
        let mut module = testutil::sample_module();
        module.push(0);
        assert!(!is_spirv_binary(&module));
        assert!(!is_llvm_bitcode(&[0x42]));
    }
}
