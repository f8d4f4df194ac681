//! One-pass collection of module facts used by the shader module build.

use kiln_common::{ShaderStage, StageMask};
use serde::{Deserialize, Serialize};
use spirv::{Capability, ExecutionModel, Op};

use crate::error::SpirvError;
use crate::opcode::*;
use crate::scan::{read_header, Instructions};
use crate::MAX_SUPPORTED_VERSION;

/// An `OpEntryPoint` declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryPoint {
    /// Stage derived from the execution model.
    pub stage: ShaderStage,
    /// Entry-point name.
    pub name: String,
}

/// Facts gathered from a single scan of a SPIR-V module.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpirvModuleInfo {
    /// Entry points with a stage the compiler knows about, in declaration order.
    pub entry_points: Vec<EntryPoint>,
    /// Total bytes occupied by debug-only instructions.
    pub debug_info_size: usize,
    /// The module declares specialization constants.
    pub use_spec_constant: bool,
    /// The module reads the subgroup size (subgroup capabilities or AMD ballot).
    pub use_subgroup_size: bool,
    /// The module uses derivatives or implicit-LOD sampling.
    pub use_help_invocation: bool,
    /// `VariablePointers` capability declared.
    pub enable_var_ptr: bool,
    /// `VariablePointersStorageBuffer` capability declared.
    pub enable_var_ptr_storage_buf: bool,
}

impl SpirvModuleInfo {
    /// Union of the stages of all entry points.
    pub fn stage_mask(&self) -> StageMask {
        self.entry_points.iter().map(|e| e.stage).collect()
    }
}

/// Scans `code` once and returns what it found.
///
/// Fails on a bad header, a zero word count, or an instruction that runs past
/// the end of the binary.
pub fn collect_info(code: &[u8]) -> Result<SpirvModuleInfo, SpirvError> {
    let mut info = SpirvModuleInfo::default();
    for inst in Instructions::new(code)? {
        let inst = inst?;
        match decode(inst.opcode) {
            Some(Op::Capability) => {
                let Some(capability) = inst.operand(0).and_then(Capability::from_u32) else {
                    continue;
                };
                match capability {
                    Capability::VariablePointersStorageBuffer => {
                        info.enable_var_ptr_storage_buf = true
                    }
                    Capability::VariablePointers => info.enable_var_ptr = true,
                    c if is_subgroup_capability(c) => info.use_subgroup_size = true,
                    _ => {}
                }
            }
            Some(Op::Extension) => {
                if inst.literal_string(0)? == EXT_AMD_SHADER_BALLOT {
                    info.use_subgroup_size = true;
                }
            }
            Some(Op::EntryPoint) => {
                let model = inst.operand(0).and_then(ExecutionModel::from_u32);
                let name = inst.literal_string(2)?;
                if let Some(stage) = model.and_then(stage_of) {
                    info.entry_points.push(EntryPoint {
                        stage,
                        name: name.to_string(),
                    });
                }
            }
            _ if is_debug_opcode(inst.opcode) => info.debug_info_size += inst.bytes.len(),
            _ if is_spec_constant(inst.opcode) => info.use_spec_constant = true,
            _ if needs_helper_invocation(inst.opcode) => info.use_help_invocation = true,
            _ => {}
        }
    }
    Ok(info)
}

/// Returns the stages whose entry point is named `entry_name`.
pub fn entry_stage_mask(code: &[u8], entry_name: &str) -> Result<StageMask, SpirvError> {
    let info = collect_info(code)?;
    Ok(info
        .entry_points
        .iter()
        .filter(|e| e.name == entry_name)
        .map(|e| e.stage)
        .collect())
}

/// Validates the header, the version, and the instruction framing.
pub fn verify(code: &[u8]) -> Result<(), SpirvError> {
    let header = read_header(code)?;
    if header.version > MAX_SUPPORTED_VERSION {
        return Err(SpirvError::UnsupportedVersion {
            major: header.major(),
            minor: header.minor(),
        });
    }
    for inst in Instructions::new(code)? {
        inst?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::*;

    #[test]
    fn collects_entry_points_and_debug_size() {
        let info = collect_info(&sample_module()).unwrap();
        assert_eq!(
            info.entry_points,
            vec![
                EntryPoint {
                    stage: ShaderStage::Vertex,
                    name: "vsMain".into()
                },
                EntryPoint {
                    stage: ShaderStage::Fragment,
                    name: "main".into()
                },
            ]
        );
        // OpSource (3 words) + OpName (1 + 1 + 2 words)
        assert_eq!(info.debug_info_size, 12 + 16);
        assert!(!info.use_spec_constant);
        assert_eq!(
            info.stage_mask(),
            ShaderStage::Vertex.mask() | ShaderStage::Fragment.mask()
        );
    }

    #[test]
    fn flags_from_capabilities_and_opcodes() {
        let mut words = header(0x0001_0300);
        words.extend(inst(Op::Capability, &[Capability::VariablePointers as u32]));
        words.extend(inst(Op::Capability, &[Capability::GroupNonUniformBallot as u32]));
        words.extend(inst(Op::SpecConstant, &[1, 2, 7]));
        words.extend(inst(Op::DPdx, &[1, 2, 3]));
        let info = collect_info(&to_bytes(&words)).unwrap();
        assert!(info.enable_var_ptr);
        assert!(!info.enable_var_ptr_storage_buf);
        assert!(info.use_subgroup_size);
        assert!(info.use_spec_constant);
        assert!(info.use_help_invocation);
    }

    #[test]
    fn amd_ballot_extension_sets_subgroup_flag() {
        let mut words = header(0x0001_0000);
        words.extend(inst(Op::Extension, &string_words(EXT_AMD_SHADER_BALLOT)));
        let info = collect_info(&to_bytes(&words)).unwrap();
        assert!(info.use_subgroup_size);
    }

    #[test]
    fn unknown_models_and_capabilities_are_skipped() {
        let mut words = header(0x0001_0000);
        words.extend(inst(Op::Capability, &[0xFFFF_0000]));
        words.extend(entry_point(ExecutionModel::Kernel as u32, 1, "k"));
        words.extend(entry_point(0xFFFF, 2, "bogus"));
        words.extend(entry_point(ExecutionModel::GLCompute as u32, 3, "main"));
        let info = collect_info(&to_bytes(&words)).unwrap();
        assert_eq!(info.stage_mask(), ShaderStage::Compute.mask());
        assert!(!info.use_subgroup_size);
    }

    #[test]
    fn entry_mask_by_name() {
        let module = sample_module();
        assert_eq!(
            entry_stage_mask(&module, "main").unwrap(),
            ShaderStage::Fragment.mask()
        );
        assert!(entry_stage_mask(&module, "missing").unwrap().is_empty());
    }

    #[test]
    fn verify_rejects_newer_version() {
        let module = to_bytes(&header(0x0001_0600));
        assert_eq!(
            verify(&module),
            Err(SpirvError::UnsupportedVersion { major: 1, minor: 6 })
        );
        assert!(verify(&sample_module()).is_ok());
    }

    #[test]
    fn malformed_module_fails_collection() {
        let mut words = header(0x0001_0000);
        words.push(0);
        assert!(collect_info(&to_bytes(&words)).is_err());
    }
}
