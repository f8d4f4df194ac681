//! Built shader modules.

use kiln_common::{ContentHash, ShaderStage};
use serde::{Deserialize, Serialize};

use crate::error::CompileError;

/// What a module's payload holds.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub enum BinaryType {
    /// SPIR-V, possibly with debug instructions trimmed.
    Spirv,
    /// One IR bitcode module for the whole pipeline.
    LlvmBc,
    /// Per-entry-point lowered IR, each followed by its resource usage record.
    MultiLlvmBc,
}

/// One pre-lowered entry point inside a [`BinaryType::MultiLlvmBc`] payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShaderModuleEntry {
    /// Stage the entry point runs as.
    pub stage: ShaderStage,
    /// Hash of the entry-point name.
    pub entry_name_hash: ContentHash,
    /// Byte offset of the IR inside the payload.
    pub offset: usize,
    /// Byte size of the IR.
    pub size: usize,
    /// Byte size of the resource usage record that follows the IR.
    pub res_usage_size: usize,
}

/// Facts about a module gathered while building it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShaderModuleInfo {
    /// Hash of the payload as cached (after debug trimming).
    pub cache_hash: ContentHash,
    /// Bytes of debug instructions in the input.
    pub debug_info_size: usize,
    /// The module declares specialization constants.
    pub use_spec_constant: bool,
    /// The module reads the subgroup size.
    pub use_subgroup_size: bool,
    /// The module needs helper invocations.
    pub use_help_invocation: bool,
    /// Variable pointers are enabled.
    pub enable_var_ptr: bool,
    /// Variable pointers into storage buffers are enabled.
    pub enable_var_ptr_storage_buf: bool,
    /// Pre-lowered entry points, for [`BinaryType::MultiLlvmBc`].
    pub entries: Vec<ShaderModuleEntry>,
}

impl ShaderModuleInfo {
    /// Info for a payload with no SPIR-V facts.
    pub fn opaque(cache_hash: ContentHash) -> Self {
        Self {
            cache_hash,
            debug_info_size: 0,
            use_spec_constant: false,
            use_subgroup_size: false,
            use_help_invocation: false,
            enable_var_ptr: false,
            enable_var_ptr_storage_buf: false,
            entries: Vec::new(),
        }
    }
}

/// The result of building a shader module.
///
/// Immutable once built and owned by the caller; pipeline requests borrow it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShaderModuleData {
    /// Hash of the input bytes as submitted.
    pub hash: ContentHash,
    /// Payload kind.
    pub bin_type: BinaryType,
    /// Build facts.
    pub info: ShaderModuleInfo,
    /// Payload.
    pub code: Vec<u8>,
}

impl ShaderModuleData {
    /// Serializes the module for the shader cache.
    pub fn to_bytes(&self) -> Result<Vec<u8>, CompileError> {
        bincode::serde::encode_to_vec(self, bincode::config::standard()).map_err(|e| {
            CompileError::Internal(format!("cannot serialize shader module: {e}").into())
        })
    }

    /// Deserializes a module stored by [`ShaderModuleData::to_bytes`].
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CompileError> {
        bincode::serde::decode_from_slice(bytes, bincode::config::standard())
            .map(|(module, _)| module)
            .map_err(|e| CompileError::invalid_shader(format!("corrupt cached shader module: {e}")))
    }

    /// Finds the pre-lowered entry for `stage` named `entry_name`.
    ///
    /// Returns the IR bytes and the resource usage bytes.
    pub fn find_entry(&self, stage: ShaderStage, entry_name: &str) -> Option<(&[u8], &[u8])> {
        let name_hash = ContentHash::from_bytes(entry_name.as_bytes());
        let entry = self
            .info
            .entries
            .iter()
            .find(|e| e.stage == stage && e.entry_name_hash == name_hash)?;
        let ir_end = entry.offset.checked_add(entry.size)?;
        let usage_end = ir_end.checked_add(entry.res_usage_size)?;
        let ir = self.code.get(entry.offset..ir_end)?;
        let usage = self.code.get(ir_end..usage_end)?;
        Some((ir, usage))
    }
}
