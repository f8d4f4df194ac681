//! Shader module builds.

use std::collections::BTreeMap;

use kiln_common::ContentHash;
use kiln_spirv::{collect_info, is_llvm_bitcode, is_spirv_binary, trim_debug_info, verify};

use crate::backend::{run_step, TranslateRequest};
use crate::cache_key::module_cache_key;
use crate::compiler::Compiler;
use crate::context::ResourceUsage;
use crate::error::{BackendPhase, CompileError};
use crate::module::{BinaryType, ShaderModuleData, ShaderModuleEntry, ShaderModuleInfo};
use crate::reservation::{reserve, Reserved};

/// Per-request module build options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShaderModuleOptions {
    /// Pre-lower every entry point at module build time.
    pub enable_opt: bool,
}

impl Compiler {
    /// Builds a shader module from SPIR-V or IR bitcode.
    ///
    /// SPIR-V is verified and, unless disabled, stripped of debug
    /// instructions. With module optimization enabled and no specialization
    /// constants, every entry point is translated and lowered now and the
    /// result is stored in the shader cache, so later builds of the same
    /// module skip translation entirely.
    pub fn build_shader_module(
        &self,
        code: &[u8],
        module_options: &ShaderModuleOptions,
    ) -> Result<ShaderModuleData, CompileError> {
        if code.is_empty() {
            return Err(CompileError::InvalidPointer {
                what: "shader code".to_string(),
            });
        }
        let hash = ContentHash::from_bytes(code);

        if is_llvm_bitcode(code) {
            log::debug!("module {hash}: IR bitcode, {} bytes", code.len());
            return Ok(ShaderModuleData {
                hash,
                bin_type: BinaryType::LlvmBc,
                info: ShaderModuleInfo::opaque(hash),
                code: code.to_vec(),
            });
        }
        if !is_spirv_binary(code) {
            return Err(CompileError::invalid_shader(
                "binary is neither SPIR-V nor IR bitcode",
            ));
        }

        verify(code)?;
        let spirv = collect_info(code)?;
        let payload = if self.options().trim_debug_info && spirv.debug_info_size > 0 {
            trim_debug_info(code, code.len() - spirv.debug_info_size)?
        } else {
            code.to_vec()
        };
        let info = ShaderModuleInfo {
            cache_hash: ContentHash::from_bytes(&payload),
            debug_info_size: spirv.debug_info_size,
            use_spec_constant: spirv.use_spec_constant,
            use_subgroup_size: spirv.use_subgroup_size,
            use_help_invocation: spirv.use_help_invocation,
            enable_var_ptr: spirv.enable_var_ptr,
            enable_var_ptr_storage_buf: spirv.enable_var_ptr_storage_buf,
            entries: Vec::new(),
        };
        log::debug!(
            "module {hash}: SPIR-V, {} entry points, {} debug bytes",
            spirv.entry_points.len(),
            spirv.debug_info_size
        );

        let lower_now = (self.options().enable_shader_module_opt || module_options.enable_opt)
            && !info.use_spec_constant;
        if !lower_now {
            return Ok(ShaderModuleData {
                hash,
                bin_type: BinaryType::Spirv,
                info,
                code: payload,
            });
        }

        let key = module_cache_key(&info.cache_hash, &self.option_hash());
        let slot = match reserve(self.shader_cache(), key) {
            Reserved::Ready(blob) => {
                log::debug!("module {hash}: cache hit {key}");
                let mut module = ShaderModuleData::from_bytes(&blob)?;
                module.hash = hash;
                return Ok(module);
            }
            Reserved::Compiling(slot) => slot,
        };

        let mut ctx = self.acquire_context();
        let no_spec_constants = BTreeMap::new();
        let unroll = self.unroll_loops();
        let mut lowered = Vec::new();
        let mut entries = Vec::with_capacity(spirv.entry_points.len());
        for entry_point in &spirv.entry_points {
            let stage = entry_point.stage;
            *ctx.resource_usage_mut(stage) = ResourceUsage::for_stage(stage);
            let request = TranslateRequest {
                stage,
                entry_name: &entry_point.name,
                code: &payload,
                spec_constants: &no_spec_constants,
                module_hash: hash,
            };
            let mut ir = run_step(Some(stage), BackendPhase::Translate, || {
                self.backend.translate(&mut ctx, &request)
            })?;
            run_step(Some(stage), BackendPhase::Lower, || {
                self.backend.lower(&mut ctx, stage, &mut ir, unroll)
            })?;
            let bitcode = run_step(Some(stage), BackendPhase::Lower, || ir.to_bitcode())?;
            let usage = ctx.resource_usage(stage).to_bytes()?;

            entries.push(ShaderModuleEntry {
                stage,
                entry_name_hash: ContentHash::from_bytes(entry_point.name.as_bytes()),
                offset: lowered.len(),
                size: bitcode.len(),
                res_usage_size: usage.len(),
            });
            lowered.extend_from_slice(&bitcode);
            lowered.extend_from_slice(&usage);
        }
        drop(ctx);

        let module = ShaderModuleData {
            hash,
            bin_type: BinaryType::MultiLlvmBc,
            info: ShaderModuleInfo { entries, ..info },
            code: lowered,
        };
        slot.commit(&module.to_bytes()?);
        log::debug!(
            "module {hash}: lowered {} entry points into {key}",
            module.info.entries.len()
        );
        Ok(module)
    }
}
