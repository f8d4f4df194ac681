//! Graphics and compute pipeline builds.

use std::io::Write;

use kiln_common::{ContentHash, ShaderStage, StageMask};
use kiln_spirv::entry_stage_mask;

use crate::backend::{run_step, IrModule, StageCheck, StageHashes, TranslateRequest};
use crate::cache_key::{compute_pipeline_hash, graphics_pipeline_hash};
use crate::checker::SplitStageChecker;
use crate::compiler::Compiler;
use crate::context::{CompilationContext, PipelineAttachment, ResourceUsage};
use crate::error::{BackendPhase, CompileError};
use crate::module::BinaryType;
use crate::pipeline::{
    ComputePipelineBuildInfo, GraphicsPipelineBuildInfo, PipelineOptions, PipelineShaderInfo,
};
use crate::reservation::{reserve, Reserved};
use crate::user_data::merge_user_data_nodes;

/// A built pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineOutput {
    /// The pipeline ELF.
    pub elf: Vec<u8>,
    /// Identity hash, reported in logs and dumps.
    pub pipeline_hash: ContentHash,
    /// Key the ELF is cached under.
    pub cache_hash: ContentHash,
    /// The ELF came from the shader cache without compiling.
    pub from_cache: bool,
}

struct PipelineRequest<'r> {
    shaders: Vec<&'r PipelineShaderInfo<'r>>,
    graphics: Option<&'r GraphicsPipelineBuildInfo<'r>>,
    options: PipelineOptions,
    stage_mask: StageMask,
    pipeline_hash: ContentHash,
    cache_hash: ContentHash,
}

/// Checks that a SPIR-V module declares the requested entry point for the
/// stage it is bound to. Absent shaders and pre-built payloads pass.
fn validate_shader(shader: &PipelineShaderInfo<'_>) -> Result<(), CompileError> {
    let Some(module) = shader.module else {
        return Ok(());
    };
    if module.bin_type != BinaryType::Spirv {
        return Ok(());
    }
    let stage = shader.entry_stage;
    let entry = shader.entry_name.as_deref().unwrap_or_default();
    let missing = || CompileError::MissingEntryPoint {
        stage,
        entry: entry.to_string(),
    };
    if entry.is_empty() {
        return Err(missing());
    }
    if !entry_stage_mask(&module.code, entry)?.contains(stage) {
        return Err(missing());
    }
    Ok(())
}

fn copy_output(bytes: &[u8]) -> Result<Vec<u8>, CompileError> {
    let mut out = Vec::new();
    out.try_reserve_exact(bytes.len())
        .map_err(|_| CompileError::OutOfMemory { size: bytes.len() })?;
    out.extend_from_slice(bytes);
    Ok(out)
}

impl Compiler {
    /// Builds a graphics pipeline.
    ///
    /// At least one stage must have a module. When `dump` is given, the
    /// option line of the pipeline dump is written to it.
    pub fn build_graphics_pipeline(
        &self,
        info: &GraphicsPipelineBuildInfo<'_>,
        dump: Option<&mut dyn Write>,
    ) -> Result<PipelineOutput, CompileError> {
        let slots = info.shaders();
        for (shader, slot) in slots.iter().zip(ShaderStage::GRAPHICS) {
            if shader.is_present() && shader.entry_stage != slot {
                return Err(CompileError::InvalidValue {
                    reason: format!(
                        "{} shader placed in the {slot} slot",
                        shader.entry_stage
                    ),
                });
            }
        }
        let shaders: Vec<_> = slots.into_iter().filter(|s| s.is_present()).collect();
        if shaders.is_empty() {
            return Err(CompileError::InvalidPointer {
                what: "graphics pipeline shader modules".to_string(),
            });
        }
        for shader in &shaders {
            validate_shader(shader)?;
        }

        let request = PipelineRequest {
            stage_mask: shaders.iter().map(|s| s.entry_stage).collect(),
            shaders,
            graphics: Some(info),
            options: info.options,
            pipeline_hash: graphics_pipeline_hash(info, &self.identity_hash(), false),
            cache_hash: graphics_pipeline_hash(info, &self.option_hash(), true),
        };
        self.report(&request, dump)?;
        self.build_pipeline(&request)
    }

    /// Builds a compute pipeline.
    pub fn build_compute_pipeline(
        &self,
        info: &ComputePipelineBuildInfo<'_>,
        dump: Option<&mut dyn Write>,
    ) -> Result<PipelineOutput, CompileError> {
        if !info.cs.is_present() {
            return Err(CompileError::InvalidPointer {
                what: "compute shader module".to_string(),
            });
        }
        if info.cs.entry_stage != ShaderStage::Compute {
            return Err(CompileError::InvalidValue {
                reason: format!("compute pipeline bound a {} shader", info.cs.entry_stage),
            });
        }
        validate_shader(&info.cs)?;

        let request = PipelineRequest {
            shaders: vec![&info.cs],
            graphics: None,
            options: info.options,
            stage_mask: ShaderStage::Compute.mask(),
            pipeline_hash: compute_pipeline_hash(info, &self.identity_hash(), false),
            cache_hash: compute_pipeline_hash(info, &self.option_hash(), true),
        };
        self.report(&request, dump)?;
        self.build_pipeline(&request)
    }

    fn report(
        &self,
        request: &PipelineRequest<'_>,
        dump: Option<&mut dyn Write>,
    ) -> Result<(), CompileError> {
        if self.options().redirects_output() {
            log::info!("PIPE : 0x{:016X}", request.pipeline_hash.compact64());
            for shader in &request.shaders {
                if let Some(module) = shader.module {
                    log::info!(
                        "{:<4} : 0x{:016X}",
                        shader.entry_stage.abbreviation(),
                        module.hash.compact64()
                    );
                }
            }
        }
        if let Some(dump) = dump {
            writeln!(dump, ";Compiler Options: {}", self.options().args.join(" ")).map_err(
                |e| CompileError::Internal(format!("cannot write pipeline dump: {e}").into()),
            )?;
        }
        Ok(())
    }

    fn build_pipeline(&self, request: &PipelineRequest<'_>) -> Result<PipelineOutput, CompileError> {
        let slot = match reserve(self.shader_cache(), request.cache_hash) {
            Reserved::Ready(blob) => {
                log::debug!("pipeline {}: cache hit", request.cache_hash);
                return Ok(PipelineOutput {
                    elf: copy_output(&blob)?,
                    pipeline_hash: request.pipeline_hash,
                    cache_hash: request.cache_hash,
                    from_cache: true,
                });
            }
            Reserved::Compiling(slot) => slot,
        };

        let mut ctx = self.acquire_context();
        ctx.attach(PipelineAttachment {
            pipeline_hash: request.pipeline_hash,
            cache_hash: request.cache_hash,
            stage_mask: request.stage_mask,
            is_graphics: request.graphics.is_some(),
            options: request.options,
        });
        let elf = self.compile(&mut ctx, request)?;
        drop(ctx);

        slot.commit(&elf);
        log::debug!(
            "pipeline {}: compiled {} bytes",
            request.cache_hash,
            elf.len()
        );
        Ok(PipelineOutput {
            elf,
            pipeline_hash: request.pipeline_hash,
            cache_hash: request.cache_hash,
            from_cache: false,
        })
    }

    fn compile(
        &self,
        ctx: &mut CompilationContext,
        request: &PipelineRequest<'_>,
    ) -> Result<Vec<u8>, CompileError> {
        let nodes = merge_user_data_nodes(
            request
                .shaders
                .iter()
                .map(|s| (s.entry_stage, s.user_data_nodes.as_slice())),
        )?;
        ctx.set_user_data(nodes);

        let linked = self.link_pipeline(ctx, request)?;

        let split = request.graphics.filter(|_| {
            self.options().enable_per_stage_cache
                && request.stage_mask.contains(ShaderStage::Vertex)
                && request.stage_mask.contains(ShaderStage::Fragment)
        });
        let Some(info) = split else {
            return run_step(None, BackendPhase::CodeGen, || {
                self.backend.generate(ctx, &linked, request.stage_mask, None)
            });
        };

        let mut checker = SplitStageChecker::new(self.shader_cache(), info, self.option_hash());
        let mut check = |module: &IrModule, stages: StageMask, hashes: &StageHashes| {
            checker.check(module, stages, hashes)
        };
        let check: &mut StageCheck<'_> = &mut check;
        let compiled = run_step(None, BackendPhase::CodeGen, || {
            self.backend
                .generate(ctx, &linked, request.stage_mask, Some(check))
        })?;
        checker.update_and_merge(compiled)
    }

    /// Produces the linked pipeline module from the request's shaders.
    fn link_pipeline(
        &self,
        ctx: &mut CompilationContext,
        request: &PipelineRequest<'_>,
    ) -> Result<IrModule, CompileError> {
        if let Some(module) = request.shaders[0]
            .module
            .filter(|m| m.bin_type == BinaryType::LlvmBc)
        {
            return run_step(None, BackendPhase::Load, || IrModule::from_bitcode(&module.code));
        }

        let unroll = self.unroll_loops();
        let mut modules = Vec::with_capacity(request.shaders.len());
        for shader in &request.shaders {
            let Some(module) = shader.module else {
                continue;
            };
            let stage = shader.entry_stage;
            let entry = shader.entry_name.as_deref().unwrap_or_default();
            match module.bin_type {
                BinaryType::MultiLlvmBc => {
                    let (ir, usage) = module.find_entry(stage, entry).ok_or_else(|| {
                        CompileError::MissingEntryPoint {
                            stage,
                            entry: entry.to_string(),
                        }
                    })?;
                    modules.push(run_step(Some(stage), BackendPhase::Load, || {
                        IrModule::from_bitcode(ir)
                    })?);
                    *ctx.resource_usage_mut(stage) = ResourceUsage::from_bytes(usage)?;
                }
                BinaryType::Spirv => {
                    let translate = TranslateRequest {
                        stage,
                        entry_name: entry,
                        code: &module.code,
                        spec_constants: &shader.spec_constants,
                        module_hash: module.hash,
                    };
                    let mut ir = run_step(Some(stage), BackendPhase::Translate, || {
                        self.backend.translate(ctx, &translate)
                    })?;
                    run_step(Some(stage), BackendPhase::Lower, || {
                        self.backend.lower(ctx, stage, &mut ir, unroll)
                    })?;
                    modules.push(ir);
                }
                BinaryType::LlvmBc => {
                    return Err(CompileError::invalid_shader(format!(
                        "IR bitcode bound to the {stage} stage must be the pipeline's first shader"
                    )));
                }
            }
        }
        run_step(None, BackendPhase::Link, || self.backend.link(ctx, modules))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::{ShaderModuleData, ShaderModuleInfo};

    fn opaque(bin_type: BinaryType) -> ShaderModuleData {
        ShaderModuleData {
            hash: ContentHash::from_u128(3),
            bin_type,
            info: ShaderModuleInfo::opaque(ContentHash::from_u128(3)),
            code: vec![0; 20],
        }
    }

    #[test]
    fn absent_and_prebuilt_shaders_pass_validation() {
        assert!(validate_shader(&PipelineShaderInfo::empty(ShaderStage::Vertex)).is_ok());
        let module = opaque(BinaryType::MultiLlvmBc);
        let shader = PipelineShaderInfo::new(ShaderStage::Vertex, &module, "anything");
        assert!(validate_shader(&shader).is_ok());
    }

    #[test]
    fn spirv_without_entry_name_is_rejected() {
        let module = opaque(BinaryType::Spirv);
        let mut shader = PipelineShaderInfo::new(ShaderStage::Fragment, &module, "main");
        shader.entry_name = None;
        assert!(matches!(
            validate_shader(&shader),
            Err(CompileError::MissingEntryPoint {
                stage: ShaderStage::Fragment,
                ..
            })
        ));
    }

    #[test]
    fn output_copy_matches() {
        assert_eq!(copy_output(b"elf").unwrap(), b"elf");
    }
}
