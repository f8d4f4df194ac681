//! A deterministic backend.
//!
//! Translation turns every non-debug SPIR-V instruction into one IR line;
//! code generation turns every IR line into one 32-bit word. The output is a
//! real pipeline ELF (code blocks, entry symbols, listings, and the metadata
//! note) laid out the way the merge engine expects, so split-stage merges
//! reproduce a full compile byte for byte. Per-stage counters record how much
//! work was done.

use std::sync::atomic::{AtomicUsize, Ordering};

use kiln_common::{ContentHash, GfxIpVersion, ShaderStage, StageMask, StreamHasher};
use kiln_elf::metadata::api_shader_key;
use kiln_elf::names::{
    align_up, CODE_ALIGNMENT, DISASM_SECTION, IR_COMMENT_SECTION, TEXT_SECTION,
};
use kiln_elf::{
    ApiShaderMetadata, ElfImage, ElfSection, ElfSymbol, HwStage, HwStageMetadata,
    PipelineMetadata,
};
use kiln_spirv::opcode::is_debug_opcode;
use kiln_spirv::Instructions;

use crate::backend::{
    BackendError, CodeGenerator, IrFunction, IrModule, IrUser, StageCheck, StageHashes,
    TranslateRequest, Translator,
};
use crate::context::CompilationContext;
use crate::user_data::{user_data_limit, ResourceNode, ResourceNodeType};

/// `s_endpgm`.
const END_PROGRAM: u32 = 0xBF81_0000;

/// Hardware stage an API stage runs on, given every stage of the pipeline.
pub fn hardware_stage(stages: StageMask, stage: ShaderStage) -> HwStage {
    let tessellation =
        stages.contains(ShaderStage::TessControl) || stages.contains(ShaderStage::TessEval);
    let geometry = stages.contains(ShaderStage::Geometry);
    match stage {
        ShaderStage::Vertex if tessellation => HwStage::Ls,
        ShaderStage::Vertex if geometry => HwStage::Es,
        ShaderStage::Vertex => HwStage::Vs,
        ShaderStage::TessControl => HwStage::Hs,
        ShaderStage::TessEval if geometry => HwStage::Es,
        ShaderStage::TessEval => HwStage::Vs,
        ShaderStage::Geometry => HwStage::Gs,
        ShaderStage::Fragment => HwStage::Ps,
        ShaderStage::Compute => HwStage::Cs,
    }
}

fn machine_flags(gfxip: GfxIpVersion) -> u32 {
    (gfxip.major << 8) | (gfxip.minor << 4) | gfxip.stepping
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn collect_descriptors(nodes: &[ResourceNode], stage: ShaderStage, out: &mut Vec<(u32, u32)>) {
    for node in nodes.iter().filter(|n| n.visibility.contains(stage)) {
        match node.node_type {
            ResourceNodeType::DescriptorTableVaPtr => collect_descriptors(&node.inner, stage, out),
            ResourceNodeType::DescriptorResource
            | ResourceNodeType::DescriptorSampler
            | ResourceNodeType::DescriptorCombinedTexture
            | ResourceNodeType::DescriptorBuffer => out.push((node.set, node.binding)),
            _ => {}
        }
    }
}

/// The reference [`Translator`] and [`CodeGenerator`].
#[derive(Debug, Default)]
pub struct ReferenceBackend {
    translations: [AtomicUsize; ShaderStage::COUNT],
    generated: [AtomicUsize; ShaderStage::COUNT],
}

impl ReferenceBackend {
    /// Creates a backend with zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entry points translated for `stage`.
    pub fn translate_count(&self, stage: ShaderStage) -> usize {
        self.translations[stage.index()].load(Ordering::Relaxed)
    }

    /// Number of times code was generated for `stage`.
    pub fn codegen_count(&self, stage: ShaderStage) -> usize {
        self.generated[stage.index()].load(Ordering::Relaxed)
    }
}

impl Translator for ReferenceBackend {
    fn translate(
        &self,
        ctx: &mut CompilationContext,
        request: &TranslateRequest<'_>,
    ) -> Result<IrModule, BackendError> {
        let mut body = vec![format!("  entry {}", request.entry_name)];
        for instruction in Instructions::new(request.code).map_err(|e| BackendError::new(e.to_string()))? {
            let instruction = instruction.map_err(|e| BackendError::new(e.to_string()))?;
            if is_debug_opcode(instruction.opcode) {
                continue;
            }
            body.push(format!(
                "  op{} {}",
                instruction.opcode,
                instruction.word_count()
            ));
        }
        for (id, value) in request.spec_constants {
            body.push(format!("  spec{id} {}", hex(value)));
        }

        let stage = request.stage;
        let mut descriptors = Vec::new();
        collect_descriptors(ctx.user_data(), stage, &mut descriptors);
        let usage = ctx.resource_usage_mut(stage);
        usage.resource_read = !descriptors.is_empty();
        usage.descriptor_pairs = descriptors;

        self.translations[stage.index()].fetch_add(1, Ordering::Relaxed);
        let mut module = IrModule::new(format!("{}_{}", stage.abbreviation(), request.entry_name));
        module.functions.push(IrFunction {
            stage,
            name: request.entry_name.to_string(),
            body,
        });
        Ok(module)
    }

    fn lower(
        &self,
        ctx: &mut CompilationContext,
        stage: ShaderStage,
        module: &mut IrModule,
        unroll: bool,
    ) -> Result<(), BackendError> {
        let wave = ctx.subgroup_size();
        for function in module.functions.iter_mut().filter(|f| f.stage == stage) {
            function.body.push(format!("  lowered wave{wave}"));
            if unroll {
                function.body.push("  unrolled".to_string());
            }
        }
        Ok(())
    }

    fn link(
        &self,
        _ctx: &mut CompilationContext,
        modules: Vec<IrModule>,
    ) -> Result<IrModule, BackendError> {
        let mut linked = IrModule::new("pipeline");
        for mut module in modules {
            let base = linked.constant_exprs.len();
            let rebase = |user: &mut IrUser| {
                if let IrUser::Constant(index) = user {
                    *index += base;
                }
            };
            for global in &mut module.globals {
                global.users.iter_mut().for_each(rebase);
            }
            for expr in &mut module.constant_exprs {
                expr.users.iter_mut().for_each(rebase);
            }
            linked.functions.append(&mut module.functions);
            linked.globals.append(&mut module.globals);
            linked.constant_exprs.append(&mut module.constant_exprs);
        }
        Ok(linked)
    }
}

struct Block<'m> {
    hw: HwStage,
    stage: ShaderStage,
    functions: Vec<&'m IrFunction>,
}

impl CodeGenerator for ReferenceBackend {
    fn generate(
        &self,
        ctx: &mut CompilationContext,
        module: &IrModule,
        stage_mask: StageMask,
        check: Option<&mut StageCheck<'_>>,
    ) -> Result<Vec<u8>, BackendError> {
        let present = module.stage_mask();
        let stages: StageMask = stage_mask.iter().filter(|s| present.contains(*s)).collect();

        let mut hashes: StageHashes = [ContentHash::default(); ShaderStage::COUNT];
        for stage in stages.iter() {
            let mut hasher = StreamHasher::new();
            for function in module.functions.iter().filter(|f| f.stage == stage) {
                hasher.update_str(&function.name);
                for line in &function.body {
                    hasher.update_str(line);
                }
            }
            hashes[stage.index()] = hasher.finish();
        }

        let selected = match check {
            Some(check) => check(module, stages, &hashes),
            None => stages,
        };
        let selected: StageMask = selected.iter().filter(|s| stages.contains(*s)).collect();

        let mut blocks: Vec<Block<'_>> = selected
            .iter()
            .map(|stage| Block {
                hw: hardware_stage(stages, stage),
                stage,
                functions: module.functions.iter().filter(|f| f.stage == stage).collect(),
            })
            .collect();
        blocks.sort_by_key(|block| block.hw);

        let options = ctx.pipeline_options();
        let mut image = ElfImage::new(machine_flags(ctx.gfxip()));
        let mut code = Vec::new();
        let mut disasm = String::new();
        let mut ir_listing = String::new();
        let mut symbols = Vec::new();
        let mut metadata = PipelineMetadata {
            api: "Vulkan".to_string(),
            user_data_limit: user_data_limit(ctx.user_data()),
            spill_threshold: u32::MAX,
            ..PipelineMetadata::default()
        };

        for block in &blocks {
            code.resize(align_up(code.len(), CODE_ALIGNMENT), 0);
            let start = code.len();
            let entry = block.hw.entry_symbol();
            disasm.push_str(&format!("{entry}:\n"));
            ir_listing.push_str(&format!("{entry}:\n"));

            let mut lines = 0u32;
            for function in &block.functions {
                ir_listing.push_str(&format!("  ; {}\n", function.name));
                for line in &function.body {
                    let word = ContentHash::from_bytes(line.as_bytes()).compact64() as u32;
                    code.extend_from_slice(&word.to_le_bytes());
                    disasm.push_str(&format!("  v_op {word:#010x}\n"));
                    ir_listing.push_str(line);
                    ir_listing.push('\n');
                    lines += 1;
                }
            }
            code.extend_from_slice(&END_PROGRAM.to_le_bytes());
            disasm.push_str("  s_endpgm\n");
            symbols.push((entry, start, code.len() - start));

            let usage = ctx.resource_usage(block.stage);
            metadata.hardware_stages.insert(
                block.hw,
                HwStageMetadata {
                    vgpr_count: (lines + 1).min(usage.num_vgprs_available),
                    sgpr_count: (2 + usage.descriptor_pairs.len() as u32)
                        .min(usage.num_sgprs_available),
                    vgpr_limit: usage.num_vgprs_available,
                    sgpr_limit: usage.num_sgprs_available,
                    wavefront_size: ctx.subgroup_size(),
                    ..HwStageMetadata::default()
                },
            );
            metadata.shaders.insert(
                api_shader_key(block.stage).to_string(),
                ApiShaderMetadata {
                    hash: hashes[block.stage.index()],
                    hardware_mapping: vec![block.hw],
                },
            );
            self.generated[block.stage.index()].fetch_add(1, Ordering::Relaxed);
        }

        let text = image.add_section(ElfSection::code(TEXT_SECTION, code));
        if options.include_disassembly {
            image.add_section(ElfSection::text(DISASM_SECTION, &disasm));
        }
        if options.include_ir {
            image.add_section(ElfSection::text(IR_COMMENT_SECTION, &ir_listing));
        }
        for (name, value, size) in symbols {
            image
                .symbols
                .push(ElfSymbol::function(name, text, value as u64, size as u64));
        }
        metadata
            .store(&mut image)
            .map_err(|e| BackendError::new(e.to_string()))?;

        log::debug!(
            "generated {} hardware stages for {:?}",
            blocks.len(),
            selected
        );
        Ok(image.to_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::PipelineAttachment;
    use crate::pipeline::PipelineOptions;
    use kiln_elf::names::PS_ENTRY_SYMBOL;

    fn ctx(options: PipelineOptions) -> CompilationContext {
        let mut ctx = CompilationContext::new(0, GfxIpVersion::new(10, 3, 0));
        ctx.attach(PipelineAttachment {
            pipeline_hash: ContentHash::default(),
            cache_hash: ContentHash::default(),
            stage_mask: ShaderStage::Vertex.mask() | ShaderStage::Fragment.mask(),
            is_graphics: true,
            options,
        });
        ctx
    }

    fn function(stage: ShaderStage, lines: usize) -> IrModule {
        let mut module = IrModule::new(stage.abbreviation());
        module.functions.push(IrFunction {
            stage,
            name: "main".into(),
            body: (0..lines).map(|i| format!("  op{i} 1")).collect(),
        });
        module
    }

    fn linked(backend: &ReferenceBackend, ctx: &mut CompilationContext) -> IrModule {
        backend
            .link(ctx, vec![function(ShaderStage::Vertex, 3), function(ShaderStage::Fragment, 2)])
            .unwrap()
    }

    #[test]
    fn hardware_mapping_follows_pipeline_shape() {
        let vs = ShaderStage::Vertex;
        let tess = vs.mask() | ShaderStage::TessControl.mask() | ShaderStage::TessEval.mask();
        let gs = vs.mask() | ShaderStage::Geometry.mask();
        assert_eq!(hardware_stage(vs.mask(), vs), HwStage::Vs);
        assert_eq!(hardware_stage(tess, vs), HwStage::Ls);
        assert_eq!(hardware_stage(tess, ShaderStage::TessEval), HwStage::Vs);
        assert_eq!(hardware_stage(gs, vs), HwStage::Es);
        assert_eq!(
            hardware_stage(tess | ShaderStage::Geometry.mask(), ShaderStage::TessEval),
            HwStage::Es
        );
    }

    #[test]
    fn blocks_are_aligned_and_labelled() {
        let backend = ReferenceBackend::new();
        let mut ctx = ctx(PipelineOptions {
            include_disassembly: true,
            ..PipelineOptions::default()
        });
        let module = linked(&backend, &mut ctx);
        let elf = backend
            .generate(&mut ctx, &module, module.stage_mask(), None)
            .unwrap();
        let image = ElfImage::parse(&elf).unwrap();

        let vs = image.symbol("_amdgpu_vs_main").unwrap();
        let ps = image.symbol(PS_ENTRY_SYMBOL).unwrap();
        assert_eq!((vs.value, vs.size), (0, 16));
        assert_eq!((ps.value, ps.size), (0x100, 12));
        assert_eq!(image.section(TEXT_SECTION).unwrap().data.len(), 0x10C);

        let disasm = String::from_utf8(image.section(DISASM_SECTION).unwrap().data.clone()).unwrap();
        assert!(disasm.starts_with("_amdgpu_vs_main:\n"));
        assert!(disasm.contains("_amdgpu_ps_main:\n"));
        assert!(image.section(IR_COMMENT_SECTION).is_none());

        let metadata = PipelineMetadata::from_image(&image).unwrap().unwrap();
        assert_eq!(metadata.shaders[".pixel"].hardware_mapping, vec![HwStage::Ps]);
        assert_eq!(image.machine_flags, 0xA30);
        assert_eq!(backend.codegen_count(ShaderStage::Fragment), 1);
    }

    #[test]
    fn check_prunes_stages() {
        let backend = ReferenceBackend::new();
        let mut ctx = ctx(PipelineOptions::default());
        let module = linked(&backend, &mut ctx);
        let mut seen = StageMask::EMPTY;
        let mut keep_fragment = |_: &IrModule, mask: StageMask, hashes: &StageHashes| {
            seen = mask;
            assert_ne!(hashes[ShaderStage::Vertex.index()], hashes[ShaderStage::Fragment.index()]);
            mask.fragment_part()
        };
        let elf = backend
            .generate(&mut ctx, &module, module.stage_mask(), Some(&mut keep_fragment))
            .unwrap();
        assert_eq!(seen, module.stage_mask());

        let image = ElfImage::parse(&elf).unwrap();
        assert_eq!(image.symbol(PS_ENTRY_SYMBOL).unwrap().value, 0);
        assert!(image.symbol("_amdgpu_vs_main").is_none());
        assert_eq!(backend.codegen_count(ShaderStage::Vertex), 0);
    }

    #[test]
    fn empty_selection_still_yields_an_image() {
        let backend = ReferenceBackend::new();
        let mut ctx = ctx(PipelineOptions::default());
        let module = linked(&backend, &mut ctx);
        let mut nothing = |_: &IrModule, _: StageMask, _: &StageHashes| StageMask::EMPTY;
        let elf = backend
            .generate(&mut ctx, &module, module.stage_mask(), Some(&mut nothing))
            .unwrap();
        let image = ElfImage::parse(&elf).unwrap();
        assert!(image.symbols.is_empty());
        assert!(PipelineMetadata::from_image(&image).unwrap().is_some());
    }

    #[test]
    fn link_rebases_constant_users() {
        let backend = ReferenceBackend::new();
        let mut ctx = ctx(PipelineOptions::default());
        let mut a = function(ShaderStage::Vertex, 1);
        a.constant_exprs.push(Default::default());
        let mut b = function(ShaderStage::Fragment, 1);
        b.globals.push(crate::backend::IrGlobal {
            name: "lut".into(),
            is_constant: true,
            users: vec![IrUser::Constant(0)],
        });
        b.constant_exprs.push(Default::default());
        let linked = backend.link(&mut ctx, vec![a, b]).unwrap();
        assert_eq!(linked.globals[0].users, vec![IrUser::Constant(1)]);
        assert_eq!(linked.constant_exprs.len(), 2);
        assert_eq!(linked.functions.len(), 2);
    }
}
