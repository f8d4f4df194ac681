//! Integration tests for split-stage caching of graphics pipelines.
//!
//! The reference backend lays pipelines out so that merging a cached half
//! with a fresh one reproduces a full compile byte for byte; these tests lean
//! on that to compare merged output against an unsplit build.

mod common;

use std::sync::Arc;

use common::{harness, harness_on, shader, vs_fs_pipeline, Harness};
use kiln_common::{ShaderStage, StageMask};
use kiln_compiler::backend::{IrGlobal, IrUser};
use kiln_compiler::{
    BackendError, CodeGenerator, CompilationContext, Compiler, IrModule, ProcessRegistry,
    ReferenceBackend, ShaderModuleData, StageCheck, TranslateRequest, Translator,
};
use kiln_elf::names::{DISASM_SECTION, IR_COMMENT_SECTION, PS_ENTRY_SYMBOL};
use kiln_elf::{ElfImage, HwStage, PipelineMetadata};

/// Builds `vs` + `fs` on a compiler with the per-stage cache turned off.
fn unsplit(vs_code: &[u8], fs_code: &[u8]) -> Vec<u8> {
    let h = harness(&["-enable-per-stage-cache=0"]);
    let (vs, fs) = (h.module(vs_code), h.module(fs_code));
    h.compiler
        .build_graphics_pipeline(&vs_fs_pipeline(&vs, &fs), None)
        .unwrap()
        .elf
}

fn build(h: &Harness, vs: &ShaderModuleData, fs: &ShaderModuleData) -> Vec<u8> {
    let output = h
        .compiler
        .build_graphics_pipeline(&vs_fs_pipeline(vs, fs), None)
        .unwrap();
    assert!(!output.from_cache);
    output.elf
}

fn listing(elf: &[u8], section: &str) -> String {
    let image = ElfImage::parse(elf).unwrap();
    String::from_utf8(image.section(section).unwrap().data.clone()).unwrap()
}

// ===========================================================================
// Reuse of one half
// ===========================================================================

#[test]
fn fragment_half_is_reused_across_pipelines() {
    let h = harness(&[]);
    let (vs_a_code, vs_b_code, fs_code) = (
        shader(ShaderStage::Vertex, 3),
        shader(ShaderStage::Vertex, 9),
        shader(ShaderStage::Fragment, 4),
    );
    let (vs_a, vs_b, fs) = (h.module(&vs_a_code), h.module(&vs_b_code), h.module(&fs_code));

    build(&h, &vs_a, &fs);
    let merged = build(&h, &vs_b, &fs);

    assert_eq!(h.backend.codegen_count(ShaderStage::Fragment), 1);
    assert_eq!(h.backend.codegen_count(ShaderStage::Vertex), 2);
    assert_eq!(merged, unsplit(&vs_b_code, &fs_code));

    let disasm = listing(&merged, DISASM_SECTION);
    assert_eq!(disasm.matches(&format!("{PS_ENTRY_SYMBOL}:")).count(), 1);
    assert_eq!(disasm.matches("_amdgpu_vs_main:").count(), 1);
    let ir = listing(&merged, IR_COMMENT_SECTION);
    assert_eq!(ir.matches(&format!("{PS_ENTRY_SYMBOL}:")).count(), 1);
}

#[test]
fn vertex_half_is_reused_when_fragment_changes() {
    let h = harness(&[]);
    let (vs_code, fs_a_code, fs_b_code) = (
        shader(ShaderStage::Vertex, 5),
        shader(ShaderStage::Fragment, 2),
        shader(ShaderStage::Fragment, 7),
    );
    let (vs, fs_a, fs_b) = (h.module(&vs_code), h.module(&fs_a_code), h.module(&fs_b_code));

    build(&h, &vs, &fs_a);
    let merged = build(&h, &vs, &fs_b);

    assert_eq!(h.backend.codegen_count(ShaderStage::Vertex), 1);
    assert_eq!(h.backend.codegen_count(ShaderStage::Fragment), 2);
    assert_eq!(merged, unsplit(&vs_code, &fs_b_code));

    let image = ElfImage::parse(&merged).unwrap();
    let metadata = PipelineMetadata::from_image(&image).unwrap().unwrap();
    assert_eq!(
        metadata.hardware_stages.keys().copied().collect::<Vec<_>>(),
        vec![HwStage::Vs, HwStage::Ps]
    );
    assert_eq!(image.symbol(PS_ENTRY_SYMBOL).unwrap().value, 0x100);
}

#[test]
fn both_halves_cached_compiles_nothing() {
    let h = harness(&[]);
    let codes = [
        shader(ShaderStage::Vertex, 1),
        shader(ShaderStage::Vertex, 6),
        shader(ShaderStage::Fragment, 3),
        shader(ShaderStage::Fragment, 8),
    ];
    let [vs1, vs2, fs1, fs2] = codes.clone().map(|code| h.module(&code));

    build(&h, &vs1, &fs1);
    build(&h, &vs2, &fs2);
    let merged = build(&h, &vs1, &fs2);

    assert_eq!(h.backend.codegen_count(ShaderStage::Vertex), 2);
    assert_eq!(h.backend.codegen_count(ShaderStage::Fragment), 2);
    assert_eq!(merged, unsplit(&codes[0], &codes[3]));
}

// ===========================================================================
// When splitting does not happen
// ===========================================================================

#[test]
fn per_stage_cache_can_be_disabled() {
    let h = harness(&["-enable-per-stage-cache=0"]);
    let (vs_a, vs_b, fs) = (
        h.module(&shader(ShaderStage::Vertex, 3)),
        h.module(&shader(ShaderStage::Vertex, 4)),
        h.module(&shader(ShaderStage::Fragment, 3)),
    );
    build(&h, &vs_a, &fs);
    build(&h, &vs_b, &fs);
    assert_eq!(h.backend.codegen_count(ShaderStage::Fragment), 2);
}

#[test]
fn fragment_only_pipelines_are_not_split() {
    let h = harness(&[]);
    let fs = h.module(&shader(ShaderStage::Fragment, 3));
    let mut info = vs_fs_pipeline(&fs, &fs);
    info.vs = kiln_compiler::PipelineShaderInfo::empty(ShaderStage::Vertex);

    let output = h.compiler.build_graphics_pipeline(&info, None).unwrap();
    let image = ElfImage::parse(&output.elf).unwrap();
    assert_eq!(image.symbol(PS_ENTRY_SYMBOL).unwrap().value, 0);

    // Only the whole-pipeline entry was reserved; a second build hits it.
    assert!(h.compiler.build_graphics_pipeline(&info, None).unwrap().from_cache);
}

// ---------------------------------------------------------------------------
// Helper: a backend whose linker shares a constant with the vertex stage
// ---------------------------------------------------------------------------

struct SharedConstantBackend(ReferenceBackend);

impl Translator for SharedConstantBackend {
    fn translate(
        &self,
        ctx: &mut CompilationContext,
        request: &TranslateRequest<'_>,
    ) -> Result<IrModule, BackendError> {
        self.0.translate(ctx, request)
    }

    fn lower(
        &self,
        ctx: &mut CompilationContext,
        stage: ShaderStage,
        module: &mut IrModule,
        unroll: bool,
    ) -> Result<(), BackendError> {
        self.0.lower(ctx, stage, module, unroll)
    }

    fn link(
        &self,
        ctx: &mut CompilationContext,
        modules: Vec<IrModule>,
    ) -> Result<IrModule, BackendError> {
        let mut linked = self.0.link(ctx, modules)?;
        linked.constant_exprs.push(Default::default());
        linked.constant_exprs[0].users = vec![IrUser::Instruction(ShaderStage::Vertex)];
        linked.globals.push(IrGlobal {
            name: "lut".to_string(),
            is_constant: true,
            users: vec![IrUser::Constant(0)],
        });
        Ok(linked)
    }
}

impl CodeGenerator for SharedConstantBackend {
    fn generate(
        &self,
        ctx: &mut CompilationContext,
        module: &IrModule,
        stage_mask: StageMask,
        check: Option<&mut StageCheck<'_>>,
    ) -> Result<Vec<u8>, BackendError> {
        self.0.generate(ctx, module, stage_mask, check)
    }
}

#[test]
fn constants_shared_with_vertex_disable_splitting() {
    let backend = Arc::new(SharedConstantBackend(ReferenceBackend::new()));
    let registry = ProcessRegistry::with_resident_floor(0);
    let compiler = Compiler::with_registry(&registry, common::GFX, &["kiln-tests"], backend.clone())
        .unwrap();
    let module = |code: Vec<u8>| {
        compiler
            .build_shader_module(&code, &Default::default())
            .unwrap()
    };
    let (vs_a, vs_b, fs) = (
        module(shader(ShaderStage::Vertex, 2)),
        module(shader(ShaderStage::Vertex, 3)),
        module(shader(ShaderStage::Fragment, 2)),
    );

    for vs in [&vs_a, &vs_b] {
        compiler
            .build_graphics_pipeline(&vs_fs_pipeline(vs, &fs), None)
            .unwrap();
    }
    assert_eq!(backend.0.codegen_count(ShaderStage::Fragment), 2);
}

// ===========================================================================
// Instances sharing a registry
// ===========================================================================

#[test]
fn halves_are_private_to_each_compiler_cache() {
    let registry = ProcessRegistry::with_resident_floor(0);
    let a = harness_on(&registry, &[]);
    let b = harness_on(&registry, &[]);
    let (vs_code, fs_code) = (shader(ShaderStage::Vertex, 2), shader(ShaderStage::Fragment, 2));

    let (vs, fs) = (a.module(&vs_code), a.module(&fs_code));
    build(&a, &vs, &fs);
    let (vs, fs) = (b.module(&vs_code), b.module(&fs_code));
    build(&b, &vs, &fs);

    assert_eq!(a.backend.codegen_count(ShaderStage::Fragment), 1);
    assert_eq!(b.backend.codegen_count(ShaderStage::Fragment), 1);
    assert_eq!(registry.instance_count(), 2);
}
