//! Shared helpers for the compiler integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use kiln_common::{GfxIpVersion, ShaderStage};
use kiln_compiler::{
    Compiler, GraphicsPipelineBuildInfo, PipelineOptions, PipelineShaderInfo, ProcessRegistry,
    ReferenceBackend, ShaderModuleData, ShaderModuleOptions,
};
use spirv::{Capability, ExecutionModel, Op};

pub const GFX: GfxIpVersion = GfxIpVersion::new(10, 3, 0);

// ---------------------------------------------------------------------------
// SPIR-V assembly
// ---------------------------------------------------------------------------

fn execution_model(stage: ShaderStage) -> ExecutionModel {
    match stage {
        ShaderStage::Vertex => ExecutionModel::Vertex,
        ShaderStage::TessControl => ExecutionModel::TessellationControl,
        ShaderStage::TessEval => ExecutionModel::TessellationEvaluation,
        ShaderStage::Geometry => ExecutionModel::Geometry,
        ShaderStage::Fragment => ExecutionModel::Fragment,
        ShaderStage::Compute => ExecutionModel::GLCompute,
    }
}

fn string_words(s: &str) -> Vec<u32> {
    let mut bytes = s.as_bytes().to_vec();
    bytes.push(0);
    while bytes.len() % 4 != 0 {
        bytes.push(0);
    }
    bytes
        .chunks(4)
        .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

/// Minimal SPIR-V word assembler.
pub struct SpirvBuilder {
    words: Vec<u32>,
    next_id: u32,
}

impl SpirvBuilder {
    pub fn new() -> Self {
        Self::with_version(0x0001_0300)
    }

    pub fn with_version(version: u32) -> Self {
        let mut builder = Self {
            words: vec![spirv::MAGIC_NUMBER, version, 0, 64, 0],
            next_id: 1,
        };
        builder.inst(Op::Capability, &[Capability::Shader as u32]);
        builder
    }

    fn inst(&mut self, op: Op, operands: &[u32]) -> &mut Self {
        self.words
            .push(((operands.len() as u32 + 1) << 16) | op as u32);
        self.words.extend_from_slice(operands);
        self
    }

    fn id(&mut self) -> u32 {
        self.next_id += 1;
        self.next_id
    }

    pub fn entry_point(mut self, stage: ShaderStage, name: &str) -> Self {
        let id = self.id();
        let mut operands = vec![execution_model(stage) as u32, id];
        operands.extend(string_words(name));
        self.inst(Op::EntryPoint, &operands);
        self
    }

    pub fn debug_name(mut self, name: &str) -> Self {
        let mut operands = vec![1];
        operands.extend(string_words(name));
        self.inst(Op::Name, &operands);
        self
    }

    pub fn spec_constant(mut self, value: u32) -> Self {
        let id = self.id();
        self.inst(Op::SpecConstant, &[1, id, value]);
        self
    }

    /// A function body of `statements` constants.
    pub fn function(mut self, statements: u32) -> Self {
        let (void, int, function, label) = (self.id(), self.id(), self.id(), self.id());
        self.inst(Op::TypeVoid, &[void]);
        self.inst(Op::TypeInt, &[int, 32, 0]);
        self.inst(Op::Function, &[void, function, 0, void]);
        self.inst(Op::Label, &[label]);
        for value in 0..statements {
            let id = self.id();
            self.inst(Op::Constant, &[int, id, value]);
        }
        self.inst(Op::Return, &[]);
        self.inst(Op::FunctionEnd, &[]);
        self
    }

    pub fn build(self) -> Vec<u8> {
        self.words.iter().flat_map(|w| w.to_le_bytes()).collect()
    }
}

/// A single-entry-point module for `stage` with `statements` body lines.
pub fn shader(stage: ShaderStage, statements: u32) -> Vec<u8> {
    SpirvBuilder::new()
        .entry_point(stage, "main")
        .function(statements)
        .build()
}

// ---------------------------------------------------------------------------
// Compiler setup
// ---------------------------------------------------------------------------

pub struct Harness {
    pub registry: Arc<ProcessRegistry>,
    pub backend: Arc<ReferenceBackend>,
    pub compiler: Compiler,
}

/// A compiler on a private registry with the reference backend.
pub fn harness(args: &[&str]) -> Harness {
    harness_on(&ProcessRegistry::with_resident_floor(0), args)
}

/// A compiler on `registry` with a fresh reference backend.
pub fn harness_on(registry: &Arc<ProcessRegistry>, args: &[&str]) -> Harness {
    let backend = Arc::new(ReferenceBackend::new());
    let mut full_args = vec!["kiln-tests"];
    full_args.extend_from_slice(args);
    let compiler = Compiler::with_registry(registry, GFX, &full_args, backend.clone())
        .expect("test options are valid");
    Harness {
        registry: Arc::clone(registry),
        backend,
        compiler,
    }
}

impl Harness {
    pub fn module(&self, code: &[u8]) -> ShaderModuleData {
        self.compiler
            .build_shader_module(code, &ShaderModuleOptions::default())
            .expect("module builds")
    }
}

/// A vertex + fragment pipeline that carries disassembly and IR listings.
pub fn vs_fs_pipeline<'a>(
    vs: &'a ShaderModuleData,
    fs: &'a ShaderModuleData,
) -> GraphicsPipelineBuildInfo<'a> {
    GraphicsPipelineBuildInfo {
        vs: PipelineShaderInfo::new(ShaderStage::Vertex, vs, "main"),
        fs: PipelineShaderInfo::new(ShaderStage::Fragment, fs, "main"),
        options: PipelineOptions {
            include_disassembly: true,
            include_ir: true,
            ..PipelineOptions::default()
        },
        ..GraphicsPipelineBuildInfo::default()
    }
}
