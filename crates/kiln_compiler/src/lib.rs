//! Pipeline build orchestration for the Kiln pipeline compiler.
//!
//! A [`Compiler`] turns SPIR-V shader modules into pipeline ELF binaries by
//! driving a [`Backend`] through translation, lowering, linking, and code
//! generation. Around that it provides:
//!
//! - a pool of reusable compilation contexts shared by every compiler
//!   instance of a [`ProcessRegistry`],
//! - cache keys that separate options affecting generated code from options
//!   that do not,
//! - whole-pipeline and per-module caching through a reservation-based
//!   shader cache,
//! - split-stage caching of graphics pipelines, where the fragment stage and
//!   the stages before it are cached and reused independently, and
//! - the ELF merge that stitches the two halves back into one binary.
//!
//! [`reference::ReferenceBackend`] is a deterministic backend used by the
//! command-line driver and the tests.

#![warn(missing_docs)]

pub mod backend;
pub mod cache_key;
pub mod checker;
pub mod compiler;
pub mod context;
pub mod error;
pub mod merge;
pub mod module;
pub mod module_build;
pub mod pipeline;
pub mod pipeline_build;
pub mod pool;
pub mod process;
pub mod reference;
pub mod reservation;
pub mod user_data;

pub use backend::{
    Backend, BackendError, CodeGenerator, IrModule, StageCheck, StageHashes, TranslateRequest,
    Translator,
};
pub use checker::SplitStageChecker;
pub use compiler::Compiler;
pub use context::{CompilationContext, ResourceUsage};
pub use error::{result_code, BackendPhase, CompileError};
pub use merge::{merge_elf_binary, merge_elf_images};
pub use module::{BinaryType, ShaderModuleData, ShaderModuleInfo};
pub use module_build::ShaderModuleOptions;
pub use pipeline::{
    ColorTarget, ComputePipelineBuildInfo, FragmentState, GraphicsPipelineBuildInfo,
    InputAssemblyState, PipelineOptions, PipelineShaderInfo, VertexAttribute, VertexBinding,
    VertexInputState,
};
pub use pipeline_build::PipelineOutput;
pub use pool::{ContextPool, PoolStats, PooledContext};
pub use process::{InstanceToken, ProcessRegistry};
pub use reference::ReferenceBackend;
pub use user_data::{ResourceNode, ResourceNodeType};
