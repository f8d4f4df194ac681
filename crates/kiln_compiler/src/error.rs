//! Error types for pipeline and shader module builds.

use std::fmt;

use kiln_common::{InternalError, ResultCode, ShaderStage};
use kiln_config::ConfigError;
use kiln_elf::ElfError;
use kiln_spirv::SpirvError;

/// The collaborator step that failed.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum BackendPhase {
    /// SPIR-V to IR translation.
    Translate,
    /// Per-shader lowering passes.
    Lower,
    /// Loading serialized IR.
    Load,
    /// Linking per-stage modules into one pipeline module.
    Link,
    /// Code generation.
    CodeGen,
}

impl fmt::Display for BackendPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BackendPhase::Translate => "translation",
            BackendPhase::Lower => "lowering",
            BackendPhase::Load => "IR loading",
            BackendPhase::Link => "linking",
            BackendPhase::CodeGen => "code generation",
        };
        f.write_str(name)
    }
}

/// Errors returned by the public compiler operations.
///
/// Every variant maps onto a [`ResultCode`] through [`CompileError::code`].
#[derive(Debug, thiserror::Error)]
pub enum CompileError {
    /// The shader binary is neither SPIR-V nor IR bitcode, or is otherwise unusable.
    #[error("invalid shader: {reason}")]
    InvalidShader {
        /// Description of the problem.
        reason: String,
    },

    /// The named entry point does not exist for the declared stage.
    #[error("missing entry point '{entry}' for {stage} shader")]
    MissingEntryPoint {
        /// The stage the entry point was declared for.
        stage: ShaderStage,
        /// The requested entry-point name (empty if none was given).
        entry: String,
    },

    /// The SPIR-V binary failed verification.
    #[error(transparent)]
    Spirv(#[from] SpirvError),

    /// A collaborator failed or aborted.
    #[error("{phase} failed{}: {reason}", stage.map(|s| format!(" for {s} shader")).unwrap_or_default())]
    Backend {
        /// The stage being processed, if the failure is stage-specific.
        stage: Option<ShaderStage>,
        /// The failing step.
        phase: BackendPhase,
        /// Backend-provided description.
        reason: String,
    },

    /// A compiled or cached pipeline binary could not be read or merged.
    #[error(transparent)]
    Elf(#[from] ElfError),

    /// The compiler options are invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// An argument value is invalid.
    #[error("invalid value: {reason}")]
    InvalidValue {
        /// Description of the problem.
        reason: String,
    },

    /// A compiler instance asked for a different option set while another
    /// instance still redirects output under the current one.
    #[error("incompatible compiler options across compiler instances")]
    OptionConflict,

    /// The output buffer could not be allocated.
    #[error("cannot allocate {size} bytes of output")]
    OutOfMemory {
        /// Requested size in bytes.
        size: usize,
    },

    /// A required input is missing.
    #[error("missing input: {what}")]
    InvalidPointer {
        /// What was missing.
        what: String,
    },

    /// An internal invariant was violated.
    #[error(transparent)]
    Internal(#[from] InternalError),
}

impl CompileError {
    /// Creates an [`CompileError::InvalidShader`].
    pub fn invalid_shader(reason: impl Into<String>) -> Self {
        CompileError::InvalidShader {
            reason: reason.into(),
        }
    }

    /// The result code reported across the public boundary.
    pub fn code(&self) -> ResultCode {
        match self {
            CompileError::InvalidShader { .. }
            | CompileError::MissingEntryPoint { .. }
            | CompileError::Backend { .. }
            | CompileError::Elf(_) => ResultCode::ErrorInvalidShader,
            CompileError::Spirv(SpirvError::UnsupportedVersion { .. }) => ResultCode::Unsupported,
            CompileError::Spirv(_) => ResultCode::ErrorInvalidShader,
            CompileError::Config(_)
            | CompileError::InvalidValue { .. }
            | CompileError::OptionConflict => ResultCode::ErrorInvalidValue,
            CompileError::OutOfMemory { .. } => ResultCode::ErrorOutOfMemory,
            CompileError::InvalidPointer { .. } => ResultCode::ErrorInvalidPointer,
            CompileError::Internal(_) => ResultCode::ErrorUnknown,
        }
    }
}

/// Converts a build outcome into a result code.
pub fn result_code<T>(result: &Result<T, CompileError>) -> ResultCode {
    match result {
        Ok(_) => ResultCode::Success,
        Err(e) => e.code(),
    }
}
