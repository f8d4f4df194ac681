//! The backend seam.
//!
//! Translation, lowering, linking, and code generation are collaborators the
//! orchestration layer drives through the [`Translator`] and [`CodeGenerator`]
//! traits. Modules between steps travel as [`IrModule`]s, serialized as
//! bitcode-framed blobs when they are cached.

use std::any::Any;
use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};

use kiln_common::{ContentHash, ShaderStage, StageMask};
use serde::{Deserialize, Serialize};

use crate::context::CompilationContext;
use crate::error::{BackendPhase, CompileError};

/// Magic prefix of serialized IR (`'B' 'C' 0xC0 0xDE`).
pub const IR_MAGIC: [u8; 4] = [0x42, 0x43, 0xC0, 0xDE];

/// Per-stage interface hashes computed by the code generator.
pub type StageHashes = [ContentHash; ShaderStage::COUNT];

/// Callback the code generator invokes once its per-stage hashes are known.
///
/// It receives the linked module, the stages about to be compiled and their
/// hashes, and returns the stages that still need code.
pub type StageCheck<'a> = dyn FnMut(&IrModule, StageMask, &StageHashes) -> StageMask + 'a;

/// Who uses a global or constant expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IrUser {
    /// A constant expression, by index into [`IrModule::constant_exprs`].
    Constant(usize),
    /// An instruction inside a function of the given stage.
    Instruction(ShaderStage),
}

/// A function of an IR module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IrFunction {
    /// Stage the function belongs to.
    pub stage: ShaderStage,
    /// Symbol name.
    pub name: String,
    /// Instruction listing.
    pub body: Vec<String>,
}

/// A module-level global.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IrGlobal {
    /// Symbol name.
    pub name: String,
    /// The global is read-only.
    pub is_constant: bool,
    /// Direct users.
    pub users: Vec<IrUser>,
}

/// A constant expression and its users.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConstantExpr {
    /// Direct users.
    pub users: Vec<IrUser>,
}

/// The intermediate representation passed between backend steps.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IrModule {
    /// Module name.
    pub name: String,
    /// Functions.
    pub functions: Vec<IrFunction>,
    /// Globals.
    pub globals: Vec<IrGlobal>,
    /// Constant expressions.
    pub constant_exprs: Vec<ConstantExpr>,
}

impl IrModule {
    /// An empty module.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Stages that own at least one function.
    pub fn stage_mask(&self) -> StageMask {
        self.functions.iter().map(|f| f.stage).collect()
    }

    /// Serializes the module as bitcode.
    pub fn to_bitcode(&self) -> Result<Vec<u8>, BackendError> {
        let mut bytes = IR_MAGIC.to_vec();
        bincode::serde::encode_into_std_write(self, &mut bytes, bincode::config::standard())
            .map_err(|e| BackendError::new(format!("cannot serialize IR: {e}")))?;
        Ok(bytes)
    }

    /// Loads a module written by [`IrModule::to_bitcode`].
    pub fn from_bitcode(bytes: &[u8]) -> Result<Self, BackendError> {
        let payload = bytes
            .strip_prefix(&IR_MAGIC[..])
            .ok_or_else(|| BackendError::new("not an IR bitcode blob"))?;
        bincode::serde::decode_from_slice(payload, bincode::config::standard())
            .map(|(module, _)| module)
            .map_err(|e| BackendError::new(format!("corrupt IR bitcode: {e}")))
    }
}

/// Failure reported by a backend step.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{reason}")]
pub struct BackendError {
    /// Description of the failure.
    pub reason: String,
}

impl BackendError {
    /// Creates an error with the given description.
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Input to [`Translator::translate`].
#[derive(Debug, Clone, Copy)]
pub struct TranslateRequest<'a> {
    /// Stage to translate.
    pub stage: ShaderStage,
    /// Entry point to translate.
    pub entry_name: &'a str,
    /// SPIR-V words.
    pub code: &'a [u8],
    /// Specialization constant values.
    pub spec_constants: &'a BTreeMap<u32, Vec<u8>>,
    /// Hash of the source module.
    pub module_hash: ContentHash,
}

/// Front half of the backend: SPIR-V to IR, lowering, and linking.
pub trait Translator: Send + Sync {
    /// Translates one entry point, recording its resource usage in `ctx`.
    fn translate(
        &self,
        ctx: &mut CompilationContext,
        request: &TranslateRequest<'_>,
    ) -> Result<IrModule, BackendError>;

    /// Runs the per-shader lowering passes on `module`.
    fn lower(
        &self,
        ctx: &mut CompilationContext,
        stage: ShaderStage,
        module: &mut IrModule,
        unroll: bool,
    ) -> Result<(), BackendError>;

    /// Links per-stage modules into one pipeline module.
    fn link(
        &self,
        ctx: &mut CompilationContext,
        modules: Vec<IrModule>,
    ) -> Result<IrModule, BackendError>;
}

/// Back half of the backend: IR to a pipeline ELF.
pub trait CodeGenerator: Send + Sync {
    /// Generates code for the stages of `module` in `stage_mask`.
    ///
    /// When `check` is given it is invoked once, after per-stage hashes are
    /// computed and before any code is emitted; only the stages it returns
    /// are compiled.
    fn generate(
        &self,
        ctx: &mut CompilationContext,
        module: &IrModule,
        stage_mask: StageMask,
        check: Option<&mut StageCheck<'_>>,
    ) -> Result<Vec<u8>, BackendError>;
}

/// A complete backend.
pub trait Backend: Translator + CodeGenerator {}

impl<T: Translator + CodeGenerator> Backend for T {}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "backend aborted".to_string()
    }
}

/// Runs one backend step, converting failures and aborts into
/// [`CompileError::Backend`].
pub(crate) fn run_step<T>(
    stage: Option<ShaderStage>,
    phase: BackendPhase,
    step: impl FnOnce() -> Result<T, BackendError>,
) -> Result<T, CompileError> {
    let outcome = catch_unwind(AssertUnwindSafe(step)).unwrap_or_else(|payload| {
        Err(BackendError::new(format!(
            "aborted: {}",
            panic_message(payload.as_ref())
        )))
    });
    outcome.map_err(|e| {
        log::error!("{phase} failed: {}", e.reason);
        CompileError::Backend {
            stage,
            phase,
            reason: e.reason,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn module() -> IrModule {
        IrModule {
            name: "pipeline".into(),
            functions: vec![IrFunction {
                stage: ShaderStage::Fragment,
                name: "main".into(),
                body: vec!["  op62 4".into()],
            }],
            globals: vec![IrGlobal {
                name: "lut".into(),
                is_constant: true,
                users: vec![IrUser::Constant(0)],
            }],
            constant_exprs: vec![ConstantExpr {
                users: vec![IrUser::Instruction(ShaderStage::Fragment)],
            }],
        }
    }

    #[test]
    fn bitcode_is_framed() {
        let bytes = module().to_bitcode().unwrap();
        assert!(kiln_spirv::is_llvm_bitcode(&bytes));
        assert_eq!(IrModule::from_bitcode(&bytes).unwrap(), module());
        assert!(IrModule::from_bitcode(&bytes[4..]).is_err());
    }

    #[test]
    fn stage_mask_from_functions() {
        assert_eq!(module().stage_mask(), ShaderStage::Fragment.mask());
        assert!(IrModule::new("empty").stage_mask().is_empty());
    }

    #[test]
    fn step_errors_are_tagged() {
        let err = run_step::<()>(Some(ShaderStage::Vertex), BackendPhase::Lower, || {
            Err(BackendError::new("bad cfg"))
        })
        .unwrap_err();
        assert_eq!(err.to_string(), "lowering failed for vertex shader: bad cfg");
    }

    #[test]
    fn step_aborts_are_caught() {
        let err = run_step::<()>(None, BackendPhase::CodeGen, || panic!("register allocation"))
            .unwrap_err();
        match err {
            CompileError::Backend { phase, reason, .. } => {
                assert_eq!(phase, BackendPhase::CodeGen);
                assert!(reason.contains("register allocation"));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }
}
