//! Classification of the opcodes and capabilities the scanner cares about.

use kiln_common::ShaderStage;
use spirv::{Capability, ExecutionModel, Op};

/// Name of the AMD ballot extension that implies subgroup-size use.
pub const EXT_AMD_SHADER_BALLOT: &str = "SPV_AMD_shader_ballot";

/// Decodes the low half of an instruction's first word. Opcodes this version
/// of the grammar does not know come back as `None`.
pub fn decode(opcode: u16) -> Option<Op> {
    Op::from_u32(u32::from(opcode))
}

/// Returns `true` for instructions that only carry debug information.
pub fn is_debug_opcode(opcode: u16) -> bool {
    matches!(
        decode(opcode),
        Some(
            Op::String
                | Op::Source
                | Op::SourceContinued
                | Op::SourceExtension
                | Op::Name
                | Op::MemberName
                | Op::Line
                | Op::Nop
                | Op::NoLine
                | Op::ModuleProcessed
        )
    )
}

/// Returns `true` for instructions that need helper invocations.
pub fn needs_helper_invocation(opcode: u16) -> bool {
    matches!(
        decode(opcode),
        Some(
            Op::DPdx
                | Op::DPdy
                | Op::DPdxCoarse
                | Op::DPdyCoarse
                | Op::DPdxFine
                | Op::DPdyFine
                | Op::ImageSampleImplicitLod
                | Op::ImageSampleDrefImplicitLod
                | Op::ImageSampleProjImplicitLod
                | Op::ImageSampleProjDrefImplicitLod
                | Op::ImageSparseSampleImplicitLod
                | Op::ImageSparseSampleProjDrefImplicitLod
                | Op::ImageSparseSampleProjImplicitLod
        )
    )
}

/// Returns `true` for specialization-constant declarations.
pub fn is_spec_constant(opcode: u16) -> bool {
    matches!(
        decode(opcode),
        Some(
            Op::SpecConstantTrue
                | Op::SpecConstantFalse
                | Op::SpecConstant
                | Op::SpecConstantComposite
                | Op::SpecConstantOp
        )
    )
}

/// Returns `true` for capabilities that expose the subgroup size.
pub fn is_subgroup_capability(capability: Capability) -> bool {
    matches!(
        capability,
        Capability::GroupNonUniform
            | Capability::GroupNonUniformVote
            | Capability::GroupNonUniformArithmetic
            | Capability::GroupNonUniformBallot
            | Capability::GroupNonUniformShuffle
            | Capability::GroupNonUniformShuffleRelative
            | Capability::GroupNonUniformClustered
            | Capability::GroupNonUniformQuad
            | Capability::SubgroupBallotKHR
            | Capability::SubgroupVoteKHR
            | Capability::Groups
    )
}

/// Stage compiled for an execution model; `None` for models the pipeline
/// compiler does not build.
pub fn stage_of(model: ExecutionModel) -> Option<ShaderStage> {
    match model {
        ExecutionModel::Vertex => Some(ShaderStage::Vertex),
        ExecutionModel::TessellationControl => Some(ShaderStage::TessControl),
        ExecutionModel::TessellationEvaluation => Some(ShaderStage::TessEval),
        ExecutionModel::Geometry => Some(ShaderStage::Geometry),
        ExecutionModel::Fragment => Some(ShaderStage::Fragment),
        ExecutionModel::GLCompute => Some(ShaderStage::Compute),
        _ => None,
    }
}
