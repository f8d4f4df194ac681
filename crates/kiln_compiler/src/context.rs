//! Per-compile backend state.

use std::collections::BTreeMap;

use kiln_common::{ContentHash, GfxIpVersion, ShaderStage, StageMask};
use serde::{Deserialize, Serialize};

use crate::error::CompileError;
use crate::pipeline::PipelineOptions;
use crate::user_data::ResourceNode;

/// Scalar registers available to a stage by default.
const DEFAULT_SGPRS_AVAILABLE: u32 = 104;

/// Vector registers available to a stage by default.
const DEFAULT_VGPRS_AVAILABLE: u32 = 256;

/// Resources a lowered stage reads and writes.
///
/// Serialized next to each pre-lowered entry point so a pipeline build can
/// restore it without re-running translation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceUsage {
    /// Descriptor (set, binding) pairs used.
    pub descriptor_pairs: Vec<(u32, u32)>,
    /// Push constant bytes read.
    pub push_const_size: u32,
    /// The stage writes a resource.
    pub resource_write: bool,
    /// The stage reads a resource.
    pub resource_read: bool,
    /// Scalar registers available.
    pub num_sgprs_available: u32,
    /// Vector registers available.
    pub num_vgprs_available: u32,
    /// Built-in usage bits.
    pub built_in_usage: u64,
    /// Input location remapping.
    pub input_locations: BTreeMap<u32, u32>,
    /// Output location remapping.
    pub output_locations: BTreeMap<u32, u32>,
}

impl ResourceUsage {
    /// The initial record for a stage.
    pub fn for_stage(_stage: ShaderStage) -> Self {
        Self {
            num_sgprs_available: DEFAULT_SGPRS_AVAILABLE,
            num_vgprs_available: DEFAULT_VGPRS_AVAILABLE,
            ..Self::default()
        }
    }

    /// Serializes the record.
    pub fn to_bytes(&self) -> Result<Vec<u8>, CompileError> {
        bincode::serde::encode_to_vec(self, bincode::config::standard()).map_err(|e| {
            CompileError::Internal(format!("cannot serialize resource usage: {e}").into())
        })
    }

    /// Deserializes a record written by [`ResourceUsage::to_bytes`].
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CompileError> {
        bincode::serde::decode_from_slice(bytes, bincode::config::standard())
            .map(|(usage, _)| usage)
            .map_err(|e| CompileError::invalid_shader(format!("corrupt resource usage record: {e}")))
    }
}

/// What a context is compiling right now.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineAttachment {
    /// Identity hash of the pipeline (for reporting).
    pub pipeline_hash: ContentHash,
    /// Cache hash of the pipeline.
    pub cache_hash: ContentHash,
    /// Stages present in the request.
    pub stage_mask: StageMask,
    /// The pipeline is a graphics pipeline.
    pub is_graphics: bool,
    /// Pipeline options.
    pub options: PipelineOptions,
}

/// Backend state for one compile.
///
/// Contexts are bound to one GPU target for life and are reused through the
/// [`ContextPool`](crate::pool::ContextPool); everything set for a compile is
/// cleared by [`CompilationContext::reset`].
#[derive(Debug)]
pub struct CompilationContext {
    id: u64,
    gfxip: GfxIpVersion,
    subgroup_size: u32,
    attachment: Option<PipelineAttachment>,
    resource_usage: [ResourceUsage; ShaderStage::COUNT],
    user_data: Vec<ResourceNode>,
    compiles: u64,
}

impl CompilationContext {
    /// Creates a context for `gfxip`.
    pub fn new(id: u64, gfxip: GfxIpVersion) -> Self {
        log::debug!("creating compilation context #{id} for gfx {gfxip}");
        Self {
            id,
            gfxip,
            subgroup_size: 64,
            attachment: None,
            resource_usage: ShaderStage::ALL.map(ResourceUsage::for_stage),
            user_data: Vec::new(),
            compiles: 0,
        }
    }

    /// Identifier unique within the owning pool.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// The GPU target.
    pub fn gfxip(&self) -> GfxIpVersion {
        self.gfxip
    }

    /// Subgroup size shaders observe.
    pub fn subgroup_size(&self) -> u32 {
        self.subgroup_size
    }

    /// Sets the subgroup size for the current compile.
    pub fn set_subgroup_size(&mut self, size: u32) {
        self.subgroup_size = size;
    }

    /// Binds the context to a pipeline compile.
    pub fn attach(&mut self, attachment: PipelineAttachment) {
        self.compiles += 1;
        self.attachment = Some(attachment);
    }

    /// The pipeline being compiled, if any.
    pub fn attachment(&self) -> Option<&PipelineAttachment> {
        self.attachment.as_ref()
    }

    /// Pipeline options of the current compile, or defaults.
    pub fn pipeline_options(&self) -> PipelineOptions {
        self.attachment
            .as_ref()
            .map(|a| a.options)
            .unwrap_or_default()
    }

    /// Returns `true` if the current compile is a graphics pipeline.
    pub fn is_graphics(&self) -> bool {
        self.attachment.as_ref().is_some_and(|a| a.is_graphics)
    }

    /// Resource usage of `stage`.
    pub fn resource_usage(&self, stage: ShaderStage) -> &ResourceUsage {
        &self.resource_usage[stage.index()]
    }

    /// Mutable resource usage of `stage`.
    pub fn resource_usage_mut(&mut self, stage: ShaderStage) -> &mut ResourceUsage {
        &mut self.resource_usage[stage.index()]
    }

    /// The merged user data layout of the current compile.
    pub fn user_data(&self) -> &[ResourceNode] {
        &self.user_data
    }

    /// Installs the merged user data layout.
    pub fn set_user_data(&mut self, nodes: Vec<ResourceNode>) {
        self.user_data = nodes;
    }

    /// Number of compiles this context has been attached to.
    pub fn compile_count(&self) -> u64 {
        self.compiles
    }

    /// Returns `true` if nothing from a previous compile is left.
    pub fn is_clean(&self) -> bool {
        self.attachment.is_none()
            && self.user_data.is_empty()
            && ShaderStage::ALL
                .iter()
                .all(|s| self.resource_usage[s.index()] == ResourceUsage::for_stage(*s))
    }

    /// Clears per-compile state.
    pub fn reset(&mut self) {
        self.attachment = None;
        self.user_data.clear();
        self.subgroup_size = 64;
        self.resource_usage = ShaderStage::ALL.map(ResourceUsage::for_stage);
    }
}
