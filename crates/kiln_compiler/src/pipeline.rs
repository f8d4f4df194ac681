//! Pipeline build requests.

use std::collections::BTreeMap;

use kiln_common::ShaderStage;
use serde::{Deserialize, Serialize};

use crate::module::ShaderModuleData;
use crate::user_data::ResourceNode;

/// Maximum number of color render targets.
pub const MAX_COLOR_TARGETS: usize = 8;

/// Per-pipeline options that change the generated binary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineOptions {
    /// Emit the disassembly listing section.
    pub include_disassembly: bool,
    /// Emit the IR comment section.
    pub include_ir: bool,
    /// Bounds-check buffer accesses.
    pub robust_buffer_access: bool,
    /// Use scalar block layout for uniform and storage blocks.
    pub scalar_block_layout: bool,
}

/// One shader stage of a pipeline request.
///
/// A stage without a module is absent from the pipeline.
#[derive(Debug, Clone)]
pub struct PipelineShaderInfo<'a> {
    /// The stage this shader runs as.
    pub entry_stage: ShaderStage,
    /// The built shader module.
    pub module: Option<&'a ShaderModuleData>,
    /// Entry-point name inside the module.
    pub entry_name: Option<String>,
    /// Specialization constant values by constant ID.
    pub spec_constants: BTreeMap<u32, Vec<u8>>,
    /// Resource mapping nodes visible to this stage.
    pub user_data_nodes: Vec<ResourceNode>,
}

impl<'a> PipelineShaderInfo<'a> {
    /// A stage slot with no shader.
    pub fn empty(entry_stage: ShaderStage) -> Self {
        Self {
            entry_stage,
            module: None,
            entry_name: None,
            spec_constants: BTreeMap::new(),
            user_data_nodes: Vec::new(),
        }
    }

    /// A stage running entry point `entry_name` of `module`.
    pub fn new(entry_stage: ShaderStage, module: &'a ShaderModuleData, entry_name: &str) -> Self {
        Self {
            module: Some(module),
            entry_name: Some(entry_name.to_string()),
            ..Self::empty(entry_stage)
        }
    }

    /// Returns `true` if a module is attached.
    pub fn is_present(&self) -> bool {
        self.module.is_some()
    }
}

/// Vertex buffer binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VertexBinding {
    /// Binding number.
    pub binding: u32,
    /// Stride in bytes.
    pub stride: u32,
    /// Advance per instance instead of per vertex.
    pub per_instance: bool,
}

/// Vertex attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VertexAttribute {
    /// Shader input location.
    pub location: u32,
    /// Source binding.
    pub binding: u32,
    /// Format enumerant.
    pub format: u32,
    /// Byte offset inside the element.
    pub offset: u32,
}

/// Vertex input state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VertexInputState {
    /// Buffer bindings.
    pub bindings: Vec<VertexBinding>,
    /// Attributes.
    pub attributes: Vec<VertexAttribute>,
}

/// Input assembly state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputAssemblyState {
    /// Primitive topology enumerant.
    pub topology: u32,
    /// Control points per patch for tessellation.
    pub patch_control_points: u32,
}

/// One color render target.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColorTarget {
    /// Format enumerant; 0 means unused.
    pub format: u32,
    /// Blending enabled.
    pub blend_enable: bool,
    /// Blending reads the source alpha.
    pub blend_src_alpha_to_color: bool,
    /// Channel write mask.
    pub channel_write_mask: u8,
}

/// State consumed by the fragment stage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FragmentState {
    /// Alpha-to-coverage enabled.
    pub alpha_to_coverage: bool,
    /// Dual-source blending enabled.
    pub dual_source_blend: bool,
    /// Render target table.
    pub targets: [ColorTarget; MAX_COLOR_TARGETS],
}

/// A graphics pipeline request.
#[derive(Debug, Clone)]
pub struct GraphicsPipelineBuildInfo<'a> {
    /// Vertex shader.
    pub vs: PipelineShaderInfo<'a>,
    /// Tessellation control shader.
    pub tcs: PipelineShaderInfo<'a>,
    /// Tessellation evaluation shader.
    pub tes: PipelineShaderInfo<'a>,
    /// Geometry shader.
    pub gs: PipelineShaderInfo<'a>,
    /// Fragment shader.
    pub fs: PipelineShaderInfo<'a>,
    /// Vertex input state.
    pub vertex_input: VertexInputState,
    /// Input assembly state.
    pub input_assembly: InputAssemblyState,
    /// Fragment output state.
    pub fragment: FragmentState,
    /// Device index in a device group.
    pub device_index: u32,
    /// Pipeline options.
    pub options: PipelineOptions,
}

impl Default for GraphicsPipelineBuildInfo<'_> {
    fn default() -> Self {
        Self {
            vs: PipelineShaderInfo::empty(ShaderStage::Vertex),
            tcs: PipelineShaderInfo::empty(ShaderStage::TessControl),
            tes: PipelineShaderInfo::empty(ShaderStage::TessEval),
            gs: PipelineShaderInfo::empty(ShaderStage::Geometry),
            fs: PipelineShaderInfo::empty(ShaderStage::Fragment),
            vertex_input: VertexInputState::default(),
            input_assembly: InputAssemblyState::default(),
            fragment: FragmentState::default(),
            device_index: 0,
            options: PipelineOptions::default(),
        }
    }
}

impl<'a> GraphicsPipelineBuildInfo<'a> {
    /// The shader slots in pipeline order.
    pub fn shaders(&self) -> [&PipelineShaderInfo<'a>; ShaderStage::GFX_COUNT] {
        [&self.vs, &self.tcs, &self.tes, &self.gs, &self.fs]
    }

    /// The shader slot for `stage`; `None` for compute.
    pub fn shader(&self, stage: ShaderStage) -> Option<&PipelineShaderInfo<'a>> {
        self.shaders().get(stage.index()).copied()
    }
}

/// A compute pipeline request.
#[derive(Debug, Clone)]
pub struct ComputePipelineBuildInfo<'a> {
    /// Compute shader.
    pub cs: PipelineShaderInfo<'a>,
    /// Device index in a device group.
    pub device_index: u32,
    /// Pipeline options.
    pub options: PipelineOptions,
}

impl Default for ComputePipelineBuildInfo<'_> {
    fn default() -> Self {
        Self {
            cs: PipelineShaderInfo::empty(ShaderStage::Compute),
            device_index: 0,
            options: PipelineOptions::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shader_slots_follow_stage_order() {
        let info = GraphicsPipelineBuildInfo::default();
        for (stage, slot) in ShaderStage::GRAPHICS.iter().zip(info.shaders()) {
            assert_eq!(slot.entry_stage, *stage);
            assert!(!slot.is_present());
        }
        assert!(info.shader(ShaderStage::Compute).is_none());
        assert_eq!(
            info.shader(ShaderStage::Geometry).unwrap().entry_stage,
            ShaderStage::Geometry
        );
    }

    #[test]
    fn fragment_state_serde() {
        let mut state = FragmentState::default();
        state.targets[1].format = 37;
        state.alpha_to_coverage = true;
        let json = serde_json::to_string(&state).unwrap();
        let back: FragmentState = serde_json::from_str(&json).unwrap();
        assert_eq!(back, state);
    }
}
