//! Cache key derivation.
//!
//! Two hashes are derived for every pipeline. The cache hash decides whether a
//! cached binary can be reused and ignores options that cannot change the
//! compiled bytes. The identity hash covers everything and is only used for
//! reporting.

use std::collections::BTreeSet;

use kiln_common::{ContentHash, ShaderStage, StageMask, StreamHasher};

use crate::backend::StageHashes;
use crate::pipeline::{
    ComputePipelineBuildInfo, FragmentState, GraphicsPipelineBuildInfo, PipelineOptions,
    PipelineShaderInfo, VertexInputState,
};

/// Options (matched by prefix, without the leading `-`) that never affect
/// compiled bytes.
pub const IGNORED_OPTIONS: [&str; 10] = [
    "pipeline-dump-dir",
    "enable-pipeline-dump",
    "shader-cache-file-dir",
    "shader-cache-mode",
    "enable-outs",
    "enable-errs",
    "log-file-dbgs",
    "log-file-outs",
    "enable-shadow-desc",
    "shadow-desc-table-ptr-high",
];

/// Hash of the options that affect compiled bytes.
///
/// The client name (first string) is skipped, one leading `-` is stripped,
/// denylisted options are dropped, and the rest are sorted and deduplicated,
/// so reordered or repeated command lines hash the same.
pub fn option_cache_hash<S: AsRef<str>>(args: &[S]) -> ContentHash {
    hash_option_set(args, true)
}

/// Hash of every option, for reporting.
pub fn option_identity_hash<S: AsRef<str>>(args: &[S]) -> ContentHash {
    hash_option_set(args, false)
}

fn hash_option_set<S: AsRef<str>>(args: &[S], skip_ignored: bool) -> ContentHash {
    let effective: BTreeSet<&str> = args
        .iter()
        .skip(1)
        .map(|arg| {
            let arg = arg.as_ref();
            arg.strip_prefix('-').unwrap_or(arg)
        })
        .filter(|option| {
            !skip_ignored || !IGNORED_OPTIONS.iter().any(|ignored| option.starts_with(ignored))
        })
        .collect();

    let mut hasher = StreamHasher::new();
    for option in effective {
        hasher.update_str(option);
    }
    hasher.finish()
}

/// Key of a pre-lowered shader module in the shader cache.
pub fn module_cache_key(module_cache_hash: &ContentHash, option_hash: &ContentHash) -> ContentHash {
    let mut hasher = StreamHasher::new();
    hasher
        .update_str("module")
        .update_hash(module_cache_hash)
        .update_hash(option_hash);
    hasher.finish()
}

fn update_shader(hasher: &mut StreamHasher, shader: &PipelineShaderInfo<'_>, for_cache: bool) {
    let Some(module) = shader.module else {
        hasher.update_bool(false);
        return;
    };
    let module_hash = if for_cache {
        &module.info.cache_hash
    } else {
        &module.hash
    };
    hasher
        .update_bool(true)
        .update_u32(shader.entry_stage as u32)
        .update_hash(module_hash)
        .update_str(shader.entry_name.as_deref().unwrap_or(""))
        .update_u32(shader.spec_constants.len() as u32);
    for (id, value) in &shader.spec_constants {
        hasher.update_u32(*id).update(value);
    }
    hasher.update_u32(shader.user_data_nodes.len() as u32);
    for node in &shader.user_data_nodes {
        node.hash_into(hasher);
    }
}

fn update_options(hasher: &mut StreamHasher, options: &PipelineOptions) {
    hasher
        .update_bool(options.include_disassembly)
        .update_bool(options.include_ir)
        .update_bool(options.robust_buffer_access)
        .update_bool(options.scalar_block_layout);
}

fn update_vertex_input(hasher: &mut StreamHasher, input: &VertexInputState) {
    hasher.update_u32(input.bindings.len() as u32);
    for binding in &input.bindings {
        hasher
            .update_u32(binding.binding)
            .update_u32(binding.stride)
            .update_bool(binding.per_instance);
    }
    hasher.update_u32(input.attributes.len() as u32);
    for attribute in &input.attributes {
        hasher
            .update_u32(attribute.location)
            .update_u32(attribute.binding)
            .update_u32(attribute.format)
            .update_u32(attribute.offset);
    }
}

fn update_fragment_state(hasher: &mut StreamHasher, state: &FragmentState) {
    hasher
        .update_bool(state.alpha_to_coverage)
        .update_bool(state.dual_source_blend);
    for target in &state.targets {
        hasher
            .update_u32(target.format)
            .update_bool(target.blend_enable)
            .update_bool(target.blend_src_alpha_to_color)
            .update_u32(target.channel_write_mask as u32);
    }
}

/// Hash of a whole graphics pipeline.
///
/// With `for_cache`, modules contribute their trimmed-payload hash and
/// `option_hash` should be [`option_cache_hash`]; otherwise modules contribute
/// the hash of their submitted bytes.
pub fn graphics_pipeline_hash(
    info: &GraphicsPipelineBuildInfo<'_>,
    option_hash: &ContentHash,
    for_cache: bool,
) -> ContentHash {
    let mut hasher = StreamHasher::new();
    hasher.update_str("graphics").update_hash(option_hash);
    for shader in info.shaders() {
        update_shader(&mut hasher, shader, for_cache);
    }
    update_vertex_input(&mut hasher, &info.vertex_input);
    hasher
        .update_u32(info.input_assembly.topology)
        .update_u32(info.input_assembly.patch_control_points);
    update_fragment_state(&mut hasher, &info.fragment);
    hasher.update_u32(info.device_index);
    update_options(&mut hasher, &info.options);
    hasher.finish()
}

/// Hash of a compute pipeline; see [`graphics_pipeline_hash`].
pub fn compute_pipeline_hash(
    info: &ComputePipelineBuildInfo<'_>,
    option_hash: &ContentHash,
    for_cache: bool,
) -> ContentHash {
    let mut hasher = StreamHasher::new();
    hasher.update_str("compute").update_hash(option_hash);
    update_shader(&mut hasher, &info.cs, for_cache);
    hasher.update_u32(info.device_index);
    update_options(&mut hasher, &info.options);
    hasher.finish()
}

/// Hash of the fragment half of a graphics pipeline.
///
/// Covers the fragment shader, its code generator interface hash, the
/// pipeline options, and the fragment output state.
pub fn fragment_hash(
    info: &GraphicsPipelineBuildInfo<'_>,
    stage_hashes: &StageHashes,
    option_hash: &ContentHash,
) -> ContentHash {
    let mut hasher = StreamHasher::new();
    hasher.update_str("fragment").update_hash(option_hash);
    update_shader(&mut hasher, &info.fs, true);
    hasher.update_hash(&stage_hashes[ShaderStage::Fragment.index()]);
    update_options(&mut hasher, &info.options);
    update_fragment_state(&mut hasher, &info.fragment);
    hasher.finish()
}

/// Hash of the non-fragment half of a graphics pipeline.
///
/// Covers every non-fragment stage in `stage_mask`, their interface hashes,
/// the pipeline options, vertex input, input assembly, and the device index.
pub fn non_fragment_hash(
    info: &GraphicsPipelineBuildInfo<'_>,
    stage_mask: StageMask,
    stage_hashes: &StageHashes,
    option_hash: &ContentHash,
) -> ContentHash {
    let mut hasher = StreamHasher::new();
    hasher.update_str("non-fragment").update_hash(option_hash);
    for stage in stage_mask.non_fragment_part().iter() {
        if let Some(shader) = info.shader(stage) {
            update_shader(&mut hasher, shader, true);
            hasher.update_hash(&stage_hashes[stage.index()]);
        }
    }
    update_options(&mut hasher, &info.options);
    update_vertex_input(&mut hasher, &info.vertex_input);
    hasher
        .update_u32(info.input_assembly.topology)
        .update_u32(info.input_assembly.patch_control_points)
        .update_u32(info.device_index);
    hasher.finish()
}
