//! Pipeline metadata carried in the vendor note.
//!
//! The note describes which hardware stage each API shader runs on and the
//! register budget of every hardware stage. It is what the driver reads to
//! program the GPU, so merging two partial pipelines must keep it consistent
//! with the merged code.

use std::collections::BTreeMap;
use std::fmt;

use kiln_common::{ContentHash, ShaderStage};
use serde::{Deserialize, Serialize};

use crate::error::ElfError;
use crate::image::{ElfImage, ElfNote};
use crate::names::{NOTE_OWNER, PIPELINE_METADATA_NOTE_TYPE};

/// A hardware shader stage.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug, Serialize, Deserialize)]
pub enum HwStage {
    /// Local (vertex before tessellation).
    Ls,
    /// Hull.
    Hs,
    /// Export (vertex or domain before geometry).
    Es,
    /// Geometry.
    Gs,
    /// Vertex (last stage before rasterization).
    Vs,
    /// Pixel.
    Ps,
    /// Compute.
    Cs,
}

impl HwStage {
    /// Hardware stages in code layout order.
    pub const ALL: [HwStage; 7] = [
        HwStage::Ls,
        HwStage::Hs,
        HwStage::Es,
        HwStage::Gs,
        HwStage::Vs,
        HwStage::Ps,
        HwStage::Cs,
    ];

    /// Metadata key, e.g. `.ps`.
    pub fn key(self) -> &'static str {
        match self {
            HwStage::Ls => ".ls",
            HwStage::Hs => ".hs",
            HwStage::Es => ".es",
            HwStage::Gs => ".gs",
            HwStage::Vs => ".vs",
            HwStage::Ps => ".ps",
            HwStage::Cs => ".cs",
        }
    }

    /// Entry symbol, e.g. `_amdgpu_ps_main`.
    pub fn entry_symbol(self) -> &'static str {
        match self {
            HwStage::Ls => "_amdgpu_ls_main",
            HwStage::Hs => "_amdgpu_hs_main",
            HwStage::Es => "_amdgpu_es_main",
            HwStage::Gs => "_amdgpu_gs_main",
            HwStage::Vs => "_amdgpu_vs_main",
            HwStage::Ps => "_amdgpu_ps_main",
            HwStage::Cs => "_amdgpu_cs_main",
        }
    }
}

impl fmt::Display for HwStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Metadata key of an API shader stage, e.g. `.pixel` for fragment.
pub fn api_shader_key(stage: ShaderStage) -> &'static str {
    match stage {
        ShaderStage::Vertex => ".vertex",
        ShaderStage::TessControl => ".hull",
        ShaderStage::TessEval => ".domain",
        ShaderStage::Geometry => ".geometry",
        ShaderStage::Fragment => ".pixel",
        ShaderStage::Compute => ".compute",
    }
}

/// Register usage and limits of one hardware stage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HwStageMetadata {
    /// Vector registers used.
    pub vgpr_count: u32,
    /// Scalar registers used.
    pub sgpr_count: u32,
    /// Vector registers available.
    pub vgpr_limit: u32,
    /// Scalar registers available.
    pub sgpr_limit: u32,
    /// Local data share bytes.
    pub lds_size: u32,
    /// Scratch bytes per thread.
    pub scratch_memory_size: u32,
    /// Wavefront size.
    pub wavefront_size: u32,
    /// Raw register settings.
    pub registers: BTreeMap<u32, u32>,
}

/// Per-API-shader record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiShaderMetadata {
    /// Hash of the shader that produced the code.
    pub hash: ContentHash,
    /// Hardware stages the shader was compiled onto.
    pub hardware_mapping: Vec<HwStage>,
}

/// Pipeline-wide metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineMetadata {
    /// Client API name.
    pub api: String,
    /// Number of user-data registers the pipeline reads.
    pub user_data_limit: u32,
    /// Lowest user-data entry that spills to memory.
    pub spill_threshold: u32,
    /// API shader records keyed by [`api_shader_key`].
    pub shaders: BTreeMap<String, ApiShaderMetadata>,
    /// Hardware stage records.
    pub hardware_stages: BTreeMap<HwStage, HwStageMetadata>,
}

impl PipelineMetadata {
    /// Encodes the metadata as a note.
    pub fn to_note(&self) -> Result<ElfNote, ElfError> {
        let desc = bincode::serde::encode_to_vec(self, bincode::config::standard()).map_err(
            |e| ElfError::Metadata {
                reason: e.to_string(),
            },
        )?;
        Ok(ElfNote {
            name: NOTE_OWNER.to_string(),
            note_type: PIPELINE_METADATA_NOTE_TYPE,
            desc,
        })
    }

    /// Decodes metadata from a note descriptor.
    pub fn from_note(note: &ElfNote) -> Result<Self, ElfError> {
        bincode::serde::decode_from_slice(&note.desc, bincode::config::standard())
            .map(|(metadata, _)| metadata)
            .map_err(|e| ElfError::Metadata {
                reason: e.to_string(),
            })
    }

    /// Reads the pipeline metadata note of `image`, if it has one.
    pub fn from_image(image: &ElfImage) -> Result<Option<Self>, ElfError> {
        image
            .note(PIPELINE_METADATA_NOTE_TYPE)
            .map(Self::from_note)
            .transpose()
    }

    /// Stores the metadata in `image`, replacing any existing note.
    pub fn store(&self, image: &mut ElfImage) -> Result<(), ElfError> {
        image.set_note(self.to_note()?);
        Ok(())
    }

    /// Combines the metadata of a fragment-only and a non-fragment-only image.
    ///
    /// The fragment image contributes the `.ps` hardware stage and the `.pixel`
    /// shader record; the non-fragment image contributes everything else.
    /// `user_data_limit` takes the larger value and `spill_threshold` the
    /// smaller. The API name must agree.
    pub fn merge(fragment: &Self, non_fragment: &Self) -> Result<Self, ElfError> {
        if fragment.api != non_fragment.api {
            return Err(ElfError::MetadataConflict {
                field: "api".to_string(),
                fragment: fragment.api.clone(),
                non_fragment: non_fragment.api.clone(),
            });
        }

        let pixel_key = api_shader_key(ShaderStage::Fragment);
        let mut shaders: BTreeMap<_, _> = non_fragment
            .shaders
            .iter()
            .filter(|(key, _)| key.as_str() != pixel_key)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        if let Some(pixel) = fragment.shaders.get(pixel_key) {
            shaders.insert(pixel_key.to_string(), pixel.clone());
        }

        let mut hardware_stages: BTreeMap<_, _> = non_fragment
            .hardware_stages
            .iter()
            .filter(|(stage, _)| **stage != HwStage::Ps)
            .map(|(k, v)| (*k, v.clone()))
            .collect();
        if let Some(ps) = fragment.hardware_stages.get(&HwStage::Ps) {
            hardware_stages.insert(HwStage::Ps, ps.clone());
        }

        Ok(Self {
            api: non_fragment.api.clone(),
            user_data_limit: fragment.user_data_limit.max(non_fragment.user_data_limit),
            spill_threshold: fragment.spill_threshold.min(non_fragment.spill_threshold),
            shaders,
            hardware_stages,
        })
    }
}
