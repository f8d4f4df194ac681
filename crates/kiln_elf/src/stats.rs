//! Register and spill statistics read back from a pipeline binary.

use serde::{Deserialize, Serialize};

use crate::error::ElfError;
use crate::image::ElfImage;
use crate::metadata::{HwStage, PipelineMetadata};
use crate::names::DISASM_SECTION;

/// Statistics of the pixel stage (graphics) or the compute stage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineStatistics {
    /// Vector registers used.
    pub num_used_vgprs: u32,
    /// Vector registers available.
    pub num_available_vgprs: u32,
    /// The stage spills scalar registers.
    pub sgpr_spill: bool,
    /// The stage uses scratch memory.
    pub use_scratch_buffer: bool,
}

/// Reads statistics from a pipeline ELF.
///
/// Register counts come from the metadata note; SGPR spilling is detected by a
/// `writelane` between the stage's entry label and the first `s_endpgm` in the
/// disassembly.
pub fn pipeline_statistics(code: &[u8]) -> Result<PipelineStatistics, ElfError> {
    let image = ElfImage::parse(code)?;
    let mut stats = PipelineStatistics::default();

    let mut stage = HwStage::Ps;
    if let Some(metadata) = PipelineMetadata::from_image(&image)? {
        let record = match metadata.hardware_stages.get(&HwStage::Ps) {
            Some(record) => Some(record),
            None => {
                stage = HwStage::Cs;
                metadata.hardware_stages.get(&HwStage::Cs)
            }
        };
        if let Some(record) = record {
            stats.num_used_vgprs = record.vgpr_count;
            stats.num_available_vgprs = record.vgpr_limit;
            stats.use_scratch_buffer = record.scratch_memory_size > 0;
        }
    }

    if let Some(disasm) = image.section(DISASM_SECTION) {
        let text = String::from_utf8_lossy(&disasm.data);
        if let Some(start) = text.find(stage.entry_symbol()) {
            let body = &text[start..];
            let body = body.find("s_endpgm").map_or(body, |end| &body[..end]);
            stats.sgpr_spill = body.contains("writelane");
        }
    }

    Ok(stats)
}
