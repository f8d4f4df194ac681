//! The binary container library used by the Kiln pipeline compiler.
//!
//! Pipeline binaries are relocatable little-endian ELF64 images. [`ElfImage`]
//! is an in-memory model holding only the interesting parts: user sections
//! (code, disassembly and IR-comment text), the symbol table, and notes.
//! String tables, the symbol table section, and the note section are rebuilt
//! on every [`ElfImage::to_bytes`].

#![warn(missing_docs)]

pub mod error;
pub mod image;
pub mod metadata;
pub mod names;
mod read;
pub mod splice;
pub mod stats;
mod write;

pub use error::ElfError;
pub use image::{ElfImage, ElfNote, ElfSection, ElfSymbol};
pub use metadata::{ApiShaderMetadata, HwStage, HwStageMetadata, PipelineMetadata};
pub use splice::merge_section;
pub use stats::{pipeline_statistics, PipelineStatistics};
