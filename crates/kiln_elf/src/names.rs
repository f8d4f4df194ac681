//! Well-known section, symbol, and note names.

/// Program code section.
pub const TEXT_SECTION: &str = ".text";

/// Disassembly listing section.
pub const DISASM_SECTION: &str = ".AMDGPU.disasm";

/// IR comment section.
pub const IR_COMMENT_SECTION: &str = ".AMDGPU.comment.llvmir";

/// Section that carries all notes.
pub const NOTE_SECTION: &str = ".note";

/// Owner name of vendor notes.
pub const NOTE_OWNER: &str = "AMDGPU";

/// Note type of the pipeline metadata blob.
pub const PIPELINE_METADATA_NOTE_TYPE: u32 = 32;

/// Prefix shared by all pipeline ABI symbols.
pub const PIPELINE_SYMBOL_PREFIX: &str = "_amdgpu_";

/// Fragment (pixel) hardware stage entry symbol.
pub const PS_ENTRY_SYMBOL: &str = "_amdgpu_ps_main";

/// Compute hardware stage entry symbol.
pub const CS_ENTRY_SYMBOL: &str = "_amdgpu_cs_main";

/// Per-pipeline internal symbols the compiler never emits for the pixel stage.
pub const FORBIDDEN_PS_SYMBOLS: [&str; 4] = [
    "_amdgpu_ps_shdr_intrl_tbl",
    "_amdgpu_ps_disasm",
    "_amdgpu_ps_shdr_intrl_data",
    "_amdgpu_ps_amdil",
];

/// Code blocks for hardware stages start on this boundary.
pub const CODE_ALIGNMENT: usize = 0x100;

/// ELF section type: program-defined contents.
pub const SHT_PROGBITS: u32 = 1;
/// ELF section type: symbol table.
pub const SHT_SYMTAB: u32 = 2;
/// ELF section type: string table.
pub const SHT_STRTAB: u32 = 3;
/// ELF section type: notes.
pub const SHT_NOTE: u32 = 7;

/// Section flag: occupies memory at run time.
pub const SHF_ALLOC: u64 = 0x2;
/// Section flag: executable.
pub const SHF_EXECINSTR: u64 = 0x4;

/// Symbol binding: global.
pub const STB_GLOBAL: u8 = 1;
/// Symbol type: function.
pub const STT_FUNC: u8 = 2;

/// Rounds `value` up to a multiple of `align` (a power of two).
pub fn align_up(value: usize, align: usize) -> usize {
    debug_assert!(align.is_power_of_two());
    (value + align - 1) & !(align - 1)
}
