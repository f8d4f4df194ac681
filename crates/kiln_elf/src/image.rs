//! In-memory model of a pipeline ELF image.

use crate::error::ElfError;
use crate::names::{SHF_ALLOC, SHF_EXECINSTR, SHT_PROGBITS, STB_GLOBAL, STT_FUNC};

/// A user section (anything other than the string, symbol, and note tables).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElfSection {
    /// Section name.
    pub name: String,
    /// `sh_type`.
    pub sh_type: u32,
    /// `sh_flags`.
    pub flags: u64,
    /// `sh_addralign`; 0 and 1 both mean unaligned.
    pub addralign: u64,
    /// Section contents.
    pub data: Vec<u8>,
}

impl ElfSection {
    /// An executable code section.
    pub fn code(name: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            sh_type: SHT_PROGBITS,
            flags: SHF_ALLOC | SHF_EXECINSTR,
            addralign: 256,
            data,
        }
    }

    /// A non-allocated text section (disassembly, IR comments).
    pub fn text(name: impl Into<String>, text: &str) -> Self {
        Self {
            name: name.into(),
            sh_type: SHT_PROGBITS,
            flags: 0,
            addralign: 1,
            data: text.as_bytes().to_vec(),
        }
    }
}

/// A symbol table entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElfSymbol {
    /// Symbol name.
    pub name: String,
    /// Index into [`ElfImage::sections`], or `None` for an undefined symbol.
    pub section: Option<usize>,
    /// Byte offset within the owning section.
    pub value: u64,
    /// Size in bytes.
    pub size: u64,
    /// `st_info` (binding in the high nibble, type in the low nibble).
    pub info: u8,
}

impl ElfSymbol {
    /// A global function symbol.
    pub fn function(name: impl Into<String>, section: usize, value: u64, size: u64) -> Self {
        Self {
            name: name.into(),
            section: Some(section),
            value,
            size,
            info: (STB_GLOBAL << 4) | STT_FUNC,
        }
    }

    /// Returns `true` if the symbol has local binding.
    pub fn is_local(&self) -> bool {
        self.info >> 4 == 0
    }
}

/// A note record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElfNote {
    /// Owner name (without the terminating nul).
    pub name: String,
    /// Note type.
    pub note_type: u32,
    /// Descriptor bytes.
    pub desc: Vec<u8>,
}

/// A relocatable pipeline binary.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ElfImage {
    /// `e_flags`, which carries the GPU target.
    pub machine_flags: u32,
    /// User sections in file order.
    pub sections: Vec<ElfSection>,
    /// Symbols in table order, excluding the null symbol.
    pub symbols: Vec<ElfSymbol>,
    /// Notes in file order.
    pub notes: Vec<ElfNote>,
}

impl ElfImage {
    /// Creates an empty image.
    pub fn new(machine_flags: u32) -> Self {
        Self {
            machine_flags,
            ..Self::default()
        }
    }

    /// Parses an ELF64 little-endian buffer.
    pub fn parse(data: &[u8]) -> Result<Self, ElfError> {
        crate::read::parse(data)
    }

    /// Serializes the image, rebuilding the string, symbol, and note tables.
    pub fn to_bytes(&self) -> Vec<u8> {
        crate::write::write(self)
    }

    /// Appends a section and returns its index.
    pub fn add_section(&mut self, section: ElfSection) -> usize {
        self.sections.push(section);
        self.sections.len() - 1
    }

    /// Index of the first section named `name`.
    pub fn section_index(&self, name: &str) -> Option<usize> {
        self.sections.iter().position(|s| s.name == name)
    }

    /// The first section named `name`.
    pub fn section(&self, name: &str) -> Option<&ElfSection> {
        self.sections.iter().find(|s| s.name == name)
    }

    /// Mutable access to the first section named `name`.
    pub fn section_mut(&mut self, name: &str) -> Option<&mut ElfSection> {
        self.sections.iter_mut().find(|s| s.name == name)
    }

    /// The first symbol named `name`.
    pub fn symbol(&self, name: &str) -> Option<&ElfSymbol> {
        self.symbols.iter().find(|s| s.name == name)
    }

    /// Mutable access to the symbol named `name`, adding an undefined one if absent.
    pub fn symbol_or_insert(&mut self, name: &str) -> &mut ElfSymbol {
        let index = match self.symbols.iter().position(|s| s.name == name) {
            Some(index) => index,
            None => {
                self.symbols.push(ElfSymbol {
                    name: name.to_string(),
                    section: None,
                    value: 0,
                    size: 0,
                    info: (STB_GLOBAL << 4) | STT_FUNC,
                });
                self.symbols.len() - 1
            }
        };
        &mut self.symbols[index]
    }

    /// Symbols owned by section `index`, with their table positions.
    pub fn symbols_in_section(&self, index: usize) -> impl Iterator<Item = (usize, &ElfSymbol)> {
        self.symbols
            .iter()
            .enumerate()
            .filter(move |(_, s)| s.section == Some(index))
    }

    /// The first note of the given type.
    pub fn note(&self, note_type: u32) -> Option<&ElfNote> {
        self.notes.iter().find(|n| n.note_type == note_type)
    }

    /// Replaces the note with the same owner and type, or appends it.
    pub fn set_note(&mut self, note: ElfNote) {
        match self
            .notes
            .iter_mut()
            .find(|n| n.note_type == note.note_type && n.name == note.name)
        {
            Some(existing) => *existing = note,
            None => self.notes.push(note),
        }
    }
}
