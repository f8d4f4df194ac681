//! ELF64 writer.

use crate::image::ElfImage;
use crate::names::{align_up, NOTE_SECTION, SHT_NOTE, SHT_STRTAB, SHT_SYMTAB};
use crate::read::{
    EHDR_SIZE, ELFCLASS64, ELFDATA2LSB, ELFOSABI_AMDGPU_PAL, ELF_MAGIC, EM_AMDGPU, ET_REL,
    EV_CURRENT, SHDR_SIZE, SYM_SIZE,
};

struct OutSection {
    name: String,
    sh_type: u32,
    flags: u64,
    link: u32,
    info: u32,
    addralign: u64,
    entsize: u64,
    data: Vec<u8>,
}

/// Appends `name` to a string table and returns its offset.
fn add_string(table: &mut Vec<u8>, name: &str) -> u32 {
    let offset = table.len() as u32;
    table.extend_from_slice(name.as_bytes());
    table.push(0);
    offset
}

fn encode_notes(image: &ElfImage) -> Vec<u8> {
    let mut data = Vec::new();
    for note in &image.notes {
        let name_size = note.name.len() + 1;
        data.extend_from_slice(&(name_size as u32).to_le_bytes());
        data.extend_from_slice(&(note.desc.len() as u32).to_le_bytes());
        data.extend_from_slice(&note.note_type.to_le_bytes());
        data.extend_from_slice(note.name.as_bytes());
        data.push(0);
        data.resize(align_up(data.len(), 4), 0);
        data.extend_from_slice(&note.desc);
        data.resize(align_up(data.len(), 4), 0);
    }
    data
}

pub(crate) fn write(image: &ElfImage) -> Vec<u8> {
    let mut sections: Vec<OutSection> = image
        .sections
        .iter()
        .map(|s| OutSection {
            name: s.name.clone(),
            sh_type: s.sh_type,
            flags: s.flags,
            link: 0,
            info: 0,
            addralign: s.addralign,
            entsize: 0,
            data: s.data.clone(),
        })
        .collect();

    if !image.notes.is_empty() {
        sections.push(OutSection {
            name: NOTE_SECTION.to_string(),
            sh_type: SHT_NOTE,
            flags: 0,
            link: 0,
            info: 0,
            addralign: 4,
            entsize: 0,
            data: encode_notes(image),
        });
    }

    // File indices are model indices + 1 (index 0 is the null section).
    let symtab_index = sections.len() + 1;
    let strtab_index = symtab_index + 1;
    let shstrtab_index = strtab_index + 1;

    let mut strtab = vec![0u8];
    let mut symtab = vec![0u8; SYM_SIZE];
    for sym in &image.symbols {
        let name = add_string(&mut strtab, &sym.name);
        let shndx = sym.section.map_or(0, |i| (i + 1) as u16);
        symtab.extend_from_slice(&name.to_le_bytes());
        symtab.push(sym.info);
        symtab.push(0);
        symtab.extend_from_slice(&shndx.to_le_bytes());
        symtab.extend_from_slice(&sym.value.to_le_bytes());
        symtab.extend_from_slice(&sym.size.to_le_bytes());
    }
    let first_global = 1 + image.symbols.iter().take_while(|s| s.is_local()).count();

    sections.push(OutSection {
        name: ".symtab".to_string(),
        sh_type: SHT_SYMTAB,
        flags: 0,
        link: strtab_index as u32,
        info: first_global as u32,
        addralign: 8,
        entsize: SYM_SIZE as u64,
        data: symtab,
    });
    sections.push(OutSection {
        name: ".strtab".to_string(),
        sh_type: SHT_STRTAB,
        flags: 0,
        link: 0,
        info: 0,
        addralign: 1,
        entsize: 0,
        data: strtab,
    });
    sections.push(OutSection {
        name: ".shstrtab".to_string(),
        sh_type: SHT_STRTAB,
        flags: 0,
        link: 0,
        info: 0,
        addralign: 1,
        entsize: 0,
        data: Vec::new(),
    });

    let mut shstrtab = vec![0u8];
    let name_offsets: Vec<u32> = sections
        .iter()
        .map(|s| add_string(&mut shstrtab, &s.name))
        .collect();
    if let Some(last) = sections.last_mut() {
        last.data = shstrtab;
    }

    // Section contents follow the header, each at its alignment.
    let mut out = vec![0u8; EHDR_SIZE];
    let mut offsets = Vec::with_capacity(sections.len());
    for section in &sections {
        let align = section.addralign.max(1) as usize;
        out.resize(align_up(out.len(), align.next_power_of_two()), 0);
        offsets.push(out.len() as u64);
        out.extend_from_slice(&section.data);
    }
    out.resize(align_up(out.len(), 8), 0);
    let shoff = out.len() as u64;

    out.extend_from_slice(&[0u8; SHDR_SIZE]);
    for ((section, name), offset) in sections.iter().zip(&name_offsets).zip(&offsets) {
        out.extend_from_slice(&name.to_le_bytes());
        out.extend_from_slice(&section.sh_type.to_le_bytes());
        out.extend_from_slice(&section.flags.to_le_bytes());
        out.extend_from_slice(&0u64.to_le_bytes());
        out.extend_from_slice(&offset.to_le_bytes());
        out.extend_from_slice(&(section.data.len() as u64).to_le_bytes());
        out.extend_from_slice(&section.link.to_le_bytes());
        out.extend_from_slice(&section.info.to_le_bytes());
        out.extend_from_slice(&section.addralign.to_le_bytes());
        out.extend_from_slice(&section.entsize.to_le_bytes());
    }

    let shnum = (sections.len() + 1) as u16;
    let mut header = Vec::with_capacity(EHDR_SIZE);
    header.extend_from_slice(&ELF_MAGIC);
    header.extend_from_slice(&[ELFCLASS64, ELFDATA2LSB, EV_CURRENT, ELFOSABI_AMDGPU_PAL, 0]);
    header.resize(16, 0);
    header.extend_from_slice(&ET_REL.to_le_bytes());
    header.extend_from_slice(&EM_AMDGPU.to_le_bytes());
    header.extend_from_slice(&1u32.to_le_bytes());
    header.extend_from_slice(&0u64.to_le_bytes());
    header.extend_from_slice(&0u64.to_le_bytes());
    header.extend_from_slice(&shoff.to_le_bytes());
    header.extend_from_slice(&image.machine_flags.to_le_bytes());
    header.extend_from_slice(&(EHDR_SIZE as u16).to_le_bytes());
    header.extend_from_slice(&0u16.to_le_bytes());
    header.extend_from_slice(&0u16.to_le_bytes());
    header.extend_from_slice(&(SHDR_SIZE as u16).to_le_bytes());
    header.extend_from_slice(&shnum.to_le_bytes());
    header.extend_from_slice(&(shstrtab_index as u16).to_le_bytes());
    out[..EHDR_SIZE].copy_from_slice(&header);

    out
}
