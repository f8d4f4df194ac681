//! ELF64 reader.

use std::collections::{HashMap, HashSet};

use kiln_common::ByteCursor;

use crate::error::ElfError;
use crate::image::{ElfImage, ElfNote, ElfSection, ElfSymbol};
use crate::names::{SHT_NOTE, SHT_SYMTAB};

pub(crate) const ELF_MAGIC: [u8; 4] = [0x7F, b'E', b'L', b'F'];
pub(crate) const ELFCLASS64: u8 = 2;
pub(crate) const ELFDATA2LSB: u8 = 1;
pub(crate) const EV_CURRENT: u8 = 1;
pub(crate) const ELFOSABI_AMDGPU_PAL: u8 = 65;
pub(crate) const ET_REL: u16 = 1;
pub(crate) const EM_AMDGPU: u16 = 224;
pub(crate) const EHDR_SIZE: usize = 64;
pub(crate) const SHDR_SIZE: usize = 64;
pub(crate) const SYM_SIZE: usize = 24;

const SHT_NOBITS: u32 = 8;
const SHN_LORESERVE: u16 = 0xFF00;

struct SectionHeader {
    name: u32,
    sh_type: u32,
    flags: u64,
    offset: u64,
    size: u64,
    link: u32,
    addralign: u64,
}

fn malformed(reason: impl Into<String>) -> ElfError {
    ElfError::Malformed {
        reason: reason.into(),
    }
}

fn section_data<'a>(data: &'a [u8], header: &SectionHeader) -> Result<&'a [u8], ElfError> {
    if header.sh_type == SHT_NOBITS {
        return Ok(&[]);
    }
    let start = usize::try_from(header.offset).map_err(|_| malformed("section offset overflow"))?;
    let len = usize::try_from(header.size).map_err(|_| malformed("section size overflow"))?;
    Ok(ByteCursor::at(data, start)?.read_bytes(len)?)
}

fn read_cstr(table: &[u8], offset: u32) -> Result<String, ElfError> {
    let tail = table
        .get(offset as usize..)
        .ok_or_else(|| malformed(format!("string offset {offset} outside string table")))?;
    let end = tail
        .iter()
        .position(|&b| b == 0)
        .ok_or_else(|| malformed(format!("unterminated string at offset {offset}")))?;
    Ok(String::from_utf8_lossy(&tail[..end]).into_owned())
}

pub(crate) fn parse(data: &[u8]) -> Result<ElfImage, ElfError> {
    if data.len() < EHDR_SIZE {
        return Err(ElfError::NotElf {
            reason: format!("{} bytes is shorter than the ELF header", data.len()),
        });
    }
    if data[..4] != ELF_MAGIC {
        return Err(ElfError::NotElf {
            reason: "bad magic".to_string(),
        });
    }
    if data[4] != ELFCLASS64 || data[5] != ELFDATA2LSB {
        return Err(ElfError::NotElf {
            reason: format!("class {} / data encoding {}", data[4], data[5]),
        });
    }

    let mut c = ByteCursor::at(data, 16)?;
    let _e_type = c.read_u16()?;
    let _e_machine = c.read_u16()?;
    let _e_version = c.read_u32()?;
    let _e_entry = c.read_u64()?;
    let _e_phoff = c.read_u64()?;
    let e_shoff = c.read_u64()?;
    let e_flags = c.read_u32()?;
    let _e_ehsize = c.read_u16()?;
    let _e_phentsize = c.read_u16()?;
    let _e_phnum = c.read_u16()?;
    let e_shentsize = c.read_u16()? as usize;
    let e_shnum = c.read_u16()? as usize;
    let e_shstrndx = c.read_u16()? as usize;

    if e_shnum == 0 {
        return Ok(ElfImage::new(e_flags));
    }
    if e_shentsize != SHDR_SIZE {
        return Err(malformed(format!("section header size {e_shentsize}")));
    }
    if e_shstrndx >= e_shnum {
        return Err(malformed(format!(
            "section name table index {e_shstrndx} out of {e_shnum}"
        )));
    }

    let shoff = usize::try_from(e_shoff).map_err(|_| malformed("section header offset overflow"))?;
    let mut headers = Vec::with_capacity(e_shnum);
    for i in 0..e_shnum {
        let offset = i
            .checked_mul(SHDR_SIZE)
            .and_then(|o| o.checked_add(shoff))
            .ok_or_else(|| malformed("section header offset overflow"))?;
        let mut c = ByteCursor::at(data, offset)?;
        let name = c.read_u32()?;
        let sh_type = c.read_u32()?;
        let flags = c.read_u64()?;
        let _addr = c.read_u64()?;
        let offset = c.read_u64()?;
        let size = c.read_u64()?;
        let link = c.read_u32()?;
        let _info = c.read_u32()?;
        let addralign = c.read_u64()?;
        let _entsize = c.read_u64()?;
        headers.push(SectionHeader {
            name,
            sh_type,
            flags,
            offset,
            size,
            link,
            addralign,
        });
    }

    let shstrtab = section_data(data, &headers[e_shstrndx])?;

    let mut structural: HashSet<usize> = HashSet::from([0, e_shstrndx]);
    for (i, h) in headers.iter().enumerate() {
        match h.sh_type {
            SHT_SYMTAB => {
                structural.insert(i);
                structural.insert(h.link as usize);
            }
            SHT_NOTE => {
                structural.insert(i);
            }
            _ => {}
        }
    }

    let mut image = ElfImage::new(e_flags);
    let mut index_map: HashMap<usize, usize> = HashMap::new();
    for (i, h) in headers.iter().enumerate() {
        if structural.contains(&i) {
            continue;
        }
        let section = ElfSection {
            name: read_cstr(shstrtab, h.name)?,
            sh_type: h.sh_type,
            flags: h.flags,
            addralign: h.addralign,
            data: section_data(data, h)?.to_vec(),
        };
        index_map.insert(i, image.add_section(section));
    }

    for h in headers.iter().filter(|h| h.sh_type == SHT_SYMTAB) {
        let strtab_header = headers
            .get(h.link as usize)
            .ok_or_else(|| malformed(format!("symbol table links to section {}", h.link)))?;
        let strtab = section_data(data, strtab_header)?;
        let table = section_data(data, h)?;
        if table.len() % SYM_SIZE != 0 {
            return Err(malformed("symbol table size is not a multiple of 24"));
        }
        let mut c = ByteCursor::new(table);
        c.skip(SYM_SIZE.min(table.len()))?;
        while !c.is_at_end() {
            let name = c.read_u32()?;
            let info = c.read_u8()?;
            let _other = c.read_u8()?;
            let shndx = c.read_u16()?;
            let value = c.read_u64()?;
            let size = c.read_u64()?;
            let section = if shndx == 0 || shndx >= SHN_LORESERVE {
                None
            } else {
                index_map.get(&(shndx as usize)).copied()
            };
            image.symbols.push(ElfSymbol {
                name: read_cstr(strtab, name)?,
                section,
                value,
                size,
                info,
            });
        }
    }

    for h in headers.iter().filter(|h| h.sh_type == SHT_NOTE) {
        parse_notes(section_data(data, h)?, &mut image.notes)?;
    }

    Ok(image)
}

fn parse_notes(section: &[u8], notes: &mut Vec<ElfNote>) -> Result<(), ElfError> {
    let mut c = ByteCursor::new(section);
    while !c.is_at_end() {
        let name_size = c.read_u32()? as usize;
        let desc_size = c.read_u32()? as usize;
        let note_type = c.read_u32()?;
        let name = c.read_bytes(name_size)?;
        c.skip(crate::names::align_up(name_size, 4) - name_size)?;
        let desc = c.read_bytes(desc_size)?.to_vec();
        let pad = crate::names::align_up(desc_size, 4) - desc_size;
        c.skip(pad.min(c.remaining()))?;
        let name = name.strip_suffix(&[0]).unwrap_or(name);
        notes.push(ElfNote {
            name: String::from_utf8_lossy(name).into_owned(),
            note_type,
            desc,
        });
    }
    Ok(())
}
