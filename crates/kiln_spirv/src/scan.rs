//! Word-stream walker over a SPIR-V module.

use crate::error::SpirvError;
use crate::{SPIRV_HEADER_SIZE, SPIRV_MAGIC};

/// One instruction as it appears in the binary.
#[derive(Debug, Clone, Copy)]
pub struct Instruction<'a> {
    /// Opcode (low half of the first word).
    pub opcode: u16,
    /// Byte offset of the instruction from the start of the module.
    pub offset: usize,
    /// The whole instruction, including its first word.
    pub bytes: &'a [u8],
}

impl<'a> Instruction<'a> {
    /// Number of words in the instruction.
    pub fn word_count(&self) -> usize {
        self.bytes.len() / 4
    }

    /// Returns operand word `index` (operand 0 is the word after the opcode).
    pub fn operand(&self, index: usize) -> Option<u32> {
        let start = (index + 1) * 4;
        self.bytes
            .get(start..start + 4)
            .map(|w| u32::from_le_bytes([w[0], w[1], w[2], w[3]]))
    }

    /// Decodes a nul-terminated literal string starting at operand `index`.
    pub fn literal_string(&self, index: usize) -> Result<&'a str, SpirvError> {
        let start = (index + 1) * 4;
        let tail = self.bytes.get(start..).unwrap_or(&[]);
        let end = tail
            .iter()
            .position(|&b| b == 0)
            .ok_or_else(|| self.malformed("unterminated literal string"))?;
        std::str::from_utf8(&tail[..end]).map_err(|_| self.malformed("literal string is not UTF-8"))
    }

    fn malformed(&self, reason: &str) -> SpirvError {
        SpirvError::Malformed {
            offset: self.offset,
            reason: reason.to_string(),
        }
    }
}

/// Iterator over the instructions following the module header.
///
/// Yields an error and stops at the first zero word count or an instruction
/// that runs past the end of the buffer.
pub struct Instructions<'a> {
    code: &'a [u8],
    pos: usize,
    failed: bool,
}

impl<'a> Instructions<'a> {
    /// Checks the header and positions the walker after it.
    pub fn new(code: &'a [u8]) -> Result<Self, SpirvError> {
        let header = read_header(code)?;
        debug_assert_eq!(header.magic, SPIRV_MAGIC);
        Ok(Self {
            code,
            pos: SPIRV_HEADER_SIZE,
            failed: false,
        })
    }
}

impl<'a> Iterator for Instructions<'a> {
    type Item = Result<Instruction<'a>, SpirvError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.pos >= self.code.len() {
            return None;
        }
        let offset = self.pos;
        let fail = |this: &mut Self, reason: &str| {
            this.failed = true;
            Some(Err(SpirvError::Malformed {
                offset,
                reason: reason.to_string(),
            }))
        };
        let Some(first) = self.code.get(offset..offset + 4) else {
            return fail(self, "truncated instruction word");
        };
        let first = u32::from_le_bytes([first[0], first[1], first[2], first[3]]);
        let word_count = (first >> 16) as usize;
        if word_count == 0 {
            return fail(self, "zero word count");
        }
        let end = offset + word_count * 4;
        if end > self.code.len() {
            return fail(self, "instruction runs past end of module");
        }
        self.pos = end;
        Some(Ok(Instruction {
            opcode: (first & 0xFFFF) as u16,
            offset,
            bytes: &self.code[offset..end],
        }))
    }
}

/// The five header words.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Magic number.
    pub magic: u32,
    /// Version word (`0x00MMmm00`).
    pub version: u32,
    /// Generator magic.
    pub generator: u32,
    /// Id bound.
    pub bound: u32,
    /// Reserved schema word.
    pub schema: u32,
}

impl Header {
    /// Major version number.
    pub fn major(&self) -> u32 {
        (self.version >> 16) & 0xFF
    }

    /// Minor version number.
    pub fn minor(&self) -> u32 {
        (self.version >> 8) & 0xFF
    }
}

/// Reads and checks the module header.
pub fn read_header(code: &[u8]) -> Result<Header, SpirvError> {
    if code.len() < SPIRV_HEADER_SIZE {
        return Err(SpirvError::NotSpirv {
            reason: format!("{} bytes is shorter than the header", code.len()),
        });
    }
    if code.len() % 4 != 0 {
        return Err(SpirvError::NotSpirv {
            reason: format!("length {} is not a multiple of 4", code.len()),
        });
    }
    let mut cursor = kiln_common::ByteCursor::new(code);
    let mut word = || {
        cursor.read_u32().map_err(|e| SpirvError::NotSpirv {
            reason: e.to_string(),
        })
    };
    let header = Header {
        magic: word()?,
        version: word()?,
        generator: word()?,
        bound: word()?,
        schema: word()?,
    };
    if header.magic != SPIRV_MAGIC {
        return Err(SpirvError::NotSpirv {
            reason: format!("bad magic {:#010x}", header.magic),
        });
    }
    Ok(header)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::opcode::decode;
    use crate::testutil::*;
    use spirv::Op;

    #[test]
    fn walks_all_instructions() {
        let module = sample_module();
        let opcodes: Vec<Op> = Instructions::new(&module)
            .unwrap()
            .filter_map(|i| decode(i.unwrap().opcode))
            .collect();
        assert_eq!(
            opcodes,
            vec![Op::Capability, Op::EntryPoint, Op::EntryPoint, Op::Source, Op::Name, Op::TypeVoid]
        );
    }

    #[test]
    fn zero_word_count_stops_iteration() {
        let mut words = header(0x0001_0000);
        words.push(0);
        words.extend(inst(Op::TypeVoid, &[1]));
        let module = to_bytes(&words);
        let items: Vec<_> = Instructions::new(&module).unwrap().collect();
        assert_eq!(items.len(), 1);
        assert!(matches!(
            items[0],
            Err(SpirvError::Malformed { offset: 20, .. })
        ));
    }

    #[test]
    fn overrunning_instruction_is_malformed() {
        let mut words = header(0x0001_0000);
        words.push((5 << 16) | Op::TypeVoid as u32);
        words.push(1);
        let module = to_bytes(&words);
        let err = Instructions::new(&module).unwrap().next().unwrap().unwrap_err();
        assert!(err.to_string().contains("past end"));
    }

    #[test]
    fn header_rejects_bad_magic() {
        let mut words = header(0x0001_0000);
        words[0] = 0xDEAD_BEEF;
        let err = read_header(&to_bytes(&words)).unwrap_err();
        assert!(matches!(err, SpirvError::NotSpirv { .. }));
    }

    #[test]
    fn header_version_fields() {
        let h = read_header(&to_bytes(&header(0x0001_0300))).unwrap();
        assert_eq!((h.major(), h.minor()), (1, 3));
    }

    #[test]
    fn literal_string_decodes_entry_name() {
        let module = to_bytes(&{
            let mut w = header(0x0001_0000);
            w.extend(entry_point(4, 7, "fragMain"));
            w
        });
        let inst = Instructions::new(&module).unwrap().next().unwrap().unwrap();
        assert_eq!(inst.operand(0), Some(4));
        assert_eq!(inst.literal_string(2).unwrap(), "fragMain");
    }
}
