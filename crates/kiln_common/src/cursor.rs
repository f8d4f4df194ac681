//! Bounds-checked little-endian reads over a byte buffer.
//!
//! Every read validates `position + len <= end` before touching the data and
//! advances the cursor only on success.

/// Error returned when a read would run past the end of the buffer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("read of {wanted} bytes at offset {offset} exceeds buffer of {len} bytes")]
pub struct CursorError {
    /// Offset of the failed read.
    pub offset: usize,
    /// Number of bytes requested.
    pub wanted: usize,
    /// Total buffer length.
    pub len: usize,
}

/// A read cursor over a byte slice.
#[derive(Clone)]
pub struct ByteCursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteCursor<'a> {
    /// Creates a cursor positioned at the start of `data`.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Creates a cursor positioned at `offset`.
    pub fn at(data: &'a [u8], offset: usize) -> Result<Self, CursorError> {
        if offset > data.len() {
            return Err(CursorError {
                offset,
                wanted: 0,
                len: data.len(),
            });
        }
        Ok(Self { data, pos: offset })
    }

    /// Current offset.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Bytes left to read.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    /// Returns `true` when the cursor has consumed the whole buffer.
    pub fn is_at_end(&self) -> bool {
        self.pos == self.data.len()
    }

    /// Reads `len` bytes and advances.
    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], CursorError> {
        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.data.len())
            .ok_or(CursorError {
                offset: self.pos,
                wanted: len,
                len: self.data.len(),
            })?;
        let bytes = &self.data[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    /// Skips `len` bytes.
    pub fn skip(&mut self, len: usize) -> Result<(), CursorError> {
        self.read_bytes(len).map(|_| ())
    }

    /// Reads a single byte.
    pub fn read_u8(&mut self) -> Result<u8, CursorError> {
        Ok(self.read_bytes(1)?[0])
    }

    /// Reads a little-endian `u16`.
    pub fn read_u16(&mut self) -> Result<u16, CursorError> {
        let b = self.read_bytes(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    /// Reads a little-endian `u32`.
    pub fn read_u32(&mut self) -> Result<u32, CursorError> {
        let b = self.read_bytes(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Reads a little-endian `u64`.
    pub fn read_u64(&mut self) -> Result<u64, CursorError> {
        let b = self.read_bytes(8)?;
        let mut word = [0u8; 8];
        word.copy_from_slice(b);
        Ok(u64::from_le_bytes(word))
    }
}
