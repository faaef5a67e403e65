// src/codec/cil/bytes.rs
use thiserror::Error;

/// Failures while decoding or patching a CIL image
#[derive(Error, Debug)]
pub enum CilError {
    #[error("unexpected end of data at offset {offset:#x} (wanted {wanted} bytes)")]
    Truncated { offset: usize, wanted: usize },

    #[error("not a PE image: {0}")]
    NotPe(&'static str),

    #[error("not a managed module: {0}")]
    NotManaged(&'static str),

    #[error("malformed metadata: {0}")]
    Malformed(String),

    #[error("unsupported metadata: {0}")]
    Unsupported(String),
}

pub type CilResult<T> = std::result::Result<T, CilError>;

pub fn slice(data: &[u8], offset: usize, len: usize) -> CilResult<&[u8]> {
    offset
        .checked_add(len)
        .and_then(|end| data.get(offset..end))
        .ok_or(CilError::Truncated {
            offset,
            wanted: len,
        })
}

pub fn read_u8(data: &[u8], offset: usize) -> CilResult<u8> {
    Ok(slice(data, offset, 1)?[0])
}

pub fn read_u16(data: &[u8], offset: usize) -> CilResult<u16> {
    let b = slice(data, offset, 2)?;
    Ok(u16::from_le_bytes([b[0], b[1]]))
}

pub fn read_u32(data: &[u8], offset: usize) -> CilResult<u32> {
    let b = slice(data, offset, 4)?;
    Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
}

pub fn read_u64(data: &[u8], offset: usize) -> CilResult<u64> {
    let b = slice(data, offset, 8)?;
    let mut raw = [0u8; 8];
    raw.copy_from_slice(b);
    Ok(u64::from_le_bytes(raw))
}

pub fn write_u16(data: &mut [u8], offset: usize, value: u16) -> CilResult<()> {
    let end = offset.checked_add(2).filter(|end| *end <= data.len());
    match end {
        Some(end) => {
            data[offset..end].copy_from_slice(&value.to_le_bytes());
            Ok(())
        }
        None => Err(CilError::Truncated { offset, wanted: 2 }),
    }
}

pub fn write_u32(data: &mut [u8], offset: usize, value: u32) -> CilResult<()> {
    let end = offset.checked_add(4).filter(|end| *end <= data.len());
    match end {
        Some(end) => {
            data[offset..end].copy_from_slice(&value.to_le_bytes());
            Ok(())
        }
        None => Err(CilError::Truncated { offset, wanted: 4 }),
    }
}

/// Sequential little-endian reader used for heaps and signatures
pub struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn u8(&mut self) -> CilResult<u8> {
        let value = read_u8(self.data, self.pos)?;
        self.pos += 1;
        Ok(value)
    }

    pub fn peek(&self) -> CilResult<u8> {
        read_u8(self.data, self.pos)
    }

    /// ECMA-335 II.23.2 compressed unsigned integer
    pub fn compressed(&mut self) -> CilResult<u32> {
        let first = self.u8()? as u32;
        if first & 0x80 == 0 {
            Ok(first)
        } else if first & 0xC0 == 0x80 {
            let second = self.u8()? as u32;
            Ok(((first & 0x3F) << 8) | second)
        } else if first & 0xE0 == 0xC0 {
            let rest = slice(self.data, self.pos, 3)?;
            self.pos += 3;
            Ok(((first & 0x1F) << 24)
                | ((rest[0] as u32) << 16)
                | ((rest[1] as u32) << 8)
                | rest[2] as u32)
        } else {
            Err(CilError::Malformed(format!(
                "bad compressed integer lead byte {:#04x}",
                first
            )))
        }
    }
}
