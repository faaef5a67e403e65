// src/codec/cil/body.rs
use super::bytes::{read_u16, read_u32, read_u8, slice, CilError, CilResult};

const TINY_FORMAT: u8 = 0x2;
const FAT_FORMAT: u8 = 0x3;

/// Header byte of a tiny-format body with no code
pub const EMPTY_TINY_HEADER: u8 = TINY_FORMAT;

/// Position of a method body's instruction stream inside the file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BodyLayout {
    pub header_offset: usize,
    pub header_size: usize,
    pub code_size: usize,
}

impl BodyLayout {
    /// Decode the tiny or fat header at `offset` (ECMA-335 II.25.4)
    pub fn parse(data: &[u8], offset: usize) -> CilResult<Self> {
        let first = read_u8(data, offset)?;
        let layout = match first & 0x3 {
            TINY_FORMAT => Self {
                header_offset: offset,
                header_size: 1,
                code_size: (first >> 2) as usize,
            },
            FAT_FORMAT => {
                let flags = read_u16(data, offset)?;
                let header_size = ((flags >> 12) & 0xF) as usize * 4;
                if header_size < 12 {
                    return Err(CilError::Malformed(format!(
                        "fat method header at {:#x} is {} bytes",
                        offset, header_size
                    )));
                }
                Self {
                    header_offset: offset,
                    header_size,
                    code_size: read_u32(data, offset + 4)? as usize,
                }
            }
            _ => {
                return Err(CilError::Malformed(format!(
                    "unknown method body format {:#04x} at {:#x}",
                    first, offset
                )))
            }
        };

        layout.code(data)?;
        Ok(layout)
    }

    pub fn code<'a>(&self, data: &'a [u8]) -> CilResult<&'a [u8]> {
        slice(data, self.header_offset + self.header_size, self.code_size)
    }
}
