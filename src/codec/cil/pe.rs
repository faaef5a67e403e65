// src/codec/cil/pe.rs
use super::bytes::{read_u16, read_u32, slice, CilError, CilResult};

const PE32_MAGIC: u16 = 0x10B;
const PE32_PLUS_MAGIC: u16 = 0x20B;
const CLI_HEADER_DIRECTORY: usize = 14;
const SECTION_HEADER_SIZE: usize = 40;

#[derive(Debug, Clone, Copy)]
struct Section {
    virtual_address: u32,
    virtual_size: u32,
    raw_size: u32,
    raw_offset: u32,
}

/// The parts of a PE file needed to find CLI metadata and method bodies
#[derive(Debug)]
pub struct PeImage {
    sections: Vec<Section>,
    cli_header_rva: u32,
}

impl PeImage {
    pub fn parse(data: &[u8]) -> CilResult<Self> {
        if data.get(0..2) != Some(b"MZ".as_slice()) {
            return Err(CilError::NotPe("missing MZ signature"));
        }

        let pe_offset = read_u32(data, 0x3C)? as usize;
        if slice(data, pe_offset, 4)? != b"PE\0\0" {
            return Err(CilError::NotPe("missing PE signature"));
        }

        let coff = pe_offset + 4;
        let section_count = read_u16(data, coff + 2)? as usize;
        let optional_size = read_u16(data, coff + 16)? as usize;
        let optional = coff + 20;

        let directories = match read_u16(data, optional)? {
            PE32_MAGIC => optional + 96,
            PE32_PLUS_MAGIC => optional + 112,
            _ => return Err(CilError::NotPe("unknown optional header magic")),
        };

        let directory_count = read_u32(data, directories - 4)? as usize;
        if directory_count <= CLI_HEADER_DIRECTORY {
            return Err(CilError::NotManaged("no CLI header directory"));
        }
        let cli_header_rva = read_u32(data, directories + CLI_HEADER_DIRECTORY * 8)?;
        if cli_header_rva == 0 {
            return Err(CilError::NotManaged("CLI header directory is empty"));
        }

        let table = optional + optional_size;
        let sections = (0..section_count)
            .map(|i| {
                let header = table + i * SECTION_HEADER_SIZE;
                Ok(Section {
                    virtual_size: read_u32(data, header + 8)?,
                    virtual_address: read_u32(data, header + 12)?,
                    raw_size: read_u32(data, header + 16)?,
                    raw_offset: read_u32(data, header + 20)?,
                })
            })
            .collect::<CilResult<Vec<_>>>()?;

        Ok(Self {
            sections,
            cli_header_rva,
        })
    }

    /// Map a relative virtual address to a file offset
    pub fn rva_to_offset(&self, rva: u32) -> CilResult<usize> {
        for section in &self.sections {
            let span = section.virtual_size.max(section.raw_size);
            if rva >= section.virtual_address && rva - section.virtual_address < span {
                let delta = rva - section.virtual_address;
                if delta >= section.raw_size {
                    return Err(CilError::Malformed(format!(
                        "rva {:#x} has no data in the file",
                        rva
                    )));
                }
                return Ok(section.raw_offset as usize + delta as usize);
            }
        }

        Err(CilError::Malformed(format!(
            "rva {:#x} lies outside every section",
            rva
        )))
    }

    /// File offset of the metadata root
    pub fn metadata_offset(&self, data: &[u8]) -> CilResult<usize> {
        let cli = self.rva_to_offset(self.cli_header_rva)?;
        let metadata_rva = read_u32(data, cli + 8)?;
        if metadata_rva == 0 {
            return Err(CilError::NotManaged("CLI header has no metadata"));
        }
        self.rva_to_offset(metadata_rva)
    }
}
