// src/codec/cil/metadata.rs
use super::bytes::{read_u16, read_u32, read_u64, read_u8, slice, CilError, CilResult, Cursor};
use super::schema::{columns, Column, POINTER_TABLES, TABLE_COUNT};

const METADATA_SIGNATURE: u32 = 0x424A_5342;

const HEAP_STRINGS_WIDE: u8 = 0x01;
const HEAP_GUID_WIDE: u8 = 0x02;
const HEAP_BLOB_WIDE: u8 = 0x04;
const HEAP_EXTRA_DATA: u8 = 0x40;

/// Location of one table inside the file
#[derive(Debug, Clone, Default)]
struct TableLayout {
    rows: u32,
    offset: usize,
    row_size: usize,
    /// (offset in row, width) per column
    cells: Vec<(usize, usize)>,
}

/// Decoded `#~` stream header with the position of every table
#[derive(Debug)]
pub struct Tables {
    layouts: Vec<TableLayout>,
}

impl Tables {
    fn parse(data: &[u8], start: usize) -> CilResult<Self> {
        let heap_sizes = read_u8(data, start + 6)?;
        let valid = read_u64(data, start + 8)?;

        if valid >> TABLE_COUNT != 0 {
            return Err(CilError::Unsupported(format!(
                "table mask {:#x} names tables this reader does not know",
                valid
            )));
        }

        let mut rows = [0u32; TABLE_COUNT];
        let mut cursor = start + 24;
        for (table, count) in rows.iter_mut().enumerate() {
            if valid & (1u64 << table) != 0 {
                *count = read_u32(data, cursor)?;
                cursor += 4;
            }
        }
        if heap_sizes & HEAP_EXTRA_DATA != 0 {
            cursor += 4;
        }

        if let Some(table) = POINTER_TABLES.iter().find(|t| rows[**t as usize] > 0) {
            return Err(CilError::Unsupported(format!(
                "indirection table {:#04x} is present",
                table
            )));
        }

        let width = |column: Column| -> usize {
            match column {
                Column::U16 => 2,
                Column::U32 => 4,
                Column::Str => wide(heap_sizes, HEAP_STRINGS_WIDE),
                Column::Guid => wide(heap_sizes, HEAP_GUID_WIDE),
                Column::Blob => wide(heap_sizes, HEAP_BLOB_WIDE),
                Column::Index(table) => {
                    if rows[table as usize] < 0x1_0000 {
                        2
                    } else {
                        4
                    }
                }
                Column::Coded(coded) => coded.width(&rows),
            }
        };

        let mut layouts = Vec::with_capacity(TABLE_COUNT);
        for (table, count) in rows.iter().enumerate() {
            let mut cells = Vec::new();
            let mut row_size = 0;
            for column in columns(table as u8) {
                let w = width(*column);
                cells.push((row_size, w));
                row_size += w;
            }

            layouts.push(TableLayout {
                rows: *count,
                offset: cursor,
                row_size,
                cells,
            });
            cursor = cursor
                .checked_add(row_size * *count as usize)
                .ok_or_else(|| CilError::Malformed("table stream overflows".to_string()))?;
        }

        if cursor > data.len() {
            return Err(CilError::Truncated {
                offset: start,
                wanted: cursor - start,
            });
        }

        Ok(Self { layouts })
    }

    pub fn rows(&self, table: u8) -> u32 {
        self.layouts
            .get(table as usize)
            .map_or(0, |layout| layout.rows)
    }

    /// File offset of a cell; `row` is 1-based as in metadata tokens
    pub fn cell_offset(&self, table: u8, row: u32, column: usize) -> CilResult<(usize, usize)> {
        let layout = self
            .layouts
            .get(table as usize)
            .ok_or_else(|| CilError::Malformed(format!("unknown table {:#04x}", table)))?;
        if row == 0 || row > layout.rows {
            return Err(CilError::Malformed(format!(
                "row {} out of range for table {:#04x} ({} rows)",
                row, table, layout.rows
            )));
        }
        let (offset, width) = *layout.cells.get(column).ok_or_else(|| {
            CilError::Malformed(format!("table {:#04x} has no column {}", table, column))
        })?;

        Ok((
            layout.offset + (row as usize - 1) * layout.row_size + offset,
            width,
        ))
    }
}

fn wide(heap_sizes: u8, flag: u8) -> usize {
    if heap_sizes & flag != 0 {
        4
    } else {
        2
    }
}

/// Metadata root with the heaps and tables this codec reads
pub struct Metadata<'a> {
    data: &'a [u8],
    pub tables: Tables,
    strings: &'a [u8],
    blob: &'a [u8],
}

impl<'a> Metadata<'a> {
    pub fn parse(data: &'a [u8], root: usize) -> CilResult<Self> {
        if read_u32(data, root)? != METADATA_SIGNATURE {
            return Err(CilError::NotManaged("missing metadata signature"));
        }

        let version_length = read_u32(data, root + 12)? as usize;
        let after_version = root + 16 + version_length;
        let stream_count = read_u16(data, after_version + 2)?;

        let mut header = after_version + 4;
        let mut tables_stream = None;
        let mut strings: &[u8] = &[];
        let mut blob: &[u8] = &[];

        for _ in 0..stream_count {
            let offset = read_u32(data, header)? as usize;
            let size = read_u32(data, header + 4)? as usize;
            let name_start = header + 8;

            let mut name_len = 0;
            while read_u8(data, name_start + name_len)? != 0 {
                name_len += 1;
                if name_len > 32 {
                    return Err(CilError::Malformed("stream name too long".to_string()));
                }
            }
            let name = slice(data, name_start, name_len)?;
            // Name plus terminator, padded to four bytes
            header = name_start + (name_len + 4) / 4 * 4;

            let body = slice(data, root + offset, size)?;
            match name {
                b"#~" => tables_stream = Some(root + offset),
                b"#-" => {
                    return Err(CilError::Unsupported(
                        "uncompressed #- table stream".to_string(),
                    ))
                }
                b"#Strings" => strings = body,
                b"#Blob" => blob = body,
                _ => {}
            }
        }

        let tables_start =
            tables_stream.ok_or(CilError::NotManaged("metadata has no #~ stream"))?;
        let tables = Tables::parse(data, tables_start)?;

        Ok(Self {
            data,
            tables,
            strings,
            blob,
        })
    }

    /// Read a cell as an unsigned value
    pub fn cell(&self, table: u8, row: u32, column: usize) -> CilResult<u32> {
        let (offset, width) = self.tables.cell_offset(table, row, column)?;
        match width {
            2 => Ok(read_u16(self.data, offset)? as u32),
            _ => read_u32(self.data, offset),
        }
    }

    pub fn string(&self, index: u32) -> CilResult<&'a str> {
        let strings = self.strings;
        let start = index as usize;
        if start == 0 && strings.is_empty() {
            return Ok("");
        }
        let tail = strings.get(start..).ok_or_else(|| {
            CilError::Malformed(format!("string index {:#x} outside #Strings", index))
        })?;
        let end = tail.iter().position(|b| *b == 0).ok_or_else(|| {
            CilError::Malformed(format!("unterminated string at {:#x}", index))
        })?;
        std::str::from_utf8(&tail[..end])
            .map_err(|_| CilError::Malformed(format!("invalid UTF-8 string at {:#x}", index)))
    }

    pub fn blob(&self, index: u32) -> CilResult<&'a [u8]> {
        let blobs = self.blob;
        let start = index as usize;
        if start == 0 && blobs.is_empty() {
            return Ok(&[]);
        }
        let tail = blobs.get(start..).ok_or_else(|| {
            CilError::Malformed(format!("blob index {:#x} outside #Blob", index))
        })?;
        let mut cursor = Cursor::new(tail);
        let length = cursor.compressed()? as usize;
        slice(tail, cursor.position(), length)
    }
}
