// src/codec/cil/signature.rs
//! Just enough of the signature grammar (ECMA-335 II.23.2) to name a method's return type.

use super::bytes::{CilError, CilResult, Cursor};
use super::schema::CodedIndex;

const GENERIC: u8 = 0x10;
const MAX_DEPTH: usize = 64;

/// Resolves a TypeDef/TypeRef/TypeSpec row to a display name
pub type TypeNameResolver<'r> = dyn Fn(u8, u32) -> Option<String> + 'r;

/// Render the return type of a MethodDef signature blob
pub fn return_type(blob: &[u8], names: &TypeNameResolver<'_>) -> CilResult<String> {
    let mut decoder = Decoder {
        cursor: Cursor::new(blob),
        names,
    };
    decoder.method_header()?;
    decoder.ret_type(0)
}

struct Decoder<'a, 'r> {
    cursor: Cursor<'a>,
    names: &'r TypeNameResolver<'r>,
}

impl<'a, 'r> Decoder<'a, 'r> {
    /// Calling convention, generic arity and parameter count; returns the parameter count
    fn method_header(&mut self) -> CilResult<u32> {
        let convention = self.cursor.u8()?;
        if convention & GENERIC != 0 {
            self.cursor.compressed()?;
        }
        self.cursor.compressed()
    }

    fn ret_type(&mut self, depth: usize) -> CilResult<String> {
        self.skip_custom_mods()?;
        match self.cursor.peek()? {
            0x01 => {
                self.cursor.u8()?;
                Ok("void".to_string())
            }
            0x10 => {
                self.cursor.u8()?;
                Ok(format!("{}&", self.ty(depth + 1)?))
            }
            _ => self.ty(depth + 1),
        }
    }

    fn skip_custom_mods(&mut self) -> CilResult<()> {
        while matches!(self.cursor.peek()?, 0x1F | 0x20) {
            self.cursor.u8()?;
            self.cursor.compressed()?;
        }
        Ok(())
    }

    fn type_def_or_ref(&mut self) -> CilResult<String> {
        let encoded = self.cursor.compressed()?;
        let (table, row) = CodedIndex::TypeDefOrRef.decode(encoded).ok_or_else(|| {
            CilError::Malformed(format!("bad TypeDefOrRef encoding {:#x}", encoded))
        })?;
        Ok((self.names)(table, row).unwrap_or_else(|| format!("type#{:#04x}:{}", table, row)))
    }

    fn ty(&mut self, depth: usize) -> CilResult<String> {
        if depth > MAX_DEPTH {
            return Err(CilError::Malformed("signature nesting too deep".to_string()));
        }
        self.skip_custom_mods()?;

        let element = self.cursor.u8()?;
        let name = match element {
            0x01 => "void".to_string(),
            0x02 => "bool".to_string(),
            0x03 => "char".to_string(),
            0x04 => "int8".to_string(),
            0x05 => "uint8".to_string(),
            0x06 => "int16".to_string(),
            0x07 => "uint16".to_string(),
            0x08 => "int32".to_string(),
            0x09 => "uint32".to_string(),
            0x0A => "int64".to_string(),
            0x0B => "uint64".to_string(),
            0x0C => "float32".to_string(),
            0x0D => "float64".to_string(),
            0x0E => "string".to_string(),
            0x0F => format!("{}*", self.ty(depth + 1)?),
            0x10 => format!("{}&", self.ty(depth + 1)?),
            0x11 | 0x12 => self.type_def_or_ref()?,
            0x13 => format!("!{}", self.cursor.compressed()?),
            0x14 => {
                let element = self.ty(depth + 1)?;
                let rank = self.cursor.compressed()?;
                let sizes = self.cursor.compressed()?;
                for _ in 0..sizes {
                    self.cursor.compressed()?;
                }
                let bounds = self.cursor.compressed()?;
                for _ in 0..bounds {
                    self.cursor.compressed()?;
                }
                let commas = ",".repeat(rank.saturating_sub(1) as usize);
                format!("{}[{}]", element, commas)
            }
            0x15 => {
                let generic = self.ty(depth + 1)?;
                let count = self.cursor.compressed()?;
                let args = (0..count)
                    .map(|_| self.ty(depth + 1))
                    .collect::<CilResult<Vec<_>>>()?;
                format!("{}<{}>", generic, args.join(", "))
            }
            0x16 => "typedref".to_string(),
            0x18 => "native int".to_string(),
            0x19 => "native uint".to_string(),
            0x1B => {
                let params = self.method_header()?;
                let ret = self.ret_type(depth + 1)?;
                let mut args = Vec::new();
                for _ in 0..params {
                    if self.cursor.peek()? == 0x41 {
                        self.cursor.u8()?;
                        args.push("...".to_string());
                    }
                    args.push(self.param(depth + 1)?);
                }
                format!("method {} *({})", ret, args.join(", "))
            }
            0x1C => "object".to_string(),
            0x1D => format!("{}[]", self.ty(depth + 1)?),
            0x1E => format!("!!{}", self.cursor.compressed()?),
            0x45 => format!("{} pinned", self.ty(depth + 1)?),
            other => {
                return Err(CilError::Malformed(format!(
                    "unknown element type {:#04x} in signature",
                    other
                )))
            }
        };

        Ok(name)
    }

    fn param(&mut self, depth: usize) -> CilResult<String> {
        self.skip_custom_mods()?;
        match self.cursor.peek()? {
            0x16 => {
                self.cursor.u8()?;
                Ok("typedref".to_string())
            }
            _ => self.ty(depth),
        }
    }
}
