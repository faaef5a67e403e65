// src/codec/cil/mod.rs
//! Reads .NET assemblies (PE files with ECMA-335 metadata) into the symbol
//! model and writes them back by patching the original image in place.
//!
//! Only fixed-width flag cells and method body headers are ever rewritten, so
//! the metadata keeps its size, heaps and row order. Anything beyond that
//! (adding rows, re-encoding changed instruction streams) is rejected.

mod body;
mod bytes;
mod metadata;
mod pe;
mod schema;
mod signature;

#[cfg(test)]
pub(crate) mod testing;

use std::collections::HashMap;
use std::path::Path;

use tracing::{debug, info};

use self::body::{BodyLayout, EMPTY_TINY_HEADER};
use self::bytes::{write_u16, write_u32, CilError, CilResult};
use self::metadata::Metadata;
use self::pe::PeImage;
use self::schema::{
    CodedIndex, EVENT, EVENT_MAP, FIELD, METHOD_DEF, METHOD_SEMANTICS, MODULE, NESTED_CLASS,
    PROPERTY, PROPERTY_MAP, TYPE_DEF, TYPE_REF,
};
use super::ModuleCodec;
use crate::core::{
    EventSymbol, FieldSymbol, MemberAccess, MethodBody, MethodId, MethodSymbol, Module,
    PropertySymbol, TypeId, TypeSymbol, TypeVisibility,
};
use crate::error::{PublicizerError, Result};

const SEMANTICS_SETTER: u32 = 0x0001;
const SEMANTICS_GETTER: u32 = 0x0002;

/// `MethodImplAttributes.CodeTypeMask`; 0 means the body is CIL
const CODE_TYPE_MASK: u16 = 0x0003;

/// Codec for PE/ECMA-335 assemblies
pub struct CilCodec;

impl ModuleCodec for CilCodec {
    fn read(&self, path: &Path) -> Result<Module> {
        let data = std::fs::read(path).map_err(|e| PublicizerError::read(path, e))?;
        let module = load(&data).map_err(|e| PublicizerError::read(path, e))?;
        info!(
            "Read {} types from {} ({} bytes)",
            module.len(),
            path.display(),
            data.len()
        );
        Ok(module)
    }

    fn write(&self, module: &Module, path: &Path) -> Result<()> {
        let original = module.image().ok_or_else(|| {
            PublicizerError::write(path, "module was not read from a CIL image")
        })?;
        let patched = patch(module, original).map_err(|e| PublicizerError::write(path, e))?;
        std::fs::write(path, patched).map_err(|e| PublicizerError::write(path, e))?;
        Ok(())
    }

    fn format_name(&self) -> &str {
        "cil"
    }
}

struct Image<'a> {
    data: &'a [u8],
    pe: PeImage,
    metadata: Metadata<'a>,
}

impl<'a> Image<'a> {
    fn parse(data: &'a [u8]) -> CilResult<Self> {
        let pe = PeImage::parse(data)?;
        let root = pe.metadata_offset(data)?;
        let metadata = Metadata::parse(data, root)?;
        Ok(Self { data, pe, metadata })
    }

    fn rows(&self, table: u8) -> u32 {
        self.metadata.tables.rows(table)
    }

    /// `[start, end)` ranges of a list column, e.g. TypeDef.FieldList
    fn list_ranges(&self, owner: u8, column: usize, target: u8) -> CilResult<Vec<(u32, u32)>> {
        let owners = self.rows(owner);
        let limit = self.rows(target) + 1;
        let starts = (1..=owners)
            .map(|row| self.metadata.cell(owner, row, column))
            .collect::<CilResult<Vec<_>>>()?;

        let mut ranges = Vec::with_capacity(starts.len());
        for (i, start) in starts.iter().enumerate() {
            let end = starts.get(i + 1).copied().unwrap_or(limit);
            if *start == 0 || *start > end || end > limit {
                return Err(CilError::Malformed(format!(
                    "list of table {:#04x} row {} runs from {} to {}",
                    owner,
                    i + 1,
                    start,
                    end
                )));
            }
            ranges.push((*start, end));
        }
        Ok(ranges)
    }

    fn type_name(&self, table: u8, row: u32) -> Option<String> {
        let (name_column, namespace_column) = match table {
            TYPE_DEF | TYPE_REF => (1, 2),
            _ => return None,
        };
        let name = self
            .metadata
            .string(self.metadata.cell(table, row, name_column).ok()?)
            .ok()?;
        let namespace = self
            .metadata
            .string(self.metadata.cell(table, row, namespace_column).ok()?)
            .ok()?;
        Some(if namespace.is_empty() {
            name.to_string()
        } else {
            format!("{}.{}", namespace, name)
        })
    }

    fn method_body(&self, rva: u32) -> CilResult<(BodyLayout, &'a [u8])> {
        let offset = self.pe.rva_to_offset(rva)?;
        let layout = BodyLayout::parse(self.data, offset)?;
        Ok((layout, layout.code(self.data)?))
    }
}

fn token(table: u8, row: u32) -> u32 {
    ((table as u32) << 24) | row
}

fn token_row(token: u32, table: u8) -> CilResult<u32> {
    if token >> 24 != table as u32 {
        return Err(CilError::Malformed(format!(
            "token {:#010x} does not belong to table {:#04x}",
            token, table
        )));
    }
    Ok(token & 0x00FF_FFFF)
}

fn member_access(flags: u16, what: &str) -> CilResult<MemberAccess> {
    MemberAccess::from_flags(flags)
        .ok_or_else(|| CilError::Malformed(format!("{} has reserved access bits {:#06x}", what, flags)))
}

/// EventMap and PropertyMap rows must name an existing TypeDef row
fn check_parent(table: u8, parent: u32, type_count: u32) -> CilResult<()> {
    if parent == 0 || parent > type_count {
        return Err(CilError::Malformed(format!(
            "table {:#04x} names parent type row {} of {}",
            table, parent, type_count
        )));
    }
    Ok(())
}

/// Build the symbol model from an image
fn load(data: &[u8]) -> CilResult<Module> {
    let image = Image::parse(data)?;
    let md = &image.metadata;

    let module_name = if image.rows(MODULE) > 0 {
        md.string(md.cell(MODULE, 1, 1)?)?.to_string()
    } else {
        String::new()
    };

    let type_count = image.rows(TYPE_DEF);
    let field_ranges = image.list_ranges(TYPE_DEF, 4, FIELD)?;
    let method_ranges = image.list_ranges(TYPE_DEF, 5, METHOD_DEF)?;

    let mut method_owner = vec![0u32; image.rows(METHOD_DEF) as usize + 1];
    for (i, (start, end)) in method_ranges.iter().enumerate() {
        for row in *start..*end {
            method_owner[row as usize] = i as u32 + 1;
        }
    }

    // Events and properties grouped by declaring type row
    let mut events: HashMap<u32, Vec<EventSymbol>> = HashMap::new();
    let event_parents = (1..=image.rows(EVENT_MAP))
        .map(|row| md.cell(EVENT_MAP, row, 0))
        .collect::<CilResult<Vec<_>>>()?;
    for (parent, (start, end)) in event_parents
        .iter()
        .zip(image.list_ranges(EVENT_MAP, 1, EVENT)?)
    {
        check_parent(EVENT_MAP, *parent, type_count)?;
        for row in start..end {
            let name = md.string(md.cell(EVENT, row, 1)?)?;
            events.entry(*parent).or_default().push(EventSymbol::new(name));
        }
    }

    let mut property_owner: HashMap<u32, (u32, usize)> = HashMap::new();
    let mut properties: HashMap<u32, Vec<PropertySymbol>> = HashMap::new();
    let property_parents = (1..=image.rows(PROPERTY_MAP))
        .map(|row| md.cell(PROPERTY_MAP, row, 0))
        .collect::<CilResult<Vec<_>>>()?;
    for (parent, (start, end)) in property_parents
        .iter()
        .zip(image.list_ranges(PROPERTY_MAP, 1, PROPERTY)?)
    {
        check_parent(PROPERTY_MAP, *parent, type_count)?;
        for row in start..end {
            let name = md.string(md.cell(PROPERTY, row, 1)?)?;
            let list = properties.entry(*parent).or_default();
            property_owner.insert(row, (*parent, list.len()));
            list.push(PropertySymbol::new(name));
        }
    }

    for row in 1..=image.rows(METHOD_SEMANTICS) {
        let semantics = md.cell(METHOD_SEMANTICS, row, 0)?;
        let method = md.cell(METHOD_SEMANTICS, row, 1)?;
        let association = md.cell(METHOD_SEMANTICS, row, 2)?;

        let Some((PROPERTY, property_row)) = CodedIndex::HasSemantics.decode(association) else {
            continue;
        };
        let Some((owner, index)) = property_owner.get(&property_row).copied() else {
            continue;
        };
        // Accessors of another type cannot be expressed as a MethodId
        if method_owner.get(method as usize).copied() != Some(owner) {
            debug!("Ignoring accessor {} declared outside its property's type", method);
            continue;
        }
        let first = owner
            .checked_sub(1)
            .and_then(|i| method_ranges.get(i as usize))
            .map(|(start, _)| *start)
            .ok_or_else(|| {
                CilError::Malformed(format!("accessor {} has no declaring type", method))
            })?;
        let method_id = MethodId(method.checked_sub(first).ok_or_else(|| {
            CilError::Malformed(format!("accessor {} precedes its type's methods", method))
        })?);

        if let Some(property) = properties.get_mut(&owner).and_then(|list| list.get_mut(index)) {
            if semantics & SEMANTICS_GETTER != 0 {
                property.getter = Some(method_id);
            } else if semantics & SEMANTICS_SETTER != 0 {
                property.setter = Some(method_id);
            }
        }
    }

    // Nesting: NestedClass rows map nested -> enclosing
    let mut enclosing: HashMap<u32, u32> = HashMap::new();
    for row in 1..=image.rows(NESTED_CLASS) {
        let nested = md.cell(NESTED_CLASS, row, 0)?;
        let outer = md.cell(NESTED_CLASS, row, 1)?;
        if nested == 0 || nested > type_count || outer == 0 || outer > type_count {
            return Err(CilError::Malformed(format!(
                "NestedClass row {} links {} to {}",
                row, nested, outer
            )));
        }
        if enclosing.insert(nested, outer).is_some() {
            return Err(CilError::Malformed(format!(
                "type row {} has more than one enclosing type",
                nested
            )));
        }
    }

    let mut children: HashMap<u32, Vec<u32>> = HashMap::new();
    let mut roots = Vec::new();
    for row in 1..=type_count {
        match enclosing.get(&row) {
            Some(outer) => children.entry(*outer).or_default().push(row),
            None => roots.push(row),
        }
    }

    let mut module = Module::new(module_name);
    let mut pending: Vec<(Option<TypeId>, u32)> = roots.iter().rev().map(|r| (None, *r)).collect();
    let mut loaded = 0u32;

    while let Some((parent, row)) = pending.pop() {
        let index = row as usize - 1;
        let mut ty = type_symbol(&image, row, field_ranges[index], method_ranges[index])?;
        ty.events = events.remove(&row).unwrap_or_default();
        ty.properties = properties.remove(&row).unwrap_or_default();

        let id = match parent {
            None => module.add_type(ty),
            Some(parent) => module
                .add_nested_type(parent, ty)
                .ok_or_else(|| CilError::Malformed(format!("lost parent of type row {}", row)))?,
        };
        loaded += 1;

        if let Some(nested) = children.get(&row) {
            pending.extend(nested.iter().rev().map(|child| (Some(id), *child)));
        }
    }

    if loaded != type_count {
        return Err(CilError::Malformed(format!(
            "{} of {} types are caught in a nesting cycle",
            type_count - loaded,
            type_count
        )));
    }

    module.set_image(data.to_vec());
    Ok(module)
}

fn type_symbol(
    image: &Image<'_>,
    row: u32,
    fields: (u32, u32),
    methods: (u32, u32),
) -> CilResult<TypeSymbol> {
    let md = &image.metadata;
    let flags = md.cell(TYPE_DEF, row, 0)?;
    let name = md.string(md.cell(TYPE_DEF, row, 1)?)?;
    let namespace = md.string(md.cell(TYPE_DEF, row, 2)?)?;

    let mut ty = TypeSymbol::new(name, TypeVisibility::from_flags(flags)).with_namespace(namespace);
    ty.token = Some(token(TYPE_DEF, row));
    ty.attributes = flags & !TypeVisibility::MASK;

    for field_row in fields.0..fields.1 {
        let flags = md.cell(FIELD, field_row, 0)? as u16;
        let name = md.string(md.cell(FIELD, field_row, 1)?)?;
        let mut field = FieldSymbol::new(name, member_access(flags, name)?);
        field.token = Some(token(FIELD, field_row));
        field.attributes = flags & !MemberAccess::MASK;
        ty.fields.push(field);
    }

    let resolve = |table: u8, row: u32| image.type_name(table, row);
    for method_row in methods.0..methods.1 {
        let rva = md.cell(METHOD_DEF, method_row, 0)?;
        let impl_flags = md.cell(METHOD_DEF, method_row, 1)? as u16;
        let flags = md.cell(METHOD_DEF, method_row, 2)? as u16;
        let name = md.string(md.cell(METHOD_DEF, method_row, 3)?)?;
        let blob = md.blob(md.cell(METHOD_DEF, method_row, 4)?)?;

        let mut method = MethodSymbol::new(name, member_access(flags, name)?);
        method.token = Some(token(METHOD_DEF, method_row));
        method.attributes = flags & !MemberAccess::MASK;
        method.impl_attributes = impl_flags;
        method.return_type = signature::return_type(blob, &resolve)?;
        if rva != 0 && impl_flags & CODE_TYPE_MASK == 0 {
            let (_, code) = image.method_body(rva)?;
            method.body = Some(MethodBody::new(rva, code.to_vec()));
        }
        ty.add_method(method);
    }

    Ok(ty)
}

/// Copy the source image with the model's flags and stripped bodies applied
fn patch(module: &Module, original: &[u8]) -> CilResult<Vec<u8>> {
    let image = Image::parse(original)?;
    let tables = &image.metadata.tables;
    let mut out = original.to_vec();
    let mut stripped = 0usize;

    for (_, ty) in module.types() {
        let type_token = ty.token.ok_or_else(|| {
            CilError::Unsupported(format!("type {} has no metadata row", ty.full_name()))
        })?;
        let (offset, _) = tables.cell_offset(TYPE_DEF, token_row(type_token, TYPE_DEF)?, 0)?;
        write_u32(&mut out, offset, ty.flags())?;

        for field in &ty.fields {
            let field_token = field.token.ok_or_else(|| {
                CilError::Unsupported(format!("field {} has no metadata row", field.name))
            })?;
            let (offset, _) = tables.cell_offset(FIELD, token_row(field_token, FIELD)?, 0)?;
            write_u16(&mut out, offset, field.flags())?;
        }

        for method in &ty.methods {
            let method_token = method.token.ok_or_else(|| {
                CilError::Unsupported(format!("method {} has no metadata row", method.name))
            })?;
            let row = token_row(method_token, METHOD_DEF)?;
            let (offset, _) = tables.cell_offset(METHOD_DEF, row, 2)?;
            write_u16(&mut out, offset, method.flags())?;

            if let Some(body) = &method.body {
                if patch_body(&image, &mut out, row, method, body)? {
                    stripped += 1;
                }
            }
        }
    }

    debug!("Patched {} types, {} stripped bodies", module.len(), stripped);
    Ok(out)
}

/// Returns true when the body was replaced by an empty one
fn patch_body(
    image: &Image<'_>,
    out: &mut [u8],
    row: u32,
    method: &MethodSymbol,
    body: &MethodBody,
) -> CilResult<bool> {
    let rva = image.metadata.cell(METHOD_DEF, row, 0)?;
    if rva == 0 {
        if body.is_empty() {
            return Ok(false);
        }
        return Err(CilError::Unsupported(format!(
            "method {} gained a body",
            method.name
        )));
    }

    let (layout, code) = image.method_body(rva)?;
    if code == body.code.as_slice() {
        return Ok(false);
    }
    if !body.is_empty() {
        return Err(CilError::Unsupported(format!(
            "re-encoding the changed body of {}",
            method.name
        )));
    }

    out[layout.header_offset] = EMPTY_TINY_HEADER;
    Ok(true)
}
