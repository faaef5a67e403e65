// src/codec/cil/schema.rs
//! Column layout of the ECMA-335 metadata tables (Partition II, chapter 22).

pub const MODULE: u8 = 0x00;
pub const TYPE_REF: u8 = 0x01;
pub const TYPE_DEF: u8 = 0x02;
pub const FIELD_PTR: u8 = 0x03;
pub const FIELD: u8 = 0x04;
pub const METHOD_PTR: u8 = 0x05;
pub const METHOD_DEF: u8 = 0x06;
pub const PARAM_PTR: u8 = 0x07;
pub const PARAM: u8 = 0x08;
pub const INTERFACE_IMPL: u8 = 0x09;
pub const MEMBER_REF: u8 = 0x0A;
pub const CONSTANT: u8 = 0x0B;
pub const CUSTOM_ATTRIBUTE: u8 = 0x0C;
pub const FIELD_MARSHAL: u8 = 0x0D;
pub const DECL_SECURITY: u8 = 0x0E;
pub const CLASS_LAYOUT: u8 = 0x0F;
pub const FIELD_LAYOUT: u8 = 0x10;
pub const STAND_ALONE_SIG: u8 = 0x11;
pub const EVENT_MAP: u8 = 0x12;
pub const EVENT_PTR: u8 = 0x13;
pub const EVENT: u8 = 0x14;
pub const PROPERTY_MAP: u8 = 0x15;
pub const PROPERTY_PTR: u8 = 0x16;
pub const PROPERTY: u8 = 0x17;
pub const METHOD_SEMANTICS: u8 = 0x18;
pub const METHOD_IMPL: u8 = 0x19;
pub const MODULE_REF: u8 = 0x1A;
pub const TYPE_SPEC: u8 = 0x1B;
pub const IMPL_MAP: u8 = 0x1C;
pub const FIELD_RVA: u8 = 0x1D;
pub const ENC_LOG: u8 = 0x1E;
pub const ENC_MAP: u8 = 0x1F;
pub const ASSEMBLY: u8 = 0x20;
pub const ASSEMBLY_PROCESSOR: u8 = 0x21;
pub const ASSEMBLY_OS: u8 = 0x22;
pub const ASSEMBLY_REF: u8 = 0x23;
pub const ASSEMBLY_REF_PROCESSOR: u8 = 0x24;
pub const ASSEMBLY_REF_OS: u8 = 0x25;
pub const FILE: u8 = 0x26;
pub const EXPORTED_TYPE: u8 = 0x27;
pub const MANIFEST_RESOURCE: u8 = 0x28;
pub const NESTED_CLASS: u8 = 0x29;
pub const GENERIC_PARAM: u8 = 0x2A;
pub const METHOD_SPEC: u8 = 0x2B;
pub const GENERIC_PARAM_CONSTRAINT: u8 = 0x2C;

/// Number of tables a `#~` stream of a module may contain
pub const TABLE_COUNT: usize = 0x2D;

/// Tables that only appear in unoptimized (`#-`) metadata
pub const POINTER_TABLES: [u8; 5] = [FIELD_PTR, METHOD_PTR, PARAM_PTR, EVENT_PTR, PROPERTY_PTR];

/// Unused slot inside a coded index tag space
const NONE: u8 = 0xFF;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodedIndex {
    TypeDefOrRef,
    HasConstant,
    HasCustomAttribute,
    HasFieldMarshal,
    HasDeclSecurity,
    MemberRefParent,
    HasSemantics,
    MethodDefOrRef,
    MemberForwarded,
    Implementation,
    CustomAttributeType,
    ResolutionScope,
    TypeOrMethodDef,
}

impl CodedIndex {
    pub fn tag_bits(self) -> u32 {
        match self {
            Self::TypeDefOrRef => 2,
            Self::HasConstant => 2,
            Self::HasCustomAttribute => 5,
            Self::HasFieldMarshal => 1,
            Self::HasDeclSecurity => 2,
            Self::MemberRefParent => 3,
            Self::HasSemantics => 1,
            Self::MethodDefOrRef => 1,
            Self::MemberForwarded => 1,
            Self::Implementation => 2,
            Self::CustomAttributeType => 3,
            Self::ResolutionScope => 2,
            Self::TypeOrMethodDef => 1,
        }
    }

    /// Tables addressed by each tag value, `NONE` for unused tags
    pub fn tables(self) -> &'static [u8] {
        match self {
            Self::TypeDefOrRef => &[TYPE_DEF, TYPE_REF, TYPE_SPEC],
            Self::HasConstant => &[FIELD, PARAM, PROPERTY],
            Self::HasCustomAttribute => &[
                METHOD_DEF,
                FIELD,
                TYPE_REF,
                TYPE_DEF,
                PARAM,
                INTERFACE_IMPL,
                MEMBER_REF,
                MODULE,
                DECL_SECURITY,
                PROPERTY,
                EVENT,
                STAND_ALONE_SIG,
                MODULE_REF,
                TYPE_SPEC,
                ASSEMBLY,
                ASSEMBLY_REF,
                FILE,
                EXPORTED_TYPE,
                MANIFEST_RESOURCE,
                GENERIC_PARAM,
                GENERIC_PARAM_CONSTRAINT,
                METHOD_SPEC,
            ],
            Self::HasFieldMarshal => &[FIELD, PARAM],
            Self::HasDeclSecurity => &[TYPE_DEF, METHOD_DEF, ASSEMBLY],
            Self::MemberRefParent => &[TYPE_DEF, TYPE_REF, MODULE_REF, METHOD_DEF, TYPE_SPEC],
            Self::HasSemantics => &[EVENT, PROPERTY],
            Self::MethodDefOrRef => &[METHOD_DEF, MEMBER_REF],
            Self::MemberForwarded => &[FIELD, METHOD_DEF],
            Self::Implementation => &[FILE, ASSEMBLY_REF, EXPORTED_TYPE],
            Self::CustomAttributeType => &[NONE, NONE, METHOD_DEF, MEMBER_REF, NONE],
            Self::ResolutionScope => &[MODULE, MODULE_REF, ASSEMBLY_REF, TYPE_REF],
            Self::TypeOrMethodDef => &[TYPE_DEF, METHOD_DEF],
        }
    }

    /// Width in bytes given the row counts of every table
    pub fn width(self, rows: &[u32; TABLE_COUNT]) -> usize {
        let largest = self
            .tables()
            .iter()
            .filter(|t| **t != NONE)
            .map(|t| rows[*t as usize])
            .max()
            .unwrap_or(0);

        if largest < (1u32 << (16 - self.tag_bits())) {
            2
        } else {
            4
        }
    }

    /// Split a coded value into (table, row); `None` for an unused tag
    pub fn decode(self, value: u32) -> Option<(u8, u32)> {
        let bits = self.tag_bits();
        let tag = (value & ((1 << bits) - 1)) as usize;
        let table = *self.tables().get(tag)?;
        if table == NONE {
            return None;
        }
        Some((table, value >> bits))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Column {
    U16,
    U32,
    Str,
    Guid,
    Blob,
    Index(u8),
    Coded(CodedIndex),
}

use CodedIndex as C;
use Column::*;

pub fn columns(table: u8) -> &'static [Column] {
    match table {
        MODULE => &[U16, Str, Guid, Guid, Guid],
        TYPE_REF => &[Coded(C::ResolutionScope), Str, Str],
        TYPE_DEF => &[U32, Str, Str, Coded(C::TypeDefOrRef), Index(FIELD), Index(METHOD_DEF)],
        FIELD_PTR => &[Index(FIELD)],
        FIELD => &[U16, Str, Blob],
        METHOD_PTR => &[Index(METHOD_DEF)],
        METHOD_DEF => &[U32, U16, U16, Str, Blob, Index(PARAM)],
        PARAM_PTR => &[Index(PARAM)],
        PARAM => &[U16, U16, Str],
        INTERFACE_IMPL => &[Index(TYPE_DEF), Coded(C::TypeDefOrRef)],
        MEMBER_REF => &[Coded(C::MemberRefParent), Str, Blob],
        // Type is one byte followed by a padding byte
        CONSTANT => &[U16, Coded(C::HasConstant), Blob],
        CUSTOM_ATTRIBUTE => &[Coded(C::HasCustomAttribute), Coded(C::CustomAttributeType), Blob],
        FIELD_MARSHAL => &[Coded(C::HasFieldMarshal), Blob],
        DECL_SECURITY => &[U16, Coded(C::HasDeclSecurity), Blob],
        CLASS_LAYOUT => &[U16, U32, Index(TYPE_DEF)],
        FIELD_LAYOUT => &[U32, Index(FIELD)],
        STAND_ALONE_SIG => &[Blob],
        EVENT_MAP => &[Index(TYPE_DEF), Index(EVENT)],
        EVENT_PTR => &[Index(EVENT)],
        EVENT => &[U16, Str, Coded(C::TypeDefOrRef)],
        PROPERTY_MAP => &[Index(TYPE_DEF), Index(PROPERTY)],
        PROPERTY_PTR => &[Index(PROPERTY)],
        PROPERTY => &[U16, Str, Blob],
        METHOD_SEMANTICS => &[U16, Index(METHOD_DEF), Coded(C::HasSemantics)],
        METHOD_IMPL => &[Index(TYPE_DEF), Coded(C::MethodDefOrRef), Coded(C::MethodDefOrRef)],
        MODULE_REF => &[Str],
        TYPE_SPEC => &[Blob],
        IMPL_MAP => &[U16, Coded(C::MemberForwarded), Str, Index(MODULE_REF)],
        FIELD_RVA => &[U32, Index(FIELD)],
        ENC_LOG => &[U32, U32],
        ENC_MAP => &[U32],
        ASSEMBLY => &[U32, U16, U16, U16, U16, U32, Blob, Str, Str],
        ASSEMBLY_PROCESSOR => &[U32],
        ASSEMBLY_OS => &[U32, U32, U32],
        ASSEMBLY_REF => &[U16, U16, U16, U16, U32, Blob, Str, Str, Blob],
        ASSEMBLY_REF_PROCESSOR => &[U32, Index(ASSEMBLY_REF)],
        ASSEMBLY_REF_OS => &[U32, U32, U32, Index(ASSEMBLY_REF)],
        FILE => &[U32, Str, Blob],
        EXPORTED_TYPE => &[U32, U32, Str, Str, Coded(C::Implementation)],
        MANIFEST_RESOURCE => &[U32, U32, Str, Coded(C::Implementation)],
        NESTED_CLASS => &[Index(TYPE_DEF), Index(TYPE_DEF)],
        GENERIC_PARAM => &[U16, U16, Coded(C::TypeOrMethodDef), Str],
        METHOD_SPEC => &[Coded(C::MethodDefOrRef), Blob],
        GENERIC_PARAM_CONSTRAINT => &[Index(GENERIC_PARAM), Coded(C::TypeDefOrRef)],
        _ => &[],
    }
}
