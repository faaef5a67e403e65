// src/codec/cil/testing.rs
//! Builds small PE32 images with CLI metadata for codec tests.

use std::collections::BTreeMap;

use super::schema::{
    EVENT, EVENT_MAP, FIELD, METHOD_DEF, METHOD_SEMANTICS, MODULE, NESTED_CLASS, PROPERTY,
    PROPERTY_MAP, TYPE_DEF,
};

const TEXT_RVA: u32 = 0x2000;
const TEXT_RAW: usize = 0x200;
const CLI_HEADER_SIZE: usize = 72;

pub struct TestMethod {
    name: String,
    flags: u16,
    code: Option<Vec<u8>>,
    ret: u8,
    fat: bool,
}

impl TestMethod {
    pub fn new(name: &str, flags: u16, code: Vec<u8>) -> Self {
        Self {
            name: name.to_string(),
            flags,
            code: Some(code),
            ret: 0x01,
            fat: false,
        }
    }

    pub fn abstract_method(name: &str, flags: u16) -> Self {
        Self {
            code: None,
            ..Self::new(name, flags, Vec::new())
        }
    }

    pub fn returns(mut self, element: u8) -> Self {
        self.ret = element;
        self
    }

    pub fn fat(mut self) -> Self {
        self.fat = true;
        self
    }
}

pub struct TestProperty {
    name: String,
    getter: Option<usize>,
    setter: Option<usize>,
}

impl TestProperty {
    /// Accessors are indices into the declaring type's methods
    pub fn new(name: &str, getter: Option<usize>, setter: Option<usize>) -> Self {
        Self {
            name: name.to_string(),
            getter,
            setter,
        }
    }
}

pub struct TestType {
    namespace: String,
    name: String,
    flags: u32,
    fields: Vec<(String, u16)>,
    methods: Vec<TestMethod>,
    properties: Vec<TestProperty>,
    events: Vec<String>,
    enclosing: Option<usize>,
}

impl TestType {
    pub fn new(namespace: &str, name: &str, flags: u32) -> Self {
        Self {
            namespace: namespace.to_string(),
            name: name.to_string(),
            flags,
            fields: Vec::new(),
            methods: Vec::new(),
            properties: Vec::new(),
            events: Vec::new(),
            enclosing: None,
        }
    }

    pub fn field(mut self, name: &str, flags: u16) -> Self {
        self.fields.push((name.to_string(), flags));
        self
    }

    pub fn method(mut self, method: TestMethod) -> Self {
        self.methods.push(method);
        self
    }

    pub fn property(mut self, property: TestProperty) -> Self {
        self.properties.push(property);
        self
    }

    pub fn event(mut self, name: &str) -> Self {
        self.events.push(name.to_string());
        self
    }

    /// Nest inside the type added at `index` (not counting `<Module>`)
    pub fn nested_in(mut self, index: usize) -> Self {
        self.enclosing = Some(index);
        self
    }
}

pub struct ImageBuilder {
    module: String,
    types: Vec<TestType>,
}

struct Heaps {
    strings: Vec<u8>,
    blob: Vec<u8>,
}

impl Heaps {
    fn string(&mut self, value: &str) -> u16 {
        if value.is_empty() {
            return 0;
        }
        let at = self.strings.len();
        self.strings.extend_from_slice(value.as_bytes());
        self.strings.push(0);
        at as u16
    }

    fn blob(&mut self, value: &[u8]) -> u16 {
        let at = self.blob.len();
        self.blob.push(value.len() as u8);
        self.blob.extend_from_slice(value);
        at as u16
    }
}

#[derive(Default)]
struct TableWriter {
    tables: BTreeMap<u8, (u32, Vec<u8>)>,
}

impl TableWriter {
    fn row(&mut self, table: u8) -> &mut Vec<u8> {
        let entry = self.tables.entry(table).or_default();
        entry.0 += 1;
        &mut entry.1
    }

    fn stream(&self) -> Vec<u8> {
        let mut out = Vec::new();
        put32(&mut out, 0);
        out.extend_from_slice(&[2, 0, 0, 1]);
        let valid = self.tables.keys().fold(0u64, |mask, t| mask | (1u64 << t));
        out.extend_from_slice(&valid.to_le_bytes());
        out.extend_from_slice(&0u64.to_le_bytes());
        for (rows, _) in self.tables.values() {
            put32(&mut out, *rows);
        }
        for (_, bytes) in self.tables.values() {
            out.extend_from_slice(bytes);
        }
        out
    }
}

fn put16(out: &mut Vec<u8>, value: u16) {
    out.extend_from_slice(&value.to_le_bytes());
}

fn put32(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_le_bytes());
}

fn set16(out: &mut [u8], offset: usize, value: u16) {
    out[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
}

fn set32(out: &mut [u8], offset: usize, value: u32) {
    out[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

fn pad4(out: &mut Vec<u8>) {
    while out.len() % 4 != 0 {
        out.push(0);
    }
}

impl ImageBuilder {
    pub fn new(module: &str) -> Self {
        Self {
            module: module.to_string(),
            types: Vec::new(),
        }
    }

    pub fn add_type(mut self, ty: TestType) -> Self {
        self.types.push(ty);
        self
    }

    pub fn build(self) -> Vec<u8> {
        let mut heaps = Heaps {
            strings: vec![0],
            blob: vec![0],
        };
        let mut tables = TableWriter::default();
        let mut text = vec![0u8; CLI_HEADER_SIZE];

        let name = heaps.string(&self.module);
        let row = tables.row(MODULE);
        put16(row, 0);
        put16(row, name);
        put16(row, 1);
        put16(row, 0);
        put16(row, 0);

        let module_type = heaps.string("<Module>");
        let row = tables.row(TYPE_DEF);
        put32(row, 0);
        put16(row, module_type);
        put16(row, 0);
        put16(row, 0);
        put16(row, 1);
        put16(row, 1);

        let (mut next_field, mut next_method, mut next_event, mut next_property) = (1, 1, 1, 1);
        for (i, ty) in self.types.iter().enumerate() {
            let type_row = i as u16 + 2;
            let name = heaps.string(&ty.name);
            let namespace = heaps.string(&ty.namespace);
            let row = tables.row(TYPE_DEF);
            put32(row, ty.flags);
            put16(row, name);
            put16(row, namespace);
            put16(row, 0);
            put16(row, next_field);
            put16(row, next_method);

            for (field, flags) in &ty.fields {
                let name = heaps.string(field);
                let signature = heaps.blob(&[0x06, 0x08]);
                let row = tables.row(FIELD);
                put16(row, *flags);
                put16(row, name);
                put16(row, signature);
                next_field += 1;
            }

            let first_method = next_method;
            for method in &ty.methods {
                let rva = match &method.code {
                    Some(code) => {
                        pad4(&mut text);
                        let rva = TEXT_RVA + text.len() as u32;
                        if method.fat {
                            put16(&mut text, 0x3003);
                            put16(&mut text, 8);
                            put32(&mut text, code.len() as u32);
                            put32(&mut text, 0);
                        } else {
                            text.push(((code.len() as u8) << 2) | 0x2);
                        }
                        text.extend_from_slice(code);
                        rva
                    }
                    None => 0,
                };
                let name = heaps.string(&method.name);
                let signature = heaps.blob(&[0x20, 0x00, method.ret]);
                let row = tables.row(METHOD_DEF);
                put32(row, rva);
                put16(row, 0);
                put16(row, method.flags);
                put16(row, name);
                put16(row, signature);
                put16(row, 1);
                next_method += 1;
            }

            if !ty.events.is_empty() {
                let row = tables.row(EVENT_MAP);
                put16(row, type_row);
                put16(row, next_event);
                for event in &ty.events {
                    let name = heaps.string(event);
                    let row = tables.row(EVENT);
                    put16(row, 0);
                    put16(row, name);
                    put16(row, 0);
                    next_event += 1;
                }
            }

            if !ty.properties.is_empty() {
                let row = tables.row(PROPERTY_MAP);
                put16(row, type_row);
                put16(row, next_property);
                for property in &ty.properties {
                    let name = heaps.string(&property.name);
                    let signature = heaps.blob(&[0x28, 0x00, 0x08]);
                    let row = tables.row(PROPERTY);
                    put16(row, 0);
                    put16(row, name);
                    put16(row, signature);

                    let association = (next_property << 1) | 1;
                    for (semantics, accessor) in [(0x2, property.getter), (0x1, property.setter)] {
                        if let Some(index) = accessor {
                            let row = tables.row(METHOD_SEMANTICS);
                            put16(row, semantics);
                            put16(row, first_method + index as u16);
                            put16(row, association);
                        }
                    }
                    next_property += 1;
                }
            }
        }

        for (i, ty) in self.types.iter().enumerate() {
            if let Some(outer) = ty.enclosing {
                let row = tables.row(NESTED_CLASS);
                put16(row, i as u16 + 2);
                put16(row, outer as u16 + 2);
            }
        }

        pad4(&mut text);
        let metadata_rva = TEXT_RVA + text.len() as u32;
        let metadata = metadata_root(vec![
            ("#~", tables.stream()),
            ("#Strings", heaps.strings),
            ("#GUID", vec![0xAB; 16]),
            ("#Blob", heaps.blob),
        ]);
        let metadata_size = metadata.len() as u32;
        text.extend_from_slice(&metadata);

        set32(&mut text, 0, CLI_HEADER_SIZE as u32);
        set16(&mut text, 4, 2);
        set16(&mut text, 6, 5);
        set32(&mut text, 8, metadata_rva);
        set32(&mut text, 12, metadata_size);
        set32(&mut text, 16, 1);

        let virtual_size = text.len() as u32;
        while text.len() % TEXT_RAW != 0 {
            text.push(0);
        }
        let mut image = pe_headers(virtual_size, text.len() as u32);
        image.extend_from_slice(&text);
        image
    }
}

fn metadata_root(mut streams: Vec<(&str, Vec<u8>)>) -> Vec<u8> {
    let version = b"v4.0.30319\0\0";
    for (_, body) in streams.iter_mut() {
        pad4(body);
    }

    let headers: usize = streams
        .iter()
        .map(|(name, _)| 8 + (name.len() + 4) / 4 * 4)
        .sum();
    let mut offset = 16 + version.len() + 4 + headers;

    let mut out = Vec::new();
    put32(&mut out, 0x424A_5342);
    put16(&mut out, 1);
    put16(&mut out, 1);
    put32(&mut out, 0);
    put32(&mut out, version.len() as u32);
    out.extend_from_slice(version);
    put16(&mut out, 0);
    put16(&mut out, streams.len() as u16);
    for (name, body) in &streams {
        put32(&mut out, offset as u32);
        put32(&mut out, body.len() as u32);
        out.extend_from_slice(name.as_bytes());
        out.push(0);
        pad4(&mut out);
        offset += body.len();
    }
    for (_, body) in &streams {
        out.extend_from_slice(body);
    }
    out
}

fn pe_headers(virtual_size: u32, raw_size: u32) -> Vec<u8> {
    let mut out = vec![0u8; TEXT_RAW];
    out[0..2].copy_from_slice(b"MZ");
    set32(&mut out, 0x3C, 0x80);
    out[0x80..0x84].copy_from_slice(b"PE\0\0");

    let coff = 0x84;
    set16(&mut out, coff, 0x14C);
    set16(&mut out, coff + 2, 1);
    set16(&mut out, coff + 16, 0xE0);
    set16(&mut out, coff + 18, 0x2102);

    let optional = coff + 20;
    set16(&mut out, optional, 0x10B);
    set32(&mut out, optional + 92, 16);
    set32(&mut out, optional + 96 + 14 * 8, TEXT_RVA);
    set32(&mut out, optional + 96 + 14 * 8 + 4, CLI_HEADER_SIZE as u32);

    let section = optional + 0xE0;
    out[section..section + 5].copy_from_slice(b".text");
    set32(&mut out, section + 8, virtual_size);
    set32(&mut out, section + 12, TEXT_RVA);
    set32(&mut out, section + 16, raw_size);
    set32(&mut out, section + 20, TEXT_RAW as u32);
    out
}
