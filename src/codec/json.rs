// src/codec/json.rs
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::ModuleCodec;
use crate::core::{
    EventSymbol, FieldSymbol, MemberAccess, MethodBody, MethodSymbol, Module, PropertySymbol,
    TypeId, TypeSymbol, TypeTreeFlattener, TypeVisibility,
};
use crate::error::{PublicizerError, Result};

/// Stores the symbol model as a nested JSON document
pub struct JsonCodec;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ModuleDocument {
    name: String,
    #[serde(default)]
    types: Vec<TypeDocument>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct TypeDocument {
    name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    namespace: String,
    visibility: TypeVisibility,
    #[serde(default)]
    attributes: u32,
    #[serde(default)]
    methods: Vec<MethodDocument>,
    #[serde(default)]
    fields: Vec<FieldDocument>,
    #[serde(default)]
    properties: Vec<PropertyDocument>,
    #[serde(default)]
    events: Vec<EventDocument>,
    #[serde(default)]
    nested_types: Vec<TypeDocument>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct MethodDocument {
    name: String,
    access: MemberAccess,
    #[serde(default)]
    attributes: u16,
    #[serde(default)]
    impl_attributes: u16,
    #[serde(default = "default_return_type")]
    return_type: String,
    #[serde(default)]
    body: Option<MethodBody>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct FieldDocument {
    name: String,
    access: MemberAccess,
    #[serde(default)]
    attributes: u16,
}

/// Accessors are referenced by the name of a method of the same type
#[derive(Debug, Clone, Serialize, Deserialize)]
struct PropertyDocument {
    name: String,
    #[serde(default)]
    getter: Option<String>,
    #[serde(default)]
    setter: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct EventDocument {
    name: String,
}

fn default_return_type() -> String {
    "void".to_string()
}

impl ModuleCodec for JsonCodec {
    fn read(&self, path: &Path) -> Result<Module> {
        let content =
            std::fs::read_to_string(path).map_err(|e| PublicizerError::read(path, e))?;
        let document: ModuleDocument =
            serde_json::from_str(&content).map_err(|e| PublicizerError::read(path, e))?;

        from_document(document).map_err(|reason| PublicizerError::read(path, reason))
    }

    fn write(&self, module: &Module, path: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(&to_document(module))
            .map_err(|e| PublicizerError::write(path, e))?;
        std::fs::write(path, content).map_err(|e| PublicizerError::write(path, e))?;
        Ok(())
    }

    fn format_name(&self) -> &str {
        "json"
    }
}

fn from_document(document: ModuleDocument) -> std::result::Result<Module, String> {
    let mut module = Module::new(document.name);
    let mut pending: Vec<(Option<TypeId>, TypeDocument)> =
        document.types.into_iter().rev().map(|t| (None, t)).collect();

    while let Some((parent, mut doc)) = pending.pop() {
        let children = std::mem::take(&mut doc.nested_types);
        let symbol = type_symbol(doc)?;
        debug!("Loaded type {}", symbol.full_name());

        let id = match parent {
            None => module.add_type(symbol),
            Some(parent) => module
                .add_nested_type(parent, symbol)
                .ok_or_else(|| "nested type lost its parent".to_string())?,
        };
        pending.extend(children.into_iter().rev().map(|c| (Some(id), c)));
    }

    Ok(module)
}

fn type_symbol(doc: TypeDocument) -> std::result::Result<TypeSymbol, String> {
    let mut ty = TypeSymbol::new(doc.name, doc.visibility).with_namespace(doc.namespace);
    ty.attributes = doc.attributes;

    for m in doc.methods {
        let mut method = MethodSymbol::new(m.name, m.access);
        method.attributes = m.attributes;
        method.impl_attributes = m.impl_attributes;
        method.return_type = m.return_type;
        method.body = m.body;
        ty.add_method(method);
    }

    for f in doc.fields {
        let mut field = FieldSymbol::new(f.name, f.access);
        field.attributes = f.attributes;
        ty.fields.push(field);
    }

    for p in doc.properties {
        let mut property = PropertySymbol::new(p.name);
        property.getter = resolve_accessor(&ty, &property.name, p.getter)?;
        property.setter = resolve_accessor(&ty, &property.name, p.setter)?;
        ty.properties.push(property);
    }

    ty.events = doc
        .events
        .into_iter()
        .map(|e| EventSymbol::new(e.name))
        .collect();

    Ok(ty)
}

fn resolve_accessor(
    ty: &TypeSymbol,
    property: &str,
    accessor: Option<String>,
) -> std::result::Result<Option<crate::core::MethodId>, String> {
    match accessor {
        None => Ok(None),
        Some(name) => ty.find_method(&name).map(Some).ok_or_else(|| {
            format!(
                "property {}.{} names unknown accessor {}",
                ty.full_name(),
                property,
                name
            )
        }),
    }
}

fn to_document(module: &Module) -> ModuleDocument {
    let order = TypeTreeFlattener::flatten(module);
    let mut docs: Vec<Option<TypeDocument>> = vec![None; module.len()];

    for (id, ty) in module.types() {
        docs[id.to_raw() as usize] = Some(type_document(ty));
    }

    // Children precede their parent in reverse pre-order
    for id in order.iter().rev() {
        let Some(ty) = module.get(*id) else {
            continue;
        };
        let nested: Vec<TypeDocument> = ty
            .nested_types()
            .iter()
            .filter_map(|child| docs[child.to_raw() as usize].take())
            .collect();
        if let Some(doc) = docs[id.to_raw() as usize].as_mut() {
            doc.nested_types = nested;
        }
    }

    ModuleDocument {
        name: module.name.clone(),
        types: module
            .roots()
            .iter()
            .filter_map(|root| docs[root.to_raw() as usize].take())
            .collect(),
    }
}

fn type_document(ty: &TypeSymbol) -> TypeDocument {
    let accessor_name = |id: Option<crate::core::MethodId>| {
        id.and_then(|id| ty.method(id)).map(|m| m.name.clone())
    };

    TypeDocument {
        name: ty.name.clone(),
        namespace: ty.namespace.clone(),
        visibility: ty.visibility,
        attributes: ty.attributes,
        methods: ty
            .methods
            .iter()
            .map(|m| MethodDocument {
                name: m.name.clone(),
                access: m.access,
                attributes: m.attributes,
                impl_attributes: m.impl_attributes,
                return_type: m.return_type.clone(),
                body: m.body.clone(),
            })
            .collect(),
        fields: ty
            .fields
            .iter()
            .map(|f| FieldDocument {
                name: f.name.clone(),
                access: f.access,
                attributes: f.attributes,
            })
            .collect(),
        properties: ty
            .properties
            .iter()
            .map(|p| PropertyDocument {
                name: p.name.clone(),
                getter: accessor_name(p.getter),
                setter: accessor_name(p.setter),
            })
            .collect(),
        events: ty
            .events
            .iter()
            .map(|e| EventDocument {
                name: e.name.clone(),
            })
            .collect(),
        nested_types: Vec::new(),
    }
}
