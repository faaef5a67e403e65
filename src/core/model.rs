//! In-memory symbol model of a managed module.
//!
//! Types live in an arena owned by [`Module`] and are addressed by [`TypeId`].
//! A nested type can only be attached under a type that already exists, so
//! the nesting relation is always a tree rooted at the module.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable index of a type inside its [`Module`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeId(u32);

impl TypeId {
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    pub const fn to_raw(self) -> u32 {
        self.0
    }

    fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for TypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeId({})", self.0)
    }
}

/// Index of a method inside the `methods` of its declaring type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MethodId(pub u32);

impl MethodId {
    fn index(self) -> usize {
        self.0 as usize
    }
}

/// The 3-bit type visibility field of ECMA-335 `TypeAttributes`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TypeVisibility {
    NotPublic,
    Public,
    NestedPublic,
    NestedPrivate,
    NestedFamily,
    NestedAssembly,
    NestedFamAndAssem,
    NestedFamOrAssem,
}

impl TypeVisibility {
    pub const MASK: u32 = 0x7;

    pub fn from_flags(flags: u32) -> Self {
        match flags & Self::MASK {
            0 => Self::NotPublic,
            1 => Self::Public,
            2 => Self::NestedPublic,
            3 => Self::NestedPrivate,
            4 => Self::NestedFamily,
            5 => Self::NestedAssembly,
            6 => Self::NestedFamAndAssem,
            _ => Self::NestedFamOrAssem,
        }
    }

    pub fn bits(self) -> u32 {
        match self {
            Self::NotPublic => 0,
            Self::Public => 1,
            Self::NestedPublic => 2,
            Self::NestedPrivate => 3,
            Self::NestedFamily => 4,
            Self::NestedAssembly => 5,
            Self::NestedFamAndAssem => 6,
            Self::NestedFamOrAssem => 7,
        }
    }
}

/// The 3-bit member access field shared by `MethodAttributes` and `FieldAttributes`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemberAccess {
    CompilerControlled,
    Private,
    FamAndAssem,
    Assembly,
    Family,
    FamOrAssem,
    Public,
}

impl MemberAccess {
    pub const MASK: u16 = 0x7;

    /// Returns `None` for the reserved value 7.
    pub fn from_flags(flags: u16) -> Option<Self> {
        match flags & Self::MASK {
            0 => Some(Self::CompilerControlled),
            1 => Some(Self::Private),
            2 => Some(Self::FamAndAssem),
            3 => Some(Self::Assembly),
            4 => Some(Self::Family),
            5 => Some(Self::FamOrAssem),
            6 => Some(Self::Public),
            _ => None,
        }
    }

    pub fn bits(self) -> u16 {
        match self {
            Self::CompilerControlled => 0,
            Self::Private => 1,
            Self::FamAndAssem => 2,
            Self::Assembly => 3,
            Self::Family => 4,
            Self::FamOrAssem => 5,
            Self::Public => 6,
        }
    }
}

/// Executable content of a method, opaque apart from stripping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodBody {
    /// Relative virtual address of the body header in the source image (0 when unknown)
    #[serde(default)]
    pub rva: u32,

    /// Instruction stream without the body header
    pub code: Vec<u8>,
}

impl MethodBody {
    pub fn new(rva: u32, code: Vec<u8>) -> Self {
        Self { rva, code }
    }

    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodSymbol {
    /// Metadata token in the source image
    pub token: Option<u32>,
    pub name: String,
    pub access: MemberAccess,
    /// Remaining `MethodAttributes` bits, access bits excluded
    pub attributes: u16,
    pub impl_attributes: u16,
    pub return_type: String,
    pub body: Option<MethodBody>,
}

impl MethodSymbol {
    pub fn new(name: impl Into<String>, access: MemberAccess) -> Self {
        Self {
            token: None,
            name: name.into(),
            access,
            attributes: 0,
            impl_attributes: 0,
            return_type: "void".to_string(),
            body: None,
        }
    }

    pub fn is_public(&self) -> bool {
        self.access == MemberAccess::Public
    }

    /// Full `MethodAttributes` word with the current access
    pub fn flags(&self) -> u16 {
        (self.attributes & !MemberAccess::MASK) | self.access.bits()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSymbol {
    pub token: Option<u32>,
    pub name: String,
    pub access: MemberAccess,
    /// Remaining `FieldAttributes` bits, access bits excluded
    pub attributes: u16,
}

impl FieldSymbol {
    pub fn new(name: impl Into<String>, access: MemberAccess) -> Self {
        Self {
            token: None,
            name: name.into(),
            access,
            attributes: 0,
        }
    }

    pub fn is_public(&self) -> bool {
        self.access == MemberAccess::Public
    }

    pub fn flags(&self) -> u16 {
        (self.attributes & !MemberAccess::MASK) | self.access.bits()
    }
}

/// A property and the methods of its declaring type that implement it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertySymbol {
    pub name: String,
    pub getter: Option<MethodId>,
    pub setter: Option<MethodId>,
}

impl PropertySymbol {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            getter: None,
            setter: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventSymbol {
    pub name: String,
}

impl EventSymbol {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeSymbol {
    pub token: Option<u32>,
    pub name: String,
    pub namespace: String,
    pub visibility: TypeVisibility,
    /// Remaining `TypeAttributes` bits, visibility bits excluded
    pub attributes: u32,
    pub methods: Vec<MethodSymbol>,
    pub fields: Vec<FieldSymbol>,
    pub properties: Vec<PropertySymbol>,
    pub events: Vec<EventSymbol>,
    parent: Option<TypeId>,
    nested: Vec<TypeId>,
}

impl TypeSymbol {
    pub fn new(name: impl Into<String>, visibility: TypeVisibility) -> Self {
        Self {
            token: None,
            name: name.into(),
            namespace: String::new(),
            visibility,
            attributes: 0,
            methods: Vec::new(),
            fields: Vec::new(),
            properties: Vec::new(),
            events: Vec::new(),
            parent: None,
            nested: Vec::new(),
        }
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn is_nested(&self) -> bool {
        self.parent.is_some()
    }

    pub fn is_public(&self) -> bool {
        self.visibility == TypeVisibility::Public
    }

    pub fn is_nested_public(&self) -> bool {
        self.visibility == TypeVisibility::NestedPublic
    }

    pub fn parent(&self) -> Option<TypeId> {
        self.parent
    }

    pub fn nested_types(&self) -> &[TypeId] {
        &self.nested
    }

    pub fn flags(&self) -> u32 {
        (self.attributes & !TypeVisibility::MASK) | self.visibility.bits()
    }

    pub fn full_name(&self) -> String {
        if self.namespace.is_empty() {
            self.name.clone()
        } else {
            format!("{}.{}", self.namespace, self.name)
        }
    }

    pub fn add_method(&mut self, method: MethodSymbol) -> MethodId {
        self.methods.push(method);
        MethodId((self.methods.len() - 1) as u32)
    }

    pub fn method(&self, id: MethodId) -> Option<&MethodSymbol> {
        self.methods.get(id.index())
    }

    pub fn method_mut(&mut self, id: MethodId) -> Option<&mut MethodSymbol> {
        self.methods.get_mut(id.index())
    }

    /// Find a method by name, first match in declaration order
    pub fn find_method(&self, name: &str) -> Option<MethodId> {
        self.methods
            .iter()
            .position(|m| m.name == name)
            .map(|i| MethodId(i as u32))
    }
}

/// Root of the symbol model for one input.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Module {
    pub name: String,
    types: Vec<TypeSymbol>,
    roots: Vec<TypeId>,
    image: Option<Vec<u8>>,
}

impl Module {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Attach a top-level type
    pub fn add_type(&mut self, mut ty: TypeSymbol) -> TypeId {
        ty.parent = None;
        let id = self.alloc(ty);
        self.roots.push(id);
        id
    }

    /// Attach a type nested in `parent`; `None` if `parent` is not part of this module
    pub fn add_nested_type(&mut self, parent: TypeId, mut ty: TypeSymbol) -> Option<TypeId> {
        if parent.index() >= self.types.len() {
            return None;
        }
        ty.parent = Some(parent);
        let id = self.alloc(ty);
        self.types[parent.index()].nested.push(id);
        Some(id)
    }

    fn alloc(&mut self, mut ty: TypeSymbol) -> TypeId {
        ty.nested.clear();
        let id = TypeId(self.types.len() as u32);
        self.types.push(ty);
        id
    }

    pub fn roots(&self) -> &[TypeId] {
        &self.roots
    }

    pub fn get(&self, id: TypeId) -> Option<&TypeSymbol> {
        self.types.get(id.index())
    }

    pub fn get_mut(&mut self, id: TypeId) -> Option<&mut TypeSymbol> {
        self.types.get_mut(id.index())
    }

    /// All types in allocation order
    pub fn types(&self) -> impl Iterator<Item = (TypeId, &TypeSymbol)> {
        self.types
            .iter()
            .enumerate()
            .map(|(i, ty)| (TypeId(i as u32), ty))
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Encoded bytes the module was read from, for codecs that patch in place
    pub fn image(&self) -> Option<&[u8]> {
        self.image.as_deref()
    }

    pub fn set_image(&mut self, image: Vec<u8>) {
        self.image = Some(image);
    }
}
