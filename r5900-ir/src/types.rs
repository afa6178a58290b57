//! Data type descriptors and the registry that owns them.

use std::sync::{Arc, OnceLock, RwLock};

use hashbrown::HashMap;

/// Size of a pointer in the target's data model.
pub const POINTER_SIZE: u64 = 4;

pub type TypeId = u32;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeError {
    /// No type is registered under the name or id.
    UnknownType(String),

    /// The name does not follow the type name grammar.
    InvalidTypeName(String),

    /// A type with the same name has already been registered.
    DuplicateType(String),

    /// A structure definition contains a member that does not fit in the structure.
    InvalidLayout { name: String, member: String },
}

impl std::fmt::Display for TypeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownType(name) => write!(f, "unknown type: {name}"),
            Self::InvalidTypeName(name) => write!(f, "invalid type name: {name:?}"),
            Self::DuplicateType(name) => write!(f, "type already defined: {name}"),
            Self::InvalidLayout { name, member } => {
                write!(f, "member `{member}` does not fit in structure `{name}`")
            }
        }
    }
}

impl std::error::Error for TypeError {}

macro_rules! primitives {
    ($($name:ident => $text:literal, $size:literal, $signed:literal, $float:literal;)*) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum Primitive {
            $($name,)*
        }

        impl Primitive {
            pub const ALL: &'static [Primitive] = &[$(Primitive::$name,)*];

            pub fn name(self) -> &'static str {
                match self {
                    $(Self::$name => $text,)*
                }
            }

            pub fn size(self) -> u64 {
                match self {
                    $(Self::$name => $size,)*
                }
            }

            pub fn is_signed(self) -> bool {
                match self {
                    $(Self::$name => $signed,)*
                }
            }

            pub fn is_float(self) -> bool {
                match self {
                    $(Self::$name => $float,)*
                }
            }

            pub fn from_name(name: &str) -> Option<Self> {
                match name {
                    $($text => Some(Self::$name),)*
                    _ => None,
                }
            }
        }
    };
}

primitives! {
    I8 => "i8", 1, true, false;
    I16 => "i16", 2, true, false;
    I32 => "i32", 4, true, false;
    I64 => "i64", 8, true, false;
    I128 => "i128", 16, true, false;
    U8 => "u8", 1, false, false;
    U16 => "u16", 2, false, false;
    U32 => "u32", 4, false, false;
    U64 => "u64", 8, false, false;
    U128 => "u128", 16, false, false;
    F32 => "f32", 4, true, true;
    F64 => "f64", 8, true, true;
    Bool => "bool", 1, false, false;
}

impl Primitive {
    /// Selects the integer primitive with `bits` bits and the given signedness.
    pub fn int(bits: u32, signed: bool) -> Option<Self> {
        Some(match (bits, signed) {
            (8, true) => Self::I8,
            (16, true) => Self::I16,
            (32, true) => Self::I32,
            (64, true) => Self::I64,
            (128, true) => Self::I128,
            (8, false) => Self::U8,
            (16, false) => Self::U16,
            (32, false) => Self::U32,
            (64, false) => Self::U64,
            (128, false) => Self::U128,
            _ => return None,
        })
    }

    fn id(self) -> TypeId {
        self as TypeId
    }
}

/// A named member of a structure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    pub name: String,
    pub offset: u64,
    pub ty: TypeId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeKind {
    Primitive(Primitive),
    Pointer { pointee: TypeId },
    Array { element: TypeId, count: u64 },
    /// Members sorted by ascending offset.
    Structure { members: Vec<Member> },
}

#[derive(Debug)]
pub struct TypeInfo {
    pub id: TypeId,
    pub name: String,
    pub size: u64,
    pub kind: TypeKind,
}

/// A shared handle to a resolved type descriptor. Two handles are equal if they refer to the same
/// descriptor.
#[derive(Clone)]
pub struct DataType(Arc<TypeInfo>);

impl PartialEq for DataType {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
            || (self.primitive_kind().is_some() && self.primitive_kind() == other.primitive_kind())
    }
}

impl Eq for DataType {}

impl std::fmt::Debug for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0.name)
    }
}

impl std::fmt::Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0.name)
    }
}

fn primitive_types() -> &'static [DataType] {
    static TYPES: OnceLock<Vec<DataType>> = OnceLock::new();
    TYPES.get_or_init(|| {
        Primitive::ALL
            .iter()
            .map(|p| {
                DataType(Arc::new(TypeInfo {
                    id: p.id(),
                    name: p.name().into(),
                    size: p.size(),
                    kind: TypeKind::Primitive(*p),
                }))
            })
            .collect()
    })
}

impl DataType {
    pub fn primitive(p: Primitive) -> Self {
        primitive_types()[p.id() as usize].clone()
    }

    pub fn bool() -> Self {
        Self::primitive(Primitive::Bool)
    }

    /// The integer type with `bits` bits and the given signedness.
    pub fn int(bits: u32, signed: bool) -> Option<Self> {
        Primitive::int(bits, signed).map(Self::primitive)
    }

    pub fn id(&self) -> TypeId {
        self.0.id
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn size(&self) -> u64 {
        self.0.size
    }

    pub fn bits(&self) -> u32 {
        (self.0.size * 8) as u32
    }

    pub fn kind(&self) -> &TypeKind {
        &self.0.kind
    }

    pub fn primitive_kind(&self) -> Option<Primitive> {
        match self.0.kind {
            TypeKind::Primitive(p) => Some(p),
            _ => None,
        }
    }

    pub fn is_float(&self) -> bool {
        self.primitive_kind().map_or(false, |p| p.is_float())
    }

    pub fn is_signed(&self) -> bool {
        self.primitive_kind().map_or(false, |p| p.is_signed())
    }

    pub fn is_bool(&self) -> bool {
        self.primitive_kind() == Some(Primitive::Bool)
    }

    pub fn is_pointer(&self) -> bool {
        matches!(self.0.kind, TypeKind::Pointer { .. })
    }

    pub fn is_integer(&self) -> bool {
        self.primitive_kind().map_or(false, |p| !p.is_float() && p != Primitive::Bool)
    }

    pub fn pointee(&self) -> Option<TypeId> {
        match self.0.kind {
            TypeKind::Pointer { pointee } => Some(pointee),
            _ => None,
        }
    }

    /// Derives an integer type from this one by overriding its signedness and/or width.
    /// Floating point types are returned unchanged.
    pub fn result_type(&self, unsigned: Option<bool>, bits: Option<u32>) -> DataType {
        let (signed, width) = match self.primitive_kind() {
            Some(p) if p.is_float() => return self.clone(),
            Some(p) => (p.is_signed(), self.bits()),
            None => (false, self.bits()),
        };
        let signed = unsigned.map_or(signed, |unsigned| !unsigned);
        DataType::int(bits.unwrap_or(width), signed).unwrap_or_else(|| self.clone())
    }
}

/// One step of a member path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathElement {
    Index(u64),
    Member(String),
}

/// The result of resolving a byte offset inside an aggregate type.
#[derive(Debug, Clone, PartialEq)]
pub struct Property {
    pub path: Vec<PathElement>,

    /// The type of the deepest member that covers the offset.
    pub ty: DataType,

    /// The offset that remains inside `ty` after walking `path`.
    pub residual: u64,

    /// Set when the path ends with a synthetic `field_0x..` member.
    pub synthetic: bool,
}

/// Resolves the structure member covering an offset. Implemented by the registry for the
/// structures it owns, and injectable so that layouts can come from an external database.
pub trait LayoutProvider: Send + Sync {
    fn prop_at_offset(&self, structure: &DataType, offset: u64) -> Option<Member>;
}

/// Reference to a type by name or by numeric id.
#[derive(Debug, Clone, Copy)]
pub enum TypeRef<'a> {
    Name(&'a str),
    Id(TypeId),
}

impl<'a> From<&'a str> for TypeRef<'a> {
    fn from(name: &'a str) -> Self {
        Self::Name(name)
    }
}

impl<'a> From<&'a String> for TypeRef<'a> {
    fn from(name: &'a String) -> Self {
        Self::Name(name.as_str())
    }
}

impl From<TypeId> for TypeRef<'_> {
    fn from(id: TypeId) -> Self {
        Self::Id(id)
    }
}

#[derive(Default)]
struct Inner {
    by_id: Vec<DataType>,
    by_name: HashMap<String, TypeId>,
}

impl Inner {
    fn insert(&mut self, name: String, size: u64, kind: TypeKind) -> DataType {
        let id = self.by_id.len() as TypeId;
        let ty = DataType(Arc::new(TypeInfo { id, name: name.clone(), size, kind }));
        self.by_id.push(ty.clone());
        self.by_name.insert(name, id);
        ty
    }
}

/// Owns every type descriptor known to a decompilation session.
///
/// Lookups take a shared lock, so a single registry can be shared by several workers. Pointer and
/// array types are created on first use.
pub struct TypeRegistry {
    inner: RwLock<Inner>,
    layouts: Option<Arc<dyn LayoutProvider>>,
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

impl TypeRegistry {
    pub fn new() -> Self {
        let mut inner = Inner::default();
        for ty in primitive_types() {
            inner.by_name.insert(ty.name().into(), ty.id());
            inner.by_id.push(ty.clone());
        }
        Self { inner: RwLock::new(inner), layouts: None }
    }

    /// Uses `provider` to resolve structure members instead of the registry's own definitions.
    pub fn with_layout_provider(mut self, provider: Arc<dyn LayoutProvider>) -> Self {
        self.layouts = Some(provider);
        self
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }

    pub fn len(&self) -> usize {
        self.read().by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Looks up a type by name or id.
    ///
    /// Names ending in `*` resolve to a pointer to the base type, `T[N]` resolves to an array of
    /// `N` elements of `T`.
    pub fn get_type<'a>(&self, key: impl Into<TypeRef<'a>>) -> Result<DataType, TypeError> {
        match key.into() {
            TypeRef::Id(id) => self
                .read()
                .by_id
                .get(id as usize)
                .cloned()
                .ok_or_else(|| TypeError::UnknownType(format!("#{id}"))),
            TypeRef::Name(name) => self.get_type_by_name(name),
        }
    }

    fn get_type_by_name(&self, name: &str) -> Result<DataType, TypeError> {
        let name = name.trim();
        let existing = self.read().by_name.get(name).copied();
        if let Some(id) = existing {
            return self.get_type(id);
        }

        if let Some(base) = name.strip_suffix('*') {
            let base = self.get_type_by_name(base)?;
            return Ok(self.pointer_to(&base));
        }

        if let Some(rest) = name.strip_suffix(']') {
            let (element, count) =
                rest.rsplit_once('[').ok_or_else(|| TypeError::InvalidTypeName(name.into()))?;
            let count: u64 =
                count.trim().parse().map_err(|_| TypeError::InvalidTypeName(name.into()))?;
            let element = self.get_type_by_name(element)?;
            return Ok(self.array_of(&element, count));
        }

        match is_identifier(name) {
            true => Err(TypeError::UnknownType(name.into())),
            false => Err(TypeError::InvalidTypeName(name.into())),
        }
    }

    pub fn pointer_to(&self, pointee: &DataType) -> DataType {
        let name = format!("{}*", pointee.name());
        self.get_or_insert(name, POINTER_SIZE, TypeKind::Pointer { pointee: pointee.id() })
    }

    pub fn array_of(&self, element: &DataType, count: u64) -> DataType {
        let name = format!("{}[{count}]", element.name());
        let size = element.size() * count;
        self.get_or_insert(name, size, TypeKind::Array { element: element.id(), count })
    }

    fn get_or_insert(&self, name: String, size: u64, kind: TypeKind) -> DataType {
        let existing = self.read().by_name.get(&name).copied();
        if let Some(Ok(ty)) = existing.map(|id| self.get_type(id)) {
            return ty;
        }

        let mut inner = self.write();
        if let Some(ty) = inner.by_name.get(&name).and_then(|id| inner.by_id.get(*id as usize)) {
            return ty.clone();
        }
        tracing::trace!("creating type {name}");
        inner.insert(name, size, kind)
    }

    /// Registers a structure type. `members` are `(name, offset, type name)` triples in any order.
    pub fn define_structure(
        &self,
        name: &str,
        size: u64,
        members: &[(&str, u64, &str)],
    ) -> Result<DataType, TypeError> {
        if !is_identifier(name) || Primitive::from_name(name).is_some() {
            return Err(TypeError::InvalidTypeName(name.into()));
        }
        if self.read().by_name.contains_key(name) {
            return Err(TypeError::DuplicateType(name.into()));
        }

        let mut resolved = Vec::with_capacity(members.len());
        for &(member, offset, ty) in members {
            let ty = self.get_type(ty)?;
            if offset + ty.size() > size {
                return Err(TypeError::InvalidLayout { name: name.into(), member: member.into() });
            }
            resolved.push(Member { name: member.into(), offset, ty: ty.id() });
        }
        resolved.sort_by_key(|m| m.offset);

        let mut inner = self.write();
        if inner.by_name.contains_key(name) {
            return Err(TypeError::DuplicateType(name.into()));
        }
        Ok(inner.insert(name.into(), size, TypeKind::Structure { members: resolved }))
    }

    /// Derives an integer type by overriding signedness and/or width, see
    /// [DataType::result_type].
    pub fn result_type(&self, ty: &DataType, unsigned: Option<bool>, bits: Option<u32>) -> DataType {
        ty.result_type(unsigned, bits)
    }

    /// Finds the member of `structure` covering `offset`, together with its type.
    pub fn member_at(&self, structure: &DataType, offset: u64) -> Option<(Member, DataType)> {
        let member = match &self.layouts {
            Some(provider) => provider.prop_at_offset(structure, offset)?,
            None => self.prop_at_offset(structure, offset)?,
        };
        let ty = self.get_type(member.ty).ok()?;
        Some((member, ty))
    }

    /// Resolves the deepest member path of `ty` that covers `offset`.
    ///
    /// Arrays and structures are walked until a non-aggregate type is reached. If a structure has
    /// no member at the remaining offset, the path ends with a synthetic `field_0x<offset>` member.
    pub fn property_at_offset(&self, ty: &DataType, offset: u64) -> Property {
        let mut path = vec![];
        let mut current = ty.clone();
        let mut residual = offset;
        loop {
            match current.kind() {
                TypeKind::Array { element, count } => {
                    let Ok(element) = self.get_type(*element)
                    else {
                        break;
                    };
                    if element.size() == 0 || residual / element.size() >= *count {
                        break;
                    }
                    let index = residual / element.size();
                    path.push(PathElement::Index(index));
                    residual -= index * element.size();
                    current = element;
                }
                TypeKind::Structure { .. } => match self.member_at(&current, residual) {
                    Some((member, member_ty)) => {
                        residual -= member.offset;
                        path.push(PathElement::Member(member.name));
                        current = member_ty;
                    }
                    None => {
                        path.push(PathElement::Member(format!("field_0x{residual:x}")));
                        return Property {
                            path,
                            ty: DataType::primitive(Primitive::U8),
                            residual: 0,
                            synthetic: true,
                        };
                    }
                },
                _ => break,
            }
        }
        Property { path, ty: current, residual, synthetic: false }
    }
}

impl LayoutProvider for TypeRegistry {
    fn prop_at_offset(&self, structure: &DataType, offset: u64) -> Option<Member> {
        let TypeKind::Structure { members } = structure.kind()
        else {
            return None;
        };
        let end = members.partition_point(|m| m.offset <= offset);
        members[..end].iter().rev().find_map(|m| {
            let size = self.get_type(m.ty).map_or(0, |ty| ty.size());
            (offset < m.offset + size.max(1)).then(|| m.clone())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primitive_names() {
        let types = TypeRegistry::new();
        for name in ["i8", "u16", "i32", "u64", "i128", "u128", "f32", "f64", "bool"] {
            let ty = types.get_type(name).unwrap();
            assert_eq!(ty.name(), name);
        }
        assert_eq!(types.get_type("u32").unwrap().size(), 4);
        assert!(types.get_type("f64").unwrap().is_float());
        assert_eq!(types.get_type("i16").unwrap(), DataType::primitive(Primitive::I16));
        assert_eq!(types.get_type(Primitive::U8 as TypeId).unwrap().name(), "u8");
    }

    #[test]
    fn unknown_and_invalid_names() {
        let types = TypeRegistry::new();
        assert_eq!(types.get_type("i7"), Err(TypeError::UnknownType("i7".into())));
        assert_eq!(types.get_type("Foo"), Err(TypeError::UnknownType("Foo".into())));
        assert_eq!(types.get_type("3d"), Err(TypeError::InvalidTypeName("3d".into())));
        assert_eq!(types.get_type(""), Err(TypeError::InvalidTypeName("".into())));
        assert!(matches!(types.get_type(9999u32), Err(TypeError::UnknownType(_))));
    }

    #[test]
    fn pointers_are_created_once() {
        let types = TypeRegistry::new();
        let a = types.get_type("u8*").unwrap();
        let b = types.get_type("u8*").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.size(), POINTER_SIZE);
        assert_eq!(a.pointee(), Some(Primitive::U8 as TypeId));

        let pp = types.get_type("u8**").unwrap();
        assert_eq!(pp.pointee(), Some(a.id()));
        assert_ne!(pp, a);
    }

    #[test]
    fn result_type() {
        let i32 = DataType::primitive(Primitive::I32);
        assert_eq!(i32.result_type(Some(true), None), DataType::primitive(Primitive::U32));
        assert_eq!(i32.result_type(None, Some(64)), DataType::primitive(Primitive::I64));
        assert_eq!(i32.result_type(Some(true), Some(8)), DataType::primitive(Primitive::U8));
        let f32 = DataType::primitive(Primitive::F32);
        assert_eq!(f32.result_type(Some(true), Some(64)), f32);
    }

    #[test]
    fn structure_layout() {
        let types = TypeRegistry::new();
        types.define_structure("Vec3", 12, &[("z", 8, "f32"), ("x", 0, "f32"), ("y", 4, "f32")]).unwrap();
        let actor = types
            .define_structure("Actor", 0x30, &[("id", 0, "u32"), ("pos", 0x10, "Vec3"), ("hp", 0x20, "i16[4]")])
            .unwrap();

        let TypeKind::Structure { members } = types.get_type("Vec3").unwrap().kind().clone()
        else {
            panic!("expected structure");
        };
        let offsets: Vec<_> = members.iter().map(|m| m.offset).collect();
        assert_eq!(offsets, vec![0, 4, 8]);

        let prop = types.property_at_offset(&actor, 0x14);
        assert_eq!(prop.path, vec![PathElement::Member("pos".into()), PathElement::Member("y".into())]);
        assert_eq!(prop.ty, DataType::primitive(Primitive::F32));
        assert_eq!(prop.residual, 0);

        let prop = types.property_at_offset(&actor, 0x24);
        assert_eq!(prop.path, vec![PathElement::Member("hp".into()), PathElement::Index(2)]);
        assert_eq!(prop.ty, DataType::primitive(Primitive::I16));

        let prop = types.property_at_offset(&actor, 0x2);
        assert_eq!(prop.path, vec![PathElement::Member("id".into())]);
        assert_eq!(prop.residual, 2);

        let prop = types.property_at_offset(&actor, 0x8);
        assert_eq!(prop.path, vec![PathElement::Member("field_0x8".into())]);
        assert!(prop.synthetic);
    }

    #[test]
    fn structure_errors() {
        let types = TypeRegistry::new();
        types.define_structure("A", 4, &[("x", 0, "u32")]).unwrap();
        assert_eq!(
            types.define_structure("A", 4, &[]).unwrap_err(),
            TypeError::DuplicateType("A".into())
        );
        assert_eq!(
            types.define_structure("B", 4, &[("x", 2, "u32")]).unwrap_err(),
            TypeError::InvalidLayout { name: "B".into(), member: "x".into() }
        );
        assert_eq!(
            types.define_structure("C", 4, &[("x", 0, "Missing")]).unwrap_err(),
            TypeError::UnknownType("Missing".into())
        );
        assert!(matches!(types.define_structure("u32", 4, &[]), Err(TypeError::InvalidTypeName(_))));
    }
}
