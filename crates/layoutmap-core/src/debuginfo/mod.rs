//! # Debug-Info Graph
//!
//! A decoded, read-only view of the type definitions found in a binary's
//! debug information.
//!
//! Debug-info type graphs are cyclic: a struct holds a pointer to itself, two
//! structs point at each other, typedefs alias aggregates defined later in the
//! unit. The graph therefore lives in an arena: every type is a [`TypeEntry`]
//! addressed by a [`TypeId`] handle, and every reference between types is a
//! [`TypeRef`] holding such a handle.
//!
//! Graphs come from two places:
//! - [`dwarf`], which decodes real ELF/DWARF input with `gimli`
//! - [`DebugInfoBuilder`], which assembles graphs directly (tests, fixtures,
//!   other decoders)
//!
//! ## Example
//!
//! ```rust
//! use layoutmap_core::debuginfo::{DebugInfoBuilder, TypeKind};
//!
//! let mut builder = DebugInfoBuilder::new();
//! builder.unit("object.c");
//! let long = builder.base("long", 8);
//! let object = builder.structure(Some("_object"), 16);
//! builder.member(object, Some("ob_refcnt"), long, 0);
//! let info = builder.build();
//!
//! assert_eq!(info.units().len(), 1);
//! assert_eq!(info.entry(object).map(|entry| entry.kind), Some(TypeKind::Struct));
//! ```

pub mod dwarf;

use std::fmt;

use crate::error::{LayoutError, LayoutResult};

/// How many typedef/qualifier hops are followed before giving up.
pub(crate) const MAX_TYPE_REF_DEPTH: usize = 32;

/// Stable handle of a [`TypeEntry`] inside a [`DebugInfo`] arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeId(u32);

impl TypeId
{
    /// Build a handle from a raw arena index.
    ///
    /// Handles built this way are not checked against any arena; looking up
    /// one that was never allocated yields a dangling reference.
    #[must_use]
    pub fn from_raw(raw: u32) -> Self
    {
        TypeId(raw)
    }

    #[must_use]
    pub fn index(self) -> usize
    {
        self.0 as usize
    }
}

impl fmt::Display for TypeId
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "TypeId({})", self.0)
    }
}

/// Reference from one type (or member) to another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeRef
{
    /// Points at an arena entry.
    Entry(TypeId),
    /// The decoder could not find the referenced DIE. Holds the raw
    /// section offset for diagnostics.
    Unresolved(u64),
}

impl From<TypeId> for TypeRef
{
    fn from(id: TypeId) -> Self
    {
        TypeRef::Entry(id)
    }
}

impl fmt::Display for TypeRef
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        match self {
            TypeRef::Entry(id) => write!(f, "{id}"),
            TypeRef::Unresolved(offset) => write!(f, "<unresolved 0x{offset:x}>"),
        }
    }
}

/// Kind of a type entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeKind
{
    /// `struct` or `class`
    Struct,
    Union,
    Enum,
    Typedef,
    Pointer,
    /// `const`, `volatile`, `restrict` or `_Atomic` wrapper
    Qualifier,
    Array,
    Base,
    /// Anything else (subroutine types, unspecified types, ...)
    Other,
}

impl TypeKind
{
    /// Struct-like kinds whose members participate in offset arithmetic.
    #[must_use]
    pub fn is_aggregate(self) -> bool
    {
        matches!(self, TypeKind::Struct | TypeKind::Union)
    }

    /// Kinds that only rename or qualify their target.
    #[must_use]
    pub fn is_transparent(self) -> bool
    {
        matches!(self, TypeKind::Typedef | TypeKind::Qualifier)
    }
}

/// One data member of an aggregate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member
{
    /// `None` for anonymous members (embedded unnamed struct/union).
    pub name: Option<String>,
    pub ty: TypeRef,
    /// Byte offset from the start of the enclosing aggregate.
    pub offset: u64,
}

/// A node of the debug-info type graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeEntry
{
    pub name: Option<String>,
    pub kind: TypeKind,
    pub byte_size: Option<u64>,
    /// Data members in declaration order (aggregates only).
    pub members: Vec<Member>,
    /// Aliased/pointed-to type (typedefs, qualifiers, pointers, arrays).
    pub target: Option<TypeRef>,
    /// Forward declaration without a body.
    pub declaration: bool,
    /// Type definitions nested inside this one, in definition order.
    pub nested: Vec<TypeId>,
}

impl TypeEntry
{
    #[must_use]
    pub fn new(kind: TypeKind, name: Option<String>) -> Self
    {
        Self {
            name,
            kind,
            byte_size: None,
            members: Vec::new(),
            target: None,
            declaration: false,
            nested: Vec::new(),
        }
    }

    #[must_use]
    pub fn name(&self) -> Option<&str>
    {
        self.name.as_deref().filter(|name| !name.is_empty())
    }

    #[must_use]
    pub fn is_anonymous(&self) -> bool
    {
        self.name().is_none()
    }
}

/// One compilation (or type) unit and the type definitions at its top level.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompileUnit
{
    pub name: Option<String>,
    /// Top-level type definitions, in DIE order.
    pub types: Vec<TypeId>,
}

/// The decoded type graph of one binary.
///
/// Immutable once built; shared read-only between resolutions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DebugInfo
{
    units: Vec<CompileUnit>,
    entries: Vec<TypeEntry>,
}

impl DebugInfo
{
    /// Compile units in the order the decoder presented them.
    #[must_use]
    pub fn units(&self) -> &[CompileUnit]
    {
        &self.units
    }

    #[must_use]
    pub fn entry(&self, id: TypeId) -> Option<&TypeEntry>
    {
        self.entries.get(id.index())
    }

    /// Number of entries in the arena.
    #[must_use]
    pub fn len(&self) -> usize
    {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool
    {
        self.entries.is_empty()
    }

    /// Dereference a type reference, failing on dangling handles.
    pub fn resolve_ref(&self, reference: TypeRef) -> LayoutResult<(TypeId, &TypeEntry)>
    {
        match reference {
            TypeRef::Entry(id) => self
                .entry(id)
                .map(|entry| (id, entry))
                .ok_or_else(|| LayoutError::MalformedDebugInfo(format!("dangling type reference {id}"))),
            TypeRef::Unresolved(offset) => Err(LayoutError::MalformedDebugInfo(format!(
                "type reference to unknown DIE at 0x{offset:x}"
            ))),
        }
    }

    /// Follow typedef and qualifier chains until a concrete type is reached.
    pub fn strip_transparent(&self, reference: TypeRef) -> LayoutResult<(TypeId, &TypeEntry)>
    {
        let mut current = self.resolve_ref(reference)?;
        for _ in 0..MAX_TYPE_REF_DEPTH {
            let (_, entry) = current;
            if !entry.kind.is_transparent() {
                return Ok(current);
            }
            match entry.target {
                Some(target) => current = self.resolve_ref(target)?,
                // `typedef void foo;`, `const void`
                None => return Ok(current),
            }
        }
        Err(LayoutError::MalformedDebugInfo(format!(
            "typedef chain starting at {reference} exceeds {MAX_TYPE_REF_DEPTH} links"
        )))
    }

    /// The aggregate a reference denotes, looking through typedefs and
    /// qualifiers. `None` when the reference is not struct/union-typed.
    pub fn aggregate(&self, reference: TypeRef) -> LayoutResult<Option<(TypeId, &TypeEntry)>>
    {
        let (id, entry) = self.strip_transparent(reference)?;
        Ok(entry.kind.is_aggregate().then_some((id, entry)))
    }
}

/// Incremental constructor for [`DebugInfo`].
///
/// Types are added to the unit most recently opened with
/// [`DebugInfoBuilder::unit`]; adding a type before any unit opens an
/// unnamed one.
#[derive(Debug, Default)]
pub struct DebugInfoBuilder
{
    units: Vec<CompileUnit>,
    entries: Vec<TypeEntry>,
}

impl DebugInfoBuilder
{
    #[must_use]
    pub fn new() -> Self
    {
        Self::default()
    }

    /// Open a new compile unit; subsequent top-level types land in it.
    pub fn unit(&mut self, name: impl Into<String>) -> &mut Self
    {
        self.open_unit(Some(name.into()))
    }

    /// Open a new compile unit that may lack a name.
    pub fn open_unit(&mut self, name: Option<String>) -> &mut Self
    {
        self.units.push(CompileUnit { name, types: Vec::new() });
        self
    }

    /// Add a type entry. With a `parent`, the entry is recorded as nested
    /// inside that type; otherwise it is a top-level definition of the
    /// current unit.
    pub fn add(&mut self, parent: Option<TypeId>, entry: TypeEntry) -> TypeId
    {
        let id = self.next_id();
        self.entries.push(entry);
        match parent.and_then(|parent| self.entries.get_mut(parent.index())) {
            Some(parent_entry) => parent_entry.nested.push(id),
            None => self.current_unit().types.push(id),
        }
        id
    }

    /// Add a type entry that belongs to no unit and no parent. Used for
    /// entries only reachable through references.
    pub fn add_detached(&mut self, entry: TypeEntry) -> TypeId
    {
        let id = self.next_id();
        self.entries.push(entry);
        id
    }

    /// Mutable access to an entry added earlier.
    pub fn entry_mut(&mut self, id: TypeId) -> Option<&mut TypeEntry>
    {
        self.entries.get_mut(id.index())
    }

    pub fn base(&mut self, name: &str, byte_size: u64) -> TypeId
    {
        let mut entry = TypeEntry::new(TypeKind::Base, Some(name.to_string()));
        entry.byte_size = Some(byte_size);
        self.add(None, entry)
    }

    pub fn structure(&mut self, name: Option<&str>, byte_size: u64) -> TypeId
    {
        self.aggregate(None, TypeKind::Struct, name, byte_size)
    }

    pub fn union(&mut self, name: Option<&str>, byte_size: u64) -> TypeId
    {
        self.aggregate(None, TypeKind::Union, name, byte_size)
    }

    /// Struct or union defined inside `parent`.
    pub fn nested_aggregate(&mut self, parent: TypeId, kind: TypeKind, name: Option<&str>, byte_size: u64) -> TypeId
    {
        self.aggregate(Some(parent), kind, name, byte_size)
    }

    /// `struct name;` without a body.
    pub fn declaration(&mut self, name: &str) -> TypeId
    {
        let mut entry = TypeEntry::new(TypeKind::Struct, Some(name.to_string()));
        entry.declaration = true;
        self.add(None, entry)
    }

    pub fn typedef(&mut self, name: &str, target: impl Into<TypeRef>) -> TypeId
    {
        let mut entry = TypeEntry::new(TypeKind::Typedef, Some(name.to_string()));
        entry.target = Some(target.into());
        self.add(None, entry)
    }

    pub fn qualifier(&mut self, target: impl Into<TypeRef>) -> TypeId
    {
        let mut entry = TypeEntry::new(TypeKind::Qualifier, None);
        entry.target = Some(target.into());
        self.add(None, entry)
    }

    pub fn pointer(&mut self, target: impl Into<TypeRef>, byte_size: u64) -> TypeId
    {
        let mut entry = TypeEntry::new(TypeKind::Pointer, None);
        entry.target = Some(target.into());
        entry.byte_size = Some(byte_size);
        self.add(None, entry)
    }

    pub fn array(&mut self, element: impl Into<TypeRef>) -> TypeId
    {
        let mut entry = TypeEntry::new(TypeKind::Array, None);
        entry.target = Some(element.into());
        self.add(None, entry)
    }

    /// Append a data member to an aggregate. Ignored when `owner` is unknown.
    pub fn member(&mut self, owner: TypeId, name: Option<&str>, ty: impl Into<TypeRef>, offset: u64) -> &mut Self
    {
        if let Some(entry) = self.entries.get_mut(owner.index()) {
            entry.members.push(Member {
                name: name.map(str::to_string),
                ty: ty.into(),
                offset,
            });
        }
        self
    }

    #[must_use]
    pub fn build(self) -> DebugInfo
    {
        DebugInfo {
            units: self.units,
            entries: self.entries,
        }
    }

    fn aggregate(&mut self, parent: Option<TypeId>, kind: TypeKind, name: Option<&str>, byte_size: u64) -> TypeId
    {
        let mut entry = TypeEntry::new(kind, name.map(str::to_string));
        entry.byte_size = Some(byte_size);
        self.add(parent, entry)
    }

    fn next_id(&self) -> TypeId
    {
        TypeId(u32::try_from(self.entries.len()).unwrap_or(u32::MAX))
    }

    fn current_unit(&mut self) -> &mut CompileUnit
    {
        if self.units.is_empty() {
            self.units.push(CompileUnit::default());
        }
        let last = self.units.len() - 1;
        &mut self.units[last]
    }
}
