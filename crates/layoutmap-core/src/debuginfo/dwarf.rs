//! DWARF decoding into the debug-info graph.
//!
//! Loads the DWARF sections of an object file (ELF shared libraries in
//! practice; Mach-O section spellings are accepted too), walks every
//! compilation unit and type unit with `gimli`, and emits a [`DebugInfo`]
//! arena.
//!
//! Decoding runs in two passes per input:
//! 1. Allocate a [`TypeId`] for every type DIE, depth-first, recording which
//!    types are nested inside which.
//! 2. Fill in members and typedef/pointer targets, translating DIE
//!    references into arena handles.
//!
//! A reference to a DIE that cannot be found is kept as
//! [`TypeRef::Unresolved`]; the type index reports it as malformed input.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use layoutmap_core::debuginfo::dwarf;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let info = dwarf::load_path("tmp/libpython3.9.so.1.0")?;
//! println!("{} type entries", info.len());
//! # Ok(())
//! # }
//! ```

use std::borrow::Cow;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use gimli::{
    constants, AttributeValue, DebugTypeSignature, DebuggingInformationEntry, Dwarf, EndianArcSlice, EntriesTreeNode,
    Expression, Operation, Reader, RunTimeEndian, SectionId, Unit, UnitOffset, UnitSectionOffset, UnitType,
};
use object::{Object, ObjectSection};
use tracing::{debug, trace};

use super::{DebugInfo, DebugInfoBuilder, Member, TypeEntry, TypeId, TypeKind, TypeRef};
use crate::error::{map_dwarf_error, LayoutError, LayoutResult};

type OwnedReader = EndianArcSlice<RunTimeEndian>;
type OwnedDwarf = Dwarf<OwnedReader>;
type OwnedEntry<'abbrev, 'unit> = DebuggingInformationEntry<'abbrev, 'unit, OwnedReader>;

const DWARF_SECTIONS: &[(&str, &[&str])] = &[
    (".debug_abbrev", &[".debug_abbrev", "__debug_abbrev"]),
    (".debug_addr", &[".debug_addr", "__debug_addr"]),
    (".debug_info", &[".debug_info", "__debug_info"]),
    (".debug_line", &[".debug_line", "__debug_line"]),
    (".debug_line_str", &[".debug_line_str", "__debug_line_str"]),
    (".debug_ranges", &[".debug_ranges", "__debug_ranges"]),
    (".debug_rnglists", &[".debug_rnglists", "__debug_rnglists"]),
    (".debug_str", &[".debug_str", "__debug_str"]),
    (".debug_str_offsets", &[".debug_str_offsets", "__debug_str_offsets"]),
    (".debug_types", &[".debug_types", "__debug_types"]),
    (".debug_loc", &[".debug_loc", "__debug_loc"]),
    (".debug_loclists", &[".debug_loclists", "__debug_loclists"]),
];

/// Raw DWARF section contents plus the byte order they are encoded in.
#[derive(Debug, Clone)]
pub struct DwarfSections
{
    endian: RunTimeEndian,
    sections: HashMap<&'static str, Arc<[u8]>>,
}

impl DwarfSections
{
    /// Empty section set; missing sections read as empty.
    #[must_use]
    pub fn new(endian: RunTimeEndian) -> Self
    {
        Self {
            endian,
            sections: HashMap::new(),
        }
    }

    /// Collect the DWARF sections of a parsed object file.
    pub fn from_object(file: &object::File<'_>) -> LayoutResult<Self>
    {
        let endian = if file.is_little_endian() {
            RunTimeEndian::Little
        } else {
            RunTimeEndian::Big
        };

        let mut sections = HashMap::new();
        for (canonical, aliases) in DWARF_SECTIONS {
            if let Some(data) = load_section_bytes(file, aliases)? {
                sections.insert(*canonical, data);
            }
        }

        Ok(Self { endian, sections })
    }

    /// Set the contents of one section.
    pub fn insert(&mut self, id: SectionId, data: impl Into<Arc<[u8]>>)
    {
        if let Some(key) = section_key(id) {
            self.sections.insert(key, data.into());
        }
    }

    /// Whether any type information is present at all.
    #[must_use]
    pub fn has_debug_info(&self) -> bool
    {
        [".debug_info", ".debug_types"]
            .iter()
            .any(|key| self.sections.get(key).is_some_and(|data| !data.is_empty()))
    }

    fn section_reader(&self, id: SectionId) -> OwnedReader
    {
        let data = section_key(id)
            .and_then(|key| self.sections.get(key))
            .cloned()
            .unwrap_or_else(|| Arc::<[u8]>::from(Vec::new()));
        EndianArcSlice::new(data, self.endian)
    }

    fn dwarf(&self) -> LayoutResult<OwnedDwarf>
    {
        Dwarf::load(|section| Ok::<_, gimli::Error>(self.section_reader(section)))
            .map_err(|err| map_dwarf_error("loading DWARF sections", err))
    }
}

/// Read a shared library from disk and decode its type graph.
pub fn load_path(path: impl AsRef<Path>) -> LayoutResult<DebugInfo>
{
    let path = path.as_ref();
    let bytes = fs::read(path)?;
    debug!("read {} bytes from {}", bytes.len(), path.display());
    load_object(&bytes).map_err(|err| match err {
        LayoutError::InvalidObject(message) => LayoutError::InvalidObject(format!("{}: {message}", path.display())),
        other => other,
    })
}

/// Decode the type graph of an in-memory object file.
pub fn load_object(data: &[u8]) -> LayoutResult<DebugInfo>
{
    let file = object::File::parse(data).map_err(|err| LayoutError::InvalidObject(err.to_string()))?;
    let sections = DwarfSections::from_object(&file)?;
    if !sections.has_debug_info() {
        return Err(LayoutError::InvalidObject("no .debug_info section (stripped binary?)".to_string()));
    }
    load_sections(&sections)
}

/// Decode the type graph from raw DWARF sections.
pub fn load_sections(sections: &DwarfSections) -> LayoutResult<DebugInfo>
{
    let dwarf = sections.dwarf()?;
    let decoder = GraphDecoder::new(&dwarf)?;
    let info = decoder.decode()?;
    debug!("decoded {} type entries from {} units", info.len(), info.units().len());
    Ok(info)
}

/// Mutable side of the decoder, kept apart from the borrowed units.
struct GraphState
{
    builder: DebugInfoBuilder,
    ids: HashMap<(usize, usize), TypeId>,
    order: Vec<(usize, UnitOffset<usize>, TypeId)>,
}

struct GraphDecoder<'a>
{
    dwarf: &'a OwnedDwarf,
    units: Vec<Unit<OwnedReader>>,
}

impl<'a> GraphDecoder<'a>
{
    fn new(dwarf: &'a OwnedDwarf) -> LayoutResult<Self>
    {
        let mut units = Vec::new();
        let mut headers = dwarf.units();
        while let Some(header) = headers
            .next()
            .map_err(|err| map_dwarf_error("reading .debug_info unit header", err))?
        {
            units.push(
                dwarf
                    .unit(header)
                    .map_err(|err| map_dwarf_error("parsing compilation unit", err))?,
            );
        }

        let mut type_headers = dwarf.type_units();
        while let Some(header) = type_headers
            .next()
            .map_err(|err| map_dwarf_error("reading .debug_types unit header", err))?
        {
            units.push(dwarf.unit(header).map_err(|err| map_dwarf_error("parsing type unit", err))?);
        }

        Ok(Self { dwarf, units })
    }

    fn decode(&self) -> LayoutResult<DebugInfo>
    {
        let mut state = GraphState {
            builder: DebugInfoBuilder::new(),
            ids: HashMap::new(),
            order: Vec::new(),
        };

        for (unit_index, unit) in self.units.iter().enumerate() {
            let name = unit
                .name
                .as_ref()
                .and_then(|name| name.to_string_lossy().ok().map(Cow::into_owned));
            trace!("allocating types of unit {unit_index} ({name:?})");
            state.builder.open_unit(name);

            let mut tree = unit
                .entries_tree(None)
                .map_err(|err| map_dwarf_error("building unit tree", err))?;
            let root = tree.root().map_err(|err| map_dwarf_error("navigating unit root", err))?;
            let mut children = root.children();
            while let Some(child) = children
                .next()
                .map_err(|err| map_dwarf_error("iterating unit children", err))?
            {
                self.allocate_tree(unit_index, child, None, &mut state)?;
            }
        }

        let order = std::mem::take(&mut state.order);
        for (unit_index, offset, id) in order {
            self.fill_entry(unit_index, offset, id, &mut state)?;
        }

        Ok(state.builder.build())
    }

    fn allocate_tree(
        &self,
        unit_index: usize,
        node: EntriesTreeNode<'_, '_, '_, OwnedReader>,
        parent: Option<TypeId>,
        state: &mut GraphState,
    ) -> LayoutResult<()>
    {
        let mut scope = parent;
        {
            let entry = node.entry();
            if let Some(kind) = type_kind(entry.tag()) {
                let unit = &self.units[unit_index];
                let id = state.builder.add(parent, self.bare_entry(unit, entry, kind)?);
                state.ids.insert((unit_index, entry.offset().0), id);
                state.order.push((unit_index, entry.offset(), id));
                scope = Some(id);
            }
        }

        let mut children = node.children();
        while let Some(child) = children
            .next()
            .map_err(|err| map_dwarf_error("iterating DIE children", err))?
        {
            self.allocate_tree(unit_index, child, scope, state)?;
        }
        Ok(())
    }

    fn bare_entry(&self, unit: &Unit<OwnedReader>, entry: &OwnedEntry<'_, '_>, kind: TypeKind) -> LayoutResult<TypeEntry>
    {
        let mut type_entry = TypeEntry::new(kind, self.entry_name(unit, entry)?);
        type_entry.byte_size = entry_byte_size(entry)?;
        type_entry.declaration = is_declaration(entry)?;
        Ok(type_entry)
    }

    fn fill_entry(&self, unit_index: usize, offset: UnitOffset<usize>, id: TypeId, state: &mut GraphState)
        -> LayoutResult<()>
    {
        let unit = &self.units[unit_index];
        let entry = unit
            .entry(offset)
            .map_err(|err| map_dwarf_error("re-reading type entry", err))?;
        let kind = type_kind(entry.tag()).unwrap_or(TypeKind::Other);

        if kind.is_aggregate() {
            let members = self.collect_members(unit_index, offset, state)?;
            if let Some(type_entry) = state.builder.entry_mut(id) {
                type_entry.members = members;
            }
            return Ok(());
        }

        if let Some(attr) = entry
            .attr(constants::DW_AT_type)
            .map_err(|err| map_dwarf_error("reading DW_AT_type", err))?
        {
            let target = self.type_ref(unit_index, attr.value(), state)?;
            if let Some(type_entry) = state.builder.entry_mut(id) {
                type_entry.target = Some(target);
            }
        }
        Ok(())
    }

    fn collect_members(&self, unit_index: usize, offset: UnitOffset<usize>, state: &mut GraphState)
        -> LayoutResult<Vec<Member>>
    {
        let unit = &self.units[unit_index];
        let mut members = Vec::new();
        let mut tree = unit
            .entries_tree(Some(offset))
            .map_err(|err| map_dwarf_error("building aggregate tree", err))?;
        let root = tree.root().map_err(|err| map_dwarf_error("navigating aggregate root", err))?;
        let mut children = root.children();
        while let Some(child) = children
            .next()
            .map_err(|err| map_dwarf_error("iterating aggregate children", err))?
        {
            let child_entry = child.entry();
            if child_entry.tag() != constants::DW_TAG_member {
                continue;
            }
            if let Some(member) = self.build_member(unit_index, child_entry, state)? {
                members.push(member);
            }
        }
        Ok(members)
    }

    fn build_member(&self, unit_index: usize, entry: &OwnedEntry<'_, '_>, state: &mut GraphState)
        -> LayoutResult<Option<Member>>
    {
        let unit = &self.units[unit_index];
        let name = self.entry_name(unit, entry)?;

        let Some(attr) = entry
            .attr(constants::DW_AT_type)
            .map_err(|err| map_dwarf_error("reading member type", err))?
        else {
            return Err(LayoutError::MalformedDebugInfo(format!(
                "member {} at 0x{:x} has no type",
                name.as_deref().unwrap_or("<anonymous>"),
                entry.offset().0
            )));
        };
        let ty = self.type_ref(unit_index, attr.value(), state)?;

        let Some(offset) = member_offset(unit, entry)? else {
            debug!(
                "skipping member {:?} at 0x{:x}: location is not a constant",
                name,
                entry.offset().0
            );
            return Ok(None);
        };

        Ok(Some(Member { name, ty, offset }))
    }

    /// Translate a DIE reference into an arena handle.
    fn type_ref(&self, unit_index: usize, value: AttributeValue<OwnedReader>, state: &mut GraphState)
        -> LayoutResult<TypeRef>
    {
        match value {
            AttributeValue::UnitRef(offset) => self.adopt(unit_index, offset, state),
            AttributeValue::DebugInfoRef(offset) => {
                let target = UnitSectionOffset::from(offset);
                match self.find_unit_for_offset(target) {
                    Some((target_unit, unit_offset)) => self.adopt(target_unit, unit_offset, state),
                    None => Ok(TypeRef::Unresolved(offset.0 as u64)),
                }
            }
            AttributeValue::DebugTypesRef(signature) => match self.find_unit_for_signature(signature) {
                Some((target_unit, unit_offset)) => self.adopt(target_unit, unit_offset, state),
                None => Ok(TypeRef::Unresolved(signature.0)),
            },
            other => Err(LayoutError::MalformedDebugInfo(format!(
                "unsupported type reference form {other:?}"
            ))),
        }
    }

    /// Handle for the DIE at `offset`, allocating a detached entry for DIEs
    /// the first pass did not treat as types.
    fn adopt(&self, unit_index: usize, offset: UnitOffset<usize>, state: &mut GraphState) -> LayoutResult<TypeRef>
    {
        if let Some(id) = state.ids.get(&(unit_index, offset.0)) {
            return Ok(TypeRef::Entry(*id));
        }

        let unit = &self.units[unit_index];
        let Ok(entry) = unit.entry(offset) else {
            return Ok(TypeRef::Unresolved(offset.0 as u64));
        };
        let kind = type_kind(entry.tag()).unwrap_or(TypeKind::Other);
        let id = state.builder.add_detached(self.bare_entry(unit, &entry, kind)?);
        state.ids.insert((unit_index, offset.0), id);
        trace!("adopted {:?} DIE at 0x{:x} as {id}", entry.tag(), offset.0);
        Ok(TypeRef::Entry(id))
    }

    fn find_unit_for_offset(&self, target: UnitSectionOffset<usize>) -> Option<(usize, UnitOffset<usize>)>
    {
        self.units
            .iter()
            .enumerate()
            .find_map(|(index, unit)| target.to_unit_offset(unit).map(|offset| (index, offset)))
    }

    fn find_unit_for_signature(&self, signature: DebugTypeSignature) -> Option<(usize, UnitOffset<usize>)>
    {
        self.units.iter().enumerate().find_map(|(index, unit)| match unit.header.type_() {
            UnitType::Type {
                type_signature,
                type_offset,
            }
            | UnitType::SplitType {
                type_signature,
                type_offset,
            } if type_signature == signature => Some((index, type_offset)),
            _ => None,
        })
    }

    fn entry_name(&self, unit: &Unit<OwnedReader>, entry: &OwnedEntry<'_, '_>) -> LayoutResult<Option<String>>
    {
        if let Some(attr) = entry
            .attr(constants::DW_AT_name)
            .map_err(|err| map_dwarf_error("reading DW_AT_name", err))?
        {
            return Ok(Some(self.attr_to_string(unit, attr.value())?));
        }
        Ok(None)
    }

    fn attr_to_string(&self, unit: &Unit<OwnedReader>, value: AttributeValue<OwnedReader>) -> LayoutResult<String>
    {
        let reader = self
            .dwarf
            .attr_string(unit, value)
            .map_err(|err| map_dwarf_error("resolving DWARF string", err))?;
        let owned = match reader.to_string() {
            Ok(cow) => cow.into_owned(),
            Err(_) => reader
                .to_string_lossy()
                .map_err(|err| map_dwarf_error("decoding DWARF string", err))?
                .into_owned(),
        };
        Ok(owned)
    }
}

fn type_kind(tag: constants::DwTag) -> Option<TypeKind>
{
    let kind = match tag {
        constants::DW_TAG_structure_type | constants::DW_TAG_class_type => TypeKind::Struct,
        constants::DW_TAG_union_type => TypeKind::Union,
        constants::DW_TAG_enumeration_type => TypeKind::Enum,
        constants::DW_TAG_typedef => TypeKind::Typedef,
        constants::DW_TAG_pointer_type
        | constants::DW_TAG_reference_type
        | constants::DW_TAG_rvalue_reference_type
        | constants::DW_TAG_ptr_to_member_type => TypeKind::Pointer,
        constants::DW_TAG_const_type
        | constants::DW_TAG_volatile_type
        | constants::DW_TAG_restrict_type
        | constants::DW_TAG_atomic_type => TypeKind::Qualifier,
        constants::DW_TAG_array_type => TypeKind::Array,
        constants::DW_TAG_base_type => TypeKind::Base,
        constants::DW_TAG_subroutine_type | constants::DW_TAG_unspecified_type => TypeKind::Other,
        _ => return None,
    };
    Some(kind)
}

fn entry_byte_size(entry: &OwnedEntry<'_, '_>) -> LayoutResult<Option<u64>>
{
    Ok(entry
        .attr(constants::DW_AT_byte_size)
        .map_err(|err| map_dwarf_error("reading DW_AT_byte_size", err))?
        .and_then(|attr| attr.udata_value()))
}

fn is_declaration(entry: &OwnedEntry<'_, '_>) -> LayoutResult<bool>
{
    let attr = entry
        .attr(constants::DW_AT_declaration)
        .map_err(|err| map_dwarf_error("reading DW_AT_declaration", err))?;
    Ok(matches!(attr.map(|attr| attr.value()), Some(AttributeValue::Flag(true))))
}

/// Byte offset of a member inside its aggregate.
///
/// `DW_AT_data_member_location` may be a constant (DWARF 3+) or a
/// `DW_OP_plus_uconst` expression (DWARF 2). Bit-field members may carry
/// `DW_AT_data_bit_offset` instead; they map to the byte holding their
/// first bit. Union members often carry neither and sit at offset 0.
fn member_offset(unit: &Unit<OwnedReader>, entry: &OwnedEntry<'_, '_>) -> LayoutResult<Option<u64>>
{
    if let Some(attr) = entry
        .attr(constants::DW_AT_data_member_location)
        .map_err(|err| map_dwarf_error("reading DW_AT_data_member_location", err))?
    {
        if let Some(bytes) = attr.udata_value() {
            return Ok(Some(bytes));
        }
        return match attr.value() {
            AttributeValue::Exprloc(expression) => plus_uconst(unit, expression),
            AttributeValue::Block(data) => plus_uconst(unit, Expression(data)),
            _ => Ok(None),
        };
    }

    if let Some(attr) = entry
        .attr(constants::DW_AT_data_bit_offset)
        .map_err(|err| map_dwarf_error("reading DW_AT_data_bit_offset", err))?
    {
        return Ok(attr.udata_value().map(|bits| bits / 8));
    }

    Ok(Some(0))
}

fn plus_uconst(unit: &Unit<OwnedReader>, expression: Expression<OwnedReader>) -> LayoutResult<Option<u64>>
{
    let mut operations = expression.operations(unit.encoding());
    let first = operations
        .next()
        .map_err(|err| map_dwarf_error("decoding member location", err))?;
    let trailing = operations
        .next()
        .map_err(|err| map_dwarf_error("decoding member location", err))?;
    Ok(match (first, trailing) {
        (Some(Operation::PlusConstant { value }), None) => Some(value),
        _ => None,
    })
}

fn section_key(id: SectionId) -> Option<&'static str>
{
    let key = match id {
        SectionId::DebugAbbrev => ".debug_abbrev",
        SectionId::DebugAddr => ".debug_addr",
        SectionId::DebugInfo => ".debug_info",
        SectionId::DebugLine => ".debug_line",
        SectionId::DebugLineStr => ".debug_line_str",
        SectionId::DebugRanges => ".debug_ranges",
        SectionId::DebugRngLists => ".debug_rnglists",
        SectionId::DebugStr => ".debug_str",
        SectionId::DebugStrOffsets => ".debug_str_offsets",
        SectionId::DebugTypes => ".debug_types",
        SectionId::DebugLoc => ".debug_loc",
        SectionId::DebugLocLists => ".debug_loclists",
        _ => return None,
    };
    Some(key)
}

fn load_section_bytes(file: &object::File<'_>, names: &[&str]) -> LayoutResult<Option<Arc<[u8]>>>
{
    for name in names {
        if let Some(section) = file.section_by_name(name) {
            let data = section
                .uncompressed_data()
                .map_err(|err| LayoutError::InvalidObject(format!("failed to read {name}: {err}")))?;
            return Ok(Some(match data {
                Cow::Borrowed(bytes) => Arc::<[u8]>::from(bytes.to_vec()),
                Cow::Owned(vec) => vec.into(),
            }));
        }
    }

    Ok(None)
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_section_key_covers_type_sections()
    {
        assert_eq!(section_key(SectionId::DebugInfo), Some(".debug_info"));
        assert_eq!(section_key(SectionId::DebugTypes), Some(".debug_types"));
        assert_eq!(section_key(SectionId::DebugFrame), None);
    }

    #[test]
    fn test_empty_sections_have_no_debug_info()
    {
        let mut sections = DwarfSections::new(RunTimeEndian::Little);
        assert!(!sections.has_debug_info());
        sections.insert(SectionId::DebugInfo, Vec::new());
        assert!(!sections.has_debug_info());
    }

    #[test]
    fn test_empty_sections_decode_to_empty_graph()
    {
        let info = load_sections(&DwarfSections::new(RunTimeEndian::Little)).unwrap();
        assert!(info.is_empty());
        assert!(info.units().is_empty());
    }

    #[test]
    fn test_garbage_is_not_an_object()
    {
        assert!(matches!(
            load_object(b"definitely not an ELF file"),
            Err(LayoutError::InvalidObject(_))
        ));
    }

    #[test]
    fn test_type_kind_mapping()
    {
        assert_eq!(type_kind(constants::DW_TAG_structure_type), Some(TypeKind::Struct));
        assert_eq!(type_kind(constants::DW_TAG_volatile_type), Some(TypeKind::Qualifier));
        assert_eq!(type_kind(constants::DW_TAG_member), None);
        assert_eq!(type_kind(constants::DW_TAG_subprogram), None);
    }
}
