//! # Layout Resolver
//!
//! Turns a [`FieldSpec`] into a [`Layout`] using a [`TypeIndex`].
//!
//! ## Algorithm
//!
//! For every request, each spelling (primary first, then alternatives) is
//! looked up:
//!
//! 1. Find every occurrence of the struct name. None at all: the spelling is
//!    missing its type.
//! 2. In every occurrence, walk the member path. Each path segment is
//!    searched among the aggregate's members, descending transparently into
//!    anonymous struct/union members (their offset is added to the running
//!    total). Between segments the walk continues inside the member's type,
//!    looking through typedefs and qualifiers.
//! 3. Collect the absolute offsets found. No occurrence has the field: the
//!    spelling is missing its field. All occurrences that have it agree: the
//!    field resolves. They disagree: the debug info is ambiguous and
//!    resolution fails with [`LayoutError::OffsetConflict`].
//!
//! The first spelling that resolves wins. When none does, the request's
//! fallback is used if it has one; otherwise an optional request is
//! [`FieldOffset::Absent`] and a required one aborts the whole resolution.
//! No partial layout is ever returned.
//!
//! Only the requested fields are compared across occurrences; occurrences
//! that differ elsewhere (extra members, different sizes) do not conflict.

use std::collections::BTreeMap;
use std::fmt;

use smallvec::SmallVec;
use tracing::{debug, trace, warn};

use crate::debuginfo::{DebugInfo, Member, TypeId, MAX_TYPE_REF_DEPTH};
use crate::error::{FieldTarget, LayoutError, LayoutResult};
use crate::index::TypeIndex;
use crate::layout::{FieldOffset, Layout};
use crate::spec::{FieldKey, FieldPath, FieldRequest, FieldSpec};

/// Per-field result of resolution.
#[derive(Debug)]
pub enum ResolutionOutcome
{
    Resolved(u64),
    /// Optional field not present in this version.
    Absent,
    /// The field would abort a resolution.
    Failed(LayoutError),
}

impl ResolutionOutcome
{
    #[must_use]
    pub fn is_failed(&self) -> bool
    {
        matches!(self, ResolutionOutcome::Failed(_))
    }
}

impl fmt::Display for ResolutionOutcome
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        match self {
            ResolutionOutcome::Resolved(offset) => write!(f, "{offset}"),
            ResolutionOutcome::Absent => write!(f, "absent"),
            ResolutionOutcome::Failed(err) => write!(f, "failed: {err}"),
        }
    }
}

/// Result of looking up one spelling.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Lookup
{
    NoType,
    NoField,
    Found(u64),
    Conflict(Vec<u64>),
}

/// Resolves field requests against one type index.
#[derive(Debug, Clone, Copy)]
pub struct Resolver<'i, 'a>
{
    index: &'i TypeIndex<'a>,
}

impl<'i, 'a> Resolver<'i, 'a>
{
    #[must_use]
    pub fn new(index: &'i TypeIndex<'a>) -> Self
    {
        Self { index }
    }

    /// Resolve every request of `spec`, all or nothing.
    pub fn resolve(&self, spec: &FieldSpec, version: &str) -> LayoutResult<Layout>
    {
        let mut fields = BTreeMap::new();
        for request in spec.requests() {
            let offset = self.resolve_request(spec, version, request)?;
            fields.insert(request.key().clone(), offset);
        }

        let layout = Layout::new(spec.family(), version, fields);
        debug!(
            "resolved {} {}: {} fields, {} absent",
            spec.family(),
            version,
            layout.len(),
            layout.absent_count()
        );
        Ok(layout)
    }

    /// Evaluate every request without stopping at the first failure.
    ///
    /// Meant for diagnostics: shows at once every field a build is missing.
    #[must_use]
    pub fn outcomes(&self, spec: &FieldSpec, version: &str) -> Vec<(FieldKey, ResolutionOutcome)>
    {
        spec.requests()
            .iter()
            .map(|request| {
                let outcome = match self.resolve_request(spec, version, request) {
                    Ok(FieldOffset::Resolved(offset)) => ResolutionOutcome::Resolved(offset),
                    Ok(FieldOffset::Absent) => ResolutionOutcome::Absent,
                    Err(err) => ResolutionOutcome::Failed(err),
                };
                (request.key().clone(), outcome)
            })
            .collect()
    }

    fn resolve_request(&self, spec: &FieldSpec, version: &str, request: &FieldRequest) -> LayoutResult<FieldOffset>
    {
        let mut any_type = false;
        for spelling in request.spellings() {
            match self.lookup(spelling)? {
                Lookup::Found(offset) => {
                    trace!("{} -> {offset} (via {spelling})", request.key());
                    return Ok(FieldOffset::Resolved(offset));
                }
                Lookup::Conflict(offsets) => {
                    warn!("{spelling} has conflicting offsets {offsets:?} in {} {version}", spec.family());
                    return Err(LayoutError::OffsetConflict {
                        target: target(spec, version, spelling),
                        offsets,
                    });
                }
                Lookup::NoField => any_type = true,
                Lookup::NoType => {}
            }
        }

        if let Some(fallback) = request.fallback() {
            trace!("{} -> fallback {fallback}", request.key());
            return Ok(FieldOffset::Resolved(fallback));
        }
        if !request.is_required() {
            trace!("{} -> absent", request.key());
            return Ok(FieldOffset::Absent);
        }

        let target = target(spec, version, request.key());
        Err(if any_type {
            LayoutError::FieldNotFound { target }
        } else {
            LayoutError::TypeNotFound { target }
        })
    }

    fn lookup(&self, key: &FieldKey) -> LayoutResult<Lookup>
    {
        let occurrences = self.index.occurrences(key.struct_name());
        if occurrences.is_empty() {
            return Ok(Lookup::NoType);
        }

        let mut offsets: SmallVec<[u64; 4]> = SmallVec::new();
        for &occurrence in occurrences {
            if let Some(offset) = self.path_offset(occurrence, key.field())? {
                if !offsets.contains(&offset) {
                    offsets.push(offset);
                }
            }
        }

        Ok(match offsets.len() {
            0 => Lookup::NoField,
            1 => Lookup::Found(offsets[0]),
            _ => {
                offsets.sort_unstable();
                Lookup::Conflict(offsets.into_vec())
            }
        })
    }

    /// Absolute offset of `path` inside the aggregate `root`, if present.
    fn path_offset(&self, root: TypeId, path: &FieldPath) -> LayoutResult<Option<u64>>
    {
        let info = self.index.info();
        let mut current = root;
        let mut total = 0u64;
        let segments = path.segments();

        for (position, segment) in segments.iter().enumerate() {
            let Some((offset, member)) = find_member(info, current, segment, 0)? else {
                return Ok(None);
            };
            total = total.checked_add(offset).ok_or_else(|| overflow(path))?;
            if position + 1 == segments.len() {
                return Ok(Some(total));
            }
            match info.aggregate(member.ty)? {
                Some((next, _)) => current = next,
                // Path continues past a scalar or pointer member.
                None => return Ok(None),
            }
        }
        Ok(None)
    }
}

/// Find a named member of `aggregate`, looking inside anonymous aggregate
/// members. Returns the member's offset relative to `aggregate`.
///
/// Members are searched in declaration order; the first match wins.
fn find_member<'a>(info: &'a DebugInfo, aggregate: TypeId, name: &str, depth: usize)
    -> LayoutResult<Option<(u64, &'a Member)>>
{
    if depth > MAX_TYPE_REF_DEPTH {
        return Err(LayoutError::MalformedDebugInfo(format!(
            "anonymous members nested deeper than {MAX_TYPE_REF_DEPTH} levels in {aggregate}"
        )));
    }

    let (_, entry) = info.resolve_ref(aggregate.into())?;
    for member in &entry.members {
        match member.name.as_deref() {
            Some(member_name) if !member_name.is_empty() => {
                if member_name == name {
                    return Ok(Some((member.offset, member)));
                }
            }
            _ => {
                let Some((inner, _)) = info.aggregate(member.ty)? else {
                    continue;
                };
                if let Some((offset, found)) = find_member(info, inner, name, depth + 1)? {
                    let absolute = member.offset.checked_add(offset).ok_or_else(|| {
                        LayoutError::MalformedDebugInfo(format!("offset of {name} overflows in {aggregate}"))
                    })?;
                    return Ok(Some((absolute, found)));
                }
            }
        }
    }
    Ok(None)
}

fn overflow(path: &FieldPath) -> LayoutError
{
    LayoutError::MalformedDebugInfo(format!("offset of {path} overflows"))
}

fn target(spec: &FieldSpec, version: &str, key: &FieldKey) -> FieldTarget
{
    FieldTarget {
        family: spec.family(),
        version: version.to_string(),
        struct_name: key.struct_name().to_string(),
        field_name: key.field().to_string(),
    }
}
