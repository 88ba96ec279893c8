//! # Type Index
//!
//! Name lookup over a [`DebugInfo`] graph.
//!
//! The index maps every struct/union name to the ordered list of its
//! definitions ("occurrences"). The same name usually has several: each
//! compilation unit that includes a header gets its own copy of the types
//! declared there.
//!
//! ## Traversal
//!
//! Units are visited in the order the decoder presented them; inside a unit,
//! type definitions are visited depth-first (a definition before the
//! definitions nested in it). Occurrence lists follow that order.
//!
//! ## What gets indexed
//!
//! - Named struct and union definitions, top-level or nested
//! - Typedef names of aggregates (`typedef struct _object PyObject;`), which
//!   list the aggregate's occurrences as well
//!
//! Anonymous aggregates are never looked up by name; they are reachable only
//! through the members of their enclosing aggregate. Forward declarations
//! are not definitions and are skipped.
//!
//! Building the index validates every type reference reachable from an
//! indexed aggregate: a dangling reference makes the whole input unusable
//! and fails with [`LayoutError::MalformedDebugInfo`].

use std::collections::{HashMap, HashSet};

use tracing::debug;

use crate::debuginfo::{DebugInfo, TypeEntry, TypeId, TypeKind, TypeRef, MAX_TYPE_REF_DEPTH};
use crate::error::{LayoutError, LayoutResult};

/// Name to occurrence lookup for one debug-info graph.
#[derive(Debug, Clone)]
pub struct TypeIndex<'a>
{
    info: &'a DebugInfo,
    by_name: HashMap<String, Vec<TypeId>>,
}

impl<'a> TypeIndex<'a>
{
    /// Walk every unit of `info` and index its aggregate definitions.
    pub fn build(info: &'a DebugInfo) -> LayoutResult<Self>
    {
        let mut walker = IndexWalker {
            info,
            by_name: HashMap::new(),
            aliases: Vec::new(),
            deferred: Vec::new(),
            visited: HashSet::new(),
        };

        for unit in info.units() {
            for &id in &unit.types {
                walker.visit(id, 0)?;
            }
        }
        walker.visit_deferred()?;

        let by_name = walker.finish();
        debug!(
            "indexed {} type names ({} occurrences) from {} units",
            by_name.len(),
            by_name.values().map(Vec::len).sum::<usize>(),
            info.units().len()
        );
        Ok(Self { info, by_name })
    }

    /// Every definition recorded under `name`, in traversal order.
    #[must_use]
    pub fn occurrences(&self, name: &str) -> &[TypeId]
    {
        self.by_name.get(name).map_or(&[], Vec::as_slice)
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool
    {
        self.by_name.contains_key(name)
    }

    /// The graph this index was built from.
    #[must_use]
    pub fn info(&self) -> &'a DebugInfo
    {
        self.info
    }

    /// Number of distinct indexed names.
    #[must_use]
    pub fn len(&self) -> usize
    {
        self.by_name.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool
    {
        self.by_name.is_empty()
    }

    /// Indexed names in sorted order.
    #[must_use]
    pub fn names(&self) -> Vec<&str>
    {
        let mut names: Vec<&str> = self.by_name.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

struct IndexWalker<'a>
{
    info: &'a DebugInfo,
    by_name: HashMap<String, Vec<TypeId>>,
    /// `(typedef name, struct tag)` pairs whose tag occurrences are merged
    /// into the typedef's list once every unit has been walked.
    aliases: Vec<(String, String)>,
    /// Named typedef targets, visited after the unit walk so definitions
    /// keep their own position. Catches targets outside every unit.
    deferred: Vec<TypeId>,
    visited: HashSet<TypeId>,
}

impl IndexWalker<'_>
{
    fn visit(&mut self, id: TypeId, depth: usize) -> LayoutResult<()>
    {
        if depth > MAX_TYPE_REF_DEPTH {
            return Err(LayoutError::MalformedDebugInfo(format!(
                "type definitions nested deeper than {MAX_TYPE_REF_DEPTH} levels at {id}"
            )));
        }
        if !self.visited.insert(id) {
            return Ok(());
        }

        let (_, entry) = self.info.resolve_ref(TypeRef::Entry(id))?;
        self.check_references(entry)?;

        match entry.kind {
            TypeKind::Struct | TypeKind::Union if !entry.declaration => {
                if let Some(name) = entry.name() {
                    self.record(name, id);
                }
                self.check_anonymous_members(entry, depth)?;
            }
            TypeKind::Typedef => self.visit_typedef(entry)?,
            _ => {}
        }

        for &nested in &entry.nested {
            self.visit(nested, depth + 1)?;
        }
        Ok(())
    }

    fn visit_typedef(&mut self, entry: &TypeEntry) -> LayoutResult<()>
    {
        let (Some(alias), Some(target)) = (entry.name(), entry.target) else {
            return Ok(());
        };
        let (target_id, target_entry) = self.info.strip_transparent(target)?;
        if !target_entry.kind.is_aggregate() {
            return Ok(());
        }

        match target_entry.name() {
            // Only reachable through the typedef.
            None if !target_entry.declaration => {
                self.record(alias, target_id);
                self.visit(target_id, 0)?;
            }
            None => {}
            Some(tag) => {
                if !target_entry.declaration {
                    self.deferred.push(target_id);
                }
                if tag != alias {
                    self.aliases.push((alias.to_string(), tag.to_string()));
                }
            }
        }
        Ok(())
    }

    fn visit_deferred(&mut self) -> LayoutResult<()>
    {
        let mut next = 0;
        while let Some(&id) = self.deferred.get(next) {
            next += 1;
            self.visit(id, 0)?;
        }
        Ok(())
    }

    /// Anonymous aggregates embedded as members are not indexed by name but
    /// their references still need to be sound.
    fn check_anonymous_members(&mut self, entry: &TypeEntry, depth: usize) -> LayoutResult<()>
    {
        for member in &entry.members {
            if member.name.as_deref().is_some_and(|name| !name.is_empty()) {
                continue;
            }
            if let Some((inner, inner_entry)) = self.info.aggregate(member.ty)? {
                if inner_entry.is_anonymous() {
                    self.visit(inner, depth + 1)?;
                }
            }
        }
        Ok(())
    }

    fn check_references(&self, entry: &TypeEntry) -> LayoutResult<()>
    {
        for member in &entry.members {
            self.info.resolve_ref(member.ty).map_err(|err| {
                LayoutError::MalformedDebugInfo(format!(
                    "member {} of {}: {}",
                    member.name.as_deref().unwrap_or("<anonymous>"),
                    entry.name().unwrap_or("<anonymous>"),
                    describe(&err)
                ))
            })?;
        }
        if let Some(target) = entry.target {
            self.info.resolve_ref(target)?;
        }
        Ok(())
    }

    fn record(&mut self, name: &str, id: TypeId)
    {
        let occurrences = self.by_name.entry(name.to_string()).or_default();
        if !occurrences.contains(&id) {
            occurrences.push(id);
        }
    }

    fn finish(mut self) -> HashMap<String, Vec<TypeId>>
    {
        let aliases = std::mem::take(&mut self.aliases);
        for (alias, tag) in aliases {
            let tagged = self.by_name.get(&tag).cloned().unwrap_or_default();
            for id in tagged {
                self.record(&alias, id);
            }
        }
        self.by_name
    }
}

fn describe(err: &LayoutError) -> String
{
    match err {
        LayoutError::MalformedDebugInfo(message) => message.clone(),
        other => other.to_string(),
    }
}
