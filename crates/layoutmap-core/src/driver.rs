//! # Resolution Driver
//!
//! Entry points that run the whole pipeline for a version:
//!
//! ```text
//! family -> field catalog ─┐
//!                          ├─> Resolver -> Layout
//! DebugInfo -> TypeIndex ──┘
//! ```
//!
//! The version tag is copied into the layout exactly as supplied. Nothing
//! here infers a version from the binary.
//!
//! Resolutions share no mutable state, so independent `(family, version)`
//! pairs can run on separate threads. [`resolve_versions`] does that with
//! rayon.

use std::path::Path;

use rayon::prelude::*;
use tracing::{info, info_span};

use crate::debuginfo::{dwarf, DebugInfo};
use crate::error::{LayoutError, LayoutResult};
use crate::families::RuntimeFamily;
use crate::index::TypeIndex;
use crate::layout::Layout;
use crate::resolver::Resolver;
use crate::spec::FieldSpec;

/// Resolve `family`'s built-in catalog against one decoded binary.
pub fn resolve_version(family: RuntimeFamily, version: &str, info: &DebugInfo) -> LayoutResult<Layout>
{
    resolve_with_spec(family.field_spec(), version, info)
}

/// Resolve a caller-supplied catalog against one decoded binary.
pub fn resolve_with_spec(spec: &FieldSpec, version: &str, info: &DebugInfo) -> LayoutResult<Layout>
{
    let _span = info_span!("resolve", family = %spec.family(), version).entered();

    let index = TypeIndex::build(info).map_err(|err| in_version(spec.family(), version, err))?;
    let layout = Resolver::new(&index).resolve(spec, version)?;

    info!(
        "resolved {} {} ({} fields, {} absent)",
        layout.family(),
        layout.version(),
        layout.len(),
        layout.absent_count()
    );
    Ok(layout)
}

/// Load the debug info of the shared library at `path` and resolve it.
pub fn resolve_path(family: RuntimeFamily, version: &str, path: impl AsRef<Path>) -> LayoutResult<Layout>
{
    let info = dwarf::load_path(path.as_ref()).map_err(|err| in_version(family, version, err))?;
    resolve_version(family, version, &info)
}

/// One independent resolution of a batch.
#[derive(Debug, Clone, Copy)]
pub struct ResolveJob<'a>
{
    pub family: RuntimeFamily,
    pub version: &'a str,
    pub info: &'a DebugInfo,
}

impl<'a> ResolveJob<'a>
{
    #[must_use]
    pub fn new(family: RuntimeFamily, version: &'a str, info: &'a DebugInfo) -> Self
    {
        Self { family, version, info }
    }

    pub fn run(&self) -> LayoutResult<Layout>
    {
        resolve_version(self.family, self.version, self.info)
    }
}

/// Resolve every job in parallel. Results come back in job order; one
/// failing job does not affect the others.
#[must_use]
pub fn resolve_versions(jobs: &[ResolveJob<'_>]) -> Vec<LayoutResult<Layout>>
{
    jobs.par_iter().map(ResolveJob::run).collect()
}

/// Prefix input errors with the version they were hit in. Resolution errors
/// already name their target.
fn in_version(family: RuntimeFamily, version: &str, err: LayoutError) -> LayoutError
{
    match err {
        LayoutError::MalformedDebugInfo(message) => {
            LayoutError::MalformedDebugInfo(format!("{family} {version}: {message}"))
        }
        LayoutError::InvalidObject(message) => LayoutError::InvalidObject(format!("{family} {version}: {message}")),
        other => other,
    }
}
