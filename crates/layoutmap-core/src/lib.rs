//! # layoutmap-core
//!
//! Struct offset resolution for managed-language runtimes.
//!
//! Given a runtime build (a CPython or CRuby shared library with debug
//! info), this crate computes the byte offset of every internal field a
//! profiler needs to walk the runtime's memory: thread states, frames, code
//! objects and the like. The result is a version-tagged [`Layout`] that can
//! be checked in and shipped to an agent that never sees debug info itself.
//!
//! ## Pipeline
//!
//! - [`debuginfo`]: the decoded type graph, and its DWARF loader
//! - [`index`]: struct name to definitions lookup
//! - [`spec`]: which fields a family needs
//! - [`resolver`]: field requests to offsets
//! - [`layout`]: the result, with a canonical JSON form
//! - [`families`]: built-in Python and Ruby catalogs and typed layouts
//! - [`driver`]: one-call entry points, single version or parallel batch
//!
//! ## Example
//!
//! ```rust,no_run
//! use layoutmap_core::prelude::*;
//!
//! # fn example() -> LayoutResult<()> {
//! let layout = driver::resolve_path(RuntimeFamily::Python, "3.9.5", "tmp/libpython3.9.so.1.0")?;
//! print!("{}", layout.to_canonical_json()?);
//! # Ok(())
//! # }
//! ```
//!
//! ## Guarantees
//!
//! - Resolution is deterministic: the same input always produces the same
//!   layout, byte for byte once serialized
//! - A resolution either returns a complete layout or an error naming the
//!   offending field; partial layouts are never returned
//! - Debug info, type indexes and layouts are read-only once built and can
//!   be shared across threads

pub mod debuginfo;
pub mod driver;
pub mod error;
pub mod families;
pub mod index;
pub mod layout;
pub mod prelude;
pub mod resolver;
pub mod spec;

pub use error::{LayoutError, LayoutResult};
pub use families::RuntimeFamily;
pub use layout::{ArtifactComparison, FieldOffset, Layout};
