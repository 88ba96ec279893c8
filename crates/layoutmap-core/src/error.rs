//! # Error Types
//!
//! Error handling for layout resolution.
//!
//! We use `thiserror` to automatically generate `Error` trait implementations
//! and nice error messages.

use std::fmt;

use thiserror::Error;

use crate::families::RuntimeFamily;

/// Identifies the field a fatal resolution error is about.
///
/// Every per-version failure names the full `(family, version, struct, field)`
/// tuple so a batch of resolutions can be triaged from the error alone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldTarget
{
    pub family: RuntimeFamily,
    pub version: String,
    pub struct_name: String,
    pub field_name: String,
}

impl fmt::Display for FieldTarget
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(
            f,
            "{} {}: {}.{}",
            self.family, self.version, self.struct_name, self.field_name
        )
    }
}

/// Main error type for layout resolution
///
/// ## Error Categories
///
/// 1. **Input errors**: MalformedDebugInfo, InvalidObject, Io
/// 2. **Resolution errors**: TypeNotFound, FieldNotFound, OffsetConflict
/// 3. **Caller errors**: UnknownFamily, InvalidSpec
/// 4. **Artifact errors**: Serialization
#[derive(Error, Debug)]
pub enum LayoutError
{
    /// The debug-info graph cannot be used.
    ///
    /// This happens when:
    /// - A member or typedef refers to a type entry that does not exist
    /// - gimli fails to decode a unit, an attribute or a string
    ///
    /// This is fatal for the whole type index, not a per-field failure.
    #[error("Malformed debug info: {0}")]
    MalformedDebugInfo(String),

    /// A required struct is not defined anywhere in the debug info.
    #[error("Type not found: {target}")]
    TypeNotFound
    {
        /// The request that failed
        target: FieldTarget,
    },

    /// A required field is absent from every occurrence of its struct.
    #[error("Field not found: {target}")]
    FieldNotFound
    {
        /// The request that failed
        target: FieldTarget,
    },

    /// Occurrences of a struct disagree on a requested field's offset.
    ///
    /// The debug info is ambiguous for this build. Picking either offset
    /// could make the consumer read the wrong memory.
    #[error("Offset conflict: {target} resolves to {offsets:?}")]
    OffsetConflict
    {
        /// The request that failed
        target: FieldTarget,
        /// Every distinct offset observed, in ascending order
        offsets: Vec<u64>,
    },

    /// The binary container could not be parsed.
    #[error("Invalid object file: {0}")]
    InvalidObject(String),

    /// A family identifier outside the supported set.
    #[error("Unknown runtime family: {0}")]
    UnknownFamily(String),

    /// A field catalog violates its own rules (e.g. duplicate keys).
    #[error("Invalid field specification: {0}")]
    InvalidSpec(String),

    /// A layout artifact could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// I/O error (reading shared libraries, writing artifacts)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl LayoutError
{
    /// The offending field, for resolution failures.
    #[must_use]
    pub fn target(&self) -> Option<&FieldTarget>
    {
        match self {
            LayoutError::TypeNotFound { target }
            | LayoutError::FieldNotFound { target }
            | LayoutError::OffsetConflict { target, .. } => Some(target),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for LayoutError
{
    fn from(err: serde_json::Error) -> Self
    {
        LayoutError::Serialization(err.to_string())
    }
}

/// Map a gimli DWARF error to a `LayoutError` with context.
///
/// The context describes what was being decoded (e.g. "reading DW_AT_name").
pub(crate) fn map_dwarf_error(context: &str, err: gimli::Error) -> LayoutError
{
    LayoutError::MalformedDebugInfo(format!("{context}: {err}"))
}

/// Convenience type alias for `Result<T, LayoutError>`
///
/// ```rust
/// use layoutmap_core::error::LayoutResult;
/// fn foo() -> LayoutResult<()>
/// {
///     Ok(())
/// }
/// ```
pub type LayoutResult<T> = std::result::Result<T, LayoutError>;
