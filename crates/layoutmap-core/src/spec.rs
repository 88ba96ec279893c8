//! # Field Specification
//!
//! Declarative description of which struct fields a runtime family's layout
//! needs.
//!
//! A [`FieldSpec`] is a list of [`FieldRequest`]s. Each request names a struct
//! and a (possibly dotted) member path inside it, says whether the layout is
//! unusable without it, and optionally lists other spellings of the same
//! datum for versions that renamed or moved it.
//!
//! ## Example
//!
//! ```rust
//! use layoutmap_core::families::RuntimeFamily;
//! use layoutmap_core::spec::{FieldRequest, FieldSpec};
//!
//! let spec = FieldSpec::new(
//!     RuntimeFamily::Python,
//!     vec![
//!         FieldRequest::required("PyObject", "ob_type"),
//!         FieldRequest::optional("PyInterpreterState", "tstate_head").or("PyInterpreterState", "threads.head"),
//!     ],
//! )
//! .unwrap();
//! assert_eq!(spec.len(), 2);
//! ```

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use crate::error::{LayoutError, LayoutResult};
use crate::families::RuntimeFamily;

/// Dotted member path inside a struct (`ob_type`, `threads.head`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FieldPath(Vec<String>);

impl FieldPath
{
    /// Parse a dotted path. Empty segments are rejected.
    pub fn parse(path: &str) -> LayoutResult<Self>
    {
        let segments: Vec<String> = path.split('.').map(str::to_string).collect();
        if segments.iter().any(String::is_empty) {
            return Err(LayoutError::InvalidSpec(format!("invalid field path `{path}`")));
        }
        Ok(Self(segments))
    }

    #[must_use]
    pub fn segments(&self) -> &[String]
    {
        &self.0
    }
}

impl fmt::Display for FieldPath
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "{}", self.0.join("."))
    }
}

/// Identity of one requested datum: a struct name and a member path.
///
/// Ordered by struct name, then path; this is the canonical order of a
/// layout's fields.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FieldKey
{
    struct_name: String,
    field: FieldPath,
}

impl FieldKey
{
    pub fn new(struct_name: &str, field: &str) -> LayoutResult<Self>
    {
        if struct_name.is_empty() || struct_name.contains('.') {
            return Err(LayoutError::InvalidSpec(format!("invalid struct name `{struct_name}`")));
        }
        Ok(Self {
            struct_name: struct_name.to_string(),
            field: FieldPath::parse(field)?,
        })
    }

    #[must_use]
    pub fn struct_name(&self) -> &str
    {
        &self.struct_name
    }

    #[must_use]
    pub fn field(&self) -> &FieldPath
    {
        &self.field
    }
}

impl fmt::Display for FieldKey
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        write!(f, "{}.{}", self.struct_name, self.field)
    }
}

impl FromStr for FieldKey
{
    type Err = LayoutError;

    /// `Struct.field.path`; the struct name ends at the first dot.
    fn from_str(s: &str) -> Result<Self, Self::Err>
    {
        let (struct_name, field) = s
            .split_once('.')
            .ok_or_else(|| LayoutError::InvalidSpec(format!("field key `{s}` has no field part")))?;
        FieldKey::new(struct_name, field)
    }
}

/// One datum a layout needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldRequest
{
    key: FieldKey,
    required: bool,
    alternatives: Vec<FieldKey>,
    fallback: Option<u64>,
    error: Option<String>,
}

impl FieldRequest
{
    /// A field the layout cannot do without.
    #[must_use]
    pub fn required(struct_name: &str, field: &str) -> Self
    {
        Self::build(struct_name, field, true)
    }

    /// A field that may be missing from some versions.
    #[must_use]
    pub fn optional(struct_name: &str, field: &str) -> Self
    {
        Self::build(struct_name, field, false)
    }

    /// Another spelling of the same datum, tried after the ones before it.
    #[must_use]
    pub fn or(mut self, struct_name: &str, field: &str) -> Self
    {
        match FieldKey::new(struct_name, field) {
            Ok(key) => self.alternatives.push(key),
            Err(err) => self.error = self.error.or(Some(err.to_string())),
        }
        self
    }

    /// Offset recorded when no spelling exists in the debug info.
    #[must_use]
    pub fn with_fallback(mut self, offset: u64) -> Self
    {
        self.fallback = Some(offset);
        self
    }

    /// Identity of the request (its primary spelling).
    #[must_use]
    pub fn key(&self) -> &FieldKey
    {
        &self.key
    }

    #[must_use]
    pub fn is_required(&self) -> bool
    {
        self.required
    }

    /// Every spelling, primary first.
    pub fn spellings(&self) -> impl Iterator<Item = &FieldKey>
    {
        std::iter::once(&self.key).chain(self.alternatives.iter())
    }

    #[must_use]
    pub fn alternatives(&self) -> &[FieldKey]
    {
        &self.alternatives
    }

    #[must_use]
    pub fn fallback(&self) -> Option<u64>
    {
        self.fallback
    }

    fn build(struct_name: &str, field: &str, required: bool) -> Self
    {
        let (key, error) = match FieldKey::new(struct_name, field) {
            Ok(key) => (key, None),
            Err(err) => (
                FieldKey {
                    struct_name: struct_name.to_string(),
                    field: FieldPath(vec![field.to_string()]),
                },
                Some(err.to_string()),
            ),
        };
        Self {
            key,
            required,
            alternatives: Vec::new(),
            fallback: None,
            error,
        }
    }
}

/// `required PyInterpreterState.tstate_head (or PyInterpreterState.threads.head) [fallback 8]`
impl fmt::Display for FieldRequest
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        let kind = if self.required { "required" } else { "optional" };
        write!(f, "{kind} {}", self.key)?;
        if !self.alternatives.is_empty() {
            let alternatives: Vec<String> = self.alternatives.iter().map(ToString::to_string).collect();
            write!(f, " (or {})", alternatives.join(", "))?;
        }
        if let Some(fallback) = self.fallback {
            write!(f, " [fallback {fallback}]")?;
        }
        Ok(())
    }
}

/// The field catalog of one runtime family.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSpec
{
    family: RuntimeFamily,
    requests: Vec<FieldRequest>,
}

impl FieldSpec
{
    /// Build a catalog, rejecting malformed names and duplicate keys.
    pub fn new(family: RuntimeFamily, requests: Vec<FieldRequest>) -> LayoutResult<Self>
    {
        let spec = Self { family, requests };
        spec.validate()?;
        Ok(spec)
    }

    /// Build a built-in catalog. Its validity is covered by tests.
    pub(crate) fn from_catalog(family: RuntimeFamily, requests: Vec<FieldRequest>) -> Self
    {
        Self { family, requests }
    }

    /// Check names and key uniqueness.
    pub fn validate(&self) -> LayoutResult<()>
    {
        let mut seen = HashSet::new();
        for request in &self.requests {
            if let Some(error) = &request.error {
                return Err(LayoutError::InvalidSpec(error.clone()));
            }
            if !seen.insert(&request.key) {
                return Err(LayoutError::InvalidSpec(format!("duplicate field request {}", request.key)));
            }
        }
        Ok(())
    }

    #[must_use]
    pub fn family(&self) -> RuntimeFamily
    {
        self.family
    }

    #[must_use]
    pub fn requests(&self) -> &[FieldRequest]
    {
        &self.requests
    }

    #[must_use]
    pub fn get(&self, key: &FieldKey) -> Option<&FieldRequest>
    {
        self.requests.iter().find(|request| &request.key == key)
    }

    #[must_use]
    pub fn len(&self) -> usize
    {
        self.requests.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool
    {
        self.requests.is_empty()
    }
}
