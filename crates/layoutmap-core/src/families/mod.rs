//! # Runtime Families
//!
//! The closed set of managed-language runtimes whose layouts can be
//! resolved.
//!
//! Each family carries two things:
//! - its field catalog, a static [`FieldSpec`] listing every struct field its
//!   consumers read
//! - its typed layout shape ([`PythonLayout`], [`RubyLayout`]), a named view
//!   over a resolved [`Layout`]
//!
//! Supporting a new field means adding a request to the family's catalog.
//! Supporting a new runtime means adding a variant here; the resolver never
//! changes.

pub mod python;
pub mod ruby;

use std::fmt;
use std::str::FromStr;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

pub use self::python::PythonLayout;
pub use self::ruby::RubyLayout;
use crate::error::{LayoutError, LayoutResult};
use crate::layout::{FieldOffset, Layout};
use crate::spec::FieldSpec;

static PYTHON_SPEC: Lazy<FieldSpec> = Lazy::new(python::catalog);
static RUBY_SPEC: Lazy<FieldSpec> = Lazy::new(ruby::catalog);

/// A supported runtime family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeFamily
{
    /// CPython, 2.7 through 3.11
    Python,
    /// CRuby (MRI), 2.6 through 3.3
    Ruby,
}

impl RuntimeFamily
{
    pub const ALL: [RuntimeFamily; 2] = [RuntimeFamily::Python, RuntimeFamily::Ruby];

    /// Identifier used in artifacts and on the command line.
    #[must_use]
    pub fn name(self) -> &'static str
    {
        match self {
            RuntimeFamily::Python => "python",
            RuntimeFamily::Ruby => "ruby",
        }
    }

    /// The family's built-in field catalog.
    #[must_use]
    pub fn field_spec(self) -> &'static FieldSpec
    {
        match self {
            RuntimeFamily::Python => &PYTHON_SPEC,
            RuntimeFamily::Ruby => &RUBY_SPEC,
        }
    }
}

impl fmt::Display for RuntimeFamily
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        f.write_str(self.name())
    }
}

impl FromStr for RuntimeFamily
{
    type Err = LayoutError;

    fn from_str(s: &str) -> Result<Self, Self::Err>
    {
        RuntimeFamily::ALL
            .into_iter()
            .find(|family| family.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| LayoutError::UnknownFamily(s.to_string()))
    }
}

/// A layout in its family's typed shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "family", rename_all = "lowercase")]
pub enum FamilyLayout
{
    Python(PythonLayout),
    Ruby(RubyLayout),
}

impl FamilyLayout
{
    /// Build the typed view matching `layout`'s family.
    pub fn from_layout(layout: &Layout) -> LayoutResult<Self>
    {
        Ok(match layout.family() {
            RuntimeFamily::Python => FamilyLayout::Python(PythonLayout::from_layout(layout)?),
            RuntimeFamily::Ruby => FamilyLayout::Ruby(RubyLayout::from_layout(layout)?),
        })
    }

    #[must_use]
    pub fn family(&self) -> RuntimeFamily
    {
        match self {
            FamilyLayout::Python(_) => RuntimeFamily::Python,
            FamilyLayout::Ruby(_) => RuntimeFamily::Ruby,
        }
    }

    #[must_use]
    pub fn version(&self) -> &str
    {
        match self {
            FamilyLayout::Python(layout) => &layout.version,
            FamilyLayout::Ruby(layout) => &layout.version,
        }
    }

    pub fn to_json(&self) -> LayoutResult<String>
    {
        let mut json = serde_json::to_string_pretty(self)?;
        json.push('\n');
        Ok(json)
    }
}

/// Make sure a layout handed to a typed view belongs to `family`.
fn expect_family(layout: &Layout, family: RuntimeFamily) -> LayoutResult<()>
{
    if layout.family() == family {
        Ok(())
    } else {
        Err(LayoutError::InvalidSpec(format!(
            "expected a {family} layout, got {} {}",
            layout.family(),
            layout.version()
        )))
    }
}

/// Offset of a field every version has.
fn offset(layout: &Layout, struct_name: &str, field: &str) -> LayoutResult<u64>
{
    match layout.require(struct_name, field)? {
        FieldOffset::Resolved(offset) => Ok(offset),
        FieldOffset::Absent => Err(LayoutError::InvalidSpec(format!(
            "{} layout {} marks required field {struct_name}.{field} absent",
            layout.family(),
            layout.version()
        ))),
    }
}

/// Offset of a field only some versions have.
fn optional_offset(layout: &Layout, struct_name: &str, field: &str) -> LayoutResult<Option<u64>>
{
    Ok(layout.require(struct_name, field)?.offset())
}
