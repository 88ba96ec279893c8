//! Common module for library exports

pub use crate::debuginfo::{DebugInfo, DebugInfoBuilder, TypeId, TypeKind, TypeRef};
pub use crate::driver::{self, ResolveJob};
pub use crate::error::{FieldTarget, LayoutError, LayoutResult};
pub use crate::families::{FamilyLayout, PythonLayout, RubyLayout, RuntimeFamily};
pub use crate::index::TypeIndex;
pub use crate::layout::{ArtifactComparison, FieldOffset, Layout, LayoutDifference};
pub use crate::resolver::{ResolutionOutcome, Resolver};
pub use crate::spec::{FieldKey, FieldPath, FieldRequest, FieldSpec};
