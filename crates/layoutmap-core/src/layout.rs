//! # Layout
//!
//! The resolved offset table for one runtime family and version.
//!
//! A [`Layout`] is immutable: the resolver builds it in one go and nothing
//! mutates it afterwards, so it can be shared across threads freely.
//!
//! ## Canonical artifact
//!
//! [`Layout::to_canonical_json`] produces the form checked in as a reference
//! artifact. Fields are sorted, absent fields are `null` (never `0`), and the
//! output ends with a newline, so two layouts resolved from the same input
//! serialize to identical bytes:
//!
//! ```json
//! {
//!   "family": "python",
//!   "version": "3.9.5",
//!   "fields": {
//!     "PyObject.ob_refcnt": 0,
//!     "PyThreadState.native_thread_id": null
//!   }
//! }
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{LayoutError, LayoutResult};
use crate::families::RuntimeFamily;
use crate::spec::FieldKey;

/// Offset of one requested field, or the fact that this version lacks it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldOffset
{
    /// Byte offset from the start of the named struct.
    Resolved(u64),
    /// Optional field not present in this version.
    Absent,
}

impl FieldOffset
{
    #[must_use]
    pub fn offset(self) -> Option<u64>
    {
        match self {
            FieldOffset::Resolved(offset) => Some(offset),
            FieldOffset::Absent => None,
        }
    }

    #[must_use]
    pub fn is_absent(self) -> bool
    {
        self == FieldOffset::Absent
    }
}

impl fmt::Display for FieldOffset
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        match self {
            FieldOffset::Resolved(offset) => write!(f, "{offset}"),
            FieldOffset::Absent => write!(f, "absent"),
        }
    }
}

impl Serialize for FieldOffset
{
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.offset().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for FieldOffset
{
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Option::<u64>::deserialize(deserializer)?.map_or(FieldOffset::Absent, FieldOffset::Resolved))
    }
}

/// One field on which two layouts disagree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayoutDifference
{
    pub key: FieldKey,
    /// Value in `self`, `None` when the field is not part of it.
    pub left: Option<FieldOffset>,
    /// Value in `other`, `None` when the field is not part of it.
    pub right: Option<FieldOffset>,
}

impl fmt::Display for LayoutDifference
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        let show = |value: Option<FieldOffset>| value.map_or_else(|| "missing".to_string(), |value| value.to_string());
        write!(f, "{}: {} != {}", self.key, show(self.left), show(self.right))
    }
}

/// Result of checking a resolved layout against a stored artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactComparison
{
    /// The artifact's `(family, version)` tag, when it is not the resolved
    /// layout's.
    pub mismatched_tag: Option<(RuntimeFamily, String)>,
    pub differences: Vec<LayoutDifference>,
}

impl ArtifactComparison
{
    /// Tags and every field agree.
    #[must_use]
    pub fn is_match(&self) -> bool
    {
        self.mismatched_tag.is_none() && self.differences.is_empty()
    }
}

/// Resolved offsets for one `(family, version)` pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout
{
    family: RuntimeFamily,
    version: String,
    fields: BTreeMap<FieldKey, FieldOffset>,
}

impl Layout
{
    #[must_use]
    pub fn new(family: RuntimeFamily, version: impl Into<String>, fields: BTreeMap<FieldKey, FieldOffset>) -> Self
    {
        Self {
            family,
            version: version.into(),
            fields,
        }
    }

    #[must_use]
    pub fn family(&self) -> RuntimeFamily
    {
        self.family
    }

    /// The version tag exactly as supplied by the caller.
    #[must_use]
    pub fn version(&self) -> &str
    {
        &self.version
    }

    #[must_use]
    pub fn get(&self, key: &FieldKey) -> Option<FieldOffset>
    {
        self.fields.get(key).copied()
    }

    /// Lookup by struct name and dotted field path.
    #[must_use]
    pub fn field(&self, struct_name: &str, field: &str) -> Option<FieldOffset>
    {
        FieldKey::new(struct_name, field).ok().and_then(|key| self.get(&key))
    }

    /// Like [`Layout::field`], but a field the layout does not carry at all
    /// is an error rather than `None`.
    pub fn require(&self, struct_name: &str, field: &str) -> LayoutResult<FieldOffset>
    {
        self.field(struct_name, field).ok_or_else(|| {
            LayoutError::InvalidSpec(format!(
                "{} layout {} has no entry for {struct_name}.{field}",
                self.family, self.version
            ))
        })
    }

    /// Fields in canonical order.
    pub fn iter(&self) -> impl Iterator<Item = (&FieldKey, FieldOffset)>
    {
        self.fields.iter().map(|(key, offset)| (key, *offset))
    }

    #[must_use]
    pub fn len(&self) -> usize
    {
        self.fields.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool
    {
        self.fields.is_empty()
    }

    /// Number of fields marked absent.
    #[must_use]
    pub fn absent_count(&self) -> usize
    {
        self.fields.values().filter(|offset| offset.is_absent()).count()
    }

    /// Per-field differences, in canonical order. Family and version tags
    /// are not compared.
    #[must_use]
    pub fn diff(&self, other: &Layout) -> Vec<LayoutDifference>
    {
        let mut keys: Vec<&FieldKey> = self.fields.keys().chain(other.fields.keys()).collect();
        keys.sort();
        keys.dedup();

        keys.into_iter()
            .filter_map(|key| {
                let left = self.get(key);
                let right = other.get(key);
                (left != right).then(|| LayoutDifference {
                    key: key.clone(),
                    left,
                    right,
                })
            })
            .collect()
    }

    /// Compare with a stored artifact. Unlike [`Layout::diff`], an artifact
    /// tagged with another family or version never matches, even when its
    /// field table is identical.
    #[must_use]
    pub fn compare_artifact(&self, stored: &Layout) -> ArtifactComparison
    {
        let mismatched_tag = (self.family != stored.family || self.version != stored.version)
            .then(|| (stored.family, stored.version.clone()));
        ArtifactComparison {
            mismatched_tag,
            differences: self.diff(stored),
        }
    }

    /// File name of this layout's reference artifact (`python_3_9_5.json`).
    #[must_use]
    pub fn artifact_name(&self) -> String
    {
        artifact_name(self.family, &self.version)
    }

    /// Stable JSON form for reference artifacts.
    pub fn to_canonical_json(&self) -> LayoutResult<String>
    {
        let mut json = serde_json::to_string_pretty(&LayoutDocument::from(self))?;
        json.push('\n');
        Ok(json)
    }

    pub fn from_canonical_json(json: &str) -> LayoutResult<Self>
    {
        let document: LayoutDocument = serde_json::from_str(json)?;
        document.try_into()
    }

    /// Write the canonical form to `path`.
    pub fn write_artifact(&self, path: impl AsRef<Path>) -> LayoutResult<()>
    {
        fs::write(path, self.to_canonical_json()?)?;
        Ok(())
    }

    pub fn read_artifact(path: impl AsRef<Path>) -> LayoutResult<Self>
    {
        Self::from_canonical_json(&fs::read_to_string(path)?)
    }
}

/// File name used for the artifact of `(family, version)`: dots in the
/// version become underscores.
#[must_use]
pub fn artifact_name(family: RuntimeFamily, version: &str) -> String
{
    format!("{family}_{}.json", version.replace('.', "_"))
}

/// Serialized shape of a [`Layout`].
#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct LayoutDocument
{
    family: RuntimeFamily,
    version: String,
    fields: BTreeMap<String, FieldOffset>,
}

impl From<&Layout> for LayoutDocument
{
    fn from(layout: &Layout) -> Self
    {
        Self {
            family: layout.family,
            version: layout.version.clone(),
            fields: layout.fields.iter().map(|(key, offset)| (key.to_string(), *offset)).collect(),
        }
    }
}

impl TryFrom<LayoutDocument> for Layout
{
    type Error = LayoutError;

    fn try_from(document: LayoutDocument) -> Result<Self, Self::Error>
    {
        let fields = document
            .fields
            .into_iter()
            .map(|(key, offset)| Ok((key.parse::<FieldKey>()?, offset)))
            .collect::<LayoutResult<BTreeMap<_, _>>>()?;
        Ok(Layout::new(document.family, document.version, fields))
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    fn key(s: &str) -> FieldKey
    {
        s.parse().unwrap()
    }

    fn sample() -> Layout
    {
        let mut fields = BTreeMap::new();
        fields.insert(key("PyObject.ob_refcnt"), FieldOffset::Resolved(0));
        fields.insert(key("PyObject.ob_type"), FieldOffset::Resolved(8));
        fields.insert(key("PyThreadState.native_thread_id"), FieldOffset::Absent);
        Layout::new(RuntimeFamily::Python, "3.7.0", fields)
    }

    #[test]
    fn test_canonical_json_shape()
    {
        let json = sample().to_canonical_json().unwrap();
        let expected = "{\n  \"family\": \"python\",\n  \"version\": \"3.7.0\",\n  \"fields\": {\n    \"PyObject.ob_refcnt\": 0,\n    \"PyObject.ob_type\": 8,\n    \"PyThreadState.native_thread_id\": null\n  }\n}\n";
        assert_eq!(json, expected);
    }

    #[test]
    fn test_canonical_json_parses_back()
    {
        let layout = sample();
        let parsed = Layout::from_canonical_json(&layout.to_canonical_json().unwrap()).unwrap();
        assert_eq!(parsed, layout);
    }

    #[test]
    fn test_absent_is_not_zero()
    {
        let layout = sample();
        assert_eq!(layout.field("PyObject", "ob_refcnt"), Some(FieldOffset::Resolved(0)));
        assert_eq!(layout.field("PyThreadState", "native_thread_id"), Some(FieldOffset::Absent));
        assert_ne!(FieldOffset::Resolved(0), FieldOffset::Absent);
        assert_eq!(layout.absent_count(), 1);
    }

    #[test]
    fn test_diff_reports_changed_and_missing_fields()
    {
        let left = sample();
        let mut fields = BTreeMap::new();
        fields.insert(key("PyObject.ob_refcnt"), FieldOffset::Resolved(0));
        fields.insert(key("PyObject.ob_type"), FieldOffset::Resolved(16));
        fields.insert(key("PyThreadState.native_thread_id"), FieldOffset::Resolved(176));
        fields.insert(key("PyThreadState.cframe"), FieldOffset::Absent);
        let right = Layout::new(RuntimeFamily::Python, "3.8.0", fields);

        let diff = left.diff(&right);
        let rendered: Vec<String> = diff.iter().map(ToString::to_string).collect();
        assert_eq!(
            rendered,
            vec![
                "PyObject.ob_type: 8 != 16",
                "PyThreadState.cframe: missing != absent",
                "PyThreadState.native_thread_id: absent != 176",
            ]
        );
        assert!(left.diff(&left).is_empty());
    }

    #[test]
    fn test_artifact_for_other_version_never_matches()
    {
        let resolved = sample();
        let fields = resolved.iter().map(|(key, offset)| (key.clone(), offset)).collect();
        let stored = Layout::new(RuntimeFamily::Python, "3.8.0", fields);

        let comparison = resolved.compare_artifact(&stored);
        assert!(comparison.differences.is_empty());
        assert_eq!(comparison.mismatched_tag, Some((RuntimeFamily::Python, "3.8.0".to_string())));
        assert!(!comparison.is_match());
        assert_ne!(resolved, stored);

        let other_family = Layout::new(RuntimeFamily::Ruby, "3.7.0", BTreeMap::new());
        assert!(!resolved.compare_artifact(&other_family).is_match());

        assert!(resolved.compare_artifact(&resolved).is_match());
    }

    #[test]
    fn test_require_missing_entry_is_an_error()
    {
        let layout = sample();
        assert!(layout.require("PyObject", "ob_type").is_ok());
        assert!(matches!(
            layout.require("RString", "len"),
            Err(LayoutError::InvalidSpec(_))
        ));
    }

    #[test]
    fn test_artifact_name_sanitizes_version()
    {
        assert_eq!(sample().artifact_name(), "python_3_7_0.json");
        assert_eq!(artifact_name(RuntimeFamily::Ruby, "3.3.0"), "ruby_3_3_0.json");
    }

    #[test]
    fn test_unknown_document_fields_rejected()
    {
        let json = r#"{"family":"python","version":"3.9.5","fields":{},"extra":1}"#;
        assert!(matches!(
            Layout::from_canonical_json(json),
            Err(LayoutError::Serialization(_))
        ));
    }

    #[test]
    fn test_artifact_file_round_trip()
    {
        let path = std::env::temp_dir().join(format!("layoutmap-test-{}.json", std::process::id()));
        let layout = sample();
        layout.write_artifact(&path).unwrap();
        let read = Layout::read_artifact(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(read, layout);
    }
}
