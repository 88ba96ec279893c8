//! CPython field catalog and typed layout.
//!
//! Struct names are the ones the interpreter's own headers use. Most are
//! typedefs (`PyObject` for `struct _object`, `PyThreadState` for
//! `struct _ts`); the index resolves them to their tagged definitions.
//!
//! Version notes that shape the catalog:
//! - 3.8 added `PyThreadState.native_thread_id`
//! - 3.10 added `_PyCFrame`; 3.11 moved the current frame behind it and
//!   replaced `PyFrameObject`'s evaluation state with `_PyInterpreterFrame`
//! - 3.11 moved `PyInterpreterState.tstate_head` to `threads.head`
//! - 3.x strings are `PyASCIIObject`, 2.7 strings are `PyStringObject`

use serde::Serialize;

use super::{expect_family, offset, optional_offset, RuntimeFamily};
use crate::error::LayoutResult;
use crate::layout::Layout;
use crate::spec::{FieldRequest, FieldSpec};

pub(crate) fn catalog() -> FieldSpec
{
    FieldSpec::from_catalog(
        RuntimeFamily::Python,
        vec![
            FieldRequest::required("PyObject", "ob_refcnt"),
            FieldRequest::required("PyObject", "ob_type"),
            FieldRequest::required("PyVarObject", "ob_size"),
            FieldRequest::required("PyTypeObject", "tp_name"),
            FieldRequest::required("PyThreadState", "next"),
            FieldRequest::required("PyThreadState", "interp"),
            FieldRequest::required("PyThreadState", "thread_id"),
            FieldRequest::optional("PyThreadState", "frame"),
            FieldRequest::optional("PyThreadState", "cframe"),
            FieldRequest::optional("PyThreadState", "native_thread_id"),
            FieldRequest::optional("_PyCFrame", "current_frame"),
            FieldRequest::required("PyInterpreterState", "next"),
            FieldRequest::required("PyInterpreterState", "tstate_head").or("PyInterpreterState", "threads.head"),
            FieldRequest::optional("_PyRuntimeState", "interpreters.main"),
            FieldRequest::optional("PyFrameObject", "f_back"),
            FieldRequest::optional("PyFrameObject", "f_code"),
            FieldRequest::optional("PyFrameObject", "f_lineno"),
            FieldRequest::optional("PyFrameObject", "f_localsplus"),
            FieldRequest::optional("_PyInterpreterFrame", "f_code"),
            FieldRequest::optional("_PyInterpreterFrame", "previous"),
            FieldRequest::optional("_PyInterpreterFrame", "localsplus"),
            FieldRequest::required("PyCodeObject", "co_filename"),
            FieldRequest::required("PyCodeObject", "co_name"),
            FieldRequest::required("PyCodeObject", "co_firstlineno"),
            FieldRequest::optional("PyCodeObject", "co_varnames"),
            FieldRequest::optional("PyCodeObject", "co_localsplusnames"),
            FieldRequest::required("PyTupleObject", "ob_item"),
            FieldRequest::optional("PyStringObject", "ob_sval"),
            FieldRequest::optional("PyASCIIObject", "length"),
            FieldRequest::optional("PyASCIIObject", "state"),
        ],
    )
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PyObjectOffsets
{
    pub ob_refcnt: u64,
    pub ob_type: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PyThreadStateOffsets
{
    pub next: u64,
    pub interp: u64,
    pub thread_id: u64,
    /// Gone in 3.11.
    pub frame: Option<u64>,
    /// 3.10+
    pub cframe: Option<u64>,
    /// 3.8+
    pub native_thread_id: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PyInterpreterStateOffsets
{
    pub next: u64,
    /// `tstate_head`, or `threads.head` on 3.11
    pub tstate_head: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PyFrameOffsets
{
    pub f_back: Option<u64>,
    pub f_code: Option<u64>,
    pub f_lineno: Option<u64>,
    pub f_localsplus: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PyInterpreterFrameOffsets
{
    pub f_code: Option<u64>,
    pub previous: Option<u64>,
    pub localsplus: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PyCodeOffsets
{
    pub co_filename: u64,
    pub co_name: u64,
    pub co_firstlineno: u64,
    pub co_varnames: Option<u64>,
    pub co_localsplusnames: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PyStringOffsets
{
    /// `PyStringObject.ob_sval` (2.7)
    pub bytes_data: Option<u64>,
    /// `PyASCIIObject.length` (3.x)
    pub ascii_length: Option<u64>,
    /// `PyASCIIObject.state` (3.x)
    pub ascii_state: Option<u64>,
}

/// Typed CPython layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PythonLayout
{
    pub version: String,
    pub object: PyObjectOffsets,
    pub var_object_size: u64,
    pub type_name: u64,
    pub thread_state: PyThreadStateOffsets,
    /// `_PyCFrame.current_frame` (3.11)
    pub cframe_current_frame: Option<u64>,
    pub interpreter_state: PyInterpreterStateOffsets,
    /// `_PyRuntimeState.interpreters.main` (3.7+)
    pub runtime_main_interpreter: Option<u64>,
    pub frame: PyFrameOffsets,
    pub interpreter_frame: PyInterpreterFrameOffsets,
    pub code: PyCodeOffsets,
    pub tuple_item: u64,
    pub string: PyStringOffsets,
}

impl PythonLayout
{
    pub fn from_layout(layout: &Layout) -> LayoutResult<Self>
    {
        expect_family(layout, RuntimeFamily::Python)?;

        Ok(Self {
            version: layout.version().to_string(),
            object: PyObjectOffsets {
                ob_refcnt: offset(layout, "PyObject", "ob_refcnt")?,
                ob_type: offset(layout, "PyObject", "ob_type")?,
            },
            var_object_size: offset(layout, "PyVarObject", "ob_size")?,
            type_name: offset(layout, "PyTypeObject", "tp_name")?,
            thread_state: PyThreadStateOffsets {
                next: offset(layout, "PyThreadState", "next")?,
                interp: offset(layout, "PyThreadState", "interp")?,
                thread_id: offset(layout, "PyThreadState", "thread_id")?,
                frame: optional_offset(layout, "PyThreadState", "frame")?,
                cframe: optional_offset(layout, "PyThreadState", "cframe")?,
                native_thread_id: optional_offset(layout, "PyThreadState", "native_thread_id")?,
            },
            cframe_current_frame: optional_offset(layout, "_PyCFrame", "current_frame")?,
            interpreter_state: PyInterpreterStateOffsets {
                next: offset(layout, "PyInterpreterState", "next")?,
                tstate_head: offset(layout, "PyInterpreterState", "tstate_head")?,
            },
            runtime_main_interpreter: optional_offset(layout, "_PyRuntimeState", "interpreters.main")?,
            frame: PyFrameOffsets {
                f_back: optional_offset(layout, "PyFrameObject", "f_back")?,
                f_code: optional_offset(layout, "PyFrameObject", "f_code")?,
                f_lineno: optional_offset(layout, "PyFrameObject", "f_lineno")?,
                f_localsplus: optional_offset(layout, "PyFrameObject", "f_localsplus")?,
            },
            interpreter_frame: PyInterpreterFrameOffsets {
                f_code: optional_offset(layout, "_PyInterpreterFrame", "f_code")?,
                previous: optional_offset(layout, "_PyInterpreterFrame", "previous")?,
                localsplus: optional_offset(layout, "_PyInterpreterFrame", "localsplus")?,
            },
            code: PyCodeOffsets {
                co_filename: offset(layout, "PyCodeObject", "co_filename")?,
                co_name: offset(layout, "PyCodeObject", "co_name")?,
                co_firstlineno: offset(layout, "PyCodeObject", "co_firstlineno")?,
                co_varnames: optional_offset(layout, "PyCodeObject", "co_varnames")?,
                co_localsplusnames: optional_offset(layout, "PyCodeObject", "co_localsplusnames")?,
            },
            tuple_item: offset(layout, "PyTupleObject", "ob_item")?,
            string: PyStringOffsets {
                bytes_data: optional_offset(layout, "PyStringObject", "ob_sval")?,
                ascii_length: optional_offset(layout, "PyASCIIObject", "length")?,
                ascii_state: optional_offset(layout, "PyASCIIObject", "state")?,
            },
        })
    }

    /// Whether frames are reached through `_PyInterpreterFrame` (3.11+).
    #[must_use]
    pub fn uses_interpreter_frames(&self) -> bool
    {
        self.interpreter_frame.f_code.is_some()
    }
}

#[cfg(test)]
mod tests
{
    use std::collections::BTreeMap;

    use super::*;
    use crate::error::LayoutError;
    use crate::layout::FieldOffset;

    /// Every catalog field at a distinct offset, optional ones absent.
    fn layout_with_optionals_absent() -> Layout
    {
        let fields: BTreeMap<_, _> = catalog()
            .requests()
            .iter()
            .enumerate()
            .map(|(position, request)| {
                let offset = if request.is_required() {
                    FieldOffset::Resolved(position as u64 * 8)
                } else {
                    FieldOffset::Absent
                };
                (request.key().clone(), offset)
            })
            .collect();
        Layout::new(RuntimeFamily::Python, "2.7.15", fields)
    }

    #[test]
    fn test_typed_layout_from_resolved_layout()
    {
        let typed = PythonLayout::from_layout(&layout_with_optionals_absent()).unwrap();
        assert_eq!(typed.version, "2.7.15");
        assert_eq!(typed.object.ob_refcnt, 0);
        assert_eq!(typed.object.ob_type, 8);
        assert_eq!(typed.thread_state.native_thread_id, None);
        assert_eq!(typed.string.bytes_data, None);
        assert!(!typed.uses_interpreter_frames());
    }

    #[test]
    fn test_absent_required_field_rejected()
    {
        let mut fields = BTreeMap::new();
        for request in catalog().requests() {
            fields.insert(request.key().clone(), FieldOffset::Absent);
        }
        let layout = Layout::new(RuntimeFamily::Python, "3.9.5", fields);
        assert!(matches!(
            PythonLayout::from_layout(&layout),
            Err(LayoutError::InvalidSpec(_))
        ));
    }

    #[test]
    fn test_catalog_keys_struct_names_as_headers_spell_them()
    {
        let spec = catalog();
        let key = "PyInterpreterState.tstate_head".parse().unwrap();
        let request = spec.get(&key).unwrap();
        assert!(request.is_required());
        assert_eq!(request.alternatives()[0].to_string(), "PyInterpreterState.threads.head");
    }
}
