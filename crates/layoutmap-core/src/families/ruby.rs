//! CRuby field catalog and typed layout.
//!
//! CRuby's internal structs are referenced by their tag names
//! (`rb_execution_context_struct`, `rb_control_frame_struct`); the object
//! structs (`RString`, `RArray`) keep their fields in an `as` union.
//!
//! 3.3 hoisted `RString.len` out of `as.heap`, and 3.1 moved the embedded
//! string buffer from `as.ary` into `as.embed.ary`.

use serde::Serialize;

use super::{expect_family, offset, optional_offset, RuntimeFamily};
use crate::error::LayoutResult;
use crate::layout::Layout;
use crate::spec::{FieldRequest, FieldSpec};

pub(crate) fn catalog() -> FieldSpec
{
    FieldSpec::from_catalog(
        RuntimeFamily::Ruby,
        vec![
            FieldRequest::required("rb_execution_context_struct", "vm_stack"),
            FieldRequest::required("rb_execution_context_struct", "vm_stack_size"),
            FieldRequest::required("rb_execution_context_struct", "cfp"),
            FieldRequest::required("rb_control_frame_struct", "pc"),
            FieldRequest::required("rb_control_frame_struct", "sp"),
            FieldRequest::required("rb_control_frame_struct", "iseq"),
            FieldRequest::required("rb_control_frame_struct", "self"),
            FieldRequest::required("rb_control_frame_struct", "ep"),
            FieldRequest::optional("rb_control_frame_struct", "jit_return"),
            FieldRequest::required("rb_iseq_struct", "body"),
            FieldRequest::required("rb_iseq_constant_body", "location"),
            FieldRequest::required("rb_iseq_constant_body", "iseq_size"),
            FieldRequest::required("rb_iseq_constant_body", "iseq_encoded"),
            FieldRequest::required("rb_iseq_location_struct", "pathobj"),
            FieldRequest::required("rb_iseq_location_struct", "base_label"),
            FieldRequest::required("rb_iseq_location_struct", "label"),
            FieldRequest::optional("rb_iseq_location_struct", "first_lineno"),
            FieldRequest::required("RString", "len").or("RString", "as.heap.len"),
            FieldRequest::required("RString", "as.heap.ptr"),
            FieldRequest::required("RString", "as.embed.ary").or("RString", "as.ary"),
            FieldRequest::required("RArray", "as.heap.len"),
            FieldRequest::required("RArray", "as.heap.ptr"),
            FieldRequest::required("RArray", "as.ary"),
            FieldRequest::optional("rb_thread_struct", "ec"),
        ],
    )
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutionContextOffsets
{
    pub vm_stack: u64,
    pub vm_stack_size: u64,
    pub cfp: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ControlFrameOffsets
{
    pub pc: u64,
    pub sp: u64,
    pub iseq: u64,
    #[serde(rename = "self")]
    pub self_value: u64,
    pub ep: u64,
    /// YJIT builds only (3.1+)
    pub jit_return: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IseqOffsets
{
    /// `rb_iseq_struct.body`
    pub body: u64,
    pub location: u64,
    pub iseq_size: u64,
    pub iseq_encoded: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IseqLocationOffsets
{
    pub pathobj: u64,
    pub base_label: u64,
    pub label: u64,
    pub first_lineno: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RStringOffsets
{
    pub len: u64,
    pub heap_ptr: u64,
    pub embedded: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RArrayOffsets
{
    pub heap_len: u64,
    pub heap_ptr: u64,
    pub embedded: u64,
}

/// Typed CRuby layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RubyLayout
{
    pub version: String,
    pub execution_context: ExecutionContextOffsets,
    pub control_frame: ControlFrameOffsets,
    pub iseq: IseqOffsets,
    pub iseq_location: IseqLocationOffsets,
    pub string: RStringOffsets,
    pub array: RArrayOffsets,
    /// `rb_thread_struct.ec`
    pub thread_execution_context: Option<u64>,
}

impl RubyLayout
{
    pub fn from_layout(layout: &Layout) -> LayoutResult<Self>
    {
        expect_family(layout, RuntimeFamily::Ruby)?;

        let ec = "rb_execution_context_struct";
        let cfp = "rb_control_frame_struct";
        let location = "rb_iseq_location_struct";
        Ok(Self {
            version: layout.version().to_string(),
            execution_context: ExecutionContextOffsets {
                vm_stack: offset(layout, ec, "vm_stack")?,
                vm_stack_size: offset(layout, ec, "vm_stack_size")?,
                cfp: offset(layout, ec, "cfp")?,
            },
            control_frame: ControlFrameOffsets {
                pc: offset(layout, cfp, "pc")?,
                sp: offset(layout, cfp, "sp")?,
                iseq: offset(layout, cfp, "iseq")?,
                self_value: offset(layout, cfp, "self")?,
                ep: offset(layout, cfp, "ep")?,
                jit_return: optional_offset(layout, cfp, "jit_return")?,
            },
            iseq: IseqOffsets {
                body: offset(layout, "rb_iseq_struct", "body")?,
                location: offset(layout, "rb_iseq_constant_body", "location")?,
                iseq_size: offset(layout, "rb_iseq_constant_body", "iseq_size")?,
                iseq_encoded: offset(layout, "rb_iseq_constant_body", "iseq_encoded")?,
            },
            iseq_location: IseqLocationOffsets {
                pathobj: offset(layout, location, "pathobj")?,
                base_label: offset(layout, location, "base_label")?,
                label: offset(layout, location, "label")?,
                first_lineno: optional_offset(layout, location, "first_lineno")?,
            },
            string: RStringOffsets {
                len: offset(layout, "RString", "len")?,
                heap_ptr: offset(layout, "RString", "as.heap.ptr")?,
                embedded: offset(layout, "RString", "as.embed.ary")?,
            },
            array: RArrayOffsets {
                heap_len: offset(layout, "RArray", "as.heap.len")?,
                heap_ptr: offset(layout, "RArray", "as.heap.ptr")?,
                embedded: offset(layout, "RArray", "as.ary")?,
            },
            thread_execution_context: optional_offset(layout, "rb_thread_struct", "ec")?,
        })
    }
}
