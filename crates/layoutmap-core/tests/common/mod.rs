//! Synthetic debug-info graphs shaped like real CPython and CRuby builds.
//!
//! Offsets are x86_64-like but trimmed: only the members the catalogs ask
//! for (plus a few neighbours) are present.

#![allow(dead_code)]

use std::path::PathBuf;

use layoutmap_core::debuginfo::{DebugInfo, DebugInfoBuilder, TypeId, TypeKind};

/// Thin wrapper over [`DebugInfoBuilder`] with word-sized members.
pub struct Graph
{
    builder: DebugInfoBuilder,
    word: TypeId,
}

impl Graph
{
    pub fn new(unit: &str) -> Self
    {
        let mut builder = DebugInfoBuilder::new();
        builder.unit(unit);
        let word = builder.base("long", 8);
        Self { builder, word }
    }

    pub fn unit(&mut self, name: &str)
    {
        self.builder.unit(name);
    }

    pub fn word(&self) -> TypeId
    {
        self.word
    }

    /// Struct whose listed members are all `long`.
    pub fn record(&mut self, tag: Option<&str>, size: u64, members: &[(&str, u64)]) -> TypeId
    {
        let id = self.builder.structure(tag, size);
        self.words(id, members);
        id
    }

    /// Aggregate defined inside `parent`.
    pub fn nested(&mut self, parent: TypeId, kind: TypeKind, tag: Option<&str>, size: u64, members: &[(&str, u64)])
        -> TypeId
    {
        let id = self.builder.nested_aggregate(parent, kind, tag, size);
        self.words(id, members);
        id
    }

    pub fn member(&mut self, owner: TypeId, name: Option<&str>, ty: TypeId, offset: u64)
    {
        self.builder.member(owner, name, ty, offset);
    }

    pub fn typedef(&mut self, name: &str, target: TypeId) -> TypeId
    {
        self.builder.typedef(name, target)
    }

    pub fn array(&mut self, element: TypeId) -> TypeId
    {
        self.builder.array(element)
    }

    pub fn build(self) -> DebugInfo
    {
        self.builder.build()
    }

    fn words(&mut self, owner: TypeId, members: &[(&str, u64)])
    {
        let word = self.word;
        for (name, offset) in members {
            self.builder.member(owner, Some(name), word, *offset);
        }
    }
}

pub struct ObjectTypes
{
    pub object: TypeId,
    pub var_object: TypeId,
}

/// `PyObject`, `PyVarObject` and `PyTypeObject`, as every unit including
/// `object.h` sees them.
pub fn python_object_types(g: &mut Graph) -> ObjectTypes
{
    let object = g.record(Some("_object"), 16, &[("ob_refcnt", 0), ("ob_type", 8)]);
    g.typedef("PyObject", object);

    let var_object = g.record(None, 24, &[]);
    g.member(var_object, Some("ob_base"), object, 0);
    g.member(var_object, Some("ob_size"), g.word(), 16);
    g.typedef("PyVarObject", var_object);

    let type_object = g.record(Some("_typeobject"), 400, &[]);
    g.member(type_object, Some("ob_base"), var_object, 0);
    g.member(type_object, Some("tp_name"), g.word(), 24);
    g.typedef("PyTypeObject", type_object);

    ObjectTypes { object, var_object }
}

fn python_tuple(g: &mut Graph, types: &ObjectTypes)
{
    let tuple = g.record(None, 32, &[("ob_item", 24)]);
    g.member(tuple, Some("ob_base"), types.var_object, 0);
    g.typedef("PyTupleObject", tuple);
}

fn python_ascii(g: &mut Graph, types: &ObjectTypes)
{
    let state = g.record(None, 4, &[]);
    let ascii = g.record(None, 48, &[("length", 16), ("hash", 24), ("wstr", 40)]);
    g.member(ascii, Some("ob_base"), types.object, 0);
    g.member(ascii, Some("state"), state, 32);
    g.typedef("PyASCIIObject", ascii);
}

pub fn python_2_7_15() -> DebugInfo
{
    let mut g = Graph::new("Python/pystate.c");
    let types = python_object_types(&mut g);

    let ts = g.record(
        Some("_ts"),
        168,
        &[("next", 0), ("interp", 8), ("frame", 16), ("recursion_depth", 24), ("thread_id", 144)],
    );
    g.typedef("PyThreadState", ts);
    let is = g.record(Some("_is"), 96, &[("next", 0), ("tstate_head", 8)]);
    g.typedef("PyInterpreterState", is);

    g.unit("Objects/frameobject.c");
    let types_again = python_object_types(&mut g);
    let frame = g.record(
        Some("_frame"),
        384,
        &[("f_back", 24), ("f_code", 32), ("f_lineno", 124), ("f_localsplus", 376)],
    );
    g.member(frame, Some("ob_base"), types_again.var_object, 0);
    g.typedef("PyFrameObject", frame);
    let code = g.record(
        None,
        136,
        &[
            ("co_argcount", 16),
            ("co_varnames", 56),
            ("co_filename", 80),
            ("co_name", 88),
            ("co_firstlineno", 96),
        ],
    );
    g.typedef("PyCodeObject", code);
    python_tuple(&mut g, &types);

    g.unit("Objects/stringobject.c");
    let string = g.record(None, 40, &[("ob_shash", 24), ("ob_sstate", 32), ("ob_sval", 36)]);
    g.member(string, Some("ob_base"), types.var_object, 0);
    g.typedef("PyStringObject", string);

    g.build()
}

/// What moves between the 3.7 - 3.10 builds, which otherwise share a shape.
struct Python3Build<'a>
{
    thread_state_size: u64,
    thread_state: &'a [(&'a str, u64)],
    /// `_PyCFrame` members, 3.10 only.
    cframe: Option<&'a [(&'a str, u64)]>,
    interpreters_at: u64,
    frame: &'a [(&'a str, u64)],
    code: &'a [(&'a str, u64)],
}

fn python_3(build: &Python3Build<'_>) -> DebugInfo
{
    let mut g = Graph::new("Python/pystate.c");
    let types = python_object_types(&mut g);

    let ts = g.record(Some("_ts"), build.thread_state_size, build.thread_state);
    g.typedef("PyThreadState", ts);
    if let Some(members) = build.cframe {
        let cframe = g.record(Some("_PyCFrame"), 16, members);
        g.typedef("_PyCFrame", cframe);
    }
    let is = g.record(Some("_is"), 512, &[("next", 0), ("tstate_head", 8)]);
    g.typedef("PyInterpreterState", is);

    let runtime = g.record(Some("pyruntimestate"), 1024, &[("preinitializing", 0), ("preinitialized", 4)]);
    let interpreters = g.nested(
        runtime,
        TypeKind::Struct,
        Some("pyinterpreters"),
        32,
        &[("mutex", 0), ("head", 8), ("main", 16), ("next_id", 24)],
    );
    g.member(runtime, Some("interpreters"), interpreters, build.interpreters_at);
    g.typedef("_PyRuntimeState", runtime);

    g.unit("Objects/frameobject.c");
    let types_again = python_object_types(&mut g);
    let frame = g.record(Some("_frame"), 384, build.frame);
    g.member(frame, Some("ob_base"), types_again.var_object, 0);
    g.typedef("PyFrameObject", frame);
    let code = g.record(Some("PyCodeObject"), 176, build.code);
    g.typedef("PyCodeObject", code);
    python_tuple(&mut g, &types);

    g.unit("Objects/unicodeobject.c");
    python_ascii(&mut g, &types);

    g.build()
}

pub fn python_3_7_0() -> DebugInfo
{
    python_3(&Python3Build {
        thread_state_size: 184,
        thread_state: &[
            ("prev", 0),
            ("next", 8),
            ("interp", 16),
            ("frame", 24),
            ("recursion_depth", 32),
            ("thread_id", 176),
        ],
        cframe: None,
        interpreters_at: 24,
        frame: &[("f_back", 24), ("f_code", 32), ("f_lineno", 100), ("f_localsplus", 376)],
        code: &[
            ("co_argcount", 16),
            ("co_firstlineno", 36),
            ("co_varnames", 56),
            ("co_filename", 96),
            ("co_name", 104),
        ],
    })
}

/// Same field offsets as 3.9.5.
pub fn python_3_8_0() -> DebugInfo
{
    python_3(&Python3Build {
        thread_state_size: 192,
        thread_state: &[
            ("prev", 0),
            ("next", 8),
            ("interp", 16),
            ("frame", 24),
            ("recursion_depth", 32),
            ("thread_id", 176),
            ("native_thread_id", 184),
        ],
        cframe: None,
        interpreters_at: 32,
        frame: &[("f_back", 24), ("f_code", 32), ("f_lineno", 108), ("f_localsplus", 360)],
        code: &[
            ("co_argcount", 16),
            ("co_firstlineno", 40),
            ("co_varnames", 64),
            ("co_filename", 104),
            ("co_name", 112),
        ],
    })
}

pub fn python_3_9_5() -> DebugInfo
{
    python_3(&Python3Build {
        thread_state_size: 192,
        thread_state: &[
            ("prev", 0),
            ("next", 8),
            ("interp", 16),
            ("frame", 24),
            ("recursion_depth", 32),
            ("thread_id", 176),
            ("native_thread_id", 184),
        ],
        cframe: None,
        interpreters_at: 32,
        frame: &[("f_back", 24), ("f_code", 32), ("f_lineno", 108), ("f_localsplus", 360)],
        code: &[
            ("co_argcount", 16),
            ("co_firstlineno", 40),
            ("co_varnames", 64),
            ("co_filename", 104),
            ("co_name", 112),
        ],
    })
}

/// Both `frame` and `cframe`; `_PyCFrame` exists but has no
/// `current_frame` yet.
pub fn python_3_10_0() -> DebugInfo
{
    python_3(&Python3Build {
        thread_state_size: 288,
        thread_state: &[
            ("prev", 0),
            ("next", 8),
            ("interp", 16),
            ("frame", 24),
            ("recursion_depth", 32),
            ("cframe", 56),
            ("thread_id", 168),
            ("native_thread_id", 176),
        ],
        cframe: Some(&[("use_tracing", 0), ("previous", 8)]),
        interpreters_at: 40,
        frame: &[("f_back", 24), ("f_code", 32), ("f_lineno", 100), ("f_localsplus", 352)],
        code: &[
            ("co_argcount", 16),
            ("co_firstlineno", 40),
            ("co_varnames", 72),
            ("co_filename", 112),
            ("co_name", 120),
        ],
    })
}

/// Synthetic CPython build for a supported version tag.
pub fn python(version: &str) -> DebugInfo
{
    match version {
        "2.7.15" => python_2_7_15(),
        "3.7.0" => python_3_7_0(),
        "3.8.0" => python_3_8_0(),
        "3.9.5" => python_3_9_5(),
        "3.10.0" => python_3_10_0(),
        "3.11.0" => python_3_11_0(),
        other => panic!("no synthetic build for python {other}"),
    }
}

/// Every synthetic CPython version, oldest first.
pub const PYTHON_VERSIONS: [&str; 6] = ["2.7.15", "3.7.0", "3.8.0", "3.9.5", "3.10.0", "3.11.0"];

pub fn python_3_11_0() -> DebugInfo
{
    let mut g = Graph::new("Python/pystate.c");
    let types = python_object_types(&mut g);

    let ts = g.record(
        Some("_ts"),
        304,
        &[
            ("prev", 0),
            ("next", 8),
            ("interp", 16),
            ("_initialized", 24),
            ("cframe", 56),
            ("thread_id", 152),
            ("native_thread_id", 160),
        ],
    );
    g.typedef("PyThreadState", ts);
    let cframe = g.record(
        Some("_PyCFrame"),
        24,
        &[("use_tracing", 0), ("current_frame", 8), ("previous", 16)],
    );
    g.typedef("_PyCFrame", cframe);

    let is = g.record(Some("_is"), 4096, &[("next", 0)]);
    let threads = g.nested(
        is,
        TypeKind::Struct,
        Some("pythreads"),
        32,
        &[("next_unique_id", 0), ("head", 8), ("count", 16), ("stacksize", 24)],
    );
    g.member(is, Some("threads"), threads, 16);
    g.typedef("PyInterpreterState", is);

    let runtime = g.record(Some("pyruntimestate"), 2048, &[("_initialized", 0)]);
    let interpreters = g.nested(
        runtime,
        TypeKind::Struct,
        Some("pyinterpreters"),
        32,
        &[("mutex", 0), ("head", 8), ("main", 16), ("next_id", 24)],
    );
    g.member(runtime, Some("interpreters"), interpreters, 40);
    g.typedef("_PyRuntimeState", runtime);

    g.unit("Objects/frameobject.c");
    let frame = g.record(
        Some("_frame"),
        72,
        &[("f_back", 16), ("f_frame", 24), ("f_trace", 32), ("f_lineno", 40)],
    );
    g.member(frame, Some("ob_base"), types.object, 0);
    g.typedef("PyFrameObject", frame);
    let interpreter_frame = g.record(
        Some("_PyInterpreterFrame"),
        80,
        &[
            ("f_func", 0),
            ("f_globals", 8),
            ("f_builtins", 16),
            ("f_locals", 24),
            ("f_code", 32),
            ("frame_obj", 40),
            ("previous", 48),
            ("prev_instr", 56),
            ("stacktop", 64),
            ("localsplus", 72),
        ],
    );
    g.typedef("_PyInterpreterFrame", interpreter_frame);
    let code = g.record(
        Some("PyCodeObject"),
        208,
        &[
            ("co_consts", 24),
            ("co_firstlineno", 72),
            ("co_localsplusnames", 96),
            ("co_filename", 112),
            ("co_name", 120),
        ],
    );
    g.typedef("PyCodeObject", code);
    python_tuple(&mut g, &types);

    g.unit("Objects/unicodeobject.c");
    python_ascii(&mut g, &types);

    g.build()
}

/// `struct RBasic`, needed by every object struct.
fn ruby_basic(g: &mut Graph) -> TypeId
{
    g.record(Some("RBasic"), 16, &[("flags", 0), ("klass", 8)])
}

/// `struct RArray`, unchanged between 2.6 and 3.3 as far as the catalog
/// is concerned.
fn ruby_array(g: &mut Graph)
{
    let basic = ruby_basic(g);
    let array = g.record(Some("RArray"), 40, &[]);
    g.member(array, Some("basic"), basic, 0);
    let storage = g.nested(array, TypeKind::Union, None, 24, &[]);
    let heap = g.nested(storage, TypeKind::Struct, None, 24, &[("len", 0), ("aux", 8), ("ptr", 16)]);
    let embedded = g.array(g.word());
    g.member(storage, Some("heap"), heap, 0);
    g.member(storage, Some("ary"), embedded, 0);
    g.member(array, Some("as"), storage, 16);
}

fn ruby_iseq(g: &mut Graph, body_size: u64, location_at: u64)
{
    g.record(Some("rb_iseq_struct"), 40, &[("flags", 0), ("wrapper", 8), ("body", 16)]);
    let location = g.record(
        Some("rb_iseq_location_struct"),
        48,
        &[("pathobj", 0), ("base_label", 8), ("label", 16), ("first_lineno", 24)],
    );
    let location_alias = g.typedef("rb_iseq_location_t", location);
    let body = g.record(
        Some("rb_iseq_constant_body"),
        body_size,
        &[("type", 0), ("iseq_size", 4), ("iseq_encoded", 8)],
    );
    g.member(body, Some("location"), location_alias, location_at);
}

pub fn ruby_2_6_10() -> DebugInfo
{
    let mut g = Graph::new("vm.c");
    let ec = g.record(
        Some("rb_execution_context_struct"),
        256,
        &[("vm_stack", 0), ("vm_stack_size", 8), ("cfp", 16), ("tag", 24)],
    );
    g.typedef("rb_execution_context_t", ec);
    let cfp = g.record(
        Some("rb_control_frame_struct"),
        48,
        &[("pc", 0), ("sp", 8), ("iseq", 16), ("self", 24), ("ep", 32), ("block_code", 40)],
    );
    g.typedef("rb_control_frame_t", cfp);
    ruby_iseq(&mut g, 296, 40);
    g.record(
        Some("rb_thread_struct"),
        512,
        &[("vmlt_node", 0), ("self", 16), ("vm", 24), ("ec", 32)],
    );

    g.unit("string.c");
    let basic = ruby_basic(&mut g);
    let string = g.record(Some("RString"), 40, &[]);
    g.member(string, Some("basic"), basic, 0);
    let storage = g.nested(string, TypeKind::Union, None, 24, &[]);
    let heap = g.nested(storage, TypeKind::Struct, None, 24, &[("len", 0), ("ptr", 8), ("aux", 16)]);
    let embedded = g.array(g.word());
    g.member(storage, Some("heap"), heap, 0);
    g.member(storage, Some("ary"), embedded, 0);
    g.member(string, Some("as"), storage, 16);

    g.unit("array.c");
    ruby_array(&mut g);

    g.build()
}

pub fn ruby_3_3_0() -> DebugInfo
{
    let mut g = Graph::new("vm.c");
    let ec = g.record(
        Some("rb_execution_context_struct"),
        256,
        &[("vm_stack", 0), ("vm_stack_size", 8), ("cfp", 16), ("tag", 24)],
    );
    g.typedef("rb_execution_context_t", ec);
    let cfp = g.record(
        Some("rb_control_frame_struct"),
        56,
        &[
            ("pc", 0),
            ("sp", 8),
            ("iseq", 16),
            ("self", 24),
            ("ep", 32),
            ("block_code", 40),
            ("jit_return", 48),
        ],
    );
    g.typedef("rb_control_frame_t", cfp);
    ruby_iseq(&mut g, 400, 64);
    g.record(
        Some("rb_thread_struct"),
        512,
        &[("lt_node", 0), ("self", 16), ("ractor", 24), ("vm", 32), ("ec", 40)],
    );

    g.unit("string.c");
    let basic = ruby_basic(&mut g);
    let string = g.record(Some("RString"), 48, &[("len", 16)]);
    g.member(string, Some("basic"), basic, 0);
    let storage = g.nested(string, TypeKind::Union, None, 24, &[]);
    let heap = g.nested(storage, TypeKind::Struct, None, 16, &[("ptr", 0), ("aux", 8)]);
    let embed = g.nested(storage, TypeKind::Struct, None, 8, &[]);
    let chars = g.array(g.word());
    g.member(embed, Some("ary"), chars, 0);
    g.member(storage, Some("heap"), heap, 0);
    g.member(storage, Some("embed"), embed, 0);
    g.member(string, Some("as"), storage, 24);

    g.unit("array.c");
    ruby_array(&mut g);

    g.build()
}

pub fn fixture_path(name: &str) -> PathBuf
{
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests").join("fixtures").join(name)
}
