use indexmap::IndexMap;
use upyc_types::CType;

/// The separate root used by the C-binding sub-pipeline. Unrelated to `Module`: a stub file
/// describes an external C library, not a Python module to compile.
#[derive(Debug, Default)]
pub struct LibraryIr {
    pub name: String,
    pub header_include: String,
    pub extra_include_dirs: Vec<String>,
    pub structs: IndexMap<String, StructDef>,
    pub enums: IndexMap<String, EnumDef>,
    pub functions: IndexMap<String, FunctionDef>,
    pub callbacks: IndexMap<String, CallbackDef>,
    /// Static companion C sources declared in the stub's module-level
    /// metadata, copied alongside the generated output.
    pub companion_sources: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct StructDef {
    pub py_name: String,
    pub c_name: String,
    /// Opaque structs are pointer-only; transparent structs expose
    /// fields.
    pub opaque: bool,
    pub fields: Vec<(String, CType)>,
}

#[derive(Debug, Clone)]
pub struct EnumDef {
    pub py_name: String,
    pub c_name: String,
    pub variants: Vec<(String, i64)>,
}

#[derive(Debug, Clone)]
pub struct FunctionDef {
    pub py_name: String,
    pub c_name: String,
    pub params: Vec<(String, CType)>,
    pub return_ty: CType,
}

/// A declared callback type alias; the emitter generates a trampoline for
/// each of these.
#[derive(Debug, Clone)]
pub struct CallbackDef {
    pub name: String,
    pub params: Vec<CType>,
    pub return_ty: CType,
    /// The explicit `user_data` parameter name, when the C signature names
    /// one directly; `None` means the emitter must infer an accessor from
    /// the parameter types.
    pub user_data_param: Option<String>,
}
