use indexmap::IndexMap;
use upyc_types::CType;

use crate::stmt::Stmt;

#[derive(Debug, Clone)]
pub struct Param {
    pub name: String,
    pub ty: CType,
    pub default: Option<crate::expr::Expr>,
}

/// Per-function generator metadata.
#[derive(Debug, Clone, Default)]
pub struct GeneratorInfo {
    /// Locals (including parameters) that are live across at least one
    /// yield point; promoted from stack variables to struct fields.
    pub surviving_locals: Vec<(String, CType)>,
    /// The state ids assigned to each yield site, in source order. The
    /// dispatch switch's full case set is `{0} ∪ yield_state_ids ∪ {0xFFFF}`
    ///.
    pub yield_state_ids: Vec<u32>,
    /// Whether any `for` loop iterates an arbitrary object (needs an
    /// `iter_<name>` field to hold the iterator), as opposed to only
    /// supported `range(...)` forms.
    pub uses_external_iterator: bool,
}

/// Func IR / Method IR: owns the name, sanitized C name, parameters,
/// return CType, body, a per-function local-name -> CType map, a
/// flag indicating whether the function is a generator, and (for
/// generators) the set of names that survive across yields plus the list
/// of yield-site state identifiers.
#[derive(Debug, Clone)]
pub struct FuncIr {
    pub name: String,
    pub c_name: String,
    pub params: Vec<Param>,
    pub return_ty: CType,
    pub body: Vec<Stmt>,
    pub locals: IndexMap<String, CType>,
    pub generator: Option<GeneratorInfo>,
    /// Double-underscore-prefixed names: wrapper + globals entry omitted,
    /// native implementation kept.
    pub is_private: bool,
    /// Set only on the `__repr__` a `@dataclass` synthesizes itself (never
    /// on a user-written one). The class emitter uses this to replace the
    /// placeholder body with a real per-field formatter instead of
    /// compiling `body` as ordinary statements.
    pub is_synthesized_repr: bool,
}

impl FuncIr {
    pub fn is_generator(&self) -> bool {
        self.generator.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodKind {
    Instance,
    Static,
    Class,
    Property,
}

/// A method within a Class IR: the function plus its dispatch metadata.
#[derive(Debug, Clone)]
pub struct MethodIr {
    pub func: FuncIr,
    pub kind: MethodKind,
    /// `Some(i)` when this method is virtual; `None` for non-virtual
    /// (direct-call) methods.
    pub vtable_index: Option<u32>,
}
