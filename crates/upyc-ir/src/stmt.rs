use upyc_types::{BinOp, CType};

use crate::expr::Expr;

/// The ordered list of instructions that must run before a statement's
/// principal effect. Flushed in order at statement-emission
/// time.
pub type Prelude = Vec<PreludeInstr>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerKind {
    List,
    Dict,
    Set,
    Tuple,
}

/// A single prelude instruction: an allocation or a mutation that a
/// container literal, method call, or nested call lowers to.
#[derive(Debug, Clone)]
pub enum PreludeInstr {
    /// Allocates a fresh container into temporary `temp`.
    AllocContainer {
        temp: String,
        kind: ContainerKind,
        elem_ty: CType,
        value_ty: Option<CType>,
    },
    ListAppend { temp: String, value: Expr },
    ListStore { temp: String, index: Expr, value: Expr },
    DictStore { temp: String, key: Expr, value: Expr },
    SetAdd { temp: String, value: Expr },
    /// RTuple temporaries are initialized with a single C struct literal,
    /// not element-by-element stores.
    RTupleInit { temp: String, elements: Vec<Expr> },
    TaggedTupleInit { temp: String, elements: Vec<Expr> },
    /// A call or method call whose return value is discarded — hoisted out
    /// of an expression position so the statement body reads linearly.
    Eval { expr: Expr },
}

/// An assignment target.
#[derive(Debug, Clone)]
pub enum LValue {
    Name(String),
    Attribute { base: Expr, attr: String },
    Subscript { base: Expr, index: Expr },
}

#[derive(Debug, Clone)]
pub struct ExceptHandler {
    /// `except E as e:` — `exc_type` is always present in the supported
    /// subset (bare `except:` is not in scope).
    pub exc_type: String,
    pub bound_name: Option<String>,
    pub body: Vec<Stmt>,
}

/// Statement IR, a sum type over every supported statement form.
#[derive(Debug, Clone)]
pub enum StmtKind {
    Assign { target: LValue, value: Expr },
    AugAssign { target: LValue, op: BinOp, value: Expr },
    Return { value: Option<Expr> },
    If { test: Expr, body: Vec<Stmt>, orelse: Vec<Stmt> },
    While { test: Expr, body: Vec<Stmt> },
    ForRange {
        var: String,
        start: Expr,
        stop: Expr,
        step: Expr,
        body: Vec<Stmt>,
    },
    ForIter { var: String, iter: Expr, body: Vec<Stmt> },
    Break,
    Continue,
    TryExcept {
        body: Vec<Stmt>,
        handlers: Vec<ExceptHandler>,
        orelse: Vec<Stmt>,
        finally: Vec<Stmt>,
    },
    Raise { exc_type: String, message: Option<Expr> },
    Pass,
    Expression(Expr),
    /// `yield value`, tagged with the state id the generator emitter will
    /// dispatch to on resume.
    Yield { value: Expr, state_id: u32 },
    ContainerInstruction(PreludeInstr),
}

/// A statement plus the prelude that must be flushed before it.
#[derive(Debug, Clone)]
pub struct Stmt {
    pub prelude: Prelude,
    pub kind: StmtKind,
    /// Source line, when known, for diagnostics only.
    pub line: Option<u32>,
}

impl Stmt {
    pub fn new(kind: StmtKind) -> Self {
        Self { prelude: Vec::new(), kind, line: None }
    }

    pub fn with_prelude(kind: StmtKind, prelude: Prelude) -> Self {
        Self { prelude, kind, line: None }
    }

    pub fn at_line(mut self, line: u32) -> Self {
        self.line = Some(line);
        self
    }
}
