use upyc_types::{BinOp, BoolOp, CompareOp, CType};

/// A literal value recognized by the builder.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(String),
    None,
}

impl Literal {
    pub fn ctype(&self) -> CType {
        match self {
            Literal::Int(_) => CType::Int,
            Literal::Float(_) => CType::Float,
            Literal::Bool(_) => CType::Bool,
            Literal::Str(_) => CType::Object,
            Literal::None => CType::Void,
        }
    }
}

/// Expression IR, a sum type over every supported expression form. Every
/// variant carries the `CType` the type system resolved for it, so emitters never
/// need to re-infer a type while walking the tree.
#[derive(Debug, Clone)]
pub enum Expr {
    Literal { value: Literal, ty: CType },
    Name { name: String, ty: CType },
    BinOp { op: BinOp, left: Box<Expr>, right: Box<Expr>, ty: CType },
    UnaryOp { op: UnaryOp, operand: Box<Expr>, ty: CType },
    Compare { op: CompareOp, left: Box<Expr>, right: Box<Expr> },
    BoolOp { op: BoolOp, left: Box<Expr>, right: Box<Expr> },
    Subscript { base: Box<Expr>, index: Box<Expr>, ty: CType },
    Attribute { base: Box<Expr>, attr: String, ty: CType },
    Call { callee: String, args: Vec<Expr>, ty: CType },
    MethodCall { base: Box<Expr>, method: String, args: Vec<Expr>, ty: CType },
    Ternary { test: Box<Expr>, body: Box<Expr>, orelse: Box<Expr>, ty: CType },
    ListLiteral { elements: Vec<Expr>, elem_ty: CType },
    DictLiteral { entries: Vec<(Expr, Expr)>, key_ty: CType, value_ty: CType },
    SetLiteral { elements: Vec<Expr> },
    TupleLiteral { elements: Vec<Expr>, ty: CType },
    /// Direct member access into an RTuple value (no heap, no boxing).
    RTupleFieldAccess { base: Box<Expr>, index: usize, ty: CType },
    /// Explicit box insertion: used
    /// whenever a value crosses into a context that requires `Object`.
    CastBox { operand: Box<Expr> },
    /// Explicit unbox insertion: a tagged `mp_obj_t` narrowed to `to`.
    CastUnbox { operand: Box<Expr>, to: CType },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
    Invert,
}

impl Expr {
    pub fn ty(&self) -> CType {
        match self {
            Expr::Literal { ty, .. }
            | Expr::Name { ty, .. }
            | Expr::BinOp { ty, .. }
            | Expr::UnaryOp { ty, .. }
            | Expr::Subscript { ty, .. }
            | Expr::Attribute { ty, .. }
            | Expr::Call { ty, .. }
            | Expr::MethodCall { ty, .. }
            | Expr::Ternary { ty, .. }
            | Expr::TupleLiteral { ty, .. }
            | Expr::RTupleFieldAccess { ty, .. } => ty.clone(),
            Expr::Compare { .. } | Expr::BoolOp { .. } => CType::Bool,
            Expr::ListLiteral { elem_ty, .. } => CType::list_of(elem_ty.clone()),
            Expr::DictLiteral { key_ty, value_ty, .. } => {
                CType::dict_of(key_ty.clone(), value_ty.clone())
            }
            Expr::SetLiteral { .. } => CType::Object,
            Expr::CastBox { .. } => CType::Object,
            Expr::CastUnbox { to, .. } => to.clone(),
        }
    }

    /// Wraps this expression in an explicit box cast if it isn't already
    /// `Object`-typed. Used at every boundary that requires a boxed value:
    /// assignment into an `Object`-typed slot, passage to a runtime
    /// wrapper, or a generic-context use.
    pub fn boxed(self) -> Expr {
        if self.ty() == CType::Object {
            self
        } else {
            Expr::CastBox { operand: Box::new(self) }
        }
    }
}
