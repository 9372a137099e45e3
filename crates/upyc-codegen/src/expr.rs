//! Lowers `upyc_ir::Expr` to a single C expression string.
//!
//! Every node already carries the `CType` the builder resolved, so this
//! layer never infers anything — it only picks the C spelling (a native
//! operator, a `mp_obj_*` runtime call, or a box/unbox helper) for the type
//! that's already there.

use upyc_common::sanitize_c_ident;
use upyc_ir::{ClassIr, Expr, Literal, Module, UnaryOp};
use upyc_types::{BinOp, BoolOp, CType, CompareOp};

pub struct ExprCtx<'a> {
    pub module: &'a Module,
    pub current_class: Option<&'a ClassIr>,
    /// The enclosing function's declared return type, used to box/unbox a
    /// `return` statement's value to match the C function's signature.
    pub return_ty: CType,
    /// Whether the enclosing function lowers to a generator's `iternext`,
    /// which changes how a bare `return` is emitted.
    pub is_generator: bool,
}

impl<'a> ExprCtx<'a> {
    pub fn emit(&self, e: &Expr) -> String {
        match e {
            Expr::Literal { value, ty } => self.emit_literal(value, ty),
            Expr::Name { name, .. } => sanitize_c_ident(name),
            Expr::BinOp { op, left, right, ty } => self.emit_binop(*op, left, right, ty),
            Expr::UnaryOp { op, operand, ty } => self.emit_unaryop(*op, operand, ty),
            Expr::Compare { op, left, right } => self.emit_compare(*op, left, right),
            Expr::BoolOp { op, left, right } => {
                let l = self.truthy(left);
                let r = self.truthy(right);
                let c_op = match op {
                    BoolOp::And => "&&",
                    BoolOp::Or => "||",
                };
                format!("({l} {c_op} {r})")
            }
            Expr::Subscript { base, index, ty } => {
                let base_c = self.emit(base);
                let index_c = self.boxed_text(index);
                let call = format!("mp_obj_subscr({base_c}, {index_c}, MP_OBJ_SENTINEL)");
                ty.unbox_expr(&call)
            }
            Expr::Attribute { base, attr, .. } => {
                let base_c = self.emit(base);
                format!("{base_c}->{}", sanitize_c_ident(attr))
            }
            Expr::Call { callee, args, ty } => self.emit_call(callee, args, ty),
            Expr::MethodCall { base, method, args, ty } => self.emit_method_call(base, method, args, ty),
            Expr::Ternary { test, body, orelse, .. } => {
                let t = self.truthy(test);
                let b = self.emit(body);
                let o = self.emit(orelse);
                format!("({t} ? {b} : {o})")
            }
            Expr::ListLiteral { .. } | Expr::DictLiteral { .. } | Expr::SetLiteral { .. } => {
                // These only ever appear as the `PreludeInstr::AllocContainer`
                // temporary's initial value inside the builder; by the time
                // an expression tree reaches codegen they've already been
                // rewritten into a bare `Name` referencing that temporary.
                unreachable!("container literals are lowered through a prelude temp before emission")
            }
            Expr::TupleLiteral { elements, ty } => self.emit_tuple_literal(elements, ty),
            Expr::RTupleFieldAccess { base, index, .. } => {
                let base_c = self.emit(base);
                format!("({base_c}).f{index}")
            }
            Expr::CastBox { operand } => operand.ty().box_expr(&self.emit(operand)),
            Expr::CastUnbox { operand, to } => to.unbox_expr(&self.emit(operand)),
        }
    }

    fn emit_literal(&self, value: &Literal, ty: &CType) -> String {
        let boxed = *ty == CType::Object;
        match value {
            Literal::Str(s) => format!("mp_obj_new_str(\"{}\", {})", escape_c_string(s), s.len()),
            Literal::Int(i) => {
                if boxed {
                    CType::Int.box_expr(&i.to_string())
                } else {
                    i.to_string()
                }
            }
            Literal::Float(f) => {
                if boxed {
                    CType::Float.box_expr(&format!("{f:?}"))
                } else {
                    format!("{f:?}")
                }
            }
            Literal::Bool(b) => {
                let text = if *b { "true" } else { "false" };
                if boxed {
                    CType::Bool.box_expr(text)
                } else {
                    text.to_string()
                }
            }
            Literal::None => "mp_const_none".to_string(),
        }
    }

    fn emit_binop(&self, op: BinOp, left: &Expr, right: &Expr, ty: &CType) -> String {
        let l = self.emit(left);
        let r = self.emit(right);
        if *ty == CType::Object {
            return format!("mp_binary_op({}, {l}, {r})", binop_mp_constant(op));
        }
        match op {
            BinOp::Add => format!("({l} + {r})"),
            BinOp::Sub => format!("({l} - {r})"),
            BinOp::Mul => format!("({l} * {r})"),
            BinOp::Div => format!("({l} / {r})"),
            BinOp::FloorDiv if *ty == CType::Float => format!("floor({l} / {r})"),
            BinOp::FloorDiv => format!("({l} / {r})"),
            BinOp::Mod => format!("({l} % {r})"),
            BinOp::Pow if *ty == CType::Float => format!("pow({l}, {r})"),
            BinOp::Pow => format!("upyc_ipow({l}, {r})"),
            BinOp::BitAnd => format!("({l} & {r})"),
            BinOp::BitOr => format!("({l} | {r})"),
            BinOp::BitXor => format!("({l} ^ {r})"),
            BinOp::LShift => format!("({l} << {r})"),
            BinOp::RShift => format!("({l} >> {r})"),
        }
    }

    fn emit_unaryop(&self, op: UnaryOp, operand: &Expr, _ty: &CType) -> String {
        let v = self.emit(operand);
        match op {
            UnaryOp::Neg => format!("(-{v})"),
            UnaryOp::Invert => format!("(~{v})"),
            UnaryOp::Not => format!("(!{})", self.truthy(operand)),
        }
    }

    fn emit_compare(&self, op: CompareOp, left: &Expr, right: &Expr) -> String {
        let l = self.emit(left);
        let r = self.emit(right);
        match op {
            CompareOp::Is => format!("({l} == {r})"),
            CompareOp::IsNot => format!("({l} != {r})"),
            CompareOp::Eq if left.ty() == CType::Object => format!("mp_obj_equal({l}, {r})"),
            CompareOp::NotEq if left.ty() == CType::Object => format!("(!mp_obj_equal({l}, {r}))"),
            CompareOp::In => format!("mp_obj_is_in({r}, {l})"),
            CompareOp::NotIn => format!("(!mp_obj_is_in({r}, {l}))"),
            CompareOp::Eq => format!("({l} == {r})"),
            CompareOp::NotEq => format!("({l} != {r})"),
            CompareOp::Lt => format!("({l} < {r})"),
            CompareOp::LtE => format!("({l} <= {r})"),
            CompareOp::Gt => format!("({l} > {r})"),
            CompareOp::GtE => format!("({l} >= {r})"),
        }
    }

    /// A C boolean-context expression for `e`, used by `and`/`or`/`not` and
    /// by conditions (`if`, `while`, ternary test).
    pub fn truthy(&self, e: &Expr) -> String {
        let c = self.emit(e);
        match e.ty() {
            CType::Bool => c,
            CType::Object => format!("mp_obj_is_true({c})"),
            CType::Int | CType::Float => format!("({c} != 0)"),
            CType::ListOf(_) | CType::DictOf(_, _) => format!("mp_obj_is_true({c})"),
            CType::RTuple(_) => "true".to_string(),
            CType::Void => "false".to_string(),
        }
    }

    /// Like `emit`, but guarantees the result is `Object`-typed.
    pub fn boxed_text(&self, e: &Expr) -> String {
        if e.ty() == CType::Object {
            self.emit(e)
        } else {
            e.ty().box_expr(&self.emit(e))
        }
    }

    fn emit_call(&self, callee: &str, args: &[Expr], _ty: &CType) -> String {
        if callee == "len" {
            let arg = self.boxed_text(&args[0]);
            return format!("mp_obj_len({arg})");
        }
        if let Some(class) = self.module.class(callee) {
            // `make_new` is the only constructor the class emitter produces
            // (point 6 of the class emitter), so construction from inside
            // another function's body goes through it directly with its
            // actual runtime-protocol signature rather than a separate,
            // never-emitted native constructor.
            let args_c = args.iter().map(|a| self.boxed_text(a)).collect::<Vec<_>>().join(", ");
            let arr = if args.is_empty() { "NULL".to_string() } else { format!("(mp_obj_t[]){{{args_c}}}") };
            return format!("{0}_make_new(&{0}_type, {1}, 0, {arr})", class.c_name, args.len());
        }
        let args_c = args.iter().map(|a| self.emit(a)).collect::<Vec<_>>().join(", ");
        let c_name = self.module.functions.get(callee).map(|f| f.c_name.as_str()).unwrap_or(callee);
        format!("{c_name}({args_c})")
    }

    fn emit_method_call(&self, base: &Expr, method: &str, args: &[Expr], _ty: &CType) -> String {
        let base_c = self.emit(base);
        let args_c = args.iter().map(|a| self.emit(a)).collect::<Vec<_>>().join(", ");
        let joined = if args_c.is_empty() { base_c.clone() } else { format!("{base_c}, {args_c}") };

        let is_self = matches!(base, Expr::Name { name, .. } if name == "self");
        if is_self {
            if let Some(class) = self.current_class {
                let vtable_idx = class.vtable_index_of(method);
                if let Some(_idx) = vtable_idx {
                    return format!("{base_c}->vtable->{}({joined})", sanitize_c_ident(method));
                }
                return format!("{}_{}({joined})", class.c_name, sanitize_c_ident(method));
            }
        }
        // No statically known receiver class: fall back to a generic
        // attribute load followed by a dynamic call, the same path the
        // runtime uses for an ordinary Python method call.
        format!(
            "mp_call_method_n_kw(0, 0, (mp_obj_t[]){{mp_load_attr({base_c}, MP_QSTR_{})}})",
            sanitize_c_ident(method)
        )
    }

    fn emit_tuple_literal(&self, elements: &[Expr], ty: &CType) -> String {
        match ty {
            CType::RTuple(elem_tys) => {
                let fields = elements
                    .iter()
                    .zip(elem_tys)
                    .enumerate()
                    .map(|(i, (e, t))| {
                        let v = if &e.ty() == t { self.emit(e) } else { t.unbox_expr(&self.emit(e)) };
                        format!(".f{i} = {v}")
                    })
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("({}){{{}}}", ty.c_decl(), fields)
            }
            _ => {
                let args = elements.iter().map(|e| self.boxed_text(e)).collect::<Vec<_>>().join(", ");
                format!("mp_obj_new_tuple({}, (mp_obj_t[]){{{}}})", elements.len(), args)
            }
        }
    }
}

fn binop_mp_constant(op: BinOp) -> &'static str {
    match op {
        BinOp::Add => "MP_BINARY_OP_ADD",
        BinOp::Sub => "MP_BINARY_OP_SUBTRACT",
        BinOp::Mul => "MP_BINARY_OP_MULTIPLY",
        BinOp::Div => "MP_BINARY_OP_TRUE_DIVIDE",
        BinOp::FloorDiv => "MP_BINARY_OP_FLOOR_DIVIDE",
        BinOp::Mod => "MP_BINARY_OP_MODULO",
        BinOp::Pow => "MP_BINARY_OP_POWER",
        BinOp::BitAnd => "MP_BINARY_OP_AND",
        BinOp::BitOr => "MP_BINARY_OP_OR",
        BinOp::BitXor => "MP_BINARY_OP_XOR",
        BinOp::LShift => "MP_BINARY_OP_LSHIFT",
        BinOp::RShift => "MP_BINARY_OP_RSHIFT",
    }
}

fn escape_c_string(s: &str) -> String {
    s.chars().flat_map(|c| {
        match c {
            '"' => "\\\"".chars().collect::<Vec<_>>(),
            '\\' => "\\\\".chars().collect::<Vec<_>>(),
            '\n' => "\\n".chars().collect::<Vec<_>>(),
            other => vec![other],
        }
    }).collect()
}
