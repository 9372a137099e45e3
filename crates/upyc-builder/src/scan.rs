//! Small AST-facing helpers shared by the collection and lowering passes:
//! pulling literal values and raw annotation text out of `ruff_python_ast`
//! nodes without committing the rest of the crate to that crate's exact
//! expression shapes.

use ruff_python_ast::{self as ast, Expr};
use ruff_text_size::Ranged;

/// Slices the source text covering `expr`'s range, which is how annotations
/// get handed to `upyc_types::resolve_annotation` — the type system stays
/// independent of the parser crate and only ever sees text.
pub fn text_of<'a>(source: &'a str, expr: &Expr) -> &'a str {
    let range = expr.range();
    &source[range.start().to_usize()..range.end().to_usize()]
}

pub fn decorator_names(decorators: &[ast::Decorator], source: &str) -> Vec<String> {
    decorators
        .iter()
        .map(|d| decorator_base_name(&d.expression, source))
        .collect()
}

/// The callable name of a decorator, ignoring any call arguments:
/// `@dataclass` and `@dataclass(frozen=True)` both yield `"dataclass"`.
fn decorator_base_name(expr: &Expr, source: &str) -> String {
    match expr {
        Expr::Call(ast::ExprCall { func, .. }) => decorator_base_name(func, source),
        Expr::Attribute(ast::ExprAttribute { attr, .. }) => attr.as_str().to_string(),
        Expr::Name(ast::ExprName { id, .. }) => id.as_str().to_string(),
        other => text_of(source, other).to_string(),
    }
}

/// Reads the boolean value of a `dataclass(...)` keyword argument such as
/// `frozen=True`, defaulting to `false` when absent.
pub fn dataclass_bool_kwarg(call: &ast::ExprCall, name: &str) -> bool {
    call.arguments
        .keywords
        .iter()
        .find(|kw| kw.arg.as_ref().is_some_and(|a| a.as_str() == name))
        .is_some_and(|kw| matches!(&kw.value, Expr::BooleanLiteral(b) if b.value))
}

pub fn int_literal_value(int: &ast::Int) -> Option<i64> {
    int.to_string().parse::<i64>().ok()
}
