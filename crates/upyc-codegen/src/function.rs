//! Emits a free function as a pair of C functions: the native
//! implementation (typed params, typed return) and a thin
//! Python-calling-convention wrapper (`mp_obj_t (*)(size_t, const mp_obj_t
//! *)`) that unboxes arguments, calls the native function, and boxes the
//! result.

use upyc_common::{is_private_name, sanitize_c_ident, QstrSet};
use upyc_ir::{FuncIr, Module};
use upyc_types::CType;

use crate::expr::ExprCtx;
use crate::generator::emit_generator;
use crate::stmt;
use crate::writer::Writer;

/// Emits the native function signature, e.g. `mp_int_t mymod_factorial(mp_int_t n)`.
pub fn native_signature(c_name: &str, func: &FuncIr) -> String {
    let params = func
        .params
        .iter()
        .map(|p| format!("{} {}", p.ty.c_decl(), sanitize_c_ident(&p.name)))
        .collect::<Vec<_>>()
        .join(", ");
    let params = if params.is_empty() { "void".to_string() } else { params };
    format!("{} {c_name}({params})", func.return_ty.c_decl())
}

/// Emits the native function body plus (unless private) a wrapper and
/// registers the wrapper's qstr. Returns the emitted C text.
pub fn emit_function(module: &Module, func: &FuncIr, qstrs: &mut QstrSet) -> String {
    if func.is_generator() {
        return emit_generator(module, func, qstrs);
    }

    let mut w = Writer::new();
    let ctx = ExprCtx { module, current_class: None, return_ty: func.return_ty.clone(), is_generator: false };

    w.block(format!("static {}", native_signature(&func.c_name, func)), |w| {
        stmt::emit_block(w, &ctx, &func.body);
    });
    w.blank();

    if !func.is_private {
        w.raw(emit_wrapper(func, qstrs));
    }
    w.finish()
}

fn emit_wrapper(func: &FuncIr, qstrs: &mut QstrSet) -> String {
    qstrs.intern(func.name.clone());
    let wrapper_name = format!("{}_wrapper", func.c_name);
    let mut w = Writer::new();
    w.block(
        format!("static mp_obj_t {wrapper_name}(size_t n_args, const mp_obj_t *args)"),
        |w| {
            w.line("(void)n_args;");
            let arg_names = func
                .params
                .iter()
                .enumerate()
                .map(|(i, p)| {
                    let name = sanitize_c_ident(&p.name);
                    w.line(format!("{} {name} = {};", p.ty.c_decl(), p.ty.unbox_expr(&format!("args[{i}]"))));
                    name
                })
                .collect::<Vec<_>>();
            let call = format!("{}({})", func.c_name, arg_names.join(", "));
            if func.return_ty == CType::Void {
                w.line(format!("{call};"));
                w.line("return mp_const_none;");
            } else {
                w.line(format!("return {};", func.return_ty.box_expr(&call)));
            }
        },
    );
    w.blank();
    let min_args = func.params.iter().filter(|p| p.default.is_none()).count();
    w.line(format!(
        "static MP_DEFINE_CONST_FUN_OBJ_VAR_BETWEEN({wrapper_name}_obj, {min_args}, {}, {wrapper_name});",
        func.params.len()
    ));
    w.finish()
}

/// Globals-table entry text for a public free function, or `None` for a
/// private (double-underscore) one.
pub fn globals_entry(func: &FuncIr) -> Option<String> {
    if is_private_name(&func.name) {
        return None;
    }
    Some(format!(
        "{{ MP_ROM_QSTR(MP_QSTR_{}), MP_ROM_PTR(&{}_wrapper_obj) }}",
        sanitize_c_ident(&func.name),
        func.c_name,
    ))
}
