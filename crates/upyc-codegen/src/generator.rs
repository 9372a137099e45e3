//! Lowers a generator function to a resumable state machine: an instance
//! struct holding every local that survives across a yield, a
//! `switch`/`goto` dispatcher, and the type plumbing needed to hand that
//! struct back to the interpreter as an iterator.
//!
//! Every surviving local is promoted straight into the struct (the builder
//! computes this conservatively, without real liveness analysis — a local
//! that's merely declared before the first yield is kept alive for the
//! whole generator). Inside the body, `#define` aliases make each local
//! still read as a bare identifier; they're undone at the end of the
//! function so the macro namespace doesn't leak.

use upyc_common::{sanitize_c_ident, QstrSet};
use upyc_ir::{ClassIr, FuncIr, Module};
use upyc_types::CType;

use crate::expr::ExprCtx;
use crate::stmt;
use crate::writer::Writer;

const DONE_STATE: &str = "0xFFFFu";

/// A generator method (`def __iter__`-style bodies containing `yield`) gets
/// the same instance-struct/switch/goto treatment as a free generator
/// function, plus an extra `self` field pointing back at the object the
/// generator was created from, so the body's `self.foo` attribute accesses
/// still resolve.
pub fn emit_generator_method(module: &Module, class: &ClassIr, name: &str, func: &FuncIr) -> String {
    let info = func.generator.as_ref().expect("emit_generator_method called on a non-generator MethodIr");
    let gen_c_name = format!("{}_{name}", class.c_name);
    let struct_name = format!("{gen_c_name}_gen_t");

    let mut w = Writer::new();

    w.block(format!("typedef struct _{struct_name}"), |w| {
        w.line("mp_obj_base_t base;");
        w.line("mp_uint_t _gen_state;");
        if info.uses_external_iterator {
            w.line("mp_obj_iter_buf_t _iter_buf;");
        }
        w.line(format!("{}_t *self;", class.c_name));
        for (local_name, ty) in &info.surviving_locals {
            w.line(format!("{} {};", ty.c_decl(), sanitize_c_ident(local_name)));
        }
    });
    w.line(format!("}} {struct_name};"));
    w.blank();

    w.line(format!("static const mp_obj_type_t {gen_c_name}_gen_type;"));
    w.blank();

    w.block(
        format!("static mp_obj_t {gen_c_name}_gen_iternext(mp_obj_t self_in)"),
        |w| {
            w.line(format!("{struct_name} *_upyc_gen = MP_OBJ_TO_PTR(self_in);"));
            w.line(format!("{}_t *self = _upyc_gen->self;", class.c_name));
            for (local_name, _) in &info.surviving_locals {
                let n = sanitize_c_ident(local_name);
                w.line(format!("#define {n} (_upyc_gen->{n})"));
            }
            w.blank();

            // Load the resume state into a local and mark the generator
            // exhausted before dispatch, so a reentrant call made while this
            // body is already executing sees the done sentinel instead of
            // re-entering the live body.
            w.line("mp_uint_t _upyc_resume_state = _upyc_gen->_gen_state;");
            w.line(format!("_upyc_gen->_gen_state = {DONE_STATE};"));
            w.block("switch (_upyc_resume_state)", |w| {
                w.line("case 0: goto _upyc_gen_start;");
                for state in &info.yield_state_ids {
                    w.line(format!("case {state}: goto _upyc_gen_state_{state};"));
                }
                w.line(format!("case {DONE_STATE}: default: return MP_OBJ_STOP_ITERATION;"));
            });
            w.blank();

            w.line("_upyc_gen_start:;");
            let ctx = ExprCtx {
                module,
                current_class: Some(class),
                return_ty: CType::Void,
                is_generator: true,
            };
            stmt::emit_block(w, &ctx, &func.body);

            w.blank();
            w.line("_upyc_gen_done:;");
            w.line(format!("_upyc_gen->_gen_state = {DONE_STATE};"));
            w.line("return MP_OBJ_STOP_ITERATION;");

            w.blank();
            for (local_name, _) in &info.surviving_locals {
                w.line(format!("#undef {}", sanitize_c_ident(local_name)));
            }
        },
    );
    w.blank();

    let extra_params = func
        .params
        .iter()
        .map(|p| format!(", {} {}", p.ty.c_decl(), sanitize_c_ident(&p.name)))
        .collect::<String>();
    w.block(
        format!("static mp_obj_t {gen_c_name}({}_t *self{extra_params})", class.c_name),
        |w| {
            w.line(format!("{struct_name} *_upyc_gen = m_new_obj({struct_name});"));
            w.line(format!("_upyc_gen->base.type = &{gen_c_name}_gen_type;"));
            w.line("_upyc_gen->_gen_state = 0;");
            w.line("_upyc_gen->self = self;");
            for p in &func.params {
                let n = sanitize_c_ident(&p.name);
                w.line(format!("_upyc_gen->{n} = {n};"));
            }
            w.line("return MP_OBJ_FROM_PTR(_upyc_gen);");
        },
    );
    w.blank();

    w.line(format!(
        "MP_DEFINE_CONST_OBJ_TYPE({gen_c_name}_gen_type, MP_QSTR_{name}, MP_TYPE_FLAG_ITER_IS_ITERNEXT, iternext, {gen_c_name}_gen_iternext);"
    ));

    w.finish()
}

pub fn emit_generator(module: &Module, func: &FuncIr, qstrs: &mut QstrSet) -> String {
    let info = func.generator.as_ref().expect("emit_generator called on a non-generator FuncIr");
    let struct_name = format!("{}_gen_t", func.c_name);

    let mut w = Writer::new();

    w.block(format!("typedef struct _{struct_name}"), |w| {
        w.line("mp_obj_base_t base;");
        w.line("mp_uint_t _gen_state;");
        if info.uses_external_iterator {
            w.line("mp_obj_iter_buf_t _iter_buf;");
        }
        for (name, ty) in &info.surviving_locals {
            w.line(format!("{} {};", ty.c_decl(), sanitize_c_ident(name)));
        }
    });
    w.line(format!("}} {struct_name};"));
    w.blank();

    w.line(format!(
        "static const mp_obj_type_t {}_gen_type;",
        func.c_name
    ));
    w.blank();

    emit_iternext(&mut w, module, func, &struct_name, info);
    w.blank();
    emit_maker(&mut w, func, &struct_name);
    w.blank();

    w.line(format!(
        "MP_DEFINE_CONST_OBJ_TYPE({0}_gen_type, MP_QSTR_{0}, MP_TYPE_FLAG_ITER_IS_ITERNEXT, iternext, {0}_gen_iternext);",
        func.c_name
    ));
    w.blank();

    if !func.is_private {
        w.raw(emit_wrapper(func, qstrs));
    }

    w.finish()
}

fn emit_iternext(
    w: &mut Writer,
    module: &Module,
    func: &FuncIr,
    struct_name: &str,
    info: &upyc_ir::GeneratorInfo,
) {
    w.block(
        format!("static mp_obj_t {}_gen_iternext(mp_obj_t self_in)", func.c_name),
        |w| {
            w.line(format!("{struct_name} *self = MP_OBJ_TO_PTR(self_in);"));
            for (name, _) in &info.surviving_locals {
                let n = sanitize_c_ident(name);
                w.line(format!("#define {n} (self->{n})"));
            }
            w.blank();

            // Load the resume state into a local and mark the generator
            // exhausted before dispatch, so a reentrant call made while this
            // body is already executing sees the done sentinel instead of
            // re-entering the live body.
            w.line("mp_uint_t _upyc_resume_state = self->_gen_state;");
            w.line(format!("self->_gen_state = {DONE_STATE};"));
            w.block("switch (_upyc_resume_state)", |w| {
                w.line("case 0: goto _upyc_gen_start;");
                for state in &info.yield_state_ids {
                    w.line(format!("case {state}: goto _upyc_gen_state_{state};"));
                }
                w.line(format!("case {DONE_STATE}: default: return MP_OBJ_STOP_ITERATION;"));
            });
            w.blank();

            w.line("_upyc_gen_start:;");
            let ctx = ExprCtx {
                module,
                current_class: None,
                return_ty: CType::Void,
                is_generator: true,
            };
            stmt::emit_block(w, &ctx, &func.body);

            w.blank();
            w.line("_upyc_gen_done:;");
            w.line(format!("self->_gen_state = {DONE_STATE};"));
            w.line("return MP_OBJ_STOP_ITERATION;");

            w.blank();
            for (name, _) in &info.surviving_locals {
                w.line(format!("#undef {}", sanitize_c_ident(name)));
            }
        },
    );
}

fn emit_maker(w: &mut Writer, func: &FuncIr, struct_name: &str) {
    let params = func
        .params
        .iter()
        .map(|p| format!("{} {}", p.ty.c_decl(), sanitize_c_ident(&p.name)))
        .collect::<Vec<_>>()
        .join(", ");
    let params = if params.is_empty() { "void".to_string() } else { params };

    w.block(format!("static mp_obj_t {}({params})", func.c_name), |w| {
        w.line(format!(
            "{struct_name} *self = m_new_obj({struct_name});"
        ));
        w.line(format!("self->base.type = &{}_gen_type;", func.c_name));
        w.line("self->_gen_state = 0;");
        for p in &func.params {
            let n = sanitize_c_ident(&p.name);
            w.line(format!("self->{n} = {n};"));
        }
        w.line("return MP_OBJ_FROM_PTR(self);");
    });
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
            w.line(format!("return {}({});", func.c_name, arg_names.join(", ")));
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
