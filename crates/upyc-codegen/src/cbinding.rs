//! Emits a module wrapping an external C library, described by a
//! `LibraryIr` built from a stub file. Separate pipeline from the main
//! Module emitter: there's no Python body to lower, only signatures to
//! wrap.

use upyc_common::QstrSet;
use upyc_ir::{CallbackDef, EnumDef, FunctionDef, LibraryIr, StructDef};
use upyc_types::CType;

use crate::writer::Writer;

pub fn emit_library(lib: &LibraryIr) -> String {
    let mut qstrs = QstrSet::new();
    let mut w = Writer::new();

    w.line("#include \"py/obj.h\"");
    w.line("#include \"py/runtime.h\"");
    w.line(format!("#include \"{}\"", lib.header_include));
    w.blank();

    emit_callback_registry(&mut w, lib);

    for s in lib.structs.values() {
        emit_struct_wrapper(&mut w, s, &mut qstrs);
        w.blank();
    }
    for e in lib.enums.values() {
        emit_enum_consts(&mut w, e, &mut qstrs);
        w.blank();
    }
    for cb in lib.callbacks.values() {
        emit_trampoline(&mut w, cb);
        w.blank();
    }
    for f in lib.functions.values() {
        emit_function_wrapper(&mut w, f, &mut qstrs);
        w.blank();
    }

    emit_globals_table(&mut w, lib, &mut qstrs);
    w.blank();
    emit_module_def(&mut w, lib);

    w.finish()
}

/// A process-wide, GC-rooted sequence of Python callables; a callback
/// trampoline's `user_data` slot is an index into this table rather than a
/// raw `mp_obj_t`, so the registry — not the C call site — owns the
/// reference the GC needs to see.
fn emit_callback_registry(w: &mut Writer, lib: &LibraryIr) {
    if lib.callbacks.is_empty() {
        return;
    }
    w.line(format!("#define {}_MAX_CALLBACKS 16", lib.name.to_uppercase()));
    w.line(format!(
        "static mp_obj_t {}_callback_registry[{}_MAX_CALLBACKS];",
        lib.name,
        lib.name.to_uppercase()
    ));
    w.line(format!("static size_t {}_callback_count;", lib.name));
    w.blank();
    w.block(
        format!("static size_t {}_register_callback(mp_obj_t callable)", lib.name),
        |w| {
            w.line(format!(
                "size_t idx = {}_callback_count++;",
                lib.name
            ));
            w.line(format!("{}_callback_registry[idx] = callable;", lib.name));
            w.line("return idx;");
        },
    );
    w.blank();
    w.block(
        format!("void {}_callback_registry_gc_root(void)", lib.name),
        |w| {
            w.line(format!(
                "MP_STATE_VM(upyc_{}_roots) = {}_callback_registry;",
                lib.name, lib.name
            ));
        },
    );
}

fn wrapper_type_name(c_name: &str) -> String {
    format!("{c_name}_wrapper_t")
}

/// Pointer wrappers: base header + `void *ptr`, with a `wrap`/`unwrap` pair.
/// `NULL` round-trips through `mp_const_none` so a failed lookup or an
/// absent optional out-pointer reads as `None` in Python, not a wrapper
/// holding a null pointer.
fn emit_struct_wrapper(w: &mut Writer, s: &StructDef, qstrs: &mut QstrSet) {
    qstrs.intern(s.py_name.clone());
    let wrapper_t = wrapper_type_name(&s.c_name);
    w.block(format!("typedef struct _{wrapper_t}"), |w| {
        w.line("mp_obj_base_t base;");
        w.line(format!("{} *ptr;", s.c_name));
    });
    w.line(format!("}} {wrapper_t};"));
    w.blank();
    w.line(format!("static const mp_obj_type_t {}_type;", s.c_name));
    w.blank();

    w.block(format!("static mp_obj_t wrap_{}({} *raw)", s.c_name, s.c_name), |w| {
        w.block("if (raw == NULL)", |w| w.line("return mp_const_none;"));
        w.line(format!("{wrapper_t} *self = m_new_obj({wrapper_t});"));
        w.line(format!("self->base.type = &{}_type;", s.c_name));
        w.line("self->ptr = raw;");
        w.line("return MP_OBJ_FROM_PTR(self);");
    });
    w.blank();

    w.block(format!("static {} *unwrap_{}(mp_obj_t obj)", s.c_name, s.c_name), |w| {
        w.block("if (obj == mp_const_none)", |w| w.line("return NULL;"));
        w.line(format!("{wrapper_t} *self = MP_OBJ_TO_PTR(obj);"));
        w.line("return self->ptr;");
    });
    w.blank();

    if !s.opaque {
        emit_transparent_struct_attr(w, s);
        w.blank();
    }

    w.line(format!(
        "MP_DEFINE_CONST_OBJ_TYPE({}_type, MP_QSTR_{}, MP_TYPE_FLAG_NONE, make_new, NULL{});",
        s.c_name,
        s.py_name,
        if s.opaque { "" } else { ", attr, struct_attr" }
    ));
}

fn emit_transparent_struct_attr(w: &mut Writer, s: &StructDef) {
    let wrapper_t = wrapper_type_name(&s.c_name);
    w.block(
        format!("static void {}_attr(mp_obj_t self_in, qstr attr, mp_obj_t *dest)", s.c_name),
        |w| {
            w.line(format!("{wrapper_t} *self = MP_OBJ_TO_PTR(self_in);"));
            w.block("if (dest[0] == MP_OBJ_NULL)", |w| {
                w.block("switch (attr)", |w| {
                    for (name, ty) in &s.fields {
                        w.line(format!(
                            "case MP_QSTR_{name}: dest[0] = {}; return;",
                            ty.box_expr(&format!("self->ptr->{name}"))
                        ));
                    }
                    w.line("default: return;");
                });
            });
        },
    );
}

fn emit_enum_consts(w: &mut Writer, e: &EnumDef, qstrs: &mut QstrSet) {
    qstrs.intern(e.py_name.clone());
    for (name, value) in &e.variants {
        qstrs.intern(name.clone());
        w.line(format!("#define UPYC_ENUM_{}_{name} ({value})", e.c_name));
    }
}

/// A trampoline for a declared callback type: locates the stored Python
/// callable from the registry index packed into `user_data`, converts
/// arguments, and calls it.
fn emit_trampoline(w: &mut Writer, cb: &CallbackDef) {
    let params = cb
        .params
        .iter()
        .enumerate()
        .map(|(i, ty)| format!("{} a{i}", ty.c_decl()))
        .collect::<Vec<_>>()
        .join(", ");
    let user_data_param = cb.user_data_param.clone().unwrap_or_else(|| "user_data".to_string());
    let params = if params.is_empty() {
        format!("void *{user_data_param}")
    } else {
        format!("{params}, void *{user_data_param}")
    };

    w.block(format!("static {} {}_trampoline({params})", cb.return_ty.c_decl(), cb.name), |w| {
        w.line(format!("size_t idx = (size_t)(uintptr_t){user_data_param};"));
        w.line(format!(
            "mp_obj_t callable = upyc_callback_registry_get(idx);"
        ));
        let args = cb
            .params
            .iter()
            .enumerate()
            .map(|(i, ty)| ty.box_expr(&format!("a{i}")))
            .collect::<Vec<_>>()
            .join(", ");
        let call = if cb.params.is_empty() {
            "mp_call_function_0(callable)".to_string()
        } else {
            format!(
                "mp_call_function_n_kw(callable, {}, 0, (mp_obj_t[]){{{args}}})",
                cb.params.len()
            )
        };
        if cb.return_ty == CType::Void {
            w.line(format!("(void){call};"));
        } else {
            w.line(format!("mp_obj_t _upyc_result = {call};"));
            w.line(format!("return {};", cb.return_ty.unbox_expr("_upyc_result")));
        }
    });
}

fn emit_function_wrapper(w: &mut Writer, f: &FunctionDef, qstrs: &mut QstrSet) {
    qstrs.intern(f.py_name.clone());
    let wrapper_name = format!("{}_wrapper", f.c_name);
    w.block(
        format!("static mp_obj_t {wrapper_name}(size_t n_args, const mp_obj_t *args)"),
        |w| {
            w.line("(void)n_args;");
            let arg_names = f
                .params
                .iter()
                .enumerate()
                .map(|(i, (name, ty))| {
                    w.line(format!("{} {name} = {};", ty.c_decl(), ty.unbox_expr(&format!("args[{i}]"))));
                    name.clone()
                })
                .collect::<Vec<_>>();
            let call = format!("{}({})", f.c_name, arg_names.join(", "));
            if f.return_ty == CType::Void {
                w.line(format!("{call};"));
                w.line("return mp_const_none;");
            } else {
                w.line(format!("return {};", f.return_ty.box_expr(&call)));
            }
        },
    );
    w.blank();
    w.line(format!(
        "static MP_DEFINE_CONST_FUN_OBJ_VAR_BETWEEN({wrapper_name}_obj, {}, {}, {wrapper_name});",
        f.params.len(),
        f.params.len()
    ));
}

fn emit_globals_table(w: &mut Writer, lib: &LibraryIr, qstrs: &mut QstrSet) {
    qstrs.intern(lib.name.clone());
    w.line(format!("static const mp_rom_map_elem_t {}_globals_table[] = {{", lib.name));
    w.indent();
    w.line(format!(
        "{{ MP_ROM_QSTR(MP_QSTR___name__), MP_ROM_QSTR(MP_QSTR_{}) }},",
        lib.name
    ));
    for s in lib.structs.values() {
        w.line(format!(
            "{{ MP_ROM_QSTR(MP_QSTR_{}), MP_ROM_PTR(&{}_type) }},",
            s.py_name, s.c_name
        ));
    }
    for f in lib.functions.values() {
        w.line(format!(
            "{{ MP_ROM_QSTR(MP_QSTR_{}), MP_ROM_PTR(&{}_wrapper_obj) }},",
            f.py_name, f.c_name
        ));
    }
    w.dedent();
    w.line("};");
    w.line(format!(
        "static MP_DEFINE_CONST_DICT({}_globals, {}_globals_table);",
        lib.name, lib.name
    ));
}

fn emit_module_def(w: &mut Writer, lib: &LibraryIr) {
    w.line(format!("const mp_obj_module_t {}_user_cmodule = {{", lib.name));
    w.indent();
    w.line(".base = { &mp_type_module },");
    w.line(format!(".globals = (mp_obj_dict_t *)&{}_globals,", lib.name));
    w.dedent();
    w.line("};");
    w.blank();
    w.line(format!("MP_REGISTER_MODULE(MP_QSTR_{}, {}_user_cmodule);", lib.name, lib.name));
}
