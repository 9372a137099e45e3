//! Emits a class: the instance struct (with the base embedded as the
//! struct's first member, so field offsets laid out over the base's fields
//! stay valid when read back through a pointer to the derived struct), the
//! vtable struct and its per-class static instance, every method, and the
//! `mp_obj_type_t` slot functions (`make_new`/`print`/`attr`/`binary_op`/
//! `iter`/`iternext`) `RequiredSlots` calls for.
//!
//! Every class gets its own flat vtable struct — even one that adds no new
//! virtual method redeclares the full flattened slot list rather than
//! embedding its base's vtable type — so a slot lookup is always a single
//! direct member access (`self->vtable->method(...)`), never a nested
//! `.base.base...` chain.

use upyc_common::QstrSet;
use upyc_ir::{ClassIr, FuncIr, MethodIr, MethodKind, Module};
use upyc_types::CType;

use crate::expr::ExprCtx;
use crate::generator::emit_generator_method;
use crate::stmt;
use crate::writer::Writer;

pub fn emit_class(module: &Module, class: &ClassIr, qstrs: &mut QstrSet) -> String {
    let mut w = Writer::new();

    emit_struct(&mut w, module, class);
    w.blank();

    if class.vtable_size > 0 {
        emit_vtable(&mut w, module, class);
        w.blank();
    }

    for (name, method) in &class.methods {
        w.raw(emit_method(module, class, name, method));
        w.blank();
    }

    emit_make_new(&mut w, module, class, qstrs);
    w.blank();

    if class.slots.print {
        emit_print(&mut w, module, class);
        w.blank();
    }
    if class.slots.attr {
        emit_attr(&mut w, module, class, qstrs);
        w.blank();
    }
    if class.slots.binary_op {
        emit_binary_op(&mut w, class);
        w.blank();
    }
    if class.slots.iter {
        emit_iter(&mut w, class);
        w.blank();
    }
    if class.slots.iternext {
        emit_iternext_slot(&mut w, class);
        w.blank();
    }
    if class.slots.locals_dict {
        emit_locals_dict(&mut w, class, qstrs);
        w.blank();
    }

    emit_type(&mut w, module, class, qstrs);

    w.finish()
}

fn emit_struct(w: &mut Writer, module: &Module, class: &ClassIr) {
    w.block(format!("typedef struct _{}", class.c_name), |w| {
        match &class.base_name {
            Some(base) => {
                let base_c_name = module.class(base).map(|b| b.c_name.as_str()).unwrap_or(base.as_str());
                w.line(format!("{base_c_name}_t super;"));
            }
            None => w.line("mp_obj_base_t base;"),
        }
        if class.vtable_size > 0 {
            w.line(format!("const {}_vtable_t *vtable;", class.c_name));
        }
        for field in &class.fields {
            w.line(format!("{} {};", field.ty.c_decl(), field.name));
        }
    });
    w.line(format!("}} {}_t;", class.c_name));
}

/// Every virtual method reachable from `class`, in stable slot order
/// (ancestors' slots first, matching how `assign_vtables` allocated them).
fn flattened_virtual_methods(module: &Module, class_name: &str) -> Vec<String> {
    let mut chain = Vec::new();
    let mut cur = Some(class_name.to_string());
    while let Some(name) = cur {
        let Some(class) = module.class(&name) else { break };
        chain.push(class);
        cur = class.base_name.clone();
    }
    let mut out = Vec::new();
    for class in chain.into_iter().rev() {
        out.extend(class.virtual_methods.iter().cloned());
    }
    out
}

/// Walks from `class_name` toward the root looking for the class that
/// actually defines `method_name` — the one whose native function a vtable
/// slot or a non-virtual call should target.
fn resolve_impl_class<'m>(module: &'m Module, class_name: &str, method_name: &str) -> Option<&'m ClassIr> {
    let mut cur = Some(class_name.to_string());
    while let Some(name) = cur {
        let class = module.class(&name)?;
        if class.methods.contains_key(method_name) {
            return Some(class);
        }
        cur = class.base_name.clone();
    }
    None
}

fn emit_vtable(w: &mut Writer, module: &Module, class: &ClassIr) {
    let methods = flattened_virtual_methods(module, &class.py_name);

    w.block(format!("typedef struct _{}_vtable_t", class.c_name), |w| {
        for name in &methods {
            emit_vtable_slot(w, module, class, name);
        }
    });
    w.line(format!("}} {}_vtable_t;", class.c_name));
    w.blank();

    w.block(format!("static const {}_vtable_t {}_vtable", class.c_name, class.c_name), |w| {
        for name in &methods {
            let impl_class = resolve_impl_class(module, &class.py_name, name)
                .expect("a vtable method must be defined somewhere in its own ancestry");
            // An inherited (non-overridden) slot's implementation takes a
            // pointer to its defining ancestor's struct, not this class's;
            // the cast is safe because every derived struct embeds its base
            // as the first member, so the two pointer types share a layout.
            if impl_class.c_name == class.c_name {
                w.line(format!(".{name} = {}_{name},", impl_class.c_name));
            } else {
                w.line(format!(
                    ".{name} = (void *){}_{name},",
                    impl_class.c_name
                ));
            }
        }
    });
    w.line(";");
}

fn emit_vtable_slot(w: &mut Writer, module: &Module, class: &ClassIr, method_name: &str) {
    let owner = resolve_impl_class(module, &class.py_name, method_name)
        .expect("virtual method must resolve to a defining class");
    let method = owner.methods.get(method_name).expect("defining class must own the method");
    let ret = method.func.return_ty.c_decl();
    let params = method.func.params.iter().map(|p| p.ty.c_decl()).collect::<Vec<_>>().join(", ");
    let params = if params.is_empty() {
        format!("struct _{}_t *", class.c_name)
    } else {
        format!("struct _{}_t *, {params}", class.c_name)
    };
    w.line(format!("{ret} (*{method_name})({params});"));
}

fn emit_method(module: &Module, class: &ClassIr, name: &str, method: &MethodIr) -> String {
    if method.func.is_generator() {
        return emit_generator_method(module, class, name, &method.func);
    }
    if method.func.is_synthesized_repr {
        return emit_dataclass_repr(module, class);
    }

    let mut w = Writer::new();
    let ctx = ExprCtx {
        module,
        current_class: Some(class),
        return_ty: method.func.return_ty.clone(),
        is_generator: false,
    };

    let self_param = match method.kind {
        MethodKind::Static => None,
        _ => Some(format!("{}_t *self", class.c_name)),
    };
    let other_params = method
        .func
        .params
        .iter()
        .map(|p| format!("{} {}", p.ty.c_decl(), p.name))
        .collect::<Vec<_>>();
    let all_params = self_param.into_iter().chain(other_params).collect::<Vec<_>>().join(", ");
    let all_params = if all_params.is_empty() { "void".to_string() } else { all_params };

    w.block(
        format!("static {} {}_{name}({all_params})", method.func.return_ty.c_decl(), class.c_name),
        |w| stmt::emit_block(w, &ctx, &method.func.body),
    );
    w.finish()
}

fn emit_make_new(w: &mut Writer, module: &Module, class: &ClassIr, qstrs: &mut QstrSet) {
    let init = class.methods.get("__init__");
    let n_args = init.map(|m| m.func.params.len()).unwrap_or(0);

    w.block(
        format!(
            "static mp_obj_t {}_make_new(const mp_obj_type_t *type, size_t n_args, size_t n_kw, const mp_obj_t *args)",
            class.c_name
        ),
        |w| {
            w.line("(void)type;");
            w.line("(void)n_kw;");
            w.line(format!("mp_arg_check_num(n_args, n_kw, {n_args}, {n_args}, false);"));
            w.line(format!("{}_t *self = m_new0({}_t, 1);", class.c_name, class.c_name));
            w.line(format!("self->base.type = &{}_type;", class.c_name));
            if class.vtable_size > 0 {
                w.line(format!("self->vtable = &{}_vtable;", class.c_name));
            }
            for field in &class.fields {
                qstrs.intern(field.name.clone());
            }
            match init {
                Some(m) => {
                    for (i, p) in m.func.params.iter().enumerate() {
                        w.line(format!("{} {} = {};", p.ty.c_decl(), p.name, p.ty.unbox_expr(&format!("args[{i}]"))));
                    }
                    let args = m.func.params.iter().map(|p| format!(", {}", p.name)).collect::<String>();
                    w.line(format!("{}___init__(self{args});", class.c_name));
                }
                None => emit_default_field_init(w, module, class),
            }
            w.line("return MP_OBJ_FROM_PTR(self);");
        },
    );
}

/// Applies each field's literal default directly, used for classes with no
/// user-written `__init__` (every dataclass without one still gets its
/// defaults this way since synthesis only runs when a body is missing).
fn emit_default_field_init(w: &mut Writer, module: &Module, class: &ClassIr) {
    let ctx = ExprCtx { module, current_class: Some(class), return_ty: CType::Void, is_generator: false };
    for (path, field) in module.flattened_fields(&class.py_name) {
        if let Some(upyc_ir::FieldDefault::Literal(expr)) = &field.default {
            let value = if expr.ty() == field.ty { ctx.emit(expr) } else { field.ty.unbox_expr(&ctx.emit(expr)) };
            w.line(format!("self->{path} = {value};"));
        }
    }
}

fn emit_print(w: &mut Writer, module: &Module, class: &ClassIr) {
    w.block(
        format!(
            "static void {}_print(const mp_print_t *print, mp_obj_t self_in, mp_print_kind_t kind)",
            class.c_name
        ),
        |w| {
            w.line("(void)kind;");
            let synthesized_repr =
                class.methods.get("__repr__").map(|m| m.func.is_synthesized_repr).unwrap_or(false);
            if synthesized_repr {
                w.line(format!("{}_t *self = MP_OBJ_TO_PTR(self_in);", class.c_name));
                emit_dataclass_repr_fields(w, module, class, "print", "self");
                return;
            }
            w.line("(void)self_in;");
            let repr = class
                .methods
                .get("__repr__")
                .or_else(|| class.methods.get("__str__"))
                .map(|m| text_literal_return(&m.func))
                .unwrap_or_else(|| format!("{}(...)", class.py_name));
            w.line(format!("mp_printf(print, \"%s\", \"{}\");", escape(&repr)));
        },
    );
}

/// Emits the synthesized `__repr__` body: builds "ClassName(field=value, ...)"
/// into a `vstr_t` via the print-stream redirection MicroPython itself uses
/// for string-building (a `mp_print_t` whose data pointer is the `vstr_t`),
/// printing every field's real runtime value through `mp_obj_print_helper`
/// rather than a fixed placeholder.
fn emit_dataclass_repr(module: &Module, class: &ClassIr) -> String {
    let mut w = Writer::new();
    w.block(format!("static mp_obj_t {0}___repr__({0}_t *self)", class.c_name), |w| {
        w.line("vstr_t _upyc_vstr;");
        w.line("vstr_init(&_upyc_vstr, 16);");
        w.line("mp_print_t _upyc_print = { &_upyc_vstr, (mp_print_strn_t)vstr_add_strn };");
        emit_dataclass_repr_fields(w, module, class, "(&_upyc_print)", "self");
        w.line("return mp_obj_new_str_from_vstr(&mp_type_str, &_upyc_vstr);");
    });
    w.finish()
}

/// Writes "ClassName(field=value, ...)" to `print_var` (an `mp_print_t *`),
/// reading each field straight off `self_var` and boxing it so
/// `mp_obj_print_helper` can print its real runtime representation. Shared
/// between the print slot and the standalone `__repr__` native function so
/// both show the same field values instead of one delegating to a fixed
/// placeholder.
fn emit_dataclass_repr_fields(w: &mut Writer, module: &Module, class: &ClassIr, print_var: &str, self_var: &str) {
    w.line(format!("mp_printf({print_var}, \"%s(\", \"{}\");", class.py_name));
    let fields = module.flattened_fields(&class.py_name);
    for (i, (path, field)) in fields.iter().enumerate() {
        let sep = if i == 0 { "" } else { ", " };
        w.line(format!("mp_printf({print_var}, \"{sep}{}=\");", field.name));
        w.line(format!(
            "mp_obj_print_helper({print_var}, {}, PRINT_REPR);",
            field.ty.box_expr(&format!("{self_var}->{path}"))
        ));
    }
    w.line(format!("mp_printf({print_var}, \")\");"));
}

/// Dataclass `__repr__`/`__str__` synthesis always returns a single string
/// literal; this reads that literal back out rather than re-emitting the
/// function body (the print slot needs the raw text, not a boxed object).
fn text_literal_return(func: &FuncIr) -> String {
    use upyc_ir::{Literal, StmtKind};
    for stmt in &func.body {
        if let StmtKind::Return { value: Some(upyc_ir::Expr::Literal { value: Literal::Str(s), .. }) } = &stmt.kind {
            return s.clone();
        }
    }
    String::new()
}

fn escape(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

fn emit_attr(w: &mut Writer, module: &Module, class: &ClassIr, qstrs: &mut QstrSet) {
    w.block(
        format!("static void {}_attr(mp_obj_t self_in, qstr attr, mp_obj_t *dest)", class.c_name),
        |w| {
            w.line(format!("{}_t *self = MP_OBJ_TO_PTR(self_in);", class.c_name));
            w.block("if (dest[0] == MP_OBJ_NULL)", |w| {
                w.block("switch (attr)", |w| {
                    for (path, field) in module.flattened_fields(&class.py_name) {
                        qstrs.intern(field.name.clone());
                        w.line(format!(
                            "case MP_QSTR_{}: dest[0] = {}; return;",
                            field.name,
                            field.ty.box_expr(&format!("self->{path}"))
                        ));
                    }
                    for name in module.flattened_method_names(&class.py_name) {
                        if upyc_common::is_private_name(&name) || is_dunder_like(&name) {
                            continue;
                        }
                        qstrs.intern(name.clone());
                        w.line(format!(
                            "case MP_QSTR_{name}: dest[0] = MP_OBJ_FROM_PTR(&{}_{name}_obj); dest[1] = self_in; return;",
                            class.c_name
                        ));
                    }
                    w.line("default: return;");
                });
            });
            w.block("else if (dest[1] != MP_OBJ_NULL)", |w| {
                w.block("switch (attr)", |w| {
                    for (path, field) in module.flattened_fields(&class.py_name) {
                        w.line(format!(
                            "case MP_QSTR_{}: self->{path} = {}; dest[0] = MP_OBJ_NULL; return;",
                            field.name,
                            field.ty.unbox_expr("dest[1]")
                        ));
                    }
                    w.line("default: return;");
                });
            });
        },
    );
}

fn is_dunder_like(name: &str) -> bool {
    name.starts_with("__") && name.ends_with("__")
}

fn emit_binary_op(w: &mut Writer, class: &ClassIr) {
    w.block(
        format!(
            "static mp_obj_t {}_binary_op(mp_binary_op_t op, mp_obj_t lhs_in, mp_obj_t rhs_in)",
            class.c_name
        ),
        |w| {
            w.block("switch (op)", |w| {
                if class.methods.contains_key("__eq__") {
                    w.line("case MP_BINARY_OP_EQUAL:");
                    w.indent();
                    w.line(format!(
                        "return mp_obj_new_bool({}___eq__(MP_OBJ_TO_PTR(lhs_in), rhs_in));",
                        class.c_name
                    ));
                    w.dedent();
                }
                w.line("default: return MP_OBJ_NULL;");
            });
        },
    );
}

fn emit_iter(w: &mut Writer, class: &ClassIr) {
    if class.methods.contains_key("__iter__") {
        w.block(
            format!("static mp_obj_t {}_iter(mp_obj_t self_in)", class.c_name),
            |w| w.line(format!("return {}___iter__(MP_OBJ_TO_PTR(self_in));", class.c_name)),
        );
    }
}

fn emit_iternext_slot(w: &mut Writer, class: &ClassIr) {
    w.block(
        format!("static mp_obj_t {}_iternext(mp_obj_t self_in)", class.c_name),
        |w| w.line(format!("return {}___next__(MP_OBJ_TO_PTR(self_in));", class.c_name)),
    );
}

fn emit_locals_dict(w: &mut Writer, class: &ClassIr, qstrs: &mut QstrSet) {
    w.line(format!("static const mp_rom_map_elem_t {}_locals_dict_table[] = {{", class.c_name));
    w.indent();
    for name in class.methods.keys() {
        if is_dunder_like(name) {
            continue;
        }
        qstrs.intern(name.clone());
        w.line(format!(
            "{{ MP_ROM_QSTR(MP_QSTR_{name}), MP_ROM_PTR(&{}_{name}_obj) }},",
            class.c_name
        ));
    }
    w.dedent();
    w.line("};");
    w.line(format!(
        "static MP_DEFINE_CONST_DICT({}_locals_dict, {}_locals_dict_table);",
        class.c_name, class.c_name
    ));
}

fn emit_type(w: &mut Writer, module: &Module, class: &ClassIr, qstrs: &mut QstrSet) {
    qstrs.intern(class.py_name.clone());
    let mut slots = vec![format!("make_new, {}_make_new", class.c_name)];
    if let Some(base) = &class.base_name {
        let base_c_name = module.class(base).map(|b| b.c_name.as_str()).unwrap_or(base.as_str());
        slots.push(format!("parent, &{base_c_name}_type"));
    }
    if class.slots.print {
        slots.push(format!("print, {}_print", class.c_name));
    }
    if class.slots.attr {
        slots.push(format!("attr, {}_attr", class.c_name));
    }
    if class.slots.binary_op {
        slots.push(format!("binary_op, {}_binary_op", class.c_name));
    }
    if class.slots.iter {
        slots.push(format!("iter, {}_iter", class.c_name));
    }
    if class.slots.iternext {
        slots.push(format!("iternext, {}_iternext", class.c_name));
    }
    if class.slots.locals_dict {
        slots.push(format!("locals_dict, &{}_locals_dict", class.c_name));
    }
    w.line(format!(
        "MP_DEFINE_CONST_OBJ_TYPE({}_type, MP_QSTR_{}, MP_TYPE_FLAG_NONE,",
        class.c_name, class.py_name
    ));
    w.indent();
    let last = slots.len() - 1;
    for (i, slot) in slots.iter().enumerate() {
        let sep = if i == last { ");" } else { "," };
        w.line(format!("{slot}{sep}"));
    }
    w.dedent();
}
