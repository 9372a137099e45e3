//! Assembles the final translation unit: runtime includes, forward class
//! declarations in topological order, every class and function, the
//! globals table, and the module registration macro.

use upyc_common::QstrSet;
use upyc_ir::Module;

use crate::class::emit_class;
use crate::function::{emit_function, globals_entry};
use crate::writer::Writer;

pub fn emit_module(module: &Module) -> String {
    let mut qstrs = QstrSet::new();
    qstrs.intern(module.source_name.clone());

    let mut w = Writer::new();
    w.line("#include \"py/obj.h\"");
    w.line("#include \"py/objstr.h\"");
    w.line("#include \"py/runtime.h\"");
    w.line("#include \"py/objtype.h\"");
    w.line("#include \"py/gc.h\"");
    w.line("#include \"py/mpprint.h\"");
    w.line("#include <math.h>");
    w.blank();

    for class in module.topological_classes() {
        log::debug!("forward-declaring class {}", class.c_name);
        w.line(format!("typedef struct _{}_t {}_t;", class.c_name, class.c_name));
        w.line(format!("static const mp_obj_type_t {}_type;", class.c_name));
    }
    w.blank();

    for class in module.topological_classes() {
        log::debug!("emitting class {}", class.c_name);
        w.raw(emit_class(module, class, &mut qstrs));
        w.blank();
    }

    for func in module.functions.values() {
        log::debug!("emitting function {}", func.c_name);
        w.raw(emit_function(module, func, &mut qstrs));
        w.blank();
    }

    emit_globals_table(&mut w, module);
    w.blank();
    emit_module_def(&mut w, module);

    w.finish()
}

fn emit_globals_table(w: &mut Writer, module: &Module) {
    w.line(format!(
        "static const mp_rom_map_elem_t {}_globals_table[] = {{",
        module.c_name
    ));
    w.indent();
    w.line(format!(
        "{{ MP_ROM_QSTR(MP_QSTR___name__), MP_ROM_QSTR(MP_QSTR_{}) }},",
        module.c_name
    ));
    for class in module.topological_classes() {
        w.line(format!(
            "{{ MP_ROM_QSTR(MP_QSTR_{}), MP_ROM_PTR(&{}_type) }},",
            class.py_name, class.c_name
        ));
    }
    for func in module.functions.values() {
        if let Some(entry) = globals_entry(func) {
            w.line(format!("{entry},"));
        }
    }
    w.dedent();
    w.line("};");
    w.line(format!(
        "static MP_DEFINE_CONST_DICT({}_globals, {}_globals_table);",
        module.c_name, module.c_name
    ));
}

fn emit_module_def(w: &mut Writer, module: &Module) {
    w.line(format!(
        "const mp_obj_module_t {}_user_cmodule = {{",
        module.c_name
    ));
    w.indent();
    w.line(".base = { &mp_type_module },");
    w.line(format!(".globals = (mp_obj_dict_t *)&{}_globals,", module.c_name));
    w.dedent();
    w.line("};");
    w.blank();
    w.line(format!(
        "MP_REGISTER_MODULE(MP_QSTR_{}, {}_user_cmodule);",
        module.source_name, module.c_name
    ));
}

/// The `micropython.mk`/`micropython.cmake` glue referencing the generated
/// `<module_name>.c`, plus any companion sources. Returns `(mk, cmake)`
/// text. Takes the bare module name rather than a `Module` so the
/// C-Binding sub-pipeline's library output can share it.
pub fn emit_build_glue(module_name: &str, companion_sources: &[String]) -> (String, String) {
    let c_file = format!("{module_name}.c");
    let mut extra_srcs = companion_sources.to_vec();
    extra_srcs.insert(0, c_file.clone());
    let srcs_mk = extra_srcs
        .iter()
        .map(|s| format!("$(USERMOD_DIR)/{s}"))
        .collect::<Vec<_>>()
        .join(" ")
        .to_string();

    let mk = format!(
        "SRC_USERMOD_C += {srcs_mk}\nCFLAGS_USERMOD += -I$(USERMOD_DIR)\n"
    );

    let srcs_cmake = extra_srcs
        .iter()
        .map(|s| format!("    ${{CMAKE_CURRENT_LIST_DIR}}/{s}"))
        .collect::<Vec<_>>()
        .join("\n");
    let cmake = format!(
        "add_library(usermod_{module_name} INTERFACE)\n\ntarget_sources(usermod_{module_name} INTERFACE\n{srcs_cmake}\n)\n\ntarget_include_directories(usermod_{module_name} INTERFACE\n    ${{CMAKE_CURRENT_LIST_DIR}}\n)\n\ntarget_link_libraries(usermod INTERFACE usermod_{module_name})\n"
    );

    (mk, cmake)
}

/// The master aggregation file listing every compiled submodule, written
/// once per firmware build rather than per module.
pub fn emit_master_include(module_names: &[String]) -> String {
    let mut w = Writer::new();
    w.line("// Generated aggregation of compiled user C modules.");
    for name in module_names {
        w.line(format!("#include \"{name}/{name}.c\""));
    }
    w.finish()
}
