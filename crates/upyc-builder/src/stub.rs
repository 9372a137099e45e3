//! Parses a `.pyi`-style stub describing an external C library into a
//! `LibraryIr`, the separate root the C-Binding sub-pipeline's emitter
//! consumes. Stub syntax is the annotated-Python subset the main pipeline
//! already understands, repurposed: module-level string/list constants
//! carry build metadata, `@c_struct`/`@c_enum`-decorated classes declare
//! struct and enum shapes, free function signatures (their bodies are
//! never lowered — only the signature is wrapped) describe calls into the
//! library, and `Name = Callable[[...], ...]` aliases declare callback
//! signatures.

use ruff_python_ast::{self as ast, Expr as AstExpr, Stmt as AstStmt};
use ruff_text_size::Ranged;
use upyc_common::sanitize_c_ident;
use upyc_ir::{CallbackDef, EnumDef, FunctionDef, LibraryIr, StructDef};
use upyc_types::{resolve_annotation, CType};

use crate::error::{BuildError, Diagnostics};
use crate::location::location_of;
use crate::lower::lower_literal;
use crate::scan::{dataclass_bool_kwarg, decorator_names, text_of};

pub fn build_library(
    body: &[AstStmt],
    source: &str,
    source_path: &str,
    lib_name: &str,
) -> Result<LibraryIr, Vec<BuildError>> {
    let mut diags = Diagnostics::default();
    let mut lib = LibraryIr { name: lib_name.to_string(), ..LibraryIr::default() };

    for stmt in body {
        let loc = location_of(source, stmt.range().start());
        match stmt {
            AstStmt::Assign(a) => lower_module_level_assign(&mut lib, a, source, source_path, &mut diags),
            AstStmt::ClassDef(def) => lower_class(&mut lib, def, source, source_path, &mut diags),
            AstStmt::FunctionDef(def) => lower_function(&mut lib, def, source, source_path, &mut diags),
            AstStmt::Import(_) | AstStmt::ImportFrom(_) => {}
            AstStmt::Expr(e) if matches!(*e.value, AstExpr::StringLiteral(_)) => {
                // A bare module-level docstring.
            }
            _ => diags.push(BuildError::unsupported(
                source_path,
                Some(loc),
                "top-level statement other than a constant, class, or function in a C-binding stub",
            )),
        }
    }

    if lib.header_include.is_empty() {
        diags.push(BuildError::unsupported_with_hint(
            source_path,
            None,
            "missing `HEADER` constant",
            "declare the header to #include, e.g. HEADER = \"mylib.h\"",
        ));
    }

    if diags.has_errors() {
        Err(diags.into_errors())
    } else {
        Ok(lib)
    }
}

fn lower_module_level_assign(
    lib: &mut LibraryIr,
    a: &ast::StmtAssign,
    source: &str,
    source_path: &str,
    diags: &mut Diagnostics,
) {
    let loc = location_of(source, a.range().start());
    if a.targets.len() != 1 {
        diags.push(BuildError::unsupported(source_path, Some(loc), "chained assignment in a C-binding stub"));
        return;
    }
    let AstExpr::Name(target) = &a.targets[0] else {
        diags.push(BuildError::unsupported(source_path, Some(loc), "non-name assignment target in a C-binding stub"));
        return;
    };
    let name = target.id.as_str();

    match name {
        "HEADER" => match string_literal(&a.value) {
            Some(s) => lib.header_include = s,
            None => diags.push(BuildError::type_error(source_path, Some(loc), "`HEADER` must be a string literal")),
        },
        "INCLUDE_DIRS" => match string_list(&a.value) {
            Some(v) => lib.extra_include_dirs = v,
            None => {
                diags.push(BuildError::type_error(source_path, Some(loc), "`INCLUDE_DIRS` must be a list of string literals"))
            }
        },
        "COMPANION_SOURCES" => match string_list(&a.value) {
            Some(v) => lib.companion_sources = v,
            None => diags.push(BuildError::type_error(
                source_path,
                Some(loc),
                "`COMPANION_SOURCES` must be a list of string literals",
            )),
        },
        _ => match lower_callback_alias(&a.value, source) {
            Some(cb) => {
                lib.callbacks.insert(name.to_string(), CallbackDef { name: name.to_string(), ..cb });
            }
            None => diags.push(BuildError::unsupported_with_hint(
                source_path,
                Some(loc),
                format!("module-level assignment to `{name}`"),
                "only HEADER, INCLUDE_DIRS, COMPANION_SOURCES and `Name = Callable[[...], ...]` callback aliases are recognized",
            )),
        },
    }
}

fn string_literal(expr: &AstExpr) -> Option<String> {
    match expr {
        AstExpr::StringLiteral(s) => Some(s.value.to_string()),
        _ => None,
    }
}

fn string_list(expr: &AstExpr) -> Option<Vec<String>> {
    let AstExpr::List(l) = expr else { return None };
    l.elts.iter().map(string_literal).collect()
}

/// Recognizes `Callable[[ParamType, ...], ReturnType]`; any other shape
/// isn't a callback alias and the caller falls back to reporting the
/// assignment as unrecognized.
fn lower_callback_alias(expr: &AstExpr, source: &str) -> Option<CallbackDef> {
    let AstExpr::Subscript(sub) = expr else { return None };
    let AstExpr::Name(base) = sub.value.as_ref() else { return None };
    if base.id.as_str() != "Callable" {
        return None;
    }
    let AstExpr::Tuple(tuple) = sub.slice.as_ref() else { return None };
    let [params_expr, ret_expr] = tuple.elts.as_slice() else { return None };
    let AstExpr::List(params_list) = params_expr else { return None };
    let params = params_list
        .elts
        .iter()
        .map(|e| resolve_annotation(text_of(source, e)))
        .collect::<Result<Vec<_>, _>>()
        .ok()?;
    let return_ty = resolve_annotation(text_of(source, ret_expr)).ok()?;
    Some(CallbackDef { name: String::new(), params, return_ty, user_data_param: None })
}

fn decorator_call<'a>(decorator: &'a ast::Decorator) -> Option<&'a ast::ExprCall> {
    match &decorator.expression {
        AstExpr::Call(call) => Some(call),
        _ => None,
    }
}

fn first_string_arg(call: &ast::ExprCall) -> Option<String> {
    call.arguments.args.first().and_then(string_literal)
}

fn lower_class(
    lib: &mut LibraryIr,
    def: &ast::StmtClassDef,
    source: &str,
    source_path: &str,
    diags: &mut Diagnostics,
) {
    let loc = location_of(source, def.range().start());
    let py_name = def.name.as_str().to_string();
    let decorators = decorator_names(&def.decorator_list, source);

    let struct_decorator = def.decorator_list.iter().zip(&decorators).find(|(_, n)| n == "c_struct");
    let enum_decorator = def.decorator_list.iter().zip(&decorators).find(|(_, n)| n == "c_enum");

    match (struct_decorator, enum_decorator) {
        (Some((dec, _)), None) => lower_struct(lib, &py_name, dec, &def.body, source, source_path, diags),
        (None, Some((dec, _))) => lower_enum(lib, &py_name, dec, &def.body, source, source_path, diags),
        (None, None) => diags.push(BuildError::unsupported_with_hint(
            source_path,
            Some(loc),
            format!("class `{py_name}` without a `@c_struct` or `@c_enum` decorator"),
            "every class in a C-binding stub declares either a struct or an enum",
        )),
        (Some(_), Some(_)) => diags.push(BuildError::unsupported(
            source_path,
            Some(loc),
            format!("class `{py_name}` decorated with both `@c_struct` and `@c_enum`"),
        )),
    }
}

fn lower_struct(
    lib: &mut LibraryIr,
    py_name: &str,
    decorator: &ast::Decorator,
    class_body: &[AstStmt],
    source: &str,
    source_path: &str,
    diags: &mut Diagnostics,
) {
    let loc = location_of(source, decorator.range().start());
    let Some(call) = decorator_call(decorator) else {
        diags.push(BuildError::unsupported_with_hint(
            source_path,
            Some(loc),
            "`@c_struct` without a C type name",
            "write `@c_struct(\"my_struct_t\")`",
        ));
        return;
    };
    let c_name = match first_string_arg(call) {
        Some(s) => s,
        None => {
            diags.push(BuildError::type_error(
                source_path,
                Some(loc),
                "`@c_struct(...)`'s first argument must be a string literal",
            ));
            sanitize_c_ident(py_name)
        }
    };
    let opaque = dataclass_bool_kwarg(call, "opaque");

    let mut fields = Vec::new();
    if !opaque {
        for stmt in class_body {
            match stmt {
                AstStmt::AnnAssign(a) => {
                    let AstExpr::Name(n) = a.target.as_ref() else { continue };
                    match resolve_annotation(text_of(source, &a.annotation)) {
                        Ok(ty) => fields.push((n.id.as_str().to_string(), ty)),
                        Err(e) => diags.push(BuildError::type_error(source_path, Some(loc), e.to_string())),
                    }
                }
                AstStmt::Expr(e) if matches!(*e.value, AstExpr::StringLiteral(_) | AstExpr::EllipsisLiteral(_)) => {}
                AstStmt::Pass(_) => {}
                _ => diags.push(BuildError::unsupported(source_path, Some(loc), "non-field statement in a `@c_struct` body")),
            }
        }
    }

    lib.structs.insert(py_name.to_string(), StructDef { py_name: py_name.to_string(), c_name, opaque, fields });
}

fn lower_enum(
    lib: &mut LibraryIr,
    py_name: &str,
    decorator: &ast::Decorator,
    class_body: &[AstStmt],
    source: &str,
    source_path: &str,
    diags: &mut Diagnostics,
) {
    let loc = location_of(source, decorator.range().start());
    let Some(call) = decorator_call(decorator) else {
        diags.push(BuildError::unsupported_with_hint(
            source_path,
            Some(loc),
            "`@c_enum` without a C type name",
            "write `@c_enum(\"my_enum_t\")`",
        ));
        return;
    };
    let c_name = match first_string_arg(call) {
        Some(s) => s,
        None => {
            diags.push(BuildError::type_error(
                source_path,
                Some(loc),
                "`@c_enum(...)`'s first argument must be a string literal",
            ));
            sanitize_c_ident(py_name)
        }
    };

    let mut variants = Vec::new();
    for stmt in class_body {
        match stmt {
            AstStmt::Assign(a) => {
                if a.targets.len() != 1 {
                    diags.push(BuildError::unsupported(source_path, Some(loc), "chained assignment in a `@c_enum` body"));
                    continue;
                }
                let AstExpr::Name(n) = &a.targets[0] else {
                    diags.push(BuildError::unsupported(source_path, Some(loc), "non-name enum variant target"));
                    continue;
                };
                match lower_literal(&a.value, source) {
                    Some(upyc_ir::Literal::Int(v)) => variants.push((n.id.as_str().to_string(), v)),
                    _ => diags.push(BuildError::type_error(
                        source_path,
                        Some(loc),
                        format!("enum variant `{}` must be assigned an integer literal", n.id),
                    )),
                }
            }
            AstStmt::Expr(e) if matches!(*e.value, AstExpr::StringLiteral(_) | AstExpr::EllipsisLiteral(_)) => {}
            AstStmt::Pass(_) => {}
            _ => diags.push(BuildError::unsupported(source_path, Some(loc), "non-variant statement in a `@c_enum` body")),
        }
    }

    lib.enums.insert(py_name.to_string(), EnumDef { py_name: py_name.to_string(), c_name, variants });
}

fn lower_function(
    lib: &mut LibraryIr,
    def: &ast::StmtFunctionDef,
    source: &str,
    source_path: &str,
    diags: &mut Diagnostics,
) {
    let loc = location_of(source, def.range().start());
    if def.is_async {
        diags.push(BuildError::unsupported(source_path, Some(loc), "async function in a C-binding stub"));
        return;
    }
    if !def.decorator_list.is_empty() {
        diags.push(BuildError::unsupported(source_path, Some(loc), "decorated function in a C-binding stub"));
    }

    let params = def
        .parameters
        .args
        .iter()
        .filter_map(|p| {
            let name = p.parameter.name.as_str().to_string();
            match &p.parameter.annotation {
                Some(ann) => match resolve_annotation(text_of(source, ann)) {
                    Ok(ty) => Some((name, ty)),
                    Err(e) => {
                        diags.push(BuildError::type_error(source_path, Some(loc), e.to_string()));
                        None
                    }
                },
                None => {
                    diags.push(BuildError::type_error(
                        source_path,
                        Some(loc),
                        format!("parameter `{name}` has no type annotation"),
                    ));
                    None
                }
            }
        })
        .collect::<Vec<_>>();

    let return_ty = match &def.returns {
        Some(ann) => resolve_annotation(text_of(source, ann)).unwrap_or_else(|e| {
            diags.push(BuildError::type_error(source_path, Some(loc), e.to_string()));
            CType::Void
        }),
        None => CType::Void,
    };

    let py_name = def.name.as_str().to_string();
    let c_name = sanitize_c_ident(&py_name);
    lib.functions.insert(py_name.clone(), FunctionDef { py_name, c_name, params, return_ty });
}

#[cfg(test)]
mod tests {
    use super::*;
    use ruff_python_parser::parse_module;

    fn build(src: &str) -> Result<LibraryIr, Vec<BuildError>> {
        let parsed = parse_module(src).expect("stub source must parse");
        build_library(parsed.syntax().body.as_slice(), src, "<test>", "mylib")
    }

    #[test]
    fn parses_header_and_include_dirs() {
        let lib = build("HEADER = \"mylib.h\"\nINCLUDE_DIRS = [\"vendor/mylib\"]\n").expect("should parse");
        assert_eq!(lib.header_include, "mylib.h");
        assert_eq!(lib.extra_include_dirs, vec!["vendor/mylib".to_string()]);
    }

    #[test]
    fn parses_opaque_and_transparent_structs() {
        let lib = build(
            "HEADER = \"mylib.h\"\n\n@c_struct(\"mylib_point_t\")\nclass Point:\n    x: int\n    y: int\n\n@c_struct(\"mylib_handle_t\", opaque=True)\nclass Handle:\n    pass\n",
        )
        .expect("should parse");
        let point = lib.structs.get("Point").expect("Point struct");
        assert_eq!(point.c_name, "mylib_point_t");
        assert!(!point.opaque);
        assert_eq!(point.fields.len(), 2);
        let handle = lib.structs.get("Handle").expect("Handle struct");
        assert!(handle.opaque);
        assert!(handle.fields.is_empty());
    }

    #[test]
    fn parses_enum_variants() {
        let lib = build(
            "HEADER = \"mylib.h\"\n\n@c_enum(\"mylib_color_t\")\nclass Color:\n    RED = 0\n    GREEN = 1\n    BLUE = 2\n",
        )
        .expect("should parse");
        let color = lib.enums.get("Color").expect("Color enum");
        assert_eq!(color.c_name, "mylib_color_t");
        assert_eq!(color.variants, vec![("RED".to_string(), 0), ("GREEN".to_string(), 1), ("BLUE".to_string(), 2)]);
    }

    #[test]
    fn parses_function_signatures_and_callback_alias() {
        let lib = build(
            "HEADER = \"mylib.h\"\n\nOnEvent = Callable[[int, int], None]\n\ndef mylib_open(path: str) -> int: ...\ndef mylib_close(h: int) -> None: ...\n",
        )
        .expect("should parse");
        assert!(lib.functions.contains_key("mylib_open"));
        assert!(lib.functions.contains_key("mylib_close"));
        let cb = lib.callbacks.get("OnEvent").expect("OnEvent callback");
        assert_eq!(cb.params, vec![CType::Int, CType::Int]);
        assert_eq!(cb.return_ty, CType::Void);
    }

    #[test]
    fn rejects_missing_header() {
        let err = build("def f() -> None: ...\n").expect_err("missing HEADER should fail");
        assert!(!err.is_empty());
    }

    #[test]
    fn rejects_class_without_binding_decorator() {
        let err = build("HEADER = \"mylib.h\"\n\nclass Plain:\n    x: int\n").expect_err("should fail");
        assert!(!err.is_empty());
    }
}
