//! First pass: walk the module body and record every top-level function and
//! class signature before any body is lowered, so later passes can resolve
//! forward references (a function calling one defined further down, a class
//! whose base is declared after it) by name alone.

use ruff_python_ast::{self as ast, Stmt};
use ruff_text_size::Ranged;
use upyc_common::sanitize_c_ident;
use upyc_ir::{DataclassMeta, FieldDefault};
use upyc_types::{resolve_annotation, CType};

use crate::error::{BuildError, Diagnostics};
use crate::scan::{dataclass_bool_kwarg, decorator_names, text_of};

pub struct PendingParam {
    pub name: String,
    pub ty: CType,
    pub has_default: bool,
}

pub struct PendingFunc<'a> {
    pub py_name: String,
    pub c_name: String,
    pub params: Vec<PendingParam>,
    pub return_ty: CType,
    pub ast_body: &'a [Stmt],
    pub decorators: Vec<String>,
    pub is_private: bool,
}

pub struct PendingField {
    pub name: String,
    pub ty: CType,
    pub default: Option<FieldDefault>,
}

pub struct PendingClass<'a> {
    pub py_name: String,
    pub c_name: String,
    pub base_name: Option<String>,
    pub fields: Vec<PendingField>,
    pub methods: Vec<PendingFunc<'a>>,
    pub dataclass: DataclassMeta,
}

#[derive(Default)]
pub struct Collected<'a> {
    pub funcs: Vec<PendingFunc<'a>>,
    pub classes: Vec<PendingClass<'a>>,
}

pub fn collect<'a>(
    body: &'a [Stmt],
    source: &str,
    source_path: &str,
    diags: &mut Diagnostics,
) -> Collected<'a> {
    let mut out = Collected::default();
    for stmt in body {
        match stmt {
            Stmt::FunctionDef(def) => {
                if let Some(f) = collect_function(def, source, source_path, diags) {
                    out.funcs.push(f);
                }
            }
            Stmt::ClassDef(def) => {
                if let Some(c) = collect_class(def, source, source_path, diags) {
                    out.classes.push(c);
                }
            }
            Stmt::Import(_) | Stmt::ImportFrom(_) => {
                // Import statements carry no runtime effect in the emitted
                // module; supported purely so stub-style type-only imports
                // (`from dataclasses import dataclass`) don't need stripping
                // by hand before compiling.
            }
            Stmt::Expr(e) if matches!(*e.value, ast::Expr::StringLiteral(_)) => {
                // A bare module-level docstring.
            }
            other => diags.push(BuildError::unsupported(
                source_path,
                Some(crate::location::location_of(source, other.range().start())),
                "top-level statement other than a function, class, or import",
            )),
        }
    }
    out
}

fn collect_function<'a>(
    def: &'a ast::StmtFunctionDef,
    source: &str,
    source_path: &str,
    diags: &mut Diagnostics,
) -> Option<PendingFunc<'a>> {
    let loc = crate::location::location_of(source, def.range().start());
    if def.is_async {
        diags.push(BuildError::unsupported(source_path, Some(loc), "async function"));
        return None;
    }
    if def.type_params.is_some() {
        diags.push(BuildError::unsupported(source_path, Some(loc), "generic type parameters"));
        return None;
    }

    let decorators = decorator_names(&def.decorator_list, source);
    for d in &decorators {
        if d != "dataclass" && d != "staticmethod" && d != "classmethod" && d != "property" {
            diags.push(BuildError::unsupported_with_hint(
                source_path,
                Some(loc),
                format!("decorator `@{d}`"),
                "only @staticmethod, @classmethod and @property are recognized on methods",
            ));
        }
    }

    let params = collect_params(&def.parameters, source, source_path, diags)?;

    let return_ty = match &def.returns {
        Some(ann) => resolve_annotation(text_of(source, ann)).unwrap_or_else(|e| {
            diags.push(BuildError::type_error(source_path, Some(loc), e.to_string()));
            CType::Void
        }),
        None => CType::Void,
    };

    let py_name = def.name.as_str().to_string();
    Some(PendingFunc {
        c_name: sanitize_c_ident(&py_name),
        is_private: upyc_common::is_private_name(&py_name),
        py_name,
        params,
        return_ty,
        ast_body: &def.body,
        decorators,
    })
}

fn collect_params(
    parameters: &ast::Parameters,
    source: &str,
    source_path: &str,
    diags: &mut Diagnostics,
) -> Option<Vec<PendingParam>> {
    if !parameters.posonlyargs.is_empty() {
        diags.push(BuildError::unsupported(source_path, None, "positional-only parameters"));
    }
    if !parameters.kwonlyargs.is_empty() {
        diags.push(BuildError::unsupported(source_path, None, "keyword-only parameters"));
    }
    if parameters.vararg.is_some() {
        diags.push(BuildError::unsupported_with_hint(
            source_path,
            None,
            "`*args`",
            "give every parameter an explicit name and type",
        ));
    }
    if parameters.kwarg.is_some() {
        diags.push(BuildError::unsupported_with_hint(
            source_path,
            None,
            "`**kwargs`",
            "give every parameter an explicit name and type",
        ));
    }

    let mut params = Vec::with_capacity(parameters.args.len());
    for p in &parameters.args {
        let name = p.parameter.name.as_str().to_string();
        let ty = match &p.parameter.annotation {
            Some(ann) => match resolve_annotation(text_of(source, ann)) {
                Ok(ty) => ty,
                Err(e) => {
                    diags.push(BuildError::type_error(source_path, None, e.to_string()));
                    CType::Object
                }
            },
            None if name == "self" => CType::Object,
            None => {
                diags.push(BuildError::type_error(
                    source_path,
                    None,
                    format!("parameter `{name}` has no type annotation"),
                ));
                CType::Object
            }
        };
        params.push(PendingParam { name, ty, has_default: p.default.is_some() });
    }
    Some(params)
}

fn collect_class<'a>(
    def: &'a ast::StmtClassDef,
    source: &str,
    source_path: &str,
    diags: &mut Diagnostics,
) -> Option<PendingClass<'a>> {
    let loc = crate::location::location_of(source, def.range().start());
    if def.type_params.is_some() {
        diags.push(BuildError::unsupported(source_path, Some(loc), "generic class type parameters"));
    }

    let mut base_name = None;
    if let Some(args) = def.arguments.as_deref() {
        if !args.keywords.is_empty() {
            diags.push(BuildError::unsupported(
                source_path,
                Some(loc),
                "class keyword arguments (e.g. a metaclass)",
            ));
        }
        match args.args.as_ref() {
            [] => {}
            [ast::Expr::Name(name)] => base_name = Some(name.id.as_str().to_string()),
            [_] => diags.push(BuildError::unsupported(source_path, Some(loc), "non-name base class")),
            _ => diags.push(BuildError::unsupported_with_hint(
                source_path,
                Some(loc),
                "multiple inheritance",
                "give the class a single base",
            )),
        }
    }

    let decorators = decorator_names(&def.decorator_list, source);
    let mut dataclass = DataclassMeta::default();
    for (decorator, name) in def.decorator_list.iter().zip(&decorators) {
        if name == "dataclass" {
            dataclass.is_dataclass = true;
            dataclass.generate_init = true;
            dataclass.generate_eq = true;
            dataclass.generate_repr = true;
            if let ast::Expr::Call(call) = &decorator.expression {
                dataclass.frozen = dataclass_bool_kwarg(call, "frozen");
                dataclass.order = dataclass_bool_kwarg(call, "order");
                let eq_explicitly_set = call
                    .arguments
                    .keywords
                    .iter()
                    .any(|k| k.arg.as_deref().map(|a| a.as_str()) == Some("eq"));
                if eq_explicitly_set && !dataclass_bool_kwarg(call, "eq") {
                    dataclass.generate_eq = false;
                }
            }
        } else {
            diags.push(BuildError::unsupported(
                source_path,
                Some(loc),
                format!("class decorator `@{name}`"),
            ));
        }
    }

    let mut fields = Vec::new();
    let mut methods = Vec::new();
    for item in &def.body {
        match item {
            Stmt::AnnAssign(ann) => {
                let ast::Expr::Name(target) = ann.target.as_ref() else {
                    diags.push(BuildError::unsupported(source_path, Some(loc), "non-name field target"));
                    continue;
                };
                let ty = match resolve_annotation(text_of(source, &ann.annotation)) {
                    Ok(ty) => ty,
                    Err(e) => {
                        diags.push(BuildError::type_error(source_path, Some(loc), e.to_string()));
                        continue;
                    }
                };
                let default = ann
                    .value
                    .as_deref()
                    .and_then(|v| crate::lower::resolve_field_default(v, source, source_path, loc, diags));
                fields.push(PendingField { name: target.id.as_str().to_string(), ty, default });
            }
            Stmt::FunctionDef(mdef) => {
                if let Some(mut f) = collect_function(mdef, source, source_path, diags) {
                    if f.py_name != "__init__"
                        && !f.decorators.iter().any(|d| d == "staticmethod")
                        && f.params.first().is_some_and(|p| p.name != "self")
                    {
                        diags.push(BuildError::unsupported(
                            source_path,
                            Some(loc),
                            "instance method whose first parameter isn't `self`",
                        ));
                    }
                    if !f.decorators.iter().any(|d| d == "staticmethod") && !f.params.is_empty() {
                        f.params.remove(0);
                    }
                    methods.push(f);
                }
            }
            Stmt::Pass(_) => {}
            Stmt::Expr(e) if matches!(*e.value, ast::Expr::StringLiteral(_)) => {}
            Stmt::ClassDef(_) => {
                diags.push(BuildError::unsupported(source_path, Some(loc), "nested class definition"));
            }
            other => {
                diags.push(BuildError::unsupported(
                    source_path,
                    Some(crate::location::location_of(source, other.range().start())),
                    "statement directly in a class body other than a field declaration or method",
                ));
            }
        }
    }

    let py_name = def.name.as_str().to_string();
    Some(PendingClass {
        c_name: sanitize_c_ident(&py_name),
        py_name,
        base_name,
        fields,
        methods,
        dataclass,
    })
}
