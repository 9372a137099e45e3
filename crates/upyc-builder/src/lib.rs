//! Lowers the supported annotated-Python subset into `upyc_ir::Module`.
//!
//! The crate takes an already-parsed tree — parsing and `ParseError`
//! adaptation live in the facade crate — and runs it through three passes:
//! [`collect`] gathers every top-level function and class signature so
//! forward references resolve by name, [`lower`] computes class layout and
//! vtables and then lowers every function and method body.

pub mod collect;
pub mod error;
pub mod location;
pub mod lower;
pub mod scan;
pub mod stub;

use ruff_python_ast::Stmt;

pub use error::{BuildError, BuildErrorKind, Diagnostics};
pub use lower::BuildOptions;
use upyc_ir::{LibraryIr, Module};

/// Builds a module from an already-parsed body.
///
/// `c_module` names the emitted C module (sanitized into a valid C
/// identifier); `source_module` is the importable Python module name
/// recorded on the IR for diagnostics and registration metadata.
pub fn build(
    body: &[Stmt],
    source: &str,
    source_path: &str,
    c_module: &str,
    source_module: &str,
    opts: &BuildOptions,
) -> Result<Module, Vec<BuildError>> {
    lower::build(body, source, source_path, c_module, source_module, opts)
}

/// Parses an already-parsed C-Binding stub body into a `LibraryIr`, the
/// entry point to the C-Binding sub-pipeline's parsing half.
pub fn build_library(
    body: &[Stmt],
    source: &str,
    source_path: &str,
    lib_name: &str,
) -> Result<LibraryIr, Vec<BuildError>> {
    stub::build_library(body, source, source_path, lib_name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ruff_python_parser::{parse_module, Mode};

    fn build_source(src: &str) -> Result<Module, Vec<BuildError>> {
        let parsed = parse_module(src).expect("test source must parse");
        build(parsed.syntax().body.as_slice(), src, "<test>", "test_mod", "test_mod", &BuildOptions::default())
    }

    #[test]
    fn lowers_a_simple_function() {
        let module = build_source(
            "def factorial(n: int) -> int:\n    if n < 2:\n        return 1\n    return n * factorial(n - 1)\n",
        )
        .expect("build should succeed");
        let f = module.functions.get("factorial").expect("factorial registered");
        assert_eq!(f.params.len(), 1);
        assert!(!f.is_generator());
    }

    #[test]
    fn detects_generator_bodies() {
        let module = build_source(
            "def countdown(n: int):\n    while n > 0:\n        yield n\n        n -= 1\n",
        )
        .expect("build should succeed");
        let f = module.functions.get("countdown").expect("countdown registered");
        assert!(f.is_generator());
    }

    #[test]
    fn synthesizes_dataclass_equality() {
        let module = build_source(
            "@dataclass\nclass Point:\n    x: int\n    y: int\n",
        )
        .expect("build should succeed");
        let class = module.class("Point").expect("Point registered");
        assert!(class.methods.contains_key("__init__"));
        assert!(class.methods.contains_key("__eq__"));
    }

    #[test]
    fn rejects_bare_except() {
        let err = build_source(
            "def safe_div(a: int, b: int) -> int:\n    try:\n        return a // b\n    except:\n        return 0\n",
        )
        .expect_err("bare except should be rejected");
        assert!(!err.is_empty());
    }

    #[test]
    fn assigns_stable_vtable_slots_across_overrides() {
        let module = build_source(
            "class A:\n    def greet(self) -> int:\n        return 1\n\nclass B(A):\n    def greet(self) -> int:\n        return 2\n",
        )
        .expect("build should succeed");
        let a_idx = module.class("A").unwrap().methods.get("greet").unwrap().vtable_index;
        let b_idx = module.class("B").unwrap().methods.get("greet").unwrap().vtable_index;
        assert_eq!(a_idx, b_idx);
        assert!(a_idx.is_some());
    }
}
