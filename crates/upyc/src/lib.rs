//! Porcelain facade tying parse → build → emit together: the entry points
//! an embedding consumer or the CLI calls to turn one annotated-Python
//! source file into a MicroPython user C module, or a C library stub
//! into a binding module via the C-Binding sub-pipeline.

use std::fmt;
use std::fs;
use std::path::Path;

use thiserror::Error;

pub use upyc_builder::BuildOptions;
use upyc_builder::{BuildError, BuildErrorKind};
pub use upyc_codegen::{emit_build_glue, emit_library, emit_module};
use upyc_common::sanitize_c_ident;
use upyc_ir::{LibraryIr, Module};

/// Every diagnostic produced by one failed build, wrapped so the facade's
/// `CompileError` can carry the whole batch (the builder accumulates many
/// diagnostics per compilation unit rather than stopping at the first).
#[derive(Debug, Error)]
pub struct BuildErrors(pub Vec<BuildError>);

impl fmt::Display for BuildErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, err) in self.0.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{err}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum CompileError {
    #[error(transparent)]
    Parse(#[from] ruff_python_parser::ParseError),
    #[error(transparent)]
    Build(#[from] BuildErrors),
    #[error("{0} reading {1}")]
    Io(std::io::Error, String),
}

/// The analogue of the teacher's `CompileOpts`: the whole external
/// configuration surface, since the source contract is a single file plus
/// flags rather than a project-wide config format.
#[derive(Debug, Clone)]
pub struct CompileOptions {
    /// Reject constructs that degrade to `Object` typing under ambiguity
    /// instead of silently widening. Cleared by the CLI's `-X no-strict-types`.
    pub strict_types: bool,
    /// C-safe module name override; derived from the source file stem
    /// otherwise.
    pub module_name: Option<String>,
    pub emit_cmake: bool,
    pub emit_make: bool,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self { strict_types: true, module_name: None, emit_cmake: true, emit_make: true }
    }
}

/// The generated output for one module: the translation unit plus whichever
/// build-glue fragments `CompileOptions` asked for.
#[derive(Debug, Clone)]
pub struct CompileOutput {
    pub c_source: String,
    pub make_glue: Option<String>,
    pub cmake_glue: Option<String>,
}

/// Compiles already-in-memory source text, for embedding or tests that
/// don't want to touch the filesystem.
pub fn compile_source(
    source: &str,
    source_path: &str,
    options: &CompileOptions,
) -> Result<(Module, CompileOutput), CompileError> {
    let parsed = ruff_python_parser::parse_module(source).map_err(CompileError::Parse)?;
    let body = parsed.syntax().body.as_slice();

    let stem = Path::new(source_path)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("upyc_module");
    let c_module = options.module_name.clone().unwrap_or_else(|| sanitize_c_ident(stem));

    let build_opts = BuildOptions { strict_types: options.strict_types };
    log::debug!("building module `{c_module}` from {source_path}");
    let module = upyc_builder::build(body, source, source_path, &c_module, stem, &build_opts)
        .map_err(BuildErrors)?;

    let c_source = upyc_codegen::emit_module(&module);
    let (make_glue, cmake_glue) = if options.emit_make || options.emit_cmake {
        let (mk, cmake) = upyc_codegen::emit_build_glue(&module.c_name, &[]);
        (options.emit_make.then_some(mk), options.emit_cmake.then_some(cmake))
    } else {
        (None, None)
    };

    Ok((module, CompileOutput { c_source, make_glue, cmake_glue }))
}

/// Reads `path`, compiles it, and writes `<module>.c` plus any requested
/// build glue into `out_dir`. The CLI's entry point.
pub fn compile_file(
    path: &Path,
    out_dir: &Path,
    options: &CompileOptions,
) -> Result<Module, CompileError> {
    let source = fs::read_to_string(path)
        .map_err(|e| CompileError::Io(e, path.display().to_string()))?;
    let source_path = path.display().to_string();
    let (module, output) = compile_source(&source, &source_path, options)?;

    let c_path = out_dir.join(format!("{}.c", module.c_name));
    fs::write(&c_path, &output.c_source)
        .map_err(|e| CompileError::Io(e, c_path.display().to_string()))?;
    log::info!("wrote {}", c_path.display());

    if let Some(mk) = &output.make_glue {
        let mk_path = out_dir.join("micropython.mk");
        fs::write(&mk_path, mk).map_err(|e| CompileError::Io(e, mk_path.display().to_string()))?;
        log::info!("wrote {}", mk_path.display());
    }
    if let Some(cmake) = &output.cmake_glue {
        let cmake_path = out_dir.join("micropython.cmake");
        fs::write(&cmake_path, cmake)
            .map_err(|e| CompileError::Io(e, cmake_path.display().to_string()))?;
        log::info!("wrote {}", cmake_path.display());
    }

    Ok(module)
}

/// Compiles an already-in-memory stub file describing an external C
/// library into its `LibraryIr`, the analogue of [`compile_source`] for
/// the C-Binding sub-pipeline.
pub fn compile_stub_source(
    source: &str,
    source_path: &str,
    lib_name: Option<&str>,
) -> Result<LibraryIr, CompileError> {
    let parsed = ruff_python_parser::parse_module(source).map_err(CompileError::Parse)?;
    let body = parsed.syntax().body.as_slice();

    let stem = Path::new(source_path)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("upyc_library");
    let lib_name = lib_name.map(str::to_string).unwrap_or_else(|| sanitize_c_ident(stem));

    log::debug!("building C-binding library `{lib_name}` from {source_path}");
    let lib = upyc_builder::build_library(body, source, source_path, &lib_name).map_err(BuildErrors)?;
    Ok(lib)
}

/// Reads a stub file at `path`, parses it into a `LibraryIr`, and writes
/// the generated `<lib_name>.c` into `out_dir`. The CLI's `bind` subcommand.
pub fn compile_stub_file(path: &Path, out_dir: &Path, lib_name: Option<&str>) -> Result<LibraryIr, CompileError> {
    let source = fs::read_to_string(path).map_err(|e| CompileError::Io(e, path.display().to_string()))?;
    let source_path = path.display().to_string();
    let lib = compile_stub_source(&source, &source_path, lib_name)?;

    let c_source = upyc_codegen::emit_library(&lib);
    let c_path = out_dir.join(format!("{}.c", lib.name));
    fs::write(&c_path, &c_source).map_err(|e| CompileError::Io(e, c_path.display().to_string()))?;
    log::info!("wrote {}", c_path.display());

    let (mk, cmake) = upyc_codegen::emit_build_glue(&lib.name, &lib.companion_sources);
    let mk_path = out_dir.join("micropython.mk");
    fs::write(&mk_path, mk).map_err(|e| CompileError::Io(e, mk_path.display().to_string()))?;
    log::info!("wrote {}", mk_path.display());
    let cmake_path = out_dir.join("micropython.cmake");
    fs::write(&cmake_path, cmake).map_err(|e| CompileError::Io(e, cmake_path.display().to_string()))?;
    log::info!("wrote {}", cmake_path.display());

    Ok(lib)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compiles_a_simple_function_to_c() {
        let src = "def factorial(n: int) -> int:\n    if n < 2:\n        return 1\n    return n * factorial(n - 1)\n";
        let (module, output) = compile_source(src, "factorial.py", &CompileOptions::default())
            .expect("compilation should succeed");
        assert!(module.functions.contains_key("factorial"));
        assert!(output.c_source.contains("factorial"));
        assert!(output.c_source.contains("MP_REGISTER_MODULE"));
    }

    #[test]
    fn reports_unsupported_constructs_as_build_errors() {
        let src = "def f():\n    try:\n        pass\n    except:\n        pass\n";
        let err = compile_source(src, "bad.py", &CompileOptions::default())
            .expect_err("bare except should be rejected");
        assert!(matches!(err, CompileError::Build(_)));
    }

    #[test]
    fn compiles_a_stub_to_a_binding_module() {
        let src = "HEADER = \"mylib.h\"\n\n@c_struct(\"mylib_point_t\")\nclass Point:\n    x: int\n    y: int\n\ndef mylib_distance(a: Point, b: Point) -> float: ...\n";
        let lib = compile_stub_source(src, "mylib.pyi", None).expect("stub compilation should succeed");
        assert!(lib.structs.contains_key("Point"));
        assert!(lib.functions.contains_key("mylib_distance"));
        let c_source = upyc_codegen::emit_library(&lib);
        assert!(c_source.contains("mylib_point_t"));
        assert!(c_source.contains("MP_REGISTER_MODULE"));
    }
}
