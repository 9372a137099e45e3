//! Thin CLI driver: takes a source file path and an output directory and
//! produces the output set described in the module's external interface.
//! No firmware orchestration happens here — just the compile call plus
//! file I/O and exit-code plumbing.

use std::path::PathBuf;
use std::process::ExitCode;

use lexopt::ValueExt;
use upyc::{compile_file, compile_stub_file, CompileOptions};

fn main() -> ExitCode {
    env_logger::init();

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<(), lexopt::Error> {
    let mut parser = lexopt::Parser::from_env();
    match parser.next()? {
        Some(lexopt::Arg::Value(v)) if v.to_str() == Some("bind") => run_bind(parser),
        Some(lexopt::Arg::Value(v)) => run_compile(parser, Some(PathBuf::from(v))),
        Some(lexopt::Arg::Long("help")) | Some(lexopt::Arg::Short('h')) => {
            print_usage(&parser);
            Ok(())
        }
        Some(other) => Err(other.unexpected()),
        None => Err("expected a source file path, or the `bind` subcommand".into()),
    }
}

fn run_compile(mut parser: lexopt::Parser, first: Option<PathBuf>) -> Result<(), lexopt::Error> {
    let mut source = first;
    let mut out_dir = PathBuf::from(".");
    let mut options = CompileOptions::default();

    while let Some(arg) = parser.next()? {
        use lexopt::Arg::*;
        match arg {
            Long("help") | Short('h') => {
                print_usage(&parser);
                return Ok(());
            }
            Value(v) if source.is_none() => source = Some(PathBuf::from(v)),
            Long("out-dir") | Short('o') => out_dir = PathBuf::from(parser.value()?),
            Long("no-strict-types") => options.strict_types = false,
            Short('X') => {
                let flag = parser.value()?.string()?;
                if flag == "no-strict-types" {
                    options.strict_types = false;
                }
            }
            Long("module-name") => options.module_name = Some(parser.value()?.string()?),
            Long("no-make") => options.emit_make = false,
            Long("no-cmake") => options.emit_cmake = false,
            _ => return Err(arg.unexpected()),
        }
    }

    let source = source.ok_or("expected a source file path")?;
    if !out_dir.exists() {
        std::fs::create_dir_all(&out_dir).map_err(|e| e.to_string())?;
    }

    match compile_file(&source, &out_dir, &options) {
        Ok(module) => {
            log::info!("compiled module `{}`", module.c_name);
            Ok(())
        }
        Err(e) => Err(e.to_string().into()),
    }
}

/// `upyc bind <stub.pyi>`: runs the C-Binding sub-pipeline instead of the
/// main compile pipeline, consuming a stub file describing an external C
/// library rather than an annotated Python module.
fn run_bind(mut parser: lexopt::Parser) -> Result<(), lexopt::Error> {
    let mut stub: Option<PathBuf> = None;
    let mut out_dir = PathBuf::from(".");
    let mut lib_name: Option<String> = None;

    while let Some(arg) = parser.next()? {
        use lexopt::Arg::*;
        match arg {
            Long("help") | Short('h') => {
                println!("usage: upyc bind <stub.pyi> [-o,--out-dir=DIR] [--lib-name=NAME]");
                println!("Runs the C-Binding sub-pipeline: wraps an external C library's stub file.");
                return Ok(());
            }
            Value(v) if stub.is_none() => stub = Some(PathBuf::from(v)),
            Long("out-dir") | Short('o') => out_dir = PathBuf::from(parser.value()?),
            Long("lib-name") => lib_name = Some(parser.value()?.string()?),
            _ => return Err(arg.unexpected()),
        }
    }

    let stub = stub.ok_or("expected a stub file path")?;
    if !out_dir.exists() {
        std::fs::create_dir_all(&out_dir).map_err(|e| e.to_string())?;
    }

    match compile_stub_file(&stub, &out_dir, lib_name.as_deref()) {
        Ok(lib) => {
            log::info!("compiled C-binding library `{}`", lib.name);
            Ok(())
        }
        Err(e) => Err(e.to_string().into()),
    }
}

fn print_usage(parser: &lexopt::Parser) {
    let bin_name = parser.bin_name().unwrap_or("upyc");
    println!("usage: {bin_name} <source.py> [-o,--out-dir=DIR] [--no-strict-types] [--module-name=NAME]");
    println!("       {bin_name} bind <stub.pyi> [-o,--out-dir=DIR] [--lib-name=NAME]");
    println!("Compiles an annotated Python source file to a MicroPython user C module.");
}
