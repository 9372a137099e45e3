//! Emits MicroPython user C module source from upyc IR.
//!
//! Consumes a `upyc_ir::Module` (or a `upyc_ir::LibraryIr` for the
//! C-binding sub-pipeline) built by `upyc-builder`, read-only; no emitter
//! in this crate ever mutates the tree it's handed.

pub mod cbinding;
pub mod class;
pub mod error;
pub mod expr;
pub mod function;
pub mod generator;
pub mod module;
pub mod stmt;
pub mod writer;

pub use error::EmitError;
pub use module::{emit_build_glue, emit_master_include, emit_module};

pub use cbinding::emit_library;
