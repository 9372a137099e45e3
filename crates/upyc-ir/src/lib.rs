//! Algebraic IR node model. Built once by `upyc-builder`,
//! consumed read-only by `upyc-codegen`; no emitter ever mutates this tree
//!.

pub mod cbinding;
pub mod class;
pub mod error;
pub mod expr;
pub mod func;
pub mod module;
pub mod stmt;
pub mod value;

pub use cbinding::{CallbackDef, EnumDef, FunctionDef, LibraryIr, StructDef};
pub use class::{ClassIr, DataclassMeta, FieldDefault, FieldIr, RequiredSlots};
pub use error::{LayoutError, LayoutErrorKind};
pub use expr::{Expr, Literal, UnaryOp};
pub use func::{FuncIr, GeneratorInfo, MethodIr, MethodKind, Param};
pub use module::Module;
pub use stmt::{ContainerKind, ExceptHandler, LValue, Prelude, PreludeInstr, Stmt, StmtKind};
pub use value::Value;
