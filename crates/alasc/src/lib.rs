//! ALAS compiler/interpreter: decodes one JSON-IL module graph and runs it
//! two ways — a tree-walking interpreter (`interpreter`) and a
//! single-module LLVM-IR code generator (`codegen`) driven across modules
//! by `coordinator`, then optionally optimized (`optimize`). `driver` ties
//! these to the CLI surface (`main.rs`).

pub mod codegen;
pub mod coordinator;
pub mod driver;
pub mod error;
pub mod interpreter;
pub mod ir;
pub mod optimize;

pub use codegen::{lower_module, ExternFn};
pub use driver::{build, run, BuildOptions, Config, LinkMode, OutputFormat, RunOptions};
pub use error::{CodegenError, LinkError, RuntimeError, RuntimeErrorKind};
pub use interpreter::Interpreter;
pub use ir::IrModule;
pub use optimize::Level;
