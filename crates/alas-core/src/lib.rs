//! ALAS Core: the AST schema and validator for the ALAS intermediate language.
//!
//! ALAS ("Automated Language for Automated Systems") is a JSON-encoded IL
//! meant to be produced by generators, not typed by hand. This crate is the
//! shared foundation both execution paths build on:
//!
//! - `ast`: the data model (module, function, statement, expression, type
//!   definitions) and the tag constants that name them on the wire.
//! - `decode`: turns `serde_json::Value` into the typed AST.
//! - `validate`: structural and semantic checks that must pass before either
//!   the interpreter or the code generator is allowed to run.
//!
//! Downstream crates (`alas-runtime`, `alasc`) assume a `Module` reaching
//! them has already been through `validate::validate_module`.

pub mod ast;
pub mod decode;
pub mod validate;

pub use ast::{
    BinOp, Expr, Function, Literal, Module, Param, Stmt, TypeDef, TypeDefKind, TypeName, UnOp,
};
pub use decode::{decode_module, DecodeError};
pub use validate::{validate_module, ValidationError};
