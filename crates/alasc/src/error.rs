//! Error taxonomy for the compiler/interpreter driver (spec.md §7). Each
//! bucket is its own hand-rolled type, matching `alas-core`'s
//! `DecodeError`/`ValidationError` shape rather than a blanket `anyhow`
//! error — the driver needs to tell a validation failure from a codegen
//! failure from a runtime trap.

use std::fmt;

/// A construct the lowering cannot express: an unknown builtin, an
/// unresolved type, a missing operand (spec.md §7).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodegenError(pub String);

impl fmt::Display for CodegenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "codegen error: {}", self.0)
    }
}

impl std::error::Error for CodegenError {}

pub fn codegen_err(msg: impl Into<String>) -> CodegenError {
    CodegenError(msg.into())
}

/// An unresolved import, an import cycle, or a duplicate linked symbol
/// (spec.md §4.6, §7).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkError(pub String);

impl fmt::Display for LinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "link error: {}", self.0)
    }
}

impl std::error::Error for LinkError {}

pub fn link_err(msg: impl Into<String>) -> LinkError {
    LinkError(msg.into())
}

/// The kinds a `RuntimeError` can carry (spec.md §7): division by zero,
/// out-of-bounds index, a bad cast, an undefined name, an arity mismatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeErrorKind {
    DivisionByZero,
    IndexOutOfBounds,
    BadCast,
    UndefinedName,
    ArityMismatch,
    Builtin,
}

impl fmt::Display for RuntimeErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RuntimeErrorKind::DivisionByZero => "division_by_zero",
            RuntimeErrorKind::IndexOutOfBounds => "index_out_of_bounds",
            RuntimeErrorKind::BadCast => "bad_cast",
            RuntimeErrorKind::UndefinedName => "undefined_name",
            RuntimeErrorKind::ArityMismatch => "arity_mismatch",
            RuntimeErrorKind::Builtin => "builtin_error",
        };
        write!(f, "{s}")
    }
}

/// Raised by the interpreter and unwound to the driver (spec.md §4.4, §7).
/// The native path raises the same taxonomy from the injected check
/// helpers, but as a process abort rather than a Rust value — there's
/// nothing to catch on that side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeError {
    pub kind: RuntimeErrorKind,
    pub message: String,
    pub location: Option<String>,
}

impl RuntimeError {
    pub fn new(kind: RuntimeErrorKind, message: impl Into<String>) -> Self {
        RuntimeError {
            kind,
            message: message.into(),
            location: None,
        }
    }

    pub fn at(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.location {
            Some(loc) => write!(f, "{}: {} (at {loc})", self.kind, self.message),
            None => write!(f, "{}: {}", self.kind, self.message),
        }
    }
}

impl std::error::Error for RuntimeError {}

impl From<alas_runtime::BuiltinError> for RuntimeError {
    fn from(e: alas_runtime::BuiltinError) -> Self {
        RuntimeError::new(RuntimeErrorKind::Builtin, e.to_string())
    }
}
