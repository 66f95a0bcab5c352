//! The ALAS data model: module, function, statement, expression, and
//! type-definition records, plus the tag constants that name them on the
//! wire.
//!
//! Every tagged variant below corresponds 1:1 with a `"type"` discriminator
//! string in the JSON encoding (see `decode.rs`). The decoder rejects any
//! tag not listed here rather than silently dropping the node.

use std::fmt;

/// Type name as it appears in a parameter, return type, or field. ALAS has
/// no generic parameters on composite types — `array` and `map` are opaque
/// containers whose element types are not tracked in the schema.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeName {
    Int,
    Float,
    Bool,
    String,
    Void,
    Array,
    Map,
    Any,
    Function,
    /// A user-defined struct/enum name, optionally `module__name` qualified
    /// after import.
    Named(String),
}

impl TypeName {
    pub fn parse(s: &str) -> TypeName {
        match s {
            "int" => TypeName::Int,
            "float" => TypeName::Float,
            "bool" => TypeName::Bool,
            "string" => TypeName::String,
            "void" => TypeName::Void,
            "array" => TypeName::Array,
            "map" => TypeName::Map,
            "any" => TypeName::Any,
            "function" => TypeName::Function,
            other => TypeName::Named(other.to_string()),
        }
    }

    pub fn is_primitive(&self) -> bool {
        matches!(
            self,
            TypeName::Int | TypeName::Float | TypeName::Bool | TypeName::String | TypeName::Void
        )
    }
}

impl fmt::Display for TypeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeName::Int => write!(f, "int"),
            TypeName::Float => write!(f, "float"),
            TypeName::Bool => write!(f, "bool"),
            TypeName::String => write!(f, "string"),
            TypeName::Void => write!(f, "void"),
            TypeName::Array => write!(f, "array"),
            TypeName::Map => write!(f, "map"),
            TypeName::Any => write!(f, "any"),
            TypeName::Function => write!(f, "function"),
            TypeName::Named(name) => write!(f, "{name}"),
        }
    }
}

/// A named, typed parameter of a function.
#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: String,
    pub ty: TypeName,
}

/// A function definition. Immutable after decoding.
#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    pub name: String,
    pub params: Vec<Param>,
    pub return_type: TypeName,
    pub body: Vec<Stmt>,
}

/// A struct or enum type definition.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeDef {
    pub name: String,
    pub kind: TypeDefKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TypeDefKind {
    Struct { fields: Vec<(String, TypeName)> },
    /// Enum values are declared as strings on the wire but represented as
    /// 32-bit integers (their declaration index) in the lowering.
    Enum { values: Vec<String> },
}

/// A module: the unit of import, compilation, and linking.
#[derive(Debug, Clone, PartialEq)]
pub struct Module {
    pub name: String,
    pub imports: Vec<String>,
    pub exports: Vec<String>,
    pub functions: Vec<Function>,
    pub types: Vec<TypeDef>,
}

impl Module {
    pub fn function(&self, name: &str) -> Option<&Function> {
        self.functions.iter().find(|f| f.name == name)
    }

    pub fn type_def(&self, name: &str) -> Option<&TypeDef> {
        self.types.iter().find(|t| t.name == name)
    }
}

/// A JSON numeric literal, already classified per spec.md §4.4/§8.3: it is
/// `Int` iff the JSON number equals its truncation to i64 and fits in i64,
/// otherwise `Float`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Literal {
    Int(i64),
    Float(f64),
    Bool(bool),
}

#[derive(Debug, Clone, PartialEq, Eq, Copy)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

impl BinOp {
    pub const ALL: &'static [&'static str] = &[
        "+", "-", "*", "/", "%", "==", "!=", "<", "<=", ">", ">=", "&&", "||",
    ];

    pub fn parse(s: &str) -> Option<BinOp> {
        Some(match s {
            "+" => BinOp::Add,
            "-" => BinOp::Sub,
            "*" => BinOp::Mul,
            "/" => BinOp::Div,
            "%" => BinOp::Mod,
            "==" => BinOp::Eq,
            "!=" => BinOp::Ne,
            "<" => BinOp::Lt,
            "<=" => BinOp::Le,
            ">" => BinOp::Gt,
            ">=" => BinOp::Ge,
            "&&" => BinOp::And,
            "||" => BinOp::Or,
            _ => return None,
        })
    }

    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge
        )
    }

    pub fn is_logical(self) -> bool {
        matches!(self, BinOp::And | BinOp::Or)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Copy)]
pub enum UnOp {
    Not,
    Neg,
}

impl UnOp {
    pub fn parse(s: &str) -> Option<UnOp> {
        Some(match s {
            "!" => UnOp::Not,
            "-" => UnOp::Neg,
            _ => return None,
        })
    }
}

/// A key/value pair in a `map_literal`, ordered as written.
pub type MapPair = (Expr, Expr);

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Literal),
    StringLiteral(String),
    Variable(String),
    Binary {
        op: BinOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Unary {
        op: UnOp,
        operand: Box<Expr>,
    },
    Call {
        name: String,
        args: Vec<Expr>,
    },
    ModuleCall {
        module: String,
        name: String,
        args: Vec<Expr>,
    },
    Builtin {
        name: String,
        args: Vec<Expr>,
    },
    ArrayLiteral {
        elements: Vec<Expr>,
    },
    MapLiteral {
        pairs: Vec<MapPair>,
    },
    Index {
        object: Box<Expr>,
        index: Box<Expr>,
    },
    Field {
        object: Box<Expr>,
        field: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Assign {
        target: String,
        value: Expr,
    },
    If {
        cond: Expr,
        then_branch: Vec<Stmt>,
        else_branch: Vec<Stmt>,
    },
    While {
        cond: Expr,
        body: Vec<Stmt>,
    },
    /// The IL's `for` is semantically a `while`; any init/update is
    /// desugared by the producer before it reaches this schema.
    For {
        cond: Expr,
        body: Vec<Stmt>,
    },
    Return {
        value: Option<Expr>,
    },
    Expr {
        value: Expr,
    },
}
