//! Decodes raw JSON into the typed ALAS AST.
//!
//! This is a hand-written recursive-descent decoder over `serde_json::Value`
//! rather than a `#[derive(Deserialize)]` tree: ALAS's tagged unions need a
//! single place that rejects an unknown `"type"` tag outright (spec.md §9),
//! and the error messages need to name the offending field, which a derived
//! decoder cannot do cheaply.

use std::fmt;

use serde_json::Value as Json;

use crate::ast::{BinOp, Expr, Function, Literal, Module, Param, Stmt, TypeDef, TypeDefKind, TypeName, UnOp};

/// A malformed-JSON or unknown-tag defect found while decoding. Carries a
/// single message, matching spec.md §1's "human-readable diagnostics beyond
/// a single error string" non-goal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeError(pub String);

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "decode error: {}", self.0)
    }
}

impl std::error::Error for DecodeError {}

impl From<serde_json::Error> for DecodeError {
    fn from(e: serde_json::Error) -> Self {
        DecodeError(format!("invalid json: {e}"))
    }
}

type Result<T> = std::result::Result<T, DecodeError>;

fn err(msg: impl Into<String>) -> DecodeError {
    DecodeError(msg.into())
}

fn obj<'a>(v: &'a Json, what: &str) -> Result<&'a serde_json::Map<String, Json>> {
    v.as_object()
        .ok_or_else(|| err(format!("expected a JSON object for {what}")))
}

fn field<'a>(m: &'a serde_json::Map<String, Json>, key: &str, what: &str) -> Result<&'a Json> {
    m.get(key)
        .ok_or_else(|| err(format!("{what}: missing required field \"{key}\"")))
}

fn str_field(m: &serde_json::Map<String, Json>, key: &str, what: &str) -> Result<String> {
    field(m, key, what)?
        .as_str()
        .map(|s| s.to_string())
        .ok_or_else(|| err(format!("{what}: field \"{key}\" must be a string")))
}

fn array_field<'a>(m: &'a serde_json::Map<String, Json>, key: &str, what: &str) -> Result<&'a Vec<Json>> {
    field(m, key, what)?
        .as_array()
        .ok_or_else(|| err(format!("{what}: field \"{key}\" must be an array")))
}

fn opt_array_field<'a>(m: &'a serde_json::Map<String, Json>, key: &str) -> &'a [Json] {
    m.get(key).and_then(|v| v.as_array()).map(|v| v.as_slice()).unwrap_or(&[])
}

/// Parse raw bytes into a decoded `Module`. Does not validate semantics —
/// see `validate::validate_module` for that pass.
pub fn decode_module(bytes: &[u8]) -> Result<Module> {
    let value: Json = serde_json::from_slice(bytes)?;
    decode_module_value(&value)
}

pub fn decode_module_value(value: &Json) -> Result<Module> {
    let m = obj(value, "module")?;

    let type_tag = str_field(m, "type", "module")?;
    if type_tag != "module" {
        return Err(err(format!(
            "top-level record must have type=\"module\", got \"{type_tag}\""
        )));
    }

    let name = str_field(m, "name", "module")?;
    if name.is_empty() {
        return Err(err("module name must be non-empty"));
    }

    let imports = opt_array_field(m, "imports")
        .iter()
        .map(|v| {
            v.as_str()
                .map(|s| s.to_string())
                .ok_or_else(|| err("module.imports entries must be strings"))
        })
        .collect::<Result<Vec<_>>>()?;

    let exports = opt_array_field(m, "exports")
        .iter()
        .map(|v| {
            v.as_str()
                .map(|s| s.to_string())
                .ok_or_else(|| err("module.exports entries must be strings"))
        })
        .collect::<Result<Vec<_>>>()?;

    let functions = opt_array_field(m, "functions")
        .iter()
        .map(decode_function)
        .collect::<Result<Vec<_>>>()?;

    let types = opt_array_field(m, "types")
        .iter()
        .map(decode_type_def)
        .collect::<Result<Vec<_>>>()?;

    Ok(Module {
        name,
        imports,
        exports,
        functions,
        types,
    })
}

fn decode_function(value: &Json) -> Result<Function> {
    let m = obj(value, "function")?;

    let type_tag = str_field(m, "type", "function")?;
    if type_tag != "function" {
        return Err(err(format!(
            "function record must have type=\"function\", got \"{type_tag}\""
        )));
    }

    let name = str_field(m, "name", "function")?;
    if name.is_empty() {
        return Err(err("function name must be non-empty"));
    }

    let params = array_field(m, "parameters", "function")?
        .iter()
        .map(decode_param)
        .collect::<Result<Vec<_>>>()?;

    let return_type = TypeName::parse(&str_field(m, "return_type", "function")?);

    let body = array_field(m, "body", "function")?
        .iter()
        .map(decode_stmt)
        .collect::<Result<Vec<_>>>()?;

    Ok(Function {
        name,
        params,
        return_type,
        body,
    })
}

fn decode_param(value: &Json) -> Result<Param> {
    let m = obj(value, "parameter")?;
    let name = str_field(m, "name", "parameter")?;
    let ty = TypeName::parse(&str_field(m, "type", "parameter")?);
    Ok(Param { name, ty })
}

fn decode_type_def(value: &Json) -> Result<TypeDef> {
    let m = obj(value, "type definition")?;
    let name = str_field(m, "name", "type definition")?;
    let kind_tag = str_field(m, "kind", "type definition")?;

    let kind = match kind_tag.as_str() {
        "struct" => {
            let fields = array_field(m, "fields", "struct type")?
                .iter()
                .map(|f| {
                    let fm = obj(f, "struct field")?;
                    let fname = str_field(fm, "name", "struct field")?;
                    let fty = TypeName::parse(&str_field(fm, "type", "struct field")?);
                    Ok((fname, fty))
                })
                .collect::<Result<Vec<_>>>()?;
            TypeDefKind::Struct { fields }
        }
        "enum" => {
            let values = array_field(m, "values", "enum type")?
                .iter()
                .map(|v| {
                    v.as_str()
                        .map(|s| s.to_string())
                        .ok_or_else(|| err("enum.values entries must be strings"))
                })
                .collect::<Result<Vec<_>>>()?;
            TypeDefKind::Enum { values }
        }
        other => return Err(err(format!("unknown type-definition kind \"{other}\""))),
    };

    Ok(TypeDef { name, kind })
}

fn decode_stmt(value: &Json) -> Result<Stmt> {
    let m = obj(value, "statement")?;
    let tag = str_field(m, "type", "statement")?;

    Ok(match tag.as_str() {
        "assign" => Stmt::Assign {
            target: str_field(m, "target", "assign statement")?,
            value: decode_expr(field(m, "value", "assign statement")?)?,
        },
        "if" => Stmt::If {
            cond: decode_expr(field(m, "cond", "if statement")?)?,
            then_branch: opt_array_field(m, "then")
                .iter()
                .map(decode_stmt)
                .collect::<Result<Vec<_>>>()?,
            else_branch: opt_array_field(m, "else")
                .iter()
                .map(decode_stmt)
                .collect::<Result<Vec<_>>>()?,
        },
        "while" => Stmt::While {
            cond: decode_expr(field(m, "cond", "while statement")?)?,
            body: array_field(m, "body", "while statement")?
                .iter()
                .map(decode_stmt)
                .collect::<Result<Vec<_>>>()?,
        },
        "for" => Stmt::For {
            cond: decode_expr(field(m, "cond", "for statement")?)?,
            body: array_field(m, "body", "for statement")?
                .iter()
                .map(decode_stmt)
                .collect::<Result<Vec<_>>>()?,
        },
        "return" => Stmt::Return {
            value: match m.get("value") {
                Some(v) if !v.is_null() => Some(decode_expr(v)?),
                _ => None,
            },
        },
        "expr" => Stmt::Expr {
            value: decode_expr(field(m, "value", "expr statement")?)?,
        },
        other => return Err(err(format!("unknown statement tag \"{other}\""))),
    })
}

fn decode_expr(value: &Json) -> Result<Expr> {
    let m = obj(value, "expression")?;
    let tag = str_field(m, "type", "expression")?;

    Ok(match tag.as_str() {
        "literal" => decode_literal(field(m, "value", "literal expression")?)?,
        "variable" => Expr::Variable(str_field(m, "name", "variable expression")?),
        "binary" => {
            let op_str = str_field(m, "op", "binary expression")?;
            let op = BinOp::parse(&op_str)
                .ok_or_else(|| err(format!("unknown binary operator \"{op_str}\"")))?;
            Expr::Binary {
                op,
                left: Box::new(decode_expr(field(m, "left", "binary expression")?)?),
                right: Box::new(decode_expr(field(m, "right", "binary expression")?)?),
            }
        }
        "unary" => {
            let op_str = str_field(m, "op", "unary expression")?;
            let op = UnOp::parse(&op_str)
                .ok_or_else(|| err(format!("unknown unary operator \"{op_str}\"")))?;
            Expr::Unary {
                op,
                operand: Box::new(decode_expr(field(m, "operand", "unary expression")?)?),
            }
        }
        "call" => Expr::Call {
            name: str_field(m, "name", "call expression")?,
            args: opt_array_field(m, "args")
                .iter()
                .map(decode_expr)
                .collect::<Result<Vec<_>>>()?,
        },
        "module_call" => Expr::ModuleCall {
            module: str_field(m, "module", "module_call expression")?,
            name: str_field(m, "name", "module_call expression")?,
            args: opt_array_field(m, "args")
                .iter()
                .map(decode_expr)
                .collect::<Result<Vec<_>>>()?,
        },
        "builtin" => Expr::Builtin {
            name: str_field(m, "name", "builtin expression")?,
            args: opt_array_field(m, "args")
                .iter()
                .map(decode_expr)
                .collect::<Result<Vec<_>>>()?,
        },
        "array_literal" => Expr::ArrayLiteral {
            elements: opt_array_field(m, "elements")
                .iter()
                .map(decode_expr)
                .collect::<Result<Vec<_>>>()?,
        },
        "map_literal" => {
            let pairs = opt_array_field(m, "pairs")
                .iter()
                .map(|p| {
                    let pm = obj(p, "map_literal pair")?;
                    let key = decode_expr(field(pm, "key", "map_literal pair")?)?;
                    let val = decode_expr(field(pm, "value", "map_literal pair")?)?;
                    Ok((key, val))
                })
                .collect::<Result<Vec<_>>>()?;
            Expr::MapLiteral { pairs }
        }
        "index" => Expr::Index {
            object: Box::new(decode_expr(field(m, "object", "index expression")?)?),
            index: Box::new(decode_expr(field(m, "index", "index expression")?)?),
        },
        "field" => Expr::Field {
            object: Box::new(decode_expr(field(m, "object", "field expression")?)?),
            field: str_field(m, "field", "field expression")?,
        },
        other => return Err(err(format!("unknown expression tag \"{other}\""))),
    })
}

/// Classify a JSON literal payload per spec.md §3/§8.3: a JSON number is
/// `int` iff it equals its truncation to i64 and fits in i64, else `float`.
fn decode_literal(value: &Json) -> Result<Expr> {
    match value {
        Json::Bool(b) => Ok(Expr::Literal(Literal::Bool(*b))),
        Json::String(s) => Ok(Expr::StringLiteral(s.clone())),
        Json::Number(n) => {
            if let Some(i) = n.as_i64() {
                return Ok(Expr::Literal(Literal::Int(i)));
            }
            let f = n
                .as_f64()
                .ok_or_else(|| err("literal number is neither i64 nor f64 representable"))?;
            if f.trunc() == f && f.abs() <= i64::MAX as f64 {
                Ok(Expr::Literal(Literal::Int(f as i64)))
            } else {
                Ok(Expr::Literal(Literal::Float(f)))
            }
        }
        other => Err(err(format!(
            "unsupported literal payload: {other} (expected int, float, string, or bool)"
        ))),
    }
}
