//! `type.*` (spec.md §4.3): dynamic type introspection and conversion.

use crate::stdlib::{err, BuiltinResult, RuntimeCtx};
use crate::value::Value;

pub fn type_of(_ctx: &RuntimeCtx, args: &[Value]) -> BuiltinResult {
    let v = args.first().ok_or_else(|| err("type.typeOf: missing argument"))?;
    Ok(Value::String(v.type_name().to_string()))
}

pub fn to_string_builtin(ctx: &RuntimeCtx, args: &[Value]) -> BuiltinResult {
    let v = args.first().ok_or_else(|| err("type.toString: missing argument"))?;
    Ok(Value::String(render_to_string(ctx, v)))
}

fn render_to_string(ctx: &RuntimeCtx, v: &Value) -> String {
    match v {
        Value::Array(id) => {
            let parts = ctx
                .gc
                .with_array(*id, |items| items.iter().map(|i| render_to_string(ctx, i)).collect::<Vec<_>>())
                .unwrap_or_default();
            format!("[{}]", parts.join(", "))
        }
        Value::Map(id) => {
            let parts = ctx
                .gc
                .with_map(*id, |entries| {
                    entries.iter().map(|(k, val)| format!("{k}: {}", render_to_string(ctx, val))).collect::<Vec<_>>()
                })
                .unwrap_or_default();
            format!("{{{}}}", parts.join(", "))
        }
        other => other.to_string(),
    }
}

pub fn parse_int(_ctx: &RuntimeCtx, args: &[Value]) -> BuiltinResult {
    let Some(Value::String(s)) = args.first() else {
        return Err(err("type.parseInt: expected a string argument"));
    };
    s.trim()
        .parse::<i64>()
        .map(Value::Int)
        .map_err(|_| err(format!("type.parseInt: cannot parse \"{s}\" as int")))
}

pub fn parse_float(_ctx: &RuntimeCtx, args: &[Value]) -> BuiltinResult {
    let Some(Value::String(s)) = args.first() else {
        return Err(err("type.parseFloat: expected a string argument"));
    };
    s.trim()
        .parse::<f64>()
        .map(Value::Float)
        .map_err(|_| err(format!("type.parseFloat: cannot parse \"{s}\" as float")))
}

macro_rules! is_tag {
    ($name:ident, $who:expr, $pat:pat) => {
        pub fn $name(_ctx: &RuntimeCtx, args: &[Value]) -> BuiltinResult {
            let v = args.first().ok_or_else(|| err(concat!($who, ": missing argument")))?;
            Ok(Value::Bool(matches!(v, $pat)))
        }
    };
}

is_tag!(is_int, "type.isInt", Value::Int(_));
is_tag!(is_float, "type.isFloat", Value::Float(_));
is_tag!(is_string, "type.isString", Value::String(_));
is_tag!(is_bool, "type.isBool", Value::Bool(_));
is_tag!(is_array, "type.isArray", Value::Array(_));
is_tag!(is_map, "type.isMap", Value::Map(_));

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_of_names_every_tag() {
        let ctx = RuntimeCtx::default();
        assert_eq!(type_of(&ctx, &[Value::Int(1)]).unwrap(), Value::String("int".into()));
        assert_eq!(type_of(&ctx, &[Value::Void]).unwrap(), Value::String("void".into()));
    }

    #[test]
    fn parse_int_rejects_garbage() {
        let ctx = RuntimeCtx::default();
        assert!(parse_int(&ctx, &[Value::String("abc".into())]).is_err());
        assert_eq!(parse_int(&ctx, &[Value::String(" 42 ".into())]).unwrap(), Value::Int(42));
    }
}
