//! `string.*` (spec.md §4.3).

use crate::stdlib::{err, BuiltinResult, RuntimeCtx};
use crate::value::Value;

fn as_str<'a>(v: &'a Value, who: &str) -> Result<&'a str, crate::stdlib::BuiltinError> {
    match v {
        Value::String(s) => Ok(s.as_str()),
        _ => Err(err(format!("{who}: expected a string argument, got {}", v.type_name()))),
    }
}

pub fn length(_ctx: &RuntimeCtx, args: &[Value]) -> BuiltinResult {
    let s = as_str(args.first().ok_or_else(|| err("string.length: missing argument"))?, "string.length")?;
    Ok(Value::Int(s.chars().count() as i64))
}

pub fn split(ctx: &RuntimeCtx, args: &[Value]) -> BuiltinResult {
    let s = as_str(args.first().ok_or_else(|| err("string.split: missing argument"))?, "string.split")?;
    let sep = as_str(args.get(1).ok_or_else(|| err("string.split: missing separator"))?, "string.split")?;
    let parts: Vec<Value> = if sep.is_empty() {
        s.chars().map(|c| Value::String(c.to_string())).collect()
    } else {
        s.split(sep).map(|p| Value::String(p.to_string())).collect()
    };
    Ok(Value::Array(ctx.gc.allocate_array(parts)))
}

pub fn join(ctx: &RuntimeCtx, args: &[Value]) -> BuiltinResult {
    let Some(Value::Array(id)) = args.first() else {
        return Err(err("string.join: expected an array argument"));
    };
    let sep = as_str(args.get(1).ok_or_else(|| err("string.join: missing separator"))?, "string.join")?;
    let joined = ctx
        .gc
        .with_array(*id, |items| {
            items
                .iter()
                .map(|v| match v {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .collect::<Vec<_>>()
                .join(sep)
        })
        .ok_or_else(|| err("string.join: array not found"))?;
    Ok(Value::String(joined))
}

pub fn to_upper(_ctx: &RuntimeCtx, args: &[Value]) -> BuiltinResult {
    let s = as_str(args.first().ok_or_else(|| err("string.toUpper: missing argument"))?, "string.toUpper")?;
    Ok(Value::String(s.to_uppercase()))
}

pub fn to_lower(_ctx: &RuntimeCtx, args: &[Value]) -> BuiltinResult {
    let s = as_str(args.first().ok_or_else(|| err("string.toLower: missing argument"))?, "string.toLower")?;
    Ok(Value::String(s.to_lowercase()))
}

pub fn trim(_ctx: &RuntimeCtx, args: &[Value]) -> BuiltinResult {
    let s = as_str(args.first().ok_or_else(|| err("string.trim: missing argument"))?, "string.trim")?;
    Ok(Value::String(s.trim().to_string()))
}

pub fn replace(_ctx: &RuntimeCtx, args: &[Value]) -> BuiltinResult {
    let s = as_str(args.first().ok_or_else(|| err("string.replace: missing argument"))?, "string.replace")?;
    let old = as_str(args.get(1).ok_or_else(|| err("string.replace: missing old"))?, "string.replace")?;
    let new = as_str(args.get(2).ok_or_else(|| err("string.replace: missing new"))?, "string.replace")?;
    Ok(Value::String(s.replace(old, new)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_and_join_roundtrip() {
        let ctx = RuntimeCtx::default();
        let arr = split(&ctx, &[Value::String("a,b,c".into()), Value::String(",".into())]).unwrap();
        let joined = join(&ctx, &[arr, Value::String("-".into())]).unwrap();
        assert_eq!(joined, Value::String("a-b-c".into()));
    }

    #[test]
    fn replace_replaces_all_occurrences() {
        let ctx = RuntimeCtx::default();
        let r = replace(&ctx, &[Value::String("aaa".into()), Value::String("a".into()), Value::String("b".into())]).unwrap();
        assert_eq!(r, Value::String("bbb".into()));
    }

    #[test]
    fn length_counts_chars_not_bytes() {
        let ctx = RuntimeCtx::default();
        let r = length(&ctx, &[Value::String("héllo".into())]).unwrap();
        assert_eq!(r, Value::Int(5));
    }
}
