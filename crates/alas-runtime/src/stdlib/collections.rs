//! `collections.*` (spec.md §4.3). `append` returns a new array (the
//! original is left untouched); `slice`/`indexOf` carry explicit bounds
//! checks rather than clamping.

use crate::stdlib::{err, BuiltinResult, RuntimeCtx};
use crate::value::Value;

pub fn length(ctx: &RuntimeCtx, args: &[Value]) -> BuiltinResult {
    match args.first() {
        Some(Value::Array(id)) => Ok(Value::Int(
            ctx.gc.with_array(*id, |v| v.len() as i64).ok_or_else(|| err("collections.length: array not found"))?,
        )),
        Some(Value::Map(id)) => Ok(Value::Int(
            ctx.gc.with_map(*id, |m| m.len() as i64).ok_or_else(|| err("collections.length: map not found"))?,
        )),
        Some(Value::String(s)) => Ok(Value::Int(s.chars().count() as i64)),
        _ => Err(err("collections.length: expected an array, map, or string")),
    }
}

pub fn append(ctx: &RuntimeCtx, args: &[Value]) -> BuiltinResult {
    let Some(Value::Array(id)) = args.first() else {
        return Err(err("collections.append: expected an array argument"));
    };
    let x = args.get(1).cloned().ok_or_else(|| err("collections.append: missing value"))?;
    let mut items = ctx
        .gc
        .with_array(*id, |v| v.clone())
        .ok_or_else(|| err("collections.append: array not found"))?;
    items.push(x);
    Ok(Value::Array(ctx.gc.allocate_array(items)))
}

pub fn contains(ctx: &RuntimeCtx, args: &[Value]) -> BuiltinResult {
    let haystack = args.first().ok_or_else(|| err("collections.contains: missing haystack"))?;
    let needle = args.get(1).ok_or_else(|| err("collections.contains: missing needle"))?;
    match haystack {
        Value::Array(id) => Ok(Value::Bool(
            ctx.gc.with_array(*id, |v| v.contains(needle)).ok_or_else(|| err("collections.contains: array not found"))?,
        )),
        Value::Map(id) => Ok(Value::Bool(
            ctx.gc
                .with_map(*id, |m| m.contains_key(&needle.coerce_key()))
                .ok_or_else(|| err("collections.contains: map not found"))?,
        )),
        Value::String(s) => {
            let Value::String(sub) = needle else {
                return Err(err("collections.contains: expected a string needle"));
            };
            Ok(Value::Bool(s.contains(sub.as_str())))
        }
        _ => Err(err("collections.contains: expected an array, map, or string")),
    }
}

pub fn index_of(ctx: &RuntimeCtx, args: &[Value]) -> BuiltinResult {
    let haystack = args.first().ok_or_else(|| err("collections.indexOf: missing haystack"))?;
    let needle = args.get(1).ok_or_else(|| err("collections.indexOf: missing needle"))?;
    match haystack {
        Value::Array(id) => {
            let idx = ctx
                .gc
                .with_array(*id, |v| v.iter().position(|x| x == needle))
                .ok_or_else(|| err("collections.indexOf: array not found"))?;
            Ok(Value::Int(idx.map(|i| i as i64).unwrap_or(-1)))
        }
        Value::String(s) => {
            let Value::String(sub) = needle else {
                return Err(err("collections.indexOf: expected a string needle"));
            };
            Ok(Value::Int(
                s.find(sub.as_str()).map(|byte_idx| s[..byte_idx].chars().count() as i64).unwrap_or(-1),
            ))
        }
        _ => Err(err("collections.indexOf: expected an array or string")),
    }
}

fn check_bounds(start: i64, end: i64, len: i64, who: &str) -> Result<(usize, usize), crate::stdlib::BuiltinError> {
    if start < 0 || end > len || start > end {
        return Err(err(format!(
            "{who}: slice [{start}, {end}) out of bounds for length {len}"
        )));
    }
    Ok((start as usize, end as usize))
}

pub fn slice(ctx: &RuntimeCtx, args: &[Value]) -> BuiltinResult {
    let subject = args.first().ok_or_else(|| err("collections.slice: missing subject"))?;
    let start = match args.get(1) {
        Some(Value::Int(n)) => *n,
        _ => return Err(err("collections.slice: expected an integer start")),
    };
    match subject {
        Value::Array(id) => {
            let len = ctx.gc.with_array(*id, |v| v.len() as i64).ok_or_else(|| err("collections.slice: array not found"))?;
            let end = match args.get(2) {
                Some(Value::Int(n)) => *n,
                None => len,
                _ => return Err(err("collections.slice: expected an integer end")),
            };
            let (s, e) = check_bounds(start, end, len, "collections.slice")?;
            let sliced = ctx.gc.with_array(*id, |v| v[s..e].to_vec()).unwrap();
            Ok(Value::Array(ctx.gc.allocate_array(sliced)))
        }
        Value::String(s) => {
            let chars: Vec<char> = s.chars().collect();
            let len = chars.len() as i64;
            let end = match args.get(2) {
                Some(Value::Int(n)) => *n,
                None => len,
                _ => return Err(err("collections.slice: expected an integer end")),
            };
            let (lo, hi) = check_bounds(start, end, len, "collections.slice")?;
            Ok(Value::String(chars[lo..hi].iter().collect()))
        }
        _ => Err(err("collections.slice: expected an array or string")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_returns_a_new_array() {
        let ctx = RuntimeCtx::default();
        let a = Value::Array(ctx.gc.allocate_array(vec![Value::Int(1)]));
        let b = append(&ctx, &[a.clone(), Value::Int(2)]).unwrap();
        let Value::Array(bid) = b else { panic!() };
        assert_eq!(ctx.gc.with_array(bid, |v| v.len()).unwrap(), 2);
        let Value::Array(aid) = a else { panic!() };
        assert_eq!(ctx.gc.with_array(aid, |v| v.len()).unwrap(), 1);
    }

    #[test]
    fn index_of_returns_negative_one_when_absent() {
        let ctx = RuntimeCtx::default();
        let a = Value::Array(ctx.gc.allocate_array(vec![Value::Int(1), Value::Int(2)]));
        assert_eq!(index_of(&ctx, &[a, Value::Int(9)]).unwrap(), Value::Int(-1));
    }

    #[test]
    fn slice_rejects_out_of_bounds() {
        let ctx = RuntimeCtx::default();
        let a = Value::Array(ctx.gc.allocate_array(vec![Value::Int(1), Value::Int(2)]));
        assert!(slice(&ctx, &[a.clone(), Value::Int(0), Value::Int(5)]).is_err());
        assert!(slice(&ctx, &[a, Value::Int(0), Value::Int(2)]).is_ok());
    }
}
