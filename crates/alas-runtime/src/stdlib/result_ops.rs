//! `result.*`: wraps the convention of a map with keys
//! `{ok: bool, value: any, error: string}` (spec.md §4.3).

use crate::stdlib::{err, BuiltinResult, RuntimeCtx};
use crate::value::Value;

/// Build a `{ok, value, error}` result map. Shared with `io.*`/`async.*`
/// builtins that package their outcome the same way.
pub fn make_result(ctx: &RuntimeCtx, ok: bool, value: Value, error: &str) -> Value {
    let id = ctx.gc.allocate_map(vec![
        ("ok".to_string(), Value::Bool(ok)),
        ("value".to_string(), value),
        ("error".to_string(), Value::String(error.to_string())),
    ]);
    Value::Map(id)
}

fn as_result_map(ctx: &RuntimeCtx, v: &Value, who: &str) -> Result<(bool, Value, String), crate::stdlib::BuiltinError> {
    let Value::Map(id) = v else {
        return Err(err(format!("{who}: expected a result map")));
    };
    ctx.gc
        .with_map(*id, |m| {
            let ok = matches!(m.get("ok"), Some(Value::Bool(true)));
            let value = m.get("value").cloned().unwrap_or(Value::Void);
            let error = match m.get("error") {
                Some(Value::String(s)) => s.clone(),
                _ => String::new(),
            };
            (ok, value, error)
        })
        .ok_or_else(|| err(format!("{who}: result map not found")))
}

pub fn ok(ctx: &RuntimeCtx, args: &[Value]) -> BuiltinResult {
    let value = args.first().cloned().unwrap_or(Value::Void);
    Ok(make_result(ctx, true, value, ""))
}

pub fn error(ctx: &RuntimeCtx, args: &[Value]) -> BuiltinResult {
    let message = match args.first() {
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => return Err(err("result.error: requires a message argument")),
    };
    Ok(make_result(ctx, false, Value::Void, &message))
}

pub fn is_ok(ctx: &RuntimeCtx, args: &[Value]) -> BuiltinResult {
    let v = args.first().ok_or_else(|| err("result.isOk: requires one argument"))?;
    let (ok, _, _) = as_result_map(ctx, v, "result.isOk")?;
    Ok(Value::Bool(ok))
}

pub fn unwrap(ctx: &RuntimeCtx, args: &[Value]) -> BuiltinResult {
    let v = args.first().ok_or_else(|| err("result.unwrap: requires one argument"))?;
    let (ok, value, error) = as_result_map(ctx, v, "result.unwrap")?;
    if ok {
        Ok(value)
    } else {
        Err(err(format!("result.unwrap: called on an error result: {error}")))
    }
}

pub fn unwrap_error(ctx: &RuntimeCtx, args: &[Value]) -> BuiltinResult {
    let v = args.first().ok_or_else(|| err("result.unwrapError: requires one argument"))?;
    let (ok, _, error) = as_result_map(ctx, v, "result.unwrapError")?;
    if ok {
        Err(err("result.unwrapError: called on an ok result"))
    } else {
        Ok(Value::String(error))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ok_and_unwrap_roundtrip() {
        let ctx = RuntimeCtx::default();
        let r = ok(&ctx, &[Value::Int(42)]).unwrap();
        assert_eq!(is_ok(&ctx, &[r.clone()]).unwrap(), Value::Bool(true));
        assert_eq!(unwrap(&ctx, &[r]).unwrap(), Value::Int(42));
    }

    #[test]
    fn error_and_unwrap_error_roundtrip() {
        let ctx = RuntimeCtx::default();
        let r = error(&ctx, &[Value::String("boom".into())]).unwrap();
        assert_eq!(is_ok(&ctx, &[r.clone()]).unwrap(), Value::Bool(false));
        assert_eq!(unwrap_error(&ctx, &[r]).unwrap(), Value::String("boom".into()));
    }

    #[test]
    fn unwrap_on_error_fails() {
        let ctx = RuntimeCtx::default();
        let r = error(&ctx, &[Value::String("boom".into())]).unwrap();
        assert!(unwrap(&ctx, &[r]).is_err());
    }
}
