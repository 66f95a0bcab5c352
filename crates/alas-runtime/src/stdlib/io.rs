//! `io.*`: printing, file access, and a single blocking line-read
//! (spec.md §4.3).

use std::io::{BufRead, Write as _};

use crate::stdlib::result_ops::make_result;
use crate::stdlib::{err, BuiltinResult, RuntimeCtx};
use crate::value::Value;

/// Depth-first recursive printing of arrays/maps (spec.md §4.3).
pub fn print(ctx: &RuntimeCtx, args: &[Value]) -> BuiltinResult {
    let mut out = String::new();
    for (i, v) in args.iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        render(ctx, v, &mut out);
    }
    println!("{out}");
    Ok(Value::Void)
}

fn render(ctx: &RuntimeCtx, v: &Value, out: &mut String) {
    match v {
        Value::Array(id) => {
            out.push('[');
            ctx.gc.with_array(*id, |items| {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    render(ctx, item, out);
                }
            });
            out.push(']');
        }
        Value::Map(id) => {
            out.push('{');
            ctx.gc.with_map(*id, |entries| {
                for (i, (k, val)) in entries.iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    out.push_str(k);
                    out.push_str(": ");
                    render(ctx, val, out);
                }
            });
            out.push('}');
        }
        Value::String(s) => out.push_str(s),
        other => out.push_str(&other.to_string()),
    }
}

pub fn read_file(ctx: &RuntimeCtx, args: &[Value]) -> BuiltinResult {
    let Some(Value::String(path)) = args.first() else {
        return Err(err("io.readFile: requires a string path argument"));
    };
    match std::fs::read_to_string(path) {
        Ok(contents) => Ok(make_result(ctx, true, Value::String(contents), "")),
        Err(e) => Ok(make_result(ctx, false, Value::Void, &e.to_string())),
    }
}

pub fn write_file(ctx: &RuntimeCtx, args: &[Value]) -> BuiltinResult {
    let (Some(Value::String(path)), Some(data)) = (args.first(), args.get(1)) else {
        return Err(err("io.writeFile: requires (path, data) arguments"));
    };
    let text = match data {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    match std::fs::File::create(path).and_then(|mut f| f.write_all(text.as_bytes())) {
        Ok(()) => Ok(make_result(ctx, true, Value::Void, "")),
        Err(e) => Ok(make_result(ctx, false, Value::Void, &e.to_string())),
    }
}

pub fn read_line(_ctx: &RuntimeCtx, _args: &[Value]) -> BuiltinResult {
    let mut line = String::new();
    let stdin = std::io::stdin();
    let n = stdin
        .lock()
        .read_line(&mut line)
        .map_err(|e| err(format!("io.readLine: {e}")))?;
    if n == 0 {
        return Ok(Value::String(String::new()));
    }
    if line.ends_with('\n') {
        line.pop();
        if line.ends_with('\r') {
            line.pop();
        }
    }
    Ok(Value::String(line))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_read_file_roundtrips() {
        let ctx = RuntimeCtx::default();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.txt");
        let path_str = path.to_str().unwrap().to_string();

        let wr = write_file(&ctx, &[Value::String(path_str.clone()), Value::String("hi".into())]).unwrap();
        let Value::Map(id) = wr else { panic!("expected map") };
        assert_eq!(
            ctx.gc.with_map(id, |m| m.get("ok").cloned()).unwrap(),
            Some(Value::Bool(true))
        );

        let rr = read_file(&ctx, &[Value::String(path_str)]).unwrap();
        let Value::Map(id) = rr else { panic!("expected map") };
        assert_eq!(
            ctx.gc.with_map(id, |m| m.get("value").cloned()).unwrap(),
            Some(Value::String("hi".into()))
        );
    }

    #[test]
    fn read_file_missing_path_reports_error() {
        let ctx = RuntimeCtx::default();
        let rr = read_file(&ctx, &[Value::String("/no/such/file".into())]).unwrap();
        let Value::Map(id) = rr else { panic!("expected map") };
        assert_eq!(
            ctx.gc.with_map(id, |m| m.get("ok").cloned()).unwrap(),
            Some(Value::Bool(false))
        );
    }
}
