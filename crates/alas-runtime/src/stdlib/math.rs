//! `math.*` (spec.md §4.3). Domain errors (negative `sqrt`, `asin`/`acos`
//! out of `[-1, 1]`, `randomInt` with `min > max`) return errors, never
//! silently clamp. All random sources are cryptographically strong: `rand`'s
//! `thread_rng()` is documented as a CSPRNG (ChaCha-based, OS-seeded).

use rand::Rng;

use crate::stdlib::{err, BuiltinResult, RuntimeCtx};
use crate::value::Value;

fn as_f64(v: &Value, who: &str) -> Result<f64, crate::stdlib::BuiltinError> {
    match v {
        Value::Int(n) => Ok(*n as f64),
        Value::Float(f) => Ok(*f),
        _ => Err(err(format!("{who}: expected a numeric argument, got {}", v.type_name()))),
    }
}

fn arg(args: &[Value], i: usize, who: &str) -> Result<f64, crate::stdlib::BuiltinError> {
    args.get(i)
        .ok_or_else(|| err(format!("{who}: missing argument {i}")))
        .and_then(|v| as_f64(v, who))
}

pub fn pi(_ctx: &RuntimeCtx, _args: &[Value]) -> BuiltinResult {
    Ok(Value::Float(std::f64::consts::PI))
}

pub fn e(_ctx: &RuntimeCtx, _args: &[Value]) -> BuiltinResult {
    Ok(Value::Float(std::f64::consts::E))
}

pub fn abs(_ctx: &RuntimeCtx, args: &[Value]) -> BuiltinResult {
    Ok(Value::Float(arg(args, 0, "math.abs")?.abs()))
}

pub fn min(_ctx: &RuntimeCtx, args: &[Value]) -> BuiltinResult {
    Ok(Value::Float(arg(args, 0, "math.min")?.min(arg(args, 1, "math.min")?)))
}

pub fn max(_ctx: &RuntimeCtx, args: &[Value]) -> BuiltinResult {
    Ok(Value::Float(arg(args, 0, "math.max")?.max(arg(args, 1, "math.max")?)))
}

pub fn pow(_ctx: &RuntimeCtx, args: &[Value]) -> BuiltinResult {
    Ok(Value::Float(arg(args, 0, "math.pow")?.powf(arg(args, 1, "math.pow")?)))
}

pub fn sqrt(_ctx: &RuntimeCtx, args: &[Value]) -> BuiltinResult {
    let x = arg(args, 0, "math.sqrt")?;
    if x < 0.0 {
        return Err(err("math.sqrt: domain error, argument must be >= 0"));
    }
    Ok(Value::Float(x.sqrt()))
}

macro_rules! unary_trig {
    ($name:ident, $who:expr, $f:ident) => {
        pub fn $name(_ctx: &RuntimeCtx, args: &[Value]) -> BuiltinResult {
            Ok(Value::Float(arg(args, 0, $who)?.$f()))
        }
    };
}

unary_trig!(sin, "math.sin", sin);
unary_trig!(cos, "math.cos", cos);
unary_trig!(tan, "math.tan", tan);

pub fn asin(_ctx: &RuntimeCtx, args: &[Value]) -> BuiltinResult {
    let x = arg(args, 0, "math.asin")?;
    if !(-1.0..=1.0).contains(&x) {
        return Err(err("math.asin: domain error, argument must be in [-1, 1]"));
    }
    Ok(Value::Float(x.asin()))
}

pub fn acos(_ctx: &RuntimeCtx, args: &[Value]) -> BuiltinResult {
    let x = arg(args, 0, "math.acos")?;
    if !(-1.0..=1.0).contains(&x) {
        return Err(err("math.acos: domain error, argument must be in [-1, 1]"));
    }
    Ok(Value::Float(x.acos()))
}

unary_trig!(atan, "math.atan", atan);
unary_trig!(floor, "math.floor", floor);
unary_trig!(ceil, "math.ceil", ceil);
unary_trig!(round, "math.round", round);

pub fn random(_ctx: &RuntimeCtx, _args: &[Value]) -> BuiltinResult {
    Ok(Value::Float(rand::thread_rng().gen_range(0.0..1.0)))
}

pub fn random_int(_ctx: &RuntimeCtx, args: &[Value]) -> BuiltinResult {
    let min = arg(args, 0, "math.randomInt")? as i64;
    let max = arg(args, 1, "math.randomInt")? as i64;
    if min > max {
        return Err(err("math.randomInt: min must be <= max"));
    }
    Ok(Value::Int(rand::thread_rng().gen_range(min..=max)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sqrt_rejects_negative() {
        let ctx = RuntimeCtx::default();
        assert!(sqrt(&ctx, &[Value::Int(-1)]).is_err());
        assert_eq!(sqrt(&ctx, &[Value::Int(4)]).unwrap(), Value::Float(2.0));
    }

    #[test]
    fn asin_acos_reject_out_of_range() {
        let ctx = RuntimeCtx::default();
        assert!(asin(&ctx, &[Value::Float(2.0)]).is_err());
        assert!(acos(&ctx, &[Value::Float(-2.0)]).is_err());
        assert!(asin(&ctx, &[Value::Float(0.5)]).is_ok());
    }

    #[test]
    fn random_int_rejects_min_greater_than_max() {
        let ctx = RuntimeCtx::default();
        assert!(random_int(&ctx, &[Value::Int(5), Value::Int(1)]).is_err());
        let v = random_int(&ctx, &[Value::Int(1), Value::Int(1)]).unwrap();
        assert_eq!(v, Value::Int(1));
    }

    #[test]
    fn random_is_in_unit_interval() {
        let ctx = RuntimeCtx::default();
        for _ in 0..50 {
            let Value::Float(f) = random(&ctx, &[]).unwrap() else { panic!() };
            assert!((0.0..1.0).contains(&f));
        }
    }
}
