//! Tree-walking interpreter (spec.md §4.4). Walks statements depth-first
//! over a per-call frame (name -> `Value`); no break/continue exists in the
//! IL, so loops only ever exit via their condition or a `return` unwind.
//!
//! Struct values and map values share one runtime representation
//! (`Value::Map`): a `field` access is a dynamic lookup by name regardless
//! of whether the literal that produced it matched a declared struct's
//! field set. That distinction only matters to the code generator, which
//! has to choose a native layout; the interpreter's "a map is a map" (see
//! spec.md §9) makes the two paths agree without extra bookkeeping here.

use std::collections::HashMap;
use std::sync::Arc;

use alas_core::{BinOp, Expr, Literal, Module, Stmt, UnOp};
use alas_runtime::{RuntimeCtx, Value};

use crate::error::{RuntimeError, RuntimeErrorKind};

type Frame = HashMap<String, Value>;

enum Flow {
    /// Statement execution fell off the end of a block; carries the value
    /// of the last `expr` statement evaluated, if any (spec.md §4.4's
    /// implicit-return rule).
    Continue(Option<Value>),
    Return(Value),
}

/// Cheap to clone: both fields are `Arc`s, so spawning a task that
/// recurses into the interpreter on another thread is just sharing
/// pointers, not cloning module ASTs.
#[derive(Clone)]
pub struct Interpreter {
    ctx: Arc<RuntimeCtx>,
    modules: Arc<HashMap<String, Module>>,
}

impl Interpreter {
    pub fn new(ctx: Arc<RuntimeCtx>, modules: Arc<HashMap<String, Module>>) -> Self {
        Interpreter { ctx, modules }
    }

    pub fn ctx(&self) -> &RuntimeCtx {
        &self.ctx
    }

    fn module(&self, name: &str) -> Result<&Module, RuntimeError> {
        self.modules
            .get(name)
            .ok_or_else(|| RuntimeError::new(RuntimeErrorKind::UndefinedName, format!("unknown module \"{name}\"")))
    }

    pub fn call(&self, module_name: &str, func_name: &str, args: Vec<Value>) -> Result<Value, RuntimeError> {
        let module = self.module(module_name)?;
        let func = module.function(func_name).ok_or_else(|| {
            RuntimeError::new(
                RuntimeErrorKind::UndefinedName,
                format!("no function \"{func_name}\" in module \"{module_name}\""),
            )
        })?;
        if func.params.len() != args.len() {
            return Err(RuntimeError::new(
                RuntimeErrorKind::ArityMismatch,
                format!(
                    "{module_name}.{func_name}: expected {} argument(s), got {}",
                    func.params.len(),
                    args.len()
                ),
            ));
        }
        let mut frame: Frame = HashMap::new();
        for (param, value) in func.params.iter().zip(args) {
            frame.insert(param.name.clone(), value);
        }
        match self.exec_block(module, &mut frame, &func.body)? {
            Flow::Return(v) => Ok(v),
            Flow::Continue(last) => Ok(last.unwrap_or(Value::Void)),
        }
    }

    fn exec_block(&self, module: &Module, frame: &mut Frame, stmts: &[Stmt]) -> Result<Flow, RuntimeError> {
        let mut last = None;
        for stmt in stmts {
            match stmt {
                Stmt::Assign { target, value } => {
                    let v = self.eval_expr(module, frame, value)?;
                    frame.insert(target.clone(), v);
                    last = None;
                }
                Stmt::If { cond, then_branch, else_branch } => {
                    let c = self.eval_expr(module, frame, cond)?;
                    let branch = if self.ctx.gc.is_truthy(&c) { then_branch } else { else_branch };
                    match self.exec_block(module, frame, branch)? {
                        Flow::Return(v) => return Ok(Flow::Return(v)),
                        Flow::Continue(v) => last = v,
                    }
                }
                Stmt::While { cond, body } | Stmt::For { cond, body } => loop {
                    let c = self.eval_expr(module, frame, cond)?;
                    if !self.ctx.gc.is_truthy(&c) {
                        break;
                    }
                    match self.exec_block(module, frame, body)? {
                        Flow::Return(v) => return Ok(Flow::Return(v)),
                        Flow::Continue(v) => last = v,
                    }
                },
                Stmt::Return { value } => {
                    let v = match value {
                        Some(e) => self.eval_expr(module, frame, e)?,
                        None => Value::Void,
                    };
                    return Ok(Flow::Return(v));
                }
                Stmt::Expr { value } => {
                    last = Some(self.eval_expr(module, frame, value)?);
                }
            }
        }
        Ok(Flow::Continue(last))
    }

    fn eval_expr(&self, module: &Module, frame: &Frame, expr: &Expr) -> Result<Value, RuntimeError> {
        match expr {
            Expr::Literal(Literal::Int(n)) => Ok(Value::Int(*n)),
            Expr::Literal(Literal::Float(f)) => Ok(Value::Float(*f)),
            Expr::Literal(Literal::Bool(b)) => Ok(Value::Bool(*b)),
            Expr::StringLiteral(s) => Ok(Value::String(s.clone())),
            Expr::Variable(name) => frame
                .get(name)
                .cloned()
                .ok_or_else(|| RuntimeError::new(RuntimeErrorKind::UndefinedName, format!("undefined variable \"{name}\""))),
            Expr::Binary { op, left, right } => {
                let l = self.eval_expr(module, frame, left)?;
                let r = self.eval_expr(module, frame, right)?;
                eval_binary(*op, l, r)
            }
            Expr::Unary { op, operand } => {
                let v = self.eval_expr(module, frame, operand)?;
                eval_unary(*op, v)
            }
            Expr::Call { name, args } => {
                let argv = self.eval_args(module, frame, args)?;
                if module.function(name).is_none() {
                    return Err(RuntimeError::new(
                        RuntimeErrorKind::UndefinedName,
                        format!("no function \"{name}\" in module \"{}\"", module.name),
                    ));
                }
                self.call(&module.name, name, argv)
            }
            Expr::ModuleCall { module: target, name, args } => {
                let argv = self.eval_args(module, frame, args)?;
                if !module.imports.iter().any(|m| m == target) {
                    return Err(RuntimeError::new(
                        RuntimeErrorKind::UndefinedName,
                        format!("module \"{}\" does not import \"{target}\"", module.name),
                    ));
                }
                self.call(target, name, argv)
            }
            Expr::Builtin { name, args } => self.eval_builtin(module, frame, name, args),
            Expr::ArrayLiteral { elements } => {
                let values = self.eval_args(module, frame, elements)?;
                Ok(Value::Array(self.ctx.gc.allocate_array(values)))
            }
            Expr::MapLiteral { pairs } => {
                let mut entries = Vec::with_capacity(pairs.len());
                for (k, v) in pairs {
                    let key = self.eval_expr(module, frame, k)?.coerce_key();
                    let value = self.eval_expr(module, frame, v)?;
                    entries.push((key, value));
                }
                Ok(Value::Map(self.ctx.gc.allocate_map(entries)))
            }
            Expr::Index { object, index } => {
                let obj = self.eval_expr(module, frame, object)?;
                let idx = self.eval_expr(module, frame, index)?;
                self.eval_index(obj, idx)
            }
            Expr::Field { object, field } => {
                let obj = self.eval_expr(module, frame, object)?;
                self.eval_field(obj, field)
            }
        }
    }

    fn eval_args(&self, module: &Module, frame: &Frame, exprs: &[Expr]) -> Result<Vec<Value>, RuntimeError> {
        exprs.iter().map(|e| self.eval_expr(module, frame, e)).collect()
    }

    fn eval_index(&self, obj: Value, idx: Value) -> Result<Value, RuntimeError> {
        match obj {
            Value::Array(id) => {
                let Value::Int(i) = idx else {
                    return Err(RuntimeError::new(RuntimeErrorKind::BadCast, "array index must be an int"));
                };
                let len = self
                    .ctx
                    .gc
                    .with_array(id, |v| v.len() as i64)
                    .ok_or_else(|| RuntimeError::new(RuntimeErrorKind::BadCast, "array not found"))?;
                if i < 0 || i >= len {
                    return Err(RuntimeError::new(
                        RuntimeErrorKind::IndexOutOfBounds,
                        format!("index {i} out of bounds for array of length {len}"),
                    ));
                }
                Ok(self.ctx.gc.with_array(id, |v| v[i as usize].clone()).unwrap())
            }
            Value::Map(id) => {
                let key = idx.coerce_key();
                self.ctx
                    .gc
                    .with_map(id, |m| m.get(&key).cloned())
                    .flatten()
                    .ok_or_else(|| RuntimeError::new(RuntimeErrorKind::IndexOutOfBounds, format!("key \"{key}\" not found")))
            }
            other => Err(RuntimeError::new(
                RuntimeErrorKind::BadCast,
                format!("cannot index a {}", other.type_name()),
            )),
        }
    }

    fn eval_field(&self, obj: Value, field: &str) -> Result<Value, RuntimeError> {
        match obj {
            Value::Map(id) => self
                .ctx
                .gc
                .with_map(id, |m| m.get(field).cloned())
                .flatten()
                .ok_or_else(|| RuntimeError::new(RuntimeErrorKind::BadCast, format!("unknown field \"{field}\""))),
            other => Err(RuntimeError::new(
                RuntimeErrorKind::BadCast,
                format!("cannot access field \"{field}\" on a {}", other.type_name()),
            )),
        }
    }

    /// `async.spawn` is the one builtin that can run concurrently: when its
    /// argument is itself a call expression, the call runs on a scheduler
    /// worker thread and `spawn` returns a pending/running task immediately
    /// (spec.md §5). Every other builtin — including `async.spawn` given a
    /// plain value, since there is nothing left to defer — evaluates its
    /// arguments eagerly and dispatches through the flat registry.
    fn eval_builtin(&self, module: &Module, frame: &Frame, name: &str, args: &[Expr]) -> Result<Value, RuntimeError> {
        if name == "async.spawn" {
            if let Some(target) = args.first() {
                match target {
                    Expr::Call { name: fname, args: call_args } => {
                        let argv = self.eval_args(module, frame, call_args)?;
                        return Ok(self.spawn_call(module.name.clone(), fname.clone(), argv));
                    }
                    Expr::ModuleCall { module: target_module, name: fname, args: call_args } => {
                        let argv = self.eval_args(module, frame, call_args)?;
                        return Ok(self.spawn_call(target_module.clone(), fname.clone(), argv));
                    }
                    _ => {}
                }
            }
        }

        let argv = self.eval_args(module, frame, args)?;
        let f = alas_runtime::lookup(name)
            .ok_or_else(|| RuntimeError::new(RuntimeErrorKind::UndefinedName, format!("unknown builtin \"{name}\"")))?;
        f(&self.ctx, &argv).map_err(RuntimeError::from)
    }

    fn spawn_call(&self, module_name: String, func_name: String, args: Vec<Value>) -> Value {
        let interp = self.clone();
        let id = self.ctx.scheduler.spawn_with(move |_cancel| interp.call(&module_name, &func_name, args).map_err(|e| e.to_string()));
        self.ctx.scheduler.task_value(&self.ctx, id)
    }
}

fn eval_unary(op: UnOp, v: Value) -> Result<Value, RuntimeError> {
    match (op, v) {
        (UnOp::Not, Value::Bool(b)) => Ok(Value::Bool(!b)),
        (UnOp::Neg, Value::Int(n)) => Ok(Value::Int(-n)),
        (UnOp::Neg, Value::Float(f)) => Ok(Value::Float(-f)),
        (op, other) => Err(RuntimeError::new(
            RuntimeErrorKind::BadCast,
            format!("unary op {op:?} not defined for a {}", other.type_name()),
        )),
    }
}

enum Num {
    Int(i64),
    Float(f64),
}

fn as_num(v: &Value) -> Option<Num> {
    match v {
        Value::Int(n) => Some(Num::Int(*n)),
        Value::Float(f) => Some(Num::Float(*f)),
        _ => None,
    }
}

fn eval_binary(op: BinOp, l: Value, r: Value) -> Result<Value, RuntimeError> {
    if op.is_logical() {
        let (Value::Bool(a), Value::Bool(b)) = (&l, &r) else {
            return Err(RuntimeError::new(RuntimeErrorKind::BadCast, "&&/|| require boolean operands"));
        };
        return Ok(Value::Bool(match op {
            BinOp::And => *a & *b,
            BinOp::Or => *a | *b,
            _ => unreachable!(),
        }));
    }

    if matches!(op, BinOp::Eq | BinOp::Ne) {
        let equal = match (as_num(&l), as_num(&r)) {
            (Some(a), Some(b)) => numeric_eq(a, b),
            _ => l == r,
        };
        return Ok(Value::Bool(if op == BinOp::Eq { equal } else { !equal }));
    }

    let (a, b) = (
        as_num(&l).ok_or_else(|| bad_numeric(&l))?,
        as_num(&r).ok_or_else(|| bad_numeric(&r))?,
    );

    if op.is_comparison() {
        let ordering = match (&a, &b) {
            (Num::Int(x), Num::Int(y)) => x.partial_cmp(y),
            _ => as_f64(a).partial_cmp(&as_f64(b)),
        };
        let Some(ordering) = ordering else {
            return Ok(Value::Bool(false)); // unordered (NaN) compares false, spec.md §4.4
        };
        use std::cmp::Ordering::*;
        let result = match op {
            BinOp::Lt => ordering == Less,
            BinOp::Le => ordering != Greater,
            BinOp::Gt => ordering == Greater,
            BinOp::Ge => ordering != Less,
            _ => unreachable!(),
        };
        return Ok(Value::Bool(result));
    }

    match (a, b) {
        (Num::Int(x), Num::Int(y)) => match op {
            BinOp::Add => Ok(Value::Int(x.wrapping_add(y))),
            BinOp::Sub => Ok(Value::Int(x.wrapping_sub(y))),
            BinOp::Mul => Ok(Value::Int(x.wrapping_mul(y))),
            BinOp::Div => {
                if y == 0 {
                    Err(RuntimeError::new(RuntimeErrorKind::DivisionByZero, "integer division by zero"))
                } else {
                    Ok(Value::Int(x.wrapping_div(y)))
                }
            }
            BinOp::Mod => {
                if y == 0 {
                    Err(RuntimeError::new(RuntimeErrorKind::DivisionByZero, "integer modulo by zero"))
                } else {
                    Ok(Value::Int(x.wrapping_rem(y)))
                }
            }
            _ => unreachable!(),
        },
        (a, b) => {
            let (x, y) = (as_f64(a), as_f64(b));
            match op {
                BinOp::Add => Ok(Value::Float(x + y)),
                BinOp::Sub => Ok(Value::Float(x - y)),
                BinOp::Mul => Ok(Value::Float(x * y)),
                BinOp::Div => Ok(Value::Float(x / y)),
                BinOp::Mod => Ok(Value::Float(x % y)),
                _ => unreachable!(),
            }
        }
    }
}

fn as_f64(n: Num) -> f64 {
    match n {
        Num::Int(i) => i as f64,
        Num::Float(f) => f,
    }
}

fn numeric_eq(a: Num, b: Num) -> bool {
    match (a, b) {
        (Num::Int(x), Num::Int(y)) => x == y,
        (a, b) => as_f64(a) == as_f64(b), // NaN != NaN falls out of IEEE `==`
    }
}

fn bad_numeric(v: &Value) -> RuntimeError {
    RuntimeError::new(RuntimeErrorKind::BadCast, format!("expected a numeric operand, got a {}", v.type_name()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use alas_core::{Function, Param, TypeName};

    fn module_with(name: &str, functions: Vec<Function>) -> Module {
        Module {
            name: name.to_string(),
            imports: vec![],
            exports: functions.iter().map(|f| f.name.clone()).collect(),
            functions,
            types: vec![],
        }
    }

    fn interp(modules: Vec<Module>) -> Interpreter {
        let ctx = Arc::new(RuntimeCtx::default());
        let map = modules.into_iter().map(|m| (m.name.clone(), m)).collect();
        Interpreter::new(ctx, Arc::new(map))
    }

    #[test]
    fn factorial_matches_closed_form() {
        // fact(n) = if n <= 1 then 1 else n * fact(n - 1)
        let body = vec![Stmt::If {
            cond: Expr::Binary {
                op: BinOp::Le,
                left: Box::new(Expr::Variable("n".into())),
                right: Box::new(Expr::Literal(Literal::Int(1))),
            },
            then_branch: vec![Stmt::Return { value: Some(Expr::Literal(Literal::Int(1))) }],
            else_branch: vec![Stmt::Return {
                value: Some(Expr::Binary {
                    op: BinOp::Mul,
                    left: Box::new(Expr::Variable("n".into())),
                    right: Box::new(Expr::Call {
                        name: "fact".into(),
                        args: vec![Expr::Binary {
                            op: BinOp::Sub,
                            left: Box::new(Expr::Variable("n".into())),
                            right: Box::new(Expr::Literal(Literal::Int(1))),
                        }],
                    }),
                }),
            }],
        }];
        let func = Function {
            name: "fact".into(),
            params: vec![Param { name: "n".into(), ty: TypeName::Int }],
            return_type: TypeName::Int,
            body,
        };
        let it = interp(vec![module_with("m", vec![func])]);
        let result = it.call("m", "fact", vec![Value::Int(10)]).unwrap();
        assert_eq!(result, Value::Int(3628800));
    }

    #[test]
    fn division_by_zero_is_a_runtime_error() {
        let func = Function {
            name: "div".into(),
            params: vec![Param { name: "a".into(), ty: TypeName::Int }, Param { name: "b".into(), ty: TypeName::Int }],
            return_type: TypeName::Int,
            body: vec![Stmt::Return {
                value: Some(Expr::Binary {
                    op: BinOp::Div,
                    left: Box::new(Expr::Variable("a".into())),
                    right: Box::new(Expr::Variable("b".into())),
                }),
            }],
        };
        let it = interp(vec![module_with("m", vec![func])]);
        let err = it.call("m", "div", vec![Value::Int(7), Value::Int(0)]).unwrap_err();
        assert_eq!(err.kind, RuntimeErrorKind::DivisionByZero);
    }

    #[test]
    fn array_index_out_of_bounds_errors() {
        let ctx = Arc::new(RuntimeCtx::default());
        let arr = ctx.gc.allocate_array(vec![Value::Int(1), Value::Int(2)]);
        let func = Function {
            name: "get".into(),
            params: vec![Param { name: "xs".into(), ty: TypeName::Array }, Param { name: "i".into(), ty: TypeName::Int }],
            return_type: TypeName::Int,
            body: vec![Stmt::Return {
                value: Some(Expr::Index {
                    object: Box::new(Expr::Variable("xs".into())),
                    index: Box::new(Expr::Variable("i".into())),
                }),
            }],
        };
        let map = [("m".to_string(), module_with("m", vec![func]))].into_iter().collect();
        let it = Interpreter::new(ctx, Arc::new(map));
        let err = it.call("m", "get", vec![Value::Array(arr), Value::Int(5)]).unwrap_err();
        assert_eq!(err.kind, RuntimeErrorKind::IndexOutOfBounds);
    }

    #[test]
    fn logical_and_or_are_bitwise_not_short_circuit() {
        let result = eval_binary(BinOp::And, Value::Bool(true), Value::Bool(false)).unwrap();
        assert_eq!(result, Value::Bool(false));
        let result = eval_binary(BinOp::Or, Value::Bool(false), Value::Bool(true)).unwrap();
        assert_eq!(result, Value::Bool(true));
    }

    #[test]
    fn mixed_numeric_comparison_promotes_to_float() {
        let result = eval_binary(BinOp::Lt, Value::Int(1), Value::Float(1.5)).unwrap();
        assert_eq!(result, Value::Bool(true));
    }

    #[test]
    fn struct_literal_field_access_is_a_map_lookup() {
        let ctx = Arc::new(RuntimeCtx::default());
        let it = Interpreter::new(ctx, Arc::new(HashMap::new()));
        let module = module_with("m", vec![]);
        let point = Expr::MapLiteral {
            pairs: vec![
                (Expr::StringLiteral("x".into()), Expr::Literal(Literal::Int(3))),
                (Expr::StringLiteral("y".into()), Expr::Literal(Literal::Int(4))),
            ],
        };
        let mut frame = HashMap::new();
        let v = it.eval_expr(&module, &frame, &point).unwrap();
        frame.insert("p".to_string(), v);
        let p = || Expr::Variable("p".to_string());
        let dist_sq = it
            .eval_expr(
                &module,
                &frame,
                &Expr::Binary {
                    op: BinOp::Add,
                    left: Box::new(Expr::Binary {
                        op: BinOp::Mul,
                        left: Box::new(Expr::Field { object: Box::new(p()), field: "x".into() }),
                        right: Box::new(Expr::Field { object: Box::new(p()), field: "x".into() }),
                    }),
                    right: Box::new(Expr::Binary {
                        op: BinOp::Mul,
                        left: Box::new(Expr::Field { object: Box::new(p()), field: "y".into() }),
                        right: Box::new(Expr::Field { object: Box::new(p()), field: "y".into() }),
                    }),
                },
            )
            .unwrap();
        assert_eq!(dist_sq, Value::Int(25));
    }

    #[test]
    fn cross_module_call_resolves_through_module_call() {
        let add = Function {
            name: "add".into(),
            params: vec![Param { name: "a".into(), ty: TypeName::Int }, Param { name: "b".into(), ty: TypeName::Int }],
            return_type: TypeName::Int,
            body: vec![Stmt::Return {
                value: Some(Expr::Binary {
                    op: BinOp::Add,
                    left: Box::new(Expr::Variable("a".into())),
                    right: Box::new(Expr::Variable("b".into())),
                }),
            }],
        };
        let main = Function {
            name: "main".into(),
            params: vec![],
            return_type: TypeName::Int,
            body: vec![Stmt::Return {
                value: Some(Expr::ModuleCall {
                    module: "B".into(),
                    name: "add".into(),
                    args: vec![Expr::Literal(Literal::Int(2)), Expr::Literal(Literal::Int(3))],
                }),
            }],
        };
        let it = interp(vec![module_with("A", vec![main]), module_with("B", vec![add])]);
        let result = it.call("A", "main", vec![]).unwrap();
        assert_eq!(result, Value::Int(5));
    }

    #[test]
    fn three_sleeps_in_parallel_finish_within_two_hundred_millis() {
        use std::time::Instant;

        // `wait(ms)` is a plain function so `async.spawn(wait(ms))` sees a
        // call expression and actually schedules it on a worker thread
        // (see `eval_builtin`'s `async.spawn` special case) instead of
        // evaluating `async.sleep` eagerly and blocking the caller.
        let wait = Function {
            name: "wait".into(),
            params: vec![Param { name: "ms".into(), ty: TypeName::Int }],
            return_type: TypeName::Void,
            body: vec![Stmt::Return {
                value: Some(Expr::Builtin { name: "async.sleep".into(), args: vec![Expr::Variable("ms".into())] }),
            }],
        };
        let spawn_wait = |ms: i64, target: &str| Stmt::Assign {
            target: target.into(),
            value: Expr::Builtin {
                name: "async.spawn".into(),
                args: vec![Expr::Call { name: "wait".into(), args: vec![Expr::Literal(Literal::Int(ms))] }],
            },
        };
        let main = Function {
            name: "main".into(),
            params: vec![],
            return_type: TypeName::Any,
            body: vec![
                spawn_wait(50, "a"),
                spawn_wait(100, "b"),
                spawn_wait(150, "c"),
                Stmt::Assign {
                    target: "tasks".into(),
                    value: Expr::ArrayLiteral {
                        elements: vec![Expr::Variable("a".into()), Expr::Variable("b".into()), Expr::Variable("c".into())],
                    },
                },
                Stmt::Return {
                    value: Some(Expr::Builtin { name: "async.parallel".into(), args: vec![Expr::Variable("tasks".into())] }),
                },
            ],
        };
        let it = interp(vec![module_with("m", vec![wait, main])]);
        let start = Instant::now();
        let result = it.call("m", "main", vec![]).unwrap();
        assert!(start.elapsed().as_millis() <= 200, "parallel wait took {:?}", start.elapsed());
        let Value::Map(id) = result else { panic!("expected the {{ok, values, errors}} map") };
        let ok = it.ctx().gc.with_map(id, |m| m.get("ok").cloned()).flatten();
        assert_eq!(ok, Some(Value::Bool(true)));
    }
}
