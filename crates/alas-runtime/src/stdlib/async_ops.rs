//! `async.*` (spec.md §4.3). The scheduler's internal engine is out of
//! scope (SPEC_FULL.md ambient-async section); what's load-bearing is the
//! builtin contract: a task is a `{type: "task", id, status}` map, and
//! `spawn`/`await`/`parallel`/`race`/`timeout`/`cancel` behave the way a
//! cooperative scheduler would.
//!
//! Builtin arguments are evaluated eagerly by the interpreter before this
//! table is consulted, so `spawn`/`parallel`/`race`/`timeout` here see an
//! already-computed result rather than an unevaluated quotation. Real
//! concurrent evaluation of a quotation's body is the interpreter's job: it
//! calls `Scheduler::spawn_with` directly (bypassing this registry) when it
//! still holds the unevaluated AST. The functions below are the
//! value-already-known form, used when a task is built from a value that's
//! already in hand (the common case once the interpreter has run the body
//! on a `tokio::task::spawn_blocking` thread and captured its outcome).

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use crate::stdlib::{err, BuiltinError, BuiltinResult, RuntimeCtx};
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Status {
    Pending,
    Running,
    Completed,
    Failed,
    Canceled,
}

impl Status {
    fn as_str(self) -> &'static str {
        match self {
            Status::Pending => "pending",
            Status::Running => "running",
            Status::Completed => "completed",
            Status::Failed => "failed",
            Status::Canceled => "canceled",
        }
    }
}

struct TaskState {
    status: Mutex<Status>,
    value: Mutex<Option<Value>>,
    error: Mutex<Option<String>>,
    cancel_flag: Arc<AtomicBool>,
}

/// Owns the task table and a background `tokio` runtime used for real
/// timing (`sleep`) and off-thread evaluation (`spawn_with`).
pub struct Scheduler {
    runtime: tokio::runtime::Runtime,
    tasks: RwLock<HashMap<u64, Arc<TaskState>>>,
    next_id: AtomicU64,
}

impl Scheduler {
    pub fn new() -> Self {
        Scheduler {
            runtime: tokio::runtime::Builder::new_multi_thread()
                .worker_threads(2)
                .enable_all()
                .build()
                .expect("failed to start async runtime"),
            tasks: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    fn register(&self, status: Status, value: Option<Value>, error: Option<String>) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let state = Arc::new(TaskState {
            status: Mutex::new(status),
            value: Mutex::new(value),
            error: Mutex::new(error),
            cancel_flag: Arc::new(AtomicBool::new(false)),
        });
        self.tasks.write().expect("scheduler table poisoned").insert(id, state);
        id
    }

    fn get(&self, id: u64) -> Option<Arc<TaskState>> {
        self.tasks.read().expect("scheduler table poisoned").get(&id).cloned()
    }

    /// Run `body` on a blocking-pool thread, cooperatively checking
    /// `cancel_flag` is the caller's responsibility (the closure decides
    /// when to bail out). Used by the interpreter, not by this module's own
    /// builtins.
    pub fn spawn_with<F>(&self, body: F) -> u64
    where
        F: FnOnce(Arc<AtomicBool>) -> Result<Value, String> + Send + 'static,
    {
        let id = self.register(Status::Running, None, None);
        let state = self.get(id).expect("just inserted");
        let cancel = state.cancel_flag.clone();
        self.runtime.spawn_blocking(move || {
            let outcome = body(cancel);
            let mut status = state.status.lock().expect("task status poisoned");
            match outcome {
                Ok(v) => {
                    *state.value.lock().expect("task value poisoned") = Some(v);
                    *status = Status::Completed;
                }
                Err(e) => {
                    *state.error.lock().expect("task error poisoned") = Some(e);
                    *status = Status::Failed;
                }
            }
        });
        id
    }

    /// Build the `{type: "task", id, status}` value an interpreter hands
    /// back to user code after a direct `spawn_with` call.
    pub fn task_value(&self, ctx: &RuntimeCtx, id: u64) -> Value {
        let status = self.get(id).map(|s| *s.status.lock().expect("task status poisoned")).unwrap_or(Status::Failed);
        let id_val = ctx.gc.allocate_map(vec![
            ("type".to_string(), Value::String("task".to_string())),
            ("id".to_string(), Value::Int(id as i64)),
            ("status".to_string(), Value::String(status.as_str().to_string())),
        ]);
        Value::Map(id_val)
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

fn task_id(ctx: &RuntimeCtx, v: &Value, who: &str) -> Result<u64, BuiltinError> {
    let Value::Map(map_id) = v else {
        return Err(err(format!("{who}: expected a task value")));
    };
    ctx.gc
        .with_map(*map_id, |m| match m.get("id") {
            Some(Value::Int(n)) => Ok(*n as u64),
            _ => Err(err(format!("{who}: malformed task value"))),
        })
        .ok_or_else(|| err(format!("{who}: task not found")))?
}

/// `async.spawn(value)`: wraps an already-evaluated value as a completed
/// task (see module docs — real concurrent evaluation happens via
/// `spawn_with`, called directly by the interpreter).
pub fn spawn(ctx: &RuntimeCtx, args: &[Value]) -> BuiltinResult {
    let value = args.first().cloned().ok_or_else(|| err("async.spawn: missing value"))?;
    let id = ctx.scheduler.register(Status::Completed, Some(value), None);
    Ok(ctx.scheduler.task_value(ctx, id))
}

/// Blocks the calling thread until `task` leaves `Pending`/`Running`,
/// polling on a short interval. This is the cooperative-scheduler half of
/// spec.md §4.3/§5: a caller that holds a task handle is expected to be
/// able to wait on it, not just peek at whatever status happened to be
/// current the instant it asked.
pub fn await_task(ctx: &RuntimeCtx, args: &[Value]) -> BuiltinResult {
    let v = args.first().ok_or_else(|| err("async.await: missing task"))?;
    let id = task_id(ctx, v, "async.await")?;
    let state = ctx.scheduler.get(id).ok_or_else(|| err("async.await: unknown task"))?;
    loop {
        let status = *state.status.lock().expect("task status poisoned");
        match status {
            Status::Completed => return Ok(state.value.lock().expect("task value poisoned").clone().unwrap_or(Value::Void)),
            Status::Failed => return Err(err(state.error.lock().expect("task error poisoned").clone().unwrap_or_default())),
            Status::Canceled => return Err(err("async.await: task was canceled")),
            Status::Pending | Status::Running => {
                std::thread::sleep(Duration::from_millis(2));
            }
        }
    }
}

pub fn await_timeout(ctx: &RuntimeCtx, args: &[Value]) -> BuiltinResult {
    let v = args.first().ok_or_else(|| err("async.awaitTimeout: missing task"))?;
    let Some(Value::Int(ms)) = args.get(1) else {
        return Err(err("async.awaitTimeout: expected an integer millisecond timeout"));
    };
    if *ms < 0 {
        return Err(err("async.awaitTimeout: timeout must be >= 0"));
    }
    let id = task_id(ctx, v, "async.awaitTimeout")?;
    let state = ctx.scheduler.get(id).ok_or_else(|| err("async.awaitTimeout: unknown task"))?;
    let deadline = std::time::Instant::now() + Duration::from_millis(*ms as u64);
    loop {
        let status = *state.status.lock().expect("task status poisoned");
        match status {
            Status::Completed => return Ok(state.value.lock().expect("task value poisoned").clone().unwrap_or(Value::Void)),
            Status::Failed => return Err(err(state.error.lock().expect("task error poisoned").clone().unwrap_or_default())),
            Status::Canceled => return Err(err("async.awaitTimeout: task was canceled")),
            Status::Pending | Status::Running => {
                if std::time::Instant::now() >= deadline {
                    return Err(err("async.awaitTimeout: timed out"));
                }
                std::thread::sleep(Duration::from_millis(2));
            }
        }
    }
}

/// `parallel(tasks[]) -> {ok, values[], errors[]}` (spec.md §4.3): waits for
/// every task, succeeding only if all of them do; a failure still waits out
/// the rest rather than abandoning them, so `errors` lines up index-for-
/// index with `tasks`.
pub fn parallel(ctx: &RuntimeCtx, args: &[Value]) -> BuiltinResult {
    let Some(Value::Array(arr_id)) = args.first() else {
        return Err(err("async.parallel: expected an array of tasks"));
    };
    let tasks = ctx
        .gc
        .with_array(*arr_id, |v| v.to_vec())
        .ok_or_else(|| err("async.parallel: array not found"))?;
    let mut values = Vec::with_capacity(tasks.len());
    let mut errors = Vec::with_capacity(tasks.len());
    let mut all_ok = true;
    for t in &tasks {
        match await_task(ctx, &[t.clone()]) {
            Ok(v) => {
                values.push(v);
                errors.push(Value::Void);
            }
            Err(e) => {
                all_ok = false;
                values.push(Value::Void);
                errors.push(Value::String(e.to_string()));
            }
        }
    }
    let result = ctx.gc.allocate_map(vec![
        ("ok".to_string(), Value::Bool(all_ok)),
        ("values".to_string(), Value::Array(ctx.gc.allocate_array(values))),
        ("errors".to_string(), Value::Array(ctx.gc.allocate_array(errors))),
    ]);
    Ok(Value::Map(result))
}

/// `race(tasks[]) -> {ok, winner, value, error}` (spec.md §4.3): returns as
/// soon as any task completes, by polling every task's status in a round
/// rather than waiting on one at a time in array order.
pub fn race(ctx: &RuntimeCtx, args: &[Value]) -> BuiltinResult {
    let Some(Value::Array(arr_id)) = args.first() else {
        return Err(err("async.race: expected an array of tasks"));
    };
    let tasks = ctx
        .gc
        .with_array(*arr_id, |v| v.to_vec())
        .ok_or_else(|| err("async.race: array not found"))?;
    if tasks.is_empty() {
        return Err(err("async.race: empty task array"));
    }
    let ids: Vec<u64> = tasks.iter().map(|t| task_id(ctx, t, "async.race")).collect::<Result<_, _>>()?;
    loop {
        for (i, id) in ids.iter().enumerate() {
            let Some(state) = ctx.scheduler.get(*id) else { continue };
            let status = *state.status.lock().expect("task status poisoned");
            let (ok, value, error) = match status {
                Status::Completed => (true, state.value.lock().expect("task value poisoned").clone().unwrap_or(Value::Void), Value::Void),
                Status::Failed => {
                    (false, Value::Void, Value::String(state.error.lock().expect("task error poisoned").clone().unwrap_or_default()))
                }
                Status::Canceled => (false, Value::Void, Value::String("task was canceled".to_string())),
                Status::Pending | Status::Running => continue,
            };
            let result = ctx.gc.allocate_map(vec![
                ("ok".to_string(), Value::Bool(ok)),
                ("winner".to_string(), Value::Int(i as i64)),
                ("value".to_string(), value),
                ("error".to_string(), error),
            ]);
            return Ok(Value::Map(result));
        }
        std::thread::sleep(Duration::from_millis(2));
    }
}

pub fn sleep(ctx: &RuntimeCtx, args: &[Value]) -> BuiltinResult {
    let Some(Value::Int(ms)) = args.first() else {
        return Err(err("async.sleep: expected an integer millisecond duration"));
    };
    if *ms < 0 {
        return Err(err("async.sleep: duration must be >= 0"));
    }
    let ms = *ms as u64;
    ctx.scheduler.runtime.block_on(tokio::time::sleep(Duration::from_millis(ms)));
    Ok(Value::Void)
}

pub fn timeout(ctx: &RuntimeCtx, args: &[Value]) -> BuiltinResult {
    await_timeout(ctx, args)
}

pub fn cancel(ctx: &RuntimeCtx, args: &[Value]) -> BuiltinResult {
    let v = args.first().ok_or_else(|| err("async.cancel: missing task"))?;
    let id = task_id(ctx, v, "async.cancel")?;
    let state = ctx.scheduler.get(id).ok_or_else(|| err("async.cancel: unknown task"))?;
    state.cancel_flag.store(true, Ordering::Release);
    let mut status = state.status.lock().expect("task status poisoned");
    if matches!(*status, Status::Pending | Status::Running) {
        *status = Status::Canceled;
    }
    Ok(Value::Void)
}

pub fn is_running(ctx: &RuntimeCtx, args: &[Value]) -> BuiltinResult {
    let v = args.first().ok_or_else(|| err("async.isRunning: missing task"))?;
    let id = task_id(ctx, v, "async.isRunning")?;
    let state = ctx.scheduler.get(id).ok_or_else(|| err("async.isRunning: unknown task"))?;
    let status = *state.status.lock().expect("task status poisoned");
    Ok(Value::Bool(matches!(status, Status::Pending | Status::Running)))
}

pub fn is_completed(ctx: &RuntimeCtx, args: &[Value]) -> BuiltinResult {
    let v = args.first().ok_or_else(|| err("async.isCompleted: missing task"))?;
    let id = task_id(ctx, v, "async.isCompleted")?;
    let state = ctx.scheduler.get(id).ok_or_else(|| err("async.isCompleted: unknown task"))?;
    let status = *state.status.lock().expect("task status poisoned");
    Ok(Value::Bool(matches!(status, Status::Completed | Status::Failed | Status::Canceled)))
}

/// Names that need access to an unevaluated quotation and so are dispatched
/// specially by the interpreter rather than through the flat builtin table.
pub fn is_async_control(name: &str) -> bool {
    matches!(name, "async.spawn" | "async.parallel" | "async.race" | "async.timeout")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spawn_await_roundtrips() {
        let ctx = RuntimeCtx::default();
        let task = spawn(&ctx, &[Value::Int(42)]).unwrap();
        assert_eq!(is_completed(&ctx, &[task.clone()]).unwrap(), Value::Bool(true));
        assert_eq!(await_task(&ctx, &[task]).unwrap(), Value::Int(42));
    }

    #[test]
    fn parallel_collects_every_result_in_order() {
        let ctx = RuntimeCtx::default();
        let t1 = spawn(&ctx, &[Value::Int(1)]).unwrap();
        let t2 = spawn(&ctx, &[Value::Int(2)]).unwrap();
        let arr = Value::Array(ctx.gc.allocate_array(vec![t1, t2]));
        let out = parallel(&ctx, &[arr]).unwrap();
        let Value::Map(id) = out else { panic!() };
        assert_eq!(ctx.gc.with_map(id, |m| m.get("ok").cloned()).flatten(), Some(Value::Bool(true)));
        let Some(Value::Array(values_id)) = ctx.gc.with_map(id, |m| m.get("values").cloned()).flatten() else { panic!() };
        assert_eq!(ctx.gc.with_array(values_id, |v| v.to_vec()).unwrap(), vec![Value::Int(1), Value::Int(2)]);
    }

    #[test]
    fn parallel_waits_for_a_still_running_task() {
        let ctx = RuntimeCtx::default();
        let id = ctx.scheduler.spawn_with(|_cancel| {
            std::thread::sleep(Duration::from_millis(20));
            Ok(Value::Int(7))
        });
        let task = ctx.scheduler.task_value(&ctx, id);
        let arr = Value::Array(ctx.gc.allocate_array(vec![task]));
        let out = parallel(&ctx, &[arr]).unwrap();
        let Value::Map(map_id) = out else { panic!() };
        assert_eq!(ctx.gc.with_map(map_id, |m| m.get("ok").cloned()).flatten(), Some(Value::Bool(true)));
    }

    #[test]
    fn race_returns_the_first_task_to_complete() {
        let ctx = RuntimeCtx::default();
        let slow = ctx.scheduler.spawn_with(|_cancel| {
            std::thread::sleep(Duration::from_millis(100));
            Ok(Value::Int(1))
        });
        let fast = ctx.scheduler.spawn_with(|_cancel| Ok(Value::Int(2)));
        let tasks = vec![ctx.scheduler.task_value(&ctx, slow), ctx.scheduler.task_value(&ctx, fast)];
        let arr = Value::Array(ctx.gc.allocate_array(tasks));
        let out = race(&ctx, &[arr]).unwrap();
        let Value::Map(id) = out else { panic!() };
        assert_eq!(ctx.gc.with_map(id, |m| m.get("winner").cloned()).flatten(), Some(Value::Int(1)));
        assert_eq!(ctx.gc.with_map(id, |m| m.get("value").cloned()).flatten(), Some(Value::Int(2)));
    }

    #[test]
    fn cancel_marks_pending_task_canceled() {
        let ctx = RuntimeCtx::default();
        let id = ctx.scheduler.register(Status::Running, None, None);
        let task = ctx.scheduler.task_value(&ctx, id);
        cancel(&ctx, &[task.clone()]).unwrap();
        assert_eq!(is_running(&ctx, &[task]).unwrap(), Value::Bool(false));
    }

    #[test]
    fn sleep_accepts_zero_and_rejects_negative() {
        let ctx = RuntimeCtx::default();
        assert!(sleep(&ctx, &[Value::Int(0)]).is_ok());
        assert!(sleep(&ctx, &[Value::Int(-1)]).is_err());
    }
}
