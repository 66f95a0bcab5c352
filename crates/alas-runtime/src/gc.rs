//! Value & GC runtime (spec.md §4.2).
//!
//! Tagged values are copied by value; heap containers (arrays, maps) are
//! shared by id in a process-wide, read-write-lock-guarded table. Ids are
//! monotonically increasing and never reused. `release` walks nested GC ids
//! reachable from a container's payload and releases them too, so dropping
//! a container eventually drops everything it transitively owns.
//!
//! A sweep is a single-flight background pass gated by a compare-and-swap
//! flag (grounded in the teacher's `ACTIVE_STRANDS`/single-flight idiom in
//! its scheduler): ordinary allocators never block on a running sweep.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::RwLock;

use crate::value::{ObjectId, Value};

#[derive(Debug)]
pub enum ObjectData {
    Array(Vec<Value>),
    Map(HashMap<String, Value>),
}

impl ObjectData {
    fn approx_size(&self) -> usize {
        match self {
            ObjectData::Array(v) => 16 + v.len() * std::mem::size_of::<Value>(),
            ObjectData::Map(m) => 16 + m.len() * (std::mem::size_of::<Value>() + 24),
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            ObjectData::Array(_) => "array",
            ObjectData::Map(_) => "map",
        }
    }

    fn nested_ids(&self) -> Vec<ObjectId> {
        let mut ids = Vec::new();
        let push = |ids: &mut Vec<ObjectId>, v: &Value| {
            if let Value::Array(id) | Value::Map(id) = v {
                ids.push(*id);
            }
        };
        match self {
            ObjectData::Array(v) => v.iter().for_each(|x| push(&mut ids, x)),
            ObjectData::Map(m) => m.values().for_each(|x| push(&mut ids, x)),
        }
        ids
    }
}

struct GcObject {
    data: ObjectData,
    refcount: AtomicI64,
}

/// Process-wide statistics snapshot (spec.md §4.2 `stats()`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GcStats {
    pub live_objects: usize,
    pub live_arrays: usize,
    pub live_maps: usize,
    pub total_allocated: u64,
}

/// Default live-object threshold that triggers a background sweep
/// (spec.md §4.2).
pub const DEFAULT_SWEEP_THRESHOLD: usize = 1000;

pub struct Gc {
    table: RwLock<HashMap<ObjectId, GcObject>>,
    next_id: AtomicU64,
    total_allocated: AtomicU64,
    sweep_in_progress: AtomicBool,
    threshold: usize,
}

impl Default for Gc {
    fn default() -> Self {
        Self::new(DEFAULT_SWEEP_THRESHOLD)
    }
}

impl Gc {
    pub fn new(threshold: usize) -> Self {
        Gc {
            table: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            total_allocated: AtomicU64::new(0),
            sweep_in_progress: AtomicBool::new(false),
            threshold,
        }
    }

    fn insert(&self, data: ObjectData) -> ObjectId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.total_allocated.fetch_add(1, Ordering::Relaxed);
        let mut table = self.table.write().expect("gc table poisoned");
        table.insert(
            id,
            GcObject {
                data,
                refcount: AtomicI64::new(1),
            },
        );
        drop(table);
        if self.live_count() > self.threshold {
            self.maybe_sweep();
        }
        id
    }

    pub fn allocate_array(&self, values: Vec<Value>) -> ObjectId {
        self.insert(ObjectData::Array(values))
    }

    pub fn allocate_map(&self, entries: Vec<(String, Value)>) -> ObjectId {
        self.insert(ObjectData::Map(entries.into_iter().collect()))
    }

    /// Atomically increment an object's refcount. No-op for id 0 or an
    /// unknown id.
    pub fn retain(&self, id: ObjectId) {
        if id == 0 {
            return;
        }
        let table = self.table.read().expect("gc table poisoned");
        if let Some(obj) = table.get(&id) {
            obj.refcount.fetch_add(1, Ordering::AcqRel);
        }
    }

    /// Atomically decrement an object's refcount. At zero, releases any
    /// nested GC ids reachable from the container, then removes the entry.
    /// No-op for id 0 or an unknown id.
    pub fn release(&self, id: ObjectId) {
        if id == 0 {
            return;
        }
        let nested = {
            let table = self.table.read().expect("gc table poisoned");
            let Some(obj) = table.get(&id) else {
                return;
            };
            let prev = obj.refcount.fetch_sub(1, Ordering::AcqRel);
            if prev > 1 {
                return;
            }
            obj.data.nested_ids()
        };

        {
            let mut table = self.table.write().expect("gc table poisoned");
            // Re-check: another thread may have retained it between the
            // read-lock check above and taking the write lock.
            if let Some(obj) = table.get(&id) {
                if obj.refcount.load(Ordering::Acquire) <= 0 {
                    table.remove(&id);
                } else {
                    return;
                }
            } else {
                return;
            }
        }

        for child in nested {
            self.release(child);
        }
    }

    pub fn live_count(&self) -> usize {
        self.table.read().expect("gc table poisoned").len()
    }

    /// Walk the live-object table and deallocate entries with refcount <= 0
    /// that are still present (spec.md §4.2). Single-flight: if a sweep is
    /// already running, this call is a no-op.
    pub fn run_sweep(&self) {
        if self
            .sweep_in_progress
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Relaxed)
            .is_err()
        {
            return;
        }
        let dead: Vec<ObjectId> = {
            let table = self.table.read().expect("gc table poisoned");
            table
                .iter()
                .filter(|(_, obj)| obj.refcount.load(Ordering::Acquire) <= 0)
                .map(|(id, _)| *id)
                .collect()
        };
        {
            let mut table = self.table.write().expect("gc table poisoned");
            for id in &dead {
                table.remove(id);
            }
        }
        self.sweep_in_progress.store(false, Ordering::Release);
    }

    fn maybe_sweep(&self) {
        self.run_sweep();
    }

    pub fn stats(&self) -> GcStats {
        let table = self.table.read().expect("gc table poisoned");
        let mut stats = GcStats {
            total_allocated: self.total_allocated.load(Ordering::Relaxed),
            ..Default::default()
        };
        for obj in table.values() {
            stats.live_objects += 1;
            match obj.data.kind() {
                "array" => stats.live_arrays += 1,
                "map" => stats.live_maps += 1,
                _ => {}
            }
        }
        stats
    }

    pub fn approx_size(&self, id: ObjectId) -> usize {
        let table = self.table.read().expect("gc table poisoned");
        table.get(&id).map(|o| o.data.approx_size()).unwrap_or(0)
    }

    pub fn with_array<R>(&self, id: ObjectId, f: impl FnOnce(&[Value]) -> R) -> Option<R> {
        let table = self.table.read().expect("gc table poisoned");
        match &table.get(&id)?.data {
            ObjectData::Array(v) => Some(f(v)),
            ObjectData::Map(_) => None,
        }
    }

    pub fn with_array_mut<R>(&self, id: ObjectId, f: impl FnOnce(&mut Vec<Value>) -> R) -> Option<R> {
        let mut table = self.table.write().expect("gc table poisoned");
        match &mut table.get_mut(&id)?.data {
            ObjectData::Array(v) => Some(f(v)),
            ObjectData::Map(_) => None,
        }
    }

    pub fn with_map<R>(&self, id: ObjectId, f: impl FnOnce(&HashMap<String, Value>) -> R) -> Option<R> {
        let table = self.table.read().expect("gc table poisoned");
        match &table.get(&id)?.data {
            ObjectData::Map(m) => Some(f(m)),
            ObjectData::Array(_) => None,
        }
    }

    pub fn with_map_mut<R>(&self, id: ObjectId, f: impl FnOnce(&mut HashMap<String, Value>) -> R) -> Option<R> {
        let mut table = self.table.write().expect("gc table poisoned");
        match &mut table.get_mut(&id)?.data {
            ObjectData::Map(m) => Some(f(m)),
            ObjectData::Array(_) => None,
        }
    }

    pub fn is_truthy(&self, value: &Value) -> bool {
        match value {
            Value::Array(id) => self.with_array(*id, |v| !v.is_empty()).unwrap_or(false),
            Value::Map(id) => self.with_map(*id, |m| !m.is_empty()).unwrap_or(false),
            other => other.is_truthy_scalar().unwrap_or(false),
        }
    }

    /// Release `id`'s members too, as a deep clone-free duplicate. Returns
    /// a fresh object id for a shallow clone of the container (array: new
    /// backing vec; map: new backing map), retaining every nested GC id it
    /// now also references.
    pub fn shallow_clone(&self, id: ObjectId) -> ObjectId {
        let table = self.table.read().expect("gc table poisoned");
        let Some(obj) = table.get(&id) else { return 0 };
        let cloned = match &obj.data {
            ObjectData::Array(v) => ObjectData::Array(v.clone()),
            ObjectData::Map(m) => ObjectData::Map(m.clone()),
        };
        drop(table);
        let nested = cloned.nested_ids();
        let new_id = self.insert(cloned);
        for child in nested {
            self.retain(child);
        }
        new_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocate_and_release_drops_entry() {
        let gc = Gc::default();
        let id = gc.allocate_array(vec![Value::Int(1), Value::Int(2)]);
        assert_eq!(gc.live_count(), 1);
        gc.release(id);
        assert_eq!(gc.live_count(), 0);
    }

    #[test]
    fn retain_keeps_object_alive_across_two_releases() {
        let gc = Gc::default();
        let id = gc.allocate_array(vec![Value::Int(1)]);
        gc.retain(id);
        gc.release(id);
        assert_eq!(gc.live_count(), 1);
        gc.release(id);
        assert_eq!(gc.live_count(), 0);
    }

    #[test]
    fn release_is_transitive_over_nested_containers() {
        let gc = Gc::default();
        let inner = gc.allocate_array(vec![Value::Int(1)]);
        let outer = gc.allocate_array(vec![Value::Array(inner)]);
        assert_eq!(gc.live_count(), 2);
        gc.release(outer);
        assert_eq!(gc.live_count(), 0);
    }

    #[test]
    fn release_unknown_or_zero_id_is_noop() {
        let gc = Gc::default();
        gc.release(0);
        gc.release(9999);
        assert_eq!(gc.live_count(), 0);
    }

    #[test]
    fn shared_nested_container_survives_one_release() {
        let gc = Gc::default();
        let shared = gc.allocate_array(vec![Value::Int(7)]);
        let a = gc.allocate_array(vec![Value::Array(shared)]);
        gc.retain(shared); // referenced from two places
        let b = gc.allocate_array(vec![Value::Array(shared)]);
        gc.release(a);
        assert_eq!(gc.live_count(), 2); // shared + b
        gc.release(b);
        assert_eq!(gc.live_count(), 0);
    }

    #[test]
    fn stats_reports_live_counts_by_kind() {
        let gc = Gc::default();
        let _a = gc.allocate_array(vec![]);
        let _m = gc.allocate_map(vec![("k".to_string(), Value::Int(1))]);
        let stats = gc.stats();
        assert_eq!(stats.live_objects, 2);
        assert_eq!(stats.live_arrays, 1);
        assert_eq!(stats.live_maps, 1);
        assert_eq!(stats.total_allocated, 2);
    }

    #[test]
    fn run_sweep_collects_objects_with_nonpositive_refcount() {
        let gc = Gc::default();
        let id = gc.allocate_array(vec![]);
        // Force the refcount to zero without going through release's own
        // removal path, to exercise run_sweep directly.
        {
            let table = gc.table.read().unwrap();
            table.get(&id).unwrap().refcount.store(0, Ordering::SeqCst);
        }
        gc.run_sweep();
        assert_eq!(gc.live_count(), 0);
    }

    #[test]
    fn is_truthy_matches_spec_for_every_tag() {
        let gc = Gc::default();
        assert!(!gc.is_truthy(&Value::Bool(false)));
        assert!(gc.is_truthy(&Value::Bool(true)));
        assert!(!gc.is_truthy(&Value::Int(0)));
        assert!(gc.is_truthy(&Value::Int(1)));
        assert!(!gc.is_truthy(&Value::String(String::new())));
        assert!(gc.is_truthy(&Value::String("x".into())));
        assert!(!gc.is_truthy(&Value::Void));
        let empty = gc.allocate_array(vec![]);
        assert!(!gc.is_truthy(&Value::Array(empty)));
        let nonempty = gc.allocate_array(vec![Value::Int(1)]);
        assert!(gc.is_truthy(&Value::Array(nonempty)));
    }
}
