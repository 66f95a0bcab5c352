//! Multi-module coordinator (spec.md §4.6): resolves a module's transitive
//! imports, topologically orders them with Kahn's algorithm, and compiles
//! each one in dependency order so every imported function is already
//! codegen'd (as an `ExternFn`) by the time its importer is lowered.
//!
//! Grounded on the teacher's `resolver.rs` + `call_graph.rs` pairing: a
//! small load-then-order step ahead of the real compilation pass, rather
//! than a resolver baked into codegen itself.

use std::collections::{HashMap, HashSet, VecDeque};

use alas_core::Module;

use crate::codegen::{self, ExternFn};
use crate::error::{link_err, LinkError};
use crate::ir::IrModule;

/// Supplies module source by name; `driver.rs` implements this over the
/// module-path search list, tests implement it over an in-memory map.
pub trait ModuleLoader {
    fn load_by_name(&self, name: &str) -> Result<Module, LinkError>;
}

pub struct InMemoryLoader {
    modules: HashMap<String, Module>,
}

impl InMemoryLoader {
    pub fn new(modules: Vec<Module>) -> Self {
        InMemoryLoader { modules: modules.into_iter().map(|m| (m.name.clone(), m)).collect() }
    }
}

impl ModuleLoader for InMemoryLoader {
    fn load_by_name(&self, name: &str) -> Result<Module, LinkError> {
        self.modules.get(name).cloned().ok_or_else(|| link_err(format!("module \"{name}\" not found")))
    }
}

/// Loads `root` and the transitive closure of its imports, then returns
/// them in an order where every module appears after all of its
/// dependencies (a dependency-first topological order).
pub fn load_transitive(loader: &dyn ModuleLoader, root: &str) -> Result<Vec<Module>, LinkError> {
    let mut loaded: HashMap<String, Module> = HashMap::new();
    let mut queue = VecDeque::new();
    queue.push_back(root.to_string());

    while let Some(name) = queue.pop_front() {
        if loaded.contains_key(&name) {
            continue;
        }
        let module = loader.load_by_name(&name)?;
        for imp in &module.imports {
            if !loaded.contains_key(imp) {
                queue.push_back(imp.clone());
            }
        }
        loaded.insert(name, module);
    }

    topo_sort(loaded)
}

/// Kahn's algorithm over the import graph; a leftover module after the
/// queue drains means a cycle, which is a link error rather than silently
/// compiling in source order (spec.md §4.6, §7).
fn topo_sort(modules: HashMap<String, Module>) -> Result<Vec<Module>, LinkError> {
    let mut in_degree: HashMap<String, usize> = modules.keys().map(|n| (n.clone(), 0)).collect();
    let mut dependents: HashMap<String, Vec<String>> = modules.keys().map(|n| (n.clone(), Vec::new())).collect();

    for (name, module) in &modules {
        for imp in &module.imports {
            if !modules.contains_key(imp) {
                return Err(link_err(format!("module \"{name}\" imports unknown module \"{imp}\"")));
            }
            *in_degree.get_mut(name).unwrap() += 1;
            dependents.get_mut(imp).unwrap().push(name.clone());
        }
    }

    let mut ready: VecDeque<String> = in_degree.iter().filter(|(_, d)| **d == 0).map(|(n, _)| n.clone()).collect();
    let mut ready_sorted: Vec<String> = ready.iter().cloned().collect();
    ready_sorted.sort();
    ready = ready_sorted.into();

    let mut order = Vec::with_capacity(modules.len());
    while let Some(name) = ready.pop_front() {
        order.push(name.clone());
        let mut freed = Vec::new();
        for dep in &dependents[&name] {
            let d = in_degree.get_mut(dep).unwrap();
            *d -= 1;
            if *d == 0 {
                freed.push(dep.clone());
            }
        }
        freed.sort();
        for f in freed {
            ready.push_back(f);
        }
    }

    if order.len() != modules.len() {
        let stuck: Vec<&str> = modules.keys().filter(|n| !order.contains(n)).map(|s| s.as_str()).collect();
        return Err(link_err(format!("import cycle detected among: {}", stuck.join(", "))));
    }

    let mut modules = modules;
    Ok(order.into_iter().map(|n| modules.remove(&n).unwrap()).collect())
}

/// One module's export signatures, kept so later modules in the order can
/// pre-seed their externs without re-deriving them from the IR.
struct Compiled {
    exports: Vec<ExternFn>,
}

/// Compiles every module in `order` (already dependency-first), pre-seeding
/// each one's externs from its direct imports' already-compiled exports.
pub fn compile_all(order: &[Module]) -> Result<Vec<IrModule>, crate::error::CodegenError> {
    let mut compiled: HashMap<String, Compiled> = HashMap::new();
    let mut out = Vec::with_capacity(order.len());

    for module in order {
        let mut externs = Vec::new();
        for imp in &module.imports {
            let dep = compiled
                .get(imp)
                .ok_or_else(|| crate::error::codegen_err(format!("module \"{}\" compiled before its dependency \"{imp}\"", module.name)))?;
            externs.extend(dep.exports.iter().cloned());
        }

        let ir = codegen::lower_module(module, &externs)?;

        let exports = module
            .exports
            .iter()
            .filter_map(|name| module.function(name))
            .map(|f| ExternFn {
                mangled_name: format!("{}__{}", module.name, f.name),
                params: f.params.iter().map(|p| p.ty.clone()).collect(),
                return_type: f.return_type.clone(),
            })
            .collect();

        compiled.insert(module.name.clone(), Compiled { exports });
        out.push(ir);
    }

    Ok(out)
}

/// Copies every function (and struct/string pool) from each compiled
/// module into one linked `IrModule`, mangling cross-module calls as
/// `module__function` (spec.md §4.6's "link: all" mode). Detects duplicate
/// symbol names across modules as a link error.
pub fn link(name: &str, modules: Vec<IrModule>) -> Result<IrModule, LinkError> {
    let mut linked = IrModule::new(name);
    let mut seen = HashSet::new();

    for module in modules {
        for st in module.structs {
            linked.structs.push(st);
        }
        for s in module.string_constants {
            linked.intern_string(&s);
        }
        for func in module.functions {
            if func.is_declaration {
                // Runtime helpers and externs are declared once; skip
                // duplicates silently rather than treating them as a
                // symbol clash.
                if linked.function(&func.name).is_none() {
                    linked.functions.push(func);
                }
                continue;
            }
            if !seen.insert(func.name.clone()) {
                return Err(link_err(format!("duplicate symbol \"{}\" across linked modules", func.name)));
            }
            linked.functions.push(func);
        }
    }

    Ok(linked)
}

#[cfg(test)]
mod tests {
    use super::*;
    use alas_core::{Function, Param, TypeName};

    fn leaf(name: &str) -> Module {
        Module {
            name: name.to_string(),
            imports: vec![],
            exports: vec!["value".into()],
            functions: vec![Function {
                name: "value".into(),
                params: vec![],
                return_type: TypeName::Int,
                body: vec![alas_core::Stmt::Return { value: Some(alas_core::Expr::Literal(alas_core::Literal::Int(1))) }],
            }],
            types: vec![],
        }
    }

    fn importer(name: &str, imports: Vec<&str>) -> Module {
        Module {
            name: name.to_string(),
            imports: imports.into_iter().map(String::from).collect(),
            exports: vec![],
            functions: vec![Function {
                name: "main".into(),
                params: vec![Param { name: "x".into(), ty: TypeName::Int }],
                return_type: TypeName::Int,
                body: vec![alas_core::Stmt::Return { value: Some(alas_core::Expr::Variable("x".into())) }],
            }],
            types: vec![],
        }
    }

    #[test]
    fn topo_sort_orders_dependencies_first() {
        let modules: HashMap<String, Module> =
            [("A".to_string(), importer("A", vec!["B"])), ("B".to_string(), leaf("B"))].into_iter().collect();
        let order = topo_sort(modules).unwrap();
        let names: Vec<&str> = order.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["B", "A"]);
    }

    #[test]
    fn topo_sort_detects_a_cycle() {
        let modules: HashMap<String, Module> =
            [("A".to_string(), importer("A", vec!["B"])), ("B".to_string(), importer("B", vec!["A"]))].into_iter().collect();
        let err = topo_sort(modules).unwrap_err();
        assert!(err.0.contains("cycle"));
    }

    #[test]
    fn compile_all_seeds_externs_from_dependencies() {
        let order = vec![leaf("B"), importer("A", vec!["B"])];
        let compiled = compile_all(&order).unwrap();
        assert_eq!(compiled.len(), 2);
    }

    #[test]
    fn link_detects_duplicate_symbols() {
        let a = codegen::lower_module(&leaf("shared"), &[]).unwrap();
        let mut b = codegen::lower_module(&leaf("shared"), &[]).unwrap();
        b.name = "shared2".into();
        let err = link("linked", vec![a, b]).unwrap_err();
        assert!(err.0.contains("duplicate symbol"));
    }
}
