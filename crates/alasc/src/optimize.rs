//! IR optimizer (spec.md §4.7): four cumulative levels driven by `-O`.
//! Each level's passes run over the structured `ir::IrModule` rather than
//! regex-patching text, so later passes can see exactly what earlier ones
//! produced — grounded on the teacher's `codegen/specialization.rs`
//! pass-over-a-typed-IR shape rather than its text-substitution one.

use std::collections::{HashMap, HashSet};

use crate::ir::{ArithOp, Const, Instr, IrFunction, IrModule, Terminator, ValueId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    O0,
    O1,
    O2,
    O3,
}

impl Level {
    pub fn from_flag(n: u8) -> Level {
        match n {
            0 => Level::O0,
            1 => Level::O1,
            2 => Level::O2,
            _ => Level::O3,
        }
    }
}

pub fn optimize(module: &mut IrModule, level: Level) {
    if level == Level::O0 {
        return;
    }
    for f in &mut module.functions {
        if f.is_declaration {
            continue;
        }
        constant_fold(f);
        dce(f);
        remove_unreachable_blocks(f);
        if level >= Level::O2 {
            cse(f);
            merge_blocks(f);
        }
        if level >= Level::O3 {
            mark_licm(f);
        }
    }
    if level >= Level::O2 {
        eliminate_dead_functions(module);
    }
    if level >= Level::O3 {
        inline_small_functions(module);
    }
}

/// Folds `Arith` instructions whose operands are both literal `Const`
/// instructions earlier in the same block into a single `Const` (spec.md
/// §4.7 "basic": constant folding). Integer division/modulo by a constant
/// zero folds to zero rather than erroring — the runtime trap still fires
/// at the `check_div_zero` call the codegen already emitted ahead of it.
fn constant_fold(f: &mut IrFunction) {
    for block in &mut f.blocks {
        let mut consts: HashMap<ValueId, Const> = HashMap::new();
        let mut folded = Vec::with_capacity(block.instrs.len());
        for instr in block.instrs.drain(..) {
            match &instr {
                Instr::Const { result, value, .. } => {
                    consts.insert(*result, value.clone());
                    folded.push(instr);
                }
                Instr::Arith { result, op, ty, lhs, rhs } => {
                    match (consts.get(lhs), consts.get(rhs)) {
                        (Some(l), Some(r)) => match fold_arith(*op, l, r) {
                            Some(folded_val) => {
                                consts.insert(*result, folded_val.clone());
                                folded.push(Instr::Const { result: *result, ty: ty.clone(), value: folded_val });
                            }
                            None => folded.push(instr),
                        },
                        _ => folded.push(instr),
                    }
                }
                _ => folded.push(instr),
            }
        }
        block.instrs = folded;
    }
}

fn fold_arith(op: ArithOp, l: &Const, r: &Const) -> Option<Const> {
    match (l, r) {
        (Const::Int(a), Const::Int(b)) => fold_int(op, *a, *b),
        (Const::Float(a), Const::Float(b)) => fold_float(op, *a, *b),
        (Const::Bool(a), Const::Bool(b)) => fold_bool(op, *a, *b),
        _ => None,
    }
}

fn fold_int(op: ArithOp, a: i64, b: i64) -> Option<Const> {
    Some(match op {
        ArithOp::Add => Const::Int(a.wrapping_add(b)),
        ArithOp::Sub => Const::Int(a.wrapping_sub(b)),
        ArithOp::Mul => Const::Int(a.wrapping_mul(b)),
        ArithOp::Div => Const::Int(if b == 0 { 0 } else { a.wrapping_div(b) }),
        ArithOp::Rem => Const::Int(if b == 0 { 0 } else { a.wrapping_rem(b) }),
        ArithOp::ICmpEq => Const::Bool(a == b),
        ArithOp::ICmpNe => Const::Bool(a != b),
        ArithOp::ICmpSlt => Const::Bool(a < b),
        ArithOp::ICmpSle => Const::Bool(a <= b),
        ArithOp::ICmpSgt => Const::Bool(a > b),
        ArithOp::ICmpSge => Const::Bool(a >= b),
        ArithOp::And => Const::Int(a & b),
        ArithOp::Or => Const::Int(a | b),
        ArithOp::Xor => Const::Int(a ^ b),
        _ => return None,
    })
}

fn fold_float(op: ArithOp, a: f64, b: f64) -> Option<Const> {
    Some(match op {
        ArithOp::FAdd => Const::Float(a + b),
        ArithOp::FSub => Const::Float(a - b),
        ArithOp::FMul => Const::Float(a * b),
        ArithOp::FDiv => Const::Float(a / b),
        ArithOp::FRem => Const::Float(a % b),
        ArithOp::FCmpOeq => Const::Bool(a == b),
        ArithOp::FCmpOne => Const::Bool(a != b),
        ArithOp::FCmpOlt => Const::Bool(a < b),
        ArithOp::FCmpOle => Const::Bool(a <= b),
        ArithOp::FCmpOgt => Const::Bool(a > b),
        ArithOp::FCmpOge => Const::Bool(a >= b),
        _ => return None,
    })
}

fn fold_bool(op: ArithOp, a: bool, b: bool) -> Option<Const> {
    Some(match op {
        ArithOp::And => Const::Bool(a & b),
        ArithOp::Or => Const::Bool(a | b),
        ArithOp::Xor => Const::Bool(a ^ b),
        _ => return None,
    })
}

/// Use-chain dead code elimination: anything not reachable, by def-use
/// edges, from a side-effecting instruction or the block terminator is
/// dropped (spec.md §4.7 "basic": DCE, "side-effect instructions are
/// roots").
fn dce(f: &mut IrFunction) {
    for block in &mut f.blocks {
        let mut live: HashSet<ValueId> = HashSet::new();
        for v in terminator_operands(&block.terminator) {
            live.insert(v);
        }
        for instr in block.instrs.iter().rev() {
            let keep = instr.has_side_effect() || instr.result().is_some_and(|r| live.contains(&r));
            if keep {
                for op in instr.operands() {
                    live.insert(op);
                }
            }
        }
        block.instrs.retain(|instr| instr.has_side_effect() || instr.result().is_some_and(|r| live.contains(&r)));
    }
}

fn terminator_operands(term: &Terminator) -> Vec<ValueId> {
    match term {
        Terminator::Ret { value: Some(v), .. } => vec![*v],
        Terminator::CondBr { cond, .. } => vec![*cond],
        _ => vec![],
    }
}

/// Drops blocks no `Br`/`CondBr`/fallthrough can reach from `entry`
/// (spec.md §4.7 "basic": unreachable-block removal).
fn remove_unreachable_blocks(f: &mut IrFunction) {
    if f.blocks.is_empty() {
        return;
    }
    let mut reachable = HashSet::new();
    let mut stack = vec![f.blocks[0].label.clone()];
    while let Some(label) = stack.pop() {
        if !reachable.insert(label.clone()) {
            continue;
        }
        if let Some(block) = f.blocks.iter().find(|b| b.label == label) {
            match &block.terminator {
                Terminator::Br { target } => stack.push(target.clone()),
                Terminator::CondBr { then_label, else_label, .. } => {
                    stack.push(then_label.clone());
                    stack.push(else_label.clone());
                }
                Terminator::Ret { .. } | Terminator::Unreachable => {}
            }
        }
    }
    f.blocks.retain(|b| reachable.contains(&b.label));
}

/// Local common subexpression elimination keyed on `(opcode, operands)`
/// within one block (spec.md §4.7 "standard": local CSE).
fn cse(f: &mut IrFunction) {
    for block in &mut f.blocks {
        let mut seen: HashMap<(String, Vec<ValueId>), ValueId> = HashMap::new();
        let mut rewrite: HashMap<ValueId, ValueId> = HashMap::new();
        let mut out = Vec::with_capacity(block.instrs.len());
        for mut instr in block.instrs.drain(..) {
            remap_operands(&mut instr, &rewrite);
            if let Instr::Arith { result, op, ty, lhs, rhs } = &instr {
                let key = (format!("{}{}", op.mnemonic(), ty.render()), vec![*lhs, *rhs]);
                if let Some(&prior) = seen.get(&key) {
                    rewrite.insert(*result, prior);
                    continue;
                }
                seen.insert(key, *result);
            }
            out.push(instr);
        }
        remap_terminator(&mut block.terminator, &rewrite);
        block.instrs = out;
    }
}

fn remap_operands(instr: &mut Instr, rewrite: &HashMap<ValueId, ValueId>) {
    let apply = |v: &mut ValueId| {
        if let Some(&r) = rewrite.get(v) {
            *v = r;
        }
    };
    match instr {
        Instr::Arith { lhs, rhs, .. } => {
            apply(lhs);
            apply(rhs);
        }
        Instr::SIToFP { operand, .. } | Instr::Box { operand, .. } | Instr::Unbox { operand, .. } => apply(operand),
        Instr::Load { ptr, .. } => apply(ptr),
        Instr::Store { ptr, value } => {
            apply(ptr);
            apply(value);
        }
        Instr::StoreParam { ptr, .. } => apply(ptr),
        Instr::CheckCall { args, .. } | Instr::Call { args, .. } => {
            for a in args {
                apply(a);
            }
        }
        Instr::Gep { base, index, .. } => {
            apply(base);
            apply(index);
        }
        Instr::Const { .. } | Instr::Alloca { .. } => {}
    }
}

fn remap_terminator(term: &mut Terminator, rewrite: &HashMap<ValueId, ValueId>) {
    match term {
        Terminator::Ret { value: Some(v), .. } => {
            if let Some(&r) = rewrite.get(v) {
                *v = r;
            }
        }
        Terminator::CondBr { cond, .. } => {
            if let Some(&r) = rewrite.get(cond) {
                *cond = r;
            }
        }
        _ => {}
    }
}

/// Merges a block into its sole predecessor when that predecessor's only
/// successor is this block (spec.md §4.7 "standard": CFG block merging).
fn merge_blocks(f: &mut IrFunction) {
    loop {
        let mut pred_count: HashMap<String, usize> = f.blocks.iter().map(|b| (b.label.clone(), 0)).collect();
        for b in &f.blocks {
            for succ in successors(&b.terminator) {
                *pred_count.entry(succ).or_insert(0) += 1;
            }
        }

        let candidate = f.blocks.iter().enumerate().find_map(|(i, b)| match &b.terminator {
            Terminator::Br { target } if pred_count.get(target).copied() == Some(1) && target != &b.label => {
                Some((i, target.clone()))
            }
            _ => None,
        });

        let Some((pred_idx, succ_label)) = candidate else { break };
        let Some(succ_idx) = f.blocks.iter().position(|b| b.label == succ_label) else { break };
        if pred_idx == succ_idx {
            break;
        }
        let succ = f.blocks.remove(succ_idx);
        let pred_idx = if succ_idx < pred_idx { pred_idx - 1 } else { pred_idx };
        f.blocks[pred_idx].instrs.extend(succ.instrs);
        f.blocks[pred_idx].terminator = succ.terminator;
    }
}

fn successors(term: &Terminator) -> Vec<String> {
    match term {
        Terminator::Br { target } => vec![target.clone()],
        Terminator::CondBr { then_label, else_label, .. } => vec![then_label.clone(), else_label.clone()],
        Terminator::Ret { .. } | Terminator::Unreachable => vec![],
    }
}

/// Marks loop-invariant `Arith`/`Const` candidates by hoisting them into
/// the loop's entry predecessor when every operand is already defined
/// before the loop (spec.md §4.7 "aggressive": LICM). This conservative
/// pass only handles the single-preheader shape `codegen.rs` emits for
/// `while`/`for` (a `Br` into a `loop.cond`-prefixed block).
fn mark_licm(f: &mut IrFunction) {
    let loop_heads: Vec<usize> = f
        .blocks
        .iter()
        .enumerate()
        .filter(|(_, b)| b.label.starts_with("loop.cond."))
        .map(|(i, _)| i)
        .collect();

    for head_idx in loop_heads {
        let head_label = f.blocks[head_idx].label.clone();
        let Some(preheader_idx) = f.blocks.iter().position(|b| matches!(&b.terminator, Terminator::Br { target } if *target == head_label))
        else {
            continue;
        };
        if preheader_idx == head_idx {
            continue;
        }
        let defined_before: HashSet<ValueId> =
            f.blocks[..=preheader_idx].iter().flat_map(|b| b.instrs.iter().filter_map(|i| i.result())).collect();

        let Terminator::CondBr { then_label, .. } = &f.blocks[head_idx].terminator else { continue };
        let body_label = then_label.clone();
        let Some(body_idx) = f.blocks.iter().position(|b| b.label == body_label) else { continue };

        let mut hoisted = Vec::new();
        f.blocks[body_idx].instrs.retain(|instr| {
            let invariant = matches!(instr, Instr::Const { .. })
                || matches!(instr, Instr::Arith { .. } if instr.operands().iter().all(|o| defined_before.contains(o)));
            if invariant && !instr.has_side_effect() {
                hoisted.push(instr.clone());
                false
            } else {
                true
            }
        });
        let insert_at = f.blocks[preheader_idx].instrs.len();
        for instr in hoisted {
            f.blocks[preheader_idx].instrs.insert(insert_at, instr);
        }
    }
}

/// Inlines a callee at its call site when the callee is a single-block,
/// non-`main` function under a small instruction-count threshold (spec.md
/// §4.7 "aggressive": small-function inlining).
const INLINE_THRESHOLD: usize = 5;

fn inline_small_functions(module: &mut IrModule) {
    let inlinable: HashMap<String, IrFunction> = module
        .functions
        .iter()
        .filter(|f| !f.is_declaration && f.name != "main" && f.blocks.len() == 1 && f.instruction_count() < INLINE_THRESHOLD)
        .map(|f| (f.name.clone(), f.clone()))
        .collect();

    for caller in &mut module.functions {
        if caller.is_declaration {
            continue;
        }
        for block in &mut caller.blocks {
            let mut rewritten = Vec::with_capacity(block.instrs.len());
            for instr in block.instrs.drain(..) {
                if let Instr::Call { result, callee, args, .. } = &instr {
                    if let Some(callee_fn) = inlinable.get(callee) {
                        if let Some(body) = inline_body(callee_fn, args, *result, &mut caller.next_value) {
                            rewritten.extend(body);
                            continue;
                        }
                    }
                }
                rewritten.push(instr);
            }
            block.instrs = rewritten;
        }
    }
}

/// Builds the instruction sequence a call site is replaced with: the
/// callee's single-block body, with its `Alloca`d parameter slots spliced
/// from the call's argument values and its `Ret` rewritten into the
/// result binding the caller expected.
fn inline_body(callee: &IrFunction, args: &[ValueId], result: Option<ValueId>, next_value: &mut ValueId) -> Option<Vec<Instr>> {
    let block = callee.blocks.first()?;
    let mut remap: HashMap<ValueId, ValueId> = HashMap::new();
    let mut out = Vec::new();

    for (param, arg) in callee.params.iter().zip(args.iter()) {
        let slot = fresh(next_value);
        out.push(Instr::Alloca { result: slot, ty: param.ty.clone(), name: format!("{}_inl", param.name) });
        out.push(Instr::Store { ptr: slot, value: *arg });
        let load = fresh(next_value);
        out.push(Instr::Load { result: load, ty: param.ty.clone(), ptr: slot });
    }

    for instr in &block.instrs {
        let mut cloned = instr.clone();
        remap_operands(&mut cloned, &remap);
        if let Some(old_result) = cloned.result() {
            let new_result = fresh(next_value);
            remap.insert(old_result, new_result);
            set_result(&mut cloned, new_result);
        }
        out.push(cloned);
    }

    if let Terminator::Ret { value: Some(v), .. } = &block.terminator {
        let mut v = *v;
        if let Some(&r) = remap.get(&v) {
            v = r;
        }
        if let Some(dest) = result {
            remap.insert(dest, v);
        }
    }

    Some(out)
}

fn fresh(next_value: &mut ValueId) -> ValueId {
    let id = *next_value;
    *next_value += 1;
    id
}

fn set_result(instr: &mut Instr, new_result: ValueId) {
    match instr {
        Instr::Const { result, .. }
        | Instr::Arith { result, .. }
        | Instr::SIToFP { result, .. }
        | Instr::Alloca { result, .. }
        | Instr::Load { result, .. }
        | Instr::Gep { result, .. }
        | Instr::Box { result, .. }
        | Instr::Unbox { result, .. } => *result = new_result,
        Instr::Call { result, .. } => *result = Some(new_result),
        Instr::Store { .. } | Instr::StoreParam { .. } | Instr::CheckCall { .. } => {}
    }
}

/// Module-level dead-function elimination (spec.md §4.7 "standard"+):
/// `main` and every declared extern are roots; anything not reachable by
/// `Call` edges from a root is dropped.
fn eliminate_dead_functions(module: &mut IrModule) {
    let mut live: HashSet<String> = module.functions.iter().filter(|f| f.is_declaration || f.name == "main").map(|f| f.name.clone()).collect();
    let mut changed = true;
    while changed {
        changed = false;
        let mut newly_live = Vec::new();
        for f in &module.functions {
            if !live.contains(&f.name) {
                continue;
            }
            for block in &f.blocks {
                for instr in &block.instrs {
                    if let Instr::Call { callee, .. } = instr {
                        if !live.contains(callee) && !newly_live.contains(callee) {
                            newly_live.push(callee.clone());
                        }
                    }
                }
            }
        }
        for name in newly_live {
            live.insert(name);
            changed = true;
        }
    }
    module.functions.retain(|f| live.contains(&f.name));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{BasicBlock, IrModule, IrParam, IrType};

    #[test]
    fn constant_fold_reduces_arithmetic_to_a_literal() {
        let mut f = IrFunction::new("f", vec![], IrType::I64);
        let mut entry = BasicBlock::new("entry");
        entry.instrs.push(Instr::Const { result: 0, ty: IrType::I64, value: Const::Int(2) });
        entry.instrs.push(Instr::Const { result: 1, ty: IrType::I64, value: Const::Int(3) });
        entry.instrs.push(Instr::Arith { result: 2, op: ArithOp::Add, ty: IrType::I64, lhs: 0, rhs: 1 });
        entry.terminator = Terminator::Ret { ty: IrType::I64, value: Some(2) };
        f.blocks.push(entry);

        constant_fold(&mut f);
        let folded = f.blocks[0].instrs.iter().find(|i| i.result() == Some(2)).unwrap();
        assert!(matches!(folded, Instr::Const { value: Const::Int(5), .. }));
    }

    #[test]
    fn dce_drops_a_dead_instruction_but_keeps_side_effects() {
        let mut f = IrFunction::new("f", vec![], IrType::Void);
        let mut entry = BasicBlock::new("entry");
        entry.instrs.push(Instr::Const { result: 0, ty: IrType::I64, value: Const::Int(1) }); // dead
        entry.instrs.push(Instr::CheckCall { helper: "check_bounds".into(), args: vec![] });
        entry.terminator = Terminator::Ret { ty: IrType::Void, value: None };
        f.blocks.push(entry);

        dce(&mut f);
        assert_eq!(f.blocks[0].instrs.len(), 1);
        assert!(matches!(f.blocks[0].instrs[0], Instr::CheckCall { .. }));
    }

    #[test]
    fn unreachable_blocks_are_removed() {
        let mut f = IrFunction::new("f", vec![], IrType::Void);
        let mut entry = BasicBlock::new("entry");
        entry.terminator = Terminator::Ret { ty: IrType::Void, value: None };
        f.blocks.push(entry);
        let mut orphan = BasicBlock::new("orphan");
        orphan.terminator = Terminator::Unreachable;
        f.blocks.push(orphan);

        remove_unreachable_blocks(&mut f);
        assert_eq!(f.blocks.len(), 1);
        assert_eq!(f.blocks[0].label, "entry");
    }

    #[test]
    fn cse_collapses_a_repeated_addition() {
        let mut f = IrFunction::new("f", vec![IrParam { name: "a".into(), ty: IrType::I64 }], IrType::I64);
        let mut entry = BasicBlock::new("entry");
        entry.instrs.push(Instr::Arith { result: 0, op: ArithOp::Add, ty: IrType::I64, lhs: 10, rhs: 11 });
        entry.instrs.push(Instr::Arith { result: 1, op: ArithOp::Add, ty: IrType::I64, lhs: 10, rhs: 11 });
        entry.terminator = Terminator::Ret { ty: IrType::I64, value: Some(1) };
        f.blocks.push(entry);

        cse(&mut f);
        assert_eq!(f.blocks[0].instrs.len(), 1);
        match &f.blocks[0].terminator {
            Terminator::Ret { value: Some(v), .. } => assert_eq!(*v, 0),
            other => panic!("unexpected terminator {other:?}"),
        }
    }

    #[test]
    fn dead_function_elimination_keeps_only_reachable_functions() {
        let mut module = IrModule::new("m");
        let mut main = IrFunction::new("main", vec![], IrType::I64);
        let mut entry = BasicBlock::new("entry");
        entry.instrs.push(Instr::Call { result: Some(0), callee: "used".into(), ty: IrType::I64, args: vec![] });
        entry.terminator = Terminator::Ret { ty: IrType::I64, value: Some(0) };
        main.blocks.push(entry);

        let mut used = IrFunction::new("used", vec![], IrType::I64);
        let mut used_entry = BasicBlock::new("entry");
        used_entry.instrs.push(Instr::Const { result: 0, ty: IrType::I64, value: Const::Int(1) });
        used_entry.terminator = Terminator::Ret { ty: IrType::I64, value: Some(0) };
        used.blocks.push(used_entry);

        let mut unused = IrFunction::new("unused", vec![], IrType::I64);
        let mut unused_entry = BasicBlock::new("entry");
        unused_entry.terminator = Terminator::Ret { ty: IrType::I64, value: None };
        unused.blocks.push(unused_entry);

        module.functions.push(main);
        module.functions.push(used);
        module.functions.push(unused);

        eliminate_dead_functions(&mut module);
        let names: Vec<&str> = module.functions.iter().map(|f| f.name.as_str()).collect();
        assert!(names.contains(&"main"));
        assert!(names.contains(&"used"));
        assert!(!names.contains(&"unused"));
    }
}
