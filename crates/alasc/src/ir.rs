//! In-memory LLVM IR object model (SPEC_FULL.md supplement to spec.md
//! §4.5): a structured stand-in for the `.ll` text so the optimizer
//! (`optimize.rs`) has data to transform instead of strings to
//! regex-patch. Text is produced only once, at the very end, by `emit()`
//! — the teacher's direct-to-text idiom, just pushed to the printing step
//! instead of the whole lowering.

use std::collections::HashMap;
use std::fmt::Write as _;

pub type ValueId = u32;

/// LLVM type as used by the converted signatures of spec.md §4.5's type
/// table. `Opaque` covers `any`, `function`, `map`, and every builtin
/// argument/return slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IrType {
    I64,
    Double,
    I1,
    I32,
    Ptr,
    Void,
    /// A declared struct type, referenced by its mangled LLVM name. Emitted
    /// for documentation (the two-pass lowering's "declare every custom
    /// type" step); struct-typed *values* still flow through the program as
    /// `Ptr` map handles — see `codegen.rs`'s note on reusing the map
    /// runtime for both containers and structs.
    Named(String),
}

impl IrType {
    pub fn render(&self) -> String {
        match self {
            IrType::I64 => "i64".to_string(),
            IrType::Double => "double".to_string(),
            IrType::I1 => "i1".to_string(),
            IrType::I32 => "i32".to_string(),
            IrType::Ptr => "ptr".to_string(),
            IrType::Void => "void".to_string(),
            IrType::Named(n) => format!("%struct.{n}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Const {
    Int(i64),
    Float(f64),
    Bool(bool),
    /// Index into the module's string-constant pool.
    StringRef(u32),
    Null,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    FAdd,
    FSub,
    FMul,
    FDiv,
    FRem,
    ICmpEq,
    ICmpNe,
    ICmpSlt,
    ICmpSle,
    ICmpSgt,
    ICmpSge,
    FCmpOeq,
    FCmpOne,
    FCmpOlt,
    FCmpOle,
    FCmpOgt,
    FCmpOge,
    And,
    Or,
    Xor,
}

impl ArithOp {
    pub fn mnemonic(self) -> &'static str {
        match self {
            ArithOp::Add => "add",
            ArithOp::Sub => "sub",
            ArithOp::Mul => "mul",
            ArithOp::Div => "sdiv",
            ArithOp::Rem => "srem",
            ArithOp::FAdd => "fadd",
            ArithOp::FSub => "fsub",
            ArithOp::FMul => "fmul",
            ArithOp::FDiv => "fdiv",
            ArithOp::FRem => "frem",
            ArithOp::ICmpEq => "icmp eq",
            ArithOp::ICmpNe => "icmp ne",
            ArithOp::ICmpSlt => "icmp slt",
            ArithOp::ICmpSle => "icmp sle",
            ArithOp::ICmpSgt => "icmp sgt",
            ArithOp::ICmpSge => "icmp sge",
            ArithOp::FCmpOeq => "fcmp oeq",
            ArithOp::FCmpOne => "fcmp one",
            ArithOp::FCmpOlt => "fcmp olt",
            ArithOp::FCmpOle => "fcmp ole",
            ArithOp::FCmpOgt => "fcmp ogt",
            ArithOp::FCmpOge => "fcmp oge",
            ArithOp::And => "and",
            ArithOp::Or => "or",
            ArithOp::Xor => "xor",
        }
    }

    pub fn is_float(self) -> bool {
        matches!(
            self,
            ArithOp::FAdd
                | ArithOp::FSub
                | ArithOp::FMul
                | ArithOp::FDiv
                | ArithOp::FRem
                | ArithOp::FCmpOeq
                | ArithOp::FCmpOne
                | ArithOp::FCmpOlt
                | ArithOp::FCmpOle
                | ArithOp::FCmpOgt
                | ArithOp::FCmpOge
        )
    }

    /// Whether this op's *result* is `i1`, regardless of the `ty` carried
    /// on the `Arith` instruction (which names the *operand* type — e.g.
    /// `icmp eq i64 %a, %b` produces `i1`, not `i64`).
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            ArithOp::ICmpEq
                | ArithOp::ICmpNe
                | ArithOp::ICmpSlt
                | ArithOp::ICmpSle
                | ArithOp::ICmpSgt
                | ArithOp::ICmpSge
                | ArithOp::FCmpOeq
                | ArithOp::FCmpOne
                | ArithOp::FCmpOlt
                | ArithOp::FCmpOle
                | ArithOp::FCmpOgt
                | ArithOp::FCmpOge
        )
    }
}

/// An instruction with an SSA result id, as the optimizer passes key on
/// (opcode, operand identities) for CSE (spec.md §4.7).
#[derive(Debug, Clone)]
pub enum Instr {
    Const { result: ValueId, ty: IrType, value: Const },
    Arith { result: ValueId, op: ArithOp, ty: IrType, lhs: ValueId, rhs: ValueId },
    SIToFP { result: ValueId, operand: ValueId },
    Alloca { result: ValueId, ty: IrType, name: String },
    Load { result: ValueId, ty: IrType, ptr: ValueId },
    Store { ptr: ValueId, value: ValueId },
    /// Spills an incoming function argument to its stack slot. Unlike
    /// `Store`, the value side is the function's named parameter (`%name`
    /// in the signature), not a numbered local `ValueId`.
    StoreParam { ptr: ValueId, ty: IrType, param: String },
    /// `check_div_zero`/`check_bounds`/`check_null` extern calls
    /// (spec.md §6); no result, called purely for the side-effecting trap.
    CheckCall { helper: String, args: Vec<ValueId> },
    /// A call to a mangled module function, a declared builtin, or a
    /// runtime helper that does return a value.
    Call { result: Option<ValueId>, callee: String, ty: IrType, args: Vec<ValueId> },
    Gep { result: ValueId, base: ValueId, index: ValueId, elem_ty: IrType },
    /// Box a native value into the universal `Value` descriptor ahead of a
    /// builtin call (spec.md §6).
    Box { result: ValueId, ty: IrType, operand: ValueId },
    Unbox { result: ValueId, ty: IrType, operand: ValueId },
}

impl Instr {
    pub fn result(&self) -> Option<ValueId> {
        match self {
            Instr::Const { result, .. }
            | Instr::Arith { result, .. }
            | Instr::SIToFP { result, .. }
            | Instr::Alloca { result, .. }
            | Instr::Load { result, .. }
            | Instr::Gep { result, .. }
            | Instr::Box { result, .. }
            | Instr::Unbox { result, .. } => Some(*result),
            Instr::Call { result, .. } => *result,
            Instr::Store { .. } | Instr::StoreParam { .. } | Instr::CheckCall { .. } => None,
        }
    }

    pub fn operands(&self) -> Vec<ValueId> {
        match self {
            Instr::Const { .. } | Instr::Alloca { .. } => vec![],
            Instr::Arith { lhs, rhs, .. } => vec![*lhs, *rhs],
            Instr::SIToFP { operand, .. } | Instr::Box { operand, .. } | Instr::Unbox { operand, .. } => {
                vec![*operand]
            }
            Instr::Load { ptr, .. } => vec![*ptr],
            Instr::Store { ptr, value } => vec![*ptr, *value],
            Instr::StoreParam { ptr, .. } => vec![*ptr],
            Instr::CheckCall { args, .. } => args.clone(),
            Instr::Call { args, .. } => args.clone(),
            Instr::Gep { base, index, .. } => vec![*base, *index],
        }
    }

    /// Whether this instruction has an effect beyond producing a value
    /// (spec.md §4.7 DCE: "side-effect instructions are roots").
    pub fn has_side_effect(&self) -> bool {
        matches!(
            self,
            Instr::Store { .. } | Instr::StoreParam { .. } | Instr::CheckCall { .. } | Instr::Call { .. }
        )
    }
}

#[derive(Debug, Clone)]
pub enum Terminator {
    Ret { ty: IrType, value: Option<ValueId> },
    Br { target: String },
    CondBr { cond: ValueId, then_label: String, else_label: String },
    Unreachable,
}

#[derive(Debug, Clone)]
pub struct BasicBlock {
    pub label: String,
    pub instrs: Vec<Instr>,
    pub terminator: Terminator,
}

impl BasicBlock {
    pub fn new(label: impl Into<String>) -> Self {
        BasicBlock { label: label.into(), instrs: Vec::new(), terminator: Terminator::Unreachable }
    }
}

#[derive(Debug, Clone)]
pub struct IrParam {
    pub name: String,
    pub ty: IrType,
}

#[derive(Debug, Clone)]
pub struct IrFunction {
    pub name: String,
    pub params: Vec<IrParam>,
    pub return_ty: IrType,
    pub blocks: Vec<BasicBlock>,
    /// Declaration only (no body) — an imported or runtime-helper extern.
    pub is_declaration: bool,
    pub next_value: ValueId,
}

impl IrFunction {
    pub fn new(name: impl Into<String>, params: Vec<IrParam>, return_ty: IrType) -> Self {
        IrFunction { name: name.into(), params, return_ty, blocks: Vec::new(), is_declaration: false, next_value: 0 }
    }

    pub fn declare(name: impl Into<String>, params: Vec<IrParam>, return_ty: IrType) -> Self {
        IrFunction { name: name.into(), params, return_ty, blocks: Vec::new(), is_declaration: true, next_value: 0 }
    }

    pub fn fresh_value(&mut self) -> ValueId {
        let id = self.next_value;
        self.next_value += 1;
        id
    }

    pub fn block_mut(&mut self, label: &str) -> &mut BasicBlock {
        self.blocks.iter_mut().find(|b| b.label == label).expect("unknown block label")
    }

    pub fn instruction_count(&self) -> usize {
        self.blocks.iter().map(|b| b.instrs.len()).sum()
    }
}

#[derive(Debug, Clone)]
pub struct StructType {
    pub name: String,
    pub fields: Vec<(String, IrType)>,
}

#[derive(Debug, Clone, Default)]
pub struct IrModule {
    pub name: String,
    pub structs: Vec<StructType>,
    pub string_constants: Vec<String>,
    pub functions: Vec<IrFunction>,
}

impl IrModule {
    pub fn new(name: impl Into<String>) -> Self {
        IrModule { name: name.into(), ..Default::default() }
    }

    pub fn intern_string(&mut self, s: &str) -> u32 {
        if let Some(idx) = self.string_constants.iter().position(|existing| existing == s) {
            return idx as u32;
        }
        self.string_constants.push(s.to_string());
        (self.string_constants.len() - 1) as u32
    }

    pub fn function_mut(&mut self, name: &str) -> Option<&mut IrFunction> {
        self.functions.iter_mut().find(|f| f.name == name)
    }

    pub fn function(&self, name: &str) -> Option<&IrFunction> {
        self.functions.iter().find(|f| f.name == name)
    }

    /// Render the module as textual LLVM IR (the teacher's
    /// `std::fmt::Write`-into-a-`String` idiom).
    pub fn emit(&self) -> String {
        let mut out = String::new();
        writeln!(out, "; ModuleID = '{}'", self.name).unwrap();
        writeln!(out).unwrap();

        for (i, s) in self.string_constants.iter().enumerate() {
            let escaped = escape_c_string(s);
            writeln!(
                out,
                "@.str.{i} = private unnamed_addr constant [{} x i8] c\"{escaped}\"",
                s.len() + 1
            )
            .unwrap();
        }
        if !self.string_constants.is_empty() {
            writeln!(out).unwrap();
        }

        for st in &self.structs {
            let fields = st.fields.iter().map(|(_, ty)| ty.render()).collect::<Vec<_>>().join(", ");
            writeln!(out, "%struct.{} = type {{ {fields} }}", st.name).unwrap();
        }
        if !self.structs.is_empty() {
            writeln!(out).unwrap();
        }

        for f in &self.functions {
            emit_function(&mut out, f);
        }
        out
    }
}

fn escape_c_string(s: &str) -> String {
    let mut out = String::new();
    for b in s.as_bytes() {
        match b {
            b'"' => out.push_str("\\22"),
            b'\\' => out.push_str("\\5C"),
            0x20..=0x7e => out.push(*b as char),
            _ => out.push_str(&format!("\\{:02X}", b)),
        }
    }
    out.push_str("\\00");
    out
}

fn emit_function(out: &mut String, f: &IrFunction) {
    let params = f.params.iter().map(|p| format!("{} %{}", p.ty.render(), p.name)).collect::<Vec<_>>().join(", ");
    if f.is_declaration {
        writeln!(out, "declare {} @{}({})", f.return_ty.render(), f.name, params).unwrap();
        return;
    }
    writeln!(out, "define {} @{}({}) {{", f.return_ty.render(), f.name, params).unwrap();

    // LLVM has no instruction for materializing a bare constant — a literal
    // is always inlined at its use site. So `Const` never becomes a line of
    // its own; instead every result it defines is recorded here and every
    // later operand reference is resolved against this table first. The
    // companion type table lets `store`/`call` sites annotate operands with
    // their LLVM type without re-deriving it from the defining instruction.
    let mut consts: HashMap<ValueId, Const> = HashMap::new();
    let mut value_types: HashMap<ValueId, IrType> = HashMap::new();
    for block in &f.blocks {
        for instr in &block.instrs {
            record_value_info(instr, &mut consts, &mut value_types);
        }
    }

    for block in &f.blocks {
        writeln!(out, "{}:", block.label).unwrap();
        for instr in &block.instrs {
            emit_instr(out, instr, &consts, &value_types);
        }
        emit_terminator(out, &block.terminator, &consts);
    }
    writeln!(out, "}}").unwrap();
    writeln!(out).unwrap();
}

fn record_value_info(instr: &Instr, consts: &mut HashMap<ValueId, Const>, types: &mut HashMap<ValueId, IrType>) {
    match instr {
        Instr::Const { result, ty, value } => {
            consts.insert(*result, value.clone());
            types.insert(*result, ty.clone());
        }
        Instr::Arith { result, op, ty, .. } => {
            types.insert(*result, if op.is_comparison() { IrType::I1 } else { ty.clone() });
        }
        Instr::SIToFP { result, .. } => {
            types.insert(*result, IrType::Double);
        }
        Instr::Alloca { result, .. } | Instr::Gep { result, .. } | Instr::Box { result, .. } => {
            types.insert(*result, IrType::Ptr);
        }
        Instr::Load { result, ty, .. } | Instr::Unbox { result, ty, .. } => {
            types.insert(*result, ty.clone());
        }
        Instr::Call { result: Some(result), ty, .. } => {
            types.insert(*result, ty.clone());
        }
        Instr::Call { result: None, .. }
        | Instr::Store { .. }
        | Instr::StoreParam { .. }
        | Instr::CheckCall { .. } => {}
    }
}

/// Renders an operand: a known constant is inlined as a literal, anything
/// else is the usual `%id` reference.
fn render_operand(id: ValueId, consts: &HashMap<ValueId, Const>) -> String {
    match consts.get(&id) {
        Some(c) => render_const(c),
        None => format!("%{id}"),
    }
}

fn render_const(value: &Const) -> String {
    match value {
        Const::Int(n) => n.to_string(),
        Const::Float(f) => format!("{f:?}"),
        Const::Bool(b) => if *b { "true".to_string() } else { "false".to_string() },
        Const::StringRef(idx) => format!("@.str.{idx}"),
        Const::Null => "null".to_string(),
    }
}

fn operand_type(id: ValueId, types: &HashMap<ValueId, IrType>) -> IrType {
    types.get(&id).cloned().unwrap_or(IrType::Ptr)
}

fn emit_instr(out: &mut String, instr: &Instr, consts: &HashMap<ValueId, Const>, types: &HashMap<ValueId, IrType>) {
    match instr {
        // Inlined at every use site instead of emitted as its own line —
        // LLVM has no instruction for "produce a literal".
        Instr::Const { .. } => {}
        Instr::Arith { result, op, ty, lhs, rhs } => {
            writeln!(
                out,
                "  %{result} = {} {} {}, {}",
                op.mnemonic(),
                ty.render(),
                render_operand(*lhs, consts),
                render_operand(*rhs, consts)
            )
            .unwrap();
        }
        Instr::SIToFP { result, operand } => {
            writeln!(out, "  %{result} = sitofp i64 {} to double", render_operand(*operand, consts)).unwrap();
        }
        Instr::Alloca { result, ty, name } => {
            writeln!(out, "  %{result} = alloca {} ; {name}", ty.render()).unwrap();
        }
        Instr::Load { result, ty, ptr } => {
            writeln!(out, "  %{result} = load {}, ptr {}", ty.render(), render_operand(*ptr, consts)).unwrap();
        }
        Instr::Store { ptr, value } => {
            let value_ty = operand_type(*value, types);
            writeln!(
                out,
                "  store {} {}, ptr {}",
                value_ty.render(),
                render_operand(*value, consts),
                render_operand(*ptr, consts)
            )
            .unwrap();
        }
        Instr::StoreParam { ptr, ty, param } => {
            writeln!(out, "  store {} %{param}, ptr {}", ty.render(), render_operand(*ptr, consts)).unwrap();
        }
        Instr::CheckCall { helper, args } => {
            let args = args
                .iter()
                .map(|a| format!("{} {}", operand_type(*a, types).render(), render_operand(*a, consts)))
                .collect::<Vec<_>>()
                .join(", ");
            writeln!(out, "  call void @{helper}({args})").unwrap();
        }
        Instr::Call { result, callee, ty, args } => {
            let args = args
                .iter()
                .map(|a| format!("{} {}", operand_type(*a, types).render(), render_operand(*a, consts)))
                .collect::<Vec<_>>()
                .join(", ");
            match result {
                Some(r) => writeln!(out, "  %{r} = call {} @{callee}({args})", ty.render()).unwrap(),
                None => writeln!(out, "  call {} @{callee}({args})", ty.render()).unwrap(),
            }
        }
        Instr::Gep { result, base, index, elem_ty } => {
            writeln!(
                out,
                "  %{result} = getelementptr {}, ptr {}, i64 {}",
                elem_ty.render(),
                render_operand(*base, consts),
                render_operand(*index, consts)
            )
            .unwrap();
        }
        Instr::Box { result, ty, operand } => {
            writeln!(
                out,
                "  %{result} = call ptr @alas_box_{}({} {})",
                box_suffix(ty),
                ty.render(),
                render_operand(*operand, consts)
            )
            .unwrap();
        }
        Instr::Unbox { result, ty, operand } => {
            writeln!(
                out,
                "  %{result} = call {} @alas_unbox_{}(ptr {})",
                ty.render(),
                box_suffix(ty),
                render_operand(*operand, consts)
            )
            .unwrap();
        }
    }
}

fn box_suffix(ty: &IrType) -> &'static str {
    match ty {
        IrType::I64 => "int",
        IrType::Double => "float",
        IrType::I1 => "bool",
        _ => "ptr",
    }
}

fn emit_terminator(out: &mut String, term: &Terminator, consts: &HashMap<ValueId, Const>) {
    match term {
        Terminator::Ret { ty, value: Some(v) } => {
            writeln!(out, "  ret {} {}", ty.render(), render_operand(*v, consts)).unwrap();
        }
        Terminator::Ret { ty, value: None } => {
            writeln!(out, "  ret {}", ty.render()).unwrap();
        }
        Terminator::Br { target } => {
            writeln!(out, "  br label %{target}").unwrap();
        }
        Terminator::CondBr { cond, then_label, else_label } => {
            writeln!(out, "  br i1 {}, label %{then_label}, label %{else_label}", render_operand(*cond, consts)).unwrap();
        }
        Terminator::Unreachable => {
            writeln!(out, "  unreachable").unwrap();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emits_a_minimal_function() {
        let mut f = IrFunction::new("main", vec![], IrType::I64);
        let mut entry = BasicBlock::new("entry");
        entry.instrs.push(Instr::Const { result: 0, ty: IrType::I64, value: Const::Int(42) });
        entry.terminator = Terminator::Ret { ty: IrType::I64, value: Some(0) };
        f.blocks.push(entry);

        let mut module = IrModule::new("test");
        module.functions.push(f);
        let text = module.emit();
        assert!(text.contains("define i64 @main"));
        // The constant is inlined at its use site, not materialized as its
        // own instruction, so the return references the literal directly.
        assert!(text.contains("ret i64 42"));
    }

    #[test]
    fn string_constants_are_interned_once() {
        let mut module = IrModule::new("test");
        let a = module.intern_string("hi");
        let b = module.intern_string("hi");
        assert_eq!(a, b);
        assert_eq!(module.string_constants.len(), 1);
    }

    #[test]
    fn store_and_call_arguments_carry_a_type_annotation() {
        let mut f = IrFunction::new("f", vec![IrParam { name: "a".into(), ty: IrType::I64 }], IrType::Void);
        let mut entry = BasicBlock::new("entry");
        entry.instrs.push(Instr::Alloca { result: 0, ty: IrType::I64, name: "a_ptr".into() });
        entry.instrs.push(Instr::StoreParam { ptr: 0, ty: IrType::I64, param: "a".into() });
        entry.instrs.push(Instr::Load { result: 1, ty: IrType::I64, ptr: 0 });
        entry.instrs.push(Instr::CheckCall { helper: "check_div_zero".into(), args: vec![1] });
        entry.terminator = Terminator::Ret { ty: IrType::Void, value: None };
        f.blocks.push(entry);

        let mut module = IrModule::new("test");
        module.functions.push(f);
        let text = module.emit();
        assert!(text.contains("store i64 %a, ptr %0"));
        assert!(text.contains("call void @check_div_zero(i64 %1)"));
    }

    #[test]
    fn a_constant_used_by_two_instructions_is_inlined_at_both_sites() {
        let mut f = IrFunction::new("f", vec![], IrType::I64);
        let mut entry = BasicBlock::new("entry");
        entry.instrs.push(Instr::Const { result: 0, ty: IrType::I64, value: Const::Int(7) });
        entry.instrs.push(Instr::Arith { result: 1, op: ArithOp::Add, ty: IrType::I64, lhs: 0, rhs: 0 });
        entry.terminator = Terminator::Ret { ty: IrType::I64, value: Some(1) };
        f.blocks.push(entry);

        let mut module = IrModule::new("test");
        module.functions.push(f);
        let text = module.emit();
        assert!(text.contains("%1 = add i64 7, 7"));
        assert!(!text.contains("const.i64"));
    }
}
