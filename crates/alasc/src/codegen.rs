//! Single-module code generator (spec.md §4.5). Lowers one decoded
//! `alas_core::Module` into one `ir::IrModule`; the multi-module
//! coordinator (`coordinator.rs`) drives this per module in dependency
//! order and pre-seeds `externs` with every dependency's exported
//! functions.
//!
//! Arrays, maps, and structs all flow through the program as opaque `ptr`
//! handles into the runtime's generic container (`map_create`/`map_get`/
//! ...): the §6 runtime-helper extern list only names `map_*` helpers, so
//! this lowering treats "array" as a map keyed by stringified index plus a
//! length field, and a struct-returning map literal as a map built with its
//! declared field names as keys. This matches the interpreter, where a
//! struct literal is already just a map (spec.md §9: "a map is a map") —
//! the two paths agree on runtime representation, not just on value.

use std::collections::HashMap;

use alas_core::{BinOp, Expr, Function, Literal, Module, Stmt, TypeDefKind, TypeName, UnOp};

use crate::error::{codegen_err, CodegenError};
use crate::ir::{ArithOp, BasicBlock, Const, Instr, IrFunction, IrModule, IrParam, IrType, Terminator, ValueId};

/// An external function signature pre-seeded by the coordinator for a
/// direct dependency's exported function (spec.md §4.6 step 3).
#[derive(Debug, Clone)]
pub struct ExternFn {
    pub mangled_name: String,
    pub params: Vec<TypeName>,
    pub return_type: TypeName,
}

fn lower_type(ty: &TypeName) -> IrType {
    match ty {
        TypeName::Int => IrType::I64,
        TypeName::Float => IrType::Double,
        TypeName::Bool => IrType::I1,
        TypeName::Void => IrType::Void,
        TypeName::String | TypeName::Array | TypeName::Map | TypeName::Any | TypeName::Function | TypeName::Named(_) => {
            IrType::Ptr
        }
    }
}

const RUNTIME_HELPERS: &[(&str, &[IrType], IrType)] = &[
    ("check_div_zero", &[IrType::I64, IrType::Ptr, IrType::I32], IrType::Void),
    ("check_bounds", &[IrType::I64, IrType::I64, IrType::Ptr, IrType::I32], IrType::Void),
    ("check_null", &[IrType::Ptr, IrType::Ptr, IrType::I32], IrType::Void),
    ("panic", &[IrType::Ptr], IrType::Void),
    ("assert", &[IrType::I1, IrType::Ptr, IrType::Ptr, IrType::I32], IrType::Void),
    ("retain", &[IrType::I64], IrType::Void),
    ("release", &[IrType::I64], IrType::Void),
    ("map_create", &[IrType::Ptr, IrType::I64], IrType::Ptr),
    ("map_get", &[IrType::Ptr, IrType::Ptr], IrType::Ptr),
    ("map_put", &[IrType::Ptr, IrType::Ptr, IrType::Ptr], IrType::Void),
    ("map_size", &[IrType::Ptr], IrType::I64),
    ("map_contains", &[IrType::Ptr, IrType::Ptr], IrType::I1),
    ("map_remove", &[IrType::Ptr, IrType::Ptr], IrType::Void),
    ("map_keys", &[IrType::Ptr], IrType::Ptr),
    ("map_values", &[IrType::Ptr], IrType::Ptr),
    ("map_get_field", &[IrType::Ptr, IrType::Ptr], IrType::Ptr),
];

pub struct CodeGen<'a> {
    module: &'a Module,
    externs: &'a [ExternFn],
    out: IrModule,
    /// `name -> (alloca result id, value type)`, populated lazily on first
    /// assignment per spec.md §4.5 ("lazily allocate a stack slot named
    /// `<target>_ptr` on first assignment").
    slots: HashMap<String, (ValueId, IrType)>,
    block_counter: usize,
}

impl<'a> CodeGen<'a> {
    pub fn new(module: &'a Module, externs: &'a [ExternFn]) -> Self {
        CodeGen { module, externs, out: IrModule::new(module.name.clone()), slots: HashMap::new(), block_counter: 0 }
    }

    pub fn lower(mut self) -> Result<IrModule, CodegenError> {
        self.declare_types();
        self.declare_runtime_helpers();
        self.declare_externs();
        for function in &self.module.functions {
            let lowered = self.lower_function(function)?;
            self.out.functions.push(lowered);
        }
        Ok(self.out)
    }

    fn declare_types(&mut self) {
        for t in &self.module.types {
            if let TypeDefKind::Struct { fields } = &t.kind {
                self.out.structs.push(crate::ir::StructType {
                    name: t.name.clone(),
                    fields: fields.iter().map(|(n, ty)| (n.clone(), lower_type(ty))).collect(),
                });
            }
        }
    }

    fn declare_runtime_helpers(&mut self) {
        for (name, params, ret) in RUNTIME_HELPERS {
            let ir_params = params.iter().map(|ty| IrParam { name: "a".to_string(), ty: ty.clone() }).collect();
            self.out.functions.push(IrFunction::declare(*name, ir_params, ret.clone()));
        }
    }

    fn declare_externs(&mut self) {
        for ext in self.externs {
            let params = ext.params.iter().map(|ty| IrParam { name: "a".to_string(), ty: lower_type(ty) }).collect();
            self.out.functions.push(IrFunction::declare(ext.mangled_name.clone(), params, lower_type(&ext.return_type)));
        }
    }

    /// Declares a builtin the first time it's called, with the arity of
    /// that call site: one opaque-pointer argument per IL argument,
    /// opaque-pointer return (spec.md §6).
    fn ensure_builtin_declared(&mut self, name: &str, arity: usize) -> String {
        let mangled = format!("builtin.{}", name.replace('.', "_"));
        if self.out.function(&mangled).is_none() {
            let params = (0..arity).map(|_| IrParam { name: "a".to_string(), ty: IrType::Ptr }).collect();
            self.out.functions.push(IrFunction::declare(mangled.clone(), params, IrType::Ptr));
        }
        mangled
    }

    fn fresh_block(&mut self, prefix: &str) -> String {
        let id = self.block_counter;
        self.block_counter += 1;
        format!("{prefix}.{id}")
    }

    fn lower_function(&mut self, func: &Function) -> Result<IrFunction, CodegenError> {
        self.slots.clear();
        let mut irf = IrFunction::new(
            func.name.clone(),
            func.params.iter().map(|p| IrParam { name: p.name.clone(), ty: lower_type(&p.ty) }).collect(),
            lower_type(&func.return_type),
        );
        irf.blocks.push(BasicBlock::new("entry"));

        for p in &func.params {
            let pty = lower_type(&p.ty);
            let slot = irf.fresh_value();
            irf.block_mut("entry").instrs.push(Instr::Alloca { result: slot, ty: pty.clone(), name: format!("{}_ptr", p.name) });
            // The incoming parameter arrives as the function's named SSA
            // value (`%{name}` in the signature); spill it into its slot so
            // every later read goes through the same Load path as a local.
            irf.block_mut("entry").instrs.push(Instr::StoreParam { ptr: slot, ty: pty.clone(), param: p.name.clone() });
            self.slots.insert(p.name.clone(), (slot, pty));
        }

        let mut current = "entry".to_string();
        let ret_ty = lower_type(&func.return_type);
        let terminated = self.lower_block(&mut irf, &mut current, &func.body, &ret_ty)?;
        if !terminated {
            let last = irf.blocks.iter().find(|b| b.label == current).map(|b| matches!(b.terminator, Terminator::Unreachable));
            if last == Some(true) {
                if matches!(ret_ty, IrType::Void) {
                    irf.block_mut(&current).terminator = Terminator::Ret { ty: IrType::Void, value: None };
                } else {
                    // Non-void function falling off the end without an
                    // explicit return: this is a validator-enforced
                    // invariant violation if it happens, but emit a
                    // trapping terminator rather than invalid IR.
                    irf.block_mut(&current).terminator = Terminator::Unreachable;
                }
            }
        }
        Ok(irf)
    }

    /// Lowers a statement list into `current`'s block (which may change as
    /// control-flow constructs open new blocks). Returns `true` if control
    /// flow is guaranteed to have left via a terminator already (a
    /// `return` fired on every path), mirroring spec.md §4.5's
    /// "branches whose bodies end in return do not emit a branch to end".
    fn lower_block(
        &mut self,
        irf: &mut IrFunction,
        current: &mut String,
        stmts: &[Stmt],
        ret_ty: &IrType,
    ) -> Result<bool, CodegenError> {
        for stmt in stmts {
            match stmt {
                Stmt::Assign { target, value } => {
                    let (val, ty) = self.lower_expr(irf, current, value)?;
                    let slot = match self.slots.get(target) {
                        Some((slot, _)) => *slot,
                        None => {
                            let slot = irf.fresh_value();
                            irf.block_mut(current).instrs.push(Instr::Alloca {
                                result: slot,
                                ty: ty.clone(),
                                name: format!("{target}_ptr"),
                            });
                            self.slots.insert(target.clone(), (slot, ty.clone()));
                            slot
                        }
                    };
                    irf.block_mut(current).instrs.push(Instr::Store { ptr: slot, value: val });
                }
                Stmt::Return { value } => {
                    let term = match value {
                        Some(e) => {
                            let (v, ty) = self.lower_expr(irf, current, e)?;
                            Terminator::Ret { ty, value: Some(v) }
                        }
                        None => Terminator::Ret { ty: IrType::Void, value: None },
                    };
                    irf.block_mut(current).terminator = term;
                    return Ok(true);
                }
                Stmt::If { cond, then_branch, else_branch } => {
                    let (c, _) = self.lower_expr(irf, current, cond)?;
                    let then_label = self.fresh_block("if.then");
                    let else_label = self.fresh_block("if.else");
                    let end_label = self.fresh_block("if.end");
                    irf.block_mut(current).terminator = Terminator::CondBr {
                        cond: c,
                        then_label: then_label.clone(),
                        else_label: else_label.clone(),
                    };

                    irf.blocks.push(BasicBlock::new(then_label.clone()));
                    let mut then_cur = then_label;
                    let then_terminated = self.lower_block(irf, &mut then_cur, then_branch, ret_ty)?;
                    if !then_terminated {
                        irf.block_mut(&then_cur).terminator = Terminator::Br { target: end_label.clone() };
                    }

                    irf.blocks.push(BasicBlock::new(else_label.clone()));
                    let mut else_cur = else_label;
                    let else_terminated = self.lower_block(irf, &mut else_cur, else_branch, ret_ty)?;
                    if !else_terminated {
                        irf.block_mut(&else_cur).terminator = Terminator::Br { target: end_label.clone() };
                    }

                    if then_terminated && else_terminated {
                        irf.blocks.push(BasicBlock::new(end_label.clone()));
                        irf.block_mut(&end_label).terminator = Terminator::Unreachable;
                        *current = end_label;
                        return Ok(true);
                    }
                    irf.blocks.push(BasicBlock::new(end_label.clone()));
                    *current = end_label;
                }
                Stmt::While { cond, body } | Stmt::For { cond, body } => {
                    let cond_label = self.fresh_block("loop.cond");
                    let body_label = self.fresh_block("loop.body");
                    let end_label = self.fresh_block("loop.end");

                    irf.block_mut(current).terminator = Terminator::Br { target: cond_label.clone() };

                    irf.blocks.push(BasicBlock::new(cond_label.clone()));
                    let mut cond_cur = cond_label.clone();
                    let (c, _) = self.lower_expr(irf, &mut cond_cur, cond)?;
                    irf.block_mut(&cond_cur).terminator = Terminator::CondBr {
                        cond: c,
                        then_label: body_label.clone(),
                        else_label: end_label.clone(),
                    };

                    irf.blocks.push(BasicBlock::new(body_label.clone()));
                    let mut body_cur = body_label;
                    let body_terminated = self.lower_block(irf, &mut body_cur, body, ret_ty)?;
                    if !body_terminated {
                        irf.block_mut(&body_cur).terminator = Terminator::Br { target: cond_label };
                    }

                    irf.blocks.push(BasicBlock::new(end_label.clone()));
                    *current = end_label;
                }
                Stmt::Expr { value } => {
                    self.lower_expr(irf, current, value)?;
                }
            }
        }
        Ok(false)
    }

    fn lower_expr(&mut self, irf: &mut IrFunction, current: &mut String, expr: &Expr) -> Result<(ValueId, IrType), CodegenError> {
        match expr {
            Expr::Literal(Literal::Int(n)) => Ok(self.const_val(irf, current, IrType::I64, Const::Int(*n))),
            Expr::Literal(Literal::Float(f)) => Ok(self.const_val(irf, current, IrType::Double, Const::Float(*f))),
            Expr::Literal(Literal::Bool(b)) => Ok(self.const_val(irf, current, IrType::I1, Const::Bool(*b))),
            Expr::StringLiteral(s) => {
                let idx = self.out.intern_string(s);
                Ok(self.const_val(irf, current, IrType::Ptr, Const::StringRef(idx)))
            }
            Expr::Variable(name) => {
                let (slot, ty) = self.slots.get(name).cloned().ok_or_else(|| codegen_err(format!("undefined variable \"{name}\"")))?;
                let result = irf.fresh_value();
                irf.block_mut(current).instrs.push(Instr::Load { result, ty: ty.clone(), ptr: slot });
                Ok((result, ty))
            }
            Expr::Unary { op, operand } => self.lower_unary(irf, current, *op, operand),
            Expr::Binary { op, left, right } => self.lower_binary(irf, current, *op, left, right),
            Expr::Call { name, args } => {
                let func = self
                    .module
                    .function(name)
                    .ok_or_else(|| codegen_err(format!("call to undefined function \"{name}\"")))?;
                let ret_ty = lower_type(&func.return_type);
                let argv = self.lower_args(irf, current, args)?;
                let result = irf.fresh_value();
                let has_result = !matches!(ret_ty, IrType::Void);
                irf.block_mut(current).instrs.push(Instr::Call {
                    result: has_result.then_some(result),
                    callee: name.clone(),
                    ty: ret_ty.clone(),
                    args: argv,
                });
                Ok((result, ret_ty))
            }
            Expr::ModuleCall { module, name, args } => {
                let mangled = format!("{module}__{name}");
                let ext = self
                    .externs
                    .iter()
                    .find(|e| e.mangled_name == mangled)
                    .ok_or_else(|| codegen_err(format!("no external declaration for \"{mangled}\"")))?;
                let ret_ty = lower_type(&ext.return_type);
                let argv = self.lower_args(irf, current, args)?;
                let result = irf.fresh_value();
                let has_result = !matches!(ret_ty, IrType::Void);
                irf.block_mut(current).instrs.push(Instr::Call {
                    result: has_result.then_some(result),
                    callee: mangled,
                    ty: ret_ty.clone(),
                    args: argv,
                });
                Ok((result, ret_ty))
            }
            Expr::Builtin { name, args } => {
                let boxed_args = self.lower_args_boxed(irf, current, args)?;
                let callee = self.ensure_builtin_declared(name, boxed_args.len());
                let result = irf.fresh_value();
                irf.block_mut(current).instrs.push(Instr::Call {
                    result: Some(result),
                    callee,
                    ty: IrType::Ptr,
                    args: boxed_args,
                });
                Ok((result, IrType::Ptr))
            }
            Expr::ArrayLiteral { elements } => {
                // Arrays are a map keyed by stringified index plus a
                // "__len" field, so they reuse the map runtime already
                // declared for `map_literal` (module doc above).
                let mut entries = Vec::with_capacity(elements.len() + 1);
                for (i, e) in elements.iter().enumerate() {
                    let (v, ty) = self.lower_expr(irf, current, e)?;
                    let boxed = self.box_value(irf, current, v, &ty);
                    entries.push((i.to_string(), boxed));
                }
                let len = self.const_val(irf, current, IrType::I64, Const::Int(elements.len() as i64));
                entries.push(("__len".to_string(), len.0));
                let handle = self.build_map(irf, current, &entries);
                Ok((handle, IrType::Ptr))
            }
            Expr::MapLiteral { pairs } => {
                let mut entries = Vec::with_capacity(pairs.len());
                for (k, v) in pairs {
                    let key = match k {
                        Expr::StringLiteral(s) => s.clone(),
                        _ => return Err(codegen_err("map literal keys must be string literals")),
                    };
                    let (val, ty) = self.lower_expr(irf, current, v)?;
                    let boxed = self.box_value(irf, current, val, &ty);
                    entries.push((key, boxed));
                }
                let handle = self.build_map(irf, current, &entries);
                Ok((handle, IrType::Ptr))
            }
            Expr::Index { object, index } => {
                let (obj, _) = self.lower_expr(irf, current, object)?;
                let (idx, idx_ty) = self.lower_expr(irf, current, index)?;
                if matches!(idx_ty, IrType::I64) {
                    let len = irf.fresh_value();
                    irf.block_mut(current).instrs.push(Instr::Call { result: Some(len), callee: "map_size".into(), ty: IrType::I64, args: vec![obj] });
                    irf.block_mut(current).instrs.push(Instr::CheckCall { helper: "check_bounds".into(), args: vec![idx, len] });
                }
                let key_ptr = self.box_value(irf, current, idx, &idx_ty);
                let result = irf.fresh_value();
                irf.block_mut(current).instrs.push(Instr::Call { result: Some(result), callee: "map_get".into(), ty: IrType::Ptr, args: vec![obj, key_ptr] });
                Ok((result, IrType::Ptr))
            }
            Expr::Field { object, field } => {
                let (obj, _) = self.lower_expr(irf, current, object)?;
                let idx = self.out.intern_string(field);
                let (key, _) = self.const_val(irf, current, IrType::Ptr, Const::StringRef(idx));
                let result = irf.fresh_value();
                irf.block_mut(current).instrs.push(Instr::Call { result: Some(result), callee: "map_get_field".into(), ty: IrType::Ptr, args: vec![obj, key] });
                Ok((result, IrType::Ptr))
            }
        }
    }

    fn build_map(&mut self, irf: &mut IrFunction, current: &mut String, entries: &[(String, ValueId)]) -> ValueId {
        // Pairs are laid out as a flat [key0, value0, key1, value1, ...]
        // array the runtime reads back by base pointer + pair count
        // (spec.md §4.5's runtime-helper convention).
        let pairs_ptr = irf.fresh_value();
        irf.block_mut(current).instrs.push(Instr::Alloca { result: pairs_ptr, ty: IrType::Ptr, name: "pairs".to_string() });
        for (i, (k, v)) in entries.iter().enumerate() {
            let idx = self.out.intern_string(k);
            let (key_val, _) = self.const_val(irf, current, IrType::Ptr, Const::StringRef(idx));
            let (key_pos, _) = self.const_val(irf, current, IrType::I64, Const::Int((i * 2) as i64));
            let key_slot = irf.fresh_value();
            irf.block_mut(current).instrs.push(Instr::Gep { result: key_slot, base: pairs_ptr, index: key_pos, elem_ty: IrType::Ptr });
            irf.block_mut(current).instrs.push(Instr::Store { ptr: key_slot, value: key_val });

            let (val_pos, _) = self.const_val(irf, current, IrType::I64, Const::Int((i * 2 + 1) as i64));
            let val_slot = irf.fresh_value();
            irf.block_mut(current).instrs.push(Instr::Gep { result: val_slot, base: pairs_ptr, index: val_pos, elem_ty: IrType::Ptr });
            irf.block_mut(current).instrs.push(Instr::Store { ptr: val_slot, value: *v });
        }
        let (count, _) = self.const_val(irf, current, IrType::I64, Const::Int(entries.len() as i64));
        let handle = irf.fresh_value();
        irf.block_mut(current).instrs.push(Instr::Call { result: Some(handle), callee: "map_create".into(), ty: IrType::Ptr, args: vec![pairs_ptr, count] });
        handle
    }

    fn lower_args(&mut self, irf: &mut IrFunction, current: &mut String, args: &[Expr]) -> Result<Vec<ValueId>, CodegenError> {
        args.iter().map(|a| Ok(self.lower_expr(irf, current, a)?.0)).collect()
    }

    fn lower_args_boxed(&mut self, irf: &mut IrFunction, current: &mut String, args: &[Expr]) -> Result<Vec<ValueId>, CodegenError> {
        let mut out = Vec::with_capacity(args.len());
        for a in args {
            let (v, ty) = self.lower_expr(irf, current, a)?;
            out.push(self.box_value(irf, current, v, &ty));
        }
        Ok(out)
    }

    fn box_value(&mut self, irf: &mut IrFunction, current: &mut String, v: ValueId, ty: &IrType) -> ValueId {
        if matches!(ty, IrType::Ptr) {
            return v; // already an opaque handle/pointer, nothing to box
        }
        let result = irf.fresh_value();
        irf.block_mut(current).instrs.push(Instr::Box { result, ty: ty.clone(), operand: v });
        result
    }

    fn const_val(&mut self, irf: &mut IrFunction, current: &mut String, ty: IrType, value: Const) -> (ValueId, IrType) {
        let result = irf.fresh_value();
        irf.block_mut(current).instrs.push(Instr::Const { result, ty: ty.clone(), value });
        (result, ty)
    }

    fn lower_unary(&mut self, irf: &mut IrFunction, current: &mut String, op: UnOp, operand: &Expr) -> Result<(ValueId, IrType), CodegenError> {
        let (v, ty) = self.lower_expr(irf, current, operand)?;
        match (op, &ty) {
            (UnOp::Not, IrType::I1) => {
                let (one, _) = self.const_val(irf, current, IrType::I1, Const::Bool(true));
                let result = irf.fresh_value();
                irf.block_mut(current).instrs.push(Instr::Arith { result, op: ArithOp::Xor, ty: IrType::I1, lhs: v, rhs: one });
                Ok((result, IrType::I1))
            }
            (UnOp::Neg, IrType::I64) => {
                let (zero, _) = self.const_val(irf, current, IrType::I64, Const::Int(0));
                let result = irf.fresh_value();
                irf.block_mut(current).instrs.push(Instr::Arith { result, op: ArithOp::Sub, ty: IrType::I64, lhs: zero, rhs: v });
                Ok((result, IrType::I64))
            }
            (UnOp::Neg, IrType::Double) => {
                let (zero, _) = self.const_val(irf, current, IrType::Double, Const::Float(0.0));
                let result = irf.fresh_value();
                irf.block_mut(current).instrs.push(Instr::Arith { result, op: ArithOp::FSub, ty: IrType::Double, lhs: zero, rhs: v });
                Ok((result, IrType::Double))
            }
            _ => Err(codegen_err(format!("unary op {op:?} not defined for {}", ty.render()))),
        }
    }

    fn lower_binary(&mut self, irf: &mut IrFunction, current: &mut String, op: BinOp, left: &Expr, right: &Expr) -> Result<(ValueId, IrType), CodegenError> {
        let (l, lty) = self.lower_expr(irf, current, left)?;
        let (r, rty) = self.lower_expr(irf, current, right)?;

        if op.is_logical() {
            if lty != IrType::I1 || rty != IrType::I1 {
                return Err(codegen_err("&&/|| require boolean operands"));
            }
            let arith = if op == BinOp::And { ArithOp::And } else { ArithOp::Or };
            let result = irf.fresh_value();
            irf.block_mut(current).instrs.push(Instr::Arith { result, op: arith, ty: IrType::I1, lhs: l, rhs: r });
            return Ok((result, IrType::I1));
        }

        // Numeric promotion: if either operand is float, sign-extend the
        // int operand to double (spec.md §4.5).
        let float_mode = lty == IrType::Double || rty == IrType::Double;
        let (l, r) = if float_mode {
            (self.promote_to_float(irf, current, l, &lty), self.promote_to_float(irf, current, r, &rty))
        } else {
            (l, r)
        };
        let num_ty = if float_mode { IrType::Double } else { IrType::I64 };

        if matches!(op, BinOp::Div | BinOp::Mod) && !float_mode {
            irf.block_mut(current).instrs.push(Instr::CheckCall { helper: "check_div_zero".into(), args: vec![r] });
        }

        let arith = arith_op(op, float_mode);
        let result_ty = if op.is_comparison() { IrType::I1 } else { num_ty.clone() };
        let result = irf.fresh_value();
        irf.block_mut(current).instrs.push(Instr::Arith { result, op: arith, ty: num_ty, lhs: l, rhs: r });
        Ok((result, result_ty))
    }

    fn promote_to_float(&mut self, irf: &mut IrFunction, current: &mut String, v: ValueId, ty: &IrType) -> ValueId {
        if matches!(ty, IrType::Double) {
            return v;
        }
        let result = irf.fresh_value();
        irf.block_mut(current).instrs.push(Instr::SIToFP { result, operand: v });
        result
    }
}

fn arith_op(op: BinOp, float_mode: bool) -> ArithOp {
    match (op, float_mode) {
        (BinOp::Add, false) => ArithOp::Add,
        (BinOp::Add, true) => ArithOp::FAdd,
        (BinOp::Sub, false) => ArithOp::Sub,
        (BinOp::Sub, true) => ArithOp::FSub,
        (BinOp::Mul, false) => ArithOp::Mul,
        (BinOp::Mul, true) => ArithOp::FMul,
        (BinOp::Div, false) => ArithOp::Div,
        (BinOp::Div, true) => ArithOp::FDiv,
        (BinOp::Mod, false) => ArithOp::Rem,
        (BinOp::Mod, true) => ArithOp::FRem,
        (BinOp::Eq, false) => ArithOp::ICmpEq,
        (BinOp::Eq, true) => ArithOp::FCmpOeq,
        (BinOp::Ne, false) => ArithOp::ICmpNe,
        (BinOp::Ne, true) => ArithOp::FCmpOne,
        (BinOp::Lt, false) => ArithOp::ICmpSlt,
        (BinOp::Lt, true) => ArithOp::FCmpOlt,
        (BinOp::Le, false) => ArithOp::ICmpSle,
        (BinOp::Le, true) => ArithOp::FCmpOle,
        (BinOp::Gt, false) => ArithOp::ICmpSgt,
        (BinOp::Gt, true) => ArithOp::FCmpOgt,
        (BinOp::Ge, false) => ArithOp::ICmpSge,
        (BinOp::Ge, true) => ArithOp::FCmpOge,
        (BinOp::And, _) | (BinOp::Or, _) => unreachable!("logical ops handled separately"),
    }
}

/// Lowers one module with no external dependencies pre-seeded (the
/// single-module entry point; the coordinator calls `CodeGen` directly
/// when externs are needed).
pub fn lower_module(module: &Module, externs: &[ExternFn]) -> Result<IrModule, CodegenError> {
    CodeGen::new(module, externs).lower()
}

#[cfg(test)]
mod tests {
    use super::*;
    use alas_core::{Function, Param, TypeName};

    fn sample_module() -> Module {
        let fact = Function {
            name: "fact".into(),
            params: vec![Param { name: "n".into(), ty: TypeName::Int }],
            return_type: TypeName::Int,
            body: vec![
                Stmt::If {
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
                },
            ],
        };
        Module { name: "m".into(), imports: vec![], exports: vec!["fact".into()], functions: vec![fact], types: vec![] }
    }

    #[test]
    fn lowers_factorial_with_both_branches_terminated() {
        let module = sample_module();
        let ir = lower_module(&module, &[]).unwrap();
        let f = ir.function("fact").unwrap();
        assert!(f.blocks.len() >= 3);
        let text = ir.emit();
        assert!(text.contains("define i64 @fact"));
        assert!(text.contains("check_div_zero") == false); // no division in this function
    }

    #[test]
    fn division_emits_a_check_div_zero_call() {
        let div = Function {
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
        let module = Module { name: "m".into(), imports: vec![], exports: vec![], functions: vec![div], types: vec![] };
        let ir = lower_module(&module, &[]).unwrap();
        let text = ir.emit();
        assert!(text.contains("check_div_zero"));
    }

    #[test]
    fn cross_module_call_references_mangled_name() {
        let a = Function {
            name: "main".into(),
            params: vec![],
            return_type: TypeName::Int,
            body: vec![Stmt::Return {
                value: Some(Expr::ModuleCall { module: "B".into(), name: "add".into(), args: vec![Expr::Literal(Literal::Int(2)), Expr::Literal(Literal::Int(3))] }),
            }],
        };
        let module = Module { name: "A".into(), imports: vec!["B".into()], exports: vec![], functions: vec![a], types: vec![] };
        let externs = vec![ExternFn { mangled_name: "B__add".into(), params: vec![TypeName::Int, TypeName::Int], return_type: TypeName::Int }];
        let ir = lower_module(&module, &externs).unwrap();
        let text = ir.emit();
        assert!(text.contains("B__add"));
    }
}
