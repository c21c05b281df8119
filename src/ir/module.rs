//! The IR module and its builder API.
//!
//! [`Module`] owns the value graph, the lists of global variables and
//! functions, and the builder state (current insert point, the lazy global
//! constructor, the diagnostic logger stack). Every `create_*` operation
//! constructs well-typed SSA: implicit casts are inserted where a value is
//! acceptable but not identical to the required type, predecessor lists are
//! maintained whenever a terminator is built, and precondition violations
//! abort — malformed IR is never produced.
//!
//! Module-level initializers that are not compile-time constants are
//! lowered into the synthetic `_$ctor` function (see
//! [`Module::enter_global_ctor`]); sealing it closes its CFG and is
//! idempotent.

use std::rc::Rc;

use crate::common::diag::Logger;
use crate::common::types::{make_func, make_int32, make_pointer, make_void, Type};

use super::value::{
    AccessKind, BinaryOp, FuncData, GlobalData, InstKind, Linkage, UnaryOp, Value, ValueGraph,
    ValueKind, BlockData,
};

/// The compilation unit: value storage plus builder state.
pub struct Module {
    pub graph: ValueGraph,
    vars: Vec<Value>,
    funcs: Vec<Value>,
    insert_point: Option<Value>,
    global_ctor: Option<Value>,
    ctor_entry: Option<Value>,
    ctor_exit: Option<Value>,
    is_ctor_sealed: bool,
    loggers: Vec<Rc<Logger>>,
}

impl Default for Module {
    fn default() -> Self {
        Self::new()
    }
}

impl Module {
    pub fn new() -> Self {
        Module {
            graph: ValueGraph::new(),
            vars: Vec::new(),
            funcs: Vec::new(),
            insert_point: None,
            global_ctor: None,
            ctor_entry: None,
            ctor_exit: None,
            is_ctor_sealed: false,
            loggers: Vec::new(),
        }
    }

    /// Global variables in insertion order.
    pub fn vars(&self) -> &[Value] {
        &self.vars
    }

    /// Functions in insertion order.
    pub fn funcs(&self) -> &[Value] {
        &self.funcs
    }

    pub fn insert_point(&self) -> Option<Value> {
        self.insert_point
    }

    /// Move the builder to the end of `block`.
    pub fn set_insert_point(&mut self, block: Value) {
        debug_assert!(matches!(self.graph.value(block).kind, ValueKind::Block(_)));
        self.insert_point = Some(block);
    }

    /// Total instruction count over all functions. Used to bound the pass
    /// manager's fixed point.
    pub fn inst_count(&self) -> usize {
        self.funcs
            .iter()
            .flat_map(|&f| self.graph.operands(f))
            .map(|b| self.graph.block_data(b).insts.len())
            .sum()
    }

    /// Create an instruction of `kind` and append it at the insert point.
    fn add_inst(&mut self, kind: InstKind) -> Value {
        let block = self.insert_point.expect("builder has no insert point");
        let inst = self.graph.new_value(ValueKind::Inst(kind));
        self.graph.block_data_mut(block).insts.push(inst);
        inst
    }

    // ── Functions, blocks, arguments ─────────────────────────────────────

    pub fn create_function(&mut self, link: Linkage, name: &str, ty: Type) -> Value {
        assert!(ty.is_function(), "function created with non-function type");
        let func = self.graph.new_value(ValueKind::Function(FuncData {
            link,
            name: name.to_string(),
            args: Vec::new(),
        }));
        self.graph.set_types(func, Some(ty));
        self.funcs.push(func);
        func
    }

    /// Append a block to `parent`. Does not move the insert point.
    pub fn create_block(&mut self, parent: Value, name: Option<&str>) -> Value {
        assert!(
            self.graph.ty(parent).is_some_and(Type::is_function),
            "block parent must be a function"
        );
        let block = self.graph.new_value(ValueKind::Block(BlockData {
            name: name.map(str::to_string),
            parent,
            insts: Vec::new(),
        }));
        self.graph.add_operand(parent, block);
        block
    }

    pub fn create_arg_ref(&mut self, func: Value, index: usize) -> Value {
        let arg_ty = {
            let args = self.graph.ty(func).and_then(Type::args).map(<[Type]>::to_vec);
            let args = args.expect("argument reference into a non-function");
            assert!(index < args.len(), "argument index {} out of range", index);
            args[index].clone()
        };
        let arg = self.graph.new_value(ValueKind::ArgRef(index));
        self.graph.add_operand(arg, func);
        self.graph.set_types(arg, Some(arg_ty));
        self.graph.func_data_mut(func).args.push(arg);
        arg
    }

    // ── Memory ───────────────────────────────────────────────────────────

    pub fn create_alloca(&mut self, ty: Type) -> Value {
        assert!(!ty.is_void(), "cannot allocate void");
        let alloca = self.add_inst(InstKind::Alloca);
        self.graph.set_types(alloca, Some(make_pointer(ty, true)));
        alloca
    }

    /// Load through `ptr`. With `is_ref`, loads once more to read through a
    /// reference-typed value materialized as pointer-to-pointer.
    pub fn create_load(&mut self, ptr: Value, is_ref: bool) -> Value {
        assert!(self.graph.ty(ptr).is_some_and(Type::is_pointer), "load from non-pointer");
        let load = self.add_inst(InstKind::Load);
        self.graph.add_operand(load, ptr);
        let ty = self.graph.ty(ptr).and_then(Type::deref).expect("load from non-pointer");
        self.graph.set_type(load, ty);
        if let Some(org) = self.graph.org_ty(ptr).and_then(Type::deref) {
            self.graph.set_org_type(load, org);
        }
        if is_ref {
            self.create_load(load, false)
        } else {
            load
        }
    }

    /// Store `value` through `pointer`, re-addressing the pointer while its
    /// pointee cannot accept the value (reference-typed locals) and casting
    /// the value when acceptable but not identical.
    pub fn create_store(&mut self, value: Value, pointer: Value) -> Value {
        let mut ptr = pointer;
        let val_ty = self.graph.ty(value).cloned().expect("store of a non-value");
        loop {
            let pointee = self.graph.ty(ptr).and_then(Type::deref);
            match pointee {
                Some(p) if p.can_accept(&val_ty) => break,
                _ => {
                    ptr = self
                        .graph
                        .get_addr(ptr)
                        .expect("store target accepts no value and has no address");
                }
            }
        }
        let target_ty = self.graph.ty(ptr).and_then(Type::deref).expect("pointer lost its pointee");
        let val = if val_ty.is_identical(&target_ty) {
            value
        } else {
            self.create_cast(value, &target_ty)
        };
        let store = self.add_inst(InstKind::Store);
        self.graph.add_operand(store, val);
        self.graph.add_operand(store, ptr);
        store
    }

    /// Initialize `pointer` with `value`; a reference initializer stores the
    /// value's address instead.
    pub fn create_init(&mut self, value: Value, pointer: Value, is_ref: bool) -> Value {
        let val = if is_ref {
            self.graph.get_addr(value).expect("reference initializer has no address")
        } else {
            value
        };
        self.create_store(val, pointer)
    }

    // ── Control flow ─────────────────────────────────────────────────────

    /// Unconditional jump; registers the current block as a predecessor of
    /// `target`.
    pub fn create_jump(&mut self, target: Value) -> Value {
        let current = self.insert_point.expect("builder has no insert point");
        let jump = self.add_inst(InstKind::Jump);
        self.graph.add_operand(jump, target);
        self.graph.add_operand(target, current);
        jump
    }

    /// Conditional branch; registers the current block as a predecessor of
    /// both targets.
    pub fn create_branch(&mut self, cond: Value, true_block: Value, false_block: Value) -> Value {
        assert!(self.graph.ty(cond).is_some_and(Type::is_integer), "branch on non-integer");
        let current = self.insert_point.expect("builder has no insert point");
        let branch = self.add_inst(InstKind::Branch);
        self.graph.add_operand(branch, cond);
        self.graph.add_operand(branch, true_block);
        self.graph.add_operand(branch, false_block);
        self.graph.add_operand(true_block, current);
        self.graph.add_operand(false_block, current);
        branch
    }

    /// Return from the enclosing function. The value must match the
    /// function's declared return type (void ⇔ no value).
    pub fn create_return(&mut self, value: Option<Value>) -> Value {
        let block = self.insert_point.expect("builder has no insert point");
        let func = self.graph.block_data(block).parent;
        let ret_ty = self
            .graph
            .org_ty(func)
            .and_then(Type::ret)
            .expect("return outside of a function");
        match value {
            None => assert!(ret_ty.is_void(), "missing return value in non-void function"),
            Some(v) => {
                let val_ty = self.graph.ty(v).expect("returning a non-value");
                assert!(
                    ret_ty.trivial().is_identical(val_ty),
                    "return value type does not match function signature"
                );
            }
        }
        let ret = self.add_inst(InstKind::Return);
        if let Some(v) = value {
            self.graph.add_operand(ret, v);
        }
        ret
    }

    /// Call `callee`; each argument is coerced to the trivialized parameter
    /// type with an implicit cast.
    pub fn create_call(&mut self, callee: Value, args: &[Value]) -> Value {
        assert!(self.graph.ty(callee).is_some_and(Type::is_function), "call of a non-function");
        let fn_ty = self.graph.org_ty(callee).cloned().expect("callee has no type");
        let params = fn_ty.args().expect("callee has no parameter list").to_vec();
        assert_eq!(params.len(), args.len(), "argument count mismatch in call");
        let mut casted = Vec::with_capacity(args.len());
        for (param, &arg) in params.iter().zip(args) {
            let param_ty = param.trivial();
            let arg_ty = self.graph.ty(arg).expect("passing a non-value argument");
            if arg_ty.is_identical(&param_ty) {
                casted.push(arg);
            } else {
                casted.push(self.create_cast(arg, &param_ty));
            }
        }
        let call = self.add_inst(InstKind::Call);
        self.graph.add_operand(call, callee);
        for arg in casted {
            self.graph.add_operand(call, arg);
        }
        self.graph.set_types(call, fn_ty.ret());
        call
    }

    // ── Accesses ─────────────────────────────────────────────────────────

    /// `ptr + index * sizeof(pointee)`; keeps the pointer type.
    pub fn create_ptr_access(&mut self, ptr: Value, index: Value) -> Value {
        assert!(
            self.graph.ty(ptr).is_some_and(Type::is_pointer)
                && self.graph.ty(index).is_some_and(Type::is_integer),
            "pointer access requires a pointer and an integer index"
        );
        let access = self.add_inst(InstKind::Access(AccessKind::Pointer));
        self.graph.add_operand(access, ptr);
        self.graph.add_operand(access, index);
        let ty = self.graph.ty(ptr).cloned().expect("pointer lost its type");
        self.graph.set_type(access, ty);
        if let Some(org) = self.graph.org_ty(ptr).cloned() {
            self.graph.set_org_type(access, org);
        }
        access
    }

    /// Address of element `index` of the aggregate behind `ptr`. A
    /// non-pointer aggregate is addressed first.
    pub fn create_elem_access(&mut self, ptr: Value, index: Value, elem_ty: Type) -> Value {
        let pointer = if self.graph.ty(ptr).is_some_and(Type::is_pointer) {
            ptr
        } else {
            self.graph.get_addr(ptr).expect("aggregate has no address")
        };
        let pointee = self.graph.ty(pointer).and_then(Type::deref);
        assert!(
            pointee.is_some_and(|p| p.len().is_some())
                && self.graph.ty(index).is_some_and(Type::is_integer),
            "element access requires an aggregate pointee and an integer index"
        );
        let access = self.add_inst(InstKind::Access(AccessKind::Element));
        self.graph.add_operand(access, pointer);
        self.graph.add_operand(access, index);
        self.graph.set_types(access, Some(make_pointer(elem_ty, true)));
        access
    }

    // ── Arithmetic ───────────────────────────────────────────────────────

    /// Low-level binary constructor: both sides must have identical types;
    /// the result type is taken as given.
    pub fn create_binary(&mut self, op: BinaryOp, lhs: Value, rhs: Value, ty: Type) -> Value {
        let (lt, rt) = (self.graph.ty(lhs), self.graph.ty(rhs));
        assert!(
            lt.zip(rt).is_some_and(|(l, r)| l.is_identical(r)),
            "binary operands have mismatched types"
        );
        let binary = self.add_inst(InstKind::Binary(op));
        self.graph.add_operand(binary, lhs);
        self.graph.add_operand(binary, rhs);
        self.graph.set_types(binary, Some(ty));
        binary
    }

    pub fn create_unary(&mut self, op: UnaryOp, opr: Value, ty: Type) -> Value {
        let unary = self.add_inst(InstKind::Unary(op));
        self.graph.add_operand(unary, opr);
        self.graph.set_types(unary, Some(ty));
        unary
    }

    fn arith_ty(&self, lhs: Value) -> Type {
        let ty = self.graph.ty(lhs).cloned().expect("operand has no type");
        assert!(ty.is_integer(), "arithmetic on non-integer operand");
        ty
    }

    pub fn create_add(&mut self, lhs: Value, rhs: Value) -> Value {
        let ty = self.arith_ty(lhs);
        self.create_binary(BinaryOp::Add, lhs, rhs, ty)
    }

    pub fn create_sub(&mut self, lhs: Value, rhs: Value) -> Value {
        let ty = self.arith_ty(lhs);
        self.create_binary(BinaryOp::Sub, lhs, rhs, ty)
    }

    pub fn create_mul(&mut self, lhs: Value, rhs: Value) -> Value {
        let ty = self.arith_ty(lhs);
        self.create_binary(BinaryOp::Mul, lhs, rhs, ty)
    }

    pub fn create_div(&mut self, lhs: Value, rhs: Value) -> Value {
        let ty = self.arith_ty(lhs);
        let op = if ty.is_unsigned() { BinaryOp::UDiv } else { BinaryOp::SDiv };
        self.create_binary(op, lhs, rhs, ty)
    }

    pub fn create_rem(&mut self, lhs: Value, rhs: Value) -> Value {
        let ty = self.arith_ty(lhs);
        let op = if ty.is_unsigned() { BinaryOp::URem } else { BinaryOp::SRem };
        self.create_binary(op, lhs, rhs, ty)
    }

    pub fn create_and(&mut self, lhs: Value, rhs: Value) -> Value {
        let ty = self.arith_ty(lhs);
        self.create_binary(BinaryOp::And, lhs, rhs, ty)
    }

    pub fn create_or(&mut self, lhs: Value, rhs: Value) -> Value {
        let ty = self.arith_ty(lhs);
        self.create_binary(BinaryOp::Or, lhs, rhs, ty)
    }

    pub fn create_xor(&mut self, lhs: Value, rhs: Value) -> Value {
        let ty = self.arith_ty(lhs);
        self.create_binary(BinaryOp::Xor, lhs, rhs, ty)
    }

    pub fn create_shl(&mut self, lhs: Value, rhs: Value) -> Value {
        let ty = self.arith_ty(lhs);
        self.create_binary(BinaryOp::Shl, lhs, rhs, ty)
    }

    /// Shift right: logical for unsigned operands, arithmetic otherwise.
    pub fn create_shr(&mut self, lhs: Value, rhs: Value) -> Value {
        let ty = self.arith_ty(lhs);
        let op = if ty.is_unsigned() { BinaryOp::LShr } else { BinaryOp::AShr };
        self.create_binary(op, lhs, rhs, ty)
    }

    fn relop_ty(&self, lhs: Value) -> bool {
        let ty = self.graph.ty(lhs).expect("operand has no type");
        assert!(ty.is_integer() || ty.is_pointer(), "relational operand must be integer or pointer");
        ty.is_unsigned() || ty.is_pointer()
    }

    pub fn create_less(&mut self, lhs: Value, rhs: Value) -> Value {
        let op = if self.relop_ty(lhs) { BinaryOp::ULess } else { BinaryOp::SLess };
        self.create_binary(op, lhs, rhs, make_int32())
    }

    pub fn create_less_eq(&mut self, lhs: Value, rhs: Value) -> Value {
        let op = if self.relop_ty(lhs) { BinaryOp::ULessEq } else { BinaryOp::SLessEq };
        self.create_binary(op, lhs, rhs, make_int32())
    }

    pub fn create_great(&mut self, lhs: Value, rhs: Value) -> Value {
        let op = if self.relop_ty(lhs) { BinaryOp::UGreat } else { BinaryOp::SGreat };
        self.create_binary(op, lhs, rhs, make_int32())
    }

    pub fn create_great_eq(&mut self, lhs: Value, rhs: Value) -> Value {
        let op = if self.relop_ty(lhs) { BinaryOp::UGreatEq } else { BinaryOp::SGreatEq };
        self.create_binary(op, lhs, rhs, make_int32())
    }

    fn eq_check(&self, lhs: Value) {
        let ty = self.graph.ty(lhs).expect("operand has no type");
        assert!(
            ty.is_integer() || ty.is_function() || ty.is_pointer(),
            "equality operand must be integer, function, or pointer"
        );
    }

    pub fn create_equal(&mut self, lhs: Value, rhs: Value) -> Value {
        self.eq_check(lhs);
        self.create_binary(BinaryOp::Equal, lhs, rhs, make_int32())
    }

    pub fn create_not_eq(&mut self, lhs: Value, rhs: Value) -> Value {
        self.eq_check(lhs);
        self.create_binary(BinaryOp::NotEq, lhs, rhs, make_int32())
    }

    pub fn create_neg(&mut self, opr: Value) -> Value {
        let ty = self.arith_ty(opr);
        self.create_unary(UnaryOp::Neg, opr, ty)
    }

    pub fn create_not(&mut self, opr: Value) -> Value {
        let ty = self.arith_ty(opr);
        self.create_unary(UnaryOp::Not, opr, ty)
    }

    pub fn create_logic_not(&mut self, opr: Value) -> Value {
        assert!(self.graph.ty(opr).is_some_and(Type::is_integer), "logical not on non-integer");
        self.create_unary(UnaryOp::LogicNot, opr, make_int32())
    }

    /// `cond != 0 ? t : f`. Both arms must have identical types.
    pub fn create_select(&mut self, cond: Value, t: Value, f: Value) -> Value {
        assert!(self.graph.ty(cond).is_some_and(Type::is_integer), "select on non-integer");
        let (tt, ft) = (self.graph.ty(t), self.graph.ty(f));
        assert!(
            tt.zip(ft).is_some_and(|(a, b)| a.is_identical(b)),
            "select arms have mismatched types"
        );
        let ty = self.graph.org_ty(t).cloned();
        let select = self.add_inst(InstKind::Select);
        self.graph.add_operand(select, cond);
        self.graph.add_operand(select, t);
        self.graph.add_operand(select, f);
        self.graph.set_types(select, ty);
        select
    }

    /// Cast `opr` to `ty`. Identity casts return the operand unchanged;
    /// arrays are addressed first; a cast of a constant is a constant
    /// expression and is not inserted into any block.
    pub fn create_cast(&mut self, opr: Value, ty: &Type) -> Value {
        let opr_ty = self.graph.ty(opr).cloned().expect("cast of a non-value");
        let target = ty.trivial();
        assert!(opr_ty.can_cast_to(&target), "invalid cast");
        if opr_ty.is_identical(&target) {
            return opr;
        }
        let operand = if opr_ty.is_array() {
            self.graph.get_addr(opr).expect("array operand has no address")
        } else {
            opr
        };
        let cast = if self.graph.is_const(operand) {
            // Constant expression: a free-standing node, not an instruction.
            self.graph.new_value(ValueKind::Inst(InstKind::Cast))
        } else {
            assert!(self.insert_point.is_some(), "non-constant cast outside a block");
            self.add_inst(InstKind::Cast)
        };
        self.graph.add_operand(cast, operand);
        self.graph.set_type(cast, target);
        self.graph.set_org_type(cast, ty.clone());
        cast
    }

    // ── Phi nodes ────────────────────────────────────────────────────────

    /// A phi operand pairs an incoming value with its predecessor block. It
    /// lives outside any block; only its phi refers to it.
    pub fn create_phi_operand(&mut self, value: Value, block: Value) -> Value {
        debug_assert!(matches!(self.graph.value(block).kind, ValueKind::Block(_)));
        let opr = self.graph.new_value(ValueKind::Inst(InstKind::PhiOperand));
        self.graph.add_operand(opr, value);
        self.graph.add_operand(opr, block);
        let ty = self.graph.org_ty(value).cloned();
        self.graph.set_types(opr, ty);
        opr
    }

    /// Create a phi at the insert point with one operand per `(value,
    /// predecessor)` pair. All incoming values must share the phi's type.
    pub fn create_phi(&mut self, ty: Type, incoming: &[(Value, Value)]) -> Value {
        for &(value, _) in incoming {
            let vty = self.graph.ty(value).expect("phi of a non-value");
            assert!(ty.trivial().is_identical(vty), "phi operand type mismatch");
        }
        let phi = self.add_inst(InstKind::Phi);
        for &(value, block) in incoming {
            let opr = self.create_phi_operand(value, block);
            self.graph.add_operand(phi, opr);
        }
        self.graph.set_types(phi, Some(ty));
        phi
    }

    // ── Constants ────────────────────────────────────────────────────────

    pub fn get_zero(&mut self, ty: Type) -> Value {
        assert!(
            ty.is_basic() || ty.is_struct() || ty.is_array(),
            "zero constant of unsupported type"
        );
        let zero = self.graph.new_value(ValueKind::ConstZero);
        self.graph.set_types(zero, Some(ty));
        zero
    }

    pub fn get_int(&mut self, value: u32, ty: Type) -> Value {
        assert!(ty.is_integer() || ty.is_enum(), "integer constant of non-integer type");
        let c = self.graph.new_value(ValueKind::ConstInt(value));
        self.graph.set_types(c, Some(ty));
        c
    }

    pub fn get_int32(&mut self, value: u32) -> Value {
        self.get_int(value, make_int32())
    }

    pub fn get_bool(&mut self, value: bool) -> Value {
        self.get_int(value as u32, make_int32())
    }

    pub fn get_string(&mut self, bytes: &[u8], ty: Type) -> Value {
        let pointee = ty.deref();
        assert!(
            ty.is_pointer() && pointee.as_ref().is_some_and(|p| p.is_integer() && p.size() == 1),
            "string constant requires a character pointer type"
        );
        let s = self.graph.new_value(ValueKind::ConstStr(bytes.to_vec()));
        self.graph.set_types(s, Some(ty));
        s
    }

    pub fn get_struct(&mut self, elems: &[Value], ty: Type) -> Value {
        assert!(ty.is_struct() && ty.len() == Some(elems.len()), "struct constant shape mismatch");
        let struct_ty = ty.trivial();
        for (i, &e) in elems.iter().enumerate() {
            assert!(self.graph.is_const(e), "struct constant field is not a constant");
            let field = struct_ty.elem(i).expect("field index out of range");
            assert!(
                self.graph.ty(e).is_some_and(|t| field.is_identical(t)),
                "struct constant field type mismatch"
            );
        }
        let c = self.graph.new_value(ValueKind::ConstStruct);
        for &e in elems {
            self.graph.add_operand(c, e);
        }
        self.graph.set_type(c, struct_ty);
        self.graph.set_org_type(c, ty);
        c
    }

    pub fn get_array(&mut self, elems: &[Value], ty: Type) -> Value {
        assert!(ty.is_array() && ty.len() == Some(elems.len()), "array constant shape mismatch");
        let array_ty = ty.trivial();
        let elem_ty = array_ty.deref().expect("array type has no element");
        for &e in elems {
            assert!(self.graph.is_const(e), "array constant element is not a constant");
            assert!(
                self.graph.ty(e).is_some_and(|t| elem_ty.is_identical(t)),
                "array constant element type mismatch"
            );
        }
        let c = self.graph.new_value(ValueKind::ConstArray);
        for &e in elems {
            self.graph.add_operand(c, e);
        }
        self.graph.set_type(c, array_ty);
        self.graph.set_org_type(c, ty);
        c
    }

    /// An undefined value of the given type. Undefs carry no identity and
    /// may be shared freely.
    pub fn get_undef(&mut self, ty: Type) -> Value {
        let undef = self.graph.new_value(ValueKind::Undef);
        self.graph.set_types(undef, Some(ty));
        undef
    }

    // ── Globals ──────────────────────────────────────────────────────────

    /// Define a global variable. Its primary type is an immutable pointer
    /// to the trivialized variable type; the original type keeps the
    /// qualifiers. `init`, when present, must be a constant of the
    /// trivialized type.
    pub fn create_global_var(
        &mut self,
        link: Linkage,
        is_var: bool,
        name: &str,
        ty: Type,
        init: Option<Value>,
    ) -> Value {
        assert!(!ty.is_void(), "global variable of void type");
        let var_ty = ty.trivial();
        if let Some(init) = init {
            assert!(self.graph.is_const(init), "global initializer is not a constant");
            assert!(
                self.graph.ty(init).is_some_and(|t| var_ty.is_identical(t)),
                "global initializer type mismatch"
            );
        }
        let global = self.graph.new_value(ValueKind::GlobalVar(GlobalData {
            link,
            is_var,
            name: name.to_string(),
        }));
        if let Some(init) = init {
            self.graph.add_operand(global, init);
        }
        self.graph.set_type(global, make_pointer(var_ty, false));
        self.graph.set_org_type(global, make_pointer(ty, true));
        self.vars.push(global);
        global
    }

    // ── Global constructor ───────────────────────────────────────────────

    pub fn global_ctor(&self) -> Option<Value> {
        self.global_ctor
    }

    /// Run `f` with the insert point parked in the global constructor's
    /// entry block, creating the constructor on first use. The previous
    /// insert point is restored afterwards.
    pub fn enter_global_ctor<R>(&mut self, f: impl FnOnce(&mut Module) -> R) -> R {
        let saved = self.insert_point;
        if self.global_ctor.is_none() {
            let ty = make_func(Vec::new(), make_void(), false);
            let ctor = self.create_function(Linkage::GlobalCtor, "_$ctor", ty);
            let entry = self.create_block(ctor, Some("entry"));
            let exit = self.create_block(ctor, Some("exit"));
            self.insert_point = Some(exit);
            self.create_return(None);
            self.global_ctor = Some(ctor);
            self.ctor_entry = Some(entry);
            self.ctor_exit = Some(exit);
            self.is_ctor_sealed = false;
        }
        self.insert_point = self.ctor_entry;
        let result = f(self);
        self.insert_point = saved;
        result
    }

    /// Close the constructor's CFG by jumping from its entry to its exit.
    /// Idempotent; called by dump, pass running, and code generation.
    pub fn seal_global_ctor(&mut self) {
        if self.global_ctor.is_some() && !self.is_ctor_sealed {
            self.insert_point = self.ctor_entry;
            let exit = self.ctor_exit.expect("constructor without an exit block");
            self.create_jump(exit);
            self.is_ctor_sealed = true;
            log::debug!("global constructor sealed");
        }
    }

    // ── Diagnostic context ───────────────────────────────────────────────

    /// Run `f` with `logger` pushed as the innermost diagnostic context.
    pub fn set_context<R>(&mut self, logger: Logger, f: impl FnOnce(&mut Module) -> R) -> R {
        self.loggers.push(Rc::new(logger));
        let result = f(self);
        self.loggers.pop();
        result
    }

    /// The innermost diagnostic logger, when lowering is in progress.
    pub fn logger(&self) -> Option<Rc<Logger>> {
        self.loggers.last().cloned()
    }

    // ── Transform support ────────────────────────────────────────────────

    /// Insert `inst` into `block` immediately before its terminator.
    pub fn insert_before_terminator(&mut self, block: Value, inst: Value) {
        assert!(self.graph.terminator(block).is_some(), "block has no terminator");
        let insts = &mut self.graph.block_data_mut(block).insts;
        let pos = insts.len() - 1;
        insts.insert(pos, inst);
    }

    /// Insert `inst` into `block` after its leading phi instructions.
    pub fn insert_after_phis(&mut self, block: Value, inst: Value) {
        let pos = {
            let data = self.graph.block_data(block);
            data.insts
                .iter()
                .position(|&i| self.graph.inst_kind(i) != Some(InstKind::Phi))
                .unwrap_or(data.insts.len())
        };
        self.graph.block_data_mut(block).insts.insert(pos, inst);
    }

    /// Take `inst` out of `block`'s instruction list without touching its
    /// edges. The caller re-inserts it elsewhere.
    pub fn detach_inst(&mut self, block: Value, inst: Value) {
        let insts = &mut self.graph.block_data_mut(block).insts;
        let pos = insts.iter().position(|&i| i == inst).expect("instruction not in block");
        insts.remove(pos);
    }

    /// Delete `inst` from `block`. The instruction must have no remaining
    /// uses; its operand edges (and a phi's operand nodes) are dropped.
    pub fn remove_inst(&mut self, block: Value, inst: Value) {
        assert!(!self.graph.has_uses(inst), "removing an instruction that still has uses");
        if self.graph.inst_kind(inst) == Some(InstKind::Phi) {
            for opr in self.graph.operands(inst) {
                self.graph.clear_operands(opr);
            }
        }
        self.graph.clear_operands(inst);
        self.detach_inst(block, inst);
    }
}
