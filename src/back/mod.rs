//! The code-generator contract.
//!
//! Backends implement [`CodeGen`] — one method per concrete IR node kind —
//! and receive the module's top-level items in insertion order through
//! [`Module::generate_code`]. How a backend walks from a function into its
//! blocks and instructions is its own business (most recurse through
//! [`dispatch`]); the IR core carries no target knowledge.

use crate::ir::value::{AccessKind, BinaryOp, UnaryOp, ValueKind};
use crate::ir::{InstKind, Module, Value};

/// Double-dispatch visitor over the closed set of IR node kinds.
pub trait CodeGen {
    fn generate_on_load(&mut self, m: &Module, v: Value);
    fn generate_on_store(&mut self, m: &Module, v: Value);
    fn generate_on_alloca(&mut self, m: &Module, v: Value);
    fn generate_on_access(&mut self, m: &Module, v: Value, kind: AccessKind);
    fn generate_on_binary(&mut self, m: &Module, v: Value, op: BinaryOp);
    fn generate_on_unary(&mut self, m: &Module, v: Value, op: UnaryOp);
    fn generate_on_cast(&mut self, m: &Module, v: Value);
    fn generate_on_call(&mut self, m: &Module, v: Value);
    fn generate_on_branch(&mut self, m: &Module, v: Value);
    fn generate_on_jump(&mut self, m: &Module, v: Value);
    fn generate_on_return(&mut self, m: &Module, v: Value);
    fn generate_on_phi(&mut self, m: &Module, v: Value);
    fn generate_on_phi_operand(&mut self, m: &Module, v: Value);
    fn generate_on_select(&mut self, m: &Module, v: Value);
    fn generate_on_function(&mut self, m: &Module, v: Value);
    fn generate_on_global_var(&mut self, m: &Module, v: Value);
    fn generate_on_block(&mut self, m: &Module, v: Value);
    fn generate_on_arg_ref(&mut self, m: &Module, v: Value);
    fn generate_on_const_int(&mut self, m: &Module, v: Value);
    fn generate_on_const_str(&mut self, m: &Module, v: Value);
    fn generate_on_const_struct(&mut self, m: &Module, v: Value);
    fn generate_on_const_array(&mut self, m: &Module, v: Value);
    fn generate_on_const_zero(&mut self, m: &Module, v: Value);
    fn generate_on_undef(&mut self, m: &Module, v: Value);
}

/// Route one value to its `generate_on_*` method.
pub fn dispatch(m: &Module, gen: &mut dyn CodeGen, v: Value) {
    match &m.graph.value(v).kind {
        ValueKind::Inst(kind) => match *kind {
            InstKind::Load => gen.generate_on_load(m, v),
            InstKind::Store => gen.generate_on_store(m, v),
            InstKind::Alloca => gen.generate_on_alloca(m, v),
            InstKind::Access(acc) => gen.generate_on_access(m, v, acc),
            InstKind::Binary(op) => gen.generate_on_binary(m, v, op),
            InstKind::Unary(op) => gen.generate_on_unary(m, v, op),
            InstKind::Cast => gen.generate_on_cast(m, v),
            InstKind::Call => gen.generate_on_call(m, v),
            InstKind::Branch => gen.generate_on_branch(m, v),
            InstKind::Jump => gen.generate_on_jump(m, v),
            InstKind::Return => gen.generate_on_return(m, v),
            InstKind::Phi => gen.generate_on_phi(m, v),
            InstKind::PhiOperand => gen.generate_on_phi_operand(m, v),
            InstKind::Select => gen.generate_on_select(m, v),
        },
        ValueKind::Block(_) => gen.generate_on_block(m, v),
        ValueKind::Function(_) => gen.generate_on_function(m, v),
        ValueKind::GlobalVar(_) => gen.generate_on_global_var(m, v),
        ValueKind::ConstInt(_) => gen.generate_on_const_int(m, v),
        ValueKind::ConstStr(_) => gen.generate_on_const_str(m, v),
        ValueKind::ConstStruct => gen.generate_on_const_struct(m, v),
        ValueKind::ConstArray => gen.generate_on_const_array(m, v),
        ValueKind::ConstZero => gen.generate_on_const_zero(m, v),
        ValueKind::ArgRef(_) => gen.generate_on_arg_ref(m, v),
        ValueKind::Undef => gen.generate_on_undef(m, v),
    }
}

impl Module {
    /// Seal the global constructor and hand every global variable, then
    /// every function, to the backend.
    pub fn generate_code(&mut self, gen: &mut dyn CodeGen) {
        self.seal_global_ctor();
        for var in self.vars().to_vec() {
            dispatch(self, gen, var);
        }
        for func in self.funcs().to_vec() {
            dispatch(self, gen, func);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::types::{make_func, make_int32};
    use crate::ir::Linkage;

    /// A backend that walks functions into blocks and instructions and
    /// counts what it sees.
    #[derive(Default)]
    struct Counter {
        functions: usize,
        blocks: usize,
        binaries: usize,
        returns: usize,
    }

    impl CodeGen for Counter {
        fn generate_on_load(&mut self, _m: &Module, _v: Value) {}
        fn generate_on_store(&mut self, _m: &Module, _v: Value) {}
        fn generate_on_alloca(&mut self, _m: &Module, _v: Value) {}
        fn generate_on_access(&mut self, _m: &Module, _v: Value, _kind: AccessKind) {}
        fn generate_on_binary(&mut self, _m: &Module, _v: Value, _op: BinaryOp) {
            self.binaries += 1;
        }
        fn generate_on_unary(&mut self, _m: &Module, _v: Value, _op: UnaryOp) {}
        fn generate_on_cast(&mut self, _m: &Module, _v: Value) {}
        fn generate_on_call(&mut self, _m: &Module, _v: Value) {}
        fn generate_on_branch(&mut self, _m: &Module, _v: Value) {}
        fn generate_on_jump(&mut self, _m: &Module, _v: Value) {}
        fn generate_on_return(&mut self, _m: &Module, _v: Value) {
            self.returns += 1;
        }
        fn generate_on_phi(&mut self, _m: &Module, _v: Value) {}
        fn generate_on_phi_operand(&mut self, _m: &Module, _v: Value) {}
        fn generate_on_select(&mut self, _m: &Module, _v: Value) {}
        fn generate_on_function(&mut self, m: &Module, v: Value) {
            self.functions += 1;
            for block in m.graph.operands(v) {
                dispatch(m, self, block);
            }
        }
        fn generate_on_global_var(&mut self, _m: &Module, _v: Value) {}
        fn generate_on_block(&mut self, m: &Module, v: Value) {
            self.blocks += 1;
            for inst in m.graph.block_data(v).insts.clone() {
                dispatch(m, self, inst);
            }
        }
        fn generate_on_arg_ref(&mut self, _m: &Module, _v: Value) {}
        fn generate_on_const_int(&mut self, _m: &Module, _v: Value) {}
        fn generate_on_const_str(&mut self, _m: &Module, _v: Value) {}
        fn generate_on_const_struct(&mut self, _m: &Module, _v: Value) {}
        fn generate_on_const_array(&mut self, _m: &Module, _v: Value) {}
        fn generate_on_const_zero(&mut self, _m: &Module, _v: Value) {}
        fn generate_on_undef(&mut self, _m: &Module, _v: Value) {}
    }

    #[test]
    fn backend_walks_items_in_order() {
        let mut m = Module::new();
        let fty = make_func(vec![make_int32()], make_int32(), false);
        let f = m.create_function(Linkage::External, "f", fty);
        let a = m.create_arg_ref(f, 0);
        let entry = m.create_block(f, None);
        m.set_insert_point(entry);
        let doubled = m.create_add(a, a);
        m.create_return(Some(doubled));

        let mut counter = Counter::default();
        m.generate_code(&mut counter);
        assert_eq!(counter.functions, 1);
        assert_eq!(counter.blocks, 1);
        assert_eq!(counter.binaries, 1);
        assert_eq!(counter.returns, 1);
    }
}
