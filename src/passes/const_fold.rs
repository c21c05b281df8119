//! Constant folding: integer binary and unary instructions whose operands
//! are integer constants are evaluated at compile time; every use is
//! redirected to the folded constant and the instruction is deleted.

use crate::ir::value::{BinaryOp, UnaryOp, ValueKind};
use crate::ir::{InstKind, Module, Value};

use super::{AnalysisCache, Pass, PassInfo, PassKind, PassStage};

pub const INFO: PassInfo = PassInfo {
    name: "const_fold",
    kind: PassKind::Function,
    stage: PassStage::Opt,
    min_opt_level: 1,
    requires: &[],
    factory: || Box::new(ConstFoldPass),
};

struct ConstFoldPass;

impl Pass for ConstFoldPass {
    fn run_on_function(&mut self, m: &mut Module, func: Value, _cache: &mut AnalysisCache) -> bool {
        let mut changed = false;
        for block in m.graph.operands(func) {
            for inst in m.graph.block_data(block).insts.clone() {
                let folded = match m.graph.inst_kind(inst) {
                    Some(InstKind::Binary(op)) => {
                        let a = const_int(m, m.graph.operand(inst, 0));
                        let b = const_int(m, m.graph.operand(inst, 1));
                        match (a, b) {
                            (Some(a), Some(b)) => eval_binary(op, a, b),
                            _ => None,
                        }
                    }
                    Some(InstKind::Unary(op)) => {
                        const_int(m, m.graph.operand(inst, 0)).map(|a| eval_unary(op, a))
                    }
                    _ => None,
                };
                let Some(value) = folded else { continue };
                let ty = m.graph.ty(inst).cloned().expect("folded instruction has no type");
                let c = m.get_int(value, ty);
                if m.graph.has_uses(inst) {
                    m.graph.replace_all_uses_with(inst, c);
                }
                m.remove_inst(block, inst);
                changed = true;
            }
        }
        changed
    }
}

fn const_int(m: &Module, v: Value) -> Option<u32> {
    match m.graph.value(v).kind {
        ValueKind::ConstInt(value) => Some(value),
        _ => None,
    }
}

/// Evaluate with 32-bit wrapping semantics; division and remainder fold
/// only when defined.
fn eval_binary(op: BinaryOp, a: u32, b: u32) -> Option<u32> {
    let (sa, sb) = (a as i32, b as i32);
    Some(match op {
        BinaryOp::Add => a.wrapping_add(b),
        BinaryOp::Sub => a.wrapping_sub(b),
        BinaryOp::Mul => a.wrapping_mul(b),
        BinaryOp::UDiv => a.checked_div(b)?,
        BinaryOp::SDiv => sa.checked_div(sb)? as u32,
        BinaryOp::URem => a.checked_rem(b)?,
        BinaryOp::SRem => sa.checked_rem(sb)? as u32,
        BinaryOp::Equal => (a == b) as u32,
        BinaryOp::NotEq => (a != b) as u32,
        BinaryOp::ULess => (a < b) as u32,
        BinaryOp::SLess => (sa < sb) as u32,
        BinaryOp::ULessEq => (a <= b) as u32,
        BinaryOp::SLessEq => (sa <= sb) as u32,
        BinaryOp::UGreat => (a > b) as u32,
        BinaryOp::SGreat => (sa > sb) as u32,
        BinaryOp::UGreatEq => (a >= b) as u32,
        BinaryOp::SGreatEq => (sa >= sb) as u32,
        BinaryOp::And => a & b,
        BinaryOp::Or => a | b,
        BinaryOp::Xor => a ^ b,
        BinaryOp::Shl => a.wrapping_shl(b),
        BinaryOp::LShr => a.wrapping_shr(b),
        BinaryOp::AShr => sa.wrapping_shr(b) as u32,
    })
}

fn eval_unary(op: UnaryOp, a: u32) -> u32 {
    match op {
        UnaryOp::Neg => a.wrapping_neg(),
        UnaryOp::Not => !a,
        UnaryOp::LogicNot => (a == 0) as u32,
    }
}
