//! Induction-variable strength reduction.
//!
//! A multiplication of a simple induction variable by a constant is
//! rewritten into an accumulator: for a header phi `i` with a
//! pre-header-incoming init and an in-loop step `i + C` (constant `C`),
//! every in-loop `i * K` (constant `K`) becomes a new phi that starts at
//! `init * K` and steps by `C * K`, turning the per-iteration multiply
//! into an add. The original multiply loses all uses and is left for dead
//! code elimination.

use crate::ir::analysis::{Loop, ParentScanner};
use crate::ir::value::{BinaryOp, ValueKind};
use crate::ir::{InstKind, Module, Value};

use super::loop_info::LoopStore;
use super::{AnalysisCache, Pass, PassInfo, PassKind, PassStage};

pub const INFO: PassInfo = PassInfo {
    name: "loop_reduce",
    kind: PassKind::Function,
    stage: PassStage::Opt,
    min_opt_level: 2,
    requires: &["dom_info", "loop_info", "loop_norm"],
    factory: || Box::new(LoopReducePass),
};

struct LoopReducePass;

impl Pass for LoopReducePass {
    fn run_on_function(&mut self, m: &mut Module, func: Value, cache: &mut AnalysisCache) -> bool {
        if m.graph.operands(func).is_empty() {
            return false;
        }
        let loops = cache.get::<LoopStore>("loop_info").of(func).to_vec();
        let mut changed = false;
        for l in &loops {
            if reduce_loop(m, func, l) {
                changed = true;
            }
        }
        changed
    }
}

/// A recognized induction variable: `phi` starts at `init` and is advanced
/// by `step = phi + step_const` inside the loop.
struct Induction {
    phi: Value,
    init: Value,
    step: Value,
    step_const: u32,
}

fn reduce_loop(m: &mut Module, func: Value, l: &Loop) -> bool {
    let Some(preheader) = l.preheader else { return false };
    let parent = ParentScanner::new(m, func);
    let mut changed = false;

    for iv in find_inductions(m, l, preheader) {
        let Some(step_block) = parent.parent(iv.step) else { continue };
        // Collect `iv * K` candidates first; rewriting edits the lists.
        let mut muls: Vec<(Value, Value, u32)> = Vec::new();
        for &block in &l.body {
            for &inst in &m.graph.block_data(block).insts {
                if m.graph.inst_kind(inst) != Some(InstKind::Binary(BinaryOp::Mul)) {
                    continue;
                }
                let (a, b) = (m.graph.operand(inst, 0), m.graph.operand(inst, 1));
                let factor = if a == iv.phi {
                    const_int(m, b)
                } else if b == iv.phi {
                    const_int(m, a)
                } else {
                    None
                };
                // A use-less multiply would only spawn a dead accumulator.
                if let (Some(k), true) = (factor, m.graph.has_uses(inst)) {
                    muls.push((inst, block, k));
                }
            }
        }
        for (mul, block, k) in muls {
            rewrite_mul(m, l, preheader, step_block, &iv, mul, block, k);
            changed = true;
        }
    }
    changed
}

/// Header phis of the shape `phi [init, preheader], [phi + C, tail]`.
fn find_inductions(m: &Module, l: &Loop, preheader: Value) -> Vec<Induction> {
    let mut ivs = Vec::new();
    for &inst in &m.graph.block_data(l.header).insts {
        if m.graph.inst_kind(inst) != Some(InstKind::Phi) || m.graph.operand_count(inst) != 2 {
            continue;
        }
        let mut init = None;
        let mut step = None;
        for opr in m.graph.operands(inst) {
            let value = m.graph.operand(opr, 0);
            let block = m.graph.operand(opr, 1);
            if block == preheader {
                init = Some(value);
            } else if l.contains(block) {
                step = Some(value);
            }
        }
        let (Some(init), Some(step)) = (init, step) else { continue };
        if m.graph.inst_kind(step) != Some(InstKind::Binary(BinaryOp::Add)) {
            continue;
        }
        let (a, b) = (m.graph.operand(step, 0), m.graph.operand(step, 1));
        let step_const = if a == inst {
            const_int(m, b)
        } else if b == inst {
            const_int(m, a)
        } else {
            None
        };
        let Some(step_const) = step_const else { continue };
        ivs.push(Induction { phi: inst, init, step, step_const });
    }
    ivs
}

fn const_int(m: &Module, v: Value) -> Option<u32> {
    match m.graph.value(v).kind {
        ValueKind::ConstInt(value) => Some(value),
        _ => None,
    }
}

/// Replace `mul = iv * K` with an accumulator phi.
#[allow(clippy::too_many_arguments)]
fn rewrite_mul(
    m: &mut Module,
    l: &Loop,
    preheader: Value,
    step_block: Value,
    iv: &Induction,
    mul: Value,
    _mul_block: Value,
    k: u32,
) {
    let ty = m.graph.ty(mul).cloned().expect("multiply has no type");
    let saved = m.insert_point();

    // init * K in the pre-header (folded when the init is constant).
    let acc_init = match const_int(m, iv.init) {
        Some(init) => m.get_int(init.wrapping_mul(k), ty.clone()),
        None => {
            m.set_insert_point(preheader);
            let kc = m.get_int(k, ty.clone());
            let init_mul = m.create_mul(iv.init, kc);
            // The builder appends past the terminator; move it in front.
            m.detach_inst(preheader, init_mul);
            m.insert_before_terminator(preheader, init_mul);
            init_mul
        }
    };

    // The accumulator phi, placed with the header's other phis. Its
    // back-edge operand is patched in once the step add exists.
    m.set_insert_point(l.header);
    let acc = m.create_phi(ty.clone(), &[(acc_init, preheader)]);
    m.detach_inst(l.header, acc);
    m.insert_after_phis(l.header, acc);

    // acc + C*K next to the induction step.
    m.set_insert_point(step_block);
    let ck = m.get_int(iv.step_const.wrapping_mul(k), ty.clone());
    let acc_step = m.create_add(acc, ck);
    m.detach_inst(step_block, acc_step);
    m.insert_before_terminator(step_block, acc_step);

    let back_edge = m.create_phi_operand(acc_step, step_block);
    m.graph.add_operand(acc, back_edge);

    m.graph.replace_all_uses_with(mul, acc);
    if let Some(block) = saved {
        m.set_insert_point(block);
    }
    log::debug!("loop_reduce: reduced {:?} to accumulator {:?}", mul, acc);
}

#[cfg(test)]
mod tests {
    use crate::common::types::{make_func, make_int32, make_void};
    use crate::ir::value::{BinaryOp, Linkage};
    use crate::ir::verify::verify_module;
    use crate::ir::{InstKind, Module};
    use crate::passes::{register_all_passes, PassManager};

    /// `for (i = 0; i < n; i++) *g = i * 4;` — the multiply becomes an
    /// accumulator phi and dies.
    #[test]
    fn reduces_induction_multiply() {
        let mut m = Module::new();
        let g = m.create_global_var(Linkage::Internal, true, "g", make_int32(), None);
        let fty = make_func(vec![make_int32()], make_void(), false);
        let f = m.create_function(Linkage::External, "f", fty);
        let n = m.create_arg_ref(f, 0);

        let entry = m.create_block(f, None);
        let header = m.create_block(f, None);
        let body = m.create_block(f, None);
        let exit = m.create_block(f, None);

        m.set_insert_point(entry);
        m.create_jump(header);

        m.set_insert_point(header);
        let zero = m.get_int32(0);
        let i = m.create_phi(make_int32(), &[(zero, entry)]);
        let cmp = m.create_less(i, n);
        m.create_branch(cmp, body, exit);

        m.set_insert_point(body);
        let four = m.get_int32(4);
        let scaled = m.create_mul(i, four);
        m.create_store(scaled, g);
        let one = m.get_int32(1);
        let inc = m.create_add(i, one);
        let back = m.create_phi_operand(inc, body);
        m.graph.add_operand(i, back);
        m.create_jump(header);

        m.set_insert_point(exit);
        m.create_return(None);

        verify_module(&m).unwrap();
        let mut pm = PassManager::new(2);
        register_all_passes(&mut pm);
        m.run_passes(&mut pm);
        verify_module(&m).unwrap();

        // The multiply lost every use and was cleaned up.
        let body_insts = &m.graph.block_data(body).insts;
        assert!(!body_insts.contains(&scaled));
        // The header carries the original phi plus the accumulator.
        let phis = m
            .graph
            .block_data(header)
            .insts
            .iter()
            .filter(|&&v| m.graph.inst_kind(v) == Some(InstKind::Phi))
            .count();
        assert_eq!(phis, 2);
        // The store now flows from the accumulator, stepped by an add.
        let store = body_insts
            .iter()
            .find(|&&v| m.graph.inst_kind(v) == Some(InstKind::Store))
            .copied()
            .unwrap();
        let acc = m.graph.operand(store, 0);
        assert_eq!(m.graph.inst_kind(acc), Some(InstKind::Phi));
        assert!(body_insts
            .iter()
            .any(|&v| m.graph.inst_kind(v) == Some(InstKind::Binary(BinaryOp::Add))
                && m.graph.operands(v).contains(&acc)));
    }
}
