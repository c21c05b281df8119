//! IR well-formedness verifier.
//!
//! A read-only walk that checks the structural invariants every producer
//! and consumer of the IR relies on: terminator placement, CFG edge
//! symmetry, phi arity, use-list integrity, and operand dominance. The
//! builder and the passes are expected to keep these true at all times;
//! the verifier exists so tests can prove it.

use hashbrown::HashSet;

use super::analysis::DominanceInfo;
use super::module::Module;
use super::value::{InstKind, Value};

#[derive(Debug, thiserror::Error)]
pub enum VerifyError {
    #[error("block {0:?} does not end in a terminator")]
    MissingTerminator(Value),
    #[error("block {0:?} has a terminator before its last instruction")]
    EarlyTerminator(Value),
    #[error("edge {0:?} -> {1:?} is not mirrored in the predecessor list")]
    UnbalancedEdge(Value, Value),
    #[error("block {0:?} lists predecessor {1:?} which does not branch to it")]
    FalsePredecessor(Value, Value),
    #[error("phi {0:?} has {1} operands but its block has {2} predecessors")]
    PhiArity(Value, usize, usize),
    #[error("phi {0:?} names {1:?} which is not a predecessor of its block")]
    PhiOperandBlock(Value, Value),
    #[error("use edge of {0:?} is not linked into its def-use list")]
    BrokenUseList(Value),
    #[error("use edge of {0:?} records the wrong user")]
    WrongUser(Value),
    #[error("operand {0:?} of {1:?} does not dominate its user")]
    OperandDominance(Value, Value),
}

/// Verify every function of the module. Call after sealing.
pub fn verify_module(m: &Module) -> Result<(), VerifyError> {
    verify_use_lists(m)?;
    for &func in m.funcs() {
        verify_function(m, func)?;
    }
    Ok(())
}

fn is_terminator(m: &Module, v: Value) -> bool {
    matches!(
        m.graph.inst_kind(v),
        Some(InstKind::Jump | InstKind::Branch | InstKind::Return)
    )
}

fn verify_function(m: &Module, func: Value) -> Result<(), VerifyError> {
    let blocks = m.graph.operands(func);
    let dom = DominanceInfo::compute(m, func);

    for &block in &blocks {
        let insts = &m.graph.block_data(block).insts;
        if insts.is_empty() {
            continue;
        }
        let last = *insts.last().expect("non-empty");
        if !is_terminator(m, last) {
            return Err(VerifyError::MissingTerminator(block));
        }
        for &inst in &insts[..insts.len() - 1] {
            if is_terminator(m, inst) {
                return Err(VerifyError::EarlyTerminator(block));
            }
        }

        // Successor lists and predecessor lists must agree edge-for-edge.
        for succ in m.graph.successors(block) {
            let out = m.graph.successors(block).iter().filter(|&&s| s == succ).count();
            let back = m.graph.operands(succ).iter().filter(|&&p| p == block).count();
            if out != back {
                return Err(VerifyError::UnbalancedEdge(block, succ));
            }
        }
        for pred in m.graph.operands(block) {
            if !m.graph.successors(pred).contains(&block) {
                return Err(VerifyError::FalsePredecessor(block, pred));
            }
        }
    }

    // Phi consistency and operand dominance need parent positions.
    let mut parent = hashbrown::HashMap::new();
    let mut position = hashbrown::HashMap::new();
    for &block in &blocks {
        for (i, &inst) in m.graph.block_data(block).insts.iter().enumerate() {
            parent.insert(inst, block);
            position.insert(inst, i);
        }
    }

    for &block in &blocks {
        let preds = m.graph.operands(block);
        for &inst in &m.graph.block_data(block).insts {
            match m.graph.inst_kind(inst) {
                Some(InstKind::Phi) => {
                    let oprs = m.graph.operands(inst);
                    if oprs.len() != preds.len() {
                        return Err(VerifyError::PhiArity(inst, oprs.len(), preds.len()));
                    }
                    for opr in oprs {
                        let opr_block = m.graph.operand(opr, 1);
                        if !preds.contains(&opr_block) {
                            return Err(VerifyError::PhiOperandBlock(inst, opr_block));
                        }
                    }
                }
                _ => {
                    for op in m.graph.operands(inst) {
                        if !m.graph.is_inst(op) || m.graph.is_const(op) {
                            continue;
                        }
                        let Some(&op_block) = parent.get(&op) else { continue };
                        let ok = if op_block == block {
                            position[&op] < position[&inst]
                        } else {
                            dom.dominates(op_block, block)
                        };
                        if !ok {
                            return Err(VerifyError::OperandDominance(op, inst));
                        }
                    }
                }
            }
        }
    }

    Ok(())
}

/// Every operand edge must be linked into its value's def-use list with the
/// right user, and every linked use must belong to some operand list.
fn verify_use_lists(m: &Module) -> Result<(), VerifyError> {
    let mut seen = HashSet::new();
    for user in m.graph.values() {
        for i in 0..m.graph.operand_count(user) {
            let id = m.graph.operand_use(user, i);
            let data = m.graph.use_data(id);
            if data.user != user {
                return Err(VerifyError::WrongUser(data.value));
            }
            if !m.graph.uses_of(data.value).contains(&id) {
                return Err(VerifyError::BrokenUseList(data.value));
            }
            seen.insert(id);
        }
    }
    for v in m.graph.values() {
        for id in m.graph.uses_of(v) {
            if !seen.contains(&id) {
                return Err(VerifyError::BrokenUseList(v));
            }
        }
    }
    Ok(())
}
