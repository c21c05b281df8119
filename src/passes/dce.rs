//! Dead code elimination: pure instructions whose use-lists are empty are
//! deleted, iterating to a local fixpoint so chains of dead definitions
//! fall in one run.

use crate::ir::{InstKind, Module, Value};

use super::{AnalysisCache, Pass, PassInfo, PassKind, PassStage};

pub const INFO: PassInfo = PassInfo {
    name: "dce",
    kind: PassKind::Function,
    stage: PassStage::Opt,
    min_opt_level: 1,
    requires: &[],
    factory: || Box::new(DcePass),
};

/// Value-producing kinds with no side effects. Stores, calls, and
/// terminators stay; phi operands are owned by their phi.
fn is_pure(kind: InstKind) -> bool {
    matches!(
        kind,
        InstKind::Load
            | InstKind::Alloca
            | InstKind::Access(_)
            | InstKind::Binary(_)
            | InstKind::Unary(_)
            | InstKind::Cast
            | InstKind::Select
            | InstKind::Phi
    )
}

struct DcePass;

impl Pass for DcePass {
    fn run_on_function(&mut self, m: &mut Module, func: Value, _cache: &mut AnalysisCache) -> bool {
        let mut changed = false;
        loop {
            let mut removed = false;
            for block in m.graph.operands(func) {
                for inst in m.graph.block_data(block).insts.clone().into_iter().rev() {
                    let pure = m.graph.inst_kind(inst).is_some_and(is_pure);
                    if pure && !m.graph.has_uses(inst) {
                        m.remove_inst(block, inst);
                        removed = true;
                    }
                }
            }
            if !removed {
                break;
            }
            changed = true;
        }
        changed
    }
}
