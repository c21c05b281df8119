//! Dominance analysis pass: recomputes the per-function dominator tree on
//! every sweep and publishes it under the name `dom_info`.

use hashbrown::HashMap;

use crate::ir::analysis::DominanceInfo;
use crate::ir::{Module, Value};

use super::{AnalysisCache, Pass, PassInfo, PassKind, PassStage};

pub const INFO: PassInfo = PassInfo {
    name: "dom_info",
    kind: PassKind::Function,
    stage: PassStage::Opt,
    min_opt_level: 0,
    requires: &[],
    factory: || Box::new(DomInfoPass),
};

/// Per-function dominance results.
#[derive(Default)]
pub struct DominanceStore {
    info: HashMap<Value, DominanceInfo>,
}

impl DominanceStore {
    pub fn of(&self, func: Value) -> &DominanceInfo {
        self.info.get(&func).expect("dominance not computed for function")
    }

    pub fn is_dominate(&self, func: Value, a: Value, b: Value) -> bool {
        self.of(func).dominates(a, b)
    }
}

struct DomInfoPass;

impl Pass for DomInfoPass {
    fn run_on_function(&mut self, m: &mut Module, func: Value, cache: &mut AnalysisCache) -> bool {
        let info = DominanceInfo::compute(m, func);
        cache.get_or_default::<DominanceStore>("dom_info").info.insert(func, info);
        false
    }
}
