//! Natural-loop analysis pass: publishes each function's loops,
//! innermost-first, under the name `loop_info`. The loop-normalization
//! pass fills in missing pre-headers afterwards.

use hashbrown::HashMap;

use crate::ir::analysis::{find_loops, Loop};
use crate::ir::{Module, Value};

use super::dom_info::DominanceStore;
use super::{AnalysisCache, Pass, PassInfo, PassKind, PassStage};

pub const INFO: PassInfo = PassInfo {
    name: "loop_info",
    kind: PassKind::Function,
    stage: PassStage::Opt,
    min_opt_level: 0,
    requires: &["dom_info"],
    factory: || Box::new(LoopInfoPass),
};

/// Per-function loop lists.
#[derive(Default)]
pub struct LoopStore {
    loops: HashMap<Value, Vec<Loop>>,
}

impl LoopStore {
    pub fn of(&self, func: Value) -> &[Loop] {
        self.loops.get(&func).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Detach a function's loop list for in-place editing.
    pub fn take(&mut self, func: Value) -> Vec<Loop> {
        self.loops.remove(&func).unwrap_or_default()
    }

    pub fn put(&mut self, func: Value, loops: Vec<Loop>) {
        self.loops.insert(func, loops);
    }
}

struct LoopInfoPass;

impl Pass for LoopInfoPass {
    fn run_on_function(&mut self, m: &mut Module, func: Value, cache: &mut AnalysisCache) -> bool {
        let loops = {
            let dom = cache.get::<DominanceStore>("dom_info").of(func);
            find_loops(m, func, dom)
        };
        cache.get_or_default::<LoopStore>("loop_info").put(func, loops);
        false
    }
}
