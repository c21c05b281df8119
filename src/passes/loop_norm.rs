//! Loop normalization: give every loop a dedicated pre-header.
//!
//! Hoisting needs a block in front of the loop header whose only successor
//! is the header. When the unique out-of-loop predecessor already jumps
//! unconditionally to the header it is adopted as-is; when it has other
//! successors, a fresh block is spliced onto the edge and the header's
//! phis are retargeted. Loops whose header is reachable from several
//! out-of-loop predecessors are left unnormalized; LICM skips them.

use crate::ir::{InstKind, Module, Value};

use super::loop_info::LoopStore;
use super::{AnalysisCache, Pass, PassInfo, PassKind, PassStage};

pub const INFO: PassInfo = PassInfo {
    name: "loop_norm",
    kind: PassKind::Function,
    stage: PassStage::Opt,
    min_opt_level: 2,
    requires: &["dom_info", "loop_info"],
    factory: || Box::new(LoopNormPass),
};

struct LoopNormPass;

impl Pass for LoopNormPass {
    fn run_on_function(&mut self, m: &mut Module, func: Value, cache: &mut AnalysisCache) -> bool {
        if m.graph.operands(func).is_empty() {
            return false;
        }
        let mut changed = false;
        let mut loops = cache.get_mut::<LoopStore>("loop_info").take(func);
        for l in &mut loops {
            if l.preheader.is_some() {
                continue;
            }
            let mut outside: Vec<Value> = Vec::new();
            for pred in m.graph.operands(l.header) {
                if !l.contains(pred) && !outside.contains(&pred) {
                    outside.push(pred);
                }
            }
            // Multiple entries (or an entry-block header): cannot place a
            // single pre-header; leave the loop alone.
            let [pred] = outside.as_slice() else { continue };
            let pred = *pred;

            if m.graph.successors(pred) == [l.header] {
                l.preheader = Some(pred);
                continue;
            }

            l.preheader = Some(split_entry_edge(m, func, pred, l.header));
            changed = true;
        }
        cache.get_mut::<LoopStore>("loop_info").put(func, loops);
        changed
    }
}

/// Splice a fresh block onto the `pred -> header` edge and return it.
fn split_entry_edge(m: &mut Module, func: Value, pred: Value, header: Value) -> Value {
    let preheader = m.create_block(func, None);

    // Retarget every successor edge of `pred` that names the header.
    let term = m.graph.terminator(pred).expect("loop predecessor has no terminator");
    let mut edges = 0usize;
    for i in 0..m.graph.operand_count(term) {
        if m.graph.operand(term, i) == header {
            m.graph.set_operand(term, i, preheader);
            edges += 1;
        }
    }
    assert!(edges > 0, "predecessor does not branch to the header");

    // Move the matching predecessor entries of the header over.
    while let Some(pos) = m.graph.operands(header).iter().position(|&p| p == pred) {
        m.graph.remove_operand(header, pos);
    }
    for _ in 0..edges {
        m.graph.add_operand(preheader, pred);
    }

    // Header phis now flow in through the pre-header.
    for inst in m.graph.block_data(header).insts.clone() {
        if m.graph.inst_kind(inst) != Some(InstKind::Phi) {
            continue;
        }
        for opr in m.graph.operands(inst) {
            if m.graph.operand(opr, 1) == pred {
                m.graph.set_operand(opr, 1, preheader);
            }
        }
    }

    let saved = m.insert_point();
    m.set_insert_point(preheader);
    m.create_jump(header);
    if let Some(block) = saved {
        m.set_insert_point(block);
    }
    log::debug!("loop_norm: created pre-header {:?} for header {:?}", preheader, header);
    preheader
}

#[cfg(test)]
mod tests {
    use crate::common::types::{make_func, make_int32, make_void};
    use crate::ir::value::Linkage;
    use crate::ir::verify::verify_module;
    use crate::ir::{Module, Value};
    use crate::passes::{register_all_passes, PassManager};

    /// The loop's only outside predecessor branches two ways, so a block
    /// must be spliced onto the entry edge.
    #[test]
    fn splices_preheader_on_conditional_entry() {
        let mut m = Module::new();
        let fty = make_func(vec![make_int32()], make_void(), false);
        let f = m.create_function(Linkage::External, "f", fty);
        let n = m.create_arg_ref(f, 0);

        let entry = m.create_block(f, None);
        let header = m.create_block(f, None);
        let body = m.create_block(f, None);
        let exit = m.create_block(f, None);

        m.set_insert_point(entry);
        let ten = m.get_int32(10);
        let enter = m.create_less(n, ten);
        m.create_branch(enter, header, exit);
        m.set_insert_point(header);
        let again = m.create_less(n, ten);
        m.create_branch(again, body, exit);
        m.set_insert_point(body);
        m.create_jump(header);
        m.set_insert_point(exit);
        m.create_return(None);

        let mut pm = PassManager::new(2);
        register_all_passes(&mut pm);
        m.run_passes(&mut pm);
        verify_module(&m).unwrap();

        // entry now reaches the header through a fresh single-jump block.
        let succs = m.graph.successors(entry);
        assert_ne!(succs[0], header);
        let ph = succs[0];
        assert_eq!(m.graph.successors(ph), vec![header]);
        let preds: Vec<Value> = m.graph.operands(header);
        assert!(preds.contains(&ph) && preds.contains(&body) && !preds.contains(&entry));
    }
}
