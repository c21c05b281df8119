//! Loop-invariant code motion.
//!
//! For each loop, innermost first: collect the base pointers stored
//! through anywhere in the loop body, then grow the invariant set to a
//! fixpoint — an instruction joins when it is a hoistable kind (access,
//! binary, unary, cast, select, or a load whose base pointer is not in the
//! store set), every operand is a constant, undef, argument, global,
//! out-of-loop definition, or already-marked invariant, and its block
//! dominates the block of every in-loop user. Marked instructions move to
//! the loop's pre-header, in marking order, just before its terminator.
//!
//! There is no alias analysis: a store whose base pointer is a function
//! argument conservatively poisons every pointer-typed argument of the
//! function.

use hashbrown::HashSet;

use crate::ir::analysis::{DominanceInfo, Loop, ParentScanner};
use crate::ir::value::ValueKind;
use crate::ir::{InstKind, Module, Value};

use super::dom_info::DominanceStore;
use super::loop_info::LoopStore;
use super::{AnalysisCache, Pass, PassInfo, PassKind, PassStage};

pub const INFO: PassInfo = PassInfo {
    name: "licm",
    kind: PassKind::Function,
    stage: PassStage::Opt,
    min_opt_level: 2,
    requires: &["dom_info", "loop_info", "loop_norm", "loop_reduce"],
    factory: || Box::new(LicmPass),
};

struct LicmPass;

impl Pass for LicmPass {
    fn run_on_function(&mut self, m: &mut Module, func: Value, cache: &mut AnalysisCache) -> bool {
        if m.graph.operands(func).is_empty() {
            return false;
        }
        let loops = cache.get::<LoopStore>("loop_info").of(func).to_vec();
        let dom = cache.get::<DominanceStore>("dom_info");
        let mut changed = false;
        for l in &loops {
            if process_loop(m, func, l, dom.of(func)) {
                changed = true;
            }
        }
        changed
    }
}

fn process_loop(m: &mut Module, func: Value, l: &Loop, dom: &DominanceInfo) -> bool {
    let Some(preheader) = l.preheader else { return false };
    // Hoisting moves instructions, so parent info is rebuilt per loop.
    let parent = ParentScanner::new(m, func);

    let stored = stored_pointers(m, func, l);

    let mut marked: HashSet<Value> = HashSet::new();
    let mut invs: Vec<Value> = Vec::new();
    loop {
        let before = marked.len();
        for &block in &l.body {
            for &inst in &m.graph.block_data(block).insts {
                if marked.contains(&inst) {
                    continue;
                }
                let hoistable = match m.graph.inst_kind(inst) {
                    Some(
                        InstKind::Access(_)
                        | InstKind::Binary(_)
                        | InstKind::Unary(_)
                        | InstKind::Cast
                        | InstKind::Select,
                    ) => true,
                    Some(InstKind::Load) => {
                        let base = base_pointer(m, m.graph.operand(inst, 0));
                        !stored.contains(&base)
                    }
                    _ => false,
                };
                if hoistable {
                    mark_invariant(m, l, dom, &parent, block, inst, &mut marked, &mut invs);
                }
            }
        }
        if marked.len() == before {
            break;
        }
    }

    if invs.is_empty() {
        return false;
    }

    for &inst in &invs {
        let from = parent.parent(inst).expect("invariant instruction has no parent");
        m.detach_inst(from, inst);
        m.insert_before_terminator(preheader, inst);
    }
    log::debug!("licm: hoisted {} instructions into {:?}", invs.len(), preheader);
    true
}

/// Base pointers of every store in the loop body. A store through an
/// argument poisons all pointer-typed arguments.
fn stored_pointers(m: &Module, func: Value, l: &Loop) -> HashSet<Value> {
    let mut stored = HashSet::new();
    for &block in &l.body {
        for &inst in &m.graph.block_data(block).insts {
            if m.graph.inst_kind(inst) != Some(InstKind::Store) {
                continue;
            }
            let base = base_pointer(m, m.graph.operand(inst, 1));
            if matches!(m.graph.value(base).kind, ValueKind::ArgRef(_)) {
                for &arg in &m.graph.func_data(func).args {
                    if m.graph.ty(arg).is_some_and(|t| t.is_pointer()) {
                        stored.insert(arg);
                    }
                }
            }
            stored.insert(base);
        }
    }
    stored
}

/// Peel accesses and casts off a pointer; follow a phi only through the
/// unique incoming value that is not itself a user of the phi (the
/// non-cyclic edge). An ambiguous phi is its own base.
fn base_pointer(m: &Module, mut ptr: Value) -> Value {
    let mut visited = HashSet::new();
    loop {
        if !visited.insert(ptr) {
            return ptr;
        }
        match m.graph.inst_kind(ptr) {
            Some(InstKind::Access(_) | InstKind::Cast) => ptr = m.graph.operand(ptr, 0),
            Some(InstKind::Phi) => {
                let users: HashSet<Value> = m.graph.users_of(ptr).into_iter().collect();
                let mut candidate = None;
                for opr in m.graph.operands(ptr) {
                    let incoming = m.graph.operand(opr, 0);
                    if users.contains(&incoming) {
                        continue;
                    }
                    if candidate.is_some() {
                        return ptr;
                    }
                    candidate = Some(incoming);
                }
                match candidate {
                    Some(v) => ptr = v,
                    None => return ptr,
                }
            }
            _ => return ptr,
        }
    }
}

fn is_invariant(
    m: &Module,
    l: &Loop,
    parent: &ParentScanner,
    marked: &HashSet<Value>,
    v: Value,
) -> bool {
    if m.graph.is_const(v) || m.graph.is_undef(v) {
        return true;
    }
    if matches!(m.graph.value(v).kind, ValueKind::ArgRef(_) | ValueKind::GlobalVar(_)) {
        return true;
    }
    match parent.parent(v) {
        Some(p) if l.contains(p) => marked.contains(&v),
        // Defined outside the loop (or not an instruction at all).
        _ => true,
    }
}

fn mark_invariant(
    m: &Module,
    l: &Loop,
    dom: &DominanceInfo,
    parent: &ParentScanner,
    block: Value,
    inst: Value,
    marked: &mut HashSet<Value>,
    invs: &mut Vec<Value>,
) {
    for op in m.graph.operands(inst) {
        if !is_invariant(m, l, parent, marked, op) {
            return;
        }
    }
    // The definition must stay above every in-loop user after the hoist.
    for user in m.graph.users_of(inst) {
        let Some(user_block) = parent.parent(user) else { continue };
        if !l.contains(user_block) {
            continue;
        }
        if !dom.dominates(block, user_block) {
            return;
        }
    }
    marked.insert(inst);
    if m.graph.has_uses(inst) {
        invs.push(inst);
    }
}
