//! Read-only analyses over the IR: parent scanning, dominance, and natural
//! loop detection.
//!
//! Results are keyed by value handle, so passes can keep them around while
//! holding the module mutably. They go stale as soon as a transform moves
//! instructions or edits the CFG; the pass manager re-derives them on every
//! sweep.

use hashbrown::{HashMap, HashSet};

use super::module::Module;
use super::value::Value;

// ── Parent scanner ────────────────────────────────────────────────────────

/// Maps each instruction to its containing block, computed by one pass over
/// all blocks of a function. Must be rebuilt after any transform that moves
/// instructions.
pub struct ParentScanner {
    parent: HashMap<Value, Value>,
}

impl ParentScanner {
    pub fn new(m: &Module, func: Value) -> Self {
        let mut parent = HashMap::new();
        for block in m.graph.operands(func) {
            for &inst in &m.graph.block_data(block).insts {
                parent.insert(inst, block);
            }
        }
        ParentScanner { parent }
    }

    /// The block containing `v`, or `None` for non-instructions and
    /// free-standing nodes (constants, phi operands, constant casts).
    pub fn parent(&self, v: Value) -> Option<Value> {
        self.parent.get(&v).copied()
    }
}

// ── Dominance ─────────────────────────────────────────────────────────────

const UNDEF: usize = usize::MAX;

/// Immediate-dominator tree of one function, built with the iterative
/// Cooper-Harvey-Kennedy algorithm over reverse postorder.
pub struct DominanceInfo {
    index: HashMap<Value, usize>,
    idom: Vec<usize>,
}

impl DominanceInfo {
    pub fn compute(m: &Module, func: Value) -> Self {
        let blocks = m.graph.operands(func);
        let n = blocks.len();
        let index: HashMap<Value, usize> =
            blocks.iter().enumerate().map(|(i, &b)| (b, i)).collect();

        let mut succs: Vec<Vec<usize>> = vec![Vec::new(); n];
        let mut preds: Vec<Vec<usize>> = vec![Vec::new(); n];
        for (i, &b) in blocks.iter().enumerate() {
            for s in m.graph.successors(b) {
                if let Some(&t) = index.get(&s) {
                    succs[i].push(t);
                    preds[t].push(i);
                }
            }
        }

        // Reverse postorder from the entry block.
        let mut visited = vec![false; n];
        let mut postorder = Vec::with_capacity(n);
        fn dfs(node: usize, succs: &[Vec<usize>], visited: &mut [bool], out: &mut Vec<usize>) {
            visited[node] = true;
            for &s in &succs[node] {
                if !visited[s] {
                    dfs(s, succs, visited, out);
                }
            }
            out.push(node);
        }
        if n > 0 {
            dfs(0, &succs, &mut visited, &mut postorder);
        }
        postorder.reverse();
        let rpo = postorder;
        let mut rpo_number = vec![UNDEF; n];
        for (order, &b) in rpo.iter().enumerate() {
            rpo_number[b] = order;
        }

        let mut idom = vec![UNDEF; n];
        if !rpo.is_empty() {
            idom[rpo[0]] = rpo[0];
            let mut changed = true;
            while changed {
                changed = false;
                for &b in rpo.iter().skip(1) {
                    let mut new_idom = UNDEF;
                    for &p in &preds[b] {
                        if idom[p] != UNDEF {
                            new_idom = p;
                            break;
                        }
                    }
                    if new_idom == UNDEF {
                        continue;
                    }
                    for &p in &preds[b] {
                        if p != new_idom && idom[p] != UNDEF {
                            new_idom = intersect(new_idom, p, &idom, &rpo_number);
                        }
                    }
                    if idom[b] != new_idom {
                        idom[b] = new_idom;
                        changed = true;
                    }
                }
            }
        }

        DominanceInfo { index, idom }
    }

    /// Whether block `a` dominates block `b`. Unreachable or foreign blocks
    /// dominate nothing and are dominated by nothing.
    pub fn dominates(&self, a: Value, b: Value) -> bool {
        let Some(&a) = self.index.get(&a) else { return false };
        let Some(&b) = self.index.get(&b) else { return false };
        let mut b = b;
        loop {
            if b == a {
                return true;
            }
            if self.idom[b] == UNDEF || self.idom[b] == b {
                return false;
            }
            b = self.idom[b];
        }
    }
}

fn intersect(mut f1: usize, mut f2: usize, idom: &[usize], rpo_number: &[usize]) -> usize {
    while f1 != f2 {
        while rpo_number[f1] > rpo_number[f2] {
            f1 = idom[f1];
        }
        while rpo_number[f2] > rpo_number[f1] {
            f2 = idom[f2];
        }
    }
    f1
}

// ── Natural loops ─────────────────────────────────────────────────────────

/// One natural loop. `preheader` is filled in by the loop-normalization
/// pass (or detected when a valid pre-header already exists).
#[derive(Debug, Clone)]
pub struct Loop {
    pub header: Value,
    /// Blocks of the loop in function block order; includes the header.
    pub body: Vec<Value>,
    pub body_set: HashSet<Value>,
    /// Dedicated block in front of the header with the header as its only
    /// successor, when one exists.
    pub preheader: Option<Value>,
    /// Sources of the back edges into the header.
    pub tails: Vec<Value>,
}

impl Loop {
    pub fn contains(&self, block: Value) -> bool {
        self.body_set.contains(&block)
    }
}

/// Detect all natural loops of `func`, innermost first (ascending body
/// size). Loops sharing a header are merged: each back edge contributes
/// only the blocks reaching it, and analyzing such a subset alone would
/// miss stores on the other paths.
pub fn find_loops(m: &Module, func: Value, dom: &DominanceInfo) -> Vec<Loop> {
    let blocks = m.graph.operands(func);
    let mut loops: Vec<Loop> = Vec::new();

    for &tail in &blocks {
        for header in m.graph.successors(tail) {
            if !dom.dominates(header, tail) {
                continue;
            }
            let body_set = loop_body(m, header, tail);
            if let Some(pos) = loops.iter().position(|l| l.header == header) {
                let l = &mut loops[pos];
                l.body_set.extend(body_set.iter().copied());
                if !l.tails.contains(&tail) {
                    l.tails.push(tail);
                }
            } else {
                loops.push(Loop {
                    header,
                    body: Vec::new(),
                    body_set,
                    preheader: None,
                    tails: vec![tail],
                });
            }
        }
    }

    for l in &mut loops {
        l.body = blocks.iter().copied().filter(|b| l.body_set.contains(b)).collect();
        l.preheader = detect_preheader(m, l);
    }
    loops.sort_by_key(|l| l.body.len());
    loops
}

/// Blocks that reach `tail` without passing through `header`, plus both.
fn loop_body(m: &Module, header: Value, tail: Value) -> HashSet<Value> {
    let mut body = HashSet::new();
    body.insert(header);
    if header == tail {
        return body;
    }
    body.insert(tail);
    let mut worklist = vec![tail];
    while let Some(b) = worklist.pop() {
        for pred in m.graph.operands(b) {
            if body.insert(pred) {
                worklist.push(pred);
            }
        }
    }
    body
}

/// An existing pre-header: the unique out-of-loop predecessor of the
/// header, provided the header is its only successor.
fn detect_preheader(m: &Module, l: &Loop) -> Option<Value> {
    let mut outside: Vec<Value> = Vec::new();
    for p in m.graph.operands(l.header) {
        if !l.contains(p) && !outside.contains(&p) {
            outside.push(p);
        }
    }
    match outside.as_slice() {
        [p] if m.graph.successors(*p) == [l.header] => Some(*p),
        _ => None,
    }
}
