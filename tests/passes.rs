//! Pass-pipeline scenarios: loop-invariant code motion behavior and
//! fixed-point properties of the pass manager.

use minicc_ir::common::types::{make_func, make_int32, make_pointer, make_void, Type};
use minicc_ir::ir::verify::verify_module;
use minicc_ir::ir::{Linkage, Module};
use minicc_ir::passes::{register_all_passes, PassManager};

fn int_ptr() -> Type {
    make_pointer(make_int32(), true)
}

fn opt2() -> PassManager {
    // RUST_LOG=debug surfaces the per-sweep pass trace when debugging.
    let _ = env_logger::builder().is_test(true).try_init();
    let mut pm = PassManager::new(2);
    register_all_passes(&mut pm);
    pm
}

/// `void f(int *a, int n) { for (i = 0; i < n; i++) a[i] = x * y + c; }`
/// with `x`, `y`, `c` loop-invariant locals: the loads, the multiply, and
/// the add move to the pre-header; the loop keeps the access, the store,
/// and the induction update.
#[test]
fn licm_hoists_invariant_expression() {
    let mut m = Module::new();
    let fty = make_func(vec![int_ptr(), make_int32()], make_void(), false);
    let f = m.create_function(Linkage::External, "f", fty);
    let a = m.create_arg_ref(f, 0);
    let n = m.create_arg_ref(f, 1);

    let entry = m.create_block(f, Some("entry"));
    let header = m.create_block(f, Some("header"));
    let body = m.create_block(f, Some("body"));
    let exit = m.create_block(f, Some("exit"));

    m.set_insert_point(entry);
    let i_slot = m.create_alloca(make_int32());
    let x_slot = m.create_alloca(make_int32());
    let y_slot = m.create_alloca(make_int32());
    let c_slot = m.create_alloca(make_int32());
    let zero = m.get_int32(0);
    m.create_store(zero, i_slot);
    let c7 = m.get_int32(7);
    m.create_store(c7, x_slot);
    let c9 = m.get_int32(9);
    m.create_store(c9, y_slot);
    let c3 = m.get_int32(3);
    m.create_store(c3, c_slot);
    m.create_jump(header);

    m.set_insert_point(header);
    let iv = m.create_load(i_slot, false);
    let cmp = m.create_less(iv, n);
    m.create_branch(cmp, body, exit);

    m.set_insert_point(body);
    let x = m.create_load(x_slot, false);
    let y = m.create_load(y_slot, false);
    let mul = m.create_mul(x, y);
    let c = m.create_load(c_slot, false);
    let add = m.create_add(mul, c);
    let i2 = m.create_load(i_slot, false);
    let elem = m.create_ptr_access(a, i2);
    m.create_store(add, elem);
    let i3 = m.create_load(i_slot, false);
    let one = m.get_int32(1);
    let inc = m.create_add(i3, one);
    m.create_store(inc, i_slot);
    m.create_jump(header);

    m.set_insert_point(exit);
    m.create_return(None);

    verify_module(&m).unwrap();
    let mut pm = opt2();
    m.run_passes(&mut pm);
    verify_module(&m).unwrap();

    let entry_insts = &m.graph.block_data(entry).insts;
    for hoisted in [x, y, mul, c, add] {
        assert!(entry_insts.contains(&hoisted), "expected hoist into pre-header");
    }
    let body_insts = &m.graph.block_data(body).insts;
    assert!(!body_insts.contains(&mul) && !body_insts.contains(&add));
    // The loop body keeps the address computation and the memory traffic.
    for stays in [i2, elem, i3, inc] {
        assert!(body_insts.contains(&stays), "induction work must stay in the loop");
    }
}

/// `for (i = 0; i < n; i++) { *p = i; t = *q; }` with `p` and `q` both
/// pointer parameters: the store through `p` poisons every pointer
/// argument, so the load through `q` must not move.
#[test]
fn licm_store_set_blocks_argument_load() {
    let mut m = Module::new();
    let fty = make_func(vec![int_ptr(), int_ptr(), make_int32()], make_void(), false);
    let f = m.create_function(Linkage::External, "f", fty);
    let p = m.create_arg_ref(f, 0);
    let q = m.create_arg_ref(f, 1);
    let n = m.create_arg_ref(f, 2);

    let entry = m.create_block(f, Some("entry"));
    let header = m.create_block(f, Some("header"));
    let body = m.create_block(f, Some("body"));
    let exit = m.create_block(f, Some("exit"));

    m.set_insert_point(entry);
    let i_slot = m.create_alloca(make_int32());
    let t_slot = m.create_alloca(make_int32());
    let zero = m.get_int32(0);
    m.create_store(zero, i_slot);
    m.create_jump(header);

    m.set_insert_point(header);
    let iv = m.create_load(i_slot, false);
    let cmp = m.create_less(iv, n);
    m.create_branch(cmp, body, exit);

    m.set_insert_point(body);
    let i2 = m.create_load(i_slot, false);
    m.create_store(i2, p);
    let t = m.create_load(q, false);
    m.create_store(t, t_slot);
    let i3 = m.create_load(i_slot, false);
    let one = m.get_int32(1);
    let inc = m.create_add(i3, one);
    m.create_store(inc, i_slot);
    m.create_jump(header);

    m.set_insert_point(exit);
    m.create_return(None);

    verify_module(&m).unwrap();
    let mut pm = opt2();
    m.run_passes(&mut pm);
    verify_module(&m).unwrap();

    let body_insts = &m.graph.block_data(body).insts;
    assert!(body_insts.contains(&t), "load through aliased argument must not be hoisted");
    assert!(!m.graph.block_data(entry).insts.contains(&t));
}

/// A function without loops converges on the first sweep and the IR is
/// untouched.
#[test]
fn no_loops_means_no_changes() {
    let mut m = Module::new();
    let fty = make_func(vec![make_int32()], make_int32(), false);
    let f = m.create_function(Linkage::External, "f", fty);
    let a = m.create_arg_ref(f, 0);
    let entry = m.create_block(f, None);
    m.set_insert_point(entry);
    let doubled = m.create_add(a, a);
    m.create_return(Some(doubled));

    let before = m.dump_to_string();
    let mut pm = opt2();
    m.run_passes(&mut pm);
    assert_eq!(m.dump_to_string(), before);
}

/// An invariant buried in an inner loop whose pre-header sits inside an
/// outer loop ends up in the outermost pre-header, and a second pipeline
/// run changes nothing.
#[test]
fn licm_promotes_through_nested_loops() {
    let mut m = Module::new();
    let fty = make_func(vec![make_int32()], make_void(), false);
    let f = m.create_function(Linkage::External, "f", fty);
    let n = m.create_arg_ref(f, 0);

    let entry = m.create_block(f, Some("entry"));
    let oheader = m.create_block(f, Some("oheader"));
    let obody = m.create_block(f, Some("obody"));
    let iheader = m.create_block(f, Some("iheader"));
    let ibody = m.create_block(f, Some("ibody"));
    let olatch = m.create_block(f, Some("olatch"));
    let exit = m.create_block(f, Some("exit"));

    m.set_insert_point(entry);
    let j_slot = m.create_alloca(make_int32());
    let i_slot = m.create_alloca(make_int32());
    let s_slot = m.create_alloca(make_int32());
    let x_slot = m.create_alloca(make_int32());
    let y_slot = m.create_alloca(make_int32());
    let zero = m.get_int32(0);
    m.create_store(zero, j_slot);
    m.create_store(zero, s_slot);
    let c5 = m.get_int32(5);
    m.create_store(c5, x_slot);
    let c6 = m.get_int32(6);
    m.create_store(c6, y_slot);
    m.create_jump(oheader);

    m.set_insert_point(oheader);
    let jv = m.create_load(j_slot, false);
    let ocmp = m.create_less(jv, n);
    m.create_branch(ocmp, obody, exit);

    m.set_insert_point(obody);
    m.create_store(zero, i_slot);
    m.create_jump(iheader);

    m.set_insert_point(iheader);
    let iv = m.create_load(i_slot, false);
    let icmp = m.create_less(iv, n);
    m.create_branch(icmp, ibody, olatch);

    m.set_insert_point(ibody);
    let x = m.create_load(x_slot, false);
    let y = m.create_load(y_slot, false);
    let mul = m.create_mul(x, y);
    let s = m.create_load(s_slot, false);
    let sum = m.create_add(s, mul);
    m.create_store(sum, s_slot);
    let i2 = m.create_load(i_slot, false);
    let one = m.get_int32(1);
    let iinc = m.create_add(i2, one);
    m.create_store(iinc, i_slot);
    m.create_jump(iheader);

    m.set_insert_point(olatch);
    let j2 = m.create_load(j_slot, false);
    let one2 = m.get_int32(1);
    let jinc = m.create_add(j2, one2);
    m.create_store(jinc, j_slot);
    m.create_jump(oheader);

    m.set_insert_point(exit);
    m.create_return(None);

    verify_module(&m).unwrap();
    let mut pm = opt2();
    m.run_passes(&mut pm);
    verify_module(&m).unwrap();

    // x, y, and x*y escape both loops into the function entry.
    let entry_insts = &m.graph.block_data(entry).insts;
    for hoisted in [x, y, mul] {
        assert!(entry_insts.contains(&hoisted), "invariant must reach the outer pre-header");
    }
    // The summation depends on memory written in the loop and stays put.
    assert!(m.graph.block_data(ibody).insts.contains(&sum));

    // Running the pipeline again reports convergence without edits.
    let settled = m.dump_to_string();
    let mut pm2 = opt2();
    m.run_passes(&mut pm2);
    assert_eq!(m.dump_to_string(), settled);
}

/// Identical input IR yields identical output IR.
#[test]
fn run_passes_is_deterministic() {
    fn build() -> (Module, String) {
        let mut m = Module::new();
        let fty = make_func(vec![int_ptr(), make_int32()], make_void(), false);
        let f = m.create_function(Linkage::External, "f", fty);
        let a = m.create_arg_ref(f, 0);
        let n = m.create_arg_ref(f, 1);
        let entry = m.create_block(f, None);
        let header = m.create_block(f, None);
        let body = m.create_block(f, None);
        let exit = m.create_block(f, None);
        m.set_insert_point(entry);
        let i_slot = m.create_alloca(make_int32());
        let zero = m.get_int32(0);
        m.create_store(zero, i_slot);
        m.create_jump(header);
        m.set_insert_point(header);
        let iv = m.create_load(i_slot, false);
        let cmp = m.create_less(iv, n);
        m.create_branch(cmp, body, exit);
        m.set_insert_point(body);
        let four = m.get_int32(4);
        let scaled = m.create_mul(n, four);
        let i2 = m.create_load(i_slot, false);
        let elem = m.create_ptr_access(a, i2);
        m.create_store(scaled, elem);
        let one = m.get_int32(1);
        let inc = m.create_add(i2, one);
        m.create_store(inc, i_slot);
        m.create_jump(header);
        m.set_insert_point(exit);
        m.create_return(None);

        let mut pm = opt2();
        m.run_passes(&mut pm);
        let out = m.dump_to_string();
        (m, out)
    }

    let (_, first) = build();
    let (_, second) = build();
    assert_eq!(first, second);
}
