//! End-to-end builder scenarios: lower small programs through the public
//! API and snapshot the textual dump.

use minicc_ir::common::types::{make_func, make_int32, make_pointer, make_prim, PrimKind};
use minicc_ir::ir::verify::verify_module;
use minicc_ir::ir::{Linkage, Module};

/// `int f(int a, int b) { return a + b * 2; }`
#[test]
fn simple_ssa_arithmetic() {
    let mut m = Module::new();
    let fty = make_func(vec![make_int32(), make_int32()], make_int32(), false);
    let f = m.create_function(Linkage::External, "f", fty);
    let entry = m.create_block(f, None);
    m.set_insert_point(entry);
    let a = m.create_arg_ref(f, 0);
    let b = m.create_arg_ref(f, 1);
    let two = m.get_int32(2);
    let mul = m.create_mul(b, two);
    let add = m.create_add(a, mul);
    m.create_return(Some(add));

    verify_module(&m).unwrap();
    let expected = "\
define external i32(i32, i32) @f {
%0:
  %1 = mul i32 arg 1, constant i32 2
  %2 = add i32 arg 0, %1
  ret i32 %2
}
\n";
    assert_eq!(m.dump_to_string(), expected);
}

/// `int *p; char s; *p = s;` — the builder inserts the widening cast
/// before the store, never after.
#[test]
fn implicit_cast_on_store() {
    let mut m = Module::new();
    let fty = make_func(vec![], make_int32(), false);
    let f = m.create_function(Linkage::Internal, "g", fty);
    let entry = m.create_block(f, None);
    m.set_insert_point(entry);
    let p_slot = m.create_alloca(make_pointer(make_int32(), true));
    let s_slot = m.create_alloca(make_prim(PrimKind::Int8));
    let s = m.create_load(s_slot, false);
    let p = m.create_load(p_slot, false);
    m.create_store(s, p);
    let zero = m.get_int32(0);
    m.create_return(Some(zero));

    verify_module(&m).unwrap();
    let out = m.dump_to_string();
    let cast_line = out.lines().position(|l| l.contains("= cast i32")).unwrap();
    let store_line = out.lines().position(|l| l.trim().starts_with("store")).unwrap();
    assert!(cast_line < store_line, "cast must precede the store:\n{}", out);
    assert!(out.lines().filter(|l| l.contains("= cast")).count() == 1);
}

/// Two globals whose initial values are only known at startup produce a
/// `_$ctor` whose entry stores them and jumps to the returning exit block.
#[test]
fn global_ctor_sealing() {
    let mut m = Module::new();
    let one = m.get_int32(1);
    let g1 = m.create_global_var(Linkage::External, true, "g1", make_int32(), Some(one));
    let g2 = m.create_global_var(Linkage::External, true, "g2", make_int32(), None);
    let g3 = m.create_global_var(Linkage::External, true, "g3", make_int32(), None);
    m.enter_global_ctor(|m| {
        let v = m.create_load(g1, false);
        let two = m.get_int32(2);
        let d = m.create_mul(v, two);
        m.create_store(d, g2);
    });
    m.enter_global_ctor(|m| {
        let v = m.create_load(g2, false);
        m.create_store(v, g3);
    });

    let first = m.dump_to_string();
    verify_module(&m).unwrap();
    let second = m.dump_to_string();
    assert_eq!(first, second, "sealing must be idempotent");

    let expected = "\
@g1 = external global var i32*, constant i32 1

@g2 = external global var i32*

@g3 = external global var i32*

define global_ctor void() @_$ctor {
@entry:
  %0 = load i32, i32* @g1
  %1 = mul i32 %0, constant i32 2
  store i32 %1, i32* @g2
  %2 = load i32, i32* @g2
  store i32 %2, i32* @g3
  jump @exit
@exit: ; preds: @entry
  ret void
}
\n";
    assert_eq!(first, expected);
}

/// A cast to the value's own type is a no-op, not a new instruction.
#[test]
fn identity_cast_returns_input() {
    let mut m = Module::new();
    let fty = make_func(vec![make_int32()], make_int32(), false);
    let f = m.create_function(Linkage::External, "id", fty);
    let entry = m.create_block(f, None);
    m.set_insert_point(entry);
    let a = m.create_arg_ref(f, 0);
    assert_eq!(m.create_cast(a, &make_int32()), a);
    m.create_return(Some(a));
    assert_eq!(m.graph.block_data(entry).insts.len(), 1);
    verify_module(&m).unwrap();
}

/// A void function needs no explicit return instruction to be well formed
/// at build time; an empty body is left to the front end's judgment.
#[test]
fn void_function_without_trailing_return() {
    let mut m = Module::new();
    let fty = make_func(vec![], make_prim(PrimKind::Void), false);
    let f = m.create_function(Linkage::External, "empty", fty);
    let entry = m.create_block(f, None);
    m.set_insert_point(entry);
    m.create_return(None);
    verify_module(&m).unwrap();
    let out = m.dump_to_string();
    assert!(out.contains("ret void"), "{}", out);
}
