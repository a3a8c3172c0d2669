//! Expression lowering: literals, arithmetic, indexing, strings, heap
//! allocation.

mod common;

use common::{count_occurrences, gen_ir};

#[test]
fn constant_arithmetic_folds_into_store() {
    let ir = gen_ir("mut y = 3 + 4").unwrap();
    assert!(ir.contains("store i32 7"), "expected folded store, got:\n{}", ir);
}

#[test]
fn float_arithmetic_uses_double_by_default() {
    let ir = gen_ir("mut z = 1.5 * 2.0").unwrap();
    assert!(ir.contains("store double 3.000000e+00"), "got:\n{}", ir);
}

#[test]
fn while_loop_emits_cond_body_end_blocks() {
    let src = "mut n = 0\nwhile n < 10 do {\n n = n + 1\n}";
    let ir = gen_ir(src).unwrap();
    assert!(ir.contains("while_cond"), "got:\n{}", ir);
    assert!(ir.contains("end_while"), "got:\n{}", ir);
    assert!(ir.contains("icmp slt"), "got:\n{}", ir);
}

#[test]
fn unsigned_comparison_picks_unsigned_predicate() {
    let src = "mut n = 0u32\nwhile n < 10u32 do {\n n = n + 1u32\n}";
    let ir = gen_ir(src).unwrap();
    assert!(ir.contains("icmp ult"), "got:\n{}", ir);
}

#[test]
fn string_literal_materializes_str_record() {
    let src = "let s = \"hello\"\nmut l = 0\nl = s.len";
    let ir = gen_ir(src).unwrap();
    assert!(ir.contains("c\"hello\\00\""), "got:\n{}", ir);
    // The length field is the full 32-bit count.
    assert!(ir.contains("i32 5"), "got:\n{}", ir);
}

#[test]
fn array_literal_fills_stack_storage_and_indexes() {
    let src = "let xs = [1, 2, 3]\nmut x = 0\nx = xs#1";
    let ir = gen_ir(src).unwrap();
    assert!(ir.contains("alloca [3 x i32]"), "got:\n{}", ir);
    assert!(ir.contains("getelementptr"), "got:\n{}", ir);
}

#[test]
fn tuple_literal_is_a_constant_aggregate() {
    let src = "let t = (1, true)\nmut b = false\nb = t#1";
    let ir = gen_ir(src).unwrap();
    assert!(ir.contains("i1 true"), "got:\n{}", ir);
}

#[test]
fn new_allocates_and_scope_exit_frees_once() {
    let ir = gen_ir("let p = new 42").unwrap();
    assert!(ir.contains("call ptr @malloc(i32 4)"), "got:\n{}", ir);
    assert_eq!(
        count_occurrences(&ir, "call void @free"),
        1,
        "expected exactly one free call:\n{}",
        ir
    );
}

#[test]
fn deref_loads_through_the_pointer() {
    let src = "let p = new 42\nmut v = 0\nv = @p";
    let ir = gen_ir(src).unwrap();
    assert!(ir.contains("load i32, ptr"), "got:\n{}", ir);
}

#[test]
fn short_circuit_and_merges_with_phi() {
    let src = "let a = true\nlet b = false\nmut c = false\nc = a and b";
    let ir = gen_ir(src).unwrap();
    assert!(ir.contains("phi i1"), "got:\n{}", ir);
}

#[test]
fn mixed_width_operands_widen_to_the_larger() {
    let src = "fun wide (a i64) (b i32) -> i64 = a + b\nmut r = 0i64\nr = wide(1i64, 2)";
    let ir = gen_ir(src).unwrap();
    assert!(ir.contains("sext i32"), "got:\n{}", ir);
}
