//! Scope discipline: freeable release on every exit path, redeclaration
//! checks, and mutability errors.

mod common;

use common::{compile_has_errors, count_occurrences, gen_ir};

#[test]
fn freeable_local_released_on_fall_through() {
    let ir = gen_ir("let p = new 42").unwrap();
    assert_eq!(count_occurrences(&ir, "call void @free"), 1, "got:\n{}", ir);
}

#[test]
fn inner_scope_release_precedes_outer() {
    let src = "\
let a = new 1
{
  let b = new 2
}
let c = new 3";
    let ir = gen_ir(src).unwrap();
    assert_eq!(count_occurrences(&ir, "call void @free"), 3, "got:\n{}", ir);
}

#[test]
fn early_return_and_fall_through_each_release_once() {
    let src = "\
fun h (c bool) -> i32 = {
  let p = new 1
  if c then {
    return 7
  }
  2
}
mut r = 0
r = h(true)";
    let ir = gen_ir(src).unwrap();
    // One release on the return path, one on the fall-through path; the
    // paths are disjoint so each dynamic execution frees exactly once.
    assert_eq!(count_occurrences(&ir, "call void @free"), 2, "got:\n{}", ir);
}

#[test]
fn scope_depth_balances_across_compilation() {
    let _guard = anc::diagnostics::suppress();
    let context = inkwell::context::Context::create();
    let src = "fun f (x i32) -> i32 = { let y = x\n y }\nmut r = 0\nr = f(1)";
    let mut unit =
        anc::compiler::Compiler::from_source(&context, "test.an", src.to_string(), false).unwrap();
    assert_eq!(unit.scope, 1);
    unit.compile();
    assert!(!unit.err_flag);
    assert_eq!(unit.scope, 0);
}

#[test]
fn mut_redeclaration_in_same_scope_is_rejected() {
    assert!(compile_has_errors("mut x = 1\nmut x = 2"));
}

#[test]
fn shadowing_in_an_inner_scope_is_allowed() {
    assert!(gen_ir("mut x = 1\n{\n mut x = 2\n}").is_ok());
}

#[test]
fn assignment_to_immutable_binding_is_rejected() {
    assert!(compile_has_errors("let x = 1\nx = 2"));
}

#[test]
fn undeclared_name_is_rejected() {
    assert!(compile_has_errors("let y = nope"));
}

#[test]
fn if_branch_type_disagreement_is_rejected() {
    assert!(compile_has_errors("let v = if true then 1 else 2.5"));
}

#[test]
fn explicit_binding_type_mismatch_is_rejected() {
    assert!(compile_has_errors("let x: bool = 3"));
}

#[test]
fn if_without_else_is_unit_typed() {
    let src = "mut x = 0\nif true then {\n x = 1\n}";
    let ir = gen_ir(src).unwrap();
    assert!(ir.contains("endif"), "got:\n{}", ir);
}

#[test]
fn for_loops_are_reported_unimplemented() {
    assert!(compile_has_errors("for i in 10 do i"));
}
