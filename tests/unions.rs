//! Tagged unions: construction, enum values, and `match` lowering.

mod common;

use common::{compile_has_errors, gen_ir};

#[test]
fn tag_construction_builds_tag_payload_pair() {
    let src = "type Opt = | Some i32 | None\nlet o = Some 5";
    let ir = gen_ir(src).unwrap();
    assert!(ir.contains("{ i8, i32 }"), "got:\n{}", ir);
}

#[test]
fn match_dispatches_on_the_discriminant() {
    let src = "\
type Opt = | Some i32 | None
let o = Some 5
let r = match o with
| Some n -> n
| None -> 0";
    let ir = gen_ir(src).unwrap();
    assert!(ir.contains("switch i8"), "got:\n{}", ir);
    assert!(ir.contains("phi i32"), "got:\n{}", ir);
    assert!(ir.contains("extractvalue { i8, i32 }"), "got:\n{}", ir);
}

#[test]
fn wildcard_pattern_becomes_the_default_destination() {
    let src = "\
type Opt = | Some i32 | None
let o = Some 5
let r = match o with
| Some n -> n
| other -> 1";
    let ir = gen_ir(src).unwrap();
    assert!(ir.contains("switch i8"), "got:\n{}", ir);
}

#[test]
fn payloadless_union_collapses_to_a_tag_byte() {
    let src = "type Color = | Red | Green | Blue\nlet c = Green";
    let ir = gen_ir(src).unwrap();
    assert!(ir.contains("store i8 1"), "got:\n{}", ir);
}

#[test]
fn matching_a_payloadless_union_switches_on_the_value() {
    let src = "\
type Color = | Red | Green | Blue
let c = Blue
let r = match c with
| Red -> 0
| Green -> 1
| Blue -> 2";
    let ir = gen_ir(src).unwrap();
    assert!(ir.contains("switch i8"), "got:\n{}", ir);
}

#[test]
fn pattern_tag_from_another_union_is_rejected() {
    let src = "\
type A = | X i32 | Y
type B = | Z i32 | W
let a = X 1
let r = match a with
| Z n -> n
| Y -> 0";
    assert!(compile_has_errors(src));
}

#[test]
fn matching_a_non_union_is_rejected() {
    let src = "let x = 3\nlet r = match x with\n| y -> y";
    assert!(compile_has_errors(src));
}

#[test]
fn union_annotation_resolves_nominally() {
    let src = "type Opt = | Some i32 | None\nlet o: Opt = Some 5";
    assert!(gen_ir(src).is_ok());
}
