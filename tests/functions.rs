//! Function compilation: declarations, lazy compilation on call, argument
//! conversion, lambdas, methods, overloads, and directives.

mod common;

use common::{compile_has_errors, gen_ir};

#[test]
fn declared_function_compiles_on_first_call() {
    let src = "fun f (x i32) (y i32) -> i32 = x + y\nmut r = 0\nr = f(2, 3)";
    let ir = gen_ir(src).unwrap();
    assert!(ir.contains("define i32 @f"), "got:\n{}", ir);
    assert!(ir.contains("call i32 @f(i32 2, i32 3)"), "got:\n{}", ir);
}

#[test]
fn unreferenced_declarations_stay_uncompiled() {
    let src = "fun unused (x i32) -> i32 = x\nmut y = 1";
    let ir = gen_ir(src).unwrap();
    assert!(!ir.contains("@unused"), "got:\n{}", ir);
}

#[test]
fn numeric_arguments_widen_to_the_parameter_type() {
    let src = "fun g (x i64) -> i64 = x\nmut r = 0i64\nr = g(3)";
    let ir = gen_ir(src).unwrap();
    assert!(ir.contains("call i64 @g(i64 3)"), "got:\n{}", ir);
}

#[test]
fn lambda_infers_its_return_type() {
    let src = "let sq = fun (x i32) = x * x\nmut n = 0\nn = sq(3)";
    let ir = gen_ir(src).unwrap();
    assert!(ir.contains("@__lambda__"), "got:\n{}", ir);
    assert!(ir.contains("mul i32"), "got:\n{}", ir);
}

#[test]
fn named_function_without_return_type_infers_too() {
    let src = "fun twice (x i32) = x + x\nmut n = 0\nn = twice(4)";
    let ir = gen_ir(src).unwrap();
    assert!(ir.contains("define i32 @twice"), "got:\n{}", ir);
}

#[test]
fn extension_block_methods_bind_to_the_receiver() {
    let src = "\
type Vec2 = x f32, y f32
ext Vec2 {
  fun norm2 (v Vec2) -> f32 = v.x * v.x + v.y * v.y
}
mut v = Vec2 {1.0f32, 2.0f32}
mut n = 0.0f32
n = v.norm2()";
    let ir = gen_ir(src).unwrap();
    assert!(ir.contains("define float @Vec2_norm2"), "got:\n{}", ir);
    assert!(ir.contains("call float @Vec2_norm2"), "got:\n{}", ir);
}

#[test]
fn method_resolution_prefers_the_first_arguments_type() {
    let src = "\
type Vec2 = x f32, y f32
ext Vec2 {
  fun norm2 (v Vec2) -> f32 = v.x * v.x + v.y * v.y
}
mut v = Vec2 {1.0f32, 2.0f32}
mut n = 0.0f32
n = norm2(v)";
    let ir = gen_ir(src).unwrap();
    assert!(ir.contains("call float @Vec2_norm2"), "got:\n{}", ir);
}

#[test]
fn operator_overload_lowers_to_the_mangled_function() {
    let src = "fun + (a Str) (b Str) -> Str = a\nlet s = \"x\" + \"y\"";
    let ir = gen_ir(src).unwrap();
    assert!(ir.contains("+_Str_Str"), "got:\n{}", ir);
}

#[test]
fn user_cast_function_is_found_by_mangled_name() {
    let src = "\
type Celsius = i32
fun Celsius_Cast (x f64) -> Celsius = Celsius 0
let c = Celsius 3.5";
    let ir = gen_ir(src).unwrap();
    assert!(ir.contains("Celsius_Cast_f64"), "got:\n{}", ir);
}

#[test]
fn structural_casts_reinterpret_nominal_aliases() {
    let src = "type Int = i32\nlet a = Int 3\nmut b = 0\nb = i32 a";
    assert!(gen_ir(src).is_ok());
}

#[test]
fn inline_directive_sets_the_attribute() {
    let src = "![inline]\nfun square (x i32) -> i32 = x * x\nmut n = 0\nn = square(2)";
    let ir = gen_ir(src).unwrap();
    assert!(ir.contains("alwaysinline"), "got:\n{}", ir);
}

#[test]
fn unknown_directive_is_rejected() {
    let src = "![frobnicate]\nfun f (x i32) -> i32 = x\nmut n = 0\nn = f(1)";
    assert!(compile_has_errors(src));
}

#[test]
fn record_field_update_and_read() {
    let src = "\
type Vec2 = x f32, y f32
mut v = Vec2 {1.0f32, 2.0f32}
v.x = 3.0f32
mut r = 0.0f32
r = v.x";
    let ir = gen_ir(src).unwrap();
    assert!(ir.contains("insertvalue"), "got:\n{}", ir);
    assert!(ir.contains("float 3.000000e+00"), "got:\n{}", ir);
}

#[test]
fn arity_mismatch_is_rejected() {
    let src = "fun f (x i32) -> i32 = x\nmut n = 0\nn = f(1, 2)";
    assert!(compile_has_errors(src));
}

#[test]
fn argument_type_mismatch_without_cast_is_rejected() {
    let src = "type Vec2 = x f32, y f32\nfun f (x i32) -> i32 = x\nmut v = Vec2 {1.0f32, 2.0f32}\nmut n = 0\nn = f(v)";
    assert!(compile_has_errors(src));
}
