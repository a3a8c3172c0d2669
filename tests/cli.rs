//! End-to-end checks of the `anc` binary itself.

use assert_cmd::Command;
use predicates::prelude::*;

#[test]
fn emit_ir_prints_the_lowered_module() {
    let dir = tempfile::tempdir().unwrap();
    let src = dir.path().join("hello.an");
    std::fs::write(&src, "mut x = 1 + 2\n").unwrap();

    Command::cargo_bin("anc")
        .unwrap()
        .arg(src.to_str().unwrap())
        .arg("--emit-ir")
        .assert()
        .success()
        .stderr(predicate::str::contains("store i32 3"));
}

#[test]
fn syntax_errors_abort_with_a_diagnostic() {
    let dir = tempfile::tempdir().unwrap();
    let src = dir.path().join("bad.an");
    std::fs::write(&src, "let = 3\n").unwrap();

    Command::cargo_bin("anc")
        .unwrap()
        .arg(src.to_str().unwrap())
        .arg("--emit-ir")
        .assert()
        .failure()
        .stderr(predicate::str::contains("error"));
}

#[test]
fn type_errors_suppress_artifact_emission() {
    let dir = tempfile::tempdir().unwrap();
    let src = dir.path().join("badty.an");
    std::fs::write(&src, "let x = 1\nx = 2\n").unwrap();

    Command::cargo_bin("anc")
        .unwrap()
        .current_dir(dir.path())
        .arg(src.to_str().unwrap())
        .arg("--emit-obj")
        .assert()
        .failure();
    assert!(!dir.path().join("badty.o").exists());
}
