//! Driver-level behavior: the declaration scan, imports, optimization, and
//! object emission.

mod common;

use anyhow::Result;
use inkwell::context::Context;

use anc::compiler::Compiler;
use anc::linking;

#[test]
fn declaration_scan_is_idempotent() {
    let _guard = anc::diagnostics::suppress();
    let context = Context::create();
    let src = "\
fun a (x i32) -> i32 = x
type P = x i32, y i32
fun b (x i32) -> i32 = x
mut m = 1
m = 2";
    let mut unit = Compiler::from_source(&context, "scan.an", src.to_string(), false).unwrap();
    unit.scan_all_decls();
    assert_eq!(unit.ast.len(), 2, "only the two statements should remain");
    unit.scan_all_decls();
    assert_eq!(unit.ast.len(), 2, "a second scan must be a no-op");
}

#[test]
fn import_merges_declarations_into_the_importer() -> Result<()> {
    let _guard = anc::diagnostics::suppress();
    let dir = tempfile::tempdir()?;
    let util = dir.path().join("util.an");
    std::fs::write(&util, "fun triple (x i32) -> i32 = x * 3\n")?;

    let src = format!(
        "import \"{}\"\nmut r = 0\nr = triple(5)",
        util.to_string_lossy()
    );
    let context = Context::create();
    let mut unit = Compiler::from_source(&context, "main.an", src, false)?;
    unit.compile();
    assert!(!unit.err_flag);
    let ir = unit.module.print_to_string().to_string();
    assert!(ir.contains("call i32 @triple"), "got:\n{}", ir);
    Ok(())
}

#[test]
fn library_units_get_an_init_entry_point() -> Result<()> {
    let _guard = anc::diagnostics::suppress();
    let context = Context::create();
    let mut unit = Compiler::from_source(&context, "mylib.an", "mut x = 1".to_string(), true)?;
    unit.compile();
    assert!(!unit.err_flag);
    let ir = unit.module.print_to_string().to_string();
    assert!(ir.contains("define i8 @init_mylib"), "got:\n{}", ir);
    Ok(())
}

#[test]
fn optimization_pipeline_promotes_stack_slots() -> Result<()> {
    let _guard = anc::diagnostics::suppress();
    let context = Context::create();
    let src = "mut x = 1\nx = x + 2";
    let mut unit = Compiler::from_source(&context, "opt.an", src.to_string(), false)?;
    unit.compile();
    assert!(!unit.err_flag);

    let tm = linking::host_target_machine()?;
    unit.module.set_triple(&tm.get_triple());
    unit.optimize(&tm)?;
    let ir = unit.module.print_to_string().to_string();
    assert!(!ir.contains("alloca"), "mem2reg should drop the slot:\n{}", ir);
    Ok(())
}

#[test]
fn object_emission_writes_a_nonempty_file() -> Result<()> {
    let _guard = anc::diagnostics::suppress();
    let dir = tempfile::tempdir()?;
    let context = Context::create();
    let mut unit = Compiler::from_source(&context, "obj.an", "mut x = 1 + 2".to_string(), false)?;
    unit.compile();
    assert!(!unit.err_flag);

    let tm = linking::host_target_machine()?;
    unit.module.set_triple(&tm.get_triple());
    let obj = dir.path().join("obj.o");
    linking::compile_to_object(&unit.module, &tm, &obj.to_string_lossy())?;
    let meta = std::fs::metadata(&obj)?;
    assert!(meta.len() > 0);
    Ok(())
}

#[test]
fn errors_keep_walking_and_set_the_flag() {
    let _guard = anc::diagnostics::suppress();
    let context = Context::create();
    // Two independent errors; the flag must be set and compilation must
    // not abort on the first.
    let src = "let a = nope1\nlet b = nope2";
    let mut unit = Compiler::from_source(&context, "errs.an", src.to_string(), false).unwrap();
    unit.compile();
    assert!(unit.err_flag);
}
