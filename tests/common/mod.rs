//! Shared helpers for the integration test suite: compile An source text
//! to LLVM IR and inspect the printed module. Diagnostic output is
//! suppressed so failing-path tests stay quiet.

use anyhow::Result;
use inkwell::context::Context;

use anc::compiler::Compiler;

/// Compiles `src` as a main unit and returns the module's textual IR.
#[allow(dead_code)]
pub fn gen_ir(src: &str) -> Result<String> {
    let _guard = anc::diagnostics::suppress();
    let context = Context::create();
    let mut unit = Compiler::from_source(&context, "test.an", src.to_string(), false)?;
    unit.compile();
    if unit.err_flag {
        anyhow::bail!("compilation reported errors");
    }
    Ok(unit.module.print_to_string().to_string())
}

/// Compiles `src` and reports whether the unit error flag was raised.
/// Parse failures count as errors too.
#[allow(dead_code)]
pub fn compile_has_errors(src: &str) -> bool {
    let _guard = anc::diagnostics::suppress();
    let context = Context::create();
    let mut unit = match Compiler::from_source(&context, "test.an", src.to_string(), false) {
        Ok(u) => u,
        Err(_) => return true,
    };
    unit.compile();
    unit.err_flag
}

/// Number of non-overlapping occurrences of `needle` in `hay`.
#[allow(dead_code)]
pub fn count_occurrences(hay: &str, needle: &str) -> usize {
    hay.matches(needle).count()
}
