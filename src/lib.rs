//! anc — an ahead-of-time compiler for the An language.
//!
//! The crate is organized as a library with a thin CLI on top: `main.rs`
//! parses arguments into a [`CompileOptions`] and calls [`compile`], which
//! drives parsing, semantic analysis and lowering to LLVM IR, the fixed
//! optimization pipeline, and object emission / linking / JIT execution.

pub mod ast;
pub mod compiler;
pub mod diagnostics;
pub mod lexer;
pub mod linking;
pub mod parser;
pub mod types;

use anyhow::Result;
use inkwell::context::Context;
use inkwell::OptimizationLevel;

/// Compilation options, decoupled from CLI argument parsing.
#[derive(Debug, Clone)]
pub struct CompileOptions {
    /// Path to the `.an` source file to compile.
    pub src_file: String,
    /// Stop after emitting the object file.
    pub emit_object_only: bool,
    /// Print the module IR instead of producing artifacts.
    pub emit_ir: bool,
    /// Execute `main` in-process under the JIT instead of linking.
    pub run_jit: bool,
    /// Compile as a library unit (`init_<modname>` entry point).
    pub is_lib: bool,
    /// Override the output artifact name.
    pub out_name: Option<String>,
}

impl CompileOptions {
    pub fn new(src_file: String) -> Self {
        CompileOptions {
            src_file,
            emit_object_only: false,
            emit_ir: false,
            run_jit: false,
            is_lib: false,
            out_name: None,
        }
    }
}

/// Compiles one source unit per the options. Returns the path of the
/// produced artifact, if any.
pub fn compile(options: &CompileOptions) -> Result<Option<String>> {
    let context = Context::create();
    let mut unit = compiler::Compiler::new(&context, &options.src_file, options.is_lib)?;
    unit.compile();

    if options.emit_ir {
        unit.emit_ir();
        if unit.err_flag {
            anyhow::bail!("compilation aborted");
        }
        return Ok(None);
    }

    if unit.err_flag {
        anyhow::bail!("compilation aborted");
    }

    let tm = linking::host_target_machine()?;
    unit.module.set_triple(&tm.get_triple());
    unit.optimize(&tm)?;

    if options.run_jit {
        let engine = unit
            .module
            .create_jit_execution_engine(OptimizationLevel::None)
            .map_err(|e| anyhow::anyhow!("failed to create JIT engine: {}", e))?;
        unsafe {
            let main = engine
                .get_function::<unsafe extern "C" fn() -> i8>("main")
                .map_err(|e| anyhow::anyhow!("no main function to run: {}", e))?;
            main.call();
        }
        return Ok(None);
    }

    let mod_name = compiler::remove_file_ext(
        std::path::Path::new(&options.src_file)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(&options.src_file),
    );
    let obj_file = format!("{}.o", mod_name);
    linking::compile_to_object(&unit.module, &tm, &obj_file)?;

    if options.emit_object_only {
        return Ok(Some(obj_file));
    }

    let out = options.out_name.clone().unwrap_or(mod_name);
    linking::link_objects(std::slice::from_ref(&obj_file), &out)?;
    let _ = std::fs::remove_file(&obj_file);
    Ok(Some(out))
}
