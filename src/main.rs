//! Command-line driver for the anc compiler.
//!
//! `anc file.an` builds a native executable through the host toolchain;
//! `--emit-obj` stops at the object file, `--emit-ir` prints the lowered
//! module, and `--run` executes `main` in-process under the JIT.

use anyhow::Result;
use clap::Parser;
use colored::Colorize;

#[derive(Parser)]
#[command(name = "anc", about = "Compiler for the An language", version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// Path to the .an source file to compile
    src: String,

    /// Emit the object file only and skip linking
    #[arg(long = "emit-obj")]
    emit_obj: bool,

    /// Print the lowered LLVM IR instead of producing artifacts
    #[arg(long = "emit-ir")]
    emit_ir: bool,

    /// Run the program in-process under the JIT instead of linking
    #[arg(long = "run", short = 'r')]
    run: bool,

    /// Compile as a library unit (entry point init_<modname>)
    #[arg(long = "lib")]
    lib: bool,

    /// Override the output artifact name
    #[arg(short = 'o', long = "out")]
    out: Option<String>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut options = anc::CompileOptions::new(cli.src);
    options.emit_object_only = cli.emit_obj;
    options.emit_ir = cli.emit_ir;
    options.run_jit = cli.run;
    options.is_lib = cli.lib;
    options.out_name = cli.out;

    match anc::compile(&options)? {
        Some(artifact) => {
            eprintln!("{} {}", "Finished".green().bold(), artifact);
        }
        None => {}
    }
    Ok(())
}
