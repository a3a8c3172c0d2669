//! Object emission and native linking.
//!
//! The final stages of compilation: a `TargetMachine` for the host triple
//! turns the optimized module into a relocatable object, and the host C
//! toolchain links it into an executable.

use anyhow::Result;
use inkwell::module::Module;
use inkwell::targets::{
    CodeModel, FileType, InitializationConfig, RelocMode, Target, TargetMachine,
};
use inkwell::OptimizationLevel;
use std::path::Path;
use std::process::Command;

/// Creates a target machine for the host, with aggressive codegen matching
/// the fixed optimization pipeline.
pub fn host_target_machine() -> Result<TargetMachine> {
    Target::initialize_native(&InitializationConfig::default())
        .map_err(|e| anyhow::anyhow!("failed to initialize LLVM target: {}", e))?;

    let triple = TargetMachine::get_default_triple();
    let target = Target::from_triple(&triple)
        .map_err(|e| anyhow::anyhow!("failed to resolve target triple: {}", e))?;

    target
        .create_target_machine(
            &triple,
            "",
            "",
            OptimizationLevel::Aggressive,
            RelocMode::Default,
            CodeModel::Default,
        )
        .ok_or_else(|| anyhow::anyhow!("failed to create a TargetMachine for the host"))
}

/// Writes the module to `out_obj` as a relocatable object file.
pub fn compile_to_object(module: &Module, tm: &TargetMachine, out_obj: &str) -> Result<()> {
    tm.write_to_file(module, FileType::Object, Path::new(out_obj))
        .map_err(|e| anyhow::anyhow!("failed to emit object file {}: {}", out_obj, e))
}

/// Links object files into an executable through the host `gcc`.
pub fn link_objects(inputs: &[String], out_exe: &str) -> Result<()> {
    let mut cmd = Command::new("gcc");
    cmd.args(inputs).arg("-o").arg(out_exe);
    let status = cmd.status().map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            anyhow::anyhow!("gcc not found in PATH; cannot link {}", out_exe)
        } else {
            anyhow::anyhow!("failed to run gcc: {}", e)
        }
    })?;
    if !status.success() {
        anyhow::bail!("gcc failed to link {}", out_exe);
    }
    Ok(())
}
