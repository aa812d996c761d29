//! Backend tool invocation
//!
//! Writes the assembly artifact and drives the system assembler and
//! linker: `as <out>.s -o <out>.o`, then `gcc -L. <out>.o -o <out>` with
//! one `-l<name>` per collected C library. With `clean` set the
//! intermediates are removed after a successful link.

use crate::config::CompilerConfig;
use std::path::{Path, PathBuf};
use std::process::Command;

#[derive(Debug)]
pub struct OutputPaths {
    pub assembly: PathBuf,
    pub object: PathBuf,
    pub executable: PathBuf,
}

pub fn output_paths(config: &CompilerConfig) -> OutputPaths {
    OutputPaths {
        assembly: config.out.with_extension("s"),
        object: config.out.with_extension("o"),
        executable: config.out.clone(),
    }
}

pub fn write_assembly(path: &Path, assembly: &str) -> Result<(), String> {
    std::fs::write(path, assembly).map_err(|e| format!("could not write {}: {e}", path.display()))
}

fn run_tool(mut command: Command, what: &str) -> Result<(), String> {
    let output = command
        .output()
        .map_err(|e| format!("failed to run {what}: {e}"))?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(format!("{what} failed:\n{stderr}"));
    }
    Ok(())
}

/// Assemble and link the written artifact into an executable.
pub fn assemble_and_link(config: &CompilerConfig, clibs: &[String]) -> Result<(), String> {
    let paths = output_paths(config);

    let mut assembler = Command::new("as");
    assembler
        .arg(&paths.assembly)
        .arg("-o")
        .arg(&paths.object);
    run_tool(assembler, "the assembler")?;

    let mut linker = Command::new("gcc");
    linker
        .arg("-L.")
        .arg(&paths.object)
        .arg("-o")
        .arg(&paths.executable);
    if config.debug {
        linker.arg("-g");
    }
    for lib in clibs {
        linker.arg(format!("-l{lib}"));
    }
    run_tool(linker, "the linker")?;

    if config.clean {
        std::fs::remove_file(&paths.assembly).ok();
        std::fs::remove_file(&paths.object).ok();
    }
    Ok(())
}

/// Run the linked executable, removing it afterwards when `clean` is set.
/// Returns the child's exit code.
pub fn run_executable(config: &CompilerConfig) -> Result<i32, String> {
    let paths = output_paths(config);
    let program = if paths.executable.is_absolute() {
        paths.executable.clone()
    } else {
        Path::new(".").join(&paths.executable)
    };
    let status = Command::new(&program)
        .status()
        .map_err(|e| format!("failed to run {}: {e}", program.display()))?;
    if config.clean {
        std::fs::remove_file(&paths.executable).ok();
    }
    Ok(status.code().unwrap_or(-1))
}
