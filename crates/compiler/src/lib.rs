//! Skald Compiler Library
//!
//! Provides compilation from `.sk` source to x86-64 assembly and linked
//! executables. The pipeline is strictly linear:
//!
//! 1. [`FileStore`] reads and preprocesses every source file (the implicit
//!    `basics` library first, then the entry file, then everything they
//!    `#include`).
//! 2. [`Frontend`] runs the two parser passes and produces the bytecode
//!    [`Chunk`] plus the declaration tables.
//! 3. [`TypeChecker`] symbolically executes the chunk.
//! 4. [`CodeGen`] lowers it to assembly text.
//! 5. The backend writes `output.s` and drives `as` and `gcc`.
//!
//! Each phase gates the next: frontend diagnostics skip the typechecker, a
//! type error skips codegen, and nothing is written on failure.
//!
//! ```rust,ignore
//! use skc::{CompilerConfig, build};
//!
//! let config = CompilerConfig::new(Path::new("examples/hello.sk"))?;
//! let artifact = build(&config)?;
//! ```

pub mod backend;
pub mod chunk;
pub mod codegen;
pub mod config;
pub mod debug;
pub mod decls;
pub mod diagnostics;
pub mod files;
pub mod intern;
pub mod parser;
pub mod scanner;
pub mod stdlib;
pub mod typechecker;

pub use chunk::{Chunk, DataType, Op, Value};
pub use codegen::{CodeGen, CodeGenError};
pub use config::{CompilerConfig, Manifest};
pub use diagnostics::{Diagnostic, Reporter};
pub use files::FileStore;
pub use intern::Interner;
pub use parser::Frontend;
pub use typechecker::TypeChecker;

use std::fmt;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Pipeline stages, used to pick the process exit code on failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Input,
    Frontend,
    Typecheck,
    Codegen,
    Output,
    Backend,
}

impl Stage {
    pub fn exit_code(self) -> i32 {
        match self {
            Stage::Input => 1,
            Stage::Frontend => 2,
            Stage::Typecheck => 3,
            Stage::Codegen => 4,
            Stage::Output => 5,
            Stage::Backend => 6,
        }
    }
}

#[derive(Debug)]
pub struct CompileError {
    pub stage: Stage,
    pub message: String,
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CompileError {}

impl CompileError {
    fn new(stage: Stage, message: impl Into<String>) -> Self {
        CompileError {
            stage,
            message: message.into(),
        }
    }
}

/// Wall-clock time spent per phase.
#[derive(Debug, Default, Clone, Copy)]
pub struct Timings {
    pub frontend: Duration,
    pub typecheck: Duration,
    pub codegen: Duration,
    pub write_out: Duration,
    pub backend: Duration,
}

/// Everything the core pipeline hands to the backend.
#[derive(Debug)]
pub struct Artifact {
    /// The complete assembly file text
    pub assembly: String,
    /// Libraries to link, `#clib` directives merged with the manifest list
    pub clibs: Vec<String>,
    /// Non-fatal findings (unused functions)
    pub warnings: Vec<String>,
    pub timings: Timings,
}

/// Run the core pipeline for the configured entry file: frontend,
/// typecheck and codegen. No files are written.
pub fn compile_entry(config: &CompilerConfig) -> Result<Artifact, CompileError> {
    let mut files = FileStore::new(&config.project_dir, &config.compiler_dir);
    files
        .include("basics")
        .map_err(|message| CompileError::new(Stage::Input, message))?;
    files
        .add_entry(&config.entry)
        .map_err(|message| CompileError::new(Stage::Input, message))?;

    let mut timings = Timings::default();

    let started = Instant::now();
    let mut reporter = Reporter::new();
    let mut frontend = Frontend::new(&mut files, &mut reporter);
    frontend.run();
    let (chunk, decls, interner, collected_clibs) = frontend.into_parts();
    timings.frontend = started.elapsed();
    if reporter.erred() {
        let message = reporter
            .diagnostics()
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("\n");
        return Err(CompileError::new(Stage::Frontend, message));
    }
    info!(
        phase = "frontend",
        files = files.len(),
        ops = chunk.len(),
        ms = timings.frontend.as_millis() as u64,
        "phase complete"
    );
    if config.debug {
        tracing::debug!(
            "intermediate representation:\n{}",
            debug::disassemble_chunk(&chunk, &decls, &interner)
        );
    }

    let started = Instant::now();
    TypeChecker::new(&chunk, &decls, &interner, &files)
        .check()
        .map_err(|diagnostic| CompileError::new(Stage::Typecheck, diagnostic.to_string()))?;
    timings.typecheck = started.elapsed();
    info!(
        phase = "typecheck",
        ms = timings.typecheck.as_millis() as u64,
        "phase complete"
    );

    codegen::check_host_support()
        .map_err(|error| CompileError::new(Stage::Codegen, error.to_string()))?;
    let started = Instant::now();
    let mut generator = CodeGen::new(&chunk, &decls, &interner);
    let assembly = generator
        .generate()
        .map_err(|error| CompileError::new(Stage::Codegen, error.to_string()))?;
    timings.codegen = started.elapsed();
    let warnings = generator.take_warnings();
    for warning in &warnings {
        warn!("{warning}");
    }
    info!(
        phase = "codegen",
        ms = timings.codegen.as_millis() as u64,
        "phase complete"
    );

    let mut clibs = config.clibs.clone();
    for lib in collected_clibs {
        if !clibs.contains(&lib) {
            clibs.push(lib);
        }
    }

    Ok(Artifact {
        assembly,
        clibs,
        warnings,
        timings,
    })
}

/// Full build: core pipeline, artifact write-out, assembler and linker.
pub fn build(config: &CompilerConfig) -> Result<Artifact, CompileError> {
    let mut artifact = compile_entry(config)?;

    let started = Instant::now();
    let paths = backend::output_paths(config);
    backend::write_assembly(&paths.assembly, &artifact.assembly)
        .map_err(|message| CompileError::new(Stage::Output, message))?;
    artifact.timings.write_out = started.elapsed();
    info!(artifact = %paths.assembly.display(), "assembly written");

    let started = Instant::now();
    backend::assemble_and_link(config, &artifact.clibs)
        .map_err(|message| CompileError::new(Stage::Backend, message))?;
    artifact.timings.backend = started.elapsed();
    info!(executable = %paths.executable.display(), "linked");

    Ok(artifact)
}

/// Compile an in-memory source to a chunk, without the implicit `basics`
/// library. The frontend's diagnostics are joined into the error string.
pub fn compile_source_to_chunk(
    source: &str,
) -> Result<(Chunk, decls::Declarations, Interner), String> {
    let mut files = FileStore::new(".", ".");
    files.add_virtual("<source>", source);
    let mut reporter = Reporter::new();
    let mut frontend = Frontend::new(&mut files, &mut reporter);
    frontend.run();
    let (chunk, decls, interner, _) = frontend.into_parts();
    if reporter.erred() {
        return Err(reporter
            .diagnostics()
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("\n"));
    }
    Ok((chunk, decls, interner))
}

/// Compile an in-memory source all the way to assembly text (for tests).
pub fn compile_source_to_asm(source: &str) -> Result<String, String> {
    let mut files = FileStore::new(".", ".");
    files.add_virtual("<source>", source);
    let mut reporter = Reporter::new();
    let mut frontend = Frontend::new(&mut files, &mut reporter);
    frontend.run();
    let (chunk, decls, interner, _) = frontend.into_parts();
    if reporter.erred() {
        return Err(reporter
            .diagnostics()
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("\n"));
    }
    TypeChecker::new(&chunk, &decls, &interner, &files)
        .check()
        .map_err(|diagnostic| diagnostic.to_string())?;
    CodeGen::new(&chunk, &decls, &interner)
        .generate()
        .map_err(|error| error.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::Path;
    use tempfile::tempdir;

    fn entry_config(dir: &Path, entry: &str) -> CompilerConfig {
        let mut config = CompilerConfig::new(&dir.join(entry)).unwrap();
        // Point the library lookup somewhere empty so the embedded basics
        // fallback is exercised
        config.compiler_dir = dir.to_path_buf();
        config
    }

    #[test]
    fn test_compile_entry_with_embedded_basics() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("main.sk"), "\"hi\\n\" puts\n").unwrap();
        let config = entry_config(dir.path(), "main.sk");
        let artifact = compile_entry(&config).unwrap();
        assert!(artifact.assembly.contains("syscall"));
        assert!(artifact.assembly.contains("str_0: .string \"hi\\n\""));
        assert!(artifact.warnings.is_empty());
    }

    #[test]
    fn test_missing_entry_is_input_error() {
        let dir = tempdir().unwrap();
        let config = entry_config(dir.path(), "absent.sk");
        let error = compile_entry(&config).unwrap_err();
        assert_eq!(error.stage, Stage::Input);
    }

    #[test]
    fn test_frontend_error_gates_pipeline() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("main.sk"), "frobnicate\n").unwrap();
        let config = entry_config(dir.path(), "main.sk");
        let error = compile_entry(&config).unwrap_err();
        assert_eq!(error.stage, Stage::Frontend);
        assert!(error.message.contains("unknown word"));
    }

    #[test]
    fn test_typecheck_error_gates_codegen() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("main.sk"), "1 2 +\n").unwrap();
        let config = entry_config(dir.path(), "main.sk");
        let error = compile_entry(&config).unwrap_err();
        assert_eq!(error.stage, Stage::Typecheck);
        assert!(error.message.contains("unhandled values on the stack"));
    }

    #[test]
    fn test_clibs_merge_manifest_and_directives() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("main.sk"), "#clib \"c\"\n").unwrap();
        let mut config = entry_config(dir.path(), "main.sk");
        config.clibs = vec!["m".to_string(), "c".to_string()];
        let artifact = compile_entry(&config).unwrap();
        assert_eq!(artifact.clibs, vec!["m".to_string(), "c".to_string()]);
    }

    #[test]
    fn test_unused_function_warning_surfaces() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("main.sk"), "fn lonely set 1 drop end\n").unwrap();
        let config = entry_config(dir.path(), "main.sk");
        let artifact = compile_entry(&config).unwrap();
        assert_eq!(artifact.warnings, vec!["unused function lonely".to_string()]);
    }

    #[test]
    fn test_compile_source_literal_print() {
        let asm = compile_source_to_asm("2 2 + print").unwrap();
        assert!(asm.contains("    call   dump"));
        assert!(asm.contains("    mov    $60, rax"));
    }

    #[test]
    fn test_compile_source_if_else_scenario() {
        let asm = compile_source_to_asm("if 5 3 > do 1 print else 0 print .").unwrap();
        assert!(asm.contains("    cmovg  rdx, rcx"));
        assert!(asm.contains("    jz     ip_"));
    }

    #[test]
    fn test_compile_source_loop_scenario() {
        let source = "memory i 8 end \
                      0 i !8 \
                      loop i @8 10 < do i @8 print i @8 1 + i !8 .";
        let asm = compile_source_to_asm(source).unwrap();
        assert!(asm.contains(".comm i, 8"));
        assert!(asm.contains("    call   dump"));
    }

    #[test]
    fn test_compile_source_duplicate_name() {
        let error =
            compile_source_to_asm("macro a set 1 end macro a set 2 end").unwrap_err();
        assert!(error.contains("word a already in use"));
    }

    #[test]
    fn test_macro_expansion_scenario() {
        let (chunk, _, _) =
            compile_source_to_chunk("macro inc2 set 1 + 1 + end 3 inc2 print").unwrap();
        let adds = chunk
            .code
            .iter()
            .filter(|i| matches!(i.op, Op::Add))
            .count();
        assert_eq!(adds, 2);
    }

    #[test]
    fn test_empty_source_exits_zero() {
        let asm = compile_source_to_asm("").unwrap();
        assert!(asm.contains("    mov    $60, rax\n    xor    rdi, rdi\n    syscall"));
    }
}
