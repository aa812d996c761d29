//! Whole-pipeline tests: source text in, chunk or assembly out.

use skc::{
    compile_entry, compile_source_to_asm, compile_source_to_chunk, CompilerConfig, Op, Stage,
};
use std::fs;
use std::path::Path;

fn config_for(dir: &Path, entry: &str) -> CompilerConfig {
    let mut config = CompilerConfig::new(&dir.join(entry)).unwrap();
    config.compiler_dir = dir.to_path_buf();
    config
}

fn ops(source: &str) -> Vec<Op> {
    let (chunk, _, _) = compile_source_to_chunk(source).unwrap();
    chunk.code.iter().map(|i| i.op).collect()
}

#[test]
fn test_literal_print_scenario() {
    let asm = compile_source_to_asm("2 2 + print").unwrap();
    assert!(asm.contains("    mov    $2, rax"));
    assert!(asm.contains("    add    rbx, rax"));
    assert!(asm.contains("    pop    rdi\n    call   dump"));
    // Program exits with status 0
    assert!(asm.contains("    mov    $60, rax\n    xor    rdi, rdi\n    syscall"));
}

#[test]
fn test_comparison_scenario() {
    let asm = compile_source_to_asm("2 2 == print").unwrap();
    assert!(asm.contains("    cmove  rdx, rcx"));
    assert!(asm.contains("    call   dump"));
}

#[test]
fn test_if_else_scenario_typechecks() {
    // Both branches leave the stack unchanged
    let asm = compile_source_to_asm("if 5 3 > do 1 print else 0 print .").unwrap();
    assert!(asm.contains("    cmovg  rdx, rcx"));
    assert!(asm.contains("    test   rax, rax"));
}

#[test]
fn test_loop_scenario() {
    let source = "memory i 8 end \
                  0 i !8 \
                  loop i @8 10 < do \
                    i @8 print \
                    i @8 1 + i !8 \
                  .";
    let asm = compile_source_to_asm(source).unwrap();
    assert!(asm.contains(".comm i, 8"));
    assert!(asm.contains("    jz     ip_"));
    // One back-edge
    assert_eq!(asm.matches("    /*    loop (ip_").count(), 1);
}

#[test]
fn test_macro_expansion_scenario() {
    let code = ops("macro inc2 set 1 + 1 + end 3 inc2 print");
    let inlined = ops("3 1 + 1 + print");
    assert_eq!(code, inlined);
    assert_eq!(
        code.iter().filter(|op| matches!(op, Op::Add)).count(),
        2
    );
}

#[test]
fn test_duplicate_name_scenario() {
    let error = compile_source_to_asm("macro a set 1 end macro a set 2 end").unwrap_err();
    assert!(error.contains("word a already in use"));
    assert!(error.contains("ERROR at 'a'"));
}

#[test]
fn test_empty_source_boundary() {
    let code = ops("");
    assert_eq!(code, vec![Op::End]);
}

#[test]
fn test_single_memory_boundary() {
    let (chunk, _, _) = compile_source_to_chunk("memory buf 64 end").unwrap();
    let defines = chunk
        .code
        .iter()
        .filter(|i| matches!(i.op, Op::DefinePtr { .. }))
        .count();
    assert_eq!(defines, 1);
    let asm = compile_source_to_asm("memory buf 64 end").unwrap();
    assert_eq!(asm.matches(".comm buf, 64").count(), 1);
}

#[test]
fn test_unused_function_boundary() {
    let asm = compile_source_to_asm("fn ghost set 1 drop end").unwrap();
    assert!(!asm.contains("ghost_start"));
}

#[test]
fn test_jump_targets_in_range() {
    let sources = [
        "if 1 1 == do 1 print .",
        "if 1 1 == do 1 print else 2 print .",
        "loop 1 2 == do 1 print .",
        "fn f set if 1 1 == do 1 print . end f",
    ];
    for source in sources {
        let (chunk, _, _) = compile_source_to_chunk(source).unwrap();
        for instruction in &chunk.code {
            if let Op::Jump(t) | Op::JumpIfFalse(t) | Op::Loop(t) = instruction.op {
                assert!(t <= chunk.code.len(), "target {t} out of range in {source}");
            }
        }
    }
}

#[test]
fn test_stack_imbalance_detected() {
    let error = compile_source_to_asm("1 2 3 + print").unwrap_err();
    assert!(error.contains("unhandled values on the stack"));
}

#[test]
fn test_error_format_has_location() {
    let error = compile_source_to_asm("\n  nonsense").unwrap_err();
    assert!(error.starts_with("<source>:2:3: ERROR at 'nonsense'"), "{error}");
}

#[test]
fn test_entry_and_includes_through_filesystem() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("math.sk"),
        "macro square set dup * end\n",
    )
    .unwrap();
    fs::write(
        dir.path().join("main.sk"),
        "#include \"math.sk\"\n7 square print\n",
    )
    .unwrap();

    let config = config_for(dir.path(), "main.sk");
    let artifact = compile_entry(&config).unwrap();
    assert!(artifact.assembly.contains("    mov    $7, rax"));
    assert!(artifact.assembly.contains("    mul    rbx"));
}

#[test]
fn test_basics_words_available_implicitly() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("main.sk"), "\"hello\\n\" puts 0 exit\n").unwrap();
    let config = config_for(dir.path(), "main.sk");
    let artifact = compile_entry(&config).unwrap();
    assert!(artifact.assembly.contains("str_0: .string \"hello\\n\""));
    assert!(artifact.assembly.contains("syscall"));
}

#[test]
fn test_clib_reaches_artifact() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("main.sk"), "#clib \"m\"\n").unwrap();
    let config = config_for(dir.path(), "main.sk");
    let artifact = compile_entry(&config).unwrap();
    assert_eq!(artifact.clibs, vec!["m".to_string()]);
}

#[test]
fn test_library_include_from_libs_dir() {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir(dir.path().join("libs")).unwrap();
    fs::write(
        dir.path().join("libs/io.sk"),
        "macro nl set \"\\n\" puts end\n",
    )
    .unwrap();
    fs::write(dir.path().join("main.sk"), "#include \"io\"\nnl\n").unwrap();
    let config = config_for(dir.path(), "main.sk");
    let artifact = compile_entry(&config).unwrap();
    assert!(artifact.assembly.contains("str_0: .string \"\\n\""));
}

#[test]
fn test_missing_include_is_frontend_error() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("main.sk"), "#include \"nope\"\n").unwrap();
    let config = config_for(dir.path(), "main.sk");
    let error = compile_entry(&config).unwrap_err();
    assert_eq!(error.stage, Stage::Frontend);
    assert!(error.message.contains("failed to find library"));
}

#[test]
fn test_function_end_to_end() {
    let asm = compile_source_to_asm(
        "fn add3 int int int -> int set + + end 1 2 3 add3 print",
    )
    .unwrap();
    assert!(asm.contains("add3_start:"));
    assert!(asm.contains("    call   add3_start"));
    assert!(asm.contains("    push   r10\n    ret"));
}

#[test]
fn test_function_body_cannot_see_later_memory() {
    // Memory regions are declared during emission, after function bodies,
    // so a body referencing one is an unknown word
    let source = "memory n 8 end \
                  fn again set n @8 print end \
                  again";
    let error = compile_source_to_asm(source).unwrap_err();
    assert!(error.contains("unknown word"));
}

#[test]
fn test_digit_separators_and_comments_end_to_end() {
    let plain = ops("1000000 print ; trailing comment\n");
    let separated = ops("1_000_000 print\n");
    assert_eq!(plain, separated);
}

#[test]
fn test_hex_literal_end_to_end() {
    let asm = compile_source_to_asm("0xFF drop").unwrap();
    assert!(asm.contains("    mov    $0xFF, rax"));
}

/// Compile a demo program against the on-disk library tree.
fn compile_demo(name: &str) -> skc::Artifact {
    let manifest_dir = Path::new(env!("CARGO_MANIFEST_DIR"));
    let entry = manifest_dir.join("..").join("..").join("demos").join(name);
    let mut config = CompilerConfig::new(&entry).unwrap();
    config.compiler_dir = manifest_dir.to_path_buf();
    compile_entry(&config).unwrap()
}

#[test]
fn test_hello_demo_compiles() {
    let artifact = compile_demo("hello.sk");
    assert!(artifact
        .assembly
        .contains("str_0: .string \"Hello, World!\\n\""));
    assert!(artifact.warnings.is_empty());
}

#[test]
fn test_count_demo_compiles() {
    let artifact = compile_demo("count.sk");
    assert!(artifact.assembly.contains(".comm i, 8"));
    assert!(artifact.assembly.contains("    call   dump"));
}

#[test]
fn test_functions_demo_compiles() {
    let artifact = compile_demo("functions.sk");
    assert!(artifact.assembly.contains("double_start:"));
    assert!(artifact.assembly.contains("clamp_digit_start:"));
    assert!(artifact.warnings.is_empty());
}

#[test]
fn test_io_library_resolves_from_disk() {
    let manifest_dir = Path::new(env!("CARGO_MANIFEST_DIR"));
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("main.sk"), "#include \"io\"\nnl\n").unwrap();
    let mut config = CompilerConfig::new(&dir.path().join("main.sk")).unwrap();
    config.compiler_dir = manifest_dir.to_path_buf();
    let artifact = compile_entry(&config).unwrap();
    assert!(artifact.assembly.contains("str_0: .string \"\\n\""));
}
