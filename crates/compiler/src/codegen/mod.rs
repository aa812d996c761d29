//! x86-64 assembly generation
//!
//! Lowers the chunk to AT&T-syntax (`noprefix`) System V assembly text.
//! Values live on the machine stack; every op is a short register shuffle
//! between `pop`s and `push`es. Each instruction gets an `ip_N` label so
//! jump operands translate directly, and a `/*    line N    */` comment is
//! emitted whenever the source line changes.
//!
//! Four pools are filled while walking the chunk:
//! - `text`: the instruction stream under `main`
//! - `strs`: string constants, one `str_N: .string` label each
//! - `flts`: float constants as `float_N: .single` labels
//! - `mems`: one `.comm` directive per memory region
//!
//! Uncalled functions are warned about and their whole body range is
//! skipped, so they never reach the output.

mod error;
mod runtime;

pub use error::CodeGenError;
pub use runtime::DUMP_ROUTINE;

use crate::chunk::{Chunk, DataType, Op, Value};
use crate::decls::Declarations;
use crate::intern::Interner;
use std::fmt::Write as _;

/// Refuse to generate for anything but the supported target.
pub fn check_host_support() -> Result<(), CodeGenError> {
    let os = std::env::consts::OS;
    let arch = std::env::consts::ARCH;
    if os == "linux" && arch == "x86_64" {
        Ok(())
    } else {
        Err(CodeGenError::Logic(format!(
            "this Operating System is not supported at this moment ({os}/{arch})"
        )))
    }
}

/// Turn a source-level name into a valid assembly label. The identifier
/// alphabet only adds `-`, which labels cannot carry.
fn mangle_label(name: &str) -> String {
    name.replace('-', "_")
}

/// Byte count of a string body once `\n`/`\t` escapes collapse.
fn unescaped_len(body: &str) -> usize {
    let bytes = body.as_bytes();
    let mut len = 0;
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' && i + 1 < bytes.len() && matches!(bytes[i + 1], b'n' | b't') {
            i += 2;
        } else {
            i += 1;
        }
        len += 1;
    }
    len
}

fn constant_int(chunk: &Chunk, index: usize) -> Result<i64, CodeGenError> {
    match chunk.constants[index] {
        Value::Int(v) => Ok(v),
        other => Err(CodeGenError::Logic(format!(
            "expected Int constant at pool index {index}, found {other:?}"
        ))),
    }
}

fn constant_float(chunk: &Chunk, index: usize) -> Result<f64, CodeGenError> {
    match chunk.constants[index] {
        Value::Float(v) => Ok(v),
        other => Err(CodeGenError::Logic(format!(
            "expected Float constant at pool index {index}, found {other:?}"
        ))),
    }
}

fn constant_text<'a>(
    chunk: &Chunk,
    interner: &'a Interner,
    index: usize,
) -> Result<&'a str, CodeGenError> {
    match chunk.constants[index] {
        Value::Str(id) | Value::Hex(id) | Value::Ptr(id) => Ok(interner.resolve(id)),
        other => Err(CodeGenError::Logic(format!(
            "expected text constant at pool index {index}, found {other:?}"
        ))),
    }
}

fn comparison(text: &mut String, mnemonic: &str, cmov: &str) -> Result<(), CodeGenError> {
    writeln!(text, "    /*    {mnemonic}    */")?;
    writeln!(text, "    xor    rcx, rcx")?;
    writeln!(text, "    mov    $1,  rdx")?;
    writeln!(text, "    pop    rbx")?;
    writeln!(text, "    pop    rax")?;
    writeln!(text, "    cmp    rbx, rax")?;
    writeln!(text, "    {cmov} rdx, rcx")?;
    writeln!(text, "    push   rcx")?;
    Ok(())
}

/// Syscall number in `rax`, then argument registers in kernel ABI order.
fn syscall(text: &mut String, arity: usize) -> Result<(), CodeGenError> {
    const REGS: [&str; 6] = ["rdi", "rsi", "rdx", "r10", "r8", "r9"];
    writeln!(text, "    /*    __sys_call{arity}    */")?;
    writeln!(text, "    pop    rax")?;
    for reg in REGS.iter().take(arity) {
        writeln!(text, "    pop    {reg}")?;
    }
    writeln!(text, "    syscall")?;
    writeln!(text, "    push   rax")?;
    Ok(())
}

pub struct CodeGen<'a> {
    chunk: &'a Chunk,
    decls: &'a Declarations,
    interner: &'a Interner,
    text: String,
    strs: Vec<String>,
    flts: Vec<String>,
    mems: Vec<String>,
    warnings: Vec<String>,
}

impl<'a> CodeGen<'a> {
    pub fn new(chunk: &'a Chunk, decls: &'a Declarations, interner: &'a Interner) -> Self {
        CodeGen {
            chunk,
            decls,
            interner,
            text: String::new(),
            strs: Vec::new(),
            flts: Vec::new(),
            mems: Vec::new(),
            warnings: Vec::new(),
        }
    }

    /// Warnings collected while lowering (currently only unused functions).
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    pub fn take_warnings(&mut self) -> Vec<String> {
        std::mem::take(&mut self.warnings)
    }

    /// Lower the whole chunk and return the assembly artifact.
    pub fn generate(&mut self) -> Result<String, CodeGenError> {
        self.lower()?;
        Ok(self.assemble()?)
    }

    fn lower(&mut self) -> Result<(), CodeGenError> {
        let mut last_line: Option<u32> = None;
        let mut ip = 0;
        while ip < self.chunk.code.len() {
            if let Op::DefineFunction(index) = self.chunk.code[ip].op {
                let function = &self.decls.functions[index];
                if !function.called {
                    let name = self.interner.resolve(function.name);
                    self.warnings.push(format!("unused function {name}"));
                    ip = function.end_ip + 1;
                    continue;
                }
            }
            let op = self.chunk.code[ip].op;
            let line = self.chunk.code[ip].token.line;
            if last_line != Some(line) {
                writeln!(self.text, "/*    line {line}    */")?;
                last_line = Some(line);
            }
            writeln!(self.text, "ip_{ip}:")?;
            self.lower_op(op)?;
            ip += 1;
        }
        Ok(())
    }

    fn lower_op(&mut self, op: Op) -> Result<(), CodeGenError> {
        let chunk = self.chunk;
        let decls = self.decls;
        let interner = self.interner;
        let text = &mut self.text;
        match op {
            // Constants
            Op::PushInt(constant) => {
                let value = constant_int(chunk, constant)?;
                writeln!(text, "    /*    {value}    */")?;
                writeln!(text, "    mov    ${value}, rax")?;
                writeln!(text, "    push   rax")?;
            }
            Op::PushStr(constant) => {
                let body = constant_text(chunk, interner, constant)?;
                let len = unescaped_len(body);
                let label = self.strs.len();
                writeln!(text, "    /*    len: {len} str: str_{label}    */")?;
                writeln!(text, "    mov    ${len}, rax")?;
                writeln!(text, "    push   rax")?;
                writeln!(text, "    lea    str_{label}(rip), rax")?;
                writeln!(text, "    push   rax")?;
                self.strs.push(body.to_string());
            }
            Op::PushFloat(constant) => {
                let value = constant_float(chunk, constant)?;
                let label = self.flts.len();
                writeln!(text, "    /*    {value}    */")?;
                writeln!(text, "    movss  float_{label}(rip), xmm0")?;
                self.flts.push(format!("float_{label}: .single {value}"));
            }
            Op::PushHex(constant) => {
                let lexeme = constant_text(chunk, interner, constant)?;
                writeln!(text, "    /*    {lexeme}    */")?;
                writeln!(text, "    mov    ${lexeme}, rax")?;
                writeln!(text, "    push   rax")?;
            }
            Op::PushPtr(constant) => {
                let name = mangle_label(constant_text(chunk, interner, constant)?);
                writeln!(text, "    /*    memory: {name}    */")?;
                writeln!(text, "    lea    {name}(rip), rax")?;
                writeln!(text, "    push   rax")?;
            }

            // Control flow
            Op::Jump(target) => {
                writeln!(text, "    /*    else (ip_{target})    */")?;
                writeln!(text, "    jmp    ip_{target}")?;
            }
            Op::JumpIfFalse(target) => {
                writeln!(text, "    /*    do (ip_{target})    */")?;
                writeln!(text, "    pop    rax")?;
                writeln!(text, "    test   rax, rax")?;
                writeln!(text, "    jz     ip_{target}")?;
            }
            Op::Loop(target) => {
                writeln!(text, "    /*    loop (ip_{target})    */")?;
                writeln!(text, "    jmp    ip_{target}")?;
            }

            // Arithmetic
            Op::Add => {
                writeln!(text, "    /*    +    */")?;
                writeln!(text, "    pop    rax")?;
                writeln!(text, "    pop    rbx")?;
                writeln!(text, "    add    rbx, rax")?;
                writeln!(text, "    push   rax")?;
            }
            Op::Subtract => {
                writeln!(text, "    /*    -    */")?;
                writeln!(text, "    pop    rax")?;
                writeln!(text, "    pop    rbx")?;
                writeln!(text, "    sub    rax, rbx")?;
                writeln!(text, "    push   rbx")?;
            }
            Op::Multiply => {
                writeln!(text, "    /*    *    */")?;
                writeln!(text, "    pop    rax")?;
                writeln!(text, "    pop    rbx")?;
                writeln!(text, "    mul    rbx")?;
                writeln!(text, "    push   rax")?;
            }
            Op::Divide => {
                writeln!(text, "    /*    divmod    */")?;
                writeln!(text, "    xor    rdx, rdx")?;
                writeln!(text, "    pop    rbx")?;
                writeln!(text, "    pop    rax")?;
                writeln!(text, "    div    rbx")?;
                writeln!(text, "    push   rdx")?;
                writeln!(text, "    push   rax")?;
            }
            Op::Modulo => {
                writeln!(text, "    /*    %    */")?;
                writeln!(text, "    xor    rdx, rdx")?;
                writeln!(text, "    pop    rbx")?;
                writeln!(text, "    pop    rax")?;
                writeln!(text, "    div    rbx")?;
                writeln!(text, "    push   rdx")?;
            }
            Op::Inc => {
                writeln!(text, "    /*    inc    */")?;
                writeln!(text, "    pop    rax")?;
                writeln!(text, "    inc    rax")?;
                writeln!(text, "    push   rax")?;
            }
            Op::Dec => {
                writeln!(text, "    /*    dec    */")?;
                writeln!(text, "    pop    rax")?;
                writeln!(text, "    dec    rax")?;
                writeln!(text, "    push   rax")?;
            }

            // Comparison
            Op::Equal => comparison(text, "==", "cmove ")?,
            Op::NotEqual => comparison(text, "!=", "cmovne")?,
            Op::Less => comparison(text, "<", "cmovl ")?,
            Op::LessEqual => comparison(text, "<=", "cmovle")?,
            Op::Greater => comparison(text, ">", "cmovg ")?,
            Op::GreaterEqual => comparison(text, ">=", "cmovge")?,

            // Logic over 0/1 comparison results
            Op::And => {
                writeln!(text, "    /*    and    */")?;
                writeln!(text, "    pop    rax")?;
                writeln!(text, "    pop    rbx")?;
                writeln!(text, "    and    rbx, rax")?;
                writeln!(text, "    push   rax")?;
            }
            Op::Or => {
                writeln!(text, "    /*    or    */")?;
                writeln!(text, "    pop    rax")?;
                writeln!(text, "    pop    rbx")?;
                writeln!(text, "    or     rbx, rax")?;
                writeln!(text, "    push   rax")?;
            }

            // Stack manipulation
            Op::Drop => {
                writeln!(text, "    /*    drop    */")?;
                writeln!(text, "    pop    rax")?;
            }
            Op::Dup => {
                writeln!(text, "    /*    dup    */")?;
                writeln!(text, "    pop    rax")?;
                writeln!(text, "    push   rax")?;
                writeln!(text, "    push   rax")?;
            }
            Op::Over => {
                writeln!(text, "    /*    over    */")?;
                writeln!(text, "    pop    rax")?;
                writeln!(text, "    pop    rbx")?;
                writeln!(text, "    push   rbx")?;
                writeln!(text, "    push   rax")?;
                writeln!(text, "    push   rbx")?;
            }
            Op::Swap => {
                writeln!(text, "    /*    swap    */")?;
                writeln!(text, "    pop    rax")?;
                writeln!(text, "    pop    rbx")?;
                writeln!(text, "    push   rax")?;
                writeln!(text, "    push   rbx")?;
            }
            Op::Take => {
                writeln!(text, "    /*    take    */")?;
                writeln!(text, "    pop    rax")?;
                writeln!(text, "    push   rax")?;
            }

            // Memory
            Op::Load8 => {
                writeln!(text, "    /*    @8    */")?;
                writeln!(text, "    pop    rax")?;
                writeln!(text, "    xor    rbx, rbx")?;
                writeln!(text, "    mov    (rax), bl")?;
                writeln!(text, "    push   rbx")?;
            }
            Op::Save8 => {
                // Pointer on top, value beneath
                writeln!(text, "    /*    !8    */")?;
                writeln!(text, "    pop    rax")?;
                writeln!(text, "    pop    rbx")?;
                writeln!(text, "    mov    bl, (rax)")?;
            }
            Op::DefinePtr { name, size } => {
                let label = mangle_label(constant_text(chunk, interner, name)?);
                let bytes = constant_int(chunk, size)?;
                self.mems.push(format!(".comm {label}, {bytes}"));
            }

            Op::Print => {
                writeln!(text, "    /*    print    */")?;
                writeln!(text, "    pop    rdi")?;
                writeln!(text, "    call   dump")?;
            }

            Op::Sys0 => syscall(text, 0)?,
            Op::Sys1 => syscall(text, 1)?,
            Op::Sys2 => syscall(text, 2)?,
            Op::Sys3 => syscall(text, 3)?,
            Op::Sys4 => syscall(text, 4)?,
            Op::Sys5 => syscall(text, 5)?,
            Op::Sys6 => syscall(text, 6)?,

            // Functions
            Op::DefineFunction(index) => {
                let name = mangle_label(interner.resolve(decls.functions[index].name));
                writeln!(text, "    /*    define: {name}    */")?;
                writeln!(text, "    jmp    {name}_end")?;
                writeln!(text, "{name}_start:")?;
                writeln!(text, "    pop    r10")?;
            }
            Op::FunctionEnd(index) => {
                let function = &decls.functions[index];
                let name = mangle_label(interner.resolve(function.name));
                writeln!(text, "    /*    end of: {name}    */")?;
                writeln!(text, "{name}_end:")?;
                if function.ret != DataType::Null {
                    writeln!(text, "    pop    rax")?;
                    writeln!(text, "    push   rax")?;
                }
            }
            Op::Call(index) => {
                let name = mangle_label(interner.resolve(decls.functions[index].name));
                writeln!(text, "    /*    call: {name}    */")?;
                writeln!(text, "    call   {name}_start")?;
            }
            Op::CallCFunc(index) => {
                const REGS: [&str; 6] = ["rdi", "rsi", "rdx", "rcx", "r8", "r9"];
                let cfunction = &decls.cfunctions[index];
                let name = interner.resolve(cfunction.cname);
                if cfunction.args.len() > REGS.len() {
                    return Err(CodeGenError::Logic(format!(
                        "C-function {name} takes more than {} arguments",
                        REGS.len()
                    )));
                }
                writeln!(text, "    /*    {name}    */")?;
                for position in (0..cfunction.args.len()).rev() {
                    if cfunction.args[position] != DataType::Float {
                        writeln!(text, "    pop    {}", REGS[position])?;
                    }
                }
                writeln!(text, "    call   {name}")?;
                if cfunction.ret != DataType::Null {
                    writeln!(text, "    push   rax")?;
                }
            }
            Op::Return => {
                writeln!(text, "    /*    return    */")?;
                writeln!(text, "    push   r10")?;
                writeln!(text, "    ret")?;
            }

            Op::End => {
                writeln!(text, "    /*    EOF    */")?;
                writeln!(text, "    mov    $60, rax")?;
                writeln!(text, "    xor    rdi, rdi")?;
                writeln!(text, "    syscall")?;
            }
        }
        Ok(())
    }
}
