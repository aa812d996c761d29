//! Chunk disassembly
//!
//! Human-readable dump of the intermediate bytecode, printed through the
//! `debug` log level when a build runs with `--debug`. One line per
//! instruction: ip, source line (or `|` when unchanged), op name and the
//! resolved operand.

use crate::chunk::{Chunk, Op, Value};
use crate::decls::Declarations;
use crate::intern::Interner;
use std::fmt::Write as _;

fn constant_repr(chunk: &Chunk, interner: &Interner, index: usize) -> String {
    match chunk.constants[index] {
        Value::Int(v) => v.to_string(),
        Value::Float(v) => v.to_string(),
        Value::Hex(id) => interner.resolve(id).to_string(),
        Value::Str(id) => format!("\"{}\"", interner.resolve(id)),
        Value::Ptr(id) => interner.resolve(id).to_string(),
    }
}

fn op_name(op: Op) -> &'static str {
    match op {
        Op::PushInt(_) => "PUSH_INT",
        Op::PushFloat(_) => "PUSH_FLOAT",
        Op::PushHex(_) => "PUSH_HEX",
        Op::PushStr(_) => "PUSH_STR",
        Op::PushPtr(_) => "PUSH_PTR",
        Op::Jump(_) => "JUMP",
        Op::JumpIfFalse(_) => "JUMP_IF_FALSE",
        Op::Loop(_) => "LOOP",
        Op::Add => "ADD",
        Op::Subtract => "SUBTRACT",
        Op::Multiply => "MULTIPLY",
        Op::Divide => "DIVIDE",
        Op::Modulo => "MODULO",
        Op::Inc => "INC",
        Op::Dec => "DEC",
        Op::Equal => "EQUAL",
        Op::NotEqual => "NOT_EQUAL",
        Op::Less => "LESS",
        Op::LessEqual => "LESS_EQUAL",
        Op::Greater => "GREATER",
        Op::GreaterEqual => "GREATER_EQUAL",
        Op::And => "AND",
        Op::Or => "OR",
        Op::Drop => "DROP",
        Op::Dup => "DUP",
        Op::Over => "OVER",
        Op::Swap => "SWAP",
        Op::Take => "TAKE",
        Op::Load8 => "LOAD8",
        Op::Save8 => "SAVE8",
        Op::DefinePtr { .. } => "DEFINE_PTR",
        Op::Print => "PRINT",
        Op::Sys0 => "SYS0",
        Op::Sys1 => "SYS1",
        Op::Sys2 => "SYS2",
        Op::Sys3 => "SYS3",
        Op::Sys4 => "SYS4",
        Op::Sys5 => "SYS5",
        Op::Sys6 => "SYS6",
        Op::DefineFunction(_) => "DEFINE_FUNCTION",
        Op::FunctionEnd(_) => "FUNCTION_END",
        Op::Call(_) => "CALL",
        Op::CallCFunc(_) => "CALL_CFUNC",
        Op::Return => "RETURN",
        Op::End => "END",
    }
}

/// Render one instruction. `show_line` suppresses the line column for
/// instructions sharing the previous instruction's line.
pub fn disassemble_instruction(
    chunk: &Chunk,
    decls: &Declarations,
    interner: &Interner,
    ip: usize,
    show_line: bool,
) -> String {
    let instruction = &chunk.code[ip];
    let line = if show_line {
        format!("{:4}", instruction.token.line)
    } else {
        "   |".to_string()
    };
    let operand = match instruction.op {
        Op::PushInt(c) | Op::PushFloat(c) | Op::PushHex(c) | Op::PushStr(c) | Op::PushPtr(c) => {
            constant_repr(chunk, interner, c)
        }
        Op::Jump(target) | Op::JumpIfFalse(target) | Op::Loop(target) => {
            format!("-> {target:04}")
        }
        Op::DefinePtr { name, size } => format!(
            "{}, {}",
            constant_repr(chunk, interner, name),
            constant_repr(chunk, interner, size)
        ),
        Op::DefineFunction(f) | Op::FunctionEnd(f) | Op::Call(f) => {
            interner.resolve(decls.functions[f].name).to_string()
        }
        Op::CallCFunc(f) => interner.resolve(decls.cfunctions[f].name).to_string(),
        _ => String::new(),
    };
    if operand.is_empty() {
        format!("{ip:04} {line} {}", op_name(instruction.op))
    } else {
        format!("{ip:04} {line} {:<16} {operand}", op_name(instruction.op))
    }
}

/// Render the whole chunk.
pub fn disassemble_chunk(chunk: &Chunk, decls: &Declarations, interner: &Interner) -> String {
    let mut out = String::new();
    let mut previous_line = None;
    for ip in 0..chunk.code.len() {
        let line = chunk.code[ip].token.line;
        let show_line = previous_line != Some(line);
        previous_line = Some(line);
        let _ = writeln!(
            out,
            "{}",
            disassemble_instruction(chunk, decls, interner, ip, show_line)
        );
    }
    out
}
