//! Stack typechecking
//!
//! A symbolic executor over the chunk. It never follows jumps; instructions
//! are visited in emission order, which covers every path exactly once:
//! function bodies first, then top-level code. The machine state is a stack
//! of [`DataType`]s plus two auxiliary stacks, one of block-entry depths
//! (for `if`/`loop` balance) and one of saved stacks (for function bodies,
//! which typecheck against their own signature frame).
//!
//! The first violation is fatal to the phase and reported with the source
//! token of the offending instruction.

use crate::chunk::{Chunk, DataType, Op, Value};
use crate::decls::Declarations;
use crate::diagnostics::Diagnostic;
use crate::files::FileStore;
use crate::intern::Interner;
use crate::scanner::{Token, TokenKind};

struct Frame {
    saved: Vec<DataType>,
    function: usize,
}

pub struct TypeChecker<'a> {
    chunk: &'a Chunk,
    decls: &'a Declarations,
    interner: &'a Interner,
    files: &'a FileStore,
    stack: Vec<DataType>,
    /// Stack depth recorded at each open `JumpIfFalse`
    blocks: Vec<usize>,
    frames: Vec<Frame>,
}

fn is_numeric(dt: DataType) -> bool {
    matches!(dt, DataType::Int | DataType::Ptr)
}

impl<'a> TypeChecker<'a> {
    pub fn new(
        chunk: &'a Chunk,
        decls: &'a Declarations,
        interner: &'a Interner,
        files: &'a FileStore,
    ) -> Self {
        TypeChecker {
            chunk,
            decls,
            interner,
            files,
            stack: Vec::new(),
            blocks: Vec::new(),
            frames: Vec::new(),
        }
    }

    fn error(&self, token: &Token, message: impl Into<String>) -> Diagnostic {
        let file = if token.line == 0 {
            String::new()
        } else {
            self.files.display_name(token.file).to_string()
        };
        Diagnostic {
            file,
            line: token.line,
            column: token.column,
            lexeme: token.lexeme.clone(),
            at_eof: token.kind == TokenKind::Eof,
            while_lexing: false,
            message: message.into(),
        }
    }

    fn need(&self, count: usize, token: &Token) -> Result<(), Diagnostic> {
        if self.stack.len() < count {
            return Err(self.error(
                token,
                format!(
                    "Not enough arguments to do this operation. Expected {count} but got {}",
                    self.stack.len()
                ),
            ));
        }
        Ok(())
    }

    fn pop(&mut self) -> DataType {
        self.stack.pop().unwrap_or(DataType::Null)
    }

    fn residual_types(&self) -> String {
        self.stack
            .iter()
            .map(|dt| format!("[ {} ]", dt.name()))
            .collect()
    }

    /// Run the symbolic execution over the whole chunk.
    pub fn check(&mut self) -> Result<(), Diagnostic> {
        let chunk = self.chunk;
        for instruction in &chunk.code {
            let token = &instruction.token;
            match instruction.op {
                Op::PushInt(_) => self.stack.push(DataType::Int),
                Op::PushFloat(_) => self.stack.push(DataType::Float),
                Op::PushHex(_) => self.stack.push(DataType::Hex),
                Op::PushPtr(_) => self.stack.push(DataType::Ptr),
                Op::PushStr(_) => {
                    // Strings occupy two slots: length under pointer
                    self.stack.push(DataType::Int);
                    self.stack.push(DataType::Str);
                }

                Op::Add | Op::Subtract => {
                    self.need(2, token)?;
                    let a = self.pop();
                    let b = self.pop();
                    if !is_numeric(a) || !is_numeric(b) {
                        return Err(self.error(
                            token,
                            format!(
                                "arithmetic operations require 2 Int arguments but got {} and {}",
                                b.name(),
                                a.name()
                            ),
                        ));
                    }
                    if a == DataType::Ptr || b == DataType::Ptr {
                        self.stack.push(DataType::Ptr);
                    } else {
                        self.stack.push(DataType::Int);
                    }
                }
                Op::Multiply | Op::Modulo => {
                    self.need(2, token)?;
                    let a = self.pop();
                    let b = self.pop();
                    if a != DataType::Int || b != DataType::Int {
                        return Err(self.error(
                            token,
                            format!(
                                "arithmetic operations require 2 Int arguments but got {} and {}",
                                b.name(),
                                a.name()
                            ),
                        ));
                    }
                    self.stack.push(DataType::Int);
                }
                Op::Divide => {
                    self.need(2, token)?;
                    let a = self.pop();
                    let b = self.pop();
                    if a != DataType::Int || b != DataType::Int {
                        return Err(self.error(
                            token,
                            format!(
                                "arithmetic operations require 2 Int arguments but got {} and {}",
                                b.name(),
                                a.name()
                            ),
                        ));
                    }
                    // Remainder under quotient
                    self.stack.push(DataType::Int);
                    self.stack.push(DataType::Int);
                }
                Op::Inc | Op::Dec => {
                    self.need(1, token)?;
                    let a = self.pop();
                    if a != DataType::Int {
                        return Err(self.error(
                            token,
                            format!(
                                "increment and decrement operations require 1 Int argument but got {}",
                                a.name()
                            ),
                        ));
                    }
                    self.stack.push(DataType::Int);
                }

                Op::Equal
                | Op::NotEqual
                | Op::Less
                | Op::LessEqual
                | Op::Greater
                | Op::GreaterEqual => {
                    self.need(2, token)?;
                    let a = self.pop();
                    let b = self.pop();
                    let a_ok = matches!(a, DataType::Int | DataType::Bool);
                    let b_ok = matches!(b, DataType::Int | DataType::Bool | DataType::Ptr);
                    if !a_ok || !b_ok {
                        return Err(self.error(
                            token,
                            format!(
                                "comparison operations require 2 Int arguments but got {} and {}",
                                b.name(),
                                a.name()
                            ),
                        ));
                    }
                    self.stack.push(DataType::Bool);
                }
                Op::And | Op::Or => {
                    self.need(2, token)?;
                    let a = self.pop();
                    let b = self.pop();
                    if a != DataType::Bool || b != DataType::Bool {
                        return Err(self.error(
                            token,
                            format!(
                                "logic operations require 2 Bool arguments but got {} and {}",
                                b.name(),
                                a.name()
                            ),
                        ));
                    }
                    self.stack.push(DataType::Bool);
                }

                Op::Drop => {
                    self.need(1, token)?;
                    self.pop();
                }
                Op::Dup => {
                    self.need(1, token)?;
                    let a = self.pop();
                    self.stack.push(a);
                    self.stack.push(a);
                }
                Op::Over => {
                    self.need(2, token)?;
                    let a = self.pop();
                    let b = self.pop();
                    self.stack.push(b);
                    self.stack.push(a);
                    self.stack.push(b);
                }
                Op::Swap => {
                    self.need(2, token)?;
                    let a = self.pop();
                    let b = self.pop();
                    self.stack.push(a);
                    self.stack.push(b);
                }
                Op::Take => {
                    self.need(1, token)?;
                    let a = self.pop();
                    self.stack.push(a);
                }

                Op::Load8 => {
                    self.need(1, token)?;
                    let a = self.pop();
                    if a != DataType::Ptr {
                        return Err(self.error(
                            token,
                            format!("load operation requires a Ptr argument but got {}", a.name()),
                        ));
                    }
                    self.stack.push(DataType::Int);
                }
                Op::Save8 => {
                    self.need(2, token)?;
                    let target = self.pop();
                    let _value = self.pop();
                    if target != DataType::Ptr {
                        return Err(self.error(
                            token,
                            format!(
                                "save operation requires a Ptr on top of the stack but got {}",
                                target.name()
                            ),
                        ));
                    }
                }
                Op::DefinePtr { name, size } => {
                    let name_ok = matches!(self.chunk.constants[name], Value::Ptr(_));
                    let size_ok = matches!(self.chunk.constants[size], Value::Int(_));
                    if !name_ok || !size_ok {
                        return Err(
                            self.error(token, "memory definition has malformed constants")
                        );
                    }
                }

                Op::Print => {
                    self.need(1, token)?;
                    let a = self.pop();
                    if a != DataType::Int && a != DataType::Bool {
                        return Err(self.error(
                            token,
                            format!("print operation requires an Int argument but got {}", a.name()),
                        ));
                    }
                }

                Op::Sys0
                | Op::Sys1
                | Op::Sys2
                | Op::Sys3
                | Op::Sys4
                | Op::Sys5
                | Op::Sys6 => {
                    let arity = match instruction.op {
                        Op::Sys0 => 1,
                        Op::Sys1 => 2,
                        Op::Sys2 => 3,
                        Op::Sys3 => 4,
                        Op::Sys4 => 5,
                        Op::Sys5 => 6,
                        _ => 7,
                    };
                    if self.stack.len() < arity {
                        return Err(self.error(
                            token,
                            format!(
                                "insufficient arguments in order to make a system call. \
                                 Expected {arity}, got {}",
                                self.stack.len()
                            ),
                        ));
                    }
                    for _ in 0..arity {
                        self.pop();
                    }
                    self.stack.push(DataType::Int);
                }

                Op::JumpIfFalse(_) => {
                    self.need(1, token)?;
                    let a = self.pop();
                    if a != DataType::Bool {
                        return Err(self.error(
                            token,
                            format!(
                                "control flow operations require 1 Bool argument but got {}",
                                a.name()
                            ),
                        ));
                    }
                    self.blocks.push(self.stack.len());
                }
                Op::Jump(_) | Op::Loop(_) => {
                    if let Some(depth) = self.blocks.pop() {
                        if self.stack.len() != depth {
                            return Err(self.error(
                                token,
                                "control flow operations cannot make stack size modifications",
                            ));
                        }
                    }
                }

                Op::DefineFunction(index) => {
                    let saved = std::mem::take(&mut self.stack);
                    self.stack = self.decls.functions[index].args.clone();
                    self.frames.push(Frame {
                        saved,
                        function: index,
                    });
                }
                Op::Return => {
                    let Some(frame) = self.frames.last() else {
                        return Err(self.error(token, "return outside of a function body"));
                    };
                    let function = &self.decls.functions[frame.function];
                    let name = self.interner.resolve(function.name);
                    let expected: Vec<DataType> = match function.ret {
                        DataType::Null => Vec::new(),
                        ret => vec![ret],
                    };
                    if self.stack != expected {
                        return Err(self.error(
                            token,
                            format!(
                                "function {name} signature mismatch: must leave {} on the stack, found {}",
                                if expected.is_empty() {
                                    "nothing".to_string()
                                } else {
                                    expected[0].name().to_string()
                                },
                                if self.stack.is_empty() {
                                    "nothing".to_string()
                                } else {
                                    self.residual_types()
                                }
                            ),
                        ));
                    }
                }
                Op::FunctionEnd(_) => {
                    if let Some(frame) = self.frames.pop() {
                        self.stack = frame.saved;
                    }
                }
                Op::Call(index) => {
                    let function = &self.decls.functions[index];
                    let name = self.interner.resolve(function.name);
                    if self.stack.len() < function.args.len() {
                        return Err(self.error(
                            token,
                            format!(
                                "Not enough arguments to call {name}. Expected {} but got {}",
                                function.args.len(),
                                self.stack.len()
                            ),
                        ));
                    }
                    for position in (0..function.args.len()).rev() {
                        let got = self.pop();
                        let expected = function.args[position];
                        if got != expected {
                            return Err(self.error(
                                token,
                                format!(
                                    "argument {} of {name} is a different type. \
                                     Expected {}, but got {}",
                                    position + 1,
                                    expected.name(),
                                    got.name()
                                ),
                            ));
                        }
                    }
                    if function.ret != DataType::Null {
                        self.stack.push(function.ret);
                    }
                }
                Op::CallCFunc(index) => {
                    let cfunction = &self.decls.cfunctions[index];
                    let name = self.interner.resolve(cfunction.name);
                    if self.stack.len() < cfunction.args.len() {
                        return Err(self.error(
                            token,
                            format!(
                                "Not enough arguments to call {name}. Expected {} but got {}",
                                cfunction.args.len(),
                                self.stack.len()
                            ),
                        ));
                    }
                    for position in (0..cfunction.args.len()).rev() {
                        let got = self.pop();
                        let expected = cfunction.args[position];
                        if got != expected {
                            return Err(self.error(
                                token,
                                format!(
                                    "argument {} of {name} is a different type. \
                                     Expected {}, but got {}",
                                    position + 1,
                                    expected.name(),
                                    got.name()
                                ),
                            ));
                        }
                    }
                    if cfunction.ret != DataType::Null {
                        self.stack.push(cfunction.ret);
                    }
                }

                Op::End => {
                    if !self.stack.is_empty() {
                        return Err(self.error(
                            token,
                            format!(
                                "unhandled values on the stack: {}",
                                self.residual_types()
                            ),
                        ));
                    }
                }
            }
        }
        Ok(())
    }
}
