//! Two-pass frontend
//!
//! Pass 1 (declarations) walks every file collecting `#include`, `#clib`,
//! `macro`, `const`, `cfn` and `fn` forms. Includes append new files to the
//! store, so the pass doubles as the include work list. Function bodies are
//! emitted here too: every call site parsed later must already resolve, no
//! matter which file it lives in.
//!
//! Pass 2 (emission) re-tokenises each file and dispatches every top-level
//! token into bytecode: literal pushes, intrinsic ops, `if`/`loop` blocks
//! with jump patching, `memory` regions, and word resolution (macro
//! expansion, memory pointer, C call, function call). Declaration headers
//! were handled in pass 1 and are skipped.
//!
//! Parse errors put the reporter into panic mode; the parser then skips to
//! the next `.` or block/declaration keyword so later errors in the same
//! file still get reported.

use crate::chunk::{Chunk, DataType, Op, Value};
use crate::decls::{CFunction, Declarations, Function};
use crate::diagnostics::Reporter;
use crate::files::{FileId, FileStore};
use crate::intern::{Interner, StrId};
use crate::scanner::{Scanner, Token, TokenKind};

/// Ops for the keywords that emit exactly one instruction.
fn intrinsic_op(kind: TokenKind) -> Option<Op> {
    let op = match kind {
        TokenKind::Plus | TokenKind::SysAdd => Op::Add,
        TokenKind::Minus | TokenKind::SysSub => Op::Subtract,
        TokenKind::Star | TokenKind::SysMul => Op::Multiply,
        TokenKind::Slash | TokenKind::SysDivmod => Op::Divide,
        TokenKind::Percent => Op::Modulo,
        TokenKind::EqualEqual => Op::Equal,
        TokenKind::NotEqual => Op::NotEqual,
        TokenKind::Less => Op::Less,
        TokenKind::LessEqual => Op::LessEqual,
        TokenKind::Greater => Op::Greater,
        TokenKind::GreaterEqual => Op::GreaterEqual,
        TokenKind::Dup => Op::Dup,
        TokenKind::Drop => Op::Drop,
        TokenKind::Over => Op::Over,
        TokenKind::Swap => Op::Swap,
        TokenKind::Take => Op::Take,
        TokenKind::Print => Op::Print,
        TokenKind::Inc => Op::Inc,
        TokenKind::Dec => Op::Dec,
        TokenKind::And => Op::And,
        TokenKind::Or => Op::Or,
        TokenKind::Load8 => Op::Load8,
        TokenKind::Save8 => Op::Save8,
        TokenKind::SysCall0 => Op::Sys0,
        TokenKind::SysCall1 => Op::Sys1,
        TokenKind::SysCall2 => Op::Sys2,
        TokenKind::SysCall3 => Op::Sys3,
        TokenKind::SysCall4 => Op::Sys4,
        TokenKind::SysCall5 => Op::Sys5,
        TokenKind::SysCall6 => Op::Sys6,
        _ => return None,
    };
    Some(op)
}

fn datatype_of(kind: TokenKind) -> Option<DataType> {
    let dt = match kind {
        TokenKind::TypeInt => DataType::Int,
        TokenKind::TypeStr => DataType::Str,
        TokenKind::TypeBool => DataType::Bool,
        TokenKind::TypePtr => DataType::Ptr,
        TokenKind::TypeFloat => DataType::Float,
        TokenKind::TypeHex => DataType::Hex,
        _ => return None,
    };
    Some(dt)
}

/// Strip the surrounding quotes from a string-literal lexeme.
fn string_body(lexeme: &str) -> &str {
    &lexeme[1..lexeme.len() - 1]
}

pub struct Frontend<'a> {
    files: &'a mut FileStore,
    reporter: &'a mut Reporter,
    pub chunk: Chunk,
    pub decls: Declarations,
    pub interner: Interner,
    pub clibs: Vec<String>,
    tokens: Vec<Token>,
    pos: usize,
    previous: Token,
    /// Names currently being expanded, to refuse macro self-invocation
    expanding: Vec<StrId>,
}

impl<'a> Frontend<'a> {
    pub fn new(files: &'a mut FileStore, reporter: &'a mut Reporter) -> Self {
        Frontend {
            files,
            reporter,
            chunk: Chunk::new(),
            decls: Declarations::new(),
            interner: Interner::new(),
            clibs: Vec::new(),
            tokens: Vec::new(),
            pos: 0,
            previous: Token::synthetic(""),
            expanding: Vec::new(),
        }
    }

    /// Run both passes over every registered file (and every file they
    /// include) and terminate the chunk.
    pub fn run(&mut self) {
        let mut index = 0;
        while index < self.files.len() {
            self.preprocess_file(index as FileId);
            index += 1;
        }
        for index in 0..self.files.len() {
            self.emit_file(index as FileId);
        }
        let terminator = self.previous.clone();
        self.chunk.write(Op::End, terminator);
    }

    pub fn into_parts(self) -> (Chunk, Declarations, Interner, Vec<String>) {
        (self.chunk, self.decls, self.interner, self.clibs)
    }

    // ------------------------------------------------------------------
    // Token cursor

    fn load_file(&mut self, file: FileId) {
        let source = self.files.source(file).to_string();
        self.tokens = Scanner::new(&source, file).scan_all();
        self.pos = 0;
        self.reporter.exit_panic();
    }

    fn current(&self) -> &Token {
        &self.tokens[self.pos]
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.current().kind == kind
    }

    /// Consume and return the current token, reporting (and stepping over)
    /// lexical error tokens on the way.
    fn advance(&mut self) -> Token {
        loop {
            let token = self.tokens[self.pos].clone();
            if self.pos + 1 < self.tokens.len() {
                self.pos += 1;
            }
            if token.kind == TokenKind::Error {
                let message = token.lexeme.clone();
                self.error_at(&token, message);
                continue;
            }
            self.previous = token.clone();
            return token;
        }
    }

    fn match_token(&mut self, kind: TokenKind) -> bool {
        if !self.check(kind) {
            return false;
        }
        self.advance();
        true
    }

    fn consume(&mut self, kind: TokenKind, message: &str) -> bool {
        if self.check(kind) {
            self.advance();
            return true;
        }
        let token = self.current().clone();
        self.error_at(&token, message);
        false
    }

    fn error_at(&mut self, token: &Token, message: impl Into<String>) {
        let file = self.files.display_name(token.file).to_string();
        self.reporter.error_at(token, &file, message);
    }

    /// Skip forward to a statement boundary after a parse error.
    fn synchronize(&mut self) {
        self.reporter.exit_panic();
        while !self.check(TokenKind::Eof) {
            if self.previous.kind == TokenKind::Dot {
                return;
            }
            match self.current().kind {
                TokenKind::End
                | TokenKind::Else
                | TokenKind::If
                | TokenKind::Loop
                | TokenKind::Macro
                | TokenKind::Print
                | TokenKind::HashInclude => return,
                _ => {}
            }
            self.advance();
        }
    }

    // ------------------------------------------------------------------
    // Pass 1: declarations

    fn preprocess_file(&mut self, file: FileId) {
        self.load_file(file);
        while !self.check(TokenKind::Eof) {
            let token = self.advance();
            match token.kind {
                TokenKind::HashInclude => self.hash_include(),
                TokenKind::HashClib => self.clib_include(),
                TokenKind::Macro => self.macro_statement(),
                TokenKind::Const => self.const_statement(),
                TokenKind::CFunction => self.cfunction_statement(),
                TokenKind::Function => self.function_statement(),
                _ => {}
            }
            if self.reporter.in_panic() {
                self.synchronize();
            }
        }
    }

    fn hash_include(&mut self) {
        if !self.consume(
            TokenKind::Str,
            "file or library name expected after '#include'\n\
             E.g.:\n\t#include \"io\"\n\t         ^^^^\n\
             You can find a list of libraries by running skc help",
        ) {
            return;
        }
        let token = self.previous.clone();
        let name = string_body(&token.lexeme).to_string();
        if self.files.include(&name).is_err() {
            self.error_at(
                &token,
                format!(
                    "failed to find library to include: {name}\n\
                     Make sure the name is correct. For a compiler library you must omit\n\
                     the '.sk' in the name; for your own code you must keep it.\n\
                     Relative paths start from the entry point base path\n\
                     E.g.:\n\t#include \"my/code.sk\"\n\
                     This means the file is inside a folder called 'my', adjacent to the entry file"
                ),
            );
        }
    }

    fn clib_include(&mut self) {
        if !self.consume(
            TokenKind::Str,
            "library name expected after '#clib'\nE.g.:\n\t#clib \"m\"\n\t      ^^^",
        ) {
            return;
        }
        let name = string_body(&self.previous.lexeme).to_string();
        if !self.clibs.contains(&name) {
            self.clibs.push(name);
        }
    }

    fn macro_statement(&mut self) {
        if !self.consume(
            TokenKind::Word,
            "a valid word is expected after the 'macro' keyword\n\
             E.g.:\n\tmacro my-macro set [...] end\n\t      ^^^^^^^^\n\
             Name may start with a letter or _, and may contain numbers, _ or -",
        ) {
            return;
        }
        let name_token = self.previous.clone();
        let name = self.interner.intern(&name_token.lexeme);
        if self.decls.name_in_use(name) {
            self.error_at(
                &name_token,
                format!(
                    "word {} already in use\n\
                     You cannot override existing declarations,\n\
                     must select a different name for this macro",
                    name_token.lexeme
                ),
            );
            return;
        }
        if !self.consume(
            TokenKind::Set,
            "'set' expected after the name of this macro\n\
             E.g.:\n\tmacro my-macro set [...] end\n\t               ^^^\n\
             Macro declaration statements must be enclosed in 'set' and 'end' keywords",
        ) {
            return;
        }
        if self.match_token(TokenKind::End) {
            let token = self.previous.clone();
            self.error_at(
                &token,
                "missing macro content after 'set'. Empty macros are not allowed\n\
                 E.g.:\n\tmacro my-macro set [...] end\n\t                   ^^^^^\n\
                 Macro content may be anything, including other macros, but not the same macro",
            );
            return;
        }
        let mut body = Vec::new();
        while !self.check(TokenKind::End) && !self.check(TokenKind::Eof) {
            let token = self.advance();
            if matches!(
                token.kind,
                TokenKind::If | TokenKind::Loop | TokenKind::Memory
            ) {
                self.error_at(
                    &token,
                    "block starter keywords are not allowed inside a macro",
                );
            }
            body.push(token);
        }
        self.consume(
            TokenKind::End,
            "'end' keyword expected after macro declaration\n\
             E.g.:\n\tmacro my-macro set [...] end\n\t                         ^^^\n\
             Macro declaration must close with the 'end' keyword",
        );
        self.decls.add_macro(name, body);
    }

    fn const_statement(&mut self) {
        if !self.consume(
            TokenKind::Word,
            "a valid word is expected after the 'const' keyword\n\
             E.g.:\n\tconst my-const 42 end\n\t      ^^^^^^^^\n\
             Name may start with a letter or _, and may contain numbers, _ or -",
        ) {
            return;
        }
        let name_token = self.previous.clone();
        let name = self.interner.intern(&name_token.lexeme);
        if self.decls.name_in_use(name) {
            self.error_at(
                &name_token,
                format!(
                    "word {} already in use\n\
                     You cannot override existing declarations,\n\
                     must select a different name for this const",
                    name_token.lexeme
                ),
            );
            return;
        }
        if self.match_token(TokenKind::End) {
            let token = self.previous.clone();
            self.error_at(
                &token,
                "missing const content after the name. Empty consts are not allowed\n\
                 E.g.:\n\tconst my-const 42 end\n\t               ^^\n\
                 Const content may be a constant value, like an Int or Str",
            );
            return;
        }
        let token = self.advance();
        if matches!(token.kind, TokenKind::Int | TokenKind::Str) {
            self.decls.add_macro(name, vec![token]);
        } else {
            self.error_at(
                &token,
                "you can only assign a constant value to a 'const'\n\
                 Only an Int or Str is allowed to be used here",
            );
        }
        self.consume(
            TokenKind::End,
            "'end' keyword expected after const declaration\n\
             E.g.:\n\tconst my-const 42 end\n\t                  ^^^\n\
             Const declaration must close with the 'end' keyword",
        );
    }

    /// Read `<datatype>*` up to a signature terminator.
    fn signature_args(&mut self) -> Vec<DataType> {
        let mut args = Vec::new();
        while !self.check(TokenKind::RightArrow)
            && !self.check(TokenKind::Set)
            && !self.check(TokenKind::End)
            && !self.check(TokenKind::Eof)
        {
            let token = self.advance();
            match datatype_of(token.kind) {
                Some(dt) => args.push(dt),
                None => self.error_at(
                    &token,
                    "datatype expected in signature\n\
                     Allowed datatypes are: int str bool ptr float hex",
                ),
            }
        }
        args
    }

    /// Read the optional `-> <datatype>` return clause.
    fn signature_return(&mut self) -> DataType {
        if !self.match_token(TokenKind::RightArrow) {
            return DataType::Null;
        }
        let token = self.advance();
        match datatype_of(token.kind) {
            Some(dt) => dt,
            None => {
                self.error_at(
                    &token,
                    "datatype expected after '->'\n\
                     Allowed datatypes are: int str bool ptr float hex",
                );
                DataType::Null
            }
        }
    }

    fn cfunction_statement(&mut self) {
        if !self.consume(
            TokenKind::Word,
            "a valid word is expected after the 'cfn' keyword\n\
             E.g.:\n\tcfn put-char putchar int -> int end\n\t    ^^^^^^^^",
        ) {
            return;
        }
        let name_token = self.previous.clone();
        let name = self.interner.intern(&name_token.lexeme);
        if self.decls.name_in_use(name) {
            self.error_at(
                &name_token,
                format!(
                    "word {} already in use\n\
                     You cannot override existing declarations,\n\
                     must select a different name for this C-function",
                    name_token.lexeme
                ),
            );
            return;
        }
        if !self.consume(
            TokenKind::Word,
            "the C symbol name is expected after the source name\n\
             E.g.:\n\tcfn put-char putchar int -> int end\n\t             ^^^^^^^",
        ) {
            return;
        }
        let cname_lexeme = self.previous.lexeme.clone();
        let cname = self.interner.intern(&cname_lexeme);
        let args = self.signature_args();
        let ret = self.signature_return();
        self.consume(
            TokenKind::End,
            "'end' keyword expected after C-function declaration\n\
             E.g.:\n\tcfn put-char putchar int -> int end\n\t                                ^^^",
        );
        self.decls.add_cfunction(CFunction {
            name,
            cname,
            args,
            ret,
        });
    }

    fn function_statement(&mut self) {
        if !self.consume(
            TokenKind::Word,
            "a valid word is expected after the 'fn' keyword\n\
             E.g.:\n\tfn double int -> int set 2 * end\n\t   ^^^^^^",
        ) {
            return;
        }
        let name_token = self.previous.clone();
        let name = self.interner.intern(&name_token.lexeme);
        if self.decls.name_in_use(name) {
            self.error_at(
                &name_token,
                format!(
                    "word {} already in use\n\
                     You cannot override existing declarations,\n\
                     must select a different name for this function",
                    name_token.lexeme
                ),
            );
            return;
        }
        let args = self.signature_args();
        let ret = self.signature_return();
        if !self.consume(
            TokenKind::Set,
            "'set' expected after the function signature\n\
             E.g.:\n\tfn double int -> int set 2 * end\n\t                     ^^^\n\
             Function bodies must be enclosed in 'set' and 'end' keywords",
        ) {
            return;
        }
        // Registered before the body so recursive calls resolve
        let index = self.decls.add_function(Function {
            name,
            args,
            ret,
            start_ip: 0,
            end_ip: 0,
            called: false,
        });
        let start_ip = self
            .chunk
            .write(Op::DefineFunction(index), name_token.clone());
        self.decls.functions[index].start_ip = start_ip;
        while !self.check(TokenKind::End) && !self.check(TokenKind::Eof) {
            self.parse_next();
        }
        let return_token = self.previous.clone();
        self.chunk.write(Op::Return, return_token);
        self.consume(
            TokenKind::End,
            "'end' keyword expected after the function body\n\
             E.g.:\n\tfn double int -> int set 2 * end\n\t                             ^^^",
        );
        let end_ip = self
            .chunk
            .write(Op::FunctionEnd(index), self.previous.clone());
        self.decls.functions[index].end_ip = end_ip;
    }

    // ------------------------------------------------------------------
    // Pass 2: emission

    fn emit_file(&mut self, file: FileId) {
        self.load_file(file);
        while !self.check(TokenKind::Eof) {
            self.parse_next();
            if self.reporter.in_panic() {
                self.synchronize();
            }
        }
    }

    fn parse_next(&mut self) {
        let token = self.advance();
        self.dispatch(&token);
    }

    /// Rule table. Every token kind that can appear in executable position
    /// lands here, both from the stream and from macro bodies.
    fn dispatch(&mut self, token: &Token) {
        match token.kind {
            TokenKind::Int | TokenKind::Str | TokenKind::Float | TokenKind::Hex => {
                self.constant_rule(token)
            }
            TokenKind::If => self.if_statement(),
            TokenKind::Loop => self.loop_statement(),
            TokenKind::Memory => self.memory_definition(),
            TokenKind::Word => self.word_rule(token),
            TokenKind::HashInclude | TokenKind::HashClib => self.skip_directive(),
            TokenKind::Const
            | TokenKind::Macro
            | TokenKind::CFunction
            | TokenKind::Function => self.skip_declaration(),
            TokenKind::Eof => {}
            _ => match intrinsic_op(token.kind) {
                Some(op) => {
                    self.chunk.write(op, token.clone());
                }
                None => self.error_at(token, "unknown expression"),
            },
        }
    }

    fn constant_rule(&mut self, token: &Token) {
        match token.kind {
            TokenKind::Int => match token.lexeme.parse::<i64>() {
                Ok(value) => {
                    let constant = self.chunk.add_constant(Value::Int(value));
                    self.chunk.write(Op::PushInt(constant), token.clone());
                }
                Err(_) => self.error_at(token, "integer literal out of range"),
            },
            TokenKind::Float => match token.lexeme.parse::<f64>() {
                Ok(value) => {
                    let constant = self.chunk.add_constant(Value::Float(value));
                    self.chunk.write(Op::PushFloat(constant), token.clone());
                }
                Err(_) => self.error_at(token, "malformed float literal"),
            },
            TokenKind::Hex => {
                let id = self.interner.intern(&token.lexeme);
                let constant = self.chunk.add_constant(Value::Hex(id));
                self.chunk.write(Op::PushHex(constant), token.clone());
            }
            TokenKind::Str => {
                let id = self.interner.intern(string_body(&token.lexeme));
                let constant = self.chunk.add_constant(Value::Str(id));
                self.chunk.write(Op::PushStr(constant), token.clone());
            }
            _ => {}
        }
    }

    fn if_statement(&mut self) {
        while !self.check(TokenKind::Do)
            && !self.check(TokenKind::Eof)
            && !self.check(TokenKind::Else)
            && !self.check(TokenKind::Dot)
        {
            self.parse_next();
        }
        self.consume(
            TokenKind::Do,
            "'do' expected after 'if' conditionals\n\
             E.g.:\n\tif 13 31 == do [...] .\n\t            ^^\n\
             All block expressions must be enclosed in 'do' and '.' keywords",
        );
        let then_jump = self.chunk.write(Op::JumpIfFalse(0), self.previous.clone());
        while !self.check(TokenKind::Else)
            && !self.check(TokenKind::Eof)
            && !self.check(TokenKind::Dot)
        {
            self.parse_next();
        }
        let else_jump = self.chunk.write(Op::Jump(0), self.current().clone());
        self.chunk.patch_jump(then_jump);
        if self.match_token(TokenKind::Else) {
            while !self.check(TokenKind::Eof) && !self.check(TokenKind::Dot) {
                self.parse_next();
            }
        }
        self.chunk.patch_jump(else_jump);
        self.consume(
            TokenKind::Dot,
            "'.' (dot) expected after block of code\n\
             E.g.:\n\tif 0 25 < do [...] .\n\t                   ^\n\
             All blocks must end with a '.' (dot)",
        );
    }

    fn loop_statement(&mut self) {
        let loop_start = self.chunk.len();
        while !self.check(TokenKind::Do)
            && !self.check(TokenKind::Eof)
            && !self.check(TokenKind::Dot)
        {
            self.parse_next();
        }
        self.consume(
            TokenKind::Do,
            "'do' expected after 'loop' conditionals\n\
             E.g.:\n\tloop 0 25 < do [...] .\n\t            ^^\n\
             All block expressions must be enclosed in 'do' and '.' keywords",
        );
        let exit_jump = self.chunk.write(Op::JumpIfFalse(0), self.previous.clone());
        while !self.check(TokenKind::Dot) && !self.check(TokenKind::Eof) {
            self.parse_next();
        }
        self.chunk
            .write(Op::Loop(loop_start), self.current().clone());
        self.chunk.patch_jump(exit_jump);
        self.consume(
            TokenKind::Dot,
            "'.' (dot) expected after block of code\n\
             E.g.:\n\tloop 0 25 < do [...] .\n\t                     ^\n\
             All blocks must end with a '.' (dot)",
        );
    }

    fn memory_definition(&mut self) {
        if !self.consume(
            TokenKind::Word,
            "memory definition requires a name after the 'memory' keyword\n\
             E.g.:\n\tmemory buffer 1024 end\n\t       ^^^^^^\n\
             Memory name may start with a letter or _, and may contain numbers, - or _",
        ) {
            return;
        }
        let name_token = self.previous.clone();
        let name = self.interner.intern(&name_token.lexeme);
        if self.decls.name_in_use(name) {
            self.error_at(
                &name_token,
                format!(
                    "word {} already in use\n\
                     You cannot override existing declarations,\n\
                     must select a different name for this memory region",
                    name_token.lexeme
                ),
            );
            return;
        }
        if self.match_token(TokenKind::End) {
            let token = self.previous.clone();
            self.error_at(
                &token,
                "expect Int after the memory name\n\
                 E.g.:\n\tmemory buffer 1024 end\n\t              ^^^^\n\
                 This number indicates how much memory (in bytes) is going to be reserved",
            );
            return;
        }
        let size = if self.match_token(TokenKind::Int) {
            self.previous.lexeme.parse::<i64>().ok()
        } else if self.match_token(TokenKind::Word) {
            let const_lexeme = self.previous.lexeme.clone();
            let const_name = self.interner.intern(&const_lexeme);
            self.decls
                .find_macro(const_name)
                .and_then(|index| self.decls.macros[index].body.first())
                .filter(|token| token.kind == TokenKind::Int)
                .and_then(|token| token.lexeme.parse::<i64>().ok())
        } else {
            None
        };
        let Some(size) = size else {
            let token = self.previous.clone();
            self.error_at(
                &token,
                "memory size must be an Int literal or an Int constant\n\
                 E.g.:\n\tmemory buffer 1024 end\n\t              ^^^^",
            );
            return;
        };
        let name_constant = self.chunk.add_constant(Value::Ptr(name));
        let size_constant = self.chunk.add_constant(Value::Int(size));
        self.chunk.write(
            Op::DefinePtr {
                name: name_constant,
                size: size_constant,
            },
            name_token,
        );
        self.decls.add_memory(name, size);
        self.consume(
            TokenKind::End,
            "'end' keyword expected after memory definition\n\
             E.g.:\n\tmemory buffer 1024 end\n\t                   ^^^\n\
             Memory definition must close with the 'end' keyword",
        );
    }

    fn word_rule(&mut self, token: &Token) {
        let name = self.interner.intern(&token.lexeme);
        if let Some(index) = self.decls.find_macro(name) {
            self.expand_macro(index, token);
            return;
        }
        if let Some(index) = self.decls.find_memory(name) {
            let region = self.decls.memories[index].name;
            let constant = self.chunk.add_constant(Value::Ptr(region));
            self.chunk.write(Op::PushPtr(constant), token.clone());
            return;
        }
        if let Some(index) = self.decls.find_cfunction(name) {
            self.chunk.write(Op::CallCFunc(index), token.clone());
            return;
        }
        if let Some(index) = self.decls.find_function(name) {
            self.decls.functions[index].called = true;
            self.chunk.write(Op::Call(index), token.clone());
            return;
        }
        self.error_at(
            token,
            "unknown word\n\
             The word definition has not been found yet in the code\n\
             Check if the definition is after this line or if you misspelled the word",
        );
    }

    fn expand_macro(&mut self, index: usize, call: &Token) {
        let name = self.decls.macros[index].name;
        if self.expanding.contains(&name) {
            self.error_at(call, format!("macro {} cannot invoke itself", call.lexeme));
            return;
        }
        self.expanding.push(name);
        let body = self.decls.macros[index].body.clone();
        for token in &body {
            match token.kind {
                TokenKind::If | TokenKind::Loop | TokenKind::Memory => {
                    self.error_at(
                        token,
                        "block starter keywords are not allowed inside a macro",
                    );
                    break;
                }
                _ => self.dispatch(token),
            }
        }
        self.expanding.pop();
    }

    /// Pass 2 skip for `#include`/`#clib`: the directive was handled in
    /// pass 1, only the string argument remains to step over.
    fn skip_directive(&mut self) {
        self.consume(
            TokenKind::Str,
            "file or library name expected after the directive\n\
             E.g.:\n\t#include \"io\"\n\t         ^^^^",
        );
    }

    /// Pass 2 skip for declaration forms already recorded in pass 1.
    fn skip_declaration(&mut self) {
        loop {
            if self.match_token(TokenKind::End) {
                return;
            }
            if self.check(TokenKind::Eof) {
                let token = self.current().clone();
                self.error_at(&token, "'end' keyword expected to close the declaration");
                return;
            }
            self.advance();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::{Op, Value};

    /// Run the frontend over a single in-memory file, without the implicit
    /// basics library, and return everything it produced.
    fn frontend(source: &str) -> (Chunk, Declarations, Interner, Vec<String>, Reporter) {
        let mut files = FileStore::new(".", ".");
        files.add_virtual("test.sk", source);
        let mut reporter = Reporter::new();
        let mut frontend = Frontend::new(&mut files, &mut reporter);
        frontend.run();
        let (chunk, decls, interner, clibs) = frontend.into_parts();
        (chunk, decls, interner, clibs, reporter)
    }

    fn ops(chunk: &Chunk) -> Vec<Op> {
        chunk.code.iter().map(|i| i.op).collect()
    }

    #[test]
    fn test_empty_source_emits_only_end() {
        let (chunk, _, _, _, reporter) = frontend("");
        assert!(!reporter.erred());
        assert_eq!(ops(&chunk), vec![Op::End]);
    }

    #[test]
    fn test_literal_arithmetic() {
        let (chunk, _, _, _, reporter) = frontend("2 2 + print");
        assert!(!reporter.erred());
        assert_eq!(
            ops(&chunk),
            vec![Op::PushInt(0), Op::PushInt(1), Op::Add, Op::Print, Op::End]
        );
        assert_eq!(chunk.constants[0], Value::Int(2));
    }

    #[test]
    fn test_digit_separator_transparency() {
        let (plain, _, _, _, _) = frontend("1000000 print");
        let (separated, _, _, _, _) = frontend("1_000_000 print");
        assert_eq!(ops(&plain), ops(&separated));
        assert_eq!(plain.constants[0], separated.constants[0]);
    }

    #[test]
    fn test_string_push() {
        let (chunk, _, interner, _, _) = frontend("\"hello\" drop drop");
        assert_eq!(chunk.code[0].op, Op::PushStr(0));
        match chunk.constants[0] {
            Value::Str(id) => assert_eq!(interner.resolve(id), "hello"),
            other => panic!("expected string constant, got {other:?}"),
        }
    }

    #[test]
    fn test_if_else_patching() {
        let (chunk, _, _, _, reporter) = frontend("if 1 2 == do drop else drop .");
        assert!(!reporter.erred(), "{:?}", reporter.diagnostics());
        // 0: push 1, 1: push 2, 2: ==, 3: jump-if-false -> else branch,
        // 4: drop, 5: jump -> end of block, 6: drop, 7: End
        assert_eq!(chunk.code[3].op, Op::JumpIfFalse(6));
        assert_eq!(chunk.code[5].op, Op::Jump(7));
        for instruction in &chunk.code {
            if let Op::Jump(t) | Op::JumpIfFalse(t) | Op::Loop(t) = instruction.op {
                assert!(t <= chunk.len());
            }
        }
    }

    #[test]
    fn test_loop_back_edge() {
        let (chunk, _, _, _, reporter) =
            frontend("memory i 8 end loop i @8 10 < do i @8 print i @8 1 + i !8 .");
        assert!(!reporter.erred(), "{:?}", reporter.diagnostics());
        let code = ops(&chunk);
        // The back-edge targets the first instruction after the memory
        // definition
        let back_edge = code
            .iter()
            .find_map(|op| match op {
                Op::Loop(t) => Some(*t),
                _ => None,
            })
            .unwrap();
        assert_eq!(back_edge, 1);
        // The exit jump lands just past the Loop op
        let exit = code
            .iter()
            .find_map(|op| match op {
                Op::JumpIfFalse(t) => Some(*t),
                _ => None,
            })
            .unwrap();
        let loop_ip = code.iter().position(|op| matches!(op, Op::Loop(_))).unwrap();
        assert_eq!(exit, loop_ip + 1);
    }

    #[test]
    fn test_memory_definition() {
        let (chunk, decls, interner, _, reporter) = frontend("memory buf 64 end");
        assert!(!reporter.erred());
        assert_eq!(chunk.code.len(), 2); // DefinePtr + End
        assert!(matches!(chunk.code[0].op, Op::DefinePtr { .. }));
        assert_eq!(decls.memories.len(), 1);
        assert_eq!(interner.resolve(decls.memories[0].name), "buf");
        assert_eq!(decls.memories[0].size, 64);
    }

    #[test]
    fn test_memory_size_from_const() {
        let (_, decls, _, _, reporter) = frontend("const size 128 end memory buf size end");
        assert!(!reporter.erred(), "{:?}", reporter.diagnostics());
        assert_eq!(decls.memories[0].size, 128);
    }

    #[test]
    fn test_macro_expansion_equivalence() {
        let (expanded, _, _, _, reporter) = frontend("macro inc2 set 1 + 1 + end 3 inc2 print");
        assert!(!reporter.erred());
        let (inlined, _, _, _, _) = frontend("3 1 + 1 + print");
        assert_eq!(ops(&expanded), ops(&inlined));
    }

    #[test]
    fn test_const_is_single_token_macro() {
        let (chunk, _, _, _, reporter) = frontend("const answer 42 end answer print");
        assert!(!reporter.erred());
        assert_eq!(ops(&chunk), vec![Op::PushInt(0), Op::Print, Op::End]);
        assert_eq!(chunk.constants[0], Value::Int(42));
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let (_, _, _, _, reporter) = frontend("macro a set 1 end macro a set 2 end");
        assert!(reporter.erred());
        let message = &reporter.diagnostics()[0].message;
        assert!(message.contains("word a already in use"), "{message}");
    }

    #[test]
    fn test_duplicate_across_kinds_rejected() {
        let (_, _, _, _, reporter) = frontend("const a 1 end fn a set 2 drop end");
        assert!(reporter.erred());
        assert!(reporter.diagnostics()[0].message.contains("already in use"));
    }

    #[test]
    fn test_unknown_word_reported() {
        let (_, _, _, _, reporter) = frontend("2 2 frobnicate");
        assert!(reporter.erred());
        assert!(reporter.diagnostics()[0].message.contains("unknown word"));
    }

    #[test]
    fn test_block_starter_rejected_in_macro() {
        let (_, _, _, _, reporter) = frontend("macro bad set if 1 do 2 . end");
        assert!(reporter.erred());
        assert!(reporter.diagnostics()[0]
            .message
            .contains("not allowed inside a macro"));
    }

    #[test]
    fn test_empty_macro_rejected() {
        let (_, _, _, _, reporter) = frontend("macro nothing set end");
        assert!(reporter.erred());
        assert!(reporter.diagnostics()[0]
            .message
            .contains("Empty macros are not allowed"));
    }

    #[test]
    fn test_macro_self_reference_rejected() {
        // `b` resolves to its own macro at expansion time; refuse instead
        // of recursing
        let (_, _, _, _, reporter) = frontend("macro b set 1 b end b");
        assert!(reporter.erred());
        assert!(reporter
            .diagnostics()
            .iter()
            .any(|d| d.message.contains("cannot invoke itself")));
    }

    #[test]
    fn test_function_body_emitted_before_top_level() {
        let (chunk, decls, _, _, reporter) =
            frontend("fn double int -> int set 2 * end 21 double print");
        assert!(!reporter.erred(), "{:?}", reporter.diagnostics());
        let code = ops(&chunk);
        // Body region first: define, push 2, *, return, end-marker
        assert_eq!(code[0], Op::DefineFunction(0));
        assert_eq!(code[2], Op::Multiply);
        assert_eq!(code[3], Op::Return);
        assert_eq!(code[4], Op::FunctionEnd(0));
        // Top-level code after the whole body region
        assert_eq!(code[6], Op::Call(0));
        assert!(decls.functions[0].called);
        assert_eq!(decls.functions[0].start_ip, 0);
        assert_eq!(decls.functions[0].end_ip, 4);
    }

    #[test]
    fn test_uncalled_function_not_marked() {
        let (_, decls, _, _, reporter) = frontend("fn lonely set 1 drop end");
        assert!(!reporter.erred());
        assert!(!decls.functions[0].called);
    }

    #[test]
    fn test_cfunction_signature() {
        let (chunk, decls, interner, _, reporter) =
            frontend("cfn put-char putchar int -> int end 65 put-char drop");
        assert!(!reporter.erred(), "{:?}", reporter.diagnostics());
        assert_eq!(decls.cfunctions.len(), 1);
        let cfn = &decls.cfunctions[0];
        assert_eq!(interner.resolve(cfn.name), "put-char");
        assert_eq!(interner.resolve(cfn.cname), "putchar");
        assert_eq!(cfn.args, vec![DataType::Int]);
        assert_eq!(cfn.ret, DataType::Int);
        assert!(ops(&chunk).contains(&Op::CallCFunc(0)));
    }

    #[test]
    fn test_clib_collected_once() {
        let (_, _, _, clibs, reporter) = frontend("#clib \"m\" #clib \"m\" #clib \"c\"");
        assert!(!reporter.erred());
        assert_eq!(clibs, vec!["m".to_string(), "c".to_string()]);
    }

    #[test]
    fn test_syscall_family_ops() {
        let (chunk, _, _, _, reporter) = frontend("1 2 __sys_add drop 60 0 __sys_call1 drop");
        assert!(!reporter.erred());
        let code = ops(&chunk);
        assert!(code.contains(&Op::Add));
        assert!(code.contains(&Op::Sys1));
    }

    #[test]
    fn test_error_recovery_reports_later_errors() {
        // Two independent unknown words; panic mode must clear in between
        let (_, _, _, _, reporter) = frontend("bogus1 if 1 1 == do drop . bogus2");
        assert!(reporter.erred());
        assert_eq!(reporter.diagnostics().len(), 2);
    }

    #[test]
    fn test_include_resolution_across_files() {
        use std::fs;
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("util.sk"), "macro twice set dup + end\n").unwrap();
        fs::write(
            dir.path().join("main.sk"),
            "#include \"util.sk\"\n21 twice print\n",
        )
        .unwrap();

        let mut files = FileStore::new(dir.path(), dir.path());
        files.add_entry(&dir.path().join("main.sk")).unwrap();
        let mut reporter = Reporter::new();
        let mut frontend = Frontend::new(&mut files, &mut reporter);
        frontend.run();
        let (chunk, ..) = frontend.into_parts();
        assert!(!reporter.erred(), "{:?}", reporter.diagnostics());
        assert_eq!(
            chunk.code.iter().map(|i| i.op).collect::<Vec<_>>(),
            vec![Op::PushInt(0), Op::Dup, Op::Add, Op::Print, Op::End]
        );
    }

    #[test]
    fn test_include_idempotence() {
        use std::fs;
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("util.sk"), "macro id set take end\n").unwrap();
        fs::write(
            dir.path().join("a.sk"),
            "#include \"util.sk\"\n#include \"util.sk\"\n1 id print\n",
        )
        .unwrap();

        let mut files = FileStore::new(dir.path(), dir.path());
        files.add_entry(&dir.path().join("a.sk")).unwrap();
        let mut reporter = Reporter::new();
        let mut frontend = Frontend::new(&mut files, &mut reporter);
        frontend.run();
        assert!(!reporter.erred(), "{:?}", reporter.diagnostics());
        assert_eq!(files.len(), 2);
    }

    #[test]
    fn test_missing_include_reported() {
        let (_, _, _, _, reporter) = frontend("#include \"does-not-exist\"");
        assert!(reporter.erred());
        assert!(reporter.diagnostics()[0]
            .message
            .contains("failed to find library"));
    }
}
