//! Tokeniser for `.sk` sources
//!
//! A byte-cursor scanner producing one token at a time. Lexemes are
//! longest-match: `->` before `-`, `<=` before `<`, `!8`/`!=` before a bare
//! `!` (which is a lexical error on its own). Words share one alphabet with
//! keywords; a keyword table decides which kind a finished word gets.
//!
//! Lexical errors are not reported here. The scanner emits an `Error` token
//! whose lexeme carries the diagnostic text and the parser surfaces it
//! through its normal error path.

use crate::files::FileId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    // Structural
    Dot,
    Set,
    Do,
    Else,
    End,
    RightArrow,

    // Literals
    Int,
    Float,
    Hex,
    Str,
    Word,

    // Intrinsics
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    EqualEqual,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    Dup,
    Drop,
    Over,
    Swap,
    Take,
    Print,
    Inc,
    Dec,
    And,
    Or,
    Load8,
    Save8,

    // Syscall family
    SysCall0,
    SysCall1,
    SysCall2,
    SysCall3,
    SysCall4,
    SysCall5,
    SysCall6,
    SysAdd,
    SysSub,
    SysMul,
    SysDivmod,

    // Block starters
    If,
    Loop,
    Memory,

    // Declarative
    Const,
    Macro,
    Function,
    CFunction,
    HashInclude,
    HashClib,

    // Datatype keywords
    TypeInt,
    TypeStr,
    TypeBool,
    TypePtr,
    TypeFloat,
    TypeHex,

    // Terminals
    Eof,
    Error,
}

/// A scanned token. Lexemes are owned copies so tokens stay valid while the
/// file store keeps growing during include processing, and so macro bodies
/// can hold token slices without borrowing.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub lexeme: String,
    pub file: FileId,
    /// 1-based source line
    pub line: u32,
    /// 1-based column of the first lexeme byte
    pub column: u32,
}

impl Token {
    /// Synthetic token for diagnostics not tied to a real source position.
    pub fn synthetic(lexeme: &str) -> Token {
        Token {
            kind: TokenKind::Word,
            lexeme: lexeme.to_string(),
            file: 0,
            line: 0,
            column: 0,
        }
    }
}

pub struct Scanner<'src> {
    src: &'src [u8],
    file: FileId,
    start: usize,
    current: usize,
    line: u32,
    /// Byte offset of the first character of the current line
    line_start: usize,
    /// Location latched at the start of the current token; multi-line
    /// strings advance `line` while they scan, tokens report where they
    /// began
    token_line: u32,
    token_column: u32,
}

fn is_digit(c: u8) -> bool {
    c.is_ascii_digit()
}

fn is_alpha(c: u8) -> bool {
    c.is_ascii_alphabetic() || c == b'_'
}

fn is_word_char(c: u8) -> bool {
    is_alpha(c) || is_digit(c) || c == b'-'
}

fn is_hex_digit(c: u8) -> bool {
    c.is_ascii_hexdigit()
}

/// Reserved-word table. Applied to every finished word lexeme; anything not
/// listed stays a `Word`.
fn keyword_kind(lexeme: &str) -> Option<TokenKind> {
    let kind = match lexeme {
        "if" => TokenKind::If,
        "do" => TokenKind::Do,
        "else" => TokenKind::Else,
        "loop" => TokenKind::Loop,
        "end" => TokenKind::End,
        "set" => TokenKind::Set,
        "const" => TokenKind::Const,
        "macro" => TokenKind::Macro,
        "fn" => TokenKind::Function,
        "cfn" => TokenKind::CFunction,
        "memory" | "static" => TokenKind::Memory,
        "dup" => TokenKind::Dup,
        "drop" => TokenKind::Drop,
        "over" => TokenKind::Over,
        "swap" => TokenKind::Swap,
        "take" => TokenKind::Take,
        "print" => TokenKind::Print,
        "inc" => TokenKind::Inc,
        "dec" => TokenKind::Dec,
        "and" => TokenKind::And,
        "or" => TokenKind::Or,
        "int" => TokenKind::TypeInt,
        "str" => TokenKind::TypeStr,
        "bool" => TokenKind::TypeBool,
        "ptr" => TokenKind::TypePtr,
        "float" => TokenKind::TypeFloat,
        "hex" => TokenKind::TypeHex,
        "__sys_call0" => TokenKind::SysCall0,
        "__sys_call1" => TokenKind::SysCall1,
        "__sys_call2" => TokenKind::SysCall2,
        "__sys_call3" => TokenKind::SysCall3,
        "__sys_call4" => TokenKind::SysCall4,
        "__sys_call5" => TokenKind::SysCall5,
        "__sys_call6" => TokenKind::SysCall6,
        "__sys_add" => TokenKind::SysAdd,
        "__sys_sub" => TokenKind::SysSub,
        "__sys_mul" => TokenKind::SysMul,
        "__sys_divmod" => TokenKind::SysDivmod,
        _ => return None,
    };
    Some(kind)
}

impl<'src> Scanner<'src> {
    pub fn new(source: &'src str, file: FileId) -> Self {
        Scanner {
            src: source.as_bytes(),
            file,
            start: 0,
            current: 0,
            line: 1,
            line_start: 0,
            token_line: 1,
            token_column: 1,
        }
    }

    fn is_at_end(&self) -> bool {
        self.current >= self.src.len()
    }

    fn advance(&mut self) -> u8 {
        let c = self.src[self.current];
        self.current += 1;
        c
    }

    fn peek(&self) -> u8 {
        if self.is_at_end() {
            0
        } else {
            self.src[self.current]
        }
    }

    fn peek_next(&self) -> u8 {
        if self.current + 1 >= self.src.len() {
            0
        } else {
            self.src[self.current + 1]
        }
    }

    fn matches(&mut self, expected: u8) -> bool {
        if self.is_at_end() || self.src[self.current] != expected {
            return false;
        }
        self.current += 1;
        true
    }

    fn make_token(&self, kind: TokenKind) -> Token {
        let lexeme = std::str::from_utf8(&self.src[self.start..self.current])
            .unwrap_or_default()
            .to_string();
        Token {
            kind,
            lexeme,
            file: self.file,
            line: self.token_line,
            column: self.token_column,
        }
    }

    fn error_token(&self, message: impl Into<String>) -> Token {
        Token {
            kind: TokenKind::Error,
            lexeme: message.into(),
            file: self.file,
            line: self.token_line,
            column: self.token_column,
        }
    }

    fn skip_whitespace(&mut self) {
        loop {
            match self.peek() {
                b' ' | b'\r' | b'\t' => {
                    self.advance();
                }
                b'\n' => {
                    self.advance();
                    self.line += 1;
                    self.line_start = self.current;
                }
                _ => return,
            }
        }
    }

    fn number(&mut self) -> Token {
        // 0x prefix switches to the hex alphabet
        if self.src[self.start] == b'0' && self.peek() == b'x' {
            self.advance();
            if !is_hex_digit(self.peek()) {
                return self.error_token("hex literal needs at least one digit after '0x'");
            }
            while is_hex_digit(self.peek()) {
                self.advance();
            }
            return self.make_token(TokenKind::Hex);
        }
        while is_digit(self.peek()) {
            self.advance();
        }
        if self.peek() == b'.' && is_digit(self.peek_next()) {
            self.advance();
            while is_digit(self.peek()) {
                self.advance();
            }
            return self.make_token(TokenKind::Float);
        }
        self.make_token(TokenKind::Int)
    }

    fn word(&mut self) -> Token {
        while is_word_char(self.peek()) {
            self.advance();
        }
        let lexeme = std::str::from_utf8(&self.src[self.start..self.current]).unwrap_or_default();
        match keyword_kind(lexeme) {
            Some(kind) => self.make_token(kind),
            None => self.make_token(TokenKind::Word),
        }
    }

    fn directive(&mut self) -> Token {
        while is_word_char(self.peek()) {
            self.advance();
        }
        let lexeme = std::str::from_utf8(&self.src[self.start..self.current]).unwrap_or_default();
        match lexeme {
            "#include" => self.make_token(TokenKind::HashInclude),
            "#clib" => self.make_token(TokenKind::HashClib),
            _ => self.error_token(format!("unknown directive {lexeme}")),
        }
    }

    fn string(&mut self) -> Token {
        while self.peek() != b'"' && !self.is_at_end() {
            if self.peek() == b'\n' {
                self.line += 1;
                self.line_start = self.current + 1;
            }
            self.advance();
        }
        if self.is_at_end() {
            return self.error_token("unterminated string");
        }
        self.advance();
        self.make_token(TokenKind::Str)
    }

    pub fn scan_token(&mut self) -> Token {
        self.skip_whitespace();
        self.start = self.current;
        self.token_line = self.line;
        self.token_column = (self.start - self.line_start) as u32 + 1;
        if self.is_at_end() {
            return self.make_token(TokenKind::Eof);
        }

        let c = self.advance();
        if is_digit(c) {
            return self.number();
        }
        if is_alpha(c) {
            return self.word();
        }

        match c {
            b'.' => self.make_token(TokenKind::Dot),
            b'+' => self.make_token(TokenKind::Plus),
            b'*' => self.make_token(TokenKind::Star),
            b'/' => self.make_token(TokenKind::Slash),
            b'%' => self.make_token(TokenKind::Percent),
            b'-' => {
                if self.matches(b'>') {
                    self.make_token(TokenKind::RightArrow)
                } else {
                    self.make_token(TokenKind::Minus)
                }
            }
            b'=' => {
                if self.matches(b'=') {
                    self.make_token(TokenKind::EqualEqual)
                } else {
                    self.error_token("unknown token at '='")
                }
            }
            b'!' => {
                if self.matches(b'=') {
                    self.make_token(TokenKind::NotEqual)
                } else if self.matches(b'8') {
                    self.make_token(TokenKind::Save8)
                } else {
                    self.error_token("unknown token at '!'")
                }
            }
            b'@' => {
                if self.matches(b'8') {
                    self.make_token(TokenKind::Load8)
                } else {
                    self.error_token("unknown token at '@'")
                }
            }
            b'<' => {
                if self.matches(b'=') {
                    self.make_token(TokenKind::LessEqual)
                } else {
                    self.make_token(TokenKind::Less)
                }
            }
            b'>' => {
                if self.matches(b'=') {
                    self.make_token(TokenKind::GreaterEqual)
                } else {
                    self.make_token(TokenKind::Greater)
                }
            }
            b'"' => self.string(),
            b'#' => self.directive(),
            _ => self.error_token(format!("unknown character '{}'", c as char)),
        }
    }

    /// Scan the whole buffer. The returned vector always ends with `Eof`.
    pub fn scan_all(mut self) -> Vec<Token> {
        let mut tokens = Vec::new();
        loop {
            let token = self.scan_token();
            let done = token.kind == TokenKind::Eof;
            tokens.push(token);
            if done {
                return tokens;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        Scanner::new(source, 0)
            .scan_all()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn test_literals() {
        assert_eq!(
            kinds("42 3.25 0x1F \"hi\""),
            vec![
                TokenKind::Int,
                TokenKind::Float,
                TokenKind::Hex,
                TokenKind::Str,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn test_symbols_longest_match() {
        assert_eq!(
            kinds(". -> - + * / % == != < <= > >= @8 !8"),
            vec![
                TokenKind::Dot,
                TokenKind::RightArrow,
                TokenKind::Minus,
                TokenKind::Plus,
                TokenKind::Star,
                TokenKind::Slash,
                TokenKind::Percent,
                TokenKind::EqualEqual,
                TokenKind::NotEqual,
                TokenKind::Less,
                TokenKind::LessEqual,
                TokenKind::Greater,
                TokenKind::GreaterEqual,
                TokenKind::Load8,
                TokenKind::Save8,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn test_keywords_and_words() {
        assert_eq!(
            kinds("if do else loop end set memory static my-word _tmp"),
            vec![
                TokenKind::If,
                TokenKind::Do,
                TokenKind::Else,
                TokenKind::Loop,
                TokenKind::End,
                TokenKind::Set,
                TokenKind::Memory,
                TokenKind::Memory,
                TokenKind::Word,
                TokenKind::Word,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn test_syscall_family() {
        assert_eq!(
            kinds("__sys_call0 __sys_call6 __sys_add __sys_divmod"),
            vec![
                TokenKind::SysCall0,
                TokenKind::SysCall6,
                TokenKind::SysAdd,
                TokenKind::SysDivmod,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn test_directives() {
        assert_eq!(
            kinds("#include \"io\" #clib \"m\""),
            vec![
                TokenKind::HashInclude,
                TokenKind::Str,
                TokenKind::HashClib,
                TokenKind::Str,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn test_locations() {
        let tokens = Scanner::new("1 2\n  three", 0).scan_all();
        assert_eq!((tokens[0].line, tokens[0].column), (1, 1));
        assert_eq!((tokens[1].line, tokens[1].column), (1, 3));
        assert_eq!((tokens[2].line, tokens[2].column), (2, 3));
        assert_eq!(tokens[2].lexeme, "three");
    }

    #[test]
    fn test_unterminated_string() {
        let tokens = Scanner::new("\"oops", 0).scan_all();
        assert_eq!(tokens[0].kind, TokenKind::Error);
        assert_eq!(tokens[0].lexeme, "unterminated string");
    }

    #[test]
    fn test_unknown_character() {
        let tokens = Scanner::new("1 ~ 2", 0).scan_all();
        assert_eq!(tokens[1].kind, TokenKind::Error);
        assert!(tokens[1].lexeme.contains('~'));
    }

    #[test]
    fn test_bare_bang_and_equal_are_errors() {
        assert_eq!(kinds("!")[0], TokenKind::Error);
        assert_eq!(kinds("=")[0], TokenKind::Error);
        assert_eq!(kinds("@")[0], TokenKind::Error);
    }

    #[test]
    fn test_word_with_digits_and_dashes() {
        let tokens = Scanner::new("str-copy2", 0).scan_all();
        assert_eq!(tokens[0].kind, TokenKind::Word);
        assert_eq!(tokens[0].lexeme, "str-copy2");
    }

    #[test]
    fn test_datatype_keywords() {
        assert_eq!(
            kinds("int str bool ptr float hex"),
            vec![
                TokenKind::TypeInt,
                TokenKind::TypeStr,
                TokenKind::TypeBool,
                TokenKind::TypePtr,
                TokenKind::TypeFloat,
                TokenKind::TypeHex,
                TokenKind::Eof
            ]
        );
    }
}
