//! Diagnostic reporting
//!
//! All located errors funnel through [`Reporter`]. Parse-time errors set a
//! panic flag that suppresses the cascade until the parser resynchronises;
//! each phase checks [`Reporter::erred`] before the next phase is allowed to
//! run.

use crate::scanner::{Token, TokenKind};
use std::fmt;

/// A single located error message.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    /// Display path of the file the token came from
    pub file: String,
    pub line: u32,
    pub column: u32,
    /// Lexeme of the offending token, empty at end of file
    pub lexeme: String,
    pub at_eof: bool,
    /// The token came out of the scanner as a lexical error; its lexeme is
    /// the scanner's message, not source text
    pub while_lexing: bool,
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}: ERROR ", self.file, self.line, self.column)?;
        if self.at_eof {
            write!(f, "at end of file")?;
        } else if self.while_lexing {
            write!(f, "while lexing file")?;
        } else {
            write!(f, "at '{}'", self.lexeme)?;
        }
        write!(f, ": {}", self.message)
    }
}

/// Collecting error sink shared by the two parser passes and the
/// typechecker.
#[derive(Debug, Default)]
pub struct Reporter {
    diagnostics: Vec<Diagnostic>,
    /// Suppresses further reports until the parser synchronises
    panic: bool,
    erred: bool,
}

impl Reporter {
    pub fn new() -> Self {
        Reporter::default()
    }

    /// Report an error located at `token`. No-op while in panic mode.
    pub fn error_at(&mut self, token: &Token, file: &str, message: impl Into<String>) {
        if self.panic {
            return;
        }
        self.panic = true;
        self.erred = true;
        self.diagnostics.push(Diagnostic {
            file: file.to_string(),
            line: token.line,
            column: token.column,
            lexeme: token.lexeme.clone(),
            at_eof: token.kind == TokenKind::Eof,
            while_lexing: token.kind == TokenKind::Error,
            message: message.into(),
        });
    }

    pub fn in_panic(&self) -> bool {
        self.panic
    }

    /// Called by the parser once it has skipped to a synchronisation point.
    pub fn exit_panic(&mut self) {
        self.panic = false;
    }

    /// True once any error has been reported, across all files and passes.
    pub fn erred(&self) -> bool {
        self.erred
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn take_diagnostics(&mut self) -> Vec<Diagnostic> {
        std::mem::take(&mut self.diagnostics)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanner::{Token, TokenKind};

    fn word(lexeme: &str) -> Token {
        Token {
            kind: TokenKind::Word,
            lexeme: lexeme.to_string(),
            file: 0,
            line: 3,
            column: 7,
        }
    }

    #[test]
    fn test_display_format() {
        let mut reporter = Reporter::new();
        reporter.error_at(&word("frobnicate"), "main.sk", "unknown word");
        let rendered = reporter.diagnostics()[0].to_string();
        assert_eq!(rendered, "main.sk:3:7: ERROR at 'frobnicate': unknown word");
    }

    #[test]
    fn test_panic_suppresses_cascade() {
        let mut reporter = Reporter::new();
        reporter.error_at(&word("a"), "main.sk", "first");
        reporter.error_at(&word("b"), "main.sk", "second");
        assert_eq!(reporter.diagnostics().len(), 1);

        reporter.exit_panic();
        reporter.error_at(&word("c"), "main.sk", "third");
        assert_eq!(reporter.diagnostics().len(), 2);
        assert!(reporter.erred());
    }

    #[test]
    fn test_eof_rendering() {
        let mut reporter = Reporter::new();
        let token = Token {
            kind: TokenKind::Eof,
            lexeme: String::new(),
            file: 0,
            line: 9,
            column: 1,
        };
        reporter.error_at(&token, "lib.sk", "'end' expected");
        assert_eq!(
            reporter.diagnostics()[0].to_string(),
            "lib.sk:9:1: ERROR at end of file: 'end' expected"
        );
    }
}
