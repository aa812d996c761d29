//! Output file assembly
//!
//! Stitches the four text pools produced by the generator into the final
//! `.s` artifact: prologue, the `dump` integer printer, the `main` entry
//! label, the lowered code, then the string, float and memory sections.

use super::CodeGen;
use std::fmt::Write as _;

/// The integer print routine linked into every program. An unrolled
/// base-10 printer over a 40-byte scratch frame; the final `call write`
/// resolves against libc.
pub const DUMP_ROUTINE: &str = "\
dump:
    movabsq $-3689348814741910323, r8
    subq    $40, rsp
    movb    $10, 31(rsp)
    leaq    30(rsp), rcx
.L2:
    movq    rdi, rax
    mulq    r8
    movq    rdi, rax
    shrq    $3, rdx
    leaq    (rdx,rdx,4), rsi
    addq    rsi, rsi
    subq    rsi, rax
    movq    rcx, rsi
    subq    $1, rcx
    addl    $48, eax
    movb    al, 1(rcx)
    movq    rdi, rax
    movq    rdx, rdi
    cmpq    $9, rax
    ja      .L2
    leaq    32(rsp), rdx
    movl    $1, edi
    subq    rsi, rdx
    call    write
    addq    $40, rsp
    ret
";

impl CodeGen<'_> {
    /// Build the final assembly file from the lowered pools.
    pub(super) fn assemble(&self) -> Result<String, std::fmt::Error> {
        let mut out = String::new();
        writeln!(out, ".att_syntax noprefix")?;
        writeln!(out, ".global main")?;
        out.push_str(DUMP_ROUTINE);
        writeln!(out, "main:")?;
        out.push_str(&self.text);

        if !self.strs.is_empty() {
            writeln!(out)?;
            for (index, body) in self.strs.iter().enumerate() {
                writeln!(out, "str_{index}: .string \"{body}\"")?;
            }
        }
        if !self.flts.is_empty() {
            writeln!(out)?;
            for line in &self.flts {
                writeln!(out, "{line}")?;
            }
        }
        if !self.mems.is_empty() {
            writeln!(out)?;
            for line in &self.mems {
                writeln!(out, "{line}")?;
            }
        }
        Ok(out)
    }
}
