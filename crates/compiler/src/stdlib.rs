//! Embedded standard library
//!
//! The `basics` library is compiled into the binary so a bare `skc` works
//! without an installed library tree. An on-disk `libs/basics.sk` next to
//! the compiler takes precedence when present.

/// Look up an embedded library by include name.
pub fn embedded_library(name: &str) -> Option<&'static str> {
    match name {
        "basics" => Some(include_str!("../libs/basics.sk")),
        "io" => Some(include_str!("../libs/io.sk")),
        _ => None,
    }
}
