//! Source file management
//!
//! The file store owns every preprocessed source buffer for the lifetime of
//! a compile. Files are deduplicated by canonical path, so including the
//! same library from two places registers it once. Newly resolved includes
//! are appended at the end; the two parser passes walk the store by index,
//! which turns it into the include work list.
//!
//! Preprocessing happens once per file, before any scanning:
//! - `;` comments are stripped up to (but not including) the newline, so
//!   line numbers survive.
//! - `_` between two digits is removed, allowing `1_000_000` separators.
//! Every other byte is preserved exactly.

use crate::stdlib;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

pub type FileId = u32;

#[derive(Debug)]
struct SourceFile {
    /// Path shown in diagnostics
    display: String,
    source: String,
}

/// Outcome of resolving an `#include` argument.
#[derive(Debug, PartialEq, Eq)]
pub enum IncludeOutcome {
    /// Registered as a new file, appended to the work list
    Added(FileId),
    /// Already present, nothing to do
    AlreadyLoaded,
}

#[derive(Debug)]
pub struct FileStore {
    files: Vec<SourceFile>,
    by_canonical: HashMap<PathBuf, FileId>,
    project_dir: PathBuf,
    compiler_dir: PathBuf,
}

/// Strip comments and digit separators, preserving newlines.
fn preprocess(source: &str) -> String {
    let bytes = source.as_bytes();
    let mut out: Vec<u8> = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        let c = bytes[i];
        if c == b';' {
            while i < bytes.len() && bytes[i] != b'\n' {
                i += 1;
            }
            continue;
        }
        if c == b'_' {
            let prev_is_digit = out.last().is_some_and(u8::is_ascii_digit);
            let mut j = i;
            while j < bytes.len() && bytes[j] == b'_' {
                j += 1;
            }
            let next_is_digit = j < bytes.len() && bytes[j].is_ascii_digit();
            if prev_is_digit && next_is_digit {
                i = j;
                continue;
            }
        }
        out.push(c);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

impl FileStore {
    pub fn new(project_dir: impl Into<PathBuf>, compiler_dir: impl Into<PathBuf>) -> Self {
        FileStore {
            files: Vec::new(),
            by_canonical: HashMap::new(),
            project_dir: project_dir.into(),
            compiler_dir: compiler_dir.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn display_name(&self, id: FileId) -> &str {
        &self.files[id as usize].display
    }

    pub fn source(&self, id: FileId) -> &str {
        &self.files[id as usize].source
    }

    /// Resolve an include argument to a path. Names ending in `.sk` are
    /// project files; anything else is a library under the compiler
    /// installation.
    fn resolve_path(&self, name: &str) -> PathBuf {
        if name.ends_with(".sk") {
            self.project_dir.join(name)
        } else {
            self.compiler_dir.join("libs").join(format!("{name}.sk"))
        }
    }

    fn add_from_disk(&mut self, path: &Path) -> Result<FileId, String> {
        let canonical = path
            .canonicalize()
            .map_err(|_| format!("could not open file \"{}\"", path.display()))?;
        if let Some(&id) = self.by_canonical.get(&canonical) {
            return Ok(id);
        }
        let raw = fs::read_to_string(&canonical)
            .map_err(|e| format!("could not read file {}: {e}", path.display()))?;
        let id = self.push(path.display().to_string(), preprocess(&raw));
        self.by_canonical.insert(canonical, id);
        Ok(id)
    }

    fn push(&mut self, display: String, source: String) -> FileId {
        let id = self.files.len() as FileId;
        self.files.push(SourceFile { display, source });
        id
    }

    /// Register the entry file given on the command line.
    pub fn add_entry(&mut self, path: &Path) -> Result<FileId, String> {
        let path = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.project_dir.join(path)
        };
        self.add_from_disk(&path)
    }

    /// Register an include target. Library names fall back to the copy
    /// embedded in the compiler when the on-disk library tree is absent.
    pub fn include(&mut self, name: &str) -> Result<IncludeOutcome, String> {
        let path = self.resolve_path(name);
        if path.exists() {
            let before = self.files.len();
            let id = self.add_from_disk(&path)?;
            return Ok(if self.files.len() == before {
                IncludeOutcome::AlreadyLoaded
            } else {
                IncludeOutcome::Added(id)
            });
        }
        if !name.ends_with(".sk") {
            if let Some(embedded) = stdlib::embedded_library(name) {
                let display = format!("<builtin:{name}>");
                if self.files.iter().any(|f| f.display == display) {
                    return Ok(IncludeOutcome::AlreadyLoaded);
                }
                let id = self.push(display, preprocess(embedded));
                return Ok(IncludeOutcome::Added(id));
            }
        }
        Err(format!("failed to find library to include: {name}"))
    }

    /// Register an in-memory source. Used by tests and the `compile_source`
    /// helpers; virtual files never collide with disk paths.
    pub fn add_virtual(&mut self, display: &str, source: &str) -> FileId {
        self.push(display.to_string(), preprocess(source))
    }
}
