//! Compiler configuration
//!
//! The configuration record handed to the pipeline: entry file, output
//! path, the two lookup directories (project root for `.sk` includes, the
//! compiler installation for libraries), linker libraries and behaviour
//! flags. An optional `skald.toml` manifest next to the entry file supplies
//! defaults; command-line flags override it.

use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const MANIFEST_NAME: &str = "skald.toml";

#[derive(Debug, Clone)]
pub struct CompilerConfig {
    /// The entry `.sk` file
    pub entry: PathBuf,
    /// Output executable path; the `.s` and `.o` intermediates derive
    /// from it
    pub out: PathBuf,
    /// Folder the entry file lives in; anchors `#include "x/y.sk"`
    pub project_dir: PathBuf,
    /// Folder the compiler lives in; anchors `#include "io"` to
    /// `<compiler_dir>/libs/io.sk`
    pub compiler_dir: PathBuf,
    /// Libraries to link beyond the ones `#clib` collects
    pub clibs: Vec<String>,
    /// Run the executable after a successful build
    pub run: bool,
    /// Remove intermediate files (and, after `run`, the executable)
    pub clean: bool,
    /// Pass `-g` to the linker
    pub debug: bool,
    /// Suppress informational output
    pub silent: bool,
}

impl CompilerConfig {
    /// Build a configuration for `entry`, loading the project manifest
    /// when one is present next to it.
    pub fn new(entry: &Path) -> Result<Self, String> {
        if entry.extension().and_then(|e| e.to_str()) != Some("sk") {
            return Err(format!(
                "entry file must end in .sk, got {}\n\
                 E.g.:\n\tskc run myfile.sk\n\t        ^^^^^^^^^",
                entry.display()
            ));
        }
        let project_dir = match entry.parent() {
            Some(parent) if parent.as_os_str().is_empty() => PathBuf::from("."),
            Some(parent) => parent.to_path_buf(),
            None => PathBuf::from("."),
        };
        let compiler_dir = std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(Path::to_path_buf))
            .unwrap_or_else(|| PathBuf::from("."));

        let mut config = CompilerConfig {
            entry: entry.to_path_buf(),
            out: PathBuf::from("output"),
            project_dir,
            compiler_dir,
            clibs: Vec::new(),
            run: false,
            clean: false,
            debug: false,
            silent: false,
        };
        if let Some(manifest) = Manifest::load_from(&config.project_dir)? {
            config.apply_manifest(manifest);
        }
        Ok(config)
    }

    fn apply_manifest(&mut self, manifest: Manifest) {
        if let Some(out) = manifest.build.out {
            self.out = PathBuf::from(out);
        }
        for lib in manifest.build.clibs {
            if !self.clibs.contains(&lib) {
                self.clibs.push(lib);
            }
        }
    }
}

/// Project manifest (`skald.toml`):
///
/// ```toml
/// [build]
/// out = "my-tool"
/// clibs = ["m"]
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub build: BuildSection,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BuildSection {
    pub out: Option<String>,
    #[serde(default)]
    pub clibs: Vec<String>,
}

impl Manifest {
    pub fn from_toml(text: &str) -> Result<Self, String> {
        toml::from_str(text).map_err(|e| format!("failed to parse {MANIFEST_NAME}: {e}"))
    }

    /// Load `skald.toml` from `dir` when present.
    pub fn load_from(dir: &Path) -> Result<Option<Self>, String> {
        let path = dir.join(MANIFEST_NAME);
        if !path.exists() {
            return Ok(None);
        }
        let text = std::fs::read_to_string(&path)
            .map_err(|e| format!("could not read {}: {e}", path.display()))?;
        Manifest::from_toml(&text).map(Some)
    }
}
