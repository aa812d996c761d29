//! Skald Compiler CLI
//!
//! Command-line interface for compiling `.sk` programs to executables.

use clap::{CommandFactory, Parser as ClapParser, Subcommand};
use clap_complete::{Shell, generate};
use skc::{CompilerConfig, Stage, backend};
use std::io;
use std::path::PathBuf;
use std::process;
use tracing_subscriber::EnvFilter;

#[derive(ClapParser)]
#[command(name = "skc")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Skald compiler - compile .sk programs to executables", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile an .sk entry file and its includes
    Build {
        /// Input .sk source file
        input: PathBuf,

        /// Output executable path (intermediates derive from it)
        #[arg(short = 'o', long = "out")]
        out: Option<PathBuf>,

        /// Run the executable after a successful build
        #[arg(short = 'r', long)]
        run: bool,

        /// Remove intermediate files after linking
        #[arg(short = 'C', long)]
        clean: bool,

        /// Link with debug information (-g)
        #[arg(short = 'd', long)]
        debug: bool,

        /// Hide informational output
        #[arg(short = 's', long)]
        silent: bool,
    },

    /// Same as build, but runs the result and cleans everything up
    Run {
        /// Input .sk source file
        input: PathBuf,

        /// Output executable path (intermediates derive from it)
        #[arg(short = 'o', long = "out")]
        out: Option<PathBuf>,

        /// Link with debug information (-g)
        #[arg(short = 'd', long)]
        debug: bool,
    },

    /// Generate shell completion scripts
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn main() {
    let cli = Cli::parse();

    match cli.command {
        Commands::Build {
            input,
            out,
            run,
            clean,
            debug,
            silent,
        } => {
            init_tracing(silent, debug);
            let code = run_build(&input, out, run, clean, debug, silent);
            process::exit(code);
        }
        Commands::Run { input, out, debug } => {
            // `run` implies run + clean + silent
            init_tracing(true, debug);
            let code = run_build(&input, out, true, true, debug, true);
            process::exit(code);
        }
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "skc", &mut io::stdout());
        }
    }
}

fn init_tracing(silent: bool, debug: bool) {
    let default_level = if silent {
        "error"
    } else if debug {
        "debug"
    } else {
        "info"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

#[allow(clippy::fn_params_excessive_bools)]
fn run_build(
    input: &PathBuf,
    out: Option<PathBuf>,
    run: bool,
    clean: bool,
    debug: bool,
    silent: bool,
) -> i32 {
    let mut config = match CompilerConfig::new(input) {
        Ok(config) => config,
        Err(message) => {
            eprintln!("ERROR: {message}");
            return Stage::Input.exit_code();
        }
    };
    if let Some(out) = out {
        config.out = out;
    }
    config.run = run;
    config.clean = clean;
    config.debug = debug;
    config.silent = silent;

    let artifact = match skc::build(&config) {
        Ok(artifact) => artifact,
        Err(error) => {
            eprintln!("{error}");
            return error.stage.exit_code();
        }
    };
    if !config.silent {
        for warning in &artifact.warnings {
            eprintln!("Warning: {warning}");
        }
    }

    if config.run {
        if let Err(message) = backend::run_executable(&config) {
            eprintln!("ERROR: {message}");
            return Stage::Backend.exit_code();
        }
    }
    0
}
