//! The `vectra` command-line tool.
//!
//! ```text
//! vectra compile <file>
//! vectra snap <rects.json> <x> <y> <w> <h> [threshold]
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use thiserror::Error;
use vectra_core::{Compiler, CompilerOptions, LayoutEngine, Rect};

/// CLI errors.
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Args(#[from] clap::Error),
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Parser)]
#[command(
    name = "vectra",
    about = "Compile components and run snap queries with the Vectra engine",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, PartialEq, Subcommand)]
pub enum Command {
    /// Compile a TSX component module and print the result.
    Compile {
        /// Component source file.
        file: PathBuf,
    },

    /// Snap a dragged rect against the rects listed in a JSON file.
    #[command(allow_negative_numbers = true)]
    Snap {
        /// JSON array of `{x, y, w, h}` objects.
        rects: PathBuf,
        x: f64,
        y: f64,
        w: f64,
        h: f64,
        /// Snap distance; defaults to the engine's threshold.
        threshold: Option<f64>,
    },
}

impl Command {
    /// Execute the command, returning what to print.
    pub fn execute(&self) -> Result<String, CliError> {
        match self {
            Command::Compile { file } => {
                let source = read(file)?;
                let mut compiler = Compiler::new(CompilerOptions::default());
                Ok(compiler.compile(&source))
            }
            Command::Snap {
                rects,
                x,
                y,
                w,
                h,
                threshold,
            } => {
                let rects: Vec<Rect> = serde_json::from_str(&read(rects)?)?;
                let mut engine = LayoutEngine::new();
                engine.sync(&rects);
                let result = engine.query(*x, *y, *w, *h, *threshold);
                Ok(serde_json::to_string_pretty(&result)?)
            }
        }
    }
}

/// Parse and execute a command line, program name excluded.
pub fn run(args: &[String]) -> Result<String, CliError> {
    let cli = Cli::try_parse_from(std::iter::once("vectra").chain(args.iter().map(String::as_str)))?;
    log::debug!("Running {:?}", cli.command);
    cli.command.execute()
}

fn read(path: &Path) -> Result<String, CliError> {
    fs::read_to_string(path).map_err(|source| CliError::Io {
        path: path.to_path_buf(),
        source,
    })
}
