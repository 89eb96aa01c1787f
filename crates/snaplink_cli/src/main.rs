//! snaplink CLI: generates startup snapshot scripts from a module entry point.
//!
//! Provides `snaplink generate` to assemble the snapshot script configured in
//! `snaplink.toml`, `snaplink translate` to map a script row back to its
//! original file, and `snaplink cache keys` to inspect the transform cache.

#![warn(missing_docs)]

mod cache;
mod generate;
mod logger;
mod project;
mod translate;

use std::process;

use clap::{Parser, Subcommand};

/// snaplink: module graphs in, snapshot scripts out.
#[derive(Parser, Debug)]
#[command(name = "snaplink", version, about = "Snapshot script generator")]
pub struct Cli {
    /// Suppress all output except errors.
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Enable verbose (debug-level) output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to a custom `snaplink.toml` configuration file.
    #[arg(long, global = true)]
    pub config: Option<String>,

    /// The subcommand to run.
    #[command(subcommand)]
    pub command: Command,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Generate the snapshot script for the current project.
    Generate(GenerateArgs),
    /// Translate a row of a generated script to its original file and row.
    Translate(TranslateArgs),
    /// Inspect the transform cache.
    Cache {
        /// The cache subcommand to run.
        #[command(subcommand)]
        command: CacheCommand,
    },
}

/// Arguments for the `snaplink generate` subcommand.
#[derive(Parser, Debug)]
pub struct GenerateArgs {
    /// Output path, overriding `snapshot.output`.
    #[arg(short, long)]
    pub output: Option<String>,
}

/// Arguments for the `snaplink translate` subcommand.
#[derive(Parser, Debug)]
pub struct TranslateArgs {
    /// 0-based row in the generated script.
    pub row: usize,

    /// Script to read, instead of the configured output.
    #[arg(short, long)]
    pub script: Option<String>,
}

/// `snaplink cache` subcommands.
#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum CacheCommand {
    /// Print the record keys persisted for the configured invalidation key.
    Keys,
}

/// Global settings derived from CLI flags.
pub struct GlobalArgs {
    /// Whether to suppress non-error output.
    pub quiet: bool,
    /// Whether to print verbose/debug information.
    pub verbose: bool,
    /// Optional path to a custom config file.
    pub config: Option<String>,
}

fn main() {
    let cli = Cli::parse();

    logger::init(cli.quiet, cli.verbose);

    let global = GlobalArgs {
        quiet: cli.quiet,
        verbose: cli.verbose,
        config: cli.config,
    };

    let result = match cli.command {
        Command::Generate(ref args) => generate::run(args, &global),
        Command::Translate(ref args) => translate::run(args, &global),
        Command::Cache { ref command } => cache::run(command, &global),
    };

    match result {
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("error: {e}");
            process::exit(1);
        }
    }
}
