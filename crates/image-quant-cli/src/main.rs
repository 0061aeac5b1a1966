//! image-quant CLI - protein sequestration quantification

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

/// Mixed-model quantification of Fiji sequestration measurements.
#[derive(Parser)]
#[command(name = "image-quant")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full analysis described by a YAML config
    Run {
        /// YAML configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Measurement CSV (overrides the config's input table)
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Artifact root directory (overrides the config's output path)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Dependent variable(s) to model (overrides the config)
        #[arg(long = "dependent-variable")]
        dependent_variable: Vec<String>,

        /// Skip writing artifacts
        #[arg(long)]
        no_save: bool,
    },

    /// Normalize a Fiji export and report dropped rows
    Preprocess {
        /// Input CSV file
        #[arg(short, long)]
        input: PathBuf,

        /// Groups to keep (comma-separated)
        #[arg(long, value_delimiter = ',')]
        groups: Vec<String>,

        /// Output CSV for the normalized table
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Run { config, input, output, dependent_variable, no_save } => {
            commands::run::run(config, input, output, dependent_variable, no_save, cli.verbose)
        }
        Commands::Preprocess { input, groups, output } => {
            commands::preprocess::run(input, groups, output, cli.verbose)
        }
    }
}
