//! Quantbench CLI - benchmark quantized GGUF models
//!
//! Runs the resource, accuracy and MMLU batteries over a list of models and
//! renders the saved result documents.

use anyhow::Result;
use clap::{Parser, Subcommand};
use console::style;
use std::path::PathBuf;
use tracing::{debug, info, Level};
use tracing_subscriber::FmtSubscriber;

mod commands;
mod config;
mod render;
mod utils;

use commands::{
    accuracy::AccuracyCommand, mmlu::MmluCommand, resource::ResourceCommand, show::ShowCommand,
    Command,
};

#[derive(Parser)]
#[command(
    name = "quantbench",
    version = env!("CARGO_PKG_VERSION"),
    about = "Benchmark quantized language models",
    long_about = "Measure speed, memory and answer quality of quantized GGUF models served by llama.cpp, and compare them side by side."
)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    /// Quiet output (errors only)
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Configuration file path
    #[arg(short, long, global = true, env = "QUANTBENCH_CONFIG")]
    config: Option<PathBuf>,

    /// JSON output format
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Measure TTFT, throughput and memory per model
    #[command(name = "resource", alias = "bench")]
    Resource(ResourceCommand),

    /// Score free-form answers by semantic similarity
    #[command(name = "accuracy", alias = "acc")]
    Accuracy(AccuracyCommand),

    /// Score multiple-choice answers on an MMLU-style bank
    #[command(name = "mmlu")]
    Mmlu(MmluCommand),

    /// Render a saved result document
    #[command(name = "show")]
    Show(ShowCommand),
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    init_logging(&cli)?;

    debug!("Quantbench CLI v{} starting", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = config::Config::load(cli.config.as_deref())?;
    debug!("Configuration loaded: {:?}", config);

    let ui = utils::Ui {
        json: cli.json,
        quiet: cli.quiet,
    };

    let result = match &cli.command {
        Commands::Resource(cmd) => cmd.execute(&config, ui),
        Commands::Accuracy(cmd) => cmd.execute(&config, ui),
        Commands::Mmlu(cmd) => cmd.execute(&config, ui),
        Commands::Show(cmd) => cmd.execute(&config, ui),
    };

    match result {
        Ok(_) => {
            if !cli.quiet {
                info!("Command completed successfully");
            }
            Ok(())
        }
        Err(e) => {
            eprintln!("{} {:#}", style("Error:").red().bold(), e);
            std::process::exit(1);
        }
    }
}

fn init_logging(cli: &Cli) -> Result<()> {
    let level = if cli.debug {
        Level::DEBUG
    } else if cli.verbose {
        Level::INFO
    } else if cli.quiet {
        Level::ERROR
    } else {
        Level::WARN
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}
