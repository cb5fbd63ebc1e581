//! vigilar CLI - drift monitoring for tabular data
//!
//! Command-line interface for comparing datasets, replaying a stream through
//! the monitor, and re-rendering stored reports.

use std::{path::PathBuf, process::ExitCode};

use clap::{Parser, Subcommand};

mod basic;
mod compare;
mod replay;

/// vigilar - Data drift monitoring in Pure Rust
#[derive(Parser)]
#[command(name = "vigilar")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compare a current dataset against a baseline dataset
    Compare {
        /// Baseline dataset (Parquet/CSV/JSON)
        #[arg(short, long)]
        baseline: PathBuf,
        /// Current dataset to compare
        #[arg(short, long)]
        current: PathBuf,
        /// Drift config file (JSON)
        #[arg(long)]
        config: Option<PathBuf>,
        /// Columns to leave out of the feature schema
        #[arg(long, value_delimiter = ',')]
        exclude: Vec<String>,
        /// Project identifier recorded in the report
        #[arg(short, long, default_value = "default")]
        project: String,
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
        /// Write the JSON report to this file
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Skip the model-based detector
        #[arg(long)]
        no_model: bool,
        /// Attach a plain-language summary
        #[arg(long)]
        interpret: bool,
    },
    /// Stream a dataset through the monitor in chunks
    Replay {
        /// Dataset to replay, oldest rows first
        input: PathBuf,
        /// Drift config file (JSON)
        #[arg(long)]
        config: Option<PathBuf>,
        /// Override the baseline window size
        #[arg(long)]
        baseline_batch_size: Option<usize>,
        /// Override the monitor window size
        #[arg(long)]
        monitor_batch_size: Option<usize>,
        /// Rows per ingested chunk
        #[arg(long, default_value = "250")]
        chunk_rows: usize,
        /// Columns to leave out of the feature schema
        #[arg(long, value_delimiter = ',')]
        exclude: Vec<String>,
        /// Project identifier recorded in the reports
        #[arg(short, long, default_value = "default")]
        project: String,
        /// Append every report to this JSON Lines file
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Skip the model-based detector
        #[arg(long)]
        no_model: bool,
    },
    /// Re-render a stored report (JSON, or the last entry of a JSON Lines file)
    Render {
        /// Report file
        path: PathBuf,
        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },
    /// Print or write the default drift config
    Config {
        /// Write the config to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

/// Run the vigilar CLI.
pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Compare {
            baseline,
            current,
            config,
            exclude,
            project,
            format,
            output,
            no_model,
            interpret,
        } => compare::cmd_compare(&compare::CompareArgs {
            baseline: &baseline,
            current: &current,
            config: config.as_ref(),
            exclude: &exclude,
            project: &project,
            format: &format,
            output: output.as_ref(),
            no_model,
            interpret,
        }),
        Commands::Replay {
            input,
            config,
            baseline_batch_size,
            monitor_batch_size,
            chunk_rows,
            exclude,
            project,
            output,
            no_model,
        } => replay::cmd_replay(&replay::ReplayArgs {
            input: &input,
            config: config.as_ref(),
            baseline_batch_size,
            monitor_batch_size,
            chunk_rows,
            exclude: &exclude,
            project: &project,
            output: output.as_ref(),
            no_model,
        }),
        Commands::Render { path, format } => compare::cmd_render(&path, &format),
        Commands::Config { output } => basic::cmd_config(output.as_ref()),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
