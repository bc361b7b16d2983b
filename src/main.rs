//! Stackprof CLI
//!
//! Drives a sampling session against a synthetic capture source and
//! inspects the resulting thread profiles.

use anyhow::Result;
use clap::{Parser, Subcommand};
use env_logger::Env;
use std::path::PathBuf;

mod commands;

use commands::{
    display_schema, display_version, execute_run, validate_args, validate_profile_file, RunArgs,
};

/// Stackprof - call-tree aggregation for sampling profilers
#[derive(Parser, Debug)]
#[command(name = "stackprof")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

/// Available commands
#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a synthetic profiling session and write its profile
    Run {
        /// Session length in milliseconds
        #[arg(long, default_value = "2000")]
        duration_ms: u64,

        /// Sampling interval in milliseconds
        #[arg(long, default_value = "10")]
        frequency_ms: u64,

        /// JSON profiler configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Maximum number of nodes kept in the reported tree
        #[arg(long)]
        budget: Option<usize>,

        /// Output path for JSON profile
        #[arg(short, long, default_value = "profile.json")]
        output: PathBuf,

        /// Session id reported with the profile
        #[arg(long, default_value = "1")]
        session_id: i32,

        /// Number of simulated threads
        #[arg(long, default_value = "4")]
        threads: u64,

        /// Print text summary to stdout
        #[arg(long)]
        summary: bool,
    },

    /// Validate a profile JSON file
    Validate {
        /// Path to profile JSON file
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Display schema information
    Schema {
        /// Show full schema details
        #[arg(long)]
        show: bool,
    },

    /// Display version information
    Version,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(Env::default().default_filter_or(log_level)).init();

    match cli.command {
        Commands::Run {
            duration_ms,
            frequency_ms,
            config,
            budget,
            output,
            session_id,
            threads,
            summary,
        } => {
            let args = RunArgs {
                session_id,
                frequency_ms,
                duration_ms,
                config,
                budget,
                output,
                threads,
                print_summary: summary,
            };

            validate_args(&args)?;
            execute_run(args)?;
        }

        Commands::Validate { file } => {
            validate_profile_file(file)?;
        }

        Commands::Schema { show } => {
            display_schema(show);
        }

        Commands::Version => {
            display_version();
        }
    }

    Ok(())
}
