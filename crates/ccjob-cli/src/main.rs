//! ccjob - batch jobs over web-archive (WARC) datasets
//!
//! Reads a list of archive references, extracts key/value pairs from every
//! record and prints the aggregated pairs as `json(key)\tjson(value)` lines.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use ccjob_core::{ProgressContext, Verbosity};

mod cmd;
mod config;
mod jobs;

use config::Config;

#[derive(Parser)]
#[command(name = "ccjob")]
#[command(about = "Batch jobs over web-archive datasets")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    /// Only log warnings and errors
    #[arg(short, long, global = true, conflicts_with = "debug")]
    quiet: bool,

    /// Config file path (default: ./ccjob.toml or ~/.config/ccjob/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Read timeout in seconds for stall detection
    #[arg(long, global = true)]
    read_timeout: Option<u64>,

    /// Maximum retry attempts for transient download failures
    #[arg(long, global = true)]
    max_retries: Option<u32>,
}

#[derive(Subcommand)]
enum Command {
    /// Run a job over a file of archive references
    Run(cmd::run::RunArgs),
    /// Show current configuration
    Config,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Progress context (TTY auto-detect)
    let progress = ProgressContext::new();

    let verbosity = if cli.debug {
        Verbosity::Debug
    } else if cli.quiet {
        Verbosity::Quiet
    } else {
        Verbosity::Normal
    };
    let multi = progress.is_tty().then(|| progress.multi());
    ccjob_core::init_logging(verbosity, multi).context("Failed to initialise logging")?;

    ccjob_core::install_signal_handlers().context("Failed to install signal handlers")?;

    let config = match cli.config {
        Some(path) => Config::from_file(&path)?,
        None => Config::load()?,
    };

    // Config file defaults, CLI overrides
    let mut job_config = config.job_config();
    if let Some(secs) = cli.read_timeout {
        job_config.read_timeout = Duration::from_secs(secs);
    }
    if let Some(retries) = cli.max_retries {
        job_config.retry.max_retries = retries;
    }

    match cli.command {
        Command::Run(args) => cmd::run::run(args, &config, job_config, &progress),
        Command::Config => {
            use comfy_table::{
                Cell, Color, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL,
            };

            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .apply_modifier(UTF8_ROUND_CORNERS)
                .set_header(vec![
                    Cell::new("Setting").fg(Color::Cyan),
                    Cell::new("Value").fg(Color::Cyan),
                ]);

            table.add_row(vec!["Bucket", &job_config.bucket]);
            table.add_row(vec!["Endpoint", &job_config.endpoint]);
            table.add_row(vec![
                "Base directory",
                &job_config.base_dir.display().to_string(),
            ]);
            table.add_row(vec![
                "Scratch directory",
                &job_config
                    .scratch_dir
                    .as_ref()
                    .map_or_else(|| "(system temp)".to_string(), |d| d.display().to_string()),
            ]);
            table.add_row(vec![
                "Spill threshold",
                &format!("{} MiB", job_config.spill_threshold / (1024 * 1024)),
            ]);
            table.add_row(vec![
                "Workers",
                &format!("{} (max: {})", config.workers.default, config.workers.max),
            ]);
            table.add_row(vec![
                "Read timeout",
                &format!("{}s", job_config.read_timeout.as_secs()),
            ]);
            table.add_row(vec![
                "Connect timeout",
                &format!("{}s", job_config.connect_timeout.as_secs()),
            ]);
            table.add_row(vec![
                "Max retries",
                &job_config.retry.max_retries.to_string(),
            ]);
            table.add_row(vec![
                "Max backoff",
                &format!("{}s", job_config.retry.max_backoff.as_secs()),
            ]);

            eprintln!("\n{table}");
            Ok(())
        }
    }
}
