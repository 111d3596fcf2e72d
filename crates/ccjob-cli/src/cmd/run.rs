//! `ccjob run` - run a bundled job over a list of archives

use std::fs::File;
use std::hash::Hash;
use std::io::{self, BufRead, BufWriter};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use comfy_table::{Cell, Color, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL};
use serde::Serialize;

use ccjob_core::progress::fmt_num;
use ccjob_core::{
    Aggregator, Extractor, JobConfig, MapReduceJob, ProgressContext, RunMode, RunOptions, Sum,
    Unconfigured, output,
};

use crate::config::Config;
use crate::jobs::{self, JobKind};

#[derive(Args, Debug)]
pub struct RunArgs {
    /// File with one archive reference per line ("-" reads stdin)
    pub input: PathBuf,

    /// Extraction to run
    #[arg(short, long, value_enum, default_value_t = JobKind::RecordTypes)]
    pub job: JobKind,

    /// Execution runner: local/inline read local files, emr/hadoop read the bucket
    #[arg(short = 'r', long, default_value = "local")]
    pub runner: String,

    /// Directory for download scratch files
    #[arg(long = "s3-local-temp-dir")]
    pub s3_local_temp_dir: Option<PathBuf>,

    /// Directory local references are resolved against (default: executable dir)
    #[arg(long)]
    pub base_dir: Option<PathBuf>,

    /// Bucket holding remote archives
    #[arg(long)]
    pub bucket: Option<String>,

    /// Number of parallel workers
    #[arg(short, long)]
    pub workers: Option<usize>,

    /// Maximum number of input lines to process
    #[arg(short = 'l', long)]
    pub limit: Option<usize>,

    /// Write output pairs here instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

pub fn run(
    args: RunArgs,
    config: &Config,
    mut job_config: JobConfig,
    progress: &ProgressContext,
) -> Result<()> {
    job_config.mode = RunMode::from_runner(&args.runner)?;
    if let Some(dir) = args.s3_local_temp_dir {
        job_config.scratch_dir = Some(dir);
    }
    if let Some(dir) = args.base_dir {
        job_config.base_dir = dir;
    }
    if let Some(bucket) = args.bucket {
        job_config.bucket = bucket;
    }

    let inputs = read_lines(&args.input)?;
    let options = RunOptions {
        workers: args
            .workers
            .unwrap_or(config.workers.default)
            .clamp(1, config.workers.max.max(1)),
        max_inputs: args.limit,
    };

    log::info!("Running {} job ({} mode)", args.job, job_config.mode);
    log::info!("  Input: {} ({} lines)", args.input.display(), inputs.len());
    if let Some(ref dir) = job_config.scratch_dir {
        log::info!("  Scratch: {}", dir.display());
    }

    let output = args.output.as_deref();
    match args.job {
        JobKind::RecordTypes => {
            let job = MapReduceJob::new(&job_config, jobs::record_types, Sum)?;
            execute(&job, &inputs, &options, output, progress)
        }
        JobKind::Servers => {
            let job = MapReduceJob::new(&job_config, jobs::servers, Sum)?;
            execute(&job, &inputs, &options, output, progress)
        }
        JobKind::Hosts => {
            let job = MapReduceJob::new(&job_config, jobs::hosts, Sum)?;
            execute(&job, &inputs, &options, output, progress)
        }
        JobKind::Base => {
            let job = MapReduceJob::new(&job_config, Unconfigured::<String, u64>::default(), Sum)?;
            execute(&job, &inputs, &options, output, progress)
        }
    }
}

fn execute<E, A>(
    job: &MapReduceJob<E, A>,
    inputs: &[String],
    options: &RunOptions,
    output_path: Option<&Path>,
    progress: &ProgressContext,
) -> Result<()>
where
    E: Extractor,
    E::Key: Hash + Eq + Ord + Send + Serialize,
    E::Value: Send + Serialize,
    A: Aggregator<E::Key, E::Value>,
{
    let result = ccjob_core::run(job, inputs, options, progress)?;

    let written = match output_path {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create {}", path.display()))?;
            output::write_pairs(&mut BufWriter::new(file), &result.output)?
        }
        None => output::write_pairs(&mut io::stdout().lock(), &result.output)?,
    };

    let summary = &result.summary;
    print_summary(&[
        (
            "Archives",
            format!(
                "{}/{} ({} skipped, {} truncated)",
                summary.completed_inputs,
                summary.total_inputs,
                summary.skipped_inputs,
                summary.truncated_inputs
            ),
        ),
        (
            "Records",
            format!(
                "{} ({} malformed)",
                fmt_num(summary.processed_records),
                fmt_num(summary.malformed_records)
            ),
        ),
        ("Keys", fmt_num(written as u64)),
        ("Time", format!("{:.1}s", summary.elapsed.as_secs_f64())),
    ]);

    if summary.interrupted {
        anyhow::bail!("Interrupted before all archives were processed");
    }
    Ok(())
}

/// Input lines from a file, or stdin for "-"
fn read_lines(input: &Path) -> Result<Vec<String>> {
    if input == Path::new("-") {
        return io::stdin()
            .lock()
            .lines()
            .collect::<io::Result<_>>()
            .context("Failed to read input lines from stdin");
    }
    ccjob_core::read_inputs(input)
        .with_context(|| format!("Failed to read input file: {}", input.display()))
}

/// Print a key-value summary table on stderr
fn print_summary(rows: &[(&str, String)]) {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(vec![
            Cell::new("Job").fg(Color::Cyan),
            Cell::new("Value").fg(Color::Cyan),
        ]);
    for (label, value) in rows {
        table.add_row(vec![Cell::new(label), Cell::new(value)]);
    }
    eprintln!("\n{table}");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_lines_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("paths.txt");
        std::fs::write(&path, "a.warc.gz\nb.warc.gz\n").unwrap();
        assert_eq!(read_lines(&path).unwrap(), vec!["a.warc.gz", "b.warc.gz"]);
    }

    #[test]
    fn read_lines_missing_file() {
        let err = read_lines(Path::new("/nonexistent/paths.txt")).unwrap_err();
        assert!(err.to_string().contains("Failed to read input file"));
    }

    #[test]
    fn unknown_runner_is_rejected() {
        let args = RunArgs {
            input: PathBuf::from("paths.txt"),
            job: JobKind::RecordTypes,
            runner: "mainframe".to_string(),
            s3_local_temp_dir: None,
            base_dir: None,
            bucket: None,
            workers: None,
            limit: None,
            output: None,
        };
        let err = run(
            args,
            &Config::default(),
            JobConfig::default(),
            &ProgressContext::hidden(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("unknown runner"));
    }
}
