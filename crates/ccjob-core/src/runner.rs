//! In-process job execution: map each input line on a worker pool, combine
//! each line's output, group by key in memory, reduce per key.

use std::hash::Hash;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use rustc_hash::FxHashMap;

use crate::counters::{self, Counters};
use crate::error::JobError;
use crate::job::{Aggregator, Extractor, MapReduceJob, Outcome};
use crate::progress::{ProgressContext, fmt_num};
use crate::shutdown::is_shutdown_requested;

/// Execution options for [`run`]
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Parallel mapper threads
    pub workers: usize,
    /// Process only the first N input lines
    pub max_inputs: Option<usize>,
}

impl Default for RunOptions {
    fn default() -> Self {
        let cpus = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4);
        Self {
            workers: cpus.min(8),
            max_inputs: None,
        }
    }
}

/// Summary of a job run
#[derive(Debug)]
pub struct RunSummary {
    pub total_inputs: usize,
    pub completed_inputs: usize,
    pub skipped_inputs: usize,
    pub truncated_inputs: usize,
    pub empty_inputs: usize,
    pub processed_records: u64,
    pub malformed_records: u64,
    pub output_pairs: usize,
    pub counters: Counters,
    /// Stopped early by a shutdown signal
    pub interrupted: bool,
    pub elapsed: Duration,
}

impl RunSummary {
    pub fn empty() -> Self {
        Self {
            total_inputs: 0,
            completed_inputs: 0,
            skipped_inputs: 0,
            truncated_inputs: 0,
            empty_inputs: 0,
            processed_records: 0,
            malformed_records: 0,
            output_pairs: 0,
            counters: Counters::new(),
            interrupted: false,
            elapsed: Duration::ZERO,
        }
    }

    pub fn log(&self) {
        log::info!("=== Job Summary ===");
        log::info!(
            "Archives: {}/{} completed ({} skipped, {} truncated)",
            self.completed_inputs,
            self.total_inputs,
            self.skipped_inputs,
            self.truncated_inputs
        );
        log::info!(
            "Records: {} processed ({} malformed)",
            fmt_num(self.processed_records),
            fmt_num(self.malformed_records)
        );
        log::info!("Output: {} keys", fmt_num(self.output_pairs as u64));
        log::info!("Time: {:.1}s", self.elapsed.as_secs_f64());
        if self.processed_records > 0 && !self.elapsed.is_zero() {
            let rate = self.processed_records as f64 / self.elapsed.as_secs_f64();
            log::info!("Throughput: {:.0} records/sec", rate);
        }
        if self.interrupted {
            log::warn!("Run was interrupted; output covers only the archives processed");
        }
        for line in self.counters.reporter_lines() {
            log::debug!("{line}");
        }
    }
}

/// Reduced output, sorted by key, plus the run summary
#[derive(Debug)]
pub struct RunResult<K, V> {
    pub output: Vec<(K, V)>,
    pub summary: RunSummary,
}

/// Read one archive reference per line
pub fn read_inputs(path: &Path) -> std::io::Result<Vec<String>> {
    Ok(std::fs::read_to_string(path)?
        .lines()
        .map(str::to_string)
        .collect())
}

#[derive(Default)]
struct Tally {
    counters: Counters,
    completed: usize,
    skipped: usize,
    truncated: usize,
    empty: usize,
}

impl Tally {
    fn record(&mut self, outcome: Outcome, counters: &Counters) {
        match outcome {
            Outcome::Completed => self.completed += 1,
            Outcome::Skipped => self.skipped += 1,
            Outcome::Truncated => self.truncated += 1,
            Outcome::Empty => self.empty += 1,
        }
        self.counters.merge(counters);
    }
}

/// Group one mapper's emissions by key and run the combiner on each group
pub fn combine_locally<E, A>(
    job: &MapReduceJob<E, A>,
    emissions: Vec<(E::Key, E::Value)>,
) -> Vec<(E::Key, E::Value)>
where
    E: Extractor,
    E::Key: Hash + Eq,
    A: Aggregator<E::Key, E::Value>,
{
    let mut groups: FxHashMap<E::Key, Vec<E::Value>> = FxHashMap::default();
    for (key, value) in emissions {
        groups.entry(key).or_default().push(value);
    }
    groups
        .into_iter()
        .flat_map(|(key, values)| job.combine(key, values))
        .collect()
}

/// Run `job` over `inputs`.
///
/// Lines whose archive cannot be read are skipped and counted; a
/// [`JobError`] from any line stops the run and is returned.
pub fn run<E, A>(
    job: &MapReduceJob<E, A>,
    inputs: &[String],
    options: &RunOptions,
    progress: &ProgressContext,
) -> Result<RunResult<E::Key, E::Value>, JobError>
where
    E: Extractor,
    E::Key: Hash + Eq + Ord + Send,
    E::Value: Send,
    A: Aggregator<E::Key, E::Value>,
{
    let start = Instant::now();

    let inputs = match options.max_inputs {
        Some(max) => &inputs[..max.min(inputs.len())],
        None => inputs,
    };
    if inputs.is_empty() {
        log::warn!("No inputs to process");
        return Ok(RunResult {
            output: Vec::new(),
            summary: RunSummary::empty(),
        });
    }

    let workers = options.workers.clamp(1, inputs.len());
    log::info!(
        "Processing {} archives with {} workers ({} mode)",
        inputs.len(),
        workers,
        job.mode()
    );

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .build()
        .map_err(|e| JobError::Config(format!("failed to create thread pool: {e}")))?;

    // Work distribution by atomic index; shared state behind mutexes
    let next_idx = AtomicUsize::new(0);
    let abort = AtomicBool::new(false);
    let fatal: Mutex<Option<JobError>> = Mutex::new(None);
    let grouped: Mutex<FxHashMap<E::Key, Vec<E::Value>>> = Mutex::new(FxHashMap::default());
    let tally: Mutex<Tally> = Mutex::new(Tally::default());
    let bar = progress.inputs_bar(inputs.len());

    pool.scope(|s| {
        for _ in 0..workers {
            s.spawn(|_| {
                loop {
                    if abort.load(Ordering::Relaxed) || is_shutdown_requested() {
                        break;
                    }
                    let idx = next_idx.fetch_add(1, Ordering::SeqCst);
                    let Some(line) = inputs.get(idx) else {
                        break;
                    };

                    match job.map(line) {
                        Ok(out) => {
                            let combined = combine_locally(job, out.emissions);
                            let mut groups = grouped.lock().unwrap_or_else(PoisonError::into_inner);
                            for (key, value) in combined {
                                groups.entry(key).or_default().push(value);
                            }
                            drop(groups);
                            tally
                                .lock()
                                .unwrap_or_else(PoisonError::into_inner)
                                .record(out.outcome, &out.counters);
                        }
                        Err(e) => {
                            log::error!("{}: {e}", line.trim());
                            abort.store(true, Ordering::Relaxed);
                            let mut slot = fatal.lock().unwrap_or_else(PoisonError::into_inner);
                            if slot.is_none() {
                                *slot = Some(e);
                            }
                        }
                    }
                    bar.inc(1);
                }
            });
        }
    });
    bar.finish_and_clear();

    if let Some(e) = fatal.into_inner().unwrap_or_else(PoisonError::into_inner) {
        return Err(e);
    }

    let grouped = grouped.into_inner().unwrap_or_else(PoisonError::into_inner);
    let mut output: Vec<(E::Key, E::Value)> = grouped
        .into_iter()
        .map(|(key, values)| job.reduce(key, values))
        .collect();
    output.sort_by(|a, b| a.0.cmp(&b.0));

    let tally = tally.into_inner().unwrap_or_else(PoisonError::into_inner);
    let claimed = next_idx.load(Ordering::SeqCst);
    let summary = RunSummary {
        total_inputs: inputs.len(),
        completed_inputs: tally.completed,
        skipped_inputs: tally.skipped,
        truncated_inputs: tally.truncated,
        empty_inputs: tally.empty,
        processed_records: tally.counters.count(counters::PROCESSED_RECORDS),
        malformed_records: tally.counters.count(counters::MALFORMED_RECORDS),
        output_pairs: output.len(),
        interrupted: is_shutdown_requested() && claimed < inputs.len(),
        counters: tally.counters,
        elapsed: start.elapsed(),
    };
    summary.log();

    Ok(RunResult { output, summary })
}
