//! Extraction and aggregation contract, and the per-line mapper

use std::iter::Sum as IterSum;
use std::marker::PhantomData;

use crate::config::{JobConfig, RunMode};
use crate::counters::{self, Counters};
use crate::decompress;
use crate::error::{JobError, RecordError};
use crate::records::RecordIterator;
use crate::source::SourceResolver;
use crate::warc::Record;

/// Per-record extraction function supplied by the job author.
///
/// Any `Fn(&Record) -> Vec<(K, V)>` closure is an extractor.
pub trait Extractor: Send + Sync {
    type Key;
    type Value;

    /// Emissions for one record, in the order they should be forwarded
    fn extract(&self, record: &Record) -> Result<Vec<(Self::Key, Self::Value)>, JobError>;
}

impl<F, K, V> Extractor for F
where
    F: Fn(&Record) -> Vec<(K, V)> + Send + Sync,
{
    type Key = K;
    type Value = V;

    fn extract(&self, record: &Record) -> Result<Vec<(K, V)>, JobError> {
        Ok(self(record))
    }
}

/// The base job's extractor: fails on the first record.
pub struct Unconfigured<K, V>(PhantomData<fn() -> (K, V)>);

impl<K, V> Default for Unconfigured<K, V> {
    fn default() -> Self {
        Self(PhantomData)
    }
}

impl<K, V> Extractor for Unconfigured<K, V> {
    type Key = K;
    type Value = V;

    fn extract(&self, _record: &Record) -> Result<Vec<(K, V)>, JobError> {
        Err(JobError::ExtractorMissing)
    }
}

/// Run the extractor on one record
pub fn dispatch<E: Extractor>(
    record: &Record,
    extractor: &E,
) -> Result<Vec<(E::Key, E::Value)>, JobError> {
    extractor.extract(record)
}

/// Combine (local, partial) and reduce (global, final) for one key.
///
/// The default `combine` feeds its output straight back into `reduce`, which
/// is only correct when `reduce` is associative and order-independent.
/// Implementations that override `reduce` own that property; if it does not
/// hold, override `combine` as well.
pub trait Aggregator<K, V>: Send + Sync {
    fn reduce(&self, key: K, values: Vec<V>) -> (K, V);

    fn combine(&self, key: K, values: Vec<V>) -> Vec<(K, V)> {
        vec![self.reduce(key, values)]
    }
}

/// Numeric summation (the default aggregation)
#[derive(Debug, Clone, Copy, Default)]
pub struct Sum;

impl<K, V: IterSum> Aggregator<K, V> for Sum {
    fn reduce(&self, key: K, values: Vec<V>) -> (K, V) {
        (key, values.into_iter().sum())
    }
}

/// Largest value per key; `V::default()` for an empty group
#[derive(Debug, Clone, Copy, Default)]
pub struct Max;

impl<K, V: Ord + Default> Aggregator<K, V> for Max {
    fn reduce(&self, key: K, values: Vec<V>) -> (K, V) {
        (key, values.into_iter().max().unwrap_or_default())
    }
}

/// How one input line ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Every record was read
    Completed,
    /// The archive could not be obtained; nothing was emitted
    Skipped,
    /// The stream broke; emissions up to that point are kept
    Truncated,
    /// Blank input line
    Empty,
}

/// Everything one mapper invocation produced
#[derive(Debug)]
pub struct MapOutput<K, V> {
    pub emissions: Vec<(K, V)>,
    pub counters: Counters,
    pub outcome: Outcome,
}

impl<K, V> MapOutput<K, V> {
    fn new() -> Self {
        Self {
            emissions: Vec::new(),
            counters: Counters::new(),
            outcome: Outcome::Completed,
        }
    }

    fn skipped(mut self) -> Self {
        self.counters.increment(counters::GROUP, counters::SKIPPED_INPUTS, 1);
        self.outcome = Outcome::Skipped;
        self
    }
}

/// A job: where archives come from, what to extract, how to aggregate.
pub struct MapReduceJob<E, A = Sum> {
    resolver: SourceResolver,
    mode: RunMode,
    extractor: E,
    aggregator: A,
}

impl<E, A> MapReduceJob<E, A>
where
    E: Extractor,
    A: Aggregator<E::Key, E::Value>,
{
    /// Job reading through anonymous HTTP object storage in distributed mode
    pub fn new(config: &JobConfig, extractor: E, aggregator: A) -> Result<Self, JobError> {
        let resolver = SourceResolver::new(config)
            .map_err(|e| JobError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self::with_resolver(resolver, config.mode, extractor, aggregator))
    }

    pub fn with_resolver(
        resolver: SourceResolver,
        mode: RunMode,
        extractor: E,
        aggregator: A,
    ) -> Self {
        Self {
            resolver,
            mode,
            extractor,
            aggregator,
        }
    }

    pub fn mode(&self) -> RunMode {
        self.mode
    }

    /// Process one input line naming one archive.
    ///
    /// Retrieval failures skip the line and a broken stream ends it early;
    /// both are reported through the returned counters and outcome. Only a
    /// job-wide [`JobError`] is returned as `Err`.
    pub fn map(&self, line: &str) -> Result<MapOutput<E::Key, E::Value>, JobError> {
        let mut output = MapOutput::new();
        let reference = line.trim();
        if reference.is_empty() {
            output.outcome = Outcome::Empty;
            return Ok(output);
        }

        let stream = match self.resolver.resolve(reference, self.mode) {
            Ok(s) => s,
            Err(e) => {
                log::warn!("{e}");
                return Ok(output.skipped());
            }
        };
        let label = stream.label().to_string();
        let stream = match decompress::wrap(stream) {
            Ok(s) => s,
            Err(e) => {
                log::warn!("{label}: failed to read archive header: {e}");
                return Ok(output.skipped());
            }
        };

        let mut records = RecordIterator::from_stream(stream);
        while let Some(item) = records.next() {
            match item {
                Ok(record) => {
                    output.emissions.extend(dispatch(&record, &self.extractor)?);
                    output
                        .counters
                        .increment(counters::GROUP, counters::PROCESSED_RECORDS, 1);
                }
                Err(e @ RecordError::Malformed { .. }) => {
                    log::warn!("{label}: {e}");
                    output
                        .counters
                        .increment(counters::GROUP, counters::MALFORMED_RECORDS, 1);
                }
                Err(e) => {
                    log::error!(
                        "{label}: {e} after {} records, keeping output so far",
                        records.processed()
                    );
                    output
                        .counters
                        .increment(counters::GROUP, counters::TRUNCATED_INPUTS, 1);
                    output.outcome = Outcome::Truncated;
                    break;
                }
            }
        }

        log::debug!(
            "{label}: {} records, {} malformed, {} pairs",
            records.processed(),
            records.malformed(),
            output.emissions.len()
        );
        Ok(output)
    }

    pub fn combine(&self, key: E::Key, values: Vec<E::Value>) -> Vec<(E::Key, E::Value)> {
        self.aggregator.combine(key, values)
    }

    pub fn reduce(&self, key: E::Key, values: Vec<E::Value>) -> (E::Key, E::Value) {
        self.aggregator.reduce(key, values)
    }
}
