//! ccjob Core - reusable base for batch jobs over web-archive datasets
//!
//! Turns one input line naming a WARC file into a stream of decoded records,
//! hands each record to a job-supplied extractor and aggregates the emitted
//! key/value pairs with a combine/reduce contract.
//!
//! # Example
//!
//! ```ignore
//! use ccjob_core::{JobConfig, MapReduceJob, Record, RunMode, Sum};
//!
//! let config = JobConfig {
//!     mode: RunMode::Local,
//!     ..Default::default()
//! };
//! let job = MapReduceJob::new(&config, |r: &Record| {
//!     vec![(r.warc_type().unwrap_or("unknown").to_string(), 1u64)]
//! }, Sum)?;
//! let output = job.map("sample.warc.gz")?;
//! ```

pub mod config;
pub mod counters;
pub mod decompress;
pub mod error;
pub mod fetch;
pub mod job;
pub mod logging;
pub mod output;
pub mod progress;
pub mod records;
pub mod retry;
pub mod runner;
pub mod scratch;
pub mod shutdown;
pub mod source;
pub mod stream;
pub mod warc;

// Re-exports for convenience
pub use config::{JobConfig, RunMode};
pub use counters::Counters;
pub use error::{FetchError, JobError, RecordError};
pub use fetch::{HttpObjectStore, ObjectMeta, ObjectStore, RemoteFetcher};
pub use job::{
    Aggregator, Extractor, MapOutput, MapReduceJob, Max, Outcome, Sum, Unconfigured, dispatch,
};
pub use logging::{IndicatifLogger, Verbosity, init_logging};
pub use progress::ProgressContext;
pub use records::RecordIterator;
pub use retry::{RetryPolicy, retry_with_backoff};
pub use runner::{RunOptions, RunResult, RunSummary, combine_locally, read_inputs, run};
pub use scratch::ScratchBuffer;
pub use shutdown::{install_signal_handlers, is_shutdown_requested, request_shutdown};
pub use source::{ByteStream, SourceResolver};
pub use stream::StreamError;
pub use warc::{HttpHead, Record, WarcReader};
