//! Job configuration passed explicitly into the resolver and fetcher

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::error::JobError;
use crate::retry::RetryPolicy;

/// Bucket holding the public web-archive crawl data
pub const DEFAULT_BUCKET: &str = "commoncrawl";

/// Path-style S3 endpoint (`{endpoint}/{bucket}/{key}`)
pub const DEFAULT_ENDPOINT: &str = "https://s3.amazonaws.com";

/// Per-attempt read timeout; archive objects run to several gigabytes
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(180);

/// Connect timeout
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// In-memory scratch size before a download spills to disk (64 MiB)
pub const DEFAULT_SPILL_THRESHOLD: usize = 64 * 1024 * 1024;

/// Where archive files are read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunMode {
    /// Relative paths under the base directory
    #[default]
    Local,
    /// Object keys in the remote bucket
    Distributed,
}

impl RunMode {
    /// Map an execution runner name to a run mode.
    ///
    /// Cluster runners (`emr`, `hadoop`) read from object storage; everything
    /// that executes on this machine reads local files.
    pub fn from_runner(name: &str) -> Result<Self, JobError> {
        match name.trim().to_ascii_lowercase().as_str() {
            "emr" | "hadoop" | "dataproc" | "distributed" => Ok(Self::Distributed),
            "local" | "inline" => Ok(Self::Local),
            other => Err(JobError::Config(format!("unknown runner: {other}"))),
        }
    }
}

impl FromStr for RunMode {
    type Err = JobError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_runner(s)
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local => write!(f, "local"),
            Self::Distributed => write!(f, "distributed"),
        }
    }
}

/// Runtime configuration for one job
#[derive(Debug, Clone)]
pub struct JobConfig {
    /// Local files or remote objects
    pub mode: RunMode,
    /// Bucket that remote keys live in
    pub bucket: String,
    /// Object storage endpoint, accessed anonymously
    pub endpoint: String,
    /// Directory local references are resolved against
    pub base_dir: PathBuf,
    /// Where downloads spill to disk (platform temp dir when unset)
    pub scratch_dir: Option<PathBuf>,
    /// Bytes held in memory before a download spills to disk
    pub spill_threshold: usize,
    /// Retry policy for transient download failures
    pub retry: RetryPolicy,
    /// Stall timeout for each read of a download attempt
    pub read_timeout: Duration,
    /// TCP/TLS connect timeout
    pub connect_timeout: Duration,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            mode: RunMode::Local,
            bucket: DEFAULT_BUCKET.to_string(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            base_dir: executable_dir(),
            scratch_dir: None,
            spill_threshold: DEFAULT_SPILL_THRESHOLD,
            retry: RetryPolicy::default(),
            read_timeout: DEFAULT_READ_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

/// Directory containing the running executable, or `.` if unknown
pub fn executable_dir() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| PathBuf::from("."))
}
