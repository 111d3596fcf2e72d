//! Error types for retrieval, record decoding and job configuration
//!
//! Failures are split by blast radius:
//! - [`FetchError`]: one input line is skipped, the job continues
//! - [`RecordError`]: one record is skipped, or the rest of one line is lost
//! - [`JobError`]: the whole job stops

use std::path::PathBuf;

use crate::stream::StreamError;

/// Why one archive could not be obtained.
#[derive(Debug)]
pub enum FetchError {
    /// Bucket did not answer an anonymous HEAD
    BucketUnreachable { bucket: String, source: StreamError },
    /// Object HEAD failed (usually 404)
    NotFound { key: String, source: StreamError },
    /// Download failed permanently or retries ran out
    Download { key: String, source: StreamError },
    /// Local file could not be opened
    Open { path: PathBuf, source: std::io::Error },
    /// Scratch buffer or stream setup failed
    Io(std::io::Error),
}

impl std::fmt::Display for FetchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BucketUnreachable { bucket, source } => {
                write!(f, "Failed to access bucket \"{bucket}\": {source}")
            }
            Self::NotFound { key, source } => write!(f, "Input not found: {key} ({source})"),
            Self::Download { key, source } => write!(f, "Failed to download {key}: {source}"),
            Self::Open { path, source } => {
                write!(f, "Failed to open {}: {source}", path.display())
            }
            Self::Io(e) => write!(f, "IO: {e}"),
        }
    }
}

impl std::error::Error for FetchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::BucketUnreachable { source, .. }
            | Self::NotFound { source, .. }
            | Self::Download { source, .. } => Some(source),
            Self::Open { source, .. } => Some(source),
            Self::Io(e) => Some(e),
        }
    }
}

impl From<std::io::Error> for FetchError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

/// Failure while decoding the record stream.
#[derive(Debug)]
pub enum RecordError {
    /// One record could not be decoded; the reader resynchronises after it
    Malformed { offset: u64, reason: String },
    /// The underlying stream is unreadable; no further records
    Io(std::io::Error),
}

impl RecordError {
    pub fn malformed(offset: u64, reason: impl Into<String>) -> Self {
        Self::Malformed {
            offset,
            reason: reason.into(),
        }
    }

    /// Whether iteration can continue after this error
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Malformed { .. })
    }
}

impl std::fmt::Display for RecordError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Malformed { offset, reason } => {
                write!(f, "malformed record at offset {offset}: {reason}")
            }
            Self::Io(e) => write!(f, "stream unreadable: {e}"),
        }
    }
}

impl std::error::Error for RecordError {}

impl From<std::io::Error> for RecordError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

/// Job-wide fatal error.
#[derive(Debug)]
pub enum JobError {
    /// No extraction function was supplied
    ExtractorMissing,
    /// Invalid configuration value
    Config(String),
}

impl std::fmt::Display for JobError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ExtractorMissing => write!(
                f,
                "record extraction is not implemented: supply an Extractor for this job"
            ),
            Self::Config(msg) => write!(f, "configuration error: {msg}"),
        }
    }
}

impl std::error::Error for JobError {}
