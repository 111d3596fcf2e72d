//! Input line → byte stream, by run mode

use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::path::PathBuf;
use std::sync::Arc;

use crate::config::{JobConfig, RunMode};
use crate::error::FetchError;
use crate::fetch::{HttpObjectStore, ObjectStore, RemoteFetcher};
use crate::stream::StreamError;

/// Sequential read handle over one archive's bytes.
///
/// Local archives read straight from the file; remote archives read from a
/// rewound scratch buffer.
pub struct ByteStream {
    label: String,
    inner: Box<dyn Read + Send>,
}

impl ByteStream {
    pub fn new(label: impl Into<String>, inner: impl Read + Send + 'static) -> Self {
        Self {
            label: label.into(),
            inner: Box::new(inner),
        }
    }

    /// Human-readable origin (`s3://bucket/key` or a file path)
    pub fn label(&self) -> &str {
        &self.label
    }
}

impl Read for ByteStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

impl fmt::Debug for ByteStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ByteStream")
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}

/// Decides where an archive reference lives and opens it.
pub struct SourceResolver {
    bucket: String,
    base_dir: PathBuf,
    fetcher: RemoteFetcher,
}

impl SourceResolver {
    /// Resolver backed by anonymous HTTP object storage
    pub fn new(config: &JobConfig) -> Result<Self, StreamError> {
        let store = HttpObjectStore::from_config(config)?;
        Ok(Self::with_store(config, Arc::new(store)))
    }

    /// Resolver backed by an arbitrary store (fakes in tests)
    pub fn with_store(config: &JobConfig, store: Arc<dyn ObjectStore>) -> Self {
        Self {
            bucket: config.bucket.clone(),
            base_dir: config.base_dir.clone(),
            fetcher: RemoteFetcher::new(store, config),
        }
    }

    /// Open `reference` as a raw (still compressed) byte stream.
    ///
    /// No retries here; remote retries live in [`RemoteFetcher`].
    pub fn resolve(&self, reference: &str, mode: RunMode) -> Result<ByteStream, FetchError> {
        match mode {
            RunMode::Distributed => {
                log::info!("Loading s3://{}/{reference}", self.bucket);
                self.fetcher.fetch(&self.bucket, reference)
            }
            RunMode::Local => {
                let path = self.base_dir.join(reference);
                log::info!("Loading local file {}", path.display());
                let file = File::open(&path).map_err(|source| FetchError::Open {
                    path: path.clone(),
                    source,
                })?;
                Ok(ByteStream::new(path.display().to_string(), file))
            }
        }
    }
}
