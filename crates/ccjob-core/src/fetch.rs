//! Remote archive retrieval: existence checks, buffered download, retries

use std::io::{self, Seek, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::config::JobConfig;
use crate::error::FetchError;
use crate::retry::{RetryPolicy, retry_with_backoff};
use crate::scratch::ScratchBuffer;
use crate::source::ByteStream;
use crate::stream::{self, StreamError};

/// Metadata returned by an object HEAD
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ObjectMeta {
    pub content_length: Option<u64>,
}

/// Minimal object storage surface the fetcher needs.
///
/// Implementations must not retry internally; [`RemoteFetcher`] owns the
/// retry policy.
pub trait ObjectStore: Send + Sync {
    /// Check the bucket is reachable
    fn head_bucket(&self, bucket: &str) -> Result<(), StreamError>;

    /// Check the object exists
    fn head_object(&self, bucket: &str, key: &str) -> Result<ObjectMeta, StreamError>;

    /// Stream the whole object into `sink`, returning bytes written
    fn download(&self, bucket: &str, key: &str, sink: &mut dyn Write)
    -> Result<u64, StreamError>;
}

/// Anonymous path-style HTTP access to an S3-compatible endpoint
pub struct HttpObjectStore {
    client: reqwest::Client,
    endpoint: String,
    read_timeout: Duration,
}

impl HttpObjectStore {
    pub fn new(
        endpoint: &str,
        connect_timeout: Duration,
        read_timeout: Duration,
    ) -> Result<Self, StreamError> {
        Ok(Self {
            client: stream::anonymous_client(connect_timeout)?,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            read_timeout,
        })
    }

    pub fn from_config(config: &JobConfig) -> Result<Self, StreamError> {
        Self::new(&config.endpoint, config.connect_timeout, config.read_timeout)
    }

    fn bucket_url(&self, bucket: &str) -> String {
        format!("{}/{bucket}", self.endpoint)
    }

    fn object_url(&self, bucket: &str, key: &str) -> String {
        format!("{}/{bucket}/{}", self.endpoint, key.trim_start_matches('/'))
    }
}

impl ObjectStore for HttpObjectStore {
    fn head_bucket(&self, bucket: &str) -> Result<(), StreamError> {
        stream::send(self.client.head(self.bucket_url(bucket)), self.read_timeout)?;
        Ok(())
    }

    fn head_object(&self, bucket: &str, key: &str) -> Result<ObjectMeta, StreamError> {
        let response = stream::send(
            self.client.head(self.object_url(bucket, key)),
            self.read_timeout,
        )?;
        let content_length = response
            .headers()
            .get(reqwest::header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse().ok());
        Ok(ObjectMeta { content_length })
    }

    fn download(
        &self,
        bucket: &str,
        key: &str,
        sink: &mut dyn Write,
    ) -> Result<u64, StreamError> {
        let response = stream::send(
            self.client.get(self.object_url(bucket, key)),
            self.read_timeout,
        )?;
        let mut body = stream::body_reader(response, self.read_timeout);
        let written = io::copy(&mut body, sink)?;
        Ok(written)
    }
}

/// Downloads one archive object into a scratch buffer.
pub struct RemoteFetcher {
    store: Arc<dyn ObjectStore>,
    retry: RetryPolicy,
    scratch_dir: Option<PathBuf>,
    spill_threshold: usize,
}

impl RemoteFetcher {
    pub fn new(store: Arc<dyn ObjectStore>, config: &JobConfig) -> Self {
        Self {
            store,
            retry: config.retry,
            scratch_dir: config.scratch_dir.clone(),
            spill_threshold: config.spill_threshold,
        }
    }

    /// Fetch `key` from `bucket`.
    ///
    /// The whole object is buffered before the returned stream is handed
    /// out, so decompression never races a live connection. Every error is a
    /// per-input skip for the caller.
    pub fn fetch(&self, bucket: &str, key: &str) -> Result<ByteStream, FetchError> {
        self.store
            .head_bucket(bucket)
            .map_err(|source| FetchError::BucketUnreachable {
                bucket: bucket.to_string(),
                source,
            })?;

        let meta = self
            .store
            .head_object(bucket, key)
            .map_err(|source| FetchError::NotFound {
                key: key.to_string(),
                source,
            })?;

        let label = format!("s3://{bucket}/{key}");
        if let Some(len) = meta.content_length {
            log::debug!("{label}: {len} bytes");
        }

        let mut scratch = ScratchBuffer::new(self.spill_threshold, self.scratch_dir.clone());
        let written = retry_with_backoff(&label, &self.retry, |_| {
            scratch.reset()?;
            self.store.download(bucket, key, &mut scratch)
        })
        .map_err(|source| FetchError::Download {
            key: key.to_string(),
            source,
        })?;

        if let Some(expected) = meta.content_length {
            if written != expected {
                log::warn!("{label}: downloaded {written} bytes, HEAD reported {expected}");
            }
        }

        scratch.rewind()?;
        Ok(ByteStream::new(label, scratch))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use std::sync::Mutex;

    fn config() -> JobConfig {
        JobConfig {
            retry: RetryPolicy::immediate(3),
            ..Default::default()
        }
    }

    fn http_err(status: u16) -> StreamError {
        StreamError::Http {
            status: Some(status),
            message: "test".to_string(),
        }
    }

    /// Fails the first `failures` downloads with a 503 after writing junk
    struct FlakyStore {
        payload: Vec<u8>,
        failures: Mutex<u32>,
        downloads: Mutex<u32>,
    }

    impl FlakyStore {
        fn new(payload: &[u8], failures: u32) -> Self {
            Self {
                payload: payload.to_vec(),
                failures: Mutex::new(failures),
                downloads: Mutex::new(0),
            }
        }
    }

    impl ObjectStore for FlakyStore {
        fn head_bucket(&self, _bucket: &str) -> Result<(), StreamError> {
            Ok(())
        }

        fn head_object(&self, _bucket: &str, _key: &str) -> Result<ObjectMeta, StreamError> {
            Ok(ObjectMeta {
                content_length: Some(self.payload.len() as u64),
            })
        }

        fn download(
            &self,
            _bucket: &str,
            _key: &str,
            sink: &mut dyn Write,
        ) -> Result<u64, StreamError> {
            *self.downloads.lock().unwrap() += 1;
            let mut failures = self.failures.lock().unwrap();
            if *failures > 0 {
                *failures -= 1;
                sink.write_all(b"half a response")?;
                return Err(http_err(503));
            }
            sink.write_all(&self.payload)?;
            Ok(self.payload.len() as u64)
        }
    }

    struct MissingStore;

    impl ObjectStore for MissingStore {
        fn head_bucket(&self, _bucket: &str) -> Result<(), StreamError> {
            Ok(())
        }

        fn head_object(&self, _bucket: &str, _key: &str) -> Result<ObjectMeta, StreamError> {
            Err(http_err(404))
        }

        fn download(&self, _: &str, _: &str, _: &mut dyn Write) -> Result<u64, StreamError> {
            panic!("download must not run for a missing object");
        }
    }

    #[test]
    fn fetch_rewinds_to_start() {
        let store = Arc::new(FlakyStore::new(b"archive bytes", 0));
        let fetcher = RemoteFetcher::new(store, &config());
        let mut stream = fetcher.fetch("commoncrawl", "a.warc.gz").unwrap();
        let mut out = Vec::new();
        stream.read_to_end(&mut out).unwrap();
        assert_eq!(out, b"archive bytes");
        assert_eq!(stream.label(), "s3://commoncrawl/a.warc.gz");
    }

    #[test]
    fn transient_failures_are_retried_and_discarded() {
        let store = Arc::new(FlakyStore::new(b"clean", 2));
        let fetcher = RemoteFetcher::new(store.clone(), &config());
        let mut stream = fetcher.fetch("commoncrawl", "a.warc.gz").unwrap();
        let mut out = Vec::new();
        stream.read_to_end(&mut out).unwrap();
        assert_eq!(out, b"clean");
        assert_eq!(*store.downloads.lock().unwrap(), 3);
    }

    #[test]
    fn exhausted_retries_become_download_error() {
        let store = Arc::new(FlakyStore::new(b"never", 10));
        let fetcher = RemoteFetcher::new(store.clone(), &config());
        let err = fetcher.fetch("commoncrawl", "a.warc.gz").unwrap_err();
        assert!(matches!(err, FetchError::Download { .. }));
        assert_eq!(*store.downloads.lock().unwrap(), 4);
    }

    #[test]
    fn missing_object_is_not_found() {
        let fetcher = RemoteFetcher::new(Arc::new(MissingStore), &config());
        let err = fetcher.fetch("commoncrawl", "missing.warc.gz").unwrap_err();
        assert!(matches!(err, FetchError::NotFound { .. }));
    }

    #[test]
    fn http_store_head_and_download() {
        let mut server = mockito::Server::new();
        let bucket = server.mock("HEAD", "/commoncrawl").with_status(200).create();
        let head = server
            .mock("HEAD", "/commoncrawl/crawl-data/a.warc.gz")
            .with_status(200)
            .create();
        let get = server
            .mock("GET", "/commoncrawl/crawl-data/a.warc.gz")
            .with_status(200)
            .with_body("payload")
            .create();

        let store =
            HttpObjectStore::new(&server.url(), Duration::from_secs(5), Duration::from_secs(5))
                .unwrap();
        let fetcher = RemoteFetcher::new(Arc::new(store), &config());
        let mut stream = fetcher.fetch("commoncrawl", "crawl-data/a.warc.gz").unwrap();
        let mut out = String::new();
        stream.read_to_string(&mut out).unwrap();
        assert_eq!(out, "payload");

        bucket.assert();
        head.assert();
        get.assert();
    }

    #[test]
    fn http_store_missing_object() {
        let mut server = mockito::Server::new();
        let _bucket = server.mock("HEAD", "/commoncrawl").with_status(200).create();
        let _head = server
            .mock("HEAD", "/commoncrawl/missing.warc.gz")
            .with_status(404)
            .create();

        let store =
            HttpObjectStore::new(&server.url(), Duration::from_secs(5), Duration::from_secs(5))
                .unwrap();
        let err = store.head_object("commoncrawl", "missing.warc.gz").unwrap_err();
        assert!(err.is_not_found());
        assert!(!err.is_retryable());
    }

    #[test]
    fn http_store_forbidden_bucket() {
        let mut server = mockito::Server::new();
        let _bucket = server.mock("HEAD", "/private").with_status(403).create();

        let store =
            HttpObjectStore::new(&server.url(), Duration::from_secs(5), Duration::from_secs(5))
                .unwrap();
        let fetcher = RemoteFetcher::new(Arc::new(store), &config());
        let err = fetcher.fetch("private", "a.warc.gz").unwrap_err();
        assert!(matches!(err, FetchError::BucketUnreachable { .. }));
    }

    #[test]
    fn http_store_gives_up_on_silent_server() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        // Accept and hold connections without ever writing a response
        std::thread::spawn(move || {
            let mut held = Vec::new();
            for socket in listener.incoming().flatten() {
                held.push(socket);
            }
        });

        let store = HttpObjectStore::new(
            &format!("http://{addr}"),
            Duration::from_secs(1),
            Duration::from_millis(200),
        )
        .unwrap();
        let fetcher = RemoteFetcher::new(Arc::new(store), &config());
        let started = std::time::Instant::now();
        let err = fetcher.fetch("commoncrawl", "a.warc.gz").unwrap_err();

        assert!(started.elapsed() < Duration::from_secs(5));
        match err {
            FetchError::BucketUnreachable { source, .. } => assert!(source.is_retryable()),
            other => panic!("unexpected error: {other}"),
        }
    }
}
