//! Anonymous HTTP transport with read-stall detection.
//!
//! Uses async reqwest internally with tokio::time::timeout for stall detection,
//! but presents a sync interface: one mapper invocation is single-threaded and
//! blocks on its download.

use std::io::{self, Read};
use std::pin::Pin;
use std::sync::LazyLock;
use std::task::Context;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::io::{AsyncRead, ReadBuf};

/// Transport-level failure talking to object storage
#[derive(Debug)]
pub enum StreamError {
    /// HTTP error with optional status code
    Http {
        status: Option<u16>,
        message: String,
    },
    /// I/O error
    Io(std::io::Error),
}

impl std::fmt::Display for StreamError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Http {
                status: Some(s),
                message,
            } => write!(f, "HTTP {s}: {message}"),
            Self::Http {
                status: None,
                message,
            } => write!(f, "HTTP error: {message}"),
            Self::Io(e) => write!(f, "IO error: {e}"),
        }
    }
}

impl std::error::Error for StreamError {}

impl StreamError {
    /// Create HTTP error from reqwest error
    pub fn from_reqwest(e: &reqwest::Error) -> Self {
        Self::Http {
            status: e.status().map(|s| s.as_u16()),
            message: e.to_string(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            // Bad request, access denied, missing and gone objects do not heal
            Self::Http { status, .. } => !matches!(status, Some(400 | 403 | 404 | 410)),
            // Disk full is not retryable, timeout IS retryable
            Self::Io(e) => e.kind() != io::ErrorKind::StorageFull,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::Http {
                status: Some(404),
                ..
            }
        )
    }
}

impl From<std::io::Error> for StreamError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

/// Shared tokio runtime for HTTP operations.
pub static SHARED_RUNTIME: LazyLock<tokio::runtime::Runtime> = LazyLock::new(|| {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .expect("failed to build tokio runtime")
});

/// Build an HTTP client without credentials.
///
/// Requests are never signed; the bucket must allow public reads.
pub fn anonymous_client(connect_timeout: Duration) -> Result<reqwest::Client, StreamError> {
    reqwest::Client::builder()
        .connect_timeout(connect_timeout)
        .pool_max_idle_per_host(8)
        .build()
        .map_err(|e| StreamError::from_reqwest(&e))
}

/// Send a request and fail on non-2xx status.
///
/// `timeout` bounds the wait for response headers; a server that accepts
/// the connection and never answers yields a retryable `TimedOut` error.
pub fn send(
    request: reqwest::RequestBuilder,
    timeout: Duration,
) -> Result<reqwest::Response, StreamError> {
    SHARED_RUNTIME.handle().block_on(async {
        let response = tokio::time::timeout(timeout, request.send())
            .await
            .map_err(|_| {
                StreamError::Io(io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("no response within {}s", timeout.as_secs_f64()),
                ))
            })?;
        response
            .and_then(|r| r.error_for_status())
            .map_err(|e| StreamError::from_reqwest(&e))
    })
}

/// Turn a response body into a sync reader with a per-read stall timeout.
pub fn body_reader(response: reqwest::Response, read_timeout: Duration) -> TimeoutReader {
    let stream = response.bytes_stream();
    let async_reader =
        tokio_util::io::StreamReader::new(stream.map(|result| result.map_err(io::Error::other)));
    TimeoutReader::new(Box::pin(async_reader), read_timeout)
}

/// Async-to-sync bridge with read timeout.
///
/// Wraps an async reader and provides sync Read interface.
/// Each read operation has a timeout - if no data arrives within
/// the timeout, returns TimedOut error (which triggers retry).
pub struct TimeoutReader {
    inner: Pin<Box<dyn AsyncRead + Send + Sync>>,
    timeout: Duration,
}

impl TimeoutReader {
    pub fn new(inner: Pin<Box<dyn AsyncRead + Send + Sync>>, timeout: Duration) -> Self {
        Self { inner, timeout }
    }
}

impl Read for TimeoutReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let timeout = self.timeout;
        SHARED_RUNTIME.handle().block_on(async {
            let read_future = async {
                let mut read_buf = ReadBuf::new(buf);
                std::future::poll_fn(|cx: &mut Context<'_>| {
                    Pin::as_mut(&mut self.inner).poll_read(cx, &mut read_buf)
                })
                .await?;
                Ok::<_, io::Error>(read_buf.filled().len())
            };

            match tokio::time::timeout(timeout, read_future).await {
                Ok(result) => result,
                Err(_) => Err(io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("read timeout ({}s with no data)", timeout.as_secs()),
                )),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn http_err(status: u16) -> StreamError {
        StreamError::Http {
            status: Some(status),
            message: "test".to_string(),
        }
    }

    #[test]
    fn permanent_statuses_not_retryable() {
        for status in [400, 403, 404, 410] {
            assert!(!http_err(status).is_retryable(), "{status}");
        }
    }

    #[test]
    fn server_errors_retryable() {
        assert!(http_err(500).is_retryable());
        assert!(http_err(503).is_retryable());
        assert!(http_err(429).is_retryable());
    }

    #[test]
    fn network_error_without_status_retryable() {
        let err = StreamError::Http {
            status: None,
            message: "connection refused".to_string(),
        };
        assert!(err.is_retryable());
    }

    #[test]
    fn io_timeout_retryable() {
        let err = StreamError::Io(io::Error::new(io::ErrorKind::TimedOut, "timeout"));
        assert!(err.is_retryable());
    }

    #[test]
    fn io_storage_full_not_retryable() {
        let err = StreamError::Io(io::Error::new(io::ErrorKind::StorageFull, "disk full"));
        assert!(!err.is_retryable());
    }

    #[test]
    fn not_found_detection() {
        assert!(http_err(404).is_not_found());
        assert!(!http_err(403).is_not_found());
    }

    #[test]
    fn display_http_with_status() {
        assert_eq!(format!("{}", http_err(404)), "HTTP 404: test");
    }

    #[test]
    fn timeout_reader_reports_stall() {
        // Duplex with no writer activity never yields data
        let (_tx, rx) = tokio::io::duplex(64);
        let mut reader = TimeoutReader::new(Box::pin(rx), Duration::from_millis(20));
        let mut buf = [0u8; 8];
        let err = reader.read(&mut buf).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::TimedOut);
    }

    #[test]
    fn send_times_out_on_silent_server() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let held = std::thread::spawn(move || listener.accept().map(|(socket, _)| socket));

        let client = anonymous_client(Duration::from_secs(1)).unwrap();
        let started = std::time::Instant::now();
        let err = send(
            client.head(format!("http://{addr}/bucket")),
            Duration::from_millis(200),
        )
        .unwrap_err();

        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(matches!(&err, StreamError::Io(e) if e.kind() == io::ErrorKind::TimedOut));
        assert!(err.is_retryable());
        drop(held.join());
    }

    #[test]
    fn timeout_reader_passes_data() {
        let reader = &b"hello"[..];
        let mut reader = TimeoutReader::new(Box::pin(reader), Duration::from_secs(1));
        let mut out = String::new();
        reader.read_to_string(&mut out).unwrap();
        assert_eq!(out, "hello");
    }
}
