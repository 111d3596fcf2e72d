//! WARC record container parsing
//!
//! A record is a `WARC/<version>` line, `Name: value` header fields, a blank
//! line, exactly `Content-Length` body bytes and a blank-line terminator.
//!
//! # Recovery
//! - A record that cannot be decoded is reported as
//!   [`RecordError::Malformed`]; the reader then skips ahead to the next line
//!   starting with `WARC/`.
//! - A body not followed by the terminator means `Content-Length` was wrong.
//!   The body bytes are scanned again, so records it overran still parse.
//! - An I/O error from the underlying stream is final.

use std::io::{self, BufRead, Read, Write};

use chrono::{DateTime, FixedOffset};

use crate::error::RecordError;

/// Longest header line accepted; bounds memory on garbage input
pub const MAX_LINE_LEN: usize = 64 * 1024;

/// Cap on up-front body allocation; larger bodies grow as they are read
const MAX_BODY_PREALLOC: u64 = 1024 * 1024;

const VERSION_PREFIX: &[u8] = b"WARC/";

/// One decoded WARC record
#[derive(Debug, Clone)]
pub struct Record {
    version: String,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
    offset: u64,
}

impl Record {
    /// Build a record; `Content-Length` is set from `body`.
    pub fn new(version: impl Into<String>, headers: Vec<(String, String)>, body: Vec<u8>) -> Self {
        let mut headers = headers;
        headers.retain(|(name, _)| !name.eq_ignore_ascii_case("Content-Length"));
        headers.push(("Content-Length".to_string(), body.len().to_string()));
        Self {
            version: version.into(),
            headers,
            body,
            offset: 0,
        }
    }

    /// Version line, e.g. `WARC/1.0`
    pub fn version(&self) -> &str {
        &self.version
    }

    /// First header named `name` (case-insensitive)
    pub fn header(&self, name: &str) -> Option<&str> {
        header_value(&self.headers, name)
    }

    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    pub fn warc_type(&self) -> Option<&str> {
        self.header("WARC-Type")
    }

    pub fn target_uri(&self) -> Option<&str> {
        self.header("WARC-Target-URI")
    }

    pub fn record_id(&self) -> Option<&str> {
        self.header("WARC-Record-ID")
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header("Content-Type")
    }

    /// `WARC-Date`, parsed as RFC 3339
    pub fn date(&self) -> Option<DateTime<FixedOffset>> {
        DateTime::parse_from_rfc3339(self.header("WARC-Date")?).ok()
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn content_length(&self) -> usize {
        self.body.len()
    }

    /// Offset of the version line in the decompressed stream
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// HTTP status line and headers of a `response` record
    pub fn http_head(&self) -> Option<HttpHead> {
        let is_http = self.warc_type() == Some("response")
            || self
                .content_type()
                .is_some_and(|ct| ct.starts_with("application/http"));
        if !is_http {
            return None;
        }
        HttpHead::parse(&self.body)
    }

    /// Body after the HTTP head for `response` records, the whole body otherwise
    pub fn payload(&self) -> &[u8] {
        if self.http_head().is_none() {
            return &self.body;
        }
        match find_head_end(&self.body) {
            Some(end) => &self.body[end..],
            None => &[],
        }
    }

    /// Serialize in container layout, including the record terminator
    pub fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        write!(w, "{}\r\n", self.version)?;
        for (name, value) in &self.headers {
            write!(w, "{name}: {value}\r\n")?;
        }
        w.write_all(b"\r\n")?;
        w.write_all(&self.body)?;
        w.write_all(b"\r\n\r\n")
    }
}

/// Records compare by content; stream offset is ignored
impl PartialEq for Record {
    fn eq(&self, other: &Self) -> bool {
        self.version == other.version && self.headers == other.headers && self.body == other.body
    }
}

impl Eq for Record {}

/// Status and header fields of an HTTP message stored in a record body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpHead {
    pub status: u16,
    pub headers: Vec<(String, String)>,
}

impl HttpHead {
    /// Parse the head of an HTTP response. Header lines without a colon are skipped.
    pub fn parse(bytes: &[u8]) -> Option<Self> {
        let end = find_head_end(bytes).unwrap_or(bytes.len());
        let head = String::from_utf8_lossy(&bytes[..end]);
        let mut lines = head.lines();

        let status_line = lines.next()?;
        if !status_line.starts_with("HTTP/") {
            return None;
        }
        let status = status_line.split_whitespace().nth(1)?.parse().ok()?;

        let headers = lines
            .map(str::trim_end)
            .take_while(|line| !line.is_empty())
            .filter_map(|line| {
                let (name, value) = line.split_once(':')?;
                Some((name.trim().to_string(), value.trim().to_string()))
            })
            .collect();

        Some(Self { status, headers })
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        header_value(&self.headers, name)
    }
}

fn header_value<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(n, _)| n.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

/// Index just past the blank line ending an HTTP head
fn find_head_end(bytes: &[u8]) -> Option<usize> {
    let crlf = bytes.windows(4).position(|w| w == b"\r\n\r\n").map(|i| i + 4);
    let lf = bytes.windows(2).position(|w| w == b"\n\n").map(|i| i + 2);
    match (crlf, lf) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}

fn trim_eol(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}

/// `BufRead` that can hand already-read bytes back for re-reading.
///
/// Lets the parser rescan a rejected record body for the next version line
/// without seeking the underlying stream.
struct Replay<R> {
    inner: R,
    pending: Vec<u8>,
    pos: usize,
}

impl<R: BufRead> Replay<R> {
    fn new(inner: R) -> Self {
        Self {
            inner,
            pending: Vec::new(),
            pos: 0,
        }
    }

    /// Queue `bytes` to be read again before any unread replay bytes
    fn unread(&mut self, bytes: &[u8]) {
        if bytes.is_empty() {
            return;
        }
        let mut pending = Vec::with_capacity(bytes.len() + self.pending.len() - self.pos);
        pending.extend_from_slice(bytes);
        pending.extend_from_slice(&self.pending[self.pos..]);
        self.pending = pending;
        self.pos = 0;
    }
}

impl<R: BufRead> Read for Replay<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = {
            let available = self.fill_buf()?;
            let n = available.len().min(buf.len());
            buf[..n].copy_from_slice(&available[..n]);
            n
        };
        self.consume(n);
        Ok(n)
    }
}

impl<R: BufRead> BufRead for Replay<R> {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        if self.pos < self.pending.len() {
            return Ok(&self.pending[self.pos..]);
        }
        self.inner.fill_buf()
    }

    fn consume(&mut self, amt: usize) {
        if self.pos < self.pending.len() {
            self.pos += amt;
            if self.pos >= self.pending.len() {
                self.pending.clear();
                self.pos = 0;
            }
        } else {
            self.inner.consume(amt);
        }
    }
}

/// Pull parser over a decompressed WARC stream
pub struct WarcReader<R> {
    inner: Replay<R>,
    offset: u64,
    line: Vec<u8>,
    resync: bool,
    /// Stream error hit after a complete record; reported on the next call
    deferred: Option<io::Error>,
    done: bool,
}

impl<R: BufRead> WarcReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner: Replay::new(inner),
            offset: 0,
            line: Vec::with_capacity(256),
            resync: false,
            deferred: None,
            done: false,
        }
    }

    /// Bytes consumed from the decompressed stream so far
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Next record, a decode error, or `None` at end of stream.
    ///
    /// After an `Io` error the reader is finished.
    pub fn next_record(&mut self) -> Option<Result<Record, RecordError>> {
        if self.done {
            return None;
        }
        if let Some(e) = self.deferred.take() {
            self.done = true;
            return Some(Err(RecordError::Io(e)));
        }
        match self.read_record() {
            Ok(Some(record)) => Some(Ok(record)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                if e.is_recoverable() {
                    self.resync = true;
                } else {
                    self.done = true;
                }
                Some(Err(e))
            }
        }
    }

    fn read_line(&mut self) -> io::Result<bool> {
        self.line.clear();
        let n = (&mut self.inner)
            .take(MAX_LINE_LEN as u64)
            .read_until(b'\n', &mut self.line)?;
        self.offset += n as u64;
        Ok(n > 0)
    }

    fn read_record(&mut self) -> Result<Option<Record>, RecordError> {
        // Blank lines separate records; after a bad record skip to the next version line
        let (start, version) = loop {
            let line_start = self.offset;
            if !self.read_line()? {
                return Ok(None);
            }
            let line = trim_eol(&self.line);
            if line.is_empty() {
                continue;
            }
            if line.starts_with(VERSION_PREFIX) {
                break (line_start, String::from_utf8_lossy(line).into_owned());
            }
            if !self.resync {
                return Err(RecordError::malformed(
                    line_start,
                    "expected WARC version line",
                ));
            }
        };
        self.resync = false;

        let headers = self.read_headers(start)?;

        let length: u64 = header_value(&headers, "Content-Length")
            .ok_or_else(|| RecordError::malformed(start, "missing Content-Length"))?
            .parse()
            .map_err(|_| RecordError::malformed(start, "invalid Content-Length"))?;

        let mut body = Vec::with_capacity(length.min(MAX_BODY_PREALLOC) as usize);
        let n = (&mut self.inner).take(length).read_to_end(&mut body)?;
        self.offset += n as u64;
        if (n as u64) < length {
            self.rewind(&body);
            return Err(RecordError::malformed(
                start,
                format!("body truncated: {n} of {length} bytes"),
            ));
        }

        // A wrong Content-Length shows up as a missing terminator; the body
        // is then rescanned so records it swallowed are not lost
        if let Err(after) = self.read_terminator()? {
            let mut swallowed = body;
            swallowed.extend_from_slice(&after);
            self.rewind(&swallowed);
            return Err(RecordError::malformed(
                start,
                format!("no record terminator after {length} byte body"),
            ));
        }

        Ok(Some(Record {
            version,
            headers,
            body,
            offset: start,
        }))
    }

    /// Hand `bytes` back to the stream to be parsed again
    fn rewind(&mut self, bytes: &[u8]) {
        self.inner.unread(bytes);
        self.offset -= bytes.len() as u64;
    }

    /// Consume the blank lines ending a record.
    ///
    /// Accepts one or more blank lines followed by the next version line
    /// (left unread) or end of stream. Otherwise returns every byte read
    /// past the body as `Err` so the caller can rewind over it.
    fn read_terminator(&mut self) -> io::Result<Result<(), Vec<u8>>> {
        let mut consumed = Vec::new();
        let mut blank = false;
        loop {
            let more = match self.read_line() {
                Ok(more) => more,
                Err(e) if blank => {
                    self.deferred = Some(e);
                    return Ok(Ok(()));
                }
                Err(e) => return Err(e),
            };
            if !more {
                return Ok(Ok(()));
            }
            let line = trim_eol(&self.line);
            if line.is_empty() {
                blank = true;
                consumed.extend_from_slice(&self.line);
                continue;
            }
            if blank && line.starts_with(VERSION_PREFIX) {
                let next = std::mem::take(&mut self.line);
                self.rewind(&next);
                self.line = next;
                return Ok(Ok(()));
            }
            consumed.extend_from_slice(&self.line);
            return Ok(Err(consumed));
        }
    }

    fn read_headers(&mut self, start: u64) -> Result<Vec<(String, String)>, RecordError> {
        let mut headers: Vec<(String, String)> = Vec::new();
        loop {
            let line_start = self.offset;
            if !self.read_line()? {
                return Err(RecordError::malformed(
                    start,
                    "stream ended inside record header",
                ));
            }
            if !self.line.ends_with(b"\n") && self.line.len() >= MAX_LINE_LEN {
                return Err(RecordError::malformed(line_start, "header line too long"));
            }
            let line = trim_eol(&self.line);
            if line.is_empty() {
                return Ok(headers);
            }

            // Folded continuation of the previous field
            if matches!(line[0], b' ' | b'\t') {
                let Some((_, value)) = headers.last_mut() else {
                    return Err(RecordError::malformed(
                        line_start,
                        "continuation line before first header",
                    ));
                };
                value.push(' ');
                value.push_str(String::from_utf8_lossy(line).trim());
                continue;
            }

            let Some(colon) = line.iter().position(|&b| b == b':') else {
                return Err(RecordError::malformed(line_start, "header line without ':'"));
            };
            let name = String::from_utf8_lossy(&line[..colon]).trim().to_string();
            if name.is_empty() {
                return Err(RecordError::malformed(line_start, "empty header name"));
            }
            let value = String::from_utf8_lossy(&line[colon + 1..]).trim().to_string();
            headers.push((name, value));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(uri: &str, http: &str) -> Record {
        Record::new(
            "WARC/1.0",
            vec![
                ("WARC-Type".to_string(), "response".to_string()),
                ("WARC-Target-URI".to_string(), uri.to_string()),
                ("WARC-Date".to_string(), "2024-03-01T12:00:00Z".to_string()),
                (
                    "Content-Type".to_string(),
                    "application/http; msgtype=response".to_string(),
                ),
            ],
            http.as_bytes().to_vec(),
        )
    }

    fn serialize(records: &[Record]) -> Vec<u8> {
        let mut out = Vec::new();
        for r in records {
            r.write_to(&mut out).unwrap();
        }
        out
    }

    fn parse_all(bytes: &[u8]) -> Vec<Result<Record, RecordError>> {
        let mut reader = WarcReader::new(bytes);
        std::iter::from_fn(|| reader.next_record()).collect()
    }

    #[test]
    fn parses_written_records() {
        let records = vec![
            response("http://a.example/", "HTTP/1.1 200 OK\r\nServer: nginx\r\n\r\n<html>"),
            response("http://b.example/", "HTTP/1.1 404 Not Found\r\n\r\n"),
        ];
        let parsed: Vec<Record> = parse_all(&serialize(&records))
            .into_iter()
            .map(Result::unwrap)
            .collect();
        assert_eq!(parsed, records);
        assert_eq!(parsed[0].offset(), 0);
        assert!(parsed[1].offset() > 0);
    }

    #[test]
    fn header_lookup_is_case_insensitive() {
        let r = response("http://a.example/", "HTTP/1.1 200 OK\r\n\r\n");
        assert_eq!(r.header("warc-target-uri"), Some("http://a.example/"));
        assert_eq!(r.target_uri(), Some("http://a.example/"));
        assert_eq!(r.content_length(), r.body().len());
    }

    #[test]
    fn date_parses() {
        let r = response("http://a.example/", "");
        let date = r.date().unwrap();
        assert_eq!(date.to_rfc3339(), "2024-03-01T12:00:00+00:00");
    }

    #[test]
    fn folded_header_continuation() {
        let raw = b"WARC/1.0\r\nWARC-Type: metadata\r\nX-Note: first\r\n  second\r\nContent-Length: 2\r\n\r\nok\r\n\r\n";
        let parsed = parse_all(raw);
        let r = parsed[0].as_ref().unwrap();
        assert_eq!(r.header("X-Note"), Some("first second"));
        assert_eq!(r.body(), b"ok");
    }

    #[test]
    fn missing_content_length_recovers() {
        let mut raw = b"WARC/1.0\r\nWARC-Type: request\r\n\r\nGET / HTTP/1.1\r\n\r\n".to_vec();
        raw.extend(serialize(&[response("http://ok.example/", "HTTP/1.1 200 OK\r\n\r\n")]));
        let parsed = parse_all(&raw);
        assert_eq!(parsed.len(), 2);
        assert!(matches!(parsed[0], Err(RecordError::Malformed { .. })));
        assert_eq!(
            parsed[1].as_ref().unwrap().target_uri(),
            Some("http://ok.example/")
        );
    }

    #[test]
    fn garbage_before_first_record() {
        let mut raw = b"this is not a warc file\r\nnor this\r\n".to_vec();
        raw.extend(serialize(&[response("http://a.example/", "")]));
        let parsed = parse_all(&raw);
        assert_eq!(parsed.len(), 2);
        assert!(parsed[0].is_err());
        assert!(parsed[1].is_ok());
    }

    #[test]
    fn truncated_body_is_malformed_then_ends() {
        let raw = b"WARC/1.0\r\nContent-Length: 100\r\n\r\nshort";
        let parsed = parse_all(raw);
        assert_eq!(parsed.len(), 1);
        match &parsed[0] {
            Err(RecordError::Malformed { reason, .. }) => assert!(reason.contains("truncated")),
            other => panic!("expected malformed, got {other:?}"),
        }
    }

    #[test]
    fn oversized_content_length_does_not_swallow_records() {
        let good: Vec<Record> = (0..4)
            .map(|i| response(&format!("http://r{i}.example/"), "HTTP/1.1 200 OK\r\n\r\n"))
            .collect();
        let mut raw = serialize(&good[..1]);
        raw.extend_from_slice(b"WARC/1.0\r\nWARC-Type: resource\r\nContent-Length: 300\r\n\r\nbroken\r\n\r\n");
        raw.extend(serialize(&good[1..]));

        let parsed = parse_all(&raw);
        let errors = parsed.iter().filter(|r| r.is_err()).count();
        let records: Vec<Record> = parsed.into_iter().filter_map(Result::ok).collect();
        assert_eq!(errors, 1);
        assert_eq!(records, good);
    }

    #[test]
    fn body_followed_by_version_line_without_blank_is_malformed() {
        let next = response("http://next.example/", "");
        let mut raw = b"WARC/1.0\r\nContent-Length: 2\r\n\r\nokWARC/1.0 trailing\r\n".to_vec();
        raw.extend(serialize(std::slice::from_ref(&next)));

        let parsed = parse_all(&raw);
        match &parsed[0] {
            Err(RecordError::Malformed { reason, .. }) => assert!(reason.contains("terminator")),
            other => panic!("expected malformed, got {other:?}"),
        }
        assert_eq!(parsed.last().unwrap().as_ref().unwrap(), &next);
    }

    #[test]
    fn offset_survives_rewind() {
        let good = response("http://a.example/", "");
        let mut raw = b"WARC/1.0\r\nContent-Length: 5\r\n\r\nabcdeXYZ\r\n\r\n".to_vec();
        let good_start = raw.len() as u64;
        raw.extend(serialize(std::slice::from_ref(&good)));

        let parsed = parse_all(&raw);
        assert!(parsed[0].is_err());
        let record = parsed[1].as_ref().unwrap();
        assert_eq!(record, &good);
        assert_eq!(record.offset(), good_start);
    }

    #[test]
    fn header_without_colon_is_malformed() {
        let raw = b"WARC/1.0\r\nnot a header\r\nContent-Length: 0\r\n\r\n\r\n\r\n";
        let parsed = parse_all(raw);
        assert!(matches!(parsed[0], Err(RecordError::Malformed { .. })));
    }

    #[test]
    fn empty_stream_has_no_records() {
        assert!(parse_all(b"").is_empty());
        assert!(parse_all(b"\r\n\r\n").is_empty());
    }

    #[test]
    fn io_error_ends_reader() {
        struct Broken;
        impl Read for Broken {
            fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
                Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset"))
            }
        }
        let mut reader = WarcReader::new(io::BufReader::new(Broken));
        assert!(matches!(reader.next_record(), Some(Err(RecordError::Io(_)))));
        assert!(reader.next_record().is_none());
    }

    #[test]
    fn stream_error_after_terminator_keeps_record() {
        struct FailsAtEnd(io::Cursor<Vec<u8>>);
        impl Read for FailsAtEnd {
            fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
                match self.0.read(buf)? {
                    0 => Err(io::Error::new(io::ErrorKind::UnexpectedEof, "cut")),
                    n => Ok(n),
                }
            }
        }
        let record = response("http://a.example/", "");
        let raw = serialize(std::slice::from_ref(&record));
        let mut reader = WarcReader::new(io::BufReader::new(FailsAtEnd(io::Cursor::new(raw))));
        assert_eq!(reader.next_record().unwrap().unwrap(), record);
        assert!(matches!(reader.next_record(), Some(Err(RecordError::Io(_)))));
        assert!(reader.next_record().is_none());
    }

    #[test]
    fn http_head_and_payload() {
        let r = response(
            "http://a.example/",
            "HTTP/1.1 200 OK\r\nServer: Apache/2.4\r\nContent-Type: text/html\r\n\r\n<p>hi</p>",
        );
        let head = r.http_head().unwrap();
        assert_eq!(head.status, 200);
        assert_eq!(head.header("server"), Some("Apache/2.4"));
        assert_eq!(r.payload(), b"<p>hi</p>");
    }

    #[test]
    fn http_head_absent_for_non_response() {
        let r = Record::new(
            "WARC/1.0",
            vec![("WARC-Type".to_string(), "warcinfo".to_string())],
            b"software: test\r\n".to_vec(),
        );
        assert!(r.http_head().is_none());
        assert_eq!(r.payload(), b"software: test\r\n");
    }

    #[test]
    fn http_head_rejects_non_http_body() {
        assert!(HttpHead::parse(b"<html></html>").is_none());
        assert!(HttpHead::parse(b"HTTP/1.1 abc\r\n\r\n").is_none());
    }

    #[test]
    fn new_overrides_content_length() {
        let r = Record::new(
            "WARC/1.0",
            vec![("content-length".to_string(), "999".to_string())],
            b"abc".to_vec(),
        );
        assert_eq!(r.header("Content-Length"), Some("3"));
        assert_eq!(r.headers().len(), 1);
    }
}
