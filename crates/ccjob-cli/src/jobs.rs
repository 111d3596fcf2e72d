//! Bundled extraction functions, selectable with `ccjob run --job`

use clap::ValueEnum;

use ccjob_core::Record;

#[derive(Clone, Copy, ValueEnum, Debug, PartialEq, Eq)]
pub enum JobKind {
    /// Count records per WARC-Type
    RecordTypes,
    /// Count HTTP `Server` header values of response records
    Servers,
    /// Count records per target host
    Hosts,
    /// The base job with no extraction function (fails on the first record)
    Base,
}

impl std::fmt::Display for JobKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RecordTypes => write!(f, "record-types"),
            Self::Servers => write!(f, "servers"),
            Self::Hosts => write!(f, "hosts"),
            Self::Base => write!(f, "base"),
        }
    }
}

pub fn record_types(record: &Record) -> Vec<(String, u64)> {
    let kind = record.warc_type().unwrap_or("unknown");
    vec![(kind.to_string(), 1)]
}

/// Responses without a `Server` header count under "(none)"
pub fn servers(record: &Record) -> Vec<(String, u64)> {
    let Some(head) = record.http_head() else {
        return Vec::new();
    };
    let server = head.header("Server").unwrap_or("(none)");
    vec![(server.to_string(), 1)]
}

pub fn hosts(record: &Record) -> Vec<(String, u64)> {
    record
        .target_uri()
        .and_then(|uri| reqwest::Url::parse(uri).ok())
        .and_then(|url| url.host_str().map(str::to_ascii_lowercase))
        .map(|host| vec![(host, 1)])
        .unwrap_or_default()
}
