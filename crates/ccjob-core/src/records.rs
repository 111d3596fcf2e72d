//! Counted, fused record iteration over a decompressed archive stream

use std::io::{BufRead, BufReader};
use std::iter::FusedIterator;

use crate::error::RecordError;
use crate::source::ByteStream;
use crate::warc::{Record, WarcReader};

/// Buffer size for line-oriented header parsing (256KB)
const RECORD_BUF_SIZE: usize = 256 * 1024;

/// Lazy, forward-only sequence of records.
///
/// Yields `Err(RecordError::Malformed)` for records it had to skip and keeps
/// going; yields `Err(RecordError::Io)` at most once, after which it is
/// exhausted. Not restartable.
pub struct RecordIterator<R> {
    reader: WarcReader<R>,
    processed: u64,
    malformed: u64,
    finished: bool,
}

impl RecordIterator<BufReader<ByteStream>> {
    /// Iterate a decompressed stream
    pub fn from_stream(stream: ByteStream) -> Self {
        Self::new(BufReader::with_capacity(RECORD_BUF_SIZE, stream))
    }
}

impl<R: BufRead> RecordIterator<R> {
    pub fn new(inner: R) -> Self {
        Self {
            reader: WarcReader::new(inner),
            processed: 0,
            malformed: 0,
            finished: false,
        }
    }

    /// Records yielded successfully so far
    pub fn processed(&self) -> u64 {
        self.processed
    }

    /// Records skipped as malformed so far
    pub fn malformed(&self) -> u64 {
        self.malformed
    }

    /// Decompressed bytes consumed so far
    pub fn offset(&self) -> u64 {
        self.reader.offset()
    }
}

impl<R: BufRead> Iterator for RecordIterator<R> {
    type Item = Result<Record, RecordError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.reader.next_record() {
            Some(Ok(record)) => {
                self.processed += 1;
                Some(Ok(record))
            }
            Some(Err(e)) => {
                if e.is_recoverable() {
                    self.malformed += 1;
                } else {
                    self.finished = true;
                }
                Some(Err(e))
            }
            None => {
                self.finished = true;
                None
            }
        }
    }
}

impl<R: BufRead> FusedIterator for RecordIterator<R> {}
