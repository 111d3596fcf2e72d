//! Streaming decompression for archive byte streams
//!
//! gzip input is decoded with `MultiGzDecoder`, so per-record members
//! concatenated into one file read as a single stream. Anything without the
//! gzip magic passes through untouched.

use std::io::{self, BufRead, BufReader};

use flate2::bufread::MultiGzDecoder;

use crate::source::ByteStream;

/// gzip magic bytes (RFC 1952).
pub const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Buffer size for the compressed side of the decoder (256KB)
const DECOMPRESS_BUF_SIZE: usize = 256 * 1024;

pub fn is_gzip_magic(header: &[u8]) -> bool {
    header.starts_with(&GZIP_MAGIC)
}

/// Wrap a raw archive stream so reads yield decompressed bytes.
///
/// Only the first buffer is peeked; nothing beyond it is read up front.
pub fn wrap(raw: ByteStream) -> io::Result<ByteStream> {
    let label = raw.label().to_string();
    let mut buffered = BufReader::with_capacity(DECOMPRESS_BUF_SIZE, raw);
    if is_gzip_magic(buffered.fill_buf()?) {
        Ok(ByteStream::new(label, MultiGzDecoder::new(buffered)))
    } else {
        log::debug!("{label}: no gzip header, reading uncompressed");
        Ok(ByteStream::new(label, buffered))
    }
}
