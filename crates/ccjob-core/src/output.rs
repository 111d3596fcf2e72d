//! Final pair output in the JSON line protocol: `json(key)\tjson(value)`

use std::io::{self, Write};

use serde::Serialize;

/// Encode one pair as a protocol line (no trailing newline)
pub fn format_pair<K: Serialize, V: Serialize>(key: &K, value: &V) -> serde_json::Result<String> {
    Ok(format!(
        "{}\t{}",
        serde_json::to_string(key)?,
        serde_json::to_string(value)?
    ))
}

/// Write all pairs, one per line; returns the number written
pub fn write_pairs<K, V, W>(writer: &mut W, pairs: &[(K, V)]) -> io::Result<usize>
where
    K: Serialize,
    V: Serialize,
    W: Write,
{
    for (key, value) in pairs {
        let line = format_pair(key, value).map_err(io::Error::other)?;
        writeln!(writer, "{line}")?;
    }
    writer.flush()?;
    Ok(pairs.len())
}
