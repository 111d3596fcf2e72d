//! Named observability counters, reported per mapper invocation

use rustc_hash::FxHashMap;

/// Counter group for everything this crate reports
pub const GROUP: &str = "commoncrawl";

/// Records yielded and dispatched to the extractor
pub const PROCESSED_RECORDS: &str = "processed_records";
/// Records skipped because they could not be decoded
pub const MALFORMED_RECORDS: &str = "malformed_records";
/// Input lines skipped because the archive could not be obtained
pub const SKIPPED_INPUTS: &str = "skipped_inputs";
/// Input lines cut short by an unreadable stream
pub const TRUNCATED_INPUTS: &str = "truncated_inputs";

/// `group -> name -> count`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Counters {
    values: FxHashMap<String, FxHashMap<String, u64>>,
}

impl Counters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates only when a counter is first seen
    pub fn increment(&mut self, group: &str, name: &str, by: u64) {
        if let Some(value) = self
            .values
            .get_mut(group)
            .and_then(|names| names.get_mut(name))
        {
            *value += by;
            return;
        }
        *self
            .values
            .entry(group.to_string())
            .or_default()
            .entry(name.to_string())
            .or_insert(0) += by;
    }

    pub fn get(&self, group: &str, name: &str) -> u64 {
        self.values
            .get(group)
            .and_then(|names| names.get(name))
            .copied()
            .unwrap_or(0)
    }

    /// Shorthand for a counter in [`GROUP`]
    pub fn count(&self, name: &str) -> u64 {
        self.get(GROUP, name)
    }

    /// Add every counter of `other` into `self`
    pub fn merge(&mut self, other: &Counters) {
        for (group, names) in &other.values {
            for (name, value) in names {
                self.increment(group, name, *value);
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Counters sorted by group, then name
    pub fn sorted(&self) -> Vec<(&str, &str, u64)> {
        let mut out: Vec<_> = self
            .values
            .iter()
            .flat_map(|(g, names)| {
                names
                    .iter()
                    .map(move |(n, v)| (g.as_str(), n.as_str(), *v))
            })
            .collect();
        out.sort_unstable();
        out
    }

    /// Hadoop streaming reporter lines (`reporter:counter:group,name,amount`)
    pub fn reporter_lines(&self) -> Vec<String> {
        self.sorted()
            .into_iter()
            .map(|(group, name, value)| format!("reporter:counter:{group},{name},{value}"))
            .collect()
    }
}
