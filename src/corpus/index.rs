//! Membership index over the reference corpus
//!
//! A flat set of normalized checksums. Entries carry no metadata: the
//! reference data only says "known malicious", so membership is boolean.
//!
//! The index is built once (see [`crate::corpus::loader`]) and only read
//! afterwards, so it can be shared across threads behind a plain reference.

use crate::core::checksum::{normalize, Checksum};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Statistics about how the index was built
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndexStats {
    /// Number of shard files read
    pub shards: usize,
    /// Total lines read across all shards, preamble included
    pub lines_read: u64,
    /// Lines discarded as shard preamble
    pub preamble_lines: u64,
    /// Blank or non-hex lines that were skipped
    pub malformed_lines: u64,
    /// Entries that were already present (within or across shards)
    pub duplicate_entries: u64,
    /// Number of distinct checksums in the index
    pub unique_checksums: usize,
    /// Time taken to build the index (in milliseconds)
    pub build_time_ms: u64,
}

/// The normalized set of reference checksums
#[derive(Debug, Default)]
pub struct MembershipIndex {
    entries: HashSet<Checksum>,
    stats: IndexStats,
}

impl MembershipIndex {
    /// Create a new empty index
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty index sized for `capacity` entries
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: HashSet::with_capacity(capacity),
            stats: IndexStats::default(),
        }
    }

    /// Insert an already-normalized checksum. Returns `false` if it was
    /// already present.
    pub fn insert(&mut self, checksum: Checksum) -> bool {
        let inserted = self.entries.insert(checksum);
        if !inserted {
            self.stats.duplicate_entries += 1;
        }
        self.stats.unique_checksums = self.entries.len();
        inserted
    }

    /// Test whether `checksum` is in the index.
    ///
    /// The argument is normalized the same way entries were, so callers may
    /// pass raw report values. Normalizing twice is harmless.
    pub fn contains(&self, checksum: &str) -> bool {
        let normalized = normalize(checksum);
        self.entries.contains(normalized.as_str())
    }

    /// Exact number of distinct checksums
    pub fn size(&self) -> usize {
        self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Get statistics about the index
    pub fn stats(&self) -> &IndexStats {
        &self.stats
    }

    pub(crate) fn stats_mut(&mut self) -> &mut IndexStats {
        &mut self.stats
    }

    /// Iterate over the stored checksums (unordered)
    pub fn iter(&self) -> impl Iterator<Item = &Checksum> {
        self.entries.iter()
    }
}

impl FromIterator<Checksum> for MembershipIndex {
    fn from_iter<I: IntoIterator<Item = Checksum>>(iter: I) -> Self {
        let mut index = MembershipIndex::new();
        for checksum in iter {
            index.insert(checksum);
        }
        index
    }
}
