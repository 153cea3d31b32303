//! Match results, wire format, and run statistics

use crate::report::CandidateRecord;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Tag that opens every match line on the wire
pub const DEFAULT_MATCH_TAG: &str = "Hash Maliciosa Encontrada";

/// Field name for the timestamp on the wire
pub const DEFAULT_TIMESTAMP_LABEL: &str = "Horario";

/// Layout of a match line
///
/// Lines are tab-separated, fields in fixed order:
///
/// ```text
/// <tag>\tHash=<checksum>\tLog Source=<source>\t<timestamp_label>=<observed_at>\n
/// ```
///
/// Downstream consumers parse this byte-for-byte, so the defaults must not
/// change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchLineFormat {
    pub tag: String,
    pub timestamp_label: String,
}

impl Default for MatchLineFormat {
    fn default() -> Self {
        Self {
            tag: DEFAULT_MATCH_TAG.to_string(),
            timestamp_label: DEFAULT_TIMESTAMP_LABEL.to_string(),
        }
    }
}

impl MatchLineFormat {
    /// Render one newline-terminated line for `record`
    pub fn format(&self, record: &CandidateRecord) -> String {
        format!(
            "{}\tHash={}\tLog Source={}\t{}={}\n",
            self.tag,
            record.checksum,
            record.source_label,
            self.timestamp_label,
            record.observed_at
        )
    }
}

/// A record confirmed present in the reference index
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchResult {
    /// Checksum as it appeared in the report
    pub checksum: String,
    pub source_label: String,
    pub observed_at: String,
    /// Formatted wire line, newline-terminated
    pub line: String,
}

impl MatchResult {
    pub fn new(record: CandidateRecord, format: &MatchLineFormat) -> Self {
        let line = format.format(&record);
        Self {
            checksum: record.checksum,
            source_label: record.source_label,
            observed_at: record.observed_at,
            line,
        }
    }
}

/// Final counters of one run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunStatistics {
    /// Records consumed from the stream
    pub total_processed: u64,
    /// Records found in the reference index
    pub total_matched: u64,
    /// Record count announced by the source, if any
    pub expected_total: Option<u64>,
    /// Wall time from start of run (including waiting for the reader)
    pub elapsed: Duration,
    /// Run stopped early on a shutdown request
    pub cancelled: bool,
}

impl RunStatistics {
    pub fn has_matches(&self) -> bool {
        self.total_matched > 0
    }

    /// Processed share of the expected total, in percent
    pub fn percent_complete(&self) -> Option<f64> {
        percent(self.total_processed, self.expected_total)
    }
}

pub(crate) fn percent(processed: u64, total: Option<u64>) -> Option<f64> {
    match total {
        Some(total) if total > 0 => Some(processed as f64 / total as f64 * 100.0),
        _ => None,
    }
}
