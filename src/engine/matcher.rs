//! The matching loop
//!
//! [`MatchEngine::run`] pulls records from a [`RecordStream`] one at a time,
//! tests each against a [`MembershipIndex`], and writes a line to the
//! [`ResultSink`] for every hit. There is no buffering in front of the sink:
//! if the consumer stops reading, the scan stops with it.
//!
//! Sink lifecycle per run:
//! 1. `open` (may wait for a reader; failure aborts before any record is read)
//! 2. one `write_line` per match
//! 3. `close`, on success, cancellation, and mid-run failure alike

use crate::core::config::MatchingConfig;
use crate::core::error::Result;
use crate::corpus::MembershipIndex;
use crate::engine::result::{percent, MatchLineFormat, MatchResult, RunStatistics};
use crate::report::RecordStream;
use crate::sink::ResultSink;
use log::{debug, info, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Records between progress events
pub const DEFAULT_PROGRESS_INTERVAL: u64 = 1000;

/// Periodic progress observation
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressEvent {
    pub processed: u64,
    pub matched: u64,
    /// Expected number of records, when the source announced it
    pub total: Option<u64>,
    pub percent: Option<f64>,
}

/// Streams candidate records through the membership index
#[derive(Debug, Clone)]
pub struct MatchEngine {
    progress_interval: u64,
    format: MatchLineFormat,
    shutdown_flag: Option<Arc<AtomicBool>>,
}

impl Default for MatchEngine {
    fn default() -> Self {
        Self {
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
            format: MatchLineFormat::default(),
            shutdown_flag: None,
        }
    }
}

impl MatchEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &MatchingConfig) -> Self {
        Self::new()
            .with_progress_interval(config.progress_interval)
            .with_line_format(config.line_format())
    }

    /// Emit a progress event every `interval` records
    pub fn with_progress_interval(mut self, interval: u64) -> Self {
        self.progress_interval = interval.max(1);
        self
    }

    pub fn with_line_format(mut self, format: MatchLineFormat) -> Self {
        self.format = format;
        self
    }

    /// Stop between records when the flag is raised
    pub fn with_shutdown_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.shutdown_flag = Some(flag);
        self
    }

    fn shutdown_requested(&self) -> bool {
        self.shutdown_flag
            .as_ref()
            .map(|f| f.load(Ordering::Relaxed))
            .unwrap_or(false)
    }

    /// Run without observing progress
    pub fn run<S>(&self, stream: RecordStream, index: &MembershipIndex, sink: &mut S) -> Result<RunStatistics>
    where
        S: ResultSink + ?Sized,
    {
        self.run_with_progress(stream, index, sink, |_| {})
    }

    /// Match every record of `stream` against `index`, writing hits to `sink`.
    ///
    /// `on_progress` is called each time the processed count reaches a
    /// multiple of the progress interval.
    ///
    /// A shutdown request ends the run early with `cancelled` set in the
    /// returned statistics. A stream or sink error aborts the run: the sink is
    /// still closed, and the error is returned instead of statistics.
    pub fn run_with_progress<S, F>(
        &self,
        stream: RecordStream,
        index: &MembershipIndex,
        sink: &mut S,
        mut on_progress: F,
    ) -> Result<RunStatistics>
    where
        S: ResultSink + ?Sized,
        F: FnMut(&ProgressEvent),
    {
        let start_time = Instant::now();
        let mut stats = RunStatistics {
            expected_total: stream.expected_total(),
            ..RunStatistics::default()
        };

        sink.open()?;

        if let Err(e) = self.scan(stream, index, sink, &mut stats, &mut on_progress) {
            if let Err(close_err) = sink.close() {
                warn!("Failed to close result sink after error: {}", close_err);
            }
            return Err(e);
        }

        sink.close()?;
        stats.elapsed = start_time.elapsed();

        if stats.cancelled {
            warn!(
                "Run cancelled after {} record(s)",
                stats.total_processed
            );
        }
        info!(
            "Total checksums processed: {}{}",
            stats.total_processed,
            stats
                .expected_total
                .map(|t| format!("/{}", t))
                .unwrap_or_default()
        );
        info!("Total malicious checksums found: {}", stats.total_matched);

        Ok(stats)
    }

    fn scan<S, F>(
        &self,
        mut stream: RecordStream,
        index: &MembershipIndex,
        sink: &mut S,
        stats: &mut RunStatistics,
        on_progress: &mut F,
    ) -> Result<()>
    where
        S: ResultSink + ?Sized,
        F: FnMut(&ProgressEvent),
    {
        loop {
            if self.shutdown_requested() {
                // An exhausted stream finished despite the request.
                stats.cancelled = stream.next().is_some();
                return Ok(());
            }

            let record = match stream.next() {
                Some(record) => record?,
                None => return Ok(()),
            };

            stats.total_processed += 1;

            if index.contains(&record.checksum) {
                stats.total_matched += 1;
                let result = MatchResult::new(record, &self.format);
                sink.write_line(&result.line)?;
                debug!(
                    "Malicious checksum found: {} (Log Source: {}, {}: {})",
                    result.checksum,
                    result.source_label,
                    self.format.timestamp_label,
                    result.observed_at
                );
            }

            if stats.total_processed % self.progress_interval == 0 {
                let event = ProgressEvent {
                    processed: stats.total_processed,
                    matched: stats.total_matched,
                    total: stats.expected_total,
                    percent: percent(stats.total_processed, stats.expected_total),
                };
                match (event.total, event.percent) {
                    (Some(total), Some(pct)) => info!(
                        "Progress: {}/{} checksums processed ({:.2}%)",
                        event.processed, total, pct
                    ),
                    _ => info!("Progress: {} checksums processed", event.processed),
                }
                on_progress(&event);
            }

            debug_assert!(stats.total_matched <= stats.total_processed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::MatchError;
    use crate::corpus::{MemoryCorpus, ReferenceCorpusLoader};
    use crate::report::{CandidateRecord, ColumnMapping, MemoryRecordSource};
    use crate::sink::MemorySink;
    use crate::testdb::generator::{preamble, FixtureGenerator};

    fn index_of(entries: &[&str]) -> MembershipIndex {
        let mut shard = preamble(6);
        for e in entries {
            shard.push_str(e);
            shard.push('\n');
        }
        ReferenceCorpusLoader::new()
            .load(&MemoryCorpus::new().with_shard("00000.md5", shard))
            .unwrap()
    }

    fn stream_of(records: &[(&str, &str, &str)]) -> RecordStream {
        RecordStream::from_records(
            records
                .iter()
                .map(|(c, s, t)| CandidateRecord::new(c, s, t))
                .collect(),
        )
    }

    #[test]
    fn test_scenario_single_match() {
        let index = index_of(&["abc123"]);
        let mut sink = MemorySink::new();

        let stats = MatchEngine::new()
            .run(stream_of(&[("ABC123", "fw-01", "08")]), &index, &mut sink)
            .unwrap();

        assert_eq!(stats.total_processed, 1);
        assert_eq!(stats.total_matched, 1);
        assert_eq!(sink.lines().len(), 1);
        assert!(sink.lines()[0].contains("Hash=ABC123"));
        assert_eq!(
            sink.lines()[0],
            "Hash Maliciosa Encontrada\tHash=ABC123\tLog Source=fw-01\tHorario=08\n"
        );
    }

    #[test]
    fn test_scenario_empty_stream_opens_and_closes_sink() {
        let index = index_of(&["abc123"]);
        let mut sink = MemorySink::new();

        let stats = MatchEngine::new()
            .run(stream_of(&[]), &index, &mut sink)
            .unwrap();

        assert_eq!(stats.total_processed, 0);
        assert_eq!(stats.total_matched, 0);
        assert!(!stats.has_matches());
        assert_eq!(sink.open_count(), 1);
        assert_eq!(sink.close_count(), 1);
        assert!(sink.lines().is_empty());
    }

    #[test]
    fn test_scenario_missing_source_column() {
        let source = MemoryRecordSource::new(&["MD5 Hash", "Horario"]).with_row(&["abc123", "08"]);
        let err = RecordStream::from_source(source, &ColumnMapping::default()).unwrap_err();
        assert!(matches!(err, MatchError::Schema { ref missing } if missing == &["Log Source"]));
    }

    #[test]
    fn test_scenario_progress_cadence() {
        let mut records = Vec::new();
        for i in 1..=2500u32 {
            let checksum = match i {
                500 => "aaaa".to_string(),
                2300 => "BBBB".to_string(),
                _ => format!("{:08x}", i),
            };
            records.push(CandidateRecord::new(&checksum, "edr", &i.to_string()));
        }
        let index = index_of(&["aaaa", "bbbb"]);
        let mut sink = MemorySink::new();
        let mut events = Vec::new();

        let stats = MatchEngine::new()
            .run_with_progress(
                RecordStream::from_records(records),
                &index,
                &mut sink,
                |e| events.push(e.clone()),
            )
            .unwrap();

        assert_eq!(stats.total_processed, 2500);
        assert_eq!(stats.total_matched, 2);
        let at: Vec<u64> = events.iter().map(|e| e.processed).collect();
        assert_eq!(at, vec![1000, 2000]);
        assert_eq!(events[0].matched, 1);
        assert_eq!(events[1].matched, 1);
        assert_eq!(events[0].percent, Some(40.0));
        assert_eq!(events[1].total, Some(2500));
        assert!(sink.lines()[0].contains("Log Source=edr\tHorario=500\n"));
        assert!(sink.lines()[1].contains("Hash=BBBB\t"));
    }

    #[test]
    fn test_matches_keep_stream_order() {
        let index = index_of(&["01", "02", "03"]);
        let mut sink = MemorySink::new();
        MatchEngine::new()
            .run(
                stream_of(&[("03", "a", "1"), ("ff", "b", "2"), ("01", "c", "3"), ("02", "d", "4")]),
                &index,
                &mut sink,
            )
            .unwrap();

        let hashes: Vec<&str> = sink
            .lines()
            .iter()
            .map(|l| l.split('\t').nth(1).unwrap())
            .collect();
        assert_eq!(hashes, vec!["Hash=03", "Hash=01", "Hash=02"]);
    }

    #[test]
    fn test_counts_on_generated_fixture() {
        let mut generator = FixtureGenerator::with_seed(7);
        let corpus = generator.corpus(3, 200);
        let report = generator.report(&corpus, 1500, 0.1);
        let index = ReferenceCorpusLoader::new().load(&corpus.source()).unwrap();

        let mut sink = MemorySink::new();
        let stream = RecordStream::from_source(report.source(), &ColumnMapping::default()).unwrap();
        let stats = MatchEngine::new().run(stream, &index, &mut sink).unwrap();

        assert_eq!(stats.total_processed, 1500);
        assert_eq!(stats.total_matched, report.expected_matches);
        assert_eq!(sink.lines().len() as u64, report.expected_matches);
        assert!(stats.total_matched <= stats.total_processed);
    }

    #[test]
    fn test_sink_unavailable_reads_nothing() {
        let index = index_of(&["abc123"]);
        let mut sink = MemorySink::unavailable();

        let err = MatchEngine::new()
            .run(stream_of(&[("abc123", "fw", "1")]), &index, &mut sink)
            .unwrap_err();

        assert!(err.is_retryable());
        // Index is untouched and usable for a retry.
        assert!(index.contains("abc123"));
    }

    #[test]
    fn test_write_failure_aborts_and_closes() {
        let index = index_of(&["aa"]);
        let mut sink = MemorySink::failing_after(1);

        let err = MatchEngine::new()
            .run(stream_of(&[("aa", "1", "1"), ("bb", "2", "2"), ("AA", "3", "3")]), &index, &mut sink)
            .unwrap_err();

        assert!(matches!(err, MatchError::Io(_)));
        assert_eq!(sink.close_count(), 1);
        assert_eq!(sink.lines().len(), 1);
    }

    #[test]
    fn test_stream_error_aborts_and_closes() {
        let mut source = MemoryRecordSource::new(&["MD5 Hash", "Log Source", "Horario"])
            .with_row(&["aa", "fw", "1"]);
        source.push_row(vec!["truncated".to_string()]);
        let stream = RecordStream::from_source(source, &ColumnMapping::default()).unwrap();

        let index = index_of(&["aa"]);
        let mut sink = MemorySink::new();
        let err = MatchEngine::new().run(stream, &index, &mut sink).unwrap_err();

        assert!(matches!(err, MatchError::Report(_)));
        assert_eq!(sink.close_count(), 1);
    }

    #[test]
    fn test_cancellation_returns_partial_stats() {
        let index = index_of(&["aa"]);
        let flag = Arc::new(AtomicBool::new(false));
        let mut sink = MemorySink::new();

        let records: Vec<CandidateRecord> = (0..100)
            .map(|i| CandidateRecord::new("aa", "fw", &i.to_string()))
            .collect();

        let engine = MatchEngine::new()
            .with_progress_interval(10)
            .with_shutdown_flag(flag.clone());
        let stats = engine
            .run_with_progress(RecordStream::from_records(records), &index, &mut sink, |e| {
                if e.processed == 30 {
                    flag.store(true, Ordering::SeqCst);
                }
            })
            .unwrap();

        assert!(stats.cancelled);
        assert_eq!(stats.total_processed, 30);
        assert_eq!(stats.total_matched, 30);
        assert_eq!(sink.close_count(), 1);
    }

    #[test]
    fn test_shutdown_after_last_record_is_not_cancelled() {
        let index = index_of(&["aa"]);
        let flag = Arc::new(AtomicBool::new(false));
        let mut sink = MemorySink::new();

        let records: Vec<CandidateRecord> = (0..10)
            .map(|i| CandidateRecord::new("bb", "fw", &i.to_string()))
            .collect();

        let stats = MatchEngine::new()
            .with_progress_interval(10)
            .with_shutdown_flag(flag.clone())
            .run_with_progress(RecordStream::from_records(records), &index, &mut sink, |e| {
                if e.processed == 10 {
                    flag.store(true, Ordering::SeqCst);
                }
            })
            .unwrap();

        assert!(!stats.cancelled);
        assert_eq!(stats.total_processed, 10);
        assert_eq!(stats.expected_total, Some(10));
        assert_eq!(sink.close_count(), 1);
    }

    #[test]
    fn test_custom_format_from_config() {
        let config = MatchingConfig {
            progress_interval: 1,
            match_tag: "MALICIOUS".to_string(),
            timestamp_label: "Hour".to_string(),
        };
        let index = index_of(&["aa"]);
        let mut sink = MemorySink::new();
        let mut events = 0;

        MatchEngine::from_config(&config)
            .run_with_progress(stream_of(&[("aa", "s", "t"), ("bb", "s", "t")]), &index, &mut sink, |_| {
                events += 1
            })
            .unwrap();

        assert_eq!(events, 2);
        assert_eq!(sink.contents(), "MALICIOUS\tHash=aa\tLog Source=s\tHour=t\n");
    }
}
