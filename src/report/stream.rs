//! Lazy record stream over a tabular source
//!
//! A [`RecordSource`] hands out its column names and a one-shot iterator of
//! raw rows. [`RecordStream::from_source`] checks the schema up front, so a
//! source missing a required column fails before a single record is
//! yielded; after that, rows are turned into [`CandidateRecord`]s one at a
//! time, in source order.
//!
//! Streams are single-pass. Iterating again means building a new stream from
//! a freshly opened source.

use crate::core::error::{MatchError, Result};
use crate::report::record::{CandidateRecord, ColumnMapping};

/// Raw rows, in source order
pub type RowIter = Box<dyn Iterator<Item = Result<Vec<String>>> + Send>;

/// Tabular data with named columns
pub trait RecordSource {
    /// Column names in source order
    fn columns(&self) -> &[String];

    /// Number of data rows, when known without consuming the source
    fn row_count_hint(&self) -> Option<u64> {
        None
    }

    /// Consume the source, yielding its rows
    fn into_rows(self: Box<Self>) -> RowIter;
}

/// Ordered, single-pass sequence of candidate records
pub struct RecordStream {
    inner: Box<dyn Iterator<Item = Result<CandidateRecord>> + Send>,
    expected_total: Option<u64>,
}

impl std::fmt::Debug for RecordStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordStream")
            .field("expected_total", &self.expected_total)
            .finish_non_exhaustive()
    }
}

impl RecordStream {
    /// Validate `source` against `mapping` and wrap it in a stream.
    ///
    /// Fails with [`MatchError::Schema`] listing every missing column.
    pub fn from_source<S>(source: S, mapping: &ColumnMapping) -> Result<Self>
    where
        S: RecordSource + 'static,
    {
        let positions = mapping
            .resolve(source.columns())
            .map_err(|missing| MatchError::Schema { missing })?;
        let expected_total = source.row_count_hint();
        let width = positions
            .checksum
            .max(positions.source_label)
            .max(positions.observed_at)
            + 1;

        let mut row_no: u64 = 0;
        let inner = Box::new(source).into_rows().map(move |row| {
            row_no += 1;
            let row = row?;
            positions.extract(&row).ok_or_else(|| {
                MatchError::Report(format!(
                    "row {} has {} field(s), expected at least {}",
                    row_no,
                    row.len(),
                    width
                ))
            })
        });

        Ok(Self {
            inner: Box::new(inner),
            expected_total,
        })
    }

    /// Stream over records that are already extracted
    pub fn from_records(records: Vec<CandidateRecord>) -> Self {
        let expected_total = Some(records.len() as u64);
        Self {
            inner: Box::new(records.into_iter().map(Ok)),
            expected_total,
        }
    }

    /// Total number of records, if the source knew it up front
    pub fn expected_total(&self) -> Option<u64> {
        self.expected_total
    }
}

impl Iterator for RecordStream {
    type Item = Result<CandidateRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }
}

/// Rows held in memory
#[derive(Debug, Clone, Default)]
pub struct MemoryRecordSource {
    columns: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl MemoryRecordSource {
    pub fn new(columns: &[&str]) -> Self {
        Self {
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows: Vec::new(),
        }
    }

    pub fn with_row(mut self, row: &[&str]) -> Self {
        self.rows.push(row.iter().map(|v| v.to_string()).collect());
        self
    }

    pub fn push_row(&mut self, row: Vec<String>) {
        self.rows.push(row);
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl RecordSource for MemoryRecordSource {
    fn columns(&self) -> &[String] {
        &self.columns
    }

    fn row_count_hint(&self) -> Option<u64> {
        Some(self.rows.len() as u64)
    }

    fn into_rows(self: Box<Self>) -> RowIter {
        Box::new(self.rows.into_iter().map(Ok))
    }
}
