//! Report input module
//!
//! Turns a periodic report into an ordered stream of candidate records.
//!
//! # Submodules
//!
//! - `record` - Candidate records and column mapping
//! - `stream` - The record source abstraction and the lazy record stream
//! - `csv_source` - CSV-backed record source and latest-report discovery

pub mod csv_source;
pub mod record;
pub mod stream;

pub use csv_source::{find_latest_report_folder, find_report_csv, locate_report, CsvRecordSource};
pub use record::{CandidateRecord, ColumnMapping, ColumnPositions};
pub use stream::{MemoryRecordSource, RecordSource, RecordStream, RowIter};
