//! Matching engine module
//!
//! Drives a record stream through the membership index and into a result
//! sink, counting records and matches and reporting progress as it goes.
//!
//! # Submodules
//!
//! - `matcher` - The matching loop and progress events
//! - `result` - Match lines, their wire format, and run statistics

pub mod matcher;
pub mod result;

pub use matcher::{MatchEngine, ProgressEvent, DEFAULT_PROGRESS_INTERVAL};
pub use result::{
    MatchLineFormat, MatchResult, RunStatistics, DEFAULT_MATCH_TAG, DEFAULT_TIMESTAMP_LABEL,
};
