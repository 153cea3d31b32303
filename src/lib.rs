//! Hash Matcher Library
//!
//! Streams the checksums found in periodic log reports through a sharded
//! reference list of known-malicious checksums, and writes every hit as one
//! tab-separated line to a named pipe for a downstream consumer.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//!
//! - [`core`] - Configuration, error taxonomy, and checksum normalization
//! - [`corpus`] - Reference shard loading and the membership index
//! - [`report`] - Report discovery and the candidate record stream
//! - [`engine`] - The matching loop, match lines, and run statistics
//! - [`sink`] - Result sinks: named pipe and in-memory
//! - [`cli`] - Command-line interface (only used by the binary)
//! - [`testdb`] - Deterministic fixtures for tests and trial runs
//!
//! # Example Usage
//!
//! ```rust,no_run
//! use hashmatch::core::config::Config;
//! use hashmatch::corpus::{DirectoryCorpus, ReferenceCorpusLoader};
//! use hashmatch::engine::MatchEngine;
//! use hashmatch::report::{locate_report, CsvRecordSource, RecordStream};
//! use hashmatch::sink::FifoSink;
//! use std::sync::atomic::AtomicBool;
//! use std::sync::Arc;
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = Config::load_default()?;
//!     let shutdown_flag = Arc::new(AtomicBool::new(false));
//!
//!     // Build the index once
//!     let index = ReferenceCorpusLoader::from_config(&config.corpus)
//!         .load(&DirectoryCorpus::from_config(&config.corpus))?;
//!
//!     // Stream the latest report through it
//!     let source = CsvRecordSource::open(locate_report(&config.reports)?)?;
//!     let stream = RecordStream::from_source(source, &config.reports.column_mapping())?;
//!
//!     let mut sink = FifoSink::from_config(&config.sink).with_shutdown_flag(shutdown_flag.clone());
//!     let stats = MatchEngine::from_config(&config.matching)
//!         .with_shutdown_flag(shutdown_flag)
//!         .run(stream, &index, &mut sink)?;
//!
//!     println!("{} of {} matched", stats.total_matched, stats.total_processed);
//!     Ok(())
//! }
//! ```
//!
//! # Platform Support
//!
//! The named-pipe sink needs a Unix-like system. Everything else, including
//! the in-memory sink, is portable.

pub mod cli;
pub mod core;
pub mod corpus;
pub mod engine;
pub mod report;
pub mod sink;
pub mod testdb;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
