//! Test Database Module
//!
//! Deterministic fixtures for exercising the matcher without a production
//! reference list or real reports.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use hashmatch::testdb::{write_fixture_tree, FixtureOptions};
//!
//! let layout = write_fixture_tree("./fixtures".as_ref(), &FixtureOptions::default()).unwrap();
//! println!("expect {} match(es)", layout.expected_matches);
//! ```

pub mod generator;

pub use generator::{
    preamble, write_fixture_tree, CorpusFixture, FixtureGenerator, FixtureLayout, FixtureOptions,
    ReportFixture, DEFAULT_SEED,
};
