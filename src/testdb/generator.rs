//! Deterministic fixture generator
//!
//! Builds reference shards and report rows from a seeded RNG so the same seed
//! always yields the same corpus, the same report and the same match count.
//! Fixtures can be kept in memory for tests or written to disk in the layout
//! the matcher expects to find in production.

use crate::core::error::Result;
use crate::corpus::{MemoryCorpus, DEFAULT_PREAMBLE_LINES};
use crate::report::{CandidateRecord, MemoryRecordSource};
use log::{debug, info};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

/// Seed used when none is given
pub const DEFAULT_SEED: u64 = 42;

/// Header lines of a published shard; every shard starts with these
const PREAMBLE_TEMPLATE: [&str; 6] = [
    "##################################################################",
    "#                                                                #",
    "#  Reference hash list - MD5 hashes of known malicious samples   #",
    "#  Lines below this header contain one hash each                 #",
    "#                                                                #",
    "##################################################################",
];

const SOURCE_LABELS: [&str; 5] = ["fw-edge-01", "proxy-02", "edr-03", "dns-01", "mail-gw"];

const REPORT_COLUMNS: [&str; 3] = ["MD5 Hash", "Log Source", "Horario"];

/// `lines` lines of shard preamble, newline-terminated
pub fn preamble(lines: usize) -> String {
    let mut text = String::new();
    for i in 0..lines {
        text.push_str(PREAMBLE_TEMPLATE.get(i).copied().unwrap_or("#"));
        text.push('\n');
    }
    text
}

/// A generated reference corpus
#[derive(Debug, Clone)]
pub struct CorpusFixture {
    /// Shard file names and full text, preamble included
    pub shards: Vec<(String, String)>,
    /// Every entry written, normalized
    pub entries: HashSet<String>,
}

impl CorpusFixture {
    pub fn source(&self) -> MemoryCorpus {
        self.shards
            .iter()
            .fold(MemoryCorpus::new(), |corpus, (name, text)| {
                corpus.with_shard(name, text.clone())
            })
    }

    /// Write every shard into `directory`, creating it if needed
    pub fn write_to(&self, directory: &Path) -> Result<()> {
        fs::create_dir_all(directory)?;
        for (name, text) in &self.shards {
            fs::write(directory.join(name), text)?;
        }
        debug!("Wrote {} shard(s) to {:?}", self.shards.len(), directory);
        Ok(())
    }
}

/// A generated report
#[derive(Debug, Clone)]
pub struct ReportFixture {
    pub rows: Vec<CandidateRecord>,
    /// Rows whose checksum is in the corpus
    pub expected_matches: u64,
}

impl ReportFixture {
    pub fn source(&self) -> MemoryRecordSource {
        let mut source = MemoryRecordSource::new(&REPORT_COLUMNS);
        for row in &self.rows {
            source.push_row(vec![
                row.checksum.clone(),
                row.source_label.clone(),
                row.observed_at.clone(),
            ]);
        }
        source
    }

    /// Write the report as CSV with the default column names
    pub fn write_csv(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut writer = csv::Writer::from_path(path)?;
        writer.write_record(REPORT_COLUMNS)?;
        for row in &self.rows {
            writer.write_record([&row.checksum, &row.source_label, &row.observed_at])?;
        }
        writer.flush()?;
        debug!("Wrote {} report row(s) to {:?}", self.rows.len(), path);
        Ok(())
    }
}

/// Seeded source of corpora and reports
#[derive(Debug)]
pub struct FixtureGenerator {
    rng: StdRng,
}

impl Default for FixtureGenerator {
    fn default() -> Self {
        Self::with_seed(DEFAULT_SEED)
    }
}

impl FixtureGenerator {
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// A random 32-character lowercase MD5-shaped checksum
    pub fn checksum(&mut self) -> String {
        let bytes: [u8; 16] = self.rng.gen();
        bytes.iter().map(|b| format!("{:02x}", b)).collect()
    }

    /// `shards` shards of `entries_per_shard` entries each
    ///
    /// A few entries are written in uppercase, as some published lists do.
    pub fn corpus(&mut self, shards: usize, entries_per_shard: usize) -> CorpusFixture {
        let mut fixture = CorpusFixture {
            shards: Vec::with_capacity(shards),
            entries: HashSet::with_capacity(shards * entries_per_shard),
        };

        for shard in 0..shards {
            let mut text = preamble(DEFAULT_PREAMBLE_LINES);
            for _ in 0..entries_per_shard {
                let checksum = self.checksum();
                if self.rng.gen_bool(0.05) {
                    text.push_str(&checksum.to_ascii_uppercase());
                } else {
                    text.push_str(&checksum);
                }
                text.push('\n');
                fixture.entries.insert(checksum);
            }
            fixture
                .shards
                .push((format!("VirusShare_{:05}.md5", shard), text));
        }

        fixture
    }

    /// `rows` report rows, each drawn from `corpus` with probability `match_ratio`
    pub fn report(&mut self, corpus: &CorpusFixture, rows: usize, match_ratio: f64) -> ReportFixture {
        let known: Vec<&String> = {
            let mut v: Vec<&String> = corpus.entries.iter().collect();
            v.sort();
            v
        };
        let match_ratio = if match_ratio.is_finite() {
            match_ratio.clamp(0.0, 1.0)
        } else {
            0.0
        };

        let mut fixture = ReportFixture {
            rows: Vec::with_capacity(rows),
            expected_matches: 0,
        };

        for i in 0..rows {
            let checksum = if !known.is_empty() && self.rng.gen_bool(match_ratio) {
                fixture.expected_matches += 1;
                let picked = known[self.rng.gen_range(0..known.len())];
                if self.rng.gen_bool(0.5) {
                    picked.to_ascii_uppercase()
                } else {
                    picked.clone()
                }
            } else {
                self.unknown_checksum(corpus)
            };

            let source = SOURCE_LABELS[self.rng.gen_range(0..SOURCE_LABELS.len())];
            let observed_at = format!("{:02}:{:02}", (i / 60) % 24, i % 60);
            fixture
                .rows
                .push(CandidateRecord::new(&checksum, source, &observed_at));
        }

        fixture
    }

    fn unknown_checksum(&mut self, corpus: &CorpusFixture) -> String {
        loop {
            let checksum = self.checksum();
            if !corpus.entries.contains(&checksum) {
                return checksum;
            }
        }
    }
}

/// Shape of an on-disk fixture tree
#[derive(Debug, Clone)]
pub struct FixtureOptions {
    pub seed: u64,
    pub shards: usize,
    pub entries_per_shard: usize,
    pub report_rows: usize,
    pub match_ratio: f64,
    /// Sub-directory of the report folder holding the CSV
    pub csv_subdir: String,
}

impl Default for FixtureOptions {
    fn default() -> Self {
        Self {
            seed: DEFAULT_SEED,
            shards: 4,
            entries_per_shard: 1000,
            report_rows: 5000,
            match_ratio: 0.01,
            csv_subdir: "CSV".to_string(),
        }
    }
}

/// Where a fixture tree was written, and what a run over it should find
#[derive(Debug, Clone)]
pub struct FixtureLayout {
    pub corpus_dir: PathBuf,
    pub report_base: PathBuf,
    pub report_csv: PathBuf,
    pub corpus_entries: usize,
    pub report_rows: usize,
    pub expected_matches: u64,
}

/// Write a corpus and one report under `root`
///
/// ```text
/// root/
///   corpus/VirusShare_00000.md5 ...
///   reports/<seed>/<csv_subdir>/report.csv
/// ```
pub fn write_fixture_tree(root: &Path, options: &FixtureOptions) -> Result<FixtureLayout> {
    let mut generator = FixtureGenerator::with_seed(options.seed);
    let corpus = generator.corpus(options.shards, options.entries_per_shard);
    let report = generator.report(&corpus, options.report_rows, options.match_ratio);

    let corpus_dir = root.join("corpus");
    let report_base = root.join("reports");
    let report_csv = report_base
        .join(format!("report-{}", options.seed))
        .join(&options.csv_subdir)
        .join("report.csv");

    corpus.write_to(&corpus_dir)?;
    report.write_csv(&report_csv)?;

    info!(
        "Generated {} shard(s), {} report row(s), {} expected match(es) under {:?}",
        corpus.shards.len(),
        report.rows.len(),
        report.expected_matches,
        root
    );

    Ok(FixtureLayout {
        corpus_dir,
        report_base,
        report_csv,
        corpus_entries: corpus.entries.len(),
        report_rows: report.rows.len(),
        expected_matches: report.expected_matches,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::checksum::is_hex_checksum;

    #[test]
    fn test_preamble_is_not_hex() {
        let text = preamble(6);
        assert_eq!(text.lines().count(), 6);
        assert!(text.lines().all(|l| !is_hex_checksum(l.trim())));
        assert_eq!(preamble(8).lines().last(), Some("#"));
        assert!(preamble(0).is_empty());
    }

    #[test]
    fn test_same_seed_same_fixture() {
        let a = FixtureGenerator::with_seed(3).corpus(2, 10);
        let b = FixtureGenerator::with_seed(3).corpus(2, 10);
        assert_eq!(a.shards, b.shards);

        let c = FixtureGenerator::with_seed(4).corpus(2, 10);
        assert_ne!(a.shards, c.shards);
    }

    #[test]
    fn test_report_match_count() {
        let mut generator = FixtureGenerator::with_seed(11);
        let corpus = generator.corpus(1, 50);
        let report = generator.report(&corpus, 400, 0.25);

        let counted = report
            .rows
            .iter()
            .filter(|r| corpus.entries.contains(&r.checksum.to_ascii_lowercase()))
            .count() as u64;
        assert_eq!(counted, report.expected_matches);
        assert!(report.expected_matches > 0);
    }

    #[test]
    fn test_report_without_matches() {
        let mut generator = FixtureGenerator::default();
        let corpus = generator.corpus(1, 20);
        let report = generator.report(&corpus, 100, 0.0);
        assert_eq!(report.expected_matches, 0);
    }

    #[test]
    fn test_report_with_non_finite_ratio() {
        let mut generator = FixtureGenerator::default();
        let corpus = generator.corpus(1, 20);

        let report = generator.report(&corpus, 50, f64::NAN);
        assert_eq!(report.expected_matches, 0);
        assert_eq!(report.rows.len(), 50);

        let report = generator.report(&corpus, 50, f64::INFINITY);
        assert_eq!(report.expected_matches, 0);
    }

    #[test]
    fn test_write_fixture_tree() {
        let dir = tempfile::tempdir().unwrap();
        let layout = write_fixture_tree(
            dir.path(),
            &FixtureOptions {
                shards: 2,
                entries_per_shard: 5,
                report_rows: 10,
                ..FixtureOptions::default()
            },
        )
        .unwrap();

        assert!(layout.corpus_dir.join("VirusShare_00001.md5").is_file());
        assert!(layout.report_csv.is_file());
        assert!(layout.report_csv.ends_with("CSV/report.csv"));

        let csv = fs::read_to_string(&layout.report_csv).unwrap();
        assert!(csv.starts_with("MD5 Hash,Log Source,Horario\n"));
        assert_eq!(csv.lines().count(), 11);
    }
}
