//! Command-line argument definitions
//!
//! This module defines all CLI arguments and subcommands using clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Stream periodic log reports through a reference list of known-malicious checksums
#[derive(Parser, Debug)]
#[command(name = "hashmatch")]
#[command(version)]
#[command(about = "Match report checksums against a sharded reference list and stream hits to a named pipe", long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Path to configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Report CSV to scan, skipping latest-report discovery (overrides config)
    #[arg(short, long, global = true)]
    pub report: Option<PathBuf>,

    /// Directory holding dated report folders (overrides config)
    #[arg(long, global = true, value_name = "DIR")]
    pub report_dir: Option<PathBuf>,

    /// Directory holding the reference shards (overrides config)
    #[arg(long, global = true, value_name = "DIR")]
    pub corpus_dir: Option<PathBuf>,

    /// Named pipe matches are written to (overrides config)
    #[arg(short, long, global = true)]
    pub fifo: Option<PathBuf>,

    /// Seconds to wait for a reader on the pipe, 0 = forever (overrides config)
    #[arg(long, global = true, value_name = "SECS")]
    pub open_timeout: Option<u64>,

    /// Print results as JSON instead of a summary
    #[arg(long, global = true)]
    pub json: bool,

    /// Hide progress bars
    #[arg(long, global = true)]
    pub no_progress: bool,

    /// Log level: error, warn, info, debug, trace (overrides config)
    #[arg(short, long, global = true)]
    pub log_level: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Scan the latest report and write matches to the pipe (default)
    Run,

    /// Look checksums up in the reference corpus
    Check {
        /// Checksums to look up (case-insensitive)
        #[arg(required = true)]
        checksums: Vec<String>,
    },

    /// Load the reference corpus and print its statistics
    CorpusStats,

    /// Show the configuration file path, or reset it to defaults
    ///
    /// The config file is stored at:
    /// - Linux: ~/.config/hashmatch/config.toml
    /// - macOS: ~/Library/Application Support/hashmatch/config.toml
    /// - Windows: %APPDATA%\hashmatch\config.toml
    ///
    /// If no config file exists, a default one will be created.
    Config {
        /// Show the config file path only
        #[arg(long)]
        path: bool,

        /// Reset config to defaults (creates a fresh config file)
        #[arg(long)]
        reset: bool,
    },

    /// Generate a configuration file at a specific location
    GenerateConfig {
        /// Output path for the config file (defaults to standard location)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show current configuration
    ShowConfig,

    /// Write a deterministic reference corpus and report for trial runs
    ///
    /// Creates `<output>/corpus/*.md5` and
    /// `<output>/reports/report-<seed>/CSV/report.csv`.
    GenerateFixtures {
        /// Directory to write fixtures into
        #[arg(short, long)]
        output: PathBuf,

        /// Seed for reproducible generation
        #[arg(long, default_value = "42")]
        seed: u64,

        /// Number of reference shards
        #[arg(long, default_value = "4")]
        shards: usize,

        /// Checksums per shard
        #[arg(long, default_value = "1000")]
        entries: usize,

        /// Report rows
        #[arg(long, default_value = "5000")]
        rows: usize,

        /// Share of report rows drawn from the corpus, between 0 and 1
        #[arg(long, default_value = "0.01", value_parser = parse_ratio)]
        match_ratio: f64,
    },
}

fn parse_ratio(value: &str) -> Result<f64, String> {
    let ratio: f64 = value
        .parse()
        .map_err(|_| format!("'{}' is not a number", value))?;
    if ratio.is_finite() && (0.0..=1.0).contains(&ratio) {
        Ok(ratio)
    } else {
        Err(format!("'{}' is not between 0 and 1", value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_command_is_none() {
        let args = Args::try_parse_from(["hashmatch"]).unwrap();
        assert!(args.command.is_none());
        assert!(!args.json);
    }

    #[test]
    fn test_global_overrides_after_subcommand() {
        let args = Args::try_parse_from([
            "hashmatch",
            "run",
            "--fifo",
            "/tmp/out",
            "--open-timeout",
            "5",
            "--corpus-dir",
            "/srv/hashes",
        ])
        .unwrap();
        assert!(matches!(args.command, Some(Commands::Run)));
        assert_eq!(args.fifo, Some(PathBuf::from("/tmp/out")));
        assert_eq!(args.open_timeout, Some(5));
        assert_eq!(args.corpus_dir, Some(PathBuf::from("/srv/hashes")));
    }

    #[test]
    fn test_check_requires_checksums() {
        assert!(Args::try_parse_from(["hashmatch", "check"]).is_err());
        let args = Args::try_parse_from(["hashmatch", "check", "ABC", "def"]).unwrap();
        match args.command {
            Some(Commands::Check { checksums }) => assert_eq!(checksums, vec!["ABC", "def"]),
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_match_ratio_must_be_a_probability() {
        let base = ["hashmatch", "generate-fixtures", "-o", "/tmp/fx", "--match-ratio"];
        for bad in ["NaN", "inf", "1.5", "-0.1", "lots"] {
            let mut argv = base.to_vec();
            argv.push(bad);
            assert!(Args::try_parse_from(argv).is_err(), "accepted {}", bad);
        }

        let mut argv = base.to_vec();
        argv.push("0.25");
        match Args::try_parse_from(argv).unwrap().command {
            Some(Commands::GenerateFixtures { match_ratio, .. }) => assert_eq!(match_ratio, 0.25),
            other => panic!("unexpected command: {:?}", other),
        }
    }
}
