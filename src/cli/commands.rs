//! Command handler implementations
//!
//! This module contains the implementation of all CLI commands.

use crate::cli::progress::{
    format_duration, print_divider, print_header, print_info, print_success, print_warning,
    CorpusLoadProgress, MatchProgress,
};
use crate::cli::{Args, Commands};
use crate::core::checksum::Checksum;
use crate::core::config::{get_config_path, init_config, Config};
use crate::core::error::MatchError;
use crate::corpus::{DirectoryCorpus, IndexStats, MembershipIndex, ReferenceCorpusLoader};
use crate::engine::{MatchEngine, RunStatistics};
use crate::report::{locate_report, CsvRecordSource, RecordStream};
use crate::sink::FifoSink;
use crate::testdb::{write_fixture_tree, FixtureOptions};
use anyhow::Result;
use log::{info, warn};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

/// Console behavior shared by the commands that load the corpus
#[derive(Debug, Clone, Copy)]
pub struct OutputOptions {
    pub json: bool,
    pub show_progress: bool,
}

impl OutputOptions {
    pub fn from_args(args: &Args) -> Self {
        Self {
            json: args.json,
            show_progress: !args.no_progress && !args.json,
        }
    }
}

/// Everything a finished run reports with `--json`
#[derive(Debug, Serialize)]
struct RunReport<'a> {
    report: &'a Path,
    fifo: &'a Path,
    corpus: &'a IndexStats,
    statistics: &'a RunStatistics,
}

#[derive(Debug, Serialize)]
struct CheckResult {
    input: String,
    normalized: Option<String>,
    found: bool,
}

/// Run the appropriate command based on CLI arguments
pub fn run_command(args: &Args, config: &Config, shutdown_flag: Arc<AtomicBool>) -> Result<()> {
    let output = OutputOptions::from_args(args);

    match &args.command {
        Some(Commands::Config { path, reset }) => {
            handle_config_command(*path, *reset)?;
        }
        Some(Commands::GenerateConfig { output }) => {
            generate_config_file(output.clone())?;
        }
        Some(Commands::ShowConfig) => {
            show_config(config);
        }
        Some(Commands::Check { checksums }) => {
            check_checksums(config, checksums, shutdown_flag, output)?;
        }
        Some(Commands::CorpusStats) => {
            corpus_stats(config, shutdown_flag, output)?;
        }
        Some(Commands::GenerateFixtures {
            output: directory,
            seed,
            shards,
            entries,
            rows,
            match_ratio,
        }) => {
            let options = FixtureOptions {
                seed: *seed,
                shards: *shards,
                entries_per_shard: *entries,
                report_rows: *rows,
                match_ratio: *match_ratio,
                csv_subdir: config.reports.csv_subdir.clone(),
            };
            generate_fixtures(directory, &options)?;
        }
        Some(Commands::Run) | None => {
            run_matcher(config, shutdown_flag, output)?;
        }
    }

    Ok(())
}

/// Build the membership index from the configured corpus directory
pub fn load_index(
    config: &Config,
    shutdown_flag: Arc<AtomicBool>,
    show_progress: bool,
) -> std::result::Result<MembershipIndex, MatchError> {
    let source = DirectoryCorpus::from_config(&config.corpus);
    let loader = ReferenceCorpusLoader::from_config(&config.corpus).with_shutdown_flag(shutdown_flag);

    let progress = if show_progress {
        CorpusLoadProgress::new()
    } else {
        CorpusLoadProgress::hidden()
    };

    match loader.load_with_progress(&source, |p| progress.update(&p)) {
        Ok(index) => {
            progress.finish(index.stats());
            Ok(index)
        }
        Err(e) => {
            progress.finish_with_error(&e.to_string());
            Err(e)
        }
    }
}

/// Scan the latest report and stream matches to the configured pipe
///
/// Returns `None` when shutdown was requested before the index was ready.
pub fn run_matcher(
    config: &Config,
    shutdown_flag: Arc<AtomicBool>,
    output: OutputOptions,
) -> Result<Option<RunStatistics>> {
    config.validate()?;

    // The report is opened and its header checked before the corpus is built.
    let report_path = locate_report(&config.reports)?;
    info!("Using report: {}", report_path.display());

    let source = CsvRecordSource::open(&report_path)?;
    let stream = RecordStream::from_source(source, &config.reports.column_mapping())?;

    let index = match load_index(config, shutdown_flag.clone(), output.show_progress) {
        Ok(index) => index,
        Err(MatchError::Cancelled) => {
            warn!("Shutdown requested while loading the reference corpus");
            return Ok(None);
        }
        Err(e) => return Err(e.into()),
    };

    let mut sink = FifoSink::from_config(&config.sink).with_shutdown_flag(shutdown_flag.clone());
    let engine = MatchEngine::from_config(&config.matching).with_shutdown_flag(shutdown_flag);

    let progress = if output.show_progress {
        MatchProgress::new(stream.expected_total())
    } else {
        MatchProgress::hidden()
    };

    let stats = match engine.run_with_progress(stream, &index, &mut sink, |e| progress.update(e)) {
        Ok(stats) => {
            progress.finish(&stats);
            stats
        }
        Err(e) => {
            progress.finish_with_error(&e.to_string());
            if e.is_retryable() {
                warn!("No consumer read the results; the run can be retried once a reader is attached");
            }
            return Err(e.into());
        }
    };

    if output.json {
        let report = RunReport {
            report: &report_path,
            fifo: &config.sink.fifo_path,
            corpus: index.stats(),
            statistics: &stats,
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_run_summary(&stats, &config.sink.fifo_path);
    }

    Ok(Some(stats))
}

fn print_run_summary(stats: &RunStatistics, fifo: &Path) {
    print_header("MATCH SUMMARY");
    print_info(&format!(
        "Checksums processed: {}{}",
        stats.total_processed,
        stats
            .expected_total
            .map(|t| format!(" of {}", t))
            .unwrap_or_default()
    ));
    print_info(&format!("Malicious checksums found: {}", stats.total_matched));
    print_info(&format!("Elapsed: {}", format_duration(stats.elapsed)));
    if stats.cancelled {
        print_warning("Run was cancelled before the end of the report");
    }
    print_divider();
    if stats.has_matches() {
        print_success(&format!("Matches were written to {}", fifo.display()));
    } else {
        print_success("No malicious checksums found");
    }
}

/// Look each checksum up in the reference corpus
pub fn check_checksums(
    config: &Config,
    checksums: &[String],
    shutdown_flag: Arc<AtomicBool>,
    output: OutputOptions,
) -> Result<Vec<bool>> {
    let index = load_index(config, shutdown_flag, output.show_progress)?;

    let results: Vec<CheckResult> = checksums
        .iter()
        .map(|input| {
            let normalized = Checksum::parse(input).map(Checksum::into_inner);
            let found = normalized
                .as_deref()
                .map(|c| index.contains(c))
                .unwrap_or(false);
            CheckResult {
                input: input.clone(),
                normalized,
                found,
            }
        })
        .collect();

    if output.json {
        println!("{}", serde_json::to_string_pretty(&results)?);
    } else {
        for result in &results {
            match (&result.normalized, result.found) {
                (None, _) => print_warning(&format!("{}: not a hexadecimal checksum", result.input)),
                (Some(_), true) => print_success(&format!("{}: found in reference corpus", result.input)),
                (Some(_), false) => print_info(&format!("{}: not found", result.input)),
            }
        }
    }

    Ok(results.iter().map(|r| r.found).collect())
}

/// Load the corpus and print how it was built
pub fn corpus_stats(
    config: &Config,
    shutdown_flag: Arc<AtomicBool>,
    output: OutputOptions,
) -> Result<IndexStats> {
    let index = load_index(config, shutdown_flag, output.show_progress)?;
    let stats = index.stats().clone();

    if output.json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(stats);
    }

    print_header("REFERENCE CORPUS");
    print_info(&format!("Directory: {}", config.corpus.directory.display()));
    print_info(&format!("Shards read: {}", stats.shards));
    print_info(&format!("Lines read: {}", stats.lines_read));
    print_info(&format!("Preamble lines skipped: {}", stats.preamble_lines));
    print_info(&format!("Malformed lines skipped: {}", stats.malformed_lines));
    print_info(&format!("Duplicate entries: {}", stats.duplicate_entries));
    print_info(&format!("Unique checksums: {}", stats.unique_checksums));
    print_info(&format!("Build time: {} ms", stats.build_time_ms));

    Ok(stats)
}

/// Handle the `config` command - show path, reset, or print the config file
pub fn handle_config_command(show_path: bool, reset: bool) -> Result<()> {
    if reset {
        if let Some(config_path) = get_config_path() {
            if config_path.exists() {
                fs::remove_file(&config_path)?;
                info!("Removed existing config file");
            }
        }
        let path = init_config()?;
        info!("Created fresh config file at: {}", path.display());
        return Ok(());
    }

    if show_path {
        let path = Config::get_active_config_path();
        println!("{}", path.display());
        if path.exists() {
            info!("Config file exists at: {}", path.display());
        } else {
            info!("Config file would be created at: {}", path.display());
        }
        return Ok(());
    }

    let path = Config::get_active_config_path();
    let path = if path.exists() { path } else { init_config()? };
    info!("Config file: {}", path.display());
    println!("{}", fs::read_to_string(&path)?);
    info!("Run 'hashmatch show-config' to verify your settings.");

    Ok(())
}

/// Generate a configuration file at the specified or default location
pub fn generate_config_file(output: Option<PathBuf>) -> Result<()> {
    let output_path = match output {
        Some(path) => {
            fs::write(&path, Config::generate_default_config())?;
            path
        }
        None => init_config()?,
    };

    info!("Configuration file: {}", output_path.display());
    info!("Edit this file to point the matcher at your reports, corpus and pipe.");

    Ok(())
}

/// Show the current configuration settings
pub fn show_config(config: &Config) {
    let config_path = Config::get_active_config_path();
    info!("Configuration file: {}", config_path.display());
    if !config_path.exists() {
        info!("(Using default settings - no config file found)");
    }
    info!("");
    info!("Current Configuration:");
    info!("----------------------");
    info!("[reports]");
    info!("  base_path = \"{}\"", config.reports.base_path.display());
    info!("  csv_subdir = \"{}\"", config.reports.csv_subdir);
    info!(
        "  report_file = {}",
        config
            .reports
            .report_file
            .as_ref()
            .map(|p| format!("\"{}\"", p.display()))
            .unwrap_or_else(|| "(latest)".to_string())
    );
    info!("  checksum_column = \"{}\"", config.reports.checksum_column);
    info!("  source_column = \"{}\"", config.reports.source_column);
    info!("  timestamp_column = \"{}\"", config.reports.timestamp_column);
    info!("");
    info!("[corpus]");
    info!("  directory = \"{}\"", config.corpus.directory.display());
    info!("  extension = \"{}\"", config.corpus.extension);
    info!("  preamble_lines = {}", config.corpus.preamble_lines);
    info!("  recursive = {}", config.corpus.recursive);
    info!("");
    info!("[sink]");
    info!("  fifo_path = \"{}\"", config.sink.fifo_path.display());
    info!("  create_fifo = {}", config.sink.create_fifo);
    info!(
        "  open_timeout_secs = {}{}",
        config.sink.open_timeout_secs,
        if config.sink.open_timeout_secs == 0 { " (wait forever)" } else { "" }
    );
    info!("  poll_interval_ms = {}", config.sink.poll_interval_ms);
    info!("");
    info!("[matching]");
    info!("  progress_interval = {}", config.matching.progress_interval);
    info!("  match_tag = \"{}\"", config.matching.match_tag);
    info!("  timestamp_label = \"{}\"", config.matching.timestamp_label);
    info!("");
    info!("[logging]");
    info!("  level = \"{}\"", config.logging.level);
    info!("  log_to_file = {}", config.logging.log_to_file);
    info!("  log_file = \"{}\"", config.logging.log_file.display());
}

/// Write a fixture tree and print how to run against it
pub fn generate_fixtures(directory: &Path, options: &FixtureOptions) -> Result<()> {
    println!("\n🔧 Generating fixtures...");
    println!("   Output: {}", directory.display());
    println!("   Seed: {}", options.seed);
    println!();

    let layout = write_fixture_tree(directory, options)?;

    print_success(&format!(
        "{} reference checksums in {}",
        layout.corpus_entries,
        layout.corpus_dir.display()
    ));
    print_success(&format!(
        "{} report rows in {}",
        layout.report_rows,
        layout.report_csv.display()
    ));
    print_info(&format!("Expected matches: {}", layout.expected_matches));
    println!();
    println!(
        "  Try: hashmatch --corpus-dir {} --report-dir {} run",
        layout.corpus_dir.display(),
        layout.report_base.display()
    );

    Ok(())
}
