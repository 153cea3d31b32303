//! Hash Matcher - CLI Entry Point
//!
//! Matches the checksums of the latest periodic report against a sharded
//! reference list and streams every hit to a named pipe.
//!
//! This binary is a thin wrapper around the library, handling argument parsing,
//! logging setup, and command dispatch.

mod cli;
mod core;
mod corpus;
mod engine;
mod report;
mod sink;
mod testdb;

use anyhow::Result;
use clap::Parser;
use cli::{Args, ConsoleWriter, DualWriter};
use core::config::Config;
use env_logger::Builder;
use log::{info, LevelFilter};
use std::fs::OpenOptions;
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

fn main() -> Result<()> {
    let args = Args::parse();

    // Load configuration
    let mut config = if let Some(ref config_path) = args.config {
        match Config::load(config_path) {
            Ok(cfg) => cfg,
            Err(e) => {
                eprintln!("Warning: Failed to load config file: {}", e);
                Config::default()
            }
        }
    } else {
        Config::load_default().unwrap_or_else(|e| {
            eprintln!("Warning: {}", e);
            Config::default()
        })
    };

    // Apply CLI overrides to config
    if let Some(ref report) = args.report {
        config.reports.report_file = Some(report.clone());
    }
    if let Some(ref report_dir) = args.report_dir {
        config.reports.base_path = report_dir.clone();
    }
    if let Some(ref corpus_dir) = args.corpus_dir {
        config.corpus.directory = corpus_dir.clone();
    }
    if let Some(ref fifo) = args.fifo {
        config.sink.fifo_path = fifo.clone();
    }
    if let Some(timeout) = args.open_timeout {
        config.sink.open_timeout_secs = timeout;
    }
    if let Some(ref level) = args.log_level {
        config.logging.level = level.clone();
    }

    // Set up graceful shutdown handler
    let shutdown_flag = Arc::new(AtomicBool::new(false));
    let shutdown_flag_clone = shutdown_flag.clone();

    ctrlc::set_handler(move || {
        if shutdown_flag_clone.load(Ordering::SeqCst) {
            // Second Ctrl+C - force exit
            eprintln!("\nForce shutdown requested. Exiting immediately...");
            std::process::exit(1);
        } else {
            shutdown_flag_clone.store(true, Ordering::SeqCst);
            eprintln!("\nGraceful shutdown requested. Finishing current record... (Press Ctrl+C again to force quit)");
        }
    })?;

    // Initialize logger
    let log_level = match config.logging.level.to_lowercase().as_str() {
        "error" => LevelFilter::Error,
        "warn" => LevelFilter::Warn,
        "info" => LevelFilter::Info,
        "debug" => LevelFilter::Debug,
        "trace" => LevelFilter::Trace,
        _ => LevelFilter::Info,
    };

    if config.logging.log_to_file {
        // Set up logging to both console and file
        let log_file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&config.logging.log_file)?;

        Builder::new()
            .filter_level(log_level)
            .format(|buf, record| {
                writeln!(
                    buf,
                    "[{} {} {}] {}",
                    chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ"),
                    record.level(),
                    record.target(),
                    record.args()
                )
            })
            .target(env_logger::Target::Pipe(Box::new(DualWriter {
                console: ConsoleWriter,
                file: log_file,
            })))
            .init();

        info!("Logging to file: {}", config.logging.log_file.display());
    } else {
        Builder::from_env(env_logger::Env::default().default_filter_or(&config.logging.level))
            .target(env_logger::Target::Pipe(Box::new(ConsoleWriter)))
            .init();
    }

    info!("hashmatch v{}", env!("CARGO_PKG_VERSION"));
    info!("============================");

    // Run the command
    cli::run_command(&args, &config, shutdown_flag)?;

    Ok(())
}
