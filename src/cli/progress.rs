//! Progress bar utilities for CLI output
//!
//! A spinner while the reference corpus loads, and a bar fed by the match
//! engine's progress events while the report streams through.
//!
//! The visible bar is registered as the active one; log output written
//! through [`ConsoleWriter`] or [`DualWriter`] suspends it so log lines are
//! not torn by redraws.

use crate::corpus::{IndexStats, LoadProgress};
use crate::engine::{ProgressEvent, RunStatistics};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::Write;
use std::sync::Mutex;
use std::time::{Duration, Instant};

// ============================================================================
// Styles - Consistent visual appearance
// ============================================================================

fn spinner_style() -> ProgressStyle {
    ProgressStyle::default_spinner()
        .template("{spinner:.cyan} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .tick_chars("⣾⣽⣻⢿⡿⣟⣯⣷")
}

fn progress_bar_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("  {spinner:.green} [{bar:40.cyan/dim}] {pos}/{len} ({percent}%) {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("━━╾─")
}

fn completed_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("  ✓ [{bar:40.green/dim}] {pos}/{len} ({percent}%) {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("━━━")
}

// ============================================================================
// Console output helpers
// ============================================================================

/// Print a header section with a box
pub fn print_header(title: &str) {
    let width = 68;
    let title_padded = format!("{:^width$}", title, width = width - 4);
    println!();
    println!("╔{}╗", "═".repeat(width - 2));
    println!("║{}║", title_padded);
    println!("╚{}╝", "═".repeat(width - 2));
    println!();
}

/// Print a section divider
pub fn print_divider() {
    println!();
    println!("{}", "─".repeat(60));
    println!();
}

pub fn print_success(msg: &str) {
    println!("  ✓ {}", msg);
}

pub fn print_info(msg: &str) {
    println!("  • {}", msg);
}

pub fn print_warning(msg: &str) {
    println!("  ⚠ {}", msg);
}

// ============================================================================
// Active bar registry
// ============================================================================

static ACTIVE_BAR: Mutex<Option<ProgressBar>> = Mutex::new(None);

fn set_active_bar(bar: Option<ProgressBar>) {
    if let Ok(mut active) = ACTIVE_BAR.lock() {
        *active = bar;
    }
}

fn active_bar() -> Option<ProgressBar> {
    ACTIVE_BAR.lock().ok().and_then(|active| active.clone())
}

/// Run `f` with the active bar, if any, cleared from the terminal
pub fn suspend_active<R>(f: impl FnOnce() -> R) -> R {
    match active_bar() {
        Some(bar) => bar.suspend(f),
        None => f(),
    }
}

// ============================================================================
// Corpus loading spinner
// ============================================================================

/// Spinner shown while reference shards are read
pub struct CorpusLoadProgress {
    spinner: ProgressBar,
    registered: bool,
    start_time: Instant,
    last_update: Mutex<Instant>,
    update_interval: Duration,
}

impl CorpusLoadProgress {
    pub fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(spinner_style());
        spinner.enable_steady_tick(Duration::from_millis(100));
        spinner.set_message("Loading reference corpus...");
        set_active_bar(Some(spinner.clone()));
        Self {
            registered: true,
            ..Self::with_bar(spinner)
        }
    }

    /// A tracker that draws nothing
    pub fn hidden() -> Self {
        Self::with_bar(ProgressBar::hidden())
    }

    fn with_bar(spinner: ProgressBar) -> Self {
        Self {
            spinner,
            registered: false,
            start_time: Instant::now(),
            last_update: Mutex::new(Instant::now()),
            update_interval: Duration::from_millis(100),
        }
    }

    /// Record a finished shard. Called from loader worker threads.
    pub fn update(&self, progress: &LoadProgress) {
        let now = Instant::now();
        let should_update = match self.last_update.lock() {
            Ok(mut last) if now.duration_since(*last) >= self.update_interval => {
                *last = now;
                true
            }
            Ok(_) => progress.shards_done == progress.total_shards,
            Err(_) => false,
        };

        if should_update {
            self.spinner.set_message(format!(
                "Loading reference corpus: {}/{} shards ({:.0}s)",
                progress.shards_done,
                progress.total_shards,
                self.start_time.elapsed().as_secs()
            ));
        }
    }

    fn release(&self) {
        if self.registered {
            set_active_bar(None);
        }
    }

    pub fn finish(&self, stats: &IndexStats) {
        self.release();
        self.spinner.finish_with_message(format!(
            "✓ Loaded {} unique checksums from {} shard(s) ({:.1}s)",
            stats.unique_checksums,
            stats.shards,
            self.start_time.elapsed().as_secs_f64()
        ));
    }

    pub fn finish_with_error(&self, msg: &str) {
        self.release();
        self.spinner.finish_with_message(format!("✗ {}", msg));
    }
}

impl Default for CorpusLoadProgress {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Match progress bar
// ============================================================================

/// Bar advanced by the engine's progress events
///
/// Falls back to a spinner when the record total is not known.
pub struct MatchProgress {
    progress_bar: ProgressBar,
    registered: bool,
    start_time: Instant,
}

impl MatchProgress {
    pub fn new(total: Option<u64>) -> Self {
        let progress_bar = match total {
            Some(total) => {
                let bar = ProgressBar::new(total);
                bar.set_style(progress_bar_style());
                bar
            }
            None => {
                let bar = ProgressBar::new_spinner();
                bar.set_style(spinner_style());
                bar
            }
        };
        progress_bar.enable_steady_tick(Duration::from_millis(100));
        progress_bar.set_message("Waiting for reader...");
        set_active_bar(Some(progress_bar.clone()));
        Self {
            registered: true,
            ..Self::with_bar(progress_bar)
        }
    }

    pub fn hidden() -> Self {
        Self::with_bar(ProgressBar::hidden())
    }

    fn with_bar(progress_bar: ProgressBar) -> Self {
        Self {
            progress_bar,
            registered: false,
            start_time: Instant::now(),
        }
    }

    pub fn update(&self, event: &ProgressEvent) {
        self.progress_bar.set_position(event.processed);
        let elapsed = self.start_time.elapsed().as_secs_f64();
        let rate = if elapsed > 0.0 {
            event.processed as f64 / elapsed
        } else {
            0.0
        };
        self.progress_bar
            .set_message(format!("{} match(es), {:.0} rec/s", event.matched, rate));
    }

    fn release(&self) {
        if self.registered {
            set_active_bar(None);
        }
    }

    pub fn finish(&self, stats: &RunStatistics) {
        self.release();
        self.progress_bar.set_position(stats.total_processed);
        if stats.cancelled {
            self.progress_bar
                .abandon_with_message(format!("Cancelled ({} match(es))", stats.total_matched));
            return;
        }
        self.progress_bar.set_style(completed_style());
        self.progress_bar.finish_with_message(format!(
            "{} match(es) in {}",
            stats.total_matched,
            format_duration(stats.elapsed)
        ));
    }

    pub fn finish_with_error(&self, msg: &str) {
        self.release();
        self.progress_bar.abandon_with_message(format!("✗ {}", msg));
    }

    pub fn position(&self) -> u64 {
        self.progress_bar.position()
    }
}

// ============================================================================
// Utility functions
// ============================================================================

/// Format duration as human-readable string
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs >= 3600 {
        let hours = secs / 3600;
        let mins = (secs % 3600) / 60;
        format!("{}h {}m", hours, mins)
    } else if secs >= 60 {
        let mins = secs / 60;
        let secs = secs % 60;
        format!("{}m {}s", mins, secs)
    } else {
        format!("{:.1}s", duration.as_secs_f64())
    }
}

// ============================================================================
// Dual writer for file + console logging
// ============================================================================

/// Stderr writer that suspends the active progress bar around each write
pub struct ConsoleWriter;

impl Write for ConsoleWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        suspend_active(|| std::io::stderr().write(buf))
    }

    fn flush(&mut self) -> std::io::Result<()> {
        std::io::stderr().flush()
    }
}

/// A writer that writes to both console and file
///
/// Used for logging to both stderr and a log file simultaneously.
pub struct DualWriter {
    pub console: ConsoleWriter,
    pub file: std::fs::File,
}

impl Write for DualWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let _ = self.console.write(buf);
        self.file.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        let _ = self.console.flush();
        self.file.flush()
    }
}
