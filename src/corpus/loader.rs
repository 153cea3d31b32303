//! Reference corpus loading
//!
//! The reference blocklist is spread over many flat "shard" files. Each shard
//! starts with a fixed-size preamble (a signature block) followed by one
//! checksum per line. Loading reads every shard, drops the preamble, and
//! merges the remaining entries into a single [`MembershipIndex`].
//!
//! # Architecture
//!
//! Where the shards come from is abstracted behind [`CorpusSource`]:
//! [`DirectoryCorpus`] enumerates files on disk, [`MemoryCorpus`] serves
//! in-memory contents for tests. Shards are independent, so they are read
//! and parsed in parallel; the merge into the shared set happens afterwards
//! on the calling thread.
//!
//! # Example
//!
//! ```rust,no_run
//! use hashmatch::corpus::{DirectoryCorpus, ReferenceCorpusLoader};
//!
//! let source = DirectoryCorpus::new("/store/VirusShareHashes", "md5");
//! let index = ReferenceCorpusLoader::new().load(&source).unwrap();
//! println!("{} reference checksums", index.size());
//! ```

use crate::core::checksum::Checksum;
use crate::core::config::CorpusConfig;
use crate::core::error::{MatchError, Result};
use crate::corpus::index::MembershipIndex;
use log::{debug, info, trace};
use rayon::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use walkdir::WalkDir;

/// Number of signature lines at the top of every shard
pub const DEFAULT_PREAMBLE_LINES: usize = 6;

/// Progress information for index building
#[derive(Debug, Clone)]
pub struct LoadProgress {
    /// Shards finished so far
    pub shards_done: usize,
    /// Total shards to read
    pub total_shards: usize,
    /// Shard that just finished
    pub shard: PathBuf,
}

/// Somewhere reference shards can be enumerated and read from
pub trait CorpusSource: Sync {
    /// Location reported in errors
    fn location(&self) -> &Path;

    /// Extension shards are recognized by
    fn extension(&self) -> &str;

    /// Enumerate shards, in a stable order
    fn list_shards(&self) -> Result<Vec<PathBuf>>;

    /// Read the full text of one shard
    fn read_shard(&self, shard: &Path) -> Result<String>;
}

/// Shards stored as files in a directory
#[derive(Debug, Clone)]
pub struct DirectoryCorpus {
    directory: PathBuf,
    extension: String,
    recursive: bool,
}

impl DirectoryCorpus {
    pub fn new<P: Into<PathBuf>>(directory: P, extension: &str) -> Self {
        Self {
            directory: directory.into(),
            extension: extension.trim_start_matches('.').to_string(),
            recursive: false,
        }
    }

    pub fn from_config(config: &CorpusConfig) -> Self {
        Self::new(config.directory.clone(), &config.extension).with_recursive(config.recursive)
    }

    /// Also look for shards in sub-directories
    pub fn with_recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    fn has_shard_extension(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| e.eq_ignore_ascii_case(&self.extension))
            .unwrap_or(false)
    }
}

impl CorpusSource for DirectoryCorpus {
    fn location(&self) -> &Path {
        &self.directory
    }

    fn extension(&self) -> &str {
        &self.extension
    }

    fn list_shards(&self) -> Result<Vec<PathBuf>> {
        // A missing directory simply has no shards.
        if !self.directory.is_dir() {
            debug!("Corpus directory does not exist: {}", self.directory.display());
            return Ok(Vec::new());
        }

        let walker = WalkDir::new(&self.directory)
            .min_depth(1)
            .max_depth(if self.recursive { usize::MAX } else { 1 })
            .follow_links(true)
            .sort_by_file_name();

        let mut shards = Vec::new();
        for entry in walker {
            let entry = entry.map_err(|e| MatchError::CorpusUnreadable {
                path: e
                    .path()
                    .map(Path::to_path_buf)
                    .unwrap_or_else(|| self.directory.clone()),
                message: e.to_string(),
            })?;

            if entry.file_type().is_file() && self.has_shard_extension(entry.path()) {
                shards.push(entry.into_path());
            }
        }

        Ok(shards)
    }

    fn read_shard(&self, shard: &Path) -> Result<String> {
        let bytes = fs::read(shard).map_err(|e| MatchError::CorpusUnreadable {
            path: shard.to_path_buf(),
            message: e.to_string(),
        })?;
        // Stray non-UTF-8 bytes only spoil their own line, which is then skipped.
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

/// Shards held in memory
#[derive(Debug, Clone)]
pub struct MemoryCorpus {
    location: PathBuf,
    shards: Vec<(PathBuf, String)>,
}

impl MemoryCorpus {
    pub fn new() -> Self {
        Self {
            location: PathBuf::from("<memory>"),
            shards: Vec::new(),
        }
    }

    /// Add a shard with the given name and full text
    pub fn with_shard(mut self, name: &str, contents: impl Into<String>) -> Self {
        self.shards.push((PathBuf::from(name), contents.into()));
        self
    }
}

impl Default for MemoryCorpus {
    fn default() -> Self {
        Self::new()
    }
}

impl CorpusSource for MemoryCorpus {
    fn location(&self) -> &Path {
        &self.location
    }

    fn extension(&self) -> &str {
        "md5"
    }

    fn list_shards(&self) -> Result<Vec<PathBuf>> {
        Ok(self.shards.iter().map(|(name, _)| name.clone()).collect())
    }

    fn read_shard(&self, shard: &Path) -> Result<String> {
        self.shards
            .iter()
            .find(|(name, _)| name == shard)
            .map(|(_, contents)| contents.clone())
            .ok_or_else(|| MatchError::CorpusUnreadable {
                path: shard.to_path_buf(),
                message: "no such shard".to_string(),
            })
    }
}

/// Entries and counters extracted from one shard
#[derive(Debug, Default)]
struct ParsedShard {
    entries: Vec<Checksum>,
    lines_read: u64,
    preamble_lines: u64,
    malformed_lines: u64,
}

fn parse_shard(contents: &str, preamble_lines: usize) -> ParsedShard {
    let mut parsed = ParsedShard::default();

    for (line_no, line) in contents.lines().enumerate() {
        parsed.lines_read += 1;

        if line_no < preamble_lines {
            parsed.preamble_lines += 1;
            continue;
        }

        match Checksum::parse(line) {
            Some(checksum) => parsed.entries.push(checksum),
            None => {
                trace!("Skipping malformed line {}: {:?}", line_no + 1, line);
                parsed.malformed_lines += 1;
            }
        }
    }

    parsed
}

/// Builds a [`MembershipIndex`] from a [`CorpusSource`]
#[derive(Debug, Clone)]
pub struct ReferenceCorpusLoader {
    preamble_lines: usize,
    shutdown_flag: Option<Arc<AtomicBool>>,
}

impl Default for ReferenceCorpusLoader {
    fn default() -> Self {
        Self {
            preamble_lines: DEFAULT_PREAMBLE_LINES,
            shutdown_flag: None,
        }
    }
}

impl ReferenceCorpusLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &CorpusConfig) -> Self {
        Self::new().with_preamble_lines(config.preamble_lines)
    }

    /// Set how many leading lines of each shard are skipped
    pub fn with_preamble_lines(mut self, lines: usize) -> Self {
        self.preamble_lines = lines;
        self
    }

    /// Abort loading when the flag is raised
    pub fn with_shutdown_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.shutdown_flag = Some(flag);
        self
    }

    fn shutdown_requested(&self) -> bool {
        self.shutdown_flag
            .as_ref()
            .map(|f| f.load(Ordering::Relaxed))
            .unwrap_or(false)
    }

    /// Load every shard of `source` into one index
    pub fn load<S: CorpusSource>(&self, source: &S) -> Result<MembershipIndex> {
        self.load_with_progress(source, |_| {})
    }

    /// Load every shard of `source`, calling `progress_callback` as each shard
    /// finishes.
    ///
    /// Fails with [`MatchError::CorpusEmpty`] when the source has no shards
    /// and [`MatchError::CorpusUnreadable`] when any shard cannot be read.
    /// Blank or non-hex lines are skipped and counted, never fatal.
    pub fn load_with_progress<S, F>(&self, source: &S, progress_callback: F) -> Result<MembershipIndex>
    where
        S: CorpusSource,
        F: Fn(LoadProgress) + Send + Sync,
    {
        let start_time = Instant::now();

        let shards = source.list_shards()?;
        if shards.is_empty() {
            return Err(MatchError::CorpusEmpty {
                directory: source.location().to_path_buf(),
                extension: source.extension().to_string(),
            });
        }

        let total_shards = shards.len();
        info!(
            "Loading {} reference shard(s) from {}",
            total_shards,
            source.location().display()
        );

        let done = AtomicUsize::new(0);

        let parsed: Vec<Option<ParsedShard>> = shards
            .par_iter()
            .map(|shard| {
                if self.shutdown_requested() {
                    return Ok(None);
                }

                let contents = source.read_shard(shard)?;
                let parsed = parse_shard(&contents, self.preamble_lines);
                debug!(
                    "{}: {} entries, {} malformed line(s) skipped",
                    shard.display(),
                    parsed.entries.len(),
                    parsed.malformed_lines
                );

                let shards_done = done.fetch_add(1, Ordering::Relaxed) + 1;
                progress_callback(LoadProgress {
                    shards_done,
                    total_shards,
                    shard: shard.clone(),
                });

                Ok(Some(parsed))
            })
            .collect::<Result<_>>()?;

        if self.shutdown_requested() {
            info!("Corpus loading interrupted");
            return Err(MatchError::Cancelled);
        }

        let capacity = parsed.iter().flatten().map(|p| p.entries.len()).sum();
        let mut index = MembershipIndex::with_capacity(capacity);
        let mut lines_read = 0;
        let mut preamble_lines = 0;
        let mut malformed_lines = 0;

        for shard in parsed.into_iter().flatten() {
            lines_read += shard.lines_read;
            preamble_lines += shard.preamble_lines;
            malformed_lines += shard.malformed_lines;
            for checksum in shard.entries {
                index.insert(checksum);
            }
        }

        let stats = index.stats_mut();
        stats.shards = total_shards;
        stats.lines_read = lines_read;
        stats.preamble_lines = preamble_lines;
        stats.malformed_lines = malformed_lines;
        stats.build_time_ms = start_time.elapsed().as_millis() as u64;

        info!(
            "Index built: {} unique checksums from {} shard(s), {} duplicate(s), {} malformed line(s) in {}ms",
            index.size(),
            total_shards,
            index.stats().duplicate_entries,
            malformed_lines,
            index.stats().build_time_ms
        );

        Ok(index)
    }
}
