//! Reference corpus module
//!
//! Loads the sharded reference blocklist and exposes it as a read-only
//! membership index.
//!
//! # Submodules
//!
//! - `index` - The normalized checksum set and its build statistics
//! - `loader` - Shard enumeration, preamble stripping, and parallel loading

pub mod index;
pub mod loader;

pub use index::{IndexStats, MembershipIndex};
pub use loader::{
    CorpusSource, DirectoryCorpus, LoadProgress, MemoryCorpus, ReferenceCorpusLoader,
    DEFAULT_PREAMBLE_LINES,
};
