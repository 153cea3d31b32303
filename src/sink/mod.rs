//! Result sink module
//!
//! Match lines leave the process through a [`ResultSink`]. The production
//! sink is a named pipe ([`FifoSink`]): opening it waits for a reader to
//! attach, writes block while the reader is slow, and closing it gives the
//! reader EOF. [`MemorySink`] records everything in memory for tests.
//!
//! The engine treats a sink as single-use per run: open, write, close.
//!
//! # Submodules
//!
//! - `fifo` - Named-pipe sink with a cancellable, time-limited open
//! - `memory` - In-memory sink

pub mod fifo;
pub mod memory;

pub use fifo::FifoSink;
pub use memory::MemorySink;

use crate::core::error::Result;

/// Destination for formatted match lines
pub trait ResultSink {
    /// Acquire the channel. May block until a consumer attaches; fails with
    /// [`crate::core::error::MatchError::SinkUnavailable`] if none does.
    fn open(&mut self) -> Result<()>;

    /// Write one line, appending a newline if it has none. May block under
    /// consumer backpressure.
    fn write_line(&mut self, line: &str) -> Result<()>;

    /// Flush and release the channel. Closing a sink that is not open is a
    /// no-op.
    fn close(&mut self) -> Result<()>;
}

impl<S: ResultSink + ?Sized> ResultSink for Box<S> {
    fn open(&mut self) -> Result<()> {
        (**self).open()
    }

    fn write_line(&mut self, line: &str) -> Result<()> {
        (**self).write_line(line)
    }

    fn close(&mut self) -> Result<()> {
        (**self).close()
    }
}

/// `line` with exactly one trailing newline
pub(crate) fn terminated(line: &str) -> std::borrow::Cow<'_, str> {
    if line.ends_with('\n') {
        std::borrow::Cow::Borrowed(line)
    } else {
        std::borrow::Cow::Owned(format!("{}\n", line))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminated() {
        assert_eq!(terminated("a\tb"), "a\tb\n");
        assert_eq!(terminated("a\tb\n"), "a\tb\n");
        assert_eq!(terminated(""), "\n");
    }

    #[test]
    fn test_boxed_sink_delegates() {
        let mut sink: Box<dyn ResultSink> = Box::new(MemorySink::new());
        sink.open().unwrap();
        sink.write_line("x").unwrap();
        sink.close().unwrap();
    }
}
