//! In-memory result sink

use crate::core::error::{MatchError, Result};
use crate::sink::{terminated, ResultSink};

/// Sink that keeps every written line
///
/// Can be told to refuse opening, to simulate a consumer that never attaches,
/// or to fail after a number of writes, to simulate a consumer going away.
#[derive(Debug, Default)]
pub struct MemorySink {
    lines: Vec<String>,
    is_open: bool,
    open_count: usize,
    close_count: usize,
    refuse_open: bool,
    fail_after: Option<usize>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// A sink whose `open` always fails with `SinkUnavailable`
    pub fn unavailable() -> Self {
        Self {
            refuse_open: true,
            ..Self::default()
        }
    }

    /// Fail every write after the first `writes` succeed
    pub fn failing_after(writes: usize) -> Self {
        Self {
            fail_after: Some(writes),
            ..Self::default()
        }
    }

    /// Lines written so far, newline-terminated
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Everything written, concatenated
    pub fn contents(&self) -> String {
        self.lines.concat()
    }

    pub fn is_open(&self) -> bool {
        self.is_open
    }

    pub fn open_count(&self) -> usize {
        self.open_count
    }

    pub fn close_count(&self) -> usize {
        self.close_count
    }
}

impl ResultSink for MemorySink {
    fn open(&mut self) -> Result<()> {
        if self.refuse_open {
            return Err(MatchError::SinkUnavailable(
                "no reader attached".to_string(),
            ));
        }
        self.is_open = true;
        self.open_count += 1;
        Ok(())
    }

    fn write_line(&mut self, line: &str) -> Result<()> {
        if !self.is_open {
            return Err(MatchError::Io("write to a sink that is not open".to_string()));
        }
        if let Some(limit) = self.fail_after {
            if self.lines.len() >= limit {
                return Err(MatchError::Io("Broken pipe (os error 32)".to_string()));
            }
        }
        self.lines.push(terminated(line).into_owned());
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if self.is_open {
            self.is_open = false;
            self.close_count += 1;
        }
        Ok(())
    }
}
