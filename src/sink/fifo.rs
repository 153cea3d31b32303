//! Named-pipe result sink
//!
//! Opening a FIFO for writing normally blocks until some process opens it for
//! reading, with no way to give up. This sink instead retries a non-blocking
//! open at a fixed interval, so the wait can end on a timeout or on a
//! shutdown request. Once a reader is attached the descriptor is switched
//! back to blocking mode: a slow reader stalls the writer rather than
//! causing dropped lines.
//!
//! On platforms without named pipes the path is opened as a regular file in
//! append mode.

use crate::core::config::SinkConfig;
use crate::core::error::{MatchError, Result};
use crate::sink::{terminated, ResultSink};
use log::{debug, info, warn};
use std::fs::{self, File, OpenOptions};
use std::io::{self, LineWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Default delay between attach attempts
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Sink writing match lines to a named pipe
#[derive(Debug)]
pub struct FifoSink {
    path: PathBuf,
    create: bool,
    open_timeout: Option<Duration>,
    poll_interval: Duration,
    shutdown_flag: Option<Arc<AtomicBool>>,
    writer: Option<LineWriter<File>>,
    lines_written: u64,
}

impl FifoSink {
    /// Sink for `path`; waits forever for a reader and does not create the
    /// pipe unless told to.
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            path: path.into(),
            create: false,
            open_timeout: None,
            poll_interval: DEFAULT_POLL_INTERVAL,
            shutdown_flag: None,
            writer: None,
            lines_written: 0,
        }
    }

    pub fn from_config(config: &SinkConfig) -> Self {
        Self::new(config.fifo_path.clone())
            .with_create(config.create_fifo)
            .with_open_timeout(config.open_timeout())
            .with_poll_interval(config.poll_interval())
    }

    /// Create the pipe on open if it does not exist
    pub fn with_create(mut self, create: bool) -> Self {
        self.create = create;
        self
    }

    /// Give up waiting for a reader after `timeout` (`None` = never)
    pub fn with_open_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.open_timeout = timeout;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Stop waiting for a reader when the flag is raised
    pub fn with_shutdown_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.shutdown_flag = Some(flag);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Lines written since the last open
    pub fn lines_written(&self) -> u64 {
        self.lines_written
    }

    fn shutdown_requested(&self) -> bool {
        self.shutdown_flag
            .as_ref()
            .map(|f| f.load(Ordering::Relaxed))
            .unwrap_or(false)
    }

    fn ensure_exists(&self) -> Result<()> {
        match fs::metadata(&self.path) {
            Ok(meta) => {
                if !is_fifo(&meta) {
                    warn!(
                        "{} is not a named pipe; writing to it as a regular file",
                        self.path.display()
                    );
                }
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound && self.create => {
                create_fifo(&self.path).map(|_| ())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(MatchError::SinkUnavailable(
                format!("{} does not exist", self.path.display()),
            )),
            Err(e) => Err(MatchError::Io(format!(
                "Failed to stat {}: {}",
                self.path.display(),
                e
            ))),
        }
    }
}

impl ResultSink for FifoSink {
    fn open(&mut self) -> Result<()> {
        if self.writer.is_some() {
            return Ok(());
        }

        self.ensure_exists()?;

        let started = Instant::now();
        let mut announced = false;

        let file = loop {
            match try_attach(&self.path) {
                Ok(Some(file)) => break file,
                Ok(None) => {}
                Err(e) => {
                    return Err(MatchError::Io(format!(
                        "Failed to open {}: {}",
                        self.path.display(),
                        e
                    )))
                }
            }

            if !announced {
                info!("Waiting for a reader on {}", self.path.display());
                announced = true;
            }

            if self.shutdown_requested() {
                return Err(MatchError::SinkUnavailable(format!(
                    "shutdown requested while waiting for a reader on {}",
                    self.path.display()
                )));
            }

            if let Some(timeout) = self.open_timeout {
                if started.elapsed() >= timeout {
                    return Err(MatchError::SinkUnavailable(format!(
                        "no reader attached to {} within {:.1}s",
                        self.path.display(),
                        timeout.as_secs_f64()
                    )));
                }
            }

            thread::sleep(self.poll_interval);
        };

        set_blocking(&file)?;
        debug!(
            "Reader attached to {} after {:.2}s",
            self.path.display(),
            started.elapsed().as_secs_f64()
        );

        self.writer = Some(LineWriter::new(file));
        self.lines_written = 0;
        Ok(())
    }

    fn write_line(&mut self, line: &str) -> Result<()> {
        let writer = self.writer.as_mut().ok_or_else(|| {
            MatchError::Io(format!("{} is not open for writing", self.path.display()))
        })?;

        writer
            .write_all(terminated(line).as_bytes())
            .map_err(|e| MatchError::Io(format!("Failed to write to {}: {}", self.path.display(), e)))?;
        self.lines_written += 1;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if let Some(mut writer) = self.writer.take() {
            writer
                .flush()
                .map_err(|e| MatchError::Io(format!("Failed to flush {}: {}", self.path.display(), e)))?;
            debug!(
                "Closed {} after {} line(s)",
                self.path.display(),
                self.lines_written
            );
        }
        Ok(())
    }
}

#[cfg(unix)]
fn is_fifo(meta: &fs::Metadata) -> bool {
    use std::os::unix::fs::FileTypeExt;
    meta.file_type().is_fifo()
}

#[cfg(not(unix))]
fn is_fifo(_meta: &fs::Metadata) -> bool {
    false
}

/// Create a named pipe at `path` (mode 0644). An existing entry is left alone.
///
/// Returns whether a new pipe was created.
#[cfg(unix)]
pub fn create_fifo(path: &Path) -> Result<bool> {
    use std::ffi::CString;
    use std::os::unix::ffi::OsStrExt;

    let c_path = CString::new(path.as_os_str().as_bytes())
        .map_err(|_| MatchError::Io(format!("Path contains a NUL byte: {}", path.display())))?;

    // SAFETY: c_path is a valid NUL-terminated string for the duration of the call.
    let rc = unsafe { libc::mkfifo(c_path.as_ptr(), 0o644) };
    if rc != 0 {
        let err = io::Error::last_os_error();
        if err.kind() == io::ErrorKind::AlreadyExists {
            debug!("FIFO {} already exists", path.display());
            return Ok(false);
        }
        return Err(MatchError::Io(format!(
            "Failed to create FIFO {}: {}",
            path.display(),
            err
        )));
    }

    info!("Created FIFO {}", path.display());
    Ok(true)
}

#[cfg(not(unix))]
pub fn create_fifo(path: &Path) -> Result<bool> {
    if path.exists() {
        return Ok(false);
    }
    File::create(path)?;
    Ok(true)
}

/// One non-blocking attempt to open `path` for writing. `Ok(None)` means no
/// reader is attached yet.
#[cfg(unix)]
fn try_attach(path: &Path) -> io::Result<Option<File>> {
    use std::os::unix::fs::OpenOptionsExt;

    match OpenOptions::new()
        .append(true)
        .custom_flags(libc::O_NONBLOCK)
        .open(path)
    {
        Ok(file) => Ok(Some(file)),
        Err(e) if e.raw_os_error() == Some(libc::ENXIO) => Ok(None),
        Err(e) => Err(e),
    }
}

#[cfg(not(unix))]
fn try_attach(path: &Path) -> io::Result<Option<File>> {
    OpenOptions::new().append(true).create(true).open(path).map(Some)
}

/// Clear O_NONBLOCK so writes wait for the reader
#[cfg(unix)]
fn set_blocking(file: &File) -> Result<()> {
    use std::os::unix::io::AsRawFd;

    let fd = file.as_raw_fd();
    // SAFETY: fd is owned by `file` and stays open for both calls.
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
    if flags < 0 {
        return Err(io::Error::last_os_error().into());
    }
    // SAFETY: as above.
    if unsafe { libc::fcntl(fd, libc::F_SETFL, flags & !libc::O_NONBLOCK) } < 0 {
        return Err(io::Error::last_os_error().into());
    }
    Ok(())
}

#[cfg(not(unix))]
fn set_blocking(_file: &File) -> Result<()> {
    Ok(())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::io::Read;

    fn quick(path: &Path) -> FifoSink {
        FifoSink::new(path)
            .with_create(true)
            .with_poll_interval(Duration::from_millis(5))
    }

    #[test]
    fn test_creates_missing_fifo() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("matches.fifo");

        let mut sink = quick(&path).with_open_timeout(Some(Duration::from_millis(30)));
        let _ = sink.open();

        let meta = fs::metadata(&path).unwrap();
        assert!(is_fifo(&meta));
    }

    #[test]
    fn test_create_fifo_reports_existing_pipe() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("matches.fifo");

        assert!(create_fifo(&path).unwrap());
        assert!(!create_fifo(&path).unwrap());
        assert!(is_fifo(&fs::metadata(&path).unwrap()));
    }

    #[test]
    fn test_open_times_out_without_reader() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("matches.fifo");
        let timeout = Duration::from_millis(60);

        let mut sink = quick(&path).with_open_timeout(Some(timeout));
        let started = Instant::now();
        let err = sink.open().unwrap_err();

        assert!(matches!(err, MatchError::SinkUnavailable(_)));
        assert!(err.is_retryable());
        assert!(started.elapsed() >= timeout);
    }

    #[test]
    fn test_shutdown_interrupts_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("matches.fifo");
        let flag = Arc::new(AtomicBool::new(false));

        let mut sink = quick(&path).with_shutdown_flag(flag.clone());
        let raiser = {
            let flag = flag.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(30));
                flag.store(true, Ordering::SeqCst);
            })
        };

        let err = sink.open().unwrap_err();
        raiser.join().unwrap();
        assert!(matches!(err, MatchError::SinkUnavailable(ref m) if m.contains("shutdown")));
    }

    #[test]
    fn test_missing_fifo_without_create() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = FifoSink::new(dir.path().join("absent.fifo"));
        assert!(matches!(sink.open(), Err(MatchError::SinkUnavailable(_))));
    }

    #[test]
    fn test_reader_receives_lines_and_eof() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("matches.fifo");
        create_fifo(&path).unwrap();

        let reader = {
            let path = path.clone();
            thread::spawn(move || {
                let mut file = File::open(&path).unwrap();
                let mut out = String::new();
                file.read_to_string(&mut out).unwrap();
                out
            })
        };

        let mut sink = quick(&path).with_open_timeout(Some(Duration::from_secs(10)));
        sink.open().unwrap();
        sink.write_line("first\tline").unwrap();
        sink.write_line("second\n").unwrap();
        assert_eq!(sink.lines_written(), 2);
        sink.close().unwrap();

        assert_eq!(reader.join().unwrap(), "first\tline\nsecond\n");
    }

    #[test]
    fn test_regular_file_is_appended() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("matches.txt");
        fs::write(&path, "existing\n").unwrap();

        let mut sink = FifoSink::new(&path);
        sink.open().unwrap();
        sink.write_line("new").unwrap();
        sink.close().unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "existing\nnew\n");
    }

    #[test]
    fn test_write_requires_open() {
        let mut sink = FifoSink::new("/tmp/never-opened.fifo");
        assert!(sink.write_line("x").is_err());
        assert!(sink.close().is_ok());
    }
}
