//! Tracing setup: warnings to stderr, plus an optional log file.
//!
//! The log file gets one line per event, written on a background worker
//! (`tracing_appender::non_blocking`) through a [`RotatingLogWriter`] that moves
//! the file aside to `<file>.1` once it holds `max_entries` lines.

use crate::config::LoggingSettings;
use chrono::Local;
use std::ffi::OsString;
use std::fmt as stdfmt;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::filter::{EnvFilter, LevelFilter};
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::{Layer, fmt, registry};

/// Local wall-clock timestamps, `2024-05-01 13:37:00`.
struct LocalTime;

impl FormatTime for LocalTime {
    fn format_time(&self, w: &mut Writer<'_>) -> stdfmt::Result {
        write!(w, "{}", Local::now().format("%Y-%m-%d %H:%M:%S"))
    }
}

/// Append-only file writer that rotates after a fixed number of lines.
///
/// Lines already in the file when it is opened count towards the limit. A
/// `max_entries` of zero disables rotation.
pub struct RotatingLogWriter {
    path: PathBuf,
    file: File,
    max_entries: usize,
    entries: usize,
}

impl RotatingLogWriter {
    pub fn open(path: impl Into<PathBuf>, max_entries: usize) -> io::Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        let entries = count_lines(&path)?;
        let file = open_append(&path)?;
        Ok(Self {
            path,
            file,
            max_entries,
            entries,
        })
    }

    /// Path the previous generation is moved to on rotation.
    pub fn rotated_path(&self) -> PathBuf {
        rotated_path(&self.path)
    }

    fn rotate(&mut self) -> io::Result<()> {
        self.file.flush()?;
        let rotated = self.rotated_path();
        // Windows refuses to rename over an existing file.
        if rotated.exists() {
            fs::remove_file(&rotated)?;
        }
        fs::rename(&self.path, &rotated)?;
        self.file = open_append(&self.path)?;
        self.entries = 0;
        Ok(())
    }
}

impl Write for RotatingLogWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let written = self.file.write(buf)?;
        self.entries += buf[..written].iter().filter(|&&b| b == b'\n').count();
        if self.max_entries > 0 && self.entries >= self.max_entries {
            self.rotate()?;
        }
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

fn open_append(path: &Path) -> io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

fn count_lines(path: &Path) -> io::Result<usize> {
    match File::open(path) {
        Ok(file) => Ok(BufReader::new(file).split(b'\n').count()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(0),
        Err(e) => Err(e),
    }
}

fn rotated_path(path: &Path) -> PathBuf {
    let mut name: OsString = path.as_os_str().to_owned();
    name.push(".1");
    PathBuf::from(name)
}

fn parse_level(level: &str) -> LevelFilter {
    level.trim().parse().unwrap_or_else(|_| {
        eprintln!("Unknown log level '{}', using info", level);
        LevelFilter::INFO
    })
}

/// Installs the global subscriber.
///
/// Returns the guard of the file worker, if file logging is on; it must be held
/// until exit so buffered lines are flushed. A log file that cannot be opened
/// only disables file logging.
///
/// # Errors
///
/// Fails if a global subscriber has already been installed.
pub fn init_tracing(
    settings: &LoggingSettings,
    verbose: bool,
) -> Result<Option<WorkerGuard>, TryInitError> {
    let stderr_filter = EnvFilter::new(if verbose { "warn,tidywatch=debug" } else { "warn" });
    let stderr_layer = fmt::layer()
        .with_writer(io::stderr)
        .with_timer(LocalTime)
        .with_target(false)
        .compact()
        .with_filter(stderr_filter);

    let mut guard = None;
    let mut file_layer = None;
    if settings.enabled {
        match RotatingLogWriter::open(&settings.file, settings.max_entries) {
            Ok(writer) => {
                let (non_blocking, worker_guard) = tracing_appender::non_blocking(writer);
                guard = Some(worker_guard);
                file_layer = Some(
                    fmt::layer()
                        .with_writer(non_blocking)
                        .with_timer(LocalTime)
                        .with_ansi(false)
                        .with_target(false)
                        .with_filter(parse_level(&settings.level)),
                );
            }
            Err(e) => {
                eprintln!(
                    "Failed to open log file {}: {}; continuing without file logging.",
                    settings.file.display(),
                    e
                );
            }
        }
    }

    registry().with(stderr_layer).with(file_layer).try_init()?;
    Ok(guard)
}
