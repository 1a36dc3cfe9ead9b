//! Logging
//!
//! Structured logging via `tracing`/`tracing-subscriber`: a console layer
//! (`EnvFilter` + compact formatter) plus a second layer writing to a
//! rotating file sink named `dbsync.log` that rolls over at 1 MB, the Rust
//! equivalent of the original tool's
//! `logger.add("dbsync.log", rotation="1 MB", level=...)`. `tracing`'s own
//! ecosystem has no byte-size rotating appender (`tracing-appender` only
//! rotates on a time schedule), so the rolling writer below is hand-rolled;
//! everything else about the stack is ordinary `tracing-subscriber`.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tracing::Level;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const ROTATE_AT_BYTES: u64 = 1024 * 1024;

/// Initialize the global tracing subscriber: a compact console layer plus
/// a rotating file layer. Failure to open the log file is logged to the
/// console and otherwise swallowed. Loss of the log must not abort
/// reconciliation.
pub fn init(level: Level, log_path: impl AsRef<Path>) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_str().to_ascii_lowercase()));

    let console_layer = fmt::layer()
        .with_target(true)
        .with_level(true)
        .compact();

    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer);

    match RollingFileWriter::open(log_path.as_ref(), ROTATE_AT_BYTES) {
        Ok(writer) => {
            let file_layer = fmt::layer()
                .with_ansi(false)
                .with_target(true)
                .with_writer(writer);
            registry.with(file_layer).init();
        }
        Err(err) => {
            registry.init();
            tracing::warn!(error = %err, "failed to open log file, continuing with console logging only");
        }
    }
}

/// A `Write` sink that rolls the underlying file over to `<path>.1` once it
/// exceeds `max_bytes`. Only one prior generation is kept, matching the
/// spirit of a simple size-based rotation (not a full backlog policy).
#[derive(Clone)]
struct RollingFileWriter {
    inner: Arc<Mutex<RollingInner>>,
}

struct RollingInner {
    path: PathBuf,
    max_bytes: u64,
    file: File,
    written: u64,
}

impl RollingFileWriter {
    fn open(path: &Path, max_bytes: u64) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let written = file.metadata()?.len();
        Ok(Self {
            inner: Arc::new(Mutex::new(RollingInner {
                path: path.to_path_buf(),
                max_bytes,
                file,
                written,
            })),
        })
    }
}

impl RollingInner {
    fn rotate_if_needed(&mut self) -> io::Result<()> {
        if self.written < self.max_bytes {
            return Ok(());
        }
        let backup = self.path.with_extension("log.1");
        let _ = std::fs::rename(&self.path, &backup);
        self.file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        self.written = 0;
        Ok(())
    }
}

impl Write for RollingFileWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.rotate_if_needed()?;
        let n = inner.file.write(buf)?;
        inner.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).file.flush()
    }
}

impl<'a> MakeWriter<'a> for RollingFileWriter {
    type Writer = RollingFileWriter;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}
