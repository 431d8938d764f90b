//! Logging and tracing infrastructure.
//!
//! Library code only emits `tracing` events and spans. The process-wide
//! subscriber is installed once by the top-level caller through
//! [`init_logging`], which returns a [`LogHandle`] that flushes the optional
//! log file when dropped.

use crate::error::{Result, ScanError};
use crate::triage::config::LoggingConfig;
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::sync::{Arc, Mutex, Once};
use tracing::{debug, info, Subscriber};
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

static INIT: Once = Once::new();

/// Cloneable writer over one shared log file.
#[derive(Clone)]
struct SharedLogFile(Arc<Mutex<BufWriter<File>>>);

impl SharedLogFile {
    fn lock(&self) -> io::Result<std::sync::MutexGuard<'_, BufWriter<File>>> {
        self.0
            .lock()
            .map_err(|_| io::Error::other("log file lock poisoned"))
    }
}

impl Write for SharedLogFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.lock()?.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.lock()?.flush()
    }
}

/// Keeps the file sink alive and flushes it on drop.
pub struct LogHandle {
    file: Option<SharedLogFile>,
}

impl LogHandle {
    pub fn flush(&self) {
        if let Some(file) = &self.file {
            let _ = file.clone().flush();
        }
    }
}

impl Drop for LogHandle {
    fn drop(&mut self) {
        self.flush();
    }
}

fn env_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

fn open_log_file(path: &Path) -> Result<SharedLogFile> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| ScanError::io(parent, e))?;
    }
    let f = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| ScanError::io(path, e))?;
    Ok(SharedLogFile(Arc::new(Mutex::new(BufWriter::new(f)))))
}

/// Stderr layer, optional file layer and level filter, not yet installed.
fn build_subscriber(
    config: &LoggingConfig,
    file: Option<SharedLogFile>,
) -> impl Subscriber + Send + Sync + 'static {
    let stderr_layer = if config.json {
        fmt::layer()
            .json()
            .with_writer(io::stderr)
            .with_span_events(FmtSpan::CLOSE)
            .with_target(true)
            .with_current_span(true)
            .boxed()
    } else {
        fmt::layer()
            .with_writer(io::stderr)
            .with_span_events(FmtSpan::CLOSE)
            .with_target(true)
            .boxed()
    };

    let file_layer = file.map(|sink| {
        let layer = fmt::layer()
            .with_ansi(false)
            .with_target(true)
            .with_writer(move || sink.clone());
        if config.json {
            layer.json().boxed()
        } else {
            layer.boxed()
        }
    });

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer)
        .with(env_filter(&config.level))
}

/// Install the global subscriber described by `config`.
///
/// If a subscriber is already installed the call only opens the log file, so
/// repeated calls are harmless.
pub fn init_logging(config: &LoggingConfig) -> Result<LogHandle> {
    let file = config.file.as_deref().map(open_log_file).transpose()?;

    match build_subscriber(config, file.clone()).try_init() {
        Ok(()) => info!(json = config.json, file = ?config.file, "tracing initialized"),
        Err(e) => debug!(error = %e, "subscriber already installed"),
    }

    Ok(LogHandle { file })
}

/// Initialize a plain text subscriber once. Used by tests.
pub fn init_tracing() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::registry()
            .with(fmt::layer().with_test_writer().with_target(true))
            .with(env_filter("info"))
            .try_init();
    });
}
