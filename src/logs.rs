//! Run logging: a per-run log file teed with stderr, and the tracing subscriber on top of it.

use anyhow::{Context, Result};
use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use time::macros::format_description;
use tracing::subscriber::NoSubscriber;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

// Set while the splash renderer owns the terminal.
static STDERR_MUTED: AtomicBool = AtomicBool::new(false);

pub fn mute_stderr(muted: bool) {
    STDERR_MUTED.store(muted, Ordering::Relaxed);
}

/// Combined output sink shared by the logger, the wine prefix and the log tail.
///
/// Every write goes to the run's log file (if any) and to stderr, unless the
/// splash renderer currently owns the terminal.
#[derive(Clone, Default)]
pub struct LogSink {
    file: Option<Arc<Mutex<File>>>,
}

impl LogSink {
    pub fn stderr() -> Self {
        Self { file: None }
    }

    pub fn with_file(file: File) -> Self {
        Self {
            file: Some(Arc::new(Mutex::new(file))),
        }
    }

    pub fn write_line(&self, line: &str) {
        let mut buf = Vec::with_capacity(line.len() + 1);
        buf.extend_from_slice(line.as_bytes());
        buf.push(b'\n');
        let _ = self.clone().write_all(&buf);
    }
}

impl Write for LogSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if let Some(file) = &self.file {
            let mut f = file.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            f.write_all(buf)?;
        }
        if !STDERR_MUTED.load(Ordering::Relaxed) {
            io::stderr().write_all(buf)?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if let Some(file) = &self.file {
            let mut f = file.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            f.flush()?;
        }
        io::stderr().flush()
    }
}

impl std::fmt::Debug for LogSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogSink")
            .field("file", &self.file.is_some())
            .finish()
    }
}

impl<'a> MakeWriter<'a> for LogSink {
    type Writer = LogSink;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

/// Create a fresh log file named after `kind` and the current local time.
pub fn create_file(dir: &Path, kind: &str) -> Result<(File, PathBuf)> {
    std::fs::create_dir_all(dir).with_context(|| format!("create log dir {}", dir.display()))?;

    let now = time::OffsetDateTime::now_local().unwrap_or_else(|_| time::OffsetDateTime::now_utc());
    let stamp = now
        .format(format_description!(
            "[year]-[month]-[day]T[hour]-[minute]-[second]"
        ))
        .context("format log timestamp")?;

    let path = dir.join(format!("{kind}-{stamp}.log"));
    let file = File::create(&path).with_context(|| format!("create {}", path.display()))?;
    Ok((file, path))
}

/// Install the global tracing subscriber writing into `sink`.
///
/// `RUST_LOG` takes precedence over `level`. Installing twice is a no-op.
pub fn init_tracing(level: &str, sink: LogSink) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(sink)
                .with_ansi(false)
                .with_target(false),
        )
        .try_init();
}

/// Report the error that ends the process: through tracing, and so into the
/// run's log file, once a subscriber is installed, otherwise on stderr.
pub fn report_fatal(err: &anyhow::Error) {
    let traced = tracing::dispatcher::get_default(|d| !d.is::<NoSubscriber>());
    if traced {
        tracing::error!("{err:#}");
    } else {
        eprintln!("vinegar: {err:#}");
    }
}
