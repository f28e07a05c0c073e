//! Finding and following the client's log file.
//!
//! [`discover`] waits for the first file created in a directory. [`LogTail`]
//! follows that file as it grows and hands out complete lines.

use anyhow::{Context, Result};
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::error;

/// How long the client gets to create its log file after launch.
pub const DISCOVERY_TIMEOUT: Duration = Duration::from_secs(6);

// Re-check the file this often even if no modify notification arrives.
const TAIL_POLL: Duration = Duration::from_millis(250);

#[derive(Debug, thiserror::Error)]
#[error("log file not found after {0:?}")]
pub struct DiscoveryTimeout(pub Duration);

fn watch(
    path: &Path,
) -> Result<(
    RecommendedWatcher,
    mpsc::UnboundedReceiver<notify::Result<notify::Event>>,
)> {
    let (tx, rx) = mpsc::unbounded_channel();
    let mut watcher = notify::recommended_watcher(move |res| {
        let _ = tx.send(res);
    })
    .context("create watcher")?;
    watcher
        .watch(path, RecursiveMode::NonRecursive)
        .with_context(|| format!("watch {}", path.display()))?;
    Ok((watcher, rx))
}

/// Wait for the first file created inside `dir`, for at most `timeout`.
///
/// `dir` is created if missing, since it has to exist before it can be watched.
/// Watcher errors are logged and the wait continues; only the timer ends it.
pub async fn discover(dir: &Path, timeout: Duration) -> Result<PathBuf> {
    std::fs::create_dir_all(dir).with_context(|| format!("create log dir {}", dir.display()))?;

    let (_watcher, mut events) = watch(dir)?;
    let deadline = tokio::time::sleep(timeout);
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            _ = &mut deadline => return Err(DiscoveryTimeout(timeout).into()),
            ev = events.recv() => match ev {
                Some(Ok(ev)) => {
                    if matches!(ev.kind, EventKind::Create(_)) {
                        if let Some(path) = ev.paths.into_iter().next() {
                            return Ok(path);
                        }
                    }
                }
                Some(Err(err)) => error!(error = %err, "log directory watcher error"),
                None => {
                    (&mut deadline).await;
                    return Err(DiscoveryTimeout(timeout).into());
                }
            },
        }
    }
}

/// Follows a growing text file line by line, starting from its beginning.
///
/// The tail never ends on its own; drop it to stop following.
pub struct LogTail {
    reader: BufReader<File>,
    pending: Vec<u8>,
    _watcher: Option<RecommendedWatcher>,
    events: Option<mpsc::UnboundedReceiver<notify::Result<notify::Event>>>,
}

impl LogTail {
    pub async fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .await
            .with_context(|| format!("open {}", path.display()))?;

        // Without notifications the tail still works by polling.
        let (watcher, events) = match watch(path) {
            Ok((w, rx)) => (Some(w), Some(rx)),
            Err(err) => {
                error!(error = %format!("{err:#}"), "falling back to polling the log file");
                (None, None)
            }
        };

        Ok(Self {
            reader: BufReader::new(file),
            pending: Vec::new(),
            _watcher: watcher,
            events,
        })
    }

    /// The next complete line, without its line terminator.
    pub async fn next_line(&mut self) -> Result<String> {
        loop {
            let n = self
                .reader
                .read_until(b'\n', &mut self.pending)
                .await
                .context("read log file")?;

            if self.pending.last() == Some(&b'\n') {
                let mut raw = std::mem::take(&mut self.pending);
                raw.pop();
                if raw.last() == Some(&b'\r') {
                    raw.pop();
                }
                return Ok(String::from_utf8_lossy(&raw).into_owned());
            }

            if n == 0 {
                self.wait_for_growth().await;
            }
        }
    }

    async fn wait_for_growth(&mut self) {
        match self.events.as_mut() {
            Some(events) => {
                tokio::select! {
                    _ = events.recv() => {}
                    _ = tokio::time::sleep(TAIL_POLL) => {}
                }
            }
            None => tokio::time::sleep(TAIL_POLL).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn discover_returns_the_created_file() {
        let dir = tempfile::tempdir().unwrap();
        let logs = dir.path().join("Local/Roblox/logs");
        let expected = logs.join("0.600.0_20240101T000000Z_Player_1a2b3_last.log");

        let writer_path = expected.clone();
        let writer_dir = logs.clone();
        tokio::spawn(async move {
            // Wait for discover to create the directory and start watching.
            while !writer_dir.is_dir() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
            tokio::time::sleep(Duration::from_millis(300)).await;
            std::fs::write(&writer_path, "").unwrap();
        });

        let found = discover(&logs, Duration::from_secs(5)).await.unwrap();
        assert_eq!(found, expected);
    }

    #[tokio::test]
    async fn discover_times_out_without_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let logs = dir.path().join("logs");

        let err = discover(&logs, Duration::from_millis(300)).await.unwrap_err();
        assert!(err.downcast_ref::<DiscoveryTimeout>().is_some());
        assert!(logs.is_dir(), "directory is created before watching");
    }

    #[tokio::test]
    async fn tail_yields_appended_lines_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("client.log");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(f, "first").unwrap();

        let mut tail = LogTail::open(&path).await.unwrap();
        assert_eq!(tail.next_line().await.unwrap(), "first");

        let writer = tokio::task::spawn_blocking(move || {
            std::thread::sleep(Duration::from_millis(100));
            write!(f, "sec").unwrap();
            f.flush().unwrap();
            std::thread::sleep(Duration::from_millis(100));
            write!(f, "ond\r\nthird\n").unwrap();
            f.flush().unwrap();
        });

        let second = tokio::time::timeout(Duration::from_secs(5), tail.next_line())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(second, "second");
        let third = tokio::time::timeout(Duration::from_secs(5), tail.next_line())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(third, "third");
        writer.await.unwrap();
    }
}
