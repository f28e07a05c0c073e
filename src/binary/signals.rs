//! Relaying SIGINT/SIGTERM to the child.
//!
//! Wine does not pass an interrupt on to Roblox, so the launcher holds the
//! signals itself: the first one kills the child, after which the default
//! dispositions are restored and a second signal ends the launcher outright.

use anyhow::{Context, Result};
use nix::sys::signal::{self, SigHandler, Signal};
use nix::unistd::Pid;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::signal::unix::{signal as unix_signal, SignalKind};
use tokio::task::JoinHandle;
use tracing::{error, warn};

pub(crate) trait ChildControl {
    fn pid(&self) -> u32;
    fn has_exited(&self) -> bool;
    fn kill(&self) -> Result<()>;
}

/// What the relay needs to know about the launched process.
#[derive(Debug, Clone)]
pub(crate) struct ChildHandle {
    pid: u32,
    exited: Arc<AtomicBool>,
}

impl ChildHandle {
    pub(crate) fn new(pid: u32) -> Self {
        Self {
            pid,
            exited: Arc::new(AtomicBool::new(false)),
        }
    }

    pub(crate) fn mark_exited(&self) {
        self.exited.store(true, Ordering::SeqCst);
    }
}

impl ChildControl for ChildHandle {
    fn pid(&self) -> u32 {
        self.pid
    }

    fn has_exited(&self) -> bool {
        self.exited.load(Ordering::SeqCst)
    }

    fn kill(&self) -> Result<()> {
        let pid = i32::try_from(self.pid).context("pid out of range")?;
        signal::kill(Pid::from_raw(pid), Signal::SIGKILL)
            .with_context(|| format!("kill {}", self.pid))
    }
}

/// Wait for `first_signal`, then kill `child` unless it already exited.
///
/// The signal source is consumed, so nothing is listening once this returns.
/// Returns whether a kill was sent.
pub(crate) async fn relay_first_signal<F, C>(first_signal: F, child: &C) -> bool
where
    F: Future<Output = &'static str>,
    C: ChildControl,
{
    let name = first_signal.await;
    warn!(signal = name, "Received signal");

    if child.has_exited() {
        return false;
    }
    warn!(pid = child.pid(), "Killing Roblox");
    if let Err(err) = child.kill() {
        error!(error = %format!("{err:#}"), "Failed to kill Roblox");
    }
    true
}

pub(crate) struct SignalRelay {
    task: JoinHandle<()>,
}

/// Start holding SIGINT and SIGTERM on behalf of `child`.
pub(crate) fn arm(child: ChildHandle) -> Result<SignalRelay> {
    let mut int = unix_signal(SignalKind::interrupt()).context("listen for SIGINT")?;
    let mut term = unix_signal(SignalKind::terminate()).context("listen for SIGTERM")?;

    let task = tokio::spawn(async move {
        let first = async move {
            tokio::select! {
                _ = int.recv() => "SIGINT",
                _ = term.recv() => "SIGTERM",
            }
        };
        relay_first_signal(first, &child).await;
        restore_default_dispositions();
    });
    Ok(SignalRelay { task })
}

impl SignalRelay {
    /// The child is gone; stop intercepting signals.
    pub(crate) fn disarm(self) {
        self.task.abort();
        restore_default_dispositions();
    }
}

fn restore_default_dispositions() {
    for sig in [Signal::SIGINT, Signal::SIGTERM] {
        // SAFETY: SIG_DFL installs no Rust code as a handler.
        if let Err(err) = unsafe { signal::signal(sig, SigHandler::SigDfl) } {
            error!(signal = %sig, error = %err, "could not restore signal disposition");
        }
    }
}
