//! Splash / status window shown while the prefix is prepared and the client launches.
//!
//! [`Splash`] is a cheap, cloneable handle over shared state. The main flow
//! mutates it (message, description, error view, dialogs) while the renderer
//! thread reads it and feeds user input back. When the renderer ends because
//! the user closed it, one SIGINT is delivered to the whole process so the
//! launch unwinds through the same path as an OS interrupt.

#[cfg(feature = "tui")]
mod ui;

use crate::config;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{oneshot, watch};
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Running,
    Closed,
    Invalidated,
}

#[derive(Debug, thiserror::Error)]
pub enum SplashError {
    #[error("splash window closed")]
    Closed,
    #[error("terminal: {0}")]
    Terminal(#[from] std::io::Error),
}

/// A question or notice waiting for the user.
pub(crate) struct DialogRequest {
    pub text: String,
    pub ask: bool,
    reply: oneshot::Sender<bool>,
}

pub(crate) struct SplashState {
    pub phase: Phase,
    pub title: String,
    pub message: String,
    pub desc: String,
    pub log_path: Option<PathBuf>,
    pub dialog: Option<DialogRequest>,
    // Set when the program, not the user, closed the window.
    pub closed_by_program: bool,
    pub errored: bool,
}

type InterruptHook = Arc<dyn Fn() + Send + Sync>;

struct Shared {
    enabled: bool,
    state: watch::Sender<SplashState>,
    interrupted: AtomicBool,
    interrupt: InterruptHook,
}

#[derive(Clone)]
pub struct Splash {
    shared: Arc<Shared>,
}

impl Splash {
    /// Without a terminal to draw on (e.g. started by a desktop URI handler)
    /// the splash is treated as disabled and the run goes on headless.
    pub fn new(cfg: &config::Splash, title: &str) -> Self {
        let terminal = std::io::stdin().is_terminal() && std::io::stdout().is_terminal();
        let cfg = config::Splash {
            enabled: usable(cfg, terminal),
        };
        Self::with_interrupt(&cfg, title, Arc::new(raise_interrupt))
    }

    /// Like [`Splash::new`] but with a custom action in place of raising SIGINT.
    pub fn with_interrupt(cfg: &config::Splash, title: &str, interrupt: InterruptHook) -> Self {
        let (state, _) = watch::channel(SplashState {
            phase: Phase::Running,
            title: title.to_string(),
            message: String::new(),
            desc: String::new(),
            log_path: None,
            dialog: None,
            closed_by_program: false,
            errored: false,
        });
        Self {
            shared: Arc::new(Shared {
                enabled: cfg.enabled && cfg!(feature = "tui"),
                state,
                interrupted: AtomicBool::new(false),
                interrupt,
            }),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.shared.enabled
    }

    pub fn phase(&self) -> Phase {
        self.shared.state.borrow().phase
    }

    pub fn is_closed(&self) -> bool {
        self.phase() == Phase::Closed
    }

    pub fn set_message(&self, msg: impl Into<String>) {
        let msg = msg.into();
        self.shared.state.send_modify(|s| s.message = msg);
    }

    pub fn set_desc(&self, desc: impl Into<String>) {
        let desc = desc.into();
        self.shared.state.send_modify(|s| s.desc = desc);
    }

    pub fn set_log_path(&self, path: PathBuf) {
        self.shared.state.send_modify(|s| s.log_path = Some(path));
    }

    #[cfg(test)]
    pub(crate) fn message(&self) -> String {
        self.shared.state.borrow().message.clone()
    }

    /// Launch confirmed: close the window without treating it as a user request.
    pub fn close(&self) {
        self.shared.state.send_modify(|s| {
            if s.phase == Phase::Running {
                s.phase = Phase::Closed;
                s.closed_by_program = true;
            }
        });
    }

    /// Switch to the error view; the window stays up until the user dismisses it.
    pub fn invalidate(&self) {
        self.shared.state.send_modify(|s| {
            if s.phase != Phase::Closed {
                s.phase = Phase::Invalidated;
                s.errored = true;
            }
        });
    }

    /// Show `text` and block until the user answers. With `ask` the user picks
    /// yes or no; otherwise it is a notice and the answer is always `true`.
    /// Without a live window the dialog is only logged and `true` is returned.
    pub async fn dialog(&self, text: &str, ask: bool) -> bool {
        if !self.is_enabled() || self.phase() != Phase::Running {
            info!(dialog = text, "splash unavailable, continuing");
            return true;
        }

        let (reply, answer) = oneshot::channel();
        self.shared.state.send_modify(|s| {
            s.dialog = Some(DialogRequest {
                text: text.to_string(),
                ask,
                reply,
            });
        });
        answer.await.unwrap_or(true)
    }

    pub(crate) fn answer(&self, yes: bool) {
        self.shared.state.send_modify(|s| {
            if let Some(d) = s.dialog.take() {
                let _ = d.reply.send(yes);
            }
        });
    }

    /// The user dismissed the window.
    pub(crate) fn user_close(&self) {
        self.shared.state.send_modify(|s| {
            s.phase = Phase::Closed;
            s.closed_by_program = false;
            // Unblock anyone waiting on a dialog.
            s.dialog = None;
        });
    }

    /// Wait until the window reaches [`Phase::Closed`].
    pub async fn wait_closed(&self) {
        let mut rx = self.shared.state.subscribe();
        let _ = rx.wait_for(|s| s.phase == Phase::Closed).await;
    }

    pub(crate) fn with_state<R>(&self, f: impl FnOnce(&SplashState) -> R) -> R {
        f(&self.shared.state.borrow())
    }

    /// Drive the window until it closes. Blocks the calling thread.
    ///
    /// Returns `Ok` when disabled or closed by the program, and
    /// [`SplashError::Closed`] when the user closed it.
    pub fn run(&self) -> Result<(), SplashError> {
        if !self.is_enabled() {
            return Ok(());
        }
        #[cfg(feature = "tui")]
        {
            ui::run_threaded(self)
        }
        #[cfg(not(feature = "tui"))]
        {
            Ok(())
        }
    }

    /// Run the window on a dedicated thread and react to how it ends.
    pub fn spawn(&self) -> std::thread::JoinHandle<()> {
        let splash = self.clone();
        std::thread::spawn(move || {
            let res = splash.run();
            splash.handle_exit(res);
        })
    }

    pub(crate) fn handle_exit(&self, res: Result<(), SplashError>) {
        match res {
            Ok(()) => {}
            Err(SplashError::Closed) => {
                warn!("Splash window closed!");
                self.interrupt_once();
            }
            Err(err) => {
                error!(error = %err, "splash failed");
                // Nobody can dismiss a window that is gone.
                self.user_close();
                self.interrupt_once();
            }
        }
    }

    /// Deliver the interrupt at most once per splash.
    fn interrupt_once(&self) {
        // After an error the main flow is already waiting for the window to
        // go away; there is nothing left to interrupt.
        if self.with_state(|s| s.closed_by_program || s.errored) {
            return;
        }
        if !self.shared.interrupted.swap(true, Ordering::SeqCst) {
            (self.shared.interrupt)();
        }
    }
}

fn usable(cfg: &config::Splash, terminal: bool) -> bool {
    if cfg.enabled && !terminal {
        info!("No terminal attached, running without splash");
    }
    cfg.enabled && terminal
}

fn raise_interrupt() {
    if let Err(err) = nix::sys::signal::raise(nix::sys::signal::Signal::SIGINT) {
        error!(error = %err, "failed to deliver SIGINT");
    }
}
