//! Lifecycle of one Roblox application: prefix preparation, launch and supervision.
//!
//! [`Binary::main`] drives a run from start to finish. It starts the splash,
//! initializes the wineprefix on first use, applies a protocol URI's channel,
//! sets up the installed version and hands over to the supervisor, which
//! launches Roblox, relays signals to it and follows its log until it exits.
//!
//! At most one run per variant may use a prefix at a time; nothing here
//! enforces that.

mod kind;
mod protocol;
mod run;
mod setup;
mod signals;

pub use kind::BinaryType;

use crate::activity::Activity;
use crate::config::{self, Config};
use crate::gamemode::{GameModeRegistrar, PortalGameMode};
use crate::logs::LogSink;
use crate::logwatch::DISCOVERY_TIMEOUT;
use crate::paths::Dirs;
use crate::splash::Splash;
use crate::state::State;
use crate::sysinfo;
use crate::wine::Prefix;
use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

const DIALOG_NO_AVX: &str = "Warning: Your CPU does not support AVX. While some people may be able to run without it, most are not able to. VinegarHQ cannot provide support for your installation. Continue?";

#[derive(Debug, Clone)]
pub struct LaunchOptions {
    /// How long Roblox gets to create its log file.
    pub discovery_timeout: Duration,
    /// Initialize the prefix even if it looks initialized.
    pub force_first_run: bool,
}

impl Default for LaunchOptions {
    fn default() -> Self {
        Self {
            discovery_timeout: DISCOVERY_TIMEOUT,
            force_first_run: false,
        }
    }
}

/// How a failed run is shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorDisposition {
    /// Log it and exit.
    Fatal,
    /// Show it in the splash and wait for the user to dismiss it.
    Dialog,
}

impl ErrorDisposition {
    pub fn for_splash(splash: &Splash) -> Self {
        if !splash.is_enabled() || splash.is_closed() {
            Self::Fatal
        } else {
            Self::Dialog
        }
    }
}

pub struct Binary {
    kind: BinaryType,
    config: config::Binary,
    multiple_instances: bool,
    state: State,
    dirs: Dirs,
    // Installed version root, known after setup.
    dir: PathBuf,
    prefix: Prefix,
    splash: Splash,
    splash_thread: Option<std::thread::JoinHandle<()>>,
    activity: Arc<Mutex<Activity>>,
    gamemode: Arc<dyn GameModeRegistrar>,
    log_path: Option<PathBuf>,
    opts: LaunchOptions,
}

impl Binary {
    pub fn new(kind: BinaryType, cfg: &Config, dirs: Dirs, output: LogSink) -> Result<Self> {
        let state = State::load(&dirs.state_file()).context("load state")?;
        let bcfg = kind.config(cfg).clone();

        std::fs::create_dir_all(&dirs.prefixes)
            .with_context(|| format!("create {}", dirs.prefixes.display()))?;
        let prefix = kind.prefix(cfg, &dirs, output);

        Ok(Self {
            kind,
            multiple_instances: cfg.multiple_instances,
            state,
            dir: dirs.versions.clone(),
            dirs,
            prefix,
            splash: Splash::new(&cfg.splash, kind.alias()),
            splash_thread: None,
            activity: Arc::new(Mutex::new(Activity::new())),
            gamemode: Arc::new(PortalGameMode),
            log_path: None,
            opts: LaunchOptions::default(),
            config: bcfg,
        })
    }

    pub fn with_options(mut self, opts: LaunchOptions) -> Self {
        self.opts = opts;
        self
    }

    pub fn with_log_path(mut self, path: PathBuf) -> Self {
        self.log_path = Some(path);
        self
    }

    pub fn with_splash(mut self, splash: Splash) -> Self {
        self.splash = splash;
        self
    }

    pub fn with_gamemode(mut self, gamemode: Arc<dyn GameModeRegistrar>) -> Self {
        self.gamemode = gamemode;
        self
    }

    pub async fn main(&mut self, args: &[String]) -> Result<()> {
        // Closing the window raises SIGINT, which the signal relay turns into
        // killing Roblox, or which ends the launcher if nothing runs yet.
        self.splash_thread = Some(self.splash.spawn());

        self.launch(args).await?;
        self.splash.close();
        self.join_splash().await;
        Ok(())
    }

    async fn launch(&mut self, args: &[String]) -> Result<()> {
        let first_run = !self.prefix.is_initialized();
        if first_run && !sysinfo::cpu_has_avx() {
            self.splash.dialog(DIALOG_NO_AVX, false).await;
            warn!("Running roblox without AVX, Roblox will most likely fail to run!");
        }

        if first_run || self.opts.force_first_run {
            info!(dir = %self.prefix.dir().display(), "Initializing wineprefix");
            self.splash.set_message("Initializing wineprefix");

            self.kind
                .init_prefix(&self.prefix)
                .await
                .with_context(|| format!("failed to init {} prefix", self.kind))?;
            self.install_webview()
                .await
                .context("failed to install webview")?;
        }

        if let [uri] = args {
            self.handle_protocol_uri(uri);
        }

        self.splash.set_desc(self.config.channel.clone());

        self.setup().await.context("failed to setup roblox")?;
        self.run(args).await.context("failed to run roblox")?;
        Ok(())
    }

    pub(crate) fn handle_protocol_uri(&mut self, uri: &str) {
        if let Some(channel) = protocol::requested_channel(uri) {
            self.config.channel = channel.to_string();
        }
    }

    /// Show a failed run to the user. Returns once the error has been seen
    /// and the terminal is restored; the caller is expected to exit
    /// unsuccessfully afterwards.
    pub async fn report_error(&mut self, err: &anyhow::Error) -> ErrorDisposition {
        let msg = format!("{err:#}");
        error!("{msg}");

        let disposition = ErrorDisposition::for_splash(&self.splash);
        if disposition == ErrorDisposition::Dialog {
            if let Some(path) = &self.log_path {
                self.splash.set_log_path(path.clone());
            }
            self.splash.set_message(msg);
            self.splash.invalidate();
            self.splash.wait_closed().await;
        }
        self.splash.close();
        self.join_splash().await;
        disposition
    }

    /// Wait for the renderer to leave raw mode and the alternate screen.
    async fn join_splash(&mut self) {
        let Some(handle) = self.splash_thread.take() else {
            return;
        };
        match tokio::task::spawn_blocking(move || handle.join()).await {
            Ok(Ok(())) => {}
            Ok(Err(_)) => warn!("splash renderer panicked"),
            Err(err) => warn!(error = %err, "could not join splash renderer"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use std::path::Path;
    use std::sync::Mutex as StdMutex;

    #[derive(Default)]
    struct RecordingGameMode {
        pids: StdMutex<Vec<u32>>,
    }

    impl GameModeRegistrar for RecordingGameMode {
        fn register(&self, pid: u32) {
            self.pids.lock().unwrap().push(pid);
        }
    }

    // Stands in for wine. `$1` is the program wine would run.
    const FAKE_WINE: &str = r#"#!/bin/sh
case "$1" in
wineboot)
    [ -n "$FAIL_WINEBOOT" ] && exit 1
    mkdir -p "$WINEPREFIX/drive_c/windows"
    ;;
reg)
    mkdir -p "$WINEPREFIX/drive_c/windows"
    ;;
*RobloxPlayerBeta.exe)
    echo $$ > "$TEST_PID_FILE"
    sleep "$LOG_AFTER"
    if [ -n "$WRITE_LOG" ]; then
        mkdir -p "$TEST_LOG_DIR"
        printf 'first line\nsecond line\n' > "$TEST_LOG_DIR/0.600_20240101T000000Z_Player_1a2b3_last.log"
    fi
    sleep "$EXIT_AFTER"
    exit "$EXIT_CODE"
    ;;
esac
"#;

    struct Harness {
        tmp: tempfile::TempDir,
        cfg: Config,
        dirs: Dirs,
        gamemode: Arc<RecordingGameMode>,
    }

    impl Harness {
        fn new() -> Self {
            let tmp = tempfile::tempdir().unwrap();
            let dirs = Dirs::under(tmp.path());

            let wineroot = tmp.path().join("wine");
            std::fs::create_dir_all(wineroot.join("bin")).unwrap();
            let wine = wineroot.join("bin").join("wine");
            std::fs::write(&wine, FAKE_WINE).unwrap();
            std::fs::set_permissions(&wine, std::fs::Permissions::from_mode(0o755)).unwrap();

            let version = dirs.versions.join("version-test");
            std::fs::create_dir_all(&version).unwrap();
            std::fs::write(version.join("RobloxPlayerBeta.exe"), "").unwrap();

            let log_dir = Prefix::new(dirs.prefixes.join("player"), None, LogSink::stderr())
                .app_data_dir()
                .unwrap()
                .join("Local/Roblox/logs");

            let mut cfg = Config::default();
            cfg.splash.enabled = false;
            cfg.player.discord_rpc = false;
            cfg.player.wineroot = wineroot.display().to_string();
            cfg.player.forced_version = "version-test".into();
            let env = &mut cfg.player.env;
            env.insert("TEST_LOG_DIR".into(), log_dir.display().to_string());
            env.insert(
                "TEST_PID_FILE".into(),
                tmp.path().join("pid").display().to_string(),
            );
            env.insert("LOG_AFTER".into(), "1".into());
            env.insert("EXIT_AFTER".into(), "1".into());
            env.insert("EXIT_CODE".into(), "0".into());
            env.insert("WRITE_LOG".into(), "1".into());

            Self {
                tmp,
                cfg,
                dirs,
                gamemode: Arc::new(RecordingGameMode::default()),
            }
        }

        fn set(&mut self, key: &str, value: &str) {
            self.cfg.player.env.insert(key.into(), value.into());
        }

        fn binary(&self, opts: LaunchOptions) -> Binary {
            let run_log = std::fs::File::create(self.tmp.path().join("run.log")).unwrap();
            Binary::new(
                BinaryType::Player,
                &self.cfg,
                self.dirs.clone(),
                LogSink::with_file(run_log),
            )
            .unwrap()
            .with_options(opts)
            .with_gamemode(self.gamemode.clone())
        }

        fn child_pid(&self) -> u32 {
            std::fs::read_to_string(self.tmp.path().join("pid"))
                .unwrap()
                .trim()
                .parse()
                .unwrap()
        }

        fn run_log(&self) -> String {
            std::fs::read_to_string(self.tmp.path().join("run.log")).unwrap()
        }

        fn prefix_dir(&self) -> std::path::PathBuf {
            self.dirs.prefixes.join("player")
        }
    }

    fn initialized(dir: &Path) -> bool {
        dir.join("drive_c").join("windows").is_dir()
    }

    #[tokio::test]
    async fn first_run_launches_and_registers_once() {
        let h = Harness::new();
        let mut b = h.binary(LaunchOptions::default());
        assert!(!b.prefix.is_initialized());

        b.main(&[]).await.unwrap();

        assert!(initialized(&h.prefix_dir()));
        assert!(b.splash.is_closed(), "log discovery closes the splash");
        assert!(b.splash_thread.is_none(), "renderer joined before returning");
        assert_eq!(*h.gamemode.pids.lock().unwrap(), vec![h.child_pid()]);

        // Roblox keeps running for a second after writing its log.
        let run_log = h.run_log();
        assert!(run_log.contains("first line\n"), "{run_log}");
        assert!(run_log.contains("second line\n"), "{run_log}");

        let st = State::load(&h.dirs.state_file()).unwrap();
        assert_eq!(st.player.version, "version-test");
    }

    #[tokio::test]
    async fn missing_log_degrades_and_keeps_the_exit_status() {
        let mut h = Harness::new();
        std::fs::create_dir_all(h.prefix_dir().join("drive_c/windows")).unwrap();
        h.set("WRITE_LOG", "");
        h.set("LOG_AFTER", "0");
        h.set("EXIT_AFTER", "1");
        h.set("EXIT_CODE", "3");

        let mut b = h.binary(LaunchOptions {
            discovery_timeout: Duration::from_millis(300),
            force_first_run: false,
        });
        let err = b.main(&[]).await.unwrap_err();

        assert_eq!(err.to_string(), "failed to run roblox");
        let chain = format!("{err:#}");
        assert!(chain.contains("roblox process"), "{chain}");
        assert!(chain.contains('3'), "{chain}");
        assert!(!b.splash.is_closed());
        assert!(h.gamemode.pids.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn failed_prefix_init_aborts_the_run() {
        let mut h = Harness::new();
        h.set("FAIL_WINEBOOT", "1");
        let mut b = h.binary(LaunchOptions::default());

        let err = b.main(&[]).await.unwrap_err();
        assert_eq!(err.to_string(), "failed to init Player prefix");
        assert!(!initialized(&h.prefix_dir()));
        assert!(h.gamemode.pids.lock().unwrap().is_empty());

        // No splash to show it on: the caller exits straight away.
        assert_eq!(b.report_error(&err).await, ErrorDisposition::Fatal);
    }

    #[tokio::test]
    async fn protocol_uri_selects_the_channel() {
        let mut h = Harness::new();
        std::fs::create_dir_all(h.prefix_dir().join("drive_c/windows")).unwrap();
        h.set("LOG_AFTER", "0");
        h.set("EXIT_AFTER", "0");

        let mut b = h.binary(LaunchOptions::default());
        b.main(&["roblox-player:1+launchmode:play+channel:zflag".to_string()])
            .await
            .unwrap();
        assert_eq!(b.config.channel, "zflag");

        let st = State::load(&h.dirs.state_file()).unwrap();
        assert_eq!(st.player.channel, "zflag");
    }

    #[cfg(feature = "tui")]
    #[tokio::test]
    async fn error_is_shown_until_dismissed() {
        let h = Harness::new();
        let splash = Splash::with_interrupt(
            &config::Splash { enabled: true },
            "Player",
            Arc::new(|| panic!("an error view must not interrupt")),
        );
        let mut b = h
            .binary(LaunchOptions::default())
            .with_splash(splash.clone())
            .with_log_path(h.tmp.path().join("player.log"));
        assert_eq!(ErrorDisposition::for_splash(&splash), ErrorDisposition::Dialog);

        let err = anyhow::anyhow!("wineboot: exit status: 1").context("failed to init Player prefix");
        let dismiss = splash.clone();
        let user = tokio::spawn(async move {
            while dismiss.phase() != crate::splash::Phase::Invalidated {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
            assert_eq!(
                dismiss.message(),
                "failed to init Player prefix: wineboot: exit status: 1"
            );
            dismiss.user_close();
        });

        assert_eq!(b.report_error(&err).await, ErrorDisposition::Dialog);
        user.await.unwrap();
    }

    #[test]
    fn closed_or_disabled_splash_is_fatal() {
        let splash = Splash::new(&config::Splash { enabled: true }, "Player");
        splash.close();
        assert_eq!(ErrorDisposition::for_splash(&splash), ErrorDisposition::Fatal);

        let off = Splash::new(&config::Splash { enabled: false }, "Player");
        assert_eq!(ErrorDisposition::for_splash(&off), ErrorDisposition::Fatal);
    }
}
