//! Wine prefix handling.
//!
//! A [`Prefix`] is an isolated Windows environment on disk. It builds
//! [`WineCmd`]s that carry `WINEPREFIX` explicitly and funnel their output
//! into the run's log sink.

mod cmd;

pub use cmd::WineCmd;

use crate::logs::LogSink;
use anyhow::{Context, Result};
use nix::unistd::{Uid, User};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct Prefix {
    dir: PathBuf,
    root: Option<PathBuf>,
    env: Vec<(String, String)>,
    output: LogSink,
}

impl Prefix {
    /// `root` selects an alternative wine installation containing `bin/wine`;
    /// without it the system wine from `PATH` is used.
    pub fn new(dir: PathBuf, root: Option<PathBuf>, output: LogSink) -> Self {
        Self {
            dir,
            root,
            env: Vec::new(),
            output,
        }
    }

    /// Extra environment given to every command run in this prefix.
    pub fn with_env<I, K, V>(mut self, env: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.env
            .extend(env.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn output(&self) -> &LogSink {
        &self.output
    }

    /// A prefix is initialized once wineboot has populated `drive_c/windows`.
    pub fn is_initialized(&self) -> bool {
        self.dir.join("drive_c").join("windows").is_dir()
    }

    fn bin(&self, prog: &str) -> PathBuf {
        match &self.root {
            Some(root) => root.join("bin").join(prog),
            None => PathBuf::from(prog),
        }
    }

    /// Any wine-provided tool (`wineserver`, `wineboot`, ...) bound to this prefix.
    pub fn command<I, S>(&self, prog: &str, args: I) -> WineCmd
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.bound(self.bin(prog), args)
    }

    fn bound<I, S>(&self, program: PathBuf, args: I) -> WineCmd
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let cmd = self
            .env
            .iter()
            .fold(WineCmd::new(program, self.output.clone()), |cmd, (k, v)| {
                cmd.env(k, v)
            });
        cmd.args(args).env("WINEPREFIX", &self.dir)
    }

    /// `winetricks` from `PATH`, pointed at this prefix and its wine.
    pub fn winetricks(&self) -> WineCmd {
        let cmd = self.bound(PathBuf::from("winetricks"), Vec::<&str>::new());
        match &self.root {
            Some(_) => cmd.env("WINE", self.bin("wine")),
            None => cmd,
        }
    }

    /// `wine <exe> args...` inside this prefix.
    pub fn wine<I, S>(&self, exe: impl AsRef<OsStr>, args: I) -> WineCmd
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.command("wine", [exe.as_ref()]).args(args)
    }

    pub async fn init(&self) -> Result<()> {
        self.wine("wineboot", ["-i"])
            .run()
            .await
            .context("wineboot")
    }

    /// Set the prefix's display DPI. Running wine at all also creates the
    /// prefix if it does not exist yet.
    pub async fn set_dpi(&self, dpi: u32) -> Result<()> {
        let dpi = dpi.to_string();
        self.wine(
            "reg",
            [
                "add",
                r"HKEY_CURRENT_USER\Control Panel\Desktop",
                "/v",
                "LogPixels",
                "/t",
                "REG_DWORD",
                "/d",
                dpi.as_str(),
                "/f",
            ],
        )
        .run()
        .await
        .context("set dpi")
    }

    pub async fn kill(&self) -> Result<()> {
        self.command("wineserver", ["-k"])
            .run()
            .await
            .context("wineserver -k")
    }

    /// `%AppData%` of the prefix's user, which wine names after the host user.
    pub fn app_data_dir(&self) -> Result<PathBuf> {
        let user = match User::from_uid(Uid::current()) {
            Ok(Some(u)) => u.name,
            _ => std::env::var("USER").context("could not determine current user")?,
        };
        Ok(self
            .dir
            .join("drive_c")
            .join("users")
            .join(user)
            .join("AppData"))
    }
}
