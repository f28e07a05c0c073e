use super::signals::{self, ChildHandle};
use super::Binary;
use crate::activity::Activity;
use crate::gamemode::GameModeRegistrar;
use crate::logs::LogSink;
use crate::logwatch::{self, LogTail};
use crate::splash::Splash;
use crate::wine::{Prefix, WineCmd};
use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

/// Everything the post-launch task needs, detached from the [`Binary`].
struct PostLaunch {
    prefix: Prefix,
    splash: Splash,
    activity: Arc<Mutex<Activity>>,
    gamemode: Option<Arc<dyn GameModeRegistrar>>,
    sink: LogSink,
    timeout: Duration,
}

impl Binary {
    /// Launch the binary and supervise it until it exits.
    pub(crate) async fn run(&mut self, args: &[String]) -> Result<()> {
        if self.config.discord_rpc {
            if let Err(err) = self.activity.lock().await.connect().await {
                error!(error = %format!("{err:#}"), "Could not connect to Discord RPC");
            }
        }

        let res = self.supervise(args).await;
        self.activity.lock().await.close().await;
        res
    }

    async fn supervise(&mut self, args: &[String]) -> Result<()> {
        if self.multiple_instances && !self.kind.supports_multiple_instances() {
            self.start_mutexer()?;
        }

        let cmd = self
            .command(args)
            .with_context(|| format!("{} command", self.kind))?;

        info!(name = self.kind.executable(), %cmd, "Running Binary");
        self.splash
            .set_message(format!("Launching {}", self.kind.alias()));

        let mut child = cmd.spawn()?;
        let pid = child
            .id()
            .context("roblox process exited before it was supervised")?;
        let handle = ChildHandle::new(pid);
        let relay = signals::arm(handle.clone())?;

        let post = tokio::spawn(post_launch(
            PostLaunch {
                prefix: self.prefix.clone(),
                splash: self.splash.clone(),
                activity: self.activity.clone(),
                gamemode: self.config.gamemode.then(|| self.gamemode.clone()),
                sink: self.prefix.output().clone(),
                timeout: self.opts.discovery_timeout,
            },
            pid,
        ));

        let status = child.wait().await;
        handle.mark_exited();
        // Roblox is gone; its log has nothing more to say.
        post.abort();
        relay.disarm();

        let status = status.context("roblox process")?;
        if !status.success() {
            bail!("roblox process: {status}");
        }
        Ok(())
    }

    pub(crate) fn command(&self, args: &[String]) -> Result<WineCmd> {
        let exe = self.dir.join(self.kind.executable());
        let cmd = self.prefix.wine(&exe, self.kind.launch_args(args));

        if self.config.launcher.trim().is_empty() {
            return Ok(cmd);
        }
        let launcher = self
            .config
            .launcher_args()
            .context("bad launcher: unbalanced quoting")?;
        let path = self.config.launcher_path().context("bad launcher")?;
        Ok(cmd.wrap(&launcher, path))
    }

    fn start_mutexer(&self) -> Result<()> {
        info!("Running robloxmutexer");

        let exe = self.dirs.bin_prefix().join("robloxmutexer.exe");
        let mut child = self
            .prefix
            .wine(&exe, Vec::<String>::new())
            .spawn()
            .context("start robloxmutexer")?;

        tokio::spawn(async move {
            match child.wait().await {
                Ok(status) => warn!(%status, "robloxmutexer returned too early"),
                Err(err) => warn!(error = %err, "robloxmutexer returned too early"),
            }
        });
        Ok(())
    }
}

async fn post_launch(ctx: PostLaunch, pid: u32) {
    // Without a log file, assume the launch failed and skip everything else.
    let path = match find_log_file(&ctx.prefix, ctx.timeout).await {
        Ok(path) => path,
        Err(err) => {
            error!(error = %format!("{err:#}"), "Failed to find Roblox log file");
            return;
        }
    };
    info!(path = %path.display(), "Found Roblox log file");

    ctx.splash.close();

    if let Some(gamemode) = &ctx.gamemode {
        gamemode.register(pid);
    }

    if let Err(err) = tail(&ctx, &path).await {
        error!(error = %format!("{err:#}"), "Could not tail Roblox log file");
    }
}

async fn find_log_file(prefix: &Prefix, timeout: Duration) -> Result<PathBuf> {
    let dir = prefix
        .app_data_dir()
        .context("get appdata")?
        .join("Local")
        .join("Roblox")
        .join("logs");
    logwatch::discover(&dir, timeout).await
}

async fn tail(ctx: &PostLaunch, path: &Path) -> Result<()> {
    let mut lines = LogTail::open(path).await?;
    loop {
        let line = lines.next_line().await?;
        ctx.sink.write_line(&line);

        let mut activity = ctx.activity.lock().await;
        if !activity.is_enabled() {
            continue;
        }
        if let Err(err) = activity.handle_line(&line).await {
            error!(error = %format!("{err:#}"), "Activity Roblox log handle failed");
        }
    }
}
