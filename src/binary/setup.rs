use super::Binary;
use anyhow::{bail, Context, Result};
use tracing::info;

impl Binary {
    /// Point the binary at its installed version and apply the local configuration to it.
    pub(crate) async fn setup(&mut self) -> Result<()> {
        self.splash
            .set_message(format!("Checking {}", self.kind.alias()));

        let version = self.resolve_version()?;
        self.dir = self.dirs.versions.join(&version);

        let exe = self.dir.join(self.kind.executable());
        if !exe.is_file() {
            bail!(
                "{} is missing from {}",
                self.kind.executable(),
                self.dir.display()
            );
        }

        self.apply_fflags().context("apply fflags")?;

        let st = self.kind.state_mut(&mut self.state);
        st.version = version;
        st.channel = self.config.channel.clone();
        self.state
            .save(&self.dirs.state_file())
            .context("save state")?;

        info!(version = %self.dir.display(), channel = %self.config.channel, "Roblox is set up");
        Ok(())
    }

    fn resolve_version(&self) -> Result<String> {
        let forced = self.config.forced_version.trim();
        if !forced.is_empty() {
            info!(version = forced, "Using forced version");
            return Ok(forced.to_string());
        }

        let st = self.kind.state(&self.state);
        if !st.version.is_empty() && st.channel == self.config.channel {
            return Ok(st.version.clone());
        }
        let channel = match self.config.channel.as_str() {
            "" => "LIVE",
            c => c,
        };
        bail!("no installed version for channel {channel}")
    }

    fn apply_fflags(&self) -> Result<()> {
        let dir = self.dir.join("ClientSettings");
        std::fs::create_dir_all(&dir).with_context(|| format!("create {}", dir.display()))?;

        let path = dir.join("ClientAppSettings.json");
        let data = serde_json::to_vec_pretty(&self.config.fflags)?;
        std::fs::write(&path, data).with_context(|| format!("write {}", path.display()))
    }

    /// Run the staged WebView2 installer in the prefix, if there is one.
    pub(crate) async fn install_webview(&self) -> Result<()> {
        let installer = self.dirs.webview_installer();
        if !installer.is_file() {
            info!(path = %installer.display(), "No WebView2 installer staged, skipping");
            return Ok(());
        }

        self.splash.set_message("Installing WebView");
        self.prefix
            .wine(&installer, ["/silent", "/install"])
            .run()
            .await
    }
}

#[cfg(test)]
mod tests {
    use crate::binary::{Binary, BinaryType};
    use crate::config::Config;
    use crate::logs::LogSink;
    use crate::paths::Dirs;
    use crate::state::State;

    fn binary(root: &std::path::Path, cfg: &Config) -> Binary {
        Binary::new(BinaryType::Player, cfg, Dirs::under(root), LogSink::stderr()).unwrap()
    }

    fn install(dirs: &Dirs, version: &str) {
        let dir = dirs.versions.join(version);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("RobloxPlayerBeta.exe"), "").unwrap();
    }

    #[tokio::test]
    async fn installed_version_of_the_channel_is_used() {
        let tmp = tempfile::tempdir().unwrap();
        let dirs = Dirs::under(tmp.path());
        install(&dirs, "version-aaa");
        let mut st = State::default();
        st.player.version = "version-aaa".into();
        st.save(&dirs.state_file()).unwrap();

        let mut cfg = Config::default();
        cfg.player
            .fflags
            .insert("FFlagDebugGraphicsPreferVulkan".into(), true.into());

        let mut b = binary(tmp.path(), &cfg);
        b.setup().await.unwrap();
        assert_eq!(b.dir, dirs.versions.join("version-aaa"));

        let written = std::fs::read_to_string(
            b.dir.join("ClientSettings").join("ClientAppSettings.json"),
        )
        .unwrap();
        let flags: serde_json::Value = serde_json::from_str(&written).unwrap();
        assert_eq!(flags["FFlagDebugGraphicsPreferVulkan"], true);
    }

    #[tokio::test]
    async fn other_channel_has_no_version() {
        let tmp = tempfile::tempdir().unwrap();
        let dirs = Dirs::under(tmp.path());
        install(&dirs, "version-aaa");
        let mut st = State::default();
        st.player.version = "version-aaa".into();
        st.save(&dirs.state_file()).unwrap();

        let mut b = binary(tmp.path(), &Config::default());
        b.config.channel = "zcanary".into();
        let err = b.setup().await.unwrap_err();
        assert_eq!(err.to_string(), "no installed version for channel zcanary");
    }

    #[tokio::test]
    async fn forced_version_is_persisted_with_the_channel() {
        let tmp = tempfile::tempdir().unwrap();
        let dirs = Dirs::under(tmp.path());
        install(&dirs, "version-forced");

        let mut cfg = Config::default();
        cfg.player.forced_version = "version-forced".into();
        cfg.player.channel = "zbeta".into();

        let mut b = binary(tmp.path(), &cfg);
        b.setup().await.unwrap();

        let st = State::load(&dirs.state_file()).unwrap();
        assert_eq!(st.player.version, "version-forced");
        assert_eq!(st.player.channel, "zbeta");
    }

    #[tokio::test]
    async fn missing_webview_installer_is_skipped() {
        let tmp = tempfile::tempdir().unwrap();
        let b = binary(tmp.path(), &Config::default());
        b.install_webview().await.unwrap();
    }
}
