//! Well-known directories used by the launcher.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

const APP_DIR: &str = "vinegar";

/// Where `robloxmutexer.exe` and other helper executables are installed.
const BIN_PREFIX: &str = match option_env!("VINEGAR_BIN_PREFIX") {
    Some(p) => p,
    None => "/usr/libexec/vinegar",
};

#[derive(Debug, Clone)]
pub struct Dirs {
    pub config: PathBuf,
    pub data: PathBuf,
    pub cache: PathBuf,
    pub prefixes: PathBuf,
    pub versions: PathBuf,
    pub logs: PathBuf,
}

impl Dirs {
    /// Resolve the XDG base directories for the current user.
    pub fn new() -> Result<Self> {
        let config = dirs::config_dir()
            .context("could not determine config directory")?
            .join(APP_DIR);
        let data = dirs::data_dir()
            .context("could not determine data directory")?
            .join(APP_DIR);
        let cache = dirs::cache_dir()
            .context("could not determine cache directory")?
            .join(APP_DIR);
        Ok(Self::from_roots(config, data, cache))
    }

    /// Lay every directory out below a single root.
    pub fn under(root: &Path) -> Self {
        Self::from_roots(root.join("config"), root.join("data"), root.join("cache"))
    }

    fn from_roots(config: PathBuf, data: PathBuf, cache: PathBuf) -> Self {
        Self {
            prefixes: data.join("prefixes"),
            versions: data.join("versions"),
            logs: cache.join("logs"),
            config,
            data,
            cache,
        }
    }

    pub fn config_file(&self) -> PathBuf {
        self.config.join("config.toml")
    }

    pub fn state_file(&self) -> PathBuf {
        self.data.join("state.json")
    }

    pub fn webview_installer(&self) -> PathBuf {
        self.cache.join("MicrosoftEdgeWebview2Setup.exe")
    }

    pub fn bin_prefix(&self) -> &'static Path {
        Path::new(BIN_PREFIX)
    }
}
