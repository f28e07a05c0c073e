//! TOML configuration.
//!
//! Every field has a default, so a missing file or a partial file both load.
//! Each application variant gets its own [`Binary`] table.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Allow more than one Player instance by holding the singleton mutex.
    pub multiple_instances: bool,
    pub splash: Splash,
    #[serde(deserialize_with = "player_section")]
    pub player: Binary,
    pub studio: Binary,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            multiple_instances: false,
            splash: Splash::default(),
            player: Binary::player(),
            studio: Binary::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Splash {
    pub enabled: bool,
}

impl Default for Splash {
    fn default() -> Self {
        Self { enabled: true }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Binary {
    /// Deployment channel; empty means the default channel.
    pub channel: String,
    /// Wrapper command prepended to the wine invocation, e.g. `gamemoderun`.
    pub launcher: String,
    /// Alternative wine installation; must contain `bin/wine`.
    pub wineroot: String,
    pub forced_version: String,
    pub discord_rpc: bool,
    pub gamemode: bool,
    pub env: BTreeMap<String, String>,
    pub fflags: BTreeMap<String, serde_json::Value>,
}

impl Default for Binary {
    fn default() -> Self {
        Self {
            channel: String::new(),
            launcher: String::new(),
            wineroot: String::new(),
            forced_version: String::new(),
            discord_rpc: false,
            gamemode: true,
            env: BTreeMap::new(),
            fflags: BTreeMap::new(),
        }
    }
}

/// A `[player]` table fills its gaps from the Player defaults rather than
/// the shared [`Binary::default`].
fn player_section<'de, D>(de: D) -> std::result::Result<Binary, D::Error>
where
    D: Deserializer<'de>,
{
    let mut table = toml::Table::deserialize(de)?;
    table
        .entry("discord_rpc")
        .or_insert(toml::Value::Boolean(Binary::player().discord_rpc));
    Binary::deserialize(toml::Value::Table(table)).map_err(serde::de::Error::custom)
}

impl Config {
    /// Load the configuration at `path`, falling back to defaults if it does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        let cfg = if path.exists() {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("read config {}", path.display()))?;
            toml::from_str::<Config>(&raw)
                .with_context(|| format!("parse config {}", path.display()))?
        } else {
            Config::default()
        };

        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<()> {
        for (name, bcfg) in [("player", &self.player), ("studio", &self.studio)] {
            bcfg.validate().with_context(|| format!("invalid [{name}] section"))?;
        }
        Ok(())
    }
}

impl Binary {
    /// Player defaults: like [`Binary::default`] but with Discord presence on.
    pub fn player() -> Self {
        Self {
            discord_rpc: true,
            ..Self::default()
        }
    }

    fn validate(&self) -> Result<()> {
        if let Some(root) = self.wineroot() {
            let wine = root.join("bin").join("wine");
            if !wine.exists() {
                bail!("wineroot {} does not contain bin/wine", root.display());
            }
        }
        if !self.launcher.trim().is_empty() && self.launcher_args().is_none() {
            bail!("launcher {:?} is not a valid command line", self.launcher);
        }
        Ok(())
    }

    pub fn wineroot(&self) -> Option<PathBuf> {
        let root = self.wineroot.trim();
        (!root.is_empty()).then(|| PathBuf::from(root))
    }

    /// Launcher split into shell words, or `None` when it cannot be tokenized.
    pub fn launcher_args(&self) -> Option<Vec<String>> {
        shlex::split(self.launcher.trim())
    }

    /// Resolve the launcher's program through `PATH`.
    pub fn launcher_path(&self) -> Result<PathBuf> {
        let args = self.launcher_args().unwrap_or_default();
        let Some(prog) = args.first() else {
            bail!("no launcher configured");
        };
        lookup_path(prog, std::env::var_os("PATH"))
            .with_context(|| format!("launcher {prog} not found"))
    }
}

fn lookup_path(prog: &str, path_var: Option<OsString>) -> Result<PathBuf> {
    if prog.contains('/') {
        let p = PathBuf::from(prog);
        if p.is_file() {
            return Ok(p);
        }
        bail!("{} does not exist", p.display());
    }

    let path_var = path_var.unwrap_or_default();
    std::env::split_paths(&path_var)
        .map(|dir| dir.join(prog))
        .find(|candidate| candidate.is_file())
        .with_context(|| format!("{prog} is not in PATH"))
}
