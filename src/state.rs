//! Persisted launcher state.
//!
//! Tracks which version of each variant is installed and for which channel.
//! Stored as JSON next to the installed versions.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct State {
    #[serde(default)]
    pub player: Binary,
    #[serde(default)]
    pub studio: Binary,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Binary {
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub channel: String,
}

impl State {
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw =
            std::fs::read(path).with_context(|| format!("read state {}", path.display()))?;
        serde_json::from_slice(&raw).with_context(|| format!("parse state {}", path.display()))
    }

    /// Write the state atomically: serialize into a sibling temp file, then rename.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create {}", parent.display()))?;
        }
        let tmp = path.with_extension("json.tmp");
        let data = serde_json::to_vec_pretty(self)?;
        std::fs::write(&tmp, data).with_context(|| format!("write {}", tmp.display()))?;
        std::fs::rename(&tmp, path).with_context(|| format!("rename to {}", path.display()))?;
        Ok(())
    }

    /// All installed versions across variants.
    pub fn versions(&self) -> Vec<&str> {
        [&self.player, &self.studio]
            .into_iter()
            .map(|b| b.version.as_str())
            .filter(|v| !v.is_empty())
            .collect()
    }

    pub fn clear_applications(&mut self) {
        self.player = Binary::default();
        self.studio = Binary::default();
    }
}
