use crate::logs::LogSink;
use crate::paths::Dirs;
use crate::{config, state, wine::Prefix};
use anyhow::Result;
use std::fmt;

const STUDIO_PROTOCOL: &str = "roblox-studio:1";

/// The two Roblox applications. Everything that differs between them lives here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryType {
    Player,
    Studio,
}

impl BinaryType {
    pub fn alias(self) -> &'static str {
        match self {
            Self::Player => "Player",
            Self::Studio => "Studio",
        }
    }

    /// Name used for the variant's prefix and log files.
    pub fn dir_name(self) -> &'static str {
        match self {
            Self::Player => "player",
            Self::Studio => "studio",
        }
    }

    pub fn executable(self) -> &'static str {
        match self {
            Self::Player => "RobloxPlayerBeta.exe",
            Self::Studio => "RobloxStudioBeta.exe",
        }
    }

    /// Studio allows several instances at once; Player needs the mutexer.
    pub fn supports_multiple_instances(self) -> bool {
        matches!(self, Self::Studio)
    }

    /// Arguments to hand the executable. Studio takes its protocol
    /// string through a flag rather than positionally.
    pub fn launch_args(self, args: &[String]) -> Vec<String> {
        match self {
            Self::Studio if args.join(" ").starts_with(STUDIO_PROTOCOL) => {
                vec!["-protocolString".to_string(), args[0].clone()]
            }
            _ => args.to_vec(),
        }
    }

    pub fn config(self, cfg: &config::Config) -> &config::Binary {
        match self {
            Self::Player => &cfg.player,
            Self::Studio => &cfg.studio,
        }
    }

    pub fn state(self, st: &state::State) -> &state::Binary {
        match self {
            Self::Player => &st.player,
            Self::Studio => &st.studio,
        }
    }

    pub fn state_mut(self, st: &mut state::State) -> &mut state::Binary {
        match self {
            Self::Player => &mut st.player,
            Self::Studio => &mut st.studio,
        }
    }

    /// The variant's own wineprefix, carrying its configured environment.
    pub fn prefix(self, cfg: &config::Config, dirs: &Dirs, output: LogSink) -> Prefix {
        let bcfg = self.config(cfg);
        Prefix::new(dirs.prefixes.join(self.dir_name()), bcfg.wineroot(), output)
            .with_env([("GAMEID", "ulwgl-roblox")])
            .with_env(bcfg.env.clone())
    }

    pub(crate) async fn init_prefix(self, prefix: &Prefix) -> Result<()> {
        match self {
            Self::Player => prefix.init().await,
            // Studio accepts every DPI except the default of 96. Running
            // wine for the registry edit creates the prefix as well.
            Self::Studio => prefix.set_dpi(97).await,
        }
    }
}

impl fmt::Display for BinaryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.alias())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn studio_protocol_goes_through_a_flag() {
        let uri = "roblox-studio:1+launchmode:edit+task:EditPlace".to_string();
        assert_eq!(
            BinaryType::Studio.launch_args(std::slice::from_ref(&uri)),
            vec!["-protocolString".to_string(), uri.clone()]
        );
        assert_eq!(
            BinaryType::Player.launch_args(std::slice::from_ref(&uri)),
            vec![uri]
        );
        assert!(BinaryType::Studio.launch_args(&[]).is_empty());
    }

    #[test]
    fn only_studio_runs_multiple_instances() {
        assert!(BinaryType::Studio.supports_multiple_instances());
        assert!(!BinaryType::Player.supports_multiple_instances());
        assert_eq!(BinaryType::Player.to_string(), "Player");
    }
}
