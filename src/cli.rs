use crate::binary::{Binary, BinaryType, LaunchOptions};
use crate::config::Config;
use crate::logs::{self, LogSink};
use crate::paths::Dirs;
use crate::state::State;
use crate::sysinfo;
use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Debug, Parser, Clone)]
#[command(name = "vinegar", version, about = "Run Roblox on Linux through Wine")]
pub struct Cli {
    /// config.toml file which should be used
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log filter, e.g. `debug` or `vinegar=trace`; RUST_LOG takes precedence
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,

    /// Initialize the wineprefix even if it already exists
    #[arg(long, global = true)]
    pub first_run: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Launch Roblox Player, optionally with a roblox-player: URI
    Player {
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },
    /// Launch Roblox Studio, optionally with a roblox-studio: URI or file
    Studio {
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },
    /// Run a program inside the Player wineprefix
    Exec {
        prog: String,
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },
    /// Kill every process running in the wineprefixes
    Kill,
    /// Install the staged WebView2 runtime into the Player wineprefix
    #[command(name = "install-webview2")]
    InstallWebview2,
    /// Run winetricks in the Player wineprefix
    Winetricks,
    /// Delete all wineprefixes
    Delete,
    /// Remove every installed Roblox version
    Uninstall,
    /// Print system information for bug reports
    Sysinfo,
}

pub async fn run(args: Cli) -> Result<()> {
    let dirs = Dirs::new()?;
    let config_path = args.config.clone().unwrap_or_else(|| dirs.config_file());

    let (kind, bargs) = match args.command {
        Command::Player { args: bargs } => (BinaryType::Player, bargs),
        Command::Studio { args: bargs } => (BinaryType::Studio, bargs),
        other => {
            logs::init_tracing(&args.log_level, LogSink::stderr());
            return run_tool(other, &config_path, &dirs).await;
        }
    };

    let (file, log_path) = logs::create_file(&dirs.logs, kind.dir_name())?;
    let sink = LogSink::with_file(file);
    logs::init_tracing(&args.log_level, sink.clone());

    let cfg = Config::load(&config_path)?;
    let mut binary = Binary::new(kind, &cfg, dirs, sink)?
        .with_log_path(log_path)
        .with_options(LaunchOptions {
            force_first_run: args.first_run,
            ..LaunchOptions::default()
        });

    if let Err(err) = binary.main(&bargs).await {
        binary.report_error(&err).await;
        std::process::exit(1);
    }
    Ok(())
}

async fn run_tool(cmd: Command, config_path: &Path, dirs: &Dirs) -> Result<()> {
    match cmd {
        Command::Delete => delete(dirs),
        Command::Uninstall => uninstall(dirs),
        Command::Exec { prog, args } => {
            let cfg = Config::load(config_path)?;
            BinaryType::Player
                .prefix(&cfg, dirs, LogSink::stderr())
                .wine(&prog, &args)
                .run()
                .await
        }
        Command::Kill => {
            let cfg = Config::load(config_path)?;
            for kind in [BinaryType::Player, BinaryType::Studio] {
                let pfx = kind.prefix(&cfg, dirs, LogSink::stderr());
                if !pfx.dir().exists() {
                    continue;
                }
                if let Err(err) = pfx.kill().await {
                    warn!(prefix = %kind, error = %format!("{err:#}"), "Could not kill wineprefix");
                }
            }
            Ok(())
        }
        Command::InstallWebview2 => {
            let installer = dirs.webview_installer();
            if !installer.is_file() {
                bail!("no WebView2 installer staged at {}", installer.display());
            }
            let cfg = Config::load(config_path)?;
            Binary::new(BinaryType::Player, &cfg, dirs.clone(), LogSink::stderr())?
                .install_webview()
                .await
                .context("failed to install webview")
        }
        Command::Winetricks => {
            let cfg = Config::load(config_path)?;
            BinaryType::Player
                .prefix(&cfg, dirs, LogSink::stderr())
                .winetricks()
                .run()
                .await
                .context("winetricks")
        }
        Command::Sysinfo => {
            let cfg = Config::load(config_path)?;
            let wine = BinaryType::Player
                .prefix(&cfg, dirs, LogSink::stderr())
                .wine("--version", Vec::<String>::new())
                .output()
                .await
                .context("wine version")?;
            print!("{}", sysinfo::Report::gather(wine.trim().to_string()));
            Ok(())
        }
        Command::Player { .. } | Command::Studio { .. } => unreachable!("handled by run"),
    }
}

fn delete(dirs: &Dirs) -> Result<()> {
    info!(dir = %dirs.prefixes.display(), "Deleting wineprefixes");
    remove_dir(&dirs.prefixes)
}

fn uninstall(dirs: &Dirs) -> Result<()> {
    let state_file = dirs.state_file();
    let mut state = State::load(&state_file)?;

    for ver in state.versions() {
        info!(version = ver, "Removing version directory");
        remove_dir(&dirs.versions.join(ver))?;
    }

    state.clear_applications();
    state.save(&state_file).context("save state")
}

fn remove_dir(dir: &Path) -> Result<()> {
    match std::fs::remove_dir_all(dir) {
        Err(err) if err.kind() != std::io::ErrorKind::NotFound => {
            Err(err).with_context(|| format!("remove {}", dir.display()))
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn player_arguments_pass_through_untouched() {
        let cli = Cli::try_parse_from([
            "vinegar",
            "--first-run",
            "player",
            "roblox-player:1+launchmode:play+channel:zbeta",
        ])
        .unwrap();
        assert!(cli.first_run);
        match cli.command {
            Command::Player { args } => {
                assert_eq!(args, ["roblox-player:1+launchmode:play+channel:zbeta"])
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn exec_keeps_hyphenated_program_arguments() {
        let cli = Cli::try_parse_from(["vinegar", "exec", "winecfg", "-v", "win10"]).unwrap();
        match cli.command {
            Command::Exec { prog, args } => {
                assert_eq!(prog, "winecfg");
                assert_eq!(args, ["-v", "win10"]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn prefix_tools_are_subcommands() {
        let cli = Cli::try_parse_from(["vinegar", "install-webview2"]).unwrap();
        assert!(matches!(cli.command, Command::InstallWebview2));
        let cli = Cli::try_parse_from(["vinegar", "winetricks"]).unwrap();
        assert!(matches!(cli.command, Command::Winetricks));
    }

    #[tokio::test]
    async fn install_webview2_needs_a_staged_installer() {
        let tmp = tempfile::tempdir().unwrap();
        let dirs = Dirs::under(tmp.path());
        let err = run_tool(
            Command::InstallWebview2,
            &tmp.path().join("config.toml"),
            &dirs,
        )
        .await
        .unwrap_err();
        assert!(err.to_string().starts_with("no WebView2 installer staged"));
    }

    #[test]
    fn uninstall_removes_versions_and_clears_state() {
        let tmp = tempfile::tempdir().unwrap();
        let dirs = Dirs::under(tmp.path());
        let mut state = State::default();
        state.player.version = "version-a".into();
        state.studio.version = "version-b".into();
        state.save(&dirs.state_file()).unwrap();
        std::fs::create_dir_all(dirs.versions.join("version-a")).unwrap();

        uninstall(&dirs).unwrap();

        assert!(!dirs.versions.join("version-a").exists());
        assert!(State::load(&dirs.state_file()).unwrap().versions().is_empty());
    }

    #[test]
    fn delete_tolerates_missing_prefixes() {
        let tmp = tempfile::tempdir().unwrap();
        let dirs = Dirs::under(tmp.path());
        delete(&dirs).unwrap();

        std::fs::create_dir_all(dirs.prefixes.join("player/drive_c")).unwrap();
        delete(&dirs).unwrap();
        assert!(!dirs.prefixes.exists());
    }
}
