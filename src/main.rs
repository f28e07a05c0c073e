mod activity;
mod binary;
mod cli;
mod config;
mod gamemode;
mod logs;
mod logwatch;
mod paths;
mod splash;
mod state;
mod sysinfo;
mod wine;

use anyhow::Result;
use clap::Parser;

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::Cli::parse();

    match cli::run(args).await {
        Ok(()) => Ok(()),
        Err(e) => {
            logs::report_fatal(&e);
            std::process::exit(1);
        }
    }
}
