use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "immune")]
#[command(author, version, about = "Telegram bot issuing QR certificates to invited users", long_about = None)]
pub struct Cli {
    /// Path to the TOML config file, missing file means defaults and env only
    #[arg(short, long, global = true, default_value = "config.toml")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Run the bot and both HTTP servers
    Run {
        /// Use webhook mode instead of long polling
        #[arg(long)]
        webhook: bool,
    },
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// `run` without a subcommand
    pub fn command(&self) -> Commands {
        self.command.clone().unwrap_or(Commands::Run { webhook: false })
    }
}
