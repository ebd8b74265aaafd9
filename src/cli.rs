use std::path::PathBuf;

use clap::Parser;

/// Command-line flags. Every value set here wins over the environment and the
/// config file.
#[derive(Debug, Clone, Default, Parser)]
#[command(name = "meetup-bot-discord", version, about)]
pub struct Cli {
    /// Path to the YAML (or JSON) config file.
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,

    /// Meetup API key.
    #[arg(short = 'a', long = "api-key")]
    pub api_key: Option<String>,

    /// Discord bot token.
    #[arg(short = 't', long)]
    pub token: Option<String>,

    /// SQLite file holding per-guild settings.
    #[arg(long)]
    pub database: Option<String>,

    #[arg(long)]
    pub log_level: Option<String>,
}
