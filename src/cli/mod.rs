pub mod commands;
pub mod utils;

use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};

#[derive(Parser)]
#[command(name = "demohub")]
#[command(about = "Demo Hub CLI - operator tasks run directly against the database")]
#[command(version)]
pub struct Cli {
    #[arg(long, global = true, help = "Output in human-readable text format")]
    pub text: bool,

    #[arg(long, global = true, help = "Output in JSON format")]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Schema migration and connectivity")]
    Db {
        #[command(subcommand)]
        cmd: commands::db::DbCommands,
    },

    #[command(about = "User accounts and roles")]
    User {
        #[command(subcommand)]
        cmd: commands::user::UserCommands,
    },

    #[command(about = "Per-user upload quotas")]
    Storage {
        #[command(subcommand)]
        cmd: commands::storage::StorageCommands,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputFormat {
    Text,
    Json,
}

impl OutputFormat {
    pub fn from_cli(cli: &Cli) -> Self {
        if cli.json {
            OutputFormat::Json
        } else {
            OutputFormat::Text
        }
    }
}

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let output_format = OutputFormat::from_cli(&cli);

    match cli.command {
        Commands::Db { cmd } => commands::db::handle(cmd, output_format).await,
        Commands::User { cmd } => commands::user::handle(cmd, output_format).await,
        Commands::Storage { cmd } => commands::storage::handle(cmd, output_format).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_flag_selects_json_output() {
        let cli = Cli::try_parse_from(["demohub", "--json", "db", "ping"]).unwrap();
        assert_eq!(OutputFormat::from_cli(&cli), OutputFormat::Json);

        let cli = Cli::try_parse_from(["demohub", "db", "ping"]).unwrap();
        assert_eq!(OutputFormat::from_cli(&cli), OutputFormat::Text);
    }

    #[test]
    fn user_create_requires_email_and_password() {
        assert!(Cli::try_parse_from(["demohub", "user", "create", "--email", "a@b.co"]).is_err());
        assert!(Cli::try_parse_from([
            "demohub", "user", "create", "--email", "a@b.co", "--password", "secret-pass", "--role", "admin"
        ])
        .is_ok());
    }

    #[test]
    fn unknown_role_is_rejected_at_parse_time() {
        assert!(Cli::try_parse_from(["demohub", "user", "set-role", "a@b.co", "owner"]).is_err());
    }

    #[test]
    fn storage_limit_must_be_numeric() {
        assert!(Cli::try_parse_from(["demohub", "storage", "set-limit", "a@b.co", "lots"]).is_err());
        assert!(Cli::try_parse_from(["demohub", "storage", "set-limit", "a@b.co", "1048576"]).is_ok());
    }
}
