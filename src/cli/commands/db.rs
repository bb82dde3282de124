use clap::Subcommand;

use crate::cli::utils::*;
use crate::cli::OutputFormat;
use crate::database::DatabaseManager;

#[derive(Subcommand)]
pub enum DbCommands {
    #[command(about = "Apply the bundled schema migrations")]
    Migrate,

    #[command(about = "Check that the database answers")]
    Ping,
}

pub async fn handle(cmd: DbCommands, output_format: OutputFormat) -> anyhow::Result<()> {
    match cmd {
        DbCommands::Migrate => {
            DatabaseManager::migrate().await?;
            output_success(&output_format, "Migrations applied", None)
        }
        DbCommands::Ping => {
            DatabaseManager::health_check().await?;
            output_success(&output_format, "Database is reachable", None)
        }
    }
}
