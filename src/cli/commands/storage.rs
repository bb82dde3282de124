use anyhow::{anyhow, Context};
use clap::Subcommand;

use crate::cli::utils::*;
use crate::cli::OutputFormat;
use crate::database::models::User;
use crate::services::storage_service::StorageSummary;
use crate::services::{StorageService, UserService};

#[derive(Subcommand)]
pub enum StorageCommands {
    #[command(about = "Set a user's upload quota in bytes")]
    SetLimit {
        #[arg(help = "Account email")]
        email: String,

        #[arg(help = "New limit in bytes")]
        bytes: i64,
    },

    #[command(about = "Show a user's usage")]
    Show {
        #[arg(help = "Account email")]
        email: String,

        #[arg(long, help = "Recompute the total from stored media first")]
        recalculate: bool,
    },
}

pub async fn handle(cmd: StorageCommands, output_format: OutputFormat) -> anyhow::Result<()> {
    let storage = StorageService::connect().await?;

    match cmd {
        StorageCommands::SetLimit { email, bytes } => {
            let user = find_user(&email).await?;
            let summary = storage
                .apply_limit(user.id, bytes)
                .await
                .with_context(|| format!("failed to set limit for {}", email))?;
            output_success(
                &output_format,
                &format!("Storage limit for {} set to {}", user.email, format_bytes(summary.limit_bytes)),
                Some(to_json_value(&summary)?),
            )
        }
        StorageCommands::Show { email, recalculate } => {
            let user = find_user(&email).await?;
            let summary = if recalculate {
                storage.recalculate(user.id).await?
            } else {
                storage.usage_for(user.id).await?
            };

            match output_format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&summary)?),
                OutputFormat::Text => print_summary(&user, &summary),
            }
            Ok(())
        }
    }
}

async fn find_user(email: &str) -> anyhow::Result<User> {
    UserService::connect()
        .await?
        .find_by_email(email)
        .await?
        .ok_or_else(|| anyhow!("User '{}' not found", email))
}

fn print_summary(user: &User, summary: &StorageSummary) {
    println!("User:      {} ({})", user.email, user.id);
    println!("Used:      {}", format_bytes(summary.total_bytes));
    println!("Limit:     {}", format_bytes(summary.limit_bytes));
    println!("Remaining: {}", format_bytes(summary.remaining_bytes));
    println!("Percent:   {:.1}%", summary.percent_used);
    println!("Media:     {}", summary.media_count);
}
