use anyhow::Context;
use clap::Subcommand;
use serde_json::json;

use crate::cli::utils::*;
use crate::cli::OutputFormat;
use crate::services::user_service::NewUser;
use crate::services::UserService;
use crate::types::Role;

#[derive(Subcommand)]
pub enum UserCommands {
    #[command(about = "Create an account (bootstrap the first admin with --role admin)")]
    Create {
        #[arg(long, help = "Login email")]
        email: String,

        #[arg(long, help = "Initial password")]
        password: String,

        #[arg(long, default_value = "buyer", help = "admin, sales or buyer")]
        role: Role,

        #[arg(long, help = "Display name (defaults to the email's local part)")]
        name: Option<String>,
    },

    #[command(about = "List all accounts")]
    List,

    #[command(about = "Change an account's role")]
    SetRole {
        #[arg(help = "Account email")]
        email: String,

        #[arg(help = "admin, sales or buyer")]
        role: Role,
    },

    #[command(about = "Deactivate an account; its tokens stop working immediately")]
    Deactivate {
        #[arg(help = "Account email")]
        email: String,
    },
}

pub async fn handle(cmd: UserCommands, output_format: OutputFormat) -> anyhow::Result<()> {
    let users = UserService::connect().await?;

    match cmd {
        UserCommands::Create {
            email,
            password,
            role,
            name,
        } => {
            let name = name.unwrap_or_else(|| email.split('@').next().unwrap_or_default().to_string());
            let user = users
                .insert(NewUser {
                    email,
                    password,
                    name,
                    role: Some(role),
                    company: None,
                    phone: None,
                    title: None,
                })
                .await
                .context("failed to create user")?;

            output_success(
                &output_format,
                &format!("Created {} account {} ({})", user.role, user.email, user.id),
                Some(to_json_value(&user)?),
            )
        }
        UserCommands::List => {
            let all = users.list_all().await?;
            if all.is_empty() {
                return output_empty_collection(&output_format, "users", "No users");
            }

            match output_format {
                OutputFormat::Json => {
                    println!("{}", serde_json::to_string_pretty(&json!({ "users": all }))?);
                }
                OutputFormat::Text => {
                    println!("{:<36} {:<30} {:<8} {:<8} {}", "ID", "EMAIL", "ROLE", "ACTIVE", "CREATED");
                    println!("{}", "-".repeat(100));
                    for user in &all {
                        println!(
                            "{:<36} {:<30} {:<8} {:<8} {}",
                            user.id,
                            user.email,
                            user.role,
                            if user.is_active { "yes" } else { "no" },
                            user.created_at.format("%Y-%m-%d %H:%M")
                        );
                    }
                }
            }
            Ok(())
        }
        UserCommands::SetRole { email, role } => {
            let user = users
                .set_role_and_status(&email, Some(role), None)
                .await
                .with_context(|| format!("failed to change role of {}", email))?;
            output_success(
                &output_format,
                &format!("{} is now {}", user.email, user.role),
                Some(to_json_value(&user)?),
            )
        }
        UserCommands::Deactivate { email } => {
            let user = users
                .set_role_and_status(&email, None, Some(false))
                .await
                .with_context(|| format!("failed to deactivate {}", email))?;
            output_success(
                &output_format,
                &format!("Deactivated {}", user.email),
                Some(to_json_value(&user)?),
            )
        }
    }
}
