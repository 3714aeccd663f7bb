use clap::{Parser, Subcommand};

use crate::commands::{
    create_user::CreateUserCmd, issue_token::IssueTokenCmd, reconcile::ReconcileCmd,
    seed::SeedCmd, Executor,
};

#[derive(Parser)]
#[command(
    version,
    about,
    long_about = "CLI for bookrev - administration of book catalog database."
)]
pub struct CliConfig {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Adds user to local mirror of users
    CreateUser(CreateUserCmd),
    /// Prints API token for existing user
    IssueToken(IssueTokenCmd),
    /// Recomputes book ratings, which do not match reviews
    Reconcile(ReconcileCmd),
    /// Replaces database content with sample data
    Seed(SeedCmd),
}

impl Executor for Command {
    async fn run(self) -> anyhow::Result<()> {
        match self {
            Command::CreateUser(cmd) => cmd.run().await,
            Command::IssueToken(cmd) => cmd.run().await,
            Command::Reconcile(cmd) => cmd.run().await,
            Command::Seed(cmd) => cmd.run().await,
        }
    }
}
