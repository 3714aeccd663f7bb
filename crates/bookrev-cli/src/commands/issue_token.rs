use std::time::Duration;

use bookrev_auth::token::TokenManager;
use bookrev_types::{claim::ApiClaim, config::BackendConfig};
use clap::{ArgGroup, Parser};

use crate::commands::{open_db, Executor};

#[derive(Parser, Debug)]
#[command(group(ArgGroup::new("user").required(true).args(["id", "email"])))]
pub struct IssueTokenCmd {
    #[command(flatten)]
    backend: BackendConfig,
    #[arg(long, help = "Id of the user")]
    id: Option<i64>,
    #[arg(long, help = "Email of the user")]
    email: Option<String>,
    #[arg(
        long,
        default_value = "1 day",
        help = "Token validity in human friendly format (e.g. 1d, 1h, 30m)",
        value_parser = humantime::parse_duration
    )]
    validity: Duration,
}

impl Executor for IssueTokenCmd {
    async fn run(self) -> anyhow::Result<()> {
        let pool = open_db(&self.backend).await?;
        let repository = bookrev_dal::user::UserRepository::new(pool);
        let user = match (self.id, self.email) {
            (Some(id), _) => repository.get(id).await?,
            (None, Some(email)) => repository.find_by_email(&email).await?,
            (None, None) => anyhow::bail!("User id or email is required"),
        };

        // token must verify with the server, which reads the same secret file
        let secret_file = self.backend.data_dir().join("secret");
        let secret = tokio::fs::read(&secret_file).await.map_err(|e| {
            anyhow::anyhow!("Cannot read secret {secret_file:?}, was server started? Error: {e}")
        })?;
        let tokens = TokenManager::new(&secret, self.validity)?;
        let claim = ApiClaim::new_expired(user.id.to_string(), [user.role]);
        println!("{}", tokens.issue(claim)?);
        Ok(())
    }
}
