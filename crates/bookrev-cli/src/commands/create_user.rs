use bookrev_types::{claim::Role, config::BackendConfig, general::ValidEmail};
use clap::Parser;
use garde::Validate as _;

use crate::commands::{open_db, Executor};

#[derive(Parser, Debug)]
pub struct CreateUserCmd {
    #[command(flatten)]
    backend: BackendConfig,
    #[arg(short, long, help = "User name, as displayed with reviews")]
    name: String,
    #[arg(short, long, help = "User email, must be unique")]
    pub email: ValidEmail,
    #[arg(short, long, help = "URL of user avatar image")]
    pub avatar: Option<String>,
    #[arg(short, long, default_value = "user", help = "Role of the user - admin or user")]
    pub role: Role,
}

impl Executor for CreateUserCmd {
    async fn run(self) -> anyhow::Result<()> {
        let new_user = bookrev_dal::user::CreateUser {
            name: self.name,
            email: self.email,
            avatar: self.avatar,
            role: self.role,
        };
        new_user.validate()?;
        let pool = open_db(&self.backend).await?;
        let repository = bookrev_dal::user::UserRepository::new(pool);
        let user = repository.create(new_user).await?;
        println!("{}", serde_json::to_string_pretty(&user)?);

        Ok(())
    }
}
