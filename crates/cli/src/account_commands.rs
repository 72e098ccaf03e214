use std::time::Duration;

use {
    anyhow::{Result, bail},
    clap::Subcommand,
    parley_auth::{AuthGateway, AuthOutcome, RemoteAuthGateway},
    parley_config::IdentityConfig,
};

#[derive(Subcommand)]
pub enum AccountAction {
    /// Register a new account with the identity service.
    Create {
        #[arg(long)]
        login: String,
        #[arg(long, env = "PARLEY_PASSWORD")]
        password: String,
    },
    /// Check credentials without joining the chat.
    Verify {
        #[arg(long)]
        login: String,
        #[arg(long, env = "PARLEY_PASSWORD")]
        password: String,
    },
}

pub async fn handle_account(action: AccountAction, identity: &IdentityConfig) -> Result<()> {
    let client = RemoteAuthGateway::new(
        &identity.url,
        Duration::from_secs(identity.connect_timeout_secs),
        Duration::from_secs(identity.request_timeout_secs),
    )?;

    let outcome = match &action {
        AccountAction::Create { login, password } => client.create(login, password).await?,
        AccountAction::Verify { login, password } => client.login(login, password).await?,
    };

    match outcome {
        AuthOutcome::Granted(user) => {
            let verb = match action {
                AccountAction::Create { .. } => "Created",
                AccountAction::Verify { .. } => "Verified",
            };
            println!("{verb} {} (id {})", user.display_name, user.id);
            Ok(())
        },
        AuthOutcome::Rejected(reason) => bail!("{reason}"),
    }
}
