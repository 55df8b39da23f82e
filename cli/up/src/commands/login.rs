//! Login command.

use anyhow::{Context, Result};
use clap::Args;
use upfleet_provider::DigitalOceanClient;

use crate::config::{Credentials, TOKEN_ENV};
use crate::output::{print_info, print_success};

use super::CommandContext;

/// Store a DigitalOcean API token.
#[derive(Debug, Args)]
pub struct LoginCommand {
    /// Personal access token with write scope.
    #[arg(long, env = TOKEN_ENV)]
    token: Option<String>,
}

impl LoginCommand {
    pub async fn run(self, ctx: CommandContext) -> Result<()> {
        let Some(token) = self.token.filter(|t| !t.trim().is_empty()) else {
            print_info("Create a token at https://cloud.digitalocean.com/account/api/tokens");
            print_info(&format!("then run `up login --token <token>` or set {TOKEN_ENV}."));
            return Ok(());
        };
        let token = token.trim().to_string();

        // Any authenticated read proves the token works.
        let client = DigitalOceanClient::new(ctx.global.api_url(), &token)?;
        upfleet_provider::SshKeyApi::list_ssh_keys(&client)
            .await
            .context("Token check failed")?;

        let path = Credentials::new(token).save()?;
        print_success(&format!("Logged in. Token stored in {}", path.display()));
        Ok(())
    }
}
