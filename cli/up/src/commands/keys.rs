//! Account SSH key commands.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use serde::Serialize;
use tabled::Tabled;
use upfleet_provider::{NewSshKey, SshKey};

use crate::config;
use crate::output::{print_output, print_success};

use super::CommandContext;

/// Account SSH key commands.
#[derive(Debug, Args)]
pub struct KeysCommand {
    #[command(subcommand)]
    command: KeysSubcommand,
}

#[derive(Debug, Subcommand)]
enum KeysSubcommand {
    /// List keys registered on the account.
    List,

    /// Register a public key.
    Add(AddKeyArgs),
}

#[derive(Debug, Args)]
struct AddKeyArgs {
    /// Name shown in the provider's console.
    #[arg(long)]
    name: String,

    /// Public key file. Defaults to the login key with `.pub` appended.
    #[arg(long)]
    public_key: Option<PathBuf>,
}

#[derive(Debug, Serialize, Tabled)]
struct KeyRow {
    #[tabled(rename = "ID")]
    id: u64,

    #[tabled(rename = "Name")]
    name: String,

    #[tabled(rename = "Fingerprint")]
    fingerprint: String,
}

impl From<SshKey> for KeyRow {
    fn from(key: SshKey) -> Self {
        Self {
            id: key.id,
            name: key.name,
            fingerprint: key.fingerprint,
        }
    }
}

impl KeysCommand {
    pub async fn run(self, ctx: CommandContext) -> Result<()> {
        match self.command {
            KeysSubcommand::List => list_keys(ctx).await,
            KeysSubcommand::Add(args) => add_key(ctx, args).await,
        }
    }
}

async fn list_keys(ctx: CommandContext) -> Result<()> {
    let keys = ctx.cloud()?.ssh_keys.list_ssh_keys().await?;
    let rows: Vec<KeyRow> = keys.into_iter().map(Into::into).collect();
    print_output(&rows, ctx.format);
    Ok(())
}

async fn add_key(ctx: CommandContext, args: AddKeyArgs) -> Result<()> {
    let path = match args.public_key {
        Some(path) => path,
        None => public_key_of(config::ssh_private_key(&ctx.global, &ctx.overrides)?),
    };
    let public_key = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read public key from {:?}", path))?;

    let key = ctx
        .cloud()?
        .ssh_keys
        .create_ssh_key(&NewSshKey {
            name: args.name,
            public_key: public_key.trim().to_string(),
        })
        .await?;

    print_success(&format!("Registered key {} ({})", key.name, key.fingerprint));
    Ok(())
}

fn public_key_of(private_key: PathBuf) -> PathBuf {
    let mut path = private_key.into_os_string();
    path.push(".pub");
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_key_path() {
        assert_eq!(
            public_key_of(PathBuf::from("/home/me/.ssh/id_ed25519")),
            PathBuf::from("/home/me/.ssh/id_ed25519.pub")
        );
    }
}
