//! Re-provisioning an existing instance.

use anyhow::Result;
use clap::Args;

use crate::output::print_success;

use super::CommandContext;

/// Re-run provisioning on an instance.
#[derive(Debug, Args)]
pub struct SetupCommand {
    /// Droplet id of the instance.
    id: u64,
}

impl SetupCommand {
    pub async fn run(self, ctx: CommandContext) -> Result<()> {
        let (_, fleet) = ctx.fleet()?;
        let instance = fleet.reprovision(self.id).await?;
        print_success(&format!("Provisioned {}", instance.name));
        Ok(())
    }
}
