//! Restart command.

use anyhow::Result;
use clap::Args;

use crate::output::print_success;

use super::{report_failures, CommandContext};

/// Restart the application on every instance.
#[derive(Debug, Args)]
pub struct RestartCommand {}

impl RestartCommand {
    pub async fn run(self, ctx: CommandContext) -> Result<()> {
        let (_, fleet) = ctx.fleet()?;
        let report = fleet.restart().await?;

        report_failures(&report.failures);
        if !report.succeeded.is_empty() {
            print_success(&format!("Restarted {} instance(s)", report.succeeded.len()));
        }

        report.into_result()?;
        Ok(())
    }
}
