//! Deploy command.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use upfleet_engine::{BuildArtifact, DeployReport};

use crate::output::{print_single, print_success, OutputFormat};

use super::{report_failures, CommandContext};

/// Bundle path used when none is given, relative to the project root.
const DEFAULT_BUNDLE: &str = "dist/app.js";

/// Deploy the built application.
#[derive(Debug, Args)]
pub struct DeployCommand {
    /// Single-file build output, relative to the project root.
    #[arg(long, default_value = DEFAULT_BUNDLE)]
    bundle: PathBuf,
}

impl Default for DeployCommand {
    fn default() -> Self {
        Self {
            bundle: PathBuf::from(DEFAULT_BUNDLE),
        }
    }
}

impl DeployCommand {
    pub async fn run(self, ctx: CommandContext) -> Result<()> {
        let (project, fleet) = ctx.fleet()?;
        let artifact = BuildArtifact::locate(&project.root, &self.bundle)?;

        let DeployReport {
            digest,
            instances: report,
        } = fleet
            .deploy(&artifact)
            .await
            .with_context(|| format!("Failed to deploy {}", fleet.context().target))?;

        match ctx.format {
            OutputFormat::Json => print_single(&serde_json::json!({
                "target": fleet.context().target.to_string(),
                "hash": digest,
                "deployed": report.succeeded,
                "failed": report.failures.iter().map(|f| &f.instance).collect::<Vec<_>>(),
            })),
            OutputFormat::Table => {
                report_failures(&report.failures);
                if !report.succeeded.is_empty() {
                    print_success(&format!(
                        "Deployed {} to {} instance(s)",
                        &digest[..12.min(digest.len())],
                        report.succeeded.len()
                    ));
                }
            }
        }

        report.into_result()?;
        Ok(())
    }
}
