//! Init command: everything a target needs before its first deploy.

use anyhow::{Context, Result};
use clap::Args;
use upfleet_engine::{DomainOutcome, InitReport, RecordOutcome, SyncOutcome};
use upfleet_naming::Fqdn;

use crate::error::CliError;
use crate::output::{print_single, print_success, OutputFormat};

use super::CommandContext;

/// Bring up the first instance, load balancer, certificate and DNS record.
#[derive(Debug, Args)]
pub struct InitCommand {
    /// Host to serve the target on. Defaults to `up.targets.<target>` in
    /// package.json.
    fqdn: Option<String>,
}

impl InitCommand {
    pub async fn run(self, ctx: CommandContext) -> Result<()> {
        let (project, fleet) = ctx.fleet()?;
        let environment = fleet.context().target.environment().to_string();

        let host = match self.fqdn {
            Some(host) => host,
            None => project
                .domain_for(&environment)
                .map(str::to_string)
                .ok_or(CliError::NoDomain(environment))?,
        };
        let fqdn = Fqdn::parse(&host).with_context(|| format!("Invalid host `{host}`"))?;

        let report = fleet
            .init(&fqdn)
            .await
            .with_context(|| format!("Failed to initialize {fqdn}"))?;

        match ctx.format {
            OutputFormat::Json => print_single(&summary(&report)),
            OutputFormat::Table => print_success(&format!(
                "{} is served by load balancer {} ({})",
                report.fqdn, report.load_balancer.name, report.address
            )),
        }
        Ok(())
    }
}

fn summary(report: &InitReport) -> serde_json::Value {
    serde_json::json!({
        "fqdn": report.fqdn.host(),
        "instance": report.instance,
        "instance_created": report.instance_created,
        "domain_created": report.domain == DomainOutcome::Created,
        "certificate_id": report.certificate.id,
        "load_balancer_id": report.load_balancer.id,
        "membership_updated": matches!(report.membership, SyncOutcome::Updated { .. }),
        "address": report.address,
        "record_created": matches!(report.record, RecordOutcome::Created(_)),
        "propagation_attempts": report.propagation_attempts,
    })
}
