//! Status command.

use std::net::Ipv4Addr;

use anyhow::Result;
use clap::Args;
use serde::Serialize;
use tabled::Tabled;
use upfleet_engine::InstanceReport;

use crate::output::{display_option, print_output};

use super::CommandContext;

/// Query every instance's status endpoint.
#[derive(Debug, Args)]
pub struct StatusCommand {}

#[derive(Debug, Serialize, Tabled)]
struct StatusRow {
    #[tabled(rename = "Name")]
    name: String,

    #[tabled(rename = "Address", display = "display_option")]
    address: Option<Ipv4Addr>,

    #[tabled(rename = "Uptime", display = "display_uptime")]
    uptime: Option<f64>,

    #[tabled(rename = "Version", display = "display_option")]
    version: Option<String>,

    #[tabled(rename = "Hash", display = "display_hash")]
    hash: Option<String>,

    #[tabled(rename = "Error", display = "display_option")]
    error: Option<String>,
}

impl From<InstanceReport> for StatusRow {
    fn from(report: InstanceReport) -> Self {
        let (status, error) = match report.status {
            Ok(status) => (Some(status), None),
            Err(error) => (None, Some(error)),
        };
        Self {
            name: report.instance.name,
            address: report.instance.address,
            uptime: status.as_ref().map(|s| s.uptime),
            version: status.as_ref().and_then(|s| s.version.clone()),
            hash: status.and_then(|s| s.hash),
            error,
        }
    }
}

fn display_uptime(uptime: &Option<f64>) -> String {
    let Some(secs) = uptime else {
        return "-".to_string();
    };
    let secs = secs.max(0.0) as u64;
    match secs {
        0..=59 => format!("{secs}s"),
        60..=3599 => format!("{}m{}s", secs / 60, secs % 60),
        _ => format!("{}h{}m", secs / 3600, (secs % 3600) / 60),
    }
}

fn display_hash(hash: &Option<String>) -> String {
    hash.as_deref()
        .map(|h| h.chars().take(12).collect())
        .unwrap_or_else(|| "-".to_string())
}

impl StatusCommand {
    pub async fn run(self, ctx: CommandContext) -> Result<()> {
        let (_, fleet) = ctx.fleet()?;
        let rows: Vec<StatusRow> = fleet.status().await?.into_iter().map(Into::into).collect();
        print_output(&rows, ctx.format);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_uptime() {
        assert_eq!(display_uptime(&None), "-");
        assert_eq!(display_uptime(&Some(42.7)), "42s");
        assert_eq!(display_uptime(&Some(125.0)), "2m5s");
        assert_eq!(display_uptime(&Some(7_260.0)), "2h1m");
    }

    #[test]
    fn test_display_hash_is_shortened() {
        let hash = Some("0123456789abcdef0123".to_string());
        assert_eq!(display_hash(&hash), "0123456789ab");
        assert_eq!(display_hash(&None), "-");
    }
}
