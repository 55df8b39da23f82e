//! List command.

use std::net::Ipv4Addr;

use anyhow::Result;
use chrono::{DateTime, Utc};
use clap::Args;
use serde::Serialize;
use tabled::Tabled;
use upfleet_engine::Instance;

use crate::output::{display_option, print_output};

use super::CommandContext;

/// List the target's instances.
#[derive(Debug, Args)]
pub struct ListCommand {}

#[derive(Debug, Serialize, Tabled)]
struct InstanceRow {
    #[tabled(rename = "Name")]
    name: String,

    #[tabled(rename = "Status")]
    status: String,

    #[tabled(rename = "ID")]
    id: u64,

    #[tabled(rename = "Address", display = "display_option")]
    address: Option<Ipv4Addr>,

    #[tabled(rename = "Index")]
    index: u32,

    #[tabled(rename = "Created", display = "display_created")]
    created_at: Option<DateTime<Utc>>,
}

fn display_created(created_at: &Option<DateTime<Utc>>) -> String {
    created_at
        .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "-".to_string())
}

impl From<Instance> for InstanceRow {
    fn from(instance: Instance) -> Self {
        Self {
            name: instance.name,
            status: instance.status.to_string(),
            id: instance.id,
            address: instance.address,
            index: instance.index,
            created_at: instance.created_at,
        }
    }
}

impl ListCommand {
    pub async fn run(self, ctx: CommandContext) -> Result<()> {
        let (_, fleet) = ctx.fleet()?;
        let rows: Vec<InstanceRow> = fleet.list().await?.into_iter().map(Into::into).collect();
        print_output(&rows, ctx.format);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use upfleet_engine::InstanceStatus;

    #[test]
    fn test_row_from_instance() {
        let row = InstanceRow::from(Instance {
            id: 7,
            name: "api-prod-2".into(),
            index: 2,
            status: InstanceStatus::Running,
            address: None,
            created_at: None,
        });
        assert_eq!(row.name, "api-prod-2");
        assert_eq!(row.index, 2);
        assert_eq!(display_option(&row.address), "-");
    }
}
