//! Environment file commands.

use anyhow::{bail, Result};
use clap::{Args, Subcommand};
use serde::Serialize;
use tabled::Tabled;
use upfleet_engine::EnvChange;

use crate::output::{print_info, print_output, print_success};

use super::{report_failures, CommandContext};

/// Environment file commands.
#[derive(Debug, Args)]
pub struct EnvCommand {
    #[command(subcommand)]
    command: EnvSubcommand,
}

#[derive(Debug, Subcommand)]
enum EnvSubcommand {
    /// List every variable (read from the first instance).
    List,

    /// Print one variable.
    Get {
        key: String,
    },

    /// Set variables on every instance: `KEY=VALUE ...`.
    Set {
        #[arg(required = true, value_parser = parse_assignment)]
        assignments: Vec<(String, String)>,
    },

    /// Remove variables from every instance.
    Unset {
        #[arg(required = true)]
        keys: Vec<String>,
    },
}

#[derive(Debug, Serialize, Tabled)]
struct EnvRow {
    #[tabled(rename = "Key")]
    key: String,

    #[tabled(rename = "Value")]
    value: String,
}

fn parse_assignment(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got `{raw}`")),
    }
}

impl EnvCommand {
    pub async fn run(self, ctx: CommandContext) -> Result<()> {
        let (_, fleet) = ctx.fleet()?;

        let changes: Vec<EnvChange> = match self.command {
            EnvSubcommand::List => {
                let file = fleet.read_env().await?;
                let rows: Vec<EnvRow> = file
                    .iter()
                    .map(|(key, value)| EnvRow {
                        key: key.to_string(),
                        value: value.to_string(),
                    })
                    .collect();
                print_output(&rows, ctx.format);
                return Ok(());
            }
            EnvSubcommand::Get { key } => {
                let file = fleet.read_env().await?;
                match file.get(&key) {
                    Some(value) => println!("{value}"),
                    None => bail!("{key} is not set"),
                }
                return Ok(());
            }
            EnvSubcommand::Set { assignments } => assignments
                .into_iter()
                .map(|(key, value)| EnvChange::Set { key, value })
                .collect(),
            EnvSubcommand::Unset { keys } => {
                keys.into_iter().map(|key| EnvChange::Unset { key }).collect()
            }
        };

        let report = fleet.update_env(&changes).await?;
        report_failures(&report.failures);
        if !report.succeeded.is_empty() {
            print_success(&format!("Updated {} instance(s)", report.succeeded.len()));
            print_info("Run `up restart` to apply the new environment.");
        }

        report.into_result()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_assignment() {
        assert_eq!(
            parse_assignment("DATABASE_URL=postgres://db/app?x=1").unwrap(),
            ("DATABASE_URL".to_string(), "postgres://db/app?x=1".to_string())
        );
        assert_eq!(
            parse_assignment("EMPTY=").unwrap(),
            ("EMPTY".to_string(), String::new())
        );
        assert!(parse_assignment("=value").is_err());
        assert!(parse_assignment("NOVALUE").is_err());
    }
}
