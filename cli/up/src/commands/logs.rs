//! Logs command.

use anyhow::Result;
use clap::Args;
use colored::Colorize;

use crate::output::{print_single, OutputFormat};

use super::{report_failures, CommandContext};

/// Print the application's log from every instance.
#[derive(Debug, Args)]
pub struct LogsCommand {}

impl LogsCommand {
    pub async fn run(self, ctx: CommandContext) -> Result<()> {
        let (_, fleet) = ctx.fleet()?;
        let report = fleet.logs().await?;

        match ctx.format {
            OutputFormat::Json => print_single(&report.logs),
            OutputFormat::Table => {
                for logs in &report.logs {
                    for line in prefixed(logs.index, &logs.stdout) {
                        println!("{line}");
                    }
                    for line in prefixed(logs.index, &logs.stderr) {
                        eprintln!("{} {}", "!".red(), line);
                    }
                }
            }
        }

        report_failures(&report.failures);
        report.into_result()?;
        Ok(())
    }
}

/// Tags every non-blank line of `output` with the instance index.
fn prefixed(index: u32, output: &str) -> Vec<String> {
    output
        .lines()
        .map(str::trim_end)
        .filter(|line| !line.is_empty())
        .map(|line| format!("[{index}] {line}"))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefixes_each_line_with_index() {
        assert_eq!(
            prefixed(2, "listening on 80\n\nGET / 200  \n"),
            vec!["[2] listening on 80", "[2] GET / 200"]
        );
        assert!(prefixed(0, "").is_empty());
    }
}
