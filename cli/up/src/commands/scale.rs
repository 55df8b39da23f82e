//! Scale command.

use anyhow::Result;
use clap::Args;
use upfleet_engine::EngineError;
use upfleet_reconcile::{ScalePlan, ScaleRequest};

use crate::output::{print_info, print_single, print_success, OutputFormat};

use super::CommandContext;

/// Scale the fleet.
#[derive(Debug, Args)]
pub struct ScaleCommand {
    /// `+N` adds instances, `-N` removes them, `N` converges on N instances.
    #[arg(allow_hyphen_values = true, value_parser = parse_request)]
    count: ScaleRequest,
}

fn parse_request(raw: &str) -> Result<ScaleRequest, String> {
    ScaleRequest::parse(raw).ok_or_else(|| format!("expected +N, -N or N, got `{raw}`"))
}

impl ScaleCommand {
    pub async fn run(self, ctx: CommandContext) -> Result<()> {
        let (_, fleet) = ctx.fleet()?;
        let outcome = fleet.scale(self.count).await?;

        if ctx.format == OutputFormat::Json {
            print_single(&serde_json::json!({
                "launched": outcome.launched,
                "destroyed": outcome.destroyed,
                "failed": outcome.failures.iter().map(|f| &f.instance).collect::<Vec<_>>(),
            }));
        } else {
            match &outcome.plan {
                ScalePlan::Unchanged { size } => {
                    print_info(&format!("Fleet already has {size} instance(s)"))
                }
                ScalePlan::Rejected { .. } => print_info("Nothing to do for a count of zero"),
                ScalePlan::Up { .. } if !outcome.launched.is_empty() => print_success(&format!(
                    "Launched {}",
                    join_names(outcome.launched.iter().map(|i| i.name.as_str()))
                )),
                ScalePlan::Down { .. } if !outcome.destroyed.is_empty() => {
                    print_success(&format!(
                        "Destroyed {}",
                        join_names(outcome.destroyed.iter().map(|i| i.name.as_str()))
                    ))
                }
                _ => {}
            }
        }

        if !outcome.failures.is_empty() {
            let total = outcome.failures.len() + outcome.launched.len() + outcome.destroyed.len();
            return Err(EngineError::Partial {
                total,
                failures: outcome.failures,
            }
            .into());
        }
        Ok(())
    }
}

fn join_names<'a>(names: impl Iterator<Item = &'a str>) -> String {
    names.collect::<Vec<_>>().join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use upfleet_reconcile::ScaleDirection;

    #[test]
    fn test_parse_request() {
        assert_eq!(
            parse_request("+2").unwrap(),
            ScaleRequest::Explicit {
                direction: ScaleDirection::Up,
                count: 2
            }
        );
        assert_eq!(parse_request("3").unwrap(), ScaleRequest::To(3));
        assert!(parse_request("two").is_err());
    }

    #[test]
    fn test_negative_count_is_accepted_as_argument() {
        use clap::Parser;

        #[derive(Debug, Parser)]
        struct Wrapper {
            #[command(flatten)]
            scale: ScaleCommand,
        }

        let parsed = Wrapper::try_parse_from(["scale", "-1"]).unwrap();
        assert_eq!(
            parsed.scale.count,
            ScaleRequest::Explicit {
                direction: ScaleDirection::Down,
                count: 1
            }
        );
    }
}
