//! up - operator CLI for upfleet.
//!
//! Reconciles a service's fleet of DigitalOcean droplets, its load balancer
//! and its DNS record, and deploys application bundles to it.

use anyhow::Result;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

mod commands;
mod config;
mod error;
mod output;

use commands::Cli;

/// Filter used when `RUST_LOG` is unset and `--verbose` is given.
const VERBOSE_FILTER: &str =
    "warn,upfleet_engine=debug,upfleet_provider=debug,upfleet_reconcile=debug,up=debug";

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let verbose = cli.verbose();
    init_tracing(verbose, cli.json_logs());

    // Ctrl+C cancels every wait in flight.
    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        }
    });

    if let Err(e) = cli.run(cancel).await {
        error::print_error(&e, verbose);
        std::process::exit(1);
    }

    Ok(())
}

fn init_tracing(verbose: bool, json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| if verbose { VERBOSE_FILTER } else { "warn" }.into());

    let layer = if json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_target(false)
            .with_writer(std::io::stderr)
            .boxed()
    };

    tracing_subscriber::registry().with(layer).with(filter).init();
}
