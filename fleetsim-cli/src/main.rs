//! ## fleetsim-cli
//! **Operational entrypoint for the fleet telemetry simulator**
//!
//! `fleetsim run` builds a fleet, connects the configured sinks and drives
//! the dispatch loop until the planned duration elapses or Ctrl-C arrives.
//! `fleetsim catalog` lists the built-in taxonomy and `fleetsim check-config`
//! prints the effective configuration after layering and validation.

use clap::Parser;

mod commands;

use commands::Cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    commands::run_command(cli).await
}
