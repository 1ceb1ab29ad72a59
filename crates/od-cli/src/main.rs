mod cli;

use anyhow::Result;
use clap::Parser;

fn main() -> Result<()> {
    cli::run_cli(cli::Cli::parse())
}
