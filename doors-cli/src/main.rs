//! doors CLI - inspect configured oceanographic feature collections.

use clap::Parser;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "doors-cli",
    version,
    about = "Feature collection inspector for the Black Sea dashboard"
)]
struct Cli {
    /// Dashboard configuration (JSON)
    #[arg(short, long)]
    config: PathBuf,

    #[command(subcommand)]
    command: doors_cmd::Command,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    doors_cmd::run(&cli.config, cli.command)
}
