mod cli;
mod commands;

use anyhow::Result;
use clap::Parser;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = cli::Cli::parse();
    let options = cli.scene_options();

    match cli.command {
        cli::Command::Inspect { file } => commands::inspect::run(file, options).await,
        cli::Command::Tables { file, table } => commands::tables::run(file, table).await,
        cli::Command::Node { file, node } => commands::node::run(file, node, options).await,
    }
}
