use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::filter::EnvFilter;

mod commands;
mod config;

use commands::{
    dump::DumpCommand, header::HeaderCommand, inspect::InspectCommand, verify::VerifyCommand,
};

#[derive(Parser)]
#[command(name = "heron", version, about = "Heron program cache tools")]
struct Cli {
    /// Config file (defaults to the nearest heron.toml)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the magic number and format version of a cache file
    Header(HeaderCommand),
    /// Decode a cache file and check its references
    Verify(VerifyCommand),
    /// Print a disassembly (or JSON) of a cache file
    Dump(DumpCommand),
    /// Serve a cache file over the inspector protocol until Ctrl-C
    Inspect(InspectCommand),
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = config::load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Header(cmd) => cmd.run(&config)?,
        Commands::Verify(cmd) => cmd.run(&config)?,
        Commands::Dump(cmd) => cmd.run(&config)?,
        Commands::Inspect(cmd) => cmd.run(&config).await?,
    }

    Ok(())
}
