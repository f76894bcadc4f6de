//! Dump command - print a decoded cache file.

use anyhow::Result;
use clap::Args;
use std::path::PathBuf;

use super::load_program;
use crate::config::Config;

#[derive(Args)]
pub struct DumpCommand {
    /// Cache file, or a key in the cache directory
    pub file: PathBuf,

    /// Print the program as JSON instead of a disassembly
    #[arg(long)]
    pub json: bool,

    /// Expected format version (defaults to the configured one)
    #[arg(long = "format-version", value_name = "N")]
    pub format_version: Option<u16>,
}

impl DumpCommand {
    pub fn run(&self, config: &Config) -> Result<()> {
        let (_, program) = load_program(config, &self.file, self.format_version)?;

        if self.json {
            println!("{}", serde_json::to_string_pretty(&program)?);
        } else {
            println!("; source: {}", program.source.name());
            print!("{}", program.disassemble());
        }

        Ok(())
    }
}
