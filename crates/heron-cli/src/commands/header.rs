//! Header command - print the magic number and format version of a cache file.

use anyhow::{Context, Result};
use clap::Args;
use heron_bytecode::read_header;
use std::path::PathBuf;

use crate::config::Config;

#[derive(Args)]
pub struct HeaderCommand {
    /// Cache file, or a key in the cache directory
    pub file: PathBuf,
}

impl HeaderCommand {
    pub fn run(&self, config: &Config) -> Result<()> {
        let path = config.cache.resolve(&self.file);
        let bytes =
            std::fs::read(&path).with_context(|| format!("Failed to read {}", path.display()))?;
        let header = read_header(&bytes)
            .with_context(|| format!("Failed to read header of {}", path.display()))?;

        let current = if header.version == config.cache.format_version {
            "current"
        } else {
            "stale"
        };
        println!("file:    {}", path.display());
        println!("magic:   {:#010x}", header.magic);
        println!(
            "version: {} ({current}, expecting {})",
            header.version, config.cache.format_version
        );

        Ok(())
    }
}
