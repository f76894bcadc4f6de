//! Verify command - decode a cache file completely and check its references.

use anyhow::{Context, Result};
use clap::Args;
use heron_bytecode::Program;
use std::path::PathBuf;

use super::load_program;
use crate::config::Config;

#[derive(Args)]
pub struct VerifyCommand {
    /// Cache file, or a key in the cache directory
    pub file: PathBuf,

    /// Expected format version (defaults to the configured one)
    #[arg(long = "format-version", value_name = "N")]
    pub format_version: Option<u16>,
}

impl VerifyCommand {
    pub fn run(&self, config: &Config) -> Result<()> {
        let (path, program) = load_program(config, &self.file, self.format_version)?;
        program
            .check_references()
            .with_context(|| format!("{} has broken references", path.display()))?;

        let stats = Stats::of(&program);
        println!(
            "ok: {} ({} functions, {} instructions, {} constants)",
            path.display(),
            stats.functions,
            stats.instructions,
            stats.constants
        );

        Ok(())
    }
}

/// Totals over a program and all its nested functions
#[derive(Debug, Default, PartialEq, Eq)]
struct Stats {
    functions: usize,
    instructions: usize,
    constants: usize,
}

impl Stats {
    fn of(program: &Program) -> Self {
        let mut stats = Self::default();
        stats.add(program);
        stats
    }

    fn add(&mut self, program: &Program) {
        self.functions += 1;
        self.instructions += program.code.len();
        self.constants += program.constants.len();
        for nested in program.nested_functions() {
            self.add(nested);
        }
    }
}
