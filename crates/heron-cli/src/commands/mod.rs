//! CLI command implementations.

pub mod dump;
pub mod header;
pub mod inspect;
pub mod verify;

use anyhow::{Context, Result};
use heron_bytecode::{Program, read_program};
use std::path::{Path, PathBuf};

use crate::config::Config;

/// Read and fully decode a cache file.
///
/// `format_version` overrides the version from the config.
pub(crate) fn load_program(
    config: &Config,
    file: &Path,
    format_version: Option<u16>,
) -> Result<(PathBuf, Program)> {
    let path = config.cache.resolve(file);
    let version = format_version.unwrap_or(config.cache.format_version);
    let bytes =
        std::fs::read(&path).with_context(|| format!("Failed to read {}", path.display()))?;
    let program = read_program(&bytes, version)
        .with_context(|| format!("Failed to decode {}", path.display()))?;
    tracing::debug!(path = %path.display(), version, "decoded cache file");
    Ok((path, program))
}
