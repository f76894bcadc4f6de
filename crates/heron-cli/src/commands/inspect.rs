//! Inspect command - serve a cached program over the inspector protocol.

use anyhow::{Context, Result};
use clap::Args;
use heron_inspector::{DebugSession, DetachedHost, InspectorConfig, InspectorServer};
use std::path::PathBuf;

use super::load_program;
use crate::config::Config;

#[derive(Args)]
pub struct InspectCommand {
    /// Cache file, or a key in the cache directory
    pub file: PathBuf,

    /// Listener host (defaults to the configured one)
    #[arg(long)]
    pub host: Option<String>,

    /// Listener port, 0 for any free port (defaults to the configured one)
    #[arg(long)]
    pub port: Option<u16>,

    /// Expected format version (defaults to the configured one)
    #[arg(long = "format-version", value_name = "N")]
    pub format_version: Option<u16>,
}

impl InspectCommand {
    pub async fn run(&self, config: &Config) -> Result<()> {
        let (path, program) = load_program(config, &self.file, self.format_version)?;

        let mut listener = InspectorConfig::from(&config.inspector);
        if let Some(host) = &self.host {
            listener.host = host.clone();
        }
        if let Some(port) = self.port {
            listener.port = port;
        }

        let mut session = DebugSession::new(DetachedHost);
        let script_id = session.register_program(&program);

        let mut server = InspectorServer::start(listener, session.shared())
            .await
            .context("Failed to start inspector")?;
        println!(
            "Inspecting {} as script {} on http://{}/",
            path.display(),
            script_id,
            server.local_addr()
        );
        println!("Press Ctrl-C to stop.");

        tokio::signal::ctrl_c()
            .await
            .context("Failed to listen for Ctrl-C")?;
        server.stop()?;

        Ok(())
    }
}
