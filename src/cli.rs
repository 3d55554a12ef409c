// SPDX-License-Identifier: Apache-2.0
use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Multi-agent plan orchestration core.
///
/// The CLI surface is intentionally thin: a single `serve` command boots
/// the gateway, orchestrator, MCP transport, and persistence layer from a
/// config file. Everything else about how plans are created and driven
/// happens over the gateway's HTTP + WebSocket surface, not here.
#[derive(Parser, Debug)]
#[command(name = "agentforge", version, about)]
pub struct Cli {
    /// Path to a YAML config file, applied last over any discovered layer
    /// (see `agentforge_config::load`).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace). Respects `RUST_LOG`
    /// when set, which always takes precedence.
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the session gateway, orchestrator, and MCP transport.
    Serve {
        /// Force the in-memory persistence fallback regardless of config.
        #[arg(long)]
        in_memory: bool,
    },
    /// Print the fully-merged configuration (all layers applied) as YAML.
    ShowConfig,
}
