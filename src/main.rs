// SPDX-License-Identifier: Apache-2.0
mod cli;

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

use agentforge_mcp::{EnvTokenSource, McpClient, McpTransport};
use agentforge_orchestrator::Orchestrator;
use agentforge_store::{InMemoryStore, Store};
use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::ShowConfig => {
            let config = agentforge_config::load(cli.config.as_deref())?;
            println!("{}", serde_yaml::to_string(&config).unwrap_or_default());
            Ok(())
        }
        Commands::Serve { in_memory } => {
            let mut config = agentforge_config::load(cli.config.as_deref())?;
            if in_memory {
                config.store.in_memory = true;
            }
            serve(config).await
        }
    }
}

/// Wires the persistence port, MCP transport, model provider, and
/// orchestrator from config, then hands the result to the gateway's `run`
/// loop — the single top-level function that owns every long-lived service
/// instance for the process.
async fn serve(config: agentforge_config::Config) -> anyhow::Result<()> {
    if !config.store.in_memory {
        anyhow::bail!(
            "no external persistence backend is configured in this core; pass \
             --in-memory or set store.in_memory: true"
        );
    }
    let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());

    let mcp: Arc<dyn McpClient> = Arc::new(build_mcp_transport(&config.mcp)?);
    // Populate the discovery cache before accepting traffic so the first
    // plan's tool calls don't pay a cold-cache round trip.
    if let Err(err) = mcp.discover().await {
        tracing::warn!(%err, "initial MCP tool discovery failed; will retry lazily");
    }

    let provider = Arc::from(agentforge_model::from_config(&config.model)?);

    let (orchestrator, handle) = Orchestrator::new(
        Arc::clone(&store),
        Arc::clone(&mcp),
        provider,
        config.orchestrator.clone(),
        config.model.clone(),
    );
    let orchestrator_task = tokio::spawn(orchestrator.run());

    let blob_dir = default_blob_dir();
    tokio::fs::create_dir_all(&blob_dir)
        .await
        .with_context(|| format!("creating blob directory {}", blob_dir.display()))?;

    agentforge_gateway::run(config.gateway, store, handle, blob_dir).await?;

    orchestrator_task.abort();
    Ok(())
}

fn build_mcp_transport(cfg: &agentforge_config::McpConfig) -> anyhow::Result<McpTransport> {
    let auth = if cfg.auth_enabled {
        let var = cfg
            .auth_token_env
            .as_deref()
            .context("mcp.auth_enabled is true but mcp.auth_token_env is unset")?;
        Some(Arc::new(EnvTokenSource::from_env(var)?) as Arc<dyn agentforge_mcp::AuthTokenSource>)
    } else {
        None
    };
    Ok(McpTransport::new(cfg.server_url.clone(), cfg.max_inflight, auth))
}

fn default_blob_dir() -> std::path::PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join(".local/share/agentforge/blobs")
}

/// This core has no terminal UI, so stderr is always safe to write to.
fn init_logging(verbosity: u8) {
    let default_level = match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(filter)
        .try_init();
}
