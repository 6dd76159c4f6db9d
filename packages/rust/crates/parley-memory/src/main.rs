//! parley CLI: memory REPL and one-shot session commands.
//!
//! Logging: set `RUST_LOG=parley_memory=debug` to see memory events on stderr.

mod cli;
mod repl;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use parley_memory::{
    MemoryConfig, MemoryCoordinator, Role, TurnMetadata, load_runtime_settings,
    set_config_home_override,
};

use crate::cli::{Cli, Command};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    if let Some(conf_dir) = cli.conf.clone() {
        set_config_home_override(conf_dir);
    }
    let runtime_settings = load_runtime_settings();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("parley_memory=info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();

    let config = MemoryConfig::from_settings(&runtime_settings)
        .context("failed to resolve memory settings")?;
    let sweep_interval = config.idle_sweep_interval;
    let memory = MemoryCoordinator::from_config(config).context("failed to build memory backends")?;
    let sweeper = sweep_interval.map(|interval| memory.spawn_idle_sweeper(interval));

    let outcome = run_command(&memory, cli.command).await;
    if let Some(sweeper) = sweeper {
        sweeper.abort();
    }
    outcome
}

async fn run_command(memory: &MemoryCoordinator, command: Command) -> Result<()> {
    match command {
        Command::Repl { session_id } => repl::run_repl(memory.clone(), session_id).await,
        Command::Append {
            session_id,
            role,
            metadata,
            text,
        } => {
            let role: Role = role.parse().map_err(anyhow::Error::msg)?;
            let metadata: TurnMetadata = metadata.into_iter().collect();
            let turn = memory.append(&session_id, role, &text, metadata).await?;
            if let Err(error) = memory.settle(&session_id).await {
                tracing::warn!(session_id = %session_id, error = %error, "summarization failed");
            }
            println!("{}", serde_json::to_string_pretty(&turn)?);
            Ok(())
        }
        Command::Context {
            session_id,
            messages,
        } => {
            let context = memory.get_context(&session_id).await?;
            if messages {
                println!("{}", serde_json::to_string_pretty(&context.to_messages())?);
            } else {
                println!("{}", serde_json::to_string_pretty(&context)?);
            }
            Ok(())
        }
        Command::History { session_id, limit } => {
            let turns = memory.get_history(&session_id, limit).await?;
            println!("{}", serde_json::to_string_pretty(&turns)?);
            Ok(())
        }
        Command::Clear { session_id } => {
            memory.clear(&session_id).await?;
            println!("cleared session {session_id}");
            Ok(())
        }
        Command::Info { session_id } => {
            let info = memory.session_info(&session_id).await?;
            println!("{}", serde_json::to_string_pretty(&info)?);
            Ok(())
        }
    }
}
