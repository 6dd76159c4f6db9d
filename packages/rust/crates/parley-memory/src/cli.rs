use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub(crate) const DEFAULT_SESSION_ID: &str = "default";

#[derive(Parser)]
#[command(name = "parley")]
#[command(about = "Tiered conversation memory: bounded window, durable turn log, rolling summaries.")]
pub(crate) struct Cli {
    /// Override config directory (user settings at `<conf>/parley/settings.yaml`).
    #[arg(long, global = true)]
    pub(crate) conf: Option<PathBuf>,

    #[command(subcommand)]
    pub(crate) command: Command,
}

#[derive(Subcommand)]
pub(crate) enum Command {
    /// Interactive loop: each line is a user turn; `/agent <text>`, `/context`,
    /// `/history [n]`, `/info`, `/clear`, `/quit`.
    Repl {
        #[arg(long, default_value = DEFAULT_SESSION_ID)]
        session_id: String,
    },
    /// Append one turn (state outlives the process only with the Valkey backend).
    Append {
        #[arg(long, default_value = DEFAULT_SESSION_ID)]
        session_id: String,

        /// `user` or `agent`.
        #[arg(long, default_value = "user")]
        role: String,

        /// Metadata entries as `key=value`; repeatable.
        #[arg(long = "meta", value_parser = parse_key_value)]
        metadata: Vec<(String, String)>,

        text: String,
    },
    /// Print summary and recent turns as JSON.
    Context {
        #[arg(long, default_value = DEFAULT_SESSION_ID)]
        session_id: String,

        /// Print rendered chat messages instead of the raw context.
        #[arg(long)]
        messages: bool,
    },
    /// Print the newest turns from the durable log as JSON.
    History {
        #[arg(long, default_value = DEFAULT_SESSION_ID)]
        session_id: String,

        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Delete all memory for a session.
    Clear {
        #[arg(long, default_value = DEFAULT_SESSION_ID)]
        session_id: String,
    },
    /// Print window/log/summary state as JSON.
    Info {
        #[arg(long, default_value = DEFAULT_SESSION_ID)]
        session_id: String,
    },
}

fn parse_key_value(raw: &str) -> Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got `{raw}`"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty metadata key in `{raw}`"));
    }
    Ok((key.to_string(), value.trim().to_string()))
}
