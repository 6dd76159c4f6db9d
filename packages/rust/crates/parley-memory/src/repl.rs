//! Stdin loop over one session.

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, BufReader};

use parley_memory::{MemoryCoordinator, Role, TurnMetadata};

/// Read lines until EOF, `/quit` or Ctrl+C. Pending summarization is settled on exit.
pub(crate) async fn run_repl(memory: MemoryCoordinator, session_id: String) -> Result<()> {
    let mut reader = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            line = reader.next_line() => line?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if !handle_line(&memory, &session_id, line).await? {
            break;
        }
    }
    if let Err(error) = memory.settle(&session_id).await {
        tracing::warn!(session_id = %session_id, error = %error, "final summarization failed");
    }
    Ok(())
}

async fn handle_line(memory: &MemoryCoordinator, session_id: &str, line: &str) -> Result<bool> {
    let (command, rest) = match line.split_once(char::is_whitespace) {
        Some((command, rest)) => (command, rest.trim()),
        None => (line, ""),
    };
    match command {
        "/quit" | "/exit" => return Ok(false),
        "/agent" => {
            if rest.is_empty() {
                println!("usage: /agent <text>");
            } else {
                report_append(memory, session_id, Role::Agent, rest).await;
            }
        }
        "/context" => match memory.get_context(session_id).await {
            Ok(context) => {
                for message in context.to_messages() {
                    println!("{}: {}", message.role, message.content);
                }
                if context.stale {
                    println!("(stale: some backends were unavailable)");
                }
            }
            Err(error) => println!("error: {error}"),
        },
        "/history" => {
            let limit = rest.parse().unwrap_or(20);
            match memory.get_history(session_id, limit).await {
                Ok(turns) => {
                    for turn in turns {
                        println!("#{} {}: {}", turn.sequence, turn.role, turn.text);
                    }
                }
                Err(error) => println!("error: {error}"),
            }
        }
        "/info" => match memory.session_info(session_id).await {
            Ok(info) => println!("{}", serde_json::to_string_pretty(&info)?),
            Err(error) => println!("error: {error}"),
        },
        "/clear" => match memory.clear(session_id).await {
            Ok(()) => println!("cleared"),
            Err(error) => println!("error: {error}"),
        },
        _ => report_append(memory, session_id, Role::User, line).await,
    }
    Ok(true)
}

async fn report_append(memory: &MemoryCoordinator, session_id: &str, role: Role, text: &str) {
    match memory
        .append(session_id, role, text, TurnMetadata::new())
        .await
    {
        Ok(turn) => println!("#{} {}", turn.sequence, turn.role),
        Err(error) => println!("error: {error}"),
    }
}
