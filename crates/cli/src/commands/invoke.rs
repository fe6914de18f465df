//! `foreman invoke`: Run one invocation from the terminal.

use std::io::Write;
use std::path::{Path, PathBuf};

use foreman_agent::{InvocationContext, Invoker, RelayEvent};
use foreman_config::AppConfig;
use foreman_core::message::{HistoryMessage, InvocationRequest};
use futures::StreamExt;
use serde::Deserialize;

/// History files hold either a bare array or a full request body.
#[derive(Deserialize)]
#[serde(untagged)]
enum HistoryFile {
    Messages(Vec<HistoryMessage>),
    Request { messages: Vec<HistoryMessage> },
}

pub fn read_history(path: &Path) -> Result<Vec<HistoryMessage>, Box<dyn std::error::Error>> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| format!("Failed to read {}: {e}", path.display()))?;
    let file: HistoryFile = serde_json::from_str(&text)
        .map_err(|e| format!("Invalid history in {}: {e}", path.display()))?;
    Ok(match file {
        HistoryFile::Messages(messages) | HistoryFile::Request { messages } => messages,
    })
}

pub async fn run(
    config: AppConfig,
    prompt: String,
    history: Option<PathBuf>,
    session_id: Option<String>,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let messages = match history {
        Some(path) => read_history(&path)?,
        None => Vec::new(),
    };

    let invoker = Invoker::from_config(&config);
    let request = InvocationRequest { prompt, messages };
    let mut events = invoker.invoke(request, InvocationContext::new(session_id)).await;

    let mut stdout = std::io::stdout();
    let mut failure = None;
    while let Some(event) = events.next().await {
        if json {
            println!("{}", event.to_sse_data());
            if let RelayEvent::Error { message } = event {
                failure = Some(message);
            }
            continue;
        }

        match event {
            RelayEvent::Text { data } => {
                print!("{data}");
                stdout.flush()?;
            }
            RelayEvent::ToolUse { name } => eprintln!("\n  [tool] {name}"),
            RelayEvent::Error { message } => failure = Some(message),
        }
    }

    if !json {
        println!();
    }

    match failure {
        Some(message) => Err(format!("Generation failed: {message}").into()),
        None => Ok(()),
    }
}
