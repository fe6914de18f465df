//! Instruction text: the process-wide base and its per-invocation notices.
//!
//! The base text is parsed once from the packaged `prompt.yaml` (or
//! installed from a file at startup) and never changes afterwards. Each
//! invocation derives an owned copy with at most one notice appended.

use std::path::Path;
use std::sync::OnceLock;

use serde::Deserialize;
use tracing::error;

use crate::context::ContextOutcome;

const PACKAGED_PROMPT: &str = include_str!("../prompt.yaml");

static BASE_INSTRUCTION: OnceLock<String> = OnceLock::new();

/// Appended when the gateway is unusable but a snapshot was fetched.
pub const SNAPSHOT_NOTICE: &str = "\
## Live data unavailable

The live plant data tools could not be reached for this conversation. \
Answer data questions using only the snapshot below. It was captured by the \
plant backend and may be out of date: tell the user the figures come from a \
snapshot and may be stale.";

/// Appended when neither the gateway nor the snapshot is available.
pub const REFUSAL_NOTICE: &str = "\
## Plant data unavailable

Neither the live plant data tools nor the backup snapshot could be reached. \
Do not answer questions about equipment status, production metrics or any \
other plant data, and never guess or invent figures. Tell the user the data \
is temporarily unavailable and ask them to contact their system \
administrator. Questions that need no plant data can still be answered.";

#[derive(Debug, Deserialize)]
struct PromptFile {
    system_prompt: String,
}

/// Errors loading instruction text.
#[derive(Debug, thiserror::Error)]
pub enum PromptError {
    #[error("Failed to read prompt file: {0}")]
    Read(#[from] std::io::Error),

    #[error("Invalid prompt YAML: {0}")]
    Parse(#[from] serde_yaml::Error),
}

/// Extract `system_prompt` from a prompt YAML document.
pub fn parse_prompt_yaml(text: &str) -> Result<String, PromptError> {
    let file: PromptFile = serde_yaml::from_str(text)?;
    Ok(file.system_prompt.trim_end().to_string())
}

/// Read instruction text from disk. YAML files must carry a
/// `system_prompt` key; anything else is taken verbatim.
pub fn load_prompt_file(path: &Path) -> Result<String, PromptError> {
    let text = std::fs::read_to_string(path)?;
    match path.extension().and_then(|e| e.to_str()) {
        Some("yaml" | "yml") => parse_prompt_yaml(&text),
        _ => Ok(text.trim_end().to_string()),
    }
}

/// Install the base instruction before first use.
///
/// Returns `false` if the base was already initialized, in which case the
/// existing text is kept.
pub fn install_base_instruction(text: String) -> bool {
    BASE_INSTRUCTION.set(text).is_ok()
}

/// The process-wide base instruction.
pub fn base_instruction() -> &'static str {
    BASE_INSTRUCTION.get_or_init(|| {
        parse_prompt_yaml(PACKAGED_PROMPT).unwrap_or_else(|e| {
            error!(error = %e, "Packaged prompt is invalid, using it verbatim");
            PACKAGED_PROMPT.to_string()
        })
    })
}

/// Derive the instruction for one invocation.
///
/// Appends exactly one of: nothing, the snapshot notice with the snapshot
/// pretty-printed, or the refusal notice.
pub fn compose(base: &str, outcome: &ContextOutcome) -> String {
    match outcome {
        ContextOutcome::NotNeeded => base.to_string(),
        ContextOutcome::Snapshot(snapshot) => {
            let pretty = serde_json::to_string_pretty(snapshot)
                .unwrap_or_else(|_| snapshot.to_string());
            format!("{base}\n\n{SNAPSHOT_NOTICE}\n\n```json\n{pretty}\n```")
        }
        ContextOutcome::Unavailable => format!("{base}\n\n{REFUSAL_NOTICE}"),
    }
}
