use std::fs;
use std::path::PathBuf;

use rise_core::config::AgentConfig;
use thiserror::Error;

const DEFAULT_PROMPT: &str = "\
You are {agent}, the sales assistant of a car dealership. Help customers find a car and \
agree on a price.

Use the catalog tools to answer questions about the cars in stock. Never invent cars, \
prices or features that a tool did not return.

When a customer makes an offer, always call negotiate_price with the car id and the \
offer, then relay the outcome in a friendly tone. Never reveal the lowest price the \
dealership would accept unless the tool tells you to.

Use lookup_informations for questions about the dealership itself, such as opening \
hours, financing or warranties.

Keep answers short and conversational.";

#[derive(Debug, Error)]
pub enum PromptError {
    #[error("failed to read system prompt `{path}`: {source}")]
    Read { path: PathBuf, source: std::io::Error },
    #[error("system prompt `{0}` is empty")]
    Empty(PathBuf),
}

/// The system prompt from `prompt_path`, or the built-in prompt naming the agent.
pub fn load_system_prompt(config: &AgentConfig) -> Result<String, PromptError> {
    let Some(path) = &config.prompt_path else {
        return Ok(default_prompt(&config.name));
    };

    let text = fs::read_to_string(path)
        .map_err(|source| PromptError::Read { path: path.clone(), source })?;
    if text.trim().is_empty() {
        return Err(PromptError::Empty(path.clone()));
    }
    Ok(text.replace("{agent}", &config.name))
}

pub fn default_prompt(agent_name: &str) -> String {
    DEFAULT_PROMPT.replace("{agent}", agent_name)
}
