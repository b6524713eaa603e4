use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use rise_core::config::{AppConfig, LoadOptions};
use toml::Value;

/// Renders the effective configuration with the source of every value. Secrets are redacted.
pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for (key, value, env_keys) in entries(&config) {
        let source =
            field_source(key, env_keys, config_file_doc.as_ref(), config_file_path.as_deref());
        lines.push(render_line(key, &value, source));
    }
    lines.join("\n")
}

type Entry = (&'static str, String, &'static [&'static str]);

fn entry(key: &'static str, value: String, env_keys: &'static [&'static str]) -> Entry {
    (key, value, env_keys)
}

fn entries(config: &AppConfig) -> Vec<Entry> {
    vec![
        entry("database.url", config.database.url.clone(), &["RISE_DATABASE_URL", "DATABASE_URL"]),
        entry(
            "database.max_connections",
            config.database.max_connections.to_string(),
            &["RISE_DATABASE_MAX_CONNECTIONS"],
        ),
        entry(
            "database.timeout_secs",
            config.database.timeout_secs.to_string(),
            &["RISE_DATABASE_TIMEOUT_SECS"],
        ),
        entry("llm.provider", format!("{:?}", config.llm.provider), &["RISE_LLM_PROVIDER"]),
        entry("llm.model", config.llm.model.clone(), &["RISE_LLM_MODEL"]),
        entry(
            "llm.embedding_model",
            config.llm.embedding_model.clone(),
            &["RISE_LLM_EMBEDDING_MODEL"],
        ),
        entry(
            "llm.base_url",
            config.llm.base_url.clone().unwrap_or_else(|| "<unset>".to_string()),
            &["RISE_LLM_BASE_URL"],
        ),
        entry("llm.api_key", redact(config.llm.api_key.is_some()), &["RISE_LLM_API_KEY", "OPENAI_API_KEY"]),
        entry("llm.temperature", config.llm.temperature.to_string(), &["RISE_LLM_TEMPERATURE"]),
        entry("llm.max_retries", config.llm.max_retries.to_string(), &["RISE_LLM_MAX_RETRIES"]),
        entry("vector_store.url", config.vector_store.url.clone(), &["RISE_VECTOR_STORE_URL", "QDRANT_URL"]),
        entry(
            "vector_store.api_key",
            redact(config.vector_store.api_key.is_some()),
            &["RISE_VECTOR_STORE_API_KEY", "QDRANT_API_KEY"],
        ),
        entry(
            "vector_store.collection",
            config.vector_store.collection_name(&config.agent).to_string(),
            &["RISE_VECTOR_STORE_COLLECTION"],
        ),
        entry("vector_store.top_k", config.vector_store.top_k.to_string(), &["RISE_VECTOR_STORE_TOP_K"]),
        entry("agent.name", config.agent.name.clone(), &["RISE_AGENT_NAME"]),
        entry(
            "agent.prompt_path",
            config
                .agent
                .prompt_path
                .as_ref()
                .map_or_else(|| "<built-in>".to_string(), |path| path.display().to_string()),
            &["RISE_AGENT_PROMPT_PATH"],
        ),
        entry(
            "agent.max_tool_rounds",
            config.agent.max_tool_rounds.to_string(),
            &["RISE_AGENT_MAX_TOOL_ROUNDS"],
        ),
        entry("server.bind_address", config.server.bind_address.clone(), &["RISE_SERVER_BIND_ADDRESS"]),
        entry("server.port", config.server.port.to_string(), &["RISE_SERVER_PORT"]),
        entry(
            "server.allowed_origins",
            if config.server.allowed_origins.is_empty() {
                "*".to_string()
            } else {
                config.server.allowed_origins.join(",")
            },
            &["RISE_SERVER_ALLOWED_ORIGINS"],
        ),
        entry(
            "negotiation.default_flexibility",
            config.negotiation.default_flexibility.to_string(),
            &["RISE_NEGOTIATION_DEFAULT_FLEXIBILITY"],
        ),
        entry("logging.level", config.logging.level.clone(), &["RISE_LOGGING_LEVEL", "RISE_LOG_LEVEL"]),
        entry(
            "logging.format",
            format!("{:?}", config.logging.format),
            &["RISE_LOGGING_FORMAT", "RISE_LOG_FORMAT"],
        ),
    ]
}

fn redact(present: bool) -> String {
    let shown = if present { "<redacted>" } else { "<unset>" };
    shown.to_string()
}

fn detect_config_path() -> Option<PathBuf> {
    ["rise.toml", "config/rise.toml"].into_iter().map(PathBuf::from).find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    toml::from_str::<Value>(&raw).ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}
