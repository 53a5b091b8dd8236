// Configuration stored in .ai/config.json

use crate::storage::{self, StorageError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_MODEL: &str = "gemini/gemini-1.5-pro";
const CONFIG_FILE: &str = "config.json";

/// Environment variables tried when no explicit key variable is configured.
const FALLBACK_KEY_VARS: &[&str] = &[
    "GEMINI_API_KEY",
    "GOOGLE_API_KEY",
    "OPENAI_API_KEY",
    "ANTHROPIC_API_KEY",
];

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TraceConfig {
    pub model: String,
    /// Name of the environment variable holding the API key.
    pub api_key_env: String,
    pub max_evidence_lines: usize,
    pub max_context_chars: usize,
    pub max_diff_chars: usize,
}

impl Default for TraceConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            api_key_env: String::new(),
            max_evidence_lines: 200,
            max_context_chars: 10_000,
            max_diff_chars: 50_000,
        }
    }
}

impl TraceConfig {
    /// Resolve the API key from the configured environment variable, falling
    /// back to the common provider variables.
    pub fn get_api_key(&self) -> Option<String> {
        if !self.api_key_env.is_empty() {
            return std::env::var(&self.api_key_env).ok();
        }

        for var in FALLBACK_KEY_VARS {
            if let Ok(key) = std::env::var(var) {
                if !key.is_empty() {
                    return Some(key);
                }
            }
        }

        None
    }
}

pub fn get_config_path(base_path: Option<&Path>) -> PathBuf {
    storage::get_ai_directory(base_path).join(CONFIG_FILE)
}

/// Load configuration, returning defaults when the file is missing or
/// cannot be parsed.
pub fn load_config(base_path: Option<&Path>) -> TraceConfig {
    let config_path = get_config_path(base_path);

    let Ok(body) = fs::read_to_string(&config_path) else {
        return TraceConfig::default();
    };

    match serde_json::from_str(&body) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("Warning: could not load config: {}", err);
            TraceConfig::default()
        }
    }
}

pub fn save_config(config: &TraceConfig, base_path: Option<&Path>) -> Result<PathBuf, StorageError> {
    storage::initialize_storage(base_path)?;
    let config_path = get_config_path(base_path);

    let body = serde_json::to_string_pretty(config)?;
    fs::write(&config_path, body).map_err(StorageError::Write)?;

    Ok(config_path)
}

/// Update specific configuration values and persist the result.
pub fn update_config(
    model: Option<&str>,
    api_key_env: Option<&str>,
    base_path: Option<&Path>,
) -> Result<TraceConfig, StorageError> {
    let mut config = load_config(base_path);

    if let Some(model) = model {
        config.model = model.to_string();
    }
    if let Some(api_key_env) = api_key_env {
        config.api_key_env = api_key_env.to_string();
    }

    save_config(&config, base_path)?;
    Ok(config)
}
