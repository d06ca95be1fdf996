use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use caseflow_core::config::{AppConfig, LoadOptions};
use serde::Serialize;
use toml::Value;

use crate::commands::CommandResult;

#[derive(Debug, Serialize)]
struct ConfigEntry {
    key: &'static str,
    value: String,
    source: String,
}

/// Effective configuration with the source each value came from.
pub fn run() -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "config",
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            )
        }
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());
    let entry = |key: &'static str, value: String, env_keys: &[&str]| ConfigEntry {
        key,
        value,
        source: field_source(key, env_keys, config_file_doc.as_ref(), config_file_path.as_deref()),
    };

    let entries = vec![
        entry("database.url", config.database.url.clone(), &["CASEFLOW_DATABASE_URL"]),
        entry(
            "database.max_connections",
            config.database.max_connections.to_string(),
            &["CASEFLOW_DATABASE_MAX_CONNECTIONS"],
        ),
        entry(
            "database.timeout_secs",
            config.database.timeout_secs.to_string(),
            &["CASEFLOW_DATABASE_TIMEOUT_SECS"],
        ),
        entry(
            "logging.level",
            config.logging.level.clone(),
            &["CASEFLOW_LOGGING_LEVEL", "CASEFLOW_LOG_LEVEL"],
        ),
        entry(
            "logging.format",
            format!("{:?}", config.logging.format),
            &["CASEFLOW_LOGGING_FORMAT", "CASEFLOW_LOG_FORMAT"],
        ),
        entry(
            "catalog.min_states",
            config.catalog.min_states.to_string(),
            &["CASEFLOW_CATALOG_MIN_STATES"],
        ),
    ];

    match serde_json::to_value(&entries) {
        Ok(detail) => CommandResult::success_with_detail(
            "config",
            "effective config (source precedence: env > file > default)",
            serde_json::json!({ "entries": detail }),
        ),
        Err(error) => CommandResult::failure("config", "serialization", error.to_string(), 3),
    }
}

fn detect_config_path() -> Option<PathBuf> {
    ["caseflow.toml", "config/caseflow.toml"]
        .into_iter()
        .map(PathBuf::from)
        .find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
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
