use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use platter_core::config::{AppConfig, LoadOptions, DEFAULT_CONFIG_FILE};
use secrecy::ExposeSecret;
use toml::Value;

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());
    let source = |key_path: &str, env_keys: &[&str]| {
        field_source(key_path, env_keys, config_file_doc.as_ref(), config_file_path.as_deref())
    };

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];

    lines.push(render_line(
        "api.base_url",
        &config.api.base_url,
        source("api.base_url", &["PLATTER_API_BASE_URL"]),
    ));
    lines.push(render_line(
        "api.timeout_secs",
        &config.api.timeout_secs.to_string(),
        source("api.timeout_secs", &["PLATTER_API_TIMEOUT_SECS"]),
    ));
    lines.push(render_line(
        "api.auth_token",
        &redact_token(config.api.auth_token.expose_secret()),
        source("api.auth_token", &["PLATTER_API_AUTH_TOKEN"]),
    ));

    lines.push(render_line(
        "storefront.store_id",
        &config.storefront.store_id,
        source("storefront.store_id", &["PLATTER_STOREFRONT_STORE_ID"]),
    ));
    lines.push(render_line(
        "storefront.currency",
        &config.storefront.currency,
        source("storefront.currency", &["PLATTER_STOREFRONT_CURRENCY"]),
    ));

    lines.push(render_line(
        "logging.level",
        &config.logging.level,
        source("logging.level", &["PLATTER_LOGGING_LEVEL", "PLATTER_LOG_LEVEL"]),
    ));
    lines.push(render_line(
        "logging.format",
        config.logging.format.as_str(),
        source("logging.format", &["PLATTER_LOGGING_FORMAT", "PLATTER_LOG_FORMAT"]),
    ));

    lines.join("\n")
}

fn detect_config_path() -> Option<PathBuf> {
    [PathBuf::from(DEFAULT_CONFIG_FILE), PathBuf::from("config/platter.toml")]
        .into_iter()
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

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

fn redact_token(token: &str) -> String {
    let trimmed = token.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    match trimmed.char_indices().nth(4) {
        Some((cut, _)) if trimmed.len() > 8 => format!("{}***", &trimmed[..cut]),
        _ => "<redacted>".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::redact_token;

    #[test]
    fn tokens_keep_only_a_short_prefix() {
        assert_eq!(redact_token(""), "<empty>");
        assert_eq!(redact_token("short"), "<redacted>");
        assert_eq!(redact_token("sk-live-0123456789"), "sk-l***");
    }
}
