use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use atelier_core::config::{AppConfig, LoadOptions};
use toml::Value;

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let entries: &[(&str, Option<&str>, String)] = &[
        ("database.url", Some("ATELIER_DATABASE_URL"), config.database.url.clone()),
        (
            "database.max_connections",
            Some("ATELIER_DATABASE_MAX_CONNECTIONS"),
            config.database.max_connections.to_string(),
        ),
        (
            "database.timeout_secs",
            Some("ATELIER_DATABASE_TIMEOUT_SECS"),
            config.database.timeout_secs.to_string(),
        ),
        (
            "server.bind_address",
            Some("ATELIER_SERVER_BIND_ADDRESS"),
            config.server.bind_address.clone(),
        ),
        ("server.port", Some("ATELIER_SERVER_PORT"), config.server.port.to_string()),
        (
            "server.graceful_shutdown_secs",
            Some("ATELIER_SERVER_GRACEFUL_SHUTDOWN_SECS"),
            config.server.graceful_shutdown_secs.to_string(),
        ),
        ("logging.level", Some("ATELIER_LOG_LEVEL"), config.logging.level.clone()),
        ("logging.format", Some("ATELIER_LOG_FORMAT"), format!("{:?}", config.logging.format)),
    ];

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for (key, env_key, value) in entries {
        lines.push(render_line(
            key,
            value,
            field_source(key, *env_key, config_file_doc.as_ref(), config_file_path.as_deref()),
        ));
    }

    lines.join("\n")
}

fn detect_config_path() -> Option<PathBuf> {
    let root = PathBuf::from("atelier.toml");
    if root.exists() {
        return Some(root);
    }

    let nested = PathBuf::from("config/atelier.toml");
    if nested.exists() {
        return Some(nested);
    }

    None
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_key: Option<&str>,
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_key {
        if env::var_os(env_key).is_some() {
            return format!("env ({env_key})");
        }
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

#[cfg(test)]
mod tests {
    use toml::Value;

    use super::contains_path;

    #[test]
    fn contains_path_walks_nested_tables() {
        let doc: Value = r#"
[database]
url = "sqlite://from-file.db"
"#
        .parse()
        .expect("parse toml");

        assert!(contains_path(&doc, "database.url"));
        assert!(!contains_path(&doc, "database.max_connections"));
        assert!(!contains_path(&doc, "server.port"));
    }
}
