use std::env;
use std::fs;
use std::path::Path;

use brokerflow_core::config::{resolve_config_path, AppConfig, LoadOptions};
use toml::Value;

struct FieldLine {
    key: &'static str,
    value: String,
    env_key: &'static str,
}

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = resolve_config_path(None);
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines =
        vec!["effective config (source precedence: env > file > default):".to_string()];
    for field in fields(&config) {
        let source = field_source(
            field.key,
            Some(field.env_key),
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        );
        lines.push(render_line(field.key, &field.value, source));
    }

    lines.join("\n")
}

fn fields(config: &AppConfig) -> Vec<FieldLine> {
    vec![
        FieldLine {
            key: "database.url",
            value: config.database.url.clone(),
            env_key: "BROKERFLOW_DATABASE_URL",
        },
        FieldLine {
            key: "database.max_connections",
            value: config.database.max_connections.to_string(),
            env_key: "BROKERFLOW_DATABASE_MAX_CONNECTIONS",
        },
        FieldLine {
            key: "database.timeout_secs",
            value: config.database.timeout_secs.to_string(),
            env_key: "BROKERFLOW_DATABASE_TIMEOUT_SECS",
        },
        FieldLine {
            key: "workflow.persistence_enabled",
            value: config.workflow.persistence_enabled.to_string(),
            env_key: "BROKERFLOW_WORKFLOW_PERSISTENCE_ENABLED",
        },
        FieldLine {
            key: "workflow.checklist_threshold_pct",
            value: config.workflow.checklist_threshold_pct.to_string(),
            env_key: "BROKERFLOW_WORKFLOW_CHECKLIST_THRESHOLD_PCT",
        },
        FieldLine {
            key: "logging.level",
            value: config.logging.level.clone(),
            env_key: "BROKERFLOW_LOGGING_LEVEL",
        },
        FieldLine {
            key: "logging.format",
            value: format!("{:?}", config.logging.format),
            env_key: "BROKERFLOW_LOGGING_FORMAT",
        },
    ]
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

    use super::{contains_path, field_source};

    #[test]
    fn file_source_is_reported_for_nested_keys() {
        let doc = "[workflow]\nchecklist_threshold_pct = \"80\"\n"
            .parse::<Value>()
            .expect("valid toml");

        assert!(contains_path(&doc, "workflow.checklist_threshold_pct"));
        assert!(!contains_path(&doc, "workflow.persistence_enabled"));
        assert_eq!(
            field_source("workflow.checklist_threshold_pct", None, Some(&doc), None),
            "file (config file)"
        );
        assert_eq!(field_source("logging.level", None, Some(&doc), None), "default");
    }
}
