use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::workflow::gate::DEFAULT_CHECKLIST_THRESHOLD_PCT;

pub const CONFIG_FILE_NAME: &str = "brokerflow.toml";

#[derive(Clone, Debug, PartialEq)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub workflow: WorkflowConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug, PartialEq)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct WorkflowConfig {
    pub persistence_enabled: bool,
    pub checklist_threshold_pct: Decimal,
}

#[derive(Clone, Debug, PartialEq)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub log_format: Option<LogFormat>,
    pub persistence_enabled: Option<bool>,
    pub checklist_threshold_pct: Option<Decimal>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://brokerflow.db?mode=rwc".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            workflow: WorkflowConfig {
                persistence_enabled: true,
                checklist_threshold_pct: DEFAULT_CHECKLIST_THRESHOLD_PCT,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected =
                options.config_path.unwrap_or_else(|| PathBuf::from(CONFIG_FILE_NAME));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(workflow) = patch.workflow {
            if let Some(persistence_enabled) = workflow.persistence_enabled {
                self.workflow.persistence_enabled = persistence_enabled;
            }
            if let Some(checklist_threshold_pct) = workflow.checklist_threshold_pct {
                self.workflow.checklist_threshold_pct = checklist_threshold_pct;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("BROKERFLOW_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("BROKERFLOW_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections =
                parse_env("BROKERFLOW_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("BROKERFLOW_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_env("BROKERFLOW_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("BROKERFLOW_WORKFLOW_PERSISTENCE_ENABLED") {
            self.workflow.persistence_enabled =
                parse_env("BROKERFLOW_WORKFLOW_PERSISTENCE_ENABLED", &value)?;
        }
        if let Some(value) = read_env("BROKERFLOW_WORKFLOW_CHECKLIST_THRESHOLD_PCT") {
            self.workflow.checklist_threshold_pct =
                parse_env("BROKERFLOW_WORKFLOW_CHECKLIST_THRESHOLD_PCT", &value)?;
        }

        let log_level =
            read_env("BROKERFLOW_LOGGING_LEVEL").or_else(|| read_env("BROKERFLOW_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("BROKERFLOW_LOGGING_FORMAT").or_else(|| read_env("BROKERFLOW_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(log_format) = overrides.log_format {
            self.logging.format = log_format;
        }
        if let Some(persistence_enabled) = overrides.persistence_enabled {
            self.workflow.persistence_enabled = persistence_enabled;
        }
        if let Some(checklist_threshold_pct) = overrides.checklist_threshold_pct {
            self.workflow.checklist_threshold_pct = checklist_threshold_pct;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_workflow(&self.workflow)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

pub fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from(CONFIG_FILE_NAME), Path::new("config").join(CONFIG_FILE_NAME)]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_workflow(workflow: &WorkflowConfig) -> Result<(), ConfigError> {
    let pct = workflow.checklist_threshold_pct;
    if pct < Decimal::ZERO || pct > Decimal::ONE_HUNDRED {
        return Err(ConfigError::Validation(
            "workflow.checklist_threshold_pct must be in range 0..=100".to_string(),
        ));
    }
    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_env<T: FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse::<T>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    workflow: Option<WorkflowPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct WorkflowPatch {
    persistence_enabled: Option<bool>,
    checklist_threshold_pct: Option<Decimal>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;
    use std::io;
    use std::sync::{Mutex, OnceLock};

    use rust_decimal::Decimal;
    use tempfile::TempDir;

    use super::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat};

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    fn env_lock() -> &'static Mutex<()> {
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    fn clear_vars(vars: &[&str]) {
        for var in vars {
            env::remove_var(var);
        }
    }

    fn ensure(condition: bool, message: &'static str) -> Result<(), String> {
        if condition {
            Ok(())
        } else {
            Err(message.to_string())
        }
    }

    #[test]
    fn defaults_are_valid() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let config = AppConfig::load(LoadOptions::default())
            .map_err(|err| format!("config load failed: {err}"))?;

        ensure(config.workflow.persistence_enabled, "persistence should default to enabled")?;
        ensure(
            config.workflow.checklist_threshold_pct == Decimal::new(70, 0),
            "checklist threshold should default to 70%",
        )?;
        ensure(
            matches!(config.logging.format, LogFormat::Compact),
            "default logging format should be compact",
        )
    }

    #[test]
    fn file_load_supports_env_interpolation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TEST_BROKERFLOW_DB", "sqlite://from-env-interpolation.db");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("brokerflow.toml");
            fs::write(
                &path,
                r#"
[database]
url = "${TEST_BROKERFLOW_DB}"

[workflow]
checklist_threshold_pct = "80"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.database.url == "sqlite://from-env-interpolation.db",
                "database url should be interpolated from the environment",
            )?;
            ensure(
                config.workflow.checklist_threshold_pct == Decimal::new(80, 0),
                "threshold should be read from the file",
            )
        })();

        clear_vars(&["TEST_BROKERFLOW_DB"]);
        result
    }

    #[test]
    fn logging_env_aliases_are_supported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("BROKERFLOW_LOG_LEVEL", "warn");
        env::set_var("BROKERFLOW_LOG_FORMAT", "pretty");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.logging.level == "warn", "warning log level should be set from env var")?;
            ensure(
                matches!(config.logging.format, LogFormat::Pretty),
                "pretty logging format should be set from env var",
            )
        })();

        clear_vars(&["BROKERFLOW_LOG_LEVEL", "BROKERFLOW_LOG_FORMAT"]);
        result
    }

    #[test]
    fn precedence_defaults_file_env_overrides() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("BROKERFLOW_DATABASE_URL", "sqlite://from-env.db");
        env::set_var("BROKERFLOW_WORKFLOW_PERSISTENCE_ENABLED", "false");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("brokerflow.toml");
            fs::write(
                &path,
                r#"
[database]
url = "sqlite://from-file.db"
max_connections = 2

[workflow]
persistence_enabled = true

[logging]
level = "warn"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config = AppConfig::load(LoadOptions {
                config_path: Some(path),
                overrides: ConfigOverrides {
                    database_url: Some("sqlite://from-override.db".to_string()),
                    log_level: Some("debug".to_string()),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.database.url == "sqlite://from-override.db",
                "override database url should win",
            )?;
            ensure(config.database.max_connections == 2, "file value should beat the default")?;
            ensure(config.logging.level == "debug", "overridden log level should be debug")?;
            ensure(!config.workflow.persistence_enabled, "env should win over the file")
        })();

        clear_vars(&["BROKERFLOW_DATABASE_URL", "BROKERFLOW_WORKFLOW_PERSISTENCE_ENABLED"]);
        result
    }

    #[test]
    fn threshold_outside_percentage_range_fails_validation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let error = match AppConfig::load(LoadOptions {
            overrides: ConfigOverrides {
                checklist_threshold_pct: Some(Decimal::new(150, 0)),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        }) {
            Ok(_) => return Err("expected validation failure but config load succeeded".to_string()),
            Err(error) => error,
        };

        ensure(
            matches!(
                error,
                ConfigError::Validation(ref message) if message.contains("checklist_threshold_pct")
            ),
            "validation failure should mention the threshold",
        )
    }

    #[test]
    fn invalid_env_value_is_reported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("BROKERFLOW_DATABASE_MAX_CONNECTIONS", "many");
        let result = match AppConfig::load(LoadOptions::default()) {
            Ok(_) => Err("expected env parse failure".to_string()),
            Err(ConfigError::InvalidEnvOverride { key, .. }) => ensure(
                key == "BROKERFLOW_DATABASE_MAX_CONNECTIONS",
                "error should name the offending variable",
            ),
            Err(other) => Err(format!("unexpected error: {other}")),
        };

        clear_vars(&["BROKERFLOW_DATABASE_MAX_CONNECTIONS"]);
        result
    }

    #[test]
    fn missing_required_file_is_an_error() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
        let result = AppConfig::load(LoadOptions {
            config_path: Some(dir.path().join("absent.toml")),
            require_file: true,
            ..LoadOptions::default()
        });

        ensure(
            matches!(result, Err(ConfigError::MissingConfigFile(_))),
            "require_file should fail when the file is absent",
        )
    }
}
