//! Configuration loading — TOML file with environment variable overrides.
//!
//! Looks for `devreg.toml` in the working directory. Every field has a
//! sensible default so the file is optional. Environment variables take
//! precedence over file values.

use std::path::PathBuf;

use serde::Deserialize;

use devreg_domain::history::{DEFAULT_MAX_ENTRIES, HistoryPolicy};
use devreg_domain::name::{DeviceName, ServerName};
use devreg_domain::property::PropertyScope;

/// Class of the registry's own device.
pub const DATABASE_CLASS: &str = "DataBase";
/// Server class the registry runs as.
pub const DATABASE_SERVER_CLASS: &str = "DataBaseds";

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Which storage backend to open.
    pub backend: BackendConfig,
    /// Relational backend settings.
    pub database: DatabaseConfig,
    /// Tree backend settings.
    pub tree: TreeConfig,
    /// Property history retention.
    pub history: HistoryConfig,
    /// Identity the registry registers itself under.
    pub registry: RegistryConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
}

/// Storage backend variants.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Sqlite,
    Tree,
}

impl std::str::FromStr for BackendKind {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "sqlite" => Ok(Self::Sqlite),
            "tree" => Ok(Self::Tree),
            other => Err(ConfigError::Validation(format!(
                "unknown backend kind {other:?}"
            ))),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub kind: BackendKind,
}

/// `SQLite` database configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// `SQLite` connection URL or file path.
    pub url: String,
}

/// Tree backend configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct TreeConfig {
    /// Directory the tree lives in.
    pub root: PathBuf,
}

/// History retention configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    pub enabled: bool,
    /// Scopes recording history.
    pub scopes: Vec<PropertyScope>,
    /// Entries kept per property; `0` keeps every entry.
    pub max_entries: usize,
    /// Maximum entry age in seconds; `0` disables the age bound.
    pub max_age_secs: u64,
}

/// Self-registration settings.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Instance name: the registry runs as `DataBaseds/<personal_name>` and
    /// owns `sys/database/<personal_name>`.
    pub personal_name: String,
    /// Host name published in the registry's own export record.
    pub host: String,
    /// Network address published in the registry's own export record.
    pub address: String,
}

/// Logging configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive (`RUST_LOG` syntax).
    pub filter: String,
}

impl Config {
    /// Load configuration from `devreg.toml` (if present) then apply
    /// environment-variable overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML file exists but is malformed, or if the
    /// resulting configuration is invalid.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = Self::from_file("devreg.toml")?;
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &str) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(ConfigError::Parse),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(ConfigError::Io(err)),
        }
    }

    fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(val) = lookup("DEVREG_BACKEND") {
            self.backend.kind = val.parse()?;
        }
        if let Some(val) = lookup("DEVREG_DATABASE_URL") {
            self.database.url = val;
        }
        if let Some(val) = lookup("DEVREG_TREE_ROOT") {
            self.tree.root = PathBuf::from(val);
        }
        if let Some(val) = lookup("DEVREG_HISTORY_ENABLED") {
            self.history.enabled = val.parse().map_err(|_| {
                ConfigError::Validation(format!("DEVREG_HISTORY_ENABLED is not a boolean: {val}"))
            })?;
        }
        if let Some(val) = lookup("DEVREG_HISTORY_MAX_ENTRIES") {
            self.history.max_entries = val.parse().map_err(|_| {
                ConfigError::Validation(format!("DEVREG_HISTORY_MAX_ENTRIES is not a count: {val}"))
            })?;
        }
        if let Some(val) = lookup("DEVREG_PERSONAL_NAME") {
            self.registry.personal_name = val;
        }
        if let Some(val) = lookup("DEVREG_HOST") {
            self.registry.host = val;
        }
        if let Some(val) = lookup("DEVREG_ADDRESS") {
            self.registry.address = val;
        }
        if let Some(val) = lookup("DEVREG_LOG") {
            self.logging.filter = val;
        }
        if let Some(val) = lookup("RUST_LOG") {
            self.logging.filter = val;
        }
        Ok(())
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.backend.kind == BackendKind::Sqlite && self.database.url.is_empty() {
            return Err(ConfigError::Validation(
                "database url must not be empty".to_string(),
            ));
        }
        if self.backend.kind == BackendKind::Tree && self.tree.root.as_os_str().is_empty() {
            return Err(ConfigError::Validation(
                "tree root must not be empty".to_string(),
            ));
        }
        if self.registry.host.is_empty() {
            return Err(ConfigError::Validation("host must not be empty".to_string()));
        }
        self.registry.server_name()?;
        self.registry.device_name()?;
        Ok(())
    }
}

impl HistoryConfig {
    /// Retention policy the property store applies.
    #[must_use]
    pub fn to_policy(&self) -> HistoryPolicy {
        if !self.enabled {
            return HistoryPolicy::disabled();
        }
        let max_age = (self.max_age_secs > 0)
            .then(|| chrono::Duration::try_seconds(i64::try_from(self.max_age_secs).ok()?))
            .flatten();
        HistoryPolicy::default()
            .with_scopes(self.scopes.iter().copied())
            .with_max_entries((self.max_entries > 0).then_some(self.max_entries))
            .with_max_age(max_age)
    }
}

impl RegistryConfig {
    /// `DataBaseds/<personal_name>`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] if the personal name is not a
    /// valid instance name.
    pub fn server_name(&self) -> Result<ServerName, ConfigError> {
        ServerName::parse(&format!("{DATABASE_SERVER_CLASS}/{}", self.personal_name))
            .map_err(|err| ConfigError::Validation(format!("invalid personal name: {err}")))
    }

    /// `sys/database/<personal_name>`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] if the personal name is not a
    /// valid member name.
    pub fn device_name(&self) -> Result<DeviceName, ConfigError> {
        DeviceName::parse(&format!("sys/database/{}", self.personal_name))
            .map_err(|err| ConfigError::Validation(format!("invalid personal name: {err}")))
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite:devreg.db?mode=rwc".to_string(),
        }
    }
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("devreg-tree"),
        }
    }
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            scopes: PropertyScope::ALL.to_vec(),
            max_entries: DEFAULT_MAX_ENTRIES,
            max_age_secs: 0,
        }
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            personal_name: "2".to_string(),
            host: "localhost".to_string(),
            address: "tcp://localhost:10000".to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "devregd=info,devreg_app=info".to_string(),
        }
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// TOML parse failure.
    #[error("failed to parse config file")]
    Parse(#[from] toml::de::Error),
    /// File I/O failure.
    #[error("failed to read config file")]
    Io(#[from] std::io::Error),
    /// Semantic validation failure.
    #[error("invalid configuration: {0}")]
    Validation(String),
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn overrides(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn should_produce_sensible_defaults() {
        let config = Config::default();
        assert_eq!(config.backend.kind, BackendKind::Sqlite);
        assert_eq!(config.database.url, "sqlite:devreg.db?mode=rwc");
        assert_eq!(config.tree.root, PathBuf::from("devreg-tree"));
        assert!(config.history.enabled);
        assert_eq!(config.history.max_entries, 10);
        assert_eq!(config.registry.personal_name, "2");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn should_parse_minimal_toml() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.backend.kind, BackendKind::Sqlite);
    }

    #[test]
    fn should_parse_full_toml() {
        let toml = "
            [backend]
            kind = 'tree'

            [database]
            url = 'sqlite:test.db'

            [tree]
            root = '/var/lib/devreg'

            [history]
            enabled = true
            scopes = ['device', 'class_attribute']
            max_entries = 3
            max_age_secs = 60

            [registry]
            personal_name = 'main'
            host = 'ctrl-01'
            address = 'tcp://ctrl-01:20000'

            [logging]
            filter = 'debug'
        ";
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.backend.kind, BackendKind::Tree);
        assert_eq!(config.database.url, "sqlite:test.db");
        assert_eq!(config.tree.root, PathBuf::from("/var/lib/devreg"));
        assert_eq!(
            config.history.scopes,
            vec![PropertyScope::Device, PropertyScope::ClassAttribute]
        );
        assert_eq!(config.registry.host, "ctrl-01");
        assert_eq!(config.registry.address, "tcp://ctrl-01:20000");
        assert_eq!(config.logging.filter, "debug");

        let policy = config.history.to_policy();
        assert!(policy.is_enabled(PropertyScope::Device));
        assert!(!policy.is_enabled(PropertyScope::Free));
        assert_eq!(policy.max_entries, Some(3));
        assert_eq!(policy.max_age, chrono::Duration::try_seconds(60));
    }

    #[test]
    fn should_return_default_when_file_not_found() {
        let config = Config::from_file("nonexistent.toml").unwrap();
        assert_eq!(config.registry.host, "localhost");
    }

    #[test]
    fn should_apply_overrides_over_file_values() {
        let mut config: Config = toml::from_str("[backend]\nkind = 'sqlite'").unwrap();
        config
            .apply_overrides(overrides(&[
                ("DEVREG_BACKEND", "Tree"),
                ("DEVREG_TREE_ROOT", "/tmp/tree"),
                ("DEVREG_HISTORY_MAX_ENTRIES", "0"),
                ("DEVREG_LOG", "warn"),
                ("RUST_LOG", "trace"),
            ]))
            .unwrap();

        assert_eq!(config.backend.kind, BackendKind::Tree);
        assert_eq!(config.tree.root, PathBuf::from("/tmp/tree"));
        assert_eq!(config.logging.filter, "trace");
        assert_eq!(config.history.to_policy().max_entries, None);
    }

    #[test]
    fn should_reject_malformed_overrides() {
        let mut config = Config::default();
        assert!(
            config
                .apply_overrides(overrides(&[("DEVREG_BACKEND", "mongo")]))
                .is_err()
        );
        assert!(
            config
                .apply_overrides(overrides(&[("DEVREG_HISTORY_ENABLED", "maybe")]))
                .is_err()
        );
    }

    #[test]
    fn should_disable_history_policy() {
        let mut config = Config::default();
        config.history.enabled = false;
        assert_eq!(config.history.to_policy(), HistoryPolicy::disabled());
    }

    #[test]
    fn should_reject_invalid_personal_name() {
        let mut config = Config::default();
        config.registry.personal_name = "a/b".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn should_derive_self_registration_names() {
        let config = Config::default();
        assert_eq!(config.registry.server_name().unwrap().as_str(), "DataBaseds/2");
        assert_eq!(config.registry.device_name().unwrap().key(), "sys/database/2");
    }

    #[test]
    fn should_report_parse_error_for_invalid_toml() {
        let result: Result<Config, _> = toml::from_str("invalid {{{");
        assert!(result.is_err());
    }
}
