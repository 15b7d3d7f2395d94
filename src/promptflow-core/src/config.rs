//! Engine configuration.
//!
//! Loaded from TOML, with environment overrides:
//!
//! ```toml
//! [collector]
//! timeout_secs = 90
//! exit_token = "exit"
//! inactivity_policy = "from_collector_start"
//!
//! [menu]
//! page_size = 5
//! pagination_timeout_secs = 90
//!
//! [messages]
//! inactivity = "Menu has been closed due to inactivity."
//! exit = "Menu closed."
//! invalid_option = "That is an invalid option. Try again."
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Default collection window.
pub const DEFAULT_TIMEOUT_SECS: u64 = 90;
/// Default text that ends a dialogue.
pub const DEFAULT_EXIT_TOKEN: &str = "exit";

/// Errors loading or validating configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Reading the file failed.
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    /// The TOML did not parse.
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value is out of range.
    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Whether rejections push the inactivity deadline back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InactivityPolicy {
    /// Deadline is wall-clock from collector start.
    #[default]
    FromCollectorStart,
    /// Every rejection restarts the window.
    ResetOnReject,
}

/// Top-level engine configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub collector: CollectorConfig,
    #[serde(default)]
    pub menu: MenuConfig,
    #[serde(default)]
    pub messages: MessagesConfig,
}

/// Collection settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectorConfig {
    /// Seconds without a qualifying message before the dialogue closes.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Message content that ends the dialogue.
    #[serde(default = "default_exit_token")]
    pub exit_token: String,
    #[serde(default)]
    pub inactivity_policy: InactivityPolicy,
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn default_exit_token() -> String {
    DEFAULT_EXIT_TOKEN.to_string()
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            exit_token: default_exit_token(),
            inactivity_policy: InactivityPolicy::default(),
        }
    }
}

impl CollectorConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Menu defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MenuConfig {
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    #[serde(default = "default_timeout_secs")]
    pub pagination_timeout_secs: u64,
    #[serde(default = "default_previous_symbol")]
    pub previous_symbol: String,
    #[serde(default = "default_next_symbol")]
    pub next_symbol: String,
}

fn default_page_size() -> usize {
    crate::menu::DEFAULT_PAGE_SIZE
}

fn default_previous_symbol() -> String {
    "◀".to_string()
}

fn default_next_symbol() -> String {
    "▶".to_string()
}

impl Default for MenuConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            pagination_timeout_secs: default_timeout_secs(),
            previous_symbol: default_previous_symbol(),
            next_symbol: default_next_symbol(),
        }
    }
}

/// User-visible texts sent by the default hooks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessagesConfig {
    #[serde(default = "default_inactivity_text")]
    pub inactivity: String,
    #[serde(default = "default_exit_text")]
    pub exit: String,
    #[serde(default = "default_invalid_option_text")]
    pub invalid_option: String,
}

fn default_inactivity_text() -> String {
    "Menu has been closed due to inactivity.".to_string()
}

fn default_exit_text() -> String {
    "Menu closed.".to_string()
}

fn default_invalid_option_text() -> String {
    "That is an invalid option. Try again.".to_string()
}

impl Default for MessagesConfig {
    fn default() -> Self {
        Self {
            inactivity: default_inactivity_text(),
            exit: default_exit_text(),
            invalid_option: default_invalid_option_text(),
        }
    }
}

impl EngineConfig {
    /// Load from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&content)?;
        debug!("Loaded engine config from {}", path.display());
        Ok(config)
    }

    /// Parse and validate a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `PROMPTFLOW_TIMEOUT_SECS`, `PROMPTFLOW_EXIT_TOKEN` and
    /// `PROMPTFLOW_PAGE_SIZE`.
    pub fn apply_env_overrides(mut self) -> Result<Self, ConfigError> {
        self.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(self)
    }

    fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("PROMPTFLOW_TIMEOUT_SECS") {
            self.collector.timeout_secs = value.trim().parse().map_err(|_| {
                ConfigError::Invalid(format!("PROMPTFLOW_TIMEOUT_SECS is not a number: {value}"))
            })?;
        }
        if let Some(value) = lookup("PROMPTFLOW_EXIT_TOKEN") {
            self.collector.exit_token = value;
        }
        if let Some(value) = lookup("PROMPTFLOW_PAGE_SIZE") {
            self.menu.page_size = value.trim().parse().map_err(|_| {
                ConfigError::Invalid(format!("PROMPTFLOW_PAGE_SIZE is not a number: {value}"))
            })?;
        }
        self.validate()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.collector.timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "collector.timeout_secs must be greater than zero".to_string(),
            ));
        }
        if self.collector.exit_token.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "collector.exit_token must not be empty".to_string(),
            ));
        }
        if self.menu.previous_symbol == self.menu.next_symbol {
            return Err(ConfigError::Invalid(
                "menu.previous_symbol and menu.next_symbol must differ".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.collector.timeout(), Duration::from_secs(90));
        assert_eq!(config.collector.exit_token, "exit");
        assert_eq!(
            config.collector.inactivity_policy,
            InactivityPolicy::FromCollectorStart
        );
        assert_eq!(config.menu.page_size, 5);
        assert_eq!(config.messages.exit, "Menu closed.");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml() {
        let config = EngineConfig::from_toml_str(
            r#"
            [collector]
            timeout_secs = 30
            inactivity_policy = "reset_on_reject"

            [messages]
            exit = "Bye!"
            "#,
        )
        .unwrap();

        assert_eq!(config.collector.timeout_secs, 30);
        assert_eq!(config.collector.exit_token, "exit");
        assert_eq!(
            config.collector.inactivity_policy,
            InactivityPolicy::ResetOnReject
        );
        assert_eq!(config.messages.exit, "Bye!");
        assert_eq!(
            config.messages.inactivity,
            "Menu has been closed due to inactivity."
        );
    }

    #[test]
    fn test_invalid_values_rejected() {
        let err = EngineConfig::from_toml_str("[collector]\ntimeout_secs = 0").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));

        let err = EngineConfig::from_toml_str("[collector]\ntimeout_secs = \"soon\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_overrides() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("PROMPTFLOW_TIMEOUT_SECS", "15"),
            ("PROMPTFLOW_EXIT_TOKEN", "quit"),
        ]);
        let mut config = EngineConfig::default();
        config
            .apply_overrides(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.collector.timeout_secs, 15);
        assert_eq!(config.collector.exit_token, "quit");
        assert_eq!(config.menu.page_size, 5);

        let mut config = EngineConfig::default();
        let err = config
            .apply_overrides(|key| (key == "PROMPTFLOW_PAGE_SIZE").then(|| "many".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("promptflow.toml");
        std::fs::write(&path, "[menu]\npage_size = 3\n").unwrap();

        let config = EngineConfig::load(&path).unwrap();
        assert_eq!(config.menu.page_size, 3);

        let missing = EngineConfig::load(dir.path().join("nope.toml")).unwrap_err();
        assert!(matches!(missing, ConfigError::Io(_)));
    }
}
