//! Configuration module for the tripwire bot.
//!
//! Loads configuration from environment variables.

use std::collections::HashMap;
use std::env;
use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Startup configuration errors. Any of these must abort the process
/// before a connection is attempted.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    MissingVar(&'static str),

    #[error("environment variable {0} must not be empty")]
    EmptyVar(&'static str),

    #[error("MATCH_PATTERN is not a valid regular expression: {0}")]
    InvalidPattern(#[from] regex::Error),

    #[error("SCRIPT_TIMEOUT_SEC must be a positive integer, got {0:?}")]
    InvalidTimeout(String),
}

/// Application configuration.
///
/// Built once at startup and shared read-only afterwards.
#[derive(Clone)]
pub struct Config {
    // Feishu app credentials
    pub app_id: String,
    /// App secret. Redacted from `Debug` output, never logged.
    pub app_secret: String,
    /// Event verification token; inbound events carrying a different
    /// token are dropped.
    pub verification_token: String,
    /// Event payload encryption key. Accepted for parity with the app
    /// settings page; the long-connection transport does not use it.
    pub encrypt_key: Option<String>,

    /// Regular expression a group message must match to trigger the script.
    pub match_pattern: String,

    /// Shell command executed on a match.
    pub script_command: String,

    /// Wall-clock limit for one script execution.
    pub script_timeout: Duration,

    /// Logging verbosity used when RUST_LOG is not set.
    pub log_level: String,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Build configuration from an explicit variable map.
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let required = |name: &'static str| -> Result<String, ConfigError> {
            let value = vars.get(name).ok_or(ConfigError::MissingVar(name))?;
            let value = value.trim();
            if value.is_empty() {
                return Err(ConfigError::EmptyVar(name));
            }
            Ok(value.to_string())
        };
        let optional = |name: &str| -> Option<String> {
            vars.get(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let timeout_raw = required("SCRIPT_TIMEOUT_SEC")?;
        let timeout_sec = timeout_raw
            .parse::<u64>()
            .ok()
            .filter(|&secs| secs > 0)
            .ok_or_else(|| ConfigError::InvalidTimeout(timeout_raw.clone()))?;

        Ok(Self {
            app_id: required("FEISHU_APP_ID")?,
            app_secret: required("FEISHU_APP_SECRET")?,
            verification_token: required("FEISHU_VERIFICATION_TOKEN")?,
            encrypt_key: optional("FEISHU_ENCRYPT_KEY"),
            match_pattern: required("MATCH_PATTERN")?,
            script_command: required("SCRIPT_COMMAND")?,
            script_timeout: Duration::from_secs(timeout_sec),
            log_level: optional("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
        })
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("app_id", &self.app_id)
            .field("app_secret", &"<redacted>")
            .field("verification_token", &"<redacted>")
            .field("encrypt_key", &self.encrypt_key.as_ref().map(|_| "<redacted>"))
            .field("match_pattern", &self.match_pattern)
            .field("script_command", &self.script_command)
            .field("script_timeout", &self.script_timeout)
            .field("log_level", &self.log_level)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_vars() -> HashMap<String, String> {
        [
            ("FEISHU_APP_ID", "cli_test_app"),
            ("FEISHU_APP_SECRET", "s3cr3t"),
            ("FEISHU_VERIFICATION_TOKEN", "verif-token"),
            ("MATCH_PATTERN", r"^/run\s+.+"),
            ("SCRIPT_COMMAND", "./deploy.sh"),
            ("SCRIPT_TIMEOUT_SEC", "7200"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
    }

    #[test]
    fn loads_complete_config() {
        let config = Config::from_vars(&full_vars()).unwrap();

        assert_eq!(config.app_id, "cli_test_app");
        assert_eq!(config.script_timeout, Duration::from_secs(7200));
        assert_eq!(config.log_level, "info"); // default
        assert!(config.encrypt_key.is_none());
    }

    #[test]
    fn missing_required_var_fails() {
        let mut vars = full_vars();
        vars.remove("FEISHU_APP_SECRET");

        let err = Config::from_vars(&vars).unwrap_err();
        assert!(matches!(err, ConfigError::MissingVar("FEISHU_APP_SECRET")));
    }

    #[test]
    fn blank_required_var_fails() {
        let mut vars = full_vars();
        vars.insert("SCRIPT_COMMAND".to_string(), "   ".to_string());

        let err = Config::from_vars(&vars).unwrap_err();
        assert!(matches!(err, ConfigError::EmptyVar("SCRIPT_COMMAND")));
    }

    #[test]
    fn zero_timeout_fails() {
        let mut vars = full_vars();
        vars.insert("SCRIPT_TIMEOUT_SEC".to_string(), "0".to_string());

        assert!(matches!(
            Config::from_vars(&vars).unwrap_err(),
            ConfigError::InvalidTimeout(_)
        ));
    }

    #[test]
    fn non_numeric_timeout_fails() {
        let mut vars = full_vars();
        vars.insert("SCRIPT_TIMEOUT_SEC".to_string(), "ninety".to_string());

        assert!(matches!(
            Config::from_vars(&vars).unwrap_err(),
            ConfigError::InvalidTimeout(_)
        ));
    }

    #[test]
    fn optional_vars_are_picked_up() {
        let mut vars = full_vars();
        vars.insert("FEISHU_ENCRYPT_KEY".to_string(), "enc-key".to_string());
        vars.insert("LOG_LEVEL".to_string(), "debug".to_string());

        let config = Config::from_vars(&vars).unwrap();
        assert_eq!(config.encrypt_key.as_deref(), Some("enc-key"));
        assert_eq!(config.log_level, "debug");
    }

    #[test]
    fn debug_output_redacts_secrets() {
        let config = Config::from_vars(&full_vars()).unwrap();
        let printed = format!("{:?}", config);

        assert!(!printed.contains("s3cr3t"));
        assert!(!printed.contains("verif-token"));
        assert!(printed.contains("cli_test_app"));
    }
}
