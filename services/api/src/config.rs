//! services/api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development. Provider API keys are not configured here;
//! they are per-tenant credentials stored in the database.

use chatbot_core::prompt::DEFAULT_RESPONSE_LANGUAGE;
use std::net::SocketAddr;
use std::time::Duration;
use tracing::Level;

pub const DEFAULT_GROQ_API_BASE: &str = "https://api.groq.com/openai/v1";
pub const DEFAULT_CLAUDE_API_BASE: &str = "https://api.anthropic.com";

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub database_url: String,
    pub log_level: Level,
    pub chat_model_openai: String,
    pub chat_model_claude: String,
    pub chat_model_groq: String,
    pub embedding_model: String,
    pub groq_api_base: String,
    pub claude_api_base: String,
    pub response_language: String,
    pub config_reconnect_delay: Duration,
    /// Origins allowed to call the API from a browser. Empty means any origin.
    pub allowed_origins: Vec<String>,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination.
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var_or = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        // --- Server and Database Settings ---
        let bind_address_str = var_or("BIND_ADDRESS", "0.0.0.0:3000");
        let bind_address = bind_address_str.parse::<SocketAddr>().map_err(|e| {
            ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string())
        })?;

        let database_url =
            lookup("DATABASE_URL").ok_or_else(|| ConfigError::MissingVar("DATABASE_URL".to_string()))?;

        let log_level_str = var_or("RUST_LOG", "INFO");
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        // --- Provider Settings ---
        let chat_model_openai = var_or("CHAT_MODEL_OPENAI", "gpt-3.5-turbo");
        let chat_model_claude = var_or("CHAT_MODEL_CLAUDE", "claude-3-sonnet-20240229");
        let chat_model_groq = var_or("CHAT_MODEL_GROQ", "mixtral-8x7b-32768");
        let embedding_model = var_or("EMBEDDING_MODEL", "text-embedding-3-small");
        let groq_api_base = var_or("GROQ_API_BASE", DEFAULT_GROQ_API_BASE);
        let claude_api_base = var_or("CLAUDE_API_BASE", DEFAULT_CLAUDE_API_BASE);

        // --- Pipeline Settings ---
        let response_language = var_or("RESPONSE_LANGUAGE", DEFAULT_RESPONSE_LANGUAGE);

        let reconnect_str = var_or("CONFIG_RECONNECT_SECS", "3");
        let config_reconnect_delay = reconnect_str
            .parse::<u64>()
            .map(Duration::from_secs)
            .map_err(|_| {
                ConfigError::InvalidValue(
                    "CONFIG_RECONNECT_SECS".to_string(),
                    format!("'{}' is not a whole number of seconds", reconnect_str),
                )
            })?;

        let allowed_origins = lookup("ALLOWED_ORIGINS")
            .map(|list| {
                list.split(',')
                    .map(str::trim)
                    .filter(|o| !o.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            bind_address,
            database_url,
            log_level,
            chat_model_openai,
            chat_model_claude,
            chat_model_groq,
            embedding_model,
            groq_api_base,
            claude_api_base,
            response_language,
            config_reconnect_delay,
            allowed_origins,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_only_the_database_is_set() {
        let config = load(&[("DATABASE_URL", "postgres://localhost/chatbot")]).unwrap();
        assert_eq!(config.bind_address.to_string(), "0.0.0.0:3000");
        assert_eq!(config.log_level, Level::INFO);
        assert_eq!(config.response_language, "English");
        assert_eq!(config.config_reconnect_delay, Duration::from_secs(3));
        assert_eq!(config.groq_api_base, DEFAULT_GROQ_API_BASE);
        assert!(config.allowed_origins.is_empty());
    }

    #[test]
    fn database_url_is_required() {
        assert!(matches!(load(&[]), Err(ConfigError::MissingVar(v)) if v == "DATABASE_URL"));
    }

    #[test]
    fn invalid_values_are_reported_by_name() {
        let err = load(&[
            ("DATABASE_URL", "postgres://localhost/chatbot"),
            ("CONFIG_RECONNECT_SECS", "soon"),
        ])
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue(v, _) if v == "CONFIG_RECONNECT_SECS"));

        let err = load(&[
            ("DATABASE_URL", "postgres://localhost/chatbot"),
            ("BIND_ADDRESS", "localhost"),
        ])
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue(v, _) if v == "BIND_ADDRESS"));
    }

    #[test]
    fn allowed_origins_are_split_and_trimmed() {
        let config = load(&[
            ("DATABASE_URL", "postgres://localhost/chatbot"),
            ("ALLOWED_ORIGINS", "https://a.example, https://b.example,,"),
            ("RESPONSE_LANGUAGE", "Swedish"),
        ])
        .unwrap();
        assert_eq!(
            config.allowed_origins,
            vec!["https://a.example".to_string(), "https://b.example".to_string()]
        );
        assert_eq!(config.response_language, "Swedish");
    }
}
