use anyhow::{Context, Result};

pub const DEFAULT_COMPLETIONS_URL: &str = "http://localhost:1234/v1/chat/completions";

#[derive(Debug, Clone, PartialEq)]
pub struct ChatConfig {
    pub endpoint: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout_secs: u64,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_COMPLETIONS_URL.to_string(),
            model: "local-model".to_string(),
            temperature: 0.7,
            max_tokens: 1000,
            timeout_secs: 120,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub database_url: Option<String>,
    pub chat: ChatConfig,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = ChatConfig::default();
        let chat = ChatConfig {
            endpoint: lookup("CHAT_COMPLETIONS_URL").unwrap_or(defaults.endpoint),
            model: lookup("CHAT_MODEL").unwrap_or(defaults.model),
            temperature: parse_or(&lookup, "CHAT_TEMPERATURE", defaults.temperature)?,
            max_tokens: parse_or(&lookup, "CHAT_MAX_TOKENS", defaults.max_tokens)?,
            timeout_secs: parse_or(&lookup, "CHAT_TIMEOUT_SECS", defaults.timeout_secs)?,
        };

        Ok(Self {
            database_url: lookup("DATABASE_URL").filter(|url| !url.is_empty()),
            chat,
        })
    }

    pub fn require_database_url(&self) -> Result<&str> {
        self.database_url
            .as_deref()
            .context("DATABASE_URL must be set to a production Postgres instance")
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{key} has an invalid value: {raw:?}")),
        None => Ok(default),
    }
}
